//! HTTP handlers outside the OAuth2 flow

pub mod auth;

pub use auth::{logout, me};
