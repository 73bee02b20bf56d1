//! Axum extractors

mod session;

pub use session::Session;
