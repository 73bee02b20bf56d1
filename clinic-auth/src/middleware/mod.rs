//! Tower middleware

mod session;

pub use session::{SessionLayer, SessionMiddleware};
