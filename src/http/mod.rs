//! HTTP boundary: client key extraction, admission middleware and server.

mod middleware;
mod server;

pub use middleware::rate_limit;
pub use server::{router, HttpServer};
