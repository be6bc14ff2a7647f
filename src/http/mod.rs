//! HTTP surface: routing, request handling and the server loop.

mod handler;
mod server;

pub use handler::{health_handler, reason_handler, AppState, THROTTLE_REASON};
pub use server::{router, HttpServer};
