pub mod api;
pub mod http;
pub mod sse;

pub use http::{AppState, HttpServer};
