//! API module for HTTP and WebSocket endpoints
//!
//! A consumer of the feed's in-process API that exposes it to dashboards.

pub mod http;
pub mod websocket;

pub use http::create_router;
pub use websocket::AppState;
