//! WebSocket bridge for dashboard clients
//!
//! Provides the `/ws` endpoint. Each connection subscribes to the feed, gets
//! the current snapshot straight away and then one snapshot per change. Clients
//! can drive the synthetic load with JSON control messages.

pub mod events;
pub mod handler;
pub mod state;

pub use events::{ClientMessage, ServerMessage};
pub use handler::ws_handler;
pub use state::AppState;
