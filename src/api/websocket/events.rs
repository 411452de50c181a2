//! WebSocket message types for the dashboard bridge

use serde::{Deserialize, Serialize};

use crate::types::Snapshot;

/// Messages pushed to dashboard clients
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Full feed state after a change (or on connect)
    Snapshot { feed: Snapshot },

    /// Reply to a client ping
    Pong,

    /// The last client message could not be handled
    Error { code: String, message: String },
}

impl ServerMessage {
    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        ServerMessage::Error {
            code: code.into(),
            message: message.into(),
        }
    }
}

/// Client message types
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Start (or restart) the synthetic load
    StartLoad {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        rate: Option<u32>,
    },

    /// Stop the synthetic load
    StopLoad,

    /// Zero the generated counter
    ResetGenerated,

    /// Ping for heartbeat
    Ping,
}
