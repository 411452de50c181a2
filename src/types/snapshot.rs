//! Snapshot value handed to feed observers

use serde::{Deserialize, Serialize};

use super::AttendanceEvent;

/// Synthetic load generator status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratorState {
    pub running: bool,
    /// Events per second; zero whenever the generator is stopped
    pub rate_per_second: u32,
    /// Events emitted since the last counter reset
    pub generated_count: u64,
}

impl GeneratorState {
    /// A running generator with a fresh counter
    pub fn started(rate_per_second: u32) -> Self {
        Self {
            running: true,
            rate_per_second,
            generated_count: 0,
        }
    }
}

/// Point-in-time copy of the feed
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    /// Most recent events, newest first
    pub events: Vec<AttendanceEvent>,
    /// Events applied since the feed was created or last torn down
    pub lifetime_count: u64,
    pub generator: GeneratorState,
}

impl Snapshot {
    /// Same snapshot with `generator` replaced
    pub fn with_generator(mut self, generator: GeneratorState) -> Self {
        self.generator = generator;
        self
    }

    /// Ids of the windowed events, newest first
    pub fn event_ids(&self) -> Vec<&str> {
        self.events.iter().map(|e| e.id.as_str()).collect()
    }
}
