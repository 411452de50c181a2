//! Shared state for the HTTP/WebSocket bridge

use crate::feed::FeedService;
use crate::types::Snapshot;

/// Shared application state for WebSocket connections
pub struct AppState {
    /// The live feed every connection subscribes to
    pub feed: FeedService,

    /// Rate used by `start_load` messages that carry none
    pub default_load_rate: u32,

    /// Per-connection snapshot buffer; a slower client skips snapshots
    pub observer_buffer: usize,
}

impl AppState {
    pub fn new(feed: FeedService) -> Self {
        let config = feed.config();
        let default_load_rate = config.default_load_rate;
        let observer_buffer = config.observer_buffer.max(1);

        Self {
            feed,
            default_load_rate,
            observer_buffer,
        }
    }

    /// Current feed state
    pub fn snapshot(&self) -> Snapshot {
        self.feed.snapshot()
    }

    /// Apply a client's `start_load`, falling back to the configured rate
    pub fn start_load(&self, rate: Option<u32>) {
        self.feed.start_load(rate.unwrap_or(self.default_load_rate));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FeedConfig;
    use crate::transport::ChannelTransport;
    use std::sync::Arc;

    fn state(config: FeedConfig) -> AppState {
        let (transport, _sender) = ChannelTransport::new();
        AppState::new(FeedService::with_transport(config, Arc::new(transport)))
    }

    #[test]
    fn test_state_takes_settings_from_feed_config() {
        let mut config = FeedConfig::default();
        config.default_load_rate = 12;
        config.observer_buffer = 0;

        let state = state(config);

        assert_eq!(state.default_load_rate, 12);
        assert_eq!(state.observer_buffer, 1);
        assert_eq!(state.snapshot(), Snapshot::default());
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_load_uses_default_rate() {
        let state = state(FeedConfig::default().with_seed(3));

        state.start_load(None);
        assert_eq!(state.snapshot().generator.rate_per_second, 50);

        state.start_load(Some(7));
        assert_eq!(state.snapshot().generator.rate_per_second, 7);

        state.feed.stop_load();
        assert!(!state.snapshot().generator.running);
    }
}
