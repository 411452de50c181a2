//! Attendance Feed
//!
//! Real-time distribution core for an attendance dashboard: it receives
//! attendance events from a transport, keeps a rolling window of the newest
//! ones plus a lifetime total, and pushes a fresh snapshot to every observer
//! on each change. A synthetic load generator exercises the same path.
//!
//! # Modules
//!
//! - `types`: Events, snapshots and error types
//! - `feed`: `FeedService` with its rolling store, subscription hub,
//!   ingress decoding and load generator
//! - `transport`: Notification streams (SSE client, in-process channel)
//! - `api`: Axum router bridging the feed to WebSocket dashboards
//! - `config`: `FeedConfig` and its environment variables
//! - `utils`: Clock formatting and logging setup
//!
//! # Example
//!
//! ```no_run
//! use attendance_feed::{FeedConfig, FeedService};
//!
//! #[tokio::main]
//! async fn main() {
//!     let feed = FeedService::new(FeedConfig::default());
//!     let sub = feed.subscribe_fn(|snapshot| {
//!         println!("{} events so far", snapshot.lifetime_count);
//!     });
//!     feed.start_load(50);
//!     tokio::time::sleep(std::time::Duration::from_secs(1)).await;
//!     feed.stop_load();
//!     sub.unsubscribe();
//! }
//! ```

pub mod api;
pub mod config;
pub mod feed;
pub mod transport;
pub mod types;
pub mod utils;

// Re-export commonly used items at crate root
pub use config::{FeedConfig, ReconnectPolicy, ValidationMode, DEFAULT_LOAD_RATE, WINDOW_CAPACITY};
pub use feed::{
    observer_fn, ChannelObserver, FeedService, Observer, RollingStore, SubscriberId, Subscription,
    SubscriptionHub,
};
pub use transport::{
    ChannelSender, ChannelTransport, FeedConnection, SseTransport, Transport, TransportNotice,
};
pub use types::{
    AttendanceAction, AttendanceEvent, AttendanceStatus, FeedError, FeedResult, GeneratorState,
    IngressError, ObserverError, Snapshot, TransportError,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
