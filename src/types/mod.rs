//! Data types for the attendance feed
//!
//! Events, snapshots and the error enums shared by every other module.

mod attendance;
mod error;
mod snapshot;

pub use attendance::{default_message, AttendanceAction, AttendanceEvent, AttendanceStatus};
pub use error::{FeedError, FeedResult, IngressError, ObserverError, TransportError};
pub use snapshot::{GeneratorState, Snapshot};
