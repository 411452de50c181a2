//! Utility functions and helpers
//!
//! Clock formatting and logging setup.

pub mod logging;
pub mod time;

pub use logging::{init_tracing, init_tracing_with_filter};
pub use time::{clock_hms, current_timestamp_ms};
