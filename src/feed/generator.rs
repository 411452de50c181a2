//! Synthetic load generator
//!
//! [`SyntheticEvents`] produces plausible attendance events from a seedable
//! RNG; [`LoadTask`] drives a recurring tick on the tokio runtime and is
//! cancelled by consuming it.

use std::time::Duration;

use chrono::{DateTime, TimeZone};
use rand::prelude::IndexedRandom;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};

use crate::types::{default_message, AttendanceAction, AttendanceEvent, AttendanceStatus};
use crate::utils::clock_hms;

/// Names the generator picks from
pub const ROSTER: [&str; 8] = [
    "Alice Johnson",
    "Bob Smith",
    "Carol Lee",
    "David Kim",
    "Eva Brown",
    "Frank White",
    "Grace Lin",
    "Henry Yu",
];

const ID_SUFFIX_LEN: usize = 6;
const BASE36: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Tick period for `rate` events per second: `max(1ms, round(1000 / rate))`
pub fn tick_period(rate: u32) -> Duration {
    let rate = rate.max(1) as f64;
    let millis = (1000.0 / rate).round().max(1.0) as u64;
    Duration::from_millis(millis)
}

/// Map one uniform `[0, 1)` sample to a status
///
/// NORMAL 75%, LATE 15%, ERROR 8%, FORBIDDEN 2%.
pub fn status_for_sample(sample: f64) -> AttendanceStatus {
    if sample < 0.75 {
        AttendanceStatus::Normal
    } else if sample < 0.90 {
        AttendanceStatus::Late
    } else if sample < 0.98 {
        AttendanceStatus::Error
    } else {
        AttendanceStatus::Forbidden
    }
}

/// Source of synthetic attendance events
#[derive(Debug, Clone)]
pub struct SyntheticEvents<R = StdRng> {
    rng: R,
}

impl SyntheticEvents<StdRng> {
    /// Deterministic source for a given seed
    pub fn seeded(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    /// Source seeded from OS entropy
    pub fn from_entropy() -> Self {
        Self::with_rng(StdRng::from_os_rng())
    }

    /// Seeded when `seed` is set, entropy otherwise
    pub fn from_optional_seed(seed: Option<u64>) -> Self {
        match seed {
            Some(seed) => Self::seeded(seed),
            None => Self::from_entropy(),
        }
    }
}

impl<R: Rng> SyntheticEvents<R> {
    pub fn with_rng(rng: R) -> Self {
        Self { rng }
    }

    /// Build the next event stamped with `now`
    ///
    /// Draw order: name, action, status sample, late minutes (LATE only),
    /// id suffix.
    pub fn next_event<Tz: TimeZone>(&mut self, now: &DateTime<Tz>) -> AttendanceEvent {
        let employee_name = ROSTER.choose(&mut self.rng).copied().unwrap_or(ROSTER[0]);
        let action = AttendanceAction::KNOWN
            .choose(&mut self.rng)
            .cloned()
            .unwrap_or(AttendanceAction::CheckIn);
        let status = status_for_sample(self.rng.random::<f64>());
        let late_minutes = match status {
            AttendanceStatus::Late => Some(self.rng.random_range(1..=30)),
            _ => None,
        };
        let id = format!("{}-{}", now.timestamp_millis(), self.id_suffix());
        let message = default_message(&status, &action, late_minutes);

        AttendanceEvent {
            id,
            employee_name: employee_name.to_string(),
            action,
            timestamp: clock_hms(now),
            status,
            message,
        }
    }

    /// Random base36 suffix used to keep same-millisecond ids apart
    pub fn id_suffix(&mut self) -> String {
        (0..ID_SUFFIX_LEN)
            .map(|_| BASE36[self.rng.random_range(0..BASE36.len())] as char)
            .collect()
    }
}

/// Handle to a running recurring tick
///
/// The tick closure returns `false` to end the task on its own.
#[derive(Debug)]
pub struct LoadTask {
    handle: JoinHandle<()>,
}

impl LoadTask {
    /// Spawn a task calling `on_tick` every `period`, first after one period
    pub fn spawn<F>(runtime: &Handle, period: Duration, mut on_tick: F) -> Self
    where
        F: FnMut() -> bool + Send + 'static,
    {
        let handle = runtime.spawn(async move {
            let mut ticker = time::interval_at(Instant::now() + period, period);
            loop {
                ticker.tick().await;
                if !on_tick() {
                    break;
                }
            }
        });
        Self { handle }
    }

    /// Abort the task; it will not be polled again
    pub fn cancel(self) {
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;

    fn fixed_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 6, 9, 4, 7).unwrap()
    }

    #[test]
    fn test_tick_period() {
        assert_eq!(tick_period(50), Duration::from_millis(20));
        assert_eq!(tick_period(1), Duration::from_millis(1000));
        assert_eq!(tick_period(3), Duration::from_millis(333));
        assert_eq!(tick_period(1500), Duration::from_millis(1));
        assert_eq!(tick_period(1_000_000), Duration::from_millis(1));
        assert_eq!(tick_period(0), Duration::from_millis(1000));
    }

    #[test]
    fn test_status_thresholds() {
        assert_eq!(status_for_sample(0.0), AttendanceStatus::Normal);
        assert_eq!(status_for_sample(0.7499), AttendanceStatus::Normal);
        assert_eq!(status_for_sample(0.75), AttendanceStatus::Late);
        assert_eq!(status_for_sample(0.8999), AttendanceStatus::Late);
        assert_eq!(status_for_sample(0.90), AttendanceStatus::Error);
        assert_eq!(status_for_sample(0.9799), AttendanceStatus::Error);
        assert_eq!(status_for_sample(0.98), AttendanceStatus::Forbidden);
        assert_eq!(status_for_sample(0.9999), AttendanceStatus::Forbidden);
    }

    #[test]
    fn test_seeded_sources_are_deterministic() {
        let now = fixed_time();
        let mut a = SyntheticEvents::seeded(7);
        let mut b = SyntheticEvents::seeded(7);
        for _ in 0..50 {
            assert_eq!(a.next_event(&now), b.next_event(&now));
        }
    }

    #[test]
    fn test_generated_event_shape() {
        let now = fixed_time();
        let mut source = SyntheticEvents::seeded(1);

        for _ in 0..500 {
            let event = source.next_event(&now);
            assert!(ROSTER.contains(&event.employee_name.as_str()));
            assert!(event.action.is_known());
            assert_eq!(event.timestamp, "09:04:07");

            let (millis, suffix) = event.id.split_once('-').unwrap();
            assert_eq!(millis, now.timestamp_millis().to_string());
            assert_eq!(suffix.len(), 6);
            assert!(suffix.chars().all(|c| c.is_ascii_digit() || c.is_ascii_lowercase()));

            match &event.status {
                AttendanceStatus::Normal => match &event.action {
                    AttendanceAction::CheckIn => assert_eq!(event.message, "Check in successfully"),
                    _ => assert_eq!(event.message, "Check out successfully"),
                },
                AttendanceStatus::Late => {
                    let minutes: u32 = event
                        .message
                        .strip_prefix("Late ")
                        .and_then(|m| m.strip_suffix(" mins"))
                        .unwrap()
                        .parse()
                        .unwrap();
                    assert!((1..=30).contains(&minutes));
                }
                AttendanceStatus::Error => assert_eq!(event.message, "Device error"),
                AttendanceStatus::Forbidden => assert_eq!(event.message, "Forbidden location"),
                AttendanceStatus::Other(raw) => panic!("generator produced status {}", raw),
            }
        }
    }

    #[test]
    fn test_status_distribution_is_weighted() {
        let now = fixed_time();
        let mut source = SyntheticEvents::seeded(2024);
        let mut normal = 0;
        let mut forbidden = 0;
        let total = 20_000;

        for _ in 0..total {
            match source.next_event(&now).status {
                AttendanceStatus::Normal => normal += 1,
                AttendanceStatus::Forbidden => forbidden += 1,
                _ => {}
            }
        }

        let normal_share = normal as f64 / total as f64;
        let forbidden_share = forbidden as f64 / total as f64;
        assert!((0.72..0.78).contains(&normal_share), "normal share {}", normal_share);
        assert!((0.01..0.03).contains(&forbidden_share), "forbidden share {}", forbidden_share);
    }

    #[tokio::test(start_paused = true)]
    async fn test_load_task_ticks_until_cancelled() {
        let ticks = Arc::new(AtomicU64::new(0));
        let counter = ticks.clone();
        let task = LoadTask::spawn(&Handle::current(), Duration::from_millis(20), move || {
            counter.fetch_add(1, Ordering::SeqCst);
            true
        });

        time::sleep(Duration::from_millis(110)).await;
        let seen = ticks.load(Ordering::SeqCst);
        assert!((4..=5).contains(&seen), "saw {} ticks", seen);

        task.cancel();
        time::sleep(Duration::from_millis(200)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), seen);
    }

    #[tokio::test(start_paused = true)]
    async fn test_load_task_ends_when_tick_declines() {
        let ticks = Arc::new(AtomicU64::new(0));
        let counter = ticks.clone();
        let _task = LoadTask::spawn(&Handle::current(), Duration::from_millis(5), move || {
            counter.fetch_add(1, Ordering::SeqCst);
            false
        });

        time::sleep(Duration::from_millis(50)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 1);
    }
}
