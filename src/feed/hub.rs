//! Observer registry and snapshot fan-out
//!
//! Observers are invoked synchronously, in subscription order, from whichever
//! thread broadcasts. Each subscription carries a re-entrant gate: delivery
//! holds it for the duration of the callback and `unsubscribe` clears it, so
//! once `unsubscribe` returns the observer is never called again. The gate is
//! re-entrant so an observer may unsubscribe itself from inside its callback.

use std::any::Any;
use std::cell::Cell;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, ReentrantMutex};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};

use crate::types::{ObserverError, Snapshot};

/// Identifier assigned to each subscription, starting at 1
pub type SubscriberId = u64;

/// Something that wants every feed snapshot
pub trait Observer: Send + Sync {
    fn on_snapshot(&self, snapshot: &Snapshot) -> Result<(), ObserverError>;
}

struct FnObserver<F>(F);

impl<F> Observer for FnObserver<F>
where
    F: Fn(&Snapshot) + Send + Sync,
{
    fn on_snapshot(&self, snapshot: &Snapshot) -> Result<(), ObserverError> {
        (self.0)(snapshot);
        Ok(())
    }
}

/// Wrap a closure as an observer
pub fn observer_fn<F>(f: F) -> Arc<dyn Observer>
where
    F: Fn(&Snapshot) + Send + Sync + 'static,
{
    Arc::new(FnObserver(f))
}

/// Observer that forwards snapshots into a bounded tokio channel
///
/// A full buffer drops the snapshot and reports [`ObserverError::Lagged`];
/// a dropped receiver reports [`ObserverError::Closed`].
#[derive(Debug, Clone)]
pub struct ChannelObserver {
    tx: mpsc::Sender<Snapshot>,
}

impl ChannelObserver {
    /// Create an observer and the receiver it feeds
    pub fn channel(buffer: usize) -> (Self, mpsc::Receiver<Snapshot>) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        (Self { tx }, rx)
    }
}

impl Observer for ChannelObserver {
    fn on_snapshot(&self, snapshot: &Snapshot) -> Result<(), ObserverError> {
        self.tx.try_send(snapshot.clone()).map_err(|e| match e {
            TrySendError::Full(_) => ObserverError::Lagged,
            TrySendError::Closed(_) => ObserverError::Closed,
        })
    }
}

/// Outcome of one broadcast
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Delivery {
    pub delivered: usize,
    pub failed: usize,
}

type Gate = ReentrantMutex<Cell<bool>>;

/// Sequence number of a numbered broadcast
pub(crate) type Sequence = u64;

#[derive(Clone)]
struct Entry {
    id: SubscriberId,
    observer: Arc<dyn Observer>,
    gate: Arc<Gate>,
    /// Broadcasts numbered up to here were already folded into the catch-up
    joined_at: Sequence,
}

#[derive(Default)]
struct Registry {
    entries: Mutex<Vec<Entry>>,
    next_id: AtomicU64,
}

/// Set of observers, in subscription order
#[derive(Default)]
pub struct SubscriptionHub {
    registry: Arc<Registry>,
}

impl SubscriptionHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `observer` and hand it `current` before returning
    ///
    /// Callers that broadcast from several threads must serialize this with
    /// their broadcasts, or the catch-up snapshot may arrive after a newer one.
    pub fn subscribe(&self, observer: Arc<dyn Observer>, current: &Snapshot) -> Subscription {
        self.subscribe_at(observer, current, 0)
    }

    /// Like [`SubscriptionHub::subscribe`], skipping numbered broadcasts up to `joined_at`
    pub(crate) fn subscribe_at(
        &self,
        observer: Arc<dyn Observer>,
        current: &Snapshot,
        joined_at: Sequence,
    ) -> Subscription {
        let id = self.registry.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let entry = Entry {
            id,
            observer,
            gate: Arc::new(ReentrantMutex::new(Cell::new(true))),
            joined_at,
        };

        self.registry.entries.lock().push(entry.clone());
        debug!(subscriber = id, "observer subscribed");

        if let Some(Err(error)) = deliver(&entry, current) {
            report_failure(id, &error);
        }

        Subscription {
            id,
            gate: entry.gate,
            registry: Arc::downgrade(&self.registry),
        }
    }

    /// Hand `snapshot` to every observer registered when the call starts
    pub fn broadcast(&self, snapshot: &Snapshot) -> Delivery {
        self.broadcast_numbered(snapshot, Sequence::MAX)
    }

    /// Broadcast `snapshot` as number `seq` to observers that joined before it
    pub(crate) fn broadcast_numbered(&self, snapshot: &Snapshot, seq: Sequence) -> Delivery {
        let entries: Vec<Entry> = self.registry.entries.lock().clone();
        let mut delivery = Delivery::default();

        for entry in entries.iter().filter(|e| e.joined_at < seq) {
            match deliver(entry, snapshot) {
                Some(Ok(())) => delivery.delivered += 1,
                Some(Err(error)) => {
                    delivery.failed += 1;
                    report_failure(entry.id, &error);
                }
                None => {}
            }
        }

        delivery
    }

    /// Drop every subscription
    pub fn clear(&self) {
        let entries = std::mem::take(&mut *self.registry.entries.lock());
        for entry in &entries {
            entry.gate.lock().set(false);
        }
        debug!(count = entries.len(), "cleared subscribers");
    }

    pub fn len(&self) -> usize {
        self.registry.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Handle returned by [`SubscriptionHub::subscribe`]
///
/// Dropping the handle leaves the observer subscribed.
pub struct Subscription {
    id: SubscriberId,
    gate: Arc<Gate>,
    registry: Weak<Registry>,
}

impl Subscription {
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Stop deliveries to this observer; calling it again is a no-op
    pub fn unsubscribe(&self) {
        {
            let active = self.gate.lock();
            if !active.get() {
                return;
            }
            active.set(false);
        }

        if let Some(registry) = self.registry.upgrade() {
            registry.entries.lock().retain(|e| e.id != self.id);
        }
        debug!(subscriber = self.id, "observer unsubscribed");
    }

    /// Whether deliveries still reach this observer
    pub fn is_active(&self) -> bool {
        self.gate.lock().get()
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("active", &self.is_active())
            .finish()
    }
}

/// Invoke one observer; `None` when it has been unsubscribed
fn deliver(entry: &Entry, snapshot: &Snapshot) -> Option<Result<(), ObserverError>> {
    let active = entry.gate.lock();
    if !active.get() {
        return None;
    }

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| entry.observer.on_snapshot(snapshot)))
        .unwrap_or_else(|payload| Err(ObserverError::Panicked(panic_message(payload.as_ref()))));
    Some(outcome)
}

fn report_failure(id: SubscriberId, error: &ObserverError) {
    match error {
        ObserverError::Lagged => debug!(subscriber = id, %error, "observer lagging"),
        _ => warn!(subscriber = id, %error, "observer failed to take snapshot"),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::OnceLock;
    use std::time::Duration;

    fn snapshot(count: u64) -> Snapshot {
        Snapshot {
            lifetime_count: count,
            ..Default::default()
        }
    }

    /// Observer that records (label, lifetime_count) into a shared log
    fn recorder(label: usize, log: &Arc<Mutex<Vec<(usize, u64)>>>) -> Arc<dyn Observer> {
        let log = log.clone();
        observer_fn(move |s| log.lock().push((label, s.lifetime_count)))
    }

    struct Failing;

    impl Observer for Failing {
        fn on_snapshot(&self, _: &Snapshot) -> Result<(), ObserverError> {
            Err(ObserverError::Failed("render error".to_string()))
        }
    }

    #[test]
    fn test_subscribe_delivers_current_snapshot_immediately() {
        let hub = SubscriptionHub::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        let sub = hub.subscribe(recorder(1, &log), &snapshot(7));

        assert_eq!(*log.lock(), vec![(1, 7)]);
        assert_eq!(sub.id(), 1);
        assert_eq!(hub.len(), 1);
    }

    #[test]
    fn test_broadcast_in_subscription_order() {
        let hub = SubscriptionHub::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        for label in 1..=3 {
            hub.subscribe(recorder(label, &log), &snapshot(0));
        }
        log.lock().clear();

        let delivery = hub.broadcast(&snapshot(1));

        assert_eq!(delivery, Delivery { delivered: 3, failed: 0 });
        assert_eq!(*log.lock(), vec![(1, 1), (2, 1), (3, 1)]);
    }

    #[test]
    fn test_failing_observer_is_isolated_and_kept() {
        let hub = SubscriptionHub::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        hub.subscribe(recorder(1, &log), &snapshot(0));
        hub.subscribe(Arc::new(Failing), &snapshot(0));
        hub.subscribe(recorder(3, &log), &snapshot(0));
        log.lock().clear();

        let first = hub.broadcast(&snapshot(1));
        let second = hub.broadcast(&snapshot(2));

        assert_eq!(first, Delivery { delivered: 2, failed: 1 });
        assert_eq!(second, Delivery { delivered: 2, failed: 1 });
        assert_eq!(hub.len(), 3);
        assert_eq!(*log.lock(), vec![(1, 1), (3, 1), (1, 2), (3, 2)]);
    }

    #[test]
    fn test_panicking_observer_is_isolated() {
        let hub = SubscriptionHub::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let armed = Arc::new(AtomicUsize::new(0));

        hub.subscribe(recorder(1, &log), &snapshot(0));
        let trigger = armed.clone();
        hub.subscribe(
            observer_fn(move |_| {
                if trigger.load(Ordering::SeqCst) > 0 {
                    panic!("observer blew up");
                }
            }),
            &snapshot(0),
        );
        hub.subscribe(recorder(3, &log), &snapshot(0));
        log.lock().clear();
        armed.store(1, Ordering::SeqCst);

        let delivery = hub.broadcast(&snapshot(5));

        assert_eq!(delivery, Delivery { delivered: 2, failed: 1 });
        assert_eq!(*log.lock(), vec![(1, 5), (3, 5)]);
    }

    #[test]
    fn test_unsubscribe_is_idempotent() {
        let hub = SubscriptionHub::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let sub = hub.subscribe(recorder(1, &log), &snapshot(0));

        sub.unsubscribe();
        sub.unsubscribe();

        assert!(!sub.is_active());
        assert!(hub.is_empty());
        assert_eq!(hub.broadcast(&snapshot(1)).delivered, 0);
        assert_eq!(*log.lock(), vec![(1, 0)]);
    }

    #[test]
    fn test_unsubscribe_from_inside_callback() {
        let hub = SubscriptionHub::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let handle: Arc<OnceLock<Subscription>> = Arc::new(OnceLock::new());

        hub.subscribe(recorder(1, &log), &snapshot(0));
        let own = handle.clone();
        let own_log = log.clone();
        let sub = hub.subscribe(
            observer_fn(move |s| {
                own_log.lock().push((2, s.lifetime_count));
                if s.lifetime_count > 0 {
                    if let Some(sub) = own.get() {
                        sub.unsubscribe();
                    }
                }
            }),
            &snapshot(0),
        );
        let _ = handle.set(sub);
        hub.subscribe(recorder(3, &log), &snapshot(0));
        log.lock().clear();

        hub.broadcast(&snapshot(1));
        hub.broadcast(&snapshot(2));

        assert_eq!(*log.lock(), vec![(1, 1), (2, 1), (3, 1), (1, 2), (3, 2)]);
        assert_eq!(hub.len(), 2);
    }

    #[test]
    fn test_no_delivery_after_unsubscribe_returns_across_threads() {
        let hub = Arc::new(SubscriptionHub::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let late_calls = Arc::new(AtomicUsize::new(0));
        let unsubscribed = Arc::new(std::sync::atomic::AtomicBool::new(false));

        let seen_calls = calls.clone();
        let seen_late = late_calls.clone();
        let seen_flag = unsubscribed.clone();
        let sub = hub.subscribe(
            observer_fn(move |_| {
                if seen_flag.load(Ordering::SeqCst) {
                    seen_late.fetch_add(1, Ordering::SeqCst);
                }
                seen_calls.fetch_add(1, Ordering::SeqCst);
                std::thread::sleep(Duration::from_millis(1));
            }),
            &snapshot(0),
        );

        let broadcaster = {
            let hub = hub.clone();
            std::thread::spawn(move || {
                for i in 1..=200 {
                    hub.broadcast(&snapshot(i));
                }
            })
        };

        std::thread::sleep(Duration::from_millis(20));
        sub.unsubscribe();
        unsubscribed.store(true, Ordering::SeqCst);
        broadcaster.join().expect("broadcast thread panicked");

        assert!(calls.load(Ordering::SeqCst) >= 1);
        assert_eq!(late_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_clear_stops_all_deliveries() {
        let hub = SubscriptionHub::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let a = hub.subscribe(recorder(1, &log), &snapshot(0));
        let b = hub.subscribe(recorder(2, &log), &snapshot(0));

        hub.clear();

        assert!(hub.is_empty());
        assert!(!a.is_active());
        assert!(!b.is_active());
        assert_eq!(hub.broadcast(&snapshot(1)), Delivery::default());
        b.unsubscribe();
    }

    #[tokio::test]
    async fn test_channel_observer_forwards_and_reports_lag() {
        let hub = SubscriptionHub::new();
        let (observer, mut rx) = ChannelObserver::channel(2);
        hub.subscribe(Arc::new(observer), &snapshot(0));

        assert_eq!(hub.broadcast(&snapshot(1)).delivered, 1);
        let lagged = hub.broadcast(&snapshot(2));
        assert_eq!(lagged, Delivery { delivered: 0, failed: 1 });

        assert_eq!(rx.recv().await.unwrap().lifetime_count, 0);
        assert_eq!(rx.recv().await.unwrap().lifetime_count, 1);

        drop(rx);
        assert_eq!(hub.broadcast(&snapshot(3)).failed, 1);
        assert_eq!(hub.len(), 1);
    }

    #[test]
    fn test_numbered_broadcast_skips_what_catch_up_covered() {
        let hub = SubscriptionHub::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        let _early = hub.subscribe(recorder(1, &log), &snapshot(0));
        let _late = hub.subscribe_at(recorder(2, &log), &snapshot(2), 2);
        log.lock().clear();

        hub.broadcast_numbered(&snapshot(1), 1);
        hub.broadcast_numbered(&snapshot(2), 2);
        hub.broadcast_numbered(&snapshot(3), 3);

        assert_eq!(*log.lock(), vec![(1, 1), (1, 2), (1, 3), (2, 3)]);
    }
}
