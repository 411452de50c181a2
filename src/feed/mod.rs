//! Feed service - rolling window, fan-out and load generator
//!
//! [`FeedService`] is the single entry point for every mutation: transport
//! payloads, synthetic ticks and load control all go through it, and every
//! change is followed by a broadcast of a fresh [`Snapshot`].
//!
//! Locking:
//! - `dispatch` (re-entrant) is held across each apply + broadcast so
//!   observers see snapshots in apply order. It is re-entrant so an observer
//!   can call back into the service from its own callback.
//! - A snapshot published while a fan-out is already running on this thread
//!   is queued and delivered by the outermost publisher once the current
//!   fan-out is done, so every observer sees `lifetime_count` in order.
//! - `store` and `load` are held only while reading or mutating state, never
//!   while an observer runs.

mod generator;
mod hub;
mod ingress;
mod store;

use std::cell::RefCell;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use chrono::Local;
use futures::StreamExt;
use parking_lot::{Mutex, ReentrantMutex, ReentrantMutexGuard};
use serde_json::Value;
use tokio::runtime::Handle;
use tracing::{debug, error, info, warn};

use crate::config::FeedConfig;
use crate::transport::{FeedConnection, NoticeStream, SseTransport, Transport, TransportNotice};
use crate::types::{AttendanceEvent, FeedError, FeedResult, GeneratorState, Snapshot};

pub use generator::{status_for_sample, tick_period, LoadTask, SyntheticEvents, ROSTER};
pub use hub::{
    observer_fn, ChannelObserver, Delivery, Observer, SubscriberId, Subscription, SubscriptionHub,
};

use hub::Sequence;
pub use ingress::decode_event;
pub use store::RollingStore;

/// Generator state plus the task driving it
#[derive(Debug, Default)]
struct LoadSlot {
    state: GeneratorState,
    task: Option<LoadTask>,
    /// Bumped on every start/stop; ticks from an older epoch are ignored
    epoch: u64,
}

/// Snapshots waiting for the running fan-out to finish
#[derive(Debug, Default)]
struct Outbox {
    draining: bool,
    /// Number of the last published snapshot
    last_seq: Sequence,
    pending: VecDeque<(Sequence, Snapshot)>,
}

impl Outbox {
    /// Claim the drain; false when a fan-out further up the stack owns it
    fn claim(&mut self) -> bool {
        !std::mem::replace(&mut self.draining, true)
    }
}

type Turn<'a> = ReentrantMutexGuard<'a, RefCell<Outbox>>;

struct FeedInner {
    config: FeedConfig,
    store: Mutex<RollingStore>,
    hub: SubscriptionHub,
    load: Mutex<LoadSlot>,
    dispatch: ReentrantMutex<RefCell<Outbox>>,
    connection: Mutex<Option<Arc<FeedConnection>>>,
    transport: Arc<dyn Transport>,
    runtime: Option<Handle>,
}

/// Live attendance feed
///
/// Cheap to clone; clones share the same window, observers and generator.
#[derive(Clone)]
pub struct FeedService {
    inner: Arc<FeedInner>,
}

impl FeedService {
    /// Create a feed using the SSE transport
    pub fn new(config: FeedConfig) -> Self {
        let transport = Arc::new(SseTransport::from_config(&config));
        Self::with_transport(config, transport)
    }

    /// Create a feed with an explicit transport
    ///
    /// The tokio runtime current at construction drives the load generator
    /// and the transport pump; without one, `connect` fails and `start_load`
    /// leaves the generator stopped.
    pub fn with_transport(config: FeedConfig, transport: Arc<dyn Transport>) -> Self {
        let store = RollingStore::new(config.window_capacity);
        Self {
            inner: Arc::new(FeedInner {
                config,
                store: Mutex::new(store),
                hub: SubscriptionHub::new(),
                load: Mutex::new(LoadSlot::default()),
                dispatch: ReentrantMutex::new(RefCell::new(Outbox::default())),
                connection: Mutex::new(None),
                transport,
                runtime: Handle::try_current().ok(),
            }),
        }
    }

    pub fn config(&self) -> &FeedConfig {
        &self.inner.config
    }

    // Ingress

    /// Open the transport for `endpoint`, or return the existing connection
    pub fn connect(&self, endpoint: &str) -> FeedResult<Arc<FeedConnection>> {
        let mut slot = self.inner.connection.lock();
        if let Some(existing) = slot.as_ref() {
            if existing.endpoint() != endpoint {
                warn!(
                    current = existing.endpoint(),
                    requested = endpoint,
                    "already connected, ignoring new endpoint"
                );
            }
            return Ok(existing.clone());
        }

        let runtime = self
            .inner
            .runtime
            .clone()
            .ok_or(FeedError::NoRuntime("the transport connection"))?;
        let notices = self.inner.transport.open(endpoint)?;

        let open = Arc::new(AtomicBool::new(true));
        let pump = runtime.spawn(pump_notices(
            Arc::downgrade(&self.inner),
            open.clone(),
            notices,
        ));
        let connection = Arc::new(FeedConnection::new(
            endpoint,
            self.inner.transport.name(),
            open,
            pump,
        ));

        info!(endpoint, transport = connection.transport(), "feed connected");
        *slot = Some(connection.clone());
        Ok(connection)
    }

    /// Apply a well-formed event and broadcast the result
    pub fn record(&self, event: AttendanceEvent) -> Snapshot {
        let _turn = self.inner.dispatch.lock();
        self.inner.apply_and_broadcast(event)
    }

    /// Decode a raw transport payload and record it; rejected payloads are dropped
    pub fn ingest(&self, payload: Value) -> Option<Snapshot> {
        self.inner.ingest(payload, None)
    }

    // Subscriptions

    /// Register an observer; it receives the current snapshot before this returns
    pub fn subscribe(&self, observer: Arc<dyn Observer>) -> Subscription {
        let turn = self.inner.dispatch.lock();
        let (joined_at, owns_drain) = {
            let mut outbox = turn.borrow_mut();
            (outbox.last_seq, outbox.claim())
        };

        let current = self.inner.current_snapshot();
        let subscription = self.inner.hub.subscribe_at(observer, &current, joined_at);
        if owns_drain {
            self.inner.drain(&turn);
        }
        subscription
    }

    /// Register a closure as an observer
    pub fn subscribe_fn<F>(&self, f: F) -> Subscription
    where
        F: Fn(&Snapshot) + Send + Sync + 'static,
    {
        self.subscribe(observer_fn(f))
    }

    // Synthetic load

    /// Start emitting synthetic events at `rate_per_second`
    ///
    /// A running load is stopped first. A rate of zero stops the load.
    pub fn start_load(&self, rate_per_second: u32) {
        let _turn = self.inner.dispatch.lock();

        if rate_per_second == 0 {
            warn!("load rate of zero requested, stopping load instead");
            self.inner.halt_load();
            self.inner.broadcast_current();
            return;
        }

        let Some(runtime) = self.inner.runtime.clone() else {
            error!(rate_per_second, "cannot start load without a tokio runtime");
            self.inner.halt_load();
            self.inner.broadcast_current();
            return;
        };

        {
            let mut slot = self.inner.load.lock();
            if let Some(task) = slot.task.take() {
                task.cancel();
            }
            slot.epoch += 1;
            slot.state = GeneratorState::started(rate_per_second);

            let epoch = slot.epoch;
            let feed = Arc::downgrade(&self.inner);
            let mut source = SyntheticEvents::from_optional_seed(self.inner.config.load_seed);
            let period = tick_period(rate_per_second);
            slot.task = Some(LoadTask::spawn(&runtime, period, move || {
                match feed.upgrade() {
                    Some(inner) => inner.tick(epoch, &mut source),
                    None => false,
                }
            }));
            info!(rate_per_second, period_ms = period.as_millis() as u64, "synthetic load started");
        }

        self.inner.broadcast_current();
    }

    /// Stop the synthetic load; always broadcasts the (stopped) state
    pub fn stop_load(&self) {
        let _turn = self.inner.dispatch.lock();
        if self.inner.halt_load() {
            info!("synthetic load stopped");
        }
        self.inner.broadcast_current();
    }

    /// Zero the generated counter without touching anything else
    pub fn reset_generated_counter(&self) {
        let _turn = self.inner.dispatch.lock();
        self.inner.load.lock().state.generated_count = 0;
        self.inner.broadcast_current();
    }

    // Lifecycle

    /// Close the connection, drop all observers and clear the window
    ///
    /// The service can be reused afterwards.
    pub fn teardown(&self) {
        let _turn = self.inner.dispatch.lock();

        if let Some(connection) = self.inner.connection.lock().take() {
            connection.close();
            info!(endpoint = connection.endpoint(), "feed connection closed");
        }
        self.inner.hub.clear();
        self.inner.halt_load();
        self.inner.load.lock().state = GeneratorState::default();
        self.inner.store.lock().reset();
        info!("feed torn down");
    }

    // Accessors

    /// Current window, counters and generator state
    pub fn snapshot(&self) -> Snapshot {
        self.inner.current_snapshot()
    }

    pub fn events(&self) -> Vec<AttendanceEvent> {
        self.inner.store.lock().current_snapshot().events
    }

    pub fn lifetime_count(&self) -> u64 {
        self.inner.store.lock().lifetime_count()
    }

    pub fn generator_state(&self) -> GeneratorState {
        self.inner.load.lock().state
    }

    pub fn is_load_running(&self) -> bool {
        self.inner.load.lock().state.running
    }

    pub fn is_connected(&self) -> bool {
        self.inner
            .connection
            .lock()
            .as_ref()
            .is_some_and(|c| c.is_open())
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.hub.len()
    }
}

impl FeedInner {
    /// Store snapshot merged with the generator state
    fn current_snapshot(&self) -> Snapshot {
        let generator = self.load.lock().state;
        self.store.lock().current_snapshot().with_generator(generator)
    }

    /// Caller holds `dispatch`
    fn apply_and_broadcast(&self, event: AttendanceEvent) -> Snapshot {
        let generator = self.load.lock().state;
        let snapshot = self.store.lock().apply(event).with_generator(generator);
        self.publish(snapshot.clone());
        snapshot
    }

    /// Caller holds `dispatch`
    fn broadcast_current(&self) {
        self.publish(self.current_snapshot());
    }

    /// Number `snapshot` and fan it out, or queue it behind a running fan-out
    fn publish(&self, snapshot: Snapshot) {
        let turn = self.dispatch.lock();
        let owns_drain = {
            let mut outbox = turn.borrow_mut();
            outbox.last_seq += 1;
            let seq = outbox.last_seq;
            outbox.pending.push_back((seq, snapshot));
            outbox.claim()
        };
        if owns_drain {
            self.drain(&turn);
        }
    }

    /// Deliver queued snapshots in order, including any queued meanwhile
    fn drain(&self, turn: &Turn<'_>) {
        loop {
            let next = turn.borrow_mut().pending.pop_front();
            let Some((seq, snapshot)) = next else {
                break;
            };
            self.hub.broadcast_numbered(&snapshot, seq);
        }
        turn.borrow_mut().draining = false;
    }

    /// Cancel the load task; returns whether it was running. Caller holds `dispatch`
    fn halt_load(&self) -> bool {
        let mut slot = self.load.lock();
        slot.epoch += 1;
        if let Some(task) = slot.task.take() {
            task.cancel();
        }
        let was_running = slot.state.running;
        slot.state.running = false;
        slot.state.rate_per_second = 0;
        was_running
    }

    /// One generator tick; false once the load has moved on
    fn tick(&self, epoch: u64, source: &mut SyntheticEvents) -> bool {
        let _turn = self.dispatch.lock();

        let generator = {
            let mut slot = self.load.lock();
            if slot.epoch != epoch || !slot.state.running {
                return false;
            }
            slot.state.generated_count += 1;
            slot.state
        };

        let event = source.next_event(&Local::now());
        let snapshot = self.store.lock().apply(event).with_generator(generator);
        self.publish(snapshot);
        true
    }

    /// Decode and record; with `open`, only while that connection is open
    fn ingest(&self, payload: Value, open: Option<&AtomicBool>) -> Option<Snapshot> {
        let event = match decode_event(payload, self.config.validation) {
            Ok(event) => event,
            Err(e) => {
                warn!(error = %e, "dropping inbound event");
                return None;
            }
        };

        let _turn = self.dispatch.lock();
        if open.is_some_and(|open| !open.load(Ordering::SeqCst)) {
            return None;
        }
        Some(self.apply_and_broadcast(event))
    }
}

impl Drop for FeedInner {
    fn drop(&mut self) {
        if let Some(connection) = self.connection.get_mut().take() {
            connection.close();
        }
        if let Some(task) = self.load.get_mut().task.take() {
            task.cancel();
        }
    }
}

async fn pump_notices(feed: Weak<FeedInner>, open: Arc<AtomicBool>, mut notices: NoticeStream) {
    while let Some(notice) = notices.next().await {
        let Some(inner) = feed.upgrade() else {
            break;
        };
        if !open.load(Ordering::SeqCst) {
            break;
        }

        match notice {
            TransportNotice::Connected => info!("transport connected"),
            TransportNotice::NewEvent(payload) => {
                inner.ingest(payload, Some(open.as_ref()));
            }
            TransportNotice::Disconnected(reason) => {
                warn!(%reason, "transport disconnected, waiting for it to recover")
            }
        }
    }
    debug!("transport notice stream ended");
}
