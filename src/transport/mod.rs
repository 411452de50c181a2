//! Transport boundary
//!
//! A transport turns an endpoint into a stream of notifications. Reconnect
//! and backoff belong to the transport; the feed only consumes the stream.

mod channel;
mod sse;

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::stream::BoxStream;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::task::JoinHandle;

use crate::types::TransportError;

pub use channel::{ChannelSender, ChannelTransport};
pub use sse::{parse_sse_frame, SseTransport, NEW_EVENT_NAME};

/// Notification delivered by a transport
#[derive(Debug, Clone, PartialEq)]
pub enum TransportNotice {
    /// The underlying connection was (re)established
    Connected,
    /// A "new event" payload, not yet decoded
    NewEvent(Value),
    /// The underlying connection dropped; the transport may retry
    Disconnected(String),
}

/// Stream of notifications for one opened endpoint
pub type NoticeStream = BoxStream<'static, TransportNotice>;

/// Something that can open a notification stream for an endpoint
pub trait Transport: Send + Sync {
    /// Short name for logs
    fn name(&self) -> &'static str;

    /// Open `endpoint`; errors only for problems detectable before streaming
    fn open(&self, endpoint: &str) -> Result<NoticeStream, TransportError>;
}

/// A live connection created by [`crate::FeedService::connect`]
pub struct FeedConnection {
    endpoint: String,
    transport: &'static str,
    open: Arc<AtomicBool>,
    pump: Mutex<Option<JoinHandle<()>>>,
}

impl FeedConnection {
    pub(crate) fn new(
        endpoint: impl Into<String>,
        transport: &'static str,
        open: Arc<AtomicBool>,
        pump: JoinHandle<()>,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            transport,
            open,
            pump: Mutex::new(Some(pump)),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn transport(&self) -> &'static str {
        self.transport
    }

    /// False once [`FeedConnection::close`] has run
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    /// Stop forwarding notifications and abort the pump task
    pub fn close(&self) {
        self.open.store(false, Ordering::SeqCst);
        if let Some(pump) = self.pump.lock().take() {
            pump.abort();
        }
    }
}

impl fmt::Debug for FeedConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FeedConnection")
            .field("endpoint", &self.endpoint)
            .field("transport", &self.transport)
            .field("open", &self.is_open())
            .finish()
    }
}
