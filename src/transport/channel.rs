//! In-process transport backed by a tokio channel
//!
//! Used by tests and by embedders that already receive events some other way
//! and just want to push them into a feed.

use futures::StreamExt;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use super::{NoticeStream, Transport, TransportNotice};
use crate::types::TransportError;

/// Transport whose notifications come from a [`ChannelSender`]
///
/// It can be opened once; the endpoint string is ignored.
#[derive(Debug)]
pub struct ChannelTransport {
    rx: Mutex<Option<mpsc::UnboundedReceiver<TransportNotice>>>,
}

/// Producer half of a [`ChannelTransport`]
#[derive(Debug, Clone)]
pub struct ChannelSender {
    tx: mpsc::UnboundedSender<TransportNotice>,
}

impl ChannelTransport {
    pub fn new() -> (Self, ChannelSender) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                rx: Mutex::new(Some(rx)),
            },
            ChannelSender { tx },
        )
    }
}

impl Transport for ChannelTransport {
    fn name(&self) -> &'static str {
        "channel"
    }

    fn open(&self, _endpoint: &str) -> Result<NoticeStream, TransportError> {
        let rx = self.rx.lock().take().ok_or_else(|| {
            TransportError::Unavailable("channel transport was already opened".to_string())
        })?;
        Ok(UnboundedReceiverStream::new(rx).boxed())
    }
}

impl ChannelSender {
    /// Send a raw notification; false once the stream is gone
    pub fn send(&self, notice: TransportNotice) -> bool {
        self.tx.send(notice).is_ok()
    }

    /// Send a "new event" payload
    pub fn send_event(&self, payload: Value) -> bool {
        self.send(TransportNotice::NewEvent(payload))
    }
}
