//! Server-Sent Events transport
//!
//! `GET <endpoint>` with `Accept: text/event-stream`. Each frame (separated by
//! a blank line) with event name `new_log`, or no event name, carries one JSON
//! event in its `data:` lines. When the response ends or the request fails the
//! stream yields `Disconnected` and reconnects with capped exponential backoff.

use async_stream::stream;
use futures::StreamExt;
use reqwest::header::ACCEPT;
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

use super::{NoticeStream, Transport, TransportNotice};
use crate::config::{FeedConfig, ReconnectPolicy};
use crate::types::TransportError;

/// SSE event name carrying new attendance events
pub const NEW_EVENT_NAME: &str = "new_log";

/// HTTP streaming transport
#[derive(Debug, Clone)]
pub struct SseTransport {
    client: reqwest::Client,
    reconnect: ReconnectPolicy,
}

impl SseTransport {
    pub fn new(reconnect: ReconnectPolicy) -> Self {
        Self {
            client: reqwest::Client::new(),
            reconnect,
        }
    }

    pub fn from_config(config: &FeedConfig) -> Self {
        Self::new(config.reconnect)
    }
}

impl Default for SseTransport {
    fn default() -> Self {
        Self::new(ReconnectPolicy::default())
    }
}

impl Transport for SseTransport {
    fn name(&self) -> &'static str {
        "sse"
    }

    fn open(&self, endpoint: &str) -> Result<NoticeStream, TransportError> {
        let url = Url::parse(endpoint).map_err(|e| TransportError::InvalidEndpoint {
            endpoint: endpoint.to_string(),
            reason: e.to_string(),
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(TransportError::InvalidEndpoint {
                endpoint: endpoint.to_string(),
                reason: format!("unsupported scheme '{}'", url.scheme()),
            });
        }

        let client = self.client.clone();
        let policy = self.reconnect;

        let notices = stream! {
            let mut delay = policy.initial_delay;
            loop {
                let response = client
                    .get(url.clone())
                    .header(ACCEPT, "text/event-stream")
                    .send()
                    .await
                    .and_then(|r| r.error_for_status());

                match response {
                    Ok(response) => {
                        delay = policy.initial_delay;
                        yield TransportNotice::Connected;

                        let mut body = response.bytes_stream();
                        let mut buffer: Vec<u8> = Vec::new();
                        let mut reason = "stream ended".to_string();

                        while let Some(chunk) = body.next().await {
                            match chunk {
                                Ok(bytes) => {
                                    buffer.extend(bytes.iter().copied().filter(|b| *b != b'\r'));
                                    while let Some(frame) = take_frame(&mut buffer) {
                                        if let Some(notice) = parse_sse_frame(&frame) {
                                            yield notice;
                                        }
                                    }
                                }
                                Err(e) => {
                                    reason = e.to_string();
                                    break;
                                }
                            }
                        }

                        yield TransportNotice::Disconnected(reason);
                    }
                    Err(e) => {
                        yield TransportNotice::Disconnected(e.to_string());
                    }
                }

                debug!(delay_ms = delay.as_millis() as u64, "reconnecting sse transport");
                tokio::time::sleep(delay).await;
                delay = policy.next_delay(delay);
            }
        };

        Ok(notices.boxed())
    }
}

/// Split the first complete frame off `buffer`
fn take_frame(buffer: &mut Vec<u8>) -> Option<String> {
    let pos = buffer.windows(2).position(|w| w == b"\n\n")?;
    let frame: Vec<u8> = buffer.drain(..pos + 2).collect();
    Some(String::from_utf8_lossy(&frame[..pos]).into_owned())
}

/// Parse one SSE frame into a notice
///
/// Frames for other event names, comment-only frames and frames whose data is
/// not JSON produce `None`.
pub fn parse_sse_frame(frame: &str) -> Option<TransportNotice> {
    let mut event_name = "message";
    let mut data: Vec<&str> = Vec::new();

    for line in frame.lines() {
        if line.starts_with(':') {
            continue;
        }
        let (field, value) = line.split_once(':').unwrap_or((line, ""));
        let value = value.strip_prefix(' ').unwrap_or(value);
        match field {
            "event" => event_name = value,
            "data" => data.push(value),
            _ => {}
        }
    }

    if data.is_empty() || (event_name != NEW_EVENT_NAME && event_name != "message") {
        return None;
    }

    let payload = data.join("\n");
    match serde_json::from_str::<Value>(&payload) {
        Ok(value) => Some(TransportNotice::NewEvent(value)),
        Err(e) => {
            warn!(error = %e, "dropping sse frame with invalid json");
            None
        }
    }
}
