//! WebSocket connection handler

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use tracing::{debug, info};

use super::events::{ClientMessage, ServerMessage};
use super::state::AppState;
use crate::feed::ChannelObserver;

/// WebSocket upgrade handler
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handle an individual WebSocket connection
///
/// The connection is one feed observer: the first snapshot it forwards is the
/// catch-up snapshot, then one per change. Slow clients skip snapshots rather
/// than stalling the feed; the next snapshot they get is complete anyway.
async fn handle_socket(mut socket: WebSocket, state: Arc<AppState>) {
    let (observer, mut rx) = ChannelObserver::channel(state.observer_buffer);
    let subscription = state.feed.subscribe(Arc::new(observer));
    info!(subscriber = subscription.id(), "dashboard client connected");

    loop {
        tokio::select! {
            snapshot = rx.recv() => {
                match snapshot {
                    Some(feed) => {
                        if send_message(&mut socket, &ServerMessage::Snapshot { feed }).await.is_err() {
                            break;
                        }
                    }
                    // Feed was torn down
                    None => break,
                }
            }

            result = socket.recv() => {
                match result {
                    Some(Ok(msg)) => {
                        if !handle_client_message(msg, &mut socket, &state).await {
                            break;
                        }
                    }
                    Some(Err(e)) => {
                        debug!(error = %e, "websocket receive failed");
                        break;
                    }
                    None => break,
                }
            }
        }
    }

    subscription.unsubscribe();
    info!(subscriber = subscription.id(), "dashboard client disconnected");
}

async fn send_message(socket: &mut WebSocket, msg: &ServerMessage) -> Result<(), axum::Error> {
    match serde_json::to_string(msg) {
        Ok(json) => socket.send(Message::Text(json)).await,
        Err(e) => {
            debug!(error = %e, "failed to encode server message");
            Ok(())
        }
    }
}

/// Handle a message from the client
/// Returns false if the connection should be closed
async fn handle_client_message(msg: Message, socket: &mut WebSocket, state: &AppState) -> bool {
    match msg {
        Message::Text(text) => {
            let reply = match serde_json::from_str::<ClientMessage>(&text) {
                Ok(client_msg) => apply_client_message(client_msg, state),
                Err(e) => Some(ServerMessage::error("bad_request", e.to_string())),
            };
            match reply {
                Some(reply) => send_message(socket, &reply).await.is_ok(),
                None => true,
            }
        }
        Message::Binary(_) => true,
        Message::Ping(data) => socket.send(Message::Pong(data)).await.is_ok(),
        Message::Pong(_) => true,
        Message::Close(_) => false,
    }
}

/// Run a control message against the feed; returns a direct reply if any
///
/// Load control replies arrive as the snapshot broadcast it triggers.
fn apply_client_message(msg: ClientMessage, state: &AppState) -> Option<ServerMessage> {
    match msg {
        ClientMessage::StartLoad { rate } => {
            state.start_load(rate);
            None
        }
        ClientMessage::StopLoad => {
            state.feed.stop_load();
            None
        }
        ClientMessage::ResetGenerated => {
            state.feed.reset_generated_counter();
            None
        }
        ClientMessage::Ping => Some(ServerMessage::Pong),
    }
}
