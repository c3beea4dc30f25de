//! services/api/src/web/ws_handler.rs
//!
//! WebSocket watches. A customer watches one tracking code; staff watch every
//! order event. Each connection holds its own broadcast receiver, so closing the
//! socket is all it takes to cancel a watch.

use crate::web::{
    protocol::{ClientMessage, ServerMessage},
    state::AppState,
};
use axum::{
    extract::{
        ws::{Message, WebSocket},
        Path, State, WebSocketUpgrade,
    },
    response::Response,
    Extension,
};
use futures::{
    stream::{SplitSink, StreamExt},
    SinkExt,
};
use pickup_core::code::normalize_code;
use pickup_core::domain::Caller;
use pickup_core::tracker::TrackerError;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, error, info, warn};

type WsSender = SplitSink<WebSocket, Message>;

/// Serializes and sends one message. Returns `false` once the client is gone.
async fn send(sender: &mut WsSender, msg: &ServerMessage) -> bool {
    let json = match serde_json::to_string(msg) {
        Ok(json) => json,
        Err(e) => {
            error!("Failed to serialize server message: {:?}", e);
            return false;
        }
    };
    sender.send(Message::Text(json.into())).await.is_ok()
}

/// What the client sent, reduced to whether the watch should continue.
async fn handle_incoming(sender: &mut WsSender, incoming: Option<Result<Message, axum::Error>>) -> bool {
    match incoming {
        Some(Ok(Message::Text(text))) => match serde_json::from_str::<ClientMessage>(text.as_str()) {
            Ok(ClientMessage::Ping) => send(sender, &ServerMessage::Pong).await,
            Err(e) => {
                warn!("Ignoring malformed client message: {}", e);
                true
            }
        },
        Some(Ok(Message::Close(_))) | None => false,
        Some(Err(e)) => {
            debug!("WebSocket receive error: {:?}", e);
            false
        }
        Some(Ok(_)) => true,
    }
}

//=========================================================================================
// Customer Watch
//=========================================================================================

/// GET /track/{code}/ws - live status for one tracking code.
pub async fn track_ws_handler(
    ws: WebSocketUpgrade,
    State(app_state): State<Arc<AppState>>,
    Path(code): Path<String>,
) -> Response {
    let code = normalize_code(&code);
    ws.on_upgrade(move |socket| watch_code(socket, app_state, code))
}

async fn watch_code(socket: WebSocket, app_state: Arc<AppState>, code: String) {
    let (mut sender, mut receiver) = socket.split();

    // Subscribe before reading the snapshot so no change slips in between.
    let mut events = app_state.events.subscribe();

    let snapshot = match app_state.tracker.public_status(&code).await {
        Ok(public) => ServerMessage::from(public),
        Err(TrackerError::NotFound(_)) => {
            let msg = ServerMessage::Error {
                message: format!("No order with tracking code {}.", code),
            };
            let _ = send(&mut sender, &msg).await;
            return;
        }
        Err(e) => {
            error!(%code, "Failed to load tracking record: {:?}", e);
            let msg = ServerMessage::Error {
                message: "Failed to load order status.".to_string(),
            };
            let _ = send(&mut sender, &msg).await;
            return;
        }
    };
    if !send(&mut sender, &snapshot).await {
        return;
    }
    info!(%code, "Tracking watch started");

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => {
                    if let Some(msg) = ServerMessage::for_tracker(&event, &code) {
                        if !send(&mut sender, &msg).await {
                            break;
                        }
                    }
                }
                Err(RecvError::Lagged(missed)) => {
                    warn!(%code, missed, "Tracking watch lagged, resending snapshot");
                    if !send(&mut sender, &ServerMessage::Lagged { missed }).await {
                        break;
                    }
                    if let Ok(public) = app_state.tracker.public_status(&code).await {
                        if !send(&mut sender, &public.into()).await {
                            break;
                        }
                    }
                }
                Err(RecvError::Closed) => break,
            },
            incoming = receiver.next() => {
                if !handle_incoming(&mut sender, incoming).await {
                    break;
                }
            }
        }
    }

    info!(%code, "Tracking watch closed");
}

//=========================================================================================
// Staff Watch
//=========================================================================================

/// GET /orders/ws - every placed order and status change, for the staff board.
pub async fn staff_orders_ws_handler(
    ws: WebSocketUpgrade,
    State(app_state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
) -> Response {
    ws.on_upgrade(move |socket| watch_all(socket, app_state, caller))
}

async fn watch_all(socket: WebSocket, app_state: Arc<AppState>, caller: Caller) {
    let (mut sender, mut receiver) = socket.split();

    if !caller.is_staff() {
        let msg = ServerMessage::Error {
            message: "Staff access required.".to_string(),
        };
        let _ = send(&mut sender, &msg).await;
        return;
    }

    let mut events = app_state.events.subscribe();
    info!("Staff order watch started");

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => {
                    if !send(&mut sender, &ServerMessage::for_staff(event)).await {
                        break;
                    }
                }
                Err(RecvError::Lagged(missed)) => {
                    warn!(missed, "Staff order watch lagged");
                    if !send(&mut sender, &ServerMessage::Lagged { missed }).await {
                        break;
                    }
                }
                Err(RecvError::Closed) => break,
            },
            incoming = receiver.next() => {
                if !handle_incoming(&mut sender, incoming).await {
                    break;
                }
            }
        }
    }

    info!("Staff order watch closed");
}
