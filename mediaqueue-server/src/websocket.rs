//! Websocket upgrade endpoint (spec §6): the one piece of HTTP surface
//! this implementation exposes directly. Each connection is a one-way
//! fan-out of `BroadcastBus` frames — there is no client-to-server
//! command surface, matching the donor's split between a thin upgrade
//! handler (`handlers/handle_websocket.rs`) and its connection registry,
//! simplified here since this socket carries no inbound protocol.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use futures_util::{SinkExt, StreamExt};

use crate::AppState;

pub async fn upgrade(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| forward(socket, state))
}

async fn forward(socket: WebSocket, state: AppState) {
    let mut rx = state.peers.register().await;
    let (mut sender, mut receiver) = socket.split();

    let outbound = tokio::spawn(async move {
        while let Some(frame_json) = rx.recv().await {
            if sender.send(Message::Text(frame_json.into())).await.is_err() {
                break;
            }
        }
    });

    // No inbound protocol; just drain until the peer closes or errors so
    // the connection's read half doesn't block cleanup.
    while let Some(message) = receiver.next().await {
        match message {
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(error = %e, "websocket receive error");
                break;
            }
        }
    }

    outbound.abort();
}
