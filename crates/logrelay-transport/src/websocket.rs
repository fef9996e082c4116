//! WebSocket subscription endpoint.

use axum::{
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};

use crate::RelayState;

/// WebSocket upgrade handler.
///
/// Use this as an Axum route handler.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<RelayState>) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: RelayState) {
    let (mut sender, mut receiver) = socket.split();
    let (mut conn, mut outbound) = state.relay.connect();
    let subscriber = conn.id();

    // Forward queued messages to the socket
    let send_task = tokio::spawn(async move {
        while let Some(msg) = outbound.recv().await {
            let json = match serde_json::to_string(&msg) {
                Ok(j) => j,
                Err(e) => {
                    tracing::error!("Failed to serialize message: {e}");
                    continue;
                }
            };
            if sender.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
    });

    loop {
        let next = tokio::select! {
            () = conn.evicted() => {
                tracing::warn!(%subscriber, "Subscriber evicted, closing socket");
                break;
            }
            next = receiver.next() => next,
        };

        let text = match next {
            Some(Ok(Message::Text(text))) => text,
            Some(Ok(Message::Binary(data))) => match String::from_utf8(data.to_vec()) {
                Ok(s) => s.into(),
                Err(_) => continue,
            },
            Some(Ok(Message::Close(_))) | None => break,
            Some(Ok(_)) => continue,
            Some(Err(e)) => {
                tracing::error!(%subscriber, "WebSocket error: {e}");
                break;
            }
        };

        // Rejections are answered on the socket and logged by the relay.
        let _ = state.relay.handle_message(&mut conn, text.as_str());
    }

    state.relay.unsubscribe(&mut conn);
    send_task.abort();
}
