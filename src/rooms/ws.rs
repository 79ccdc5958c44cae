use std::sync::Arc;

use axum::{
    debug_handler,
    extract::{Path, State, WebSocketUpgrade, ws::{Message, WebSocket}},
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use sqlx::SqlitePool;
use tokio::sync::mpsc;

use crate::registry::{ConnectionRegistry, SEND_QUEUE};
use crate::rooms::msg;

#[debug_handler(state = crate::AppState)]
pub(crate) async fn room_ws(
    Path((room_id, user_id)): Path<(i64, i64)>,
    State(db_pool): State<SqlitePool>,
    State(registry): State<Arc<ConnectionRegistry>>,

    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, room_id, user_id, db_pool, registry))
}

async fn handle_socket(
    socket: WebSocket,
    room_id: i64,
    user_id: i64,
    db_pool: SqlitePool,
    registry: Arc<ConnectionRegistry>,
) {
    let (tx, mut rx) = mpsc::channel(SEND_QUEUE);
    let Some(handle_id) = registry.connect(room_id, tx).await else {
        // room is full; dropping the socket closes it without touching the pair
        tracing::debug!(room_id, user_id, "room at capacity, refusing socket");
        return;
    };
    tracing::debug!(room_id, user_id, handle_id, "socket joined room");

    let (mut sender, mut receiver) = socket.split();

    let writer = tokio::spawn(async move {
        while let Some(payload) = rx.recv().await {
            if sender.send(payload.into()).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(frame)) = receiver.next().await {
        let Message::Text(body) = frame else {
            continue;
        };
        let body = body.trim();
        if body.is_empty() {
            continue;
        }

        if let Err(err) = msg::send_chat(&db_pool, &registry, room_id, user_id, body).await {
            // nothing was broadcast; the sender can retry once storage recovers
            tracing::error!(room_id, user_id, error = %err.0, "failed to persist chat");
        }
    }

    registry.disconnect(room_id, handle_id).await;
    writer.abort();
    tracing::debug!(room_id, user_id, handle_id, "socket left room");
}
