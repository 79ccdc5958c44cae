use std::sync::Arc;

use axum::{Json, debug_handler, extract::State};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use crate::{AppResult, Envelope, db, registry::ConnectionRegistry};

/// Fixed page size for backward pagination.
const PAGE_SIZE: i64 = 30;

/// Frame pushed to every live socket in the room after a chat is persisted.
#[derive(Serialize)]
struct ChatFrame<'a> {
    user_id: i64,
    #[serde(rename = "chatRoom_id")]
    chat_room_id: i64,
    chat_id: i64,
    content: &'a str,
}

#[derive(Serialize, sqlx::FromRow)]
pub(crate) struct ChatRow {
    pub id: i64,
    pub user_id: i64,
    pub contents: String,
    pub date: String,
}

/// Persists a chat and returns its server-assigned id and timestamp. Ids
/// come from the database alone and are strictly increasing, which makes
/// them both the sort key and the read-pointer unit.
pub(crate) async fn append(
    db_pool: &SqlitePool,
    room_id: i64,
    user_id: i64,
    contents: &str,
) -> AppResult<(i64, String)> {
    let date = db::kst_now()?;
    let (chat_id,): (i64,) = sqlx::query_as(
        "INSERT INTO chats (chat_room_id,user_id,contents,date) VALUES (?,?,?,?) RETURNING id",
    )
    .bind(room_id)
    .bind(user_id)
    .bind(contents)
    .bind(&date)
    .fetch_one(db_pool)
    .await?;
    Ok((chat_id, date))
}

/// The one delivery path live clients have: append durably, then fan out
/// the persisted frame. A failed append aborts before any socket sees it.
pub(crate) async fn send_chat(
    db_pool: &SqlitePool,
    registry: &ConnectionRegistry,
    room_id: i64,
    user_id: i64,
    contents: &str,
) -> AppResult<i64> {
    let _order = registry.order_lock(room_id).await;
    let (chat_id, _date) = append(db_pool, room_id, user_id, contents).await?;
    let frame = serde_json::to_string(&ChatFrame {
        user_id,
        chat_room_id: room_id,
        chat_id,
        content: contents,
    })?;
    registry.broadcast(room_id, &frame).await;
    Ok(chat_id)
}

#[derive(Deserialize)]
pub(crate) struct ChatSendRequest {
    #[serde(rename = "chatRoom_id")]
    chat_room_id: i64,
    user_id: i64,
    contents: String,
}

#[derive(Serialize)]
pub(crate) struct ChatCreated {
    chat_id: i64,
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn post_chat(
    State(db_pool): State<SqlitePool>,
    State(registry): State<Arc<ConnectionRegistry>>,
    Json(req): Json<ChatSendRequest>,
) -> AppResult<Json<Envelope<ChatCreated>>> {
    let chat_id = send_chat(&db_pool, &registry, req.chat_room_id, req.user_id, &req.contents).await?;
    Ok(Json(Envelope {
        data: ChatCreated { chat_id },
        total_count: 0,
    }))
}

#[derive(Deserialize)]
pub(crate) struct PageRequest {
    #[serde(rename = "chatRoom_id")]
    chat_room_id: i64,
    #[serde(rename = "lastChat_id")]
    last_chat_id: Option<i64>,
}

/// Scans newest-first so the LIMIT does the bounding, then flips the page
/// back to chronological order for the caller.
pub(crate) async fn page_rows(
    db_pool: &SqlitePool,
    room_id: i64,
    before_id: Option<i64>,
) -> AppResult<Vec<ChatRow>> {
    let mut rows: Vec<ChatRow> = match before_id {
        None => {
            sqlx::query_as(
                "SELECT id,user_id,contents,date FROM chats
                 WHERE chat_room_id=? ORDER BY id DESC LIMIT ?",
            )
            .bind(room_id)
            .bind(PAGE_SIZE)
            .fetch_all(db_pool)
            .await?
        }
        Some(before_id) => {
            sqlx::query_as(
                "SELECT id,user_id,contents,date FROM chats
                 WHERE chat_room_id=? AND id<? ORDER BY id DESC LIMIT ?",
            )
            .bind(room_id)
            .bind(before_id)
            .bind(PAGE_SIZE)
            .fetch_all(db_pool)
            .await?
        }
    };
    rows.reverse();
    Ok(rows)
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn page(
    State(db_pool): State<SqlitePool>,
    Json(req): Json<PageRequest>,
) -> AppResult<Json<Envelope<Vec<ChatRow>>>> {
    let rows = page_rows(&db_pool, req.chat_room_id, req.last_chat_id).await?;
    Ok(Json(Envelope {
        data: rows,
        total_count: 0,
    }))
}

/// Latest message in a room, if any. Feeds the inbox preview line.
pub(crate) async fn latest(
    db_pool: &SqlitePool,
    room_id: i64,
) -> AppResult<Option<(String, String)>> {
    Ok(sqlx::query_as(
        "SELECT contents,date FROM chats WHERE chat_room_id=? ORDER BY id DESC LIMIT 1",
    )
    .bind(room_id)
    .fetch_optional(db_pool)
    .await?)
}
