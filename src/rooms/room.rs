use axum::{Json, debug_handler, extract::State, http::StatusCode, response::{IntoResponse, Response}};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use crate::{AppResult, Envelope};

use super::{msg, read};

#[derive(Deserialize)]
pub(crate) struct CreateRoomRequest {
    user_id_1: i64,
    user_id_2: i64,
    party_id: i64,
}

#[derive(Serialize)]
pub(crate) struct RoomCreated {
    #[serde(rename = "chatRoom_id")]
    chat_room_id: i64,
}

/// Looks up or creates the room for an unordered user pair. The pair is
/// normalized to (low, high) before it touches the table, so (a,b) and
/// (b,a) always resolve to the same row; the unique index makes concurrent
/// creates collapse onto one room.
pub(crate) async fn get_or_create(
    db_pool: &SqlitePool,
    party_id: i64,
    user_a: i64,
    user_b: i64,
) -> AppResult<i64> {
    let (user_low, user_high) = if user_a < user_b {
        (user_a, user_b)
    } else {
        (user_b, user_a)
    };

    sqlx::query(
        "INSERT INTO chat_rooms (party_id,user_low,user_high) VALUES (?,?,?)
         ON CONFLICT(party_id,user_low,user_high) DO NOTHING",
    )
    .bind(party_id)
    .bind(user_low)
    .bind(user_high)
    .execute(db_pool)
    .await?;

    let (room_id,): (i64,) =
        sqlx::query_as("SELECT id FROM chat_rooms WHERE party_id=? AND user_low=? AND user_high=?")
            .bind(party_id)
            .bind(user_low)
            .bind(user_high)
            .fetch_one(db_pool)
            .await?;
    Ok(room_id)
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn create_room(
    State(db_pool): State<SqlitePool>,
    Json(req): Json<CreateRoomRequest>,
) -> AppResult<Response> {
    if req.user_id_1 == req.user_id_2 {
        return Ok((StatusCode::BAD_REQUEST, "a room needs two distinct users").into_response());
    }

    let chat_room_id = get_or_create(&db_pool, req.party_id, req.user_id_1, req.user_id_2).await?;
    Ok(Json(Envelope {
        data: RoomCreated { chat_room_id },
        total_count: 0,
    })
    .into_response())
}

#[derive(Deserialize)]
pub(crate) struct ListRoomsRequest {
    party_id: i64,
    user_id: i64,
}

#[derive(Serialize)]
pub(crate) struct InboxRow {
    id: i64,
    user_id_2: i64,
    gender: Option<bool>,
    team: Option<i64>,
    name: Option<String>,
    contents: String,
    date: String,
    #[serde(rename = "unreadCount")]
    unread_count: i64,
}

/// Inbox view: every room the user sits in, with the other member's card,
/// the latest message preview and the caller's unread badge.
#[debug_handler(state = crate::AppState)]
pub(crate) async fn list_for_user(
    State(db_pool): State<SqlitePool>,
    Json(req): Json<ListRoomsRequest>,
) -> AppResult<Json<Envelope<Option<Vec<InboxRow>>>>> {
    let rooms: Vec<(i64, i64, i64)> = sqlx::query_as(
        "SELECT id,user_low,user_high FROM chat_rooms
         WHERE party_id=? AND (user_low=? OR user_high=?)",
    )
    .bind(req.party_id)
    .bind(req.user_id)
    .bind(req.user_id)
    .fetch_all(&db_pool)
    .await?;

    let mut response = Vec::with_capacity(rooms.len());
    for (room_id, user_low, user_high) in rooms {
        let other_id = if user_low == req.user_id { user_high } else { user_low };

        let other: Option<(Option<String>, bool, Option<i64>)> =
            sqlx::query_as("SELECT name,gender,team FROM users WHERE id=?")
                .bind(other_id)
                .fetch_optional(&db_pool)
                .await?;
        let (name, gender, team) = match other {
            Some((name, gender, team)) => (name, Some(gender), team),
            None => (None, None, None),
        };

        let (contents, date) = msg::latest(&db_pool, room_id).await?.unwrap_or_default();
        let unread_count = read::unread_count(&db_pool, room_id, req.user_id).await?;

        response.push(InboxRow {
            id: room_id,
            user_id_2: other_id,
            gender,
            team,
            name,
            contents,
            date,
            unread_count,
        });
    }

    let total_count = response.len();
    Ok(Json(Envelope {
        data: if response.is_empty() { None } else { Some(response) },
        total_count,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;

    #[tokio::test]
    async fn room_key_is_canonical() {
        let db_pool = test_pool().await;

        let ab = get_or_create(&db_pool, 1, 10, 20).await.unwrap();
        let ba = get_or_create(&db_pool, 1, 20, 10).await.unwrap();
        assert_eq!(ab, ba);

        let again = get_or_create(&db_pool, 1, 10, 20).await.unwrap();
        assert_eq!(ab, again);

        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM chat_rooms")
            .fetch_one(&db_pool)
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn same_pair_in_another_party_gets_its_own_room() {
        let db_pool = test_pool().await;

        let first = get_or_create(&db_pool, 1, 10, 20).await.unwrap();
        let second = get_or_create(&db_pool, 2, 10, 20).await.unwrap();
        assert_ne!(first, second);
    }
}
