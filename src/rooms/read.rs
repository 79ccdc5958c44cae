use axum::{Json, debug_handler, extract::State};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use crate::{AppResult, db};

#[derive(Deserialize)]
pub(crate) struct MarkReadRequest {
    #[serde(rename = "chatRoom_id")]
    chat_room_id: i64,
    user_id: i64,
    #[serde(rename = "lastReadChat_id")]
    last_read_chat_id: Option<i64>,
}

#[derive(Serialize)]
pub(crate) struct MarkReadResponse {
    msg: &'static str,
}

/// One atomic upsert per (room, user). The pointer is allowed to move
/// backward; callers send whatever id is on their screen.
pub(crate) async fn upsert_pointer(
    db_pool: &SqlitePool,
    room_id: i64,
    user_id: i64,
    last_read_chat_id: Option<i64>,
) -> AppResult<()> {
    sqlx::query(
        "INSERT INTO chat_read_status (chat_room_id,user_id,last_read_chat_id,date)
         VALUES (?,?,?,?)
         ON CONFLICT(chat_room_id,user_id)
         DO UPDATE SET last_read_chat_id=excluded.last_read_chat_id, date=excluded.date",
    )
    .bind(room_id)
    .bind(user_id)
    .bind(last_read_chat_id)
    .bind(db::kst_now()?)
    .execute(db_pool)
    .await?;
    Ok(())
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn mark_read(
    State(db_pool): State<SqlitePool>,
    Json(req): Json<MarkReadRequest>,
) -> AppResult<Json<MarkReadResponse>> {
    upsert_pointer(&db_pool, req.chat_room_id, req.user_id, req.last_read_chat_id).await?;
    Ok(Json(MarkReadResponse { msg: "ok" }))
}

/// Messages past the user's pointer, minus anything they wrote themselves.
/// A missing pointer row (or a null pointer) means nothing was read yet.
pub(crate) async fn unread_count(
    db_pool: &SqlitePool,
    room_id: i64,
    user_id: i64,
) -> AppResult<i64> {
    let (count,): (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM chats
         WHERE chat_room_id=?
           AND user_id!=?
           AND id > COALESCE(
               (SELECT last_read_chat_id FROM chat_read_status
                WHERE chat_room_id=? AND user_id=?),
               0)",
    )
    .bind(room_id)
    .bind(user_id)
    .bind(room_id)
    .bind(user_id)
    .fetch_one(db_pool)
    .await?;
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;
    use crate::rooms::{msg, room};

    const ALICE: i64 = 10;
    const BOB: i64 = 20;

    async fn seeded_room(db_pool: &SqlitePool) -> (i64, Vec<i64>) {
        let room_id = room::get_or_create(db_pool, 1, ALICE, BOB).await.unwrap();
        let mut ids = Vec::new();
        for sender in [ALICE, BOB, ALICE, BOB, ALICE] {
            let (id, _) = msg::append(db_pool, room_id, sender, "hey").await.unwrap();
            ids.push(id);
        }
        (room_id, ids)
    }

    #[tokio::test]
    async fn unread_skips_own_messages() {
        let db_pool = test_pool().await;
        // messages 1..5 sent A,B,A,B,A; Bob read up to id 2
        let (room_id, ids) = seeded_room(&db_pool).await;
        upsert_pointer(&db_pool, room_id, BOB, Some(ids[1])).await.unwrap();

        // ids 3 and 5 remain; id 4 is Bob's own
        assert_eq!(unread_count(&db_pool, room_id, BOB).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn no_pointer_counts_everything_from_others() {
        let db_pool = test_pool().await;
        let (room_id, _) = seeded_room(&db_pool).await;

        assert_eq!(unread_count(&db_pool, room_id, BOB).await.unwrap(), 3);
        assert_eq!(unread_count(&db_pool, room_id, ALICE).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn pointer_upserts_and_may_move_backward() {
        let db_pool = test_pool().await;
        let (room_id, ids) = seeded_room(&db_pool).await;

        upsert_pointer(&db_pool, room_id, BOB, Some(ids[4])).await.unwrap();
        assert_eq!(unread_count(&db_pool, room_id, BOB).await.unwrap(), 0);

        // no monotonicity check on the pointer
        upsert_pointer(&db_pool, room_id, BOB, Some(ids[1])).await.unwrap();
        assert_eq!(unread_count(&db_pool, room_id, BOB).await.unwrap(), 2);

        let (rows,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM chat_read_status WHERE chat_room_id=? AND user_id=?")
                .bind(room_id)
                .bind(BOB)
                .fetch_one(&db_pool)
                .await
                .unwrap();
        assert_eq!(rows, 1);
    }

    #[tokio::test]
    async fn null_pointer_reads_nothing() {
        let db_pool = test_pool().await;
        let (room_id, _) = seeded_room(&db_pool).await;

        upsert_pointer(&db_pool, room_id, BOB, None).await.unwrap();
        assert_eq!(unread_count(&db_pool, room_id, BOB).await.unwrap(), 3);
    }
}
