use axum::{Json, debug_handler, extract::{Path, State}, routing::{get, post, put}, Router};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use crate::{AppResult, AppState, Envelope, db};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(create_party))
        .route("/{id}", get(party_info))
        .route("/{id}/match-time", get(match_time))
        .route("/{id}/users", get(party_users))
        .route("/{id}/on", put(set_party_on))
        .route("/{id}/match-start", put(start_matching))
}

#[derive(Deserialize)]
pub(crate) struct CreatePartyRequest {
    accommodation_id: i64,
    party_date: String,
    #[serde(default)]
    party_on: bool,
}

#[derive(Serialize)]
pub(crate) struct PartyCreated {
    party_id: i64,
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn create_party(
    State(db_pool): State<SqlitePool>,
    Json(req): Json<CreatePartyRequest>,
) -> AppResult<Json<Envelope<PartyCreated>>> {
    let (party_id,): (i64,) = sqlx::query_as(
        "INSERT INTO parties (accommodation_id,party_date,party_on) VALUES (?,?,?) RETURNING id",
    )
    .bind(req.accommodation_id)
    .bind(&req.party_date)
    .bind(req.party_on)
    .fetch_one(&db_pool)
    .await?;

    Ok(Json(Envelope {
        data: PartyCreated { party_id },
        total_count: 0,
    }))
}

#[derive(Serialize, sqlx::FromRow)]
pub(crate) struct PartyInfo {
    party_id: i64,
    party_date: Option<String>,
    party_on: bool,
    #[serde(rename = "matchStartTime")]
    match_start_at: Option<String>,
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn party_info(
    Path(id): Path<i64>,
    State(db_pool): State<SqlitePool>,
) -> AppResult<Json<Envelope<PartyInfo>>> {
    let party: PartyInfo = sqlx::query_as(
        "SELECT id AS party_id, party_date, party_on, match_start_at FROM parties WHERE id=?",
    )
    .bind(id)
    .fetch_one(&db_pool)
    .await?;

    Ok(Json(Envelope {
        data: party,
        total_count: 0,
    }))
}

#[derive(Serialize)]
pub(crate) struct MatchTime {
    #[serde(rename = "matchStartTime")]
    match_start_at: Option<String>,
}

/// Clients poll this while the party runs; a non-null time flips them into
/// the selection screen.
#[debug_handler(state = crate::AppState)]
pub(crate) async fn match_time(
    Path(id): Path<i64>,
    State(db_pool): State<SqlitePool>,
) -> AppResult<Json<Envelope<MatchTime>>> {
    let (match_start_at,): (Option<String>,) =
        sqlx::query_as("SELECT match_start_at FROM parties WHERE id=?")
            .bind(id)
            .fetch_one(&db_pool)
            .await?;

    Ok(Json(Envelope {
        data: MatchTime { match_start_at },
        total_count: 0,
    }))
}

#[derive(Serialize, sqlx::FromRow)]
pub(crate) struct PartyUser {
    id: i64,
    name: Option<String>,
    gender: bool,
    team: Option<i64>,
}

/// Candidate list for the selection screens.
#[debug_handler(state = crate::AppState)]
pub(crate) async fn party_users(
    Path(id): Path<i64>,
    State(db_pool): State<SqlitePool>,
) -> AppResult<Json<Envelope<Vec<PartyUser>>>> {
    let users: Vec<PartyUser> =
        sqlx::query_as("SELECT id,name,gender,team FROM users WHERE party_id=? ORDER BY id DESC")
            .bind(id)
            .fetch_all(&db_pool)
            .await?;

    let total_count = users.len();
    Ok(Json(Envelope {
        data: users,
        total_count,
    }))
}

#[derive(Deserialize)]
pub(crate) struct PartyOnRequest {
    party_on: bool,
}

#[derive(Serialize)]
pub(crate) struct StaffAck {
    msg: &'static str,
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn set_party_on(
    Path(id): Path<i64>,
    State(db_pool): State<SqlitePool>,
    Json(req): Json<PartyOnRequest>,
) -> AppResult<Json<StaffAck>> {
    let updated = sqlx::query("UPDATE parties SET party_on=? WHERE id=?")
        .bind(req.party_on)
        .bind(id)
        .execute(&db_pool)
        .await?;
    if updated.rows_affected() == 0 {
        return Err("no such party".into());
    }
    Ok(Json(StaffAck { msg: "ok" }))
}

/// Staff pulls the trigger; everyone at the party sees the same start time.
#[debug_handler(state = crate::AppState)]
pub(crate) async fn start_matching(
    Path(id): Path<i64>,
    State(db_pool): State<SqlitePool>,
) -> AppResult<Json<StaffAck>> {
    let updated = sqlx::query("UPDATE parties SET match_start_at=? WHERE id=?")
        .bind(db::kst_now()?)
        .bind(id)
        .execute(&db_pool)
        .await?;
    if updated.rows_affected() == 0 {
        return Err("no such party".into());
    }
    Ok(Json(StaffAck { msg: "ok" }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;

    async fn seed_party(db_pool: &SqlitePool) -> i64 {
        let (id,): (i64,) = sqlx::query_as(
            "INSERT INTO parties (accommodation_id,party_date,party_on) VALUES (1,'2026-08-07',0) RETURNING id",
        )
        .fetch_one(db_pool)
        .await
        .unwrap();
        id
    }

    #[tokio::test]
    async fn party_on_toggle_is_visible_on_read() {
        let db_pool = test_pool().await;
        let id = seed_party(&db_pool).await;

        sqlx::query("UPDATE parties SET party_on=1 WHERE id=?")
            .bind(id)
            .execute(&db_pool)
            .await
            .unwrap();

        let (party_on,): (bool,) = sqlx::query_as("SELECT party_on FROM parties WHERE id=?")
            .bind(id)
            .fetch_one(&db_pool)
            .await
            .unwrap();
        assert!(party_on);
    }

    #[tokio::test]
    async fn match_start_is_stamped_once_triggered() {
        let db_pool = test_pool().await;
        let id = seed_party(&db_pool).await;

        let (before,): (Option<String>,) =
            sqlx::query_as("SELECT match_start_at FROM parties WHERE id=?")
                .bind(id)
                .fetch_one(&db_pool)
                .await
                .unwrap();
        assert!(before.is_none());

        sqlx::query("UPDATE parties SET match_start_at=? WHERE id=?")
            .bind(db::kst_now().unwrap())
            .bind(id)
            .execute(&db_pool)
            .await
            .unwrap();

        let (after,): (Option<String>,) =
            sqlx::query_as("SELECT match_start_at FROM parties WHERE id=?")
                .bind(id)
                .fetch_one(&db_pool)
                .await
                .unwrap();
        assert!(after.is_some());
    }
}
