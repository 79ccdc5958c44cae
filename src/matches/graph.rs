use axum::{Json, debug_handler, extract::{Path, State}};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use crate::{AppResult, db};

#[derive(Deserialize)]
pub(crate) struct SelectRequest {
    /// The proposing user.
    user_id_1: i64,
    /// The user they picked.
    user_id_2: i64,
    party_id: i64,
}

#[derive(Serialize)]
pub(crate) struct SelectResponse {
    msg: &'static str,
}

/// Records the directed "I choose you" edge. One active edge per proposer
/// per party; picking again overwrites the previous pick in place.
/// Eligibility of the target is the caller's problem, not this layer's.
pub(crate) async fn propose(
    db_pool: &SqlitePool,
    party_id: i64,
    from_user: i64,
    to_user: i64,
) -> AppResult<()> {
    sqlx::query(
        "INSERT INTO match_selects (party_id,user_from,user_to,date) VALUES (?,?,?,?)
         ON CONFLICT(party_id,user_from)
         DO UPDATE SET user_to=excluded.user_to, date=excluded.date",
    )
    .bind(party_id)
    .bind(from_user)
    .bind(to_user)
    .bind(db::kst_now()?)
    .execute(db_pool)
    .await?;
    Ok(())
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn select(
    State(db_pool): State<SqlitePool>,
    Json(req): Json<SelectRequest>,
) -> AppResult<Json<SelectResponse>> {
    propose(&db_pool, req.party_id, req.user_id_1, req.user_id_2).await?;
    Ok(Json(SelectResponse { msg: "ok" }))
}

#[derive(Serialize)]
pub(crate) struct ConfirmResponse {
    user_id_2: Option<i64>,
}

/// Who did this user pick? This is the personal confirmation screen, not
/// reciprocal confirmation; the resolver decides actual pairs.
pub(crate) async fn confirmed_partner(
    db_pool: &SqlitePool,
    party_id: i64,
    user_id: i64,
) -> AppResult<Option<i64>> {
    let row: Option<(i64,)> =
        sqlx::query_as("SELECT user_to FROM match_selects WHERE party_id=? AND user_from=?")
            .bind(party_id)
            .bind(user_id)
            .fetch_optional(db_pool)
            .await?;
    Ok(row.map(|(user_to,)| user_to))
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn confirm(
    Path((party_id, user_id)): Path<(i64, i64)>,
    State(db_pool): State<SqlitePool>,
) -> AppResult<Json<ConfirmResponse>> {
    let user_id_2 = confirmed_partner(&db_pool, party_id, user_id).await?;
    Ok(Json(ConfirmResponse { user_id_2 }))
}
