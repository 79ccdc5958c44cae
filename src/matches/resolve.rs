use std::collections::HashSet;

use axum::{Json, debug_handler, extract::{Path, State}};
use serde::Serialize;
use sqlx::SqlitePool;

use crate::{AppResult, Envelope};

/// One directed proposal joined with both endpoints' profile cards, in
/// insertion order.
#[derive(Debug, Clone, sqlx::FromRow)]
pub(crate) struct EdgeRow {
    pub user_from: i64,
    pub user_to: i64,
    pub from_name: Option<String>,
    pub from_phone: Option<String>,
    pub from_gender: bool,
    pub to_name: Option<String>,
    pub to_phone: Option<String>,
    pub team: Option<i64>,
}

#[derive(Debug, Serialize)]
pub(crate) struct PairMember {
    pub user_id: i64,
    pub name: Option<String>,
    pub phone: Option<String>,
    pub team: Option<i64>,
}

#[derive(Debug, Serialize)]
pub(crate) struct MatchedPair {
    pub man: PairMember,
    pub woman: PairMember,
}

/// Single linear scan over the edge list. A pair is confirmed the moment
/// the reverse directed edge is already in the seen-set; each user lands in
/// at most one pair, first confirmation wins. The gender flag decides which
/// side is reported as "man", regardless of who proposed first.
pub(crate) fn pair_up(rows: &[EdgeRow]) -> Vec<MatchedPair> {
    let mut seen_edges: HashSet<(i64, i64)> = HashSet::new();
    let mut paired: HashSet<i64> = HashSet::new();
    let mut pairs = Vec::new();

    for row in rows {
        if paired.contains(&row.user_from) || paired.contains(&row.user_to) {
            continue;
        }

        if seen_edges.contains(&(row.user_to, row.user_from)) {
            paired.insert(row.user_from);
            paired.insert(row.user_to);

            let from = PairMember {
                user_id: row.user_from,
                name: row.from_name.clone(),
                phone: row.from_phone.clone(),
                team: row.team,
            };
            let to = PairMember {
                user_id: row.user_to,
                name: row.to_name.clone(),
                phone: row.to_phone.clone(),
                team: row.team,
            };
            let (man, woman) = if row.from_gender { (from, to) } else { (to, from) };
            pairs.push(MatchedPair { man, woman });
        } else {
            seen_edges.insert((row.user_from, row.user_to));
        }
    }

    pairs
}

pub(crate) async fn resolve_all(db_pool: &SqlitePool, party_id: i64) -> AppResult<Vec<MatchedPair>> {
    let rows: Vec<EdgeRow> = sqlx::query_as(
        "SELECT m.user_from, m.user_to,
                uf.name AS from_name, uf.phone AS from_phone, uf.gender AS from_gender,
                ut.name AS to_name, ut.phone AS to_phone,
                uf.team AS team
         FROM match_selects m
         JOIN users uf ON uf.id = m.user_from
         JOIN users ut ON ut.id = m.user_to
         WHERE m.party_id=?
         ORDER BY m.id",
    )
    .bind(party_id)
    .fetch_all(db_pool)
    .await?;

    Ok(pair_up(&rows))
}

/// Staff-facing view of every confirmed pair at this party.
#[debug_handler(state = crate::AppState)]
pub(crate) async fn resolve(
    Path(party_id): Path<i64>,
    State(db_pool): State<SqlitePool>,
) -> AppResult<Json<Envelope<Option<Vec<MatchedPair>>>>> {
    let pairs = resolve_all(&db_pool, party_id).await?;
    let total_count = pairs.len();
    Ok(Json(Envelope {
        data: if pairs.is_empty() { None } else { Some(pairs) },
        total_count,
    }))
}
