mod graph;
mod resolve;

use axum::{Router, routing::{get, post}};

use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/select", post(graph::select))
        .route("/confirm/{party_id}/{user_id}", get(graph::confirm))
        .route("/resolve/{party_id}", get(resolve::resolve))
}
