use std::sync::Arc;

use mingle::{AppState, db, matches, parties, registry::ConnectionRegistry, rooms};
use axum::Router;
use sqlx::sqlite::SqlitePoolOptions;
use tower_http::cors::CorsLayer;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("mingle=info")),
        )
        .init();

    let database_url =
        dotenv::var("DATABASE_URL").unwrap_or_else(|_| "sqlite:mingle.db?mode=rwc".to_owned());
    let db_pool = SqlitePoolOptions::new()
        .max_connections(16)
        .connect(&database_url)
        .await
        .unwrap();
    db::init_schema(&db_pool).await.unwrap();

    let app_state = AppState {
        db_pool,
        registry: Arc::new(ConnectionRegistry::new()),
    };

    let app = Router::new()
        .nest("/rooms", rooms::router())
        .nest("/matches", matches::router())
        .nest("/parties", parties::router())
        .with_state(app_state)
        .layer(CorsLayer::permissive());

    let addr = dotenv::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_owned());
    let listener = tokio::net::TcpListener::bind(&addr).await.unwrap();
    tracing::info!(%addr, "listening");
    axum::serve(listener, app).await.unwrap();
}
