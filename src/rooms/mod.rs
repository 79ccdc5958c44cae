mod msg;
mod read;
mod room;
mod ws;

use axum::{Router, routing::{get, post}};

use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(room::create_room))
        .route("/list", post(room::list_for_user))
        .route("/chats", post(msg::post_chat))
        .route("/chats/page", post(msg::page))
        .route("/read", post(read::mark_read))
        .route("/ws/{chatRoom_id}/{user_id}", get(ws::room_ws))
}
