pub mod events;
pub mod gateway;
pub mod msg;
pub mod registry;
pub mod voice;
mod room;
mod ws;

use axum::{Router, routing::get};

use crate::AppState;

pub use gateway::Gateway;
pub use msg::{Message, MessageStore, SqliteMessageStore};

/// The personal/home channel. Never stored, never has voice.
pub const PERSONAL_ROOM: &str = "@me";

pub type RoomGateway = Gateway<SqliteMessageStore>;

/// Broadcast group for a room's voice participants.
pub fn voice_group(room_id: &str) -> String {
    format!("voice-{room_id}")
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/ws", get(ws::room_ws))
        .route("/rooms/{room_id}/voice/users", get(room::voice_users))
}
