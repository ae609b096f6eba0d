use axum::{Json, debug_handler, extract::{Path, State}};
use serde::Serialize;

use super::{PERSONAL_ROOM, RoomGateway, voice::VoiceParticipant};

#[derive(Debug, Serialize)]
pub(crate) struct VoiceUsers {
    success: bool,
    data: Vec<VoiceParticipant>,
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn voice_users(
    State(gateway): State<RoomGateway>,
    Path(room_id): Path<String>,
) -> Json<VoiceUsers> {
    let data = if room_id == PERSONAL_ROOM {
        Vec::new()
    } else {
        gateway.voice().list_voice(&room_id)
    };

    Json(VoiceUsers { success: true, data })
}
