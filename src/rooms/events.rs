//! Frames exchanged over the room socket.
//!
//! Every frame is a JSON object `{"event": <name>, "data": <payload>}`.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;

use super::{msg::Message, voice::VoiceParticipant};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ClientEvent {
    JoinRoom(String),
    LeaveRoom(String),
    ChatMessage(ChatPayload),
    JoinVoice(JoinVoicePayload),
    LeaveVoice(LeaveVoicePayload),
    VoiceSignal(SignalPayload),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatPayload {
    pub room_id: String,
    pub message: String,
    pub username: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinVoicePayload {
    pub room_id: String,
    pub user_id: String,
    pub username: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaveVoicePayload {
    pub room_id: String,
    pub user_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SignalKind {
    Offer,
    Answer,
    IceCandidate,
}

/// WebRTC negotiation data. `payload` is relayed untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalPayload {
    pub room_id: String,
    pub from_user_id: String,
    pub target_user_id: String,
    pub kind: SignalKind,
    #[serde(default)]
    pub payload: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ServerEvent {
    PreviousMessages(Vec<Message>),
    Message(Message),
    UserActivity(UserActivity),
    VoiceUserJoined(VoicePresence),
    VoiceUserLeft(VoiceDeparture),
    VoiceUsersList(VoiceRoster),
    VoiceSignal(RelayedSignal),
    Error(ErrorPayload),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityKind {
    Join,
    Leave,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserActivity {
    #[serde(rename = "type")]
    pub kind: ActivityKind,
    pub message: String,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

impl UserActivity {
    pub fn now(kind: ActivityKind) -> Self {
        let message = match kind {
            ActivityKind::Join => "A new user joined the room.",
            ActivityKind::Leave => "A user left the room.",
        };
        Self {
            kind,
            message: message.to_owned(),
            timestamp: OffsetDateTime::now_utc(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoicePresence {
    pub room_id: String,
    pub user_id: String,
    pub username: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceDeparture {
    pub room_id: String,
    pub user_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceRoster {
    pub room_id: String,
    pub users: Vec<VoiceParticipant>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayedSignal {
    pub room_id: String,
    pub from_user_id: String,
    pub kind: SignalKind,
    pub payload: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub message: String,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn parses_client_frames() {
        let join: ClientEvent =
            serde_json::from_value(json!({"event": "joinRoom", "data": "r1"})).unwrap();
        assert_eq!(join, ClientEvent::JoinRoom("r1".to_owned()));

        let chat: ClientEvent = serde_json::from_value(json!({
            "event": "chatMessage",
            "data": {"roomId": "r1", "message": "hello", "username": "ann"}
        }))
        .unwrap();
        assert_eq!(
            chat,
            ClientEvent::ChatMessage(ChatPayload {
                room_id: "r1".to_owned(),
                message: "hello".to_owned(),
                username: "ann".to_owned(),
            })
        );

        let signal: ClientEvent = serde_json::from_value(json!({
            "event": "voiceSignal",
            "data": {
                "roomId": "r2",
                "fromUserId": "a",
                "targetUserId": "b",
                "kind": "iceCandidate",
                "payload": {"candidate": "x"}
            }
        }))
        .unwrap();
        let ClientEvent::VoiceSignal(signal) = signal else {
            panic!("expected voiceSignal");
        };
        assert_eq!(signal.kind, SignalKind::IceCandidate);
        assert_eq!(signal.payload["candidate"], "x");
    }

    #[test]
    fn rejects_unknown_and_incomplete_frames() {
        assert!(serde_json::from_value::<ClientEvent>(json!({"event": "dance", "data": 1})).is_err());
        assert!(
            serde_json::from_value::<ClientEvent>(json!({
                "event": "joinVoice",
                "data": {"roomId": "r2"}
            }))
            .is_err()
        );
    }

    #[test]
    fn server_frames_use_event_envelope() {
        let frame = serde_json::to_value(ServerEvent::VoiceUserLeft(VoiceDeparture {
            room_id: "r2".to_owned(),
            user_id: "a".to_owned(),
        }))
        .unwrap();
        assert_eq!(
            frame,
            json!({"event": "voiceUserLeft", "data": {"roomId": "r2", "userId": "a"}})
        );

        let frame = serde_json::to_value(ServerEvent::UserActivity(UserActivity::now(
            ActivityKind::Leave,
        )))
        .unwrap();
        assert_eq!(frame["event"], "userActivity");
        assert_eq!(frame["data"]["type"], "leave");
    }
}
