use tracing::{debug, info, warn};

use crate::error::CoreError;

use super::{
    PERSONAL_ROOM,
    events::{
        ActivityKind, ChatPayload, ClientEvent, ErrorPayload, JoinVoicePayload, LeaveVoicePayload,
        RelayedSignal, ServerEvent, SignalPayload, UserActivity, VoiceDeparture, VoicePresence,
        VoiceRoster,
    },
    msg::MessageStore,
    registry::{ConnId, Outbox, RoomRegistry},
    voice::VoiceTracker,
    voice_group,
};

/// Routes socket events to the message store, the room registry and the
/// voice tracker. Cloning is cheap; clones share state.
#[derive(Clone)]
pub struct Gateway<S> {
    store: S,
    rooms: RoomRegistry,
    voice: VoiceTracker,
    history_limit: u32,
}

impl<S: MessageStore> Gateway<S> {
    pub fn new(store: S, history_limit: u32) -> Self {
        Self {
            store,
            rooms: RoomRegistry::new(),
            voice: VoiceTracker::new(),
            history_limit,
        }
    }

    pub fn rooms(&self) -> &RoomRegistry {
        &self.rooms
    }

    pub fn voice(&self) -> &VoiceTracker {
        &self.voice
    }

    pub fn connect(&self, conn: ConnId, outbox: Outbox) {
        self.rooms.connect(conn, outbox);
        info!(%conn, "client connected");
    }

    /// Entry point for a raw text frame. Malformed frames are dropped.
    pub async fn handle_frame(&self, conn: ConnId, frame: &str) {
        match serde_json::from_str::<ClientEvent>(frame) {
            Ok(event) => self.handle_event(conn, event).await,
            Err(e) => {
                let err = CoreError::from(e);
                warn!(%conn, error = %err, "dropping frame");
            }
        }
    }

    pub async fn handle_event(&self, conn: ConnId, event: ClientEvent) {
        let result = match event {
            ClientEvent::JoinRoom(room_id) => self.join_room(conn, room_id).await,
            ClientEvent::LeaveRoom(room_id) => {
                self.leave_room(conn, &room_id);
                Ok(())
            }
            ClientEvent::ChatMessage(payload) => self.chat_message(conn, payload).await,
            ClientEvent::JoinVoice(payload) => self.join_voice(conn, payload),
            ClientEvent::LeaveVoice(payload) => {
                self.leave_voice(conn, payload);
                Ok(())
            }
            ClientEvent::VoiceSignal(payload) => self.relay_signal(conn, payload),
        };

        if let Err(err) = result {
            warn!(%conn, error = %err, "event failed");
            self.rooms.emit(
                conn,
                &ServerEvent::Error(ErrorPayload {
                    message: err.client_message(),
                }),
            );
        }
    }

    async fn join_room(&self, conn: ConnId, room_id: String) -> Result<(), CoreError> {
        if room_id == PERSONAL_ROOM {
            self.rooms.emit(conn, &ServerEvent::PreviousMessages(Vec::new()));
            return Ok(());
        }

        let history = match self.store.recent_history(&room_id, self.history_limit).await {
            Ok(history) => history,
            Err(CoreError::NotFound(what)) => {
                debug!(%conn, room = %room_id, "{what} not found, replaying nothing");
                Vec::new()
            }
            Err(e) => return Err(e),
        };

        self.rooms.emit(conn, &ServerEvent::PreviousMessages(history));
        if self.rooms.join(conn, &room_id) {
            info!(%conn, room = %room_id, "joined room");
            self.rooms.broadcast(
                &room_id,
                &ServerEvent::UserActivity(UserActivity::now(ActivityKind::Join)),
                None,
            );
        }
        Ok(())
    }

    fn leave_room(&self, conn: ConnId, room_id: &str) {
        if room_id == PERSONAL_ROOM || !self.rooms.is_member(conn, room_id) {
            return;
        }

        self.rooms.broadcast(
            room_id,
            &ServerEvent::UserActivity(UserActivity::now(ActivityKind::Leave)),
            None,
        );
        self.rooms.leave(conn, room_id);
        info!(%conn, room = %room_id, "left room");
    }

    async fn chat_message(
        &self,
        conn: ConnId,
        ChatPayload { room_id, message, username }: ChatPayload,
    ) -> Result<(), CoreError> {
        if room_id == PERSONAL_ROOM {
            debug!(%conn, "ignoring chat to @me");
            return Ok(());
        }
        if !self.rooms.is_member(conn, &room_id) {
            return Err(CoreError::NotJoined(room_id));
        }

        let message = self.store.append(&room_id, &username, &message).await?;

        // membership may have changed while the write was in flight
        let reached = self
            .rooms
            .broadcast(&room_id, &ServerEvent::Message(message), None);
        debug!(%conn, room = %room_id, reached, "message broadcast");
        Ok(())
    }

    fn join_voice(
        &self,
        conn: ConnId,
        JoinVoicePayload { room_id, user_id, username }: JoinVoicePayload,
    ) -> Result<(), CoreError> {
        if room_id == PERSONAL_ROOM {
            return Err(CoreError::validation("@me has no voice channel"));
        }
        if user_id.is_empty() {
            return Err(CoreError::validation("userId is required"));
        }

        let join = self.voice.join_voice(&room_id, &user_id, conn, &username);
        let group = voice_group(&room_id);
        self.rooms.join(conn, &group);

        if join.joined {
            info!(%conn, room = %room_id, user = %user_id, "joined voice");
            self.rooms.broadcast(
                &group,
                &ServerEvent::VoiceUserJoined(VoicePresence {
                    room_id: room_id.clone(),
                    user_id,
                    username,
                }),
                Some(conn),
            );
        }

        self.rooms.emit(
            conn,
            &ServerEvent::VoiceUsersList(VoiceRoster {
                room_id,
                users: join.roster,
            }),
        );
        Ok(())
    }

    fn leave_voice(&self, conn: ConnId, LeaveVoicePayload { room_id, user_id }: LeaveVoicePayload) {
        let owner = self.voice.leave_voice(&room_id, &user_id);
        let group = voice_group(&room_id);
        // the removed entry may belong to another connection
        for holder in [Some(conn), owner].into_iter().flatten() {
            if !self.voice.holds_room(holder, &room_id) {
                self.rooms.leave(holder, &group);
            }
        }

        if owner.is_some() {
            info!(%conn, room = %room_id, user = %user_id, "left voice");
            self.rooms.broadcast(
                &group,
                &ServerEvent::VoiceUserLeft(VoiceDeparture { room_id, user_id }),
                None,
            );
        }
    }

    fn relay_signal(&self, conn: ConnId, signal: SignalPayload) -> Result<(), CoreError> {
        if self.voice.connection_of(&signal.room_id, &signal.from_user_id) != Some(conn) {
            return Err(CoreError::validation(format!(
                "join voice in {} before signaling",
                signal.room_id
            )));
        }
        let target = self
            .voice
            .connection_of(&signal.room_id, &signal.target_user_id)
            .ok_or_else(|| CoreError::NotFound(format!("voice user {}", signal.target_user_id)))?;

        self.rooms.emit(
            target,
            &ServerEvent::VoiceSignal(RelayedSignal {
                room_id: signal.room_id,
                from_user_id: signal.from_user_id,
                kind: signal.kind,
                payload: signal.payload,
            }),
        );
        Ok(())
    }

    /// Cleanup for a closed socket: drop memberships, then announce every
    /// voice entry the connection owned.
    pub fn disconnect(&self, conn: ConnId) {
        self.rooms.disconnect(conn);

        for (room_id, user_id) in self.voice.evict_by_connection(conn) {
            info!(%conn, room = %room_id, user = %user_id, "evicted from voice");
            self.rooms.broadcast(
                &voice_group(&room_id),
                &ServerEvent::VoiceUserLeft(VoiceDeparture { room_id, user_id }),
                None,
            );
        }
        info!(%conn, "client disconnected");
    }
}
