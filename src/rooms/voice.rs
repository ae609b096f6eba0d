//! Who is in which voice channel, and which connection put them there.

use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::registry::ConnId;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceParticipant {
    pub user_id: String,
    pub username: String,
}

#[derive(Debug, Clone)]
struct VoiceEntry {
    conn: ConnId,
    username: String,
}

#[derive(Default)]
struct VoiceRooms {
    rooms: HashMap<String, HashMap<String, VoiceEntry>>,
    /// (room, user) keys owned by each connection.
    by_conn: HashMap<ConnId, HashSet<(String, String)>>,
}

impl VoiceRooms {
    fn roster(&self, room_id: &str) -> Vec<VoiceParticipant> {
        let mut roster: Vec<VoiceParticipant> = self
            .rooms
            .get(room_id)
            .map(|users| {
                users
                    .iter()
                    .map(|(user_id, entry)| VoiceParticipant {
                        user_id: user_id.clone(),
                        username: entry.username.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default();
        roster.sort_by(|a, b| a.user_id.cmp(&b.user_id));
        roster
    }

    fn remove(&mut self, room_id: &str, user_id: &str) -> Option<VoiceEntry> {
        let users = self.rooms.get_mut(room_id)?;
        let entry = users.remove(user_id)?;
        if users.is_empty() {
            self.rooms.remove(room_id);
        }

        if let Some(keys) = self.by_conn.get_mut(&entry.conn) {
            keys.remove(&(room_id.to_owned(), user_id.to_owned()));
            if keys.is_empty() {
                self.by_conn.remove(&entry.conn);
            }
        }
        Some(entry)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoiceJoin {
    /// `false` when the user was already present and nothing changed.
    pub joined: bool,
    pub roster: Vec<VoiceParticipant>,
}

#[derive(Clone, Default)]
pub struct VoiceTracker {
    inner: Arc<Mutex<VoiceRooms>>,
}

impl VoiceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, VoiceRooms> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn join_voice(&self, room_id: &str, user_id: &str, conn: ConnId, username: &str) -> VoiceJoin {
        let mut voice = self.lock();
        let users = voice.rooms.entry(room_id.to_owned()).or_default();
        if users.contains_key(user_id) {
            return VoiceJoin {
                joined: false,
                roster: voice.roster(room_id),
            };
        }

        users.insert(
            user_id.to_owned(),
            VoiceEntry {
                conn,
                username: username.to_owned(),
            },
        );
        voice
            .by_conn
            .entry(conn)
            .or_default()
            .insert((room_id.to_owned(), user_id.to_owned()));

        debug!(%conn, room = room_id, user = user_id, "voice entry added");
        VoiceJoin {
            joined: true,
            roster: voice.roster(room_id),
        }
    }

    /// Returns the connection that owned the removed entry, if any.
    pub fn leave_voice(&self, room_id: &str, user_id: &str) -> Option<ConnId> {
        self.lock().remove(room_id, user_id).map(|entry| entry.conn)
    }

    pub fn list_voice(&self, room_id: &str) -> Vec<VoiceParticipant> {
        self.lock().roster(room_id)
    }

    /// Removes every entry owned by `conn`, returning the `(room, user)` pairs
    /// that were dropped.
    pub fn evict_by_connection(&self, conn: ConnId) -> Vec<(String, String)> {
        let mut voice = self.lock();
        let Some(keys) = voice.by_conn.remove(&conn) else {
            return Vec::new();
        };

        let mut evicted = Vec::with_capacity(keys.len());
        for (room_id, user_id) in keys {
            let Some(users) = voice.rooms.get_mut(&room_id) else {
                continue;
            };
            if users.get(&user_id).is_some_and(|entry| entry.conn == conn) {
                users.remove(&user_id);
                if users.is_empty() {
                    voice.rooms.remove(&room_id);
                }
                evicted.push((room_id, user_id));
            }
        }
        evicted.sort();
        evicted
    }

    pub fn connection_of(&self, room_id: &str, user_id: &str) -> Option<ConnId> {
        self.lock()
            .rooms
            .get(room_id)?
            .get(user_id)
            .map(|entry| entry.conn)
    }

    /// Whether `conn` still owns any entry in `room_id`.
    pub fn holds_room(&self, conn: ConnId, room_id: &str) -> bool {
        self.lock()
            .by_conn
            .get(&conn)
            .is_some_and(|keys| keys.iter().any(|(room, _)| room == room_id))
    }

    pub fn room_count(&self) -> usize {
        self.lock().rooms.len()
    }
}
