//! Broadcast groups and per-connection outboxes.

use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, error, warn};
use uuid::Uuid;

use super::events::ServerEvent;

pub type ConnId = Uuid;

/// Serialized frames waiting to be written to one socket.
pub type Outbox = mpsc::Sender<String>;

#[derive(Default)]
struct Groups {
    members: HashMap<String, HashSet<ConnId>>,
    joined: HashMap<ConnId, HashSet<String>>,
    outboxes: HashMap<ConnId, Outbox>,
}

impl Groups {
    fn deliver(&self, conn: ConnId, frame: String) {
        let Some(outbox) = self.outboxes.get(&conn) else {
            return;
        };
        match outbox.try_send(frame) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => warn!(%conn, "outbox full, dropping frame"),
            Err(TrySendError::Closed(_)) => debug!(%conn, "outbox closed, dropping frame"),
        }
    }
}

#[derive(Clone, Default)]
pub struct RoomRegistry {
    inner: Arc<Mutex<Groups>>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Groups> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn connect(&self, conn: ConnId, outbox: Outbox) {
        self.lock().outboxes.insert(conn, outbox);
    }

    /// Drops the outbox and every membership. Returns the groups left.
    pub fn disconnect(&self, conn: ConnId) -> Vec<String> {
        let mut groups = self.lock();
        groups.outboxes.remove(&conn);

        let left: Vec<String> = groups
            .joined
            .remove(&conn)
            .map(|set| set.into_iter().collect())
            .unwrap_or_default();
        for group in &left {
            if let Some(members) = groups.members.get_mut(group) {
                members.remove(&conn);
                if members.is_empty() {
                    groups.members.remove(group);
                }
            }
        }
        left
    }

    /// Returns `false` if the connection was already a member.
    pub fn join(&self, conn: ConnId, group: &str) -> bool {
        let mut groups = self.lock();
        let added = groups
            .members
            .entry(group.to_owned())
            .or_default()
            .insert(conn);
        groups.joined.entry(conn).or_default().insert(group.to_owned());
        added
    }

    /// Returns `false` if the connection was not a member.
    pub fn leave(&self, conn: ConnId, group: &str) -> bool {
        let mut groups = self.lock();
        let removed = match groups.members.get_mut(group) {
            Some(members) => {
                let removed = members.remove(&conn);
                if members.is_empty() {
                    groups.members.remove(group);
                }
                removed
            }
            None => false,
        };
        if let Some(joined) = groups.joined.get_mut(&conn) {
            joined.remove(group);
            if joined.is_empty() {
                groups.joined.remove(&conn);
            }
        }
        removed
    }

    pub fn is_member(&self, conn: ConnId, group: &str) -> bool {
        self.lock()
            .members
            .get(group)
            .is_some_and(|members| members.contains(&conn))
    }

    pub fn members(&self, group: &str) -> Vec<ConnId> {
        self.lock()
            .members
            .get(group)
            .map(|members| members.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn group_count(&self) -> usize {
        self.lock().members.len()
    }

    /// Private emit to a single connection.
    pub fn emit(&self, conn: ConnId, event: &ServerEvent) {
        let Some(frame) = encode(event) else {
            return;
        };
        self.lock().deliver(conn, frame);
    }

    /// Sends `event` to every member of `group` except `except`. Returns the
    /// number of connections it was handed to.
    pub fn broadcast(&self, group: &str, event: &ServerEvent, except: Option<ConnId>) -> usize {
        let Some(frame) = encode(event) else {
            return 0;
        };
        let groups = self.lock();
        let Some(members) = groups.members.get(group) else {
            return 0;
        };

        let mut sent = 0;
        for &conn in members {
            if Some(conn) == except {
                continue;
            }
            groups.deliver(conn, frame.clone());
            sent += 1;
        }
        sent
    }
}

fn encode(event: &ServerEvent) -> Option<String> {
    match serde_json::to_string(event) {
        Ok(frame) => Some(frame),
        Err(e) => {
            error!(error = %e, "failed to encode server event");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rooms::events::ErrorPayload;

    fn event(text: &str) -> ServerEvent {
        ServerEvent::Error(ErrorPayload {
            message: text.to_owned(),
        })
    }

    fn connected(registry: &RoomRegistry) -> (ConnId, mpsc::Receiver<String>) {
        let conn = Uuid::now_v7();
        let (tx, rx) = mpsc::channel(8);
        registry.connect(conn, tx);
        (conn, rx)
    }

    #[test]
    fn join_and_leave_are_idempotent() {
        let registry = RoomRegistry::new();
        let (conn, _rx) = connected(&registry);

        assert!(registry.join(conn, "r1"));
        assert!(!registry.join(conn, "r1"));
        assert_eq!(registry.members("r1"), vec![conn]);

        assert!(registry.leave(conn, "r1"));
        assert!(!registry.leave(conn, "r1"));
        assert!(!registry.is_member(conn, "r1"));
        assert_eq!(registry.group_count(), 0);
    }

    #[test]
    fn broadcast_reaches_members_only() {
        let registry = RoomRegistry::new();
        let (a, mut a_rx) = connected(&registry);
        let (b, mut b_rx) = connected(&registry);
        let (_c, mut c_rx) = connected(&registry);
        registry.join(a, "r1");
        registry.join(b, "r1");

        assert_eq!(registry.broadcast("r1", &event("hi"), None), 2);
        assert!(a_rx.try_recv().is_ok());
        assert!(b_rx.try_recv().is_ok());
        assert!(c_rx.try_recv().is_err());

        assert_eq!(registry.broadcast("r1", &event("again"), Some(a)), 1);
        assert!(a_rx.try_recv().is_err());
        assert!(b_rx.try_recv().is_ok());
    }

    #[test]
    fn disconnect_clears_every_group() {
        let registry = RoomRegistry::new();
        let (a, _a_rx) = connected(&registry);
        let (b, _b_rx) = connected(&registry);
        registry.join(a, "r1");
        registry.join(a, "voice-r1");
        registry.join(b, "r1");

        let mut left = registry.disconnect(a);
        left.sort();
        assert_eq!(left, ["r1", "voice-r1"]);
        assert_eq!(registry.members("r1"), vec![b]);
        assert_eq!(registry.group_count(), 1);
    }

    #[test]
    fn full_outbox_drops_instead_of_blocking() {
        let registry = RoomRegistry::new();
        let conn = Uuid::now_v7();
        let (tx, mut rx) = mpsc::channel(1);
        registry.connect(conn, tx);

        registry.emit(conn, &event("one"));
        registry.emit(conn, &event("two"));

        let frame = rx.try_recv().unwrap();
        assert!(frame.contains("one"));
        assert!(rx.try_recv().is_err());
    }
}
