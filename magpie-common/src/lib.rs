use std::{collections::BTreeMap, sync::Arc};

use chrono::{DateTime, Utc};

mod event;

pub use event::{
    ClientEvent, ClientEventRx, ClientEventTx, HistoryEntry, SendIntent, SendKind, ServerEvent,
    ServerEventRx, ServerEventTx,
};

/// Display name of a user, as reported by the service.
pub type Identity = Arc<str>;

/// Room name, unique within the service's namespace.
pub type RoomName = Arc<str>;

/// Sender name the service uses for its own status notices.
pub const SYSTEM_IDENTITY: &str = "System";

/// Locally-derived rendering tag for a message. Never sent on the wire.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Classification {
    /// Room message sent by this session's own identity.
    Own,
    /// Room message from anyone else.
    Other,
    /// Private-channel message, regardless of direction.
    Private,
    /// Service-originated status notice.
    System,
}

impl Classification {
    /// Classifies a room message by its sender.
    pub fn for_room_message(sender: &str, own_identity: &str) -> Self {
        if sender == own_identity {
            Self::Own
        } else {
            Self::Other
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Message {
    pub sender: Identity,
    pub body: Arc<str>,
    pub classification: Classification,
    pub timestamp: DateTime<Utc>,
}

/// Per-room append-only message logs.
///
/// A room's log is created empty on first reference, fully replaced when a
/// history replay arrives for it, and appended to incrementally otherwise.
/// Insertion order is arrival order and is preserved on replay.
#[derive(Clone, Debug, Default)]
pub struct MessageStore {
    logs: BTreeMap<RoomName, Vec<Message>>,
}

impl MessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, room: RoomName, message: Message) {
        self.logs.entry(room).or_default().push(message);
    }

    /// Discards the room's log and rebuilds it from `messages`.
    pub fn replace(&mut self, room: RoomName, messages: Vec<Message>) {
        self.logs.insert(room, messages);
    }

    /// The room's log, oldest first. Empty for rooms never referenced.
    pub fn log(&self, room: &str) -> &[Message] {
        self.logs.get(room).map(Vec::as_slice).unwrap_or_default()
    }
}

/// The identities the service currently reports as active.
///
/// Wholesale-replaced on every presence update; stale entries are discarded,
/// never patched.
#[derive(Clone, Debug, Default)]
pub struct Roster {
    users: Vec<Identity>,
}

impl Roster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn replace(&mut self, users: Vec<Identity>) {
        self.users = users;
    }

    pub fn get(&self, index: usize) -> Option<&Identity> {
        self.users.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Identity> {
        self.users.iter()
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(sender: &str, body: &str, classification: Classification) -> Message {
        Message {
            sender: sender.into(),
            body: body.into(),
            classification,
            timestamp: DateTime::UNIX_EPOCH,
        }
    }

    #[test]
    fn classification_by_sender() {
        assert_eq!(
            Classification::for_room_message("alice", "alice"),
            Classification::Own
        );
        assert_eq!(
            Classification::for_room_message("bob", "alice"),
            Classification::Other
        );
    }

    #[test]
    fn store_preserves_arrival_order() {
        let mut store = MessageStore::new();
        for body in ["a", "b", "c"] {
            store.append("general".into(), message("bob", body, Classification::Other));
        }
        let bodies: Vec<_> = store.log("general").iter().map(|m| &*m.body).collect();
        assert_eq!(bodies, ["a", "b", "c"]);
    }

    #[test]
    fn replace_discards_previous_log() {
        let mut store = MessageStore::new();
        store.append("general".into(), message("bob", "old", Classification::Other));
        store.replace(
            "general".into(),
            vec![message("alice", "new", Classification::Own)],
        );
        let log = store.log("general");
        assert_eq!(log.len(), 1);
        assert_eq!(&*log[0].body, "new");
    }

    #[test]
    fn unreferenced_room_has_empty_log() {
        let store = MessageStore::new();
        assert!(store.log("nowhere").is_empty());
    }

    #[test]
    fn roster_replacement_discards_stale_entries() {
        let mut roster = Roster::new();
        roster.replace(vec!["alice".into(), "bob".into()]);
        roster.replace(vec!["bob".into(), "carol".into()]);
        let users: Vec<_> = roster.iter().map(|u| &**u).collect();
        assert_eq!(users, ["bob", "carol"]);
    }
}
