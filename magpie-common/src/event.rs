//! The transport event contract between client and service.
//!
//! Event tags and payload fields follow the service's wire protocol; both
//! directions multiplex room and private sends through the one `message`
//! event, discriminated by the `type` field.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

pub type ServerEventTx = mpsc::UnboundedSender<ServerEvent>;
pub type ServerEventRx = mpsc::UnboundedReceiver<ServerEvent>;
pub type ClientEventTx = mpsc::UnboundedSender<ClientEvent>;
pub type ClientEventRx = mpsc::UnboundedReceiver<ClientEvent>;

/// Events delivered by the service.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ServerEvent {
    /// Connection established; the client joins its default room in response.
    #[serde(rename = "connect")]
    Connected,
    /// Broadcast within a room. The service tags the originating room; the
    /// client routes by that tag rather than assuming current-room affinity.
    Message {
        username: String,
        msg: String,
        room: String,
        timestamp: DateTime<Utc>,
    },
    /// Delivered only to the target of a private send.
    PrivateMessage {
        from: String,
        msg: String,
        timestamp: DateTime<Utc>,
    },
    /// Service-originated status notice for the current room.
    Status { msg: String, timestamp: DateTime<Utc> },
    /// Full replacement for the active-user roster.
    ActiveUsers { users: Vec<String> },
    /// Bulk replay of a room's past messages, sent on join. Tagged with the
    /// room so the client can discard replays made stale by a fast switch.
    ChatHistory {
        room: String,
        messages: Vec<HistoryEntry>,
    },
}

/// One persisted message inside a [`ServerEvent::ChatHistory`] replay.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub username: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// Events emitted by the client.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ClientEvent {
    /// Advisory; sent before a join when switching rooms. No acknowledgement
    /// is awaited.
    Leave { room: String },
    Join { room: String },
    Message(SendIntent),
}

/// Payload of an outbound `message` event.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SendIntent {
    Private {
        msg: String,
        #[serde(rename = "type")]
        kind: SendKind,
        target: String,
    },
    Room { msg: String, room: String },
}

/// Discriminator the service expects on private sends.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SendKind {
    Private,
}
