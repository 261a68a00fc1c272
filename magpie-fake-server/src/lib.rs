//! A stand-in for the remote messaging service, good enough to drive the
//! client for demos and tests: it keeps per-room history, tracks active
//! connections, answers join/send events per the wire protocol, and runs a
//! handful of simulated peers who chat, go private, and come and go.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use magpie_common::{
    ClientEvent, ClientEventRx, HistoryEntry, SendIntent, ServerEvent, ServerEventTx,
};
use rand::prelude::{Rng, SliceRandom};
use tokio::time::Duration;
use uuid::Uuid;

const PEER_NAMES: &[&str] = &["alice", "bob", "charlie", "dana"];

const MIN_MESSAGE_WORDS: usize = 1;
const MAX_MESSAGE_WORDS: usize = 15;

/// Service state for a single connected client.
///
/// Handlers are synchronous and return the events to deliver; [`run`] adds
/// the pacing and the channel plumbing.
pub struct FakeService {
    client_sid: Uuid,
    client_username: String,
    rooms: Vec<String>,
    /// Connection id -> user, the way the service tracks presence.
    connections: BTreeMap<Uuid, Connection>,
    histories: BTreeMap<String, Vec<HistoryEntry>>,
    client_room: Option<String>,
}

struct Connection {
    username: String,
    connected_at: DateTime<Utc>,
}

impl Connection {
    fn new(username: String) -> Self {
        Self {
            username,
            connected_at: Utc::now(),
        }
    }
}

impl FakeService {
    pub fn new(client_username: String, rooms: Vec<String>) -> Self {
        let mut connections = BTreeMap::new();
        for name in PEER_NAMES {
            connections.insert(Uuid::now_v7(), Connection::new((*name).to_owned()));
        }
        let client_sid = Uuid::now_v7();
        connections.insert(client_sid, Connection::new(client_username.clone()));
        Self {
            client_sid,
            client_username,
            rooms,
            connections,
            histories: BTreeMap::new(),
            client_room: None,
        }
    }

    /// Events delivered when the connection comes up.
    pub fn connect(&self) -> Vec<ServerEvent> {
        vec![ServerEvent::Connected, self.active_users()]
    }

    pub fn handle_client_event(&mut self, event: ClientEvent) -> Vec<ServerEvent> {
        match event {
            // advisory; the service tears down room membership on its own
            ClientEvent::Leave { room } => {
                tracing::debug!(%room, "client left a room");
                Vec::new()
            }
            ClientEvent::Join { room } => self.on_join(room),
            ClientEvent::Message(intent) => self.on_message(intent),
        }
    }

    fn on_join(&mut self, room: String) -> Vec<ServerEvent> {
        if !self.rooms.contains(&room) {
            tracing::warn!(%room, "invalid room join attempt");
            return Vec::new();
        }
        self.client_room = Some(room.clone());
        let messages = self.histories.get(&room).cloned().unwrap_or_default();
        vec![
            ServerEvent::ChatHistory {
                room,
                messages,
            },
            ServerEvent::Status {
                msg: format!("{} has joined the room.", self.client_username),
                timestamp: Utc::now(),
            },
        ]
    }

    fn on_message(&mut self, intent: SendIntent) -> Vec<ServerEvent> {
        match intent {
            SendIntent::Room { msg, room } => {
                let msg = msg.trim().to_owned();
                if msg.is_empty() {
                    return Vec::new();
                }
                if !self.rooms.contains(&room) {
                    tracing::warn!(%room, "message to invalid room");
                    return Vec::new();
                }
                let timestamp = Utc::now();
                let username = self.client_username.clone();
                self.persist(&room, &username, &msg, timestamp);
                if self.client_room.as_deref() == Some(&room) {
                    vec![ServerEvent::Message {
                        username,
                        msg,
                        room,
                        timestamp,
                    }]
                } else {
                    Vec::new()
                }
            }
            SendIntent::Private { msg, target, .. } => {
                let msg = msg.trim().to_owned();
                if msg.is_empty() {
                    return Vec::new();
                }
                let timestamp = Utc::now();
                // private traffic is filed under the first room's history,
                // the service's default
                if let Some(room) = self.rooms.first().cloned() {
                    let username = self.client_username.clone();
                    self.persist(&room, &username, &msg, timestamp);
                }
                match self.find_connection(&target) {
                    // the sender gets no echo; only the target sees it
                    Some(sid) if sid == self.client_sid => vec![ServerEvent::PrivateMessage {
                        from: self.client_username.clone(),
                        msg,
                        timestamp,
                    }],
                    Some(_) => {
                        tracing::info!(%target, "private message delivered");
                        Vec::new()
                    }
                    None => {
                        tracing::warn!(%target, "private message failed, user not found");
                        Vec::new()
                    }
                }
            }
        }
    }

    /// One step of simulated peer activity: mostly room chatter, sometimes a
    /// private message to the client, occasionally presence churn. Returns
    /// the events to deliver and how long to wait before the next step.
    pub fn peer_tick(&mut self) -> (Vec<ServerEvent>, Duration) {
        let mut rng = rand::thread_rng();
        let delay = Duration::from_millis(rng.gen_range(500..5000));
        let events = match rng.gen_range(0..10u8) {
            0 => self.churn_presence(&mut rng),
            1 | 2 => self.peer_private_message(&mut rng),
            _ => self.peer_room_message(&mut rng),
        };
        (events, delay)
    }

    fn peer_room_message(&mut self, rng: &mut impl Rng) -> Vec<ServerEvent> {
        let Some(username) = self.random_peer(rng) else {
            return Vec::new();
        };
        let Some(room) = self.rooms.choose(rng).cloned() else {
            return Vec::new();
        };
        let msg = body(rng);
        let timestamp = Utc::now();
        self.persist(&room, &username, &msg, timestamp);
        if self.client_room.as_deref() == Some(&room) {
            vec![ServerEvent::Message {
                username,
                msg,
                room,
                timestamp,
            }]
        } else {
            Vec::new()
        }
    }

    fn peer_private_message(&mut self, rng: &mut impl Rng) -> Vec<ServerEvent> {
        let Some(from) = self.random_peer(rng) else {
            return Vec::new();
        };
        let msg = body(rng);
        let timestamp = Utc::now();
        if let Some(room) = self.rooms.first().cloned() {
            self.persist(&room, &from, &msg, timestamp);
        }
        vec![ServerEvent::PrivateMessage {
            from,
            msg,
            timestamp,
        }]
    }

    fn churn_presence(&mut self, rng: &mut impl Rng) -> Vec<ServerEvent> {
        let removable: Vec<Uuid> = self
            .connections
            .keys()
            .copied()
            .filter(|sid| *sid != self.client_sid)
            .collect();
        if rng.gen_bool(0.5) && !removable.is_empty() {
            let sid = removable[rng.gen_range(0..removable.len())];
            if let Some(connection) = self.connections.remove(&sid) {
                tracing::debug!(
                    username = %connection.username,
                    connected_at = %connection.connected_at,
                    "peer disconnected"
                );
            }
        } else {
            self.connections
                .insert(Uuid::now_v7(), Connection::new(guest_username(rng)));
        }
        vec![self.active_users()]
    }

    fn active_users(&self) -> ServerEvent {
        ServerEvent::ActiveUsers {
            users: self
                .connections
                .values()
                .map(|connection| connection.username.clone())
                .collect(),
        }
    }

    fn persist(&mut self, room: &str, username: &str, msg: &str, timestamp: DateTime<Utc>) {
        self.histories
            .entry(room.to_owned())
            .or_default()
            .push(HistoryEntry {
                username: username.to_owned(),
                message: msg.to_owned(),
                timestamp,
            });
    }

    fn find_connection(&self, username: &str) -> Option<Uuid> {
        self.connections
            .iter()
            .find(|(_, connection)| connection.username == username)
            .map(|(sid, _)| *sid)
    }

    fn random_peer(&self, rng: &mut impl Rng) -> Option<String> {
        let peers: Vec<&Connection> = self
            .connections
            .iter()
            .filter(|(sid, _)| **sid != self.client_sid)
            .map(|(_, connection)| connection)
            .collect();
        peers.choose(rng).map(|connection| connection.username.clone())
    }
}

fn body(rng: &mut impl Rng) -> String {
    let words = rng.gen_range(MIN_MESSAGE_WORDS..=MAX_MESSAGE_WORDS);
    lipsum::lipsum_words_with_rng(rng, words)
}

fn guest_username(rng: &mut impl Rng) -> String {
    format!(
        "Guest{}{}",
        Utc::now().format("%H%M"),
        rng.gen_range(1000..10000)
    )
}

/// Pumps the service: answers client events as they arrive and lets the
/// simulated peers chat in between. Returns when either channel closes.
pub async fn run(
    client_username: String,
    rooms: Vec<String>,
    mut client_rx: ClientEventRx,
    server_tx: ServerEventTx,
) {
    let mut service = FakeService::new(client_username, rooms);
    for event in service.connect() {
        if server_tx.send(event).is_err() {
            return;
        }
    }
    let mut delay = Duration::from_millis(1500);
    loop {
        let events = tokio::select! {
            event = client_rx.recv() => match event {
                Some(event) => service.handle_client_event(event),
                None => {
                    tracing::info!("client event stream closed, stopping fake service");
                    return;
                }
            },
            _ = tokio::time::sleep(delay) => {
                let (events, next) = service.peer_tick();
                delay = next;
                events
            }
        };
        for event in events {
            if server_tx.send(event).is_err() {
                return;
            }
        }
    }
}
