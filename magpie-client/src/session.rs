use magpie_common::{
    Classification, ClientEvent, HistoryEntry, Identity, Message, MessageStore, RoomName, Roster,
    SendIntent, SendKind, ServerEvent, SYSTEM_IDENTITY,
};

use crate::{
    effect::{Effect, RenderCommand, RosterEntry},
    router::{self, Outbound},
};

/// Room joined when the configured room list is empty.
pub const DEFAULT_ROOM: &str = "General";

/// All client-side state for one chat session: the room the client believes
/// it is in, the per-room message logs, and the active-user roster.
///
/// One `Session` per client, threaded through the event loop — never shared,
/// never ambient. Handlers mutate the session and return the effects to
/// carry out; they do not perform I/O and they never fail (malformed input
/// is a silent no-op, surfaced only as a `tracing` diagnostic).
#[derive(Debug)]
pub struct Session {
    identity: Identity,
    rooms: Vec<RoomName>,
    current_room: RoomName,
    /// Bumped on every join; lets a stale history replay be spotted in logs.
    join_seq: u64,
    store: MessageStore,
    roster: Roster,
}

impl Session {
    /// The first entry of `rooms` is the default room, joined on connect.
    pub fn new(identity: Identity, mut rooms: Vec<RoomName>) -> Self {
        if rooms.is_empty() {
            rooms.push(DEFAULT_ROOM.into());
        }
        let current_room = rooms[0].clone();
        Self {
            identity,
            rooms,
            current_room,
            join_seq: 0,
            store: MessageStore::new(),
            roster: Roster::new(),
        }
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn rooms(&self) -> &[RoomName] {
        &self.rooms
    }

    pub fn current_room(&self) -> &RoomName {
        &self.current_room
    }

    pub fn store(&self) -> &MessageStore {
        &self.store
    }

    pub fn handle_server_event(&mut self, event: ServerEvent) -> Vec<Effect> {
        match event {
            ServerEvent::Connected => self.join_room(self.current_room.clone()),
            ServerEvent::Message {
                username,
                msg,
                room,
                timestamp,
            } => self.on_room_message(username, msg, room, timestamp),
            ServerEvent::PrivateMessage {
                from,
                msg,
                timestamp,
            } => self.on_private_message(from, msg, timestamp),
            ServerEvent::Status { msg, timestamp } => self.on_status(msg, timestamp),
            ServerEvent::ActiveUsers { users } => self.on_active_users(users),
            ServerEvent::ChatHistory { room, messages } => self.on_chat_history(room, messages),
        }
    }

    /// Switches to `target`: leave the old room (advisory), take the new
    /// identity immediately without waiting for confirmation, request the
    /// join, and clear the viewport so the history replay can repopulate it.
    pub fn join_room(&mut self, target: RoomName) -> Vec<Effect> {
        let leaving = std::mem::replace(&mut self.current_room, target.clone());
        self.join_seq += 1;
        tracing::debug!(from = %leaving, to = %target, seq = self.join_seq, "switching rooms");
        vec![
            Effect::Send(ClientEvent::Leave {
                room: leaving.to_string(),
            }),
            Effect::Send(ClientEvent::Join {
                room: target.to_string(),
            }),
            Effect::Render(RenderCommand::ClearViewport),
            Effect::Render(RenderCommand::SetActiveRoom(target)),
        ]
    }

    /// Joins the room at `index` in the configured room list, as activated
    /// from the room list view. Out of range is a no-op.
    pub fn join_room_by_index(&mut self, index: usize) -> Vec<Effect> {
        match self.rooms.get(index).cloned() {
            Some(room) => self.join_room(room),
            None => {
                tracing::debug!(index, "no room at that position");
                Vec::new()
            }
        }
    }

    /// Routes one submitted line: room broadcast, private send, or silent
    /// drop. The input field is cleared and refocused in every case.
    pub fn submit_input(&mut self, raw: &str) -> Vec<Effect> {
        let mut effects = Vec::new();
        match router::classify_input(raw) {
            Outbound::Room(body) => {
                effects.push(Effect::Send(ClientEvent::Message(SendIntent::Room {
                    msg: body.to_owned(),
                    room: self.current_room.to_string(),
                })));
            }
            Outbound::Private { target, body } => {
                effects.push(Effect::Send(ClientEvent::Message(SendIntent::Private {
                    msg: body.to_owned(),
                    kind: SendKind::Private,
                    target: target.to_owned(),
                })));
            }
            Outbound::Nothing => tracing::debug!("nothing to send"),
        }
        effects.push(Effect::Render(RenderCommand::ClearInput));
        effects.push(Effect::Render(RenderCommand::FocusInput));
        effects
    }

    /// Pre-fills the input with a private-addressing prefix for the roster
    /// entry at `index`, as activated from the roster view.
    pub fn activate_roster_entry(&mut self, index: usize) -> Vec<Effect> {
        let Some(user) = self.roster.get(index) else {
            tracing::debug!(index, "no roster entry at that position");
            return Vec::new();
        };
        vec![
            Effect::Render(RenderCommand::SetInput(format!("@{user} "))),
            Effect::Render(RenderCommand::FocusInput),
        ]
    }

    fn on_room_message(
        &mut self,
        username: String,
        msg: String,
        room: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    ) -> Vec<Effect> {
        let message = Message {
            classification: Classification::for_room_message(&username, &self.identity),
            sender: username.into(),
            body: msg.into(),
            timestamp,
        };
        let room: RoomName = room.into();
        let viewing = room == self.current_room;
        if !viewing {
            tracing::debug!(room = %room, "message for a room we are not viewing");
        }
        let effect = append_effect(&message);
        self.store.append(room, message);
        if viewing {
            vec![effect]
        } else {
            Vec::new()
        }
    }

    fn on_private_message(
        &mut self,
        from: String,
        msg: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    ) -> Vec<Effect> {
        // Private messages live in the current room's log alongside room
        // traffic, marked in the body itself.
        let message = Message {
            sender: from.into(),
            body: format!("[Private] {msg}").into(),
            classification: Classification::Private,
            timestamp,
        };
        let effect = append_effect(&message);
        self.store.append(self.current_room.clone(), message);
        vec![effect]
    }

    fn on_status(&mut self, msg: String, timestamp: chrono::DateTime<chrono::Utc>) -> Vec<Effect> {
        let message = Message {
            sender: SYSTEM_IDENTITY.into(),
            body: msg.into(),
            classification: Classification::System,
            timestamp,
        };
        let effect = append_effect(&message);
        self.store.append(self.current_room.clone(), message);
        vec![effect]
    }

    fn on_active_users(&mut self, users: Vec<String>) -> Vec<Effect> {
        self.roster
            .replace(users.into_iter().map(Into::into).collect());
        let entries = self
            .roster
            .iter()
            .map(|user| RosterEntry {
                identity: user.clone(),
                is_you: *user == self.identity,
            })
            .collect();
        vec![Effect::Render(RenderCommand::SetRoster(entries))]
    }

    /// Rebuilds the current room's log and viewport from a history replay.
    /// A replay tagged with a room we already left (fast-switch race) is
    /// discarded.
    fn on_chat_history(&mut self, room: String, entries: Vec<HistoryEntry>) -> Vec<Effect> {
        if *room != *self.current_room {
            tracing::warn!(
                room = %room,
                current = %self.current_room,
                seq = self.join_seq,
                "discarding stale history replay"
            );
            return Vec::new();
        }
        let messages: Vec<Message> = entries
            .into_iter()
            .map(|entry| Message {
                classification: Classification::for_room_message(&entry.username, &self.identity),
                sender: entry.username.into(),
                body: entry.message.into(),
                timestamp: entry.timestamp,
            })
            .collect();
        let mut effects = Vec::with_capacity(messages.len() + 1);
        effects.push(Effect::Render(RenderCommand::ClearViewport));
        effects.extend(messages.iter().map(append_effect));
        self.store.replace(room.into(), messages);
        effects
    }
}

fn append_effect(message: &Message) -> Effect {
    Effect::Render(RenderCommand::AppendMessage {
        sender: message.sender.clone(),
        body: message.body.clone(),
        classification: message.classification,
    })
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Utc};
    use magpie_common::Classification;

    use super::*;

    fn session() -> Session {
        Session::new(
            "me".into(),
            vec!["General".into(), "Dev".into(), "Games".into()],
        )
    }

    fn ts() -> DateTime<Utc> {
        DateTime::UNIX_EPOCH
    }

    fn room_message(username: &str, msg: &str, room: &str) -> ServerEvent {
        ServerEvent::Message {
            username: username.to_owned(),
            msg: msg.to_owned(),
            room: room.to_owned(),
            timestamp: ts(),
        }
    }

    fn sent_events(effects: &[Effect]) -> Vec<&ClientEvent> {
        effects
            .iter()
            .filter_map(|effect| match effect {
                Effect::Send(event) => Some(event),
                Effect::Render(_) => None,
            })
            .collect()
    }

    fn rendered(effects: &[Effect]) -> Vec<&RenderCommand> {
        effects
            .iter()
            .filter_map(|effect| match effect {
                Effect::Render(command) => Some(command),
                Effect::Send(_) => None,
            })
            .collect()
    }

    #[test]
    fn room_send_targets_current_room_and_clears_input() {
        let mut session = session();
        let effects = session.submit_input("hello everyone");
        assert_eq!(
            sent_events(&effects),
            [&ClientEvent::Message(SendIntent::Room {
                msg: "hello everyone".to_owned(),
                room: "General".to_owned(),
            })]
        );
        assert_eq!(
            rendered(&effects),
            [&RenderCommand::ClearInput, &RenderCommand::FocusInput]
        );
    }

    #[test]
    fn private_send_parses_target_and_body() {
        let mut session = session();
        let effects = session.submit_input("@alice hello there");
        assert_eq!(
            sent_events(&effects),
            [&ClientEvent::Message(SendIntent::Private {
                msg: "hello there".to_owned(),
                kind: SendKind::Private,
                target: "alice".to_owned(),
            })]
        );
    }

    #[test]
    fn bodyless_private_send_is_dropped_but_still_clears_input() {
        let mut session = session();
        let effects = session.submit_input("@alice");
        assert!(sent_events(&effects).is_empty());
        assert_eq!(
            rendered(&effects),
            [&RenderCommand::ClearInput, &RenderCommand::FocusInput]
        );
    }

    #[test]
    fn whitespace_input_sends_nothing() {
        let mut session = session();
        assert!(sent_events(&session.submit_input("   ")).is_empty());
    }

    #[test]
    fn join_emits_leave_before_join_and_clears_viewport() {
        let mut session = session();
        let effects = session.join_room("Dev".into());
        assert_eq!(
            effects,
            [
                Effect::Send(ClientEvent::Leave {
                    room: "General".to_owned()
                }),
                Effect::Send(ClientEvent::Join {
                    room: "Dev".to_owned()
                }),
                Effect::Render(RenderCommand::ClearViewport),
                Effect::Render(RenderCommand::SetActiveRoom("Dev".into())),
            ]
        );
        assert_eq!(&**session.current_room(), "Dev");
    }

    #[test]
    fn connect_joins_the_default_room() {
        let mut session = session();
        let effects = session.handle_server_event(ServerEvent::Connected);
        assert_eq!(
            sent_events(&effects),
            [
                &ClientEvent::Leave {
                    room: "General".to_owned()
                },
                &ClientEvent::Join {
                    room: "General".to_owned()
                },
            ]
        );
    }

    #[test]
    fn messages_keep_arrival_order() {
        let mut session = session();
        for body in ["A", "B", "C"] {
            session.handle_server_event(room_message("bob", body, "General"));
        }
        let bodies: Vec<_> = session
            .store()
            .log("General")
            .iter()
            .map(|m| &*m.body)
            .collect();
        assert_eq!(bodies, ["A", "B", "C"]);
    }

    #[test]
    fn classification_follows_sender_and_channel() {
        let mut session = session();
        session.handle_server_event(room_message("me", "mine", "General"));
        session.handle_server_event(room_message("bob", "theirs", "General"));
        session.handle_server_event(ServerEvent::PrivateMessage {
            from: "me".to_owned(),
            msg: "psst".to_owned(),
            timestamp: ts(),
        });
        session.handle_server_event(ServerEvent::Status {
            msg: "bob has joined the room.".to_owned(),
            timestamp: ts(),
        });
        let classifications: Vec<_> = session
            .store()
            .log("General")
            .iter()
            .map(|m| m.classification)
            .collect();
        assert_eq!(
            classifications,
            [
                Classification::Own,
                Classification::Other,
                Classification::Private,
                Classification::System,
            ]
        );
    }

    #[test]
    fn private_body_carries_the_marker() {
        let mut session = session();
        session.handle_server_event(ServerEvent::PrivateMessage {
            from: "alice".to_owned(),
            msg: "psst".to_owned(),
            timestamp: ts(),
        });
        assert_eq!(&*session.store().log("General")[0].body, "[Private] psst");
    }

    #[test]
    fn message_for_another_room_is_stored_but_not_rendered() {
        let mut session = session();
        let effects = session.handle_server_event(room_message("bob", "elsewhere", "Dev"));
        assert!(effects.is_empty());
        assert_eq!(session.store().log("Dev").len(), 1);
        assert!(session.store().log("General").is_empty());
    }

    #[test]
    fn history_replay_rebuilds_log_and_viewport() {
        let mut session = session();
        session.handle_server_event(room_message("bob", "pre-replay", "General"));
        let effects = session.handle_server_event(ServerEvent::ChatHistory {
            room: "General".to_owned(),
            messages: vec![
                HistoryEntry {
                    username: "me".to_owned(),
                    message: "first".to_owned(),
                    timestamp: ts(),
                },
                HistoryEntry {
                    username: "bob".to_owned(),
                    message: "second".to_owned(),
                    timestamp: ts(),
                },
            ],
        });
        assert_eq!(rendered(&effects)[0], &RenderCommand::ClearViewport);
        let log = session.store().log("General");
        assert_eq!(log.len(), 2);
        assert_eq!(&*log[0].body, "first");
        assert_eq!(log[0].classification, Classification::Own);
        assert_eq!(log[1].classification, Classification::Other);
    }

    #[test]
    fn replaying_the_same_history_twice_is_idempotent() {
        let mut first = session();
        let mut second = session();
        let history = ServerEvent::ChatHistory {
            room: "General".to_owned(),
            messages: vec![HistoryEntry {
                username: "bob".to_owned(),
                message: "hi".to_owned(),
                timestamp: ts(),
            }],
        };
        let once = first.handle_server_event(history.clone());
        second.handle_server_event(history.clone());
        second.join_room("General".into());
        let twice = second.handle_server_event(history);
        assert_eq!(once, twice);
        assert_eq!(first.store().log("General"), second.store().log("General"));
    }

    #[test]
    fn stale_history_replay_is_discarded() {
        let mut session = session();
        session.join_room("Dev".into());
        // replay for the room we already left arrives late
        let effects = session.handle_server_event(ServerEvent::ChatHistory {
            room: "General".to_owned(),
            messages: vec![HistoryEntry {
                username: "bob".to_owned(),
                message: "stale".to_owned(),
                timestamp: ts(),
            }],
        });
        assert!(effects.is_empty());
        assert!(session.store().log("General").is_empty());
    }

    #[test]
    fn roster_is_replaced_wholesale() {
        let mut session = session();
        session.handle_server_event(ServerEvent::ActiveUsers {
            users: vec!["alice".to_owned(), "bob".to_owned()],
        });
        let effects = session.handle_server_event(ServerEvent::ActiveUsers {
            users: vec!["bob".to_owned(), "carol".to_owned()],
        });
        match rendered(&effects).as_slice() {
            [RenderCommand::SetRoster(entries)] => {
                let names: Vec<_> = entries.iter().map(|e| &*e.identity).collect();
                assert_eq!(names, ["bob", "carol"]);
            }
            other => panic!("unexpected render commands: {other:?}"),
        }
    }

    #[test]
    fn roster_marks_own_identity() {
        let mut session = session();
        let effects = session.handle_server_event(ServerEvent::ActiveUsers {
            users: vec!["alice".to_owned(), "me".to_owned()],
        });
        match rendered(&effects).as_slice() {
            [RenderCommand::SetRoster(entries)] => {
                assert!(!entries[0].is_you);
                assert!(entries[1].is_you);
            }
            other => panic!("unexpected render commands: {other:?}"),
        }
    }

    #[test]
    fn roster_activation_prefills_private_prefix() {
        let mut session = session();
        session.handle_server_event(ServerEvent::ActiveUsers {
            users: vec!["alice".to_owned()],
        });
        let effects = session.activate_roster_entry(0);
        assert_eq!(
            effects,
            [
                Effect::Render(RenderCommand::SetInput("@alice ".to_owned())),
                Effect::Render(RenderCommand::FocusInput),
            ]
        );
        assert!(sent_events(&effects).is_empty());
    }

    #[test]
    fn out_of_range_indices_are_no_ops() {
        let mut session = session();
        assert!(session.activate_roster_entry(5).is_empty());
        assert!(session.join_room_by_index(9).is_empty());
        assert_eq!(&**session.current_room(), "General");
    }
}
