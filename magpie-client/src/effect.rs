use std::sync::Arc;

use magpie_common::{Classification, ClientEvent, Identity, RoomName};

/// What a handler asks the outside world to do, in order.
#[derive(Clone, Debug, PartialEq)]
pub enum Effect {
    /// Emit an event to the service. Fire-and-forget; no acknowledgement is
    /// awaited anywhere in the core.
    Send(ClientEvent),
    Render(RenderCommand),
}

/// Commands consumed by the render sink. Side effects only; the core never
/// reads anything back from the sink.
#[derive(Clone, Debug, PartialEq)]
pub enum RenderCommand {
    /// Append one message to the viewport, then scroll it into view.
    AppendMessage {
        sender: Identity,
        body: Arc<str>,
        classification: Classification,
    },
    /// Drop everything from the viewport. The backing log is untouched.
    ClearViewport,
    SetActiveRoom(RoomName),
    /// Replace the whole roster view. No diffing.
    SetRoster(Vec<RosterEntry>),
    ClearInput,
    /// Replace the input field contents, cursor at the end.
    SetInput(String),
    FocusInput,
}

#[derive(Clone, Debug, PartialEq)]
pub struct RosterEntry {
    pub identity: Identity,
    /// Matches the session's own identity; rendered with a "(you)" marker.
    pub is_you: bool,
}
