//! Outbound input classification.
//!
//! A submitted line is either a broadcast to the current room or, when it
//! starts with `@`, a private send addressed as `@target body...`.

/// Where a submitted line should go.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Outbound<'a> {
    /// Broadcast to the current room.
    Room(&'a str),
    /// Directed at a single user over the private channel.
    Private { target: &'a str, body: &'a str },
    /// Nothing to send. Empty input and a private prefix without a body are
    /// both dropped silently.
    Nothing,
}

pub fn classify_input(raw: &str) -> Outbound<'_> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Outbound::Nothing;
    }
    let Some(rest) = trimmed.strip_prefix('@') else {
        return Outbound::Room(trimmed);
    };
    // `@target body...`, split on the first run of whitespace
    match rest.split_once(char::is_whitespace) {
        Some((target, body)) => {
            let body = body.trim_start();
            if target.is_empty() || body.is_empty() {
                Outbound::Nothing
            } else {
                Outbound::Private { target, body }
            }
        }
        None => Outbound::Nothing,
    }
}
