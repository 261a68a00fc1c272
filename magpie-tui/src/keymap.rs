use std::{cmp, collections::BTreeMap};

use crossterm::event::KeyModifiers;
use tokio::{sync::mpsc, time::Duration};

// resolving a key event needs two pieces of context:
// - the bindings in effect
// - the keys buffered so far (multi-key sequences)
//
// buffered keys that stop matching any binding belong to the input line and
// are passed through, including on sequence timeout

/// What a resolved key sequence does.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Action {
    /// Submit the input line to the message router.
    Submit,
    /// Join the n-th room in the room list.
    JoinRoom(usize),
    /// Move the roster selection down one entry, wrapping.
    CycleRoster,
    /// Pre-fill a private send to the selected roster entry.
    ActivateRoster,
    Quit,
}

/// Key bindings for the chat UI: multi-key sequences mapped to [`Action`]s.
///
/// Sequences are written in `<C-x>` notation (`<CR>`, `<A-1>`, `gq`, ...).
/// Anything that cannot begin a binding falls through to the input line.
#[derive(Clone, Debug)]
pub struct Keymap {
    keys: BTreeMap<Vec<KeyEvent>, Action>,
    pub timeout: Duration,
}

impl Default for Keymap {
    fn default() -> Self {
        let mut keymap = Self {
            keys: BTreeMap::new(),
            timeout: Duration::from_millis(500),
        };
        keymap.bind("<CR>", Action::Submit);
        keymap.bind("<Esc>", Action::Quit);
        keymap.bind("<C-c>", Action::Quit);
        keymap.bind("<Tab>", Action::CycleRoster);
        keymap.bind("<A-CR>", Action::ActivateRoster);
        for n in 1..=9 {
            keymap.bind(&format!("<A-{n}>"), Action::JoinRoom(n - 1));
        }
        keymap
    }
}

impl Keymap {
    /// Adds a binding written in `<C-x>` notation. An unparseable sequence is
    /// ignored with a warning rather than taking the UI down.
    pub fn bind(&mut self, sequence: &str, action: Action) {
        match parse_key_sequence(sequence) {
            Ok(keys) => {
                self.keys.insert(keys, action);
            }
            Err(err) => tracing::warn!(sequence, %err, "ignoring unparseable key binding"),
        }
    }

    /// Resolves a stream of key events against the bindings.
    ///
    /// Keys that cannot begin a binding are handed to `passthru` (they belong
    /// to the input line); a completed sequence emits its action; a partially
    /// matched sequence that times out flushes back to `passthru`.
    pub async fn run(
        &self,
        keys_rx: &mut mpsc::UnboundedReceiver<KeyEvent>,
        mut passthru: impl FnMut(&[KeyEvent]),
        mut action: impl FnMut(Action),
    ) {
        let mut buffer = Vec::<KeyEvent>::new();
        loop {
            let event = if buffer.is_empty() {
                Ok(keys_rx.recv().await)
            } else {
                tokio::time::timeout(self.timeout, keys_rx.recv()).await
            };
            match event {
                Ok(Some(key)) => {
                    buffer.push(key);
                    let (skipped, resolved) = self.resolve(&buffer);
                    passthru(&buffer[..skipped]);
                    buffer.drain(..skipped);
                    if let Some(found) = resolved {
                        buffer.clear();
                        action(found);
                    }
                }
                Ok(None) => {
                    tracing::info!("key stream closed, stopping keymap");
                    break;
                }
                Err(_) => {
                    // timed out mid-sequence; the keys were input after all
                    passthru(&buffer);
                    buffer.clear();
                }
            }
        }
    }

    /// Returns how many leading buffered keys cannot be part of any binding,
    /// plus the action if the remaining suffix completed one.
    fn resolve(&self, buffer: &[KeyEvent]) -> (usize, Option<Action>) {
        (0..buffer.len())
            .find_map(|i| self.lookup(&buffer[i..]).map(|action| (i, action)))
            .unwrap_or((buffer.len(), None))
    }

    /// - `Some(Some(action))`: the sequence completes a binding
    /// - `Some(None)`: the sequence is a proper prefix of at least one binding
    /// - `None`: the sequence cannot become a binding
    fn lookup(&self, keys: &[KeyEvent]) -> Option<Option<Action>> {
        use std::ops::Bound;
        self.keys
            .range::<[_], _>((Bound::Included(keys), Bound::Unbounded))
            .take_while(|(bound, _)| bound.starts_with(keys))
            .next()
            .map(|(bound, action)| (bound == keys).then_some(*action))
    }
}

pub fn parse_key_sequence(input: &str) -> Result<Vec<KeyEvent>, nom::error::Error<&str>> {
    use nom::Finish;
    nom::multi::many1(parse_key)(input).finish().map(|(_, k)| k)
}

fn parse_key(input: &str) -> nom::IResult<&str, KeyEvent> {
    use nom::{
        branch::alt,
        bytes::complete::tag,
        character::complete::one_of,
        combinator::map,
        sequence::{delimited, separated_pair},
    };

    // special names before chars: every special name starts with a letter,
    // which `parse_char` would otherwise eat
    let key = alt((KeyCode::parse_special, KeyCode::parse_char));
    let modifiers = nom::multi::fold_many1(
        map(one_of("ACMS"), |c| match c {
            'A' => KeyModifiers::ALT,
            'C' => KeyModifiers::CONTROL,
            'M' => KeyModifiers::META,
            'S' => KeyModifiers::SHIFT,
            _ => unreachable!(),
        }),
        KeyModifiers::empty,
        KeyModifiers::union,
    );

    let bracketed = alt((
        map(
            separated_pair(modifiers, tag("-"), key),
            |(modifiers, code)| KeyEvent { modifiers, code },
        ),
        map(KeyCode::parse_special, KeyEvent::from),
    ));
    alt((
        delimited(tag("<"), bracketed, tag(">")),
        map(KeyCode::parse_char, KeyEvent::from),
    ))(input)
}

#[derive(Clone, Copy, Debug, Eq)]
pub struct KeyEvent {
    pub code: KeyCode,
    pub modifiers: KeyModifiers,
}

impl From<KeyCode> for KeyEvent {
    fn from(code: KeyCode) -> Self {
        Self {
            code,
            modifiers: KeyModifiers::empty(),
        }
    }
}

impl From<crossterm::event::KeyEvent> for KeyEvent {
    fn from(event: crossterm::event::KeyEvent) -> Self {
        Self {
            code: event.code.into(),
            modifiers: event.modifiers,
        }
    }
}

// manually impl `Ord` since `KeyModifiers` isn't `Ord`
// https://github.com/crossterm-rs/crossterm/pull/951
impl Ord for KeyEvent {
    fn cmp(&self, other: &Self) -> cmp::Ordering {
        self.code
            .cmp(&other.code)
            .then(self.modifiers.bits().cmp(&other.modifiers.bits()))
    }
}

impl PartialOrd for KeyEvent {
    fn partial_cmp(&self, other: &Self) -> Option<cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for KeyEvent {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == cmp::Ordering::Equal
    }
}

// Our own version of `crossterm::event::KeyCode`, orderable for use as a
// `BTreeMap` key
// https://github.com/crossterm-rs/crossterm/pull/951
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub enum KeyCode {
    Char(char),
    Backspace,
    Delete,
    Enter,
    Left,
    Right,
    Up,
    Down,
    Home,
    End,
    PageUp,
    PageDown,
    Tab,
    Insert,
    Escape,
    F(u8),
    Unknown,
}

impl KeyCode {
    fn parse_char(input: &str) -> nom::IResult<&str, Self> {
        nom::combinator::map(
            nom::character::complete::satisfy(nom_unicode::is_alphanumeric),
            Self::Char,
        )(input)
    }

    fn parse_special(input: &str) -> nom::IResult<&str, Self> {
        use nom::{
            bytes::complete::tag,
            combinator::{map, value},
        };
        nom::branch::alt((
            value(Self::Backspace, tag("BS")),
            value(Self::Delete, tag("Del")),
            value(Self::Enter, tag("CR")),
            value(Self::Left, tag("Left")),
            value(Self::Right, tag("Right")),
            value(Self::Up, tag("Up")),
            value(Self::Down, tag("Down")),
            value(Self::Home, tag("Home")),
            value(Self::End, tag("End")),
            value(Self::PageUp, tag("PageUp")),
            value(Self::PageDown, tag("PageDown")),
            value(Self::Tab, tag("Tab")),
            value(Self::Insert, tag("Ins")),
            value(Self::Escape, tag("Esc")),
            map(nom::character::complete::u8, Self::F),
        ))(input)
    }
}

impl From<crossterm::event::KeyCode> for KeyCode {
    fn from(code: crossterm::event::KeyCode) -> Self {
        use crossterm::event::KeyCode as Kc;
        match code {
            Kc::Char(c) => Self::Char(c),
            Kc::Backspace => Self::Backspace,
            Kc::Delete => Self::Delete,
            Kc::Enter => Self::Enter,
            Kc::Left => Self::Left,
            Kc::Right => Self::Right,
            Kc::Up => Self::Up,
            Kc::Down => Self::Down,
            Kc::Home => Self::Home,
            Kc::End => Self::End,
            Kc::PageUp => Self::PageUp,
            Kc::PageDown => Self::PageDown,
            Kc::Tab => Self::Tab,
            Kc::Insert => Self::Insert,
            Kc::Esc => Self::Escape,
            Kc::F(n) => Self::F(n),
            _ => Self::Unknown,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::from(code)
    }

    #[test]
    fn parses_plain_and_special_keys() {
        assert_eq!(
            parse_key_sequence("gq").unwrap(),
            [key(KeyCode::Char('g')), key(KeyCode::Char('q'))]
        );
        assert_eq!(parse_key_sequence("<CR>").unwrap(), [key(KeyCode::Enter)]);
        assert_eq!(parse_key_sequence("<Tab>").unwrap(), [key(KeyCode::Tab)]);
    }

    #[test]
    fn parses_modified_keys() {
        assert_eq!(
            parse_key_sequence("<C-c>").unwrap(),
            [KeyEvent {
                code: KeyCode::Char('c'),
                modifiers: KeyModifiers::CONTROL,
            }]
        );
        assert_eq!(
            parse_key_sequence("<A-1>").unwrap(),
            [KeyEvent {
                code: KeyCode::Char('1'),
                modifiers: KeyModifiers::ALT,
            }]
        );
    }

    #[test]
    fn parses_modified_special_keys() {
        // special names must win over chars, or the 'C' of "CR" is eaten
        assert_eq!(
            parse_key_sequence("<A-CR>").unwrap(),
            [KeyEvent {
                code: KeyCode::Enter,
                modifiers: KeyModifiers::ALT,
            }]
        );
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_key_sequence("<").is_err());
        assert!(parse_key_sequence("").is_err());
    }

    #[test]
    fn lookup_distinguishes_prefix_match_and_miss() {
        let mut keymap = Keymap::default();
        keymap.bind("gq", Action::Quit);
        let g = key(KeyCode::Char('g'));
        let q = key(KeyCode::Char('q'));
        assert_eq!(keymap.lookup(&[g]), Some(None));
        assert_eq!(keymap.lookup(&[g, q]), Some(Some(Action::Quit)));
        assert_eq!(keymap.lookup(&[q]), None);
    }

    #[test]
    fn resolve_passes_through_unbindable_prefix() {
        let mut keymap = Keymap::default();
        keymap.bind("gq", Action::Quit);
        let buffer = [key(KeyCode::Char('x')), key(KeyCode::Char('g'))];
        // 'x' can never start a binding; 'g' still can
        assert_eq!(keymap.resolve(&buffer), (1, None));
    }

    #[test]
    fn default_bindings_cover_the_chat_actions() {
        let keymap = Keymap::default();
        assert_eq!(
            keymap.lookup(&[key(KeyCode::Enter)]),
            Some(Some(Action::Submit))
        );
        assert_eq!(
            keymap.lookup(&[KeyEvent {
                code: KeyCode::Char('3'),
                modifiers: KeyModifiers::ALT,
            }]),
            Some(Some(Action::JoinRoom(2)))
        );
        // shift-enter stays unbound so it can fall through as a newline
        assert_eq!(
            keymap.lookup(&[KeyEvent {
                code: KeyCode::Enter,
                modifiers: KeyModifiers::SHIFT,
            }]),
            None
        );
    }
}
