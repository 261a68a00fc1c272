//! Client-side synchronization core for a room-and-private chat session.
//!
//! Everything here is pure state-machine code: handlers take an inbound
//! service event or a piece of user input and return the [`Effect`]s the
//! caller should carry out (events to emit, render commands to apply). No
//! I/O happens in this crate, which keeps the core testable without a
//! terminal or a live service.

mod effect;
mod router;
mod session;

pub use effect::{Effect, RenderCommand, RosterEntry};
pub use router::{classify_input, Outbound};
pub use session::{Session, DEFAULT_ROOM};
