//! Engine for scripted bots living in a hotel room.
//!
//! A bot is a [`Config`] (where to connect, which room, which name) plus a
//! [`Persona`] (what to say and do). [`run_session`] performs the handshake
//! and then runs three cooperating tasks until the connection drops or a
//! one-shot script finishes:
//!
//! - the listener reads frames, keeps the occupant table current and queues
//!   chat and arrival events;
//! - the responder answers queued events and marks itself busy while doing so;
//! - the ambient loop walks, dances and builds whenever the responder is idle.

pub mod ai;
pub mod ambient;
pub mod cli;
pub mod config;
pub mod error;
pub mod handshake;
pub mod listener;
pub mod lock;
pub mod occupants;
pub mod persona;
pub mod responder;
pub mod session;
pub mod signal;
pub mod ticket;
pub mod transport;

#[cfg(test)]
mod testkit;

pub use ai::{ChatBackend, OpenAiBackend};
pub use config::{Config, Defaults};
pub use error::{HandshakeError, SessionError};
pub use lock::InstanceLock;
pub use persona::Persona;
pub use session::{SessionEnd, run_session};
pub use ticket::TicketSource;
