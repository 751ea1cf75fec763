//! `hotelproto`: the subset of the hotel room protocol a chat/movement bot needs.
//!
//! Messages ride inside `hotelwire` frames; the frame header id selects the
//! message type and the payload carries type-specific fields. Outbound
//! messages are built from [`client::ClientMsg`]; inbound frames are classified
//! with [`headers::classify`] and decoded by the `room` and `chat` modules.
//!
//! Decoders of count-prefixed lists return [`Parsed`]: the records read so far
//! plus why decoding stopped, if it stopped early. A short or malformed tail
//! never throws away the records before it.

pub mod chat;
pub mod client;
pub mod headers;
pub mod room;

use hotelwire::WireError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtoError {
    Wire(WireError),
    /// Occupant record with a kind tag whose trailing fields we cannot skip.
    UnknownKind(String),
    /// Departure notice whose id is not a number.
    BadTransientId(String),
}

impl std::fmt::Display for ProtoError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProtoError::Wire(e) => write!(f, "{e}"),
            ProtoError::UnknownKind(k) => write!(f, "unknown occupant kind: {k:?}"),
            ProtoError::BadTransientId(s) => write!(f, "bad transient id: {s:?}"),
        }
    }
}

impl std::error::Error for ProtoError {}

impl From<WireError> for ProtoError {
    fn from(e: WireError) -> Self {
        ProtoError::Wire(e)
    }
}

/// Result of decoding a count-prefixed list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parsed<T> {
    pub items: Vec<T>,
    /// Set when decoding stopped before the declared count was reached.
    pub stopped_early: Option<ProtoError>,
}

impl<T> Parsed<T> {
    pub fn complete(items: Vec<T>) -> Self {
        Self {
            items,
            stopped_early: None,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.stopped_early.is_none()
    }
}
