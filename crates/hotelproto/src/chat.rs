use hotelwire::PayloadReader;

use crate::ProtoError;
use crate::headers::{IN_CHAT, IN_SHOUT, IN_WHISPER};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatKind {
    Chat,
    Shout,
    Whisper,
}

impl ChatKind {
    pub fn from_header(header: u16) -> Option<Self> {
        match header {
            IN_CHAT => Some(ChatKind::Chat),
            IN_SHOUT => Some(ChatKind::Shout),
            IN_WHISPER => Some(ChatKind::Whisper),
            _ => None,
        }
    }
}

/// An inbound chat line. Fields after the text (bubble, emotion, links)
/// are not read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatIn {
    pub kind: ChatKind,
    pub transient_id: i32,
    pub text: String,
}

pub fn parse_chat(kind: ChatKind, payload: &[u8]) -> Result<ChatIn, ProtoError> {
    let mut r = PayloadReader::new(payload);
    Ok(ChatIn {
        kind,
        transient_id: r.read_i32()?,
        text: r.read_string()?,
    })
}
