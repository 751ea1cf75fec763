//! `hotelwire`: the hotel client wire format.
//!
//! Every message is one frame:
//! - `u32` big-endian length (header id + payload, not counting itself),
//! - `u16` big-endian header id,
//! - `length - 2` payload bytes.
//!
//! Payload fields are `i32` big-endian integers, `u16`-length-prefixed UTF-8
//! strings and single-byte booleans. Transport reads do not respect frame
//! boundaries, so inbound bytes go through [`frame::FrameBuf`], which keeps any
//! partial frame until the rest arrives.

pub mod frame;
pub mod payload;

pub use frame::{Frame, FrameBuf, decode_frames, encode_frame, encode_int32, encode_string};
pub use payload::{PayloadReader, PayloadWriter};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireError {
    /// A payload field read ran past the end of the payload.
    TruncatedPayload { need: usize, got: usize },
    /// A string does not fit the `u16` length prefix.
    StringTooLong(usize),
    /// A declared frame length too small to hold a header id.
    BadLength(usize),
    /// A declared frame length above the accumulator's limit.
    FrameTooLarge { len: usize, max: usize },
}

impl std::fmt::Display for WireError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WireError::TruncatedPayload { need, got } => {
                write!(f, "truncated payload: need {need} bytes, got {got}")
            }
            WireError::StringTooLong(n) => write!(f, "string too long: {n} bytes"),
            WireError::BadLength(n) => write!(f, "bad frame length: {n}"),
            WireError::FrameTooLarge { len, max } => {
                write!(f, "frame too large: {len} bytes (max {max})")
            }
        }
    }
}

impl std::error::Error for WireError {}
