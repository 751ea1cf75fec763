use hotelwire::{Frame, PayloadWriter, WireError};

use crate::headers::*;

/// Expression id for a wave.
pub const EXPRESSION_WAVE: i32 = 1;
/// Dance style that stops dancing.
pub const DANCE_STOP: i32 = 0;

/// Messages the bot sends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientMsg {
    SecurityMachine {
        machine_id: String,
    },
    /// Fixed client variables: `int 0`, `"0"`, `""`.
    ClientVariables,
    SecurityTicket {
        ticket: String,
    },
    GetGuestRoom {
        room_id: i32,
    },
    OpenFlatConnection {
        room_id: i32,
        password: String,
    },
    GetRoomEntryData,
    Chat {
        text: String,
    },
    Shout {
        text: String,
    },
    /// Encoded as a single `"target text"` string.
    Whisper {
        to: String,
        text: String,
    },
    MoveAvatar {
        x: i32,
        y: i32,
    },
    Dance {
        style: i32,
    },
    Expression {
        id: i32,
    },
    Sign {
        id: i32,
    },
    /// Place an inventory item; encoded as the string `"itemId x y rotation"`.
    PlaceObject {
        item_id: i32,
        x: i32,
        y: i32,
        rotation: i32,
    },
    MoveObject {
        item_id: i32,
        x: i32,
        y: i32,
        rotation: i32,
    },
    Pong,
}

impl ClientMsg {
    pub fn chat(text: impl Into<String>) -> Self {
        ClientMsg::Chat { text: text.into() }
    }

    pub fn shout(text: impl Into<String>) -> Self {
        ClientMsg::Shout { text: text.into() }
    }

    pub fn header(&self) -> u16 {
        match self {
            ClientMsg::SecurityMachine { .. } => OUT_SECURITY_MACHINE,
            ClientMsg::ClientVariables => OUT_CLIENT_VARIABLES,
            ClientMsg::SecurityTicket { .. } => OUT_SECURITY_TICKET,
            ClientMsg::GetGuestRoom { .. } => OUT_GET_GUEST_ROOM,
            ClientMsg::OpenFlatConnection { .. } => OUT_OPEN_FLAT_CONNECTION,
            ClientMsg::GetRoomEntryData => OUT_GET_ROOM_ENTRY_DATA,
            ClientMsg::Chat { .. } => OUT_CHAT,
            ClientMsg::Shout { .. } => OUT_SHOUT,
            ClientMsg::Whisper { .. } => OUT_WHISPER,
            ClientMsg::MoveAvatar { .. } => OUT_MOVE_AVATAR,
            ClientMsg::Dance { .. } => OUT_DANCE,
            ClientMsg::Expression { .. } => OUT_EXPRESSION,
            ClientMsg::Sign { .. } => OUT_SIGN,
            ClientMsg::PlaceObject { .. } => OUT_PLACE_OBJECT,
            ClientMsg::MoveObject { .. } => OUT_MOVE_OBJECT,
            ClientMsg::Pong => OUT_CLIENT_PONG,
        }
    }

    /// Fails only when a string field exceeds the `u16` length prefix.
    pub fn to_frame(&self) -> Result<Frame, WireError> {
        let mut w = PayloadWriter::new();
        match self {
            ClientMsg::SecurityMachine { machine_id } => {
                w.put_str(machine_id)?;
            }
            ClientMsg::ClientVariables => {
                w.put_i32(0).put_str("0")?.put_str("")?;
            }
            ClientMsg::SecurityTicket { ticket } => {
                w.put_str(ticket)?;
            }
            ClientMsg::GetGuestRoom { room_id } => {
                w.put_i32(*room_id).put_i32(0).put_i32(1);
            }
            ClientMsg::OpenFlatConnection { room_id, password } => {
                w.put_i32(*room_id).put_str(password)?;
            }
            ClientMsg::GetRoomEntryData | ClientMsg::Pong => {}
            ClientMsg::Chat { text } => {
                // bubble style 0, color -1
                w.put_str(text)?.put_i32(0).put_i32(-1);
            }
            ClientMsg::Shout { text } => {
                w.put_str(text)?.put_i32(0);
            }
            ClientMsg::Whisper { to, text } => {
                w.put_str(&format!("{to} {text}"))?.put_i32(0);
            }
            ClientMsg::MoveAvatar { x, y } => {
                w.put_i32(*x).put_i32(*y);
            }
            ClientMsg::Dance { style } => {
                w.put_i32(*style);
            }
            ClientMsg::Expression { id } | ClientMsg::Sign { id } => {
                w.put_i32(*id);
            }
            ClientMsg::PlaceObject {
                item_id,
                x,
                y,
                rotation,
            } => {
                w.put_str(&format!("{item_id} {x} {y} {rotation}"))?;
            }
            ClientMsg::MoveObject {
                item_id,
                x,
                y,
                rotation,
            } => {
                w.put_i32(*item_id)
                    .put_i32(*x)
                    .put_i32(*y)
                    .put_i32(*rotation);
            }
        }
        Ok(w.finish(self.header()))
    }
}
