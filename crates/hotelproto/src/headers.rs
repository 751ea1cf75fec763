//! Header ids (Arcturus-compatible numbering).

// Client -> server.
pub const OUT_SECURITY_TICKET: u16 = 2419;
pub const OUT_SECURITY_MACHINE: u16 = 2490;
pub const OUT_CLIENT_VARIABLES: u16 = 1053;
pub const OUT_GET_GUEST_ROOM: u16 = 2230;
pub const OUT_OPEN_FLAT_CONNECTION: u16 = 2312;
pub const OUT_GET_ROOM_ENTRY_DATA: u16 = 3898;
pub const OUT_CHAT: u16 = 1314;
pub const OUT_SHOUT: u16 = 2085;
pub const OUT_WHISPER: u16 = 1543;
pub const OUT_MOVE_AVATAR: u16 = 3320;
pub const OUT_DANCE: u16 = 2080;
pub const OUT_EXPRESSION: u16 = 2456;
pub const OUT_SIGN: u16 = 1975;
pub const OUT_PLACE_OBJECT: u16 = 1258;
pub const OUT_MOVE_OBJECT: u16 = 248;
pub const OUT_CLIENT_PONG: u16 = 2596;

// Server -> client.
pub const IN_SERVER_PING: u16 = 3928;
pub const IN_AUTHENTICATED: u16 = 2491;
pub const IN_ROOM_USERS: u16 = 374;
pub const IN_USER_REMOVED: u16 = 2661;
pub const IN_USER_UPDATED: u16 = 1640;
pub const IN_CHAT: u16 = 1446;
pub const IN_SHOUT: u16 = 1036;
pub const IN_WHISPER: u16 = 1132;

/// Inbound message types the bots act on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Inbound {
    Ping,
    Authenticated,
    RoomUsers,
    UserRemoved,
    UserUpdated,
    Chat,
    Shout,
    Whisper,
    Other(u16),
}

pub fn classify(header: u16) -> Inbound {
    match header {
        IN_SERVER_PING => Inbound::Ping,
        IN_AUTHENTICATED => Inbound::Authenticated,
        IN_ROOM_USERS => Inbound::RoomUsers,
        IN_USER_REMOVED => Inbound::UserRemoved,
        IN_USER_UPDATED => Inbound::UserUpdated,
        IN_CHAT => Inbound::Chat,
        IN_SHOUT => Inbound::Shout,
        IN_WHISPER => Inbound::Whisper,
        other => Inbound::Other(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_known_and_unknown() {
        assert_eq!(classify(3928), Inbound::Ping);
        assert_eq!(classify(IN_WHISPER), Inbound::Whisper);
        assert_eq!(classify(OUT_CHAT), Inbound::Other(OUT_CHAT));
    }
}
