use hotelwire::{PayloadReader, WireError};

use crate::{Parsed, ProtoError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OccupantKind {
    /// A player avatar. Trailing fields: gender, group id, group status,
    /// group name, swim figure, achievement score, moderator flag.
    Legacy,
    /// A placed bot. Trailing fields: owner name, owner id.
    Bot,
    Other(String),
}

impl OccupantKind {
    fn from_tag(tag: &str) -> Self {
        match tag {
            "legacy" => OccupantKind::Legacy,
            "bot" => OccupantKind::Bot,
            other => OccupantKind::Other(other.to_string()),
        }
    }
}

/// One occupant record from a room users snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OccupantRecord {
    pub user_id: i32,
    pub username: String,
    pub motto: String,
    pub figure: String,
    pub transient_id: i32,
    pub x: i32,
    pub y: i32,
    pub height: String,
    pub body_dir: i32,
    pub head_dir: i32,
    pub kind: OccupantKind,
}

fn read_fixed(r: &mut PayloadReader<'_>) -> Result<OccupantRecord, WireError> {
    Ok(OccupantRecord {
        user_id: r.read_i32()?,
        username: r.read_string()?,
        motto: r.read_string()?,
        figure: r.read_string()?,
        transient_id: r.read_i32()?,
        x: r.read_i32()?,
        y: r.read_i32()?,
        height: r.read_string()?,
        body_dir: r.read_i32()?,
        head_dir: r.read_i32()?,
        kind: OccupantKind::from_tag(&r.read_string()?),
    })
}

fn skip_trailing(r: &mut PayloadReader<'_>, kind: &OccupantKind) -> Result<(), ProtoError> {
    match kind {
        OccupantKind::Legacy => {
            r.read_string()?; // gender
            r.read_i32()?; // group id
            r.read_i32()?; // group status
            r.read_string()?; // group name
            r.read_string()?; // swim figure
            r.read_i32()?; // achievement score
            r.read_bool()?; // moderator
        }
        OccupantKind::Bot => {
            r.read_string()?; // owner name
            r.read_i32()?; // owner id
        }
        OccupantKind::Other(tag) => return Err(ProtoError::UnknownKind(tag.clone())),
    }
    Ok(())
}

/// Decode a room users snapshot: `int count`, then `count` records.
///
/// A record is kept once its fixed fields decode. If its kind-specific
/// trailing fields are short or unknown, the record is still kept but
/// decoding stops there: the cursor cannot be realigned with the next
/// record, so any records after it in the same frame are not returned.
/// `stopped_early` says why.
pub fn parse_room_users(payload: &[u8]) -> Parsed<OccupantRecord> {
    let mut r = PayloadReader::new(payload);
    let mut items = Vec::new();

    let count = match r.read_i32() {
        Ok(n) => n.max(0),
        Err(e) => {
            return Parsed {
                items,
                stopped_early: Some(e.into()),
            };
        }
    };

    for _ in 0..count {
        let rec = match read_fixed(&mut r) {
            Ok(rec) => rec,
            Err(e) => {
                return Parsed {
                    items,
                    stopped_early: Some(e.into()),
                };
            }
        };
        let trailing = skip_trailing(&mut r, &rec.kind);
        items.push(rec);
        if let Err(e) = trailing {
            return Parsed {
                items,
                stopped_early: Some(e),
            };
        }
    }

    Parsed::complete(items)
}

/// One entry of a user update (status) message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PositionUpdate {
    pub transient_id: i32,
    pub x: i32,
    pub y: i32,
    pub height: String,
    pub head_dir: i32,
    pub body_dir: i32,
    pub status: String,
}

/// Decode a user update message: `int count`, then
/// `(transientId, x, y, height, headDir, bodyDir, status)` per entry.
pub fn parse_user_updates(payload: &[u8]) -> Parsed<PositionUpdate> {
    let mut r = PayloadReader::new(payload);
    let mut items = Vec::new();

    let res = (|| -> Result<(), WireError> {
        let count = r.read_i32()?.max(0);
        for _ in 0..count {
            items.push(PositionUpdate {
                transient_id: r.read_i32()?,
                x: r.read_i32()?,
                y: r.read_i32()?,
                height: r.read_string()?,
                head_dir: r.read_i32()?,
                body_dir: r.read_i32()?,
                status: r.read_string()?,
            });
        }
        Ok(())
    })();

    Parsed {
        items,
        stopped_early: res.err().map(ProtoError::from),
    }
}

/// Decode a departure notice: the transient id as a decimal string.
pub fn parse_user_removed(payload: &[u8]) -> Result<i32, ProtoError> {
    let s = PayloadReader::new(payload).read_string()?;
    s.trim()
        .parse()
        .map_err(|_| ProtoError::BadTransientId(s.clone()))
}
