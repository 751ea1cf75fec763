//! Who is in the room.
//!
//! The table has exactly one writer, the session task that owns the
//! [`RoomWriter`] (the handshake, then the listener). Responder and ambient
//! loops get a [`RoomView`], which can only read.

use std::collections::HashMap;
use std::sync::Arc;

use hotelproto::ProtoError;
use hotelproto::room::{self, OccupantRecord};
use tokio::sync::RwLock;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Occupant {
    pub transient_id: i32,
    pub user_id: i32,
    pub username: String,
    pub x: i32,
    pub y: i32,
}

impl From<&OccupantRecord> for Occupant {
    fn from(r: &OccupantRecord) -> Self {
        Self {
            transient_id: r.transient_id,
            user_id: r.user_id,
            username: r.username.clone(),
            x: r.x,
            y: r.y,
        }
    }
}

/// What one snapshot changed.
#[derive(Debug, Default, PartialEq)]
pub struct SnapshotOutcome {
    /// `(transient_id, username)` for records absent from the table before
    /// this snapshot, in snapshot order.
    pub arrivals: Vec<(i32, String)>,
    pub parsed: usize,
    pub stopped_early: Option<ProtoError>,
}

#[derive(Debug)]
pub struct OccupantTable {
    by_tid: HashMap<i32, Occupant>,
    bot_username_lc: String,
    self_id: Option<i32>,
}

impl OccupantTable {
    pub fn new(bot_username: &str) -> Self {
        Self {
            by_tid: HashMap::new(),
            bot_username_lc: bot_username.trim().to_lowercase(),
            self_id: None,
        }
    }

    pub fn is_bot_name(&self, username: &str) -> bool {
        username.to_lowercase() == self.bot_username_lc
    }

    /// Insert or refresh every record the snapshot decodes. Records that
    /// decoded before a failure are applied.
    pub fn apply_room_snapshot(&mut self, payload: &[u8]) -> SnapshotOutcome {
        let parsed = room::parse_room_users(payload);
        let mut out = SnapshotOutcome {
            parsed: parsed.items.len(),
            stopped_early: parsed.stopped_early,
            ..Default::default()
        };
        for rec in &parsed.items {
            if self.is_bot_name(&rec.username) {
                self.self_id = Some(rec.transient_id);
            }
            if self
                .by_tid
                .insert(rec.transient_id, Occupant::from(rec))
                .is_none()
            {
                out.arrivals.push((rec.transient_id, rec.username.clone()));
            }
        }
        out
    }

    /// Move known occupants. Unknown ids and decode failures are ignored;
    /// returns how many occupants moved.
    pub fn apply_position_update(&mut self, payload: &[u8]) -> usize {
        let mut moved = 0;
        for u in room::parse_user_updates(payload).items {
            if let Some(o) = self.by_tid.get_mut(&u.transient_id) {
                o.x = u.x;
                o.y = u.y;
                moved += 1;
            }
        }
        moved
    }

    /// Remove the occupant named by a departure notice. `Ok(None)` when the
    /// id wasn't tracked.
    pub fn apply_departure(&mut self, payload: &[u8]) -> Result<Option<Occupant>, ProtoError> {
        let tid = room::parse_user_removed(payload)?;
        Ok(self.by_tid.remove(&tid))
    }

    pub fn get(&self, transient_id: i32) -> Option<&Occupant> {
        self.by_tid.get(&transient_id)
    }

    pub fn self_id(&self) -> Option<i32> {
        self.self_id
    }

    pub fn len(&self) -> usize {
        self.by_tid.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_tid.is_empty()
    }

    pub fn usernames(&self) -> Vec<String> {
        let mut v = self
            .by_tid
            .values()
            .map(|o| o.username.clone())
            .collect::<Vec<_>>();
        v.sort();
        v
    }
}

/// Create the single writer and a cloneable read handle over one table.
pub fn room_state(bot_username: &str) -> (RoomWriter, RoomView) {
    let inner = Arc::new(RwLock::new(OccupantTable::new(bot_username)));
    (
        RoomWriter {
            inner: inner.clone(),
        },
        RoomView { inner },
    )
}

/// Exclusive mutation handle. Not `Clone`.
#[derive(Debug)]
pub struct RoomWriter {
    inner: Arc<RwLock<OccupantTable>>,
}

impl RoomWriter {
    pub async fn apply_room_snapshot(&mut self, payload: &[u8]) -> SnapshotOutcome {
        self.inner.write().await.apply_room_snapshot(payload)
    }

    pub async fn apply_position_update(&mut self, payload: &[u8]) -> usize {
        self.inner.write().await.apply_position_update(payload)
    }

    pub async fn apply_departure(
        &mut self,
        payload: &[u8],
    ) -> Result<Option<Occupant>, ProtoError> {
        self.inner.write().await.apply_departure(payload)
    }

    pub fn view(&self) -> RoomView {
        RoomView {
            inner: self.inner.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RoomView {
    inner: Arc<RwLock<OccupantTable>>,
}

impl RoomView {
    pub async fn self_id(&self) -> Option<i32> {
        self.inner.read().await.self_id()
    }

    pub async fn name_of(&self, transient_id: i32) -> Option<String> {
        self.inner
            .read()
            .await
            .get(transient_id)
            .map(|o| o.username.clone())
    }

    pub async fn position_of(&self, transient_id: i32) -> Option<(i32, i32)> {
        self.inner
            .read()
            .await
            .get(transient_id)
            .map(|o| (o.x, o.y))
    }

    pub async fn is_bot_name(&self, username: &str) -> bool {
        self.inner.read().await.is_bot_name(username)
    }

    pub async fn usernames(&self) -> Vec<String> {
        self.inner.read().await.usernames()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }
}
