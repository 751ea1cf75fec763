//! Connect, authenticate, join the room.
//!
//! Each step sends one fixed frame and then drains inbound frames for a
//! bounded window. Server pings are answered in every window. Room snapshots
//! seen while joining go straight into the occupant table (no arrival events:
//! the room is not loaded yet).

use std::time::Duration;

use hotelproto::client::ClientMsg;
use hotelproto::headers::{Inbound as In, classify};
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

use crate::config::Timings;
use crate::error::{HandshakeError, SessionError};
use crate::occupants::RoomWriter;
use crate::transport::{Inbound, Writer};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    Disconnected,
    Connected,
    MachineIdSent,
    ClientVarsSent,
    TicketSent,
    Authenticated,
    RoomRequested,
    FlatOpened,
    EntryDataRequested,
    InRoom,
}

pub struct Handshake<'a> {
    writer: &'a Writer,
    inbound: &'a mut Inbound,
    room: &'a mut RoomWriter,
    timings: &'a Timings,
    state: HandshakeState,
}

impl<'a> Handshake<'a> {
    /// Start from a freshly opened connection.
    pub fn new(
        writer: &'a Writer,
        inbound: &'a mut Inbound,
        room: &'a mut RoomWriter,
        timings: &'a Timings,
    ) -> Self {
        Self {
            writer,
            inbound,
            room,
            timings,
            state: HandshakeState::Connected,
        }
    }

    pub fn state(&self) -> HandshakeState {
        self.state
    }

    fn advance(&mut self, next: HandshakeState) {
        debug!(from = ?self.state, to = ?next, "handshake");
        self.state = next;
    }

    /// Run the whole sequence. On success the state is `InRoom`.
    pub async fn run(&mut self, ticket: &str, room_id: i32) -> Result<(), SessionError> {
        self.authenticate(ticket).await?;
        self.join(room_id).await
    }

    pub async fn authenticate(&mut self, ticket: &str) -> Result<(), SessionError> {
        if ticket.trim().is_empty() {
            return Err(HandshakeError::AuthFailed("empty ticket".into()).into());
        }

        self.writer
            .send(ClientMsg::SecurityMachine {
                machine_id: String::new(),
            })
            .await?;
        self.advance(HandshakeState::MachineIdSent);

        self.writer.send(ClientMsg::ClientVariables).await?;
        self.advance(HandshakeState::ClientVarsSent);

        self.writer
            .send(ClientMsg::SecurityTicket {
                ticket: ticket.to_string(),
            })
            .await?;
        self.advance(HandshakeState::TicketSent);

        let t = self.timings.auth_timeout;
        if !self.drain(t, t, true).await? {
            warn!(timeout_ms = t.as_millis() as u64, "no authenticated marker");
            return Err(HandshakeError::Timeout { state: self.state }.into());
        }
        self.advance(HandshakeState::Authenticated);
        info!("authenticated");
        Ok(())
    }

    pub async fn join(&mut self, room_id: i32) -> Result<(), SessionError> {
        let (quiet, cap) = (self.timings.quiet, self.timings.phase_cap);

        self.writer.send(ClientMsg::GetGuestRoom { room_id }).await?;
        self.advance(HandshakeState::RoomRequested);
        self.drain(quiet, cap, false).await?;

        self.writer
            .send(ClientMsg::OpenFlatConnection {
                room_id,
                password: String::new(),
            })
            .await?;
        self.advance(HandshakeState::FlatOpened);
        self.drain(quiet, cap, false).await?;

        self.writer.send(ClientMsg::GetRoomEntryData).await?;
        self.advance(HandshakeState::EntryDataRequested);
        self.drain(quiet, cap, false).await?;

        self.advance(HandshakeState::InRoom);
        Ok(())
    }

    /// Read frames until `quiet` passes with nothing new or `cap` has elapsed
    /// in total. With `until_auth`, also stop at the authenticated marker.
    /// Returns whether that marker was seen.
    async fn drain(
        &mut self,
        quiet: Duration,
        cap: Duration,
        until_auth: bool,
    ) -> Result<bool, SessionError> {
        let deadline = Instant::now() + cap;
        let mut authed = false;

        loop {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            let wait = quiet.min(deadline - now);
            let frame = match tokio::time::timeout(wait, self.inbound.next_frame()).await {
                Err(_) => break,
                Ok(r) => r?,
            };

            match classify(frame.header) {
                In::Ping => self.writer.send(ClientMsg::Pong).await?,
                In::Authenticated => {
                    authed = true;
                    if until_auth {
                        break;
                    }
                }
                In::RoomUsers => {
                    let out = self.room.apply_room_snapshot(&frame.payload).await;
                    if let Some(e) = out.stopped_early {
                        warn!(parsed = out.parsed, err = %e, "room snapshot cut short");
                    }
                }
                In::UserUpdated => {
                    self.room.apply_position_update(&frame.payload).await;
                }
                In::UserRemoved => match self.room.apply_departure(&frame.payload).await {
                    Ok(Some(o)) => {
                        debug!(user = %o.username, tid = o.transient_id, "left during join")
                    }
                    Ok(None) => {}
                    Err(e) => warn!(err = %e, "bad departure notice"),
                },
                _ => trace!(header = frame.header, state = ?self.state, "drained"),
            }
        }
        Ok(authed)
    }
}

#[cfg(test)]
mod tests {
    use hotelproto::headers::*;
    use hotelwire::Frame;

    use super::*;
    use crate::occupants::room_state;
    use crate::testkit;

    fn fast() -> Timings {
        Timings {
            connect_timeout: Duration::from_secs(1),
            auth_timeout: Duration::from_secs(5),
            quiet: Duration::from_millis(300),
            phase_cap: Duration::from_secs(2),
            settle: Duration::ZERO,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn full_sequence_answers_pings_and_loads_room() {
        let (writer, mut sent) = testkit::writer();
        let (tx, mut inbound) = testkit::inbound();
        let (mut room, view) = room_state("claude");
        let timings = fast();

        tx.send(testkit::bin(Frame::empty(IN_SERVER_PING))).unwrap();
        tx.send(testkit::bin(Frame::empty(IN_AUTHENTICATED))).unwrap();
        tx.send(testkit::bin(testkit::snapshot(&[
            (3, "alice", 1, 1),
            (7, "Claude", 2, 2),
        ])))
        .unwrap();

        let mut hs = Handshake::new(&writer, &mut inbound, &mut room, &timings);
        hs.run("tkt", 208).await.unwrap();
        assert_eq!(hs.state(), HandshakeState::InRoom);

        assert_eq!(
            testkit::drain_headers(&mut sent),
            vec![
                OUT_SECURITY_MACHINE,
                OUT_CLIENT_VARIABLES,
                OUT_SECURITY_TICKET,
                OUT_CLIENT_PONG,
                OUT_GET_GUEST_ROOM,
                OUT_OPEN_FLAT_CONNECTION,
                OUT_GET_ROOM_ENTRY_DATA,
            ]
        );
        assert_eq!(view.self_id().await, Some(7));
        assert_eq!(view.len().await, 2);
        drop(tx);
    }

    #[tokio::test(start_paused = true)]
    async fn departures_during_join_are_applied() {
        let (writer, _sent) = testkit::writer();
        let (tx, mut inbound) = testkit::inbound();
        let (mut room, view) = room_state("claude");
        let timings = fast();

        let mut gone = hotelwire::PayloadWriter::new();
        gone.put_str("3").unwrap();
        tx.send(testkit::bin(Frame::empty(IN_AUTHENTICATED))).unwrap();
        tx.send(testkit::bin(testkit::snapshot(&[
            (3, "alice", 1, 1),
            (7, "claude", 2, 2),
        ])))
        .unwrap();
        tx.send(testkit::bin(gone.finish(IN_USER_REMOVED))).unwrap();

        Handshake::new(&writer, &mut inbound, &mut room, &timings)
            .run("tkt", 208)
            .await
            .unwrap();
        assert_eq!(view.usernames().await, vec!["claude".to_string()]);
        assert_eq!(view.name_of(3).await, None);
        drop(tx);
    }

    #[tokio::test(start_paused = true)]
    async fn missing_auth_marker_is_fatal() {
        let (writer, mut sent) = testkit::writer();
        let (tx, mut inbound) = testkit::inbound();
        let (mut room, _view) = room_state("claude");
        let timings = fast();

        let mut hs = Handshake::new(&writer, &mut inbound, &mut room, &timings);
        let err = hs.run("tkt", 208).await.unwrap_err();
        assert!(matches!(
            err,
            SessionError::Handshake(HandshakeError::Timeout {
                state: HandshakeState::TicketSent
            })
        ));
        // Nothing room-related went out.
        assert_eq!(testkit::drain_headers(&mut sent).len(), 3);
        drop(tx);
    }

    #[tokio::test]
    async fn empty_ticket_fails_before_sending() {
        let (writer, mut sent) = testkit::writer();
        let (_tx, mut inbound) = testkit::inbound();
        let (mut room, _view) = room_state("claude");
        let timings = fast();

        let mut hs = Handshake::new(&writer, &mut inbound, &mut room, &timings);
        let err = hs.authenticate("  ").await.unwrap_err();
        assert!(matches!(
            err,
            SessionError::Handshake(HandshakeError::AuthFailed(_))
        ));
        assert!(testkit::drain_headers(&mut sent).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn close_during_join_is_connection_closed() {
        let (writer, _sent) = testkit::writer();
        let (tx, mut inbound) = testkit::inbound();
        let (mut room, _view) = room_state("claude");
        let timings = fast();

        tx.send(testkit::bin(Frame::empty(IN_AUTHENTICATED))).unwrap();
        drop(tx);

        let mut hs = Handshake::new(&writer, &mut inbound, &mut room, &timings);
        hs.authenticate("tkt").await.unwrap();
        assert!(matches!(
            hs.join(208).await,
            Err(SessionError::ConnectionClosed(_))
        ));
    }
}
