//! The single inbound loop.
//!
//! Reads frames, keeps the occupant table current, answers pings inline and
//! turns chat traffic and arrivals into [`ChatEvent`]s for the responder.
//! A frame that fails to decode is logged and skipped; only a lost
//! connection ends the loop.

use std::time::Duration;

use hotelproto::chat::{ChatKind, parse_chat};
use hotelproto::client::ClientMsg;
use hotelproto::headers::{Inbound as In, classify};
use hotelwire::Frame;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

use crate::error::SessionError;
use crate::occupants::RoomWriter;
use crate::transport::{Inbound, Writer};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Chat,
    Shout,
    Whisper,
    Arrival,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatEvent {
    pub kind: EventKind,
    pub sender_id: i32,
    pub sender_name: String,
    /// Empty for arrivals.
    pub text: String,
}

pub struct Listener {
    inbound: Inbound,
    writer: Writer,
    room: RoomWriter,
    events: mpsc::UnboundedSender<ChatEvent>,
    loaded_at: Instant,
}

impl Listener {
    /// Snapshots arriving before `settle` has passed are part of the initial
    /// room load and raise no arrival events.
    pub fn new(
        inbound: Inbound,
        writer: Writer,
        room: RoomWriter,
        events: mpsc::UnboundedSender<ChatEvent>,
        settle: Duration,
    ) -> Self {
        Self {
            inbound,
            writer,
            room,
            events,
            loaded_at: Instant::now() + settle,
        }
    }

    fn room_loaded(&self) -> bool {
        Instant::now() >= self.loaded_at
    }

    /// Runs until the connection is lost; the error says why.
    pub async fn run(mut self) -> SessionError {
        loop {
            let frame = match self.inbound.next_frame().await {
                Ok(f) => f,
                Err(e) => {
                    info!(err = %e, "listener stopping");
                    return e;
                }
            };
            if let Err(e) = self.handle_frame(frame).await {
                if e.is_fatal() {
                    return e;
                }
                warn!(err = %e, "frame handling failed");
            }
        }
    }

    pub(crate) async fn handle_frame(&mut self, frame: Frame) -> Result<(), SessionError> {
        match classify(frame.header) {
            In::Ping => self.writer.send(ClientMsg::Pong).await?,
            In::RoomUsers => self.on_snapshot(&frame).await,
            In::UserUpdated => {
                self.room.apply_position_update(&frame.payload).await;
            }
            In::UserRemoved => match self.room.apply_departure(&frame.payload).await {
                Ok(Some(o)) => info!(user = %o.username, tid = o.transient_id, "left"),
                Ok(None) => {}
                Err(e) => warn!(err = %e, "bad departure notice"),
            },
            In::Chat | In::Shout | In::Whisper => self.on_chat(&frame).await,
            In::Authenticated => debug!("late authenticated marker"),
            In::Other(h) => trace!(header = h, len = frame.payload.len(), "ignored"),
        }
        Ok(())
    }

    async fn on_snapshot(&mut self, frame: &Frame) {
        let out = self.room.apply_room_snapshot(&frame.payload).await;
        if let Some(e) = &out.stopped_early {
            warn!(parsed = out.parsed, err = %e, "room snapshot cut short; later records dropped");
        }
        if !self.room_loaded() {
            return;
        }

        let view = self.room.view();
        let self_id = view.self_id().await;
        for (tid, name) in out.arrivals {
            if Some(tid) == self_id || view.is_bot_name(&name).await {
                continue;
            }
            info!(user = %name, tid, "entered");
            self.push(ChatEvent {
                kind: EventKind::Arrival,
                sender_id: tid,
                sender_name: name,
                text: String::new(),
            });
        }
    }

    async fn on_chat(&mut self, frame: &Frame) {
        let Some(kind) = ChatKind::from_header(frame.header) else {
            return;
        };
        let msg = match parse_chat(kind, &frame.payload) {
            Ok(m) => m,
            Err(e) => {
                warn!(header = frame.header, err = %e, "chat parse failed");
                return;
            }
        };

        let view = self.room.view();
        if Some(msg.transient_id) == view.self_id().await {
            trace!("own echo");
            return;
        }
        let sender_name = view
            .name_of(msg.transient_id)
            .await
            .unwrap_or_else(|| format!("User#{}", msg.transient_id));
        let kind = match msg.kind {
            ChatKind::Chat => EventKind::Chat,
            ChatKind::Shout => EventKind::Shout,
            ChatKind::Whisper => EventKind::Whisper,
        };
        info!(kind = ?kind, from = %sender_name, text = %msg.text, "heard");
        self.push(ChatEvent {
            kind,
            sender_id: msg.transient_id,
            sender_name,
            text: msg.text,
        });
    }

    fn push(&self, ev: ChatEvent) {
        if self.events.send(ev).is_err() {
            debug!("responder gone; event dropped");
        }
    }
}
