//! Event consumer: decides how to react to each queued [`ChatEvent`].
//!
//! Policy, first match wins:
//! 1. arrival: greet after a short delay;
//! 2. keyword route: dance / wave / follow / sign, optionally with a line;
//! 3. greeting word in a short message (or one naming the bot);
//! 4. directed message (names the bot, or a whisper): ask the AI backend;
//! 5. otherwise nothing.
//!
//! The busy flag is held for the whole of each event.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use hotelproto::client::{ClientMsg, DANCE_STOP, EXPRESSION_WAVE};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::ai::{BackendError, ChatBackend, ChatRequest, Role, Turn, chunk_message};
use crate::config::AiConfig;
use crate::error::SessionError;
use crate::listener::{ChatEvent, EventKind};
use crate::occupants::RoomView;
use crate::persona::{AiPersona, KeywordRoute, Persona, RouteAction, fill_name};
use crate::signal::{BusySignal, Shutdown};
use crate::transport::Writer;

pub struct Responder {
    writer: Writer,
    view: RoomView,
    busy: BusySignal,
    shutdown: Shutdown,
    persona: Arc<Persona>,
    backend: Option<Arc<dyn ChatBackend>>,
    ai_timeout: Duration,
    /// Per sender name, most recent last.
    histories: HashMap<String, VecDeque<Turn>>,
    rng: StdRng,
}

impl Responder {
    pub fn new(
        writer: Writer,
        view: RoomView,
        busy: BusySignal,
        shutdown: Shutdown,
        persona: Arc<Persona>,
        backend: Option<Arc<dyn ChatBackend>>,
        ai: &AiConfig,
    ) -> Self {
        Self {
            writer,
            view,
            busy,
            shutdown,
            persona,
            backend,
            ai_timeout: ai.timeout,
            histories: HashMap::new(),
            rng: StdRng::from_entropy(),
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn history(&self, sender: &str) -> Option<&VecDeque<Turn>> {
        self.histories.get(sender)
    }

    /// Consume events until the queue closes or the session shuts down.
    pub async fn run(
        mut self,
        mut events: mpsc::UnboundedReceiver<ChatEvent>,
    ) -> Result<(), SessionError> {
        loop {
            let ev = tokio::select! {
                ev = events.recv() => ev,
                _ = self.shutdown.wait() => None,
            };
            let Some(ev) = ev else {
                return Ok(());
            };
            let busy = self.busy.clone();
            let _guard = busy.hold();
            if let Err(e) = self.handle(&ev).await {
                if e.is_fatal() {
                    return Err(e);
                }
                warn!(from = %ev.sender_name, err = %e, "reply failed");
            }
        }
    }

    pub async fn handle(&mut self, ev: &ChatEvent) -> Result<(), SessionError> {
        if ev.kind == EventKind::Arrival {
            return self.greet_arrival(ev).await;
        }

        let text_lc = ev.text.trim().to_lowercase();
        if let Some(route) = self
            .persona
            .routes
            .iter()
            .find(|r| r.when.matches(&text_lc))
            .cloned()
        {
            return self.perform(ev, &route).await;
        }

        if self.is_greeting(&text_lc) {
            let Some(t) = self.persona.greeting_templates.choose(&mut self.rng) else {
                return Ok(());
            };
            let line = fill_name(t, &ev.sender_name);
            info!(to = %ev.sender_name, "greeting");
            return self
                .writer
                .send_all(&[
                    ClientMsg::Expression {
                        id: EXPRESSION_WAVE,
                    },
                    reply_to(ev, line),
                ])
                .await;
        }

        let directed = ev.kind == EventKind::Whisper || self.persona.is_named_in(&text_lc);
        if directed {
            if let Some(ai) = self.persona.ai.clone() {
                return self.converse(ev, &ai).await;
            }
        }
        debug!(from = %ev.sender_name, "no reaction");
        Ok(())
    }

    async fn greet_arrival(&mut self, ev: &ChatEvent) -> Result<(), SessionError> {
        let Some(arrival) = self.persona.arrival.clone() else {
            return Ok(());
        };
        if !self
            .shutdown
            .pace(delay(arrival.delay_secs))
            .await
        {
            return Ok(());
        }
        let Some(t) = arrival.templates.choose(&mut self.rng) else {
            return Ok(());
        };
        self.writer
            .send_all(&[
                ClientMsg::Expression {
                    id: EXPRESSION_WAVE,
                },
                ClientMsg::chat(fill_name(t, &ev.sender_name)),
            ])
            .await?;
        info!(user = %ev.sender_name, "greeted arrival");
        Ok(())
    }

    async fn perform(&mut self, ev: &ChatEvent, route: &KeywordRoute) -> Result<(), SessionError> {
        let line = route.line.as_ref().map(|l| reply_to(ev, fill_name(l, &ev.sender_name)));
        let action = match route.action {
            RouteAction::Dance => ClientMsg::Dance {
                style: self.rng.gen_range(1..=4),
            },
            RouteAction::Wave => ClientMsg::Expression {
                id: EXPRESSION_WAVE,
            },
            RouteAction::Sign => ClientMsg::Sign {
                id: self.rng.gen_range(0..=10),
            },
            RouteAction::Follow => match self.view.position_of(ev.sender_id).await {
                Some((x, y)) => ClientMsg::MoveAvatar { x, y },
                None => {
                    debug!(from = %ev.sender_name, "follow: sender position unknown");
                    return Ok(());
                }
            },
        };
        info!(action = ?route.action, from = %ev.sender_name, "keyword");

        let mut burst = vec![action];
        burst.extend(line);
        self.writer.send_all(&burst).await?;

        if route.action == RouteAction::Dance {
            self.shutdown
                .pace(delay(route.hold_secs))
                .await;
            self.writer
                .send(ClientMsg::Dance { style: DANCE_STOP })
                .await?;
        }
        Ok(())
    }

    fn is_greeting(&self, text_lc: &str) -> bool {
        if self.persona.greeting_words.is_empty() {
            return false;
        }
        let cleaned = text_lc.replace(['!', '?'], "").replace([',', '.'], " ");
        let words = cleaned.split_whitespace().collect::<Vec<_>>();
        let has_word = words
            .iter()
            .any(|w| self.persona.greeting_words.iter().any(|g| g == w));
        has_word
            && (self.persona.is_named_in(text_lc) || words.len() <= self.persona.greeting_max_words)
    }

    async fn converse(&mut self, ev: &ChatEvent, ai: &AiPersona) -> Result<(), SessionError> {
        let Some(backend) = self.backend.clone() else {
            debug!("directed message but no backend configured");
            return Ok(());
        };

        let user_turn = Turn::new(Role::User, format!("{}: {}", ev.sender_name, ev.text));
        let mut messages = vec![Turn::new(Role::System, ai.system_prompt.clone())];
        if let Some(h) = self.histories.get(&ev.sender_name) {
            messages.extend(h.iter().cloned());
        }
        messages.push(user_turn.clone());
        let req = ChatRequest {
            messages,
            max_tokens: ai.max_tokens,
            temperature: ai.temperature,
        };

        let reply = match tokio::time::timeout(self.ai_timeout, backend.complete(&req)).await {
            Err(_) => Err(BackendError::Timeout),
            Ok(r) => r,
        };
        let reply = match reply {
            Ok(r) => r,
            Err(e) => {
                warn!(from = %ev.sender_name, err = %e, "backend failed; using fallback");
                return self.writer.send(reply_to(ev, ai.fallback.clone())).await;
            }
        };

        let h = self.histories.entry(ev.sender_name.clone()).or_default();
        h.push_back(user_turn);
        h.push_back(Turn::new(Role::Assistant, reply.clone()));
        while h.len() > ai.history_turns {
            h.pop_front();
        }

        let chunks = chunk_message(&reply, ai.chunk_chars);
        let n = chunks.len();
        for (i, chunk) in chunks.into_iter().enumerate() {
            info!(to = %ev.sender_name, text = %chunk, "reply");
            self.writer.send(reply_to(ev, chunk)).await?;
            if i + 1 < n
                && !self
                    .shutdown
                    .pace(delay(ai.chunk_delay_secs))
                    .await
            {
                break;
            }
        }
        Ok(())
    }
}

/// Negative or non-finite persona delays count as no delay.
fn delay(secs: f64) -> Duration {
    Duration::try_from_secs_f64(secs).unwrap_or_default()
}

/// Whispers are answered privately, everything else in open chat.
fn reply_to(ev: &ChatEvent, text: String) -> ClientMsg {
    match ev.kind {
        EventKind::Whisper => ClientMsg::Whisper {
            to: ev.sender_name.clone(),
            text,
        },
        _ => ClientMsg::chat(text),
    }
}
