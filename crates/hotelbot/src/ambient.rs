//! Unsolicited, self-paced behaviour.
//!
//! Runs one [`AmbientScript`] from the persona. Every frame waits for the
//! responder's busy flag to clear first, and every sleep ends early on
//! shutdown.

use std::sync::Arc;
use std::time::Duration;

use hotelproto::client::{ClientMsg, DANCE_STOP, EXPRESSION_WAVE};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::SessionError;
use crate::persona::{
    AmbientScript, BuildScript, Persona, RoamScript, RouteScript, Speech, StepAction,
};
use crate::session::SessionEnd;
use crate::signal::{BusySignal, Shutdown};
use crate::transport::Writer;

pub struct Ambient {
    writer: Writer,
    busy: BusySignal,
    shutdown: Shutdown,
    persona: Arc<Persona>,
    /// Build time limits count from here.
    started: Instant,
    rng: StdRng,
}

/// `Ok(false)` from a step means shutdown was requested mid-way.
type Step = Result<bool, SessionError>;

impl Ambient {
    pub fn new(writer: Writer, busy: BusySignal, shutdown: Shutdown, persona: Arc<Persona>) -> Self {
        Self {
            writer,
            busy,
            shutdown,
            persona,
            started: Instant::now(),
            rng: StdRng::from_entropy(),
        }
    }

    /// Count the build time limit from `at` (process start) instead of now.
    pub fn started_at(mut self, at: Instant) -> Self {
        self.started = at;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    /// Returns `Finished` when a one-shot script completes, `Closed` when
    /// stopped by shutdown.
    pub async fn run(mut self) -> Result<SessionEnd, SessionError> {
        let persona = self.persona.clone();
        if let Some(s) = &persona.announce {
            self.emit(&[speech(s)]).await?;
            info!(line = ?s, "announced");
        }

        let done = match &persona.ambient {
            AmbientScript::Roam(r) => self.roam(r).await?,
            AmbientScript::Route(r) => self.route(r).await?,
            AmbientScript::Build(b) => self.build(b).await?,
        };
        if !done {
            return Ok(SessionEnd::Closed);
        }

        if let Some(s) = &persona.farewell {
            self.emit(&[speech(s)]).await?;
            self.pace_secs(3.0).await;
        }
        Ok(SessionEnd::Finished)
    }

    /// Send `msgs` as one burst, but only while the responder is idle.
    async fn emit(&self, msgs: &[ClientMsg]) -> Result<(), SessionError> {
        loop {
            self.busy.await_free().await?;
            let mut burst = self.writer.lock().await;
            if self.busy.is_busy() {
                continue;
            }
            return match burst.send_all(msgs).await {
                Err(e) if !e.is_fatal() => {
                    warn!(err = %e, "skipping ambient action");
                    Ok(())
                }
                r => r,
            };
        }
    }

    async fn pace_secs(&self, secs: f64) -> bool {
        self.shutdown
            .pace(Duration::try_from_secs_f64(secs).unwrap_or_default())
            .await
    }

    fn between(&mut self, range: [f64; 2]) -> f64 {
        self.rng.gen_range(range[0]..=range[1])
    }

    async fn roam(&mut self, r: &RoamScript) -> Step {
        if !self.pace_secs(r.settle_secs).await {
            return Ok(false);
        }
        let mut wp = 0usize;
        loop {
            let roll: f64 = self.rng.r#gen();
            if roll < r.dance_weight {
                let style = self.rng.gen_range(1..=4);
                self.emit(&[ClientMsg::Dance { style }]).await?;
                info!(style, "ambient dance");
                let hold = self.between(r.dance_secs);
                if !self.pace_secs(hold).await {
                    return Ok(false);
                }
                self.emit(&[ClientMsg::Dance { style: DANCE_STOP }]).await?;
            } else if roll < r.dance_weight + r.wave_weight {
                self.emit(&[ClientMsg::Expression {
                    id: EXPRESSION_WAVE,
                }])
                .await?;
                info!("ambient wave");
                if !self.pace_secs(3.0).await {
                    return Ok(false);
                }
            } else if roll < r.dance_weight + r.wave_weight + r.idle_weight {
                if let Some(line) = r.idle_lines.choose(&mut self.rng).cloned() {
                    info!(line = %line, "ambient remark");
                    self.emit(&[ClientMsg::chat(line)]).await?;
                }
                if !self.pace_secs(5.0).await {
                    return Ok(false);
                }
            } else {
                let [x, y] = r.waypoints[wp % r.waypoints.len()];
                wp += 1;
                self.emit(&[ClientMsg::MoveAvatar { x, y }]).await?;
                info!(x, y, "patrol");
            }

            let pause = self.between(r.pause_secs);
            if !self.pace_secs(pause).await {
                return Ok(false);
            }
        }
    }

    async fn route(&mut self, r: &RouteScript) -> Step {
        if !self.pace_secs(3.0).await {
            return Ok(false);
        }
        let mut dancing = false;
        let mut lap = 0u64;
        loop {
            lap += 1;
            debug!(lap, "route lap");
            for step in &r.steps {
                let [x, y] = step.pos;
                if dancing && step.action != StepAction::Dance {
                    self.emit(&[ClientMsg::Dance { style: DANCE_STOP }]).await?;
                    dancing = false;
                    if !self.pace_secs(1.0).await {
                        return Ok(false);
                    }
                }

                self.emit(&[ClientMsg::MoveAvatar { x, y }]).await?;
                if !self.pace_secs(step.pause_secs.min(3.0)).await {
                    return Ok(false);
                }

                match step.action {
                    StepAction::Walk => {}
                    StepAction::Wave => {
                        self.emit(&[ClientMsg::Expression {
                            id: EXPRESSION_WAVE,
                        }])
                        .await?;
                        info!(x, y, "waves");
                    }
                    StepAction::Dance if !dancing => {
                        let style = self.rng.gen_range(1..=4);
                        self.emit(&[ClientMsg::Dance { style }]).await?;
                        dancing = true;
                        info!(x, y, style, "dancing");
                    }
                    StepAction::Dance => {}
                    StepAction::Sign => {
                        let id = self.rng.gen_range(0..=10);
                        self.emit(&[ClientMsg::Sign { id }]).await?;
                        info!(x, y, sign = id, "holds up sign");
                    }
                }

                if step.hype {
                    if let Some(line) = r.hype_lines.choose(&mut self.rng).cloned() {
                        info!(x, y, line = %line, "hype");
                        self.emit(&[ClientMsg::shout(line)]).await?;
                    }
                }

                if !self.pace_secs(step.pause_secs - 3.0).await {
                    return Ok(false);
                }
            }
        }
    }

    async fn build(&mut self, b: &BuildScript) -> Step {
        let started = self.started;
        let limit = Duration::from_secs(b.duration_secs);
        if !self.pace_secs(3.0).await {
            return Ok(false);
        }

        let mut placed = 0usize;
        for step in &b.steps {
            if started.elapsed() >= limit {
                info!(placed, "time limit reached; stopping build");
                break;
            }
            if let Some([wx, wy]) = step.walk_to {
                self.emit(&[ClientMsg::MoveAvatar { x: wx, y: wy }]).await?;
                if !self.pace_secs(3.0).await {
                    return Ok(false);
                }
            }
            if let Some(c) = &step.comment {
                self.emit(&[ClientMsg::chat(c.clone())]).await?;
                info!(x = step.x, y = step.y, item = %b.item_name(step.type_id), "{c}");
                if !self.pace_secs(1.0).await {
                    return Ok(false);
                }
            }

            let msg = if step.move_existing {
                ClientMsg::MoveObject {
                    item_id: step.item_id,
                    x: step.x,
                    y: step.y,
                    rotation: step.rotation,
                }
            } else {
                ClientMsg::PlaceObject {
                    item_id: step.item_id,
                    x: step.x,
                    y: step.y,
                    rotation: step.rotation,
                }
            };
            self.emit(&[msg]).await?;
            placed += 1;
            if !self.pace_secs(2.0).await {
                return Ok(false);
            }
        }

        let secs = started.elapsed().as_secs();
        info!(placed, secs, "build complete");
        if let Some(t) = &b.finish {
            let line = t
                .replace("{placed}", &placed.to_string())
                .replace("{secs}", &secs.to_string());
            self.emit(&[ClientMsg::shout(line)]).await?;
        }

        self.emit(&[ClientMsg::Dance {
            style: b.celebrate_style,
        }])
        .await?;
        if !self.pace_secs(b.celebrate_secs).await {
            return Ok(false);
        }
        self.emit(&[ClientMsg::Dance { style: DANCE_STOP }]).await?;

        let left = limit.saturating_sub(started.elapsed());
        if !left.is_zero() {
            info!(secs = left.as_secs(), "idling until the time limit");
            if !self.shutdown.pace(left).await {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

fn speech(s: &Speech) -> ClientMsg {
    match s {
        Speech::Chat(t) => ClientMsg::chat(t.clone()),
        Speech::Shout(t) => ClientMsg::shout(t.clone()),
    }
}
