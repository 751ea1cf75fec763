//! Scripted content: everything that makes one bot different from another.
//!
//! A persona is pure data loaded from JSON. The engine only interprets it:
//! the responder walks `routes` and the greeting tables, the ambient loop runs
//! whichever `ambient` script is present.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

use crate::error::SessionError;

#[derive(Debug, Clone, Deserialize)]
pub struct Persona {
    /// Display name; a message "names the bot" when it contains this
    /// (case-insensitive).
    pub name: String,
    #[serde(default)]
    pub greeting_words: Vec<String>,
    /// `{name}` is replaced with the sender's name.
    #[serde(default)]
    pub greeting_templates: Vec<String>,
    /// Messages with at most this many words count as a plain greeting even
    /// when they don't name the bot.
    #[serde(default = "default_greeting_max_words")]
    pub greeting_max_words: usize,
    #[serde(default)]
    pub arrival: Option<ArrivalScript>,
    #[serde(default)]
    pub routes: Vec<KeywordRoute>,
    #[serde(default)]
    pub ai: Option<AiPersona>,
    #[serde(default)]
    pub announce: Option<Speech>,
    #[serde(default)]
    pub farewell: Option<Speech>,
    pub ambient: AmbientScript,
}

fn default_greeting_max_words() -> usize {
    3
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Speech {
    Chat(String),
    Shout(String),
}

#[derive(Debug, Clone, Deserialize)]
pub struct ArrivalScript {
    pub templates: Vec<String>,
    #[serde(default = "default_arrival_delay")]
    pub delay_secs: f64,
}

fn default_arrival_delay() -> f64 {
    1.5
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Pattern {
    /// Any phrase occurs anywhere in the message.
    Contains(Vec<String>),
    /// The whole trimmed message equals one of the phrases.
    Exact(Vec<String>),
}

impl Pattern {
    /// `text` must already be lowercased and trimmed.
    pub fn matches(&self, text: &str) -> bool {
        match self {
            Pattern::Contains(ps) => ps.iter().any(|p| text.contains(p.as_str())),
            Pattern::Exact(ps) => ps.iter().any(|p| text == p),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteAction {
    Dance,
    Wave,
    Follow,
    Sign,
}

#[derive(Debug, Clone, Deserialize)]
pub struct KeywordRoute {
    pub when: Pattern,
    pub action: RouteAction,
    #[serde(default)]
    pub line: Option<String>,
    /// Dance routes only: how long to dance before stopping.
    #[serde(default = "default_dance_hold")]
    pub hold_secs: f64,
}

fn default_dance_hold() -> f64 {
    8.0
}

#[derive(Debug, Clone, Deserialize)]
pub struct AiPersona {
    pub system_prompt: String,
    #[serde(default = "default_history_turns")]
    pub history_turns: usize,
    #[serde(default = "default_chunk_chars")]
    pub chunk_chars: usize,
    #[serde(default = "default_chunk_delay")]
    pub chunk_delay_secs: f64,
    #[serde(default = "default_fallback")]
    pub fallback: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

fn default_history_turns() -> usize {
    6
}
fn default_chunk_chars() -> usize {
    100
}
fn default_chunk_delay() -> f64 {
    1.5
}
fn default_fallback() -> String {
    "hmm idk lol".to_string()
}
fn default_max_tokens() -> u32 {
    150
}
fn default_temperature() -> f32 {
    0.8
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AmbientScript {
    Roam(RoamScript),
    Route(RouteScript),
    Build(BuildScript),
}

/// Weighted random behaviour: dance, wave, idle remark, otherwise patrol.
#[derive(Debug, Clone, Deserialize)]
pub struct RoamScript {
    #[serde(default = "default_roam_settle")]
    pub settle_secs: f64,
    #[serde(default = "default_dance_weight")]
    pub dance_weight: f64,
    #[serde(default = "default_wave_weight")]
    pub wave_weight: f64,
    #[serde(default = "default_idle_weight")]
    pub idle_weight: f64,
    #[serde(default = "default_dance_range")]
    pub dance_secs: [f64; 2],
    #[serde(default = "default_pause_range")]
    pub pause_secs: [f64; 2],
    #[serde(default)]
    pub idle_lines: Vec<String>,
    pub waypoints: Vec<[i32; 2]>,
}

fn default_roam_settle() -> f64 {
    15.0
}
fn default_dance_weight() -> f64 {
    0.12
}
fn default_wave_weight() -> f64 {
    0.08
}
fn default_idle_weight() -> f64 {
    0.08
}
fn default_dance_range() -> [f64; 2] {
    [6.0, 12.0]
}
fn default_pause_range() -> [f64; 2] {
    [10.0, 25.0]
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepAction {
    Walk,
    Wave,
    Dance,
    Sign,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RouteStep {
    pub pos: [i32; 2],
    pub action: StepAction,
    /// Shout a random hype line after the action.
    #[serde(default)]
    pub hype: bool,
    pub pause_secs: f64,
}

/// A cyclic walk with actions at each stop.
#[derive(Debug, Clone, Deserialize)]
pub struct RouteScript {
    pub steps: Vec<RouteStep>,
    #[serde(default)]
    pub hype_lines: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BuildStep {
    /// Inventory item id.
    pub item_id: i32,
    /// Furniture type, only used to name the item in logs.
    pub type_id: i32,
    pub x: i32,
    pub y: i32,
    #[serde(default)]
    pub rotation: i32,
    #[serde(default)]
    pub walk_to: Option<[i32; 2]>,
    #[serde(default)]
    pub comment: Option<String>,
    /// Reposition an item already in the room instead of placing from inventory.
    #[serde(default)]
    pub move_existing: bool,
}

/// A one-shot placement plan bounded by `duration_secs`.
#[derive(Debug, Clone, Deserialize)]
pub struct BuildScript {
    #[serde(default = "default_build_duration")]
    pub duration_secs: u64,
    #[serde(default)]
    /// Keyed by furniture type id in decimal.
    pub item_names: HashMap<String, String>,
    pub steps: Vec<BuildStep>,
    /// Shouted after the plan; `{placed}` and `{secs}` are filled in.
    #[serde(default)]
    pub finish: Option<String>,
    #[serde(default = "default_celebrate_style")]
    pub celebrate_style: i32,
    #[serde(default = "default_celebrate_secs")]
    pub celebrate_secs: f64,
}

fn default_build_duration() -> u64 {
    300
}
fn default_celebrate_style() -> i32 {
    2
}
fn default_celebrate_secs() -> f64 {
    10.0
}

impl BuildScript {
    pub fn item_name(&self, type_id: i32) -> String {
        self.item_names
            .get(&type_id.to_string())
            .cloned()
            .unwrap_or_else(|| format!("item#{type_id}"))
    }
}

impl Persona {
    pub fn from_json(s: &str) -> Result<Self, SessionError> {
        let mut p: Persona = serde_json::from_str(s)
            .map_err(|e| SessionError::Config(format!("persona: {e}")))?;
        p.normalize();
        p.validate()?;
        Ok(p)
    }

    pub fn load(path: &Path) -> Result<Self, SessionError> {
        let s = std::fs::read_to_string(path)
            .map_err(|e| SessionError::Config(format!("read {}: {e}", path.display())))?;
        Self::from_json(&s)
    }

    /// Case-insensitive "does this message name the bot".
    pub fn is_named_in(&self, text_lc: &str) -> bool {
        let n = self.name.trim().to_lowercase();
        !n.is_empty() && text_lc.contains(&n)
    }

    fn normalize(&mut self) {
        for w in &mut self.greeting_words {
            *w = w.trim().to_lowercase();
        }
        for r in &mut self.routes {
            match &mut r.when {
                Pattern::Contains(ps) | Pattern::Exact(ps) => {
                    for p in ps {
                        *p = p.trim().to_lowercase();
                    }
                }
            }
        }
    }

    fn validate(&self) -> Result<(), SessionError> {
        let bad = |m: &str| -> Result<(), SessionError> {
            Err(SessionError::Config(format!("persona {}: {m}", self.name)))
        };

        if !self.greeting_words.is_empty() && self.greeting_templates.is_empty() {
            return bad("greeting_words without greeting_templates");
        }
        if self.arrival.as_ref().is_some_and(|a| a.templates.is_empty()) {
            return bad("arrival needs at least one template");
        }
        if self.arrival.as_ref().is_some_and(|a| !is_delay(a.delay_secs)) {
            return bad("arrival delay_secs must be non-negative");
        }
        if self.routes.iter().any(|r| !is_delay(r.hold_secs)) {
            return bad("route hold_secs must be non-negative");
        }
        if self.ai.as_ref().is_some_and(|a| !is_delay(a.chunk_delay_secs)) {
            return bad("ai chunk_delay_secs must be non-negative");
        }
        match &self.ambient {
            AmbientScript::Roam(r) => {
                let w = r.dance_weight + r.wave_weight + r.idle_weight;
                if [r.dance_weight, r.wave_weight, r.idle_weight]
                    .iter()
                    .any(|x| *x < 0.0)
                    || w > 1.0
                {
                    return bad("roam weights must be non-negative and sum to at most 1");
                }
                if r.waypoints.is_empty() {
                    return bad("roam needs at least one waypoint");
                }
                if r.idle_weight > 0.0 && r.idle_lines.is_empty() {
                    return bad("idle_weight set but no idle_lines");
                }
                if r.dance_secs[0] > r.dance_secs[1] || r.pause_secs[0] > r.pause_secs[1] {
                    return bad("ranges must be [low, high]");
                }
            }
            AmbientScript::Route(r) => {
                if r.steps.is_empty() {
                    return bad("route needs at least one step");
                }
                if r.steps.iter().any(|s| s.hype) && r.hype_lines.is_empty() {
                    return bad("hype steps but no hype_lines");
                }
            }
            AmbientScript::Build(b) => {
                if b.steps.is_empty() {
                    return bad("build plan is empty");
                }
            }
        }
        Ok(())
    }
}

fn is_delay(secs: f64) -> bool {
    secs.is_finite() && secs >= 0.0
}

/// Fill `{name}` in a template.
pub fn fill_name(template: &str, name: &str) -> String {
    template.replace("{name}", name)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"{
        "name": "Claude",
        "greeting_words": ["Hi", "hello"],
        "greeting_templates": ["Welcome! {name}!"],
        "routes": [
            {"when": {"contains": ["Dance"]}, "action": "dance", "line": "sure"},
            {"when": {"exact": ["wave", "wave!"]}, "action": "wave"}
        ],
        "ambient": {"kind": "roam", "waypoints": [[1, 2]], "idle_weight": 0}
    }"#;

    #[test]
    fn parses_and_normalizes() {
        let p = Persona::from_json(MINIMAL).unwrap();
        assert_eq!(p.greeting_words, vec!["hi", "hello"]);
        assert_eq!(p.greeting_max_words, 3);
        assert!(p.routes[0].when.matches("lets dance"));
        assert!(p.routes[1].when.matches("wave!"));
        assert!(!p.routes[1].when.matches("wave at me"));
        assert_eq!(p.routes[0].hold_secs, 8.0);
        assert!(p.is_named_in("hey claude"));
        match &p.ambient {
            AmbientScript::Roam(r) => {
                assert_eq!(r.settle_secs, 15.0);
                assert_eq!(r.pause_secs, [10.0, 25.0]);
            }
            other => panic!("unexpected ambient: {other:?}"),
        }
    }

    #[test]
    fn rejects_inconsistent_scripts() {
        let no_templates = r#"{"name":"x","greeting_words":["hi"],
            "ambient":{"kind":"roam","waypoints":[[1,1]],"idle_weight":0}}"#;
        assert!(Persona::from_json(no_templates).is_err());

        let heavy = r#"{"name":"x","ambient":{"kind":"roam","waypoints":[[1,1]],
            "dance_weight":0.9,"wave_weight":0.9,"idle_weight":0}}"#;
        assert!(Persona::from_json(heavy).is_err());

        let hype = r#"{"name":"x","ambient":{"kind":"route",
            "steps":[{"pos":[1,1],"action":"walk","hype":true,"pause_secs":1}]}}"#;
        assert!(Persona::from_json(hype).is_err());

        assert!(Persona::from_json("{").is_err());

        let roam = r#""ambient":{"kind":"roam","waypoints":[[1,1]],"idle_weight":0}"#;
        for bad in [
            r#""arrival":{"templates":["hi {name}"],"delay_secs":-1}"#,
            r#""routes":[{"when":{"contains":["dance"]},"action":"dance","hold_secs":-0.5}]"#,
            r#""ai":{"system_prompt":"x","chunk_delay_secs":-2}"#,
        ] {
            let json = format!(r#"{{"name":"x",{bad},{roam}}}"#);
            assert!(Persona::from_json(&json).is_err(), "accepted {bad}");
        }
    }

    #[test]
    fn shipped_personas_load() {
        for (file, s) in [
            ("concierge", include_str!("../../../personas/concierge.json")),
            ("bartender", include_str!("../../../personas/bartender.json")),
            ("builder", include_str!("../../../personas/builder.json")),
        ] {
            let p = Persona::from_json(s).unwrap_or_else(|e| panic!("{file}: {e}"));
            match (file, &p.ambient) {
                ("concierge", AmbientScript::Roam(r)) => {
                    assert_eq!(r.waypoints.len(), 7);
                    assert!(p.ai.is_some());
                }
                ("bartender", AmbientScript::Route(r)) => assert_eq!(r.steps.len(), 16),
                ("builder", AmbientScript::Build(b)) => {
                    assert_eq!(b.steps.len(), 50);
                    assert_eq!(b.item_name(2958), "dance floor tile");
                    assert_eq!(b.item_name(1), "item#1");
                }
                (f, a) => panic!("{f}: unexpected ambient {a:?}"),
            }
        }
    }
}
