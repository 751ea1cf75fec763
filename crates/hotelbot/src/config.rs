use std::path::PathBuf;
use std::time::Duration;

use crate::error::SessionError;
use crate::ticket::TicketSource;

pub const DEFAULT_WS_URL: &str = "ws://127.0.0.1:2096";
pub const DEFAULT_ORIGIN: &str = "https://localhost";
pub const DEFAULT_AI_URL: &str = "https://openrouter.ai/api/v1/chat/completions";
pub const DEFAULT_AI_MODEL: &str = "openai/gpt-4o-mini";

/// Per-binary defaults for the identity-specific keys.
#[derive(Debug, Clone, Copy)]
pub struct Defaults {
    pub room_id: i32,
    pub username: &'static str,
    pub lock_file: &'static str,
}

/// Bounds for the connect and join sequence.
#[derive(Debug, Clone)]
pub struct Timings {
    pub connect_timeout: Duration,
    /// How long to wait for the authenticated marker after sending the ticket.
    pub auth_timeout: Duration,
    /// A drain window ends once nothing has arrived for this long...
    pub quiet: Duration,
    /// ...or when this much time has passed since the phase began.
    pub phase_cap: Duration,
    /// Snapshots received within this long of entering the room are treated
    /// as part of the initial load and produce no arrival events.
    pub settle: Duration,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            auth_timeout: Duration::from_secs(5),
            quiet: Duration::from_secs(3),
            phase_cap: Duration::from_secs(10),
            settle: Duration::from_secs(2),
        }
    }
}

#[derive(Clone)]
pub struct AiConfig {
    pub api_key: String,
    pub model: String,
    pub url: String,
    pub timeout: Duration,
}

impl AiConfig {
    pub fn enabled(&self) -> bool {
        !self.api_key.trim().is_empty()
    }
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: DEFAULT_AI_MODEL.to_string(),
            url: DEFAULT_AI_URL.to_string(),
            timeout: Duration::from_secs(10),
        }
    }
}

impl std::fmt::Debug for AiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AiConfig")
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .field("url", &self.url)
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[derive(Clone, Debug)]
pub struct Config {
    pub ws_url: String,
    pub origin: String,
    pub room_id: i32,
    /// Matched case-insensitively against room occupants to find ourselves.
    pub username: String,
    pub lock_file: PathBuf,
    /// Persona JSON override; the binary's embedded persona is used when unset.
    pub persona_path: Option<PathBuf>,
    pub ticket: Option<TicketSource>,
    pub ai: AiConfig,
    pub timings: Timings,
}

impl Config {
    pub fn from_env(d: &Defaults) -> Result<Self, SessionError> {
        Self::from_lookup(d, |k| std::env::var(k).ok())
    }

    /// Resolve configuration from `lookup` (the environment in production).
    /// Empty values count as unset.
    pub fn from_lookup(
        d: &Defaults,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, SessionError> {
        let get = |k: &str| lookup(k).filter(|v| !v.trim().is_empty());

        let room_id = match get("HOTEL_ROOM_ID") {
            Some(v) => v
                .trim()
                .parse()
                .map_err(|_| SessionError::Config(format!("HOTEL_ROOM_ID: bad room id {v:?}")))?,
            None => d.room_id,
        };

        let ticket = match (get("HOTEL_TICKET"), get("HOTEL_TICKET_CMD")) {
            (Some(t), _) => Some(TicketSource::Static(t)),
            (None, Some(cmd)) => Some(TicketSource::Command {
                cmd,
                prefix: get("HOTEL_TICKET_PREFIX").unwrap_or_else(|| "HotelBot".to_string()),
            }),
            (None, None) => None,
        };

        let ai = AiConfig {
            api_key: get("OPENROUTER_KEY").unwrap_or_default(),
            model: get("OPENROUTER_MODEL").unwrap_or_else(|| DEFAULT_AI_MODEL.to_string()),
            url: get("OPENROUTER_URL").unwrap_or_else(|| DEFAULT_AI_URL.to_string()),
            ..AiConfig::default()
        };

        Ok(Self {
            ws_url: get("HOTEL_WS_URL").unwrap_or_else(|| DEFAULT_WS_URL.to_string()),
            origin: get("HOTEL_ORIGIN").unwrap_or_else(|| DEFAULT_ORIGIN.to_string()),
            room_id,
            username: get("HOTEL_USERNAME").unwrap_or_else(|| d.username.to_string()),
            lock_file: get("HOTEL_LOCK_FILE")
                .unwrap_or_else(|| d.lock_file.to_string())
                .into(),
            persona_path: get("HOTEL_PERSONA").map(PathBuf::from),
            ticket,
            ai,
            timings: Timings::default(),
        })
    }
}
