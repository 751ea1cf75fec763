//! Shared entry point for the bot binaries: flag parsing and the launch
//! sequence (persona, instance lock, ticket, backend, session).

use std::path::PathBuf;
use std::sync::Arc;

use tokio::time::Instant;
use tracing::{info, warn};

use crate::ai::{ChatBackend, OpenAiBackend};
use crate::config::{
    Config, DEFAULT_AI_MODEL, DEFAULT_AI_URL, DEFAULT_ORIGIN, DEFAULT_WS_URL, Defaults,
};
use crate::error::SessionError;
use crate::lock::InstanceLock;
use crate::persona::Persona;
use crate::session::{SessionEnd, run_session};
use crate::ticket::TicketSource;

pub fn usage(bin: &str, d: &Defaults) -> String {
    format!(
        "{bin}

USAGE:
  {bin} [--ws URL] [--origin ORIGIN] [--room ID] [--username NAME]
  {pad} [--persona PATH] [--lock PATH] [--ticket T | --ticket-cmd CMD]

ENV:
  HOTEL_WS_URL         default {ws}
  HOTEL_ORIGIN         default {origin}
  HOTEL_ROOM_ID        default {room}
  HOTEL_USERNAME       default {user}
  HOTEL_LOCK_FILE      default {lock}
  HOTEL_PERSONA        persona JSON path (default: embedded)
  HOTEL_TICKET         static auth ticket
  HOTEL_TICKET_CMD     shell command printing a ticket; {{ticket}} is substituted
  HOTEL_TICKET_PREFIX  default HotelBot
  OPENROUTER_KEY       enables AI replies for personas with an ai section
  OPENROUTER_MODEL     default {model}
  OPENROUTER_URL       default {url}
",
        pad = " ".repeat(bin.len()),
        ws = DEFAULT_WS_URL,
        origin = DEFAULT_ORIGIN,
        room = d.room_id,
        user = d.username,
        lock = d.lock_file,
        model = DEFAULT_AI_MODEL,
        url = DEFAULT_AI_URL,
    )
}

fn usage_and_exit(bin: &str, d: &Defaults) -> ! {
    eprintln!("{}", usage(bin, d));
    std::process::exit(2);
}

/// Apply `--flag value` overrides on top of an env-derived config.
/// `Err` means the arguments were not understood (or help was asked for).
pub fn apply_args(cfg: &mut Config, args: impl IntoIterator<Item = String>) -> Result<(), String> {
    let mut it = args.into_iter();
    while let Some(arg) = it.next() {
        let mut value = || it.next().ok_or_else(|| format!("{arg} needs a value"));
        match arg.as_str() {
            "--ws" => cfg.ws_url = value()?,
            "--origin" => cfg.origin = value()?,
            "--room" => {
                let v = value()?;
                cfg.room_id = v.trim().parse().map_err(|_| format!("bad room id {v:?}"))?;
            }
            "--username" => cfg.username = value()?,
            "--persona" => cfg.persona_path = Some(PathBuf::from(value()?)),
            "--lock" => cfg.lock_file = PathBuf::from(value()?),
            "--ticket" => cfg.ticket = Some(TicketSource::Static(value()?)),
            "--ticket-cmd" => {
                let cmd = value()?;
                let prefix = match &cfg.ticket {
                    Some(TicketSource::Command { prefix, .. }) => prefix.clone(),
                    _ => "HotelBot".to_string(),
                };
                cfg.ticket = Some(TicketSource::Command { cmd, prefix });
            }
            "-h" | "--help" => return Err("help".into()),
            other => return Err(format!("unknown argument {other:?}")),
        }
    }
    Ok(())
}

/// Environment plus process arguments; prints usage and exits 2 on bad input.
pub fn parse_args(bin: &str, d: &Defaults) -> Config {
    let mut cfg = match Config::from_env(d) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{bin}: {e}");
            usage_and_exit(bin, d);
        }
    };
    if let Err(e) = apply_args(&mut cfg, std::env::args().skip(1)) {
        if e != "help" {
            eprintln!("{bin}: {e}");
        }
        usage_and_exit(bin, d);
    }
    cfg
}

/// Load the persona, take the instance lock, fetch a ticket and run one
/// session. Ctrl-C ends the session as `Closed`.
pub async fn launch(cfg: Config, embedded_persona: &str) -> Result<SessionEnd, SessionError> {
    let started = Instant::now();
    let persona = match &cfg.persona_path {
        Some(p) => Persona::load(p)?,
        None => Persona::from_json(embedded_persona)?,
    };
    info!(persona = %persona.name, room = cfg.room_id, user = %cfg.username, "starting");

    let lock = InstanceLock::acquire(&cfg.lock_file)?;

    let Some(source) = cfg.ticket.clone() else {
        return Err(SessionError::Config(
            "no ticket source: set HOTEL_TICKET or HOTEL_TICKET_CMD".into(),
        ));
    };
    let ticket = source.fetch(&cfg.username).await?;

    let backend: Option<Arc<dyn ChatBackend>> = match (&persona.ai, cfg.ai.enabled()) {
        (Some(_), true) => Some(Arc::new(OpenAiBackend::new(&cfg.ai)?)),
        (Some(_), false) => {
            warn!("OPENROUTER_KEY unset; directed messages will go unanswered");
            None
        }
        (None, _) => None,
    };

    let end = tokio::select! {
        r = run_session(&cfg, Arc::new(persona), &ticket, backend, started) => r,
        _ = tokio::signal::ctrl_c() => {
            info!("interrupted");
            Ok(SessionEnd::Closed)
        }
    };
    drop(lock);
    end
}

#[cfg(test)]
mod tests {
    use super::*;

    const D: Defaults = Defaults {
        room_id: 208,
        username: "claude",
        lock_file: "/tmp/hotelbot-test.lock",
    };

    fn args(a: &[&str]) -> Vec<String> {
        a.iter().map(|s| s.to_string()).collect()
    }

    fn base() -> Config {
        Config::from_lookup(&D, |_| None).unwrap()
    }

    #[test]
    fn flags_override_env() {
        let mut cfg = base();
        apply_args(
            &mut cfg,
            args(&["--ws", "ws://h:1", "--room", "206", "--username", "dude", "--ticket", "t"]),
        )
        .unwrap();
        assert_eq!(cfg.ws_url, "ws://h:1");
        assert_eq!(cfg.room_id, 206);
        assert_eq!(cfg.username, "dude");
        assert!(matches!(cfg.ticket, Some(TicketSource::Static(ref t)) if t == "t"));
    }

    #[test]
    fn bad_arguments_are_rejected() {
        assert!(apply_args(&mut base(), args(&["--room", "abc"])).is_err());
        assert!(apply_args(&mut base(), args(&["--ws"])).is_err());
        assert!(apply_args(&mut base(), args(&["--nope"])).is_err());
        assert_eq!(apply_args(&mut base(), args(&["-h"])), Err("help".into()));
    }

    #[test]
    fn usage_mentions_defaults() {
        let u = usage("concierge_bot", &D);
        assert!(u.contains("default 208"));
        assert!(u.contains("default claude"));
        assert!(u.contains("{ticket}"));
    }

    #[tokio::test]
    async fn launch_without_ticket_source_fails_before_connecting() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut cfg = base();
        cfg.lock_file = dir.path().join("bot.lock");
        let persona = r#"{"name":"x","ambient":{"kind":"roam","waypoints":[[1,1]],"idle_weight":0}}"#;
        let err = launch(cfg, persona).await.unwrap_err();
        assert!(matches!(err, SessionError::Config(_)));
        assert!(!dir.path().join("bot.lock").exists());
    }
}
