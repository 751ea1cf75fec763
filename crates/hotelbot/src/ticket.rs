use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{debug, info};

use crate::error::{HandshakeError, SessionError};

/// Where the one-shot auth ticket comes from.
#[derive(Clone)]
pub enum TicketSource {
    Static(String),
    /// Run `cmd` through `sh -c`. Any `{ticket}` in it is replaced with a
    /// freshly generated ticket first (so the command can store it
    /// server-side); the command's trimmed stdout wins when non-empty.
    Command { cmd: String, prefix: String },
}

impl std::fmt::Debug for TicketSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TicketSource::Static(_) => f.debug_tuple("Static").field(&"<redacted>").finish(),
            TicketSource::Command { cmd, prefix } => f
                .debug_struct("Command")
                .field("cmd", cmd)
                .field("prefix", prefix)
                .finish(),
        }
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

pub fn generate_ticket(prefix: &str, username: &str) -> String {
    format!("{prefix}-{username}-{}", unix_now())
}

impl TicketSource {
    pub async fn fetch(&self, username: &str) -> Result<String, SessionError> {
        let ticket = match self {
            TicketSource::Static(t) => t.trim().to_string(),
            TicketSource::Command { cmd, prefix } => {
                let fresh = generate_ticket(prefix, username);
                let cmd = cmd.replace("{ticket}", &fresh);
                debug!(cmd = %cmd, "running ticket command");
                let out = tokio::process::Command::new("sh")
                    .arg("-c")
                    .arg(&cmd)
                    .output()
                    .await
                    .map_err(|e| SessionError::Ticket(format!("spawn: {e}")))?;
                if !out.status.success() {
                    let stderr = String::from_utf8_lossy(&out.stderr);
                    return Err(SessionError::Ticket(format!(
                        "command exited with {}: {}",
                        out.status,
                        stderr.trim()
                    )));
                }
                let stdout = String::from_utf8_lossy(&out.stdout).trim().to_string();
                if stdout.is_empty() { fresh } else { stdout }
            }
        };
        if ticket.is_empty() {
            return Err(HandshakeError::AuthFailed("empty ticket".into()).into());
        }
        info!(len = ticket.len(), "ticket ready");
        Ok(ticket)
    }
}
