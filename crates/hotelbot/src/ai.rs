//! Conversational replies from an OpenAI-compatible chat completions API.

use futures_util::future::BoxFuture;
use reqwest::StatusCode;
use serde::Serialize;
use tracing::warn;

use crate::config::AiConfig;
use crate::error::SessionError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

impl Turn {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub messages: Vec<Turn>,
    pub max_tokens: u32,
    pub temperature: f32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    Timeout,
    Http(u16),
    Transport(String),
    /// A 200 response without usable content.
    Empty,
}

impl std::fmt::Display for BackendError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendError::Timeout => write!(f, "timed out"),
            BackendError::Http(s) => write!(f, "http={s}"),
            BackendError::Transport(e) => write!(f, "transport: {e}"),
            BackendError::Empty => write!(f, "empty completion"),
        }
    }
}

impl std::error::Error for BackendError {}

/// Anything that can turn a conversation into one reply.
pub trait ChatBackend: Send + Sync {
    fn complete<'a>(&'a self, req: &'a ChatRequest) -> BoxFuture<'a, Result<String, BackendError>>;
}

pub struct OpenAiBackend {
    client: reqwest::Client,
    url: String,
    api_key: String,
    model: String,
}

impl OpenAiBackend {
    pub fn new(cfg: &AiConfig) -> Result<Self, SessionError> {
        let client = reqwest::Client::builder()
            .timeout(cfg.timeout)
            .build()
            .map_err(|e| SessionError::Config(format!("http client: {e}")))?;
        Ok(Self {
            client,
            url: cfg.url.clone(),
            api_key: cfg.api_key.clone(),
            model: cfg.model.clone(),
        })
    }

    async fn post(&self, req: &ChatRequest) -> Result<String, BackendError> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": req.messages,
            "max_tokens": req.max_tokens,
            "temperature": req.temperature,
        });

        let resp = self
            .client
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(map_reqwest)?;
        let status = resp.status();
        let text = resp.text().await.map_err(map_reqwest)?;
        if status != StatusCode::OK {
            let snippet: String = text.chars().take(200).collect();
            warn!(status = status.as_u16(), body = %snippet, "completion failed");
            return Err(BackendError::Http(status.as_u16()));
        }
        parse_completion(&text)
    }
}

impl ChatBackend for OpenAiBackend {
    fn complete<'a>(&'a self, req: &'a ChatRequest) -> BoxFuture<'a, Result<String, BackendError>> {
        Box::pin(self.post(req))
    }
}

fn map_reqwest(e: reqwest::Error) -> BackendError {
    if e.is_timeout() {
        BackendError::Timeout
    } else {
        BackendError::Transport(e.to_string())
    }
}

/// Pull `choices[0].message.content` out of a completion body.
pub fn parse_completion(body: &str) -> Result<String, BackendError> {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.get("choices")?
                .as_array()?
                .first()?
                .get("message")?
                .get("content")?
                .as_str()
                .map(|s| s.trim().to_string())
        })
        .filter(|s| !s.is_empty())
        .ok_or(BackendError::Empty)
}

/// Split `text` on word boundaries into pieces of at most `max_chars`
/// characters. A single word longer than that is kept whole.
pub fn chunk_message(text: &str, max_chars: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut cur = String::new();
    let mut cur_len = 0;
    for word in text.split_whitespace() {
        let wl = word.chars().count();
        if !cur.is_empty() && cur_len + 1 + wl > max_chars {
            chunks.push(std::mem::take(&mut cur));
            cur_len = 0;
        }
        if !cur.is_empty() {
            cur.push(' ');
            cur_len += 1;
        }
        cur.push_str(word);
        cur_len += wl;
    }
    if !cur.is_empty() {
        chunks.push(cur);
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_first_choice() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":"  Welcome aboard! "}}]}"#;
        assert_eq!(parse_completion(body).unwrap(), "Welcome aboard!");
        assert_eq!(parse_completion(r#"{"choices":[]}"#), Err(BackendError::Empty));
        assert_eq!(
            parse_completion(r#"{"choices":[{"message":{"content":"   "}}]}"#),
            Err(BackendError::Empty)
        );
        assert_eq!(parse_completion("not json"), Err(BackendError::Empty));
    }

    #[test]
    fn chunks_on_word_boundaries() {
        let text = "the quick brown fox jumps over the lazy dog";
        let chunks = chunk_message(text, 15);
        assert_eq!(chunks, vec!["the quick brown", "fox jumps over", "the lazy dog"]);
        assert!(chunks.iter().all(|c| c.chars().count() <= 15));
        assert_eq!(chunks.join(" "), text);
    }

    #[test]
    fn chunk_edge_cases() {
        assert_eq!(chunk_message("short", 100), vec!["short"]);
        assert!(chunk_message("   ", 100).is_empty());
        assert_eq!(
            chunk_message("a supercalifragilistic b", 5),
            vec!["a", "supercalifragilistic", "b"]
        );
    }

    #[test]
    fn roles_serialize_lowercase() {
        let v = serde_json::to_value(Turn::new(Role::Assistant, "hi")).unwrap();
        assert_eq!(v, serde_json::json!({"role": "assistant", "content": "hi"}));
    }
}
