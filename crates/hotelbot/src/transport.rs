//! The shared connection: one write gate, one inbound frame reader.
//!
//! Every outbound frame goes through [`Writer`], which serialises sends behind
//! a single mutex. Multi-frame actions take the gate once with
//! [`Writer::lock`] (or [`Writer::send_all`]) so no other producer's frame can
//! land in the middle of them.

use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{Sink, SinkExt, Stream, StreamExt};
use hotelproto::client::ClientMsg;
use hotelwire::{Frame, FrameBuf};
use tokio_tungstenite::tungstenite::Error as WsError;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::protocol::Message;
use tracing::{debug, trace};

use crate::error::SessionError;

pub type BoxSink = Pin<Box<dyn Sink<Message, Error = WsError> + Send>>;
pub type BoxStream = Pin<Box<dyn Stream<Item = Result<Message, WsError>> + Send>>;

#[derive(Clone)]
pub struct Writer {
    sink: Arc<tokio::sync::Mutex<BoxSink>>,
}

impl Writer {
    pub fn new<S>(sink: S) -> Self
    where
        S: Sink<Message, Error = WsError> + Send + 'static,
    {
        Self {
            sink: Arc::new(tokio::sync::Mutex::new(Box::pin(sink))),
        }
    }

    /// Hold the gate across several sends.
    pub async fn lock(&self) -> Burst<'_> {
        Burst {
            sink: self.sink.lock().await,
        }
    }

    pub async fn send(&self, msg: ClientMsg) -> Result<(), SessionError> {
        self.send_all(std::slice::from_ref(&msg)).await
    }

    /// Send `msgs` back to back as one critical section.
    pub async fn send_all(&self, msgs: &[ClientMsg]) -> Result<(), SessionError> {
        self.lock().await.send_all(msgs).await
    }

    pub async fn close(&self) {
        let mut sink = self.sink.lock().await;
        let _ = sink.close().await;
    }
}

impl std::fmt::Debug for Writer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Writer").finish_non_exhaustive()
    }
}

pub struct Burst<'a> {
    sink: tokio::sync::MutexGuard<'a, BoxSink>,
}

impl Burst<'_> {
    /// Encodes everything first, so an over-long string sends nothing.
    pub async fn send_all(&mut self, msgs: &[ClientMsg]) -> Result<(), SessionError> {
        let frames = msgs
            .iter()
            .map(ClientMsg::to_frame)
            .collect::<Result<Vec<_>, _>>()?;
        for f in frames {
            trace!(header = f.header, len = f.payload.len(), "send");
            self.sink
                .send(Message::Binary(f.encode().to_vec()))
                .await
                .map_err(|e| SessionError::ConnectionClosed(e.to_string()))?;
        }
        Ok(())
    }
}

/// Inbound side: transport messages in, complete frames out.
pub struct Inbound {
    stream: BoxStream,
    buf: FrameBuf,
    ready: VecDeque<Frame>,
}

impl Inbound {
    pub fn new<S>(stream: S) -> Self
    where
        S: Stream<Item = Result<Message, WsError>> + Send + 'static,
    {
        Self {
            stream: Box::pin(stream),
            buf: FrameBuf::new(),
            ready: VecDeque::new(),
        }
    }

    /// Next complete frame. Partial frames stay buffered across transport
    /// messages. Cancel-safe: nothing is lost if the future is dropped.
    pub async fn next_frame(&mut self) -> Result<Frame, SessionError> {
        loop {
            if let Some(f) = self.ready.pop_front() {
                return Ok(f);
            }
            match self.stream.next().await {
                None => return Err(SessionError::ConnectionClosed("stream ended".into())),
                Some(Err(e)) => return Err(SessionError::ConnectionClosed(e.to_string())),
                Some(Ok(Message::Binary(b))) => {
                    let frames = self.buf.push(&b).map_err(|e| {
                        SessionError::ConnectionClosed(format!("unrecoverable framing: {e}"))
                    })?;
                    if frames.is_empty() {
                        trace!(buffered = self.buf.buffered(), "partial frame");
                    }
                    self.ready.extend(frames);
                }
                Some(Ok(Message::Close(cf))) => {
                    let why = cf
                        .map(|c| format!("closed by server ({}) {}", u16::from(c.code), c.reason))
                        .unwrap_or_else(|| "closed by server".to_string());
                    return Err(SessionError::ConnectionClosed(why));
                }
                Some(Ok(_)) => {}
            }
        }
    }
}

/// Open the websocket with an `Origin` header and split it.
pub async fn connect(
    url: &str,
    origin: &str,
    timeout: Duration,
) -> Result<(Writer, Inbound), SessionError> {
    let mut req = url
        .into_client_request()
        .map_err(|e| SessionError::Transport(format!("{url}: {e}")))?;
    let origin = HeaderValue::from_str(origin)
        .map_err(|e| SessionError::Config(format!("origin {origin:?}: {e}")))?;
    req.headers_mut().insert("Origin", origin);

    let (ws, _) = tokio::time::timeout(timeout, tokio_tungstenite::connect_async(req))
        .await
        .map_err(|_| SessionError::Transport(format!("connect {url}: timed out")))?
        .map_err(|e| SessionError::Transport(format!("connect {url}: {e}")))?;
    debug!(url, "websocket open");

    let (sink, stream) = ws.split();
    Ok((Writer::new(sink), Inbound::new(stream)))
}
