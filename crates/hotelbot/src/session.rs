//! Task supervisor: one connection, three tasks.
//!
//! After the handshake the listener, responder and ambient loop run side by
//! side. The first one to finish decides the outcome; the rest are stopped,
//! waiters on the busy flag are woken, and the socket is closed.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::ai::ChatBackend;
use crate::ambient::Ambient;
use crate::config::Config;
use crate::error::SessionError;
use crate::handshake::Handshake;
use crate::listener::Listener;
use crate::occupants::room_state;
use crate::persona::Persona;
use crate::responder::Responder;
use crate::signal::{BusySignal, Shutdown};
use crate::transport::{self, Inbound, Writer};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// The connection went away (or shutdown was requested).
    Closed,
    /// A one-shot script ran to completion.
    Finished,
}

/// Connect, join, and serve until the session ends. `started` is when the
/// process began; scripted time limits count from it.
pub async fn run_session(
    cfg: &Config,
    persona: Arc<Persona>,
    ticket: &str,
    backend: Option<Arc<dyn ChatBackend>>,
    started: Instant,
) -> Result<SessionEnd, SessionError> {
    if ticket.trim().is_empty() {
        return Err(crate::error::HandshakeError::AuthFailed("empty ticket".into()).into());
    }
    info!(url = %cfg.ws_url, room = cfg.room_id, user = %cfg.username, "connecting");
    let (writer, inbound) =
        transport::connect(&cfg.ws_url, &cfg.origin, cfg.timings.connect_timeout).await?;
    info!("connected");
    serve(writer, inbound, cfg, persona, ticket, backend, started).await
}

/// Run a session over an already-open connection.
pub async fn serve(
    writer: Writer,
    mut inbound: Inbound,
    cfg: &Config,
    persona: Arc<Persona>,
    ticket: &str,
    backend: Option<Arc<dyn ChatBackend>>,
    started: Instant,
) -> Result<SessionEnd, SessionError> {
    let (mut room, view) = room_state(&cfg.username);

    let joined = Handshake::new(&writer, &mut inbound, &mut room, &cfg.timings)
        .run(ticket, cfg.room_id)
        .await;
    if let Err(e) = joined {
        writer.close().await;
        return Err(e);
    }
    info!(
        room = cfg.room_id,
        self_id = ?view.self_id().await,
        users = ?view.usernames().await,
        "in room"
    );

    let busy = BusySignal::new();
    let shutdown = Shutdown::new();
    let (ev_tx, ev_rx) = mpsc::unbounded_channel();

    let listener = Listener::new(inbound, writer.clone(), room, ev_tx, cfg.timings.settle);
    let responder = Responder::new(
        writer.clone(),
        view,
        busy.clone(),
        shutdown.clone(),
        persona.clone(),
        backend,
        &cfg.ai,
    );
    let ambient =
        Ambient::new(writer.clone(), busy.clone(), shutdown.clone(), persona).started_at(started);

    let mut tasks: JoinSet<(&'static str, Result<SessionEnd, SessionError>)> = JoinSet::new();
    tasks.spawn(async move { ("listener", Err(listener.run().await)) });
    tasks.spawn(async move {
        ("responder", responder.run(ev_rx).await.map(|()| SessionEnd::Closed))
    });
    tasks.spawn(async move { ("ambient", ambient.run().await) });

    let outcome = match tasks.join_next().await {
        Some(Ok((task, res))) => {
            info!(task, "session task finished first");
            res
        }
        Some(Err(e)) => Err(SessionError::Task(e.to_string())),
        None => Ok(SessionEnd::Closed),
    };

    shutdown.trigger();
    busy.close();
    tasks.abort_all();
    while tasks.join_next().await.is_some() {}
    writer.close().await;

    match outcome {
        Err(SessionError::ConnectionClosed(why)) => {
            info!(reason = %why, "connection closed");
            Ok(SessionEnd::Closed)
        }
        Err(e) => {
            warn!(err = %e, "session failed");
            Err(e)
        }
        Ok(end) => {
            info!(?end, "session over");
            Ok(end)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use futures_util::{SinkExt, StreamExt};
    use hotelproto::headers::*;
    use hotelwire::Frame;
    use tokio_tungstenite::tungstenite::protocol::Message;

    use super::*;
    use crate::config::{AiConfig, Timings};
    use crate::testkit;

    const PERSONA: &str = r#"{
        "name": "claude",
        "greeting_words": ["hi", "hello"],
        "greeting_templates": ["Hi! Nice to see you! {name}!"],
        "ambient": {"kind": "roam", "settle_secs": 3600, "waypoints": [[1, 1]], "idle_weight": 0}
    }"#;

    fn cfg(url: String) -> Config {
        Config {
            ws_url: url,
            origin: "https://localhost".into(),
            room_id: 208,
            username: "claude".into(),
            lock_file: "/tmp/unused.lock".into(),
            persona_path: None,
            ticket: None,
            ai: AiConfig::default(),
            timings: Timings {
                connect_timeout: Duration::from_secs(5),
                auth_timeout: Duration::from_secs(5),
                quiet: Duration::from_millis(100),
                phase_cap: Duration::from_secs(2),
                settle: Duration::ZERO,
            },
        }
    }

    async fn next_frame<S>(ws: &mut S) -> Frame
    where
        S: futures_util::Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>>
            + Unpin,
    {
        loop {
            match ws.next().await.expect("client open").expect("read") {
                m @ Message::Binary(_) => return testkit::frame_of(m),
                _ => continue,
            }
        }
    }

    async fn read_until<S>(ws: &mut S, header: u16) -> Vec<u16>
    where
        S: futures_util::Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>>
            + Unpin,
    {
        let mut seen = Vec::new();
        loop {
            let f = next_frame(ws).await;
            seen.push(f.header);
            if f.header == header {
                return seen;
            }
        }
    }

    #[tokio::test]
    async fn loopback_websocket_end_to_end() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();

            let hs = read_until(&mut ws, OUT_SECURITY_TICKET).await;
            assert_eq!(hs, vec![OUT_SECURITY_MACHINE, OUT_CLIENT_VARIABLES, OUT_SECURITY_TICKET]);
            // Ping first: it must be answered even mid-handshake.
            ws.send(testkit::bin(Frame::empty(IN_SERVER_PING))).await.unwrap();
            ws.send(testkit::bin(Frame::empty(IN_AUTHENTICATED))).await.unwrap();
            assert_eq!(next_frame(&mut ws).await.header, OUT_CLIENT_PONG);

            read_until(&mut ws, OUT_GET_ROOM_ENTRY_DATA).await;
            // Snapshot split across two transport messages.
            let snap = testkit::snapshot(&[(3, "alice", 4, 4), (7, "claude", 5, 5)]).encode();
            ws.send(Message::Binary(snap[..9].to_vec())).await.unwrap();
            ws.send(Message::Binary(snap[9..].to_vec())).await.unwrap();

            // Let the join window close so the listener owns the stream.
            tokio::time::sleep(Duration::from_millis(600)).await;
            ws.send(testkit::bin(testkit::chat(IN_CHAT, 7, "hello"))).await.unwrap();
            ws.send(testkit::bin(testkit::chat(IN_CHAT, 3, "hello"))).await.unwrap();

            let wave = next_frame(&mut ws).await;
            let greet = next_frame(&mut ws).await;
            ws.close(None).await.unwrap();
            (wave, greet)
        });

        let (writer, inbound) = transport::connect(
            &format!("ws://{addr}"),
            "https://localhost",
            Duration::from_secs(5),
        )
        .await
        .unwrap();
        let c = cfg(format!("ws://{addr}"));
        let persona = Arc::new(Persona::from_json(PERSONA).unwrap());
        let end = tokio::time::timeout(
            Duration::from_secs(20),
            serve(writer, inbound, &c, persona, "tkt", None, Instant::now()),
        )
        .await
        .expect("session ended")
        .unwrap();
        assert_eq!(end, SessionEnd::Closed);

        let (wave, greet) = server.await.unwrap();
        assert_eq!(wave.header, OUT_EXPRESSION);
        assert_eq!(greet.header, OUT_CHAT);
        assert_eq!(testkit::text_of(&greet), "Hi! Nice to see you! alice!");
    }

    #[tokio::test(start_paused = true)]
    async fn finished_script_ends_the_session() {
        let (writer, mut sent) = testkit::writer();
        let (tx, inbound) = testkit::inbound();
        tx.send(testkit::bin(Frame::empty(IN_AUTHENTICATED))).unwrap();

        let persona = Arc::new(
            Persona::from_json(
                r#"{"name":"dude","ambient":{"kind":"build","duration_secs":60,"celebrate_secs":1,
                    "steps":[{"item_id":1,"type_id":1,"x":1,"y":1}]}}"#,
            )
            .unwrap(),
        );
        let c = cfg("ws://unused".into());
        let end = serve(writer, inbound, &c, persona, "tkt", None, Instant::now())
            .await
            .unwrap();
        assert_eq!(end, SessionEnd::Finished);
        assert!(testkit::drain_headers(&mut sent).contains(&OUT_PLACE_OBJECT));
        drop(tx);
    }

    #[tokio::test(start_paused = true)]
    async fn handshake_failure_is_returned() {
        let (writer, _sent) = testkit::writer();
        let (_tx, inbound) = testkit::inbound();
        let persona = Arc::new(Persona::from_json(PERSONA).unwrap());
        let c = cfg("ws://unused".into());
        let err = serve(writer, inbound, &c, persona, "tkt", None, Instant::now())
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::Handshake(_)));
    }
}
