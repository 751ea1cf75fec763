//! In-memory transports and frame builders for unit tests.

use futures_util::{sink, stream};
use hotelwire::{Frame, PayloadWriter, decode_frames};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Error as WsError;
use tokio_tungstenite::tungstenite::protocol::Message;

use crate::transport::{Inbound, Writer};

/// A writer whose messages land in the returned receiver.
pub fn writer() -> (Writer, mpsc::UnboundedReceiver<Message>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let sink = sink::unfold(tx, |tx, msg: Message| async move {
        tx.send(msg).map_err(|_| WsError::ConnectionClosed)?;
        Ok::<_, WsError>(tx)
    });
    (Writer::new(sink), rx)
}

/// An inbound reader fed from the returned sender. Dropping the sender ends
/// the stream.
pub fn inbound() -> (mpsc::UnboundedSender<Message>, Inbound) {
    let (tx, rx) = mpsc::unbounded_channel::<Message>();
    let s = stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|m| (Ok::<_, WsError>(m), rx))
    });
    (tx, Inbound::new(s))
}

pub fn bin(f: Frame) -> Message {
    Message::Binary(f.encode().to_vec())
}

/// Each outbound transport message carries exactly one frame.
pub fn frame_of(m: Message) -> Frame {
    let b = match m {
        Message::Binary(b) => b,
        other => panic!("expected binary message, got {other:?}"),
    };
    let (mut frames, used) = decode_frames(&b).unwrap();
    assert_eq!(used, b.len());
    assert_eq!(frames.len(), 1);
    frames.remove(0)
}

pub fn drain_frames(rx: &mut mpsc::UnboundedReceiver<Message>) -> Vec<Frame> {
    let mut out = Vec::new();
    while let Ok(m) = rx.try_recv() {
        out.push(frame_of(m));
    }
    out
}

pub fn drain_headers(rx: &mut mpsc::UnboundedReceiver<Message>) -> Vec<u16> {
    drain_frames(rx).into_iter().map(|f| f.header).collect()
}

/// A room users snapshot of "legacy" occupants `(transient_id, name, x, y)`.
pub fn snapshot(users: &[(i32, &str, i32, i32)]) -> Frame {
    let mut w = PayloadWriter::new();
    w.put_i32(users.len() as i32);
    for (tid, name, x, y) in users {
        w.put_i32(tid + 100);
        w.put_str(name).unwrap();
        w.put_str("").unwrap();
        w.put_str("hr-100").unwrap();
        w.put_i32(*tid).put_i32(*x).put_i32(*y);
        w.put_str("0.0").unwrap();
        w.put_i32(2).put_i32(2);
        w.put_str("legacy").unwrap();
        w.put_str("F").unwrap();
        w.put_i32(-1).put_i32(-1);
        w.put_str("").unwrap();
        w.put_str("").unwrap();
        w.put_i32(0).put_bool(false);
    }
    w.finish(hotelproto::headers::IN_ROOM_USERS)
}

/// An inbound chat-family frame from `tid`.
pub fn chat(header: u16, tid: i32, text: &str) -> Frame {
    let mut w = PayloadWriter::new();
    w.put_i32(tid);
    w.put_str(text).unwrap();
    w.put_i32(0).put_i32(0).put_i32(0).put_i32(-1);
    w.finish(header)
}

/// Decode an outbound chat/shout payload's text.
pub fn text_of(f: &Frame) -> String {
    f.reader().read_string().unwrap()
}
