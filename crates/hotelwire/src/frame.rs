use bytes::Buf;
use bytes::BufMut;
use bytes::Bytes;
use bytes::BytesMut;

use crate::WireError;
use crate::payload::PayloadReader;

/// Size of the length prefix.
pub const LEN_PREFIX: usize = 4;
/// Size of the header id that starts every frame body.
pub const HEADER_LEN: usize = 2;

pub const DEFAULT_MAX_FRAME_LEN: usize = 8 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub header: u16,
    pub payload: Bytes,
}

impl Frame {
    pub fn new(header: u16, payload: impl Into<Bytes>) -> Self {
        Self {
            header,
            payload: payload.into(),
        }
    }

    /// A frame with no payload (pong, room entry data request).
    pub fn empty(header: u16) -> Self {
        Self {
            header,
            payload: Bytes::new(),
        }
    }

    pub fn encode(&self) -> Bytes {
        encode_frame(self.header, &self.payload)
    }

    pub fn reader(&self) -> PayloadReader<'_> {
        PayloadReader::new(&self.payload)
    }
}

/// Encode one frame: `u32` length (`2 + payload.len()`), `u16` header, payload.
///
/// The codec enforces no upper bound on the payload; callers that care use
/// [`FrameBuf::max_frame_len`] on the receiving side.
///
/// Panics if the payload is 4 GiB or more.
pub fn encode_frame(header: u16, payload: &[u8]) -> Bytes {
    let len = u32::try_from(HEADER_LEN + payload.len()).expect("frame length exceeds u32");
    let mut b = BytesMut::with_capacity(LEN_PREFIX + HEADER_LEN + payload.len());
    b.put_u32(len);
    b.put_u16(header);
    b.put_slice(payload);
    b.freeze()
}

/// `u16` big-endian byte length followed by the UTF-8 bytes.
pub fn encode_string(s: &str) -> Result<Bytes, WireError> {
    let len = u16::try_from(s.len()).map_err(|_| WireError::StringTooLong(s.len()))?;
    let mut b = BytesMut::with_capacity(2 + s.len());
    b.put_u16(len);
    b.put_slice(s.as_bytes());
    Ok(b.freeze())
}

pub fn encode_int32(n: i32) -> [u8; 4] {
    n.to_be_bytes()
}

/// Declared body length of the frame starting at `buf[0]`, if the prefix is present.
fn declared_len(buf: &[u8]) -> Option<usize> {
    if buf.len() < LEN_PREFIX {
        return None;
    }
    Some(u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize)
}

/// Decode every complete frame at the front of `buf`.
///
/// Returns the frames and the number of bytes they occupied. Bytes past that
/// offset belong to a frame that has not fully arrived and must be kept for
/// the next read. A declared length below [`HEADER_LEN`] is an error only when
/// it is the first frame; otherwise the frames before it are returned and the
/// error surfaces on the next call.
pub fn decode_frames(buf: &[u8]) -> Result<(Vec<Frame>, usize), WireError> {
    let mut frames = Vec::new();
    let mut off = 0;

    while let Some(len) = declared_len(&buf[off..]) {
        if len < HEADER_LEN {
            if frames.is_empty() {
                return Err(WireError::BadLength(len));
            }
            break;
        }
        if buf.len() - off - LEN_PREFIX < len {
            break;
        }

        let body = &buf[off + LEN_PREFIX..off + LEN_PREFIX + len];
        frames.push(Frame {
            header: u16::from_be_bytes([body[0], body[1]]),
            payload: Bytes::copy_from_slice(&body[HEADER_LEN..]),
        });
        off += LEN_PREFIX + len;
    }

    Ok((frames, off))
}

/// Persistent accumulator for inbound transport chunks.
///
/// Append every chunk with [`FrameBuf::push`]; it returns the frames that are
/// now complete and keeps any trailing partial frame buffered.
#[derive(Debug)]
pub struct FrameBuf {
    buf: BytesMut,
    max_frame_len: usize,
}

impl Default for FrameBuf {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameBuf {
    pub fn new() -> Self {
        Self {
            buf: BytesMut::with_capacity(8 * 1024),
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
        }
    }

    pub fn max_frame_len(mut self, max: usize) -> Self {
        self.max_frame_len = max.max(HEADER_LEN);
        self
    }

    /// Bytes held that do not yet form a complete frame.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    pub fn push(&mut self, chunk: &[u8]) -> Result<Vec<Frame>, WireError> {
        self.buf.extend_from_slice(chunk);
        let mut out = Vec::new();
        while let Some(f) = self.next_frame()? {
            out.push(f);
        }
        Ok(out)
    }

    /// Split one complete frame off the front of the buffer.
    ///
    /// Returns `Ok(None)` when the buffered bytes do not yet hold a full frame.
    pub fn next_frame(&mut self) -> Result<Option<Frame>, WireError> {
        let Some(len) = declared_len(&self.buf) else {
            return Ok(None);
        };
        if len < HEADER_LEN {
            return Err(WireError::BadLength(len));
        }
        if len > self.max_frame_len {
            return Err(WireError::FrameTooLarge {
                len,
                max: self.max_frame_len,
            });
        }
        if self.buf.len() < LEN_PREFIX + len {
            return Ok(None);
        }

        self.buf.advance(LEN_PREFIX);
        let header = self.buf.get_u16();
        let payload = self.buf.split_to(len - HEADER_LEN).freeze();
        Ok(Some(Frame { header, payload }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_length_header_and_payload() {
        let b = encode_frame(2596, b"");
        assert_eq!(&b[..], &[0, 0, 0, 2, 0x0a, 0x24]);

        let b = encode_frame(3320, &[0, 0, 0, 7, 0, 0, 0, 9]);
        assert_eq!(&b[..4], &10u32.to_be_bytes());
        assert_eq!(&b[4..6], &3320u16.to_be_bytes());
        assert_eq!(b.len(), 14);
    }

    #[test]
    fn decodes_what_it_encodes() {
        for payload in [&b""[..], &b"x"[..], &b"hello world"[..], &[0xffu8; 300][..]] {
            let wire = encode_frame(1314, payload);
            let (frames, used) = decode_frames(&wire).unwrap();
            assert_eq!(used, wire.len());
            assert_eq!(frames, vec![Frame::new(1314, Bytes::copy_from_slice(payload))]);
        }
    }

    #[test]
    fn leaves_partial_frame_unconsumed() {
        let mut wire = encode_frame(1, b"abc").to_vec();
        wire.extend_from_slice(&encode_frame(2, b"defgh")[..5]);

        let (frames, used) = decode_frames(&wire).unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(used, 4 + 2 + 3);

        // Fewer than four bytes: nothing to read at all.
        let (frames, used) = decode_frames(&[0, 0, 0]).unwrap();
        assert!(frames.is_empty());
        assert_eq!(used, 0);
    }

    #[test]
    fn rejects_length_without_header_room() {
        assert_eq!(decode_frames(&[0, 0, 0, 1, 9]), Err(WireError::BadLength(1)));

        let mut wire = encode_frame(7, b"ok").to_vec();
        wire.extend_from_slice(&[0, 0, 0, 0]);
        let (frames, used) = decode_frames(&wire).unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(decode_frames(&wire[used..]), Err(WireError::BadLength(0)));
    }

    #[test]
    fn split_reads_yield_same_frames_at_every_offset() {
        let mut wire = encode_frame(374, b"first payload").to_vec();
        wire.extend_from_slice(&encode_frame(1446, b"second").to_vec());
        let (expected, _) = decode_frames(&wire).unwrap();
        assert_eq!(expected.len(), 2);

        for cut in 0..=wire.len() {
            let mut fb = FrameBuf::new();
            let mut got = fb.push(&wire[..cut]).unwrap();
            got.extend(fb.push(&wire[cut..]).unwrap());
            assert_eq!(got, expected, "cut at {cut}");
            assert_eq!(fb.buffered(), 0);
        }
    }

    #[test]
    fn byte_at_a_time() {
        let wire = encode_frame(3928, b"");
        let mut fb = FrameBuf::new();
        let mut got = Vec::new();
        for b in wire.iter() {
            got.extend(fb.push(&[*b]).unwrap());
        }
        assert_eq!(got, vec![Frame::empty(3928)]);
    }

    #[test]
    fn accumulator_enforces_max_len() {
        let mut fb = FrameBuf::new().max_frame_len(16);
        let wire = encode_frame(1, &[0u8; 32]);
        assert_eq!(
            fb.push(&wire[..4]),
            Err(WireError::FrameTooLarge { len: 34, max: 16 })
        );
    }

    #[test]
    fn string_and_int_encoding() {
        assert_eq!(&encode_string("hi").unwrap()[..], &[0, 2, b'h', b'i']);
        assert_eq!(&encode_string("").unwrap()[..], &[0, 0]);
        assert_eq!(encode_int32(-1), [0xff, 0xff, 0xff, 0xff]);
        assert_eq!(encode_int32(206), [0, 0, 0, 206]);

        let long = "a".repeat(65536);
        assert_eq!(encode_string(&long), Err(WireError::StringTooLong(65536)));
        assert!(encode_string(&long[..65535]).is_ok());
    }
}
