use bytes::BufMut;
use bytes::BytesMut;

use crate::WireError;
use crate::frame::Frame;

/// Cursor over a frame payload.
///
/// Every read checks the remaining length first and fails with
/// [`WireError::TruncatedPayload`] instead of yielding a default value.
#[derive(Debug, Clone)]
pub struct PayloadReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> PayloadReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], WireError> {
        if self.remaining() < n {
            return Err(WireError::TruncatedPayload {
                need: self.pos + n,
                got: self.data.len(),
            });
        }
        let s = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(s)
    }

    pub fn read_i32(&mut self) -> Result<i32, WireError> {
        let b = self.take(4)?;
        Ok(i32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn read_u16(&mut self) -> Result<u16, WireError> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    /// `u16` length prefix, then that many bytes decoded as UTF-8 (lossy).
    pub fn read_string(&mut self) -> Result<String, WireError> {
        let len = self.read_u16()? as usize;
        let b = self.take(len)?;
        Ok(String::from_utf8_lossy(b).into_owned())
    }

    pub fn read_bool(&mut self) -> Result<bool, WireError> {
        Ok(self.take(1)?[0] != 0)
    }
}

/// Builds a payload field by field.
#[derive(Debug, Default)]
pub struct PayloadWriter {
    buf: BytesMut,
}

impl PayloadWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_i32(&mut self, n: i32) -> &mut Self {
        self.buf.put_i32(n);
        self
    }

    pub fn put_str(&mut self, s: &str) -> Result<&mut Self, WireError> {
        let len = u16::try_from(s.len()).map_err(|_| WireError::StringTooLong(s.len()))?;
        self.buf.put_u16(len);
        self.buf.put_slice(s.as_bytes());
        Ok(self)
    }

    pub fn put_bool(&mut self, b: bool) -> &mut Self {
        self.buf.put_u8(u8::from(b));
        self
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn finish(self, header: u16) -> Frame {
        Frame::new(header, self.buf.freeze())
    }
}
