//! Little-endian cursor readers and writers plus the decode error type.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("bad magic 0x{found:08x}")]
    BadMagic { found: u32 },
    #[error("frame of {found} bytes is shorter than the header")]
    ShortHeader { found: usize },
    #[error("declared size {declared} disagrees with frame of {found} bytes")]
    SizeMismatch { declared: usize, found: usize },
    #[error("frame of {declared} bytes exceeds the {max}-byte cap")]
    Oversized { declared: usize, max: usize },
    #[error("unknown message type 0x{ty:08x}")]
    UnknownType { ty: u32 },
    #[error("truncated body reading {field}")]
    Truncated { field: &'static str },
    #[error("invalid value {value} for {field}")]
    BadValue { field: &'static str, value: u32 },
}

/// Forward-only little-endian reader over a message body.
pub struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Reader { buf, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take(&mut self, n: usize, field: &'static str) -> Result<&'a [u8], ProtocolError> {
        if self.remaining() < n {
            return Err(ProtocolError::Truncated { field });
        }
        let out = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    pub fn u8(&mut self, field: &'static str) -> Result<u8, ProtocolError> {
        Ok(self.take(1, field)?[0])
    }

    pub fn u16(&mut self, field: &'static str) -> Result<u16, ProtocolError> {
        let b = self.take(2, field)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    pub fn u32(&mut self, field: &'static str) -> Result<u32, ProtocolError> {
        let b = self.take(4, field)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn i32(&mut self, field: &'static str) -> Result<i32, ProtocolError> {
        Ok(self.u32(field)? as i32)
    }

    /// Length-prefixed blob: a `u32` count followed by that many bytes.
    pub fn blob(&mut self, field: &'static str) -> Result<Vec<u8>, ProtocolError> {
        let len = self.u32(field)? as usize;
        Ok(self.take(len, field)?.to_vec())
    }
}

/// Little-endian writer that finalizes the header in place.
pub struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    /// Start a frame for `msg_type`; the size field is patched by
    /// [`Writer::finish`].
    pub fn new(magic: u32, msg_type: u32) -> Self {
        let mut buf = Vec::with_capacity(64);
        buf.extend_from_slice(&magic.to_le_bytes());
        buf.extend_from_slice(&msg_type.to_le_bytes());
        buf.extend_from_slice(&0u32.to_le_bytes()); // size, patched later
        buf.extend_from_slice(&0u32.to_le_bytes()); // reserved
        Writer { buf }
    }

    pub fn u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    pub fn u16(&mut self, v: u16) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn i32(&mut self, v: i32) {
        self.u32(v as u32);
    }

    pub fn blob(&mut self, bytes: &[u8]) {
        self.u32(bytes.len() as u32);
        self.buf.extend_from_slice(bytes);
    }

    pub fn finish(mut self) -> Vec<u8> {
        let size = self.buf.len() as u32;
        self.buf[8..12].copy_from_slice(&size.to_le_bytes());
        self.buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn writer_patches_size() {
        let mut w = Writer::new(0xAABBCCDD, 7);
        w.u32(42);
        let frame = w.finish();
        assert_eq!(frame.len(), 20);
        assert_eq!(u32::from_le_bytes(frame[8..12].try_into().unwrap()), 20);
        assert_eq!(u32::from_le_bytes(frame[4..8].try_into().unwrap()), 7);
    }

    #[test]
    fn reader_truncation_is_typed() {
        let mut r = Reader::new(&[1, 2]);
        assert_eq!(
            r.u32("field"),
            Err(ProtocolError::Truncated { field: "field" })
        );
    }

    #[test]
    fn blob_round_trip() {
        let mut w = Writer::new(1, 2);
        w.blob(b"hello");
        let frame = w.finish();
        let mut r = Reader::new(&frame[16..]);
        assert_eq!(r.blob("s").unwrap(), b"hello");
        assert_eq!(r.remaining(), 0);
    }

    #[test]
    fn blob_length_beyond_body_is_truncated_error() {
        let mut body = Vec::new();
        body.extend_from_slice(&100u32.to_le_bytes());
        body.extend_from_slice(b"abc");
        let mut r = Reader::new(&body);
        assert_eq!(r.blob("s"), Err(ProtocolError::Truncated { field: "s" }));
    }
}
