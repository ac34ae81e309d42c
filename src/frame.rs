//! Fixed-length wire frames.
//!
//! Every message on the wire is exactly [`FRAME_LEN`] bytes. There is no
//! length prefix and no delimiter: a peer that sends fewer bytes has sent an
//! incomplete frame, and the receiver keeps reading until the frame is full.
//! The text payload is NUL-terminated inside the frame.

use std::fmt;
use std::io::{self, ErrorKind, Read};

/// Size of one frame on the wire.
pub const FRAME_LEN: usize = 512;

/// Largest payload that still leaves room for the terminating NUL.
pub const PAYLOAD_MAX: usize = FRAME_LEN - 1;

/// First byte of a frame announcing an intentional shutdown of the sender.
///
/// `0xFF` never starts a valid UTF-8 sequence, so it cannot collide with a
/// text payload.
pub const DISCONNECT_SENTINEL: u8 = 0xFF;

#[derive(Clone, PartialEq, Eq)]
pub struct Frame {
    bytes: Box<[u8; FRAME_LEN]>,
}

impl Frame {
    pub fn from_payload(payload: &[u8]) -> Self {
        let mut bytes = Box::new([0u8; FRAME_LEN]);
        let len = payload.len().min(PAYLOAD_MAX);
        bytes[..len].copy_from_slice(&payload[..len]);
        Self { bytes }
    }

    pub fn text(text: &str) -> Self {
        Self::from_payload(text.as_bytes())
    }

    pub fn disconnect() -> Self {
        Self::from_payload(&[DISCONNECT_SENTINEL])
    }

    /// Wraps a full frame exactly as it was read off the wire.
    pub fn from_wire(bytes: [u8; FRAME_LEN]) -> Self {
        Self {
            bytes: Box::new(bytes),
        }
    }

    pub fn is_disconnect(&self) -> bool {
        self.bytes[0] == DISCONNECT_SENTINEL
    }

    /// Payload bytes up to (not including) the first NUL.
    pub fn payload(&self) -> &[u8] {
        let end = self
            .bytes
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(FRAME_LEN);
        &self.bytes[..end]
    }

    pub fn payload_lossy(&self) -> String {
        String::from_utf8_lossy(self.payload()).into_owned()
    }

    /// Server-to-client form: `"<sender>: <payload>"`, truncated to fit.
    pub fn annotate(&self, sender: &str) -> Frame {
        let mut out = Vec::with_capacity(FRAME_LEN);
        out.extend_from_slice(sender.as_bytes());
        out.extend_from_slice(b": ");
        out.extend_from_slice(self.payload());
        Frame::from_payload(&out)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..]
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_disconnect() {
            f.write_str("Frame(<disconnect>)")
        } else {
            write!(f, "Frame({:?})", self.payload_lossy())
        }
    }
}

/// Result of feeding a connection into a [`FrameAssembler`].
#[derive(Debug)]
pub enum Assembled {
    Frame(Frame),
    /// The connection has no more bytes right now; the partial frame is kept.
    Pending,
    /// The peer closed its write side.
    Closed,
}

/// Accumulates short reads into whole frames.
#[derive(Debug)]
pub struct FrameAssembler {
    buf: Box<[u8; FRAME_LEN]>,
    filled: usize,
}

impl FrameAssembler {
    pub fn new() -> Self {
        Self {
            buf: Box::new([0u8; FRAME_LEN]),
            filled: 0,
        }
    }

    /// Bytes of the next frame received so far.
    pub fn buffered(&self) -> usize {
        self.filled
    }

    pub fn read_from<R: Read>(&mut self, reader: &mut R) -> io::Result<Assembled> {
        while self.filled < FRAME_LEN {
            match reader.read(&mut self.buf[self.filled..]) {
                Ok(0) => return Ok(Assembled::Closed),
                Ok(n) => self.filled += n,
                Err(e) if e.kind() == ErrorKind::WouldBlock => return Ok(Assembled::Pending),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }

        self.filled = 0;
        Ok(Assembled::Frame(Frame::from_wire(*self.buf)))
    }
}

impl Default for FrameAssembler {
    fn default() -> Self {
        Self::new()
    }
}
