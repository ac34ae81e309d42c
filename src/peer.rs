use std::io::{self, ErrorKind, Write};

use crate::frame::{FRAME_LEN, Frame, FrameAssembler};

/// Queued frames at which a recipient counts as congested. Senders stop
/// being read until it drains; nothing already queued is ever discarded.
pub const OUTBOX_FRAMES: usize = 64;

/// Outcome of handing one frame to a peer.
#[derive(Debug)]
pub enum SendStatus {
    Sent,
    /// Part or all of the frame is waiting for the socket to become writable.
    Queued,
    Failed(io::Error),
}

/// Per-slot state of one connected client.
#[derive(Debug)]
pub struct Peer<C> {
    pub conn: C,
    pub addr: String,
    pub inbound: FrameAssembler,
    outbox: Vec<u8>,
}

impl<C> Peer<C> {
    pub fn new(conn: C, addr: String) -> Self {
        Self {
            conn,
            addr,
            inbound: FrameAssembler::new(),
            outbox: Vec::new(),
        }
    }

    pub fn has_pending(&self) -> bool {
        !self.outbox.is_empty()
    }

    pub fn pending_bytes(&self) -> usize {
        self.outbox.len()
    }

    pub fn is_congested(&self) -> bool {
        self.outbox.len() >= OUTBOX_FRAMES * FRAME_LEN
    }

    /// Forgets queued output after the connection failed for writing.
    pub fn discard_pending(&mut self) {
        self.outbox.clear();
    }
}

impl<C: Write> Peer<C> {
    pub fn send(&mut self, frame: &Frame) -> SendStatus {
        // Keep frames in order behind anything already queued.
        if self.has_pending() {
            self.outbox.extend_from_slice(frame.as_bytes());
            return SendStatus::Queued;
        }

        let bytes = frame.as_bytes();
        let mut written = 0;
        while written < bytes.len() {
            match self.conn.write(&bytes[written..]) {
                Ok(0) => return SendStatus::Failed(ErrorKind::WriteZero.into()),
                Ok(n) => written += n,
                Err(e) if e.kind() == ErrorKind::WouldBlock => {
                    self.outbox.extend_from_slice(&bytes[written..]);
                    return SendStatus::Queued;
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return SendStatus::Failed(e),
            }
        }
        SendStatus::Sent
    }

    /// Writes queued bytes. Returns `true` once the queue is empty.
    pub fn flush(&mut self) -> io::Result<bool> {
        while !self.outbox.is_empty() {
            match self.conn.write(&self.outbox) {
                Ok(0) => return Err(ErrorKind::WriteZero.into()),
                Ok(n) => {
                    self.outbox.drain(..n);
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => return Ok(false),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Accepts `budget` bytes, then blocks.
    struct Throttled {
        written: Vec<u8>,
        budget: usize,
    }

    impl Write for Throttled {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.budget == 0 {
                return Err(ErrorKind::WouldBlock.into());
            }
            let n = buf.len().min(self.budget);
            self.budget -= n;
            self.written.extend_from_slice(&buf[..n]);
            Ok(n)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn throttled(budget: usize) -> Peer<Throttled> {
        Peer::new(
            Throttled {
                written: Vec::new(),
                budget,
            },
            "127.0.0.1:1".to_string(),
        )
    }

    #[test]
    fn test_send_writes_whole_frame() {
        let mut peer = Peer::new(Vec::new(), "a".to_string());
        assert!(matches!(peer.send(&Frame::text("x")), SendStatus::Sent));
        assert_eq!(peer.conn.len(), FRAME_LEN);
    }

    #[test]
    fn test_partial_write_queues_tail_then_flushes() {
        let mut peer = throttled(100);
        assert!(matches!(peer.send(&Frame::text("one")), SendStatus::Queued));
        assert_eq!(peer.pending_bytes(), FRAME_LEN - 100);

        // Later frames line up behind the tail.
        assert!(matches!(peer.send(&Frame::text("two")), SendStatus::Queued));
        assert_eq!(peer.pending_bytes(), 2 * FRAME_LEN - 100);

        peer.conn.budget = usize::MAX;
        assert!(peer.flush().unwrap());
        assert_eq!(peer.conn.written.len(), 2 * FRAME_LEN);
        assert_eq!(&peer.conn.written[FRAME_LEN..FRAME_LEN + 3], b"two");
    }

    #[test]
    fn test_backed_up_peer_is_congested_but_keeps_every_frame() {
        let mut peer = throttled(0);
        for _ in 0..OUTBOX_FRAMES - 1 {
            assert!(matches!(peer.send(&Frame::text("x")), SendStatus::Queued));
        }
        assert!(!peer.is_congested());

        for _ in 0..3 {
            assert!(matches!(peer.send(&Frame::text("x")), SendStatus::Queued));
        }
        assert!(peer.is_congested());
        assert_eq!(peer.pending_bytes(), (OUTBOX_FRAMES + 2) * FRAME_LEN);

        peer.conn.budget = usize::MAX;
        assert!(peer.flush().unwrap());
        assert!(!peer.is_congested());
        assert_eq!(peer.conn.written.len(), (OUTBOX_FRAMES + 2) * FRAME_LEN);
    }
}
