use std::io::Write;

use log::debug;

use crate::frame::Frame;
use crate::peer::SendStatus;
use crate::table::ClientTable;

/// Per-recipient results of one broadcast.
#[derive(Debug, Default)]
pub struct Delivery {
    pub delivered: Vec<usize>,
    /// Recipients holding part of the frame in their outbound queue.
    pub queued: Vec<usize>,
    pub failed: Vec<usize>,
}

impl Delivery {
    /// Recipients the frame was handed to, whether written or queued.
    pub fn recipients(&self) -> usize {
        self.delivered.len() + self.queued.len()
    }
}

/// Sends `frame` from slot `sender` to every other occupied slot, lowest
/// index first, prefixed with the sender's address. A failure for one
/// recipient never stops delivery to the rest and never touches the sender.
pub fn broadcast<C: Write>(table: &mut ClientTable<C>, sender: usize, frame: &Frame) -> Delivery {
    let mut delivery = Delivery::default();
    let Some(origin) = table.get(sender) else {
        return delivery;
    };
    let annotated = frame.annotate(&origin.addr);

    for (index, peer) in table.occupied_mut() {
        if index == sender {
            continue;
        }
        match peer.send(&annotated) {
            SendStatus::Sent => delivery.delivered.push(index),
            SendStatus::Queued => delivery.queued.push(index),
            SendStatus::Failed(e) => {
                debug!("Write to {} failed: {}", peer.addr, e);
                peer.discard_pending();
                delivery.failed.push(index);
            }
        }
    }

    delivery
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::FRAME_LEN;
    use std::io;

    #[derive(Debug, Default)]
    struct Recorder {
        frames: Vec<Frame>,
        broken: bool,
    }

    impl Write for Recorder {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.broken {
                return Err(io::ErrorKind::BrokenPipe.into());
            }
            assert_eq!(buf.len(), FRAME_LEN);
            let mut bytes = [0u8; FRAME_LEN];
            bytes.copy_from_slice(buf);
            self.frames.push(Frame::from_wire(bytes));
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn table_of(n: usize) -> ClientTable<Recorder> {
        let mut table = ClientTable::new(8);
        for i in 0..n {
            table
                .claim(Recorder::default(), format!("10.0.0.{i}:5000"))
                .unwrap();
        }
        table
    }

    fn received(table: &ClientTable<Recorder>, index: usize) -> Vec<String> {
        table
            .get(index)
            .unwrap()
            .conn
            .frames
            .iter()
            .map(Frame::payload_lossy)
            .collect()
    }

    #[test]
    fn test_fan_out_skips_sender() {
        let mut table = table_of(4);
        let delivery = broadcast(&mut table, 1, &Frame::text("hi\n"));

        assert_eq!(delivery.delivered, vec![0, 2, 3]);
        assert_eq!(delivery.recipients(), 3);
        assert!(received(&table, 1).is_empty());
        for i in [0, 2, 3] {
            assert_eq!(received(&table, i), vec!["10.0.0.1:5000: hi\n"]);
        }
    }

    #[test]
    fn test_failed_recipient_does_not_stop_others() {
        let mut table = table_of(4);
        table.get_mut(1).unwrap().conn.broken = true;

        let delivery = broadcast(&mut table, 0, &Frame::text("still here"));

        assert_eq!(delivery.failed, vec![1]);
        assert_eq!(delivery.delivered, vec![2, 3]);
        // The sender stays in the table.
        assert_eq!(table.len(), 4);
    }

    #[test]
    fn test_lone_sender_reaches_nobody() {
        let mut table = table_of(1);
        let delivery = broadcast(&mut table, 0, &Frame::text("anyone?"));
        assert_eq!(delivery.recipients(), 0);
        assert!(delivery.failed.is_empty());
    }

    #[test]
    fn test_released_slot_is_not_targeted() {
        let mut table = table_of(3);
        table.release(1);
        let delivery = broadcast(&mut table, 0, &Frame::text("x"));
        assert_eq!(delivery.delivered, vec![2]);
    }

    #[test]
    fn test_unknown_sender_is_ignored() {
        let mut table = table_of(2);
        let delivery = broadcast(&mut table, 5, &Frame::text("ghost"));
        assert_eq!(delivery.recipients(), 0);
        assert!(received(&table, 0).is_empty());
    }
}
