//! Cooperative shutdown for the readiness loop.
//!
//! Signal handlers and the admin console never touch sockets. They push a
//! request down a channel and wake the poll; the loop picks it up between
//! readiness cycles.

use std::sync::Arc;

use flume::{Receiver, Sender};
use log::warn;
use mio::Waker;

#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    tx: Sender<()>,
    waker: Arc<Waker>,
}

impl ShutdownHandle {
    pub fn trigger(&self) {
        let _ = self.tx.try_send(());
        if let Err(e) = self.waker.wake() {
            warn!("Failed to wake server loop for shutdown: {}", e);
        }
    }
}

#[derive(Debug)]
pub struct ShutdownSignal {
    rx: Receiver<()>,
}

impl ShutdownSignal {
    pub fn is_requested(&self) -> bool {
        !self.rx.is_empty()
    }
}

pub fn channel(waker: Arc<Waker>) -> (ShutdownHandle, ShutdownSignal) {
    let (tx, rx) = flume::bounded(1);
    (ShutdownHandle { tx, waker }, ShutdownSignal { rx })
}

#[cfg(test)]
mod tests {
    use super::*;
    use mio::{Poll, Token};

    #[test]
    fn test_trigger_is_sticky_and_idempotent() {
        let poll = Poll::new().unwrap();
        let waker = Arc::new(Waker::new(poll.registry(), Token(1)).unwrap());
        let (handle, signal) = channel(waker);

        assert!(!signal.is_requested());
        handle.trigger();
        handle.clone().trigger();
        assert!(signal.is_requested());
        assert!(signal.is_requested());
    }
}
