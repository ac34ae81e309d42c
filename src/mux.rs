//! Readiness multiplexing over the listening socket and client connections.
//!
//! Clients are registered under a token derived from their slot index, so a
//! readiness event maps straight back to a table slot.

use std::io::{self, ErrorKind};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, trace};
use mio::net::{TcpListener, TcpStream};
use mio::{Events, Interest, Poll, Token, Waker};

const LISTENER: Token = Token(0);
const WAKER: Token = Token(1);
const FIRST_CLIENT: usize = 2;

/// Descriptors reported ready by one [`Multiplexer::wait`].
#[derive(Debug, Default)]
pub struct Readiness {
    pub listener: bool,
    pub woken: bool,
    /// Ready client slots in ascending index order.
    pub clients: Vec<ClientReady>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientReady {
    pub index: usize,
    pub readable: bool,
    pub writable: bool,
}

impl Readiness {
    pub fn is_empty(&self) -> bool {
        !self.listener && !self.woken && self.clients.is_empty()
    }
}

pub struct Multiplexer {
    poll: Poll,
    events: Events,
    listener: TcpListener,
    waker: Arc<Waker>,
}

impl Multiplexer {
    pub fn new(mut listener: TcpListener, event_capacity: usize) -> io::Result<Self> {
        let poll = Poll::new()?;
        poll.registry()
            .register(&mut listener, LISTENER, Interest::READABLE)?;
        let waker = Arc::new(Waker::new(poll.registry(), WAKER)?);

        Ok(Self {
            poll,
            events: Events::with_capacity(event_capacity),
            listener,
            waker,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn waker(&self) -> Arc<Waker> {
        Arc::clone(&self.waker)
    }

    /// Waits until something is ready or `timeout` passes (`None` blocks).
    /// A timeout or a signal interrupting the wait yields an empty
    /// readiness, which the caller treats as a re-scan.
    pub fn wait(&mut self, timeout: Option<Duration>) -> io::Result<Readiness> {
        let mut ready = Readiness::default();

        match self.poll.poll(&mut self.events, timeout) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::Interrupted => {
                trace!("Readiness wait interrupted");
                return Ok(ready);
            }
            Err(e) => return Err(e),
        }

        for event in self.events.iter() {
            match event.token() {
                LISTENER => ready.listener = true,
                WAKER => ready.woken = true,
                Token(id) => {
                    let readable = event.is_readable() || event.is_read_closed() || event.is_error();
                    ready.clients.push(ClientReady {
                        index: id - FIRST_CLIENT,
                        readable,
                        writable: event.is_writable(),
                    });
                }
            }
        }

        ready.clients.sort_unstable_by_key(|c| c.index);
        ready.clients.dedup_by(|later, earlier| {
            if later.index != earlier.index {
                return false;
            }
            earlier.readable |= later.readable;
            earlier.writable |= later.writable;
            true
        });

        debug!(
            "Readiness: listener={} woken={} clients={}",
            ready.listener,
            ready.woken,
            ready.clients.len()
        );
        Ok(ready)
    }

    /// Accepts one pending connection, or `None` once the backlog is drained.
    pub fn accept(&self) -> io::Result<Option<(TcpStream, SocketAddr)>> {
        loop {
            match self.listener.accept() {
                Ok(accepted) => return Ok(Some(accepted)),
                Err(e) if e.kind() == ErrorKind::WouldBlock => return Ok(None),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
    }

    pub fn register(&self, stream: &mut TcpStream, index: usize) -> io::Result<()> {
        self.poll
            .registry()
            .register(stream, token_for(index), Interest::READABLE)
    }

    /// Adds or removes write interest for a client with queued output.
    pub fn rearm(&self, stream: &mut TcpStream, index: usize, want_write: bool) -> io::Result<()> {
        let interest = if want_write {
            Interest::READABLE | Interest::WRITABLE
        } else {
            Interest::READABLE
        };
        self.poll
            .registry()
            .reregister(stream, token_for(index), interest)
    }

    pub fn deregister(&self, stream: &mut TcpStream) -> io::Result<()> {
        self.poll.registry().deregister(stream)
    }
}

fn token_for(index: usize) -> Token {
    Token(index + FIRST_CLIENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn loopback() -> Multiplexer {
        let listener = TcpListener::bind("127.0.0.1:0".parse().unwrap()).unwrap();
        Multiplexer::new(listener, 16).unwrap()
    }

    #[test]
    fn test_zero_timeout_yields_empty_readiness() {
        let mut mux = loopback();
        let ready = mux.wait(Some(Duration::ZERO)).unwrap();
        assert!(ready.is_empty());
    }

    #[test]
    fn test_waker_is_reported() {
        let mut mux = loopback();
        mux.waker().wake().unwrap();
        let ready = mux.wait(Some(Duration::from_secs(1))).unwrap();
        assert!(ready.woken);
        assert!(ready.clients.is_empty());
    }

    #[test]
    fn test_client_readiness_maps_to_slot_index() {
        let mut mux = loopback();
        let addr = mux.local_addr().unwrap();
        let mut remote = std::net::TcpStream::connect(addr).unwrap();

        let ready = mux.wait(Some(Duration::from_secs(1))).unwrap();
        assert!(ready.listener);
        let (mut stream, _) = mux.accept().unwrap().unwrap();
        assert!(mux.accept().unwrap().is_none());
        mux.register(&mut stream, 5).unwrap();

        remote.write_all(b"ping").unwrap();
        let ready = mux.wait(Some(Duration::from_secs(1))).unwrap();
        assert_eq!(ready.clients.len(), 1);
        assert_eq!(ready.clients[0].index, 5);
        assert!(ready.clients[0].readable);

        mux.deregister(&mut stream).unwrap();
    }
}
