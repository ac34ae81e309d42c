//! The single-threaded readiness loop.
//!
//! One thread owns the client table and every socket. Each cycle it waits
//! for readiness, accepts new connections, then visits clients in ascending
//! slot order: flushing queued output and reading at most one frame, which
//! is fanned out to everyone else.
//!
//! Readiness is edge-triggered, so a client that may still hold unread
//! frames stays in a backlog and is revisited on the next cycle without
//! waiting for a new event. A sender is not read while any other client has
//! a congested outbound queue; it resumes once that queue drains.

use std::collections::BTreeSet;
use std::io::{self, ErrorKind};
use std::net::SocketAddr;
use std::time::Duration;

use log::{debug, info, warn};
use mio::net::{TcpListener, TcpStream};

use crate::config::ServerConfig;
use crate::dispatch;
use crate::error::ServerError;
use crate::frame::{Assembled, Frame};
use crate::mux::Multiplexer;
use crate::peer::SendStatus;
use crate::shutdown::{self, ShutdownHandle, ShutdownSignal};
use crate::table::{ClientTable, Roster, TableFull};

const EVENT_CAPACITY: usize = 1024;

/// Pause before retrying `accept` after the process ran out of descriptors.
const ACCEPT_RETRY: Duration = Duration::from_millis(100);

pub struct Server {
    mux: Multiplexer,
    table: ClientTable<TcpStream>,
    /// Clients that may have unread input.
    backlog: BTreeSet<usize>,
    accept_retry: bool,
    shutdown: ShutdownHandle,
    signal: ShutdownSignal,
}

impl Server {
    pub fn bind(config: &ServerConfig) -> Result<Self, ServerError> {
        let addr = config.socket_addr();
        let listener =
            TcpListener::bind(addr).map_err(|source| ServerError::Bind { addr, source })?;
        let mux = Multiplexer::new(listener, EVENT_CAPACITY)?;
        let (shutdown, signal) = shutdown::channel(mux.waker());

        Ok(Self {
            mux,
            table: ClientTable::new(config.max_clients),
            backlog: BTreeSet::new(),
            accept_retry: false,
            shutdown,
            signal,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.mux.local_addr()?)
    }

    pub fn roster(&self) -> Roster {
        self.table.roster()
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    /// Serves until a shutdown is requested.
    pub fn run(mut self) -> Result<(), ServerError> {
        loop {
            let timeout = self.wait_timeout();
            let ready = self.mux.wait(timeout).map_err(ServerError::Poll)?;

            if self.signal.is_requested() {
                self.notify_shutdown();
                return Ok(());
            }

            if ready.listener || self.accept_retry {
                self.accept_pending();
            }

            let mut writable = BTreeSet::new();
            for client in &ready.clients {
                if client.readable {
                    self.backlog.insert(client.index);
                }
                if client.writable {
                    writable.insert(client.index);
                }
            }

            let visit: BTreeSet<usize> = writable.union(&self.backlog).copied().collect();
            for index in visit {
                // Slots above the bound were reclaimed earlier in this cycle.
                if self.table.bound().is_none_or(|bound| index > bound) {
                    self.backlog.remove(&index);
                    continue;
                }
                if writable.contains(&index) {
                    self.flush(index);
                }
                if self.backlog.contains(&index) {
                    self.read_one(index);
                }
            }
        }
    }

    fn wait_timeout(&self) -> Option<Duration> {
        if self.backlog.iter().any(|&index| !self.is_stalled(index)) {
            Some(Duration::ZERO)
        } else if self.accept_retry {
            Some(ACCEPT_RETRY)
        } else {
            None
        }
    }

    /// A sender is held back while any other client is congested.
    fn is_stalled(&self, sender: usize) -> bool {
        self.table
            .occupied()
            .any(|(index, peer)| index != sender && peer.is_congested())
    }

    fn accept_pending(&mut self) {
        self.accept_retry = false;
        loop {
            let (stream, addr) = match self.mux.accept() {
                Ok(Some(accepted)) => accepted,
                Ok(None) => return,
                Err(e) if is_connection_error(&e) => {
                    debug!("accept error: {}", e);
                    continue;
                }
                Err(e) => {
                    warn!("accept error: {}, retrying", e);
                    self.accept_retry = true;
                    return;
                }
            };

            let index = match self.table.claim(stream, addr.to_string()) {
                Ok(index) => index,
                Err(TableFull(stream)) => {
                    warn!(
                        "Too many clients ({}), refusing {}",
                        self.table.capacity(),
                        addr
                    );
                    drop(stream);
                    continue;
                }
            };

            let registered = match self.table.get_mut(index) {
                Some(peer) => self.mux.register(&mut peer.conn, index),
                None => continue,
            };
            if let Err(e) = registered {
                warn!("Failed to watch {}: {}", addr, e);
                self.table.release(index);
                continue;
            }

            info!("Client connected! Remote Address: {}", addr);
        }
    }

    fn flush(&mut self, index: usize) {
        let Some(peer) = self.table.get_mut(index) else {
            return;
        };
        match peer.flush() {
            Ok(true) => {
                if let Err(e) = self.mux.rearm(&mut peer.conn, index, false) {
                    debug!("Failed to re-arm {}: {}", peer.addr, e);
                }
            }
            Ok(false) => {}
            Err(e) => {
                debug!("Flush to {} failed: {}", peer.addr, e);
                peer.discard_pending();
            }
        }
    }

    /// Reads at most one frame from the client and dispatches it.
    fn read_one(&mut self, index: usize) {
        if self.is_stalled(index) {
            return;
        }

        let outcome = match self.table.get_mut(index) {
            Some(peer) => peer.inbound.read_from(&mut peer.conn),
            None => {
                self.backlog.remove(&index);
                return;
            }
        };

        match outcome {
            Ok(Assembled::Frame(frame)) if frame.is_disconnect() => {
                self.reclaim(index, "closed connection");
            }
            Ok(Assembled::Frame(frame)) => self.dispatch(index, &frame),
            Ok(Assembled::Pending) => {
                self.backlog.remove(&index);
            }
            Ok(Assembled::Closed) => {
                self.reclaim(index, "closed connection");
            }
            Err(e) => {
                debug!("Read from slot {} failed: {}", index, e);
                self.reclaim(index, "dropped");
            }
        }
    }

    fn dispatch(&mut self, sender: usize, frame: &Frame) {
        if let Some(peer) = self.table.get(sender) {
            info!("[{}] says: {}", peer.addr, frame.payload_lossy().trim_end());
        }

        let delivery = dispatch::broadcast(&mut self.table, sender, frame);
        debug!(
            "Delivered to {} recipients ({} failed)",
            delivery.recipients(),
            delivery.failed.len()
        );

        for index in delivery.queued {
            if let Some(peer) = self.table.get_mut(index) {
                if let Err(e) = self.mux.rearm(&mut peer.conn, index, true) {
                    debug!("Failed to watch {} for writes: {}", peer.addr, e);
                }
            }
        }
    }

    fn reclaim(&mut self, index: usize, reason: &str) {
        self.backlog.remove(&index);
        let Some(mut peer) = self.table.release(index) else {
            return;
        };
        if let Err(e) = self.mux.deregister(&mut peer.conn) {
            debug!("Failed to unwatch {}: {}", peer.addr, e);
        }
        info!("Remote Address: {} {}", peer.addr, reason);
    }

    fn notify_shutdown(&mut self) {
        info!("Shutting down, notifying {} clients", self.table.len());
        let goodbye = Frame::disconnect();
        for (_, peer) in self.table.occupied_mut() {
            // Best effort: anything that does not fit right now is lost.
            if let SendStatus::Failed(e) = peer.send(&goodbye) {
                debug!("Shutdown notice to {} failed: {}", peer.addr, e);
                continue;
            }
            match peer.flush() {
                Ok(true) => {}
                Ok(false) => debug!(
                    "Shutdown notice to {} left {} bytes unsent",
                    peer.addr,
                    peer.pending_bytes()
                ),
                Err(e) => debug!("Shutdown notice to {} failed: {}", peer.addr, e),
            }
        }
    }
}

/// Accept failures that concern only the connection being accepted; the
/// rest of the backlog is still worth draining.
fn is_connection_error(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        ErrorKind::ConnectionAborted
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionRefused
            | ErrorKind::PermissionDenied
            | ErrorKind::TimedOut
    ) || e.raw_os_error() == Some(libc::EPROTO)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_per_connection_accept_errors_keep_draining() {
        assert!(is_connection_error(&ErrorKind::ConnectionAborted.into()));
        assert!(is_connection_error(&ErrorKind::ConnectionReset.into()));
        assert!(is_connection_error(&io::Error::from_raw_os_error(
            libc::EPROTO
        )));
    }

    #[test]
    fn test_descriptor_exhaustion_is_retried_later() {
        assert!(!is_connection_error(&io::Error::from_raw_os_error(
            libc::EMFILE
        )));
        assert!(!is_connection_error(&ErrorKind::OutOfMemory.into()));
    }

    #[test]
    fn test_wait_timeout_follows_backlog_and_accept_retry() {
        let mut server = Server::bind(&ServerConfig::local(4)).unwrap();
        assert!(server.wait_timeout().is_none());

        server.backlog.insert(0);
        assert_eq!(server.wait_timeout(), Some(Duration::ZERO));

        server.accept_retry = true;
        server.backlog.clear();
        assert_eq!(server.wait_timeout(), Some(ACCEPT_RETRY));
    }
}
