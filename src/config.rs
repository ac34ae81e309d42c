use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;

/// Well-known port used by both sides when none is given.
pub const DEFAULT_PORT: u16 = 7000;

/// Slot count matching the classic `select()` descriptor limit.
pub const DEFAULT_MAX_CLIENTS: usize = 1024;

pub const DEFAULT_TRANSCRIPT: &str = "output.txt";

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind: IpAddr,
    pub port: u16,
    pub max_clients: usize,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind, self.port)
    }

    /// Loopback on an ephemeral port.
    pub fn local(max_clients: usize) -> Self {
        Self {
            bind: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 0,
            max_clients,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
            max_clients: DEFAULT_MAX_CLIENTS,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub host: String,
    pub port: u16,
    pub transcript: PathBuf,
}

impl ClientConfig {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_PORT,
            transcript: PathBuf::from(DEFAULT_TRANSCRIPT),
        }
    }
}
