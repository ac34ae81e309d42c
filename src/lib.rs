//! Fixed-frame TCP chat relay.
//!
//! The server runs one readiness loop that owns every client socket and
//! rebroadcasts each inbound frame to all other connected clients, tagged
//! with the sender's address.

pub mod client;
pub mod config;
pub mod console;
pub mod dispatch;
pub mod error;
pub mod frame;
pub mod mux;
pub mod peer;
pub mod server;
pub mod shutdown;
pub mod table;

pub use config::{ClientConfig, ServerConfig};
pub use error::{ClientError, ServerError};
pub use frame::{DISCONNECT_SENTINEL, FRAME_LEN, Frame};
pub use server::Server;
pub use shutdown::ShutdownHandle;
pub use table::{Roster, RosterEntry};
