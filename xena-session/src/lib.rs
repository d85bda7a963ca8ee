//! Resource tree and session management for Xena chassis.
//!
//! A [`Session`] owns the resource tree (session → chassis → module → port → stream,
//! filter, match, length, capture, tpld) and one connection plus keep-alive task per
//! chassis. Every operation resolves the owning chassis of a node, scopes a
//! [`Channel`](xena_socket::Channel) to the node's address and exchanges commands through
//! it.
//!
//! The tree is not designed for concurrent writers: all mutating operations take
//! `&mut Session`. Callers that drive one session from several tasks wrap it in a mutex.

use std::time::Duration;
use thiserror::Error;

use xena_socket::{ConnOptions, DEFAULT_POLL_INTERVAL};

mod chassis;
mod port;
mod session;
mod stats;
mod tpld;
pub mod tree;

pub use port::{Reservation, StreamState};
pub use session::Session;
pub use stats::Counters;
pub use tpld::TpldAllocator;
pub use tree::{CachePolicy, Index, Kind, NodeId, ResourceNode, Tree};

/// The factory default chassis password.
pub const DEFAULT_PASSWORD: &str = "xena";

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Socket(#[from] xena_socket::Error),
    #[error("Port {port} is reserved by {owner:?}")]
    ReservationConflict { port: String, owner: String },
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Unexpected value {value:?} for {attribute}")]
    UnexpectedValue { attribute: String, value: String },
    #[error("{what} matches {count} objects")]
    Ambiguous { what: String, count: usize },
    #[error("{kind} {index} ({name}) already exists")]
    Duplicate { kind: Kind, index: Index, name: String },
    #[error("Node is no longer part of the tree")]
    Detached,
}

impl Error {
    /// Returns `true` if the chassis rejected a command.
    pub fn is_protocol(&self) -> bool {
        matches!(self, Self::Socket(e) if e.is_protocol())
    }

    /// Returns `true` if an awaited state was not reached in time.
    pub fn is_state_timeout(&self) -> bool {
        matches!(self, Self::Socket(xena_socket::Error::StateTimeout { .. }))
    }

    /// Returns `true` for transport failures. The chassis has to be reconnected.
    pub fn is_connection(&self) -> bool {
        matches!(
            self,
            Self::Socket(
                xena_socket::Error::Connection { .. }
                    | xena_socket::Error::Closed
                    | xena_socket::Error::Timeout { .. }
                    | xena_socket::Error::Wire(_)
            )
        )
    }
}

#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Chassis port used when an address doesn't carry one.
    pub port: u16,
    /// Interval between two reads of a polled attribute.
    pub poll_interval: Duration,
    /// How long ports get to report the requested traffic state.
    pub traffic_timeout: Duration,
    /// How long a relinquished port gets to report `RELEASED`.
    pub release_timeout: Duration,
    /// Options for every chassis connection.
    pub conn: ConnOptions,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            port: xena_wire::DEFAULT_PORT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            traffic_timeout: Duration::from_secs(40),
            release_timeout: Duration::from_secs(10),
            conn: ConnOptions::default(),
        }
    }
}

impl SessionOptions {
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_traffic_timeout(mut self, timeout: Duration) -> Self {
        self.traffic_timeout = timeout;
        self
    }

    pub fn with_release_timeout(mut self, timeout: Duration) -> Self {
        self.release_timeout = timeout;
        self
    }

    pub fn with_conn_options(mut self, options: ConnOptions) -> Self {
        self.conn = options;
        self
    }
}
