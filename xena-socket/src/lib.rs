use std::time::Duration;
use thiserror::Error;

use xena_wire::Reply;

mod channel;
mod conn;
mod keepalive;
mod poll;

pub use channel::*;
pub use conn::*;
pub use keepalive::KeepAlive;
pub use poll::*;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Connection to {addr} failed: {source}")]
    Connection {
        addr: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    #[error("Wire protocol error: {0:?}")]
    Wire(#[from] xena_wire::Error),
    #[error("Command `{command}` rejected: {reason}")]
    Protocol { command: String, reason: String },
    #[error("Unexpected reply to `{command}`: {reply:?}")]
    UnexpectedReply { command: String, reply: Reply },
    #[error("Command {command:?} can't be carried on one protocol line")]
    InvalidCommand { command: String },
    #[error("Command `{command}` timed out")]
    Timeout { command: String },
    #[error("Connection closed")]
    Closed,
    #[error("{attribute} did not reach any of {accepted:?} in time (last value: {last:?})")]
    StateTimeout { attribute: String, last: Option<String>, accepted: Vec<String> },
}

impl Error {
    /// Returns `true` if the chassis rejected a command. These are the only errors a
    /// caller can recover from without reconnecting.
    pub fn is_protocol(&self) -> bool {
        matches!(self, Self::Protocol { .. })
    }
}

#[derive(Debug, Clone)]
pub struct ConnOptions {
    /// Upper bound for a full request/response exchange.
    pub request_timeout: Duration,
    /// The connection is considered idle after this long without a command, at which
    /// point the keep-alive task sends a heartbeat.
    pub keepalive_interval: Duration,
    /// Token of the no-op query used as heartbeat.
    pub keepalive_token: String,
}

impl ConnOptions {
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_keepalive_interval(mut self, interval: Duration) -> Self {
        self.keepalive_interval = interval;
        self
    }

    pub fn with_keepalive_token(mut self, token: impl Into<String>) -> Self {
        self.keepalive_token = token.into();
        self
    }
}

impl Default for ConnOptions {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(5),
            keepalive_interval: Duration::from_secs(10),
            keepalive_token: "c_keepalive".to_string(),
        }
    }
}
