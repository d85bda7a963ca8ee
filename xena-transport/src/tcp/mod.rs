use std::{io, time::Duration};
use tokio::net::TcpStream;

use crate::Transport;

#[derive(Debug, Clone)]
pub struct Config {
    /// Disables Nagle's algorithm. Every command is a small write followed by a read,
    /// so this is on by default.
    pub nodelay: bool,
    /// Upper bound for establishing the connection, including name resolution.
    pub connect_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self { nodelay: true, connect_timeout: Duration::from_secs(5) }
    }
}

impl Config {
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_nodelay(mut self, nodelay: bool) -> Self {
        self.nodelay = nodelay;
        self
    }
}

#[derive(Debug, Default, Clone)]
pub struct Tcp {
    config: Config,
}

impl Tcp {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}

#[async_trait::async_trait]
impl Transport for Tcp {
    type Io = TcpStream;
    type Error = io::Error;

    async fn connect(&self, addr: &str) -> Result<Self::Io, Self::Error> {
        let stream = tokio::time::timeout(self.config.connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| {
                io::Error::new(io::ErrorKind::TimedOut, format!("connect to {addr} timed out"))
            })??;

        stream.set_nodelay(self.config.nodelay)?;

        tracing::debug!("Connected to {}", addr);

        Ok(stream)
    }
}
