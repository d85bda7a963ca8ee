use rustc_hash::FxHashMap;
use std::sync::Arc;

use xena_wire::{Address, Command};

use crate::{AttributeSource, Connection, Error};

/// Command channel scoped to one resource address.
///
/// The channel only knows the positional address and the connection of the owning
/// chassis; which tokens are valid for the resource is up to the caller.
#[derive(Debug, Clone)]
pub struct Channel {
    conn: Arc<Connection>,
    address: Address,
}

impl Channel {
    pub fn new(conn: Arc<Connection>, address: Address) -> Self {
        Self { conn, address }
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    pub fn connection(&self) -> &Arc<Connection> {
        &self.conn
    }

    /// Builds a command for this address.
    pub fn command(&self, token: &str) -> Command {
        Command::new(self.address.clone(), token)
    }

    /// Sends `token args...` and waits for the acknowledgement.
    pub async fn send_command<I, S>(&self, token: &str, args: I) -> Result<(), Error>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.conn.execute(self.command(token).args(args)).await
    }

    /// Queries a single attribute and returns its (unquoted) value.
    pub async fn get_attribute(&self, name: &str) -> Result<String, Error> {
        let command = Command::query(self.address.clone(), name);
        let line = self.conn.query(command).await?;
        Ok(line.value().to_string())
    }

    /// Bulk query. Every token is queried in one exchange and the value lines are
    /// returned keyed by their echoed token.
    pub async fn get_attributes(
        &self,
        tokens: &[&str],
    ) -> Result<FxHashMap<String, String>, Error> {
        let commands = tokens
            .iter()
            .map(|token| Command::query(self.address.clone(), token))
            .collect();

        let lines = self.conn.query_bulk(commands).await?;

        Ok(lines
            .into_iter()
            .map(|line| (line.token().to_string(), line.value().to_string()))
            .collect())
    }

    /// Sets one attribute.
    pub async fn set_attribute(&self, name: &str, value: &str) -> Result<(), Error> {
        self.conn.execute(self.command(name).arg(value)).await
    }
}

#[async_trait::async_trait]
impl AttributeSource for Channel {
    async fn read_attribute(&mut self, name: &str) -> Result<String, Error> {
        self.get_attribute(name).await
    }
}
