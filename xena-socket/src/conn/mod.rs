use futures::{SinkExt, StreamExt};
use std::{
    fmt,
    sync::atomic::{AtomicBool, Ordering},
    time::{Duration, Instant},
};
use tokio::sync::Mutex as AsyncMutex;
use tokio_util::codec::Framed;

use xena_transport::{Io, Transport};
use xena_wire::{Address, Codec, Command, DataLine, Reply, SYNC};

use crate::{ConnOptions, Error};

mod stats;
pub use stats::ConnStats;

type Framing = Framed<Box<dyn Io>, Codec>;

/// A persistent, half-duplex connection to one chassis.
///
/// The protocol carries no request tags, so replies are matched to commands purely by
/// order. Every exchange therefore holds the connection lock from the first byte written
/// until the last reply line is read. Any failure in the middle of an exchange leaves the
/// stream in an unknown position, and the connection is closed.
pub struct Connection {
    peer: String,
    framed: AsyncMutex<Option<Framing>>,
    options: ConnOptions,
    stats: ConnStats,
    last_activity: parking_lot::Mutex<Instant>,
    closed: AtomicBool,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("peer", &self.peer)
            .field("closed", &self.is_closed())
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

impl Connection {
    /// Opens a connection to `addr` through the given transport.
    pub async fn connect<T: Transport>(
        transport: &T,
        addr: &str,
        options: ConnOptions,
    ) -> Result<Self, Error> {
        let io = transport
            .connect(addr)
            .await
            .map_err(|e| Error::Connection { addr: addr.to_string(), source: Box::new(e) })?;

        Ok(Self::new(addr, io, options))
    }

    /// Wraps an already established stream.
    pub fn new(peer: impl Into<String>, io: impl Io, options: ConnOptions) -> Self {
        let io: Box<dyn Io> = Box::new(io);

        Self {
            peer: peer.into(),
            framed: AsyncMutex::new(Some(Framed::new(io, Codec::new()))),
            options,
            stats: ConnStats::default(),
            last_activity: parking_lot::Mutex::new(Instant::now()),
            closed: AtomicBool::new(false),
        }
    }

    pub fn peer(&self) -> &str {
        &self.peer
    }

    pub fn options(&self) -> &ConnOptions {
        &self.options
    }

    pub fn stats(&self) -> &ConnStats {
        &self.stats
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Time since the connection last carried an exchange.
    pub fn idle_for(&self) -> Duration {
        self.last_activity.lock().elapsed()
    }

    /// Sends one command and returns its single reply line, whatever its kind.
    pub async fn request(&self, command: Command) -> Result<Reply, Error> {
        let mut slot = self.framed.lock().await;
        let mut replies = self.exchange(&mut slot, vec![command], false).await?;

        replies.pop().ok_or(Error::Closed)
    }

    /// Like [`Self::request`], but gives up immediately if another exchange holds the
    /// connection.
    pub async fn try_request(&self, command: Command) -> Option<Result<Reply, Error>> {
        let mut slot = self.framed.try_lock().ok()?;
        let result = self.exchange(&mut slot, vec![command], false).await;

        Some(result.and_then(|mut replies| replies.pop().ok_or(Error::Closed)))
    }

    /// Sends a command that must be acknowledged with `<OK>`.
    pub async fn execute(&self, command: Command) -> Result<(), Error> {
        self.expect(command, |reply| matches!(reply, Reply::Ok)).await.map(drop)
    }

    /// Sends a query and returns the value line echoing it.
    pub async fn query(&self, command: Command) -> Result<DataLine, Error> {
        let token = command.token().to_string();
        let echoes = |reply: &Reply| matches!(reply, Reply::Data(data) if data.token() == token);

        match self.expect(command, echoes).await? {
            Reply::Data(data) => Ok(data),
            reply => Err(Error::UnexpectedReply { command: token, reply }),
        }
    }

    /// Sends a batch of queries followed by a sync marker, and returns every value line
    /// received before the marker echo.
    pub async fn query_bulk(&self, commands: Vec<Command>) -> Result<Vec<DataLine>, Error> {
        let description = describe(&commands);

        let mut slot = self.framed.lock().await;
        let replies = self.exchange(&mut slot, commands, true).await?;

        let mut lines = Vec::with_capacity(replies.len());
        for reply in replies {
            match reply {
                Reply::Data(data) => lines.push(data),
                Reply::Error { reason } => {
                    return Err(Error::Protocol { command: description, reason })
                }
                _ => {}
            }
        }

        Ok(lines)
    }

    /// Closes the connection. Closing twice is a no-op.
    pub async fn close(&self) {
        let mut slot = self.framed.lock().await;

        if let Some(mut framed) = slot.take() {
            self.closed.store(true, Ordering::Release);
            if let Err(e) = framed.close().await {
                tracing::debug!(peer = %self.peer, "Error while closing connection: {:?}", e);
            }
            tracing::info!(peer = %self.peer, "Connection closed");
        }
    }

    /// Sends one command and returns its reply if `accepted` says it has the expected
    /// shape. Error replies become [`Error::Protocol`].
    ///
    /// Any other reply means the chassis answered with more than the expected line, for
    /// example a multi-line info dump. The rest of it is drained with a sync round-trip
    /// under the same lock, so the next exchange starts in step.
    async fn expect(
        &self,
        command: Command,
        accepted: impl Fn(&Reply) -> bool,
    ) -> Result<Reply, Error> {
        let line = command.to_string();

        let mut slot = self.framed.lock().await;
        let reply = self
            .exchange(&mut slot, vec![command], false)
            .await?
            .pop()
            .ok_or(Error::Closed)?;

        if accepted(&reply) {
            return Ok(reply);
        }

        if let Reply::Error { reason } = reply {
            return Err(Error::Protocol { command: line, reason });
        }

        let drained = self.exchange(&mut slot, Vec::new(), true).await?;
        tracing::debug!(
            peer = %self.peer,
            command = %line,
            drained = drained.len(),
            "Drained unexpected reply"
        );

        Err(Error::UnexpectedReply { command: line, reply })
    }

    /// Runs one full exchange on a locked connection. In bulk mode the sync marker is
    /// appended and replies are collected until its echo, otherwise exactly one reply is
    /// read per command.
    async fn exchange(
        &self,
        slot: &mut Option<Framing>,
        commands: Vec<Command>,
        bulk: bool,
    ) -> Result<Vec<Reply>, Error> {
        // Checked before anything is written, so a rejected command leaves the
        // connection untouched.
        if let Some(invalid) = commands.iter().find(|c| c.validate().is_err()) {
            return Err(Error::InvalidCommand { command: invalid.to_string() });
        }

        let Some(framed) = slot.as_mut() else {
            return Err(Error::Closed);
        };

        *self.last_activity.lock() = Instant::now();
        let description = describe(&commands);
        let expected = commands.len();
        let start = Instant::now();

        let io = async {
            for command in commands {
                let size = command.to_string().len() + 2;
                framed.feed(command).await?;
                self.stats.record_command(size);
            }

            if bulk {
                framed.feed(Command::new(Address::chassis(), SYNC)).await?;
            }

            framed.flush().await?;

            let mut replies = Vec::with_capacity(expected);
            loop {
                match framed.next().await {
                    Some(Ok(Reply::Blank)) => {}
                    Some(Ok(Reply::Sync)) if bulk => break,
                    Some(Ok(reply)) => {
                        replies.push(reply);
                        if !bulk && replies.len() == expected {
                            break;
                        }
                    }
                    Some(Err(e)) => return Err(Error::Wire(e)),
                    None => return Err(Error::Closed),
                }
            }

            Ok::<_, Error>(replies)
        };

        let result = match tokio::time::timeout(self.options.request_timeout, io).await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout { command: description.clone() }),
        };

        match result {
            Ok(replies) => {
                self.stats.update_rtt(start.elapsed().as_micros() as usize);
                self.stats.record_replies(replies.len());
                *self.last_activity.lock() = Instant::now();

                tracing::debug!(
                    peer = %self.peer,
                    command = %description,
                    ?replies,
                    "Exchange complete"
                );
                Ok(replies)
            }
            Err(e) => {
                tracing::warn!(
                    peer = %self.peer,
                    command = %description,
                    "Exchange failed, closing connection: {}",
                    e
                );
                slot.take();
                self.closed.store(true, Ordering::Release);
                Err(e)
            }
        }
    }
}

fn describe(commands: &[Command]) -> String {
    commands.iter().map(ToString::to_string).collect::<Vec<_>>().join("; ")
}
