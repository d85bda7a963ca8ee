use std::{sync::Arc, time::Duration};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use xena_wire::{Address, Command};

use crate::{Connection, Error};

/// Lower bound between two idle checks, so that a tiny interval can't spin.
const MIN_CHECK_INTERVAL: Duration = Duration::from_millis(10);

/// Background heartbeat for one chassis connection.
///
/// The chassis drops sessions that stay silent for too long. Whenever the connection has
/// been idle for a full keep-alive interval, the task sends the no-op heartbeat query. It
/// never waits behind foreground traffic: if the connection lock is taken, the
/// connection isn't idle and the beat is skipped.
///
/// Dropping the handle cancels the task; [`KeepAlive::stop`] additionally waits for it.
#[derive(Debug)]
pub struct KeepAlive {
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl KeepAlive {
    /// Spawns the heartbeat task for `conn` on the current runtime.
    pub fn spawn(conn: Arc<Connection>) -> Self {
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run(conn, cancel.clone()));

        Self { cancel, handle: Some(handle) }
    }

    /// Cancels the task and waits for it to exit.
    pub async fn stop(mut self) {
        self.cancel.cancel();

        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                tracing::warn!("Keep-alive task failed: {:?}", e);
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl Drop for KeepAlive {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn run(conn: Arc<Connection>, cancel: CancellationToken) {
    let interval = conn.options().keepalive_interval;
    let token = conn.options().keepalive_token.clone();

    loop {
        let wait = interval.saturating_sub(conn.idle_for()).max(MIN_CHECK_INTERVAL);

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(wait) => {}
        }

        if conn.idle_for() < interval {
            continue;
        }

        let heartbeat = Command::query(Address::chassis(), &token);
        let Some(result) = conn.try_request(heartbeat).await else {
            tracing::trace!(peer = conn.peer(), "Connection busy, skipping heartbeat");
            continue;
        };

        conn.stats().record_heartbeat();

        match result {
            Ok(reply) if !reply.is_error() => {
                tracing::trace!(peer = conn.peer(), "Heartbeat sent");
            }
            Ok(reply) => {
                tracing::warn!(peer = conn.peer(), ?reply, "Heartbeat rejected");
            }
            Err(Error::Closed) => {
                tracing::debug!(peer = conn.peer(), "Connection closed, stopping keep-alive");
                break;
            }
            Err(e) => {
                tracing::warn!(peer = conn.peer(), "Heartbeat failed: {}", e);
                if conn.is_closed() {
                    break;
                }
            }
        }
    }
}
