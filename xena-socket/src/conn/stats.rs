use std::sync::atomic::{AtomicUsize, Ordering};

/// Statistics for a chassis connection. Shared between the foreground callers and the
/// keep-alive task.
#[derive(Debug, Default)]
pub struct ConnStats {
    /// Commands written, heartbeats included.
    commands: AtomicUsize,
    /// Reply lines read.
    replies: AtomicUsize,
    /// Total bytes written.
    bytes_tx: AtomicUsize,
    /// Heartbeats written.
    heartbeats: AtomicUsize,
    /// The cumulative average round-trip time in microseconds.
    rtt: AtomicUsize,
    /// Index used to calculate rtt
    rtt_idx: AtomicUsize,
}

impl ConnStats {
    /// Atomically updates the RTT according to the CA formula:
    /// CA = (rtt + n * prev_ca) / (n + 1)
    #[inline]
    pub(crate) fn update_rtt(&self, rtt_us: usize) {
        let idx = self.rtt_idx.fetch_add(1, Ordering::Relaxed);
        let prev = self.rtt.load(Ordering::Relaxed);

        let new = (rtt_us + idx * prev) / (idx + 1);
        self.rtt.store(new, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_command(&self, bytes: usize) {
        self.commands.fetch_add(1, Ordering::Relaxed);
        self.bytes_tx.fetch_add(bytes, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_replies(&self, lines: usize) {
        self.replies.fetch_add(lines, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_heartbeat(&self) {
        self.heartbeats.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn rtt(&self) -> usize {
        self.rtt.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn commands(&self) -> usize {
        self.commands.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn replies(&self) -> usize {
        self.replies.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn bytes_tx(&self) -> usize {
        self.bytes_tx.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn heartbeats(&self) -> usize {
        self.heartbeats.load(Ordering::Relaxed)
    }
}
