//! Per-peer message accounting for the PEX channel.
//!
//! Every inbound message bumps its sender's counter before it is decoded. Once a
//! peer has spent its allowance the rest of its messages are dropped until the
//! whole table is flushed, which happens on a fixed interval for all peers at
//! once (not a sliding window).

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU16, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Maximum messages one peer can send during `MSG_COUNT_BY_PEER_FLUSH_INTERVAL`
pub const DEFAULT_MAX_MSG_COUNT_BY_PEER: u16 = 1000;

/// How often every peer's allowance is restored
pub const MSG_COUNT_BY_PEER_FLUSH_INTERVAL: Duration = Duration::from_secs(60 * 60);

pub struct MsgCountGuard {
    counters: Mutex<HashMap<String, u16>>,
    max_per_peer: AtomicU16,
}

impl MsgCountGuard {
    pub fn new(max_per_peer: u16) -> Self {
        Self {
            counters: Mutex::new(HashMap::new()),
            max_per_peer: AtomicU16::new(max_per_peer),
        }
    }

    /// Count one message from `peer` and report whether it may be processed.
    ///
    /// The first `max` messages of a window are allowed. Rejected messages do
    /// not move the counter, so it never exceeds `max`.
    pub fn record_and_check(&self, peer: &str) -> bool {
        let max = self.max_per_peer.load(Ordering::Relaxed);
        let mut counters = self.counters.lock();
        let count = counters.entry(peer.to_string()).or_insert(0);

        if *count >= max {
            false
        } else {
            *count += 1;
            true
        }
    }

    /// Whether `peer` has used up its allowance for the current window.
    pub fn reached_max(&self, peer: &str) -> bool {
        self.count(peer) >= self.max_per_peer.load(Ordering::Relaxed)
    }

    pub fn count(&self, peer: &str) -> u16 {
        self.counters.lock().get(peer).copied().unwrap_or(0)
    }

    pub fn max_per_peer(&self) -> u16 {
        self.max_per_peer.load(Ordering::Relaxed)
    }

    pub fn set_max_per_peer(&self, max: u16) {
        self.max_per_peer.store(max, Ordering::Relaxed);
    }

    /// Forget every peer's count.
    pub fn flush(&self) {
        let mut counters = self.counters.lock();
        if !counters.is_empty() {
            tracing::debug!("🧹 Flushing message counts for {} peer(s)", counters.len());
        }
        counters.clear();
    }

    /// Flush on every `interval` tick until `quit` fires.
    pub async fn run_flush_loop(&self, interval: Duration, quit: CancellationToken) {
        let start = tokio::time::Instant::now() + interval;
        let mut ticker = tokio::time::interval_at(start, interval);

        loop {
            tokio::select! {
                _ = quit.cancelled() => {
                    tracing::debug!("Message count flush loop stopped");
                    return;
                }
                _ = ticker.tick() => self.flush(),
            }
        }
    }
}

impl Default for MsgCountGuard {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_MSG_COUNT_BY_PEER)
    }
}
