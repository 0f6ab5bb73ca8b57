//! Peer exchange (PEX) reactor.
//!
//! Keeps the node's outbound peer count above `MIN_NUM_OUTBOUND_PEERS` by
//! dialing addresses from the address book, and keeps the book fed by asking
//! connected peers for the addresses they know. Inbound PEX traffic is metered
//! per peer so a single peer cannot flood the book.
//!
//! Two background tasks run while the reactor is started:
//! - the admission loop, which calls `ensure_peers` every period after a
//!   random initial delay
//! - the flush loop, which restores every peer's message allowance hourly

use crate::config::PexConfig;
use crate::error::ServiceError;
use crate::network::addr_book::AddrBook;
use crate::network::address::NetAddress;
use crate::network::message::PexMessage;
use crate::network::rate_limiter::{
    MsgCountGuard, DEFAULT_MAX_MSG_COUNT_BY_PEER, MSG_COUNT_BY_PEER_FLUSH_INTERVAL,
};
use crate::network::switch::{ChannelDescriptor, Peer, Reactor, Switch};
use crate::network::wire::{decode_message, encode_message};
use crate::service::Lifecycle;
use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

/// Channel carrying PEX messages
pub const PEX_CHANNEL: u8 = 0x00;

/// Period to ensure peers connected
pub const DEFAULT_ENSURE_PEERS_PERIOD: Duration = Duration::from_secs(30);

/// Outbound peer floor the admission loop restores every period
pub const MIN_NUM_OUTBOUND_PEERS: usize = 10;

/// Address book picks per dial slot before the slot is given up
const MAX_PICK_TRIES: usize = 3;

/// Bias towards never-connected addresses for a node with `num_outbound` peers.
///
/// Ranges from 10 to 90: the better connected the node already is, the more it
/// can afford to try unproven addresses.
pub fn new_bias(num_outbound: usize) -> u8 {
    // min(.., 8) keeps the arithmetic in u8 range
    (num_outbound.min(8) as u8) * 10 + 10
}

pub struct PexReactor {
    lifecycle: Lifecycle,
    book: Arc<dyn AddrBook>,
    switch: Arc<dyn Switch>,
    ensure_peers_period: Duration,
    /// Tracks message count by peer, so we can prevent abuse
    msg_counts: Arc<MsgCountGuard>,
}

impl PexReactor {
    pub fn new(book: Arc<dyn AddrBook>, switch: Arc<dyn Switch>) -> Self {
        Self {
            lifecycle: Lifecycle::new("PexReactor"),
            book,
            switch,
            ensure_peers_period: DEFAULT_ENSURE_PEERS_PERIOD,
            msg_counts: Arc::new(MsgCountGuard::new(DEFAULT_MAX_MSG_COUNT_BY_PEER)),
        }
    }

    pub fn with_config(
        book: Arc<dyn AddrBook>,
        switch: Arc<dyn Switch>,
        config: &PexConfig,
    ) -> Self {
        let mut reactor = Self::new(book, switch);
        reactor.set_ensure_peers_period(config.ensure_peers_period());
        reactor.set_max_msg_count_by_peer(config.max_msg_count_by_peer);
        reactor
    }

    /// Takes effect the next time the reactor is started.
    pub fn set_ensure_peers_period(&mut self, period: Duration) {
        self.ensure_peers_period = period;
    }

    pub fn ensure_peers_period(&self) -> Duration {
        self.ensure_peers_period
    }

    /// Maximum messages one peer can send during a flush window.
    pub fn set_max_msg_count_by_peer(&self, max: u16) {
        self.msg_counts.set_max_per_peer(max);
    }

    /// Whether the peer keyed by `addr` has used up its message allowance.
    pub fn reached_max_msg_count_for_peer(&self, addr: &str) -> bool {
        self.msg_counts.reached_max(addr)
    }

    pub fn is_running(&self) -> bool {
        self.lifecycle.is_running()
    }

    /// Start the address book, then the admission and flush loops.
    pub fn start(self: &Arc<Self>) -> Result<(), ServiceError> {
        self.lifecycle.start()?;
        self.book.start();

        let reactor = Arc::clone(self);
        let quit = self.lifecycle.quit();
        self.lifecycle
            .spawn(async move { reactor.ensure_peers_routine(quit).await });

        let msg_counts = Arc::clone(&self.msg_counts);
        let quit = self.lifecycle.quit();
        self.lifecycle.spawn(async move {
            msg_counts
                .run_flush_loop(MSG_COUNT_BY_PEER_FLUSH_INTERVAL, quit)
                .await
        });

        Ok(())
    }

    /// Stop the address book and signal both loops. Dials already in flight
    /// are left to finish on their own.
    pub fn stop(&self) -> Result<(), ServiceError> {
        self.lifecycle.stop()?;
        self.book.stop();
        Ok(())
    }

    /// Wait for the background loops to exit after `stop`.
    pub async fn wait(&self, timeout: Duration) -> bool {
        self.lifecycle.wait(timeout).await
    }

    /// Ask `peer` for more addresses.
    pub fn request_pex(&self, peer: &dyn Peer) {
        self.send_message(peer, &PexMessage::Request);
    }

    /// Send `addrs` to `peer`.
    pub fn send_addrs(&self, peer: &dyn Peer, addrs: Vec<NetAddress>) {
        self.send_message(peer, &PexMessage::addrs(addrs));
    }

    fn send_message(&self, peer: &dyn Peer, msg: &PexMessage) {
        match encode_message(msg) {
            Ok(bytes) => {
                if !peer.send(PEX_CHANNEL, bytes) {
                    debug!("Failed to queue {} for {}", msg.type_name(), peer.remote_addr());
                }
            }
            Err(e) => error!("Failed to encode {}: {}", msg.type_name(), e),
        }
    }

    /// Ensures that sufficient peers are connected. (continuous)
    async fn ensure_peers_routine(self: Arc<Self>, quit: CancellationToken) {
        // Randomize when the routine starts so nodes restarted together don't
        // gossip in lockstep.
        let jitter = random_jitter(self.ensure_peers_period);
        tokio::select! {
            _ = quit.cancelled() => return,
            _ = tokio::time::sleep(jitter) => {}
        }

        // fire once immediately
        self.ensure_peers();

        let period = self.ensure_peers_period.max(Duration::from_millis(1));
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = quit.cancelled() => {
                    debug!("Ensure peers routine stopped");
                    return;
                }
                _ = ticker.tick() => self.ensure_peers(),
            }
        }
    }

    /// Ensures that sufficient peers are connected. (once)
    ///
    /// Dials are fire-and-forget; a failed dial is recorded against the
    /// address book. When the book still wants addresses, one random connected
    /// peer is asked for some.
    ///
    /// Must be called from within a Tokio runtime (dials are spawned tasks).
    pub fn ensure_peers(&self) {
        let counts = self.switch.num_peers();
        let num_to_dial =
            MIN_NUM_OUTBOUND_PEERS.saturating_sub(counts.outbound.saturating_add(counts.dialing));
        info!(
            "🔍 Ensure peers: outbound={}, inbound={}, dialing={}, to_dial={}",
            counts.outbound, counts.inbound, counts.dialing, num_to_dial
        );

        if num_to_dial > 0 {
            let to_dial = self.pick_dial_candidates(num_to_dial, counts.outbound);
            for addr in to_dial.into_values() {
                self.spawn_dial(addr);
            }
        }

        if self.book.need_more_addrs() {
            let peers = self.switch.peers();
            if let Some(peer) = peers.choose(&mut rand::thread_rng()) {
                info!(
                    "📨 Address book wants more addresses, requesting from {}",
                    peer.remote_addr()
                );
                self.request_pex(peer.as_ref());
            }
        }
    }

    /// Pick up to `num_to_dial` addresses, at most one per host.
    fn pick_dial_candidates(
        &self,
        num_to_dial: usize,
        num_outbound: usize,
    ) -> HashMap<String, NetAddress> {
        let bias = new_bias(num_outbound);
        let mut to_dial: HashMap<String, NetAddress> = HashMap::with_capacity(num_to_dial);

        for _ in 0..num_to_dial {
            // This caps the total number of picks to MAX_PICK_TRIES * num_to_dial.
            for _ in 0..MAX_PICK_TRIES {
                let Some(candidate) = self.book.pick_address(bias) else {
                    break;
                };

                let key = candidate.ip_key();
                if to_dial.contains_key(&key)
                    || self.switch.is_dialing(&candidate)
                    || self.switch.is_connected(&candidate)
                {
                    trace!("Skipping dial candidate {}", candidate);
                    continue;
                }

                debug!("Will dial address {}", candidate);
                to_dial.insert(key, candidate);
                break;
            }
        }

        to_dial
    }

    fn spawn_dial(&self, addr: NetAddress) {
        let switch = Arc::clone(&self.switch);
        let book = Arc::clone(&self.book);
        tokio::spawn(async move {
            if let Err(e) = switch.dial_peer_with_address(&addr, false).await {
                debug!("Dial to {} failed: {}", addr, e);
                book.mark_attempt(&addr);
            }
        });
    }
}

/// Uniform delay in `[0, period)`.
fn random_jitter(period: Duration) -> Duration {
    let period_ms = period.as_millis() as u64;
    if period_ms == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rand::thread_rng().gen_range(0..period_ms))
}

impl Reactor for PexReactor {
    fn channels(&self) -> Vec<ChannelDescriptor> {
        vec![ChannelDescriptor {
            id: PEX_CHANNEL,
            priority: 1,
            send_queue_capacity: 10,
        }]
    }

    /// Outbound peers are already in the book, so just ask them for more
    /// addresses if needed. Inbound peers are recorded as their own source.
    fn add_peer(&self, peer: &dyn Peer) {
        let listen_addr = peer.listen_addr();
        let addr: NetAddress = match listen_addr.parse() {
            Ok(addr) => addr,
            Err(e) => {
                error!("Invalid listen address {:?} for new peer: {}", listen_addr, e);
                return;
            }
        };

        if peer.is_outbound() {
            if self.book.need_more_addrs() {
                self.request_pex(peer);
            }
        } else {
            self.book.add_address(addr, addr);
        }
    }

    fn remove_peer(&self, peer: &dyn Peer, reason: &str) {
        let listen_addr = peer.listen_addr();
        match listen_addr.parse::<NetAddress>() {
            Ok(addr) => {
                debug!("Peer {} removed ({}), marking bad", addr, reason);
                self.book.mark_bad(&addr);
            }
            Err(e) => warn!("Invalid listen address {:?} for removed peer: {}", listen_addr, e),
        }
    }

    fn receive(&self, ch_id: u8, src: &dyn Peer, msg_bytes: &[u8]) {
        let src_addr = src.remote_addr();
        let src_key = src_addr.to_string();

        if !self.msg_counts.record_and_check(&src_key) {
            // TODO: escalate repeat offenders to a disconnect once the switch
            // exposes a way to stop a peer.
            warn!("⚠️  Maximum number of messages reached for peer {}", src_key);
            return;
        }

        let msg = match decode_message(msg_bytes) {
            Ok((_, msg)) => msg,
            Err(e) => {
                warn!(
                    "Error decoding message from {} on channel {:#04x}: {} (first bytes: {})",
                    src_key,
                    ch_id,
                    e,
                    hex::encode(&msg_bytes[..msg_bytes.len().min(16)])
                );
                return;
            }
        };
        debug!("Received {} from {}", msg, src_key);

        match msg {
            PexMessage::Request => {
                self.send_addrs(src, self.book.get_selection());
            }
            PexMessage::Addrs { addrs } => {
                // Provenance is the connection the message arrived on,
                // whatever the payload claims.
                for addr in addrs.into_iter().flatten() {
                    self.book.add_address(addr, src_addr);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_bias_bounds() {
        assert_eq!(new_bias(0), 10);
        assert_eq!(new_bias(3), 40);
        assert_eq!(new_bias(8), 90);
        assert_eq!(new_bias(1000), 90);
        assert_eq!(new_bias(usize::MAX), 90);
    }

    #[test]
    fn test_new_bias_monotonic() {
        let biases: Vec<u8> = (0..20).map(new_bias).collect();
        assert!(biases.windows(2).all(|w| w[0] <= w[1]));
        assert!(biases.iter().all(|b| (10..=90).contains(b)));
    }

    #[test]
    fn test_random_jitter_within_period() {
        assert_eq!(random_jitter(Duration::ZERO), Duration::ZERO);
        for _ in 0..100 {
            assert!(random_jitter(Duration::from_millis(50)) < Duration::from_millis(50));
        }
    }
}
