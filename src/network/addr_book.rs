//! Address book capability and an in-memory implementation.
//!
//! The PEX reactor only talks to the `AddrBook` trait. Implementations must be
//! safe to call from several tasks at once (the admission loop, the dispatch
//! path and the join/leave handlers); the reactor adds no locking of its own.
//!
//! `MemAddrBook` keeps two buckets:
//! - New addresses: heard about from a peer but never connected
//! - Old addresses: connected to successfully at least once
//!
//! Nothing is persisted.

use crate::network::address::NetAddress;
use parking_lot::RwLock;
use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use tracing::{debug, info};

// =============================================================================
// Capability
// =============================================================================

/// Known candidate addresses with a biased random pick.
///
/// Returned addresses are not guaranteed to be connectable; callers report
/// failed dials through `mark_attempt`.
pub trait AddrBook: Send + Sync {
    fn start(&self);

    fn stop(&self);

    /// True while the book would like to hear about more addresses.
    fn need_more_addrs(&self) -> bool;

    /// Addresses suitable for sharing with a peer that asked for some.
    fn get_selection(&self) -> Vec<NetAddress>;

    /// Record `addr` as reported by `src`.
    fn add_address(&self, addr: NetAddress, src: NetAddress);

    /// Evict `addr` from future selection.
    fn mark_bad(&self, addr: &NetAddress);

    /// Record a failed connection attempt to `addr`.
    fn mark_attempt(&self, addr: &NetAddress);

    /// Pick one address. `new_bias` (0..=100) is the percentage weight given to
    /// never-connected addresses over proven ones.
    fn pick_address(&self, new_bias: u8) -> Option<NetAddress>;
}

// =============================================================================
// Constants
// =============================================================================

/// Below this many known addresses the book asks for more
const NEED_ADDRESS_THRESHOLD: usize = 1000;

/// Share of the book handed out per selection
const GET_SELECTION_PERCENT: usize = 23;

const MIN_GET_SELECTION: usize = 32;

const MAX_GET_SELECTION: usize = 250;

// =============================================================================
// Known Address
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bucket {
    New,
    Old,
}

/// Address entry with metadata
#[derive(Debug, Clone)]
pub struct KnownAddress {
    pub addr: NetAddress,
    /// Peer that told us about this address
    pub src: NetAddress,
    /// Failed connection attempts since the last success
    pub attempts: u32,
    pub last_attempt: Option<Instant>,
    pub last_success: Option<Instant>,
    pub bucket: Bucket,
}

impl KnownAddress {
    fn new(addr: NetAddress, src: NetAddress) -> Self {
        Self {
            addr,
            src,
            attempts: 0,
            last_attempt: None,
            last_success: None,
            bucket: Bucket::New,
        }
    }
}

// =============================================================================
// In-memory Address Book
// =============================================================================

pub struct MemAddrBook {
    /// Map from `ip:port` to entry
    addrs: RwLock<HashMap<String, KnownAddress>>,
    /// Reject addresses that are not publicly routable
    routability_strict: bool,
    running: AtomicBool,
}

impl MemAddrBook {
    pub fn new(routability_strict: bool) -> Self {
        Self {
            addrs: RwLock::new(HashMap::new()),
            routability_strict,
            running: AtomicBool::new(false),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn size(&self) -> usize {
        self.addrs.read().len()
    }

    pub fn new_count(&self) -> usize {
        self.count_in(Bucket::New)
    }

    pub fn old_count(&self) -> usize {
        self.count_in(Bucket::Old)
    }

    pub fn get(&self, addr: &NetAddress) -> Option<KnownAddress> {
        self.addrs.read().get(&addr.to_string()).cloned()
    }

    pub fn contains(&self, addr: &NetAddress) -> bool {
        self.addrs.read().contains_key(&addr.to_string())
    }

    /// Mark address as good (successful connection), moving it to the old bucket.
    pub fn mark_good(&self, addr: &NetAddress) {
        if let Some(entry) = self.addrs.write().get_mut(&addr.to_string()) {
            entry.bucket = Bucket::Old;
            entry.attempts = 0;
            entry.last_success = Some(Instant::now());
        }
    }

    fn count_in(&self, bucket: Bucket) -> usize {
        self.addrs
            .read()
            .values()
            .filter(|e| e.bucket == bucket)
            .count()
    }
}

impl Default for MemAddrBook {
    fn default() -> Self {
        Self::new(true)
    }
}

impl AddrBook for MemAddrBook {
    fn start(&self) {
        if !self.running.swap(true, Ordering::SeqCst) {
            info!("📖 Address book started with {} address(es)", self.size());
        }
    }

    fn stop(&self) {
        if self.running.swap(false, Ordering::SeqCst) {
            info!("📖 Address book stopped with {} address(es)", self.size());
        }
    }

    fn need_more_addrs(&self) -> bool {
        self.size() < NEED_ADDRESS_THRESHOLD
    }

    fn get_selection(&self) -> Vec<NetAddress> {
        let mut all: Vec<NetAddress> = self.addrs.read().values().map(|e| e.addr).collect();

        let num = (all.len() * GET_SELECTION_PERCENT / 100)
            .max(MIN_GET_SELECTION.min(all.len()))
            .min(MAX_GET_SELECTION);

        all.shuffle(&mut rand::thread_rng());
        all.truncate(num);
        all
    }

    fn add_address(&self, addr: NetAddress, src: NetAddress) {
        if self.routability_strict && !addr.is_routable() {
            debug!("Ignoring unroutable address {} from {}", addr, src);
            return;
        }

        self.addrs
            .write()
            .entry(addr.to_string())
            .or_insert_with(|| KnownAddress::new(addr, src));
    }

    fn mark_bad(&self, addr: &NetAddress) {
        if self.addrs.write().remove(&addr.to_string()).is_some() {
            debug!("Evicted bad address {}", addr);
        }
    }

    fn mark_attempt(&self, addr: &NetAddress) {
        if let Some(entry) = self.addrs.write().get_mut(&addr.to_string()) {
            entry.attempts += 1;
            entry.last_attempt = Some(Instant::now());
        }
    }

    fn pick_address(&self, new_bias: u8) -> Option<NetAddress> {
        let addrs = self.addrs.read();
        let (new, old): (Vec<&KnownAddress>, Vec<&KnownAddress>) =
            addrs.values().partition(|e| e.bucket == Bucket::New);

        if new.is_empty() && old.is_empty() {
            return None;
        }

        // Weigh bucket sizes by the bias; sqrt keeps a big bucket from
        // drowning out a small one.
        let bias = f64::from(new_bias.min(100));
        let old_correlation = (old.len() as f64).sqrt() * (100.0 - bias);
        let new_correlation = (new.len() as f64).sqrt() * bias;

        let mut rng = rand::thread_rng();
        let pick_old = (old_correlation + new_correlation) * rng.gen::<f64>() < old_correlation;

        let bucket = if (pick_old && !old.is_empty()) || new.is_empty() {
            &old
        } else {
            &new
        };
        bucket.choose(&mut rng).map(|e| e.addr)
    }
}

// =============================================================================
// Tests
// =============================================================================
