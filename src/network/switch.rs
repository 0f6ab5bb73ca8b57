//! Capabilities the PEX subsystem needs from the transport layer.
//!
//! The transport owns connections, dialing and multiplexing. It hands peers to
//! registered reactors and routes channel bytes to them; reactors only ever
//! borrow the peers they are given.

use crate::error::DialError;
use crate::network::address::NetAddress;
use std::sync::Arc;

/// A logical, independently flow-controlled stream over a peer connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelDescriptor {
    pub id: u8,
    pub priority: u32,
    pub send_queue_capacity: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PeerCounts {
    pub outbound: usize,
    pub inbound: usize,
    /// Dials in flight that have not produced a peer yet
    pub dialing: usize,
}

/// A connected remote node, owned by the transport.
pub trait Peer: Send + Sync {
    /// Address the peer says it listens on.
    fn listen_addr(&self) -> String;

    /// Actual remote end of the connection.
    fn remote_addr(&self) -> NetAddress;

    fn is_outbound(&self) -> bool;

    /// Queue `bytes` on channel `ch_id`. False if the queue is full or closed.
    fn send(&self, ch_id: u8, bytes: Vec<u8>) -> bool;
}

#[async_trait::async_trait]
pub trait Switch: Send + Sync {
    fn num_peers(&self) -> PeerCounts;

    /// Whether a dial to this address's host is in flight.
    fn is_dialing(&self, addr: &NetAddress) -> bool;

    /// Whether a peer on this address's host is connected.
    fn is_connected(&self, addr: &NetAddress) -> bool;

    fn peers(&self) -> Vec<Arc<dyn Peer>>;

    /// Open a connection to `addr`. On success the new peer reaches reactors
    /// through `Reactor::add_peer`.
    async fn dial_peer_with_address(
        &self,
        addr: &NetAddress,
        persistent: bool,
    ) -> Result<(), DialError>;
}

/// Event callbacks the transport drives for one protocol concern.
pub trait Reactor: Send + Sync {
    fn channels(&self) -> Vec<ChannelDescriptor>;

    fn add_peer(&self, peer: &dyn Peer);

    fn remove_peer(&self, peer: &dyn Peer, reason: &str);

    fn receive(&self, ch_id: u8, src: &dyn Peer, msg_bytes: &[u8]);
}
