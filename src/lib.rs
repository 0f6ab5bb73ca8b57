//! Peer exchange (PEX) for a peer-to-peer node.
//!
//! Gossips known addresses with connected peers, keeps the outbound connection
//! count above a floor, and meters inbound PEX traffic per peer. The transport
//! and the address book are external collaborators reached through the traits
//! in [`network::switch`] and [`network::addr_book`].

pub mod config;
pub mod error;
pub mod logging;
pub mod network;
pub mod service;

pub use config::{Config, LoggingConfig, PexConfig};
pub use error::{AddressError, ConfigError, DecodeError, DialError, ServiceError};
pub use network::addr_book::{AddrBook, MemAddrBook};
pub use network::address::NetAddress;
pub use network::message::PexMessage;
pub use network::pex_reactor::{new_bias, PexReactor, MIN_NUM_OUTBOUND_PEERS, PEX_CHANNEL};
pub use network::rate_limiter::MsgCountGuard;
pub use network::switch::{ChannelDescriptor, Peer, PeerCounts, Reactor, Switch};
pub use network::wire::{decode_message, encode_message, MAX_PEX_MESSAGE_SIZE};
