//! Network address of a remote node.
//!
//! `NetAddress` is the identity the PEX subsystem gossips about. Two keys are
//! derived from it: the full `ip:port` string (rate-limit bookkeeping, address
//! book entries) and the bare IP string used to avoid dialing one host twice.

use crate::error::AddressError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NetAddress {
    pub ip: IpAddr,
    pub port: u16,
}

impl NetAddress {
    pub fn new(ip: IpAddr, port: u16) -> Self {
        Self { ip, port }
    }

    /// Key used to deduplicate dial candidates: one host, one dial.
    pub fn ip_key(&self) -> String {
        self.ip.to_string()
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.ip, self.port)
    }

    /// Whether the address is reachable from the public internet.
    pub fn is_routable(&self) -> bool {
        if self.port == 0 {
            return false;
        }
        match self.ip {
            IpAddr::V4(ip) => {
                !(ip.is_loopback()
                    || ip.is_private()
                    || ip.is_unspecified()
                    || ip.is_link_local()
                    || ip.is_broadcast()
                    || ip.is_documentation()
                    || ip.is_multicast())
            }
            IpAddr::V6(ip) => {
                if let Some(v4) = ip.to_ipv4_mapped() {
                    return NetAddress::new(IpAddr::V4(v4), self.port).is_routable();
                }
                let first = ip.segments()[0];
                let unique_local = (first & 0xfe00) == 0xfc00;
                let link_local = (first & 0xffc0) == 0xfe80;
                !(ip.is_loopback()
                    || ip.is_unspecified()
                    || ip.is_multicast()
                    || unique_local
                    || link_local)
            }
        }
    }
}

impl fmt::Display for NetAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.socket_addr())
    }
}

impl From<SocketAddr> for NetAddress {
    fn from(addr: SocketAddr) -> Self {
        Self::new(addr.ip(), addr.port())
    }
}

impl FromStr for NetAddress {
    type Err = AddressError;

    /// Parses `ip:port` or `[v6]:port`. Host names are not resolved.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(AddressError::Invalid {
                addr: s.to_string(),
                reason: "empty address".to_string(),
            });
        }

        trimmed
            .parse::<SocketAddr>()
            .map(NetAddress::from)
            .map_err(|e| AddressError::Invalid {
                addr: s.to_string(),
                reason: e.to_string(),
            })
    }
}
