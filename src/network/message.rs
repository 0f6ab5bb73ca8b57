use crate::network::address::NetAddress;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Type tag of a peer request on the wire.
pub const MSG_TYPE_REQUEST: u8 = 0x01;
/// Type tag of an address announcement on the wire.
pub const MSG_TYPE_ADDRS: u8 = 0x02;

/// Messages exchanged on the PEX channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PexMessage {
    /// "Send me addresses."
    Request,
    /// Announced peer addresses. Entries may be absent; receivers skip them.
    Addrs { addrs: Vec<Option<NetAddress>> },
}

/// Payload of an address announcement, as encoded after the tag byte.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub(crate) struct AddrsPayload {
    pub addrs: Vec<Option<NetAddress>>,
}

impl PexMessage {
    pub fn addrs(addrs: Vec<NetAddress>) -> Self {
        PexMessage::Addrs {
            addrs: addrs.into_iter().map(Some).collect(),
        }
    }

    pub fn type_tag(&self) -> u8 {
        match self {
            PexMessage::Request => MSG_TYPE_REQUEST,
            PexMessage::Addrs { .. } => MSG_TYPE_ADDRS,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            PexMessage::Request => "PexRequest",
            PexMessage::Addrs { .. } => "PexAddrs",
        }
    }

    /// Announced addresses with absent entries filtered out.
    pub fn addresses(&self) -> impl Iterator<Item = &NetAddress> {
        let addrs: &[Option<NetAddress>] = match self {
            PexMessage::Request => &[],
            PexMessage::Addrs { addrs } => addrs,
        };
        addrs.iter().flatten()
    }
}

impl fmt::Display for PexMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PexMessage::Request => write!(f, "[pexRequest]"),
            PexMessage::Addrs { addrs } => {
                let shown: Vec<String> = addrs
                    .iter()
                    .map(|a| a.map_or_else(|| "nil".to_string(), |a| a.to_string()))
                    .collect();
                write!(f, "[pexAddrs {}]", shown.join(", "))
            }
        }
    }
}
