use thiserror::Error;

/// Failures while turning raw channel bytes into a PEX message (or back).
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("Empty message")]
    Empty,

    #[error("Message too large: {size} bytes (max: {max})")]
    TooLarge { size: usize, max: usize },

    #[error("Unknown message type: {0:#04x}")]
    UnknownType(u8),

    #[error("Malformed payload: {0}")]
    Payload(#[from] bincode::Error),
}

#[derive(Error, Debug)]
pub enum AddressError {
    #[error("Invalid network address {addr:?}: {reason}")]
    Invalid { addr: String, reason: String },
}

/// Returned by transport implementations when an outbound dial fails.
#[derive(Error, Debug)]
pub enum DialError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Dial timed out")]
    Timeout,

    #[error("Peer rejected: {0}")]
    Rejected(String),
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ServiceError {
    #[error("{0} already started")]
    AlreadyStarted(&'static str),

    #[error("{0} already stopped")]
    AlreadyStopped(&'static str),

    #[error("{0} not started")]
    NotStarted(&'static str),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}
