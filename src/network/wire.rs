//! Binary envelope for PEX messages.
//!
//! Envelope format: [1-byte type tag][bincode payload]
//! - 0x01 request: empty payload
//! - 0x02 addresses: bincode-encoded sequence of optional addresses
//!
//! Maximum envelope size: 1MB (prevents memory exhaustion attacks)

use crate::error::DecodeError;
use crate::network::message::{AddrsPayload, PexMessage, MSG_TYPE_ADDRS, MSG_TYPE_REQUEST};

/// Maximum allowed envelope size (1MB)
pub const MAX_PEX_MESSAGE_SIZE: usize = 1024 * 1024;

/// Serialize a PexMessage into a tagged envelope.
pub fn encode_message(message: &PexMessage) -> Result<Vec<u8>, DecodeError> {
    let mut frame = vec![message.type_tag()];

    if let PexMessage::Addrs { addrs } = message {
        let payload = AddrsPayload {
            addrs: addrs.clone(),
        };
        let bytes = bincode::serialize(&payload)?;
        frame.reserve(bytes.len());
        frame.extend_from_slice(&bytes);
    }

    if frame.len() > MAX_PEX_MESSAGE_SIZE {
        return Err(DecodeError::TooLarge {
            size: frame.len(),
            max: MAX_PEX_MESSAGE_SIZE,
        });
    }

    Ok(frame)
}

/// Decode a tagged envelope, returning the tag alongside the message.
pub fn decode_message(bytes: &[u8]) -> Result<(u8, PexMessage), DecodeError> {
    let (&tag, payload) = bytes.split_first().ok_or(DecodeError::Empty)?;

    if bytes.len() > MAX_PEX_MESSAGE_SIZE {
        return Err(DecodeError::TooLarge {
            size: bytes.len(),
            max: MAX_PEX_MESSAGE_SIZE,
        });
    }

    let message = match tag {
        MSG_TYPE_REQUEST => PexMessage::Request,
        MSG_TYPE_ADDRS => {
            let payload: AddrsPayload = bincode::deserialize(payload)?;
            PexMessage::Addrs {
                addrs: payload.addrs,
            }
        }
        other => return Err(DecodeError::UnknownType(other)),
    };

    Ok((tag, message))
}
