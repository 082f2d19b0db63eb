//! Transport layer error types.

use thiserror::Error;

use crate::core::{DecodeError, INTERNAL_ERROR, PROTOCOL_VIOLATION};

use super::PacketNumber;

/// Transport layer errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Wire decoding error.
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    /// Ack range with `smallest > largest`.
    #[error("invalid ack range [{smallest}, {largest}]")]
    InvalidAckRange {
        /// Lower bound.
        smallest: PacketNumber,
        /// Upper bound.
        largest: PacketNumber,
    },

    /// Tried to track a packet that carries no packet number.
    #[error("packet has no packet number")]
    MissingPacketNumber,

    /// Tried to send a packet number that is already awaiting acknowledgment.
    #[error("packet number {0} already pending")]
    DuplicatePacketNumber(PacketNumber),

    /// Packet number space exhausted.
    /// The connection must be closed.
    #[error("packet number space exhausted")]
    PacketNumberExhausted,

    /// A CRYPTO frame reaches past the largest representable stream offset.
    #[error("crypto frame at offset {offset} with {len} bytes overflows the stream")]
    CryptoOffsetOverflow {
        /// Frame offset.
        offset: u64,
        /// Frame length.
        len: usize,
    },
}

impl TransportError {
    /// Transport error code carried by the ConnectionClose this error triggers.
    pub fn close_code(&self) -> u64 {
        match self {
            TransportError::Decode(_)
            | TransportError::InvalidAckRange { .. }
            | TransportError::CryptoOffsetOverflow { .. } => PROTOCOL_VIOLATION,
            TransportError::MissingPacketNumber
            | TransportError::DuplicatePacketNumber(_)
            | TransportError::PacketNumberExhausted => INTERNAL_ERROR,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_close_codes() {
        assert_eq!(
            TransportError::Decode(DecodeError::InvalidTag(0x40)).close_code(),
            PROTOCOL_VIOLATION
        );
        assert_eq!(
            TransportError::InvalidAckRange {
                smallest: PacketNumber::new(5).unwrap(),
                largest: PacketNumber::new(1).unwrap(),
            }
            .close_code(),
            PROTOCOL_VIOLATION
        );
        assert_eq!(
            TransportError::CryptoOffsetOverflow {
                offset: u64::MAX,
                len: 1,
            }
            .close_code(),
            PROTOCOL_VIOLATION
        );
        assert_eq!(TransportError::PacketNumberExhausted.close_code(), INTERNAL_ERROR);
        assert_eq!(TransportError::MissingPacketNumber.close_code(), INTERNAL_ERROR);
    }
}
