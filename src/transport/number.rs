//! Packet numbers and their variable-length wire encoding.
//!
//! The width is chosen by magnitude and announced by the two high bits of
//! the first byte:
//!
//! ```text
//! tag  width  range
//! 00   1      0..=63
//! 10   2      64..=16383
//! 11   4      16384..=2^30-1
//! 01   -      reserved, rejected on decode
//! ```

use std::fmt;

use crate::core::{
    DecodeError, MAX_PACKET_NUMBER, PN_ONE_BYTE_MAX, PN_TAG_FOUR_BYTES, PN_TAG_MASK,
    PN_TAG_ONE_BYTE, PN_TAG_TWO_BYTES, PN_TWO_BYTE_MAX,
};

/// A per-connection packet number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct PacketNumber(u64);

impl PacketNumber {
    /// The first packet number.
    pub const MIN: Self = Self(0);

    /// The largest encodable packet number.
    pub const MAX: Self = Self(MAX_PACKET_NUMBER);

    /// Create a packet number, rejecting values the varint cannot carry.
    pub fn new(value: u64) -> Result<Self, DecodeError> {
        if value > MAX_PACKET_NUMBER {
            return Err(DecodeError::ValueTooLarge(value));
        }
        Ok(Self(value))
    }

    /// Get the numeric value.
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// The following packet number, or `None` once the space is exhausted.
    pub fn next(self) -> Option<Self> {
        if self.0 >= MAX_PACKET_NUMBER {
            None
        } else {
            Some(Self(self.0 + 1))
        }
    }

    /// Number of bytes [`encode`](Self::encode) produces.
    pub fn encoded_len(self) -> usize {
        if self.0 <= PN_ONE_BYTE_MAX {
            1
        } else if self.0 <= PN_TWO_BYTE_MAX {
            2
        } else {
            4
        }
    }

    /// Encode using the minimal width.
    pub fn encode(self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(4);
        self.encode_into(&mut buf);
        buf
    }

    /// Append the encoding to `buf`.
    pub fn encode_into(self, buf: &mut Vec<u8>) {
        // Values are bounded by MAX_PACKET_NUMBER, so they fit 30 bits.
        let value = self.0 as u32;
        match self.encoded_len() {
            1 => buf.push(value as u8 | PN_TAG_ONE_BYTE),
            2 => {
                let bytes = (value as u16).to_be_bytes();
                buf.push(bytes[0] | PN_TAG_TWO_BYTES);
                buf.push(bytes[1]);
            }
            _ => {
                let mut bytes = value.to_be_bytes();
                bytes[0] |= PN_TAG_FOUR_BYTES;
                buf.extend_from_slice(&bytes);
            }
        }
    }

    /// Decode a packet number from the start of `bytes`.
    ///
    /// Returns the value and the number of bytes consumed.
    pub fn decode(bytes: &[u8]) -> Result<(Self, usize), DecodeError> {
        let &first = bytes
            .first()
            .ok_or(DecodeError::UnexpectedEof { need: 1, have: 0 })?;

        let len = match first & PN_TAG_MASK {
            PN_TAG_ONE_BYTE => 1,
            PN_TAG_TWO_BYTES => 2,
            PN_TAG_FOUR_BYTES => 4,
            _ => return Err(DecodeError::InvalidTag(first)),
        };

        if bytes.len() < len {
            return Err(DecodeError::UnexpectedEof {
                need: len,
                have: bytes.len(),
            });
        }

        let mut value = u64::from(first & !PN_TAG_MASK);
        for &b in &bytes[1..len] {
            value = (value << 8) | u64::from(b);
        }

        Ok((Self(value), len))
    }
}

impl TryFrom<u64> for PacketNumber {
    type Error = DecodeError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<PacketNumber> for u64 {
    fn from(pn: PacketNumber) -> Self {
        pn.0
    }
}

impl fmt::Display for PacketNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
