//! Frames carried in packet payloads.
//!
//! Only the frames the handshake and ack logic reason about are modelled in
//! detail; anything else is kept as [`Frame::Other`] and passed through.

use super::{PacketNumber, TransportError};

/// Frame type codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FrameType {
    /// Padding byte.
    Padding = 0x00,
    /// Keep-alive / ack elicitation.
    Ping = 0x01,
    /// Acknowledgment.
    Ack = 0x02,
    /// Abrupt stream termination.
    RstStream = 0x04,
    /// Handshake data.
    Crypto = 0x06,
    /// Stream data (base code, low bits carry OFF/LEN/FIN).
    Stream = 0x08,
    /// Connection termination.
    ConnectionClose = 0x1c,
}

impl FrameType {
    /// Get the byte representation.
    pub fn as_byte(self) -> u8 {
        self as u8
    }
}

/// A closed interval `[smallest, largest]` of acknowledged packet numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AckRange {
    smallest: PacketNumber,
    largest: PacketNumber,
}

impl AckRange {
    /// Create a range, rejecting inverted bounds.
    pub fn new(smallest: PacketNumber, largest: PacketNumber) -> Result<Self, TransportError> {
        if smallest > largest {
            return Err(TransportError::InvalidAckRange { smallest, largest });
        }
        Ok(Self { smallest, largest })
    }

    /// Range from bounds already known to be ordered.
    pub(crate) fn from_sorted(smallest: PacketNumber, largest: PacketNumber) -> Self {
        debug_assert!(smallest <= largest);
        Self { smallest, largest }
    }

    /// Range covering a single packet number.
    pub fn single(pn: PacketNumber) -> Self {
        Self {
            smallest: pn,
            largest: pn,
        }
    }

    /// Lower bound (inclusive).
    pub fn smallest(&self) -> PacketNumber {
        self.smallest
    }

    /// Upper bound (inclusive).
    pub fn largest(&self) -> PacketNumber {
        self.largest
    }

    /// Check whether `pn` falls inside the range.
    pub fn contains(&self, pn: PacketNumber) -> bool {
        self.smallest <= pn && pn <= self.largest
    }

    /// Number of packet numbers covered.
    pub fn len(&self) -> u64 {
        self.largest.as_u64() - self.smallest.as_u64() + 1
    }

    /// Ranges are never empty.
    pub fn is_empty(&self) -> bool {
        false
    }
}

/// A frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// A run of padding bytes.
    Padding(usize),

    /// Ping.
    Ping,

    /// Acknowledgment of disjoint, ascending ranges.
    Ack {
        /// Ack delay as reported by the sender.
        delay: u64,
        /// Acknowledged ranges, ascending.
        ranges: Vec<AckRange>,
    },

    /// Stream reset.
    RstStream {
        /// Stream being reset.
        stream_id: u64,
        /// Application error code.
        error_code: u64,
        /// Final size of the stream.
        offset: u64,
    },

    /// Handshake bytes.
    Crypto {
        /// Offset in the crypto stream.
        offset: u64,
        /// Handshake bytes.
        data: Vec<u8>,
    },

    /// Stream data.
    Stream {
        /// Stream identifier.
        stream_id: u64,
        /// Offset of `data` in the stream.
        offset: u64,
        /// Final frame of the stream.
        fin: bool,
        /// Payload bytes.
        data: Vec<u8>,
    },

    /// Connection termination.
    ConnectionClose {
        /// Transport error code.
        error_code: u64,
        /// Type of the frame that triggered the close.
        frame_type: u64,
        /// Human-readable reason.
        reason: String,
    },

    /// Any other frame, passed through untouched.
    Other {
        /// Raw frame type.
        frame_type: u64,
        /// Raw frame body.
        payload: Vec<u8>,
    },
}

impl Frame {
    /// Build an Ack frame from ascending ranges.
    pub fn ack(delay: u64, ranges: Vec<AckRange>) -> Self {
        Frame::Ack { delay, ranges }
    }

    /// Build a Crypto frame.
    pub fn crypto(offset: u64, data: Vec<u8>) -> Self {
        Frame::Crypto { offset, data }
    }

    /// Build a ConnectionClose frame.
    pub fn connection_close(error_code: u64, frame_type: FrameType, reason: &str) -> Self {
        Frame::ConnectionClose {
            error_code,
            frame_type: u64::from(frame_type.as_byte()),
            reason: reason.to_owned(),
        }
    }

    /// Check if this is an Ack frame.
    pub fn is_ack(&self) -> bool {
        matches!(self, Frame::Ack { .. })
    }

    /// Number of bytes this frame occupies on the wire.
    pub fn encoded_len(&self) -> usize {
        match self {
            Frame::Padding(len) => *len,
            Frame::Ping => 1,
            Frame::Ack { delay, ranges } => ack_encoded_len(*delay, ranges),
            Frame::RstStream {
                stream_id,
                error_code,
                offset,
            } => 1 + varint_len(*stream_id) + varint_len(*error_code) + varint_len(*offset),
            Frame::Crypto { offset, data } => {
                1 + varint_len(*offset) + varint_len(data.len() as u64) + data.len()
            }
            Frame::Stream {
                stream_id,
                offset,
                data,
                ..
            } => {
                let offset_len = if *offset > 0 { varint_len(*offset) } else { 0 };
                1 + varint_len(*stream_id) + offset_len + varint_len(data.len() as u64) + data.len()
            }
            Frame::ConnectionClose {
                error_code,
                frame_type,
                reason,
            } => {
                1 + varint_len(*error_code)
                    + varint_len(*frame_type)
                    + varint_len(reason.len() as u64)
                    + reason.len()
            }
            Frame::Other {
                frame_type,
                payload,
            } => varint_len(*frame_type) + payload.len(),
        }
    }
}

/// Ack frames encode the largest range first, then gap/length pairs downward.
fn ack_encoded_len(delay: u64, ranges: &[AckRange]) -> usize {
    let Some(first) = ranges.last() else {
        return 1 + varint_len(0) + varint_len(delay) + varint_len(0) + varint_len(0);
    };

    let mut len = 1
        + varint_len(first.largest().as_u64())
        + varint_len(delay)
        + varint_len(ranges.len() as u64 - 1)
        + varint_len(first.len() - 1);

    let mut previous = first;
    for range in ranges.iter().rev().skip(1) {
        let gap = previous
            .smallest()
            .as_u64()
            .saturating_sub(range.largest().as_u64() + 2);
        len += varint_len(gap) + varint_len(range.len() - 1);
        previous = range;
    }
    len
}

/// Length of a 62-bit QUIC varint carrying `value`.
pub(crate) fn varint_len(value: u64) -> usize {
    if value < 1 << 6 {
        1
    } else if value < 1 << 14 {
        2
    } else if value < 1 << 30 {
        4
    } else {
        8
    }
}
