//! Packets, connection IDs and versions.
//!
//! Packets are modelled per header class. Byte-level header layout and
//! header protection belong to the network layer and are not handled here.

use std::fmt;

use rand::{RngCore, rngs::OsRng};

use crate::core::{AEAD_TAG_SIZE, DecodeError, MAX_CONNECTION_ID_LEN, QUIC_VERSION};

use super::{Frame, PacketNumber, frame::varint_len};

/// A connection identifier (0 to 20 bytes).
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct ConnectionId(Vec<u8>);

impl ConnectionId {
    /// Create from raw bytes.
    pub fn new(bytes: impl Into<Vec<u8>>) -> Result<Self, DecodeError> {
        let bytes = bytes.into();
        if bytes.len() > MAX_CONNECTION_ID_LEN {
            return Err(DecodeError::InvalidConnectionIdLength(bytes.len()));
        }
        Ok(Self(bytes))
    }

    /// Generate a random connection ID of `len` bytes (clamped to 20).
    pub fn random(len: usize) -> Self {
        let mut id = vec![0u8; len.min(MAX_CONNECTION_ID_LEN)];
        OsRng.fill_bytes(&mut id);
        Self(id)
    }

    /// Get the raw bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Length in bytes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check for a zero-length ID.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl AsRef<[u8]> for ConnectionId {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ConnectionId({self})")
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in &self.0 {
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}

/// QUIC packet version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Version(pub u32);

impl Version {
    /// The version this client speaks.
    pub const CURRENT: Self = Self(QUIC_VERSION);

    /// Version value reserved for Version Negotiation packets.
    pub const NEGOTIATION: Self = Self(0);
}

impl Default for Version {
    fn default() -> Self {
        Self::CURRENT
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}

/// Long-header Initial packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitialPacket {
    /// Packet version.
    pub version: Version,
    /// Destination connection ID.
    pub destination: ConnectionId,
    /// Source connection ID, if any.
    pub source: Option<ConnectionId>,
    /// Address-validation token from a Retry.
    pub token: Option<Vec<u8>>,
    /// Packet number.
    pub packet_number: PacketNumber,
    /// Payload frames.
    pub frames: Vec<Frame>,
}

impl InitialPacket {
    /// Size of the protected datagram that would carry this packet.
    ///
    /// Counts the long header, token, length field, packet number, frames
    /// and the AEAD tag.
    pub fn datagram_len(&self) -> usize {
        let token_len = self.token.as_ref().map_or(0, Vec::len);
        let source_len = self.source.as_ref().map_or(0, ConnectionId::len);
        let protected = self.packet_number.encoded_len()
            + self.frames.iter().map(Frame::encoded_len).sum::<usize>()
            + AEAD_TAG_SIZE;

        1 + 4
            + 1
            + self.destination.len()
            + 1
            + source_len
            + varint_len(token_len as u64)
            + token_len
            + varint_len(protected as u64)
            + protected
    }
}

/// Long-header Handshake packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakePacket {
    /// Packet version.
    pub version: Version,
    /// Destination connection ID.
    pub destination: ConnectionId,
    /// Source connection ID, if any.
    pub source: Option<ConnectionId>,
    /// Packet number.
    pub packet_number: PacketNumber,
    /// Payload frames.
    pub frames: Vec<Frame>,
}

/// Retry packet: the server asks us to restart with a token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPacket {
    /// Packet version.
    pub version: Version,
    /// Destination connection ID (ours).
    pub destination: ConnectionId,
    /// Connection ID the server wants us to use from now on.
    pub source: ConnectionId,
    /// Destination ID of the Initial that triggered the Retry.
    pub original_destination: ConnectionId,
    /// Token to echo in the next Initial.
    pub token: Vec<u8>,
}

/// Version Negotiation packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionNegotiationPacket {
    /// Destination connection ID (ours).
    pub destination: ConnectionId,
    /// Server connection ID.
    pub source: ConnectionId,
    /// Versions the server supports.
    pub supported_versions: Vec<Version>,
}

/// Short-header (1-RTT) packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShortPacket {
    /// Key phase bit.
    pub key_phase: bool,
    /// Destination connection ID.
    pub destination: ConnectionId,
    /// Packet number.
    pub packet_number: PacketNumber,
    /// Payload frames.
    pub frames: Vec<Frame>,
}

/// A packet, by header class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    /// Initial.
    Initial(InitialPacket),
    /// Retry.
    Retry(RetryPacket),
    /// Version Negotiation.
    VersionNegotiation(VersionNegotiationPacket),
    /// Handshake.
    Handshake(HandshakePacket),
    /// Short header.
    Short(ShortPacket),
}

impl Packet {
    /// Packet number, absent for unprotected control packets.
    pub fn packet_number(&self) -> Option<PacketNumber> {
        match self {
            Packet::Initial(p) => Some(p.packet_number),
            Packet::Handshake(p) => Some(p.packet_number),
            Packet::Short(p) => Some(p.packet_number),
            Packet::Retry(_) | Packet::VersionNegotiation(_) => None,
        }
    }

    /// Payload frames; empty for control packets.
    pub fn frames(&self) -> &[Frame] {
        match self {
            Packet::Initial(p) => &p.frames,
            Packet::Handshake(p) => &p.frames,
            Packet::Short(p) => &p.frames,
            Packet::Retry(_) | Packet::VersionNegotiation(_) => &[],
        }
    }

    /// Destination connection ID.
    pub fn destination_connection_id(&self) -> &ConnectionId {
        match self {
            Packet::Initial(p) => &p.destination,
            Packet::Retry(p) => &p.destination,
            Packet::VersionNegotiation(p) => &p.destination,
            Packet::Handshake(p) => &p.destination,
            Packet::Short(p) => &p.destination,
        }
    }

    /// Source connection ID, if the header carries one.
    pub fn source_connection_id(&self) -> Option<&ConnectionId> {
        match self {
            Packet::Initial(p) => p.source.as_ref(),
            Packet::Retry(p) => Some(&p.source),
            Packet::VersionNegotiation(p) => Some(&p.source),
            Packet::Handshake(p) => p.source.as_ref(),
            Packet::Short(_) => None,
        }
    }

    /// Short name for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Packet::Initial(_) => "initial",
            Packet::Retry(_) => "retry",
            Packet::VersionNegotiation(_) => "version-negotiation",
            Packet::Handshake(_) => "handshake",
            Packet::Short(_) => "short",
        }
    }

    /// Sum of the encoded lengths of the payload frames.
    pub fn payload_len(&self) -> usize {
        self.frames().iter().map(Frame::encoded_len).sum()
    }
}
