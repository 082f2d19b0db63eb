//! Collaborator traits consumed by the client engine.
//!
//! The engine never touches sockets, stream buffers or connection-ID policy
//! directly. It talks to a connection through these traits, which lets the
//! same state machine run against the channel-backed
//! [`ClientConnection`](crate::client::ClientConnection) or a test double.

use crate::transport::{ConnectionId, Packet, PacketNumber, TransportError};

#[cfg(feature = "crypto")]
use crate::crypto::AeadContext;

/// Outbound half of a connection: enough to emit tracked packets.
///
/// This is all the [`PacketBuffer`](crate::transport::PacketBuffer) needs.
pub trait PacketSender {
    /// Hand a packet to the network layer.
    fn send_packet(&mut self, packet: Packet);

    /// Connection ID the peer expects on our packets.
    fn destination_connection_id(&self) -> &ConnectionId;

    /// Allocate the next packet number.
    ///
    /// MUST be strictly increasing between calls to
    /// [`Connection::reset_send_packet_number`].
    fn next_packet_number(&mut self) -> Result<PacketNumber, TransportError>;
}

/// Receiving side of an application stream.
///
/// Reassembly and flow control live behind this trait.
pub trait Stream {
    /// Data arrived at `offset`; `fin` marks the final byte of the stream.
    fn on_data(&mut self, offset: u64, fin: bool, data: &[u8]);

    /// Peer abruptly terminated the stream.
    fn on_reset(&mut self, error_code: u64, final_offset: u64);
}

/// Full connection abstraction driven by the client state machine.
#[cfg(feature = "crypto")]
pub trait Connection: PacketSender {
    /// Stream type handed out by [`Connection::stream`].
    type Stream: Stream;

    /// Our own connection ID, if one is in use.
    fn source_connection_id(&self) -> Option<&ConnectionId>;

    /// Replace the destination connection ID.
    fn set_destination_connection_id(&mut self, id: ConnectionId);

    /// Replace (or clear) our own connection ID.
    fn set_source_connection_id(&mut self, id: Option<ConnectionId>);

    /// Install Initial-level packet protection.
    fn set_initial_aead(&mut self, aead: AeadContext);

    /// Install Handshake-level packet protection.
    fn set_handshake_aead(&mut self, aead: AeadContext);

    /// Install 1-RTT packet protection.
    fn set_one_rtt_aead(&mut self, aead: AeadContext);

    /// Get or create the stream with the given ID.
    fn stream(&mut self, stream_id: u64) -> &mut Self::Stream;

    /// Peer terminated the connection; release resources.
    fn close_by_peer(&mut self);

    /// Restart packet numbering (after a Retry).
    fn reset_send_packet_number(&mut self);

    /// Remember the address-validation token from a Retry.
    fn set_token(&mut self, token: Vec<u8>);

    /// Token to echo in Initial packets, if a Retry supplied one.
    fn token(&self) -> Option<&[u8]>;
}
