//! Channel-backed connection.
//!
//! [`ClientConnection`] implements [`Connection`] by pushing outbound packets
//! and stream events onto unbounded tokio channels. The network layer on the
//! other end encodes, protects and transmits them.

use std::collections::HashMap;

use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::core::{Connection, PacketSender, Stream};
use crate::crypto::{AeadContext, EncryptionLevel};
use crate::transport::{ConnectionId, Packet, PacketNumber, TransportError};

/// Something that happened on an application stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// Data arrived.
    Data {
        /// Stream identifier.
        stream_id: u64,
        /// Offset of `data` in the stream.
        offset: u64,
        /// Last data of the stream.
        fin: bool,
        /// Payload bytes.
        data: Vec<u8>,
    },
    /// Peer reset the stream.
    Reset {
        /// Stream identifier.
        stream_id: u64,
        /// Application error code.
        error_code: u64,
        /// Final size of the stream.
        final_offset: u64,
    },
}

/// A stream that forwards everything it receives as [`StreamEvent`]s.
#[derive(Debug)]
pub struct ChannelStream {
    id: u64,
    events: mpsc::UnboundedSender<StreamEvent>,
    reset: bool,
}

impl ChannelStream {
    fn new(id: u64, events: mpsc::UnboundedSender<StreamEvent>) -> Self {
        Self {
            id,
            events,
            reset: false,
        }
    }

    /// Stream identifier.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Check whether the peer reset this stream.
    pub fn is_reset(&self) -> bool {
        self.reset
    }

    fn emit(&self, event: StreamEvent) {
        if self.events.send(event).is_err() {
            trace!(stream_id = self.id, "stream event receiver dropped");
        }
    }
}

impl Stream for ChannelStream {
    fn on_data(&mut self, offset: u64, fin: bool, data: &[u8]) {
        if self.reset {
            debug!(stream_id = self.id, "data on reset stream ignored");
            return;
        }
        self.emit(StreamEvent::Data {
            stream_id: self.id,
            offset,
            fin,
            data: data.to_vec(),
        });
    }

    fn on_reset(&mut self, error_code: u64, final_offset: u64) {
        self.reset = true;
        self.emit(StreamEvent::Reset {
            stream_id: self.id,
            error_code,
            final_offset,
        });
    }
}

/// Client side of a connection, backed by channels.
#[derive(Debug)]
pub struct ClientConnection {
    destination: ConnectionId,
    source: Option<ConnectionId>,
    /// `None` once the packet-number space is exhausted.
    next_packet_number: Option<PacketNumber>,
    token: Option<Vec<u8>>,
    initial_aead: Option<AeadContext>,
    handshake_aead: Option<AeadContext>,
    one_rtt_aead: Option<AeadContext>,
    streams: HashMap<u64, ChannelStream>,
    outbound: mpsc::UnboundedSender<Packet>,
    stream_events: mpsc::UnboundedSender<StreamEvent>,
    closed_by_peer: bool,
}

impl ClientConnection {
    /// Create a connection.
    pub fn new(
        destination: ConnectionId,
        source: Option<ConnectionId>,
        outbound: mpsc::UnboundedSender<Packet>,
        stream_events: mpsc::UnboundedSender<StreamEvent>,
    ) -> Self {
        Self {
            destination,
            source,
            next_packet_number: Some(PacketNumber::MIN),
            token: None,
            initial_aead: None,
            handshake_aead: None,
            one_rtt_aead: None,
            streams: HashMap::new(),
            outbound,
            stream_events,
            closed_by_peer: false,
        }
    }

    /// Create a connection with random IDs plus the receiving ends of its
    /// packet and stream-event channels.
    pub fn with_channels(
        source_connection_id_len: usize,
    ) -> (
        Self,
        mpsc::UnboundedReceiver<Packet>,
        mpsc::UnboundedReceiver<StreamEvent>,
    ) {
        let (packet_tx, packet_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let source = Some(ConnectionId::random(source_connection_id_len));
        let destination = ConnectionId::random(crate::core::DEFAULT_CONNECTION_ID_LEN);
        (
            Self::new(destination, source, packet_tx, event_tx),
            packet_rx,
            event_rx,
        )
    }

    /// Installed packet protection for a level.
    pub fn aead(&self, level: EncryptionLevel) -> Option<&AeadContext> {
        match level {
            EncryptionLevel::Initial => self.initial_aead.as_ref(),
            EncryptionLevel::Handshake => self.handshake_aead.as_ref(),
            EncryptionLevel::OneRtt => self.one_rtt_aead.as_ref(),
        }
    }

    /// Check whether the peer closed the connection.
    pub fn is_closed_by_peer(&self) -> bool {
        self.closed_by_peer
    }

    /// Number of open streams.
    pub fn stream_count(&self) -> usize {
        self.streams.len()
    }
}

impl PacketSender for ClientConnection {
    fn send_packet(&mut self, packet: Packet) {
        trace!(kind = packet.kind(), packet_number = ?packet.packet_number(), "send");
        if self.outbound.send(packet).is_err() {
            debug!("outbound receiver dropped, packet discarded");
        }
    }

    fn destination_connection_id(&self) -> &ConnectionId {
        &self.destination
    }

    fn next_packet_number(&mut self) -> Result<PacketNumber, TransportError> {
        let pn = self
            .next_packet_number
            .ok_or(TransportError::PacketNumberExhausted)?;
        self.next_packet_number = pn.next();
        Ok(pn)
    }
}

impl Connection for ClientConnection {
    type Stream = ChannelStream;

    fn source_connection_id(&self) -> Option<&ConnectionId> {
        self.source.as_ref()
    }

    fn set_destination_connection_id(&mut self, id: ConnectionId) {
        debug!(old = %self.destination, new = %id, "destination connection id changed");
        self.destination = id;
    }

    fn set_source_connection_id(&mut self, id: Option<ConnectionId>) {
        self.source = id;
    }

    fn set_initial_aead(&mut self, aead: AeadContext) {
        self.initial_aead = Some(aead);
    }

    fn set_handshake_aead(&mut self, aead: AeadContext) {
        self.handshake_aead = Some(aead);
    }

    fn set_one_rtt_aead(&mut self, aead: AeadContext) {
        self.one_rtt_aead = Some(aead);
    }

    fn stream(&mut self, stream_id: u64) -> &mut ChannelStream {
        let events = &self.stream_events;
        self.streams
            .entry(stream_id)
            .or_insert_with(|| ChannelStream::new(stream_id, events.clone()))
    }

    fn close_by_peer(&mut self) {
        self.closed_by_peer = true;
        self.streams.clear();
        self.initial_aead = None;
        self.handshake_aead = None;
        self.one_rtt_aead = None;
    }

    fn reset_send_packet_number(&mut self) {
        self.next_packet_number = Some(PacketNumber::MIN);
    }

    fn set_token(&mut self, token: Vec<u8>) {
        self.token = Some(token);
    }

    fn token(&self) -> Option<&[u8]> {
        self.token.as_deref()
    }
}
