//! Client connection state machine.
//!
//! ```text
//! BeforeInitial ──handshake()──▶ WaitingForServerHello ──Initial(SH)──▶ WaitingForHandshake
//!                                   │      ▲                                 │
//!                                   └Retry─┘                      Handshake(flight)
//!                                                                            ▼
//!        any ──close / peer close / version mismatch / fatal error──▶ Closing ─▶ Closed   Ready
//! ```
//!
//! The machine is a plain single-owner value: every method takes `&mut self`,
//! so packets and commands are processed one at a time. The async
//! [`QuicClient`](super::QuicClient) wraps it in an actor task.

use std::collections::BTreeMap;
use std::fmt;

use tokio::sync::oneshot;
use tracing::{debug, info, trace, warn};

use crate::core::{Connection, ConnectionError, INTERNAL_ERROR, NO_ERROR, Stream};
use crate::crypto::{AeadContext, ClientTlsSession, Role};
use crate::transport::{
    Frame, FrameType, HandshakePacket, InitialPacket, Packet, PacketBuffer, PacketNumber,
    RetryPacket, ShortPacket, TransportError, VersionNegotiationPacket,
};

use super::ClientConfig;

/// Phase of the client connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionPhase {
    /// Nothing sent yet.
    BeforeInitial,
    /// Initial sent; waiting for the ServerHello (or a Retry).
    WaitingForServerHello,
    /// Handshake keys installed; waiting for the server flight.
    WaitingForHandshake,
    /// Handshake complete; application data flows.
    Ready,
    /// Tearing down.
    Closing,
    /// Terminal.
    Closed,
}

impl ConnectionPhase {
    /// Short name for logs and errors.
    pub fn name(self) -> &'static str {
        match self {
            ConnectionPhase::BeforeInitial => "before-initial",
            ConnectionPhase::WaitingForServerHello => "waiting-for-server-hello",
            ConnectionPhase::WaitingForHandshake => "waiting-for-handshake",
            ConnectionPhase::Ready => "ready",
            ConnectionPhase::Closing => "closing",
            ConnectionPhase::Closed => "closed",
        }
    }

    /// Check whether the connection is closing or closed.
    pub fn is_closed(self) -> bool {
        matches!(self, ConnectionPhase::Closing | ConnectionPhase::Closed)
    }
}

impl fmt::Display for ConnectionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Resolves once the handshake completes or fails.
pub type HandshakeWaiter = oneshot::Receiver<Result<(), ConnectionError>>;

/// Client connection state machine.
pub struct ClientStateMachine<C: Connection> {
    connection: C,
    tls: ClientTlsSession,
    phase: ConnectionPhase,
    buffer: PacketBuffer,
    config: ClientConfig,
    /// Next expected offset in the Handshake-level crypto stream.
    crypto_offset: u64,
    /// Handshake crypto data received ahead of `crypto_offset`, by offset.
    crypto_pending: BTreeMap<u64, Vec<u8>>,
    /// Set once a Retry has been honoured; later ones are dropped.
    retried: bool,
    completion: Option<oneshot::Sender<Result<(), ConnectionError>>>,
}

impl<C: Connection> ClientStateMachine<C> {
    /// Create a state machine driving `connection`.
    pub fn new(connection: C, config: ClientConfig) -> Self {
        Self {
            connection,
            tls: ClientTlsSession::new(),
            phase: ConnectionPhase::BeforeInitial,
            buffer: PacketBuffer::with_capacity(config.ack_queue_capacity),
            config,
            crypto_offset: 0,
            crypto_pending: BTreeMap::new(),
            retried: false,
            completion: None,
        }
    }

    /// Current phase.
    pub fn phase(&self) -> ConnectionPhase {
        self.phase
    }

    /// The underlying connection.
    pub fn connection(&self) -> &C {
        &self.connection
    }

    /// The underlying connection, mutably.
    pub fn connection_mut(&mut self) -> &mut C {
        &mut self.connection
    }

    /// Sent-packet buffer.
    pub fn buffer(&self) -> &PacketBuffer {
        &self.buffer
    }

    /// Start the handshake by sending the first Initial.
    ///
    /// Returns a receiver that resolves exactly once: `Ok(())` on reaching
    /// [`ConnectionPhase::Ready`], or the error that ended the handshake.
    pub fn handshake(&mut self) -> Result<HandshakeWaiter, ConnectionError> {
        if self.phase != ConnectionPhase::BeforeInitial {
            return Err(ConnectionError::InvalidState(self.phase.name()));
        }

        let (tx, rx) = oneshot::channel();
        self.completion = Some(tx);

        let client_hello = self.tls.start()?;
        if let Err(e) = self.send_initial(client_hello) {
            return Err(self.fail(e));
        }
        self.set_phase(ConnectionPhase::WaitingForServerHello);
        Ok(rx)
    }

    /// Process one inbound packet.
    ///
    /// Packets that do not fit the current phase are logged and dropped.
    /// Errors returned here are fatal: the connection has already been
    /// closed and the handshake waiter rejected.
    pub fn process_packet(&mut self, packet: Packet) -> Result<(), ConnectionError> {
        trace!(kind = packet.kind(), phase = %self.phase, "received packet");

        if self.phase.is_closed() {
            debug!(kind = packet.kind(), "connection closed, packet dropped");
            return Ok(());
        }

        if let Some((error_code, reason)) = peer_close(&packet) {
            self.on_peer_close(error_code, reason);
            return Ok(());
        }

        match self.dispatch(&packet) {
            Ok(()) => Ok(()),
            Err(e) => Err(self.fail(e)),
        }
    }

    fn dispatch(&mut self, packet: &Packet) -> Result<(), ConnectionError> {
        match (self.phase, packet) {
            (
                ConnectionPhase::BeforeInitial | ConnectionPhase::WaitingForServerHello,
                Packet::VersionNegotiation(vn),
            ) => {
                self.on_version_negotiation(vn);
                Ok(())
            }
            (ConnectionPhase::WaitingForServerHello, Packet::Initial(initial)) => {
                self.on_server_initial(initial)
            }
            (ConnectionPhase::WaitingForServerHello, Packet::Retry(retry)) => self.on_retry(retry),
            (ConnectionPhase::WaitingForHandshake, Packet::Handshake(handshake)) => {
                self.on_handshake_packet(handshake)
            }
            (ConnectionPhase::Ready, Packet::Short(short)) => self.on_short(packet, short),
            (
                ConnectionPhase::WaitingForHandshake | ConnectionPhase::Ready,
                Packet::Initial(_) | Packet::Handshake(_),
            ) => {
                let retired = self.retire_acked(packet.frames());
                debug!(kind = packet.kind(), retired, "late long-header packet, acks applied");
                Ok(())
            }
            (phase, packet) => {
                warn!(kind = packet.kind(), %phase, "unexpected packet for phase, dropped");
                Ok(())
            }
        }
    }

    fn on_version_negotiation(&mut self, vn: &VersionNegotiationPacket) {
        if vn.supported_versions.contains(&self.config.version) {
            debug!("version negotiation lists our version, ignored");
            return;
        }

        let offered: Vec<u32> = vn.supported_versions.iter().map(|v| v.0).collect();
        info!(ours = %self.config.version, ?offered, "no common version, closing");
        self.set_phase(ConnectionPhase::Closing);
        self.connection.close_by_peer();
        self.buffer.clear();
        self.set_phase(ConnectionPhase::Closed);
        self.complete(Err(ConnectionError::VersionNegotiation(offered)));
    }

    fn on_server_initial(&mut self, initial: &InitialPacket) -> Result<(), ConnectionError> {
        self.retire_acked(&initial.frames);

        let Some(server_hello) = contiguous_crypto(&initial.frames) else {
            debug!("initial without crypto data");
            return Ok(());
        };

        let aead = self.tls.handle_server_hello(&server_hello)?;
        if let Some(source) = &initial.source {
            self.connection.set_destination_connection_id(source.clone());
        }
        self.connection.set_handshake_aead(aead);
        self.crypto_offset = 0;
        self.crypto_pending.clear();
        self.set_phase(ConnectionPhase::WaitingForHandshake);
        Ok(())
    }

    fn on_retry(&mut self, retry: &RetryPacket) -> Result<(), ConnectionError> {
        if self.retried {
            debug!("second retry ignored");
            return Ok(());
        }
        self.retried = true;

        info!(new_destination = %retry.source, "retry received, restarting handshake");
        self.connection
            .set_destination_connection_id(retry.source.clone());
        self.connection.set_source_connection_id(None);
        self.connection.reset_send_packet_number();
        self.connection.set_token(retry.token.clone());
        // The first Initial is abandoned, not acknowledged.
        self.buffer.clear();

        self.tls.reset();
        let client_hello = self.tls.start()?;
        self.send_initial(client_hello)
    }

    fn on_handshake_packet(&mut self, handshake: &HandshakePacket) -> Result<(), ConnectionError> {
        self.retire_acked(&handshake.frames);

        let data = self.take_crypto(&handshake.frames)?;
        if data.is_empty() {
            return Ok(());
        }

        let Some(result) = self.tls.handle_handshake(&data)? else {
            debug!(offset = self.crypto_offset, "waiting for more handshake data");
            return Ok(());
        };

        self.connection.set_one_rtt_aead(result.one_rtt_aead);
        let packet_number = self.connection.next_packet_number()?;
        let packet = Packet::Handshake(HandshakePacket {
            version: self.config.version,
            destination: self.connection.destination_connection_id().clone(),
            source: self.connection.source_connection_id().cloned(),
            packet_number,
            frames: vec![Frame::crypto(0, result.finished)],
        });
        self.buffer.send(&mut self.connection, packet)?;

        self.set_phase(ConnectionPhase::Ready);
        self.complete(Ok(()));
        Ok(())
    }

    fn on_short(&mut self, packet: &Packet, short: &ShortPacket) -> Result<(), ConnectionError> {
        for frame in &short.frames {
            match frame {
                Frame::Stream {
                    stream_id,
                    offset,
                    fin,
                    data,
                } => self.connection.stream(*stream_id).on_data(*offset, *fin, data),
                Frame::RstStream {
                    stream_id,
                    error_code,
                    offset,
                } => self.connection.stream(*stream_id).on_reset(*error_code, *offset),
                Frame::Ping => trace!("ping"),
                Frame::Ack { .. } | Frame::Padding(_) => {}
                other => debug!(?other, "frame ignored in 1-RTT"),
            }
        }

        let retired = self.buffer.on_packet(&mut self.connection, packet)?;
        if retired > 0 {
            trace!(retired, pending = self.buffer.pending_count(), "acked");
        }
        Ok(())
    }

    /// Send stream data in a 1-RTT packet.
    pub fn send_stream(
        &mut self,
        stream_id: u64,
        offset: u64,
        fin: bool,
        data: Vec<u8>,
    ) -> Result<PacketNumber, ConnectionError> {
        self.send_short(vec![Frame::Stream {
            stream_id,
            offset,
            fin,
            data,
        }])
    }

    /// Abruptly terminate one of our streams.
    pub fn reset_stream(
        &mut self,
        stream_id: u64,
        error_code: u64,
        final_offset: u64,
    ) -> Result<PacketNumber, ConnectionError> {
        self.send_short(vec![Frame::RstStream {
            stream_id,
            error_code,
            offset: final_offset,
        }])
    }

    /// Send a Ping.
    pub fn ping(&mut self) -> Result<PacketNumber, ConnectionError> {
        self.send_short(vec![Frame::Ping])
    }

    /// Acknowledge everything received so far.
    pub fn flush_acks(&mut self) -> Result<(), ConnectionError> {
        if self.phase != ConnectionPhase::Ready {
            return Err(ConnectionError::InvalidState(self.phase.name()));
        }
        Ok(self.buffer.flush_acks(&mut self.connection)?)
    }

    /// Close the connection with `NO_ERROR`.
    ///
    /// A pending handshake waiter is rejected with
    /// [`ConnectionError::Closed`]. Closing twice is a no-op.
    pub fn close(&mut self) {
        if self.phase.is_closed() {
            return;
        }

        info!(phase = %self.phase, "closing connection");
        self.send_close(NO_ERROR, "Closing connection");
        self.set_phase(ConnectionPhase::Closing);
        self.buffer.clear();
        self.set_phase(ConnectionPhase::Closed);
        self.complete(Err(ConnectionError::Closed));
    }

    fn send_short(&mut self, frames: Vec<Frame>) -> Result<PacketNumber, ConnectionError> {
        if self.phase != ConnectionPhase::Ready {
            return Err(ConnectionError::InvalidState(self.phase.name()));
        }
        let packet_number = self.connection.next_packet_number()?;
        let packet = Packet::Short(ShortPacket {
            key_phase: false,
            destination: self.connection.destination_connection_id().clone(),
            packet_number,
            frames,
        });
        self.buffer.send(&mut self.connection, packet)?;
        Ok(packet_number)
    }

    fn send_initial(&mut self, client_hello: Vec<u8>) -> Result<(), ConnectionError> {
        let destination = self.connection.destination_connection_id().clone();
        self.connection
            .set_initial_aead(AeadContext::initial(&destination, Role::Client)?);

        let mut initial = InitialPacket {
            version: self.config.version,
            destination,
            source: self.connection.source_connection_id().cloned(),
            token: self.connection.token().map(<[u8]>::to_vec),
            packet_number: self.connection.next_packet_number()?,
            frames: vec![Frame::crypto(0, client_hello)],
        };
        let len = initial.datagram_len();
        if len < self.config.min_initial_datagram_size {
            initial
                .frames
                .push(Frame::Padding(self.config.min_initial_datagram_size - len));
        }

        debug!(
            packet_number = %initial.packet_number,
            size = initial.datagram_len(),
            token = initial.token.is_some(),
            "sending initial"
        );
        self.buffer.send(&mut self.connection, Packet::Initial(initial))?;
        Ok(())
    }

    /// Build a ConnectionClose at the level the peer can currently read.
    fn send_close(&mut self, error_code: u64, reason: &str) {
        let packet_number = match self.connection.next_packet_number() {
            Ok(pn) => pn,
            Err(e) => {
                warn!(error = %e, "no packet number left for connection close");
                return;
            }
        };
        let frames = vec![Frame::connection_close(
            error_code,
            FrameType::Padding,
            reason,
        )];
        let destination = self.connection.destination_connection_id().clone();
        let source = self.connection.source_connection_id().cloned();

        let packet = match self.phase {
            ConnectionPhase::BeforeInitial | ConnectionPhase::WaitingForServerHello => {
                Packet::Initial(InitialPacket {
                    version: self.config.version,
                    destination,
                    source,
                    token: self.connection.token().map(<[u8]>::to_vec),
                    packet_number,
                    frames,
                })
            }
            ConnectionPhase::WaitingForHandshake => Packet::Handshake(HandshakePacket {
                version: self.config.version,
                destination,
                source,
                packet_number,
                frames,
            }),
            ConnectionPhase::Ready | ConnectionPhase::Closing | ConnectionPhase::Closed => {
                Packet::Short(ShortPacket {
                    key_phase: false,
                    destination,
                    packet_number,
                    frames,
                })
            }
        };
        self.connection.send_packet(packet);
    }

    fn on_peer_close(&mut self, error_code: u64, reason: String) {
        info!(error_code, %reason, "connection closed by peer");
        self.set_phase(ConnectionPhase::Closing);
        self.connection.close_by_peer();
        self.buffer.clear();
        self.set_phase(ConnectionPhase::Closed);
        self.complete(Err(ConnectionError::ClosedByPeer { error_code, reason }));
    }

    /// Close after a fatal local error and hand the error back.
    fn fail(&mut self, error: ConnectionError) -> ConnectionError {
        warn!(%error, phase = %self.phase, "fatal connection error");
        let error_code = match &error {
            ConnectionError::Tls(e) => e.close_code(),
            ConnectionError::Transport(e) => e.close_code(),
            _ => INTERNAL_ERROR,
        };
        self.send_close(error_code, &error.to_string());
        self.set_phase(ConnectionPhase::Closing);
        self.buffer.clear();
        self.set_phase(ConnectionPhase::Closed);
        self.complete(Err(error.clone()));
        error
    }

    fn complete(&mut self, result: Result<(), ConnectionError>) {
        if let Some(tx) = self.completion.take() {
            // The caller may have stopped waiting.
            let _ = tx.send(result);
        }
    }

    fn set_phase(&mut self, phase: ConnectionPhase) {
        if self.phase != phase {
            info!(from = %self.phase, to = %phase, "phase transition");
            self.phase = phase;
        }
    }

    /// Retire our packets acknowledged in a long-header packet.
    ///
    /// Long-header packets are not queued for our own acks; only 1-RTT
    /// packets go through the full [`PacketBuffer::on_packet`] path.
    fn retire_acked(&mut self, frames: &[Frame]) -> usize {
        let mut retired = 0;
        for frame in frames {
            if let Frame::Ack { ranges, .. } = frame {
                for range in ranges {
                    retired += self.buffer.retire(range);
                }
            }
        }
        retired
    }

    /// Pull the next in-order bytes of the Handshake crypto stream.
    ///
    /// Data already seen is skipped and overlaps are trimmed. Frames that
    /// start past the expected offset are held until the gap is filled.
    fn take_crypto(&mut self, frames: &[Frame]) -> Result<Vec<u8>, ConnectionError> {
        for frame in frames {
            let Frame::Crypto { offset, data } = frame else {
                continue;
            };
            let end = offset.checked_add(data.len() as u64).ok_or(
                TransportError::CryptoOffsetOverflow {
                    offset: *offset,
                    len: data.len(),
                },
            )?;
            if end <= self.crypto_offset {
                debug!(offset, len = data.len(), "duplicate crypto data ignored");
                continue;
            }
            let longer = self
                .crypto_pending
                .get(offset)
                .is_none_or(|held| held.len() < data.len());
            if longer {
                self.crypto_pending.insert(*offset, data.clone());
            }
        }

        let mut out = Vec::new();
        while let Some(entry) = self.crypto_pending.first_entry() {
            let offset = *entry.key();
            if offset > self.crypto_offset {
                break;
            }
            let data = entry.remove();
            let end = offset.saturating_add(data.len() as u64);
            if end > self.crypto_offset {
                let skip = (self.crypto_offset - offset) as usize;
                out.extend_from_slice(&data[skip..]);
                self.crypto_offset = end;
            }
        }

        if let Some(next) = self.crypto_pending.keys().next() {
            debug!(
                next,
                expected = self.crypto_offset,
                held = self.crypto_pending.len(),
                "crypto data held past a gap"
            );
        }
        Ok(out)
    }
}

impl<C: Connection + fmt::Debug> fmt::Debug for ClientStateMachine<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientStateMachine")
            .field("phase", &self.phase)
            .field("connection", &self.connection)
            .field("pending", &self.buffer.pending_count())
            .finish_non_exhaustive()
    }
}

/// The first ConnectionClose frame in a packet, if any.
fn peer_close(packet: &Packet) -> Option<(u64, String)> {
    packet.frames().iter().find_map(|frame| match frame {
        Frame::ConnectionClose {
            error_code, reason, ..
        } => Some((*error_code, reason.clone())),
        _ => None,
    })
}

/// Concatenate the Initial-level crypto frames starting at offset 0.
///
/// Returns `None` if there is no crypto data at offset 0.
fn contiguous_crypto(frames: &[Frame]) -> Option<Vec<u8>> {
    let mut crypto: Vec<(u64, &[u8])> = frames
        .iter()
        .filter_map(|frame| match frame {
            Frame::Crypto { offset, data } => Some((*offset, data.as_slice())),
            _ => None,
        })
        .collect();
    crypto.sort_by_key(|(offset, _)| *offset);

    let mut out = Vec::new();
    for (offset, data) in crypto {
        let next = out.len() as u64;
        if offset > next {
            break;
        }
        let skip = (next - offset) as usize;
        if skip < data.len() {
            out.extend_from_slice(&data[skip..]);
        }
    }
    (!out.is_empty()).then_some(out)
}
