//! High-level async client API.
//!
//! [`QuicClient`] owns a [`ClientStateMachine`] inside a spawned task and
//! talks to it over a command channel, so the machine never needs a lock.
//! Outbound packets and stream events come back through [`ClientEvents`].

use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::debug;

use crate::core::{ConnectionError, QuicError};
use crate::transport::{Packet, PacketNumber};

use super::{
    ClientConfig, ClientConnection, ClientStateMachine, ConnectionPhase, HandshakeWaiter,
    StreamEvent,
};

/// Errors that can occur in the client.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ClientError {
    /// The connection rejected the operation or failed.
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    /// The connection task is gone.
    #[error("client disconnected")]
    Disconnected,

    /// Operation timed out.
    #[error("operation timed out")]
    Timeout,

    /// The handshake waiter was dropped without a result.
    #[error("handshake cancelled")]
    HandshakeCancelled,
}

/// Receiving ends of everything the connection emits.
#[derive(Debug)]
pub struct ClientEvents {
    /// Packets to protect and put on the wire.
    pub packets: mpsc::UnboundedReceiver<Packet>,
    /// Data and resets on application streams.
    pub streams: mpsc::UnboundedReceiver<StreamEvent>,
}

type Reply<T> = oneshot::Sender<Result<T, ConnectionError>>;

enum Command {
    Handshake(Reply<HandshakeWaiter>),
    Deliver(Packet, Reply<()>),
    SendStream {
        stream_id: u64,
        offset: u64,
        fin: bool,
        data: Vec<u8>,
        reply: Reply<PacketNumber>,
    },
    ResetStream {
        stream_id: u64,
        error_code: u64,
        final_offset: u64,
        reply: Reply<PacketNumber>,
    },
    Ping(Reply<PacketNumber>),
    FlushAcks(Reply<()>),
    Close(oneshot::Sender<()>),
}

/// Handle to a client connection.
///
/// Cloning the handle shares the same connection. The connection is closed
/// once every handle has been dropped.
///
/// # Example
///
/// ```ignore
/// use tinyquic::client::{QuicClient, QuicClientBuilder};
///
/// let config = QuicClientBuilder::new().build();
/// let (client, mut events) = QuicClient::connect(config).await?;
///
/// // Feed events.packets to the network, and received packets to
/// // client.deliver(), while the handshake runs.
/// client.handshake().await?;
/// client.send_stream(0, 0, true, b"hello".to_vec()).await?;
/// ```
#[derive(Debug, Clone)]
pub struct QuicClient {
    commands: mpsc::Sender<Command>,
    phase: watch::Receiver<ConnectionPhase>,
    config: ClientConfig,
}

impl QuicClient {
    /// Validate `config` and spawn the connection task.
    ///
    /// Nothing is sent until [`handshake`](Self::handshake) is called.
    pub async fn connect(config: ClientConfig) -> Result<(Self, ClientEvents), QuicError> {
        config.validate()?;

        let (connection, packets, streams) =
            ClientConnection::with_channels(config.source_connection_id_len);
        let machine = ClientStateMachine::new(connection, config.clone());
        let (command_tx, command_rx) = mpsc::channel(config.command_buffer);
        let (phase_tx, phase_rx) = watch::channel(machine.phase());

        tokio::spawn(run(machine, command_rx, phase_tx));

        let client = Self {
            commands: command_tx,
            phase: phase_rx,
            config,
        };
        Ok((client, ClientEvents { packets, streams }))
    }

    /// Run the handshake to completion.
    ///
    /// Fails with [`ClientError::Timeout`] if the connection is not ready
    /// within the configured handshake timeout. The connection stays open
    /// in that case; call [`close`](Self::close) to abandon it.
    pub async fn handshake(&self) -> Result<(), ClientError> {
        let waiter = self.request(Command::Handshake).await?;
        match tokio::time::timeout(self.config.handshake_timeout, waiter).await {
            Ok(Ok(result)) => Ok(result?),
            Ok(Err(_)) => Err(ClientError::HandshakeCancelled),
            Err(_) => Err(ClientError::Timeout),
        }
    }

    /// Hand a received packet to the connection.
    pub async fn deliver(&self, packet: Packet) -> Result<(), ClientError> {
        self.request(|reply| Command::Deliver(packet, reply)).await
    }

    /// Send stream data. Requires a completed handshake.
    pub async fn send_stream(
        &self,
        stream_id: u64,
        offset: u64,
        fin: bool,
        data: Vec<u8>,
    ) -> Result<PacketNumber, ClientError> {
        self.request(|reply| Command::SendStream {
            stream_id,
            offset,
            fin,
            data,
            reply,
        })
        .await
    }

    /// Abruptly terminate one of our streams.
    pub async fn reset_stream(
        &self,
        stream_id: u64,
        error_code: u64,
        final_offset: u64,
    ) -> Result<PacketNumber, ClientError> {
        self.request(|reply| Command::ResetStream {
            stream_id,
            error_code,
            final_offset,
            reply,
        })
        .await
    }

    /// Send a Ping.
    pub async fn ping(&self) -> Result<PacketNumber, ClientError> {
        self.request(Command::Ping).await
    }

    /// Acknowledge everything received so far.
    pub async fn flush_acks(&self) -> Result<(), ClientError> {
        self.request(Command::FlushAcks).await
    }

    /// Close the connection. Closing twice is a no-op.
    pub async fn close(&self) -> Result<(), ClientError> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(Command::Close(tx))
            .await
            .map_err(|_| ClientError::Disconnected)?;
        rx.await.map_err(|_| ClientError::Disconnected)
    }

    /// Current connection phase.
    pub fn phase(&self) -> ConnectionPhase {
        *self.phase.borrow()
    }

    /// Wait until the connection reaches `target` (or closes).
    pub async fn wait_for(&self, target: ConnectionPhase) -> ConnectionPhase {
        let mut phase = self.phase.clone();
        match phase
            .wait_for(|p| *p == target || *p == ConnectionPhase::Closed)
            .await
        {
            Ok(p) => *p,
            Err(_) => ConnectionPhase::Closed,
        }
    }

    /// Client configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(Reply<T>) -> Command,
    ) -> Result<T, ClientError> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(command(tx))
            .await
            .map_err(|_| ClientError::Disconnected)?;
        Ok(rx.await.map_err(|_| ClientError::Disconnected)??)
    }
}

/// Connection task: applies commands one at a time.
async fn run(
    mut machine: ClientStateMachine<ClientConnection>,
    mut commands: mpsc::Receiver<Command>,
    phase: watch::Sender<ConnectionPhase>,
) {
    while let Some(command) = commands.recv().await {
        match command {
            Command::Handshake(reply) => {
                let result = machine.handshake();
                respond(&phase, &machine, reply, result);
            }
            Command::Deliver(packet, reply) => {
                let result = machine.process_packet(packet);
                respond(&phase, &machine, reply, result);
            }
            Command::SendStream {
                stream_id,
                offset,
                fin,
                data,
                reply,
            } => {
                let result = machine.send_stream(stream_id, offset, fin, data);
                respond(&phase, &machine, reply, result);
            }
            Command::ResetStream {
                stream_id,
                error_code,
                final_offset,
                reply,
            } => {
                let result = machine.reset_stream(stream_id, error_code, final_offset);
                respond(&phase, &machine, reply, result);
            }
            Command::Ping(reply) => {
                let result = machine.ping();
                respond(&phase, &machine, reply, result);
            }
            Command::FlushAcks(reply) => {
                let result = machine.flush_acks();
                respond(&phase, &machine, reply, result);
            }
            Command::Close(reply) => {
                machine.close();
                respond(&phase, &machine, reply, ());
            }
        }
    }

    debug!(phase = %machine.phase(), "all client handles dropped");
    machine.close();
    phase.send_replace(machine.phase());
}

/// Publish the phase, then answer the caller.
fn respond<T>(
    phase: &watch::Sender<ConnectionPhase>,
    machine: &ClientStateMachine<ClientConnection>,
    reply: oneshot::Sender<T>,
    value: T,
) {
    phase.send_replace(machine.phase());
    // The caller may have stopped waiting.
    let _ = reply.send(value);
}
