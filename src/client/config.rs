//! Client configuration.

use std::time::Duration;

use crate::core::{
    DEFAULT_ACK_QUEUE_CAPACITY, DEFAULT_CONNECTION_ID_LEN, MAX_CONNECTION_ID_LEN,
    MIN_INITIAL_DATAGRAM_SIZE, QuicError,
};
use crate::transport::Version;

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Packet version placed in long headers.
    pub version: Version,

    /// Initial datagrams are padded to at least this size.
    pub min_initial_datagram_size: usize,

    /// Received packet numbers buffered before an ack is forced.
    pub ack_queue_capacity: usize,

    /// Length of our own connection ID.
    pub source_connection_id_len: usize,

    /// Depth of the client actor's command queue.
    pub command_buffer: usize,

    /// How long [`QuicClient::handshake`](super::QuicClient::handshake) waits.
    pub handshake_timeout: Duration,
}

impl ClientConfig {
    /// Check the configuration for values the protocol cannot work with.
    pub fn validate(&self) -> Result<(), QuicError> {
        if self.min_initial_datagram_size < MIN_INITIAL_DATAGRAM_SIZE {
            return Err(QuicError::Config(format!(
                "min_initial_datagram_size {} is below {}",
                self.min_initial_datagram_size, MIN_INITIAL_DATAGRAM_SIZE
            )));
        }
        if self.source_connection_id_len > MAX_CONNECTION_ID_LEN {
            return Err(QuicError::Config(format!(
                "source_connection_id_len {} exceeds {}",
                self.source_connection_id_len, MAX_CONNECTION_ID_LEN
            )));
        }
        if self.ack_queue_capacity == 0 {
            return Err(QuicError::Config("ack_queue_capacity must be positive".into()));
        }
        if self.command_buffer == 0 {
            return Err(QuicError::Config("command_buffer must be positive".into()));
        }
        Ok(())
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            version: Version::CURRENT,
            min_initial_datagram_size: MIN_INITIAL_DATAGRAM_SIZE,
            ack_queue_capacity: DEFAULT_ACK_QUEUE_CAPACITY,
            source_connection_id_len: DEFAULT_CONNECTION_ID_LEN,
            command_buffer: 64,
            handshake_timeout: Duration::from_secs(10),
        }
    }
}

/// Builder for creating a [`ClientConfig`].
#[derive(Debug)]
pub struct QuicClientBuilder {
    config: ClientConfig,
}

impl QuicClientBuilder {
    /// Create a new client builder.
    pub fn new() -> Self {
        Self {
            config: ClientConfig::default(),
        }
    }

    /// Set the packet version.
    pub fn version(mut self, version: Version) -> Self {
        self.config.version = version;
        self
    }

    /// Set the minimum Initial datagram size.
    pub fn min_initial_datagram_size(mut self, size: usize) -> Self {
        self.config.min_initial_datagram_size = size;
        self
    }

    /// Set the ack queue capacity.
    pub fn ack_queue_capacity(mut self, capacity: usize) -> Self {
        self.config.ack_queue_capacity = capacity;
        self
    }

    /// Set the length of our connection ID.
    pub fn source_connection_id_len(mut self, len: usize) -> Self {
        self.config.source_connection_id_len = len;
        self
    }

    /// Set the actor command queue depth.
    pub fn command_buffer(mut self, depth: usize) -> Self {
        self.config.command_buffer = depth;
        self
    }

    /// Set the handshake timeout.
    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.config.handshake_timeout = timeout;
        self
    }

    /// Build the client configuration.
    pub fn build(self) -> ClientConfig {
        self.config
    }
}

impl Default for QuicClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}
