//! Client-side TLS 1.3 handshake session
//!
//! [`ClientTlsSession`] drives the client half of a one-round-trip
//! handshake and hands back packet protection for each level:
//!
//! ```text
//! start()                 -> ClientHello bytes
//! handle_server_hello()   -> Handshake AeadContext
//! handle_handshake()*     -> None until the server flight is complete,
//!                            then client Finished + 1-RTT AeadContext
//! ```
//!
//! Server handshake bytes may arrive fragmented. They accumulate in a buffer
//! that is only drained once a full flight has been verified, so partial
//! input never disturbs the transcript.

use tracing::{debug, trace};

use crate::core::{HASH_SIZE, TLS_CHACHA20_POLY1305_SHA256, TLS13_VERSION, TlsError};

use super::{
    aead::{AeadContext, Role},
    keys::{Group, KeyExchange, hello_random},
    messages::{ClientHello, Finished, ServerHello, parse_server_flight},
    schedule::{
        LABEL_CLIENT_HANDSHAKE, LABEL_SERVER_HANDSHAKE, Secret, derive_secret,
        finished_verify_data, handshake_secret, transcript_hash, verify_finished,
    },
};

/// Output of a completed handshake.
#[derive(Debug)]
pub struct HandshakeResult {
    /// Client Finished message to send at the Handshake level.
    pub finished: Vec<u8>,
    /// 1-RTT packet protection.
    pub one_rtt_aead: AeadContext,
}

/// Client half of the TLS 1.3 handshake.
#[derive(Debug)]
pub struct ClientTlsSession {
    /// Ephemeral key pair; regenerated on reset.
    key_exchange: KeyExchange,
    /// Server handshake bytes not yet consumed.
    handshake_buffer: Vec<u8>,
    /// Our ClientHello, once started.
    client_hello: Option<Vec<u8>>,
    /// The server's ServerHello, once received.
    server_hello: Option<Vec<u8>>,
    /// Handshake secret, once the key exchange is done.
    handshake_secret: Option<Secret>,
    /// Set after the client Finished is produced.
    complete: bool,
}

impl ClientTlsSession {
    /// Create a session with a fresh X25519 key pair.
    pub fn new() -> Self {
        Self {
            key_exchange: KeyExchange::generate(Group::X25519),
            handshake_buffer: Vec::new(),
            client_hello: None,
            server_hello: None,
            handshake_secret: None,
            complete: false,
        }
    }

    /// Build the ClientHello.
    ///
    /// Fails if the session was already started.
    pub fn start(&mut self) -> Result<Vec<u8>, TlsError> {
        if self.client_hello.is_some() {
            return Err(TlsError::InvalidState("session already started"));
        }

        let hello = ClientHello::new(
            hello_random(),
            self.key_exchange.group(),
            self.key_exchange.public_key(),
        )
        .to_bytes();
        trace!(len = hello.len(), "client hello built");
        self.client_hello = Some(hello.clone());
        Ok(hello)
    }

    /// Process the ServerHello and derive Handshake-level protection.
    pub fn handle_server_hello(&mut self, bytes: &[u8]) -> Result<AeadContext, TlsError> {
        let client_hello = self
            .client_hello
            .as_deref()
            .ok_or(TlsError::InvalidState("server hello before start"))?;
        if self.server_hello.is_some() {
            return Err(TlsError::InvalidState("server hello already processed"));
        }

        let hello = ServerHello::parse(bytes)?;
        match hello.supported_version {
            Some(TLS13_VERSION) => {}
            Some(other) => return Err(TlsError::UnsupportedVersion(other)),
            None => return Err(TlsError::MissingExtension("supported_versions")),
        }
        if hello.cipher_suite != TLS_CHACHA20_POLY1305_SHA256 {
            return Err(TlsError::Malformed("cipher suite not offered"));
        }
        let (group, peer_key) = hello
            .key_share
            .as_ref()
            .ok_or(TlsError::MissingExtension("key_share"))?;
        if *group != self.key_exchange.group().code() {
            return Err(TlsError::UnsupportedGroup(*group));
        }

        let shared = self.key_exchange.shared_secret(peer_key)?;
        let secret = handshake_secret(&shared)?;
        let hello_hash = transcript_hash(&[client_hello, bytes]);
        let aead = AeadContext::handshake(&secret, &hello_hash, Role::Client)?;

        debug!("server hello accepted, handshake keys derived");
        self.server_hello = Some(bytes.to_vec());
        self.handshake_secret = Some(secret);
        Ok(aead)
    }

    /// Feed server handshake bytes.
    ///
    /// Returns `Ok(None)` while the server flight is incomplete. Once the
    /// flight (ending in a valid server Finished) is buffered, returns the
    /// client Finished and 1-RTT protection. Bytes after the server Finished
    /// stay buffered. On error the buffer is left as it was before the call.
    pub fn handle_handshake(&mut self, bytes: &[u8]) -> Result<Option<HandshakeResult>, TlsError> {
        let (Some(client_hello), Some(server_hello), Some(secret)) = (
            self.client_hello.as_deref(),
            self.server_hello.as_deref(),
            self.handshake_secret.as_ref(),
        ) else {
            return Err(TlsError::InvalidState("handshake data before server hello"));
        };
        if self.complete {
            return Err(TlsError::InvalidState("handshake already complete"));
        }

        let mark = self.handshake_buffer.len();
        self.handshake_buffer.extend_from_slice(bytes);

        let flight = match parse_server_flight(&self.handshake_buffer) {
            Ok(Some(flight)) => flight,
            Ok(None) => {
                debug!(
                    buffered = self.handshake_buffer.len(),
                    "server flight incomplete"
                );
                return Ok(None);
            }
            Err(e) => {
                self.handshake_buffer.truncate(mark);
                return Err(e);
            }
        };

        let result = complete_handshake(
            secret,
            client_hello,
            server_hello,
            &self.handshake_buffer,
            flight.finished_at,
            flight.consumed,
            &flight.verify_data,
        );
        let result = match result {
            Ok(result) => result,
            Err(e) => {
                self.handshake_buffer.truncate(mark);
                return Err(e);
            }
        };

        self.handshake_buffer.drain(..flight.consumed);
        self.complete = true;
        debug!(
            leftover = self.handshake_buffer.len(),
            "server finished verified, 1-RTT keys derived"
        );
        Ok(Some(result))
    }

    /// Discard all handshake state and generate a new key pair.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Check whether [`start`](Self::start) has been called.
    pub fn is_started(&self) -> bool {
        self.client_hello.is_some()
    }

    /// Check whether the handshake has completed.
    pub fn is_complete(&self) -> bool {
        self.complete
    }

    /// Our ephemeral public key.
    pub fn public_key(&self) -> &[u8] {
        self.key_exchange.public_key()
    }

    /// Number of server handshake bytes buffered but not consumed.
    pub fn buffered_len(&self) -> usize {
        self.handshake_buffer.len()
    }
}

impl Default for ClientTlsSession {
    fn default() -> Self {
        Self::new()
    }
}

/// Verify the server Finished and derive everything the client sends back.
fn complete_handshake(
    secret: &Secret,
    client_hello: &[u8],
    server_hello: &[u8],
    buffer: &[u8],
    finished_at: usize,
    consumed: usize,
    server_verify_data: &[u8; HASH_SIZE],
) -> Result<HandshakeResult, TlsError> {
    let hello_hash = transcript_hash(&[client_hello, server_hello]);

    let server_traffic = derive_secret(secret, LABEL_SERVER_HANDSHAKE, &hello_hash)?;
    let before_finished = transcript_hash(&[client_hello, server_hello, &buffer[..finished_at]]);
    verify_finished(&server_traffic, &before_finished, server_verify_data)?;

    let handshake_hash = transcript_hash(&[client_hello, server_hello, &buffer[..consumed]]);
    let one_rtt_aead = AeadContext::one_rtt(secret, &handshake_hash, Role::Client)?;

    let client_traffic = derive_secret(secret, LABEL_CLIENT_HANDSHAKE, &hello_hash)?;
    let verify_data = finished_verify_data(&client_traffic, &handshake_hash)?;

    Ok(HandshakeResult {
        finished: Finished { verify_data }.to_bytes(),
        one_rtt_aead,
    })
}
