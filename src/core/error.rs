//! Error types for the tinyquic client engine.

use thiserror::Error;

use crate::transport::TransportError;

/// Errors raised while decoding wire values.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Packet-number varint carried the reserved `01` length tag.
    #[error("invalid packet number length tag in byte {0:#04x}")]
    InvalidTag(u8),

    /// Unexpected end of data.
    #[error("unexpected end of data: need {need} bytes, have {have}")]
    UnexpectedEof {
        /// Bytes required by the encoding.
        need: usize,
        /// Bytes available.
        have: usize,
    },

    /// Value does not fit the encoding.
    #[error("value {0} exceeds the encodable range")]
    ValueTooLarge(u64),

    /// Connection ID longer than the protocol allows.
    #[error("connection ID length {0} exceeds maximum of 20")]
    InvalidConnectionIdLength(usize),
}

/// Errors in the TLS handshake and packet-protection layer.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TlsError {
    /// Operation called out of order.
    #[error("invalid handshake state: {0}")]
    InvalidState(&'static str),

    /// Server negotiated a version other than TLS 1.3.
    #[error("unsupported negotiated version {0:#06x}")]
    UnsupportedVersion(u16),

    /// Server selected a group we did not offer.
    #[error("unsupported key exchange group {0:#06x}")]
    UnsupportedGroup(u16),

    /// A required extension is absent.
    #[error("missing extension {0}")]
    MissingExtension(&'static str),

    /// Handshake message could not be parsed.
    #[error("malformed handshake message: {0}")]
    Malformed(&'static str),

    /// Handshake message type not valid at this point.
    #[error("unexpected handshake message type {0}")]
    UnexpectedMessage(u8),

    /// Finished verify data did not match the transcript.
    #[error("finished verification failed")]
    FinishedVerification,

    /// Key exchange produced a non-contributory shared secret.
    #[error("key exchange failed")]
    KeyExchange,

    /// HKDF or HMAC rejected its inputs.
    #[error("key derivation failed")]
    KeyDerivation,

    /// AEAD encryption failed.
    #[error("AEAD seal failed")]
    Seal,

    /// AEAD decryption failed (invalid tag or corrupted).
    #[error("AEAD open failed (invalid tag or corrupted)")]
    Open,
}

impl TlsError {
    /// Transport error code sent in the ConnectionClose that follows this failure.
    pub fn close_code(&self) -> u64 {
        match self {
            TlsError::FinishedVerification => {
                crate::core::CRYPTO_ERROR + crate::core::TLS_ALERT_DECRYPT_ERROR
            }
            TlsError::KeyDerivation | TlsError::Seal | TlsError::Open => {
                crate::core::INTERNAL_ERROR
            }
            _ => crate::core::PROTOCOL_VIOLATION,
        }
    }
}

/// Errors raised by the client connection state machine.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConnectionError {
    /// Operation not permitted in the current phase.
    #[error("operation not permitted in phase {0}")]
    InvalidState(&'static str),

    /// Handshake failure.
    #[error("tls error: {0}")]
    Tls(#[from] TlsError),

    /// Transport failure.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Peer does not support our version.
    #[error("version negotiation failed: peer offered {0:?}")]
    VersionNegotiation(Vec<u32>),

    /// Peer closed the connection.
    #[error("connection closed by peer (code {error_code:#x}): {reason}")]
    ClosedByPeer {
        /// Peer-supplied error code.
        error_code: u64,
        /// Peer-supplied reason phrase.
        reason: String,
    },

    /// Connection closed locally.
    #[error("connection closed")]
    Closed,
}

/// Top-level tinyquic errors.
#[derive(Debug, Error)]
pub enum QuicError {
    /// Decode error.
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    /// TLS error.
    #[error("tls error: {0}")]
    Tls(#[from] TlsError),

    /// Transport error.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Connection error.
    #[error("connection error: {0}")]
    Connection(#[from] ConnectionError),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_close_codes() {
        assert_eq!(
            TlsError::UnsupportedVersion(0x0303).close_code(),
            crate::core::PROTOCOL_VIOLATION
        );
        assert_eq!(TlsError::FinishedVerification.close_code(), 0x133);
        assert_eq!(TlsError::Open.close_code(), crate::core::INTERNAL_ERROR);
    }

    #[test]
    fn test_connection_error_from_tls() {
        let err: ConnectionError = TlsError::InvalidState("not started").into();
        assert!(matches!(err, ConnectionError::Tls(TlsError::InvalidState(_))));
        assert_eq!(
            err.to_string(),
            "tls error: invalid handshake state: not started"
        );
    }
}
