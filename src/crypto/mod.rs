//! Security layer
//!
//! Implements the client side of the TLS 1.3 handshake and QUIC-style
//! packet protection:
//! - X25519 key exchange ([`KeyExchange`])
//! - TLS 1.3 key schedule over HKDF-SHA256 ([`schedule`])
//! - Handshake message codec ([`messages`])
//! - Per-level ChaCha20-Poly1305 packet protection ([`AeadContext`])
//! - The handshake session driving all of the above ([`ClientTlsSession`])

mod aead;
mod keys;
pub mod messages;
pub mod schedule;
mod session;

pub use aead::{AeadContext, EncryptionLevel, PacketKey, Role};
pub use keys::{Group, KeyExchange, hello_random};
pub use schedule::Secret;
pub use session::{ClientTlsSession, HandshakeResult};
