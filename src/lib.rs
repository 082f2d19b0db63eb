//! # Tinyquic
//!
//! Client-side connection engine for a minimal QUIC-like transport.
//!
//! Tinyquic drives a client connection from the first Initial packet to an
//! established session. It provides:
//!
//! - **Packet numbers**: 1, 2 or 4 byte self-describing varint encoding
//! - **Handshake**: a TLS 1.3 client over X25519, HKDF-SHA256 and
//!   ChaCha20-Poly1305, with Retry and version negotiation
//! - **Dispatch**: a phase-driven state machine routing packets to the
//!   handshake or to application streams
//! - **Reliability**: a sent-packet buffer that batches acknowledgments
//!
//! Sockets, packet protection on the wire and stream reassembly are left to
//! the embedding application, behind the [`core::Connection`] and
//! [`core::Stream`] traits.
//!
//! ## Feature Flags
//!
//! - `crypto` (default): TLS 1.3 session, key schedule and packet AEAD
//! - `client` (default): Client state machine and async [`client::QuicClient`]
//!
//! ## Modules
//!
//! - [`core`]: Core traits, constants, and error types (always included)
//! - [`transport`]: Packet numbers, frames, packets, ack tracking (always included)
//! - [`crypto`]: Security layer (requires `crypto` feature)
//! - [`client`]: Client engine (requires `client` feature)
//!
//! ## Example Usage
//!
//! ```rust
//! use tinyquic::prelude::*;
//!
//! let pn = PacketNumber::new(300).unwrap();
//! let bytes = pn.encode();
//! assert_eq!(bytes, [0x81, 0x2c]);
//!
//! let (decoded, used) = PacketNumber::decode(&bytes).unwrap();
//! assert_eq!((decoded, used), (pn, 2));
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

// Core module (always included)
pub mod core;

// Transport layer (always included)
pub mod transport;

// Crypto layer (feature-gated)
#[cfg(feature = "crypto")]
#[cfg_attr(docsrs, doc(cfg(feature = "crypto")))]
pub mod crypto;

// Client API (feature-gated)
#[cfg(feature = "client")]
#[cfg_attr(docsrs, doc(cfg(feature = "client")))]
pub mod client;

/// Prelude module for convenient imports.
pub mod prelude {
    // Core traits and types
    pub use crate::core::*;

    // Transport types
    pub use crate::transport::{
        AckRange, ConnectionId, Frame, FrameType, Packet, PacketBuffer, PacketNumber,
        TransportError, Version,
    };

    // Crypto types (when enabled)
    #[cfg(feature = "crypto")]
    pub use crate::crypto::{AeadContext, ClientTlsSession, EncryptionLevel, Role};

    // Client types (when enabled)
    #[cfg(feature = "client")]
    pub use crate::client::{
        ClientConfig, ClientConnection, ClientError, ClientStateMachine, ConnectionPhase,
        QuicClient, QuicClientBuilder, StreamEvent,
    };
}

// Re-export commonly used items at crate root
pub use core::{ConnectionError, DecodeError, QuicError, TlsError};

pub use transport::{Frame, Packet, PacketNumber};

#[cfg(feature = "client")]
pub use client::{ClientStateMachine, QuicClient};
