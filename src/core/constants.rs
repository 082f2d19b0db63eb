//! Protocol constants.
//!
//! These values are fixed by the wire protocol and MUST NOT be changed.

// =============================================================================
// PACKET NUMBERS
// =============================================================================

/// Largest value the packet-number varint can carry (30 bits in the 4-byte form).
pub const MAX_PACKET_NUMBER: u64 = 0x3FFF_FFFF;

/// Largest value carried by the 1-byte packet-number form.
pub const PN_ONE_BYTE_MAX: u64 = 63;

/// Largest value carried by the 2-byte packet-number form.
pub const PN_TWO_BYTE_MAX: u64 = 16383;

/// Length tag of the 1-byte form (`00`).
pub const PN_TAG_ONE_BYTE: u8 = 0b0000_0000;

/// Length tag of the 2-byte form (`10`).
pub const PN_TAG_TWO_BYTES: u8 = 0b1000_0000;

/// Length tag of the 4-byte form (`11`).
pub const PN_TAG_FOUR_BYTES: u8 = 0b1100_0000;

/// Mask selecting the length tag bits of the first byte.
pub const PN_TAG_MASK: u8 = 0b1100_0000;

// =============================================================================
// PACKETS AND CONNECTION IDS
// =============================================================================

/// The single QUIC packet version this client speaks.
pub const QUIC_VERSION: u32 = 0xff00_0011;

/// Maximum connection ID length.
pub const MAX_CONNECTION_ID_LEN: usize = 20;

/// Default length of locally generated connection IDs.
pub const DEFAULT_CONNECTION_ID_LEN: usize = 8;

/// Client Initial datagrams are padded to at least this many bytes.
pub const MIN_INITIAL_DATAGRAM_SIZE: usize = 1200;

/// Default capacity of the received-packet-number ack queue.
pub const DEFAULT_ACK_QUEUE_CAPACITY: usize = 1000;

/// Ack delay advertised in locally generated Ack frames.
pub const DEFAULT_ACK_DELAY: u64 = 123;

// =============================================================================
// TRANSPORT ERROR CODES
// =============================================================================

/// Graceful close.
pub const NO_ERROR: u64 = 0x00;

/// Generic internal failure.
pub const INTERNAL_ERROR: u64 = 0x01;

/// Peer violated the protocol.
pub const PROTOCOL_VIOLATION: u64 = 0x0a;

/// Base of the TLS alert error-code space.
pub const CRYPTO_ERROR: u64 = 0x100;

/// TLS `decrypt_error` alert (Finished verification failure).
pub const TLS_ALERT_DECRYPT_ERROR: u64 = 51;

// =============================================================================
// TLS 1.3
// =============================================================================

/// TLS 1.3 `supported_versions` value.
pub const TLS13_VERSION: u16 = 0x0304;

/// Legacy record/hello version carried in hellos.
pub const TLS_LEGACY_VERSION: u16 = 0x0303;

/// TLS_CHACHA20_POLY1305_SHA256.
pub const TLS_CHACHA20_POLY1305_SHA256: u16 = 0x1303;

/// X25519 named group.
pub const GROUP_X25519: u16 = 0x001d;

/// Hello random size.
pub const HELLO_RANDOM_SIZE: usize = 32;

/// SHA-256 output size.
pub const HASH_SIZE: usize = 32;

/// X25519 public key size.
pub const PUBLIC_KEY_SIZE: usize = 32;

/// ChaCha20-Poly1305 key size.
pub const AEAD_KEY_SIZE: usize = 32;

/// ChaCha20-Poly1305 nonce size.
pub const AEAD_IV_SIZE: usize = 12;

/// Poly1305 authentication tag size.
pub const AEAD_TAG_SIZE: usize = 16;

/// QUIC initial salt used to derive Initial-level keys.
pub const INITIAL_SALT: [u8; 20] = [
    0x38, 0x76, 0x2c, 0xf7, 0xf5, 0x59, 0x34, 0xb3, 0x4d, 0x17, 0x9a, 0xe6, 0xa4, 0xc8, 0x0c, 0xad,
    0xcc, 0xbb, 0x7f, 0x0a,
];
