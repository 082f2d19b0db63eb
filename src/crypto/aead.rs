//! Packet protection contexts
//!
//! Each encryption level (Initial, Handshake, 1-RTT) gets its own
//! [`AeadContext`] holding a sealing key for our direction and an opening
//! key for the peer's. Contexts are never shared across levels.
//!
//! Packet keys are expanded from a traffic secret:
//! - key: `HKDF-Expand-Label(secret, "quic key", "", 32)`
//! - iv: `HKDF-Expand-Label(secret, "quic iv", "", 12)`
//! - nonce: `iv XOR packet_number` (big-endian, right-aligned)
//!
//! The cipher is ChaCha20-Poly1305.

use chacha20poly1305::{
    ChaCha20Poly1305, Nonce,
    aead::{Aead, KeyInit, Payload},
};
use zeroize::Zeroize;

use crate::core::{AEAD_IV_SIZE, AEAD_KEY_SIZE, AEAD_TAG_SIZE, HASH_SIZE, TlsError};
use crate::transport::{ConnectionId, PacketNumber};

use super::schedule::{
    LABEL_CLIENT_APPLICATION, LABEL_CLIENT_HANDSHAKE, LABEL_SERVER_APPLICATION,
    LABEL_SERVER_HANDSHAKE, Secret, derive_secret, expand_label, initial_secrets, master_secret,
};

const LABEL_QUIC_KEY: &str = "quic key";
const LABEL_QUIC_IV: &str = "quic iv";

/// Encryption level a context protects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EncryptionLevel {
    /// Initial packets.
    Initial,
    /// Handshake packets.
    Handshake,
    /// Short-header application packets.
    OneRtt,
}

/// Which side of the connection we are.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Connection initiator.
    Client,
    /// Connection responder.
    Server,
}

/// Key and IV for one direction.
///
/// Zeroized on drop.
#[derive(Clone)]
pub struct PacketKey {
    key: [u8; AEAD_KEY_SIZE],
    iv: [u8; AEAD_IV_SIZE],
}

impl PacketKey {
    /// Expand packet keys from a traffic secret.
    pub fn from_secret(secret: &Secret) -> Result<Self, TlsError> {
        let mut key = [0u8; AEAD_KEY_SIZE];
        let mut iv = [0u8; AEAD_IV_SIZE];
        expand_label(secret, LABEL_QUIC_KEY, &[], &mut key)?;
        expand_label(secret, LABEL_QUIC_IV, &[], &mut iv)?;
        Ok(Self { key, iv })
    }

    /// Per-packet nonce.
    fn nonce(&self, packet_number: PacketNumber) -> [u8; AEAD_IV_SIZE] {
        let mut nonce = self.iv;
        let pn = packet_number.as_u64().to_be_bytes();
        for (n, p) in nonce[AEAD_IV_SIZE - pn.len()..].iter_mut().zip(pn) {
            *n ^= p;
        }
        nonce
    }

    fn seal(
        &self,
        packet_number: PacketNumber,
        aad: &[u8],
        plaintext: &[u8],
    ) -> Result<Vec<u8>, TlsError> {
        let cipher = ChaCha20Poly1305::new((&self.key).into());
        let nonce = self.nonce(packet_number);
        cipher
            .encrypt(Nonce::from_slice(&nonce), Payload { msg: plaintext, aad })
            .map_err(|_| TlsError::Seal)
    }

    fn open(
        &self,
        packet_number: PacketNumber,
        aad: &[u8],
        ciphertext: &[u8],
    ) -> Result<Vec<u8>, TlsError> {
        if ciphertext.len() < AEAD_TAG_SIZE {
            return Err(TlsError::Open);
        }
        let cipher = ChaCha20Poly1305::new((&self.key).into());
        let nonce = self.nonce(packet_number);
        cipher
            .decrypt(Nonce::from_slice(&nonce), Payload { msg: ciphertext, aad })
            .map_err(|_| TlsError::Open)
    }
}

impl Drop for PacketKey {
    fn drop(&mut self) {
        self.key.zeroize();
        self.iv.zeroize();
    }
}

/// Packet protection for one encryption level.
#[derive(Clone)]
pub struct AeadContext {
    level: EncryptionLevel,
    seal: PacketKey,
    open: PacketKey,
}

impl AeadContext {
    /// Build a context from the client and server traffic secrets of a level.
    pub fn from_secrets(
        level: EncryptionLevel,
        client_secret: &Secret,
        server_secret: &Secret,
        role: Role,
    ) -> Result<Self, TlsError> {
        let client = PacketKey::from_secret(client_secret)?;
        let server = PacketKey::from_secret(server_secret)?;
        let (seal, open) = match role {
            Role::Client => (client, server),
            Role::Server => (server, client),
        };
        Ok(Self { level, seal, open })
    }

    /// Initial-level keys, derived from the client's first destination ID.
    pub fn initial(destination: &ConnectionId, role: Role) -> Result<Self, TlsError> {
        let (client, server) = initial_secrets(destination.as_bytes())?;
        Self::from_secrets(EncryptionLevel::Initial, &client, &server, role)
    }

    /// Handshake-level keys from the handshake secret and `H(CH || SH)`.
    pub fn handshake(
        handshake_secret: &Secret,
        hello_hash: &[u8; HASH_SIZE],
        role: Role,
    ) -> Result<Self, TlsError> {
        let client = derive_secret(handshake_secret, LABEL_CLIENT_HANDSHAKE, hello_hash)?;
        let server = derive_secret(handshake_secret, LABEL_SERVER_HANDSHAKE, hello_hash)?;
        Self::from_secrets(EncryptionLevel::Handshake, &client, &server, role)
    }

    /// 1-RTT keys from the handshake secret and the transcript hash through
    /// the server Finished.
    pub fn one_rtt(
        handshake_secret: &Secret,
        handshake_hash: &[u8; HASH_SIZE],
        role: Role,
    ) -> Result<Self, TlsError> {
        let master = master_secret(handshake_secret)?;
        let client = derive_secret(&master, LABEL_CLIENT_APPLICATION, handshake_hash)?;
        let server = derive_secret(&master, LABEL_SERVER_APPLICATION, handshake_hash)?;
        Self::from_secrets(EncryptionLevel::OneRtt, &client, &server, role)
    }

    /// Level this context protects.
    pub fn level(&self) -> EncryptionLevel {
        self.level
    }

    /// Encrypt an outgoing payload; the tag is appended.
    pub fn seal(
        &self,
        packet_number: PacketNumber,
        aad: &[u8],
        plaintext: &[u8],
    ) -> Result<Vec<u8>, TlsError> {
        self.seal.seal(packet_number, aad, plaintext)
    }

    /// Decrypt an incoming payload.
    pub fn open(
        &self,
        packet_number: PacketNumber,
        aad: &[u8],
        ciphertext: &[u8],
    ) -> Result<Vec<u8>, TlsError> {
        self.open.open(packet_number, aad, ciphertext)
    }
}

impl std::fmt::Debug for AeadContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AeadContext")
            .field("level", &self.level)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pn(value: u64) -> PacketNumber {
        PacketNumber::new(value).unwrap()
    }

    fn pair(level: EncryptionLevel) -> (AeadContext, AeadContext) {
        let client = Secret::from_bytes([1u8; 32]);
        let server = Secret::from_bytes([2u8; 32]);
        (
            AeadContext::from_secrets(level, &client, &server, Role::Client).unwrap(),
            AeadContext::from_secrets(level, &client, &server, Role::Server).unwrap(),
        )
    }

    #[test]
    fn test_client_to_server() {
        let (client, server) = pair(EncryptionLevel::OneRtt);
        let sealed = client.seal(pn(5), b"header", b"hello").unwrap();
        assert_eq!(sealed.len(), 5 + AEAD_TAG_SIZE);
        assert_eq!(server.open(pn(5), b"header", &sealed).unwrap(), b"hello");
    }

    #[test]
    fn test_directions_use_different_keys() {
        let (client, _) = pair(EncryptionLevel::Handshake);
        let sealed = client.seal(pn(1), b"", b"data").unwrap();
        // Our own opening key is the peer's sealing key.
        assert_eq!(client.open(pn(1), b"", &sealed), Err(TlsError::Open));
    }

    #[test]
    fn test_open_rejects_wrong_inputs() {
        let (client, server) = pair(EncryptionLevel::OneRtt);
        let sealed = client.seal(pn(9), b"aad", b"payload").unwrap();

        assert_eq!(server.open(pn(10), b"aad", &sealed), Err(TlsError::Open));
        assert_eq!(server.open(pn(9), b"bad", &sealed), Err(TlsError::Open));
        assert_eq!(server.open(pn(9), b"aad", &[0u8; 4]), Err(TlsError::Open));
    }

    #[test]
    fn test_nonce_varies_with_packet_number() {
        let (client, _) = pair(EncryptionLevel::OneRtt);
        let a = client.seal(pn(1), b"", b"same").unwrap();
        let b = client.seal(pn(2), b"", b"same").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_initial_keys_agree() {
        let dcid = ConnectionId::new(vec![0x83, 0x94, 0xc8, 0xf0]).unwrap();
        let client = AeadContext::initial(&dcid, Role::Client).unwrap();
        let server = AeadContext::initial(&dcid, Role::Server).unwrap();
        assert_eq!(client.level(), EncryptionLevel::Initial);

        let sealed = client.seal(pn(0), b"", b"client hello").unwrap();
        assert_eq!(server.open(pn(0), b"", &sealed).unwrap(), b"client hello");

        let other = ConnectionId::new(vec![1, 2, 3, 4]).unwrap();
        let wrong = AeadContext::initial(&other, Role::Server).unwrap();
        assert_eq!(wrong.open(pn(0), b"", &sealed), Err(TlsError::Open));
    }

    #[test]
    fn test_levels_are_separate() {
        let secret = Secret::from_bytes([3u8; 32]);
        let hash = [4u8; 32];
        let handshake = AeadContext::handshake(&secret, &hash, Role::Client).unwrap();
        let one_rtt = AeadContext::one_rtt(&secret, &hash, Role::Server).unwrap();
        assert_eq!(handshake.level(), EncryptionLevel::Handshake);
        assert_eq!(one_rtt.level(), EncryptionLevel::OneRtt);

        let sealed = handshake.seal(pn(0), b"", b"finished").unwrap();
        assert_eq!(one_rtt.open(pn(0), b"", &sealed), Err(TlsError::Open));
    }
}
