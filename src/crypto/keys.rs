//! X25519 key exchange
//!
//! Ephemeral key pairs for the TLS handshake. A fresh pair is generated for
//! every ClientHello, including the one resent after a Retry.

use rand::{RngCore, rngs::OsRng};
use x25519_dalek::{PublicKey, StaticSecret};

use crate::core::{GROUP_X25519, HELLO_RANDOM_SIZE, PUBLIC_KEY_SIZE, TlsError};

/// Named key-exchange groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Group {
    /// Curve25519 ECDH.
    X25519,
}

impl Group {
    /// IANA code point.
    pub fn code(self) -> u16 {
        match self {
            Group::X25519 => GROUP_X25519,
        }
    }

    /// Look up a group by code point.
    pub fn from_code(code: u16) -> Option<Self> {
        match code {
            GROUP_X25519 => Some(Group::X25519),
            _ => None,
        }
    }
}

/// An ephemeral key-exchange pair.
///
/// The private scalar is zeroized on drop by `x25519-dalek`.
pub struct KeyExchange {
    group: Group,
    secret: StaticSecret,
    public: [u8; PUBLIC_KEY_SIZE],
}

impl KeyExchange {
    /// Generate a new random key pair.
    pub fn generate(group: Group) -> Self {
        let secret = StaticSecret::random_from_rng(OsRng);
        let public = PublicKey::from(&secret).to_bytes();
        Self {
            group,
            secret,
            public,
        }
    }

    /// Group this pair belongs to.
    pub fn group(&self) -> Group {
        self.group
    }

    /// Get the public key.
    pub fn public_key(&self) -> &[u8; PUBLIC_KEY_SIZE] {
        &self.public
    }

    /// Compute the ECDH shared secret with the peer's public key share.
    ///
    /// Rejects malformed shares and low-order points that would yield an
    /// all-zero secret.
    pub fn shared_secret(&self, peer_public: &[u8]) -> Result<[u8; 32], TlsError> {
        let peer: [u8; PUBLIC_KEY_SIZE] = peer_public
            .try_into()
            .map_err(|_| TlsError::Malformed("key share length"))?;
        let shared = self.secret.diffie_hellman(&PublicKey::from(peer));
        if !shared.was_contributory() {
            return Err(TlsError::KeyExchange);
        }
        Ok(shared.to_bytes())
    }
}

impl std::fmt::Debug for KeyExchange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyExchange")
            .field("group", &self.group)
            .field("public", &self.public)
            .finish_non_exhaustive()
    }
}

/// 32 bytes of hello randomness.
pub fn hello_random() -> [u8; HELLO_RANDOM_SIZE] {
    let mut random = [0u8; HELLO_RANDOM_SIZE];
    OsRng.fill_bytes(&mut random);
    random
}
