//! TLS 1.3 key schedule over SHA-256
//!
//! ```text
//!              0
//!              |
//!    0 -> HKDF-Extract = Early Secret
//!              |
//!        Derive-Secret(., "derived", "")
//!              |
//! (EC)DHE -> HKDF-Extract = Handshake Secret
//!              |
//!              +-> Derive-Secret(., "c hs traffic", CH..SH)
//!              +-> Derive-Secret(., "s hs traffic", CH..SH)
//!              |
//!        Derive-Secret(., "derived", "")
//!              |
//!    0 -> HKDF-Extract = Master Secret
//!              |
//!              +-> Derive-Secret(., "c ap traffic", CH..server Finished)
//!              +-> Derive-Secret(., "s ap traffic", CH..server Finished)
//! ```
//!
//! Initial-level secrets are extracted from the destination connection ID
//! with the QUIC initial salt.

use hkdf::Hkdf;
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use zeroize::Zeroize;

use crate::core::{HASH_SIZE, INITIAL_SALT, TlsError};

type HmacSha256 = Hmac<Sha256>;

/// Client handshake traffic label.
pub const LABEL_CLIENT_HANDSHAKE: &str = "c hs traffic";
/// Server handshake traffic label.
pub const LABEL_SERVER_HANDSHAKE: &str = "s hs traffic";
/// Client application traffic label.
pub const LABEL_CLIENT_APPLICATION: &str = "c ap traffic";
/// Server application traffic label.
pub const LABEL_SERVER_APPLICATION: &str = "s ap traffic";
/// Client Initial label.
pub const LABEL_CLIENT_INITIAL: &str = "client in";
/// Server Initial label.
pub const LABEL_SERVER_INITIAL: &str = "server in";

const LABEL_DERIVED: &str = "derived";
const LABEL_FINISHED: &str = "finished";
const LABEL_PREFIX: &[u8] = b"tls13 ";

/// A 32-byte secret from the key schedule.
///
/// Zeroized on drop.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret([u8; HASH_SIZE]);

impl Secret {
    /// Wrap raw secret bytes.
    pub fn from_bytes(bytes: [u8; HASH_SIZE]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    ///
    /// # Security
    /// Handle with care - this exposes sensitive key material.
    pub fn as_bytes(&self) -> &[u8; HASH_SIZE] {
        &self.0
    }
}

impl Drop for Secret {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

impl std::fmt::Debug for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Secret([REDACTED])")
    }
}

/// SHA-256 over the concatenation of `parts`.
pub fn transcript_hash(parts: &[&[u8]]) -> [u8; HASH_SIZE] {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().into()
}

/// HKDF-Extract.
pub fn hkdf_extract(salt: &[u8], ikm: &[u8]) -> Secret {
    let (prk, _) = Hkdf::<Sha256>::extract(Some(salt), ikm);
    Secret(prk.into())
}

/// HKDF-Expand-Label: expand `secret` under `"tls13 " + label` into `out`.
pub fn expand_label(
    secret: &Secret,
    label: &str,
    context: &[u8],
    out: &mut [u8],
) -> Result<(), TlsError> {
    let full_label_len = LABEL_PREFIX.len() + label.len();
    let out_len = u16::try_from(out.len()).map_err(|_| TlsError::KeyDerivation)?;
    let label_len = u8::try_from(full_label_len).map_err(|_| TlsError::KeyDerivation)?;
    let context_len = u8::try_from(context.len()).map_err(|_| TlsError::KeyDerivation)?;

    let mut info = Vec::with_capacity(2 + 1 + full_label_len + 1 + context.len());
    info.extend_from_slice(&out_len.to_be_bytes());
    info.push(label_len);
    info.extend_from_slice(LABEL_PREFIX);
    info.extend_from_slice(label.as_bytes());
    info.push(context_len);
    info.extend_from_slice(context);

    let hk = Hkdf::<Sha256>::from_prk(secret.as_bytes()).map_err(|_| TlsError::KeyDerivation)?;
    hk.expand(&info, out).map_err(|_| TlsError::KeyDerivation)
}

/// Derive-Secret: a 32-byte secret bound to a transcript hash.
pub fn derive_secret(
    secret: &Secret,
    label: &str,
    transcript_hash: &[u8; HASH_SIZE],
) -> Result<Secret, TlsError> {
    let mut out = [0u8; HASH_SIZE];
    expand_label(secret, label, transcript_hash, &mut out)?;
    Ok(Secret(out))
}

/// Early secret for a handshake without a pre-shared key.
pub fn early_secret() -> Secret {
    hkdf_extract(&[0u8; HASH_SIZE], &[0u8; HASH_SIZE])
}

/// Handshake secret from the ECDHE shared secret.
pub fn handshake_secret(shared_secret: &[u8]) -> Result<Secret, TlsError> {
    let salt = derive_secret(&early_secret(), LABEL_DERIVED, &transcript_hash(&[]))?;
    Ok(hkdf_extract(salt.as_bytes(), shared_secret))
}

/// Master secret from the handshake secret.
pub fn master_secret(handshake_secret: &Secret) -> Result<Secret, TlsError> {
    let salt = derive_secret(handshake_secret, LABEL_DERIVED, &transcript_hash(&[]))?;
    Ok(hkdf_extract(salt.as_bytes(), &[0u8; HASH_SIZE]))
}

/// Client and server Initial secrets for a destination connection ID.
pub fn initial_secrets(destination_connection_id: &[u8]) -> Result<(Secret, Secret), TlsError> {
    let initial = hkdf_extract(&INITIAL_SALT, destination_connection_id);
    let mut client = [0u8; HASH_SIZE];
    let mut server = [0u8; HASH_SIZE];
    expand_label(&initial, LABEL_CLIENT_INITIAL, &[], &mut client)?;
    expand_label(&initial, LABEL_SERVER_INITIAL, &[], &mut server)?;
    Ok((Secret(client), Secret(server)))
}

/// Finished verify data: HMAC over the transcript with the finished key.
pub fn finished_verify_data(
    traffic_secret: &Secret,
    transcript_hash: &[u8; HASH_SIZE],
) -> Result<[u8; HASH_SIZE], TlsError> {
    let mut mac = finished_mac(traffic_secret)?;
    mac.update(transcript_hash);
    Ok(mac.finalize().into_bytes().into())
}

/// Check a peer's Finished verify data in constant time.
pub fn verify_finished(
    traffic_secret: &Secret,
    transcript_hash: &[u8; HASH_SIZE],
    verify_data: &[u8],
) -> Result<(), TlsError> {
    let mut mac = finished_mac(traffic_secret)?;
    mac.update(transcript_hash);
    mac.verify_slice(verify_data)
        .map_err(|_| TlsError::FinishedVerification)
}

fn finished_mac(traffic_secret: &Secret) -> Result<HmacSha256, TlsError> {
    let mut finished_key = [0u8; HASH_SIZE];
    expand_label(traffic_secret, LABEL_FINISHED, &[], &mut finished_key)?;
    let mac = HmacSha256::new_from_slice(&finished_key).map_err(|_| TlsError::KeyDerivation);
    finished_key.zeroize();
    mac
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hex32(s: &str) -> [u8; 32] {
        hex::decode(s).unwrap().try_into().unwrap()
    }

    #[test]
    fn test_early_secret_vector() {
        // RFC 8448, simple 1-RTT handshake.
        assert_eq!(
            early_secret().as_bytes(),
            &hex32("33ad0a1c607ec03b09e6cd9893680ce210adf300aa1f2660e1b22e10f170f92a")
        );
        let derived = derive_secret(&early_secret(), "derived", &transcript_hash(&[])).unwrap();
        assert_eq!(
            derived.as_bytes(),
            &hex32("6f2615a108c702c5678f54fc9dbab69716c076189c48250cebeac3576c3611ba")
        );
    }

    #[test]
    fn test_handshake_secret_vector() {
        let ecdhe = hex::decode("8bd4054fb55b9d63fdfbacf9f04b9f0d35e6d63f537563efd46272900f89492d")
            .unwrap();
        assert_eq!(
            handshake_secret(&ecdhe).unwrap().as_bytes(),
            &hex32("1dc826e93606aa6fdc0aadc12f741b01046aa6b99f691ed221a9f0ca043fbeac")
        );
    }

    #[test]
    fn test_initial_secrets_vector() {
        // RFC 9001 appendix A.1.
        let dcid = hex::decode("8394c8f03e515708").unwrap();
        let (client, server) = initial_secrets(&dcid).unwrap();
        assert_eq!(
            client.as_bytes(),
            &hex32("c00cf151ca5be075ed0ebfb5c80323c42d6b7db67881289af4008f1f6c357aea")
        );
        assert_eq!(
            server.as_bytes(),
            &hex32("3c199828fd139efd216c155ad844cc81fb82fa8d7446fa7d78be803acdda951b")
        );
    }

    #[test]
    fn test_transcript_hash_is_concatenation() {
        assert_eq!(
            transcript_hash(&[b"client".as_slice(), b"server".as_slice()]),
            transcript_hash(&[b"clientserver".as_slice()])
        );
        assert_ne!(transcript_hash(&[b"a".as_slice()]), transcript_hash(&[b"b".as_slice()]));
    }

    #[test]
    fn test_finished_roundtrip() {
        let secret = Secret::from_bytes([7u8; 32]);
        let hash = transcript_hash(&[b"transcript".as_slice()]);
        let verify = finished_verify_data(&secret, &hash).unwrap();

        assert!(verify_finished(&secret, &hash, &verify).is_ok());

        let mut tampered = verify;
        tampered[0] ^= 1;
        assert_eq!(
            verify_finished(&secret, &hash, &tampered),
            Err(TlsError::FinishedVerification)
        );
        let other = transcript_hash(&[b"other".as_slice()]);
        assert_eq!(
            verify_finished(&secret, &other, &verify),
            Err(TlsError::FinishedVerification)
        );
    }

    #[test]
    fn test_expand_label_lengths() {
        let secret = Secret::from_bytes([1u8; 32]);
        let mut short = [0u8; 12];
        let mut long = [0u8; 32];
        expand_label(&secret, "quic iv", &[], &mut short).unwrap();
        expand_label(&secret, "quic iv", &[], &mut long).unwrap();
        // The output length is part of the label, so prefixes differ.
        assert_ne!(&short[..], &long[..12]);
    }

    #[test]
    fn test_secret_debug_is_redacted() {
        let secret = Secret::from_bytes([0xaa; 32]);
        assert_eq!(format!("{secret:?}"), "Secret([REDACTED])");
    }
}
