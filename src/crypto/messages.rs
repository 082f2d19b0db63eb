//! TLS 1.3 handshake messages
//!
//! Every message is framed as:
//!
//! ```text
//! +------+-----------+------------------+
//! | type | length    | body             |
//! | u8   | u24 (BE)  | length bytes     |
//! +------+-----------+------------------+
//! ```
//!
//! Only what the client needs is modelled: the two hellos, the Finished
//! message, and a scanner for the server's encrypted flight.

use crate::core::{
    HELLO_RANDOM_SIZE, HASH_SIZE, TLS_CHACHA20_POLY1305_SHA256, TLS_LEGACY_VERSION, TLS13_VERSION,
    TlsError,
};

use super::keys::Group;

/// Size of the handshake message header.
pub const HANDSHAKE_HEADER_SIZE: usize = 4;

const EXT_SUPPORTED_VERSIONS: u16 = 43;
const EXT_KEY_SHARE: u16 = 51;

/// Handshake message types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum HandshakeType {
    /// ClientHello.
    ClientHello = 1,
    /// ServerHello.
    ServerHello = 2,
    /// EncryptedExtensions.
    EncryptedExtensions = 8,
    /// Certificate.
    Certificate = 11,
    /// CertificateVerify.
    CertificateVerify = 15,
    /// Finished.
    Finished = 20,
}

impl HandshakeType {
    /// Parse from byte.
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            1 => Some(Self::ClientHello),
            2 => Some(Self::ServerHello),
            8 => Some(Self::EncryptedExtensions),
            11 => Some(Self::Certificate),
            15 => Some(Self::CertificateVerify),
            20 => Some(Self::Finished),
            _ => None,
        }
    }

    /// Get the byte representation.
    pub fn as_byte(self) -> u8 {
        self as u8
    }
}

/// Cursor over a handshake byte slice.
struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn bytes(&mut self, n: usize) -> Result<&'a [u8], TlsError> {
        if self.remaining() < n {
            return Err(TlsError::Malformed("truncated"));
        }
        let out = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    fn u8(&mut self) -> Result<u8, TlsError> {
        Ok(self.bytes(1)?[0])
    }

    fn u16(&mut self) -> Result<u16, TlsError> {
        let b = self.bytes(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    fn u24(&mut self) -> Result<usize, TlsError> {
        let b = self.bytes(3)?;
        Ok(usize::from(b[0]) << 16 | usize::from(b[1]) << 8 | usize::from(b[2]))
    }

    fn vec_u8(&mut self) -> Result<&'a [u8], TlsError> {
        let len = usize::from(self.u8()?);
        self.bytes(len)
    }

    fn vec_u16(&mut self) -> Result<&'a [u8], TlsError> {
        let len = usize::from(self.u16()?);
        self.bytes(len)
    }

    fn finish(&self, what: &'static str) -> Result<(), TlsError> {
        if self.remaining() != 0 {
            return Err(TlsError::Malformed(what));
        }
        Ok(())
    }
}

fn put_u16(out: &mut Vec<u8>, value: u16) {
    out.extend_from_slice(&value.to_be_bytes());
}

fn put_vec_u8(out: &mut Vec<u8>, data: &[u8]) {
    // Callers only pass session IDs and version lists, both under 256 bytes.
    out.push(data.len() as u8);
    out.extend_from_slice(data);
}

fn put_vec_u16(out: &mut Vec<u8>, data: &[u8]) {
    put_u16(out, data.len() as u16);
    out.extend_from_slice(data);
}

fn put_extension(out: &mut Vec<u8>, ext_type: u16, data: &[u8]) {
    put_u16(out, ext_type);
    put_vec_u16(out, data);
}

/// Frame `body` as a handshake message of type `msg_type`.
pub fn encode_handshake_message(msg_type: HandshakeType, body: &[u8]) -> Vec<u8> {
    let len = (body.len() as u32).to_be_bytes();
    let mut out = Vec::with_capacity(HANDSHAKE_HEADER_SIZE + body.len());
    out.push(msg_type.as_byte());
    out.extend_from_slice(&len[1..]);
    out.extend_from_slice(body);
    out
}

/// Split one complete handshake message off the front of `bytes`.
///
/// Returns the message type, its body and the total length consumed, or
/// `None` if `bytes` does not yet hold the whole message.
pub fn split_handshake_message(bytes: &[u8]) -> Option<(u8, &[u8], usize)> {
    if bytes.len() < HANDSHAKE_HEADER_SIZE {
        return None;
    }
    let len = usize::from(bytes[1]) << 16 | usize::from(bytes[2]) << 8 | usize::from(bytes[3]);
    let end = HANDSHAKE_HEADER_SIZE + len;
    if bytes.len() < end {
        return None;
    }
    Some((bytes[0], &bytes[HANDSHAKE_HEADER_SIZE..end], end))
}

/// Parse a single complete message of the expected type.
fn expect_message(bytes: &[u8], expected: HandshakeType) -> Result<&[u8], TlsError> {
    let (msg_type, body, consumed) =
        split_handshake_message(bytes).ok_or(TlsError::Malformed("truncated"))?;
    if msg_type != expected.as_byte() {
        return Err(TlsError::UnexpectedMessage(msg_type));
    }
    if consumed != bytes.len() {
        return Err(TlsError::Malformed("trailing bytes after message"));
    }
    Ok(body)
}

/// ClientHello.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientHello {
    /// Client random.
    pub random: [u8; HELLO_RANDOM_SIZE],
    /// Legacy session ID.
    pub session_id: Vec<u8>,
    /// Offered cipher suites.
    pub cipher_suites: Vec<u16>,
    /// `supported_versions` extension.
    pub supported_versions: Vec<u16>,
    /// `key_share` entries as `(group, public key)`.
    pub key_shares: Vec<(u16, Vec<u8>)>,
}

impl ClientHello {
    /// Hello offering TLS 1.3 with one key share.
    pub fn new(random: [u8; HELLO_RANDOM_SIZE], group: Group, public_key: &[u8]) -> Self {
        Self {
            random,
            session_id: Vec::new(),
            cipher_suites: vec![TLS_CHACHA20_POLY1305_SHA256],
            supported_versions: vec![TLS13_VERSION],
            key_shares: vec![(group.code(), public_key.to_vec())],
        }
    }

    /// Public key offered for `group`, if any.
    pub fn key_share(&self, group: Group) -> Option<&[u8]> {
        self.key_shares
            .iter()
            .find(|(g, _)| *g == group.code())
            .map(|(_, key)| key.as_slice())
    }

    /// Encode as a framed handshake message.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut body = Vec::with_capacity(128);
        put_u16(&mut body, TLS_LEGACY_VERSION);
        body.extend_from_slice(&self.random);
        put_vec_u8(&mut body, &self.session_id);

        let suites: Vec<u8> = self
            .cipher_suites
            .iter()
            .flat_map(|s| s.to_be_bytes())
            .collect();
        put_vec_u16(&mut body, &suites);
        put_vec_u8(&mut body, &[0]);

        let mut extensions = Vec::new();

        let versions: Vec<u8> = self
            .supported_versions
            .iter()
            .flat_map(|v| v.to_be_bytes())
            .collect();
        let mut ext = Vec::new();
        put_vec_u8(&mut ext, &versions);
        put_extension(&mut extensions, EXT_SUPPORTED_VERSIONS, &ext);

        let mut shares = Vec::new();
        for (group, key) in &self.key_shares {
            put_u16(&mut shares, *group);
            put_vec_u16(&mut shares, key);
        }
        let mut ext = Vec::new();
        put_vec_u16(&mut ext, &shares);
        put_extension(&mut extensions, EXT_KEY_SHARE, &ext);

        put_vec_u16(&mut body, &extensions);
        encode_handshake_message(HandshakeType::ClientHello, &body)
    }

    /// Parse a framed ClientHello.
    pub fn parse(bytes: &[u8]) -> Result<Self, TlsError> {
        let mut r = Reader::new(expect_message(bytes, HandshakeType::ClientHello)?);
        let _legacy_version = r.u16()?;
        let random = read_random(&mut r)?;
        let session_id = r.vec_u8()?.to_vec();

        let mut suites = Reader::new(r.vec_u16()?);
        let mut cipher_suites = Vec::new();
        while suites.remaining() > 0 {
            cipher_suites.push(suites.u16()?);
        }
        let _compression = r.vec_u8()?;

        let mut hello = Self {
            random,
            session_id,
            cipher_suites,
            supported_versions: Vec::new(),
            key_shares: Vec::new(),
        };

        let mut extensions = Reader::new(r.vec_u16()?);
        r.finish("trailing bytes in client hello")?;
        while extensions.remaining() > 0 {
            let ext_type = extensions.u16()?;
            let mut data = Reader::new(extensions.vec_u16()?);
            match ext_type {
                EXT_SUPPORTED_VERSIONS => {
                    let mut list = Reader::new(data.vec_u8()?);
                    while list.remaining() > 0 {
                        hello.supported_versions.push(list.u16()?);
                    }
                }
                EXT_KEY_SHARE => {
                    let mut list = Reader::new(data.vec_u16()?);
                    while list.remaining() > 0 {
                        let group = list.u16()?;
                        let key = list.vec_u16()?.to_vec();
                        hello.key_shares.push((group, key));
                    }
                }
                _ => {}
            }
        }
        Ok(hello)
    }
}

/// ServerHello.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerHello {
    /// Server random.
    pub random: [u8; HELLO_RANDOM_SIZE],
    /// Echoed legacy session ID.
    pub session_id: Vec<u8>,
    /// Selected cipher suite.
    pub cipher_suite: u16,
    /// Selected version from `supported_versions`, if present.
    pub supported_version: Option<u16>,
    /// Server key share as `(group, public key)`, if present.
    pub key_share: Option<(u16, Vec<u8>)>,
}

impl ServerHello {
    /// Hello selecting TLS 1.3 and the given key share.
    pub fn new(
        random: [u8; HELLO_RANDOM_SIZE],
        session_id: Vec<u8>,
        group: Group,
        public_key: &[u8],
    ) -> Self {
        Self {
            random,
            session_id,
            cipher_suite: TLS_CHACHA20_POLY1305_SHA256,
            supported_version: Some(TLS13_VERSION),
            key_share: Some((group.code(), public_key.to_vec())),
        }
    }

    /// Encode as a framed handshake message.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut body = Vec::with_capacity(96);
        put_u16(&mut body, TLS_LEGACY_VERSION);
        body.extend_from_slice(&self.random);
        put_vec_u8(&mut body, &self.session_id);
        put_u16(&mut body, self.cipher_suite);
        body.push(0);

        let mut extensions = Vec::new();
        if let Some(version) = self.supported_version {
            put_extension(&mut extensions, EXT_SUPPORTED_VERSIONS, &version.to_be_bytes());
        }
        if let Some((group, key)) = &self.key_share {
            let mut ext = Vec::new();
            put_u16(&mut ext, *group);
            put_vec_u16(&mut ext, key);
            put_extension(&mut extensions, EXT_KEY_SHARE, &ext);
        }
        put_vec_u16(&mut body, &extensions);
        encode_handshake_message(HandshakeType::ServerHello, &body)
    }

    /// Parse a framed ServerHello.
    pub fn parse(bytes: &[u8]) -> Result<Self, TlsError> {
        let mut r = Reader::new(expect_message(bytes, HandshakeType::ServerHello)?);
        let _legacy_version = r.u16()?;
        let random = read_random(&mut r)?;
        let session_id = r.vec_u8()?.to_vec();
        let cipher_suite = r.u16()?;
        let _compression = r.u8()?;

        let mut hello = Self {
            random,
            session_id,
            cipher_suite,
            supported_version: None,
            key_share: None,
        };

        let mut extensions = Reader::new(r.vec_u16()?);
        r.finish("trailing bytes in server hello")?;
        while extensions.remaining() > 0 {
            let ext_type = extensions.u16()?;
            let mut data = Reader::new(extensions.vec_u16()?);
            match ext_type {
                EXT_SUPPORTED_VERSIONS => {
                    hello.supported_version = Some(data.u16()?);
                    data.finish("supported_versions")?;
                }
                EXT_KEY_SHARE => {
                    let group = data.u16()?;
                    let key = data.vec_u16()?.to_vec();
                    data.finish("key_share")?;
                    hello.key_share = Some((group, key));
                }
                _ => {}
            }
        }
        Ok(hello)
    }
}

fn read_random(r: &mut Reader<'_>) -> Result<[u8; HELLO_RANDOM_SIZE], TlsError> {
    let mut random = [0u8; HELLO_RANDOM_SIZE];
    random.copy_from_slice(r.bytes(HELLO_RANDOM_SIZE)?);
    Ok(random)
}

/// Finished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finished {
    /// HMAC over the transcript.
    pub verify_data: [u8; HASH_SIZE],
}

impl Finished {
    /// Encode as a framed handshake message.
    pub fn to_bytes(&self) -> Vec<u8> {
        encode_handshake_message(HandshakeType::Finished, &self.verify_data)
    }

    /// Parse a framed Finished.
    pub fn parse(bytes: &[u8]) -> Result<Self, TlsError> {
        let body = expect_message(bytes, HandshakeType::Finished)?;
        let verify_data = body
            .try_into()
            .map_err(|_| TlsError::Malformed("finished length"))?;
        Ok(Self { verify_data })
    }
}

/// A complete server flight located inside a buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerFlight {
    /// Bytes up to and including the server Finished.
    pub consumed: usize,
    /// Offset where the server Finished message starts.
    pub finished_at: usize,
    /// The server's Finished verify data.
    pub verify_data: [u8; HASH_SIZE],
}

/// Scan `buffer` for a complete server handshake flight.
///
/// The flight is EncryptedExtensions, Certificate and CertificateVerify
/// (treated as opaque) followed by Finished. Returns `Ok(None)` when the
/// buffer ends before Finished does; nothing is consumed in that case, so
/// callers simply retry with more bytes appended.
pub fn parse_server_flight(buffer: &[u8]) -> Result<Option<ServerFlight>, TlsError> {
    let mut offset = 0;
    while let Some((msg_type, body, len)) = split_handshake_message(&buffer[offset..]) {
        match HandshakeType::from_byte(msg_type) {
            Some(
                HandshakeType::EncryptedExtensions
                | HandshakeType::Certificate
                | HandshakeType::CertificateVerify,
            ) => {}
            Some(HandshakeType::Finished) => {
                let verify_data = body
                    .try_into()
                    .map_err(|_| TlsError::Malformed("finished length"))?;
                return Ok(Some(ServerFlight {
                    consumed: offset + len,
                    finished_at: offset,
                    verify_data,
                }));
            }
            _ => return Err(TlsError::UnexpectedMessage(msg_type)),
        }
        offset += len;
    }
    Ok(None)
}
