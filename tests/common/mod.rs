//! Simulated server side of the handshake, built on the public crypto API.

#![allow(dead_code)]

use tinyquic::crypto::messages::{
    ClientHello, Finished, HandshakeType, ServerHello, encode_handshake_message,
};
use tinyquic::crypto::schedule::{
    LABEL_CLIENT_HANDSHAKE, LABEL_SERVER_HANDSHAKE, Secret, derive_secret, finished_verify_data,
    handshake_secret, transcript_hash,
};
use tinyquic::crypto::{AeadContext, Group, KeyExchange, Role};
use tinyquic::transport::{
    ConnectionId, Frame, HandshakePacket, InitialPacket, Packet, PacketNumber, ShortPacket,
    Version,
};

pub fn pn(value: u64) -> PacketNumber {
    PacketNumber::new(value).unwrap()
}

/// Crypto frames of a packet concatenated in offset order.
pub fn crypto_data(frames: &[Frame]) -> Vec<u8> {
    let mut chunks: Vec<(u64, &Vec<u8>)> = frames
        .iter()
        .filter_map(|frame| match frame {
            Frame::Crypto { offset, data } => Some((*offset, data)),
            _ => None,
        })
        .collect();
    chunks.sort_by_key(|(offset, _)| *offset);
    chunks.into_iter().flat_map(|(_, data)| data.clone()).collect()
}

/// Server that accepted one ClientHello.
pub struct SimulatedServer {
    pub connection_id: ConnectionId,
    pub client_connection_id: ConnectionId,
    pub client_hello: Vec<u8>,
    pub server_hello: Vec<u8>,
    secret: Secret,
    _key_exchange: KeyExchange,
    next_packet_number: u64,
}

impl SimulatedServer {
    /// Accept the ClientHello carried by a client Initial.
    pub fn accept(initial: &Packet) -> Self {
        let Packet::Initial(initial) = initial else {
            panic!("expected client initial, got {initial:?}");
        };
        let client_hello = crypto_data(&initial.frames);
        let parsed = ClientHello::parse(&client_hello).unwrap();

        let key_exchange = KeyExchange::generate(Group::X25519);
        let shared = key_exchange
            .shared_secret(parsed.key_share(Group::X25519).unwrap())
            .unwrap();
        let hello = ServerHello::new(
            [0x42; 32],
            parsed.session_id.clone(),
            Group::X25519,
            key_exchange.public_key(),
        );

        Self {
            connection_id: ConnectionId::new(vec![0x5e; 8]).unwrap(),
            client_connection_id: initial
                .source
                .clone()
                .unwrap_or_else(|| ConnectionId::new(Vec::new()).unwrap()),
            client_hello,
            server_hello: hello.to_bytes(),
            secret: handshake_secret(&shared).unwrap(),
            _key_exchange: key_exchange,
            next_packet_number: 0,
        }
    }

    fn next_pn(&mut self) -> PacketNumber {
        let pn = pn(self.next_packet_number);
        self.next_packet_number += 1;
        pn
    }

    fn hello_hash(&self) -> [u8; 32] {
        transcript_hash(&[self.client_hello.as_slice(), self.server_hello.as_slice()])
    }

    /// Initial packet carrying the ServerHello, plus any extra frames.
    pub fn initial(&mut self, extra: Vec<Frame>) -> Packet {
        let mut frames = vec![Frame::crypto(0, self.server_hello.clone())];
        frames.extend(extra);
        Packet::Initial(InitialPacket {
            version: Version::CURRENT,
            destination: self.client_connection_id.clone(),
            source: Some(self.connection_id.clone()),
            token: None,
            packet_number: self.next_pn(),
            frames,
        })
    }

    /// EncryptedExtensions, Certificate, CertificateVerify and Finished.
    pub fn flight(&self) -> Vec<u8> {
        let mut flight = encode_handshake_message(HandshakeType::EncryptedExtensions, &[0, 0]);
        flight.extend(encode_handshake_message(HandshakeType::Certificate, &[0x30; 96]));
        flight.extend(encode_handshake_message(
            HandshakeType::CertificateVerify,
            &[0x31; 48],
        ));
        let hash = transcript_hash(&[
            self.client_hello.as_slice(),
            self.server_hello.as_slice(),
            flight.as_slice(),
        ]);
        let traffic =
            derive_secret(&self.secret, LABEL_SERVER_HANDSHAKE, &self.hello_hash()).unwrap();
        let verify_data = finished_verify_data(&traffic, &hash).unwrap();
        flight.extend(Finished { verify_data }.to_bytes());
        flight
    }

    /// Handshake packet with the given crypto frames.
    pub fn handshake(&mut self, frames: Vec<Frame>) -> Packet {
        Packet::Handshake(HandshakePacket {
            version: Version::CURRENT,
            destination: self.client_connection_id.clone(),
            source: Some(self.connection_id.clone()),
            packet_number: self.next_pn(),
            frames,
        })
    }

    /// 1-RTT packet with the given frames.
    pub fn short(&mut self, frames: Vec<Frame>) -> Packet {
        Packet::Short(ShortPacket {
            key_phase: false,
            destination: self.client_connection_id.clone(),
            packet_number: self.next_pn(),
            frames,
        })
    }

    /// The client Finished the server expects after `flight`.
    pub fn expected_client_finished(&self, flight: &[u8]) -> Vec<u8> {
        let hash = transcript_hash(&[
            self.client_hello.as_slice(),
            self.server_hello.as_slice(),
            flight,
        ]);
        let traffic =
            derive_secret(&self.secret, LABEL_CLIENT_HANDSHAKE, &self.hello_hash()).unwrap();
        Finished {
            verify_data: finished_verify_data(&traffic, &hash).unwrap(),
        }
        .to_bytes()
    }

    /// Server-side Handshake protection.
    pub fn handshake_aead(&self) -> AeadContext {
        AeadContext::handshake(&self.secret, &self.hello_hash(), Role::Server).unwrap()
    }

    /// Server-side 1-RTT protection after `flight`.
    pub fn one_rtt_aead(&self, flight: &[u8]) -> AeadContext {
        let hash = transcript_hash(&[
            self.client_hello.as_slice(),
            self.server_hello.as_slice(),
            flight,
        ]);
        AeadContext::one_rtt(&self.secret, &hash, Role::Server).unwrap()
    }
}
