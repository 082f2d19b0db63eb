//! End-to-end handshake tests against a simulated server.

mod common;

use std::time::Duration;

use common::{SimulatedServer, crypto_data, pn};
use tinyquic::client::{
    ClientConfig, ClientConnection, ClientStateMachine, ConnectionPhase, QuicClient,
    QuicClientBuilder, StreamEvent,
};
use tinyquic::core::{ConnectionError, PROTOCOL_VIOLATION, PacketSender, TlsError};
use tinyquic::crypto::EncryptionLevel;
use tinyquic::transport::{AckRange, Frame, Packet, RetryPacket, TransportError, Version};

type Machine = ClientStateMachine<ClientConnection>;

fn acked(packet: &Packet) -> Vec<AckRange> {
    match packet.frames() {
        [Frame::Ack { ranges, .. }] => ranges.clone(),
        other => panic!("expected a lone ack, got {other:?}"),
    }
}

#[test]
fn test_full_handshake_and_stream_dispatch() {
    let (connection, mut packets, mut streams) = ClientConnection::with_channels(8);
    let mut sm: Machine = ClientStateMachine::new(connection, ClientConfig::default());

    let mut waiter = sm.handshake().unwrap();
    let client_initial = packets.try_recv().unwrap();
    let mut server = SimulatedServer::accept(&client_initial);

    // ServerHello, acknowledging the client Initial.
    let initial = server.initial(vec![Frame::ack(0, vec![AckRange::single(pn(0))])]);
    sm.process_packet(initial).unwrap();
    assert_eq!(sm.phase(), ConnectionPhase::WaitingForHandshake);
    assert_eq!(
        sm.connection().destination_connection_id(),
        &server.connection_id
    );
    assert_eq!(sm.buffer().pending_count(), 0);

    // Handshake keys agree with the server.
    let sealed = server
        .handshake_aead()
        .seal(pn(7), b"hdr", b"handshake payload")
        .unwrap();
    let client_hs = sm.connection().aead(EncryptionLevel::Handshake).unwrap();
    assert_eq!(
        client_hs.open(pn(7), b"hdr", &sealed).unwrap(),
        b"handshake payload"
    );

    // Server flight split over two packets, second one out of order.
    let flight = server.flight();
    let head = &flight[..40];
    let first = server.handshake(vec![Frame::crypto(0, head.to_vec())]);
    let second = server.handshake(vec![
        Frame::crypto(60, flight[60..].to_vec()),
        Frame::crypto(20, flight[20..60].to_vec()),
    ]);
    sm.process_packet(first).unwrap();
    assert_eq!(sm.phase(), ConnectionPhase::WaitingForHandshake);
    assert!(waiter.try_recv().is_err());
    sm.process_packet(second).unwrap();

    assert_eq!(sm.phase(), ConnectionPhase::Ready);
    assert_eq!(waiter.try_recv().unwrap(), Ok(()));

    let finished = packets.try_recv().unwrap();
    let Packet::Handshake(finished_packet) = &finished else {
        panic!("expected handshake packet, got {finished:?}");
    };
    assert_eq!(finished_packet.destination, server.connection_id);
    assert_eq!(
        crypto_data(&finished_packet.frames),
        server.expected_client_finished(&flight)
    );

    // 1-RTT keys agree with the server.
    let sealed = server
        .one_rtt_aead(&flight)
        .seal(pn(3), b"", b"application")
        .unwrap();
    let client_1rtt = sm.connection().aead(EncryptionLevel::OneRtt).unwrap();
    assert_eq!(client_1rtt.open(pn(3), b"", &sealed).unwrap(), b"application");

    // Stream data is dispatched and acknowledged at once.
    let data = server.short(vec![Frame::Stream {
        stream_id: 4,
        offset: 0,
        fin: false,
        data: b"hello".to_vec(),
    }]);
    let data_pn = data.packet_number().unwrap();
    sm.process_packet(data).unwrap();
    assert_eq!(
        streams.try_recv().unwrap(),
        StreamEvent::Data {
            stream_id: 4,
            offset: 0,
            fin: false,
            data: b"hello".to_vec(),
        }
    );
    let ack = packets.try_recv().unwrap();
    assert!(matches!(ack, Packet::Short(_)));
    assert_eq!(acked(&ack), vec![AckRange::single(data_pn)]);

    let reset = server.short(vec![Frame::RstStream {
        stream_id: 4,
        error_code: 9,
        offset: 5,
    }]);
    sm.process_packet(reset).unwrap();
    assert_eq!(
        streams.try_recv().unwrap(),
        StreamEvent::Reset {
            stream_id: 4,
            error_code: 9,
            final_offset: 5,
        }
    );
    packets.try_recv().unwrap();

    // Our stream data is tracked until the server acknowledges it.
    let sent = sm.send_stream(0, 0, true, b"ping".to_vec()).unwrap();
    assert!(sm.buffer().is_pending(sent));
    let ack_only = server.short(vec![Frame::ack(0, vec![AckRange::single(sent)])]);
    sm.process_packet(ack_only).unwrap();
    assert!(!sm.buffer().is_pending(sent));
    assert_eq!(sm.buffer().queued_acks().len(), 1);
    packets.try_recv().unwrap();
    assert!(packets.try_recv().is_err());

    sm.flush_acks().unwrap();
    assert!(matches!(packets.try_recv().unwrap(), Packet::Short(_)));
    assert!(sm.buffer().queued_acks().is_empty());
}

#[test]
fn test_retry_then_handshake() {
    let (connection, mut packets, _streams) = ClientConnection::with_channels(8);
    let mut sm: Machine = ClientStateMachine::new(connection, ClientConfig::default());
    let mut waiter = sm.handshake().unwrap();
    let first = packets.try_recv().unwrap();

    let retry = Packet::Retry(RetryPacket {
        version: Version::CURRENT,
        destination: first.source_connection_id().unwrap().clone(),
        source: tinyquic::transport::ConnectionId::new(vec![0x99; 8]).unwrap(),
        original_destination: first.destination_connection_id().clone(),
        token: b"address-token".to_vec(),
    });
    sm.process_packet(retry).unwrap();

    let second = packets.try_recv().unwrap();
    let Packet::Initial(retried) = &second else {
        panic!("expected initial, got {second:?}");
    };
    assert_eq!(retried.token.as_deref(), Some(&b"address-token"[..]));
    assert_eq!(retried.packet_number, pn(0));
    assert!(retried.source.is_none());

    let mut server = SimulatedServer::accept(&second);
    sm.process_packet(server.initial(Vec::new())).unwrap();
    let flight = server.flight();
    let packet = server.handshake(vec![Frame::crypto(0, flight.clone())]);
    sm.process_packet(packet).unwrap();

    assert_eq!(sm.phase(), ConnectionPhase::Ready);
    assert_eq!(waiter.try_recv().unwrap(), Ok(()));
    let finished = packets.try_recv().unwrap();
    assert_eq!(
        crypto_data(finished.frames()),
        server.expected_client_finished(&flight)
    );
}

#[test]
fn test_tampered_flight_closes_connection() {
    let (connection, mut packets, _streams) = ClientConnection::with_channels(8);
    let mut sm: Machine = ClientStateMachine::new(connection, ClientConfig::default());
    let mut waiter = sm.handshake().unwrap();
    let mut server = SimulatedServer::accept(&packets.try_recv().unwrap());
    sm.process_packet(server.initial(Vec::new())).unwrap();

    let mut flight = server.flight();
    let last = flight.len() - 1;
    flight[last] ^= 0x01;
    let err = sm
        .process_packet(server.handshake(vec![Frame::crypto(0, flight)]))
        .unwrap_err();
    assert_eq!(err, ConnectionError::Tls(TlsError::FinishedVerification));
    assert_eq!(sm.phase(), ConnectionPhase::Closed);
    assert_eq!(waiter.try_recv().unwrap(), Err(err));

    let close = packets.try_recv().unwrap();
    assert!(matches!(close, Packet::Handshake(_)));
    assert!(matches!(
        close.frames(),
        [Frame::ConnectionClose {
            error_code: 0x133,
            ..
        }]
    ));
}

#[test]
fn test_close_after_ready_uses_short_packet() {
    let (connection, mut packets, _streams) = ClientConnection::with_channels(8);
    let mut sm: Machine = ClientStateMachine::new(connection, ClientConfig::default());
    let _waiter = sm.handshake().unwrap();
    let mut server = SimulatedServer::accept(&packets.try_recv().unwrap());
    sm.process_packet(server.initial(Vec::new())).unwrap();
    let flight = server.flight();
    sm.process_packet(server.handshake(vec![Frame::crypto(0, flight)]))
        .unwrap();
    packets.try_recv().unwrap();

    sm.close();
    let close = packets.try_recv().unwrap();
    assert!(matches!(close, Packet::Short(_)));
    assert_eq!(sm.phase(), ConnectionPhase::Closed);
    assert!(!sm.connection().is_closed_by_peer());
    assert!(sm.send_stream(0, 0, false, Vec::new()).is_err());
}

#[tokio::test]
async fn test_async_client_handshake() {
    let config = QuicClientBuilder::new()
        .handshake_timeout(Duration::from_secs(5))
        .build();
    let (client, mut events) = QuicClient::connect(config).await.unwrap();

    let handle = client.clone();
    let handshake = tokio::spawn(async move { handle.handshake().await });

    let initial = events.packets.recv().await.unwrap();
    let Packet::Initial(ref client_initial) = initial else {
        panic!("expected initial, got {initial:?}");
    };
    assert!(client_initial.datagram_len() >= 1200);

    let mut server = SimulatedServer::accept(&initial);
    client.deliver(server.initial(Vec::new())).await.unwrap();
    let flight = server.flight();
    client
        .deliver(server.handshake(vec![Frame::crypto(0, flight.clone())]))
        .await
        .unwrap();

    handshake.await.unwrap().unwrap();
    assert_eq!(client.phase(), ConnectionPhase::Ready);

    let finished = events.packets.recv().await.unwrap();
    assert_eq!(
        crypto_data(finished.frames()),
        server.expected_client_finished(&flight)
    );

    client
        .deliver(server.short(vec![Frame::Stream {
            stream_id: 1,
            offset: 0,
            fin: true,
            data: b"bye".to_vec(),
        }]))
        .await
        .unwrap();
    assert_eq!(
        events.streams.recv().await.unwrap(),
        StreamEvent::Data {
            stream_id: 1,
            offset: 0,
            fin: true,
            data: b"bye".to_vec(),
        }
    );

    let sent = client.send_stream(0, 0, false, b"hi".to_vec()).await.unwrap();
    assert!(sent > pn(0));

    client.close().await.unwrap();
    assert_eq!(client.phase(), ConnectionPhase::Closed);
    assert!(client.ping().await.is_err());
}

/// Drive a machine through the ServerHello and return it with the server.
fn after_server_hello() -> (
    Machine,
    tokio::sync::mpsc::UnboundedReceiver<Packet>,
    SimulatedServer,
) {
    let (connection, mut packets, _streams) = ClientConnection::with_channels(8);
    let mut sm: Machine = ClientStateMachine::new(connection, ClientConfig::default());
    let _waiter = sm.handshake().unwrap();
    let mut server = SimulatedServer::accept(&packets.try_recv().unwrap());
    sm.process_packet(server.initial(Vec::new())).unwrap();
    assert_eq!(sm.phase(), ConnectionPhase::WaitingForHandshake);
    (sm, packets, server)
}

#[test]
fn test_reordered_handshake_packets() {
    let (mut sm, mut packets, mut server) = after_server_hello();
    let flight = server.flight();
    let first = server.handshake(vec![Frame::crypto(0, flight[..40].to_vec())]);
    let second = server.handshake(vec![Frame::crypto(40, flight[40..].to_vec())]);

    sm.process_packet(second).unwrap();
    assert_eq!(sm.phase(), ConnectionPhase::WaitingForHandshake);
    sm.process_packet(first).unwrap();
    assert_eq!(sm.phase(), ConnectionPhase::Ready);

    let finished = packets.try_recv().unwrap();
    assert_eq!(
        crypto_data(finished.frames()),
        server.expected_client_finished(&flight)
    );
}

#[test]
fn test_finished_retired_by_late_handshake_ack() {
    let (mut sm, mut packets, mut server) = after_server_hello();
    let flight = server.flight();
    sm.process_packet(server.handshake(vec![Frame::crypto(0, flight)]))
        .unwrap();
    assert_eq!(sm.phase(), ConnectionPhase::Ready);

    let finished_pn = packets.try_recv().unwrap().packet_number().unwrap();
    assert!(sm.buffer().is_pending(finished_pn));

    let ack = server.handshake(vec![Frame::ack(0, vec![AckRange::single(finished_pn)])]);
    sm.process_packet(ack).unwrap();
    assert!(!sm.buffer().is_pending(finished_pn));
    assert_eq!(sm.phase(), ConnectionPhase::Ready);
    // Long-header packets are never acknowledged by us.
    assert!(sm.buffer().queued_acks().is_empty());
    assert!(packets.try_recv().is_err());
}

#[test]
fn test_crypto_offset_overflow_closes_connection() {
    let (mut sm, mut packets, mut server) = after_server_hello();
    let packet = server.handshake(vec![Frame::crypto(u64::MAX - 1, b"xyz".to_vec())]);
    assert!(matches!(
        sm.process_packet(packet),
        Err(ConnectionError::Transport(
            TransportError::CryptoOffsetOverflow { .. }
        ))
    ));
    assert_eq!(sm.phase(), ConnectionPhase::Closed);

    let close = packets.try_recv().unwrap();
    assert!(matches!(close, Packet::Handshake(_)));
    assert!(matches!(
        close.frames(),
        [Frame::ConnectionClose {
            error_code: PROTOCOL_VIOLATION,
            ..
        }]
    ));
}
