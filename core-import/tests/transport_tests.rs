//! Integration tests for the chunk transport against the in-memory server.

mod support;

use bytes::Bytes;
use core_import::metadata::Session;
use core_import::protocol::{Chunk, LoginFrame, COMMAND_AUXILIARY, COMMAND_PRIMARY};
use core_import::transport::ChunkTransport;
use core_import::ImportError;
use futures::StreamExt;
use std::time::Duration;
use support::{MockRecordingServer, TrackScript};

fn session() -> Session {
    Session::new(123_456, 987_654, "rec.example.com")
}

#[tokio::test]
async fn test_login_frame_reaches_server() {
    let server = MockRecordingServer::new();
    server.script(COMMAND_AUXILIARY, 3, TrackScript::from_payloads(Vec::new()));

    let mut transport = ChunkTransport::open(&server, &session(), COMMAND_AUXILIARY, 3)
        .await
        .unwrap();
    assert!(transport.next_payload().await.unwrap().is_none());

    let log = server.connection_for(COMMAND_AUXILIARY, 3).unwrap();
    assert_eq!(log.host, "rec.example.com");
    assert_eq!(
        log.login().unwrap(),
        LoginFrame {
            command: COMMAND_AUXILIARY,
            session_id: 123_456,
            session_key: 987_654,
            track_index: 3,
        }
    );
}

#[tokio::test]
async fn test_every_chunk_is_acked_before_delivery() {
    let server = MockRecordingServer::new();
    let payloads = vec![
        Bytes::from_static(b"first"),
        Bytes::from_static(b"second"),
        Bytes::from_static(b"third"),
    ];
    server.script(COMMAND_PRIMARY, 1, TrackScript::from_payloads(payloads.clone()));

    let mut transport = ChunkTransport::open(&server, &session(), COMMAND_PRIMARY, 1)
        .await
        .unwrap();
    let log = server.connection_for(COMMAND_PRIMARY, 1).unwrap();

    for (i, expected) in payloads.iter().enumerate() {
        let payload = transport.next_payload().await.unwrap().unwrap();
        assert_eq!(&payload, expected);

        let acks = log.acks();
        assert_eq!(acks.len(), i + 1, "ack must be sent before the payload is returned");
        assert_eq!(acks[i], i as u32 + 1);
    }

    assert!(!log.is_closed());
    assert!(transport.next_payload().await.unwrap().is_none());
    assert_eq!(log.acks(), vec![1, 2, 3, 4]);
    assert_eq!(transport.chunks_received(), 4);
}

#[tokio::test]
async fn test_end_of_stream_closes_connection() {
    let server = MockRecordingServer::new();
    server.script(
        COMMAND_PRIMARY,
        2,
        TrackScript::raw(
            vec![
                Chunk::Data {
                    sequence: 40,
                    payload: Bytes::from_static(b"x"),
                }
                .encode(),
                Chunk::End { sequence: 41 }.encode(),
                // Anything after the end is never read.
                Chunk::Data {
                    sequence: 42,
                    payload: Bytes::from_static(b"late"),
                }
                .encode(),
            ],
            false,
        ),
    );

    let transport = ChunkTransport::open(&server, &session(), COMMAND_PRIMARY, 2)
        .await
        .unwrap();
    let payloads: Vec<_> = transport.into_byte_stream().collect().await;

    assert_eq!(payloads.len(), 1);
    assert_eq!(payloads[0].as_ref().unwrap(), &Bytes::from_static(b"x"));

    let log = server.connection_for(COMMAND_PRIMARY, 2).unwrap();
    assert!(log.is_closed());
    assert_eq!(log.acks(), vec![40, 41]);
}

#[tokio::test]
async fn test_short_chunk_is_protocol_error() {
    let server = MockRecordingServer::new();
    server.script(
        COMMAND_PRIMARY,
        1,
        TrackScript::raw(vec![Bytes::from_static(&[1, 0])], false),
    );

    let mut transport = ChunkTransport::open(&server, &session(), COMMAND_PRIMARY, 1)
        .await
        .unwrap();
    let err = transport.next_payload().await.unwrap_err();

    assert!(matches!(err, ImportError::Protocol(_)));
    assert!(transport.next_payload().await.unwrap().is_none());
    assert!(server.connection_for(COMMAND_PRIMARY, 1).unwrap().acks().is_empty());
}

#[tokio::test]
async fn test_peer_close_before_end_is_transport_error() {
    let server = MockRecordingServer::new();
    server.script(
        COMMAND_PRIMARY,
        1,
        TrackScript::raw(
            vec![Chunk::Data {
                sequence: 1,
                payload: Bytes::from_static(b"partial"),
            }
            .encode()],
            true,
        ),
    );

    let transport = ChunkTransport::open(&server, &session(), COMMAND_PRIMARY, 1)
        .await
        .unwrap();
    let items: Vec<_> = transport.into_byte_stream().collect().await;

    assert_eq!(items.len(), 2);
    assert!(items[0].is_ok());
    let err = items[1].as_ref().unwrap_err();
    assert!(matches!(err, ImportError::ConnectionClosed(_)));
    assert!(err.is_transport_error());
}

#[tokio::test]
async fn test_chunk_timeout() {
    let server = MockRecordingServer::new();
    server.script(COMMAND_PRIMARY, 1, TrackScript::raw(Vec::new(), false));

    let mut transport = ChunkTransport::open(&server, &session(), COMMAND_PRIMARY, 1)
        .await
        .unwrap()
        .with_chunk_timeout(Some(Duration::from_millis(50)));

    let err = transport.next_payload().await.unwrap_err();
    assert!(matches!(err, ImportError::Timeout(_)));
}

#[tokio::test]
async fn test_refused_connection() {
    let server = MockRecordingServer::new();
    server.refuse_connections();

    let err = ChunkTransport::open(&server, &session(), COMMAND_PRIMARY, 1)
        .await
        .err()
        .unwrap();
    assert!(matches!(err, ImportError::ConnectionFailed(_)));
}
