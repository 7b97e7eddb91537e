//! End-to-end tests for `Communication` over loopback sockets.

mod common;

use std::collections::BTreeSet;
use std::time::Duration;

use common::{init_tracing, next, next_data, quiet_config, started, WAIT};
use courier_transport::wire::{serialize_frame, FrameKind};
use courier_transport::{
    Address, Communication, CommunicationConfig, CommunicationError, ConnectionError,
    NetworkKind, TaskSupervisor, TransportError, WireError,
};
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio::sync::mpsc::error::TryRecvError;
use tokio_util::sync::CancellationToken;

#[tokio::test(flavor = "multi_thread")]
async fn test_hello_round_trip() {
    init_tracing();
    let a = started(CommunicationConfig::local()).await;
    let b = Communication::bind(CommunicationConfig::local())
        .await
        .expect("bind b");

    b.send(a.addr(), b"hello").await.expect("send");

    let inbound = a.receive();
    let datagram = tokio::time::timeout(Duration::from_secs(1), inbound.recv())
        .await
        .expect("delivered within 1s")
        .expect("channel open");
    assert_eq!(datagram.payload, b"hello");
    assert_eq!(&datagram.from, b.addr());
    assert_eq!(&datagram.to, a.addr());
    assert!(datagram.error.is_none());
    assert!(matches!(inbound.try_recv(), Err(TryRecvError::Empty)));

    b.close().await.expect("close b");
    a.close().await.expect("close a");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_empty_and_large_payloads() {
    init_tracing();
    let a = started(quiet_config()).await;
    let b = Communication::bind(quiet_config()).await.expect("bind b");
    let inbound = a.receive();

    let large: Vec<u8> = (0..(1 << 20)).map(|i| (i % 251) as u8).collect();
    b.send(a.addr(), b"").await.expect("send empty");
    b.send(a.addr(), &large).await.expect("send large");

    // Sequential sends reuse one pooled connection, so order holds here.
    assert!(next_data(&inbound).await.payload.is_empty());
    assert_eq!(next_data(&inbound).await.payload, large);

    b.close().await.expect("close b");
    a.close().await.expect("close a");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_sequential_sends_reuse_connection() {
    init_tracing();
    let a = started(quiet_config()).await;
    let b = Communication::bind(quiet_config().with_pool_size(4))
        .await
        .expect("bind b");

    for i in 0..10u8 {
        b.send(a.addr(), &[i]).await.expect("send");
    }
    assert_eq!(b.idle_connections(a.addr()).await, 1);

    let inbound = a.receive();
    for i in 0..10u8 {
        assert_eq!(next_data(&inbound).await.payload, vec![i]);
    }

    b.close().await.expect("close b");
    a.close().await.expect("close a");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_pool_never_exceeds_bound() {
    init_tracing();
    let a = started(quiet_config()).await;
    let b = Communication::bind(quiet_config().with_pool_size(1))
        .await
        .expect("bind b");

    let mut sends = Vec::new();
    for i in 0..16u8 {
        let b = b.clone();
        let target = a.addr().clone();
        sends.push(tokio::spawn(async move { b.send(&target, &[i]).await }));
    }
    for send in sends {
        send.await.expect("send task").expect("send");
    }
    assert_eq!(b.idle_connections(a.addr()).await, 1);

    let inbound = a.receive();
    let mut received = BTreeSet::new();
    for _ in 0..16 {
        received.insert(next_data(&inbound).await.payload[0]);
    }
    assert_eq!(received, (0..16u8).collect::<BTreeSet<_>>());

    b.close().await.expect("close b");
    a.close().await.expect("close a");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_close_is_idempotent() {
    init_tracing();
    let a = started(quiet_config()).await;
    let b = Communication::bind(quiet_config()).await.expect("bind b");
    b.send(a.addr(), b"x").await.expect("send");

    a.close().await.expect("first close");
    a.close().await.expect("second close");
    b.close().await.expect("first close");
    b.close().await.expect("second close");
    assert!(a.is_closed());
    assert!(b.is_closed());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_close_leaves_no_tasks() {
    init_tracing();
    let supervisor = TaskSupervisor::new();
    let a = Communication::with_supervisor(quiet_config(), supervisor.clone())
        .await
        .expect("bind a");
    a.start().expect("start");
    let b = Communication::bind(quiet_config().with_pool_size(0))
        .await
        .expect("bind b");

    for i in 0..4u8 {
        b.send(a.addr(), &[i]).await.expect("send");
    }
    let inbound = a.receive();
    next_data(&inbound).await;
    assert!(supervisor.in_flight() >= 3, "accept loop plus listen and pump");

    a.close().await.expect("close a");
    assert_eq!(supervisor.in_flight(), 0);
    assert!(supervisor.is_closed());
    b.close().await.expect("close b");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_send_after_close_fails_fast() {
    init_tracing();
    let a = started(quiet_config()).await;
    let b = Communication::bind(quiet_config()).await.expect("bind b");
    b.close().await.expect("close b");

    let result = b.send(a.addr(), b"late").await;
    assert!(matches!(result, Err(CommunicationError::AlreadyClosed)));
    assert_eq!(b.idle_connections(a.addr()).await, 0);

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(matches!(a.receive().try_recv(), Err(TryRecvError::Empty)));
    a.close().await.expect("close a");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_parent_cancellation_stops_sends() {
    init_tracing();
    let parent = CancellationToken::new();
    let a = started(quiet_config()).await;
    let b = Communication::bind(quiet_config().with_parent(parent.clone()))
        .await
        .expect("bind b");

    b.send(a.addr(), b"before").await.expect("send");
    parent.cancel();
    let result = b.send(a.addr(), b"after").await;
    assert!(matches!(result, Err(CommunicationError::AlreadyClosed)));

    b.close().await.expect("close b");
    a.close().await.expect("close a");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_stalled_consumer_loses_nothing() {
    init_tracing();
    let a = started(quiet_config().with_inbound_capacity(2)).await;
    let b = Communication::bind(quiet_config()).await.expect("bind b");

    for i in 0..64u8 {
        b.send(a.addr(), &[i]).await.expect("send");
    }
    // Nobody reads for a while; the overflow is parked, not dropped.
    tokio::time::sleep(Duration::from_millis(100)).await;

    let inbound = a.receive();
    let mut received = BTreeSet::new();
    for _ in 0..64 {
        received.insert(next_data(&inbound).await.payload[0]);
    }
    assert_eq!(received, (0..64u8).collect::<BTreeSet<_>>());

    b.close().await.expect("close b");
    a.close().await.expect("close a");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_disconnected_peer_is_drained() {
    init_tracing();
    let a = started(quiet_config().with_inbound_capacity(1)).await;
    let b = Communication::bind(quiet_config()).await.expect("bind b");

    for i in 0..8u8 {
        b.send(a.addr(), &[i]).await.expect("send");
    }
    b.close().await.expect("close b");
    tokio::time::sleep(Duration::from_millis(100)).await;

    let inbound = a.receive();
    let mut received = BTreeSet::new();
    for _ in 0..8 {
        received.insert(next_data(&inbound).await.payload[0]);
    }
    assert_eq!(received.len(), 8);
    a.close().await.expect("close a");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_inbound_ends_after_close() {
    init_tracing();
    let a = started(quiet_config()).await;
    let inbound = a.receive();
    a.close().await.expect("close");

    let end = tokio::time::timeout(WAIT, inbound.recv())
        .await
        .expect("recv returns after close");
    assert!(end.is_none());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_invalid_bind_addresses() {
    init_tracing();
    for raw in ["0.0.0.0:0", ":0", "[::]:0"] {
        let result = Communication::bind(CommunicationConfig::new(raw)).await;
        match result {
            Err(e) => assert!(e.is_invalid_address(), "{raw}: {e}"),
            Ok(_) => panic!("{raw} should be rejected"),
        }
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_corrupt_frame_is_reported_in_band() {
    init_tracing();
    let a = started(quiet_config()).await;
    let inbound = a.receive();

    let mut stream = TcpStream::connect(a.addr().as_str())
        .await
        .expect("connect");
    let mut corrupt = serialize_frame(FrameKind::Data, b"payload").expect("frame");
    let last = corrupt.len() - 1;
    corrupt[last] ^= 0xFF;
    stream.write_all(&corrupt).await.expect("write corrupt");
    let valid = serialize_frame(FrameKind::Data, b"after").expect("frame");
    stream.write_all(&valid).await.expect("write valid");

    let report = next(&inbound).await;
    assert!(report.payload.is_empty());
    assert!(matches!(
        report.error,
        Some(ConnectionError::Wire(WireError::ChecksumMismatch { .. }))
    ));

    let datagram = next(&inbound).await;
    assert_eq!(datagram.payload, b"after");
    assert!(datagram.error.is_none());

    a.close().await.expect("close a");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_truncated_datagram_is_reported_in_band() {
    init_tracing();
    let a = started(quiet_config().with_network(NetworkKind::Datagram)).await;
    let inbound = a.receive();

    let socket = UdpSocket::bind("127.0.0.1:0").await.expect("bind raw socket");
    let frame = serialize_frame(FrameKind::Data, b"0123456789").expect("frame");
    socket
        .send_to(&frame[..12], a.addr().as_str())
        .await
        .expect("send truncated");
    socket
        .send_to(&serialize_frame(FrameKind::Data, b"whole").expect("frame"), a.addr().as_str())
        .await
        .expect("send whole");

    let report = next(&inbound).await;
    assert!(report.payload.is_empty());
    assert_eq!(
        report.error,
        Some(ConnectionError::Wire(WireError::InsufficientData {
            needed: frame.len(),
            have: 12,
        }))
    );
    assert_eq!(
        report.from,
        Address::from(socket.local_addr().expect("local addr"))
    );

    let datagram = next(&inbound).await;
    assert_eq!(datagram.payload, b"whole");
    assert!(datagram.error.is_none());

    a.close().await.expect("close a");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_invalid_hello_is_reported_in_band() {
    init_tracing();
    let a = started(quiet_config()).await;
    let inbound = a.receive();

    let mut stream = TcpStream::connect(a.addr().as_str())
        .await
        .expect("connect");
    let hello = serialize_frame(FrameKind::Hello, &[0xFF, 0xFE, 0xFD]).expect("frame");
    stream.write_all(&hello).await.expect("write hello");
    let valid = serialize_frame(FrameKind::Data, b"after").expect("frame");
    stream.write_all(&valid).await.expect("write valid");

    let report = next(&inbound).await;
    assert!(report.payload.is_empty());
    assert_eq!(
        report.error,
        Some(ConnectionError::Wire(WireError::InvalidHello))
    );

    let datagram = next(&inbound).await;
    assert_eq!(datagram.payload, b"after");
    assert_eq!(
        datagram.from,
        Address::from(stream.local_addr().expect("local addr"))
    );

    a.close().await.expect("close a");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_dial_refused_is_not_pooled() {
    init_tracing();
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let target = Address::from(listener.local_addr().expect("local addr"));
    drop(listener);

    let b = Communication::bind(CommunicationConfig::local())
        .await
        .expect("bind b");
    let result = b.send(&target, b"nobody home").await;
    assert!(
        matches!(
            result,
            Err(CommunicationError::Transport(TransportError::Io(_)))
        ),
        "{result:?}"
    );
    assert_eq!(b.idle_connections(&target).await, 0);

    b.close().await.expect("close b");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_failed_write_drops_pooled_connection() {
    init_tracing();
    let a = started(quiet_config()).await;
    let b = Communication::bind(quiet_config()).await.expect("bind b");
    let target = a.addr().clone();

    b.send(&target, b"first").await.expect("send");
    next_data(&a.receive()).await;
    assert_eq!(b.idle_connections(&target).await, 1);
    a.close().await.expect("close a");

    // The peer's socket is gone; writes start failing once the reset arrives.
    let mut failure = None;
    for _ in 0..100 {
        if let Err(e) = b.send(&target, b"again").await {
            failure = Some(e);
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let failure = failure.expect("a write eventually fails");
    assert!(
        matches!(failure, CommunicationError::Connection(_)),
        "{failure:?}"
    );
    assert_eq!(b.idle_connections(&target).await, 0);

    b.close().await.expect("close b");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_read_deadline_reports_timeout() {
    init_tracing();
    let a = started(CommunicationConfig::local().with_timeout(Duration::from_millis(50))).await;
    let inbound = a.receive();

    let _idle = TcpStream::connect(a.addr().as_str())
        .await
        .expect("connect");
    let report = next(&inbound).await;
    assert!(matches!(report.error, Some(ConnectionError::TimedOut(_))));

    a.close().await.expect("close a");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_datagram_round_trip() {
    init_tracing();
    let config = || {
        quiet_config()
            .with_network(NetworkKind::Datagram)
            .with_pool_size(2)
    };
    let a = started(config()).await;
    let b = Communication::bind(config()).await.expect("bind b");

    b.send(a.addr(), b"over udp").await.expect("send");
    let datagram = next_data(&a.receive()).await;
    assert_eq!(datagram.payload, b"over udp");
    assert_eq!(&datagram.from, b.addr());
    assert_eq!(&datagram.to, a.addr());

    b.close().await.expect("close b");
    a.close().await.expect("close a");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_wrong_scheme_is_rejected_on_send() {
    init_tracing();
    let b = Communication::bind(quiet_config()).await.expect("bind b");
    let result = b.send(&Address::new("udp://127.0.0.1:9"), b"x").await;
    assert!(matches!(result, Err(CommunicationError::Transport(_))));
    b.close().await.expect("close b");
}
