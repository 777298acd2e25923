//! TCP transport over the loopback interface

use edgestream::element::{Sink, Source};
use edgestream::types::Buffer;
use edgestream::{Edge, EdgeConfig, LifecycleState, SubscriberAdapter, TcpTransport};
use futures::StreamExt;
use std::sync::Arc;
use std::time::{Duration, Instant};

const TIMEOUT: Duration = Duration::from_secs(5);

fn wait_for(mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + TIMEOUT;
    while !condition() {
        assert!(Instant::now() < deadline, "condition not reached within {TIMEOUT:?}");
        std::thread::sleep(Duration::from_millis(10));
    }
}

#[tokio::test]
async fn frames_and_caps_cross_a_socket() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let mut publisher = Edge::publish(EdgeConfig::new("127.0.0.1", 0)).unwrap();
    let port = publisher.local_port().expect("bound port");
    assert_ne!(port, 0);
    publisher.negotiate("video/x-raw,width=640").unwrap();

    let subscriber = Edge::subscribe(EdgeConfig::new("127.0.0.1", port)).unwrap();
    assert_eq!(subscriber.state(), LifecycleState::Connected);

    // Caps arrive once the publisher has registered the subscriber.
    wait_for(|| subscriber.caps().is_some());
    assert_eq!(subscriber.caps().as_deref(), Some("video/x-raw,width=640"));

    publisher.negotiate("video/x-raw,width=1280").unwrap();
    wait_for(|| subscriber.caps().as_deref() == Some("video/x-raw,width=1280"));
    assert_eq!(subscriber.caps_history().len(), 2);

    let mut frames = Box::pin(subscriber.frames());
    for i in 0..10u8 {
        let buffer = Buffer::new().with_memory(vec![i; 4]).with_memory(vec![i; 8]);
        publisher.accept(&buffer).unwrap();
    }

    for i in 0..10u8 {
        let buffer = tokio::time::timeout(TIMEOUT, frames.next())
            .await
            .expect("frame within timeout")
            .expect("stream still open");
        assert_eq!(buffer.n_memory(), 2);
        assert_eq!(buffer.to_vec(), vec![i; 12]);
    }
    assert_eq!(publisher.stats().frames, 10);

    subscriber.stop();
    assert_eq!(subscriber.state(), LifecycleState::Closed);
    assert!(frames.next().await.is_none());
}

#[test]
fn blocking_produce_over_tcp() {
    let mut publisher = Edge::publish(EdgeConfig::new("127.0.0.1", 0)).unwrap();
    publisher.negotiate("application/octet-stream").unwrap();
    let port = publisher.local_port().unwrap();

    let subscriber = Edge::subscribe(EdgeConfig::new("127.0.0.1", port)).unwrap();
    wait_for(|| subscriber.caps().is_some());

    publisher.accept(&Buffer::from_slice(b"hello edge")).unwrap();
    assert_eq!(subscriber.produce().unwrap().to_vec(), b"hello edge");

    publisher.stop();
    subscriber.stop();
}

#[test]
fn oversized_accept_fails_without_breaking_the_stream() {
    let mut publisher = Edge::publish(EdgeConfig::new("127.0.0.1", 0)).unwrap();
    publisher.negotiate("application/octet-stream").unwrap();
    let port = publisher.local_port().unwrap();

    let subscriber = Edge::subscribe(EdgeConfig::new("127.0.0.1", port)).unwrap();
    wait_for(|| subscriber.caps().is_some());

    // Nine shared 32 MiB blocks push the message past the wire limit
    let block: Arc<[u8]> = vec![0u8; 32 * 1024 * 1024].into();
    let oversized = (0..9).fold(Buffer::new(), |b, _| b.with_memory(Arc::clone(&block)));
    let err = publisher.accept(&oversized).unwrap_err();
    assert!(matches!(err, edgestream::EdgeError::SendFailed { .. }));
    assert_eq!(publisher.stats().frames, 0);

    publisher.accept(&Buffer::from_slice(b"still flowing")).unwrap();
    assert_eq!(subscriber.produce().unwrap().to_vec(), b"still flowing");
    assert_eq!(subscriber.state(), LifecycleState::Connected);

    publisher.stop();
    subscriber.stop();
}

#[test]
fn unreachable_publisher_fails_start() {
    let port = {
        let probe = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        probe.local_addr().unwrap().port()
    };

    let subscriber = SubscriberAdapter::new(TcpTransport::new(), EdgeConfig::new("127.0.0.1", port));
    let err = subscriber.start().unwrap_err();
    assert!(matches!(err, edgestream::EdgeError::StartFailed { .. }));
    assert_eq!(subscriber.state(), LifecycleState::Closed);
}
