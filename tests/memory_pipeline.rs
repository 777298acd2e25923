//! End-to-end publisher to subscriber tests over the in-memory transport

use edgestream::element::{Sink, Source};
use edgestream::types::{Buffer, FlowReturn};
use edgestream::{
    EdgeConfig, EdgeError, EdgeEvent, FrameItem, LifecycleState, MemoryTransport, PublisherAdapter,
    SubscriberAdapter,
};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn pair(port: u16) -> (MemoryTransport, PublisherAdapter<MemoryTransport>, SubscriberAdapter<MemoryTransport>) {
    let transport = MemoryTransport::new();
    let config = EdgeConfig::new("127.0.0.1", port);
    let mut publisher = PublisherAdapter::new(transport.clone(), config.clone().with_id("pub"));
    publisher.start().expect("publisher should start");
    let subscriber = SubscriberAdapter::new(transport.clone(), config.with_id("sub"));
    (transport, publisher, subscriber)
}

#[test]
fn buffers_cross_from_publisher_to_subscriber() {
    let (_transport, mut publisher, subscriber) = pair(5000);
    subscriber.start().unwrap();
    assert_eq!(subscriber.state(), LifecycleState::Connected);

    let buffer = Buffer::new().with_memory(vec![0xAAu8; 4]).with_memory(vec![0xBBu8; 8]);
    publisher.accept(&buffer).unwrap();

    let received = subscriber.produce().unwrap();
    assert_eq!(received.size(), 12);
    assert_eq!(received.n_memory(), 2);
    assert_eq!(received.memory(0), Some(&[0xAAu8; 4][..]));
    assert_eq!(received.memory(1), Some(&[0xBBu8; 8][..]));
}

#[test]
fn renegotiated_caps_accumulate_for_late_subscribers() {
    let (_transport, mut publisher, subscriber) = pair(5000);

    publisher.negotiate("video/x-raw,width=640").unwrap();
    publisher.negotiate("video/x-raw,width=1280").unwrap();

    subscriber.start().unwrap();
    let history = subscriber.caps_history();
    assert_eq!(
        history.iter().collect::<Vec<_>>(),
        ["video/x-raw,width=640", "video/x-raw,width=1280"]
    );
    assert_eq!(subscriber.caps().as_deref(), Some("video/x-raw,width=1280"));
    assert_eq!(publisher.caps_history(), history);
}

#[test]
fn frames_keep_order_per_sender() {
    let (transport, _publisher, subscriber) = pair(5000);
    subscriber.start().unwrap();

    let senders: Vec<_> = (0..4u8)
        .map(|sender| {
            let transport = transport.clone();
            thread::spawn(move || {
                for seq in 0..50u8 {
                    transport
                        .deliver(EdgeEvent::NewDataReceived(FrameItem::from_segments([vec![sender, seq]])));
                }
            })
        })
        .collect();
    for sender in senders {
        sender.join().unwrap();
    }

    let mut next = [0u8; 4];
    for _ in 0..200 {
        let bytes = subscriber.produce().unwrap().to_vec();
        let (sender, seq) = (bytes[0] as usize, bytes[1]);
        assert_eq!(seq, next[sender]);
        next[sender] += 1;
    }
    assert_eq!(next, [50; 4]);
    assert_eq!(subscriber.stats().frames, 200);
}

#[test]
fn stop_from_another_thread_flushes_a_blocked_pull() {
    let (_transport, _publisher, subscriber) = pair(5000);
    let subscriber = Arc::new(subscriber);
    subscriber.start().unwrap();

    let puller = {
        let subscriber = Arc::clone(&subscriber);
        thread::spawn(move || subscriber.produce_flow())
    };
    thread::sleep(Duration::from_millis(50));
    subscriber.stop();

    let (flow, buffer) = puller.join().unwrap();
    assert_eq!(flow, FlowReturn::Flushing);
    assert!(buffer.is_none());
}

#[test]
fn publisher_restart_drops_old_subscribers() {
    let (transport, mut publisher, subscriber) = pair(5000);
    subscriber.start().unwrap();

    publisher.stop();
    publisher.start().unwrap();
    publisher.accept(&Buffer::from_slice(b"after restart")).unwrap();

    assert_eq!(subscriber.queued(), 0);
    assert_eq!(transport.live_handles(), 2);
}

#[test]
fn subscriber_without_publisher_fails_to_start() {
    let transport = MemoryTransport::new();
    let subscriber = SubscriberAdapter::new(transport.clone(), EdgeConfig::new("127.0.0.1", 5000));

    match subscriber.start() {
        Err(EdgeError::StartFailed { .. }) => {}
        other => panic!("Expected StartFailed, got {other:?}"),
    }
    assert_eq!(transport.live_handles(), 0);

    // Stopping after a failed start is still harmless
    subscriber.stop();
    assert_eq!(subscriber.state(), LifecycleState::Closed);
}
