//! Distributed bus integration tests
//!
//! Two "processes" are modelled as two local buses joined by a transport.

use async_trait::async_trait;
use hermes_bus::{
    BusConfig, DistributedEventBus, Event, EventBus, EventPayload, MemoryHub, MemorySubscriber,
    TcpPublisher, TcpSubscriber, TransportError, WireMessage, WirePublisher, WireSubscriber,
    handler,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

fn local_bus(name: &str) -> Arc<EventBus> {
    let bus = EventBus::new(
        name,
        BusConfig {
            timer_interval_ms: 0,
            ..Default::default()
        },
    );
    bus.start();
    bus
}

fn body(event: &Event) -> String {
    match event.payload() {
        EventPayload::Custom(custom) => custom.body.clone(),
        _ => event.event_type().to_string(),
    }
}

/// Forwards received event bodies into a channel
fn channel_handler() -> (hermes_bus::Handler, mpsc::UnboundedReceiver<String>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let h = handler(move |event| {
        let _ = tx.send(body(event));
        Ok(())
    });
    (h, rx)
}

async fn recv(rx: &mut mpsc::UnboundedReceiver<String>) -> String {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for event")
        .expect("channel closed")
}

/// Memory subscriber that counts join/leave calls
struct CountingSubscriber {
    inner: MemorySubscriber,
    joins: AtomicUsize,
    leaves: AtomicUsize,
}

#[async_trait]
impl WireSubscriber for CountingSubscriber {
    async fn join(&self, topic: &str) -> Result<(), TransportError> {
        self.joins.fetch_add(1, Ordering::SeqCst);
        self.inner.join(topic).await
    }

    async fn leave(&self, topic: &str) -> Result<(), TransportError> {
        self.leaves.fetch_add(1, Ordering::SeqCst);
        self.inner.leave(topic).await
    }

    async fn next(&self) -> Option<WireMessage> {
        self.inner.next().await
    }
}

#[tokio::test]
async fn test_topic_join_and_leave_follow_refcount() {
    let _ = env_logger::try_init();

    let hub = MemoryHub::new(64);
    let subscriber = Arc::new(CountingSubscriber {
        inner: hub.subscriber(),
        joins: AtomicUsize::new(0),
        leaves: AtomicUsize::new(0),
    });
    let dbus = DistributedEventBus::new(
        local_bus("b"),
        Arc::new(hub.publisher()),
        Arc::clone(&subscriber) as Arc<dyn WireSubscriber>,
    );

    let (h1, _rx1) = channel_handler();
    let (h2, _rx2) = channel_handler();
    let first = dbus.subscribe("order.updated", h1).await.unwrap();
    let second = dbus.subscribe("order.updated", h2).await.unwrap();

    assert_eq!(dbus.topic_refcount("order.updated").await, 2);
    assert_eq!(subscriber.joins.load(Ordering::SeqCst), 1);

    dbus.unsubscribe(first).await.unwrap();
    assert_eq!(subscriber.leaves.load(Ordering::SeqCst), 0);
    dbus.unsubscribe(second).await.unwrap();
    assert_eq!(subscriber.leaves.load(Ordering::SeqCst), 1);
    assert_eq!(dbus.topic_refcount("order.updated").await, 0);
}

#[tokio::test]
async fn test_memory_round_trip_and_bad_frames_dropped() {
    let _ = env_logger::try_init();

    let hub = MemoryHub::new(64);
    let raw = hub.publisher();
    let sender = DistributedEventBus::new(
        local_bus("a"),
        Arc::new(hub.publisher()),
        Arc::new(hub.subscriber()),
    );
    let receiver = DistributedEventBus::new(
        local_bus("b"),
        Arc::new(hub.publisher()),
        Arc::new(hub.subscriber()),
    );
    receiver.start();

    let (h, mut rx) = channel_handler();
    receiver.subscribe("signal", h).await.unwrap();

    // Undecodable frame on a joined topic: logged and dropped
    raw.send(WireMessage {
        topic: "signal".to_string(),
        payload: vec![1, 2, 3],
    })
    .await
    .unwrap();
    assert!(sender.publish(&Event::custom("signal", "first")).await);
    assert!(sender.publish(&Event::custom("noise", "ignored")).await);
    assert!(sender.publish(&Event::custom("signal", "second").routed("s1")).await);

    assert_eq!(recv(&mut rx).await, "first");
    assert_eq!(recv(&mut rx).await, "second");
}

#[tokio::test]
async fn test_relay_forwards_local_events_once() {
    let _ = env_logger::try_init();

    let hub = MemoryHub::new(64);
    let bus_a = local_bus("a");
    let a = DistributedEventBus::new(
        Arc::clone(&bus_a),
        Arc::new(hub.publisher()),
        Arc::new(hub.subscriber()),
    );
    let b = DistributedEventBus::new(
        local_bus("b"),
        Arc::new(hub.publisher()),
        Arc::new(hub.subscriber()),
    );
    a.relay(vec!["order.updated".to_string()], 16);
    b.start();

    let (h, mut rx) = channel_handler();
    b.subscribe("order.updated", h).await.unwrap();

    bus_a.publish(
        Event::custom("order.updated", "via relay"),
        hermes_bus::DispatchMode::Sync,
    );
    bus_a.publish(
        Event::custom("market.tick", "not relayed"),
        hermes_bus::DispatchMode::Sync,
    );

    assert_eq!(recv(&mut rx).await, "via relay");
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn test_tcp_end_to_end_preserves_topic_order() {
    let _ = env_logger::try_init();

    let publisher = Arc::new(TcpPublisher::bind("127.0.0.1:0", 1024).await.unwrap());
    let address = publisher.local_addr().to_string();
    let subscriber = Arc::new(TcpSubscriber::connect(&address, 1024).await.unwrap());

    let sender = DistributedEventBus::new(
        local_bus("a"),
        Arc::clone(&publisher) as Arc<dyn WirePublisher>,
        Arc::new(MemoryHub::new(1).subscriber()),
    );
    let receiver = DistributedEventBus::new(
        local_bus("b"),
        Arc::new(MemoryHub::new(1).publisher()),
        subscriber,
    );
    receiver.start();

    let (h, mut rx) = channel_handler();
    receiver.subscribe("X", h).await.unwrap();

    tokio::time::timeout(Duration::from_secs(5), async {
        while publisher.subscriber_count("X") == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("join never reached the publisher");

    for i in 0..100 {
        sender.publish(&Event::custom("X", i.to_string())).await;
    }
    for i in 0..100 {
        assert_eq!(recv(&mut rx).await, i.to_string());
    }
}
