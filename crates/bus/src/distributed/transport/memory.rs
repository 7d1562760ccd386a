//! In-process transport
//!
//! A broadcast hub stands in for the network: every subscriber sees every
//! frame and keeps the ones matching its joined topics. A lagging
//! subscriber loses frames, as a slow network peer would.

use async_trait::async_trait;
use log::warn;
use parking_lot::RwLock;
use std::collections::HashSet;
use tokio::sync::{Mutex, broadcast};

use super::{WireMessage, WirePublisher, WireSubscriber, topic_matches};
use crate::error::TransportError;

/// Shared medium connecting memory publishers and subscribers
#[derive(Clone)]
pub struct MemoryHub {
    tx: broadcast::Sender<WireMessage>,
}

impl MemoryHub {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn publisher(&self) -> MemoryPublisher {
        MemoryPublisher {
            tx: self.tx.clone(),
        }
    }

    pub fn subscriber(&self) -> MemorySubscriber {
        MemorySubscriber {
            topics: RwLock::new(HashSet::new()),
            rx: Mutex::new(self.tx.subscribe()),
            _tx: self.tx.clone(),
        }
    }
}

pub struct MemoryPublisher {
    tx: broadcast::Sender<WireMessage>,
}

#[async_trait]
impl WirePublisher for MemoryPublisher {
    async fn send(&self, message: WireMessage) -> Result<(), TransportError> {
        // No receivers is not an error: nobody is listening yet
        let _ = self.tx.send(message);
        Ok(())
    }
}

pub struct MemorySubscriber {
    topics: RwLock<HashSet<String>>,
    rx: Mutex<broadcast::Receiver<WireMessage>>,
    // Keep sender alive to prevent channel from closing
    _tx: broadcast::Sender<WireMessage>,
}

impl MemorySubscriber {
    fn wants(&self, topic: &str) -> bool {
        self.topics
            .read()
            .iter()
            .any(|joined| topic_matches(joined, topic))
    }
}

#[async_trait]
impl WireSubscriber for MemorySubscriber {
    async fn join(&self, topic: &str) -> Result<(), TransportError> {
        self.topics.write().insert(topic.to_string());
        Ok(())
    }

    async fn leave(&self, topic: &str) -> Result<(), TransportError> {
        self.topics.write().remove(topic);
        Ok(())
    }

    async fn next(&self) -> Option<WireMessage> {
        let mut rx = self.rx.lock().await;
        loop {
            match rx.recv().await {
                Ok(message) if self.wants(&message.topic) => return Some(message),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    warn!("[WIRE] memory subscriber lagged, {} frames lost", missed);
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(topic: &str) -> WireMessage {
        WireMessage {
            topic: topic.to_string(),
            payload: topic.as_bytes().to_vec(),
        }
    }

    #[tokio::test]
    async fn test_only_joined_topics_arrive() {
        let hub = MemoryHub::new(16);
        let publisher = hub.publisher();
        let subscriber = hub.subscriber();
        subscriber.join("order.updated").await.unwrap();

        publisher.send(frame("market.tick")).await.unwrap();
        publisher.send(frame("order.updated.s1")).await.unwrap();

        let received = subscriber.next().await.unwrap();
        assert_eq!(received.topic, "order.updated.s1");
    }

    #[tokio::test]
    async fn test_left_topic_is_filtered() {
        let hub = MemoryHub::new(16);
        let publisher = hub.publisher();
        let subscriber = hub.subscriber();
        subscriber.join("a").await.unwrap();
        subscriber.join("b").await.unwrap();
        subscriber.leave("a").await.unwrap();

        publisher.send(frame("a")).await.unwrap();
        publisher.send(frame("b")).await.unwrap();

        assert_eq!(subscriber.next().await.unwrap().topic, "b");
    }
}
