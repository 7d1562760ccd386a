//! TCP transport
//!
//! The publisher binds its own address and accepts peers. A peer's
//! subscriber connects and sends control frames to join or leave topics;
//! the publisher forwards only matching frames.
//!
//! ```text
//! data frame    (publisher -> subscriber): [u32 len][topic][u32 len][payload]
//! control frame (subscriber -> publisher): [u8 op][u32 len][topic]
//! ```
//!
//! Each peer has a bounded outbound queue; when it is full the frame is
//! dropped for that peer only.

use async_trait::async_trait;
use dashmap::DashMap;
use log::{debug, info, warn};
use parking_lot::RwLock;
use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;

use super::{WireMessage, WirePublisher, WireSubscriber, topic_matches};
use crate::error::TransportError;

const OP_JOIN: u8 = 1;
const OP_LEAVE: u8 = 2;

/// Upper bound for one frame part
const MAX_PART_LEN: usize = 16 * 1024 * 1024;

async fn write_part<W: AsyncWrite + Unpin>(writer: &mut W, bytes: &[u8]) -> Result<(), TransportError> {
    if bytes.len() > MAX_PART_LEN {
        return Err(TransportError::FrameTooLarge(bytes.len()));
    }
    writer.write_u32(bytes.len() as u32).await?;
    writer.write_all(bytes).await?;
    Ok(())
}

async fn read_part<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Vec<u8>, TransportError> {
    let len = reader.read_u32().await? as usize;
    if len > MAX_PART_LEN {
        return Err(TransportError::FrameTooLarge(len));
    }
    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf).await?;
    Ok(buf)
}

async fn read_topic<R: AsyncRead + Unpin>(reader: &mut R) -> Result<String, TransportError> {
    String::from_utf8(read_part(reader).await?)
        .map_err(|e| TransportError::Connection(format!("topic is not utf-8: {}", e)))
}

async fn write_frame<W: AsyncWrite + Unpin>(writer: &mut W, message: &WireMessage) -> Result<(), TransportError> {
    write_part(writer, message.topic.as_bytes()).await?;
    write_part(writer, &message.payload).await?;
    writer.flush().await?;
    Ok(())
}

async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> Result<WireMessage, TransportError> {
    let topic = read_topic(reader).await?;
    let payload = read_part(reader).await?;
    Ok(WireMessage { topic, payload })
}

// ============================================================================
// Publisher
// ============================================================================

struct Peer {
    addr: SocketAddr,
    topics: Arc<RwLock<HashSet<String>>>,
    tx: mpsc::Sender<WireMessage>,
    control: JoinHandle<()>,
}

impl Drop for Peer {
    fn drop(&mut self) {
        self.control.abort();
    }
}

type PeerTable = Arc<DashMap<u64, Peer>>;

pub struct TcpPublisher {
    local_addr: SocketAddr,
    peers: PeerTable,
    accept: JoinHandle<()>,
}

impl TcpPublisher {
    /// Bind `address` and start accepting peers
    pub async fn bind(address: &str, peer_queue_size: usize) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(address).await?;
        let local_addr = listener.local_addr()?;
        let peers: PeerTable = Arc::new(DashMap::new());
        let accept = tokio::spawn(accept_loop(
            listener,
            Arc::clone(&peers),
            peer_queue_size.max(1),
        ));
        info!("[WIRE] publishing on {}", local_addr);
        Ok(Self {
            local_addr,
            peers,
            accept,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    /// Connected peers that would receive a frame on `topic`
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.peers
            .iter()
            .filter(|peer| {
                peer.topics
                    .read()
                    .iter()
                    .any(|joined| topic_matches(joined, topic))
            })
            .count()
    }
}

impl Drop for TcpPublisher {
    fn drop(&mut self) {
        self.accept.abort();
        self.peers.clear();
    }
}

async fn accept_loop(listener: TcpListener, peers: PeerTable, queue_size: usize) {
    let next_id = AtomicU64::new(1);
    loop {
        let (stream, addr) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                warn!("[WIRE] accept failed: {}", e);
                continue;
            }
        };
        let _ = stream.set_nodelay(true);
        let id = next_id.fetch_add(1, Ordering::Relaxed);
        let (reader, writer) = stream.into_split();
        let (tx, rx) = mpsc::channel(queue_size);
        let topics = Arc::new(RwLock::new(HashSet::new()));

        tokio::spawn(peer_writer(id, writer, rx, Arc::clone(&peers)));
        let control = tokio::spawn(peer_control(
            id,
            reader,
            Arc::clone(&topics),
            Arc::clone(&peers),
        ));
        peers.insert(
            id,
            Peer {
                addr,
                topics,
                tx,
                control,
            },
        );
        info!("[WIRE] peer {} connected from {}", id, addr);
    }
}

async fn peer_writer(
    id: u64,
    mut writer: OwnedWriteHalf,
    mut rx: mpsc::Receiver<WireMessage>,
    peers: PeerTable,
) {
    while let Some(message) = rx.recv().await {
        if let Err(e) = write_frame(&mut writer, &message).await {
            warn!("[WIRE] peer {} write failed: {}", id, e);
            break;
        }
    }
    peers.remove(&id);
}

async fn peer_control(
    id: u64,
    mut reader: OwnedReadHalf,
    topics: Arc<RwLock<HashSet<String>>>,
    peers: PeerTable,
) {
    loop {
        let op = match reader.read_u8().await {
            Ok(op) => op,
            Err(_) => break,
        };
        let topic = match read_topic(&mut reader).await {
            Ok(topic) => topic,
            Err(e) => {
                warn!("[WIRE] peer {} sent a bad control frame: {}", id, e);
                break;
            }
        };
        match op {
            OP_JOIN => {
                debug!("[WIRE] peer {} joined {}", id, topic);
                topics.write().insert(topic);
            }
            OP_LEAVE => {
                debug!("[WIRE] peer {} left {}", id, topic);
                topics.write().remove(&topic);
            }
            other => {
                warn!("[WIRE] peer {} sent unknown op {}", id, other);
                break;
            }
        }
    }
    if let Some((_, peer)) = peers.remove(&id) {
        info!("[WIRE] peer {} ({}) disconnected", id, peer.addr);
    }
}

#[async_trait]
impl WirePublisher for TcpPublisher {
    async fn send(&self, message: WireMessage) -> Result<(), TransportError> {
        for peer in self.peers.iter() {
            let wanted = peer
                .topics
                .read()
                .iter()
                .any(|joined| topic_matches(joined, &message.topic));
            if !wanted {
                continue;
            }
            match peer.tx.try_send(message.clone()) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!(
                        "[WIRE] peer {} queue full, dropping {}",
                        peer.key(),
                        message.topic
                    );
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    debug!("[WIRE] peer {} closed", peer.key());
                }
            }
        }
        Ok(())
    }
}

// ============================================================================
// Subscriber
// ============================================================================

pub struct TcpSubscriber {
    peer_addr: SocketAddr,
    writer: Mutex<OwnedWriteHalf>,
    rx: Mutex<mpsc::Receiver<WireMessage>>,
    reader: JoinHandle<()>,
}

impl TcpSubscriber {
    /// Connect to a peer's publisher
    pub async fn connect(address: &str, inbound_queue_size: usize) -> Result<Self, TransportError> {
        let stream = TcpStream::connect(address).await?;
        let _ = stream.set_nodelay(true);
        let peer_addr = stream.peer_addr()?;
        let (reader, writer) = stream.into_split();
        let (tx, rx) = mpsc::channel(inbound_queue_size.max(1));
        let reader = tokio::spawn(subscriber_reader(peer_addr, reader, tx));
        info!("[WIRE] subscribed to {}", peer_addr);
        Ok(Self {
            peer_addr,
            writer: Mutex::new(writer),
            rx: Mutex::new(rx),
            reader,
        })
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    async fn control(&self, op: u8, topic: &str) -> Result<(), TransportError> {
        let mut writer = self.writer.lock().await;
        writer.write_u8(op).await?;
        write_part(&mut *writer, topic.as_bytes()).await?;
        writer.flush().await?;
        Ok(())
    }
}

impl Drop for TcpSubscriber {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

async fn subscriber_reader(
    peer_addr: SocketAddr,
    mut reader: OwnedReadHalf,
    tx: mpsc::Sender<WireMessage>,
) {
    loop {
        match read_frame(&mut reader).await {
            Ok(message) => match tx.try_send(message) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(message)) => {
                    warn!("[WIRE] inbound queue full, dropping {}", message.topic);
                }
                Err(mpsc::error::TrySendError::Closed(_)) => break,
            },
            Err(e) => {
                info!("[WIRE] connection to {} closed: {}", peer_addr, e);
                break;
            }
        }
    }
}

#[async_trait]
impl WireSubscriber for TcpSubscriber {
    async fn join(&self, topic: &str) -> Result<(), TransportError> {
        self.control(OP_JOIN, topic)
            .await
            .map_err(|e| TransportError::Subscribe(e.to_string()))
    }

    async fn leave(&self, topic: &str) -> Result<(), TransportError> {
        self.control(OP_LEAVE, topic)
            .await
            .map_err(|e| TransportError::Subscribe(e.to_string()))
    }

    async fn next(&self) -> Option<WireMessage> {
        self.rx.lock().await.recv().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    async fn wait_for<F: Fn() -> bool>(condition: F) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !condition() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("condition not reached");
    }

    #[tokio::test]
    async fn test_frames_follow_joined_topics() {
        let publisher = TcpPublisher::bind("127.0.0.1:0", 64).await.unwrap();
        let addr = publisher.local_addr().to_string();
        let subscriber = TcpSubscriber::connect(&addr, 64).await.unwrap();

        subscriber.join("order.updated").await.unwrap();
        wait_for(|| publisher.subscriber_count("order.updated") == 1).await;

        for topic in ["market.tick", "order.updated.s1", "order.updated.s2"] {
            publisher
                .send(WireMessage {
                    topic: topic.to_string(),
                    payload: vec![1, 2, 3],
                })
                .await
                .unwrap();
        }

        let first = subscriber.next().await.unwrap();
        let second = subscriber.next().await.unwrap();
        assert_eq!(first.topic, "order.updated.s1");
        assert_eq!(second.topic, "order.updated.s2");
        assert_eq!(second.payload, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_leave_stops_forwarding() {
        let publisher = TcpPublisher::bind("127.0.0.1:0", 64).await.unwrap();
        let addr = publisher.local_addr().to_string();
        let subscriber = TcpSubscriber::connect(&addr, 64).await.unwrap();

        subscriber.join("x").await.unwrap();
        wait_for(|| publisher.subscriber_count("x") == 1).await;
        subscriber.leave("x").await.unwrap();
        wait_for(|| publisher.subscriber_count("x") == 0).await;
        assert_eq!(publisher.peer_count(), 1);
    }

    #[tokio::test]
    async fn test_oversized_frame_is_refused() {
        let mut sink = Vec::new();
        let message = WireMessage {
            topic: "big".to_string(),
            payload: vec![0u8; MAX_PART_LEN + 1],
        };
        assert!(matches!(
            write_frame(&mut sink, &message).await,
            Err(TransportError::FrameTooLarge(_))
        ));
    }
}
