//! Bounded priority queue feeding a bus worker
//!
//! Entries pop in `(priority, sequence)` order, so events of equal priority
//! come out in push order. Pushing never waits: a full queue hands the event
//! back to the caller.

use parking_lot::Mutex;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use tokio::sync::Notify;

use crate::event::Event;

/// What a worker receives
#[derive(Debug)]
pub enum QueueItem {
    Event(Event),
    /// Poison pill: the worker exits after everything queued before it
    Stop,
}

struct Entry {
    rank: u8,
    seq: u64,
    item: QueueItem,
}

impl Entry {
    fn key(&self) -> (u8, u64) {
        (self.rank, self.seq)
    }
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    // BinaryHeap is a max-heap; invert so the smallest key pops first
    fn cmp(&self, other: &Self) -> Ordering {
        other.key().cmp(&self.key())
    }
}

struct Inner {
    heap: BinaryHeap<Entry>,
    seq: u64,
    /// Queued events, not counting poison pills
    events: usize,
}

pub struct BoundedQueue {
    capacity: usize,
    inner: Mutex<Inner>,
    notify: Notify,
}

// Sorts after every event priority
const STOP_RANK: u8 = u8::MAX;

impl BoundedQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            inner: Mutex::new(Inner {
                heap: BinaryHeap::with_capacity(capacity.min(1024)),
                seq: 0,
                events: 0,
            }),
            notify: Notify::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Enqueue an event, or give it back if the queue is full
    pub fn push(&self, event: Event) -> Result<(), Event> {
        {
            let mut inner = self.inner.lock();
            if inner.events >= self.capacity {
                return Err(event);
            }
            inner.events += 1;
            inner.seq += 1;
            let seq = inner.seq;
            inner.heap.push(Entry {
                rank: event.priority() as u8,
                seq,
                item: QueueItem::Event(event),
            });
        }
        self.notify.notify_one();
        Ok(())
    }

    /// Enqueue the poison pill behind everything already queued.
    /// Bypasses the capacity limit.
    pub fn push_stop(&self) {
        {
            let mut inner = self.inner.lock();
            inner.seq += 1;
            let seq = inner.seq;
            inner.heap.push(Entry {
                rank: STOP_RANK,
                seq,
                item: QueueItem::Stop,
            });
        }
        self.notify.notify_one();
    }

    pub fn try_pop(&self) -> Option<QueueItem> {
        let mut inner = self.inner.lock();
        let entry = inner.heap.pop()?;
        if let QueueItem::Event(_) = entry.item {
            inner.events -= 1;
        }
        Some(entry.item)
    }

    /// Wait for the next item. Single consumer.
    pub async fn pop(&self) -> QueueItem {
        loop {
            if let Some(item) = self.try_pop() {
                return item;
            }
            self.notify.notified().await;
        }
    }

    /// Number of queued events
    pub fn len(&self) -> usize {
        self.inner.lock().events
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventPayload;

    fn names(queue: &BoundedQueue) -> Vec<String> {
        let mut out = Vec::new();
        while let Some(item) = queue.try_pop() {
            match item {
                QueueItem::Event(event) => out.push(event.event_type().to_string()),
                QueueItem::Stop => out.push("STOP".to_string()),
            }
        }
        out
    }

    #[test]
    fn test_fifo_within_priority() {
        let queue = BoundedQueue::new(10);
        for name in ["a", "b", "c"] {
            queue.push(Event::custom(name, "")).unwrap();
        }
        assert_eq!(names(&queue), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_priority_before_fifo() {
        let queue = BoundedQueue::new(10);
        queue.push(Event::new(EventPayload::Timer)).unwrap();
        queue.push(Event::custom("normal", "")).unwrap();
        assert_eq!(names(&queue), vec!["normal", "timer"]);
    }

    #[test]
    fn test_full_queue_returns_event() {
        let queue = BoundedQueue::new(1);
        queue.push(Event::custom("a", "")).unwrap();
        let rejected = queue.push(Event::custom("b", "")).unwrap_err();
        assert_eq!(rejected.event_type(), "b");
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_stop_goes_last_and_ignores_capacity() {
        let queue = BoundedQueue::new(1);
        queue.push(Event::new(EventPayload::Timer)).unwrap();
        queue.push_stop();
        assert_eq!(names(&queue), vec!["timer", "STOP"]);
    }
}
