//! Bounded per-session outbound queue.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Notify;

use super::events::OutboundEvent;

/// Why a queue was closed. The session loop turns this into a close frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// Teardown after the client went away.
    Disconnect,
    /// Overflow on a non-droppable event.
    SlowConsumer,
    /// Server is shutting down.
    Shutdown,
}

/// Error returned by a failed enqueue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueError {
    /// Queue is full and the event is non-droppable.
    Overflow,
    /// Queue was already closed.
    Closed,
}

struct QueueInner {
    items: VecDeque<Arc<OutboundEvent>>,
    closed: Option<CloseReason>,
    dropped: u64,
}

/// Bounded FIFO between the dispatcher and one session's writer.
///
/// Producers never block. On overflow a droppable event evicts the oldest
/// droppable queued event, or is itself shed when nothing queued is
/// droppable; a non-droppable event surfaces `Overflow` so the caller can
/// close the session as a slow consumer.
pub struct OutboundQueue {
    inner: Mutex<QueueInner>,
    notify: Notify,
    capacity: usize,
}

impl OutboundQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(QueueInner {
                items: VecDeque::new(),
                closed: None,
                dropped: 0,
            }),
            notify: Notify::new(),
            capacity,
        }
    }

    /// Non-blocking enqueue. Wakes the consumer on success.
    pub fn push(&self, event: Arc<OutboundEvent>) -> Result<(), EnqueueError> {
        {
            let mut inner = self.inner.lock();
            if inner.closed.is_some() {
                return Err(EnqueueError::Closed);
            }
            if inner.items.len() >= self.capacity {
                if !event.event.is_droppable() {
                    return Err(EnqueueError::Overflow);
                }
                inner.dropped += 1;
                match inner.items.iter().position(|e| e.event.is_droppable()) {
                    Some(index) => {
                        inner.items.remove(index);
                    }
                    // Everything queued must be delivered, so the incoming
                    // event is the one shed.
                    None => return Ok(()),
                }
            }
            inner.items.push_back(event);
        }
        self.notify.notify_one();
        Ok(())
    }

    /// Wait for the next event.
    ///
    /// Returns `None` once the queue is closed; events still queued at that
    /// point are discarded. Meant for a single consumer, and safe to poll
    /// inside `select!` because the queue is re-checked on every call.
    pub async fn pop(&self) -> Option<Arc<OutboundEvent>> {
        loop {
            {
                let mut inner = self.inner.lock();
                if inner.closed.is_some() {
                    return None;
                }
                if let Some(event) = inner.items.pop_front() {
                    return Some(event);
                }
            }
            self.notify.notified().await;
        }
    }

    /// Close the queue and wake the consumer. The first reason wins; returns
    /// false if the queue was already closed.
    pub fn close(&self, reason: CloseReason) -> bool {
        {
            let mut inner = self.inner.lock();
            if inner.closed.is_some() {
                return false;
            }
            inner.closed = Some(reason);
        }
        self.notify.notify_one();
        true
    }

    pub fn close_reason(&self) -> Option<CloseReason> {
        self.inner.lock().closed
    }

    pub fn len(&self) -> usize {
        self.inner.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Events shed under backpressure so far.
    pub fn dropped(&self) -> u64 {
        self.inner.lock().dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::events::{Event, MessagePayload, OutboundEvent, RoomId, TypingPayload};
    use std::time::Duration;

    fn message(content: &str) -> Arc<OutboundEvent> {
        Arc::new(OutboundEvent {
            room: Some(RoomId::channel("ch_1")),
            event: Event::MessageCreate(MessagePayload {
                id: "msg_1".to_string(),
                channel_id: "ch_1".to_string(),
                author_id: "usr_1".to_string(),
                content: content.to_string(),
                created_at: chrono::Utc::now(),
            }),
        })
    }

    fn typing(user: &str) -> Arc<OutboundEvent> {
        Arc::new(OutboundEvent {
            room: Some(RoomId::channel("ch_1")),
            event: Event::TypingStart(TypingPayload {
                channel_id: "ch_1".to_string(),
                user_id: user.to_string(),
            }),
        })
    }

    fn content_of(event: &OutboundEvent) -> String {
        match &event.event {
            Event::MessageCreate(p) => p.content.clone(),
            other => panic!("expected message, got {}", other.name()),
        }
    }

    #[tokio::test]
    async fn test_fifo_order() {
        let queue = OutboundQueue::new(8);
        queue.push(message("a")).unwrap();
        queue.push(message("b")).unwrap();

        assert_eq!(content_of(&queue.pop().await.unwrap()), "a");
        assert_eq!(content_of(&queue.pop().await.unwrap()), "b");
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_pop_waits_for_push() {
        let queue = Arc::new(OutboundQueue::new(8));
        let consumer = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.pop().await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        queue.push(message("late")).unwrap();

        let event = consumer.await.unwrap().unwrap();
        assert_eq!(content_of(&event), "late");
    }

    #[tokio::test]
    async fn test_overflow_on_non_droppable() {
        let queue = OutboundQueue::new(2);
        queue.push(message("a")).unwrap();
        queue.push(message("b")).unwrap();

        assert_eq!(queue.push(message("c")), Err(EnqueueError::Overflow));
        assert_eq!(queue.len(), 2);
    }

    #[tokio::test]
    async fn test_droppable_evicts_oldest_droppable() {
        let queue = OutboundQueue::new(3);
        queue.push(typing("usr_1")).unwrap();
        queue.push(message("keep")).unwrap();
        queue.push(typing("usr_2")).unwrap();

        // usr_1's indicator goes, the message stays put.
        queue.push(typing("usr_3")).unwrap();
        assert_eq!(queue.len(), 3);
        assert_eq!(queue.dropped(), 1);

        assert_eq!(content_of(&queue.pop().await.unwrap()), "keep");
        match &queue.pop().await.unwrap().event {
            Event::TypingStart(p) => assert_eq!(p.user_id, "usr_2"),
            other => panic!("unexpected event {}", other.name()),
        }
    }

    #[tokio::test]
    async fn test_incoming_droppable_shed_when_queue_all_non_droppable() {
        let queue = OutboundQueue::new(2);
        queue.push(message("a")).unwrap();
        queue.push(message("b")).unwrap();

        // Silently shed; the publisher never fails on a droppable event.
        assert_eq!(queue.push(typing("usr_1")), Ok(()));
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.dropped(), 1);
        assert_eq!(content_of(&queue.pop().await.unwrap()), "a");
    }

    #[tokio::test]
    async fn test_close_wakes_consumer() {
        let queue = Arc::new(OutboundQueue::new(8));
        let consumer = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.pop().await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(queue.close(CloseReason::Shutdown));

        assert!(consumer.await.unwrap().is_none());
        assert_eq!(queue.close_reason(), Some(CloseReason::Shutdown));
    }

    #[tokio::test]
    async fn test_push_after_close() {
        let queue = OutboundQueue::new(8);
        queue.close(CloseReason::Disconnect);
        assert_eq!(queue.push(message("a")), Err(EnqueueError::Closed));
    }

    #[tokio::test]
    async fn test_first_close_reason_wins() {
        let queue = OutboundQueue::new(8);
        assert!(queue.close(CloseReason::SlowConsumer));
        assert!(!queue.close(CloseReason::Disconnect));
        assert_eq!(queue.close_reason(), Some(CloseReason::SlowConsumer));
    }
}
