//! Waker-notified FIFO queue shared between a producer task and a consumer.
//!
//! The queue is the hand-off point between a transport-driven producer and
//! an application consumer. The producer never suspends: when a bounded
//! queue is full, the oldest buffered item is displaced to make room, so a
//! slow consumer can never back-pressure the receive path of unrelated
//! endpoints.
//!
//! Single-threaded: interior mutability via `RefCell`, notification via
//! explicit `Waker` registration.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll, Waker};

/// FIFO queue with async notification and an optional capacity bound.
///
/// - `push` is non-blocking; on overflow it returns the displaced oldest
///   item, on a closed queue it returns the rejected item itself.
/// - `recv` suspends until an item is available and resolves to `None`
///   once the queue is closed and drained.
pub struct NotifiedQueue<T> {
    inner: RefCell<NotifiedQueueInner<T>>,
    capacity: Option<usize>,
}

struct NotifiedQueueInner<T> {
    items: VecDeque<T>,
    wakers: Vec<Waker>,
    closed: bool,
    items_accepted: u64,
    items_displaced: u64,
}

impl<T> NotifiedQueue<T> {
    /// Create a queue with no capacity bound.
    pub fn unbounded() -> Self {
        Self {
            inner: RefCell::new(NotifiedQueueInner::new()),
            capacity: None,
        }
    }

    /// Create a queue holding at most `capacity` items (must be non-zero).
    pub fn bounded(capacity: usize) -> Self {
        debug_assert!(capacity > 0, "a bounded queue needs room for one item");
        Self {
            inner: RefCell::new(NotifiedQueueInner::new()),
            capacity: Some(capacity.max(1)),
        }
    }

    /// The capacity bound, if any.
    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    /// Append an item and wake all waiting consumers.
    ///
    /// Returns `None` when the item was accepted without displacement.
    /// Returns `Some(oldest)` when the queue was full and the oldest
    /// buffered item had to make room, and `Some(item)` (the input itself)
    /// when the queue is closed and rejected it.
    pub fn push(&self, item: T) -> Option<T> {
        let mut inner = self.inner.borrow_mut();
        if inner.closed {
            return Some(item);
        }

        let displaced = match self.capacity {
            Some(capacity) if inner.items.len() >= capacity => {
                inner.items_displaced += 1;
                inner.items.pop_front()
            }
            _ => None,
        };

        inner.items.push_back(item);
        inner.items_accepted += 1;
        for waker in inner.wakers.drain(..) {
            waker.wake();
        }
        displaced
    }

    /// Take the next item without suspending.
    pub fn try_recv(&self) -> Option<T> {
        self.inner.borrow_mut().items.pop_front()
    }

    /// Wait for the next item.
    ///
    /// Resolves to `None` once the queue is closed and empty.
    pub fn recv(&self) -> RecvFuture<'_, T> {
        RecvFuture { queue: self }
    }

    /// Close the queue and wake all waiting consumers.
    ///
    /// Items still buffered remain receivable; new pushes are rejected.
    pub fn close(&self) {
        let mut inner = self.inner.borrow_mut();
        inner.closed = true;
        for waker in inner.wakers.drain(..) {
            waker.wake();
        }
    }

    /// Whether the queue has been closed.
    pub fn is_closed(&self) -> bool {
        self.inner.borrow().closed
    }

    /// Number of items currently buffered.
    pub fn len(&self) -> usize {
        self.inner.borrow().items.len()
    }

    /// Whether no items are buffered.
    pub fn is_empty(&self) -> bool {
        self.inner.borrow().items.is_empty()
    }

    /// Total number of items accepted since creation.
    pub fn items_accepted(&self) -> u64 {
        self.inner.borrow().items_accepted
    }

    /// Total number of buffered items displaced by overflow.
    pub fn items_displaced(&self) -> u64 {
        self.inner.borrow().items_displaced
    }
}

impl<T> NotifiedQueueInner<T> {
    fn new() -> Self {
        Self {
            items: VecDeque::new(),
            wakers: Vec::new(),
            closed: false,
            items_accepted: 0,
            items_displaced: 0,
        }
    }
}

/// Future returned by [`NotifiedQueue::recv`].
pub struct RecvFuture<'a, T> {
    queue: &'a NotifiedQueue<T>,
}

impl<T> Future for RecvFuture<'_, T> {
    type Output = Option<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut inner = self.queue.inner.borrow_mut();

        if let Some(item) = inner.items.pop_front() {
            return Poll::Ready(Some(item));
        }

        if inner.closed {
            return Poll::Ready(None);
        }

        inner.wakers.push(cx.waker().clone());
        Poll::Pending
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use super::*;

    #[test]
    fn test_fifo_order() {
        let queue = NotifiedQueue::unbounded();
        assert!(queue.push(1).is_none());
        assert!(queue.push(2).is_none());
        assert!(queue.push(3).is_none());

        assert_eq!(queue.try_recv(), Some(1));
        assert_eq!(queue.try_recv(), Some(2));
        assert_eq!(queue.try_recv(), Some(3));
        assert_eq!(queue.try_recv(), None);
    }

    #[test]
    fn test_bounded_displaces_oldest() {
        let queue = NotifiedQueue::bounded(2);
        assert!(queue.push("a").is_none());
        assert!(queue.push("b").is_none());
        assert_eq!(queue.push("c"), Some("a"));
        assert_eq!(queue.push("d"), Some("b"));

        assert_eq!(queue.len(), 2);
        assert_eq!(queue.items_displaced(), 2);
        assert_eq!(queue.try_recv(), Some("c"));
        assert_eq!(queue.try_recv(), Some("d"));
    }

    #[test]
    fn test_never_exceeds_capacity() {
        let queue = NotifiedQueue::bounded(4);
        for i in 0..100 {
            queue.push(i);
            assert!(queue.len() <= 4);
        }
        // The four newest items survive, in order.
        assert_eq!(queue.try_recv(), Some(96));
        assert_eq!(queue.try_recv(), Some(97));
        assert_eq!(queue.try_recv(), Some(98));
        assert_eq!(queue.try_recv(), Some(99));
    }

    #[test]
    fn test_closed_queue_rejects_pushes() {
        let queue = NotifiedQueue::unbounded();
        queue.push(1);
        queue.close();

        assert_eq!(queue.push(2), Some(2));
        // Buffered items remain receivable after close.
        assert_eq!(queue.try_recv(), Some(1));
        assert_eq!(queue.try_recv(), None);
    }

    #[tokio::test]
    async fn test_recv_resolves_on_push() {
        let queue = Rc::new(NotifiedQueue::unbounded());
        queue.push(41);
        assert_eq!(queue.recv().await, Some(41));
    }

    #[tokio::test]
    async fn test_recv_wakes_on_push_from_task() {
        let local = tokio::task::LocalSet::new();
        local
            .run_until(async {
                let queue = Rc::new(NotifiedQueue::unbounded());
                let producer = queue.clone();
                tokio::task::spawn_local(async move {
                    tokio::task::yield_now().await;
                    producer.push(7);
                });
                assert_eq!(queue.recv().await, Some(7));
            })
            .await;
    }

    #[tokio::test]
    async fn test_recv_returns_none_after_close() {
        let queue: NotifiedQueue<u8> = NotifiedQueue::unbounded();
        queue.close();
        assert_eq!(queue.recv().await, None);
    }

    #[tokio::test]
    async fn test_close_wakes_pending_recv() {
        let local = tokio::task::LocalSet::new();
        local
            .run_until(async {
                let queue: Rc<NotifiedQueue<u8>> = Rc::new(NotifiedQueue::unbounded());
                let closer = queue.clone();
                tokio::task::spawn_local(async move {
                    tokio::task::yield_now().await;
                    closer.close();
                });
                assert_eq!(queue.recv().await, None);
            })
            .await;
    }
}
