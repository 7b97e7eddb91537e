//! Thread-safe FIFO queue with a single-slot "has elements" notification.
//!
//! Items are kept in a `VecDeque` behind a read/write lock: [`Queue::peek`]
//! and [`Queue::len`] take the read side, [`Queue::append`] and
//! [`Queue::pop`] the write side. Each append stores one wake-up permit in a
//! [`Notify`], so a consumer that checks emptiness and then awaits
//! [`Queue::notified`] never misses an append that raced with the check.

use std::collections::VecDeque;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tokio::sync::Notify;

/// Ordered buffer of pending items.
#[derive(Debug)]
pub struct Queue<T> {
    items: RwLock<VecDeque<T>>,
    has_elements: Notify,
}

impl<T> Queue<T> {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self {
            items: RwLock::new(VecDeque::new()),
            has_elements: Notify::new(),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, VecDeque<T>> {
        self.items.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, VecDeque<T>> {
        self.items.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert an item at the tail and signal waiters.
    pub fn append(&self, item: T) {
        self.write().push_back(item);
        self.has_elements.notify_one();
    }

    /// Remove and return the head, `None` if empty.
    pub fn pop(&self) -> Option<T> {
        self.write().pop_front()
    }

    /// Number of buffered items.
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// Whether the queue holds no items.
    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Drop every buffered item, returning how many were discarded.
    pub fn clear(&self) -> usize {
        let mut items = self.write();
        let discarded = items.len();
        items.clear();
        discarded
    }

    /// Wait until an item has been appended since the last wake-up.
    ///
    /// Wake-ups can be stale (the item may already be popped), so callers
    /// re-check the queue after this resolves.
    pub async fn notified(&self) {
        self.has_elements.notified().await;
    }
}

impl<T: Clone> Queue<T> {
    /// Copy of the head without removing it, `None` if empty.
    pub fn peek(&self) -> Option<T> {
        self.read().front().cloned()
    }
}

impl<T> Default for Queue<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_fifo_order() {
        let queue = Queue::new();
        for i in 0..1000 {
            queue.append(i);
        }

        let mut expected = 0;
        while let Some(item) = queue.pop() {
            assert_eq!(item, expected);
            expected += 1;
        }
        assert_eq!(expected, 1000);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_peek_does_not_remove() {
        let queue = Queue::new();
        assert_eq!(queue.peek(), None::<u32>);

        queue.append(7u32);
        queue.append(8u32);
        assert_eq!(queue.peek(), Some(7));
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.pop(), Some(7));
        assert_eq!(queue.peek(), Some(8));
    }

    #[test]
    fn test_clear_reports_discarded() {
        let queue = Queue::new();
        queue.append("a");
        queue.append("b");
        assert_eq!(queue.clear(), 2);
        assert!(queue.pop().is_none());
    }

    #[tokio::test]
    async fn test_notified_after_append() {
        let queue = Arc::new(Queue::new());

        let waiter = {
            let queue = queue.clone();
            tokio::spawn(async move {
                queue.notified().await;
                queue.pop()
            })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        queue.append(42u8);

        let popped = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter never woke")
            .expect("waiter panicked");
        assert_eq!(popped, Some(42));
    }

    #[tokio::test]
    async fn test_append_before_wait_is_not_lost() {
        let queue = Queue::new();
        queue.append(1u8);

        tokio::time::timeout(Duration::from_millis(100), queue.notified())
            .await
            .expect("stored permit should resolve immediately");
    }
}
