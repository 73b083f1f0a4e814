//! Bounded event queue between the driver and the policy engine.

use heapless::Deque;

/// FIFO queue for up to `N` items with a single producer and a single
/// consumer on the same thread.
///
/// When the queue is full, further pushes are silently dropped. That is
/// acceptable for the events travelling through it: a lost state change
/// is recovered from the driver's published state on the next poll, and a
/// lost message is retransmitted by the source.
pub struct EventQueue<T, const N: usize> {
    items: Deque<T, N>,
}

impl<T, const N: usize> EventQueue<T, N> {
    pub const fn new() -> Self {
        Self {
            items: Deque::new(),
        }
    }

    /// Enqueues an item; drops it if the queue is full.
    pub fn push(&mut self, item: T) {
        let _ = self.items.push_back(item);
    }

    /// Removes and returns the oldest item.
    pub fn pop(&mut self) -> Option<T> {
        self.items.pop_front()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn clear(&mut self) {
        self.items.clear()
    }
}

impl<T, const N: usize> Default for EventQueue<T, N> {
    fn default() -> Self {
        Self::new()
    }
}
