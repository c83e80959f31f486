//! FIFO of pending requests
//!
//! Storage is a fixed-capacity [`heapless::Deque`], so the queue never
//! allocates and a full queue is reported to the submitter instead of
//! dropping anything.

use heapless::Deque;

/// Ordered queue with a capacity of `N` items.
pub struct TransferQueue<T, const N: usize> {
    items: Deque<T, N>,
}

impl<T, const N: usize> Default for TransferQueue<T, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, const N: usize> TransferQueue<T, N> {
    /// An empty queue.
    pub const fn new() -> Self {
        Self {
            items: Deque::new(),
        }
    }

    /// Appends `item` to the tail. Gives it back if the queue is full.
    pub fn enqueue(&mut self, item: T) -> Result<(), T> {
        self.items.push_back(item)
    }

    /// Removes and returns the head.
    pub fn dequeue_next(&mut self) -> Option<T> {
        self.items.pop_front()
    }

    /// Removes the first item matching `pred`, keeping the others in order.
    pub fn remove_first(&mut self, mut pred: impl FnMut(&T) -> bool) -> Option<T> {
        let mut found = None;
        for _ in 0..self.items.len() {
            let Some(item) = self.items.pop_front() else {
                break;
            };
            if found.is_none() && pred(&item) {
                found = Some(item);
            } else {
                // cannot fail, pop_front just freed a slot
                let _ = self.items.push_back(item);
            }
        }
        found
    }

    /// Finds the first item matching `pred`.
    pub fn find(&self, mut pred: impl FnMut(&T) -> bool) -> Option<&T> {
        self.items.iter().find(|item| pred(item))
    }

    /// Number of queued items.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Whether another item would be rejected.
    pub fn is_full(&self) -> bool {
        self.items.is_full()
    }

    /// Maximum number of queued items.
    pub const fn capacity(&self) -> usize {
        N
    }
}
