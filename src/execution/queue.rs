//! Admission queue: FIFO with a single urgent slot ahead
//!
//! A pure data structure; blocking and backpressure are the route's concern.
//! Urgent insertion appends the item and swaps it with the current front, so
//! it is the next one dequeued. That gives at-most-one-ahead priority, not a
//! full priority queue.

/// Ordered collection of pending work with amortized O(1) front removal.
///
/// Consumed front slots are retired in batches: the backing vector is
/// compacted in one pass once consumed slots outnumber live ones, instead of
/// shifting elements on every `pop`.
pub struct AdmissionQueue<T> {
    slots: Vec<Option<T>>,
    head: usize,
}

impl<T> AdmissionQueue<T> {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            head: 0,
        }
    }

    /// Number of items waiting in the queue.
    pub fn len(&self) -> usize {
        self.slots.len() - self.head
    }

    pub fn is_empty(&self) -> bool {
        self.head == self.slots.len()
    }

    /// Append to the back.
    pub fn push(&mut self, item: T) {
        self.slots.push(Some(item));
    }

    /// Append to the back, then swap with the current front so the item is
    /// dequeued next. The previous front takes the new item's place at the
    /// back.
    pub fn push_urgent(&mut self, item: T) {
        self.slots.push(Some(item));
        if self.len() > 1 {
            let last = self.slots.len() - 1;
            self.slots.swap(self.head, last);
        }
    }

    /// Remove and return the front item, or `None` when empty.
    pub fn pop(&mut self) -> Option<T> {
        let item = self.slots.get_mut(self.head)?.take()?;
        self.head += 1;
        if self.head * 2 > self.slots.len() {
            self.slots.drain(..self.head);
            self.head = 0;
        }
        Some(item)
    }

    /// Read the front item without removing it.
    pub fn peek(&self) -> Option<&T> {
        self.slots.get(self.head)?.as_ref()
    }
}

impl<T> Default for AdmissionQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}
