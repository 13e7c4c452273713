//! Growable circular buffer backing [`SingleConsumerQueue`](super::SingleConsumerQueue).
//!
//! The buffer is only ever touched while the owning queue's mutex is held.

/// Circular buffer that grows in fixed buckets and never shrinks.
#[derive(Debug)]
pub(crate) struct RingBuffer<T> {
    slots: Box<[Option<T>]>,
    first: usize,
    len: usize,
    bucket_size: usize,
}

impl<T> RingBuffer<T> {
    pub(crate) fn new(capacity: usize, bucket_size: usize) -> Self {
        Self {
            slots: empty_slots(capacity),
            first: 0,
            len: 0,
            bucket_size: bucket_size.max(1),
        }
    }

    pub(crate) fn len(&self) -> usize { self.len }

    pub(crate) fn is_empty(&self) -> bool { self.len == 0 }

    pub(crate) fn capacity(&self) -> usize { self.slots.len() }

    pub(crate) fn push_back(&mut self, item: T) {
        if self.len == self.capacity() {
            self.grow();
        }
        let index = (self.first + self.len) % self.capacity();
        self.slots[index] = Some(item);
        self.len += 1;
    }

    pub(crate) fn pop_front(&mut self) -> Option<T> {
        if self.len == 0 {
            return None;
        }
        let item = self.slots[self.first].take();
        self.first = (self.first + 1) % self.capacity();
        self.len -= 1;
        item
    }

    /// Keep only the items matching `keep`, compacting them to the front in
    /// their original order.
    pub(crate) fn retain(&mut self, mut keep: impl FnMut(&T) -> bool) {
        let capacity = self.capacity();
        let mut kept = 0;
        for step in 0..self.len {
            let index = (self.first + step) % capacity;
            let Some(item) = self.slots[index].take() else {
                continue;
            };
            if keep(&item) {
                // Compacted slots always trail the read position, so the
                // destination is already vacant.
                let target = (self.first + kept) % capacity;
                self.slots[target] = Some(item);
                kept += 1;
            }
        }
        self.len = kept;
    }

    /// Drop the backing store, returning its pending items in order.
    pub(crate) fn release(&mut self) -> Vec<T> {
        let mut items = Vec::with_capacity(self.len);
        while let Some(item) = self.pop_front() {
            items.push(item);
        }
        self.slots = empty_slots(0);
        self.first = 0;
        items
    }

    /// Reallocate to `capacity + bucket_size`, laying out the current
    /// contents linearly: the slice from `first` to the end, then the
    /// wrapped-around slice, with `first` reset to zero.
    fn grow(&mut self) {
        let capacity = self.capacity();
        let mut grown = empty_slots(capacity + self.bucket_size);
        let (wrapped, head) = self.slots.split_at_mut(self.first);
        for (target, slot) in grown
            .iter_mut()
            .zip(head.iter_mut().chain(wrapped.iter_mut()))
            .take(self.len)
        {
            *target = slot.take();
        }
        self.slots = grown;
        self.first = 0;
    }

    #[cfg(test)]
    pub(crate) fn first(&self) -> usize { self.first }
}

fn empty_slots<T>(capacity: usize) -> Box<[Option<T>]> {
    std::iter::repeat_with(|| None).take(capacity).collect()
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::RingBuffer;

    fn drain(ring: &mut RingBuffer<u32>) -> Vec<u32> {
        std::iter::from_fn(|| ring.pop_front()).collect()
    }

    #[rstest]
    fn grows_by_bucket_and_keeps_order_across_wrap() {
        let mut ring = RingBuffer::new(4, 3);
        for i in 0..4 {
            ring.push_back(i);
        }
        assert_eq!(ring.pop_front(), Some(0));
        assert_eq!(ring.pop_front(), Some(1));
        ring.push_back(4);
        ring.push_back(5);
        assert_eq!(ring.first(), 2);

        ring.push_back(6);
        assert_eq!(ring.capacity(), 7);
        assert_eq!(ring.first(), 0);
        assert_eq!(drain(&mut ring), vec![2, 3, 4, 5, 6]);
    }

    #[rstest]
    #[case::from_empty(0)]
    #[case::from_one(1)]
    fn grows_from_tiny_capacities(#[case] capacity: usize) {
        let mut ring = RingBuffer::new(capacity, 1);
        for i in 0..10 {
            ring.push_back(i);
        }
        assert_eq!(ring.capacity(), 10);
        assert_eq!(drain(&mut ring), (0..10).collect::<Vec<_>>());
    }

    #[rstest]
    fn retain_compacts_in_order_when_wrapped() {
        let mut ring = RingBuffer::new(5, 5);
        for i in 0..5 {
            ring.push_back(i);
        }
        ring.pop_front();
        ring.pop_front();
        ring.push_back(5);
        ring.push_back(6);
        ring.retain(|item| item % 2 == 0);
        assert_eq!(ring.len(), 3);
        assert_eq!(drain(&mut ring), vec![2, 4, 6]);
    }

    #[rstest]
    fn release_returns_pending_and_frees_store() {
        let mut ring = RingBuffer::new(2, 2);
        ring.push_back(1);
        ring.push_back(2);
        ring.push_back(3);
        assert_eq!(ring.release(), vec![1, 2, 3]);
        assert_eq!(ring.capacity(), 0);
        assert!(ring.is_empty());
    }
}
