//! Fixed-capacity ring buffer.
//!
//! The buffer performs no synchronization of its own. The decode worker and the
//! output callback share it through the mutex in [`AudioBuffer`](super::AudioBuffer).

use cadence_core::{Error, Result};

/// Fixed-capacity FIFO queue backed by a circular slice.
///
/// Storage is allocated once at construction; `push` and `pop` never allocate,
/// which makes the buffer usable from a real-time audio callback.
#[derive(Debug)]
pub struct RingBuffer<T> {
    /// The underlying storage.
    elements: Box<[T]>,
    /// Index of the oldest element.
    head: usize,
    /// Number of stored elements.
    len: usize,
}

impl<T: Default> RingBuffer<T> {
    /// Create a ring buffer holding at most `capacity` elements.
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(Error::InvalidArgument(
                "ring buffer capacity must be greater than 0".to_string(),
            ));
        }

        let elements = std::iter::repeat_with(T::default)
            .take(capacity)
            .collect::<Box<[T]>>();

        Ok(Self {
            elements,
            head: 0,
            len: 0,
        })
    }

    /// Append an element at the tail.
    pub fn push(&mut self, element: T) -> Result<()> {
        if self.is_full() {
            return Err(Error::QueueOverflow {
                capacity: self.capacity(),
            });
        }

        let tail = (self.head + self.len) % self.capacity();
        self.elements[tail] = element;
        self.len += 1;
        Ok(())
    }

    /// Remove and return the element at the head.
    pub fn pop(&mut self) -> Result<T> {
        if self.is_empty() {
            return Err(Error::QueueUnderflow);
        }

        let element = std::mem::take(&mut self.elements[self.head]);
        self.head = (self.head + 1) % self.capacity();
        self.len -= 1;
        Ok(element)
    }
}

impl<T> RingBuffer<T> {
    /// Borrow the element at the head without removing it.
    pub fn front(&self) -> Result<&T> {
        if self.is_empty() {
            return Err(Error::QueueUnderflow);
        }
        Ok(&self.elements[self.head])
    }

    /// Number of stored elements.
    pub const fn size(&self) -> usize {
        self.len
    }

    /// Maximum number of elements.
    pub fn capacity(&self) -> usize {
        self.elements.len()
    }

    /// Number of elements that can still be pushed.
    pub fn free(&self) -> usize {
        self.capacity() - self.len
    }

    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_full(&self) -> bool {
        self.len == self.capacity()
    }

    /// Drop all elements, keeping the storage.
    pub fn clear(&mut self) {
        self.head = 0;
        self.len = 0;
    }
}
