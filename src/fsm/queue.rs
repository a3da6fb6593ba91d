//! Bounded event queue shared between interrupt and task context.
//!
//! Producers (radio receive callback, other modules' tasks) push through
//! `&self`; the owning machine's dispatch task pops.  Every access runs
//! inside a global critical section.

use core::cell::RefCell;

use critical_section::Mutex;
use heapless::Deque;

/// FIFO of pending events with a fixed capacity of `N`.
pub struct EventQueue<E, const N: usize> {
    inner: Mutex<RefCell<Deque<E, N>>>,
}

impl<E, const N: usize> Default for EventQueue<E, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E, const N: usize> EventQueue<E, N> {
    pub const fn new() -> Self {
        Self {
            inner: Mutex::new(RefCell::new(Deque::new())),
        }
    }

    /// Append an event.  Hands the event back when the queue is full.
    pub fn push(&self, event: E) -> Result<(), E> {
        critical_section::with(|cs| self.inner.borrow_ref_mut(cs).push_back(event))
    }

    /// Take the oldest event.
    pub fn pop(&self) -> Option<E> {
        critical_section::with(|cs| self.inner.borrow_ref_mut(cs).pop_front())
    }

    pub fn len(&self) -> usize {
        critical_section::with(|cs| self.inner.borrow_ref(cs).len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
