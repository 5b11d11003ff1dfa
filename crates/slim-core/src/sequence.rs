#![forbid(unsafe_code)]

//! Observable ordered sequences.
//!
//! [`ObservableSequence<T>`] wraps a `Vec<T>` behind a shared handle and
//! exposes the seven structural mutators a repeater cares about: `push`,
//! `pop`, `shift`, `unshift`, `splice`, `sort`/`sort_by` and `reverse`.
//! Each mutator applies its change and then requests a render from every
//! registered [`RenderTicket`].
//!
//! # Invariants
//!
//! 1. Observers are a set keyed by [`RepeaterId`]: registering twice is a
//!    no-op, unregistering an absent observer is a no-op.
//! 2. Notification happens after the mutation is applied and after the
//!    internal borrow is released, so observers may read the sequence.
//! 3. Reads (`get`, `len`, `snapshot`, `with`) never notify.
//!
//! # Example
//!
//! ```
//! use slim_core::schedule::{RepeaterId, TaskQueue};
//! use slim_core::sequence::ObservableSequence;
//!
//! let queue = TaskQueue::new();
//! let items = ObservableSequence::from(vec![1, 2]);
//! items.register(queue.ticket(RepeaterId::new(0)));
//!
//! items.push(3);
//! items.push(4);
//! assert_eq!(items.len(), 4);
//! assert_eq!(queue.len(), 1); // coalesced
//! ```

use std::cell::RefCell;
use std::cmp::Ordering;
use std::fmt;
use std::rc::Rc;

use crate::schedule::{RenderTicket, RepeaterId};

struct SequenceInner<T> {
    items: Vec<T>,
    observers: Vec<RenderTicket>,
}

/// Shared, observable, ordered container.
///
/// Cloning the handle shares the underlying storage.
pub struct ObservableSequence<T> {
    inner: Rc<RefCell<SequenceInner<T>>>,
}

impl<T> Clone for ObservableSequence<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T> Default for ObservableSequence<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> ObservableSequence<T> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Rc::new(RefCell::new(SequenceInner {
                items: Vec::new(),
                observers: Vec::new(),
            })),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.borrow().items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.borrow().items.is_empty()
    }

    /// Run `f` against the current items without notifying.
    pub fn with<R>(&self, f: impl FnOnce(&[T]) -> R) -> R {
        f(&self.inner.borrow().items)
    }

    /// Whether two handles share storage.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Address of the shared storage, stable while any handle lives.
    pub(crate) fn addr(&self) -> usize {
        Rc::as_ptr(&self.inner).cast::<()>() as usize
    }

    // --- observers ---------------------------------------------------------

    /// Add a render observer. Idempotent per repeater id.
    pub fn register(&self, ticket: RenderTicket) {
        let mut inner = self.inner.borrow_mut();
        if inner.observers.iter().all(|t| t.id() != ticket.id()) {
            inner.observers.push(ticket);
        }
    }

    /// Remove a render observer. No-op when absent.
    pub fn unregister(&self, id: RepeaterId) {
        self.inner.borrow_mut().observers.retain(|t| t.id() != id);
    }

    #[must_use]
    pub fn is_registered(&self, id: RepeaterId) -> bool {
        self.inner.borrow().observers.iter().any(|t| t.id() == id)
    }

    #[must_use]
    pub fn observer_count(&self) -> usize {
        self.inner.borrow().observers.len()
    }

    fn notify(&self) {
        let observers = self.inner.borrow().observers.clone();
        #[cfg(feature = "tracing")]
        tracing::trace!(observers = observers.len(), "sequence mutated");
        for ticket in &observers {
            ticket.request();
        }
    }

    fn mutate<R>(&self, f: impl FnOnce(&mut Vec<T>) -> R) -> R {
        let result = f(&mut self.inner.borrow_mut().items);
        self.notify();
        result
    }

    // --- structural mutators -----------------------------------------------

    /// Append to the end.
    pub fn push(&self, item: T) {
        self.mutate(|items| items.push(item));
    }

    /// Remove from the end.
    pub fn pop(&self) -> Option<T> {
        self.mutate(Vec::pop)
    }

    /// Remove from the front.
    pub fn shift(&self) -> Option<T> {
        self.mutate(|items| (!items.is_empty()).then(|| items.remove(0)))
    }

    /// Insert at the front.
    pub fn unshift(&self, item: T) {
        self.mutate(|items| items.insert(0, item));
    }

    /// Remove `delete_count` items at `start` and insert `insert` there.
    ///
    /// `start` and `delete_count` are clamped to the current length.
    /// Returns the removed items.
    pub fn splice(
        &self,
        start: usize,
        delete_count: usize,
        insert: impl IntoIterator<Item = T>,
    ) -> Vec<T> {
        self.mutate(|items| {
            let start = start.min(items.len());
            let end = start.saturating_add(delete_count).min(items.len());
            items.splice(start..end, insert).collect()
        })
    }

    /// Stable sort with a comparator.
    pub fn sort_by(&self, compare: impl FnMut(&T, &T) -> Ordering) {
        self.mutate(|items| items.sort_by(compare));
    }

    /// Reverse in place.
    pub fn reverse(&self) {
        self.mutate(|items| items.reverse());
    }
}

impl<T: Ord> ObservableSequence<T> {
    /// Stable sort by natural order.
    pub fn sort(&self) {
        self.mutate(|items| items.sort());
    }
}

impl<T: Clone> ObservableSequence<T> {
    /// Item at `index`, cloned.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<T> {
        self.inner.borrow().items.get(index).cloned()
    }

    /// Copy of the current items.
    #[must_use]
    pub fn snapshot(&self) -> Vec<T> {
        self.inner.borrow().items.clone()
    }
}

impl<T> From<Vec<T>> for ObservableSequence<T> {
    fn from(items: Vec<T>) -> Self {
        Self {
            inner: Rc::new(RefCell::new(SequenceInner {
                items,
                observers: Vec::new(),
            })),
        }
    }
}

impl<T> FromIterator<T> for ObservableSequence<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self::from(iter.into_iter().collect::<Vec<_>>())
    }
}

impl<T: fmt::Debug> fmt::Debug for ObservableSequence<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("ObservableSequence")
            .field("items", &inner.items)
            .field("observers", &inner.observers.len())
            .finish()
    }
}
