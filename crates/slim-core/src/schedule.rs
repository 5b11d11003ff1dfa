#![forbid(unsafe_code)]

//! Deferred render scheduling.
//!
//! Repeaters never render synchronously in response to a mutation. A
//! mutation *requests* a render through the repeater's [`RenderTicket`];
//! the request is queued on a shared [`TaskQueue`] and executed on the next
//! turn of the owning runtime.
//!
//! # Invariants
//!
//! 1. A ticket is queued at most once while its request is pending; further
//!    requests are no-ops until the runtime checks the ticket out.
//! 2. The queue preserves request order across repeaters.
//! 3. Tickets hold the queue weakly: a ticket that outlives its runtime
//!    silently drops requests.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt;
use std::rc::{Rc, Weak};

/// Identifier of a repeater within one runtime.
///
/// Table slots are reused once a repeater is disposed; the generation
/// tells a stale id apart from the slot's current occupant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RepeaterId {
    index: u32,
    generation: u32,
}

impl RepeaterId {
    #[must_use]
    pub const fn new(index: u32) -> Self {
        Self::with_generation(index, 0)
    }

    #[must_use]
    pub const fn with_generation(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    /// Position of the repeater in its runtime's table.
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self.index as usize
    }

    #[inline]
    #[must_use]
    pub const fn generation(self) -> u32 {
        self.generation
    }
}

impl fmt::Display for RepeaterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.generation == 0 {
            write!(f, "repeater#{}", self.index)
        } else {
            write!(f, "repeater#{}@{}", self.index, self.generation)
        }
    }
}

/// FIFO of repeaters awaiting a render pass.
#[derive(Clone, Default)]
pub struct TaskQueue {
    tasks: Rc<RefCell<VecDeque<RepeaterId>>>,
}

impl TaskQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue a ticket for `id` bound to this queue.
    #[must_use]
    pub fn ticket(&self, id: RepeaterId) -> RenderTicket {
        RenderTicket {
            id,
            pending: Rc::new(Cell::new(false)),
            queue: Rc::downgrade(&self.tasks),
        }
    }

    /// Take every task queued so far, leaving the queue empty.
    ///
    /// Tasks queued while the returned batch is processed belong to the
    /// next turn.
    #[must_use]
    pub fn drain(&self) -> Vec<RepeaterId> {
        self.tasks.borrow_mut().drain(..).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tasks.borrow().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.borrow().is_empty()
    }
}

impl fmt::Debug for TaskQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskQueue")
            .field("queued", &self.len())
            .finish()
    }
}

/// Render request handle shared between a repeater and the sequences it
/// observes.
///
/// Clones share the pending flag, so a request through any clone
/// deduplicates against every other clone.
#[derive(Clone)]
pub struct RenderTicket {
    id: RepeaterId,
    pending: Rc<Cell<bool>>,
    queue: Weak<RefCell<VecDeque<RepeaterId>>>,
}

impl RenderTicket {
    #[must_use]
    pub fn id(&self) -> RepeaterId {
        self.id
    }

    /// Whether a render is queued and not yet checked out.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.pending.get()
    }

    /// Queue a render unless one is already pending.
    ///
    /// Returns `true` when this call queued a new task.
    pub fn request(&self) -> bool {
        if self.pending.get() {
            return false;
        }
        let Some(queue) = self.queue.upgrade() else {
            return false;
        };
        self.pending.set(true);
        queue.borrow_mut().push_back(self.id);
        true
    }

    /// Clear the pending flag ahead of running the queued pass.
    pub fn checkout(&self) {
        self.pending.set(false);
    }
}

impl fmt::Debug for RenderTicket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderTicket")
            .field("id", &self.id)
            .field("pending", &self.pending.get())
            .finish()
    }
}
