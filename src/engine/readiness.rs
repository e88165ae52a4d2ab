//! Handle Readiness - One-shot notification for a segment's rendered node.
//!
//! A segment exists as soon as its unit mounts, but the node that carries its
//! text may be produced later by the rendering surface. Instead of guessing a
//! delay, consumers wait on a `HandleSlot`:
//!
//! - `fill(node)` completes the slot exactly once
//! - `abandon()` completes it without a node (the surface gave up)
//! - `when_ready(cb)` runs `cb` on completion, or immediately if already complete
//!
//! Waiters run in registration order. Each wait returns its own cancellation.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use tracing::trace;

use crate::types::{Cleanup, NodeHandle};

/// Outcome delivered to waiters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    Ready(NodeHandle),
    Abandoned,
}

type Waiter = Box<dyn FnOnce(Readiness)>;

enum SlotState {
    Pending(Vec<(u64, Waiter)>),
    Complete(Readiness),
}

struct SlotInner {
    state: RefCell<SlotState>,
    next_waiter: Cell<u64>,
}

/// Shared one-shot slot. Clones observe the same completion.
#[derive(Clone)]
pub struct HandleSlot {
    inner: Rc<SlotInner>,
}

impl Default for HandleSlot {
    fn default() -> Self {
        Self::new()
    }
}

impl HandleSlot {
    pub fn new() -> Self {
        Self {
            inner: Rc::new(SlotInner {
                state: RefCell::new(SlotState::Pending(Vec::new())),
                next_waiter: Cell::new(0),
            }),
        }
    }

    /// Already-filled slot, for nodes that exist at mount.
    pub fn ready(node: NodeHandle) -> Self {
        let slot = Self::new();
        slot.complete(Readiness::Ready(node));
        slot
    }

    /// Complete with `node`. Returns false if the slot was already complete.
    pub fn fill(&self, node: NodeHandle) -> bool {
        self.complete(Readiness::Ready(node))
    }

    /// Complete without a node. Returns false if the slot was already complete.
    pub fn abandon(&self) -> bool {
        self.complete(Readiness::Abandoned)
    }

    fn complete(&self, outcome: Readiness) -> bool {
        let waiters = {
            let mut state = self.inner.state.borrow_mut();
            let waiters = match &mut *state {
                SlotState::Complete(_) => return false,
                SlotState::Pending(waiters) => std::mem::take(waiters),
            };
            *state = SlotState::Complete(outcome);
            waiters
        };

        trace!(?outcome, waiters = waiters.len(), "handle slot completed");
        for (_, waiter) in waiters {
            waiter(outcome);
        }
        true
    }

    /// Node if the slot completed with one.
    pub fn current(&self) -> Option<NodeHandle> {
        match &*self.inner.state.borrow() {
            SlotState::Complete(Readiness::Ready(node)) => Some(*node),
            _ => None,
        }
    }

    pub fn is_complete(&self) -> bool {
        matches!(&*self.inner.state.borrow(), SlotState::Complete(_))
    }

    pub fn pending_waiters(&self) -> usize {
        match &*self.inner.state.borrow() {
            SlotState::Pending(waiters) => waiters.len(),
            SlotState::Complete(_) => 0,
        }
    }

    /// Run `callback` once the slot completes.
    ///
    /// Runs synchronously if already complete. The returned cleanup cancels a
    /// wait that has not fired yet; after firing it does nothing.
    pub fn when_ready<F>(&self, callback: F) -> Cleanup
    where
        F: FnOnce(Readiness) + 'static,
    {
        let completed = match &*self.inner.state.borrow() {
            SlotState::Complete(outcome) => Some(*outcome),
            SlotState::Pending(_) => None,
        };
        if let Some(outcome) = completed {
            callback(outcome);
            return Box::new(|| {});
        }

        let id = self.inner.next_waiter.get();
        self.inner.next_waiter.set(id + 1);
        if let SlotState::Pending(waiters) = &mut *self.inner.state.borrow_mut() {
            waiters.push((id, Box::new(callback)));
        }

        let inner = Rc::downgrade(&self.inner);
        Box::new(move || {
            let Some(inner) = inner.upgrade() else { return };
            if let SlotState::Pending(waiters) = &mut *inner.state.borrow_mut() {
                waiters.retain(|(waiter_id, _)| *waiter_id != id);
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fill_wakes_waiters_in_order() {
        let slot = HandleSlot::new();
        let log = Rc::new(RefCell::new(Vec::new()));

        for name in ["store", "bridge"] {
            let log = log.clone();
            let _ = slot.when_ready(move |outcome| log.borrow_mut().push((name, outcome)));
        }
        assert_eq!(slot.pending_waiters(), 2);
        assert!(log.borrow().is_empty());

        assert!(slot.fill(NodeHandle(3)));
        assert_eq!(
            *log.borrow(),
            vec![
                ("store", Readiness::Ready(NodeHandle(3))),
                ("bridge", Readiness::Ready(NodeHandle(3))),
            ]
        );
        assert_eq!(slot.current(), Some(NodeHandle(3)));
    }

    #[test]
    fn test_completes_once() {
        let slot = HandleSlot::new();
        assert!(slot.fill(NodeHandle(1)));
        assert!(!slot.fill(NodeHandle(2)));
        assert!(!slot.abandon());
        assert_eq!(slot.current(), Some(NodeHandle(1)));
    }

    #[test]
    fn test_late_waiter_runs_immediately() {
        let slot = HandleSlot::ready(NodeHandle(5));
        let seen = Rc::new(Cell::new(None));
        let seen_clone = seen.clone();
        let _ = slot.when_ready(move |outcome| seen_clone.set(Some(outcome)));
        assert_eq!(seen.get(), Some(Readiness::Ready(NodeHandle(5))));
    }

    #[test]
    fn test_cancelled_wait_never_fires() {
        let slot = HandleSlot::new();
        let fired = Rc::new(Cell::new(false));
        let fired_clone = fired.clone();
        let cancel = slot.when_ready(move |_| fired_clone.set(true));

        cancel();
        assert_eq!(slot.pending_waiters(), 0);
        slot.fill(NodeHandle(9));
        assert!(!fired.get());
    }

    #[test]
    fn test_abandon() {
        let slot = HandleSlot::new();
        let seen = Rc::new(Cell::new(None));
        let seen_clone = seen.clone();
        let _ = slot.when_ready(move |outcome| seen_clone.set(Some(outcome)));

        assert!(slot.abandon());
        assert_eq!(seen.get(), Some(Readiness::Abandoned));
        assert!(slot.is_complete());
        assert_eq!(slot.current(), None);
    }
}
