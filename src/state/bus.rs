//! Match Bus - Cross-component publish/subscribe.
//!
//! Units publish a [`MatchEvent`] when one of their segments opens; sibling
//! units subscribe to react. The bus is an explicitly owned value (the
//! coordinator creates it and hands clones to the units it mounts), so every
//! subscription's lifetime is tied to something that can be dropped.
//!
//! # Dispatch rules
//!
//! - Synchronous: `publish` returns after every handler ran
//! - Ordered: handlers run in subscription order
//! - Re-entrant publishes are queued and delivered after the current event
//! - The subscriber list is snapshotted per event; a subscription dropped
//!   mid-dispatch is skipped from then on, nobody else is skipped or repeated
//!
//! # Example
//!
//! ```ignore
//! let bus = MatchBus::new();
//! let _sub = bus.subscribe("modal".into(), |event| {
//!     println!("{} opened {}", event.unit_id, event.segment_id);
//! });
//! bus.publish(MatchEvent::new("tabs".into(), "specs".into(), MatchCause::AutomaticMatch));
//! ```

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::{Rc, Weak};

use tracing::trace;

use crate::error::{Result, RevealError};
use crate::types::{MatchEvent, UnitId};

/// Handler for bus events.
pub type MatchHandler = Rc<dyn Fn(&MatchEvent)>;

#[derive(Clone)]
struct Subscriber {
    id: u64,
    unit: UnitId,
    handler: MatchHandler,
    active: Rc<Cell<bool>>,
}

#[derive(Default)]
struct BusInner {
    subscribers: RefCell<Vec<Subscriber>>,
    queue: RefCell<VecDeque<MatchEvent>>,
    dispatching: Cell<bool>,
    next_id: Cell<u64>,
}

/// Resets the dispatching flag even if a handler panics.
struct DispatchGuard<'a>(&'a Cell<bool>);

impl Drop for DispatchGuard<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

// =============================================================================
// Bus
// =============================================================================

/// Cheap to clone; clones share one registry.
#[derive(Clone, Default)]
pub struct MatchBus {
    inner: Rc<BusInner>,
}

impl MatchBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` on behalf of `unit`.
    ///
    /// Handlers see every event, including their own unit's.
    pub fn subscribe<F>(&self, unit: UnitId, handler: F) -> Subscription
    where
        F: Fn(&MatchEvent) + 'static,
    {
        let id = self.inner.next_id.get();
        self.inner.next_id.set(id + 1);

        let active = Rc::new(Cell::new(true));
        trace!(unit = %unit, subscription = id, "bus subscribe");
        self.inner.subscribers.borrow_mut().push(Subscriber {
            id,
            unit: unit.clone(),
            handler: Rc::new(handler),
            active: active.clone(),
        });

        Subscription {
            id,
            unit,
            active,
            bus: Some(Rc::downgrade(&self.inner)),
        }
    }

    /// Deliver `event` to every subscriber.
    ///
    /// Returns the number of handler invocations, including any events that
    /// handlers published meanwhile. A publish from inside a handler returns
    /// `ReentrantDispatch` and is delivered once the outer dispatch moves on.
    pub fn publish(&self, event: MatchEvent) -> Result<usize> {
        self.inner.queue.borrow_mut().push_back(event);

        if self.inner.dispatching.get() {
            let pending = self.inner.queue.borrow().len();
            trace!(pending, "publish during dispatch queued");
            return Err(RevealError::ReentrantDispatch { pending });
        }

        self.inner.dispatching.set(true);
        let _guard = DispatchGuard(&self.inner.dispatching);

        let mut delivered = 0;
        loop {
            let Some(event) = self.inner.queue.borrow_mut().pop_front() else {
                break;
            };
            delivered += self.dispatch(&event);
        }
        Ok(delivered)
    }

    fn dispatch(&self, event: &MatchEvent) -> usize {
        let snapshot: Vec<Subscriber> = self.inner.subscribers.borrow().clone();
        trace!(
            unit = %event.unit_id,
            segment = %event.segment_id,
            cause = %event.cause,
            subscribers = snapshot.len(),
            "bus dispatch"
        );

        let mut delivered = 0;
        for subscriber in &snapshot {
            if !subscriber.active.get() {
                continue;
            }
            (subscriber.handler)(event);
            delivered += 1;
        }
        delivered
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.borrow().len()
    }

    /// Units with a live subscription, in subscription order.
    pub fn subscribed_units(&self) -> Vec<UnitId> {
        self.inner
            .subscribers
            .borrow()
            .iter()
            .map(|s| s.unit.clone())
            .collect()
    }

    pub fn is_dispatching(&self) -> bool {
        self.inner.dispatching.get()
    }
}

// =============================================================================
// Subscription
// =============================================================================

/// Live registration on a [`MatchBus`]. Removed exactly once, by
/// [`Subscription::unsubscribe`] or on drop.
pub struct Subscription {
    id: u64,
    unit: UnitId,
    active: Rc<Cell<bool>>,
    bus: Option<Weak<BusInner>>,
}

impl Subscription {
    pub fn unit(&self) -> &UnitId {
        &self.unit
    }

    pub fn is_active(&self) -> bool {
        self.active.get()
    }

    pub fn unsubscribe(mut self) {
        self.release();
    }

    fn release(&mut self) {
        let Some(bus) = self.bus.take() else { return };
        self.active.set(false);
        if let Some(bus) = bus.upgrade() {
            bus.subscribers.borrow_mut().retain(|s| s.id != self.id);
            trace!(unit = %self.unit, subscription = self.id, "bus unsubscribe");
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MatchCause;

    fn event(unit: &str, segment: &str) -> MatchEvent {
        MatchEvent::new(unit.into(), segment.into(), MatchCause::AutomaticMatch)
    }

    #[test]
    fn test_handlers_run_in_subscription_order() {
        let bus = MatchBus::new();
        let log = Rc::new(RefCell::new(Vec::new()));

        let subs: Vec<Subscription> = ["a", "b", "c"]
            .into_iter()
            .map(|name| {
                let log = log.clone();
                bus.subscribe(name.into(), move |_| log.borrow_mut().push(name))
            })
            .collect();

        assert_eq!(bus.publish(event("x", "0")), Ok(3));
        assert_eq!(*log.borrow(), vec!["a", "b", "c"]);
        drop(subs);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn test_reentrant_publish_is_queued() {
        let bus = MatchBus::new();
        let log = Rc::new(RefCell::new(Vec::new()));

        let bus_clone = bus.clone();
        let log_first = log.clone();
        let _first = bus.subscribe("first".into(), move |e| {
            log_first.borrow_mut().push(format!("first:{}", e.segment_id));
            if e.segment_id.as_str() == "outer" {
                let result = bus_clone.publish(event("first", "inner"));
                assert_eq!(result, Err(RevealError::ReentrantDispatch { pending: 1 }));
            }
        });
        let log_second = log.clone();
        let _second = bus.subscribe("second".into(), move |e| {
            log_second.borrow_mut().push(format!("second:{}", e.segment_id));
        });

        assert_eq!(bus.publish(event("x", "outer")), Ok(4));
        assert_eq!(
            *log.borrow(),
            vec!["first:outer", "second:outer", "first:inner", "second:inner"]
        );
        assert!(!bus.is_dispatching());
    }

    #[test]
    fn test_ping_pong_terminates() {
        let bus = MatchBus::new();
        let count = Rc::new(Cell::new(0));

        let bus_clone = bus.clone();
        let count_clone = count.clone();
        let _sub = bus.subscribe("echo".into(), move |e| {
            count_clone.set(count_clone.get() + 1);
            if count_clone.get() < 5 {
                let _ = bus_clone.publish(e.clone());
            }
        });

        assert_eq!(bus.publish(event("x", "0")), Ok(5));
        assert_eq!(count.get(), 5);
    }

    #[test]
    fn test_unsubscribe_during_dispatch() {
        let bus = MatchBus::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        let victim: Rc<RefCell<Option<Subscription>>> = Rc::new(RefCell::new(None));

        let victim_clone = victim.clone();
        let log_a = log.clone();
        let _a = bus.subscribe("a".into(), move |_| {
            log_a.borrow_mut().push("a");
            if let Some(sub) = victim_clone.borrow_mut().take() {
                sub.unsubscribe();
            }
        });
        let log_b = log.clone();
        *victim.borrow_mut() = Some(bus.subscribe("b".into(), move |_| log_b.borrow_mut().push("b")));
        let log_c = log.clone();
        let _c = bus.subscribe("c".into(), move |_| log_c.borrow_mut().push("c"));

        assert_eq!(bus.publish(event("x", "0")), Ok(2));
        assert_eq!(*log.borrow(), vec!["a", "c"]);
        assert_eq!(bus.subscribed_units(), vec![UnitId::from("a"), UnitId::from("c")]);
    }

    #[test]
    fn test_subscribe_during_dispatch_waits_for_next_event() {
        let bus = MatchBus::new();
        let late_calls = Rc::new(Cell::new(0));
        let late: Rc<RefCell<Vec<Subscription>>> = Rc::new(RefCell::new(Vec::new()));

        let bus_clone = bus.clone();
        let late_clone = late.clone();
        let calls = late_calls.clone();
        let _first = bus.subscribe("first".into(), move |_| {
            if late_clone.borrow().is_empty() {
                let calls = calls.clone();
                let sub = bus_clone.subscribe("late".into(), move |_| calls.set(calls.get() + 1));
                late_clone.borrow_mut().push(sub);
            }
        });

        bus.publish(event("x", "0")).unwrap();
        assert_eq!(late_calls.get(), 0);

        bus.publish(event("x", "1")).unwrap();
        assert_eq!(late_calls.get(), 1);
    }

    #[test]
    fn test_unsubscribe_once() {
        let bus = MatchBus::new();
        let sub = bus.subscribe("a".into(), |_| {});
        let other = bus.subscribe("b".into(), |_| {});
        assert!(sub.is_active());

        sub.unsubscribe();
        assert_eq!(bus.subscriber_count(), 1);
        assert!(other.is_active());
        drop(other);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn test_subscription_outlives_bus() {
        let bus = MatchBus::new();
        let sub = bus.subscribe("a".into(), |_| {});
        drop(bus);
        sub.unsubscribe();
    }
}
