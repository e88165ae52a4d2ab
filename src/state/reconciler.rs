//! Reconciler - Keeps an exclusive unit honest when a sibling opens something.
//!
//! When another unit reports a match, this unit's open segment is stale
//! (an open modal over a tab that search just revealed). The reconciler
//! closes it. It never opens anything and ignores its own unit's events.

use std::rc::{Rc, Weak};

use tracing::debug;

use crate::engine::SegmentStore;
use crate::state::bus::{MatchBus, Subscription};
use crate::types::{MatchEvent, SegmentId, UnitId, UnitMode};

pub struct Reconciler {
    unit: UnitId,
    subscription: Option<Subscription>,
}

impl Reconciler {
    /// Subscribe `store` to `bus`. Only exclusive units get a live
    /// subscription; independent units are never suppressed.
    pub fn mount(bus: &MatchBus, store: &Rc<SegmentStore>) -> Self {
        let unit = store.unit().clone();
        if store.mode() != UnitMode::Exclusive {
            return Self { unit, subscription: None };
        }

        let weak: Weak<SegmentStore> = Rc::downgrade(store);
        let subscription = bus.subscribe(unit.clone(), move |event| {
            if let Some(store) = weak.upgrade() {
                Self::react(&store, event);
            }
        });

        Self {
            unit,
            subscription: Some(subscription),
        }
    }

    /// Apply the single reactive rule to `store`. Returns the segment closed.
    pub fn react(store: &SegmentStore, event: &MatchEvent) -> Option<SegmentId> {
        if &event.unit_id == store.unit() {
            return None;
        }

        let active = store.active()?;
        match store.close(&active) {
            Ok(true) => {
                debug!(
                    unit = %store.unit(),
                    segment = %active,
                    source = %event.unit_id,
                    cause = %event.cause,
                    "closed stale segment"
                );
                Some(active)
            }
            _ => None,
        }
    }

    pub fn unit(&self) -> &UnitId {
        &self.unit
    }

    pub fn is_subscribed(&self) -> bool {
        self.subscription.as_ref().is_some_and(Subscription::is_active)
    }

    pub fn unmount(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            subscription.unsubscribe();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MatchCause;

    fn modal() -> Rc<SegmentStore> {
        Rc::new(SegmentStore::new("modal".into(), UnitMode::Exclusive, [SegmentId::from("body")]))
    }

    fn event(unit: &str) -> MatchEvent {
        MatchEvent::new(unit.into(), "specs".into(), MatchCause::AutomaticMatch)
    }

    #[test]
    fn test_closes_on_sibling_match() {
        let bus = MatchBus::new();
        let store = modal();
        let reconciler = Reconciler::mount(&bus, &store);
        assert!(reconciler.is_subscribed());

        store.open(&"body".into()).unwrap();
        bus.publish(event("tabs")).unwrap();
        assert!(!store.is_open(&"body".into()));
    }

    #[test]
    fn test_ignores_own_events() {
        let store = modal();
        store.open(&"body".into()).unwrap();
        assert_eq!(Reconciler::react(&store, &event("modal")), None);
        assert!(store.is_open(&"body".into()));
    }

    #[test]
    fn test_nothing_open_is_noop() {
        let store = modal();
        assert_eq!(Reconciler::react(&store, &event("tabs")), None);
        assert_eq!(store.visible_count(), 0);
    }

    #[test]
    fn test_independent_units_do_not_subscribe() {
        let bus = MatchBus::new();
        let store = Rc::new(SegmentStore::new(
            "faq".into(),
            UnitMode::Independent,
            (0..4).map(SegmentId::at),
        ));
        let reconciler = Reconciler::mount(&bus, &store);
        assert!(!reconciler.is_subscribed());
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn test_unmount_releases_subscription() {
        let bus = MatchBus::new();
        let store = modal();
        let mut reconciler = Reconciler::mount(&bus, &store);
        assert_eq!(bus.subscriber_count(), 1);

        reconciler.unmount();
        reconciler.unmount();
        assert_eq!(bus.subscriber_count(), 0);

        store.open(&"body".into()).unwrap();
        bus.publish(event("tabs")).unwrap();
        assert!(store.is_open(&"body".into()));
    }
}
