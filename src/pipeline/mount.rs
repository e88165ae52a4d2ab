//! Mount API - Unit lifecycle and the coordinator that owns the bus.
//!
//! The [`Coordinator`] is created once per page. It probes the host's
//! reveal-on-find support, owns the [`MatchBus`], and mounts units. Each mount
//! wires a segment store, one readiness slot and one bridge per segment, and
//! (for participating exclusive units) a reconciler.
//!
//! # Example
//!
//! ```ignore
//! let host = Rc::new(HeadlessHost::new());
//! let coordinator = Coordinator::new(host.clone());
//!
//! let tabs = coordinator.mount(UnitProps {
//!     id: Some("tabs".into()),
//!     segments: vec!["features".into(), "specs".into()],
//!     initially_open: vec!["features".into()],
//!     cross_component: true,
//!     ..Default::default()
//! })?;
//!
//! // The rendering surface reports nodes as it produces them
//! tabs.attach_node(&"specs".into(), host.create_node("Horsepower: 203 hp"))?;
//!
//! // Clean up
//! tabs.unmount();
//! ```

use std::cell::{Cell, RefCell};
use std::collections::BTreeSet;
use std::rc::{Rc, Weak};

use tracing::{debug, info};

use crate::engine::{HandleSlot, Readiness, SegmentStore};
use crate::error::{Result, RevealError};
use crate::host::{RevealSupport, SearchHost};
use crate::state::{BridgeStatus, MatchBridge, MatchBus, Reconciler};
use crate::types::{
    Cleanup, MatchCause, MatchEvent, NodeHandle, SegmentId, UnitId, UnitMode, UnitProps,
    VisibilityState,
};

// =============================================================================
// Coordinator
// =============================================================================

/// Top-level owner of the bus and the host capability.
pub struct Coordinator {
    host: Rc<dyn SearchHost>,
    support: RevealSupport,
    bus: MatchBus,
    mounted: Rc<RefCell<BTreeSet<UnitId>>>,
    next_unit: Cell<usize>,
}

impl Coordinator {
    /// Probe `host` once and start with an empty bus.
    pub fn new(host: Rc<dyn SearchHost>) -> Self {
        let support = RevealSupport::probe(&*host);
        Self {
            host,
            support,
            bus: MatchBus::new(),
            mounted: Rc::new(RefCell::new(BTreeSet::new())),
            next_unit: Cell::new(0),
        }
    }

    pub fn support(&self) -> RevealSupport {
        self.support
    }

    pub fn bus(&self) -> &MatchBus {
        &self.bus
    }

    pub fn host(&self) -> &Rc<dyn SearchHost> {
        &self.host
    }

    pub fn mounted_units(&self) -> Vec<UnitId> {
        self.mounted.borrow().iter().cloned().collect()
    }

    fn next_unit_id(&self) -> UnitId {
        loop {
            let n = self.next_unit.get();
            self.next_unit.set(n + 1);
            let id = UnitId::new(format!("unit-{n}"));
            if !self.mounted.borrow().contains(&id) {
                return id;
            }
        }
    }

    /// Mount a unit described by `props`.
    pub fn mount(&self, props: UnitProps) -> Result<UnitHandle> {
        let UnitProps {
            id,
            mode,
            segments,
            initially_open,
            cross_component,
        } = props;

        let id = match id {
            Some(id) if self.mounted.borrow().contains(&id) => {
                return Err(RevealError::DuplicateUnit(id));
            }
            Some(id) => id,
            None => self.next_unit_id(),
        };

        let store = Rc::new(SegmentStore::new(id.clone(), mode, segments));
        let sink_host = self.host.clone();
        store.set_exposure_sink(move |node, exposure| sink_host.apply_exposure(node, exposure));

        for segment in &initially_open {
            store.open(segment)?;
        }

        let bus = cross_component.then(|| self.bus.clone());
        let mut slots = Vec::with_capacity(store.len());
        let mut attach_waits = Vec::with_capacity(store.len());
        let mut bridges = Vec::with_capacity(store.len());

        for segment in store.segment_ids() {
            let slot = HandleSlot::new();

            // The store attaches first so the node carries its exposure
            // before the bridge starts listening on it.
            let weak_store: Weak<SegmentStore> = Rc::downgrade(&store);
            let attach_segment = segment.clone();
            attach_waits.push(slot.when_ready(move |readiness| {
                if let (Readiness::Ready(node), Some(store)) = (readiness, weak_store.upgrade()) {
                    // The segment comes from this store, so it is known.
                    let _ = store.attach_handle(&attach_segment, node);
                }
            }));

            bridges.push(MatchBridge::attach(
                store.clone(),
                segment.clone(),
                &slot,
                self.host.clone(),
                self.support,
                bus.clone(),
            ));
            slots.push((segment, slot));
        }

        let reconciler = bus.as_ref().map(|bus| Reconciler::mount(bus, &store));

        self.mounted.borrow_mut().insert(id.clone());
        info!(
            unit = %id,
            ?mode,
            segments = store.len(),
            cross_component,
            "unit mounted"
        );

        Ok(UnitHandle {
            id,
            store,
            slots,
            bridges,
            reconciler,
            attach_waits,
            bus,
            mounted: Rc::downgrade(&self.mounted),
            torn_down: false,
        })
    }
}

// =============================================================================
// Unit Handle
// =============================================================================

/// Handle returned by [`Coordinator::mount`].
///
/// Holds references to:
/// - The unit's segment store
/// - One readiness slot and one bridge per segment
/// - The reconciler's bus subscription (participating exclusive units)
///
/// Dropping the handle unmounts the unit.
pub struct UnitHandle {
    id: UnitId,
    store: Rc<SegmentStore>,
    slots: Vec<(SegmentId, HandleSlot)>,
    bridges: Vec<MatchBridge>,
    reconciler: Option<Reconciler>,
    attach_waits: Vec<Cleanup>,
    bus: Option<MatchBus>,
    mounted: Weak<RefCell<BTreeSet<UnitId>>>,
    torn_down: bool,
}

impl UnitHandle {
    pub fn id(&self) -> &UnitId {
        &self.id
    }

    pub fn mode(&self) -> UnitMode {
        self.store.mode()
    }

    pub fn store(&self) -> &Rc<SegmentStore> {
        &self.store
    }

    pub fn is_cross_component(&self) -> bool {
        self.bus.is_some()
    }

    pub fn is_mounted(&self) -> bool {
        !self.torn_down
    }

    pub fn is_open(&self, segment: &SegmentId) -> bool {
        self.store.is_open(segment)
    }

    pub fn active(&self) -> Option<SegmentId> {
        self.store.active()
    }

    pub fn visible_segments(&self) -> Vec<SegmentId> {
        self.store.visible_segments()
    }

    // =========================================================================
    // Manual Navigation
    // =========================================================================

    /// Open `segment` on user request (tab click).
    ///
    /// Announces a `ManualToggle` when something actually opened, so manual
    /// navigation suppresses siblings just like a search match.
    pub fn open(&self, segment: &SegmentId) -> Result<bool> {
        let opened = self.store.open(segment)?;
        if opened {
            self.announce(segment, MatchCause::ManualToggle);
        }
        Ok(opened)
    }

    pub fn close(&self, segment: &SegmentId) -> Result<bool> {
        self.store.close(segment)
    }

    /// Flip `segment` on user request (accordion header). Only the opening
    /// direction is announced.
    pub fn toggle(&self, segment: &SegmentId) -> Result<VisibilityState> {
        let state = self.store.toggle(segment)?;
        if state.is_visible() {
            self.announce(segment, MatchCause::ManualToggle);
        }
        Ok(state)
    }

    /// Close everything (Escape on a modal).
    pub fn dismiss(&self) -> Vec<SegmentId> {
        self.store.close_all()
    }

    fn announce(&self, segment: &SegmentId, cause: MatchCause) {
        let Some(bus) = &self.bus else { return };
        let event = MatchEvent::new(self.id.clone(), segment.clone(), cause);
        if let Err(err) = bus.publish(event) {
            debug!(unit = %self.id, segment = %segment, %err, "announcement deferred");
        }
    }

    // =========================================================================
    // Rendering Surface
    // =========================================================================

    fn slot(&self, segment: &SegmentId) -> Result<&HandleSlot> {
        self.slots
            .iter()
            .find(|(id, _)| id == segment)
            .map(|(_, slot)| slot)
            .ok_or_else(|| RevealError::UnknownSegment {
                unit: self.id.clone(),
                segment: segment.clone(),
            })
    }

    /// Report that the node for `segment` now exists.
    pub fn attach_node(&self, segment: &SegmentId, node: NodeHandle) -> Result<()> {
        let slot = self.slot(segment)?;
        if !slot.fill(node) {
            debug!(unit = %self.id, segment = %segment, node = node.0, "node already reported");
        }
        Ok(())
    }

    /// Report that the node for `segment` will never be produced.
    pub fn abandon_node(&self, segment: &SegmentId) -> Result<()> {
        self.slot(segment)?.abandon();
        Ok(())
    }

    /// Readiness slot for `segment`, for surfaces that complete it themselves.
    pub fn handle_slot(&self, segment: &SegmentId) -> Option<HandleSlot> {
        self.slot(segment).ok().cloned()
    }

    pub fn bridge_status(&self, segment: &SegmentId) -> Option<BridgeStatus> {
        self.bridges
            .iter()
            .find(|bridge| bridge.segment() == segment)
            .map(MatchBridge::status)
    }

    /// Push a native signal for `segment` straight into its bridge.
    pub fn deliver_match(&self, segment: &SegmentId) -> Result<()> {
        match self.bridges.iter().find(|bridge| bridge.segment() == segment) {
            Some(bridge) => bridge.deliver(),
            None => Err(RevealError::UnknownSegment {
                unit: self.id.clone(),
                segment: segment.clone(),
            }),
        }
    }

    // =========================================================================
    // Teardown
    // =========================================================================

    /// Unmount the unit.
    ///
    /// This will:
    /// 1. Cancel pending node waits
    /// 2. Tear down every bridge (listeners removed, in-flight signals dropped)
    /// 3. Release the bus subscription
    pub fn unmount(mut self) {
        self.teardown();
    }

    fn teardown(&mut self) {
        if self.torn_down {
            return;
        }
        self.torn_down = true;

        for cancel in self.attach_waits.drain(..) {
            cancel();
        }
        for bridge in &self.bridges {
            bridge.teardown();
        }
        if let Some(reconciler) = self.reconciler.as_mut() {
            reconciler.unmount();
        }
        if let Some(mounted) = self.mounted.upgrade() {
            mounted.borrow_mut().remove(&self.id);
        }
        info!(unit = %self.id, "unit unmounted");
    }
}

impl Drop for UnitHandle {
    fn drop(&mut self) {
        self.teardown();
    }
}
