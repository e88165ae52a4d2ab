//! Segment Store - Visibility state for every segment of one unit.
//!
//! The store is the single writer of `VisibilityState`. Every transition:
//! 1. Commits the new state and its exposure attributes in one borrow
//! 2. Pushes exposure to the rendering surface for attached nodes
//! 3. Writes the per-segment reactive signals (closed segments first)
//! 4. Notifies change observers
//!
//! Exclusive units enforce "at most one visible" inside `open` itself: the
//! previously open segment is closed before the target opens, so no observer
//! can ever count two visible segments.
//!
//! # Example
//!
//! ```ignore
//! let store = SegmentStore::new("tabs".into(), UnitMode::Exclusive, ids);
//! store.open(&"specs".into())?;
//! assert!(store.is_open(&"specs".into()));
//! ```

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use spark_signals::{signal, Signal};
use tracing::{debug, trace};

use crate::error::{Result, RevealError};
use crate::types::{Cleanup, Exposure, NodeHandle, SegmentId, UnitId, UnitMode, VisibilityState};

// =============================================================================
// Types
// =============================================================================

/// Receives exposure attributes for a node, in the same step as the change.
pub type ExposureSink = Rc<dyn Fn(NodeHandle, Exposure)>;

/// Observer for committed transitions.
pub type ChangeHandler = Rc<dyn Fn(&SegmentChange)>;

/// One committed transition of one segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentChange {
    pub segment: SegmentId,
    pub state: VisibilityState,
    pub exposure: Exposure,
}

/// Read-only snapshot of a segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub unit: UnitId,
    pub id: SegmentId,
    pub state: VisibilityState,
    pub exposure: Exposure,
    pub handle: Option<NodeHandle>,
}

struct SegmentEntry {
    id: SegmentId,
    state: VisibilityState,
    exposure: Exposure,
    handle: Option<NodeHandle>,
    signal: Signal<VisibilityState>,
}

/// A committed change plus what is needed to publish it outside the borrow.
struct Applied {
    change: SegmentChange,
    handle: Option<NodeHandle>,
    signal: Signal<VisibilityState>,
}

impl SegmentEntry {
    fn new(id: SegmentId) -> Self {
        let state = VisibilityState::Hidden;
        Self {
            id,
            state,
            exposure: state.exposure(),
            handle: None,
            signal: signal(state),
        }
    }

    fn commit(&mut self, state: VisibilityState) -> Applied {
        self.state = state;
        self.exposure = state.exposure();
        Applied {
            change: SegmentChange {
                segment: self.id.clone(),
                state,
                exposure: self.exposure,
            },
            handle: self.handle,
            signal: self.signal.clone(),
        }
    }
}

// =============================================================================
// Segment Store
// =============================================================================

pub struct SegmentStore {
    unit: UnitId,
    mode: UnitMode,
    index: HashMap<SegmentId, usize>,
    entries: RefCell<Vec<SegmentEntry>>,
    sink: RefCell<Option<ExposureSink>>,
    observers: Rc<RefCell<Vec<(usize, ChangeHandler)>>>,
    next_observer: Cell<usize>,
}

impl SegmentStore {
    /// Create a store with every segment hidden, in document order.
    ///
    /// Duplicate ids keep their first position.
    pub fn new(unit: UnitId, mode: UnitMode, segments: impl IntoIterator<Item = SegmentId>) -> Self {
        let mut index = HashMap::new();
        let mut entries = Vec::new();
        for id in segments {
            if index.contains_key(&id) {
                debug!(unit = %unit, segment = %id, "duplicate segment id ignored");
                continue;
            }
            index.insert(id.clone(), entries.len());
            entries.push(SegmentEntry::new(id));
        }

        Self {
            unit,
            mode,
            index,
            entries: RefCell::new(entries),
            sink: RefCell::new(None),
            observers: Rc::new(RefCell::new(Vec::new())),
            next_observer: Cell::new(0),
        }
    }

    pub fn unit(&self) -> &UnitId {
        &self.unit
    }

    pub fn mode(&self) -> UnitMode {
        self.mode
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn contains(&self, id: &SegmentId) -> bool {
        self.index.contains_key(id)
    }

    /// Route exposure updates to the rendering surface.
    pub fn set_exposure_sink(&self, sink: impl Fn(NodeHandle, Exposure) + 'static) {
        *self.sink.borrow_mut() = Some(Rc::new(sink));
    }

    fn position(&self, id: &SegmentId) -> Result<usize> {
        self.index.get(id).copied().ok_or_else(|| RevealError::UnknownSegment {
            unit: self.unit.clone(),
            segment: id.clone(),
        })
    }

    // =========================================================================
    // Transitions
    // =========================================================================

    /// Make `id` visible. Returns whether anything changed.
    ///
    /// In an exclusive unit the currently visible segment is closed first.
    pub fn open(&self, id: &SegmentId) -> Result<bool> {
        let pos = self.position(id)?;
        let applied = {
            let mut entries = self.entries.borrow_mut();
            if entries[pos].state.is_visible() {
                return Ok(false);
            }

            let mut applied = Vec::new();
            if self.mode == UnitMode::Exclusive {
                for (i, entry) in entries.iter_mut().enumerate() {
                    if i != pos && entry.state.is_visible() {
                        applied.push(entry.commit(VisibilityState::Hidden));
                    }
                }
            }
            applied.push(entries[pos].commit(VisibilityState::Visible));
            applied
        };

        self.publish(applied);
        Ok(true)
    }

    /// Hide `id`. Closing a hidden segment is a no-op.
    pub fn close(&self, id: &SegmentId) -> Result<bool> {
        let pos = self.position(id)?;
        let applied = {
            let mut entries = self.entries.borrow_mut();
            if !entries[pos].state.is_visible() {
                return Ok(false);
            }
            vec![entries[pos].commit(VisibilityState::Hidden)]
        };

        self.publish(applied);
        Ok(true)
    }

    /// Flip `id`. Returns the new state.
    pub fn toggle(&self, id: &SegmentId) -> Result<VisibilityState> {
        let pos = self.position(id)?;
        let current = self.entries.borrow()[pos].state;
        match current {
            VisibilityState::Visible => self.close(id)?,
            VisibilityState::Hidden => self.open(id)?,
        };
        Ok(current.flipped())
    }

    /// Hide every visible segment. Returns the ids that closed.
    pub fn close_all(&self) -> Vec<SegmentId> {
        let applied: Vec<Applied> = {
            let mut entries = self.entries.borrow_mut();
            entries
                .iter_mut()
                .filter(|entry| entry.state.is_visible())
                .map(|entry| entry.commit(VisibilityState::Hidden))
                .collect()
        };

        let closed = applied.iter().map(|a| a.change.segment.clone()).collect();
        self.publish(applied);
        closed
    }

    /// Push committed changes to the sink, the signals, then the observers.
    fn publish(&self, applied: Vec<Applied>) {
        if applied.is_empty() {
            return;
        }

        let sink = self.sink.borrow().clone();
        if let Some(sink) = sink {
            for a in &applied {
                if let Some(node) = a.handle {
                    sink(node, a.change.exposure);
                }
            }
        }

        for a in &applied {
            debug!(
                unit = %self.unit,
                segment = %a.change.segment,
                state = %a.change.state,
                "segment transition"
            );
            a.signal.set(a.change.state);
        }

        let observers: Vec<ChangeHandler> = self
            .observers
            .borrow()
            .iter()
            .map(|(_, handler)| handler.clone())
            .collect();
        for a in &applied {
            for handler in &observers {
                handler(&a.change);
            }
        }
    }

    // =========================================================================
    // Handles
    // =========================================================================

    /// Attach the rendered node and apply the current exposure to it.
    pub fn attach_handle(&self, id: &SegmentId, node: NodeHandle) -> Result<()> {
        let pos = self.position(id)?;
        let exposure = {
            let mut entries = self.entries.borrow_mut();
            entries[pos].handle = Some(node);
            entries[pos].exposure
        };

        trace!(unit = %self.unit, segment = %id, node = node.0, "handle attached");
        let sink = self.sink.borrow().clone();
        if let Some(sink) = sink {
            sink(node, exposure);
        }
        Ok(())
    }

    pub fn detach_handle(&self, id: &SegmentId) -> Result<Option<NodeHandle>> {
        let pos = self.position(id)?;
        Ok(self.entries.borrow_mut()[pos].handle.take())
    }

    pub fn handle(&self, id: &SegmentId) -> Option<NodeHandle> {
        let pos = self.index.get(id)?;
        self.entries.borrow()[*pos].handle
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Unknown segments are reported closed.
    pub fn is_open(&self, id: &SegmentId) -> bool {
        self.state(id).is_some_and(VisibilityState::is_visible)
    }

    pub fn state(&self, id: &SegmentId) -> Option<VisibilityState> {
        let pos = self.index.get(id)?;
        Some(self.entries.borrow()[*pos].state)
    }

    pub fn exposure(&self, id: &SegmentId) -> Option<Exposure> {
        let pos = self.index.get(id)?;
        Some(self.entries.borrow()[*pos].exposure)
    }

    /// First visible segment in document order.
    pub fn active(&self) -> Option<SegmentId> {
        self.entries
            .borrow()
            .iter()
            .find(|entry| entry.state.is_visible())
            .map(|entry| entry.id.clone())
    }

    pub fn visible_segments(&self) -> Vec<SegmentId> {
        self.entries
            .borrow()
            .iter()
            .filter(|entry| entry.state.is_visible())
            .map(|entry| entry.id.clone())
            .collect()
    }

    pub fn visible_count(&self) -> usize {
        self.entries.borrow().iter().filter(|entry| entry.state.is_visible()).count()
    }

    pub fn segment_ids(&self) -> Vec<SegmentId> {
        self.entries.borrow().iter().map(|entry| entry.id.clone()).collect()
    }

    pub fn segment(&self, id: &SegmentId) -> Option<Segment> {
        let pos = self.index.get(id)?;
        let entries = self.entries.borrow();
        Some(self.snapshot(&entries[*pos]))
    }

    pub fn segments(&self) -> Vec<Segment> {
        let entries = self.entries.borrow();
        entries.iter().map(|entry| self.snapshot(entry)).collect()
    }

    fn snapshot(&self, entry: &SegmentEntry) -> Segment {
        Segment {
            unit: self.unit.clone(),
            id: entry.id.clone(),
            state: entry.state,
            exposure: entry.exposure,
            handle: entry.handle,
        }
    }

    /// Reactive cell tracking the state of `id`, for renderers.
    pub fn state_signal(&self, id: &SegmentId) -> Option<Signal<VisibilityState>> {
        let pos = self.index.get(id)?;
        Some(self.entries.borrow()[*pos].signal.clone())
    }

    // =========================================================================
    // Observers
    // =========================================================================

    /// Observe committed transitions. Returns cleanup function.
    pub fn on_change<F>(&self, handler: F) -> Cleanup
    where
        F: Fn(&SegmentChange) + 'static,
    {
        let id = self.next_observer.get();
        self.next_observer.set(id + 1);
        self.observers.borrow_mut().push((id, Rc::new(handler)));

        let observers = Rc::downgrade(&self.observers);
        Box::new(move || {
            if let Some(observers) = observers.upgrade() {
                observers.borrow_mut().retain(|(observer_id, _)| *observer_id != id);
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(names: &[&str]) -> Vec<SegmentId> {
        names.iter().map(|name| SegmentId::from(*name)).collect()
    }

    fn tabs() -> Rc<SegmentStore> {
        Rc::new(SegmentStore::new(
            "tabs".into(),
            UnitMode::Exclusive,
            ids(&["features", "specs", "warranty"]),
        ))
    }

    fn accordion() -> Rc<SegmentStore> {
        Rc::new(SegmentStore::new(
            "faq".into(),
            UnitMode::Independent,
            (0..4).map(SegmentId::at),
        ))
    }

    fn assert_consistent(store: &SegmentStore) {
        for segment in store.segments() {
            assert!(
                segment.exposure.matches(segment.state),
                "segment {} is {} with {:?}",
                segment.id,
                segment.state,
                segment.exposure
            );
        }
    }

    #[test]
    fn test_starts_hidden() {
        let store = tabs();
        assert_eq!(store.len(), 3);
        assert_eq!(store.visible_count(), 0);
        assert_eq!(store.active(), None);
        assert_consistent(&store);
    }

    #[test]
    fn test_exclusive_open_closes_previous() {
        let store = tabs();

        assert!(store.open(&"features".into()).unwrap());
        assert_eq!(store.active(), Some("features".into()));

        assert!(store.open(&"specs".into()).unwrap());
        assert!(!store.is_open(&"features".into()));
        assert!(store.is_open(&"specs".into()));
        assert_eq!(store.visible_count(), 1);
        assert_consistent(&store);
    }

    #[test]
    fn test_independent_open_keeps_siblings() {
        let store = accordion();

        store.open(&SegmentId::at(1)).unwrap();
        store.open(&SegmentId::at(3)).unwrap();

        assert_eq!(store.visible_segments(), vec![SegmentId::at(1), SegmentId::at(3)]);
        assert_consistent(&store);
    }

    #[test]
    fn test_open_is_idempotent() {
        let store = tabs();

        assert!(store.open(&"specs".into()).unwrap());
        let before = store.segments();
        assert!(!store.open(&"specs".into()).unwrap());
        assert_eq!(store.segments(), before);
    }

    #[test]
    fn test_close_hidden_is_noop() {
        let store = tabs();
        assert!(!store.close(&"warranty".into()).unwrap());
        assert_eq!(store.visible_count(), 0);
    }

    #[test]
    fn test_toggle_twice_restores() {
        let store = accordion();
        let item = SegmentId::at(2);

        assert_eq!(store.toggle(&item).unwrap(), VisibilityState::Visible);
        assert_eq!(store.toggle(&item).unwrap(), VisibilityState::Hidden);
        assert!(!store.is_open(&item));

        store.open(&SegmentId::at(0)).unwrap();
        store.toggle(&SegmentId::at(0)).unwrap();
        store.toggle(&SegmentId::at(0)).unwrap();
        assert!(store.is_open(&SegmentId::at(0)));
        assert_consistent(&store);
    }

    #[test]
    fn test_unknown_segment() {
        let store = tabs();
        let err = store.open(&"pricing".into()).unwrap_err();
        assert_eq!(
            err,
            RevealError::UnknownSegment {
                unit: "tabs".into(),
                segment: "pricing".into(),
            }
        );
        assert!(!store.is_open(&"pricing".into()));
    }

    #[test]
    fn test_close_all() {
        let store = accordion();
        store.open(&SegmentId::at(0)).unwrap();
        store.open(&SegmentId::at(2)).unwrap();

        let closed = store.close_all();
        assert_eq!(closed, vec![SegmentId::at(0), SegmentId::at(2)]);
        assert_eq!(store.visible_count(), 0);
        assert!(store.close_all().is_empty());
    }

    #[test]
    fn test_observer_never_sees_two_visible() {
        let store = tabs();
        let max_seen = Rc::new(Cell::new(0));

        let weak = Rc::downgrade(&store);
        let max_clone = max_seen.clone();
        let _cleanup = store.on_change(move |_| {
            if let Some(store) = weak.upgrade() {
                max_clone.set(max_clone.get().max(store.visible_count()));
            }
        });

        store.open(&"features".into()).unwrap();
        store.open(&"specs".into()).unwrap();
        store.open(&"warranty".into()).unwrap();
        store.toggle(&"features".into()).unwrap();

        assert_eq!(max_seen.get(), 1);
    }

    #[test]
    fn test_sink_receives_close_before_open() {
        let store = tabs();
        let log = Rc::new(RefCell::new(Vec::new()));
        let log_clone = log.clone();
        store.set_exposure_sink(move |node, exposure| {
            log_clone.borrow_mut().push((node, exposure));
        });

        store.attach_handle(&"features".into(), NodeHandle(10)).unwrap();
        store.attach_handle(&"specs".into(), NodeHandle(11)).unwrap();
        log.borrow_mut().clear();

        store.open(&"features".into()).unwrap();
        store.open(&"specs".into()).unwrap();

        assert_eq!(
            *log.borrow(),
            vec![
                (NodeHandle(10), Exposure::NONE),
                (NodeHandle(10), Exposure::COLLAPSED),
                (NodeHandle(11), Exposure::NONE),
            ]
        );
    }

    #[test]
    fn test_attach_applies_current_exposure() {
        let store = tabs();
        let log = Rc::new(RefCell::new(Vec::new()));
        let log_clone = log.clone();
        store.set_exposure_sink(move |node, exposure| {
            log_clone.borrow_mut().push((node, exposure));
        });

        store.open(&"specs".into()).unwrap();
        store.attach_handle(&"specs".into(), NodeHandle(7)).unwrap();
        store.attach_handle(&"warranty".into(), NodeHandle(8)).unwrap();

        assert_eq!(
            *log.borrow(),
            vec![(NodeHandle(7), Exposure::NONE), (NodeHandle(8), Exposure::COLLAPSED)]
        );
        assert_eq!(store.handle(&"specs".into()), Some(NodeHandle(7)));
        assert_eq!(store.detach_handle(&"specs".into()).unwrap(), Some(NodeHandle(7)));
        assert_eq!(store.handle(&"specs".into()), None);
    }

    #[test]
    fn test_observer_cleanup() {
        let store = tabs();
        let count = Rc::new(Cell::new(0));
        let count_clone = count.clone();
        let cleanup = store.on_change(move |_| count_clone.set(count_clone.get() + 1));

        store.open(&"features".into()).unwrap();
        assert_eq!(count.get(), 1);

        cleanup();
        store.open(&"specs".into()).unwrap();
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn test_state_signal_follows_store() {
        let store = tabs();
        let specs = store.state_signal(&"specs".into()).unwrap();
        assert_eq!(specs.get(), VisibilityState::Hidden);

        store.open(&"specs".into()).unwrap();
        assert_eq!(specs.get(), VisibilityState::Visible);

        store.open(&"warranty".into()).unwrap();
        assert_eq!(specs.get(), VisibilityState::Hidden);
    }

    #[test]
    fn test_duplicate_ids_ignored() {
        let store = SegmentStore::new("dup".into(), UnitMode::Exclusive, ids(&["a", "b", "a"]));
        assert_eq!(store.len(), 2);
        assert_eq!(store.segment_ids(), ids(&["a", "b"]));
    }
}
