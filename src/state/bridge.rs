//! Match Bridge - Native "found while hidden" signal to store transition.
//!
//! One bridge per segment. It waits for the segment's [`HandleSlot`] to
//! complete, installs a reveal listener on the node, and on each signal opens
//! the segment (and publishes an `AutomaticMatch` when the unit participates
//! in cross-component coordination).
//!
//! # Lifecycle
//!
//! ```text
//! attach ──► waiting on slot ──fill──► listening ──teardown──► torn down
//!                 │                                  ▲
//!                 └──abandon──► given up ────────────┘
//! ```
//!
//! Every callback checks the torn-down flag first, so a signal that was
//! already in flight when the unit unmounted is dropped.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use tracing::{debug, trace, warn};

use crate::engine::{HandleSlot, Readiness, SegmentStore};
use crate::error::{Result, RevealError};
use crate::host::{RevealSupport, SearchHost};
use crate::state::bus::MatchBus;
use crate::types::{Cleanup, ListenerId, MatchCause, MatchEvent, NodeHandle, SegmentId};

/// Where a bridge is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeStatus {
    /// Host has no native signal; the bridge forwards nothing.
    Inactive,
    /// Waiting for the node to be rendered.
    Waiting,
    Listening(NodeHandle),
    /// The node never came (`HandleNotReady`).
    GaveUp,
    TornDown,
}

struct BridgeInner {
    segment: SegmentId,
    store: Rc<SegmentStore>,
    host: Rc<dyn SearchHost>,
    bus: Option<MatchBus>,
    torn_down: Cell<bool>,
    status: Cell<BridgeStatus>,
    listener: Cell<Option<(NodeHandle, ListenerId)>>,
    pending: RefCell<Option<Cleanup>>,
}

pub struct MatchBridge {
    inner: Rc<BridgeInner>,
}

impl MatchBridge {
    /// Start bridging `segment` of `store`.
    ///
    /// `bus` is `Some` only when the unit participates in cross-component
    /// coordination.
    pub fn attach(
        store: Rc<SegmentStore>,
        segment: SegmentId,
        slot: &HandleSlot,
        host: Rc<dyn SearchHost>,
        support: RevealSupport,
        bus: Option<MatchBus>,
    ) -> Self {
        let status = if support.is_native() {
            BridgeStatus::Waiting
        } else {
            BridgeStatus::Inactive
        };
        let inner = Rc::new(BridgeInner {
            segment,
            store,
            host,
            bus,
            torn_down: Cell::new(false),
            status: Cell::new(status),
            listener: Cell::new(None),
            pending: RefCell::new(None),
        });

        if status == BridgeStatus::Inactive {
            trace!(
                unit = %inner.store.unit(),
                segment = %inner.segment,
                "reveal-on-find unsupported, segment stays manual"
            );
            return Self { inner };
        }

        let weak = Rc::downgrade(&inner);
        let cancel = slot.when_ready(move |readiness| {
            if let Some(inner) = weak.upgrade() {
                on_readiness(&inner, readiness);
            }
        });
        // A slot that was already complete ran the callback synchronously.
        if inner.status.get() == BridgeStatus::Waiting {
            *inner.pending.borrow_mut() = Some(cancel);
        }

        Self { inner }
    }

    pub fn segment(&self) -> &SegmentId {
        &self.inner.segment
    }

    pub fn status(&self) -> BridgeStatus {
        self.inner.status.get()
    }

    /// Deliver the native signal directly, for hosts that route signals
    /// themselves instead of through `listen`.
    pub fn deliver(&self) -> Result<()> {
        handle_signal(&self.inner)
    }

    /// Cancel the pending wait and remove the native listener. Idempotent.
    pub fn teardown(&self) {
        let inner = &self.inner;
        if inner.torn_down.replace(true) {
            return;
        }

        let pending = inner.pending.borrow_mut().take();
        if let Some(cancel) = pending {
            cancel();
        }
        if let Some((node, listener)) = inner.listener.take() {
            inner.host.unlisten(node, listener);
        }
        inner.status.set(BridgeStatus::TornDown);
        trace!(unit = %inner.store.unit(), segment = %inner.segment, "bridge torn down");
    }
}

impl Drop for MatchBridge {
    fn drop(&mut self) {
        self.teardown();
    }
}

fn on_readiness(inner: &Rc<BridgeInner>, readiness: Readiness) {
    inner.pending.borrow_mut().take();
    if inner.torn_down.get() {
        return;
    }

    match readiness {
        Readiness::Ready(node) => {
            let weak: Weak<BridgeInner> = Rc::downgrade(inner);
            let listener = inner.host.listen(
                node,
                Rc::new(move || {
                    if let Some(inner) = weak.upgrade() {
                        if let Err(err) = handle_signal(&inner) {
                            trace!(%err, "reveal signal dropped");
                        }
                    }
                }),
            );

            match listener {
                Some(id) => {
                    inner.listener.set(Some((node, id)));
                    inner.status.set(BridgeStatus::Listening(node));
                    debug!(
                        unit = %inner.store.unit(),
                        segment = %inner.segment,
                        node = node.0,
                        "reveal listener attached"
                    );
                }
                None => give_up(inner),
            }
        }
        Readiness::Abandoned => give_up(inner),
    }
}

fn give_up(inner: &BridgeInner) {
    inner.status.set(BridgeStatus::GaveUp);
    let err = RevealError::HandleNotReady {
        unit: inner.store.unit().clone(),
        segment: inner.segment.clone(),
    };
    warn!(%err, "auto-reveal disabled for segment, manual toggle still works");
}

fn handle_signal(inner: &BridgeInner) -> Result<()> {
    if inner.torn_down.get() {
        return Err(RevealError::StaleCallback {
            unit: inner.store.unit().clone(),
            segment: inner.segment.clone(),
        });
    }
    if inner.status.get() == BridgeStatus::Inactive {
        return Err(RevealError::UnsupportedFeature);
    }

    let opened = inner.store.open(&inner.segment)?;
    debug!(
        unit = %inner.store.unit(),
        segment = %inner.segment,
        opened,
        "found via search"
    );

    if let Some(bus) = &inner.bus {
        let event = MatchEvent::new(
            inner.store.unit().clone(),
            inner.segment.clone(),
            MatchCause::AutomaticMatch,
        );
        match bus.publish(event) {
            Ok(_) | Err(RevealError::ReentrantDispatch { .. }) => {}
            Err(err) => return Err(err),
        }
    }
    Ok(())
}
