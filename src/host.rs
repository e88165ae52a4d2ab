//! Host - The rendering surface and its native find-in-page.
//!
//! The core never hides anything itself. It tells the host which exposure
//! attributes a node must carry and listens for the host's "found while
//! hidden" signal. [`SearchHost`] is that seam; [`HeadlessHost`] is an
//! in-memory surface with a document-ordered find, used by tests and demos.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use tracing::{info, trace};

use crate::types::{Exposure, ListenerId, NodeHandle};

// =============================================================================
// Host Trait
// =============================================================================

/// Native listener for the "found while hidden" signal.
pub type RevealListener = Rc<dyn Fn()>;

pub trait SearchHost {
    /// Whether the host reveals hidden reveal-on-find nodes and signals it.
    fn supports_reveal_on_find(&self) -> bool;

    /// Install a reveal listener on `node`. `None` if the node is gone.
    fn listen(&self, node: NodeHandle, listener: RevealListener) -> Option<ListenerId>;

    fn unlisten(&self, node: NodeHandle, listener: ListenerId);

    /// Replace the exposure attributes carried by `node`.
    fn apply_exposure(&self, node: NodeHandle, exposure: Exposure);
}

// =============================================================================
// Capability Probe
// =============================================================================

/// Result of probing the host once at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevealSupport {
    /// Find-in-page opens segments automatically.
    Native,
    /// No native signal. Segments open by manual toggle only.
    Degraded,
}

impl RevealSupport {
    pub fn probe(host: &dyn SearchHost) -> Self {
        let support = if host.supports_reveal_on_find() {
            Self::Native
        } else {
            Self::Degraded
        };
        info!(?support, "probed reveal-on-find support");
        support
    }

    pub fn is_native(self) -> bool {
        self == Self::Native
    }
}

// =============================================================================
// Headless Host
// =============================================================================

struct HeadlessNode {
    handle: NodeHandle,
    text: String,
    exposure: Exposure,
    listeners: Vec<(ListenerId, RevealListener)>,
}

/// In-memory rendering surface.
///
/// Nodes are kept in document (creation) order. Hidden nodes stay searchable;
/// when a search lands in a node carrying `REVEAL_ON_FIND` the node's
/// listeners fire. Clearing the marker is left to the application.
pub struct HeadlessHost {
    reveal_supported: bool,
    nodes: RefCell<Vec<HeadlessNode>>,
    next_node: Cell<u64>,
    next_listener: Cell<u64>,
    cursor: Cell<Option<NodeHandle>>,
}

impl Default for HeadlessHost {
    fn default() -> Self {
        Self::new()
    }
}

impl HeadlessHost {
    pub fn new() -> Self {
        Self::with_support(true)
    }

    /// A host that never signals, like a browser without reveal-on-find.
    pub fn without_reveal() -> Self {
        Self::with_support(false)
    }

    fn with_support(reveal_supported: bool) -> Self {
        Self {
            reveal_supported,
            nodes: RefCell::new(Vec::new()),
            next_node: Cell::new(1),
            next_listener: Cell::new(1),
            cursor: Cell::new(None),
        }
    }

    /// Append a node holding `text` at the end of the document.
    pub fn create_node(&self, text: impl Into<String>) -> NodeHandle {
        let handle = NodeHandle(self.next_node.get());
        self.next_node.set(handle.0 + 1);
        self.nodes.borrow_mut().push(HeadlessNode {
            handle,
            text: text.into(),
            exposure: Exposure::NONE,
            listeners: Vec::new(),
        });
        handle
    }

    pub fn remove_node(&self, node: NodeHandle) -> bool {
        let mut nodes = self.nodes.borrow_mut();
        let before = nodes.len();
        nodes.retain(|n| n.handle != node);
        nodes.len() != before
    }

    pub fn exposure(&self, node: NodeHandle) -> Option<Exposure> {
        self.nodes
            .borrow()
            .iter()
            .find(|n| n.handle == node)
            .map(|n| n.exposure)
    }

    pub fn text(&self, node: NodeHandle) -> Option<String> {
        self.nodes
            .borrow()
            .iter()
            .find(|n| n.handle == node)
            .map(|n| n.text.clone())
    }

    pub fn listener_count(&self, node: NodeHandle) -> usize {
        self.nodes
            .borrow()
            .iter()
            .find(|n| n.handle == node)
            .map_or(0, |n| n.listeners.len())
    }

    /// Deliver the native signal to `node`'s listeners, as the host would when
    /// search lands in it. Returns how many listeners ran.
    pub fn fire_reveal(&self, node: NodeHandle) -> usize {
        if !self.reveal_supported {
            return 0;
        }

        // Snapshot: listeners may unlisten or change exposure while running.
        let listeners: Vec<RevealListener> = match self.nodes.borrow().iter().find(|n| n.handle == node) {
            Some(n) => n.listeners.iter().map(|(_, l)| l.clone()).collect(),
            None => return 0,
        };

        trace!(node = node.0, listeners = listeners.len(), "reveal signal");
        for listener in &listeners {
            listener();
        }
        listeners.len()
    }

    /// Every node whose text contains `needle`, in document order.
    ///
    /// Hidden reveal-on-find nodes are signalled as the search visits them,
    /// so later visits see the exposure left by earlier ones.
    pub fn find_all(&self, needle: &str) -> Vec<NodeHandle> {
        let matches = self.matching_nodes(needle);
        for node in &matches {
            self.visit(*node);
        }
        matches
    }

    /// Next match after the previous `find_next` hit, wrapping around.
    pub fn find_next(&self, needle: &str) -> Option<NodeHandle> {
        let matches = self.matching_nodes(needle);
        if matches.is_empty() {
            return None;
        }

        let next = match self.cursor.get().and_then(|c| matches.iter().position(|n| *n == c)) {
            Some(pos) => matches[(pos + 1) % matches.len()],
            None => matches[0],
        };
        self.cursor.set(Some(next));
        self.visit(next);
        Some(next)
    }

    fn matching_nodes(&self, needle: &str) -> Vec<NodeHandle> {
        let needle = needle.to_lowercase();
        self.nodes
            .borrow()
            .iter()
            .filter(|n| n.text.to_lowercase().contains(&needle))
            .map(|n| n.handle)
            .collect()
    }

    fn visit(&self, node: NodeHandle) {
        let hidden = self
            .exposure(node)
            .is_some_and(|exposure| exposure.contains(Exposure::REVEAL_ON_FIND));
        if hidden {
            self.fire_reveal(node);
        }
    }
}

impl SearchHost for HeadlessHost {
    fn supports_reveal_on_find(&self) -> bool {
        self.reveal_supported
    }

    fn listen(&self, node: NodeHandle, listener: RevealListener) -> Option<ListenerId> {
        let mut nodes = self.nodes.borrow_mut();
        let target = nodes.iter_mut().find(|n| n.handle == node)?;
        let id = ListenerId(self.next_listener.get());
        self.next_listener.set(id.0 + 1);
        target.listeners.push((id, listener));
        Some(id)
    }

    fn unlisten(&self, node: NodeHandle, listener: ListenerId) {
        let mut nodes = self.nodes.borrow_mut();
        if let Some(target) = nodes.iter_mut().find(|n| n.handle == node) {
            target.listeners.retain(|(id, _)| *id != listener);
        }
    }

    fn apply_exposure(&self, node: NodeHandle, exposure: Exposure) {
        let mut nodes = self.nodes.borrow_mut();
        if let Some(target) = nodes.iter_mut().find(|n| n.handle == node) {
            target.exposure = exposure;
        }
    }
}
