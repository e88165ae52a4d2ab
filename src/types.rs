//! Core types for spark-reveal.
//!
//! These types define the foundation that everything builds on.
//! They flow from the host's search signal through the store and the bus,
//! and define what a rendering surface needs to honor.

use std::fmt;

// =============================================================================
// Cleanup Function
// =============================================================================

/// Cleanup function returned by registrations. Runs at most once.
pub type Cleanup = Box<dyn FnOnce()>;

// =============================================================================
// Identity
// =============================================================================

/// Identity of a mounted unit (a tab strip, a modal, an accordion).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UnitId(String);

impl UnitId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UnitId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for UnitId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Identity of a segment within its unit.
///
/// Tabs usually use names (`"specs"`), accordions positions (`2`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SegmentId(String);

impl SegmentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Id for the segment at `position`, as accordions number their items.
    pub fn at(position: usize) -> Self {
        Self(position.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SegmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SegmentId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for SegmentId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<usize> for SegmentId {
    fn from(position: usize) -> Self {
        Self::at(position)
    }
}

/// Opaque handle to a node on the rendering surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeHandle(pub u64);

/// Identifies one native listener installed on a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(pub u64);

// =============================================================================
// Visibility
// =============================================================================

/// Whether a segment is collapsed or expanded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum VisibilityState {
    #[default]
    Hidden,
    Visible,
}

impl VisibilityState {
    pub fn is_visible(self) -> bool {
        self == Self::Visible
    }

    pub fn flipped(self) -> Self {
        match self {
            Self::Hidden => Self::Visible,
            Self::Visible => Self::Hidden,
        }
    }

    /// Exposure attributes a rendering surface must apply for this state.
    pub fn exposure(self) -> Exposure {
        match self {
            Self::Hidden => Exposure::COLLAPSED,
            Self::Visible => Exposure::NONE,
        }
    }
}

impl fmt::Display for VisibilityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Hidden => f.write_str("hidden"),
            Self::Visible => f.write_str("visible"),
        }
    }
}

// =============================================================================
// Exposure Attributes (bitflags)
// =============================================================================

bitflags::bitflags! {
    /// Attributes that expose (or withhold) a segment from the user.
    ///
    /// A hidden segment stays in the render tree so find-in-page still sees
    /// its text; these flags only withdraw interaction and assistive access.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Exposure: u8 {
        const NONE = 0;
        /// Not focusable, not clickable.
        const INERT = 1 << 0;
        /// Excluded from the accessibility tree.
        const ARIA_HIDDEN = 1 << 1;
        /// Hidden, but the host reveals it (and signals) when search lands in it.
        const REVEAL_ON_FIND = 1 << 2;

        const COLLAPSED = Self::INERT.bits() | Self::ARIA_HIDDEN.bits() | Self::REVEAL_ON_FIND.bits();
    }
}

impl Exposure {
    /// True when these attributes are exactly what `state` requires.
    pub fn matches(self, state: VisibilityState) -> bool {
        self == state.exposure()
    }

    pub fn is_interactive(self) -> bool {
        !self.contains(Self::INERT)
    }
}

// =============================================================================
// Units
// =============================================================================

/// How segments of a unit relate to each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum UnitMode {
    /// At most one segment visible (tabs, modal).
    #[default]
    Exclusive,
    /// Any subset visible (accordion).
    Independent,
}

/// Configuration for a unit at mount time.
///
/// ```ignore
/// let props = UnitProps {
///     id: Some("faq".into()),
///     mode: UnitMode::Independent,
///     segments: (0..4).map(SegmentId::at).collect(),
///     cross_component: true,
///     ..Default::default()
/// };
/// ```
#[derive(Debug, Clone, Default)]
pub struct UnitProps {
    /// Unit id. Generated (`unit-N`) if not provided.
    pub id: Option<UnitId>,
    pub mode: UnitMode,
    /// Segments in document order.
    pub segments: Vec<SegmentId>,
    /// Segments visible at mount. Exclusive units keep only the last one.
    pub initially_open: Vec<SegmentId>,
    /// Publish to and react to sibling units through the bus.
    pub cross_component: bool,
}

// =============================================================================
// Match Events
// =============================================================================

/// Why a segment was opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MatchCause {
    /// The host's find-in-page landed in the hidden segment.
    AutomaticMatch,
    /// The user opened it (tab click, accordion header).
    ManualToggle,
}

impl fmt::Display for MatchCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AutomaticMatch => f.write_str("automatic"),
            Self::ManualToggle => f.write_str("manual"),
        }
    }
}

/// Broadcast on the bus when a segment opens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchEvent {
    pub unit_id: UnitId,
    pub segment_id: SegmentId,
    pub cause: MatchCause,
}

impl MatchEvent {
    pub fn new(unit_id: UnitId, segment_id: SegmentId, cause: MatchCause) -> Self {
        Self { unit_id, segment_id, cause }
    }
}
