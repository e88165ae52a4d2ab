//! # spark-reveal
//!
//! Search-reveal visibility synchronization for collapsible UI units.
//!
//! Built on [spark-signals](https://github.com/RLabs-Inc/spark-signals) for fine-grained reactivity.
//!
//! ## Architecture
//!
//! Tabs, accordions and modals hide most of their content. When the host's
//! find-in-page matches text inside a hidden segment, the segment must open
//! and every sibling unit that now shows stale content must close.
//!
//! ```text
//! native signal → MatchBridge → SegmentStore::open → MatchBus → Reconciler → SegmentStore::close
//! ```
//!
//! Each segment's visibility is a reactive `Signal`, so views can derive from
//! it directly.
//!
//! ## Modules
//!
//! - [`types`] - Core types (UnitId, SegmentId, VisibilityState, Exposure, MatchEvent)
//! - [`engine`] - Segment store and handle readiness slots
//! - [`state`] - Match bus, match bridges, reconciler
//! - [`pipeline`] - Coordinator and unit mount handles
//! - [`host`] - Search host capability and the headless host

pub mod engine;
pub mod error;
pub mod host;
pub mod pipeline;
pub mod state;
pub mod types;

// Re-export commonly used items
pub use types::*;

pub use error::{Result, RevealError};

pub use engine::{HandleSlot, Readiness, Segment, SegmentChange, SegmentStore};

pub use host::{HeadlessHost, RevealListener, RevealSupport, SearchHost};

pub use state::{BridgeStatus, MatchBridge, MatchBus, Reconciler, Subscription};

pub use pipeline::{Coordinator, UnitHandle};
