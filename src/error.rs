//! Error taxonomy.
//!
//! None of these are fatal. The protocol failures (`UnsupportedFeature`,
//! `HandleNotReady`, `ReentrantDispatch`, `StaleCallback`) all degrade to less
//! automation while manual toggling keeps working; callers usually log them and
//! move on.

use crate::types::{SegmentId, UnitId};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RevealError {
    /// The host cannot reveal hidden content from find-in-page.
    #[error("host does not support reveal-on-find")]
    UnsupportedFeature,

    /// The rendering surface gave up on producing the segment's node.
    #[error("node for segment `{segment}` of unit `{unit}` never became ready")]
    HandleNotReady { unit: UnitId, segment: SegmentId },

    /// A publish arrived while the bus was dispatching. The event is queued,
    /// not lost.
    #[error("publish during dispatch, queued behind {pending} event(s)")]
    ReentrantDispatch { pending: usize },

    /// A callback fired after its owning unit tore down and was ignored.
    #[error("callback for segment `{segment}` of unit `{unit}` fired after teardown")]
    StaleCallback { unit: UnitId, segment: SegmentId },

    #[error("unit `{unit}` has no segment `{segment}`")]
    UnknownSegment { unit: UnitId, segment: SegmentId },

    #[error("unit `{0}` is already mounted")]
    DuplicateUnit(UnitId),
}

pub type Result<T> = std::result::Result<T, RevealError>;
