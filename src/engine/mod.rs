//! Engine - Per-unit state.
//!
//! - [`segment_store`] - Visibility state machine with exposure attributes
//! - [`readiness`] - One-shot readiness for rendered nodes

pub mod readiness;
pub mod segment_store;

pub use readiness::{HandleSlot, Readiness};
pub use segment_store::{ChangeHandler, ExposureSink, Segment, SegmentChange, SegmentStore};
