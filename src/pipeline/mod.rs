//! Mount Pipeline
//!
//! Wires the lower layers together per unit:
//!
//! ```text
//! UnitProps → SegmentStore + HandleSlots → MatchBridges → Reconciler (bus)
//! ```
//!
//! ## Key Design Principles
//!
//! - **Owned bus**: the [`Coordinator`] owns the only [`MatchBus`](crate::state::MatchBus)
//! - **Explicit readiness**: bridges wait on one-shot slots, never on timers
//! - **Handle-scoped teardown**: dropping a [`UnitHandle`] releases everything it installed

pub mod mount;

pub use mount::{Coordinator, UnitHandle};
