//! State Module - Cross-component coordination
//!
//! - **Bus** - Owned publish/subscribe channel for match events
//! - **Bridge** - Native search signal to segment transition, per segment
//! - **Reconciler** - Closes an exclusive unit's stale segment on sibling matches

pub mod bridge;
pub mod bus;
pub mod reconciler;

pub use bridge::{BridgeStatus, MatchBridge};
pub use bus::{MatchBus, MatchHandler, Subscription};
pub use reconciler::Reconciler;
