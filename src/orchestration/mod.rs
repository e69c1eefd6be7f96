//! Orchestration layer: execution lanes, the transaction bracket and the
//! manager that drives the tick loop.

pub mod lanes;
mod manager;
pub mod transaction;

pub use lanes::{ChannelRole, Lane, LaneEvent, LaneId, LaneKind, LaneSet, LaneStats, LaneStatus};
pub use manager::{Context, Manager, ManagerStats};
pub use transaction::TransactionStack;
