//! The flow hash engine (spec §4.4): one independent [`shard::Shard`] per
//! worker thread, plus the [`scanner`] that walks all of them looking for
//! expired records.

pub mod record;
pub mod scanner;
pub mod shard;

pub use record::{DirectionCounters, ExpiryReason, FlowRecord, IcmpInfo};
pub use shard::{LookupOutcome, Shard};
