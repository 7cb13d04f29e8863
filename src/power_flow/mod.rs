//! Energy flow reconciliation.
//!
//! Bucket deltas are split into directional flows by a fixed-priority greedy
//! allocator, summed over the period, and rescaled so every flow group agrees
//! with the raw totals. The live extrapolator repeats the same steps for the
//! in-progress delta.

pub mod aggregator;
pub mod allocator;
pub mod live;
pub mod rescale;

pub use aggregator::{AggregationInput, Aggregator, ConversionSettings};
pub use allocator::{allocate, BucketDeltas};
pub use live::LiveDeltaExtrapolator;
pub use rescale::rescale_flows;
