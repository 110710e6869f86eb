//! Rate-limit bookkeeping
//!
//! Two layers of quota tracking: per-bucket state learned from response
//! headers, and a process-wide ceiling independent of any bucket.

mod bucket;
mod global;

pub use bucket::{BucketRegistry, Permit};
pub use global::GlobalRateState;
