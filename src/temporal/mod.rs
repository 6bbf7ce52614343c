//! Temporal extent model: intervals, Allen relations, increments and granularity.

pub mod extent;
pub mod granularity;
pub mod increment;
pub mod relation;

pub use extent::{TemporalExtent, TemporalType, TimeUnit, overall_extent, parse_datetime};
pub use granularity::{Granularity, compute_granularity, is_contiguous};
pub use increment::TimeIncrement;
pub use relation::{Relation, RelationSet};
