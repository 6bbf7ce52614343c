//! Extent merging for matched pairs and the topology summary of a series.

use crate::temporal::{
    Granularity, TemporalExtent, compute_granularity, is_contiguous, overall_extent,
};
use serde::{Deserialize, Serialize};
use std::fmt;

/// How the extents of a matched pair combine into the result extent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtentCode {
    /// `l`: keep the left extent
    Left,
    /// `r`: take the right extent
    Right,
    /// `i`: intersection, pair dropped when empty
    Intersect,
    /// `u`: union of touching or overlapping extents
    Union,
    /// `d`: span of both extents even when they are disjoint
    Disjoint,
}

impl ExtentCode {
    pub fn parse(code: &str) -> Option<Self> {
        match code.trim().to_ascii_lowercase().as_str() {
            "l" | "left" => Some(ExtentCode::Left),
            "r" | "right" => Some(ExtentCode::Right),
            "i" | "intersect" | "intersection" => Some(ExtentCode::Intersect),
            "u" | "union" => Some(ExtentCode::Union),
            "d" | "disjoint" | "disjoint_union" => Some(ExtentCode::Disjoint),
            _ => None,
        }
    }

    pub fn letter(self) -> char {
        match self {
            ExtentCode::Left => 'l',
            ExtentCode::Right => 'r',
            ExtentCode::Intersect => 'i',
            ExtentCode::Union => 'u',
            ExtentCode::Disjoint => 'd',
        }
    }
}

impl fmt::Display for ExtentCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.letter())
    }
}

/// Result extent of a matched pair, `None` when the pair yields no extent.
pub fn resolve(a: &TemporalExtent, b: &TemporalExtent, code: ExtentCode) -> Option<TemporalExtent> {
    match code {
        ExtentCode::Left => Some(*a),
        ExtentCode::Right => Some(*b),
        ExtentCode::Intersect => a.intersection(b),
        ExtentCode::Union => a.union(b),
        ExtentCode::Disjoint => a.disjoint_union(b),
    }
}

/// Granularity, topology flag and overall extent of a resolved series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Topology {
    pub granularity: Option<Granularity>,
    pub topology_ok: bool,
    pub extent: Option<TemporalExtent>,
}

pub fn summarize(extents: &[TemporalExtent]) -> Topology {
    Topology {
        granularity: compute_granularity(extents),
        topology_ok: is_contiguous(extents),
        extent: overall_extent(extents),
    }
}
