//! Assembled views over the catalog rows: registered maps and datasets.

use super::records::{DatasetBase, DatasetMetadata, MapBase, MapMetadata, MapTime};
use crate::temporal::{
    Granularity, TemporalExtent, TemporalType, compute_granularity, is_contiguous, overall_extent,
};
use crate::types::{DatasetId, MapId, MapKind, StdsKind};
use chrono::NaiveDateTime;
use geo::{Rect, coord};

/// A time-stamped map as the catalog knows it.
#[derive(Debug, Clone, PartialEq)]
pub struct MapRecord {
    pub id: MapId,
    pub kind: MapKind,
    pub extent: TemporalExtent,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub bounds: Option<Rect<f64>>,
    pub layer: Option<String>,
    /// Owning dataset, `None` for free-standing maps
    pub stds: Option<DatasetId>,
}

impl MapRecord {
    pub fn new(id: MapId, kind: MapKind, extent: TemporalExtent) -> Self {
        Self {
            id,
            kind,
            extent,
            min: None,
            max: None,
            bounds: None,
            layer: None,
            stds: None,
        }
    }

    pub fn with_range(mut self, min: f64, max: f64) -> Self {
        self.min = Some(min);
        self.max = Some(max);
        self
    }

    pub fn with_bounds(mut self, bounds: Option<Rect<f64>>) -> Self {
        self.bounds = bounds;
        self
    }

    pub(crate) fn rows(&self, creator: &str, now: NaiveDateTime) -> (MapBase, MapTime, MapMetadata) {
        let base = MapBase {
            id: self.id.clone(),
            kind: self.kind,
            creator: creator.to_string(),
            creation_time: now,
            temporal_type: self.extent.temporal_type(),
            layer: self.layer.clone(),
        };
        let time = MapTime {
            id: self.id.clone(),
            kind: self.kind,
            extent: self.extent,
        };
        let metadata = MapMetadata {
            id: self.id.clone(),
            kind: self.kind,
            min: self.min,
            max: self.max,
            bounds: self.bounds,
        };
        (base, time, metadata)
    }

    pub(crate) fn from_rows(
        base: MapBase,
        time: MapTime,
        metadata: Option<MapMetadata>,
        stds: Option<DatasetId>,
    ) -> Self {
        let (min, max, bounds) = metadata.map_or((None, None, None), |m| (m.min, m.max, m.bounds));
        Self {
            id: base.id,
            kind: base.kind,
            extent: time.extent,
            min,
            max,
            bounds,
            layer: base.layer,
            stds,
        }
    }
}

/// A space-time dataset with its aggregates and ordered members.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    pub base: DatasetBase,
    pub metadata: DatasetMetadata,
    /// Member ids ordered by start time
    pub maps: Vec<MapId>,
}

impl Dataset {
    pub fn id(&self) -> &DatasetId {
        &self.base.id
    }

    pub fn kind(&self) -> StdsKind {
        self.base.kind
    }

    pub fn temporal_type(&self) -> TemporalType {
        self.base.temporal_type
    }

    pub fn semantic_type(&self) -> &str {
        &self.base.semantic_type
    }

    pub fn map_count(&self) -> usize {
        self.maps.len()
    }

    pub fn min(&self) -> Option<f64> {
        self.metadata.min_min
    }

    pub fn max(&self) -> Option<f64> {
        self.metadata.max_max
    }

    pub fn extent(&self) -> Option<TemporalExtent> {
        self.metadata.extent
    }

    pub fn granularity(&self) -> Option<Granularity> {
        self.metadata.granularity.as_deref().and_then(Granularity::parse)
    }

    pub fn topology_ok(&self) -> bool {
        self.metadata.topology_ok
    }

    pub fn is_complete(&self) -> bool {
        self.metadata.complete
    }
}

fn union_bounds(a: Rect<f64>, b: Rect<f64>) -> Rect<f64> {
    Rect::new(
        coord! { x: a.min().x.min(b.min().x), y: a.min().y.min(b.min().y) },
        coord! { x: a.max().x.max(b.max().x), y: a.max().y.max(b.max().y) },
    )
}

/// Aggregates of a dataset recomputed from its members.
pub(crate) fn aggregate(id: DatasetId, kind: StdsKind, maps: &[MapRecord]) -> DatasetMetadata {
    let extents: Vec<TemporalExtent> = maps.iter().map(|m| m.extent).collect();
    let min_min = maps.iter().filter_map(|m| m.min).reduce(f64::min);
    let max_max = maps.iter().filter_map(|m| m.max).reduce(f64::max);
    let bounds = maps.iter().filter_map(|m| m.bounds).reduce(union_bounds);
    DatasetMetadata {
        id,
        kind,
        map_count: maps.len() as i64,
        min_min,
        max_max,
        extent: overall_extent(&extents),
        granularity: compute_granularity(&extents).map(|g| g.to_string()),
        topology_ok: is_contiguous(&extents),
        complete: true,
        bounds,
    }
}
