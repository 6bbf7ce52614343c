//! Identity types shared by the catalog, the algebra and the kernel.
use serde::{Deserialize, Serialize};
use std::fmt;

/// A map or dataset identity rendered as `name@mapset`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MapId {
    pub name: String,
    pub mapset: String,
}

/// Datasets use the same `name@mapset` identity as maps.
pub type DatasetId = MapId;

impl MapId {
    pub fn new(name: impl Into<String>, mapset: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            mapset: mapset.into(),
        }
    }

    /// Parse `name@mapset`, falling back to `default_mapset` for a bare name.
    pub fn parse(value: &str, default_mapset: &str) -> Option<Self> {
        let value = value.trim();
        match value.split_once('@') {
            Some((name, mapset)) if !name.is_empty() && !mapset.is_empty() => {
                Some(Self::new(name, mapset))
            }
            Some(_) => None,
            None if !value.is_empty() => Some(Self::new(value, default_mapset)),
            None => None,
        }
    }

    pub fn id(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for MapId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name, self.mapset)
    }
}

/// The kind of data a map holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MapKind {
    Raster,
    Vector,
    Raster3d,
}

impl MapKind {
    pub const ALL: [MapKind; 3] = [MapKind::Raster, MapKind::Vector, MapKind::Raster3d];

    pub fn as_str(self) -> &'static str {
        match self {
            MapKind::Raster => "raster",
            MapKind::Vector => "vector",
            MapKind::Raster3d => "raster3d",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "raster" | "rast" => Some(MapKind::Raster),
            "vector" | "vect" => Some(MapKind::Vector),
            "raster3d" | "rast3d" | "raster_3d" => Some(MapKind::Raster3d),
            _ => None,
        }
    }

    pub fn dataset_kind(self) -> StdsKind {
        match self {
            MapKind::Raster => StdsKind::Strds,
            MapKind::Vector => StdsKind::Stvds,
            MapKind::Raster3d => StdsKind::Str3ds,
        }
    }
}

impl fmt::Display for MapKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The kind of a space-time dataset; one per [`MapKind`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StdsKind {
    Strds,
    Stvds,
    Str3ds,
}

impl StdsKind {
    pub fn as_str(self) -> &'static str {
        match self {
            StdsKind::Strds => "strds",
            StdsKind::Stvds => "stvds",
            StdsKind::Str3ds => "str3ds",
        }
    }

    pub fn map_kind(self) -> MapKind {
        match self {
            StdsKind::Strds => MapKind::Raster,
            StdsKind::Stvds => MapKind::Vector,
            StdsKind::Str3ds => MapKind::Raster3d,
        }
    }
}

impl fmt::Display for StdsKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_id_parse() {
        let id = MapId::parse("a1@PERMANENT", "user").unwrap();
        assert_eq!(id, MapId::new("a1", "PERMANENT"));
        assert_eq!(MapId::parse("a1", "user").unwrap().to_string(), "a1@user");
        assert!(MapId::parse("@PERMANENT", "user").is_none());
        assert!(MapId::parse("a1@", "user").is_none());
        assert!(MapId::parse("  ", "user").is_none());
    }

    #[test]
    fn test_kind_mapping() {
        for kind in MapKind::ALL {
            assert_eq!(kind.dataset_kind().map_kind(), kind);
            assert_eq!(MapKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(StdsKind::Str3ds.as_str(), "str3ds");
    }
}
