//! Typed catalog rows and the [`Record`] trait that maps them to tables.

use super::query::{Row, SqlValue};
use crate::error::CatalogError;
use crate::temporal::extent::DATETIME_FORMAT;
use crate::temporal::{TemporalExtent, TemporalType, TimeUnit, parse_datetime};
use crate::types::{DatasetId, MapId, MapKind, StdsKind};
use chrono::NaiveDateTime;
use geo::{Rect, coord};

/// Anything that names a family of tables (`raster_*`, `strds_*`, ...).
pub trait TableKind: Copy {
    fn table_prefix(self) -> &'static str;
}

impl TableKind for MapKind {
    fn table_prefix(self) -> &'static str {
        self.as_str()
    }
}

impl TableKind for StdsKind {
    fn table_prefix(self) -> &'static str {
        self.as_str()
    }
}

/// A typed row stored in `<prefix>_<SUFFIX>`, keyed by [`Record::KEY`].
pub trait Record: Sized {
    type Kind: TableKind;
    const SUFFIX: &'static str;
    const KEY: &'static str = "id";

    fn kind(&self) -> Self::Kind;
    fn key(&self) -> String;
    fn columns(&self) -> Vec<(&'static str, SqlValue)>;
    fn from_row(kind: Self::Kind, row: &Row) -> Result<Self, CatalogError>;

    fn table_for(kind: Self::Kind) -> String {
        format!("{}_{}", kind.table_prefix(), Self::SUFFIX)
    }

    fn table(&self) -> String {
        Self::table_for(self.kind())
    }
}

fn invalid(table: &str, message: impl Into<String>) -> CatalogError {
    CatalogError::InvalidRow {
        table: table.to_string(),
        message: message.into(),
    }
}

fn parse_id(table: &str, row: &Row, column: &str) -> Result<MapId, CatalogError> {
    let text = row.text(table, column)?;
    MapId::parse(&text, "")
        .filter(|id| !id.mapset.is_empty())
        .ok_or_else(|| invalid(table, format!("malformed id `{text}`")))
}

fn parse_time(table: &str, row: &Row, column: &str) -> Result<NaiveDateTime, CatalogError> {
    let text = row.text(table, column)?;
    parse_datetime(&text).ok_or_else(|| invalid(table, format!("malformed time `{text}`")))
}

fn parse_temporal_type(table: &str, row: &Row) -> Result<TemporalType, CatalogError> {
    let text = row.text(table, "temporal_type")?;
    TemporalType::parse(&text)
        .ok_or_else(|| invalid(table, format!("unknown temporal type `{text}`")))
}

fn extent_columns(extent: Option<&TemporalExtent>) -> [(&'static str, SqlValue); 3] {
    match extent {
        Some(TemporalExtent::Absolute { start, end }) => [
            ("start_time", start.format(DATETIME_FORMAT).to_string().into()),
            ("end_time", end.format(DATETIME_FORMAT).to_string().into()),
            ("unit", SqlValue::Null),
        ],
        Some(TemporalExtent::Relative { start, end, unit }) => [
            ("start_time", (*start).into()),
            ("end_time", (*end).into()),
            ("unit", unit.name().into()),
        ],
        None => [
            ("start_time", SqlValue::Null),
            ("end_time", SqlValue::Null),
            ("unit", SqlValue::Null),
        ],
    }
}

fn extent_from_row(table: &str, row: &Row) -> Result<Option<TemporalExtent>, CatalogError> {
    if row.get("start_time").is_none_or(SqlValue::is_null) {
        return Ok(None);
    }
    let extent = match row.optional_text("unit") {
        Some(unit) => {
            let unit = TimeUnit::parse(&unit)
                .ok_or_else(|| invalid(table, format!("unknown unit `{unit}`")))?;
            TemporalExtent::relative(
                row.integer(table, "start_time")?,
                row.integer(table, "end_time")?,
                unit,
            )
        }
        None => TemporalExtent::absolute(
            parse_time(table, row, "start_time")?,
            parse_time(table, row, "end_time")?,
        ),
    };
    extent.map(Some).map_err(|e| invalid(table, e.to_string()))
}

fn bounds_columns(bounds: Option<&Rect<f64>>) -> [(&'static str, SqlValue); 4] {
    [
        ("north", bounds.map(|b| b.max().y).into()),
        ("south", bounds.map(|b| b.min().y).into()),
        ("east", bounds.map(|b| b.max().x).into()),
        ("west", bounds.map(|b| b.min().x).into()),
    ]
}

fn bounds_from_row(row: &Row) -> Option<Rect<f64>> {
    let north = row.optional_real("north")?;
    let south = row.optional_real("south")?;
    let east = row.optional_real("east")?;
    let west = row.optional_real("west")?;
    Some(Rect::new(
        coord! { x: west, y: south },
        coord! { x: east, y: north },
    ))
}

/// `raster_base`, `vector_base`, `raster3d_base`.
#[derive(Debug, Clone, PartialEq)]
pub struct MapBase {
    pub id: MapId,
    pub kind: MapKind,
    pub creator: String,
    pub creation_time: NaiveDateTime,
    pub temporal_type: TemporalType,
    /// Vector maps only
    pub layer: Option<String>,
}

impl Record for MapBase {
    type Kind = MapKind;
    const SUFFIX: &'static str = "base";

    fn kind(&self) -> MapKind {
        self.kind
    }

    fn key(&self) -> String {
        self.id.id()
    }

    fn columns(&self) -> Vec<(&'static str, SqlValue)> {
        let mut columns = vec![
            ("id", self.id.id().into()),
            ("name", self.id.name.clone().into()),
            ("mapset", self.id.mapset.clone().into()),
            ("creator", self.creator.clone().into()),
            (
                "creation_time",
                self.creation_time.format(DATETIME_FORMAT).to_string().into(),
            ),
            ("temporal_type", self.temporal_type.as_str().into()),
        ];
        if self.kind == MapKind::Vector {
            columns.push(("layer", self.layer.clone().into()));
        }
        columns
    }

    fn from_row(kind: MapKind, row: &Row) -> Result<Self, CatalogError> {
        let table = Self::table_for(kind);
        Ok(Self {
            id: MapId::new(row.text(&table, "name")?, row.text(&table, "mapset")?),
            kind,
            creator: row.text(&table, "creator")?,
            creation_time: parse_time(&table, row, "creation_time")?,
            temporal_type: parse_temporal_type(&table, row)?,
            layer: row.optional_text("layer"),
        })
    }
}

/// `<map kind>_time`: the validity interval of one map.
#[derive(Debug, Clone, PartialEq)]
pub struct MapTime {
    pub id: MapId,
    pub kind: MapKind,
    pub extent: TemporalExtent,
}

impl Record for MapTime {
    type Kind = MapKind;
    const SUFFIX: &'static str = "time";

    fn kind(&self) -> MapKind {
        self.kind
    }

    fn key(&self) -> String {
        self.id.id()
    }

    fn columns(&self) -> Vec<(&'static str, SqlValue)> {
        let mut columns = vec![("id", self.id.id().into())];
        columns.extend(extent_columns(Some(&self.extent)));
        columns
    }

    fn from_row(kind: MapKind, row: &Row) -> Result<Self, CatalogError> {
        let table = Self::table_for(kind);
        let extent = extent_from_row(&table, row)?
            .ok_or_else(|| invalid(&table, "map without start time"))?;
        Ok(Self {
            id: parse_id(&table, row, "id")?,
            kind,
            extent,
        })
    }
}

/// `<map kind>_metadata`: value range and spatial bounds.
#[derive(Debug, Clone, PartialEq)]
pub struct MapMetadata {
    pub id: MapId,
    pub kind: MapKind,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub bounds: Option<Rect<f64>>,
}

impl Record for MapMetadata {
    type Kind = MapKind;
    const SUFFIX: &'static str = "metadata";

    fn kind(&self) -> MapKind {
        self.kind
    }

    fn key(&self) -> String {
        self.id.id()
    }

    fn columns(&self) -> Vec<(&'static str, SqlValue)> {
        let mut columns = vec![
            ("id", self.id.id().into()),
            ("min", self.min.into()),
            ("max", self.max.into()),
        ];
        columns.extend(bounds_columns(self.bounds.as_ref()));
        columns
    }

    fn from_row(kind: MapKind, row: &Row) -> Result<Self, CatalogError> {
        let table = Self::table_for(kind);
        Ok(Self {
            id: parse_id(&table, row, "id")?,
            kind,
            min: row.optional_real("min"),
            max: row.optional_real("max"),
            bounds: bounds_from_row(row),
        })
    }
}

/// `strds_base`, `stvds_base`, `str3ds_base`.
#[derive(Debug, Clone, PartialEq)]
pub struct DatasetBase {
    pub id: DatasetId,
    pub kind: StdsKind,
    pub creator: String,
    pub creation_time: NaiveDateTime,
    pub temporal_type: TemporalType,
    pub semantic_type: String,
}

impl Record for DatasetBase {
    type Kind = StdsKind;
    const SUFFIX: &'static str = "base";

    fn kind(&self) -> StdsKind {
        self.kind
    }

    fn key(&self) -> String {
        self.id.id()
    }

    fn columns(&self) -> Vec<(&'static str, SqlValue)> {
        vec![
            ("id", self.id.id().into()),
            ("name", self.id.name.clone().into()),
            ("mapset", self.id.mapset.clone().into()),
            ("creator", self.creator.clone().into()),
            (
                "creation_time",
                self.creation_time.format(DATETIME_FORMAT).to_string().into(),
            ),
            ("temporal_type", self.temporal_type.as_str().into()),
            ("semantic_type", self.semantic_type.clone().into()),
        ]
    }

    fn from_row(kind: StdsKind, row: &Row) -> Result<Self, CatalogError> {
        let table = Self::table_for(kind);
        Ok(Self {
            id: MapId::new(row.text(&table, "name")?, row.text(&table, "mapset")?),
            kind,
            creator: row.text(&table, "creator")?,
            creation_time: parse_time(&table, row, "creation_time")?,
            temporal_type: parse_temporal_type(&table, row)?,
            semantic_type: row.text(&table, "semantic_type")?,
        })
    }
}

/// `<stds kind>_metadata`: aggregates over the registered maps.
#[derive(Debug, Clone, PartialEq)]
pub struct DatasetMetadata {
    pub id: DatasetId,
    pub kind: StdsKind,
    pub map_count: i64,
    pub min_min: Option<f64>,
    pub max_max: Option<f64>,
    pub extent: Option<TemporalExtent>,
    pub granularity: Option<String>,
    pub topology_ok: bool,
    /// False while a registration is in progress or after one failed
    pub complete: bool,
    pub bounds: Option<Rect<f64>>,
}

impl DatasetMetadata {
    pub fn empty(id: DatasetId, kind: StdsKind) -> Self {
        Self {
            id,
            kind,
            map_count: 0,
            min_min: None,
            max_max: None,
            extent: None,
            granularity: None,
            topology_ok: true,
            complete: false,
            bounds: None,
        }
    }
}

impl Record for DatasetMetadata {
    type Kind = StdsKind;
    const SUFFIX: &'static str = "metadata";

    fn kind(&self) -> StdsKind {
        self.kind
    }

    fn key(&self) -> String {
        self.id.id()
    }

    fn columns(&self) -> Vec<(&'static str, SqlValue)> {
        let mut columns = vec![
            ("id", self.id.id().into()),
            ("number_of_maps", self.map_count.into()),
            ("min_min", self.min_min.into()),
            ("max_max", self.max_max.into()),
        ];
        columns.extend(extent_columns(self.extent.as_ref()));
        columns.extend([
            ("granularity", self.granularity.clone().into()),
            ("topology_ok", self.topology_ok.into()),
            ("complete", self.complete.into()),
        ]);
        columns.extend(bounds_columns(self.bounds.as_ref()));
        columns
    }

    fn from_row(kind: StdsKind, row: &Row) -> Result<Self, CatalogError> {
        let table = Self::table_for(kind);
        Ok(Self {
            id: parse_id(&table, row, "id")?,
            kind,
            map_count: row.integer(&table, "number_of_maps")?,
            min_min: row.optional_real("min_min"),
            max_max: row.optional_real("max_max"),
            extent: extent_from_row(&table, row)?,
            granularity: row.optional_text("granularity"),
            topology_ok: row.integer(&table, "topology_ok")? != 0,
            complete: row.integer(&table, "complete")? != 0,
            bounds: bounds_from_row(row),
        })
    }
}

/// `<stds kind>_register`: map ownership, one owner per map.
#[derive(Debug, Clone, PartialEq)]
pub struct Registration {
    pub kind: StdsKind,
    pub map_id: MapId,
    pub stds_id: DatasetId,
}

impl Record for Registration {
    type Kind = StdsKind;
    const SUFFIX: &'static str = "register";
    const KEY: &'static str = "map_id";

    fn kind(&self) -> StdsKind {
        self.kind
    }

    fn key(&self) -> String {
        self.map_id.id()
    }

    fn columns(&self) -> Vec<(&'static str, SqlValue)> {
        vec![
            ("map_id", self.map_id.id().into()),
            ("stds_id", self.stds_id.id().into()),
        ]
    }

    fn from_row(kind: StdsKind, row: &Row) -> Result<Self, CatalogError> {
        let table = Self::table_for(kind);
        Ok(Self {
            kind,
            map_id: parse_id(&table, row, "map_id")?,
            stds_id: parse_id(&table, row, "stds_id")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row_of(columns: Vec<(&'static str, SqlValue)>) -> Row {
        let (names, values): (Vec<_>, Vec<_>) =
            columns.into_iter().map(|(c, v)| (c.to_string(), v)).unzip();
        Row::new(names, values)
    }

    #[test]
    fn test_map_base_columns() {
        let base = MapBase {
            id: MapId::new("roads", "PERMANENT"),
            kind: MapKind::Vector,
            creator: "soeren".into(),
            creation_time: parse_datetime("2020-05-01 10:00:00").unwrap(),
            temporal_type: TemporalType::Absolute,
            layer: Some("1".into()),
        };
        assert_eq!(base.table(), "vector_base");
        let columns = base.columns();
        assert_eq!(columns[0], ("id", SqlValue::Text("roads@PERMANENT".into())));
        assert_eq!(columns.last().map(|c| c.0), Some("layer"));

        let parsed = MapBase::from_row(MapKind::Vector, &row_of(columns)).unwrap();
        assert_eq!(parsed, base);
    }

    #[test]
    fn test_map_time_relative_and_absolute() {
        let rel = MapTime {
            id: MapId::new("a", "m"),
            kind: MapKind::Raster,
            extent: TemporalExtent::relative(3, 5, TimeUnit::Year).unwrap(),
        };
        let row = row_of(rel.columns());
        assert_eq!(row.get("unit"), Some(&SqlValue::Text("year".into())));
        assert_eq!(MapTime::from_row(MapKind::Raster, &row).unwrap(), rel);

        let abs = MapTime {
            extent: TemporalExtent::parse_absolute("2001-01-01", "2001-01-02").unwrap(),
            ..rel
        };
        let row = row_of(abs.columns());
        assert!(row.get("unit").unwrap().is_null());
        assert_eq!(MapTime::from_row(MapKind::Raster, &row).unwrap(), abs);
    }

    #[test]
    fn test_dataset_metadata_bounds() {
        let mut meta = DatasetMetadata::empty(MapId::new("A", "PERMANENT"), StdsKind::Strds);
        meta.bounds = Some(Rect::new(coord! { x: 0.0, y: 0.0 }, coord! { x: 10.0, y: 5.0 }));
        meta.granularity = Some("1 day".into());
        let row = row_of(meta.columns());
        assert_eq!(row.optional_real("north"), Some(5.0));
        let parsed = DatasetMetadata::from_row(StdsKind::Strds, &row).unwrap();
        assert_eq!(parsed, meta);
        assert_eq!(parsed.table(), "strds_metadata");
    }

    #[test]
    fn test_registration_key_column() {
        assert_eq!(Registration::KEY, "map_id");
        assert_eq!(Registration::table_for(StdsKind::Stvds), "stvds_register");
    }

    #[test]
    fn test_malformed_row() {
        let row = row_of(vec![("id", "broken".into()), ("min", SqlValue::Null)]);
        let err = MapTime::from_row(MapKind::Raster, &row).unwrap_err();
        assert!(matches!(err, CatalogError::InvalidRow { .. }));
    }
}
