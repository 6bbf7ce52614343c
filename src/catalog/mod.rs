//! Metadata catalog: typed rows for maps and space-time datasets stored in
//! a relational backend.
//!
//! All statements are generated by a [`QueryBuilder`] whose placeholder
//! style is taken from the connection once, when the catalog is opened.
//!
//! ```rust
//! # #[cfg(feature = "sqlite")]
//! # fn main() -> Result<(), spatio_algebra::CatalogError> {
//! use spatio_algebra::catalog::Catalog;
//! use spatio_algebra::{MapId, StdsKind, TemporalType};
//!
//! let catalog = Catalog::in_memory()?;
//! let id = MapId::new("precip", "PERMANENT");
//! catalog.open_new_dataset(StdsKind::Strds, &id, TemporalType::Absolute, "sum", "me")?;
//! assert!(catalog.dataset_exists(StdsKind::Strds, &id)?);
//! # Ok(())
//! # }
//! # #[cfg(not(feature = "sqlite"))]
//! # fn main() {}
//! ```

pub mod connection;
pub mod dataset;
pub mod query;
pub mod records;
pub mod sequence;

pub use connection::CatalogConnection;
#[cfg(feature = "sqlite")]
pub use connection::SqliteConnection;
pub use dataset::{Dataset, MapRecord};
pub use query::{ParamStyle, QueryBuilder, Row, SqlValue, Statement};
pub use records::{
    DatasetBase, DatasetMetadata, MapBase, MapMetadata, MapTime, Record, Registration, TableKind,
};
pub use sequence::SequenceGenerator;

use crate::error::CatalogError;
use crate::temporal::TemporalType;
use crate::types::{DatasetId, MapId, MapKind, StdsKind};
use chrono::Utc;
use parking_lot::{Mutex, ReentrantMutex};
use rustc_hash::FxHashMap;
use std::cell::RefCell;
use std::sync::Arc;

fn schema_sql() -> String {
    let mut sql = String::new();
    for kind in MapKind::ALL {
        let map = kind.as_str();
        let layer = if kind == MapKind::Vector {
            ", layer TEXT"
        } else {
            ""
        };
        sql.push_str(&format!(
            "CREATE TABLE IF NOT EXISTS {map}_base (id TEXT PRIMARY KEY, name TEXT NOT NULL, \
             mapset TEXT NOT NULL, creator TEXT, creation_time TEXT, temporal_type TEXT{layer});\n\
             CREATE TABLE IF NOT EXISTS {map}_time (id TEXT PRIMARY KEY, start_time, end_time, \
             unit TEXT);\n\
             CREATE TABLE IF NOT EXISTS {map}_metadata (id TEXT PRIMARY KEY, min REAL, max REAL, \
             north REAL, south REAL, east REAL, west REAL);\n"
        ));
        let stds = kind.dataset_kind().as_str();
        sql.push_str(&format!(
            "CREATE TABLE IF NOT EXISTS {stds}_base (id TEXT PRIMARY KEY, name TEXT NOT NULL, \
             mapset TEXT NOT NULL, creator TEXT, creation_time TEXT, temporal_type TEXT, \
             semantic_type TEXT);\n\
             CREATE TABLE IF NOT EXISTS {stds}_metadata (id TEXT PRIMARY KEY, \
             number_of_maps INTEGER, min_min REAL, max_max REAL, start_time, end_time, unit TEXT, \
             granularity TEXT, topology_ok INTEGER, complete INTEGER, north REAL, south REAL, \
             east REAL, west REAL);\n\
             CREATE TABLE IF NOT EXISTS {stds}_register (map_id TEXT PRIMARY KEY, \
             stds_id TEXT NOT NULL);\n"
        ));
    }
    sql
}

/// One catalog session.
///
/// The connection is serialized behind a reentrant mutex that an open
/// transaction holds until it ends, so statements of other threads never
/// run inside it. Registrations into one dataset additionally hold that
/// dataset's writer lock.
pub struct Catalog {
    conn: ReentrantMutex<RefCell<Box<dyn CatalogConnection>>>,
    query: QueryBuilder,
    sequence: SequenceGenerator,
    dataset_locks: Mutex<FxHashMap<String, Arc<Mutex<()>>>>,
}

impl Catalog {
    /// Wrap a connection and create any missing tables.
    pub fn open(conn: impl CatalogConnection + 'static) -> Result<Self, CatalogError> {
        let query = QueryBuilder::new(conn.param_style());
        let catalog = Self {
            conn: ReentrantMutex::new(RefCell::new(Box::new(conn))),
            query,
            sequence: SequenceGenerator::new(),
            dataset_locks: Mutex::new(FxHashMap::default()),
        };
        catalog.with_conn(|conn| conn.execute_batch(&schema_sql()))?;
        log::debug!(
            "catalog session {} opened ({:?} placeholders)",
            catalog.sequence.session(),
            query.style()
        );
        Ok(catalog)
    }

    #[cfg(feature = "sqlite")]
    pub fn in_memory() -> Result<Self, CatalogError> {
        Self::open(SqliteConnection::open_in_memory()?)
    }

    #[cfg(feature = "sqlite")]
    pub fn open_path<P: AsRef<std::path::Path>>(path: P) -> Result<Self, CatalogError> {
        Self::open(SqliteConnection::open(path)?)
    }

    pub fn query_builder(&self) -> QueryBuilder {
        self.query
    }

    pub fn sequence(&self) -> &SequenceGenerator {
        &self.sequence
    }

    fn with_conn<T>(
        &self,
        f: impl FnOnce(&mut dyn CatalogConnection) -> Result<T, CatalogError>,
    ) -> Result<T, CatalogError> {
        let guard = self.conn.lock();
        let mut conn = guard
            .try_borrow_mut()
            .map_err(|_| CatalogError::Sql("catalog connection is already in use".to_string()))?;
        f(&mut **conn)
    }

    fn execute(&self, stmt: Statement) -> Result<usize, CatalogError> {
        log::trace!("{}", stmt.sql);
        self.with_conn(|conn| conn.execute(&stmt.sql, &stmt.params))
    }

    fn fetch(&self, stmt: Statement) -> Result<Vec<Row>, CatalogError> {
        log::trace!("{}", stmt.sql);
        self.with_conn(|conn| conn.fetch_all(&stmt.sql, &stmt.params))
    }

    pub fn insert<R: Record>(&self, record: &R) -> Result<(), CatalogError> {
        self.execute(self.query.insert(&record.table(), record.columns()))?;
        Ok(())
    }

    pub fn update<R: Record>(&self, record: &R) -> Result<(), CatalogError> {
        let stmt = self.query.update(
            &record.table(),
            record.columns(),
            (R::KEY, record.key().into()),
            true,
        );
        if self.execute(stmt)? == 0 {
            return Err(CatalogError::NotFound {
                kind: record.table(),
                id: record.key(),
            });
        }
        Ok(())
    }

    pub fn select<R: Record>(&self, kind: R::Kind, key: &str) -> Result<Option<R>, CatalogError> {
        let stmt = self
            .query
            .select(&R::table_for(kind), &[], Some((R::KEY, key.into())));
        self.fetch(stmt)?
            .first()
            .map(|row| R::from_row(kind, row))
            .transpose()
    }

    pub fn select_all<R: Record>(&self, kind: R::Kind) -> Result<Vec<R>, CatalogError> {
        let stmt = self.query.select(&R::table_for(kind), &[], None);
        self.fetch(stmt)?
            .iter()
            .map(|row| R::from_row(kind, row))
            .collect()
    }

    pub fn delete<R: Record>(&self, kind: R::Kind, key: &str) -> Result<bool, CatalogError> {
        let stmt = self.query.delete(&R::table_for(kind), (R::KEY, key.into()));
        Ok(self.execute(stmt)? > 0)
    }

    pub fn exists<R: Record>(&self, kind: R::Kind, key: &str) -> Result<bool, CatalogError> {
        let stmt = self
            .query
            .select(&R::table_for(kind), &[R::KEY], Some((R::KEY, key.into())));
        Ok(!self.fetch(stmt)?.is_empty())
    }

    /// Run `f` inside a transaction, rolling back when it or the commit
    /// fails. Other threads wait for the connection until the transaction
    /// has ended.
    pub fn transaction<T, E: From<CatalogError>>(
        &self,
        f: impl FnOnce() -> Result<T, E>,
    ) -> Result<T, E> {
        let _session = self.conn.lock();
        self.with_conn(|conn| conn.begin())?;
        match f() {
            Ok(value) => match self.with_conn(|conn| conn.commit()) {
                Ok(()) => Ok(value),
                Err(err) => {
                    self.rollback();
                    Err(err.into())
                }
            },
            Err(err) => {
                self.rollback();
                Err(err)
            }
        }
    }

    fn rollback(&self) {
        if let Err(err) = self.with_conn(|conn| conn.rollback()) {
            log::warn!("rollback failed: {err}");
        }
    }

    /// Hold the single-writer lock of one dataset while `f` runs. The lock
    /// entry is dropped again once no other writer waits on it.
    pub fn with_dataset_lock<T>(&self, id: &DatasetId, f: impl FnOnce() -> T) -> T {
        let key = id.id();
        let lock = self
            .dataset_locks
            .lock()
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let result = {
            let _guard = lock.lock();
            f()
        };
        let mut locks = self.dataset_locks.lock();
        if Arc::strong_count(&lock) == 2 {
            locks.remove(&key);
        }
        result
    }

    // Maps

    pub fn map_exists(&self, kind: MapKind, id: &MapId) -> Result<bool, CatalogError> {
        self.exists::<MapBase>(kind, &id.id())
    }

    /// Insert base, time and metadata rows of a new map.
    pub fn insert_map(&self, record: &MapRecord, creator: &str) -> Result<(), CatalogError> {
        if self.map_exists(record.kind, &record.id)? {
            return Err(CatalogError::AlreadyExists {
                kind: record.kind.to_string(),
                id: record.id.id(),
            });
        }
        let (base, time, metadata) = record.rows(creator, Utc::now().naive_utc());
        self.insert(&base)?;
        self.insert(&time)?;
        self.insert(&metadata)?;
        Ok(())
    }

    /// Rewrite the time and metadata rows of an existing map.
    pub fn update_map(&self, record: &MapRecord) -> Result<(), CatalogError> {
        let (_, time, metadata) = record.rows("", Utc::now().naive_utc());
        self.update(&time)?;
        self.update(&metadata)
    }

    pub fn map_record(&self, kind: MapKind, id: &MapId) -> Result<Option<MapRecord>, CatalogError> {
        let key = id.id();
        let Some(base) = self.select::<MapBase>(kind, &key)? else {
            return Ok(None);
        };
        let time = self
            .select::<MapTime>(kind, &key)?
            .ok_or_else(|| CatalogError::InvalidRow {
                table: MapTime::table_for(kind),
                message: format!("map `{key}` has no time row"),
            })?;
        let metadata = self.select::<MapMetadata>(kind, &key)?;
        let owner = self
            .select::<Registration>(kind.dataset_kind(), &key)?
            .map(|r| r.stds_id);
        Ok(Some(MapRecord::from_rows(base, time, metadata, owner)))
    }

    /// Delete a map and its membership; returns false if it was unknown.
    pub fn remove_map(&self, kind: MapKind, id: &MapId) -> Result<bool, CatalogError> {
        let key = id.id();
        self.delete::<Registration>(kind.dataset_kind(), &key)?;
        self.delete::<MapMetadata>(kind, &key)?;
        self.delete::<MapTime>(kind, &key)?;
        self.delete::<MapBase>(kind, &key)
    }

    // Datasets

    pub fn dataset_exists(&self, kind: StdsKind, id: &DatasetId) -> Result<bool, CatalogError> {
        self.exists::<DatasetBase>(kind, &id.id())
    }

    pub fn dataset_ids(&self, kind: StdsKind) -> Result<Vec<DatasetId>, CatalogError> {
        let mut ids: Vec<DatasetId> = self
            .select_all::<DatasetBase>(kind)?
            .into_iter()
            .map(|base| base.id)
            .collect();
        ids.sort();
        Ok(ids)
    }

    /// Create an empty, incomplete dataset.
    pub fn open_new_dataset(
        &self,
        kind: StdsKind,
        id: &DatasetId,
        temporal_type: TemporalType,
        semantic_type: &str,
        creator: &str,
    ) -> Result<Dataset, CatalogError> {
        if self.dataset_exists(kind, id)? {
            return Err(CatalogError::AlreadyExists {
                kind: kind.to_string(),
                id: id.id(),
            });
        }
        let base = DatasetBase {
            id: id.clone(),
            kind,
            creator: creator.to_string(),
            creation_time: Utc::now().naive_utc(),
            temporal_type,
            semantic_type: semantic_type.to_string(),
        };
        let metadata = DatasetMetadata::empty(id.clone(), kind);
        self.insert(&base)?;
        self.insert(&metadata)?;
        Ok(Dataset {
            base,
            metadata,
            maps: Vec::new(),
        })
    }

    pub fn dataset(&self, kind: StdsKind, id: &DatasetId) -> Result<Option<Dataset>, CatalogError> {
        let key = id.id();
        let Some(base) = self.select::<DatasetBase>(kind, &key)? else {
            return Ok(None);
        };
        let metadata = self
            .select::<DatasetMetadata>(kind, &key)?
            .unwrap_or_else(|| DatasetMetadata::empty(id.clone(), kind));
        let maps = self
            .registered_maps(kind, id)?
            .into_iter()
            .map(|m| m.id)
            .collect();
        Ok(Some(Dataset {
            base,
            metadata,
            maps,
        }))
    }

    /// Remove a dataset. Members are deleted when `with_maps` is set and
    /// released otherwise; their ids are returned either way.
    pub fn remove_dataset(
        &self,
        kind: StdsKind,
        id: &DatasetId,
        with_maps: bool,
    ) -> Result<Vec<MapId>, CatalogError> {
        let members: Vec<MapId> = self
            .registered_maps(kind, id)?
            .into_iter()
            .map(|m| m.id)
            .collect();
        for map in &members {
            if with_maps {
                self.remove_map(kind.map_kind(), map)?;
            } else {
                self.unregister_map(kind, map)?;
            }
        }
        self.delete::<DatasetMetadata>(kind, &id.id())?;
        if !self.delete::<DatasetBase>(kind, &id.id())? {
            return Err(CatalogError::NotFound {
                kind: kind.to_string(),
                id: id.id(),
            });
        }
        Ok(members)
    }

    /// Make `stds` the owner of `map`. Registering into the current owner
    /// again is a no-op.
    pub fn register_map(
        &self,
        kind: StdsKind,
        stds: &DatasetId,
        map: &MapId,
    ) -> Result<(), CatalogError> {
        if !self.dataset_exists(kind, stds)? {
            return Err(CatalogError::NotFound {
                kind: kind.to_string(),
                id: stds.id(),
            });
        }
        if !self.map_exists(kind.map_kind(), map)? {
            return Err(CatalogError::NotFound {
                kind: kind.map_kind().to_string(),
                id: map.id(),
            });
        }
        if let Some(existing) = self.select::<Registration>(kind, &map.id())? {
            if &existing.stds_id == stds {
                return Ok(());
            }
            return Err(CatalogError::AlreadyOwned {
                map: map.id(),
                stds: existing.stds_id.id(),
            });
        }
        self.insert(&Registration {
            kind,
            map_id: map.clone(),
            stds_id: stds.clone(),
        })
    }

    pub fn unregister_map(&self, kind: StdsKind, map: &MapId) -> Result<bool, CatalogError> {
        self.delete::<Registration>(kind, &map.id())
    }

    /// Members of a dataset ordered by start time, then name.
    pub fn registered_maps(
        &self,
        kind: StdsKind,
        stds: &DatasetId,
    ) -> Result<Vec<MapRecord>, CatalogError> {
        let stmt = self.query.select(
            &Registration::table_for(kind),
            &["map_id", "stds_id"],
            Some(("stds_id", stds.id().into())),
        );
        let mut maps = Vec::new();
        for row in self.fetch(stmt)? {
            let registration = Registration::from_row(kind, &row)?;
            let record = self
                .map_record(kind.map_kind(), &registration.map_id)?
                .ok_or_else(|| CatalogError::NotFound {
                    kind: kind.map_kind().to_string(),
                    id: registration.map_id.id(),
                })?;
            maps.push(record);
        }
        maps.sort_by(|a, b| {
            a.extent
                .bounds()
                .cmp(&b.extent.bounds())
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(maps)
    }

    /// Recompute and persist the aggregates from the registered members.
    pub fn update_dataset_metadata(
        &self,
        kind: StdsKind,
        id: &DatasetId,
    ) -> Result<DatasetMetadata, CatalogError> {
        let maps = self.registered_maps(kind, id)?;
        let metadata = dataset::aggregate(id.clone(), kind, &maps);
        self.update(&metadata)?;
        Ok(metadata)
    }
}
