use parking_lot::Mutex;
use spatio_algebra::catalog::{CatalogConnection, ParamStyle, Row, SqlValue, SqliteConnection};
use spatio_algebra::{
    AlgebraError, Catalog, CatalogError, Config, ConstantKernel, MapId, MapKind, MapPayload,
    MapStore, MemoryMapStore, StdsKind, TemporalAlgebra, TemporalExtent, TimeIncrement,
};
use std::sync::Arc;

/// Shared switch holding the text that makes an operation fail.
#[derive(Clone, Default)]
struct Fault(Arc<Mutex<Option<String>>>);

impl Fault {
    fn set(&self, pattern: &str) {
        *self.0.lock() = Some(pattern.to_string());
    }

    fn clear(&self) {
        *self.0.lock() = None;
    }

    fn hits(&self, text: &str) -> bool {
        self.0
            .lock()
            .as_deref()
            .is_some_and(|pattern| text.contains(pattern))
    }
}

struct FaultyConnection {
    inner: SqliteConnection,
    fault: Fault,
}

impl FaultyConnection {
    fn check(&self, sql: &str) -> Result<(), CatalogError> {
        if self.fault.hits(sql) {
            return Err(CatalogError::Sql(format!("injected failure: {sql}")));
        }
        Ok(())
    }
}

impl CatalogConnection for FaultyConnection {
    fn param_style(&self) -> ParamStyle {
        self.inner.param_style()
    }

    fn execute(&mut self, sql: &str, params: &[SqlValue]) -> Result<usize, CatalogError> {
        self.check(sql)?;
        self.inner.execute(sql, params)
    }

    fn execute_batch(&mut self, sql: &str) -> Result<(), CatalogError> {
        self.check(sql)?;
        self.inner.execute_batch(sql)
    }

    fn fetch_all(&mut self, sql: &str, params: &[SqlValue]) -> Result<Vec<Row>, CatalogError> {
        self.check(sql)?;
        self.inner.fetch_all(sql, params)
    }
}

/// Refuses writes to maps whose id contains the fault pattern.
struct FaultyStore {
    inner: Arc<MemoryMapStore>,
    fault: Fault,
}

impl MapStore for FaultyStore {
    fn read(&self, id: &MapId) -> spatio_algebra::Result<MapPayload> {
        self.inner.read(id)
    }

    fn write(&self, id: &MapId, payload: MapPayload, overwrite: bool) -> spatio_algebra::Result<()> {
        if self.fault.hits(&id.id()) {
            return Err(AlgebraError::Store(format!("injected failure writing {id}")));
        }
        self.inner.write(id, payload, overwrite)
    }

    fn delete(&self, id: &MapId) -> spatio_algebra::Result<bool> {
        self.inner.delete(id)
    }

    fn exists(&self, id: &MapId) -> bool {
        self.inner.exists(id)
    }
}

struct Fixture {
    algebra: TemporalAlgebra,
    store: Arc<MemoryMapStore>,
    sql_fault: Fault,
    store_fault: Fault,
}

impl Fixture {
    /// A = 1..4 daily from 2001-01-01, overwrite enabled.
    fn new() -> Self {
        let _ = env_logger::builder().is_test(true).try_init();
        let sql_fault = Fault::default();
        let store_fault = Fault::default();
        let catalog = Catalog::open(FaultyConnection {
            inner: SqliteConnection::open_in_memory().unwrap(),
            fault: sql_fault.clone(),
        })
        .unwrap();
        let store = Arc::new(MemoryMapStore::new());
        let faulty: Arc<dyn MapStore> = Arc::new(FaultyStore {
            inner: Arc::clone(&store),
            fault: store_fault.clone(),
        });
        let algebra = TemporalAlgebra::builder()
            .catalog(Arc::new(catalog))
            .store(faulty)
            .kernel(Arc::new(ConstantKernel::new(Arc::clone(&store))))
            .config(Config::default().with_overwrite(true))
            .build()
            .unwrap();

        let maps: Vec<MapId> = (1..=4).map(|i| MapId::new(format!("a{i}"), "PERMANENT")).collect();
        for (i, map) in maps.iter().enumerate() {
            store.put_constant(map, (i + 1) as f64);
        }
        algebra
            .registrar()
            .register_existing(
                StdsKind::Strds,
                "A",
                "mean",
                &maps,
                TemporalExtent::parse_absolute("2001-01-01", "2001-01-02").unwrap(),
                &TimeIncrement::parse("1 day").unwrap(),
            )
            .unwrap();

        Self {
            algebra,
            store,
            sql_fault,
            store_fault,
        }
    }

    fn result_exists(&self) -> bool {
        self.algebra
            .catalog()
            .dataset_exists(StdsKind::Strds, &MapId::new("R", "PERMANENT"))
            .unwrap()
    }

    fn result_values(&self) -> Vec<f64> {
        self.algebra
            .catalog()
            .dataset(StdsKind::Strds, &MapId::new("R", "PERMANENT"))
            .unwrap()
            .unwrap()
            .maps
            .iter()
            .map(|id| self.store.constant(id).unwrap())
            .collect()
    }

    fn result_rows(&self) -> usize {
        (1..=4)
            .filter(|i| {
                self.algebra
                    .catalog()
                    .map_exists(MapKind::Raster, &MapId::new(format!("R_{i}"), "PERMANENT"))
                    .unwrap()
            })
            .count()
    }
}

#[test]
fn test_failed_copy_leaves_nothing_behind() {
    let f = Fixture::new();
    let before = f.store.len();
    f.store_fault.set("R_3@");

    let err = f.algebra.run("R = A + 1", MapKind::Raster).unwrap_err();
    assert!(matches!(err, AlgebraError::Store(_)));
    assert!(!f.result_exists());
    assert_eq!(f.result_rows(), 0);
    assert_eq!(f.store.len(), before);
}

#[test]
fn test_failed_metadata_update_rolls_back() {
    let f = Fixture::new();
    let before = f.store.len();
    f.sql_fault.set("UPDATE strds_metadata");

    let err = f.algebra.run("R = A + 1", MapKind::Raster).unwrap_err();
    assert!(matches!(err, AlgebraError::Catalog(CatalogError::Sql(_))));
    assert!(!f.result_exists());
    assert_eq!(f.result_rows(), 0);
    assert_eq!(f.store.len(), before);

    f.sql_fault.clear();
    f.algebra.run("R = A + 1", MapKind::Raster).unwrap();
    assert_eq!(f.result_values(), vec![2.0, 3.0, 4.0, 5.0]);
}

#[test]
fn test_failed_overwrite_keeps_previous_result() {
    let f = Fixture::new();
    f.algebra.run("R = A", MapKind::Raster).unwrap();
    let before = f.store.len();
    f.store_fault.set("R_3@");

    assert!(f.algebra.run("R = A * 10", MapKind::Raster).is_err());
    assert!(f.result_exists());
    assert_eq!(f.result_values(), vec![1.0, 2.0, 3.0, 4.0]);
    assert_eq!(f.result_rows(), 4);
    assert_eq!(f.store.len(), before);
}

#[test]
fn test_failed_commit_keeps_previous_result() {
    let f = Fixture::new();
    f.algebra.run("R = A + 1", MapKind::Raster).unwrap();
    let before = f.store.len();
    f.sql_fault.set("COMMIT");

    let err = f.algebra.run("R = R * 2", MapKind::Raster).unwrap_err();
    assert!(matches!(err, AlgebraError::Catalog(CatalogError::Sql(_))));

    f.sql_fault.clear();
    assert_eq!(f.result_values(), vec![2.0, 3.0, 4.0, 5.0]);
    assert_eq!(f.result_rows(), 4);
    assert_eq!(f.store.len(), before);

    let r = f.algebra.run("R = R * 2", MapKind::Raster).unwrap();
    assert_eq!(r.dataset().unwrap().map_count(), 4);
    assert_eq!(f.result_values(), vec![4.0, 6.0, 8.0, 10.0]);
}
