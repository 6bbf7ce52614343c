//! Builder for assembling a [`TemporalAlgebra`] from its collaborators.
//!
//! The catalog defaults to an in-memory SQLite session and the map store to
//! a [`MemoryMapStore`] driven by the [`ConstantKernel`].

use crate::catalog::Catalog;
use crate::config::Config;
use crate::engine::TemporalAlgebra;
use crate::error::{AlgebraError, Result};
use crate::kernel::{ConstantKernel, MapOperator, MapStore, MemoryMapStore};
use std::path::PathBuf;
use std::sync::Arc;

/// Builder for a temporal algebra with a custom catalog, map store and kernel.
#[derive(Default)]
pub struct AlgebraBuilder {
    catalog_path: Option<PathBuf>,
    catalog: Option<Arc<Catalog>>,
    store: Option<Arc<dyn MapStore>>,
    kernel: Option<Arc<dyn MapOperator>>,
    config: Config,
}

impl AlgebraBuilder {
    /// Create a builder with an in-memory catalog and the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep the catalog in an SQLite file. The schema is created if needed.
    #[cfg(feature = "sqlite")]
    pub fn catalog_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.catalog_path = Some(path.into());
        self.catalog = None;
        self
    }

    /// Use an already opened catalog session.
    pub fn catalog(mut self, catalog: Arc<Catalog>) -> Self {
        self.catalog = Some(catalog);
        self.catalog_path = None;
        self
    }

    /// Use an in-memory store together with the constant-value kernel.
    pub fn memory_store(mut self, store: Arc<MemoryMapStore>) -> Self {
        self.kernel = Some(Arc::new(ConstantKernel::new(Arc::clone(&store))));
        self.store = Some(store);
        self
    }

    /// Set the map store. A custom store also needs a [`kernel`](Self::kernel).
    pub fn store(mut self, store: Arc<dyn MapStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn kernel(mut self, kernel: Arc<dyn MapOperator>) -> Self {
        self.kernel = Some(kernel);
        self
    }

    /// Set the configuration (mapset, dry run, strictness, naming).
    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> Result<TemporalAlgebra> {
        let catalog = match self.catalog {
            Some(catalog) => catalog,
            None => Arc::new(Self::open_catalog(self.catalog_path)?),
        };
        let (store, kernel) = match (self.store, self.kernel) {
            (Some(store), Some(kernel)) => (store, kernel),
            (None, None) => {
                let store = Arc::new(MemoryMapStore::new());
                let kernel: Arc<dyn MapOperator> = Arc::new(ConstantKernel::new(Arc::clone(&store)));
                (store as Arc<dyn MapStore>, kernel)
            }
            _ => {
                return Err(AlgebraError::InvalidConfig(
                    "a map store and a kernel must be configured together".to_string(),
                ));
            }
        };
        TemporalAlgebra::new(catalog, store, kernel, self.config)
    }

    #[cfg(feature = "sqlite")]
    fn open_catalog(path: Option<PathBuf>) -> Result<Catalog> {
        Ok(match path {
            Some(path) => Catalog::open_path(path)?,
            None => Catalog::in_memory()?,
        })
    }

    #[cfg(not(feature = "sqlite"))]
    fn open_catalog(_path: Option<PathBuf>) -> Result<Catalog> {
        Err(AlgebraError::InvalidConfig(
            "no catalog configured and the sqlite feature is disabled".to_string(),
        ))
    }
}

#[cfg(all(test, feature = "sqlite"))]
mod tests {
    use super::*;
    use crate::config::SuffixMode;

    #[test]
    fn test_builder_default() {
        let algebra = AlgebraBuilder::new().build().unwrap();
        assert_eq!(algebra.config().mapset, "PERMANENT");
    }

    #[test]
    fn test_builder_with_config() {
        let config = Config::default()
            .with_mapset("climate")
            .with_suffix(SuffixMode::Time);
        let algebra = AlgebraBuilder::new().config(config).build().unwrap();
        assert_eq!(algebra.config().mapset, "climate");
        assert_eq!(algebra.config().suffix, SuffixMode::Time);
    }

    #[test]
    fn test_builder_rejects_invalid_config() {
        let result = AlgebraBuilder::new()
            .config(Config::default().with_mapset(""))
            .build();
        assert!(matches!(result, Err(AlgebraError::InvalidConfig(_))));
    }

    #[test]
    fn test_builder_requires_kernel_with_store() {
        let store: Arc<dyn MapStore> = Arc::new(MemoryMapStore::new());
        let result = AlgebraBuilder::new().store(store).build();
        assert!(matches!(result, Err(AlgebraError::InvalidConfig(_))));
    }

    #[test]
    fn test_builder_catalog_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.db");
        let algebra = AlgebraBuilder::new().catalog_path(&path).build().unwrap();
        assert!(algebra.catalog().dataset_ids(crate::StdsKind::Strds).unwrap().is_empty());
        assert!(path.exists());
    }
}
