//! Temporal algebra over space-time datasets of geospatial maps.
//!
//! Expressions such as `R = A {+,during,l} B` select, combine and re-time
//! the maps of registered datasets by Allen interval relations; the result
//! is computed through a pluggable map kernel and registered as a new
//! dataset in the metadata catalog.
//!
//! ```rust
//! # #[cfg(feature = "sqlite")]
//! # fn main() -> spatio_algebra::Result<()> {
//! use spatio_algebra::prelude::*;
//!
//! let algebra = TemporalAlgebra::builder().build()?;
//! let statement = algebra.parse("R = A : B", MapKind::Raster);
//! // neither dataset exists yet
//! assert!(matches!(statement, Err(AlgebraError::Parse(_))));
//! # Ok(())
//! # }
//! # #[cfg(not(feature = "sqlite"))]
//! # fn main() {}
//! ```

pub mod algebra;
pub mod builder;
pub mod catalog;
pub mod config;
pub mod engine;
pub mod error;
pub mod kernel;
pub mod registrar;
pub mod temporal;
pub mod types;

pub use builder::AlgebraBuilder;
pub use engine::{Outcome, TemporalAlgebra};
pub use error::{AlgebraError, CatalogError, ParseError, Result};

pub use config::{Config, SuffixMode};

pub use types::{DatasetId, MapId, MapKind, StdsKind};

pub use temporal::{
    Granularity, Relation, RelationSet, TemporalExtent, TemporalType, TimeIncrement, TimeUnit,
};

pub use algebra::{ExtentCode, Series, Statement};

pub use catalog::{Catalog, Dataset, MapRecord};

pub use kernel::{
    ConstantKernel, KernelArg, KernelFailure, KernelOp, MapOperator, MapPayload, MapStore,
    MemoryMapStore,
};

pub use registrar::{Registrar, RegistrationPlan};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Common imports
pub mod prelude {

    pub use crate::{AlgebraBuilder, AlgebraError, Outcome, Result, TemporalAlgebra};

    pub use crate::{Config, SuffixMode};

    pub use crate::{MapId, MapKind, StdsKind};

    pub use crate::{TemporalExtent, TemporalType, TimeIncrement};

    pub use crate::{MapStore, MemoryMapStore};

    pub use geo::Rect;
}
