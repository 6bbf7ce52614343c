//! The temporal algebra facade: parse, evaluate, execute and register.

use crate::algebra::{Evaluation, Evaluator, Executor, Statement, parse_with_datasets};
use crate::builder::AlgebraBuilder;
use crate::catalog::{Catalog, Dataset};
use crate::config::Config;
use crate::error::{AlgebraError, Result};
use crate::kernel::{MapOperator, MapStore};
use crate::registrar::{Registrar, RegistrationPlan, Target};
use crate::temporal::TemporalType;
use crate::types::MapKind;
use std::sync::Arc;

/// What a run produced.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Registered(Dataset),
    /// Dry run: nothing was computed or written
    Planned(RegistrationPlan),
}

impl Outcome {
    pub fn dataset(&self) -> Option<&Dataset> {
        match self {
            Outcome::Registered(dataset) => Some(dataset),
            Outcome::Planned(_) => None,
        }
    }

    pub fn plan(&self) -> Option<&RegistrationPlan> {
        match self {
            Outcome::Planned(plan) => Some(plan),
            Outcome::Registered(_) => None,
        }
    }
}

/// Evaluates `R = <expression>` statements against a catalog.
///
/// # Examples
///
/// ```rust
/// # #[cfg(feature = "sqlite")]
/// # fn main() -> spatio_algebra::Result<()> {
/// use spatio_algebra::prelude::*;
/// use std::sync::Arc;
///
/// let store = Arc::new(MemoryMapStore::new());
/// let algebra = TemporalAlgebra::builder()
///     .memory_store(store.clone())
///     .build()?;
///
/// let maps: Vec<MapId> = (1..=3).map(|i| MapId::new(format!("a{i}"), "PERMANENT")).collect();
/// for (i, map) in maps.iter().enumerate() {
///     store.put_constant(map, i as f64 + 1.0);
/// }
/// algebra.registrar().register_existing(
///     StdsKind::Strds,
///     "A",
///     "mean",
///     &maps,
///     TemporalExtent::parse_absolute("2001-01-01", "2001-01-02")?,
///     &TimeIncrement::parse("1 day")?,
/// )?;
///
/// let outcome = algebra.run("R = A * 2", MapKind::Raster)?;
/// let dataset = outcome.dataset().unwrap();
/// assert_eq!(dataset.map_count(), 3);
/// assert_eq!(dataset.max(), Some(6.0));
/// # Ok(())
/// # }
/// # #[cfg(not(feature = "sqlite"))]
/// # fn main() {}
/// ```
pub struct TemporalAlgebra {
    catalog: Arc<Catalog>,
    store: Arc<dyn MapStore>,
    kernel: Arc<dyn MapOperator>,
    config: Config,
}

impl TemporalAlgebra {
    pub fn new(
        catalog: Arc<Catalog>,
        store: Arc<dyn MapStore>,
        kernel: Arc<dyn MapOperator>,
        config: Config,
    ) -> Result<Self> {
        config.validate().map_err(AlgebraError::InvalidConfig)?;
        Ok(Self {
            catalog,
            store,
            kernel,
            config,
        })
    }

    pub fn builder() -> AlgebraBuilder {
        AlgebraBuilder::new()
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn store(&self) -> &dyn MapStore {
        self.store.as_ref()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn registrar(&self) -> Registrar<'_> {
        Registrar::new(&self.catalog, self.store.as_ref(), &self.config)
    }

    /// Parse a statement, rejecting datasets of `kind` the catalog does not know.
    pub fn parse(&self, expression: &str, kind: MapKind) -> Result<Statement> {
        let known = self.catalog.dataset_ids(kind.dataset_kind())?;
        Ok(parse_with_datasets(expression, &known)?)
    }

    /// Parse and evaluate without touching the kernel.
    pub fn evaluate(&self, expression: &str, kind: MapKind) -> Result<Evaluation> {
        let statement = self.parse(expression, kind)?;
        self.evaluate_statement(&statement, kind)
    }

    fn evaluate_statement(&self, statement: &Statement, kind: MapKind) -> Result<Evaluation> {
        Evaluator::new(&self.catalog, self.store.as_ref(), kind, &self.config).evaluate(statement)
    }

    /// Run a statement end to end. In dry-run mode the registration plan is
    /// returned instead and nothing is computed or written.
    pub fn run(&self, expression: &str, kind: MapKind) -> Result<Outcome> {
        let statement = self.parse(expression, kind)?;
        log::debug!("parsed `{}` into {}", statement.source, statement.target);
        let evaluation = self.evaluate_statement(&statement, kind)?;
        let target = Target {
            kind,
            name: statement.target.clone(),
            temporal_type: evaluation
                .temporal_type()?
                .unwrap_or(TemporalType::Absolute),
            semantic_type: evaluation
                .inputs
                .first()
                .map(|d| d.semantic_type().to_string())
                .unwrap_or_else(|| self.config.semantic_type.clone()),
        };

        let registrar = self.registrar();
        if self.config.dry_run {
            return Ok(Outcome::Planned(registrar.plan(&target, &evaluation.series)?));
        }

        let executor = Executor::new(
            self.kernel.as_ref(),
            self.store.as_ref(),
            self.catalog.sequence(),
            &self.config.mapset,
            self.config.strict,
        );
        let report = executor.execute(&evaluation.series)?;
        if !report.dropped.is_empty() {
            log::warn!(
                "{} of {} entries were dropped",
                report.dropped.len(),
                evaluation.series.len()
            );
        }
        Ok(Outcome::Registered(registrar.register(&target, &report)?))
    }
}
