//! Materializes the operand trees of a series through the map kernel.

use super::series::{MapRef, Operand, Series};
use crate::catalog::SequenceGenerator;
use crate::error::{AlgebraError, Result};
use crate::kernel::{KernelArg, KernelOp, MapOperator, MapStore};
use crate::temporal::TemporalExtent;
use crate::types::MapId;
use rustc_hash::FxHashMap;
use serde::Serialize;

/// A computed map waiting to be registered.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Candidate {
    pub extent: TemporalExtent,
    pub map: MapId,
    /// True when the map was produced by this run and must be cleaned up
    pub temporary: bool,
    /// Rendering of the operand tree that produced the map
    pub operand: String,
}

/// An entry the kernel could not compute.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DroppedEntry {
    pub extent: TemporalExtent,
    pub operand: String,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExecutionReport {
    pub candidates: Vec<Candidate>,
    pub dropped: Vec<DroppedEntry>,
    /// Every map the kernel produced, in creation order
    pub temporaries: Vec<MapId>,
}

pub struct Executor<'a> {
    kernel: &'a dyn MapOperator,
    store: &'a dyn MapStore,
    sequence: &'a SequenceGenerator,
    mapset: &'a str,
    strict: bool,
}

type Memo = FxHashMap<String, std::result::Result<KernelArg, String>>;

impl<'a> Executor<'a> {
    pub fn new(
        kernel: &'a dyn MapOperator,
        store: &'a dyn MapStore,
        sequence: &'a SequenceGenerator,
        mapset: &'a str,
        strict: bool,
    ) -> Self {
        Self {
            kernel,
            store,
            sequence,
            mapset,
            strict,
        }
    }

    /// Compute every entry. Identical sub-trees are computed once per run.
    ///
    /// A failing entry is dropped with a warning, or aborts the run in
    /// strict mode after the temporaries produced so far are deleted.
    pub fn execute(&self, series: &Series) -> Result<ExecutionReport> {
        let mut report = ExecutionReport::default();
        let mut memo = Memo::default();

        for entry in series {
            let rendering = entry.operand.to_string();
            let outcome = self
                .materialize(&entry.operand, &mut memo, &mut report.temporaries)
                .and_then(|arg| self.as_map(arg, &rendering, &mut memo, &mut report.temporaries));
            match outcome {
                Ok((map, temporary)) => {
                    log::debug!("{} -> {map}", entry.extent);
                    report.candidates.push(Candidate {
                        extent: entry.extent,
                        map,
                        temporary,
                        operand: rendering,
                    });
                }
                Err(message) if self.strict => {
                    self.cleanup(&report.temporaries);
                    return Err(AlgebraError::Kernel {
                        pair: format!("{rendering} at {}", entry.extent),
                        message,
                    });
                }
                Err(message) => {
                    log::warn!("dropping {rendering} at {}: {message}", entry.extent);
                    report.dropped.push(DroppedEntry {
                        extent: entry.extent,
                        operand: rendering,
                        message,
                    });
                }
            }
        }
        Ok(report)
    }

    /// Delete maps produced by this run, logging failures.
    pub fn cleanup(&self, temporaries: &[MapId]) {
        for id in temporaries {
            if let Err(err) = self.store.delete(id) {
                log::warn!("failed to delete temporary map {id}: {err}");
            }
        }
    }

    fn materialize(
        &self,
        operand: &Operand,
        memo: &mut Memo,
        temporaries: &mut Vec<MapId>,
    ) -> std::result::Result<KernelArg, String> {
        match operand {
            Operand::Map(MapRef { id, offset }) => Ok(KernelArg::Map {
                id: id.clone(),
                offset: *offset,
            }),
            Operand::Scalar(value) => Ok(KernelArg::Scalar(*value)),
            Operand::Text(text) => Err(format!("text \"{text}\" cannot be written to a map")),
            Operand::Apply { op, args } => {
                let key = operand.to_string();
                if let Some(cached) = memo.get(&key) {
                    return cached.clone();
                }
                let result = args
                    .iter()
                    .map(|arg| self.materialize(arg, memo, temporaries))
                    .collect::<std::result::Result<Vec<_>, _>>()
                    .and_then(|args| self.call(*op, &args, temporaries));
                memo.insert(key, result.clone());
                result
            }
        }
    }

    fn call(
        &self,
        op: KernelOp,
        args: &[KernelArg],
        temporaries: &mut Vec<MapId>,
    ) -> std::result::Result<KernelArg, String> {
        let output = MapId::new(self.sequence.temporary_name(), self.mapset);
        let id = self
            .kernel
            .apply(op, args, &output)
            .map_err(|failure| failure.message)?;
        temporaries.push(id.clone());
        Ok(KernelArg::Map {
            id,
            offset: Default::default(),
        })
    }

    /// Turn a final argument into a map id; scalars and offset reads are
    /// written out through `assign`.
    fn as_map(
        &self,
        arg: KernelArg,
        rendering: &str,
        memo: &mut Memo,
        temporaries: &mut Vec<MapId>,
    ) -> std::result::Result<(MapId, bool), String> {
        match arg {
            KernelArg::Map { id, offset } if offset.is_zero() => {
                let temporary = temporaries.contains(&id);
                Ok((id, temporary))
            }
            arg => {
                let key = format!("=({rendering})");
                let result = match memo.get(&key) {
                    Some(cached) => cached.clone(),
                    None => {
                        let result = self.call(KernelOp::Assign, &[arg], temporaries);
                        memo.insert(key, result.clone());
                        result
                    }
                };
                match result? {
                    KernelArg::Map { id, .. } => Ok((id, true)),
                    KernelArg::Scalar(_) => Err("assignment did not produce a map".to_string()),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algebra::series::Entry;
    use crate::kernel::{ConstantKernel, MemoryMapStore, SpatialOffset};
    use std::sync::Arc;

    struct Fixture {
        store: Arc<MemoryMapStore>,
        kernel: ConstantKernel,
        sequence: SequenceGenerator,
    }

    impl Fixture {
        fn new() -> Self {
            let store = Arc::new(MemoryMapStore::new());
            for (name, value) in [("a1", 1.0), ("a2", 2.0), ("zero", 0.0)] {
                store.put_constant(&id(name), value);
            }
            Self {
                kernel: ConstantKernel::new(store.clone()),
                store,
                sequence: SequenceGenerator::new(),
            }
        }

        fn executor(&self, strict: bool) -> Executor<'_> {
            Executor::new(
                &self.kernel,
                self.store.as_ref(),
                &self.sequence,
                "PERMANENT",
                strict,
            )
        }
    }

    fn id(name: &str) -> MapId {
        MapId::new(name, "PERMANENT")
    }

    fn day(d: u32) -> TemporalExtent {
        TemporalExtent::parse_absolute(&format!("2001-01-{d:02}"), &format!("2001-01-{:02}", d + 1))
            .unwrap()
    }

    fn add(a: Operand, b: Operand) -> Operand {
        Operand::Apply {
            op: KernelOp::Add,
            args: vec![a, b],
        }
    }

    #[test]
    fn test_plain_maps_pass_through() {
        let fx = Fixture::new();
        let series = Series::new(vec![Entry::new(day(1), Operand::map(id("a1")))]);
        let report = fx.executor(false).execute(&series).unwrap();
        assert_eq!(report.candidates.len(), 1);
        assert_eq!(report.candidates[0].map, id("a1"));
        assert!(!report.candidates[0].temporary);
        assert_eq!(fx.kernel.calls(), 0);
    }

    #[test]
    fn test_identical_trees_computed_once() {
        let fx = Fixture::new();
        let tree = add(Operand::map(id("a1")), Operand::map(id("a2")));
        let series = Series::new(vec![
            Entry::new(day(1), tree.clone()),
            Entry::new(day(2), tree),
        ]);
        let report = fx.executor(false).execute(&series).unwrap();
        assert_eq!(report.candidates.len(), 2);
        assert_eq!(report.candidates[0].map, report.candidates[1].map);
        assert_eq!(fx.kernel.calls(), 1);
        assert_eq!(fx.store.constant(&report.candidates[0].map), Some(3.0));
    }

    #[test]
    fn test_scalars_and_offsets_are_assigned() {
        let fx = Fixture::new();
        let shifted = Operand::Map(MapRef::new(id("a2")).with_offset(SpatialOffset { dx: 1, dy: 0 }));
        let series = Series::new(vec![
            Entry::new(day(1), Operand::Scalar(7.0)),
            Entry::new(day(2), shifted),
        ]);
        let report = fx.executor(false).execute(&series).unwrap();
        assert!(report.candidates.iter().all(|c| c.temporary));
        assert_eq!(fx.store.constant(&report.candidates[0].map), Some(7.0));
        assert_eq!(fx.store.constant(&report.candidates[1].map), Some(2.0));
    }

    #[test]
    fn test_failure_drops_entry() {
        let fx = Fixture::new();
        let series = Series::new(vec![
            Entry::new(
                day(1),
                Operand::Apply {
                    op: KernelOp::Div,
                    args: vec![Operand::map(id("a1")), Operand::map(id("zero"))],
                },
            ),
            Entry::new(day(2), add(Operand::map(id("a1")), Operand::Scalar(1.0))),
        ]);
        let report = fx.executor(false).execute(&series).unwrap();
        assert_eq!(report.dropped.len(), 1);
        assert_eq!(report.candidates.len(), 1);
        assert_eq!(report.candidates[0].extent, day(2));
    }

    #[test]
    fn test_strict_failure_cleans_up() {
        let fx = Fixture::new();
        let series = Series::new(vec![
            Entry::new(day(1), add(Operand::map(id("a1")), Operand::Scalar(1.0))),
            Entry::new(
                day(2),
                Operand::Apply {
                    op: KernelOp::Div,
                    args: vec![Operand::map(id("a1")), Operand::map(id("zero"))],
                },
            ),
        ]);
        let before = fx.store.len();
        let err = fx.executor(true).execute(&series).unwrap_err();
        assert!(matches!(err, AlgebraError::Kernel { .. }));
        assert_eq!(fx.store.len(), before);
    }

    #[test]
    fn test_text_cannot_be_materialized() {
        let fx = Fixture::new();
        let series = Series::new(vec![Entry::new(day(1), Operand::Text("x".into()))]);
        let report = fx.executor(false).execute(&series).unwrap();
        assert!(report.candidates.is_empty());
        assert_eq!(report.dropped.len(), 1);
    }
}
