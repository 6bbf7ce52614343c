//! In-memory map store and a kernel over constant-valued maps.

use super::{KernelArg, KernelFailure, KernelOp, MapOperator, MapPayload, MapStore};
use crate::error::{AlgebraError, Result};
use crate::types::MapId;
use geo::{Rect, coord};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Map store backed by a `BTreeMap`.
#[derive(Debug, Default)]
pub struct MemoryMapStore {
    maps: RwLock<BTreeMap<MapId, MapPayload>>,
}

impl MemoryMapStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a constant map, replacing any previous payload.
    pub fn put_constant(&self, id: &MapId, value: f64) {
        self.maps
            .write()
            .insert(id.clone(), MapPayload::constant(value, None));
    }

    pub fn constant(&self, id: &MapId) -> Option<f64> {
        self.maps.read().get(id).and_then(MapPayload::constant_value)
    }

    pub fn len(&self) -> usize {
        self.maps.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.maps.read().is_empty()
    }

    pub fn ids(&self) -> Vec<MapId> {
        self.maps.read().keys().cloned().collect()
    }
}

impl MapStore for MemoryMapStore {
    fn read(&self, id: &MapId) -> Result<MapPayload> {
        self.maps
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| AlgebraError::Store(format!("map `{id}` not found")))
    }

    fn write(&self, id: &MapId, payload: MapPayload, overwrite: bool) -> Result<()> {
        let mut maps = self.maps.write();
        if !overwrite && maps.contains_key(id) {
            return Err(AlgebraError::Store(format!(
                "map `{id}` exists and overwrite is off"
            )));
        }
        maps.insert(id.clone(), payload);
        Ok(())
    }

    fn delete(&self, id: &MapId) -> Result<bool> {
        Ok(self.maps.write().remove(id).is_some())
    }

    fn exists(&self, id: &MapId) -> bool {
        self.maps.read().contains_key(id)
    }
}

/// Reference kernel over maps that hold one value everywhere.
///
/// Spatial offsets do not change a constant map. Null cells are `NaN`;
/// division by zero is reported as a failure.
pub struct ConstantKernel {
    store: Arc<MemoryMapStore>,
    calls: AtomicU64,
}

impl ConstantKernel {
    pub fn new(store: Arc<MemoryMapStore>) -> Self {
        Self {
            store,
            calls: AtomicU64::new(0),
        }
    }

    /// Number of `apply` invocations so far.
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }

    fn resolve(&self, arg: &KernelArg) -> std::result::Result<(f64, Option<Rect<f64>>), KernelFailure> {
        match arg {
            KernelArg::Scalar(value) => Ok((*value, None)),
            KernelArg::Map { id, .. } => {
                let payload = self
                    .store
                    .read(id)
                    .map_err(|e| KernelFailure::new(e.to_string()))?;
                let value = payload
                    .constant_value()
                    .ok_or_else(|| KernelFailure::new(format!("map `{id}` is not a constant map")))?;
                Ok((value, payload.bounds))
            }
        }
    }
}

fn intersect(a: Option<Rect<f64>>, b: Option<Rect<f64>>) -> std::result::Result<Option<Rect<f64>>, KernelFailure> {
    match (a, b) {
        (Some(a), Some(b)) => {
            let min_x = a.min().x.max(b.min().x);
            let min_y = a.min().y.max(b.min().y);
            let max_x = a.max().x.min(b.max().x);
            let max_y = a.max().y.min(b.max().y);
            if min_x > max_x || min_y > max_y {
                return Err(KernelFailure::new("input maps do not overlap spatially"));
            }
            Ok(Some(Rect::new(
                coord! { x: min_x, y: min_y },
                coord! { x: max_x, y: max_y },
            )))
        }
        (a, b) => Ok(a.or(b)),
    }
}

impl MapOperator for ConstantKernel {
    fn apply(
        &self,
        op: KernelOp,
        args: &[KernelArg],
        output: &MapId,
    ) -> std::result::Result<MapId, KernelFailure> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        let mut values = Vec::with_capacity(args.len());
        let mut bounds = None;
        for arg in args {
            let (value, region) = self.resolve(arg)?;
            bounds = intersect(bounds, region)?;
            values.push(value);
        }

        let value = match (op, values.as_slice()) {
            (KernelOp::Assign, [value]) => *value,
            (KernelOp::If, [cond, then]) => {
                if cond.is_nan() || *cond == 0.0 {
                    f64::NAN
                } else {
                    *then
                }
            }
            (KernelOp::If, [cond, then, otherwise]) => {
                if cond.is_nan() {
                    f64::NAN
                } else if *cond != 0.0 {
                    *then
                } else {
                    *otherwise
                }
            }
            (op, [a, b]) if a.is_nan() || b.is_nan() => {
                log::trace!("{op} on null input");
                f64::NAN
            }
            (op, [a, b]) => op
                .eval_binary(*a, *b)
                .ok_or_else(|| KernelFailure::new(format!("`{a} {op} {b}` is undefined")))?,
            (op, values) => {
                return Err(KernelFailure::new(format!(
                    "operator `{op}` does not take {} arguments",
                    values.len()
                )));
            }
        };

        self.store
            .write(output, MapPayload::constant(value, bounds), true)
            .map_err(|e| KernelFailure::new(e.to_string()))?;
        Ok(output.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (Arc<MemoryMapStore>, ConstantKernel) {
        let store = Arc::new(MemoryMapStore::new());
        store.put_constant(&MapId::new("a", "m"), 2.0);
        store.put_constant(&MapId::new("b", "m"), 5.0);
        let kernel = ConstantKernel::new(Arc::clone(&store));
        (store, kernel)
    }

    fn map(name: &str) -> KernelArg {
        KernelArg::Map {
            id: MapId::new(name, "m"),
            offset: Default::default(),
        }
    }

    #[test]
    fn test_binary_map_and_scalar() {
        let (store, kernel) = setup();
        let out = MapId::new("out", "m");
        kernel
            .apply(KernelOp::Mul, &[map("a"), KernelArg::Scalar(3.0)], &out)
            .unwrap();
        assert_eq!(store.constant(&out), Some(6.0));
        kernel.apply(KernelOp::Lt, &[map("a"), map("b")], &out).unwrap();
        assert_eq!(store.constant(&out), Some(1.0));
        assert_eq!(kernel.calls(), 2);
    }

    #[test]
    fn test_conditional() {
        let (store, kernel) = setup();
        let out = MapId::new("out", "m");
        kernel
            .apply(
                KernelOp::If,
                &[KernelArg::Scalar(0.0), map("a"), map("b")],
                &out,
            )
            .unwrap();
        assert_eq!(store.constant(&out), Some(5.0));
        kernel
            .apply(KernelOp::If, &[KernelArg::Scalar(0.0), map("a")], &out)
            .unwrap();
        assert!(store.constant(&out).unwrap().is_nan());
        assert!(store.read(&out).unwrap().min.is_none());
    }

    #[test]
    fn test_failures() {
        let (_, kernel) = setup();
        let out = MapId::new("out", "m");
        assert!(kernel
            .apply(KernelOp::Div, &[map("a"), KernelArg::Scalar(0.0)], &out)
            .is_err());
        assert!(kernel.apply(KernelOp::Add, &[map("missing"), map("a")], &out).is_err());
        assert!(kernel.apply(KernelOp::Add, &[map("a")], &out).is_err());
    }

    #[test]
    fn test_store_overwrite_flag() {
        let store = MemoryMapStore::new();
        let id = MapId::new("x", "m");
        store.write(&id, MapPayload::constant(1.0, None), false).unwrap();
        assert!(store.write(&id, MapPayload::constant(2.0, None), false).is_err());
        store.write(&id, MapPayload::constant(2.0, None), true).unwrap();
        assert_eq!(store.constant(&id), Some(2.0));
        assert!(store.delete(&id).unwrap());
        assert!(!store.delete(&id).unwrap());
        assert!(store.is_empty());
    }

    #[test]
    fn test_spatial_intersection() {
        let store = Arc::new(MemoryMapStore::new());
        let left = Rect::new(coord! { x: 0.0, y: 0.0 }, coord! { x: 2.0, y: 2.0 });
        let right = Rect::new(coord! { x: 1.0, y: 1.0 }, coord! { x: 3.0, y: 3.0 });
        store
            .write(&MapId::new("l", "m"), MapPayload::constant(1.0, Some(left)), false)
            .unwrap();
        store
            .write(&MapId::new("r", "m"), MapPayload::constant(1.0, Some(right)), false)
            .unwrap();
        let kernel = ConstantKernel::new(Arc::clone(&store));
        let out = MapId::new("out", "m");
        kernel.apply(KernelOp::Add, &[map("l"), map("r")], &out).unwrap();
        let bounds = store.read(&out).unwrap().bounds.unwrap();
        assert_eq!(bounds.min(), coord! { x: 1.0, y: 1.0 });
        assert_eq!(bounds.max(), coord! { x: 2.0, y: 2.0 });
    }
}
