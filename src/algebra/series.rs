//! Temporal series: ordered `(extent, operand)` entries produced by every
//! evaluated node.
//!
//! An operand is a symbolic description of a map's contents. Nothing is
//! computed while the series is built; the executor later turns each
//! operand tree into kernel calls.

use crate::kernel::{KernelOp, SpatialOffset};
use crate::temporal::TemporalExtent;
use crate::types::MapId;
use std::fmt;

/// A stored map read with an optional cell offset.
#[derive(Debug, Clone, PartialEq)]
pub struct MapRef {
    pub id: MapId,
    pub offset: SpatialOffset,
}

impl MapRef {
    pub fn new(id: MapId) -> Self {
        Self {
            id,
            offset: SpatialOffset::default(),
        }
    }

    pub fn with_offset(mut self, offset: SpatialOffset) -> Self {
        self.offset = offset;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Map(MapRef),
    Scalar(f64),
    /// Date or time text from the temporal functions
    Text(String),
    Apply { op: KernelOp, args: Vec<Operand> },
}

impl Operand {
    pub fn map(id: MapId) -> Self {
        Operand::Map(MapRef::new(id))
    }

    pub fn as_scalar(&self) -> Option<f64> {
        match self {
            Operand::Scalar(value) => Some(*value),
            _ => None,
        }
    }

    /// `lhs op rhs`, folded when both sides are constants. Text only
    /// compares with text.
    pub fn combine(op: KernelOp, lhs: Operand, rhs: Operand) -> Result<Operand, String> {
        match (lhs, rhs) {
            (Operand::Scalar(a), Operand::Scalar(b)) => op
                .eval_binary(a, b)
                .map(Operand::Scalar)
                .ok_or_else(|| format!("`{a} {op} {b}` is undefined")),
            (Operand::Text(a), Operand::Text(b)) => {
                if !op.is_comparison() {
                    return Err(format!("operator `{op}` is not defined for text"));
                }
                let truth = match op {
                    KernelOp::Eq => a == b,
                    KernelOp::Ne => a != b,
                    KernelOp::Lt => a < b,
                    KernelOp::Le => a <= b,
                    KernelOp::Gt => a > b,
                    _ => a >= b,
                };
                Ok(Operand::Scalar(if truth { 1.0 } else { 0.0 }))
            }
            (Operand::Text(_), _) | (_, Operand::Text(_)) => {
                Err("text can only be compared with text".to_string())
            }
            (lhs, rhs) => Ok(Operand::Apply {
                op,
                args: vec![lhs, rhs],
            }),
        }
    }

    /// `if(condition, then[, otherwise])`. A constant condition picks a
    /// branch directly; `Ok(None)` means the entry has no value.
    pub fn conditional(
        condition: Operand,
        then: Operand,
        otherwise: Option<Operand>,
    ) -> Result<Option<Operand>, String> {
        match condition {
            Operand::Scalar(value) => Ok(if value != 0.0 && !value.is_nan() {
                Some(then)
            } else {
                otherwise
            }),
            Operand::Text(_) => Err("a condition cannot be text".to_string()),
            condition => {
                let mut args = vec![condition, then];
                args.extend(otherwise);
                Ok(Some(Operand::Apply {
                    op: KernelOp::If,
                    args,
                }))
            }
        }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Map(map) if map.offset.is_zero() => write!(f, "{}", map.id),
            Operand::Map(map) => write!(f, "{}[{},{}]", map.id, map.offset.dx, map.offset.dy),
            Operand::Scalar(value) => write!(f, "{value}"),
            Operand::Text(text) => write!(f, "\"{text}\""),
            Operand::Apply { op, args } => match (op, args.as_slice()) {
                (KernelOp::If, args) => {
                    f.write_str("if(")?;
                    for (i, arg) in args.iter().enumerate() {
                        if i > 0 {
                            f.write_str(", ")?;
                        }
                        write!(f, "{arg}")?;
                    }
                    f.write_str(")")
                }
                (op, [lhs, rhs]) => write!(f, "({lhs} {op} {rhs})"),
                (op, args) => {
                    write!(f, "{op}(")?;
                    for (i, arg) in args.iter().enumerate() {
                        if i > 0 {
                            f.write_str(", ")?;
                        }
                        write!(f, "{arg}")?;
                    }
                    f.write_str(")")
                }
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    pub extent: TemporalExtent,
    pub operand: Operand,
}

impl Entry {
    pub fn new(extent: TemporalExtent, operand: Operand) -> Self {
        Self { extent, operand }
    }
}

/// Entries sorted by start time. Entries with the same extent and the same
/// operand are collapsed into one.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Series {
    entries: Vec<Entry>,
}

impl Series {
    pub fn new(entries: Vec<Entry>) -> Self {
        let mut sorted: Vec<Entry> = Vec::with_capacity(entries.len());
        for entry in entries {
            if !sorted.contains(&entry) {
                sorted.push(entry);
            }
        }
        sorted.sort_by_key(|e| e.extent.bounds());
        Self { entries: sorted }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<Entry> {
        self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Entry> {
        self.entries.iter()
    }

    pub fn extents(&self) -> Vec<TemporalExtent> {
        self.entries.iter().map(|e| e.extent).collect()
    }
}

impl<'a> IntoIterator for &'a Series {
    type Item = &'a Entry;
    type IntoIter = std::slice::Iter<'a, Entry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> TemporalExtent {
        TemporalExtent::parse_absolute(&format!("2001-01-{d:02}"), &format!("2001-01-{:02}", d + 1))
            .unwrap()
    }

    fn map(name: &str) -> Operand {
        Operand::map(MapId::new(name, "PERMANENT"))
    }

    #[test]
    fn test_series_sorted_and_collapsed() {
        let series = Series::new(vec![
            Entry::new(day(3), map("c")),
            Entry::new(day(1), map("a")),
            Entry::new(day(1), map("a")),
            Entry::new(day(1), map("b")),
        ]);
        assert_eq!(series.len(), 3);
        assert_eq!(series.entries()[0].operand, map("a"));
        assert_eq!(series.entries()[1].operand, map("b"));
        assert_eq!(series.extents()[2], day(3));
    }

    #[test]
    fn test_combine_folds_constants() {
        assert_eq!(
            Operand::combine(KernelOp::Add, Operand::Scalar(1.0), Operand::Scalar(2.0)),
            Ok(Operand::Scalar(3.0))
        );
        assert!(Operand::combine(KernelOp::Div, Operand::Scalar(1.0), Operand::Scalar(0.0)).is_err());
        assert_eq!(
            Operand::combine(
                KernelOp::Ge,
                Operand::Text("2001-01-02".into()),
                Operand::Text("2001-01-01".into())
            ),
            Ok(Operand::Scalar(1.0))
        );
        assert!(
            Operand::combine(KernelOp::Add, Operand::Text("a".into()), Operand::Text("b".into()))
                .is_err()
        );
        assert!(Operand::combine(KernelOp::Eq, Operand::Text("a".into()), map("x")).is_err());
    }

    #[test]
    fn test_combine_builds_tree() {
        let tree = Operand::combine(KernelOp::Mul, map("a"), Operand::Scalar(2.0)).unwrap();
        assert_eq!(tree.to_string(), "(a@PERMANENT * 2)");
    }

    #[test]
    fn test_conditional() {
        assert_eq!(
            Operand::conditional(Operand::Scalar(1.0), map("a"), None),
            Ok(Some(map("a")))
        );
        assert_eq!(Operand::conditional(Operand::Scalar(0.0), map("a"), None), Ok(None));
        assert_eq!(
            Operand::conditional(Operand::Scalar(0.0), map("a"), Some(map("b"))),
            Ok(Some(map("b")))
        );
        let tree = Operand::conditional(map("c"), map("a"), Some(Operand::Scalar(0.0)))
            .unwrap()
            .unwrap();
        assert_eq!(tree.to_string(), "if(c@PERMANENT, a@PERMANENT, 0)");
    }

    #[test]
    fn test_offset_rendering() {
        let operand = Operand::Map(
            MapRef::new(MapId::new("a", "PERMANENT")).with_offset(SpatialOffset { dx: 1, dy: -1 }),
        );
        assert_eq!(operand.to_string(), "a@PERMANENT[1,-1]");
    }
}
