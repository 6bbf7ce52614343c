//! Walks a parsed statement into a temporal series.
//!
//! Every node is evaluated depth first and fully materialized as a
//! [`Series`] of symbolic operands. Literals and `map()` references are
//! timeless and broadcast over whatever series they meet.

use super::ast::{Expr, ExprKind, NeighborOffset, Statement, TemporalFunction};
use super::matcher::Matcher;
use super::resolver::{ExtentCode, resolve};
use super::series::{Entry, MapRef, Operand, Series};
use crate::catalog::{Catalog, Dataset};
use crate::config::Config;
use crate::error::{AlgebraError, CatalogError, Result};
use crate::kernel::{KernelOp, MapStore, SpatialOffset};
use crate::temporal::{RelationSet, TemporalExtent, TemporalType};
use crate::types::{MapId, MapKind};
use chrono::{Datelike, NaiveDateTime, Timelike};
use rustc_hash::FxHashMap;

const SECONDS_PER_DAY: f64 = 86_400.0;

/// Value of an evaluated node.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Series(Series),
    /// Literals and `map()` references carry no time
    Timeless(Operand),
}

/// Result of evaluating a statement.
#[derive(Debug, Clone)]
pub struct Evaluation {
    pub series: Series,
    /// Input datasets in order of first appearance
    pub inputs: Vec<Dataset>,
}

impl Evaluation {
    /// Temporal type shared by the inputs and the result.
    pub fn temporal_type(&self) -> Result<Option<TemporalType>> {
        let mut types = self
            .inputs
            .iter()
            .map(Dataset::temporal_type)
            .chain(self.series.iter().map(|e| e.extent.temporal_type()));
        let Some(first) = types.next() else {
            return Ok(None);
        };
        if types.any(|t| t != first) {
            return Err(AlgebraError::evaluation(
                "inputs mix absolute and relative time",
                "",
            ));
        }
        Ok(Some(first))
    }
}

pub struct Evaluator<'a> {
    catalog: &'a Catalog,
    store: &'a dyn MapStore,
    kind: MapKind,
    mapset: &'a str,
    matcher: Matcher,
    inputs: FxHashMap<String, Series>,
}

impl<'a> Evaluator<'a> {
    pub fn new(
        catalog: &'a Catalog,
        store: &'a dyn MapStore,
        kind: MapKind,
        config: &'a Config,
    ) -> Self {
        Self {
            catalog,
            store,
            kind,
            mapset: &config.mapset,
            matcher: Matcher::new(config.debug),
            inputs: FxHashMap::default(),
        }
    }

    pub fn evaluate(mut self, statement: &Statement) -> Result<Evaluation> {
        let mut datasets = Vec::new();
        for name in statement.expr.datasets() {
            let (dataset, series) = self.load(name)?;
            log::debug!("loaded {} with {} maps", dataset.id(), series.len());
            datasets.push(dataset);
            self.inputs.insert(name.to_string(), series);
        }
        let value = self.eval(&statement.expr, statement)?;
        let Value::Series(series) = value else {
            return Err(AlgebraError::evaluation(
                "expression does not yield a space-time dataset",
                statement.text(statement.expr.span),
            ));
        };
        let evaluation = Evaluation {
            series,
            inputs: datasets,
        };
        evaluation.temporal_type()?;
        Ok(evaluation)
    }

    fn load(&self, name: &str) -> Result<(Dataset, Series)> {
        let stds = self.kind.dataset_kind();
        let id = self.parse_id(name)?;
        let dataset = self
            .catalog
            .dataset(stds, &id)?
            .ok_or_else(|| CatalogError::NotFound {
                kind: stds.to_string(),
                id: id.id(),
            })?;
        let entries = self
            .catalog
            .registered_maps(stds, &id)?
            .into_iter()
            .map(|map| Entry::new(map.extent, Operand::map(map.id)))
            .collect();
        Ok((dataset, Series::new(entries)))
    }

    fn parse_id(&self, name: &str) -> Result<MapId> {
        MapId::parse(name, self.mapset)
            .ok_or_else(|| AlgebraError::evaluation(format!("invalid identifier `{name}`"), name))
    }

    fn eval(&self, expr: &Expr, stmt: &Statement) -> Result<Value> {
        let ctx = stmt.text(expr.span);
        let value = match &expr.kind {
            ExprKind::Series(name) => Value::Series(self.input(name, ctx)?.clone()),
            ExprKind::SingleMap { name, registered } => self.single_map(name, *registered, ctx)?,
            ExprKind::Number(value) => Value::Timeless(Operand::Scalar(*value)),
            ExprKind::Text(text) => Value::Timeless(Operand::Text(text.clone())),
            ExprKind::Arithmetic { op, lhs, rhs } => {
                let (lhs, rhs) = (self.eval(lhs, stmt)?, self.eval(rhs, stmt)?);
                self.operator(
                    *op,
                    &RelationSet::default(),
                    ExtentCode::Intersect,
                    lhs,
                    rhs,
                    ctx,
                )?
            }
            ExprKind::Temporal {
                op,
                relations,
                extent,
                lhs,
                rhs,
            } => {
                let (lhs, rhs) = (self.eval(lhs, stmt)?, self.eval(rhs, stmt)?);
                self.operator(*op, relations, *extent, lhs, rhs, ctx)?
            }
            ExprKind::Select {
                negated,
                relations,
                extent,
                lhs,
                rhs,
            } => {
                let lhs = self.series_of(self.eval(lhs, stmt)?, "select", ctx)?;
                let rhs = self.series_of(self.eval(rhs, stmt)?, "select", ctx)?;
                Value::Series(self.select(*negated, relations, *extent, &lhs, &rhs))
            }
            ExprKind::Hash {
                relations,
                extent,
                lhs,
                rhs,
            } => {
                let lhs = self.series_of(self.eval(lhs, stmt)?, "#", ctx)?;
                let rhs = self.series_of(self.eval(rhs, stmt)?, "#", ctx)?;
                Value::Series(self.hash(relations, *extent, &lhs, &rhs))
            }
            ExprKind::Conditional {
                relations,
                condition,
                then,
                otherwise,
            } => {
                let condition = self.eval(condition, stmt)?;
                let then = self.eval(then, stmt)?;
                let otherwise = match otherwise {
                    Some(expr) => Some(self.eval(expr, stmt)?),
                    None => None,
                };
                self.conditional(relations, condition, then, otherwise, ctx)?
            }
            ExprKind::Neighbor { series, offset } => {
                Value::Series(neighbor(self.input(series, ctx)?, *offset))
            }
            ExprKind::Shift { expr, increment } => {
                let series = self.series_of(self.eval(expr, stmt)?, "tshift", ctx)?;
                Value::Series(retime(series, |e| e.shifted(increment))?)
            }
            ExprKind::Buffer { expr, increment } => {
                let series = self.series_of(self.eval(expr, stmt)?, "buff_t", ctx)?;
                Value::Series(retime(series, |e| e.buffered(increment))?)
            }
            ExprKind::Snap(expr) => {
                let series = self.series_of(self.eval(expr, stmt)?, "tsnap", ctx)?;
                Value::Series(snap(series))
            }
            ExprKind::Function { func, arg } => {
                let series = self.series_of(self.eval(arg, stmt)?, "a temporal function", ctx)?;
                Value::Series(temporal_function(*func, series, ctx)?)
            }
        };
        if let Value::Series(series) = &value {
            log::debug!("`{ctx}` -> {} entries", series.len());
        }
        Ok(value)
    }

    fn input(&self, name: &str, ctx: &str) -> Result<&Series> {
        self.inputs.get(name).ok_or_else(|| {
            AlgebraError::evaluation(format!("unknown space-time dataset `{name}`"), ctx)
        })
    }

    fn series_of(&self, value: Value, what: &str, ctx: &str) -> Result<Series> {
        match value {
            Value::Series(series) => Ok(series),
            Value::Timeless(_) => Err(AlgebraError::evaluation(
                format!("{what} requires space-time datasets"),
                ctx,
            )),
        }
    }

    fn single_map(&self, name: &str, registered: bool, ctx: &str) -> Result<Value> {
        let id = self.parse_id(name)?;
        if !registered {
            if !self.store.exists(&id) {
                return Err(AlgebraError::evaluation(format!("map `{id}` not found"), ctx));
            }
            return Ok(Value::Timeless(Operand::map(id)));
        }
        let record = self.catalog.map_record(self.kind, &id)?.ok_or_else(|| {
            AlgebraError::evaluation(format!("map `{id}` is not registered"), ctx)
        })?;
        Ok(Value::Series(Series::new(vec![Entry::new(
            record.extent,
            Operand::map(record.id),
        )])))
    }

    /// Apply a kernel operator. Each left entry combines with every right
    /// entry it relates to, `a op b1 op b2 ...`; the result takes the left
    /// extent for `l`, otherwise one entry per matched pair.
    fn operator(
        &self,
        op: KernelOp,
        relations: &RelationSet,
        code: ExtentCode,
        lhs: Value,
        rhs: Value,
        ctx: &str,
    ) -> Result<Value> {
        let combine = |a: Operand, b: Operand| {
            Operand::combine(op, a, b).map_err(|message| AlgebraError::evaluation(message, ctx))
        };
        let (a, b) = match (lhs, rhs) {
            (Value::Timeless(a), Value::Timeless(b)) => return Ok(Value::Timeless(combine(a, b)?)),
            (Value::Series(a), Value::Timeless(b)) => {
                let entries = a
                    .into_entries()
                    .into_iter()
                    .map(|e| Ok(Entry::new(e.extent, combine(e.operand, b.clone())?)))
                    .collect::<Result<Vec<_>>>()?;
                return Ok(Value::Series(Series::new(entries)));
            }
            (Value::Timeless(a), Value::Series(b)) => {
                let entries = b
                    .into_entries()
                    .into_iter()
                    .map(|e| Ok(Entry::new(e.extent, combine(a.clone(), e.operand)?)))
                    .collect::<Result<Vec<_>>>()?;
                return Ok(Value::Series(Series::new(entries)));
            }
            (Value::Series(a), Value::Series(b)) => (a, b),
        };

        let mut entries = Vec::new();
        for (left, group) in a.iter().zip(self.matcher.groups(&a, &b, relations)) {
            if group.is_empty() {
                continue;
            }
            let mut value = left.operand.clone();
            for &j in &group {
                value = combine(value, b.entries()[j].operand.clone())?;
            }
            push_resolved(&mut entries, left, &b, &group, code, value);
        }
        Ok(Value::Series(Series::new(entries)))
    }

    fn select(
        &self,
        negated: bool,
        relations: &RelationSet,
        code: ExtentCode,
        a: &Series,
        b: &Series,
    ) -> Series {
        if negated {
            let kept = a
                .iter()
                .filter(|e| !self.matcher.has_match(&e.extent, b, relations))
                .cloned()
                .collect();
            return Series::new(kept);
        }
        let mut entries = Vec::new();
        for (left, group) in a.iter().zip(self.matcher.groups(a, b, relations)) {
            if !group.is_empty() {
                push_resolved(&mut entries, left, b, &group, code, left.operand.clone());
            }
        }
        Series::new(entries)
    }

    fn hash(&self, relations: &RelationSet, code: ExtentCode, a: &Series, b: &Series) -> Series {
        let mut entries = Vec::new();
        for (left, group) in a.iter().zip(self.matcher.groups(a, b, relations)) {
            if !group.is_empty() {
                let count = Operand::Scalar(group.len() as f64);
                push_resolved(&mut entries, left, b, &group, code, count);
            }
        }
        Series::new(entries)
    }

    /// The result follows the time of `then` (or of the condition when
    /// `then` is timeless). Condition entries relate to result entries
    /// through `relations`; `else` entries pair by equal extent.
    fn conditional(
        &self,
        relations: &RelationSet,
        condition: Value,
        then: Value,
        otherwise: Option<Value>,
        ctx: &str,
    ) -> Result<Value> {
        let eval_err = |message: String| AlgebraError::evaluation(message, ctx);
        let branch_at = |value: &Option<Value>, extent: &TemporalExtent| match value {
            None => None,
            Some(Value::Timeless(operand)) => Some(operand.clone()),
            Some(Value::Series(series)) => series
                .iter()
                .find(|e| e.extent == *extent)
                .map(|e| e.operand.clone()),
        };

        match (condition, then) {
            (Value::Timeless(cond), Value::Timeless(then)) => {
                let otherwise = match otherwise {
                    None => None,
                    Some(Value::Timeless(operand)) => Some(operand),
                    Some(Value::Series(_)) => {
                        return Err(eval_err(
                            "the else branch has time but the condition and then branch do not"
                                .to_string(),
                        ));
                    }
                };
                Operand::conditional(cond, then, otherwise)
                    .map_err(eval_err)?
                    .map(Value::Timeless)
                    .ok_or_else(|| eval_err("condition is always false".to_string()))
            }
            (Value::Series(cond), Value::Timeless(then)) => {
                let mut entries = Vec::new();
                for entry in cond.iter() {
                    let otherwise = branch_at(&otherwise, &entry.extent);
                    if let Some(operand) =
                        Operand::conditional(entry.operand.clone(), then.clone(), otherwise)
                            .map_err(eval_err)?
                    {
                        entries.push(Entry::new(entry.extent, operand));
                    }
                }
                Ok(Value::Series(Series::new(entries)))
            }
            (cond, Value::Series(then)) => {
                let mut entries = Vec::new();
                for entry in then.iter() {
                    let condition = match &cond {
                        Value::Timeless(operand) => operand.clone(),
                        Value::Series(cond) => {
                            let mut matched = cond
                                .iter()
                                .filter(|c| relations.matches(&c.extent, &entry.extent))
                                .map(|c| c.operand.clone());
                            let Some(first) = matched.next() else {
                                continue;
                            };
                            let mut all = first;
                            for next in matched {
                                all = Operand::combine(KernelOp::And, all, next)
                                    .map_err(eval_err)?;
                            }
                            all
                        }
                    };
                    let otherwise = branch_at(&otherwise, &entry.extent);
                    if let Some(operand) =
                        Operand::conditional(condition, entry.operand.clone(), otherwise)
                            .map_err(eval_err)?
                    {
                        entries.push(Entry::new(entry.extent, operand));
                    }
                }
                Ok(Value::Series(Series::new(entries)))
            }
        }
    }
}

/// One entry with the left extent for `l`, otherwise one per matched pair
/// whose resolved extent is not empty.
fn push_resolved(
    entries: &mut Vec<Entry>,
    left: &Entry,
    b: &Series,
    group: &[usize],
    code: ExtentCode,
    operand: Operand,
) {
    if code == ExtentCode::Left {
        entries.push(Entry::new(left.extent, operand));
        return;
    }
    for &j in group {
        if let Some(extent) = resolve(&left.extent, &b.entries()[j].extent, code) {
            entries.push(Entry::new(extent, operand.clone()));
        }
    }
}

/// Entry `i` takes the operand of entry `i + dt` and keeps its own extent.
fn neighbor(series: &Series, offset: NeighborOffset) -> Series {
    let entries = series.entries();
    let spatial = SpatialOffset {
        dx: offset.dx,
        dy: offset.dy,
    };
    let shifted = entries
        .iter()
        .enumerate()
        .filter_map(|(i, entry)| {
            let j = usize::try_from(i as i64 + offset.dt).ok()?;
            let source = entries.get(j)?;
            let operand = match &source.operand {
                Operand::Map(map) => Operand::Map(MapRef::new(map.id.clone()).with_offset(spatial)),
                other => other.clone(),
            };
            Some(Entry::new(entry.extent, operand))
        })
        .collect();
    Series::new(shifted)
}

fn retime(
    series: Series,
    f: impl Fn(&TemporalExtent) -> Result<TemporalExtent>,
) -> Result<Series> {
    let entries = series
        .into_entries()
        .into_iter()
        .map(|e| Ok(Entry::new(f(&e.extent)?, e.operand)))
        .collect::<Result<Vec<_>>>()?;
    Ok(Series::new(entries))
}

/// Each entry ends where the next later-starting entry begins.
fn snap(series: Series) -> Series {
    let extents = series.extents();
    let entries = series
        .into_entries()
        .into_iter()
        .enumerate()
        .map(|(i, entry)| {
            let start = entry.extent.bounds().0;
            let snapped = extents[i + 1..]
                .iter()
                .find(|next| next.bounds().0 > start)
                .and_then(|next| entry.extent.snapped_to(next));
            Entry::new(snapped.unwrap_or(entry.extent), entry.operand)
        })
        .collect();
    Series::new(entries)
}

fn temporal_function(func: TemporalFunction, series: Series, ctx: &str) -> Result<Series> {
    let entries = series
        .into_entries()
        .into_iter()
        .map(|e| Ok(Entry::new(e.extent, function_value(func, &e.extent, ctx)?)))
        .collect::<Result<Vec<_>>>()?;
    Ok(Series::new(entries))
}

fn function_value(func: TemporalFunction, extent: &TemporalExtent, ctx: &str) -> Result<Operand> {
    use TemporalFunction::*;
    let at = |start: bool| {
        let point = if start {
            extent.start_datetime()
        } else {
            extent.end_datetime()
        };
        point.ok_or_else(|| {
            AlgebraError::evaluation("date and time functions require absolute time", ctx)
        })
    };
    let text = |at: NaiveDateTime, format: &str| Operand::Text(at.format(format).to_string());
    let number = |value: u32| Operand::Scalar(f64::from(value));
    let operand = match func {
        Td => {
            let length = extent.length() as f64;
            Operand::Scalar(match extent {
                TemporalExtent::Absolute { .. } => length / SECONDS_PER_DAY,
                TemporalExtent::Relative { .. } => length,
            })
        }
        StartDate => text(at(true)?, "%Y-%m-%d"),
        StartTime => text(at(true)?, "%H:%M:%S"),
        StartDatetime => text(at(true)?, "%Y-%m-%d %H:%M:%S"),
        EndDate => text(at(false)?, "%Y-%m-%d"),
        EndTime => text(at(false)?, "%H:%M:%S"),
        EndDatetime => text(at(false)?, "%Y-%m-%d %H:%M:%S"),
        StartYear => Operand::Scalar(f64::from(at(true)?.year())),
        StartMonth => number(at(true)?.month()),
        StartDay => number(at(true)?.day()),
        StartDoy => number(at(true)?.ordinal()),
        StartDow => number(at(true)?.weekday().number_from_monday()),
        StartHour => number(at(true)?.hour()),
        StartMinute => number(at(true)?.minute()),
        StartSecond => number(at(true)?.second()),
        EndYear => Operand::Scalar(f64::from(at(false)?.year())),
        EndMonth => number(at(false)?.month()),
        EndDay => number(at(false)?.day()),
        EndDoy => number(at(false)?.ordinal()),
        EndDow => number(at(false)?.weekday().number_from_monday()),
        EndHour => number(at(false)?.hour()),
        EndMinute => number(at(false)?.minute()),
        EndSecond => number(at(false)?.second()),
    };
    Ok(operand)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::temporal::TimeIncrement;

    fn day(d: u32) -> TemporalExtent {
        TemporalExtent::parse_absolute(&format!("2001-01-{d:02}"), &format!("2001-01-{:02}", d + 1))
            .unwrap()
    }

    fn series(name: &str, first_day: u32, count: u32) -> Series {
        Series::new(
            (0..count)
                .map(|i| {
                    Entry::new(
                        day(first_day + i),
                        Operand::map(MapId::new(format!("{name}{}", i + 1), "PERMANENT")),
                    )
                })
                .collect(),
        )
    }

    #[test]
    fn test_neighbor_shifts_operands() {
        let a = series("a", 1, 4);
        let back = neighbor(&a, NeighborOffset { dx: 0, dy: 0, dt: -1 });
        assert_eq!(back.len(), 3);
        assert_eq!(back.entries()[0].extent, day(2));
        assert_eq!(back.entries()[0].operand.to_string(), "a1@PERMANENT");

        let spatial = neighbor(&a, NeighborOffset { dx: 1, dy: 0, dt: 0 });
        assert_eq!(spatial.len(), 4);
        assert_eq!(spatial.entries()[0].operand.to_string(), "a1@PERMANENT[1,0]");
    }

    #[test]
    fn test_snap_closes_gaps() {
        let gappy = Series::new(vec![
            Entry::new(day(1), Operand::Scalar(1.0)),
            Entry::new(day(4), Operand::Scalar(2.0)),
        ]);
        let snapped = snap(gappy);
        assert_eq!(
            snapped.entries()[0].extent,
            TemporalExtent::parse_absolute("2001-01-01", "2001-01-04").unwrap()
        );
        assert_eq!(snapped.entries()[1].extent, day(4));
    }

    #[test]
    fn test_retime_buffer() {
        let padded = retime(series("c", 2, 1), |e| {
            e.buffered(&TimeIncrement::parse("1 day").unwrap())
        })
        .unwrap();
        assert_eq!(
            padded.entries()[0].extent,
            TemporalExtent::parse_absolute("2001-01-01", "2001-01-04").unwrap()
        );
    }

    #[test]
    fn test_function_values() {
        let extent = TemporalExtent::parse_absolute("2001-01-02 06:00:00", "2001-01-04").unwrap();
        assert_eq!(
            function_value(TemporalFunction::Td, &extent, "").unwrap(),
            Operand::Scalar(1.75)
        );
        assert_eq!(
            function_value(TemporalFunction::StartDate, &extent, "").unwrap(),
            Operand::Text("2001-01-02".into())
        );
        assert_eq!(
            function_value(TemporalFunction::StartHour, &extent, "").unwrap(),
            Operand::Scalar(6.0)
        );
        // 2001-01-02 was a Tuesday
        assert_eq!(
            function_value(TemporalFunction::StartDow, &extent, "").unwrap(),
            Operand::Scalar(2.0)
        );
        assert_eq!(
            function_value(TemporalFunction::EndDoy, &extent, "").unwrap(),
            Operand::Scalar(4.0)
        );
        let relative = TemporalExtent::relative(0, 3, crate::temporal::TimeUnit::Month).unwrap();
        assert_eq!(
            function_value(TemporalFunction::Td, &relative, "").unwrap(),
            Operand::Scalar(3.0)
        );
        assert!(function_value(TemporalFunction::StartYear, &relative, "").is_err());
    }

    #[test]
    fn test_push_resolved_codes() {
        let a = series("a", 1, 1);
        let b = Series::new(vec![Entry::new(
            TemporalExtent::parse_absolute("2001-01-01", "2001-01-03").unwrap(),
            Operand::Scalar(5.0),
        )]);
        let mut entries = Vec::new();
        push_resolved(
            &mut entries,
            &a.entries()[0],
            &b,
            &[0],
            ExtentCode::Right,
            Operand::Scalar(1.0),
        );
        assert_eq!(entries[0].extent, b.entries()[0].extent);
    }
}
