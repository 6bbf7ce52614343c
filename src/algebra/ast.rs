//! Syntax tree of algebra expressions.

use super::resolver::ExtentCode;
use crate::kernel::KernelOp;
use crate::temporal::{RelationSet, TimeIncrement};

/// Byte range of a node in the source expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn to(self, other: Span) -> Span {
        Span::new(self.start.min(other.start), self.end.max(other.end))
    }
}

/// `Name[dx, dy, dt]`; `Name[k]` is `dt = k`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NeighborOffset {
    pub dx: i64,
    pub dy: i64,
    pub dt: i64,
}

/// Functions that read the temporal extent of each entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TemporalFunction {
    /// Length of the extent (days for absolute time)
    Td,
    StartDate,
    StartTime,
    StartDatetime,
    EndDate,
    EndTime,
    EndDatetime,
    StartYear,
    StartMonth,
    StartDay,
    StartDoy,
    StartDow,
    StartHour,
    StartMinute,
    StartSecond,
    EndYear,
    EndMonth,
    EndDay,
    EndDoy,
    EndDow,
    EndHour,
    EndMinute,
    EndSecond,
}

impl TemporalFunction {
    pub fn parse(name: &str) -> Option<Self> {
        use TemporalFunction::*;
        let func = match name {
            "td" => Td,
            "start_date" => StartDate,
            "start_time" => StartTime,
            "start_datetime" => StartDatetime,
            "end_date" => EndDate,
            "end_time" => EndTime,
            "end_datetime" => EndDatetime,
            "start_year" => StartYear,
            "start_month" => StartMonth,
            "start_day" => StartDay,
            "start_doy" => StartDoy,
            "start_dow" => StartDow,
            "start_hour" => StartHour,
            "start_minute" => StartMinute,
            "start_second" => StartSecond,
            "end_year" => EndYear,
            "end_month" => EndMonth,
            "end_day" => EndDay,
            "end_doy" => EndDoy,
            "end_dow" => EndDow,
            "end_hour" => EndHour,
            "end_minute" => EndMinute,
            "end_second" => EndSecond,
            _ => return None,
        };
        Some(func)
    }

    /// Whether the function yields date/time text rather than a number.
    pub fn is_textual(self) -> bool {
        use TemporalFunction::*;
        matches!(
            self,
            StartDate | StartTime | StartDatetime | EndDate | EndTime | EndDatetime
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    /// A named space-time dataset
    Series(String),
    /// `map(name)` when `registered` is false, `tmap(name)` otherwise
    SingleMap { name: String, registered: bool },
    Number(f64),
    Text(String),
    /// Bare operator: pairs entries with equal extents
    Arithmetic {
        op: KernelOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    /// `lhs {op, relations, code} rhs`
    Temporal {
        op: KernelOp,
        relations: RelationSet,
        extent: ExtentCode,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Select {
        negated: bool,
        relations: RelationSet,
        extent: ExtentCode,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Hash {
        relations: RelationSet,
        extent: ExtentCode,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Conditional {
        relations: RelationSet,
        condition: Box<Expr>,
        then: Box<Expr>,
        otherwise: Option<Box<Expr>>,
    },
    Neighbor {
        series: String,
        offset: NeighborOffset,
    },
    Shift {
        expr: Box<Expr>,
        increment: TimeIncrement,
    },
    Buffer {
        expr: Box<Expr>,
        increment: TimeIncrement,
    },
    /// Close gaps: each entry ends where the next one starts
    Snap(Box<Expr>),
    Function {
        func: TemporalFunction,
        arg: Box<Expr>,
    },
}

impl Expr {
    pub fn new(kind: ExprKind, span: Span) -> Self {
        Self { kind, span }
    }

    /// Names of all datasets referenced below this node.
    pub fn datasets(&self) -> Vec<&str> {
        let mut names = Vec::new();
        self.collect_datasets(&mut names);
        names
    }

    fn collect_datasets<'a>(&'a self, names: &mut Vec<&'a str>) {
        match &self.kind {
            ExprKind::Series(name) | ExprKind::Neighbor { series: name, .. } => {
                if !names.contains(&name.as_str()) {
                    names.push(name);
                }
            }
            ExprKind::SingleMap { .. } | ExprKind::Number(_) | ExprKind::Text(_) => {}
            ExprKind::Arithmetic { lhs, rhs, .. }
            | ExprKind::Temporal { lhs, rhs, .. }
            | ExprKind::Select { lhs, rhs, .. }
            | ExprKind::Hash { lhs, rhs, .. } => {
                lhs.collect_datasets(names);
                rhs.collect_datasets(names);
            }
            ExprKind::Conditional {
                condition,
                then,
                otherwise,
                ..
            } => {
                condition.collect_datasets(names);
                then.collect_datasets(names);
                if let Some(otherwise) = otherwise {
                    otherwise.collect_datasets(names);
                }
            }
            ExprKind::Shift { expr, .. }
            | ExprKind::Buffer { expr, .. }
            | ExprKind::Snap(expr)
            | ExprKind::Function { arg: expr, .. } => expr.collect_datasets(names),
        }
    }
}

/// `target = expr`
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub target: String,
    pub expr: Expr,
    pub source: String,
}

impl Statement {
    /// Source text of a node, used as error context.
    pub fn text(&self, span: Span) -> &str {
        self.source.get(span.start..span.end).unwrap_or(&self.source)
    }
}
