//! Seams to the external per-map computation kernel and map store.
//!
//! The algebra never touches cell values itself: every arithmetic,
//! comparison or conditional over maps is delegated to a [`MapOperator`],
//! and result payloads are moved around through a [`MapStore`].

mod memory;

pub use memory::{ConstantKernel, MemoryMapStore};

use crate::error::Result;
use crate::types::MapId;
use bytes::Bytes;
use geo::Rect;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Operators the kernel understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KernelOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    /// `if(cond, then[, else])`
    If,
    /// Materialize a single argument as a new map
    Assign,
}

impl KernelOp {
    pub fn from_symbol(symbol: &str) -> Option<Self> {
        let op = match symbol {
            "+" => KernelOp::Add,
            "-" => KernelOp::Sub,
            "*" => KernelOp::Mul,
            "/" => KernelOp::Div,
            "%" => KernelOp::Mod,
            "==" => KernelOp::Eq,
            "!=" => KernelOp::Ne,
            "<" => KernelOp::Lt,
            "<=" => KernelOp::Le,
            ">" => KernelOp::Gt,
            ">=" => KernelOp::Ge,
            "&&" => KernelOp::And,
            "||" => KernelOp::Or,
            _ => return None,
        };
        Some(op)
    }

    pub fn symbol(self) -> &'static str {
        match self {
            KernelOp::Add => "+",
            KernelOp::Sub => "-",
            KernelOp::Mul => "*",
            KernelOp::Div => "/",
            KernelOp::Mod => "%",
            KernelOp::Eq => "==",
            KernelOp::Ne => "!=",
            KernelOp::Lt => "<",
            KernelOp::Le => "<=",
            KernelOp::Gt => ">",
            KernelOp::Ge => ">=",
            KernelOp::And => "&&",
            KernelOp::Or => "||",
            KernelOp::If => "if",
            KernelOp::Assign => "=",
        }
    }

    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            KernelOp::Eq | KernelOp::Ne | KernelOp::Lt | KernelOp::Le | KernelOp::Gt | KernelOp::Ge
        )
    }

    pub fn is_logical(self) -> bool {
        matches!(self, KernelOp::And | KernelOp::Or)
    }

    /// Evaluate a binary operator on plain numbers. Booleans are 1.0/0.0 and
    /// division by zero yields `None`.
    pub fn eval_binary(self, a: f64, b: f64) -> Option<f64> {
        let truth = |v: bool| if v { 1.0 } else { 0.0 };
        let value = match self {
            KernelOp::Add => a + b,
            KernelOp::Sub => a - b,
            KernelOp::Mul => a * b,
            KernelOp::Div | KernelOp::Mod if b == 0.0 => return None,
            KernelOp::Div => a / b,
            KernelOp::Mod => a % b,
            KernelOp::Eq => truth(a == b),
            KernelOp::Ne => truth(a != b),
            KernelOp::Lt => truth(a < b),
            KernelOp::Le => truth(a <= b),
            KernelOp::Gt => truth(a > b),
            KernelOp::Ge => truth(a >= b),
            KernelOp::And => truth(a != 0.0 && b != 0.0),
            KernelOp::Or => truth(a != 0.0 || b != 0.0),
            KernelOp::If | KernelOp::Assign => return None,
        };
        Some(value)
    }
}

impl fmt::Display for KernelOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Cell offset applied when reading a map argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct SpatialOffset {
    pub dx: i64,
    pub dy: i64,
}

impl SpatialOffset {
    pub fn is_zero(&self) -> bool {
        self.dx == 0 && self.dy == 0
    }
}

/// One kernel argument.
#[derive(Debug, Clone, PartialEq)]
pub enum KernelArg {
    Map { id: MapId, offset: SpatialOffset },
    Scalar(f64),
}

impl fmt::Display for KernelArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KernelArg::Map { id, offset } if offset.is_zero() => write!(f, "{id}"),
            KernelArg::Map { id, offset } => write!(f, "{id}[{},{}]", offset.dx, offset.dy),
            KernelArg::Scalar(value) => write!(f, "{value}"),
        }
    }
}

/// A kernel-reported failure for one invocation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct KernelFailure {
    pub message: String,
}

impl KernelFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// The external per-map computation service.
pub trait MapOperator: Send + Sync {
    /// Compute `op(args...)` into the map `output` and return its id.
    fn apply(
        &self,
        op: KernelOp,
        args: &[KernelArg],
        output: &MapId,
    ) -> std::result::Result<MapId, KernelFailure>;
}

/// Opaque map data plus the summaries the catalog records.
#[derive(Debug, Clone, PartialEq)]
pub struct MapPayload {
    pub data: Bytes,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub bounds: Option<Rect<f64>>,
}

impl MapPayload {
    pub fn new(data: Bytes) -> Self {
        Self {
            data,
            min: None,
            max: None,
            bounds: None,
        }
    }

    /// A map holding one value everywhere; `NaN` is the null map.
    pub fn constant(value: f64, bounds: Option<Rect<f64>>) -> Self {
        let range = (!value.is_nan()).then_some(value);
        Self {
            data: Bytes::copy_from_slice(&value.to_le_bytes()),
            min: range,
            max: range,
            bounds,
        }
    }

    pub fn constant_value(&self) -> Option<f64> {
        let bytes: [u8; 8] = self.data.as_ref().try_into().ok()?;
        Some(f64::from_le_bytes(bytes))
    }
}

/// Storage for map payloads, keyed by map id.
pub trait MapStore: Send + Sync {
    fn read(&self, id: &MapId) -> Result<MapPayload>;

    /// Fails when `id` exists and `overwrite` is false.
    fn write(&self, id: &MapId, payload: MapPayload, overwrite: bool) -> Result<()>;

    /// Returns whether anything was deleted.
    fn delete(&self, id: &MapId) -> Result<bool>;

    fn exists(&self, id: &MapId) -> bool;

    /// Copy a payload to a new id.
    fn copy(&self, from: &MapId, to: &MapId, overwrite: bool) -> Result<()> {
        let payload = self.read(from)?;
        self.write(to, payload, overwrite)
    }
}
