//! The temporal algebra: parsing, relation matching, extent resolution,
//! series evaluation and kernel execution.

pub mod ast;
pub mod evaluator;
pub mod executor;
pub mod lexer;
pub mod matcher;
pub mod parser;
pub mod resolver;
pub mod series;

pub use ast::{Expr, ExprKind, NeighborOffset, Span, Statement, TemporalFunction};
pub use evaluator::{Evaluation, Evaluator, Value};
pub use executor::{Candidate, DroppedEntry, ExecutionReport, Executor};
pub use matcher::{Matcher, has_match, match_groups, match_pairs};
pub use parser::{parse, parse_with_datasets};
pub use resolver::{ExtentCode, Topology, resolve, summarize};
pub use series::{Entry, MapRef, Operand, Series};
