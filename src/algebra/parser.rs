//! Precedence-climbing parser for `R = <expression>` statements.

use super::ast::{Expr, ExprKind, NeighborOffset, Span, Statement, TemporalFunction};
use super::lexer::{Token, TokenKind, tokenize};
use super::resolver::ExtentCode;
use crate::error::ParseError;
use crate::kernel::KernelOp;
use crate::temporal::{RelationSet, TimeIncrement};
use crate::types::DatasetId;

/// Parse a statement without checking dataset names.
pub fn parse(source: &str) -> Result<Statement, ParseError> {
    Parser::new(source, None)?.statement()
}

/// Parse a statement, rejecting dataset names not in `known`. A name
/// matches either the bare map name or the full `name@mapset` id.
pub fn parse_with_datasets(source: &str, known: &[DatasetId]) -> Result<Statement, ParseError> {
    Parser::new(source, Some(known))?.statement()
}

/// Operator carried by a brace group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BraceOp {
    Kernel(KernelOp),
    Select { negated: bool },
    Hash,
}

#[derive(Debug, Clone, PartialEq)]
struct BraceGroup {
    op: BraceOp,
    relations: RelationSet,
    extent: ExtentCode,
}

/// Binding levels of binary operators, lowest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Level {
    Or,
    And,
    Comparison,
    Additive,
    Multiplicative,
    Temporal,
    Select,
    Hash,
}

impl Level {
    fn next(self) -> Option<Level> {
        match self {
            Level::Or => Some(Level::And),
            Level::And => Some(Level::Comparison),
            Level::Comparison => Some(Level::Additive),
            Level::Additive => Some(Level::Multiplicative),
            Level::Multiplicative => Some(Level::Temporal),
            Level::Temporal => Some(Level::Select),
            Level::Select => Some(Level::Hash),
            Level::Hash => None,
        }
    }
}

/// A binary operator recognised at some level.
enum Infix {
    Bare(KernelOp),
    Select { negated: bool },
    Hash,
    Brace(BraceGroup),
}

struct Parser<'a> {
    source: &'a str,
    tokens: Vec<Token>,
    pos: usize,
    known: Option<&'a [DatasetId]>,
}

impl<'a> Parser<'a> {
    fn new(source: &'a str, known: Option<&'a [DatasetId]>) -> Result<Self, ParseError> {
        Ok(Self {
            source,
            tokens: tokenize(source)?,
            pos: 0,
            known,
        })
    }

    fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek_at(&self, offset: usize) -> &Token {
        &self.tokens[(self.pos + offset).min(self.tokens.len() - 1)]
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if token.kind != TokenKind::Eof {
            self.pos += 1;
        }
        token
    }

    /// End offset of the last consumed token.
    fn last_end(&self) -> usize {
        self.pos
            .checked_sub(1)
            .map_or(0, |i| self.tokens[i].position + self.tokens[i].text.len())
    }

    fn error_here(&self, message: &str) -> ParseError {
        let token = self.peek();
        let message = if token.kind == TokenKind::Eof {
            format!("{message}: unexpected end of expression")
        } else {
            message.to_string()
        };
        ParseError::new(message, token.text.clone(), token.position)
    }

    fn expect(&mut self, kind: TokenKind, what: &str) -> Result<Token, ParseError> {
        if self.peek().kind == kind {
            Ok(self.advance())
        } else {
            Err(self.error_here(&format!("expected {what}")))
        }
    }

    fn statement(mut self) -> Result<Statement, ParseError> {
        let target = match self.advance() {
            Token {
                kind: TokenKind::Name(name),
                ..
            } => name,
            token => {
                return Err(ParseError::new(
                    "expected result name",
                    token.text,
                    token.position,
                ));
            }
        };
        self.expect(TokenKind::Assign, "`=`")?;
        let expr = self.expression()?;
        if self.peek().kind != TokenKind::Eof {
            return Err(self.error_here("unexpected token"));
        }
        Ok(Statement {
            target,
            expr,
            source: self.source.to_string(),
        })
    }

    fn expression(&mut self) -> Result<Expr, ParseError> {
        self.binary(Level::Or)
    }

    fn binary(&mut self, level: Level) -> Result<Expr, ParseError> {
        let mut lhs = self.operand(level)?;
        while let Some(infix) = self.infix_at(level)? {
            self.advance();
            let rhs = self.operand(level)?;
            let span = lhs.span.to(rhs.span);
            let (lhs_box, rhs_box) = (Box::new(lhs), Box::new(rhs));
            let kind = match infix {
                Infix::Bare(op) => ExprKind::Arithmetic {
                    op,
                    lhs: lhs_box,
                    rhs: rhs_box,
                },
                Infix::Select { negated } => ExprKind::Select {
                    negated,
                    relations: RelationSet::default(),
                    extent: ExtentCode::Left,
                    lhs: lhs_box,
                    rhs: rhs_box,
                },
                Infix::Hash => ExprKind::Hash {
                    relations: RelationSet::default(),
                    extent: ExtentCode::Left,
                    lhs: lhs_box,
                    rhs: rhs_box,
                },
                Infix::Brace(group) => match group.op {
                    BraceOp::Kernel(op) => ExprKind::Temporal {
                        op,
                        relations: group.relations,
                        extent: group.extent,
                        lhs: lhs_box,
                        rhs: rhs_box,
                    },
                    BraceOp::Select { negated } => ExprKind::Select {
                        negated,
                        relations: group.relations,
                        extent: group.extent,
                        lhs: lhs_box,
                        rhs: rhs_box,
                    },
                    BraceOp::Hash => ExprKind::Hash {
                        relations: group.relations,
                        extent: group.extent,
                        lhs: lhs_box,
                        rhs: rhs_box,
                    },
                },
            };
            lhs = Expr::new(kind, span);
        }
        Ok(lhs)
    }

    fn operand(&mut self, level: Level) -> Result<Expr, ParseError> {
        match level.next() {
            Some(next) => self.binary(next),
            None => self.unary(),
        }
    }

    /// The operator at the cursor if it binds at `level`.
    fn infix_at(&self, level: Level) -> Result<Option<Infix>, ParseError> {
        let token = self.peek();
        let bare = |op: KernelOp| Some(Infix::Bare(op));
        let infix = match (&token.kind, level) {
            (TokenKind::OrOr, Level::Or) => bare(KernelOp::Or),
            (TokenKind::AndAnd, Level::And) => bare(KernelOp::And),
            (TokenKind::EqEq, Level::Comparison) => bare(KernelOp::Eq),
            (TokenKind::NotEq, Level::Comparison) => bare(KernelOp::Ne),
            (TokenKind::Lt, Level::Comparison) => bare(KernelOp::Lt),
            (TokenKind::Le, Level::Comparison) => bare(KernelOp::Le),
            (TokenKind::Gt, Level::Comparison) => bare(KernelOp::Gt),
            (TokenKind::Ge, Level::Comparison) => bare(KernelOp::Ge),
            (TokenKind::Plus, Level::Additive) => bare(KernelOp::Add),
            (TokenKind::Minus, Level::Additive) => bare(KernelOp::Sub),
            (TokenKind::Star, Level::Multiplicative) => bare(KernelOp::Mul),
            (TokenKind::Slash, Level::Multiplicative) => bare(KernelOp::Div),
            (TokenKind::Percent, Level::Multiplicative) => bare(KernelOp::Mod),
            (TokenKind::Colon, Level::Select) => Some(Infix::Select { negated: false }),
            (TokenKind::NotColon, Level::Select) => Some(Infix::Select { negated: true }),
            (TokenKind::Hash, Level::Hash) => Some(Infix::Hash),
            (TokenKind::Brace(text), _) => {
                let group = parse_brace(text, token)?;
                (brace_level(group.op) == level).then_some(Infix::Brace(group))
            }
            _ => None,
        };
        Ok(infix)
    }

    fn unary(&mut self) -> Result<Expr, ParseError> {
        if self.peek().kind != TokenKind::Minus {
            return self.primary();
        }
        let start = self.advance().position;
        let inner = self.unary()?;
        let span = Span::new(start, inner.span.end);
        let kind = match inner.kind {
            ExprKind::Number(value) => ExprKind::Number(-value),
            _ => ExprKind::Arithmetic {
                op: KernelOp::Sub,
                lhs: Box::new(Expr::new(ExprKind::Number(0.0), Span::new(start, start))),
                rhs: Box::new(inner),
            },
        };
        Ok(Expr::new(kind, span))
    }

    fn primary(&mut self) -> Result<Expr, ParseError> {
        let token = self.peek().clone();
        let start = token.position;
        match token.kind {
            TokenKind::Int(value) => {
                self.advance();
                Ok(self.node(ExprKind::Number(value as f64), start))
            }
            TokenKind::Float(value) => {
                self.advance();
                Ok(self.node(ExprKind::Number(value), start))
            }
            TokenKind::Str(text) => {
                self.advance();
                Ok(self.node(ExprKind::Text(text), start))
            }
            TokenKind::LParen => {
                self.advance();
                let mut inner = self.expression()?;
                self.expect(TokenKind::RParen, "`)`")?;
                inner.span = Span::new(start, self.last_end());
                Ok(inner)
            }
            TokenKind::Name(name) => match self.peek_at(1).kind {
                TokenKind::LParen => self.call(&name, start),
                TokenKind::LBracket => self.neighbor(name, start),
                _ => {
                    self.check_dataset(&name, start)?;
                    self.advance();
                    Ok(self.node(ExprKind::Series(name), start))
                }
            },
            TokenKind::Brace(_) => Err(self.error_here("operator group without left operand")),
            _ => Err(self.error_here("expected operand")),
        }
    }

    fn node(&self, kind: ExprKind, start: usize) -> Expr {
        Expr::new(kind, Span::new(start, self.last_end()))
    }

    fn check_dataset(&self, name: &str, position: usize) -> Result<(), ParseError> {
        let Some(known) = self.known else {
            return Ok(());
        };
        if known.iter().any(|id| id.name == name || id.id() == name) {
            Ok(())
        } else {
            Err(ParseError::new(
                "undeclared space-time dataset",
                name,
                position,
            ))
        }
    }

    fn neighbor(&mut self, series: String, start: usize) -> Result<Expr, ParseError> {
        self.check_dataset(&series, start)?;
        self.advance();
        self.expect(TokenKind::LBracket, "`[`")?;
        let mut values = vec![self.signed_int()?];
        while self.peek().kind == TokenKind::Comma {
            self.advance();
            values.push(self.signed_int()?);
        }
        let close = self.expect(TokenKind::RBracket, "`]`")?;
        let offset = match values.as_slice() {
            [dt] => NeighborOffset {
                dx: 0,
                dy: 0,
                dt: *dt,
            },
            [dx, dy, dt] => NeighborOffset {
                dx: *dx,
                dy: *dy,
                dt: *dt,
            },
            _ => {
                return Err(ParseError::new(
                    "neighbor offset takes one or three values",
                    close.text,
                    close.position,
                ));
            }
        };
        Ok(self.node(ExprKind::Neighbor { series, offset }, start))
    }

    fn signed_int(&mut self) -> Result<i64, ParseError> {
        let negative = self.peek().kind == TokenKind::Minus;
        if negative {
            self.advance();
        }
        match self.peek().kind {
            TokenKind::Int(value) => {
                self.advance();
                Ok(if negative { -value } else { value })
            }
            _ => Err(self.error_here("expected integer offset")),
        }
    }

    fn call(&mut self, name: &str, start: usize) -> Result<Expr, ParseError> {
        let name_token = self.advance();
        self.expect(TokenKind::LParen, "`(`")?;
        let lowered = name.to_ascii_lowercase();
        let kind = match lowered.as_str() {
            "map" | "tmap" => {
                let map = match self.advance() {
                    Token {
                        kind: TokenKind::Name(map),
                        ..
                    } => map,
                    token => {
                        return Err(ParseError::new(
                            "expected map name",
                            token.text,
                            token.position,
                        ));
                    }
                };
                ExprKind::SingleMap {
                    name: map,
                    registered: lowered == "tmap",
                }
            }
            "if" => return self.conditional(start),
            "buff_t" | "tshift" => {
                let expr = Box::new(self.expression()?);
                self.expect(TokenKind::Comma, "`,` before the time increment")?;
                let increment = self.increment()?;
                if lowered == "buff_t" {
                    ExprKind::Buffer { expr, increment }
                } else {
                    ExprKind::Shift { expr, increment }
                }
            }
            "tsnap" => ExprKind::Snap(Box::new(self.expression()?)),
            other => match TemporalFunction::parse(other) {
                Some(func) => ExprKind::Function {
                    func,
                    arg: Box::new(self.expression()?),
                },
                None => {
                    return Err(ParseError::new(
                        "unknown function",
                        name,
                        name_token.position,
                    ));
                }
            },
        };
        if self.peek().kind != TokenKind::RParen {
            return Err(ParseError::new(
                format!("wrong number of arguments for `{name}`"),
                self.peek().text.clone(),
                self.peek().position,
            ));
        }
        self.advance();
        Ok(self.node(kind, start))
    }

    fn increment(&mut self) -> Result<TimeIncrement, ParseError> {
        let token = self.advance();
        let text = match &token.kind {
            TokenKind::Str(text) => text.clone(),
            TokenKind::Int(value) => value.to_string(),
            _ => {
                return Err(ParseError::new(
                    "expected time increment",
                    token.text,
                    token.position,
                ));
            }
        };
        TimeIncrement::parse(&text)
            .map_err(|_| ParseError::new("invalid time increment", token.text, token.position))
    }

    /// `if([{relations},] condition, then[, else])`, cursor after `(`.
    fn conditional(&mut self, start: usize) -> Result<Expr, ParseError> {
        let mut relations = RelationSet::default();
        if let TokenKind::Brace(text) = &self.peek().kind {
            let token = self.peek().clone();
            relations = RelationSet::parse(text.trim())
                .map_err(|name| ParseError::new("unknown relation", name, token.position))?;
            self.advance();
            self.expect(TokenKind::Comma, "`,` after the relation list")?;
        }
        let mut args = vec![self.expression()?];
        while self.peek().kind == TokenKind::Comma {
            self.advance();
            args.push(self.expression()?);
        }
        let close = self.expect(TokenKind::RParen, "`)`")?;
        if !(2..=3).contains(&args.len()) {
            return Err(ParseError::new(
                "wrong number of arguments for `if`",
                close.text,
                close.position,
            ));
        }
        let mut args = args.into_iter();
        let (Some(condition), Some(then)) = (args.next(), args.next()) else {
            return Err(ParseError::new(
                "wrong number of arguments for `if`",
                close.text,
                close.position,
            ));
        };
        let kind = ExprKind::Conditional {
            relations,
            condition: Box::new(condition),
            then: Box::new(then),
            otherwise: args.next().map(Box::new),
        };
        Ok(self.node(kind, start))
    }
}

fn brace_level(op: BraceOp) -> Level {
    match op {
        BraceOp::Kernel(KernelOp::Or) => Level::Or,
        BraceOp::Kernel(KernelOp::And) => Level::And,
        BraceOp::Kernel(op) if op.is_comparison() => Level::Comparison,
        BraceOp::Kernel(_) => Level::Temporal,
        BraceOp::Select { .. } => Level::Select,
        BraceOp::Hash => Level::Hash,
    }
}

/// Parse the inside of `{op[, relations[, code]]}`.
fn parse_brace(text: &str, token: &Token) -> Result<BraceGroup, ParseError> {
    let error = |message: &str, item: &str| ParseError::new(message, item, token.position);
    let items: Vec<&str> = text.split(',').map(str::trim).collect();
    if items.len() > 3 {
        return Err(error("too many items in operator group", &token.text));
    }
    let symbol = items[0];
    let op = match symbol {
        ":" => BraceOp::Select { negated: false },
        "!:" => BraceOp::Select { negated: true },
        "#" => BraceOp::Hash,
        "" => return Err(error("empty operator group", &token.text)),
        other => BraceOp::Kernel(
            KernelOp::from_symbol(other).ok_or_else(|| error("unknown operator", other))?,
        ),
    };
    let relations = match items.get(1) {
        Some(list) if !list.is_empty() => {
            RelationSet::parse(list).map_err(|name| error("unknown relation", &name))?
        }
        _ => RelationSet::default(),
    };
    let extent = match items.get(2) {
        Some(code) => ExtentCode::parse(code).ok_or_else(|| error("unknown extent code", code))?,
        None => match op {
            BraceOp::Kernel(_) => ExtentCode::Intersect,
            BraceOp::Select { .. } | BraceOp::Hash => ExtentCode::Left,
        },
    };
    Ok(BraceGroup {
        op,
        relations,
        extent,
    })
}
