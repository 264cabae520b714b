//! Condition expressions over channels.
//!
//! A condition is a small boolean-array language. Channels are referenced
//! with a placeholder, `%(<key>)` or `%('<name>')`, and every operator
//! works element-wise over the record axis:
//!
//! ```text
//! (%('txtdata') == 'A') | (%('txtdata') == 'D')
//! %(3) >= 200 & ~(%('VG_STOP') == 90)
//! %('RPT') > %('VG_STOP') * 1.5
//! ```
//!
//! ## Grammar (lowest to highest precedence)
//! 1. `|`, `||`, `or`
//! 2. `&`, `&&`, `and`
//! 3. `~`, `!`, `not` (prefix)
//! 4. `==`, `!=`, `<`, `<=`, `>`, `>=` (not chained)
//! 5. `+`, `-`
//! 6. `*`, `/`
//! 7. unary `-`, literals (numbers, quoted text, `true`, `false`),
//!    channel placeholders and parentheses
//!
//! Expressions are compiled once into a tree ([`Condition`]) and bound to
//! channel arrays through a [`Binder`] at evaluation time.

use std::fmt;
use std::str::FromStr;

use crate::data::model::{Channel, Value};
use crate::data::store::ChannelId;
use crate::error::{PackError, Result};

// ---------------------------------------------------------------------------
// Binder
// ---------------------------------------------------------------------------

/// Source of channel arrays for condition evaluation.
pub trait Binder {
    /// Resolve `id` to its raw channel.
    ///
    /// An identifier that matches nothing must fail with
    /// [`PackError::UnknownChannel`].
    fn bind(&self, id: &ChannelId) -> Result<&Channel>;

    /// Length every bound channel (and the result) has.
    fn record_count(&self) -> usize;
}

// ---------------------------------------------------------------------------
// Syntax tree
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BinOp {
    Or,
    And,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Add,
    Sub,
    Mul,
    Div,
}

impl BinOp {
    fn symbol(self) -> &'static str {
        match self {
            BinOp::Or => "|",
            BinOp::And => "&",
            BinOp::Eq => "==",
            BinOp::Ne => "!=",
            BinOp::Lt => "<",
            BinOp::Le => "<=",
            BinOp::Gt => ">",
            BinOp::Ge => ">=",
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
        }
    }

    fn is_comparison(self) -> bool {
        matches!(
            self,
            BinOp::Eq | BinOp::Ne | BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Channel(ChannelId),
    Number(f64),
    Text(String),
    Bool(bool),
    Not(Box<Expr>),
    Neg(Box<Expr>),
    Binary {
        op: BinOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
}

impl Expr {
    fn collect_channels<'a>(&'a self, out: &mut Vec<&'a ChannelId>) {
        match self {
            Expr::Channel(id) => {
                if !out.contains(&id) {
                    out.push(id);
                }
            }
            Expr::Not(inner) | Expr::Neg(inner) => inner.collect_channels(out),
            Expr::Binary { lhs, rhs, .. } => {
                lhs.collect_channels(out);
                rhs.collect_channels(out);
            }
            Expr::Number(_) | Expr::Text(_) | Expr::Bool(_) => {}
        }
    }
}

// ---------------------------------------------------------------------------
// Lexer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Text(String),
    Word(String),
    Channel(ChannelId),
    Op(&'static str),
    LParen,
    RParen,
}

/// Two-character operators first so `<=` is not read as `<`.
const OPERATORS: [&str; 16] = [
    "==", "!=", "<=", ">=", "&&", "||", "<", ">", "&", "|", "~", "!", "+", "-", "*", "/",
];

struct Lexer<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Lexer<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    fn rest(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn error(&self, position: usize, message: impl Into<String>) -> PackError {
        PackError::Parse {
            expr: self.input.to_string(),
            position,
            message: message.into(),
        }
    }

    fn skip_whitespace(&mut self) {
        let trimmed = self.rest().trim_start();
        self.pos = self.input.len() - trimmed.len();
    }

    fn tokens(mut self) -> Result<Vec<(Token, usize)>> {
        let mut out = Vec::new();
        loop {
            self.skip_whitespace();
            let start = self.pos;
            let Some(c) = self.peek() else {
                return Ok(out);
            };
            let token = match c {
                '(' => {
                    self.pos += 1;
                    Token::LParen
                }
                ')' => {
                    self.pos += 1;
                    Token::RParen
                }
                '%' => self.placeholder()?,
                '\'' | '"' => Token::Text(self.quoted()?),
                c if c.is_ascii_digit() || c == '.' => self.number()?,
                c if c.is_alphabetic() || c == '_' => Token::Word(self.word().to_string()),
                _ => {
                    let rest = self.rest();
                    let Some(op) = OPERATORS.iter().find(|op| rest.starts_with(**op)) else {
                        return Err(self.error(start, format!("unexpected character '{c}'")));
                    };
                    self.pos += op.len();
                    Token::Op(*op)
                }
            };
            out.push((token, start));
        }
    }

    fn word(&mut self) -> &'a str {
        let rest = self.rest();
        let end = rest
            .find(|c: char| !(c.is_alphanumeric() || c == '_'))
            .unwrap_or(rest.len());
        self.pos += end;
        &rest[..end]
    }

    fn number(&mut self) -> Result<Token> {
        let start = self.pos;
        let rest = self.rest();
        let mut end = 0;
        let bytes = rest.as_bytes();
        while end < bytes.len() {
            let b = bytes[end];
            let exponent_sign =
                (b == b'+' || b == b'-') && end > 0 && matches!(bytes[end - 1], b'e' | b'E');
            if b.is_ascii_digit() || b == b'.' || b == b'e' || b == b'E' || exponent_sign {
                end += 1;
            } else {
                break;
            }
        }
        let text = &rest[..end];
        let value: f64 = text
            .parse()
            .map_err(|_| self.error(start, format!("malformed number '{text}'")))?;
        self.pos += end;
        Ok(Token::Number(value))
    }

    fn quoted(&mut self) -> Result<String> {
        let start = self.pos;
        let Some(quote) = self.peek() else {
            return Err(self.error(start, "expected a quote"));
        };
        let body = &self.rest()[1..];
        let Some(end) = body.find(quote) else {
            return Err(self.error(start, "unterminated string"));
        };
        self.pos += end + 2;
        Ok(body[..end].to_string())
    }

    /// `%(3)`, `%('name')`, `%("name")` or `%(name)`.
    fn placeholder(&mut self) -> Result<Token> {
        let start = self.pos;
        self.pos += 1;
        if self.peek() != Some('(') {
            return Err(self.error(start, "expected '(' after '%'"));
        }
        self.pos += 1;
        self.skip_whitespace();

        let id = match self.peek() {
            Some('\'' | '"') => ChannelId::Name(self.quoted()?),
            Some(_) => {
                let rest = self.rest();
                let end = rest.find(')').unwrap_or(rest.len());
                let raw = rest[..end].trim();
                self.pos += end;
                if raw.is_empty() {
                    return Err(self.error(start, "empty channel reference"));
                }
                match raw.parse::<usize>() {
                    Ok(key) => ChannelId::Key(key),
                    Err(_) => ChannelId::Name(raw.to_string()),
                }
            }
            None => return Err(self.error(start, "unterminated channel reference")),
        };

        self.skip_whitespace();
        if self.peek() != Some(')') {
            return Err(self.error(self.pos, "expected ')' to close the channel reference"));
        }
        self.pos += 1;
        Ok(Token::Channel(id))
    }
}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

struct Parser<'a> {
    source: &'a str,
    tokens: Vec<(Token, usize)>,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(source: &'a str) -> Result<Self> {
        Ok(Self {
            source,
            tokens: Lexer::new(source).tokens()?,
            pos: 0,
        })
    }

    fn error(&self, message: impl Into<String>) -> PackError {
        let position = self
            .tokens
            .get(self.pos)
            .map_or(self.source.len(), |(_, p)| *p);
        PackError::Parse {
            expr: self.source.to_string(),
            position,
            message: message.into(),
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(t, _)| t)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).map(|(t, _)| t.clone());
        self.pos += 1;
        token
    }

    /// Consume the next token if it is one of `ops` (or a keyword alias).
    fn eat_op(&mut self, ops: &[&'static str], words: &[&str]) -> Option<&'static str> {
        let matched = match self.peek()? {
            Token::Op(op) if ops.contains(op) => Some(*op),
            Token::Word(w) if words.contains(&w.as_str()) => Some(ops[0]),
            _ => None,
        };
        if matched.is_some() {
            self.pos += 1;
        }
        matched
    }

    fn parse(mut self) -> Result<Expr> {
        if self.tokens.is_empty() {
            return Err(self.error("empty condition"));
        }
        let expr = self.or()?;
        if self.pos < self.tokens.len() {
            return Err(self.error("unexpected trailing input"));
        }
        Ok(expr)
    }

    fn or(&mut self) -> Result<Expr> {
        let mut lhs = self.and()?;
        while self.eat_op(&["|", "||"], &["or"]).is_some() {
            let rhs = self.and()?;
            lhs = binary(BinOp::Or, lhs, rhs);
        }
        Ok(lhs)
    }

    fn and(&mut self) -> Result<Expr> {
        let mut lhs = self.not()?;
        while self.eat_op(&["&", "&&"], &["and"]).is_some() {
            let rhs = self.not()?;
            lhs = binary(BinOp::And, lhs, rhs);
        }
        Ok(lhs)
    }

    fn not(&mut self) -> Result<Expr> {
        if self.eat_op(&["~", "!"], &["not"]).is_some() {
            return Ok(Expr::Not(Box::new(self.not()?)));
        }
        self.comparison()
    }

    fn comparison(&mut self) -> Result<Expr> {
        let lhs = self.sum()?;
        let op = match self.eat_op(&["==", "!=", "<=", ">=", "<", ">"], &[]) {
            Some("==") => BinOp::Eq,
            Some("!=") => BinOp::Ne,
            Some("<=") => BinOp::Le,
            Some(">=") => BinOp::Ge,
            Some("<") => BinOp::Lt,
            Some(">") => BinOp::Gt,
            _ => return Ok(lhs),
        };
        let rhs = self.sum()?;
        if matches!(self.peek(), Some(Token::Op(o)) if ["==", "!=", "<=", ">=", "<", ">"].contains(o))
        {
            return Err(self.error("chained comparisons need parentheses"));
        }
        Ok(binary(op, lhs, rhs))
    }

    fn sum(&mut self) -> Result<Expr> {
        let mut lhs = self.term()?;
        loop {
            let op = match self.eat_op(&["+", "-"], &[]) {
                Some("+") => BinOp::Add,
                Some(_) => BinOp::Sub,
                None => return Ok(lhs),
            };
            let rhs = self.term()?;
            lhs = binary(op, lhs, rhs);
        }
    }

    fn term(&mut self) -> Result<Expr> {
        let mut lhs = self.unary()?;
        loop {
            let op = match self.eat_op(&["*", "/"], &[]) {
                Some("*") => BinOp::Mul,
                Some(_) => BinOp::Div,
                None => return Ok(lhs),
            };
            let rhs = self.unary()?;
            lhs = binary(op, lhs, rhs);
        }
    }

    fn unary(&mut self) -> Result<Expr> {
        if self.eat_op(&["-"], &[]).is_some() {
            return Ok(Expr::Neg(Box::new(self.unary()?)));
        }
        self.atom()
    }

    fn atom(&mut self) -> Result<Expr> {
        let Some(token) = self.peek().cloned() else {
            return Err(self.error("unexpected end of condition"));
        };
        let expr = match token {
            Token::Number(v) => Expr::Number(v),
            Token::Text(s) => Expr::Text(s),
            Token::Channel(id) => Expr::Channel(id),
            Token::Word(w) if w == "true" || w == "True" => Expr::Bool(true),
            Token::Word(w) if w == "false" || w == "False" => Expr::Bool(false),
            Token::Word(w) => {
                return Err(self.error(format!(
                    "unknown word '{w}', reference channels as %({w})"
                )))
            }
            Token::LParen => {
                self.pos += 1;
                let inner = self.or()?;
                if self.peek() != Some(&Token::RParen) {
                    return Err(self.error("expected ')'"));
                }
                inner
            }
            Token::RParen | Token::Op(_) => return Err(self.error("expected a value")),
        };
        self.advance();
        Ok(expr)
    }
}

fn binary(op: BinOp, lhs: Expr, rhs: Expr) -> Expr {
    Expr::Binary {
        op,
        lhs: Box::new(lhs),
        rhs: Box::new(rhs),
    }
}

// ---------------------------------------------------------------------------
// Evaluation
// ---------------------------------------------------------------------------

/// A scalar broadcast over the record axis, or one value per record.
#[derive(Debug, Clone)]
enum Lane<T> {
    Scalar(T),
    Array(Vec<T>),
}

impl<T> Lane<T> {
    fn at(&self, i: usize) -> &T {
        match self {
            Lane::Scalar(x) => x,
            Lane::Array(v) => &v[i],
        }
    }

    fn map<R>(&self, len: usize, f: impl Fn(&T) -> R) -> Lane<R> {
        match self {
            Lane::Scalar(x) => Lane::Scalar(f(x)),
            Lane::Array(_) => Lane::Array((0..len).map(|i| f(self.at(i))).collect()),
        }
    }

    fn zip<U, R>(&self, other: &Lane<U>, len: usize, f: impl Fn(&T, &U) -> R) -> Lane<R> {
        match (self, other) {
            (Lane::Scalar(a), Lane::Scalar(b)) => Lane::Scalar(f(a, b)),
            _ => Lane::Array((0..len).map(|i| f(self.at(i), other.at(i))).collect()),
        }
    }
}

#[derive(Debug, Clone)]
enum Operand {
    Number(Lane<f64>),
    Bool(Lane<bool>),
    Text(Lane<Option<String>>),
}

impl Operand {
    fn from_channel(channel: &Channel) -> Operand {
        match channel {
            Channel::Bool(v) => Operand::Bool(Lane::Array(v.clone())),
            Channel::Text(v) => Operand::Text(Lane::Array(v.iter().cloned().map(Some).collect())),
            // nullable booleans: a missing cell never passes
            Channel::Object(v)
                if v.iter().any(|x| matches!(x, Value::Bool(_)))
                    && v.iter().all(|x| matches!(x, Value::Bool(_) | Value::Null)) =>
            {
                Operand::Bool(Lane::Array(
                    v.iter().map(|x| matches!(x, Value::Bool(true))).collect(),
                ))
            }
            other => match other.to_f64() {
                Some(numbers) => Operand::Number(Lane::Array(numbers)),
                None => Operand::Text(Lane::Array(
                    other
                        .values()
                        .map(|v| match v {
                            Value::Null => None,
                            v => Some(v.to_string()),
                        })
                        .collect(),
                )),
            },
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Operand::Number(_) => "numeric",
            Operand::Bool(_) => "boolean",
            Operand::Text(_) => "text",
        }
    }

    /// Booleans take part in arithmetic as 0 and 1.
    fn numbers(&self, len: usize) -> Option<Lane<f64>> {
        match self {
            Operand::Number(lane) => Some(lane.clone()),
            Operand::Bool(lane) => Some(lane.map(len, |&b| if b { 1.0 } else { 0.0 })),
            Operand::Text(_) => None,
        }
    }
}

struct Evaluator<'a, B: ?Sized> {
    binder: &'a B,
    source: &'a str,
    len: usize,
}

impl<B: Binder + ?Sized> Evaluator<'_, B> {
    fn error(&self, message: impl Into<String>) -> PackError {
        PackError::Evaluation {
            expr: self.source.to_string(),
            message: message.into(),
        }
    }

    fn eval(&self, expr: &Expr) -> Result<Operand> {
        match expr {
            Expr::Number(v) => Ok(Operand::Number(Lane::Scalar(*v))),
            Expr::Text(s) => Ok(Operand::Text(Lane::Scalar(Some(s.clone())))),
            Expr::Bool(b) => Ok(Operand::Bool(Lane::Scalar(*b))),
            Expr::Channel(id) => self.bind(id),
            Expr::Not(inner) => match self.eval(inner)? {
                Operand::Bool(lane) => Ok(Operand::Bool(lane.map(self.len, |b| !b))),
                other => Err(self.error(format!("cannot negate a {} operand", other.kind()))),
            },
            Expr::Neg(inner) => {
                let operand = self.eval(inner)?;
                match operand {
                    Operand::Number(lane) => Ok(Operand::Number(lane.map(self.len, |x| -x))),
                    other => Err(self.error(format!("cannot negate a {} operand", other.kind()))),
                }
            }
            Expr::Binary { op, lhs, rhs } => {
                let lhs = self.eval(lhs)?;
                let rhs = self.eval(rhs)?;
                self.binary(*op, &lhs, &rhs)
            }
        }
    }

    fn bind(&self, id: &ChannelId) -> Result<Operand> {
        let channel = self.binder.bind(id).map_err(|err| match err {
            PackError::UnknownChannel(channel) => PackError::UnresolvedChannel {
                expr: self.source.to_string(),
                channel,
            },
            other => other,
        })?;
        if channel.len() != self.len {
            return Err(PackError::length(
                format!("channel '{id}' in `{}`", self.source),
                self.len,
                channel.len(),
            ));
        }
        Ok(Operand::from_channel(channel))
    }

    fn binary(&self, op: BinOp, lhs: &Operand, rhs: &Operand) -> Result<Operand> {
        let n = self.len;
        match op {
            BinOp::And | BinOp::Or => match (lhs, rhs) {
                (Operand::Bool(a), Operand::Bool(b)) => Ok(Operand::Bool(if op == BinOp::And {
                    a.zip(b, n, |x, y| *x && *y)
                } else {
                    a.zip(b, n, |x, y| *x || *y)
                })),
                _ => Err(self.mismatch(op, lhs, rhs)),
            },
            _ if op.is_comparison() => self.compare(op, lhs, rhs),
            _ => {
                let (Some(a), Some(b)) = (lhs.numbers(n), rhs.numbers(n)) else {
                    return Err(self.mismatch(op, lhs, rhs));
                };
                let f: fn(f64, f64) -> f64 = match op {
                    BinOp::Add => |x, y| x + y,
                    BinOp::Sub => |x, y| x - y,
                    BinOp::Mul => |x, y| x * y,
                    _ => |x, y| x / y,
                };
                Ok(Operand::Number(a.zip(&b, n, |x, y| f(*x, *y))))
            }
        }
    }

    fn compare(&self, op: BinOp, lhs: &Operand, rhs: &Operand) -> Result<Operand> {
        let n = self.len;
        let lane = match (lhs, rhs) {
            (Operand::Text(a), Operand::Text(b)) => a.zip(b, n, |x, y| match op {
                BinOp::Eq => x == y,
                BinOp::Ne => x != y,
                _ => match (x, y) {
                    (Some(x), Some(y)) => ordered(op, x.cmp(y)),
                    _ => false,
                },
            }),
            (Operand::Bool(a), Operand::Bool(b)) if matches!(op, BinOp::Eq | BinOp::Ne) => {
                a.zip(b, n, |x, y| (x == y) == (op == BinOp::Eq))
            }
            _ => {
                let (Some(a), Some(b)) = (lhs.numbers(n), rhs.numbers(n)) else {
                    return Err(self.mismatch(op, lhs, rhs));
                };
                a.zip(&b, n, |x, y| match x.partial_cmp(y) {
                    Some(order) => ordered(op, order),
                    None => op == BinOp::Ne,
                })
            }
        };
        Ok(Operand::Bool(lane))
    }

    fn mismatch(&self, op: BinOp, lhs: &Operand, rhs: &Operand) -> PackError {
        self.error(format!(
            "operator {} does not apply to {} and {} operands",
            op.symbol(),
            lhs.kind(),
            rhs.kind()
        ))
    }
}

fn ordered(op: BinOp, order: std::cmp::Ordering) -> bool {
    use std::cmp::Ordering::*;
    match op {
        BinOp::Eq => order == Equal,
        BinOp::Ne => order != Equal,
        BinOp::Lt => order == Less,
        BinOp::Le => order != Greater,
        BinOp::Gt => order == Greater,
        BinOp::Ge => order != Less,
        _ => false,
    }
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// A compiled condition expression.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    source: String,
    root: Expr,
}

impl Condition {
    /// Compile `source`. Syntax errors quote the source text.
    pub fn parse(source: &str) -> Result<Self> {
        let root = Parser::new(source)?.parse()?;
        Ok(Self {
            source: source.to_string(),
            root,
        })
    }

    /// The text the condition was compiled from.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Channels the condition references, in first-use order.
    pub fn channels(&self) -> Vec<&ChannelId> {
        let mut out = Vec::new();
        self.root.collect_channels(&mut out);
        out
    }

    /// Bind the channel references through `binder` and evaluate.
    ///
    /// The result always has `binder.record_count()` elements; a scalar
    /// boolean result is broadcast.
    pub fn evaluate<B: Binder + ?Sized>(&self, binder: &B) -> Result<Vec<bool>> {
        let evaluator = Evaluator {
            binder,
            source: &self.source,
            len: binder.record_count(),
        };
        match evaluator.eval(&self.root)? {
            Operand::Bool(Lane::Array(v)) => Ok(v),
            Operand::Bool(Lane::Scalar(b)) => Ok(vec![b; evaluator.len]),
            other => Err(evaluator.error(format!(
                "condition yields {} values, expected booleans",
                other.kind()
            ))),
        }
    }
}

impl FromStr for Condition {
    type Err = PackError;

    fn from_str(s: &str) -> Result<Self> {
        Condition::parse(s)
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

/// Compile and evaluate one expression.
pub fn evaluate<B: Binder + ?Sized>(expr: &str, binder: &B) -> Result<Vec<bool>> {
    Condition::parse(expr)?.evaluate(binder)
}

/// AND together every non-blank expression; no expressions means all true.
pub fn combine<B, S>(exprs: &[S], binder: &B) -> Result<Vec<bool>>
where
    B: Binder + ?Sized,
    S: AsRef<str>,
{
    let mut mask = vec![true; binder.record_count()];
    for expr in exprs.iter().map(AsRef::as_ref) {
        if expr.trim().is_empty() {
            continue;
        }
        let b = evaluate(expr, binder)?;
        mask.iter_mut().zip(b).for_each(|(m, b)| *m &= b);
    }
    Ok(mask)
}
