//! Read-level predicates: SAM flag masks and compiled filter expressions.
//!
//! The pairing engine accepts any [`ReadPredicate`]. Two are provided here:
//!
//! - [`FlagFilter`], the require/exclude flag masks applied before reads are routed;
//! - [`FilterExpression`], a small boolean language over read fields compiled once at startup.
//!
//! Closures `Fn(&AlignedRead) -> bool` are predicates too, which keeps tests and library
//! callers terse.
//!
//! # Expression language
//!
//! ```text
//! expr    := and ( "||" and )*
//! and     := unary ( "&&" unary )*
//! unary   := "!" unary | primary
//! primary := "(" expr ")" | operand ( cmp operand )?
//! operand := FIELD | INTEGER | "string" | true | false
//! cmp     := == | != | < | <= | > | >=
//! ```
//!
//! Integer fields: `pos`, `end`, `mate_pos`, `mapq`, `tlen`, `len`, `flag`.
//! String fields: `name`, `ref`, `mate_ref`.
//! Flag fields: `paired`, `proper_pair`, `unmapped`, `mate_unmapped`, `reverse`,
//! `mate_reverse`, `first`, `second`, `secondary`, `qc_fail`, `duplicate`, `supplementary`.
//!
//! A comparison involving a missing value (an unmapped read's `pos`, mapping quality 255)
//! is false.

use std::fmt;
use std::str::FromStr;

use bstr::ByteSlice;
use noodles::sam::alignment::record::Flags;

use crate::errors::{FgmateError, Result};
use crate::record::AlignedRead;

/// Decides whether a read is kept.
pub trait ReadPredicate: Send + Sync {
    /// True if the read passes.
    fn matches(&self, read: &AlignedRead) -> bool;
}

impl<F> ReadPredicate for F
where
    F: Fn(&AlignedRead) -> bool + Send + Sync,
{
    fn matches(&self, read: &AlignedRead) -> bool {
        self(read)
    }
}

/// Parse flag values supporting both decimal and hex (0x) notation.
///
/// # Errors
///
/// Returns a message if the value is not a 16-bit integer.
pub fn parse_flags(s: &str) -> std::result::Result<u16, String> {
    match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u16::from_str_radix(hex, 16).map_err(|e| e.to_string()),
        None => s.parse().map_err(|e: std::num::ParseIntError| e.to_string()),
    }
}

/// Require/exclude SAM flag masks.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct FlagFilter {
    /// Every one of these bits must be set
    pub require: u16,
    /// None of these bits may be set
    pub exclude: u16,
}

impl FlagFilter {
    /// Secondary (0x100) and supplementary (0x800) alignments.
    pub const DEFAULT_EXCLUDE: u16 = 0x900;

    /// Creates a filter from raw masks.
    #[must_use]
    pub fn new(require: u16, exclude: u16) -> Self {
        Self { require, exclude }
    }

    /// True if the flags satisfy both masks.
    #[must_use]
    pub fn passes(self, flags: Flags) -> bool {
        let bits = flags.bits();
        bits & self.exclude == 0 && bits & self.require == self.require
    }
}

impl Default for FlagFilter {
    fn default() -> Self {
        Self { require: 0, exclude: Self::DEFAULT_EXCLUDE }
    }
}

impl ReadPredicate for FlagFilter {
    fn matches(&self, read: &AlignedRead) -> bool {
        self.passes(read.flags())
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum IntField {
    Pos,
    End,
    MatePos,
    Mapq,
    Tlen,
    Len,
    Flag,
}

impl IntField {
    #[allow(clippy::cast_possible_wrap)]
    fn value(self, read: &AlignedRead) -> Option<i64> {
        let flags = read.flags();
        match self {
            Self::Pos if flags.is_unmapped() => None,
            Self::Pos => read.alignment_start().map(|p| p as i64),
            Self::End if flags.is_unmapped() => None,
            Self::End => read.alignment_end().map(|p| p as i64),
            Self::MatePos if flags.is_mate_unmapped() => None,
            Self::MatePos => read.mate_alignment_start().map(|p| p as i64),
            Self::Mapq => read.mapping_quality().map(i64::from),
            Self::Tlen => Some(i64::from(read.template_length())),
            Self::Len => Some(read.sequence().len() as i64),
            Self::Flag => Some(i64::from(flags.bits())),
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum StrField {
    Name,
    Ref,
    MateRef,
}

impl StrField {
    fn value(self, read: &AlignedRead) -> Option<&[u8]> {
        match self {
            Self::Name => Some(read.name().as_bytes()),
            Self::Ref => read.reference_name().map(str::as_bytes),
            Self::MateRef => read.mate_reference_name().map(str::as_bytes),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
enum Operand {
    Int(IntField),
    Str(StrField),
    Flag(Flags),
    IntLiteral(i64),
    StrLiteral(Vec<u8>),
    BoolLiteral(bool),
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Kind {
    Int,
    Str,
    Bool,
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Int => "integer",
            Self::Str => "string",
            Self::Bool => "boolean",
        })
    }
}

impl Operand {
    fn from_field(name: &str) -> Option<Self> {
        let operand = match name {
            "pos" => Self::Int(IntField::Pos),
            "end" => Self::Int(IntField::End),
            "mate_pos" => Self::Int(IntField::MatePos),
            "mapq" => Self::Int(IntField::Mapq),
            "tlen" => Self::Int(IntField::Tlen),
            "len" => Self::Int(IntField::Len),
            "flag" => Self::Int(IntField::Flag),
            "name" => Self::Str(StrField::Name),
            "ref" => Self::Str(StrField::Ref),
            "mate_ref" => Self::Str(StrField::MateRef),
            "paired" => Self::Flag(Flags::SEGMENTED),
            "proper_pair" => Self::Flag(Flags::PROPERLY_SEGMENTED),
            "unmapped" => Self::Flag(Flags::UNMAPPED),
            "mate_unmapped" => Self::Flag(Flags::MATE_UNMAPPED),
            "reverse" => Self::Flag(Flags::REVERSE_COMPLEMENTED),
            "mate_reverse" => Self::Flag(Flags::MATE_REVERSE_COMPLEMENTED),
            "first" => Self::Flag(Flags::FIRST_SEGMENT),
            "second" => Self::Flag(Flags::LAST_SEGMENT),
            "secondary" => Self::Flag(Flags::SECONDARY),
            "qc_fail" => Self::Flag(Flags::QC_FAIL),
            "duplicate" => Self::Flag(Flags::DUPLICATE),
            "supplementary" => Self::Flag(Flags::SUPPLEMENTARY),
            "true" => Self::BoolLiteral(true),
            "false" => Self::BoolLiteral(false),
            _ => return None,
        };
        Some(operand)
    }

    fn kind(&self) -> Kind {
        match self {
            Self::Int(_) | Self::IntLiteral(_) => Kind::Int,
            Self::Str(_) | Self::StrLiteral(_) => Kind::Str,
            Self::Flag(_) | Self::BoolLiteral(_) => Kind::Bool,
        }
    }

    fn int(&self, read: &AlignedRead) -> Option<i64> {
        match self {
            Self::Int(field) => field.value(read),
            Self::IntLiteral(value) => Some(*value),
            _ => None,
        }
    }

    fn bytes<'a>(&'a self, read: &'a AlignedRead) -> Option<&'a [u8]> {
        match self {
            Self::Str(field) => field.value(read),
            Self::StrLiteral(value) => Some(value),
            _ => None,
        }
    }

    fn truth(&self, read: &AlignedRead) -> Option<bool> {
        match self {
            Self::Flag(flag) => Some(read.flags().contains(*flag)),
            Self::BoolLiteral(value) => Some(*value),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CmpOp {
    fn test<T: PartialOrd>(self, lhs: &T, rhs: &T) -> bool {
        match self {
            Self::Eq => lhs == rhs,
            Self::Ne => lhs != rhs,
            Self::Lt => lhs < rhs,
            Self::Le => lhs <= rhs,
            Self::Gt => lhs > rhs,
            Self::Ge => lhs >= rhs,
        }
    }

    fn is_equality(self) -> bool {
        matches!(self, Self::Eq | Self::Ne)
    }
}

#[derive(Clone, Debug, PartialEq)]
enum Expr {
    Or(Box<Expr>, Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
    Compare(Operand, CmpOp, Operand),
    Truth(Operand),
}

impl Expr {
    fn eval(&self, read: &AlignedRead) -> bool {
        match self {
            Self::Or(lhs, rhs) => lhs.eval(read) || rhs.eval(read),
            Self::And(lhs, rhs) => lhs.eval(read) && rhs.eval(read),
            Self::Not(inner) => !inner.eval(read),
            Self::Truth(operand) => operand.truth(read).unwrap_or(false),
            Self::Compare(lhs, op, rhs) => match lhs.kind() {
                Kind::Int => match (lhs.int(read), rhs.int(read)) {
                    (Some(l), Some(r)) => op.test(&l, &r),
                    _ => false,
                },
                Kind::Str => match (lhs.bytes(read), rhs.bytes(read)) {
                    (Some(l), Some(r)) => op.test(&l, &r),
                    _ => false,
                },
                Kind::Bool => match (lhs.truth(read), rhs.truth(read)) {
                    (Some(l), Some(r)) => op.test(&l, &r),
                    _ => false,
                },
            },
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
enum Token {
    LParen,
    RParen,
    Not,
    And,
    Or,
    Cmp(CmpOp),
    Ident(String),
    Int(i64),
    Str(Vec<u8>),
}

/// A tokenized expression with the 1-based column of each token.
struct Lexer<'a> {
    text: &'a str,
}

impl Lexer<'_> {
    fn error(&self, column: usize, reason: impl Into<String>) -> FgmateError {
        FgmateError::InvalidFilter {
            expression: self.text.to_string(),
            column,
            reason: reason.into(),
        }
    }

    fn tokenize(&self) -> Result<Vec<(Token, usize)>> {
        let bytes = self.text.as_bytes();
        let mut tokens = Vec::new();
        let mut i = 0;
        while i < bytes.len() {
            let column = i + 1;
            let next = bytes.get(i + 1).copied();
            let (token, width) = match bytes[i] {
                b' ' | b'\t' | b'\n' | b'\r' => {
                    i += 1;
                    continue;
                }
                b'(' => (Token::LParen, 1),
                b')' => (Token::RParen, 1),
                b'&' if next == Some(b'&') => (Token::And, 2),
                b'|' if next == Some(b'|') => (Token::Or, 2),
                b'=' if next == Some(b'=') => (Token::Cmp(CmpOp::Eq), 2),
                b'!' if next == Some(b'=') => (Token::Cmp(CmpOp::Ne), 2),
                b'!' => (Token::Not, 1),
                b'<' if next == Some(b'=') => (Token::Cmp(CmpOp::Le), 2),
                b'<' => (Token::Cmp(CmpOp::Lt), 1),
                b'>' if next == Some(b'=') => (Token::Cmp(CmpOp::Ge), 2),
                b'>' => (Token::Cmp(CmpOp::Gt), 1),
                b'"' => {
                    let end = bytes[i + 1..]
                        .iter()
                        .position(|&b| b == b'"')
                        .ok_or_else(|| self.error(column, "unterminated string"))?;
                    let value = bytes[i + 1..i + 1 + end].to_vec();
                    (Token::Str(value), end + 2)
                }
                b'-' | b'0'..=b'9' => {
                    let len = bytes[i + 1..]
                        .iter()
                        .take_while(|b| b.is_ascii_alphanumeric())
                        .count()
                        + 1;
                    let text = &self.text[i..i + len];
                    (Token::Int(parse_int(text).ok_or_else(|| {
                        self.error(column, format!("invalid integer '{text}'"))
                    })?), len)
                }
                b if b.is_ascii_alphabetic() || b == b'_' => {
                    let len = bytes[i..]
                        .iter()
                        .take_while(|b| b.is_ascii_alphanumeric() || **b == b'_')
                        .count();
                    (Token::Ident(self.text[i..i + len].to_string()), len)
                }
                _ => {
                    let ch = self.text[i..].chars().next().unwrap_or('?');
                    return Err(self.error(column, format!("unexpected character '{ch}'")));
                }
            };
            tokens.push((token, column));
            i += width;
        }
        Ok(tokens)
    }
}

fn parse_int(text: &str) -> Option<i64> {
    let (negative, digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text),
    };
    let value = match digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X")) {
        Some(hex) => i64::from_str_radix(hex, 16).ok()?,
        None => digits.parse::<i64>().ok()?,
    };
    Some(if negative { -value } else { value })
}

struct Parser<'a> {
    lexer: Lexer<'a>,
    tokens: Vec<(Token, usize)>,
    pos: usize,
}

impl Parser<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(token, _)| token)
    }

    fn column(&self) -> usize {
        self.tokens.get(self.pos).map_or(self.lexer.text.len() + 1, |(_, column)| *column)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).map(|(token, _)| token.clone());
        self.pos += 1;
        token
    }

    fn or(&mut self) -> Result<Expr> {
        let mut lhs = self.and()?;
        while self.peek() == Some(&Token::Or) {
            self.advance();
            lhs = Expr::Or(Box::new(lhs), Box::new(self.and()?));
        }
        Ok(lhs)
    }

    fn and(&mut self) -> Result<Expr> {
        let mut lhs = self.unary()?;
        while self.peek() == Some(&Token::And) {
            self.advance();
            lhs = Expr::And(Box::new(lhs), Box::new(self.unary()?));
        }
        Ok(lhs)
    }

    fn unary(&mut self) -> Result<Expr> {
        if self.peek() == Some(&Token::Not) {
            self.advance();
            return Ok(Expr::Not(Box::new(self.unary()?)));
        }
        self.primary()
    }

    fn primary(&mut self) -> Result<Expr> {
        if self.peek() == Some(&Token::LParen) {
            self.advance();
            let inner = self.or()?;
            let column = self.column();
            return match self.advance() {
                Some(Token::RParen) => Ok(inner),
                _ => Err(self.lexer.error(column, "expected ')'")),
            };
        }

        let lhs_column = self.column();
        let lhs = self.operand()?;
        let Some(Token::Cmp(op)) = self.peek().cloned() else {
            if lhs.kind() != Kind::Bool {
                return Err(self.lexer.error(
                    lhs_column,
                    format!("{} value used where a boolean is expected", lhs.kind()),
                ));
            }
            return Ok(Expr::Truth(lhs));
        };
        let op_column = self.column();
        self.advance();
        let rhs_column = self.column();
        let rhs = self.operand()?;

        if lhs.kind() != rhs.kind() {
            return Err(self.lexer.error(
                rhs_column,
                format!("cannot compare {} with {}", lhs.kind(), rhs.kind()),
            ));
        }
        if lhs.kind() != Kind::Int && !op.is_equality() {
            return Err(self.lexer.error(
                op_column,
                format!("{} values only support == and !=", lhs.kind()),
            ));
        }
        Ok(Expr::Compare(lhs, op, rhs))
    }

    fn operand(&mut self) -> Result<Operand> {
        let column = self.column();
        match self.advance() {
            Some(Token::Int(value)) => Ok(Operand::IntLiteral(value)),
            Some(Token::Str(value)) => Ok(Operand::StrLiteral(value)),
            Some(Token::Ident(name)) => Operand::from_field(&name)
                .ok_or_else(|| self.lexer.error(column, format!("unknown field '{name}'"))),
            Some(_) => Err(self.lexer.error(column, "expected a field or value")),
            None => Err(self.lexer.error(column, "unexpected end of expression")),
        }
    }
}

/// A compiled filter expression.
///
/// ```
/// use fgmate_lib::filter::{FilterExpression, ReadPredicate};
/// use fgmate_lib::record::{AlignedRead, MateOrder};
///
/// let filter: FilterExpression = "mapq >= 20 && !duplicate".parse().unwrap();
/// let read = AlignedRead::builder("q1", MateOrder::First).mapping_quality(30).build();
/// assert!(filter.matches(&read));
/// ```
#[derive(Clone, Debug)]
pub struct FilterExpression {
    text: String,
    root: Expr,
}

impl FilterExpression {
    /// Compiles an expression.
    ///
    /// # Errors
    ///
    /// Returns [`FgmateError::InvalidFilter`] with the column of the offending token for syntax
    /// errors, unknown fields and type mismatches.
    pub fn parse(text: &str) -> Result<Self> {
        let lexer = Lexer { text };
        let tokens = lexer.tokenize()?;
        if tokens.is_empty() {
            return Err(lexer.error(1, "expression is empty"));
        }
        let mut parser = Parser { lexer, tokens, pos: 0 };
        let root = parser.or()?;
        if parser.pos < parser.tokens.len() {
            let column = parser.column();
            return Err(parser.lexer.error(column, "unexpected token"));
        }
        Ok(Self { text: text.to_string(), root })
    }

    /// The expression as written.
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }
}

impl FromStr for FilterExpression {
    type Err = FgmateError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for FilterExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

impl ReadPredicate for FilterExpression {
    fn matches(&self, read: &AlignedRead) -> bool {
        self.root.eval(read)
    }
}
