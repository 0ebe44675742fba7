//! Boolean rule expressions over identities
//!
//! An expression is a tree of AND / OR groups with identities at the leaves.
//! The text form uses `&` and `|`; a single nesting level may use only one of
//! them, so `a & b | c` must be written `(a & b) | c` or `a & (b | c)`.
//! The empty groups, which nothing satisfies, are written `(&)` and `(|)`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::codec::{Decoder, Encoder};
use crate::error::{Error, Result};
use crate::identity::Identity;

/// Deepest nesting accepted when parsing or decoding
pub const MAX_EXPR_DEPTH: usize = 32;

const TAG_ID: u8 = 0;
const TAG_AND: u8 = 1;
const TAG_OR: u8 = 2;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    Id(Identity),
    And(Vec<Expr>),
    Or(Vec<Expr>),
}

impl Expr {
    /// OR over the given identities
    pub fn any_of<I: IntoIterator<Item = Identity>>(ids: I) -> Self {
        Expr::Or(ids.into_iter().map(Expr::Id).collect())
    }

    /// AND over the given identities
    pub fn all_of<I: IntoIterator<Item = Identity>>(ids: I) -> Self {
        Expr::And(ids.into_iter().map(Expr::Id).collect())
    }

    /// Evaluate with `verified` deciding whether a leaf identity is present
    /// and verified. Empty groups are never satisfied.
    pub fn eval<F>(&self, verified: &F) -> bool
    where
        F: Fn(&Identity) -> bool,
    {
        match self {
            Expr::Id(id) => verified(id),
            Expr::And(branches) => !branches.is_empty() && branches.iter().all(|b| b.eval(verified)),
            Expr::Or(branches) => branches.iter().any(|b| b.eval(verified)),
        }
    }

    /// Every leaf identity, in order of appearance
    pub fn identities(&self) -> Vec<&Identity> {
        let mut out = Vec::new();
        self.collect_identities(&mut out);
        out
    }

    fn collect_identities<'a>(&'a self, out: &mut Vec<&'a Identity>) {
        match self {
            Expr::Id(id) => out.push(id),
            Expr::And(branches) | Expr::Or(branches) => {
                for b in branches {
                    b.collect_identities(out);
                }
            }
        }
    }

    pub fn depth(&self) -> usize {
        match self {
            Expr::Id(_) => 1,
            Expr::And(branches) | Expr::Or(branches) => {
                1 + branches.iter().map(Expr::depth).max().unwrap_or(0)
            }
        }
    }

    pub(crate) fn encode(&self, enc: &mut Encoder) {
        match self {
            Expr::Id(id) => {
                enc.put_u8(TAG_ID);
                id.encode(enc);
            }
            Expr::And(branches) | Expr::Or(branches) => {
                let tag = if matches!(self, Expr::And(_)) { TAG_AND } else { TAG_OR };
                enc.put_u8(tag).put_u32(branches.len() as u32);
                for b in branches {
                    b.encode(enc);
                }
            }
        }
    }

    pub(crate) fn decode(dec: &mut Decoder<'_>) -> Result<Self> {
        Self::decode_at(dec, 1)
    }

    fn decode_at(dec: &mut Decoder<'_>, depth: usize) -> Result<Self> {
        if depth > MAX_EXPR_DEPTH {
            return Err(Error::Encoding("Expression nested too deeply".to_string()));
        }
        match dec.get_u8()? {
            TAG_ID => Ok(Expr::Id(Identity::decode(dec)?)),
            tag @ (TAG_AND | TAG_OR) => {
                let count = dec.get_u32()? as usize;
                // Each branch takes at least one byte, so a huge count fails on read
                let mut branches = Vec::with_capacity(count.min(64));
                for _ in 0..count {
                    branches.push(Self::decode_at(dec, depth + 1)?);
                }
                Ok(if tag == TAG_AND {
                    Expr::And(branches)
                } else {
                    Expr::Or(branches)
                })
            }
            tag => Err(Error::Encoding(format!("Unknown expression tag {}", tag))),
        }
    }

    fn fmt_branch(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Id(_) => write!(f, "{}", self),
            Expr::And(branches) | Expr::Or(branches) if branches.is_empty() => write!(f, "{}", self),
            _ => write!(f, "({})", self),
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (branches, op) = match self {
            Expr::Id(id) => return write!(f, "{}", id),
            Expr::And(branches) if branches.is_empty() => return f.write_str("(&)"),
            Expr::Or(branches) if branches.is_empty() => return f.write_str("(|)"),
            Expr::And(branches) => (branches, " & "),
            Expr::Or(branches) => (branches, " | "),
        };
        for (i, b) in branches.iter().enumerate() {
            if i > 0 {
                f.write_str(op)?;
            }
            b.fmt_branch(f)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token<'a> {
    Open,
    Close,
    And,
    Or,
    Ident(&'a str),
}

fn tokenize(input: &str) -> Vec<Token<'_>> {
    let mut tokens = Vec::new();
    let mut rest = input.trim_start();
    while let Some(c) = rest.chars().next() {
        let tok = match c {
            '(' => Token::Open,
            ')' => Token::Close,
            '&' => Token::And,
            '|' => Token::Or,
            _ => {
                let end = rest
                    .find(|ch: char| ch.is_whitespace() || "()&|".contains(ch))
                    .unwrap_or(rest.len());
                tokens.push(Token::Ident(&rest[..end]));
                rest = rest[end..].trim_start();
                continue;
            }
        };
        tokens.push(tok);
        rest = rest[1..].trim_start();
    }
    tokens
}

struct Parser<'a> {
    tokens: Vec<Token<'a>>,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&Token<'a>> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token<'a>> {
        let tok = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        tok
    }

    fn expr(&mut self, depth: usize) -> Result<Expr> {
        if depth > MAX_EXPR_DEPTH {
            return Err(Error::Expression("Expression nested too deeply".to_string()));
        }
        let first = self.term(depth)?;
        let op = match self.peek() {
            Some(Token::And) => Token::And,
            Some(Token::Or) => Token::Or,
            _ => return Ok(first),
        };
        let mut branches = vec![first];
        while let Some(tok) = self.peek().cloned() {
            match tok {
                Token::And | Token::Or if tok != op => {
                    return Err(Error::Expression(
                        "Mixed '&' and '|' need parentheses".to_string(),
                    ));
                }
                Token::And | Token::Or => {
                    self.pos += 1;
                    branches.push(self.term(depth)?);
                }
                _ => break,
            }
        }
        Ok(if op == Token::And {
            Expr::And(branches)
        } else {
            Expr::Or(branches)
        })
    }

    fn term(&mut self, depth: usize) -> Result<Expr> {
        match self.next() {
            Some(Token::Ident(s)) => Ok(Expr::Id(s.parse()?)),
            Some(Token::Open) => {
                if self.tokens.get(self.pos + 1) == Some(&Token::Close) {
                    let empty = match self.peek() {
                        Some(Token::And) => Some(Expr::And(Vec::new())),
                        Some(Token::Or) => Some(Expr::Or(Vec::new())),
                        _ => None,
                    };
                    if let Some(empty) = empty {
                        self.pos += 2;
                        return Ok(empty);
                    }
                }
                if self.peek() == Some(&Token::Close) {
                    return Err(Error::Expression("Empty group".to_string()));
                }
                let inner = self.expr(depth + 1)?;
                match self.next() {
                    Some(Token::Close) => Ok(inner),
                    _ => Err(Error::Expression("Unbalanced parentheses".to_string())),
                }
            }
            Some(tok) => Err(Error::Expression(format!("Unexpected token {:?}", tok))),
            None => Err(Error::Expression("Unexpected end of expression".to_string())),
        }
    }
}

impl FromStr for Expr {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let mut parser = Parser {
            tokens: tokenize(s),
            pos: 0,
        };
        if parser.tokens.is_empty() {
            return Err(Error::Expression("Empty expression".to_string()));
        }
        let expr = parser.expr(1)?;
        if parser.pos != parser.tokens.len() {
            return Err(Error::Expression(format!(
                "Unexpected trailing input at token {}",
                parser.pos
            )));
        }
        Ok(expr)
    }
}

impl Serialize for Expr {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Expr {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
