//! Search Filters
//!
//! A [`Filter`] is an immutable boolean expression tree over attribute
//! values. Filters arrive in their textual form (`(&(cn=alice)(mail=*))`),
//! are parsed once per request, and are evaluated against every candidate
//! entry of a search.
//!
//! Evaluation returns `Ok(matched)` or `Err(code)`. An error code aborts the
//! enclosing `&`/`|` immediately and propagates unchanged to the caller,
//! which aborts the whole search with it. Ordering, approximate and
//! extensible matches parse successfully but always evaluate to
//! `Err(ResultCode::OperationsError)`.

use crate::directory::entry::{AttributeKind, Entry};
use crate::protocol::ResultCode;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Maximum filter nesting accepted by the parser
pub const MAX_FILTER_DEPTH: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(Box<Filter>),
    Equality { attribute: String, value: String },
    Present(String),
    Substrings { attribute: String, parts: Substrings },
    /// Ordering, approximate and extensible matches.
    Unsupported {
        kind: UnsupportedKind,
        attribute: String,
        value: String,
    },
}

/// Pieces of a substring assertion (`initial*any*any*final`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Substrings {
    pub initial: Option<String>,
    pub any: Vec<String>,
    pub last: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnsupportedKind {
    GreaterOrEqual,
    LessOrEqual,
    Approximate,
    Extensible,
}

impl UnsupportedKind {
    fn operator(self) -> &'static str {
        match self {
            UnsupportedKind::GreaterOrEqual => ">=",
            UnsupportedKind::LessOrEqual => "<=",
            UnsupportedKind::Approximate => "~=",
            UnsupportedKind::Extensible => ":=",
        }
    }
}

impl Filter {
    pub fn equality(attribute: impl Into<String>, value: impl Into<String>) -> Self {
        Filter::Equality {
            attribute: attribute.into(),
            value: value.into(),
        }
    }

    pub fn present(attribute: impl Into<String>) -> Self {
        Filter::Present(attribute.into())
    }

    pub fn not(child: Filter) -> Self {
        Filter::Not(Box::new(child))
    }

    /// Decides whether `entry` satisfies this filter.
    pub fn evaluate(&self, entry: &Entry) -> Result<bool, ResultCode> {
        match self {
            Filter::And(children) => {
                for child in children {
                    if !child.evaluate(entry)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            Filter::Or(children) => {
                let mut any = false;
                for child in children {
                    // Every child is visited so that an error anywhere aborts.
                    any |= child.evaluate(entry)?;
                }
                Ok(any)
            }
            Filter::Not(child) => Ok(!child.evaluate(entry)?),
            Filter::Equality { attribute, value } => {
                Ok(entry.values(attribute).any(|a| a.value_equals(value)))
            }
            Filter::Present(attribute) => Ok(entry.first(attribute).is_some()),
            Filter::Substrings { attribute, parts } => Ok(entry
                .values(attribute)
                .filter(|a| a.kind == AttributeKind::Text)
                .filter_map(|a| a.text())
                .any(|text| parts.matches(text))),
            Filter::Unsupported { .. } => Err(ResultCode::OperationsError),
        }
    }
}

impl Substrings {
    /// Case-insensitive check that `value` starts with `initial`, contains
    /// every `any` fragment and ends with `last`.
    pub fn matches(&self, value: &str) -> bool {
        let value = value.to_lowercase();
        if let Some(initial) = &self.initial {
            if !value.starts_with(&initial.to_lowercase()) {
                return false;
            }
        }
        if !self.any.iter().all(|f| value.contains(&f.to_lowercase())) {
            return false;
        }
        match &self.last {
            Some(last) => value.ends_with(&last.to_lowercase()),
            None => true,
        }
    }
}

/// Errors produced while parsing a textual filter.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FilterParseError {
    #[error("empty filter")]
    Empty,

    #[error("unexpected end of filter")]
    UnexpectedEnd,

    #[error("expected '{expected}' at position {position}")]
    Expected { expected: char, position: usize },

    #[error("missing '=' in filter item '{0}'")]
    MissingOperator(String),

    #[error("empty attribute description in filter item '{0}'")]
    EmptyAttribute(String),

    #[error("invalid escape sequence at position {0}")]
    InvalidEscape(usize),

    #[error("trailing characters after filter at position {0}")]
    TrailingInput(usize),

    #[error("filter nested deeper than {0} levels")]
    TooDeep(usize),
}

impl FromStr for Filter {
    type Err = FilterParseError;

    /// Parses an RFC 4515 style filter. A bare item without surrounding
    /// parentheses (`cn=alice`) is accepted as well.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let text = s.trim();
        if text.is_empty() {
            return Err(FilterParseError::Empty);
        }
        if !text.starts_with('(') {
            return parse_item(text, 0);
        }

        let mut parser = FilterTextParser {
            input: text.as_bytes(),
            text,
            pos: 0,
        };
        let filter = parser.parse_filter(0)?;
        if parser.pos != text.len() {
            return Err(FilterParseError::TrailingInput(parser.pos));
        }
        Ok(filter)
    }
}

struct FilterTextParser<'a> {
    input: &'a [u8],
    text: &'a str,
    pos: usize,
}

impl<'a> FilterTextParser<'a> {
    fn peek(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    fn expect(&mut self, expected: u8) -> Result<(), FilterParseError> {
        match self.peek() {
            Some(b) if b == expected => {
                self.pos += 1;
                Ok(())
            }
            Some(_) => Err(FilterParseError::Expected {
                expected: expected as char,
                position: self.pos,
            }),
            None => Err(FilterParseError::UnexpectedEnd),
        }
    }

    fn parse_filter(&mut self, depth: usize) -> Result<Filter, FilterParseError> {
        if depth > MAX_FILTER_DEPTH {
            return Err(FilterParseError::TooDeep(MAX_FILTER_DEPTH));
        }

        self.expect(b'(')?;
        let filter = match self.peek() {
            Some(b'&') => {
                self.pos += 1;
                Filter::And(self.parse_list(depth)?)
            }
            Some(b'|') => {
                self.pos += 1;
                Filter::Or(self.parse_list(depth)?)
            }
            Some(b'!') => {
                self.pos += 1;
                Filter::not(self.parse_filter(depth + 1)?)
            }
            Some(_) => {
                let start = self.pos;
                let len = self.text[start..]
                    .find(')')
                    .ok_or(FilterParseError::UnexpectedEnd)?;
                self.pos += len;
                parse_item(&self.text[start..start + len], start)?
            }
            None => return Err(FilterParseError::UnexpectedEnd),
        };
        self.expect(b')')?;
        Ok(filter)
    }

    fn parse_list(&mut self, depth: usize) -> Result<Vec<Filter>, FilterParseError> {
        let mut children = Vec::new();
        while self.peek() == Some(b'(') {
            children.push(self.parse_filter(depth + 1)?);
        }
        Ok(children)
    }
}

/// Parses one `attr<op>value` item (without parentheses). `offset` is the
/// item's position in the whole filter, for error reporting.
fn parse_item(item: &str, offset: usize) -> Result<Filter, FilterParseError> {
    let eq = item
        .find('=')
        .ok_or_else(|| FilterParseError::MissingOperator(item.to_string()))?;
    let (lhs, rhs) = (&item[..eq], &item[eq + 1..]);
    let value_offset = offset + eq + 1;

    let unsupported = |kind: UnsupportedKind, attribute: &str| -> Result<Filter, FilterParseError> {
        Ok(Filter::Unsupported {
            kind,
            attribute: attribute.to_string(),
            value: unescape(rhs, value_offset)?,
        })
    };

    if let Some(attr) = lhs.strip_suffix('>') {
        return unsupported(UnsupportedKind::GreaterOrEqual, attr);
    }
    if let Some(attr) = lhs.strip_suffix('<') {
        return unsupported(UnsupportedKind::LessOrEqual, attr);
    }
    if let Some(attr) = lhs.strip_suffix('~') {
        return unsupported(UnsupportedKind::Approximate, attr);
    }
    if let Some(attr) = lhs.strip_suffix(':') {
        return unsupported(UnsupportedKind::Extensible, attr);
    }

    let attribute = lhs.trim();
    if attribute.is_empty() {
        return Err(FilterParseError::EmptyAttribute(item.to_string()));
    }

    if rhs == "*" {
        return Ok(Filter::Present(attribute.to_string()));
    }

    // Unescaped '*' never survives `unescape`, so split before decoding.
    if rhs.contains('*') {
        let pieces: Vec<&str> = rhs.split('*').collect();
        let last_index = pieces.len() - 1;
        let mut parts = Substrings::default();
        let mut piece_offset = value_offset;
        for (i, piece) in pieces.iter().enumerate() {
            if !piece.is_empty() {
                let decoded = unescape(piece, piece_offset)?;
                if i == 0 {
                    parts.initial = Some(decoded);
                } else if i == last_index {
                    parts.last = Some(decoded);
                } else {
                    parts.any.push(decoded);
                }
            }
            piece_offset += piece.len() + 1;
        }
        return Ok(Filter::Substrings {
            attribute: attribute.to_string(),
            parts,
        });
    }

    Ok(Filter::Equality {
        attribute: attribute.to_string(),
        value: unescape(rhs, value_offset)?,
    })
}

/// Decodes `\XX` hex escapes.
fn unescape(value: &str, offset: usize) -> Result<String, FilterParseError> {
    if !value.contains('\\') {
        return Ok(value.to_string());
    }

    let bytes = value.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\' {
            let hex = value
                .get(i + 1..i + 3)
                .ok_or(FilterParseError::InvalidEscape(offset + i))?;
            let byte =
                u8::from_str_radix(hex, 16).map_err(|_| FilterParseError::InvalidEscape(offset + i))?;
            out.push(byte);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).map_err(|_| FilterParseError::InvalidEscape(offset))
}

/// Writes `value` with the characters that are special in filters escaped.
fn write_escaped(f: &mut fmt::Formatter<'_>, value: &str) -> fmt::Result {
    for c in value.chars() {
        match c {
            '*' => f.write_str("\\2a")?,
            '(' => f.write_str("\\28")?,
            ')' => f.write_str("\\29")?,
            '\\' => f.write_str("\\5c")?,
            '\0' => f.write_str("\\00")?,
            c => write!(f, "{}", c)?,
        }
    }
    Ok(())
}

impl fmt::Display for Filter {
    /// Canonical textual form; route filter predicates compare against it.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Filter::And(children) | Filter::Or(children) => {
                let op = if matches!(self, Filter::And(_)) { '&' } else { '|' };
                write!(f, "({}", op)?;
                for child in children {
                    write!(f, "{}", child)?;
                }
                write!(f, ")")
            }
            Filter::Not(child) => write!(f, "(!{})", child),
            Filter::Equality { attribute, value } => {
                write!(f, "({}=", attribute)?;
                write_escaped(f, value)?;
                write!(f, ")")
            }
            Filter::Present(attribute) => write!(f, "({}=*)", attribute),
            Filter::Substrings { attribute, parts } => {
                write!(f, "({}=", attribute)?;
                if let Some(initial) = &parts.initial {
                    write_escaped(f, initial)?;
                }
                write!(f, "*")?;
                for fragment in &parts.any {
                    write_escaped(f, fragment)?;
                    write!(f, "*")?;
                }
                if let Some(last) = &parts.last {
                    write_escaped(f, last)?;
                }
                write!(f, ")")
            }
            Filter::Unsupported {
                kind,
                attribute,
                value,
            } => {
                write!(f, "({}{}", attribute, kind.operator())?;
                write_escaped(f, value)?;
                write!(f, ")")
            }
        }
    }
}
