//! LDAP-style filter expressions over capability attributes.
//!
//! Supported syntax: `(&(a=b)(c>=1))`, `(|...)`, `(!...)`, `=`, `~=`, `>=`,
//! `<=`, presence `(a=*)` and substring wildcards `(a=com.acme.*)`. A
//! backslash escapes the next character.

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use crate::error::ParseError;
use crate::types::{AttrValue, Attributes, Version};

/// Comparison operator of a simple filter term.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Equal,
    Approx,
    GreaterEq,
    LessEq,
}

impl Operator {
    fn symbol(self) -> &'static str {
        match self {
            Operator::Equal => "=",
            Operator::Approx => "~=",
            Operator::GreaterEq => ">=",
            Operator::LessEq => "<=",
        }
    }

    fn accepts(self, ordering: Ordering) -> bool {
        match self {
            Operator::Equal | Operator::Approx => ordering == Ordering::Equal,
            Operator::GreaterEq => ordering != Ordering::Less,
            Operator::LessEq => ordering != Ordering::Greater,
        }
    }
}

/// A parsed filter expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(Box<Filter>),
    Compare {
        attribute: String,
        op: Operator,
        value: String,
    },
    Present(String),
    /// Wildcard match; `parts` are the literal pieces between `*`s.
    Substring {
        attribute: String,
        parts: Vec<String>,
    },
}

impl Filter {
    pub fn parse(input: &str) -> Result<Self, ParseError> {
        let trimmed = input.trim();
        let wrapped;
        let source = if trimmed.starts_with('(') {
            trimmed
        } else {
            wrapped = format!("({})", trimmed);
            &wrapped
        };

        let mut parser = Parser {
            input,
            chars: source.chars().collect(),
            pos: 0,
        };
        let filter = parser.parse_filter()?;
        parser.skip_ws();
        if parser.pos != parser.chars.len() {
            return Err(parser.error("trailing characters after filter"));
        }
        Ok(filter)
    }

    /// Shorthand for `(attribute=value)`.
    pub fn equal(attribute: impl Into<String>, value: impl Into<String>) -> Self {
        Filter::Compare {
            attribute: attribute.into(),
            op: Operator::Equal,
            value: value.into(),
        }
    }

    pub fn matches(&self, attributes: &Attributes) -> bool {
        match self {
            Filter::And(items) => items.iter().all(|f| f.matches(attributes)),
            Filter::Or(items) => items.iter().any(|f| f.matches(attributes)),
            Filter::Not(inner) => !inner.matches(attributes),
            Filter::Present(attribute) => attributes.contains_key(attribute),
            Filter::Compare {
                attribute,
                op,
                value,
            } => attributes
                .get(attribute)
                .is_some_and(|attr| compare(attr, *op, value)),
            Filter::Substring { attribute, parts } => attributes
                .get(attribute)
                .is_some_and(|attr| substring(attr, parts)),
        }
    }

    /// Every attribute name mentioned anywhere in the expression.
    pub fn referenced_attributes(&self) -> BTreeSet<&str> {
        let mut names = BTreeSet::new();
        let mut stack = vec![self];
        while let Some(filter) = stack.pop() {
            match filter {
                Filter::And(items) | Filter::Or(items) => stack.extend(items.iter()),
                Filter::Not(inner) => stack.push(inner),
                Filter::Present(attribute)
                | Filter::Compare { attribute, .. }
                | Filter::Substring { attribute, .. } => {
                    names.insert(attribute.as_str());
                }
            }
        }
        names
    }

    /// Equality terms that every match must satisfy: a top-level `=` term or
    /// the `=` terms directly under a top-level `&`.
    pub fn required_equalities(&self) -> Vec<(&str, &str)> {
        let terms: Vec<&Filter> = match self {
            Filter::And(items) => items.iter().collect(),
            other => vec![other],
        };
        terms
            .into_iter()
            .filter_map(|f| match f {
                Filter::Compare {
                    attribute,
                    op: Operator::Equal,
                    value,
                } => Some((attribute.as_str(), value.as_str())),
                _ => None,
            })
            .collect()
    }
}

impl FromStr for Filter {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Filter::And(items) => {
                write!(f, "(&")?;
                for item in items {
                    write!(f, "{}", item)?;
                }
                write!(f, ")")
            }
            Filter::Or(items) => {
                write!(f, "(|")?;
                for item in items {
                    write!(f, "{}", item)?;
                }
                write!(f, ")")
            }
            Filter::Not(inner) => write!(f, "(!{})", inner),
            Filter::Present(attribute) => write!(f, "({}=*)", attribute),
            Filter::Compare {
                attribute,
                op,
                value,
            } => write!(f, "({}{}{})", attribute, op.symbol(), escape(value)),
            Filter::Substring { attribute, parts } => {
                let pattern: Vec<String> = parts.iter().map(|p| escape(p)).collect();
                write!(f, "({}={})", attribute, pattern.join("*"))
            }
        }
    }
}

fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '\\' | '*' | '(' | ')') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn compare(attr: &AttrValue, op: Operator, operand: &str) -> bool {
    match attr {
        AttrValue::String(s) => match op {
            Operator::Equal => s == operand,
            Operator::Approx => normalize_approx(s) == normalize_approx(operand),
            _ => op.accepts(s.as_str().cmp(operand)),
        },
        AttrValue::Long(n) => operand
            .trim()
            .parse::<i64>()
            .is_ok_and(|o| op.accepts(n.cmp(&o))),
        AttrValue::Double(d) => operand
            .trim()
            .parse::<f64>()
            .ok()
            .and_then(|o| d.partial_cmp(&o))
            .is_some_and(|ord| op.accepts(ord)),
        AttrValue::Version(v) => {
            Version::parse(operand).is_ok_and(|o| op.accepts(v.cmp(&o)))
        }
        AttrValue::List(items) => items.iter().any(|item| compare(item, op, operand)),
    }
}

fn normalize_approx(value: &str) -> String {
    value
        .chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

fn substring(attr: &AttrValue, parts: &[String]) -> bool {
    match attr {
        AttrValue::String(s) => substring_str(s, parts),
        AttrValue::List(items) => items.iter().any(|item| substring(item, parts)),
        _ => false,
    }
}

fn substring_str(s: &str, parts: &[String]) -> bool {
    let (Some(first), Some(last)) = (parts.first(), parts.last()) else {
        return false;
    };
    let Some(mut rest) = s.strip_prefix(first.as_str()) else {
        return false;
    };
    if parts.len() > 2 {
        for middle in &parts[1..parts.len() - 1] {
            if middle.is_empty() {
                continue;
            }
            match rest.find(middle.as_str()) {
                Some(at) => rest = &rest[at + middle.len()..],
                None => return false,
            }
        }
    }
    rest.ends_with(last.as_str())
}

struct Parser<'a> {
    input: &'a str,
    chars: Vec<char>,
    pos: usize,
}

impl Parser<'_> {
    fn error(&self, message: &str) -> ParseError {
        ParseError::Filter {
            filter: self.input.to_string(),
            message: format!("{} at position {}", message, self.pos),
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn skip_ws(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
    }

    fn expect(&mut self, expected: char) -> Result<(), ParseError> {
        if self.peek() == Some(expected) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.error(&format!("expected '{}'", expected)))
        }
    }

    fn parse_filter(&mut self) -> Result<Filter, ParseError> {
        self.skip_ws();
        self.expect('(')?;
        self.skip_ws();
        let filter = match self.peek() {
            Some('&') => {
                self.pos += 1;
                Filter::And(self.parse_list()?)
            }
            Some('|') => {
                self.pos += 1;
                Filter::Or(self.parse_list()?)
            }
            Some('!') => {
                self.pos += 1;
                Filter::Not(Box::new(self.parse_filter()?))
            }
            _ => self.parse_item()?,
        };
        self.skip_ws();
        self.expect(')')?;
        Ok(filter)
    }

    fn parse_list(&mut self) -> Result<Vec<Filter>, ParseError> {
        let mut items = Vec::new();
        loop {
            self.skip_ws();
            if self.peek() != Some('(') {
                break;
            }
            items.push(self.parse_filter()?);
        }
        if items.is_empty() {
            return Err(self.error("empty filter list"));
        }
        Ok(items)
    }

    fn parse_item(&mut self) -> Result<Filter, ParseError> {
        let start = self.pos;
        while self
            .peek()
            .is_some_and(|c| !matches!(c, '=' | '~' | '<' | '>' | '(' | ')'))
        {
            self.pos += 1;
        }
        let attribute: String = self.chars[start..self.pos].iter().collect();
        let attribute = attribute.trim().to_string();
        if attribute.is_empty() {
            return Err(self.error("missing attribute name"));
        }

        let op = match self.peek() {
            Some('=') => {
                self.pos += 1;
                Operator::Equal
            }
            Some('~') => {
                self.pos += 1;
                self.expect('=')?;
                Operator::Approx
            }
            Some('>') => {
                self.pos += 1;
                self.expect('=')?;
                Operator::GreaterEq
            }
            Some('<') => {
                self.pos += 1;
                self.expect('=')?;
                Operator::LessEq
            }
            _ => return Err(self.error("missing operator")),
        };

        let parts = self.parse_value()?;
        if parts.len() == 1 {
            let value = parts.into_iter().next().unwrap_or_default();
            return Ok(Filter::Compare {
                attribute,
                op,
                value,
            });
        }
        if op != Operator::Equal {
            return Err(self.error("wildcards are only allowed with '='"));
        }
        if parts.iter().all(String::is_empty) && parts.len() == 2 {
            return Ok(Filter::Present(attribute));
        }
        Ok(Filter::Substring { attribute, parts })
    }

    fn parse_value(&mut self) -> Result<Vec<String>, ParseError> {
        let mut parts = vec![String::new()];
        loop {
            match self.peek() {
                None => return Err(self.error("unterminated filter value")),
                Some(')') => break,
                Some('(') => return Err(self.error("unescaped '(' in value")),
                Some('*') => {
                    self.pos += 1;
                    parts.push(String::new());
                }
                Some('\\') => {
                    self.pos += 1;
                    let escaped = self
                        .peek()
                        .ok_or_else(|| self.error("dangling escape"))?;
                    self.pos += 1;
                    if let Some(current) = parts.last_mut() {
                        current.push(escaped);
                    }
                }
                Some(c) => {
                    self.pos += 1;
                    if let Some(current) = parts.last_mut() {
                        current.push(c);
                    }
                }
            }
        }
        Ok(parts)
    }
}

#[cfg(test)]
#[path = "filter_tests.rs"]
mod tests;
