//! Compact filter syntax
//!
//! A filter is a comma-separated list of clauses, ANDed together. Each clause is
//! `<path><op><literal>`, `<path><unary-op>` or a bare `<path>` (shorthand for
//! `<path>$true`). Only commas outside quotes and brackets separate clauses.
//!
//! ```ignore
//! name~alpha, days>=365, aror.1y>0.05
//! code$in["000001", "000002"], managers$e
//! ```
//!
//! Literals are ints, floats, quoted strings, `true`/`false`/`null` (also
//! `True`/`False`/`None`) and `[..]` or `(..)` lists. An unquoted right-hand side
//! that is none of these is taken verbatim as a string.

use super::{Op, Q};
use crate::{Error, Result, Value};
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref CLAUSE_RE: Regex =
        Regex::new(r"(?s)^\s*([\w.]+)\s*(.*)$").expect("clause pattern is valid");
    static ref NUMBER_RE: Regex =
        Regex::new(r"^[+-]?(\d+\.?\d*|\.\d+)([eE][+-]?\d+)?$").expect("number pattern is valid");
}

fn syntax(msg: impl AsRef<str>, input: &str) -> Error {
    Error::QuerySyntax(format!("{}: {:?}", msg.as_ref(), input))
}

/// Parse a full filter string. Blank input yields the empty query.
pub fn parse_filter(input: &str) -> Result<Q> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Ok(Q::Empty);
    }

    let mut q = Q::Empty;
    for clause in split_clauses(trimmed)? {
        let clause = clause.trim();
        if clause.is_empty() {
            return Err(syntax("empty clause", input));
        }
        q = q & parse_clause(clause)?;
    }
    Ok(q)
}

fn split_clauses(input: &str) -> Result<Vec<&str>> {
    let mut clauses = Vec::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    let mut start = 0;

    for (i, ch) in input.char_indices() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == q {
                quote = None;
            }
            continue;
        }

        match ch {
            '"' | '\'' => quote = Some(ch),
            '[' | '(' => depth += 1,
            ']' | ')' => {
                depth = depth
                    .checked_sub(1)
                    .ok_or_else(|| syntax("unbalanced bracket", input))?;
            }
            ',' if depth == 0 => {
                clauses.push(&input[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }

    if quote.is_some() {
        return Err(syntax("unterminated string", input));
    }
    if depth != 0 {
        return Err(syntax("unbalanced bracket", input));
    }
    clauses.push(&input[start..]);
    Ok(clauses)
}

fn parse_clause(clause: &str) -> Result<Q> {
    let caps = CLAUSE_RE
        .captures(clause)
        .ok_or_else(|| syntax("expected a field path", clause))?;
    let path = &caps[1];
    let rest = caps[2].trim();

    if rest.is_empty() {
        return Ok(Q::leaf(Op::True, path, Value::Null));
    }

    let op = Op::PRECEDENCE
        .iter()
        .copied()
        .find(|op| rest.starts_with(op.token()))
        .ok_or_else(|| syntax("unknown operator", clause))?;
    let rhs = rest[op.token().len()..].trim();

    if op.is_unary() {
        if !rhs.is_empty() {
            return Err(syntax(format!("operator {} takes no value", op), clause));
        }
        return Ok(Q::leaf(op, path, Value::Null));
    }

    if rhs.is_empty() {
        return Err(syntax(format!("operator {} requires a value", op), clause));
    }
    Ok(Q::leaf(op, path, parse_literal(rhs)?))
}

/// Parse a right-hand-side literal.
pub fn parse_literal(input: &str) -> Result<Value> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(syntax("empty literal", input));
    }

    match trimmed.chars().next() {
        Some('"' | '\'' | '[' | '(') => {
            let mut lexer = Lexer::new(trimmed);
            let value = lexer.parse_value()?;
            lexer.skip_whitespace();
            if lexer.current().is_some() {
                return Err(syntax("trailing characters after literal", input));
            }
            Ok(value)
        }
        _ => {
            if let Some(value) = scalar(trimmed) {
                return Ok(value);
            }
            if trimmed.contains(['"', '\'', '[', ']', '(', ')']) {
                return Err(syntax("malformed literal", input));
            }
            Ok(Value::Str(trimmed.to_string()))
        }
    }
}

/// Numbers and keywords
fn scalar(token: &str) -> Option<Value> {
    match token {
        "true" | "True" => return Some(Value::Bool(true)),
        "false" | "False" => return Some(Value::Bool(false)),
        "null" | "None" => return Some(Value::Null),
        _ => {}
    }

    if !NUMBER_RE.is_match(token) {
        return None;
    }
    if !token.contains(['.', 'e', 'E']) {
        // Zero-padded digits such as fund codes are not integers
        let digits = token.trim_start_matches(['+', '-']);
        if digits.len() > 1 && digits.starts_with('0') {
            return None;
        }
        if let Ok(i) = token.parse::<i64>() {
            return Some(Value::Int(i));
        }
    }
    token.parse::<f64>().ok().map(Value::Float)
}

/// Literal lexer
struct Lexer {
    input: Vec<char>,
    pos: usize,
}

impl Lexer {
    fn new(input: &str) -> Self {
        Self {
            input: input.chars().collect(),
            pos: 0,
        }
    }

    fn current(&self) -> Option<char> {
        self.input.get(self.pos).copied()
    }

    fn advance(&mut self) {
        self.pos += 1;
    }

    fn skip_whitespace(&mut self) {
        while let Some(ch) = self.current() {
            if ch.is_whitespace() {
                self.advance();
            } else {
                break;
            }
        }
    }

    fn source(&self) -> String {
        self.input.iter().collect()
    }

    fn error(&self, msg: &str) -> Error {
        syntax(format!("{} at offset {}", msg, self.pos), &self.source())
    }

    fn parse_value(&mut self) -> Result<Value> {
        self.skip_whitespace();
        match self.current() {
            None => Err(self.error("expected a literal")),
            Some(q @ ('"' | '\'')) => self.read_string(q).map(Value::Str),
            Some('[') => self.read_sequence(']').map(|(items, _)| Value::List(items)),
            Some('(') => {
                let (mut items, trailing_comma) = self.read_sequence(')')?;
                // `(x)` is a parenthesised scalar, `(x,)` a one-element list
                if items.len() == 1 && !trailing_comma {
                    Ok(items.remove(0))
                } else {
                    Ok(Value::List(items))
                }
            }
            Some(_) => {
                let token = self.read_bare();
                scalar(&token).ok_or_else(|| self.error("expected a number or keyword"))
            }
        }
    }

    fn read_bare(&mut self) -> String {
        let start = self.pos;
        while let Some(ch) = self.current() {
            if ch.is_whitespace() || matches!(ch, ',' | ']' | ')') {
                break;
            }
            self.advance();
        }
        self.input[start..self.pos].iter().collect()
    }

    /// Returns the items and whether the last one was followed by a comma.
    fn read_sequence(&mut self, close: char) -> Result<(Vec<Value>, bool)> {
        self.advance();
        let mut items = Vec::new();
        let mut trailing_comma = false;

        loop {
            self.skip_whitespace();
            if self.current() == Some(close) {
                self.advance();
                return Ok((items, trailing_comma));
            }

            items.push(self.parse_value()?);
            self.skip_whitespace();
            match self.current() {
                Some(',') => {
                    self.advance();
                    trailing_comma = true;
                }
                Some(ch) if ch == close => {
                    self.advance();
                    return Ok((items, false));
                }
                Some(_) => return Err(self.error("expected ',' or closing bracket")),
                None => return Err(self.error("unterminated list")),
            }
        }
    }

    fn read_string(&mut self, quote: char) -> Result<String> {
        self.advance();
        let mut out = String::new();

        loop {
            match self.current() {
                None => return Err(self.error("unterminated string")),
                Some(ch) if ch == quote => {
                    self.advance();
                    return Ok(out);
                }
                Some('\\') => {
                    self.advance();
                    let esc = self
                        .current()
                        .ok_or_else(|| self.error("unterminated escape"))?;
                    self.advance();
                    match esc {
                        'n' => out.push('\n'),
                        't' => out.push('\t'),
                        'r' => out.push('\r'),
                        '0' => out.push('\0'),
                        '\\' | '"' | '\'' => out.push(esc),
                        'u' => out.push(self.read_unicode_escape()?),
                        other => {
                            out.push('\\');
                            out.push(other);
                        }
                    }
                }
                Some(ch) => {
                    out.push(ch);
                    self.advance();
                }
            }
        }
    }

    fn read_unicode_escape(&mut self) -> Result<char> {
        let end = self.pos + 4;
        if end > self.input.len() {
            return Err(self.error("truncated \\u escape"));
        }
        let hex: String = self.input[self.pos..end].iter().collect();
        let code = u32::from_str_radix(&hex, 16).map_err(|_| self.error("invalid \\u escape"))?;
        self.pos = end;
        char::from_u32(code).ok_or_else(|| self.error("invalid \\u escape"))
    }
}
