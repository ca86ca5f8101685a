// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Parser for the invocation call statement.
//!
//! Only the `@include`/`call NAME (...)` shape that `build_call_source`
//! emits is accepted; the full MRO grammar lives in the external compiler.

use crate::invocation::InvocationData;
use indexmap::IndexMap;
use serde_json::{Number, Value};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("unexpected character {ch:?} at byte {pos}")]
    UnexpectedChar { ch: char, pos: usize },
    #[error("unexpected end of input (expected {expected})")]
    UnexpectedEnd { expected: &'static str },
    #[error("expected {expected}, found {found:?}")]
    UnexpectedToken { expected: &'static str, found: String },
    #[error("unterminated string literal at byte {pos}")]
    UnterminatedString { pos: usize },
    #[error("invalid number {text:?}")]
    BadNumber { text: String },
    #[error("multiple @include directives")]
    MultipleIncludes,
    #[error("trailing input after call statement: {found:?}")]
    TrailingInput { found: String },
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Str(String),
    Num(Number),
    Punct(char),
    Include,
}

struct Lexer<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Lexer<'a> {
    fn new(src: &'a str) -> Self {
        Self { src, pos: 0 }
    }

    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn skip_trivia(&mut self) {
        loop {
            let rest = self.rest();
            let trimmed = rest.trim_start();
            self.pos += rest.len() - trimmed.len();
            if self.rest().starts_with('#') {
                match self.rest().find('\n') {
                    Some(nl) => self.pos += nl + 1,
                    None => self.pos = self.src.len(),
                }
            } else {
                return;
            }
        }
    }

    fn next(&mut self) -> Result<Option<Token>, ParseError> {
        self.skip_trivia();
        let rest = self.rest();
        let mut chars = rest.chars();
        let Some(ch) = chars.next() else {
            return Ok(None);
        };
        match ch {
            '@' => {
                if let Some(after) = rest.strip_prefix("@include") {
                    self.pos += rest.len() - after.len();
                    Ok(Some(Token::Include))
                } else {
                    Err(ParseError::UnexpectedChar { ch, pos: self.pos })
                }
            }
            '"' => {
                // JSON string escapes apply
                let mut end = None;
                let mut escaped = false;
                for (i, c) in rest.char_indices().skip(1) {
                    if escaped {
                        escaped = false;
                    } else if c == '\\' {
                        escaped = true;
                    } else if c == '"' {
                        end = Some(i);
                        break;
                    }
                }
                let Some(end) = end else {
                    return Err(ParseError::UnterminatedString { pos: self.pos });
                };
                let raw = &rest[..=end];
                let value: String = serde_json::from_str(raw)
                    .map_err(|_| ParseError::UnterminatedString { pos: self.pos })?;
                self.pos += end + 1;
                Ok(Some(Token::Str(value)))
            }
            '(' | ')' | '[' | ']' | '{' | '}' | ',' | '=' | ':' => {
                self.pos += ch.len_utf8();
                Ok(Some(Token::Punct(ch)))
            }
            c if c.is_ascii_digit() || c == '-' => {
                let len = rest
                    .find(|c: char| !(c.is_ascii_alphanumeric() || "+-.eE".contains(c)))
                    .unwrap_or(rest.len());
                let text = &rest[..len];
                let num: Number = serde_json::from_str(text)
                    .map_err(|_| ParseError::BadNumber { text: text.to_string() })?;
                self.pos += len;
                Ok(Some(Token::Num(num)))
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let len = rest
                    .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
                    .unwrap_or(rest.len());
                let text = rest[..len].to_string();
                self.pos += len;
                Ok(Some(Token::Ident(text)))
            }
            _ => Err(ParseError::UnexpectedChar { ch, pos: self.pos }),
        }
    }
}

struct Parser<'a> {
    lexer: Lexer<'a>,
    peeked: Option<Token>,
}

impl<'a> Parser<'a> {
    fn new(src: &'a str) -> Self {
        Self { lexer: Lexer::new(src), peeked: None }
    }

    fn peek(&mut self) -> Result<Option<&Token>, ParseError> {
        if self.peeked.is_none() {
            self.peeked = self.lexer.next()?;
        }
        Ok(self.peeked.as_ref())
    }

    fn advance(&mut self) -> Result<Option<Token>, ParseError> {
        match self.peeked.take() {
            Some(tok) => Ok(Some(tok)),
            None => self.lexer.next(),
        }
    }

    fn expect(&mut self, expected: &'static str) -> Result<Token, ParseError> {
        self.advance()?.ok_or(ParseError::UnexpectedEnd { expected })
    }

    fn expect_punct(&mut self, ch: char, expected: &'static str) -> Result<(), ParseError> {
        match self.expect(expected)? {
            Token::Punct(c) if c == ch => Ok(()),
            found => Err(ParseError::UnexpectedToken { expected, found: format!("{:?}", found) }),
        }
    }

    fn expect_ident(&mut self, expected: &'static str) -> Result<String, ParseError> {
        match self.expect(expected)? {
            Token::Ident(id) => Ok(id),
            found => Err(ParseError::UnexpectedToken { expected, found: format!("{:?}", found) }),
        }
    }

    fn parse_value(&mut self) -> Result<Value, ParseError> {
        match self.expect("a literal value")? {
            Token::Ident(id) => match id.as_str() {
                "null" => Ok(Value::Null),
                "true" => Ok(Value::Bool(true)),
                "false" => Ok(Value::Bool(false)),
                _ => Err(ParseError::UnexpectedToken {
                    expected: "a literal value",
                    found: id,
                }),
            },
            Token::Str(s) => Ok(Value::String(s)),
            Token::Num(n) => Ok(Value::Number(n)),
            Token::Punct('[') => {
                let mut items = Vec::new();
                loop {
                    if matches!(self.peek()?, Some(Token::Punct(']'))) {
                        self.advance()?;
                        return Ok(Value::Array(items));
                    }
                    items.push(self.parse_value()?);
                    match self.peek()? {
                        Some(Token::Punct(',')) => {
                            self.advance()?;
                        }
                        _ => {
                            self.expect_punct(']', "']' closing array")?;
                            return Ok(Value::Array(items));
                        }
                    }
                }
            }
            Token::Punct('{') => {
                let mut map = serde_json::Map::new();
                loop {
                    if matches!(self.peek()?, Some(Token::Punct('}'))) {
                        self.advance()?;
                        return Ok(Value::Object(map));
                    }
                    let key = match self.expect("a map key")? {
                        Token::Str(s) => s,
                        Token::Ident(id) => id,
                        found => {
                            return Err(ParseError::UnexpectedToken {
                                expected: "a map key",
                                found: format!("{:?}", found),
                            })
                        }
                    };
                    self.expect_punct(':', "':' after map key")?;
                    map.insert(key, self.parse_value()?);
                    match self.peek()? {
                        Some(Token::Punct(',')) => {
                            self.advance()?;
                        }
                        _ => {
                            self.expect_punct('}', "'}' closing map")?;
                            return Ok(Value::Object(map));
                        }
                    }
                }
            }
            found => Err(ParseError::UnexpectedToken {
                expected: "a literal value",
                found: format!("{:?}", found),
            }),
        }
    }
}

/// Parse an invocation source into its data form.
pub fn parse_invocation(src: &str) -> Result<InvocationData, ParseError> {
    let mut p = Parser::new(src);
    let mut include = None;

    while matches!(p.peek()?, Some(Token::Include)) {
        p.advance()?;
        let path = match p.expect("an include path string")? {
            Token::Str(s) => s,
            found => {
                return Err(ParseError::UnexpectedToken {
                    expected: "an include path string",
                    found: format!("{:?}", found),
                })
            }
        };
        if include.replace(path).is_some() {
            return Err(ParseError::MultipleIncludes);
        }
    }

    let kw = p.expect_ident("the 'call' keyword")?;
    if kw != "call" {
        return Err(ParseError::UnexpectedToken { expected: "the 'call' keyword", found: kw });
    }
    let call = p.expect_ident("a callable name")?;
    p.expect_punct('(', "'(' opening the argument list")?;

    let mut args = IndexMap::new();
    let mut sweepargs = Vec::new();
    loop {
        if matches!(p.peek()?, Some(Token::Punct(')'))) {
            p.advance()?;
            break;
        }
        let name = p.expect_ident("an argument name")?;
        p.expect_punct('=', "'=' after argument name")?;

        // sweep(...) is only legal at the top of a binding
        let is_sweep = matches!(p.peek()?, Some(Token::Ident(id)) if id == "sweep");
        let value = if is_sweep {
            p.advance()?;
            p.expect_punct('(', "'(' opening sweep values")?;
            let mut items = Vec::new();
            loop {
                if matches!(p.peek()?, Some(Token::Punct(')'))) {
                    p.advance()?;
                    break;
                }
                items.push(p.parse_value()?);
                if matches!(p.peek()?, Some(Token::Punct(','))) {
                    p.advance()?;
                }
            }
            sweepargs.push(name.clone());
            Value::Array(items)
        } else {
            p.parse_value()?
        };
        args.insert(name, value);

        if matches!(p.peek()?, Some(Token::Punct(','))) {
            p.advance()?;
        }
    }

    if let Some(found) = p.advance()? {
        return Err(ParseError::TrailingInput { found: format!("{:?}", found) });
    }

    Ok(InvocationData { call, args, sweepargs, include })
}

#[cfg(test)]
#[path = "parse_tests.rs"]
mod tests;
