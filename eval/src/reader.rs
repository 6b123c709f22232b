//! S-expression reader
//!
//! Reads from any [`CharStream`]. Nesting is tracked on an explicit stack so
//! deeply nested input cannot exhaust the host stack.

use thiserror::Error;

use crate::symbols::{sym, SymbolTable};
use crate::value::Value;

/// Character source for the reader
pub trait CharStream {
    fn peek(&mut self) -> Option<char>;
    fn next_char(&mut self) -> Option<char>;
    /// 1-based line and column of the next character
    fn position(&self) -> (usize, usize) {
        (0, 0)
    }
}

/// A [`CharStream`] over an in-memory string
#[derive(Debug, Clone)]
pub struct StringStream {
    chars: Vec<char>,
    pos: usize,
    line: usize,
    column: usize,
}

impl StringStream {
    pub fn new(source: &str) -> Self {
        StringStream {
            chars: source.chars().collect(),
            pos: 0,
            line: 1,
            column: 1,
        }
    }
}

impl CharStream for StringStream {
    fn peek(&mut self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn next_char(&mut self) -> Option<char> {
        let c = self.chars.get(self.pos).copied()?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn position(&self) -> (usize, usize) {
        (self.line, self.column)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReadErrorKind {
    #[error("unexpected end of input")]
    UnexpectedEof,
    #[error("unexpected `)`")]
    UnexpectedClose,
    #[error("unterminated string")]
    UnterminatedString,
    #[error("invalid number `{0}`")]
    InvalidNumber(String),
    #[error("invalid escape `\\{0}`")]
    InvalidEscape(char),
    #[error("misplaced `.`")]
    BadDot,
    #[error("expected one expression, found {0}")]
    ExpressionCount(usize),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind} at line {line}, column {column}")]
pub struct ReadError {
    pub kind: ReadErrorKind,
    pub line: usize,
    pub column: usize,
}

enum Token {
    Open,
    Close,
    Quote,
    Dot,
    Atom(Value),
}

enum Pending {
    List {
        items: Vec<Value>,
        tail: Option<Value>,
        after_dot: bool,
    },
    Quote,
}

struct Reader<'a, S: CharStream + ?Sized> {
    stream: &'a mut S,
    symbols: &'a mut SymbolTable,
}

impl<'a, S: CharStream + ?Sized> Reader<'a, S> {
    fn error(&self, kind: ReadErrorKind) -> ReadError {
        let (line, column) = self.stream.position();
        ReadError { kind, line, column }
    }

    fn skip_whitespace(&mut self) {
        while let Some(c) = self.stream.peek() {
            if c == ';' {
                while let Some(c) = self.stream.next_char() {
                    if c == '\n' {
                        break;
                    }
                }
            } else if c.is_whitespace() {
                self.stream.next_char();
            } else {
                break;
            }
        }
    }

    fn next_token(&mut self) -> Result<Option<Token>, ReadError> {
        self.skip_whitespace();
        let c = match self.stream.peek() {
            Some(c) => c,
            None => return Ok(None),
        };
        match c {
            '(' => {
                self.stream.next_char();
                Ok(Some(Token::Open))
            }
            ')' => {
                self.stream.next_char();
                Ok(Some(Token::Close))
            }
            '\'' => {
                self.stream.next_char();
                Ok(Some(Token::Quote))
            }
            '"' => {
                self.stream.next_char();
                self.read_string().map(|s| Some(Token::Atom(s)))
            }
            _ => {
                let mut text = String::new();
                while let Some(c) = self.stream.peek() {
                    if c.is_whitespace() || matches!(c, '(' | ')' | '\'' | '"' | ';') {
                        break;
                    }
                    text.push(c);
                    self.stream.next_char();
                }
                if text == "." {
                    return Ok(Some(Token::Dot));
                }
                self.atom(text).map(|v| Some(Token::Atom(v)))
            }
        }
    }

    fn read_string(&mut self) -> Result<Value, ReadError> {
        let mut out = String::new();
        loop {
            match self.stream.next_char() {
                None => return Err(self.error(ReadErrorKind::UnterminatedString)),
                Some('"') => return Ok(Value::string(&out)),
                Some('\\') => match self.stream.next_char() {
                    Some('n') => out.push('\n'),
                    Some('t') => out.push('\t'),
                    Some('\\') => out.push('\\'),
                    Some('"') => out.push('"'),
                    Some(other) => return Err(self.error(ReadErrorKind::InvalidEscape(other))),
                    None => return Err(self.error(ReadErrorKind::UnterminatedString)),
                },
                Some(c) => out.push(c),
            }
        }
    }

    fn atom(&mut self, text: String) -> Result<Value, ReadError> {
        let mut chars = text.chars();
        let first = chars.next().unwrap_or(' ');
        let numeric = first.is_ascii_digit()
            || (matches!(first, '-' | '+' | '.')
                && chars.next().map_or(false, |c| c.is_ascii_digit() || c == '.'));
        if numeric {
            if let Ok(i) = text.parse::<i64>() {
                return Ok(Value::Int(i));
            }
            if let Some(hex) = text.strip_prefix("0x") {
                if let Ok(i) = i64::from_str_radix(hex, 16) {
                    return Ok(Value::Int(i));
                }
            }
            return match text.parse::<f64>() {
                Ok(x) => Ok(Value::Float(x)),
                Err(_) => Err(self.error(ReadErrorKind::InvalidNumber(text))),
            };
        }
        Ok(match text.as_str() {
            "nil" => Value::Nil,
            "t" => Value::True,
            _ => Value::Symbol(self.symbols.intern(&text)),
        })
    }

    /// Attach a finished datum to whatever is waiting for it
    fn complete(
        &mut self,
        stack: &mut Vec<Pending>,
        out: &mut Vec<Value>,
        mut datum: Value,
    ) -> Result<(), ReadError> {
        loop {
            match stack.last_mut() {
                None => {
                    out.push(datum);
                    return Ok(());
                }
                Some(Pending::Quote) => {
                    stack.pop();
                    datum = Value::list([self.symbols.value(sym::QUOTE), datum]);
                }
                Some(Pending::List {
                    items,
                    tail,
                    after_dot,
                }) => {
                    if tail.is_some() {
                        return Err(self.error(ReadErrorKind::BadDot));
                    }
                    if *after_dot {
                        *tail = Some(datum);
                    } else {
                        items.push(datum);
                    }
                    return Ok(());
                }
            }
        }
    }

    fn read_all(&mut self) -> Result<Vec<Value>, ReadError> {
        let mut out = Vec::new();
        let mut stack: Vec<Pending> = Vec::new();
        loop {
            let token = match self.next_token()? {
                Some(token) => token,
                None if stack.is_empty() => return Ok(out),
                None => return Err(self.error(ReadErrorKind::UnexpectedEof)),
            };
            match token {
                Token::Open => stack.push(Pending::List {
                    items: Vec::new(),
                    tail: None,
                    after_dot: false,
                }),
                Token::Quote => stack.push(Pending::Quote),
                Token::Dot => match stack.last_mut() {
                    Some(Pending::List {
                        items, after_dot, ..
                    }) if !items.is_empty() && !*after_dot => *after_dot = true,
                    _ => return Err(self.error(ReadErrorKind::BadDot)),
                },
                Token::Close => match stack.pop() {
                    Some(Pending::List {
                        items,
                        tail,
                        after_dot,
                    }) => {
                        if after_dot && tail.is_none() {
                            return Err(self.error(ReadErrorKind::BadDot));
                        }
                        let list = Value::list_with_tail(items, tail.unwrap_or(Value::Nil));
                        self.complete(&mut stack, &mut out, list)?;
                    }
                    _ => return Err(self.error(ReadErrorKind::UnexpectedClose)),
                },
                Token::Atom(value) => self.complete(&mut stack, &mut out, value)?,
            }
        }
    }
}

/// Read every top-level expression in the stream
pub fn read_program<S: CharStream + ?Sized>(
    stream: &mut S,
    symbols: &mut SymbolTable,
) -> Result<Vec<Value>, ReadError> {
    Reader { stream, symbols }.read_all()
}

/// Read exactly one expression
pub fn read_expression<S: CharStream + ?Sized>(
    stream: &mut S,
    symbols: &mut SymbolTable,
) -> Result<Value, ReadError> {
    let mut reader = Reader { stream, symbols };
    let mut exprs = reader.read_all()?;
    if exprs.len() != 1 {
        return Err(reader.error(ReadErrorKind::ExpressionCount(exprs.len())));
    }
    Ok(exprs.remove(0))
}

/// Convenience for reading from a string
pub fn read_str(source: &str, symbols: &mut SymbolTable) -> Result<Vec<Value>, ReadError> {
    read_program(&mut StringStream::new(source), symbols)
}
