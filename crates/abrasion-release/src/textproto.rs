#![forbid(unsafe_code)]

//! Reader for the protobuf text format emitted by the build.
//!
//! The document is lowered into a [`serde_json::Value`] so that the same serde
//! schema (and its unknown-field checks) applies to every manifest encoding.
//! Message-valued fields always become arrays, since every message field of
//! the manifest schema is repeated. Scalar fields that appear more than once
//! are collected into an array as well.

use serde_json::{Map, Number, Value};
use thiserror::Error;

/// Deepest message nesting accepted before the document is rejected.
const MAX_DEPTH: usize = 100;

#[derive(Debug, Error)]
#[error("line {line}, column {column}: {message}")]
pub struct TextProtoError {
    pub line: usize,
    pub column: usize,
    message: String,
}

/// Parses a text format document into a JSON object.
pub fn to_value(text: &str) -> Result<Value, TextProtoError> {
    let mut parser = Parser::new(text);
    let fields = parser.message_body(None)?;
    Ok(Value::Object(fields))
}

struct Parser<'a> {
    input: &'a [u8],
    pos: usize,
    line: usize,
    column: usize,
    depth: usize,
}

impl<'a> Parser<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            input: text.as_bytes(),
            pos: 0,
            line: 1,
            column: 1,
            depth: 0,
        }
    }

    fn error(&self, message: impl Into<String>) -> TextProtoError {
        TextProtoError {
            line: self.line,
            column: self.column,
            message: message.into(),
        }
    }

    fn peek(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let byte = self.peek()?;
        self.pos += 1;
        if byte == b'\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(byte)
    }

    fn skip_trivia(&mut self) {
        while let Some(byte) = self.peek() {
            match byte {
                b' ' | b'\t' | b'\r' | b'\n' => {
                    self.bump();
                }
                b'#' => {
                    while let Some(byte) = self.bump() {
                        if byte == b'\n' {
                            break;
                        }
                    }
                }
                _ => break,
            }
        }
    }

    fn expect(&mut self, want: u8) -> Result<(), TextProtoError> {
        self.skip_trivia();
        match self.peek() {
            Some(byte) if byte == want => {
                self.bump();
                Ok(())
            }
            Some(byte) => Err(self.error(format!(
                "expected `{}`, found `{}`",
                want as char, byte as char
            ))),
            None => Err(self.error(format!(
                "expected `{}`, found end of input",
                want as char
            ))),
        }
    }

    /// Parses fields until `close` (or end of input for the top level).
    fn message_body(&mut self, close: Option<u8>) -> Result<Map<String, Value>, TextProtoError> {
        let mut fields = Map::new();
        loop {
            self.skip_trivia();
            match (self.peek(), close) {
                (None, None) => return Ok(fields),
                (None, Some(close)) => {
                    return Err(self.error(format!(
                        "expected `{}`, found end of input",
                        close as char
                    )));
                }
                (Some(byte), Some(close)) if byte == close => {
                    self.bump();
                    return Ok(fields);
                }
                _ => {}
            }

            let name = self.field_name()?;
            self.skip_trivia();
            let has_colon = self.peek() == Some(b':');
            if has_colon {
                self.bump();
                self.skip_trivia();
            }

            match self.peek() {
                Some(open @ (b'{' | b'<')) => {
                    let nested = self.nested_message(open)?;
                    push_repeated(&mut fields, name, Value::Object(nested));
                }
                Some(b'[') if has_colon => {
                    self.bump();
                    for value in self.list()? {
                        push_repeated(&mut fields, name.clone(), value);
                    }
                }
                _ if has_colon => {
                    let value = self.scalar()?;
                    push_scalar(&mut fields, name, value);
                }
                _ => return Err(self.error(format!("expected `:` or `{{` after `{name}`"))),
            }

            self.skip_trivia();
            if matches!(self.peek(), Some(b',' | b';')) {
                self.bump();
            }
        }
    }

    /// Parses a `{ ... }` or `< ... >` message starting at `open`.
    fn nested_message(&mut self, open: u8) -> Result<Map<String, Value>, TextProtoError> {
        if self.depth >= MAX_DEPTH {
            return Err(self.error("message nesting too deep"));
        }
        self.bump();
        self.depth += 1;
        let fields = self.message_body(Some(closing(open)));
        self.depth -= 1;
        fields
    }

    fn field_name(&mut self) -> Result<String, TextProtoError> {
        match self.peek() {
            Some(b'[') => Err(self.error("extension and Any fields are not supported")),
            Some(byte) if is_ident_start(byte) => Ok(self.identifier()),
            Some(byte) => Err(self.error(format!(
                "expected field name, found `{}`",
                byte as char
            ))),
            None => Err(self.error("expected field name, found end of input")),
        }
    }

    fn identifier(&mut self) -> String {
        let start = self.pos;
        while matches!(self.peek(), Some(byte) if is_ident_continue(byte)) {
            self.bump();
        }
        String::from_utf8_lossy(&self.input[start..self.pos]).into_owned()
    }

    fn list(&mut self) -> Result<Vec<Value>, TextProtoError> {
        let mut values = Vec::new();
        self.skip_trivia();
        if self.peek() == Some(b']') {
            self.bump();
            return Ok(values);
        }
        loop {
            self.skip_trivia();
            let value = match self.peek() {
                Some(open @ (b'{' | b'<')) => Value::Object(self.nested_message(open)?),
                _ => self.scalar()?,
            };
            values.push(value);

            self.skip_trivia();
            match self.peek() {
                Some(b',') => {
                    self.bump();
                }
                _ => {
                    self.expect(b']')?;
                    return Ok(values);
                }
            }
        }
    }

    fn scalar(&mut self) -> Result<Value, TextProtoError> {
        match self.peek() {
            Some(b'"' | b'\'') => self.strings(),
            Some(byte) if byte == b'-' || byte == b'.' || byte.is_ascii_digit() => self.number(),
            Some(byte) if is_ident_start(byte) => {
                let ident = self.identifier();
                Ok(match ident.as_str() {
                    "true" | "True" | "t" => Value::Bool(true),
                    "false" | "False" | "f" => Value::Bool(false),
                    _ => Value::String(ident),
                })
            }
            Some(byte) => Err(self.error(format!("unexpected `{}`", byte as char))),
            None => Err(self.error("expected a value, found end of input")),
        }
    }

    /// One or more adjacent quoted strings, concatenated.
    fn strings(&mut self) -> Result<Value, TextProtoError> {
        let mut bytes = Vec::new();
        while let Some(quote @ (b'"' | b'\'')) = self.peek() {
            self.bump();
            self.string_body(quote, &mut bytes)?;
            self.skip_trivia();
        }
        String::from_utf8(bytes)
            .map(Value::String)
            .map_err(|_| self.error("string is not valid UTF-8"))
    }

    fn string_body(&mut self, quote: u8, out: &mut Vec<u8>) -> Result<(), TextProtoError> {
        loop {
            match self.bump() {
                None | Some(b'\n') => return Err(self.error("unterminated string")),
                Some(byte) if byte == quote => return Ok(()),
                Some(b'\\') => self.escape(out)?,
                Some(byte) => out.push(byte),
            }
        }
    }

    fn escape(&mut self, out: &mut Vec<u8>) -> Result<(), TextProtoError> {
        let Some(byte) = self.bump() else {
            return Err(self.error("unterminated escape sequence"));
        };
        match byte {
            b'n' => out.push(b'\n'),
            b't' => out.push(b'\t'),
            b'r' => out.push(b'\r'),
            b'a' => out.push(0x07),
            b'b' => out.push(0x08),
            b'f' => out.push(0x0c),
            b'v' => out.push(0x0b),
            b'\\' | b'\'' | b'"' | b'?' => out.push(byte),
            b'0'..=b'7' => {
                let mut value = u32::from(byte - b'0');
                for _ in 0..2 {
                    match self.peek() {
                        Some(digit @ b'0'..=b'7') => {
                            self.bump();
                            value = value * 8 + u32::from(digit - b'0');
                        }
                        _ => break,
                    }
                }
                let value = u8::try_from(value)
                    .map_err(|_| self.error("octal escape out of range"))?;
                out.push(value);
            }
            b'x' => {
                let value = self.hex_digits(1, 2)?;
                out.push(value as u8);
            }
            b'u' | b'U' => {
                let width = if byte == b'u' { 4 } else { 8 };
                let value = self.hex_digits(width, width)?;
                let ch = char::from_u32(value)
                    .ok_or_else(|| self.error("invalid unicode escape"))?;
                let mut buf = [0u8; 4];
                out.extend_from_slice(ch.encode_utf8(&mut buf).as_bytes());
            }
            other => {
                return Err(self.error(format!("unknown escape `\\{}`", other as char)));
            }
        }
        Ok(())
    }

    fn hex_digits(&mut self, min: usize, max: usize) -> Result<u32, TextProtoError> {
        let mut value = 0u32;
        let mut count = 0;
        while count < max {
            match self.peek().and_then(|byte| (byte as char).to_digit(16)) {
                Some(digit) => {
                    self.bump();
                    value = value * 16 + digit;
                    count += 1;
                }
                None => break,
            }
        }
        if count < min {
            return Err(self.error("malformed hex escape"));
        }
        Ok(value)
    }

    fn number(&mut self) -> Result<Value, TextProtoError> {
        let start = self.pos;
        if self.peek() == Some(b'-') {
            self.bump();
        }
        while matches!(
            self.peek(),
            Some(byte) if byte.is_ascii_alphanumeric() || byte == b'.' || byte == b'+' || byte == b'-'
        ) {
            self.bump();
        }
        let token = String::from_utf8_lossy(&self.input[start..self.pos]).into_owned();
        parse_number(&token).ok_or_else(|| self.error(format!("invalid number `{token}`")))
    }
}

fn parse_number(token: &str) -> Option<Value> {
    let (negative, digits) = match token.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, token),
    };

    if let Some(hex) = digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
    {
        let magnitude = i64::from_str_radix(hex, 16).ok()?;
        let value = if negative { -magnitude } else { magnitude };
        return Some(Value::Number(value.into()));
    }

    if let Ok(value) = token.parse::<i64>() {
        return Some(Value::Number(value.into()));
    }
    if let Ok(value) = token.parse::<u64>() {
        return Some(Value::Number(value.into()));
    }

    let float = token
        .strip_suffix(['f', 'F'])
        .unwrap_or(token)
        .parse::<f64>()
        .ok()?;
    Number::from_f64(float).map(Value::Number)
}

fn push_repeated(fields: &mut Map<String, Value>, name: String, value: Value) {
    match fields.get_mut(&name) {
        Some(Value::Array(items)) => items.push(value),
        Some(existing) => {
            let previous = existing.take();
            *existing = Value::Array(vec![previous, value]);
        }
        None => {
            fields.insert(name, Value::Array(vec![value]));
        }
    }
}

fn push_scalar(fields: &mut Map<String, Value>, name: String, value: Value) {
    if fields.contains_key(&name) {
        push_repeated(fields, name, value);
    } else {
        fields.insert(name, value);
    }
}

fn closing(open: u8) -> u8 {
    if open == b'<' { b'>' } else { b'}' }
}

fn is_ident_start(byte: u8) -> bool {
    byte.is_ascii_alphabetic() || byte == b'_'
}

fn is_ident_continue(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || byte == b'_'
}
