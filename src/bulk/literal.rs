//! Permissive literal evaluator.
//!
//! Accepts the loose literal syntax models emit when asked for a dict or a
//! list: single- or double-quoted strings, `True`/`False`/`None` alongside
//! `true`/`false`/`null`, tuples, trailing commas, integer keys and adjacent
//! string concatenation. Evaluates nothing; only literals are recognised.

use serde_json::{Map, Number, Value};

/// Deeper input is rejected instead of recursing further.
const MAX_DEPTH: usize = 128;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message} at byte {position}")]
pub struct LiteralError {
    pub position: usize,
    pub message: String,
}

impl LiteralError {
    fn new(position: usize, message: impl Into<String>) -> Self {
        Self {
            position,
            message: message.into(),
        }
    }
}

/// Parse exactly one literal spanning all of `input` (surrounding whitespace allowed).
pub fn parse_literal(input: &str) -> Result<Value, LiteralError> {
    let mut parser = LiteralParser { src: input, pos: 0 };
    let value = parser.parse_value(0)?;
    parser.skip_ws();
    if parser.pos < input.len() {
        return Err(parser.error("unexpected trailing characters"));
    }
    Ok(value)
}

struct LiteralParser<'a> {
    src: &'a str,
    pos: usize,
}

impl LiteralParser<'_> {
    fn peek(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.pos += expected.len_utf8();
            true
        } else {
            false
        }
    }

    fn skip_ws(&mut self) {
        while let Some(c) = self.peek() {
            if !c.is_whitespace() {
                break;
            }
            self.pos += c.len_utf8();
        }
    }

    fn error(&self, message: impl Into<String>) -> LiteralError {
        LiteralError::new(self.pos, message)
    }

    fn expected(&self, what: &str) -> LiteralError {
        match self.peek() {
            Some(c) => self.error(format!("expected {what}, found '{c}'")),
            None => self.error(format!("expected {what}, found end of input")),
        }
    }

    fn parse_value(&mut self, depth: usize) -> Result<Value, LiteralError> {
        if depth > MAX_DEPTH {
            return Err(self.error("nesting too deep"));
        }
        self.skip_ws();
        match self.peek() {
            Some('{') => self.parse_object(depth),
            Some('[') => {
                self.pos += 1;
                let (items, _) = self.parse_items(']', depth)?;
                Ok(Value::Array(items))
            }
            Some('(') => {
                self.pos += 1;
                let (mut items, saw_comma) = self.parse_items(')', depth)?;
                // `(x)` is grouping; only `(x,)` is a one-element tuple.
                if items.len() == 1 && !saw_comma {
                    Ok(items.remove(0))
                } else {
                    Ok(Value::Array(items))
                }
            }
            Some('\'' | '"') => self.parse_strings(),
            Some(c) if c.is_ascii_digit() || matches!(c, '-' | '+' | '.') => self.parse_number(),
            Some(c) if c.is_alphabetic() || c == '_' => self.parse_name(),
            Some(c) => Err(self.error(format!("unexpected character '{c}'"))),
            None => Err(self.error("unexpected end of input")),
        }
    }

    /// Comma-separated values up to `close`; the opener is already consumed.
    fn parse_items(&mut self, close: char, depth: usize) -> Result<(Vec<Value>, bool), LiteralError> {
        let mut items = Vec::new();
        let mut saw_comma = false;
        loop {
            self.skip_ws();
            if self.eat(close) {
                return Ok((items, saw_comma));
            }
            items.push(self.parse_value(depth + 1)?);
            self.skip_ws();
            if self.eat(',') {
                saw_comma = true;
                continue;
            }
            if self.eat(close) {
                return Ok((items, saw_comma));
            }
            return Err(self.expected(&format!("',' or '{close}'")));
        }
    }

    fn parse_object(&mut self, depth: usize) -> Result<Value, LiteralError> {
        self.pos += 1;
        let mut map = Map::new();
        loop {
            self.skip_ws();
            if self.eat('}') {
                return Ok(Value::Object(map));
            }

            let key_pos = self.pos;
            let key = self.parse_value(depth + 1)?;
            let key = object_key(&key)
                .ok_or_else(|| LiteralError::new(key_pos, "unhashable dict key"))?;

            self.skip_ws();
            if !self.eat(':') {
                return Err(self.expected("':'"));
            }
            let value = self.parse_value(depth + 1)?;
            map.insert(key, value);

            self.skip_ws();
            if self.eat(',') {
                continue;
            }
            if self.eat('}') {
                return Ok(Value::Object(map));
            }
            return Err(self.expected("',' or '}'"));
        }
    }

    /// One or more adjacent string literals, concatenated.
    fn parse_strings(&mut self) -> Result<Value, LiteralError> {
        let mut out = self.parse_string()?;
        loop {
            let before_ws = self.pos;
            self.skip_ws();
            if matches!(self.peek(), Some('\'' | '"')) {
                out.push_str(&self.parse_string()?);
            } else {
                self.pos = before_ws;
                return Ok(Value::String(out));
            }
        }
    }

    fn parse_string(&mut self) -> Result<String, LiteralError> {
        let start = self.pos;
        let quote = self.bump().ok_or_else(|| self.error("expected string"))?;
        let mut out = String::new();
        loop {
            match self.bump() {
                None => return Err(LiteralError::new(start, "unterminated string")),
                Some(c) if c == quote => return Ok(out),
                Some('\\') => self.parse_escape(&mut out, start)?,
                Some(c) => out.push(c),
            }
        }
    }

    fn parse_escape(&mut self, out: &mut String, string_start: usize) -> Result<(), LiteralError> {
        let escape_pos = self.pos - 1;
        match self.bump() {
            None => return Err(LiteralError::new(string_start, "unterminated string")),
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('b') => out.push('\u{8}'),
            Some('f') => out.push('\u{c}'),
            Some('0') => out.push('\0'),
            Some(c @ ('\\' | '\'' | '"' | '/')) => out.push(c),
            // Backslash-newline is a line continuation.
            Some('\n') => {}
            Some('x') => {
                let code = self.read_hex(2, escape_pos)?;
                out.push(char_from(code, escape_pos)?);
            }
            Some('u') => {
                let code = self.read_hex(4, escape_pos)?;
                out.push(self.utf16_char(code, escape_pos)?);
            }
            Some('U') => {
                let code = self.read_hex(8, escape_pos)?;
                out.push(char_from(code, escape_pos)?);
            }
            // Unknown escapes are kept verbatim.
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
        }
        Ok(())
    }

    /// A `\u` code unit, combining a surrogate pair when one follows.
    fn utf16_char(&mut self, high: u32, escape_pos: usize) -> Result<char, LiteralError> {
        if !(0xD800..0xDC00).contains(&high) {
            return char_from(high, escape_pos);
        }
        if self.src[self.pos..].starts_with("\\u") {
            self.pos += 2;
            let low = self.read_hex(4, escape_pos)?;
            if (0xDC00..0xE000).contains(&low) {
                let combined = 0x10000 + ((high - 0xD800) << 10) + (low - 0xDC00);
                return char_from(combined, escape_pos);
            }
        }
        Err(LiteralError::new(escape_pos, "unpaired surrogate in \\u escape"))
    }

    fn read_hex(&mut self, digits: usize, escape_pos: usize) -> Result<u32, LiteralError> {
        let mut code = 0u32;
        for _ in 0..digits {
            let digit = self
                .bump()
                .and_then(|c| c.to_digit(16))
                .ok_or_else(|| LiteralError::new(escape_pos, "truncated hex escape"))?;
            code = code * 16 + digit;
        }
        Ok(code)
    }

    fn parse_number(&mut self) -> Result<Value, LiteralError> {
        let start = self.pos;
        let mut negative = false;
        while let Some(sign @ ('-' | '+')) = self.peek() {
            if sign == '-' {
                negative = !negative;
            }
            self.pos += 1;
            self.skip_ws();
        }

        let digits_start = self.pos;
        let mut is_float = false;
        while let Some(c) = self.peek() {
            match c {
                '0'..='9' | '_' => self.pos += 1,
                '.' => {
                    is_float = true;
                    self.pos += 1;
                }
                'e' | 'E' => {
                    is_float = true;
                    self.pos += 1;
                    if matches!(self.peek(), Some('+' | '-')) {
                        self.pos += 1;
                    }
                }
                _ => break,
            }
        }

        let text: String = self.src[digits_start..self.pos]
            .chars()
            .filter(|c| *c != '_')
            .collect();
        if !text.bytes().any(|b| b.is_ascii_digit()) {
            return Err(LiteralError::new(start, "invalid number"));
        }

        if !is_float {
            if let Ok(i) = text.parse::<i64>() {
                return Ok(Value::from(if negative { -i } else { i }));
            }
        }

        let f: f64 = text
            .parse()
            .map_err(|_| LiteralError::new(start, format!("invalid number '{text}'")))?;
        let f = if negative { -f } else { f };
        Number::from_f64(f)
            .map(Value::Number)
            .ok_or_else(|| LiteralError::new(start, "non-finite number"))
    }

    fn parse_name(&mut self) -> Result<Value, LiteralError> {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if !(c.is_alphanumeric() || c == '_') {
                break;
            }
            self.pos += c.len_utf8();
        }
        match &self.src[start..self.pos] {
            "True" | "true" => Ok(Value::Bool(true)),
            "False" | "false" => Ok(Value::Bool(false)),
            "None" | "null" => Ok(Value::Null),
            name => Err(LiteralError::new(start, format!("unknown name '{name}'"))),
        }
    }
}

fn char_from(code: u32, escape_pos: usize) -> Result<char, LiteralError> {
    char::from_u32(code).ok_or_else(|| LiteralError::new(escape_pos, "invalid code point"))
}

/// Object keys must be strings; scalar keys are rendered the way they were written.
fn object_key(key: &Value) -> Option<String> {
    match key {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(true) => Some("True".to_string()),
        Value::Bool(false) => Some("False".to_string()),
        Value::Null => Some("None".to_string()),
        Value::Array(_) | Value::Object(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_single_quoted_dict() {
        let v = parse_literal("{'Text': 'Floods displaced 3,000 people', 'ID': [0, 2]}").unwrap();
        assert_eq!(v, json!({"Text": "Floods displaced 3,000 people", "ID": [0, 2]}));
    }

    #[test]
    fn parses_plain_json_too() {
        let v = parse_literal(r#"{"Text": "x", "ID": [1], "ok": true, "n": null}"#).unwrap();
        assert_eq!(v, json!({"Text": "x", "ID": [1], "ok": true, "n": null}));
    }

    #[test]
    fn python_keywords_and_tuples() {
        assert_eq!(parse_literal("(True, False, None)").unwrap(), json!([true, false, null]));
        assert_eq!(parse_literal("(1,)").unwrap(), json!([1]));
        assert_eq!(parse_literal("(1)").unwrap(), json!(1));
        assert_eq!(parse_literal("()").unwrap(), json!([]));
    }

    #[test]
    fn trailing_commas_are_accepted() {
        assert_eq!(parse_literal("[1, 2, 3,]").unwrap(), json!([1, 2, 3]));
        assert_eq!(parse_literal("{'a': 1,}").unwrap(), json!({"a": 1}));
    }

    #[test]
    fn empty_slots_are_rejected() {
        assert!(parse_literal("[1,,2]").is_err());
        assert!(parse_literal("[,]").is_err());
        assert!(parse_literal("{'a' 1}").is_err());
    }

    #[test]
    fn scalar_keys_become_strings() {
        assert_eq!(
            parse_literal("{0: 'a', 1.5: 'b', None: 'c'}").unwrap(),
            json!({"0": "a", "1.5": "b", "None": "c"})
        );
        assert!(parse_literal("{[1]: 'a'}").is_err());
    }

    #[test]
    fn numbers() {
        assert_eq!(parse_literal("-7").unwrap(), json!(-7));
        assert_eq!(parse_literal("1_000").unwrap(), json!(1000));
        assert_eq!(parse_literal("2.5e2").unwrap(), json!(250.0));
        assert_eq!(parse_literal("[.5, 3.]").unwrap(), json!([0.5, 3.0]));
        assert!(parse_literal("-").is_err());
        assert!(parse_literal("1.2.3").is_err());
    }

    #[test]
    fn string_escapes() {
        assert_eq!(parse_literal(r"'it\'s'").unwrap(), json!("it's"));
        assert_eq!(parse_literal(r#""tab\there""#).unwrap(), json!("tab\there"));
        assert_eq!(parse_literal(r#""caf\u00e9""#).unwrap(), json!("café"));
        assert_eq!(parse_literal(r#""a\u00A0b""#).unwrap(), json!("a\u{a0}b"));
        assert_eq!(parse_literal(r"'\xe9'").unwrap(), json!("é"));
        assert_eq!(parse_literal(r#""\ud83d\ude00""#).unwrap(), json!("😀"));
        assert_eq!(parse_literal(r"'\d'").unwrap(), json!("\\d"));
        assert!(parse_literal(r#""\ud83d""#).is_err());
    }

    #[test]
    fn adjacent_strings_concatenate() {
        assert_eq!(parse_literal("['ab' 'cd', 'e']").unwrap(), json!(["abcd", "e"]));
    }

    #[test]
    fn mixed_quotes_inside_strings() {
        assert_eq!(
            parse_literal(r#"{'Text': "the 'worst' floods"}"#).unwrap(),
            json!({"Text": "the 'worst' floods"})
        );
    }

    #[test]
    fn rejects_garbage_with_position() {
        let err = parse_literal("[1, 2] extra").unwrap_err();
        assert_eq!(err.position, 7);
        assert!(parse_literal("").is_err());
        assert!(parse_literal("{'Text': 'cut").is_err());
        assert!(parse_literal("[1, 2").is_err());
        assert!(parse_literal("print('x')").is_err());
        assert!(parse_literal("{1, 2}").is_err());
    }

    #[test]
    fn deep_nesting_is_an_error_not_a_crash() {
        let deep = "[".repeat(10_000);
        assert!(parse_literal(&deep).is_err());
    }
}
