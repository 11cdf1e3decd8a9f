//! Lenient, schema-agnostic parsers for model output.
//!
//! Each parser discards any preamble before the first structural character
//! and builds a [`Value`] tree. Malformed input is a [`ParsingError`] carrying
//! the byte offset and the character under the cursor; nothing is recovered
//! mid-value.
pub mod json;
pub mod toml;
pub mod xml;

use crate::config::Format;
use crate::error::{ParsingError, ParsingErrorKind};
use crate::value::Value;

pub type ParseResult<T> = std::result::Result<T, ParsingError>;

pub fn parse(format: Format, text: &str) -> ParseResult<Value> {
    match format {
        Format::Json => json::parse(text),
        Format::Toml => toml::parse(text),
        Format::Xml => xml::parse(text),
    }
}

// ————————————————————————————————————————————————————————————————————————————
// CURSOR
// ————————————————————————————————————————————————————————————————————————————

/// Byte-offset cursor over one block of text.
pub(crate) struct Cursor<'a> {
    src: &'a str,
    pos: usize,
    format: Format,
}

impl<'a> Cursor<'a> {
    pub(crate) fn new(src: &'a str, format: Format) -> Self {
        Self::starting_at(src, 0, format)
    }

    /// Cursor placed at `pos`; reported positions stay offsets into `src`.
    pub(crate) fn starting_at(src: &'a str, pos: usize, format: Format) -> Self {
        Self { src, pos: pos.min(src.len()), format }
    }

    pub(crate) fn pos(&self) -> usize {
        self.pos
    }

    pub(crate) fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    pub(crate) fn at_end(&self) -> bool {
        self.pos >= self.src.len()
    }

    pub(crate) fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    pub(crate) fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    pub(crate) fn eat(&mut self, c: char) -> bool {
        if self.peek() == Some(c) {
            self.pos += c.len_utf8();
            true
        } else {
            false
        }
    }

    pub(crate) fn eat_str(&mut self, s: &str) -> bool {
        if self.rest().starts_with(s) {
            self.pos += s.len();
            true
        } else {
            false
        }
    }

    pub(crate) fn skip_ws(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.bump();
        }
    }

    /// Spaces and tabs only; stops at line breaks.
    pub(crate) fn skip_inline_ws(&mut self) {
        while matches!(self.peek(), Some(' ' | '\t' | '\r')) {
            self.bump();
        }
    }

    pub(crate) fn skip_line(&mut self) {
        while let Some(c) = self.bump() {
            if c == '\n' {
                break;
            }
        }
    }

    /// Consumes up to (not including) the first char matching `stop`.
    pub(crate) fn take_until(&mut self, stop: impl Fn(char) -> bool) -> &'a str {
        let start = self.pos;
        while self.peek().is_some_and(|c| !stop(c)) {
            self.bump();
        }
        &self.src[start..self.pos]
    }

    /// Consumes through `delim`, returning the text before it; `None` at end of input.
    pub(crate) fn take_through(&mut self, delim: &str) -> Option<&'a str> {
        let rest = self.rest();
        let idx = rest.find(delim)?;
        self.pos += idx + delim.len();
        Some(&rest[..idx])
    }

    pub(crate) fn expect(&mut self, c: char, expected: &'static str) -> ParseResult<()> {
        if self.eat(c) { Ok(()) } else { Err(self.unexpected(expected)) }
    }

    pub(crate) fn error_at(&self, position: usize, kind: ParsingErrorKind) -> ParsingError {
        ParsingError {
            format: self.format,
            position,
            found: self.src[position.min(self.src.len())..].chars().next(),
            kind,
        }
    }

    /// `UnexpectedEnd` when exhausted, `UnexpectedChar` otherwise.
    pub(crate) fn unexpected(&self, expected: &'static str) -> ParsingError {
        let kind = match self.peek() {
            None => ParsingErrorKind::UnexpectedEnd,
            Some(_) => ParsingErrorKind::UnexpectedChar { expected },
        };
        self.error_at(self.pos, kind)
    }

    /// Quoted string opened by `quote` (already under the cursor), with
    /// JSON-style backslash escapes. Unknown escapes keep the escaped char.
    pub(crate) fn quoted(&mut self, quote: char) -> ParseResult<String> {
        self.expect(quote, "a quote")?;
        let mut out = String::new();
        loop {
            let escape_at = self.pos;
            match self.bump() {
                None => return Err(self.unexpected("a closing quote")),
                Some(c) if c == quote => return Ok(out),
                Some('\\') => match self.bump() {
                    None => return Err(self.unexpected("an escape sequence")),
                    Some('n') => out.push('\n'),
                    Some('t') => out.push('\t'),
                    Some('r') => out.push('\r'),
                    Some('b') => out.push('\u{8}'),
                    Some('f') => out.push('\u{c}'),
                    Some('u') => out.push(self.unicode_escape(escape_at)?),
                    Some(other) => out.push(other),
                },
                Some(c) => out.push(c),
            }
        }
    }

    /// Lone or mismatched surrogates decode to U+FFFD.
    fn unicode_escape(&mut self, escape_at: usize) -> ParseResult<char> {
        let high = self.hex4(escape_at)?;
        if (0xD800..0xDC00).contains(&high) {
            let before_low = self.pos;
            if self.eat_str("\\u") {
                match self.hex4(escape_at) {
                    Ok(low) if (0xDC00..0xE000).contains(&low) => {
                        let code = 0x10000 + ((high - 0xD800) << 10) + (low - 0xDC00);
                        return Ok(char::from_u32(code).unwrap_or(char::REPLACEMENT_CHARACTER));
                    }
                    _ => self.pos = before_low,
                }
            }
        }
        Ok(char::from_u32(high).unwrap_or(char::REPLACEMENT_CHARACTER))
    }

    fn hex4(&mut self, escape_at: usize) -> ParseResult<u32> {
        let digits = self.rest().get(..4).filter(|d| d.chars().all(|c| c.is_ascii_hexdigit()));
        let digits = digits.ok_or_else(|| self.error_at(escape_at, ParsingErrorKind::InvalidEscape))?;
        self.pos += 4;
        u32::from_str_radix(digits, 16).map_err(|_| self.error_at(escape_at, ParsingErrorKind::InvalidEscape))
    }

    /// Signed integer or float literal; never evaluates expressions.
    pub(crate) fn number(&mut self) -> ParseResult<Value> {
        let start = self.pos;
        let text = self.take_until(|c| !(c.is_ascii_digit() || matches!(c, '+' | '-' | '.' | 'e' | 'E' | '_')));
        number_literal(text).ok_or_else(|| self.error_at(start, ParsingErrorKind::InvalidNumber(text.to_string())))
    }
}

// ————————————————————————————————————————————————————————————————————————————
// SCALARS
// ————————————————————————————————————————————————————————————————————————————

/// Strict numeric literal: `[+-]digits[.digits][e[+-]digits]`, `_` separators allowed
/// between digits. Integers that overflow `i64` widen to floats.
pub(crate) fn number_literal(text: &str) -> Option<Value> {
    let text = text.trim();
    let body = text.strip_prefix(['+', '-']).unwrap_or(text);
    if !body.starts_with(|c: char| c.is_ascii_digit() || c == '.')
        || !body.chars().any(|c| c.is_ascii_digit())
        || body.contains("__")
        || body.ends_with('_')
        || !body.chars().all(|c| c.is_ascii_digit() || matches!(c, '.' | 'e' | 'E' | '+' | '-' | '_'))
    {
        return None;
    }
    let cleaned = text.replace('_', "");
    if !cleaned.contains(['.', 'e', 'E']) {
        if let Ok(i) = cleaned.parse::<i64>() {
            return Some(Value::Integer(i));
        }
    }
    cleaned.parse::<f64>().ok().filter(|f| f.is_finite()).map(Value::Float)
}

/// Bare-word coercion: booleans, null/none, numbers, else the text itself.
pub(crate) fn coerce_scalar(text: &str) -> Value {
    match text.to_ascii_lowercase().as_str() {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        "null" | "none" => Value::Null,
        _ => number_literal(text).unwrap_or_else(|| Value::String(text.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbers_are_literals_only() {
        assert_eq!(number_literal("-12"), Some(Value::Integer(-12)));
        assert_eq!(number_literal("+3"), Some(Value::Integer(3)));
        assert_eq!(number_literal("1e3"), Some(Value::Float(1000.0)));
        assert_eq!(number_literal("2.5E-1"), Some(Value::Float(0.25)));
        assert_eq!(number_literal("1_000"), Some(Value::Integer(1000)));
        assert_eq!(number_literal("99999999999999999999"), Some(Value::Float(1e20)));
        assert_eq!(number_literal("1+2"), None);
        assert_eq!(number_literal("inf"), None);
        assert_eq!(number_literal("nan"), None);
        assert_eq!(number_literal("-"), None);
        assert_eq!(number_literal("e5"), None);
    }

    #[test]
    fn bare_words_coerce() {
        assert_eq!(coerce_scalar("True"), Value::Bool(true));
        assert_eq!(coerce_scalar("None"), Value::Null);
        assert_eq!(coerce_scalar("42"), Value::Integer(42));
        assert_eq!(coerce_scalar("search"), Value::String("search".into()));
    }

    #[test]
    fn quoted_strings_decode_escapes() {
        let mut cur = Cursor::new(r#""a\"b\né😀" tail"#, Format::Json);
        assert_eq!(cur.quoted('"').unwrap(), "a\"b\né😀");
        assert_eq!(cur.rest(), " tail");

        let mut cur = Cursor::new(r#""\ud83d\ude00 \ud800!""#, Format::Json);
        assert_eq!(cur.quoted('"').unwrap(), "😀 \u{fffd}!");

        let mut cur = Cursor::new(r#""bad \uZZ""#, Format::Json);
        let err = cur.quoted('"').unwrap_err();
        assert_eq!(err.kind, ParsingErrorKind::InvalidEscape);
        assert_eq!(err.position, 5);
    }

    #[test]
    fn unterminated_string_reports_end() {
        let mut cur = Cursor::new("\"open", Format::Toml);
        let err = cur.quoted('"').unwrap_err();
        assert_eq!(err.kind, ParsingErrorKind::UnexpectedEnd);
        assert_eq!(err.position, 5);
        assert_eq!(err.found, None);
    }
}
