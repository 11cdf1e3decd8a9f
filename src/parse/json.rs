//! JSON-like responses: single-pass recursive descent.
//!
//! Accepted beyond strict JSON: preamble before the first `{`, single-quoted
//! strings, trailing commas, case-insensitive `true`/`false`/`null`/`none`,
//! and anything after the top-level value.
use indexmap::IndexMap;

use super::{Cursor, ParseResult};
use crate::config::Format;
use crate::error::ParsingErrorKind;
use crate::value::Value;

pub fn parse(text: &str) -> ParseResult<Value> {
    let start = text.find('{').unwrap_or(0);
    let mut cur = Cursor::starting_at(text, start, Format::Json);
    cur.skip_ws();
    value(&mut cur)
}

fn value(cur: &mut Cursor) -> ParseResult<Value> {
    match cur.peek() {
        Some('{') => object(cur),
        Some('[') => array(cur),
        Some(q @ ('"' | '\'')) => cur.quoted(q).map(Value::String),
        Some(c) if c.is_ascii_digit() || matches!(c, '-' | '+' | '.') => cur.number(),
        Some(c) if c.is_ascii_alphabetic() => word(cur),
        _ => Err(cur.unexpected("a value")),
    }
}

fn word(cur: &mut Cursor) -> ParseResult<Value> {
    let start = cur.pos();
    let word = cur.take_until(|c| !c.is_ascii_alphabetic());
    match word.to_ascii_lowercase().as_str() {
        "true" => Ok(Value::Bool(true)),
        "false" => Ok(Value::Bool(false)),
        "null" | "none" => Ok(Value::Null),
        _ => Err(cur.error_at(start, ParsingErrorKind::UnexpectedChar { expected: "a value" })),
    }
}

fn object(cur: &mut Cursor) -> ParseResult<Value> {
    cur.expect('{', "`{`")?;
    let mut map = IndexMap::new();
    loop {
        cur.skip_ws();
        if cur.eat('}') {
            break;
        }
        let key = match cur.peek() {
            Some(q @ ('"' | '\'')) => cur.quoted(q)?,
            _ => return Err(cur.unexpected("a quoted key")),
        };
        cur.skip_ws();
        cur.expect(':', "`:`")?;
        cur.skip_ws();
        let v = value(cur)?;
        map.insert(key.replace('-', "_"), v);

        cur.skip_ws();
        if cur.eat(',') {
            continue;
        }
        if cur.eat('}') {
            break;
        }
        return Err(cur.unexpected("`,` or `}`"));
    }
    Ok(Value::Map(map))
}

fn array(cur: &mut Cursor) -> ParseResult<Value> {
    cur.expect('[', "`[`")?;
    let mut items = Vec::new();
    loop {
        cur.skip_ws();
        if cur.eat(']') {
            break;
        }
        items.push(value(cur)?);

        cur.skip_ws();
        if cur.eat(',') {
            continue;
        }
        if cur.eat(']') {
            break;
        }
        return Err(cur.unexpected("`,` or `]`"));
    }
    Ok(Value::Array(items))
}
