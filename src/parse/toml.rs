//! TOML-like responses.
//!
//! Every `[section]` (or `[[section]]`) body becomes a map appended to a
//! sequence under the section name, so a repeated section accumulates rather
//! than overwrites. Keys before the first header land at the top level.
use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;

use super::{coerce_scalar, Cursor, ParseResult};
use crate::config::Format;
use crate::value::Value;

/// First line that looks like TOML: a header or a `key =` assignment.
static FIRST_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?m)^[ \t]*(\[|[A-Za-z0-9_."'-]+[ \t]*=)"#).expect("static regex")
});

pub fn parse(text: &str) -> ParseResult<Value> {
    let start = FIRST_LINE.find(text).map(|m| m.start()).unwrap_or(0);
    let mut cur = Cursor::starting_at(text, start, Format::Toml);

    let mut root = IndexMap::new();
    let mut section: Option<(String, IndexMap<String, Value>)> = None;

    loop {
        cur.skip_ws();
        match cur.peek() {
            None => break,
            Some('#') => cur.skip_line(),
            Some('[') => {
                let name = header(&mut cur)?;
                if let Some((name, body)) = section.take() {
                    close_section(&mut root, name, body);
                }
                section = Some((name, IndexMap::new()));
            }
            Some(_) => {
                let (key, v) = assignment(&mut cur)?;
                match &mut section {
                    Some((_, body)) => body.insert(key, v),
                    None => root.insert(key, v),
                };
            }
        }
    }
    if let Some((name, body)) = section {
        close_section(&mut root, name, body);
    }
    Ok(Value::Map(root))
}

fn close_section(root: &mut IndexMap<String, Value>, name: String, body: IndexMap<String, Value>) {
    match root.get_mut(&name) {
        Some(Value::Array(bodies)) => bodies.push(Value::Map(body)),
        _ => {
            root.insert(name, Value::Array(vec![Value::Map(body)]));
        }
    }
}

/// `[name]` or `[[name]]`; spaces dropped, hyphens become underscores.
fn header(cur: &mut Cursor) -> ParseResult<String> {
    cur.expect('[', "`[`")?;
    let double = cur.eat('[');
    let raw = cur.take_until(|c| c == ']' || c == '\n');
    cur.expect(']', "`]`")?;
    if double {
        cur.expect(']', "`]]`")?;
    }
    end_of_line(cur)?;
    Ok(raw.chars().filter(|c| !c.is_whitespace()).collect::<String>().replace('-', "_"))
}

fn assignment(cur: &mut Cursor) -> ParseResult<(String, Value)> {
    let raw = cur.take_until(|c| c == '=' || c == '\n');
    cur.expect('=', "`=`")?;
    cur.skip_inline_ws();
    let v = value(cur, false)?;
    end_of_line(cur)?;
    Ok((key(raw), v))
}

/// Only whitespace, a comment, or a stray comma may follow a value on its line.
fn end_of_line(cur: &mut Cursor) -> ParseResult<()> {
    cur.skip_inline_ws();
    cur.eat(',');
    cur.skip_inline_ws();
    match cur.peek() {
        None | Some('\n') => Ok(()),
        Some('#') => {
            cur.skip_line();
            Ok(())
        }
        Some(_) => Err(cur.unexpected("end of line")),
    }
}

fn key(raw: &str) -> String {
    let k = raw.trim();
    let unquoted = k
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .or_else(|| k.strip_prefix('\'').and_then(|s| s.strip_suffix('\'')))
        .unwrap_or(k);
    unquoted.to_string()
}

/// `nested` is true inside arrays and inline tables, where `,` `]` `}`
/// also end a bare word and line breaks are insignificant.
fn value(cur: &mut Cursor, nested: bool) -> ParseResult<Value> {
    match cur.peek() {
        Some('"') if cur.rest().starts_with("\"\"\"") => multiline(cur, "\"\"\""),
        Some('\'') if cur.rest().starts_with("'''") => multiline(cur, "'''"),
        Some('"') => cur.quoted('"').map(Value::String),
        Some('\'') => {
            cur.bump();
            let s = cur.take_until(|c| c == '\'' || c == '\n');
            cur.expect('\'', "a closing quote")?;
            Ok(Value::String(s.to_string()))
        }
        Some('[') => array(cur),
        Some('{') => inline_table(cur),
        _ => {
            // `#` always opens a comment, even after a bare word
            let word = if nested {
                cur.take_until(|c| matches!(c, ',' | ']' | '}' | '\n' | '#'))
            } else {
                cur.take_until(|c| matches!(c, '\n' | '#'))
            };
            Ok(coerce_scalar(word.trim()))
        }
    }
}

fn multiline(cur: &mut Cursor, delim: &str) -> ParseResult<Value> {
    cur.eat_str(delim);
    let Some(body) = cur.take_through(delim) else {
        cur.take_until(|_| false);
        return Err(cur.unexpected("closing quotes"));
    };
    let body = body.strip_prefix('\n').unwrap_or(body);
    Ok(Value::String(body.to_string()))
}

/// Empty entries (`[1, , 2]`) are dropped.
fn array(cur: &mut Cursor) -> ParseResult<Value> {
    cur.expect('[', "`[`")?;
    let mut items = Vec::new();
    loop {
        skip_ws_and_comments(cur);
        if cur.eat(']') {
            break;
        }
        if cur.eat(',') {
            continue;
        }
        let item = value(cur, true)?;
        if !is_empty_token(&item) {
            items.push(item);
        }
        skip_ws_and_comments(cur);
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

/// `{k = v, ...}`; `:` is accepted in place of `=`.
fn inline_table(cur: &mut Cursor) -> ParseResult<Value> {
    cur.expect('{', "`{`")?;
    let mut map = IndexMap::new();
    loop {
        cur.skip_ws();
        if cur.eat('}') {
            break;
        }
        if cur.eat(',') {
            continue;
        }
        let raw = cur.take_until(|c| matches!(c, '=' | ':' | '}' | '\n'));
        if !(cur.eat('=') || cur.eat(':')) {
            return Err(cur.unexpected("`=`"));
        }
        cur.skip_ws();
        let v = value(cur, true)?;
        map.insert(key(raw), v);

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

fn skip_ws_and_comments(cur: &mut Cursor) {
    loop {
        cur.skip_ws();
        if cur.peek() == Some('#') {
            cur.skip_line();
        } else {
            break;
        }
    }
}

fn is_empty_token(v: &Value) -> bool {
    matches!(v, Value::String(s) if s.is_empty())
}
