//! XML-like responses, parsed in one pass with an element stack.
//!
//! A value is attached to its tag the moment the tag closes, so same-named
//! tags at different depths never interfere. Leniencies: a `<` that cannot
//! start markup is text, unmatched close tags are ignored, and elements left
//! open at end of input (or when an ancestor closes) are closed implicitly.
//!
//! Shapes produced:
//! - text-only element: coerced scalar (`true`, `none`, `3`, `1.5`, else string)
//! - empty element: empty map
//! - element with children: map of child tag to value; repeated sibling tags
//!   collect into a sequence
//! - input without a single element is an error
//! - attributes: merged into the element's map; a text-only element with
//!   attributes keeps its text under `value`
use indexmap::IndexMap;

use super::{coerce_scalar, Cursor, ParseResult};
use crate::config::Format;
use crate::error::ParsingErrorKind;
use crate::value::Value;

pub fn parse(text: &str) -> ParseResult<Value> {
    let start = text.find('<').unwrap_or(text.len());
    let mut cur = Cursor::starting_at(text, start, Format::Xml);
    if cur.at_end() {
        return Err(cur.unexpected("`<`"));
    }
    let mut root = IndexMap::new();
    let mut stack: Vec<Element> = Vec::new();
    let mut opened = false;

    while !cur.at_end() {
        let rest = cur.rest();
        if rest.starts_with("<!--") {
            skip_through(&mut cur, "-->");
        } else if rest.starts_with("<![CDATA[") {
            cur.eat_str("<![CDATA[");
            let data = match cur.take_through("]]>") {
                Some(data) => data,
                None => cur.take_until(|_| false),
            };
            if let Some(top) = stack.last_mut() {
                top.text.push_str(data);
                top.raw_text = true;
            }
        } else if rest.starts_with("<?") {
            skip_through(&mut cur, "?>");
        } else if rest.starts_with("<!") {
            skip_through(&mut cur, ">");
        } else if rest.starts_with("</") {
            let name = close_tag(&mut cur);
            if let Some(depth) = stack.iter().rposition(|e| e.tag == name) {
                while stack.len() > depth {
                    pop(&mut stack, &mut root);
                }
            }
        } else if starts_markup(rest) {
            let (element, self_closing) = open_tag(&mut cur)?;
            opened = true;
            stack.push(element);
            if self_closing {
                pop(&mut stack, &mut root);
            }
        } else {
            // text, including any `<` that cannot open a tag
            let mut text = String::new();
            if let Some(c) = cur.bump() {
                text.push(c);
            }
            text.push_str(cur.take_until(|c| c == '<'));
            if let Some(top) = stack.last_mut() {
                top.text.push_str(&text);
            }
        }
    }
    if !opened {
        // markup-free text or only comments: nothing was answered
        return Err(cur.error_at(cur.pos(), ParsingErrorKind::UnexpectedEnd));
    }
    while !stack.is_empty() {
        pop(&mut stack, &mut root);
    }
    Ok(Value::Map(root))
}

struct Element {
    tag: String,
    attrs: IndexMap<String, Value>,
    children: IndexMap<String, Value>,
    text: String,
    /// Text came from CDATA; skip entity decoding.
    raw_text: bool,
}

impl Element {
    fn new(tag: String) -> Self {
        Self {
            tag,
            attrs: IndexMap::new(),
            children: IndexMap::new(),
            text: String::new(),
            raw_text: false,
        }
    }

    fn into_value(self) -> Value {
        if !self.children.is_empty() {
            let mut map = self.attrs;
            for (k, v) in self.children {
                Value::push_entry(&mut map, k, v);
            }
            return Value::Map(map);
        }
        let text = self.text.trim();
        if text.is_empty() {
            return Value::Map(self.attrs);
        }
        let scalar = if self.raw_text {
            Value::String(text.to_string())
        } else {
            coerce_scalar(&decode_entities(text))
        };
        if self.attrs.is_empty() {
            scalar
        } else {
            let mut map = self.attrs;
            map.insert("value".to_string(), scalar);
            Value::Map(map)
        }
    }
}

fn pop(stack: &mut Vec<Element>, root: &mut IndexMap<String, Value>) {
    let Some(element) = stack.pop() else { return };
    let tag = element.tag.clone();
    let value = element.into_value();
    match stack.last_mut() {
        Some(parent) => Value::push_entry(&mut parent.children, tag, value),
        None => Value::push_entry(root, tag, value),
    }
}

fn starts_markup(rest: &str) -> bool {
    let mut chars = rest.chars();
    chars.next() == Some('<') && chars.next().is_some_and(|c| c.is_alphabetic() || c == '_')
}

fn skip_through(cur: &mut Cursor, delim: &str) {
    if cur.take_through(delim).is_none() {
        cur.take_until(|_| false);
    }
}

fn is_name_char(c: char) -> bool {
    !(c.is_whitespace() || matches!(c, '/' | '>' | '<' | '=' | '"' | '\''))
}

fn close_tag(cur: &mut Cursor) -> String {
    cur.eat_str("</");
    let name = cur.take_until(|c| c == '>' || c == '<').trim().to_string();
    cur.eat('>');
    name
}

fn open_tag(cur: &mut Cursor) -> ParseResult<(Element, bool)> {
    cur.expect('<', "`<`")?;
    let mut element = Element::new(cur.take_until(|c| !is_name_char(c)).to_string());
    loop {
        cur.skip_ws();
        if cur.eat_str("/>") {
            return Ok((element, true));
        }
        if cur.eat('>') {
            return Ok((element, false));
        }
        let name_at = cur.pos();
        let name = cur.take_until(|c| !is_name_char(c));
        if name.is_empty() {
            return Err(match cur.peek() {
                None => cur.unexpected("`>`"),
                Some(_) => cur.error_at(name_at, ParsingErrorKind::UnexpectedChar { expected: "an attribute or `>`" }),
            });
        }
        cur.skip_ws();
        if !cur.eat('=') {
            // valueless attribute
            element.attrs.insert(name.to_string(), Value::Bool(true));
            continue;
        }
        cur.skip_ws();
        let value = match cur.peek() {
            Some(q @ ('"' | '\'')) => {
                cur.bump();
                let v = cur.take_until(|c| c == q);
                cur.expect(q, "a closing quote")?;
                v
            }
            Some(_) => cur.take_until(|c| c.is_whitespace() || c == '>' || c == '/'),
            None => return Err(cur.unexpected("an attribute value")),
        };
        element.attrs.insert(name.to_string(), coerce_scalar(&decode_entities(value)));
    }
}

/// Predefined and numeric character references; anything else is left as written.
fn decode_entities(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        rest = &rest[amp..];
        let decoded = rest.find(';').and_then(|semi| {
            let entity = &rest[1..semi];
            let c = match entity {
                "lt" => Some('<'),
                "gt" => Some('>'),
                "amp" => Some('&'),
                "quot" => Some('"'),
                "apos" => Some('\''),
                _ => entity
                    .strip_prefix("#x")
                    .or_else(|| entity.strip_prefix("#X"))
                    .map(|hex| u32::from_str_radix(hex, 16))
                    .or_else(|| entity.strip_prefix('#').map(str::parse::<u32>))
                    .and_then(|n| n.ok())
                    .and_then(char::from_u32),
            };
            c.map(|c| (c, semi))
        });
        match decoded {
            Some((c, semi)) => {
                out.push(c);
                rest = &rest[semi + 1..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn v(j: serde_json::Value) -> Value {
        Value::from(j)
    }

    #[test]
    fn nested_tags_become_maps() {
        let text = "<Step><thought>hi</thought><action>search</action></Step>";
        assert_eq!(parse(text).unwrap(), v(json!({"Step": {"thought": "hi", "action": "search"}})));
    }

    #[test]
    fn repeated_siblings_collect_and_scalars_coerce() {
        let text = "Here you go:\n<CoT>\n  <chain_of_thought> first </chain_of_thought>\n  \
                    <chain_of_thought> second </chain_of_thought>\n  <answer> True </answer>\n  \
                    <score>0.75</score>\n  <count>3</count>\n  <note>None</note>\n</CoT>";
        assert_eq!(
            parse(text).unwrap(),
            v(json!({"CoT": {
                "chain_of_thought": ["first", "second"],
                "answer": true,
                "score": 0.75,
                "count": 3,
                "note": null
            }}))
        );
    }

    #[test]
    fn same_tag_at_different_depths_stays_put() {
        let text = "<Plan><name>outer</name><step><name>inner</name></step><name>last</name></Plan>";
        assert_eq!(
            parse(text).unwrap(),
            v(json!({"Plan": {"name": ["outer", "last"], "step": {"name": "inner"}}}))
        );
    }

    #[test]
    fn literal_angle_brackets_and_entities_in_text() {
        let text = "<Cmp><expr>a < b <= c</expr><esc>x &lt; y &amp; z &#65; &bogus;</esc></Cmp>";
        assert_eq!(
            parse(text).unwrap(),
            v(json!({"Cmp": {"expr": "a < b <= c", "esc": "x < y & z A &bogus;"}}))
        );
    }

    #[test]
    fn attributes_merge_into_maps() {
        let text = r#"<Item id="7" kind='tool'><name>saw</name></Item><Tag lang="en">hello</Tag><Flag on/>"#;
        assert_eq!(
            parse(text).unwrap(),
            v(json!({
                "Item": {"id": 7, "kind": "tool", "name": "saw"},
                "Tag": {"lang": "en", "value": "hello"},
                "Flag": {"on": true}
            }))
        );
    }

    #[test]
    fn unclosed_and_stray_tags_are_tolerated() {
        let text = "<!-- reply --><?xml version=\"1.0\"?><Step><thought>ok</extra></thought><action>go</Step>";
        assert_eq!(parse(text).unwrap(), v(json!({"Step": {"thought": "ok", "action": "go"}})));

        let text = "<Step><thought>cut off";
        assert_eq!(parse(text).unwrap(), v(json!({"Step": {"thought": "cut off"}})));
    }

    #[test]
    fn empty_elements_and_cdata() {
        let text = "<Empty></Empty><Raw><![CDATA[<b>&amp;</b>]]></Raw>";
        assert_eq!(parse(text).unwrap(), v(json!({"Empty": {}, "Raw": "<b>&amp;</b>"})));
    }

    #[test]
    fn broken_open_tag_is_an_error() {
        let err = parse("<Step><thought").unwrap_err();
        assert_eq!(err.kind, ParsingErrorKind::UnexpectedEnd);
        assert_eq!(err.position, 14);

        let err = parse("<Step =\"x\">").unwrap_err();
        assert_eq!(err.found, Some('='));
    }

    #[test]
    fn text_without_elements_is_an_error() {
        let prose = "I am sorry, I cannot answer that.";
        let err = parse(prose).unwrap_err();
        assert_eq!(err.kind, ParsingErrorKind::UnexpectedEnd);
        assert_eq!(err.position, prose.len());

        assert_eq!(parse("").unwrap_err().kind, ParsingErrorKind::UnexpectedEnd);
        assert_eq!(parse("so a < b holds").unwrap_err().kind, ParsingErrorKind::UnexpectedEnd);
        assert_eq!(parse("<!-- nothing here -->").unwrap_err().kind, ParsingErrorKind::UnexpectedEnd);
    }

    #[test]
    fn positions_count_the_preamble() {
        let err = parse("Sure:\n<Step><thought").unwrap_err();
        assert_eq!(err.position, 20);
    }
}
