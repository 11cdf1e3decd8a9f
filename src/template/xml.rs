use indexmap::IndexMap;
use serde_json::Value;

use super::plain;
use crate::schema::FieldDescriptor;

/// `<Entity>` wrappers around one `<field> ... </field>` line per field.
pub(super) fn fields_block(tables: &[(&str, &IndexMap<String, FieldDescriptor>)]) -> String {
    let mut lines = Vec::new();
    for (name, fields) in tables {
        lines.push(format!("<{name}>"));
        for field in fields.values() {
            match &field.bound_value {
                Some(value) => bound_lines(&field.name, value, &mut lines),
                None => lines.push(comment_line(field)),
            }
        }
        lines.push(format!("</{name}>\n"));
    }
    lines.join("\n")
}

fn comment_line(field: &FieldDescriptor) -> String {
    let name = &field.name;
    let mut line = format!("<{name}> #{}# </{name}>", field.ty);
    if let Some(d) = &field.description {
        line.push_str(&format!(" # {d}"));
    }
    if let Some(d) = field.shown_default() {
        line.push_str(&format!(" # Default: \"{}\"", plain(d)));
    }
    line
}

/// Sequences repeat the tag, an empty one is an empty element; maps nest one tag per key.
fn bound_lines(tag: &str, value: &Value, lines: &mut Vec<String>) {
    match value {
        Value::Array(xs) if xs.is_empty() => lines.push(format!("<{tag}></{tag}>")),
        Value::Array(xs) => {
            for x in xs {
                bound_lines(tag, x, lines);
            }
        }
        Value::Object(m) => {
            lines.push(format!("<{tag}>"));
            for (k, v) in m {
                bound_lines(k, v, lines);
            }
            lines.push(format!("</{tag}>"));
        }
        other => lines.push(format!("<{tag}> {} </{tag}>", escape(&plain(other)))),
    }
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}
