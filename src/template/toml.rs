use indexmap::IndexMap;
use serde_json::Value;

use crate::schema::FieldDescriptor;

/// `[<Entity>]` headers followed by `<field> = ...` lines.
pub(super) fn fields_block(tables: &[(&str, &IndexMap<String, FieldDescriptor>)]) -> String {
    let mut lines = Vec::new();
    for (name, fields) in tables {
        lines.push(format!("[{name}]"));
        lines.extend(fields.values().map(field_line));
    }
    lines.join("\n")
}

fn field_line(field: &FieldDescriptor) -> String {
    let mut line = format!("{} = ", field.name);
    match &field.bound_value {
        Some(value) => line.push_str(&literal(value)),
        None => {
            line.push_str(&format!("# Type: {}", field.ty));
            if let Some(d) = &field.description {
                line.push_str(&format!(", {d}"));
            }
            if !field.required {
                line.push_str(", Optional");
            }
            if let Some(d) = field.shown_default() {
                line.push_str(&format!(", Default: {}", literal(d)));
            }
        }
    }
    line
}

/// TOML-like literal. `null` has no TOML spelling; the parser reads the bare word back.
pub(crate) fn literal(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        // JSON string escaping is a subset of TOML basic-string escaping
        Value::String(_) => value.to_string(),
        Value::Array(xs) => {
            let items: Vec<String> = xs.iter().map(literal).collect();
            format!("[{}]", items.join(", "))
        }
        Value::Object(m) => {
            let pairs: Vec<String> = m.iter().map(|(k, v)| format!("{k} = {}", literal(v))).collect();
            format!("{{{}}}", pairs.join(", "))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{EntitySchema, FieldDescriptor as F, FieldType};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn comments_use_comma_separators_and_quote_string_defaults() {
        let e = EntitySchema::new("Houses")
            .field(F::new("h1", FieldType::Integer).describe("first house"))
            .field(F::new("owner", FieldType::String).default_value("nobody"))
            .field(F::new("floors", FieldType::Integer).default_value(2));
        let out = fields_block(&[(e.name.as_str(), &e.fields)]);
        assert_eq!(
            out,
            "[Houses]\nh1 = # Type: integer, first house\n\
             owner = # Type: string, Optional, Default: \"nobody\"\n\
             floors = # Type: integer, Optional, Default: 2"
        );
    }

    #[test]
    fn bound_literals_cover_containers() {
        assert_eq!(literal(&json!([1, "a", true])), "[1, \"a\", true]");
        assert_eq!(literal(&json!({"k": "v", "n": 1.5})), "{k = \"v\", n = 1.5}");
        assert_eq!(literal(&json!("say \"hi\"")), "\"say \\\"hi\\\"\"");
    }

    #[test]
    fn empty_entity_is_a_bare_header() {
        let e = EntitySchema::new("Nothing");
        assert_eq!(fields_block(&[(e.name.as_str(), &e.fields)]), "[Nothing]");
    }
}
