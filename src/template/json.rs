use indexmap::IndexMap;

use super::plain;
use crate::schema::FieldDescriptor;

/// `{ "<Entity>": { "<field>": ..., ... }, ... }` with one line per field.
pub(super) fn fields_block(tables: &[(&str, &IndexMap<String, FieldDescriptor>)]) -> String {
    let mut lines = vec!["{".to_string()];
    let entities: Vec<String> = tables
        .iter()
        .map(|(name, fields)| entity_block(name, fields))
        .collect();
    lines.push(entities.join(",\n"));
    lines.push("}".to_string());
    lines.retain(|l| !l.is_empty());
    lines.join("\n")
}

fn entity_block(name: &str, fields: &IndexMap<String, FieldDescriptor>) -> String {
    let mut lines = vec![format!("\"{name}\": {{")];
    let rendered: Vec<String> = fields.values().map(field_line).collect();
    if !rendered.is_empty() {
        lines.push(rendered.join(",\n"));
    }
    lines.push("    }".to_string());
    lines.join("\n")
}

fn field_line(field: &FieldDescriptor) -> String {
    let mut line = format!("\"{}\": ", field.name);
    match &field.bound_value {
        Some(value) => line.push_str(&value.to_string()),
        None => {
            line.push_str(&format!("# Type: {}", field.ty));
            if let Some(d) = &field.description {
                line.push_str(&format!(" | {d}"));
            }
            if !field.required {
                line.push_str(" | Optional");
            }
            if let Some(d) = field.shown_default() {
                line.push_str(&format!(" | Default: \"{}\"", plain(d)));
            }
        }
    }
    line
}
