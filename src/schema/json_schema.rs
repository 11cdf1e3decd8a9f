//! JSON Schema view of an [`EntitySchema`], in the pydantic
//! `title/type/properties/required/definitions` dialect.
//!
//! `emit` is what the grammar compiler walks; `read` lets callers hand in
//! schemas produced elsewhere.
use indexmap::IndexMap;
use serde_json::{json, Map, Value};

use super::{EntitySchema, FieldDescriptor, FieldType};
use crate::error::{CodecError, Result};

// ------------------------------- Emission --------------------------------- //

pub fn emit(entity: &EntitySchema) -> Value {
    let mut o = emit_object(entity);
    if !entity.definitions.is_empty() {
        let defs: Map<String, Value> = entity
            .definitions
            .iter()
            .map(|d| (d.name.clone(), emit_object(d)))
            .collect();
        o["definitions"] = Value::Object(defs);
    }
    o
}

fn emit_object(entity: &EntitySchema) -> Value {
    let mut props = Map::new();
    let mut required: Vec<Value> = Vec::new();
    for (name, field) in &entity.fields {
        props.insert(name.clone(), emit_field(field));
        if field.required {
            required.push(Value::from(name.as_str()));
        }
    }
    let mut o = json!({ "title": entity.name, "type": "object", "properties": props });
    if let Some(d) = &entity.description {
        o["description"] = Value::from(d.as_str());
    }
    if !required.is_empty() {
        o["required"] = Value::Array(required);
    }
    o
}

fn emit_field(field: &FieldDescriptor) -> Value {
    let mut o = emit_type(&field.ty);
    if let Some(d) = &field.description {
        o["description"] = Value::from(d.as_str());
    }
    if let Some(d) = &field.default {
        o["default"] = d.clone();
    }
    if let Some(p) = &field.pattern {
        o["pattern"] = Value::from(p.as_str());
    }
    if let Some(v) = &field.bound_value {
        o["const"] = v.clone();
    }
    o
}

fn emit_type(ty: &FieldType) -> Value {
    match ty {
        FieldType::Boolean => json!({ "type": "boolean" }),
        FieldType::Integer => json!({ "type": "integer" }),
        FieldType::Number => json!({ "type": "number" }),
        FieldType::String => json!({ "type": "string" }),
        FieldType::Null => json!({ "type": "null" }),
        FieldType::Object => json!({ "type": "object" }),
        FieldType::Array { items } => json!({ "type": "array", "items": emit_type(items) }),
        FieldType::Enum { values } => json!({ "enum": values }),
        FieldType::Union { members } => {
            json!({ "anyOf": members.iter().map(emit_type).collect::<Vec<_>>() })
        }
        FieldType::Entity { name } => json!({ "$ref": format!("#/definitions/{name}") }),
    }
}

// ------------------------------- Reading ---------------------------------- //

pub fn read(schema: &Value) -> Result<EntitySchema> {
    let title = schema.get("title").and_then(Value::as_str).unwrap_or("Root");
    let mut reader = Reader::default();

    let defs = schema
        .get("definitions")
        .or_else(|| schema.get("$defs"))
        .and_then(Value::as_object);
    if let Some(defs) = defs {
        // enum definitions are inlined, so collect them before any object
        for (name, def) in defs {
            if let Some(values) = def.get("enum").and_then(Value::as_array) {
                reader.enums.insert(name.clone(), values.clone());
            }
        }
        for (name, def) in defs {
            if !reader.enums.contains_key(name) {
                let entity = reader.read_object(name, def)?;
                reader.definitions.push(entity);
            }
        }
    }

    let root = reader.read_object(title, schema)?;
    Ok(reader.definitions.into_iter().fold(root, EntitySchema::define))
}

#[derive(Default)]
struct Reader {
    enums: IndexMap<String, Vec<Value>>,
    definitions: Vec<EntitySchema>,
}

impl Reader {
    fn read_object(&mut self, name: &str, schema: &Value) -> Result<EntitySchema> {
        let mut entity = EntitySchema::new(name);
        entity.description = schema.get("description").and_then(Value::as_str).map(String::from);

        let required: Vec<&str> = schema
            .get("required")
            .and_then(Value::as_array)
            .map(|xs| xs.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default();

        let Some(props) = schema.get("properties").and_then(Value::as_object) else {
            return Ok(entity);
        };
        for (prop, prop_schema) in props {
            let ty = self.read_type(name, prop, prop_schema)?;
            let mut field = FieldDescriptor::new(prop.as_str(), ty);
            field.required = required.contains(&prop.as_str());
            field.description = prop_schema.get("description").and_then(Value::as_str).map(String::from);
            field.default = prop_schema.get("default").cloned();
            field.pattern = prop_schema.get("pattern").and_then(Value::as_str).map(String::from);
            field.bound_value = prop_schema.get("const").cloned();
            entity = entity.field(field);
        }
        Ok(entity)
    }

    fn read_type(&mut self, entity: &str, prop: &str, schema: &Value) -> Result<FieldType> {
        if let Some(reference) = schema.get("$ref").and_then(Value::as_str) {
            let name = reference.rsplit('/').next().unwrap_or(reference);
            if let Some(values) = self.enums.get(name) {
                return Ok(FieldType::Enum { values: values.clone() });
            }
            return Ok(FieldType::entity(name));
        }
        if let Some([single]) = schema.get("allOf").and_then(Value::as_array).map(Vec::as_slice) {
            return self.read_type(entity, prop, single);
        }
        if let Some(members) = schema
            .get("anyOf")
            .or_else(|| schema.get("oneOf"))
            .and_then(Value::as_array)
        {
            let members = members
                .iter()
                .map(|m| self.read_type(entity, prop, m))
                .collect::<Result<Vec<_>>>()?;
            return Ok(FieldType::Union { members });
        }
        if let Some(values) = schema.get("enum").and_then(Value::as_array) {
            return Ok(FieldType::Enum { values: values.clone() });
        }

        match schema.get("type") {
            Some(Value::String(t)) => self.read_named_type(entity, prop, t, schema),
            Some(Value::Array(ts)) => {
                let members = ts
                    .iter()
                    .map(|t| match t.as_str() {
                        Some(t) => self.read_named_type(entity, prop, t, schema),
                        None => Err(unresolved(entity, prop)),
                    })
                    .collect::<Result<Vec<_>>>()?;
                Ok(FieldType::Union { members })
            }
            _ => match schema.get("const") {
                Some(c) => Ok(literal_type(c)),
                None => Err(unresolved(entity, prop)),
            },
        }
    }

    fn read_named_type(&mut self, entity: &str, prop: &str, t: &str, schema: &Value) -> Result<FieldType> {
        Ok(match t {
            "boolean" => FieldType::Boolean,
            "integer" => FieldType::Integer,
            "number" => FieldType::Number,
            "string" => FieldType::String,
            "null" => FieldType::Null,
            "array" => match schema.get("items") {
                Some(items) if !items.as_object().is_some_and(Map::is_empty) => {
                    FieldType::array(self.read_type(entity, prop, items)?)
                }
                _ => FieldType::array(FieldType::union([
                    FieldType::String,
                    FieldType::Number,
                    FieldType::Boolean,
                    FieldType::Null,
                ])),
            },
            "object" if schema.get("properties").is_some() => {
                // inline object: lift it into a named definition
                let name = schema
                    .get("title")
                    .and_then(Value::as_str)
                    .map(String::from)
                    .unwrap_or_else(|| format!("{entity}_{prop}"));
                let nested = self.read_object(&name, schema)?;
                self.definitions.push(nested);
                FieldType::entity(name)
            }
            "object" => FieldType::Object,
            _ => return Err(CodecError::schema(entity, format!("field `{prop}` has unsupported type `{t}`"))),
        })
    }
}

fn literal_type(v: &Value) -> FieldType {
    match v {
        Value::Bool(_) => FieldType::Boolean,
        Value::Number(n) if n.is_i64() || n.is_u64() => FieldType::Integer,
        Value::Number(_) => FieldType::Number,
        Value::String(_) => FieldType::String,
        Value::Array(_) => FieldType::array(FieldType::String),
        Value::Object(_) => FieldType::Object,
        Value::Null => FieldType::Null,
    }
}

fn unresolved(entity: &str, prop: &str) -> CodecError {
    CodecError::schema(entity, format!("cannot resolve a type for field `{prop}`"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::FieldDescriptor as F;
    use pretty_assertions::assert_eq;

    fn cot() -> EntitySchema {
        EntitySchema::new("CoT")
            .field(
                F::new("chain_of_thought", FieldType::array(FieldType::String))
                    .describe("Think out loud."),
            )
            .field(F::new("answer", FieldType::Boolean).describe("Options: True OR False."))
    }

    #[test]
    fn emits_pydantic_style_object() {
        let schema = emit(&cot());
        assert_eq!(
            schema,
            json!({
                "title": "CoT",
                "type": "object",
                "properties": {
                    "chain_of_thought": {
                        "type": "array",
                        "items": { "type": "string" },
                        "description": "Think out loud."
                    },
                    "answer": { "type": "boolean", "description": "Options: True OR False." }
                },
                "required": ["chain_of_thought", "answer"]
            })
        );
    }

    #[test]
    fn emit_then_read_preserves_the_schema() {
        let entity = EntitySchema::new("Plan")
            .field(F::new("steps", FieldType::array(FieldType::entity("Step"))))
            .field(F::new("risk", FieldType::one_of(["low", "high"])).default_value("low"))
            .field(F::new("note", FieldType::union([FieldType::String, FieldType::Null])).optional())
            .define(EntitySchema::new("Step").field(F::new("id", FieldType::Integer).bind(3)));
        let back = read(&emit(&entity)).unwrap();
        assert_eq!(back, entity);
    }

    #[test]
    fn reads_defs_refs_and_enum_definitions() {
        let schema = json!({
            "title": "Order",
            "type": "object",
            "properties": {
                "status": { "$ref": "#/$defs/Status" },
                "item": { "allOf": [{ "$ref": "#/$defs/Item" }], "description": "what" },
                "qty": { "type": ["integer", "null"], "default": null },
                "tags": { "type": "array" }
            },
            "required": ["status", "item"],
            "$defs": {
                "Status": { "enum": ["open", "closed"] },
                "Item": { "title": "Item", "type": "object", "properties": { "sku": { "type": "string" } } }
            }
        });
        let entity = read(&schema).unwrap();
        assert_eq!(entity.fields["status"].ty, FieldType::one_of(["open", "closed"]));
        assert_eq!(entity.fields["item"].ty, FieldType::entity("Item"));
        assert_eq!(entity.fields["item"].description.as_deref(), Some("what"));
        assert_eq!(entity.fields["qty"].ty, FieldType::union([FieldType::Integer, FieldType::Null]));
        assert_eq!(entity.fields["qty"].default, Some(Value::Null));
        assert!(!entity.fields["qty"].required);
        assert!(matches!(entity.fields["tags"].ty, FieldType::Array { .. }));
        assert_eq!(entity.definitions.len(), 1);
    }

    #[test]
    fn inline_objects_become_definitions() {
        let schema = json!({
            "title": "Outer",
            "properties": { "inner": { "type": "object", "properties": { "x": { "type": "number" } } } }
        });
        let entity = read(&schema).unwrap();
        assert_eq!(entity.fields["inner"].ty, FieldType::entity("Outer_inner"));
        assert!(entity.definition("Outer_inner").is_some());
    }

    #[test]
    fn unknown_type_is_schema_error() {
        let schema = json!({ "title": "Bad", "properties": { "x": { "type": "date" } } });
        assert!(matches!(read(&schema), Err(CodecError::Schema { .. })));
        let schema = json!({ "title": "Bad", "properties": { "x": { "description": "?" } } });
        assert!(matches!(read(&schema), Err(CodecError::Schema { .. })));
    }
}
