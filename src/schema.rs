//! Entity schemas: the single declaration both the prompt templates and the
//! grammar compiler are derived from.
//!
//! An [`EntitySchema`] is a named, ordered table of [`FieldDescriptor`]s plus
//! the flat set of entity definitions its fields refer to. Types implement
//! [`Entity`] to describe themselves; instances bind concrete values through
//! [`Entity::bound_schema`].
pub mod extract;
pub mod json_schema;

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{CodecError, Result};

pub use extract::{extract, Extraction};

// ————————————————————————————————————————————————————————————————————————————
// TYPES
// ————————————————————————————————————————————————————————————————————————————

/// Flat classification of a field type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeTag {
    Boolean,
    Integer,
    Number,
    String,
    Null,
    Array,
    Object,
    Enum,
    Union,
    Reference,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum FieldType {
    Boolean,
    Integer,
    Number,
    String,
    Null,
    Array { items: Box<FieldType> },
    /// Free-form string-keyed map.
    Object,
    Enum { values: Vec<serde_json::Value> },
    Union { members: Vec<FieldType> },
    /// Reference to another entity, by name.
    Entity { name: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    #[serde(skip)]
    pub name: String,
    #[serde(flatten)]
    pub ty: FieldType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// `None` is "unset"; `Some(Null)` is an explicit null default.
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub default: Option<serde_json::Value>,
    #[serde(default = "yes")]
    pub required: bool,
    /// Set when rendering from an instance; overrides type-driven rendering.
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub bound_value: Option<serde_json::Value>,
    /// Literal grammar expansion replacing the type's normal expansion.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "EntitySchemaFile")]
pub struct EntitySchema {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Insertion order is rendering order.
    pub fields: IndexMap<String, FieldDescriptor>,
    /// Flat set of entities referenced (transitively) from `fields`.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub definitions: Vec<EntitySchema>,
}

/// On-disk shape; field names live in the map keys only.
#[derive(Deserialize)]
struct EntitySchemaFile {
    name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    fields: IndexMap<String, FieldDescriptor>,
    #[serde(default)]
    definitions: Vec<EntitySchema>,
}

/// A type that can describe its own response shape.
pub trait Entity {
    fn entity_schema() -> EntitySchema;

    /// Schema with every field bound to this instance's serialized value.
    fn bound_schema(&self) -> Result<EntitySchema>
    where
        Self: Serialize + Sized,
    {
        let mut schema = Self::entity_schema();
        schema.bind(serde_json::to_value(self)?)?;
        Ok(schema)
    }
}

// ————————————————————————————————————————————————————————————————————————————
// IMPLEMENTATION
// ————————————————————————————————————————————————————————————————————————————

impl FieldType {
    pub fn tag(&self) -> TypeTag {
        match self {
            FieldType::Boolean => TypeTag::Boolean,
            FieldType::Integer => TypeTag::Integer,
            FieldType::Number => TypeTag::Number,
            FieldType::String => TypeTag::String,
            FieldType::Null => TypeTag::Null,
            FieldType::Array { .. } => TypeTag::Array,
            FieldType::Object => TypeTag::Object,
            FieldType::Enum { .. } => TypeTag::Enum,
            FieldType::Union { .. } => TypeTag::Union,
            FieldType::Entity { .. } => TypeTag::Reference,
        }
    }

    pub fn array(items: FieldType) -> Self {
        FieldType::Array { items: Box::new(items) }
    }

    pub fn entity(name: impl Into<String>) -> Self {
        FieldType::Entity { name: name.into() }
    }

    pub fn union(members: impl IntoIterator<Item = FieldType>) -> Self {
        FieldType::Union { members: members.into_iter().collect() }
    }

    pub fn one_of<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<serde_json::Value>,
    {
        FieldType::Enum { values: values.into_iter().map(Into::into).collect() }
    }

    /// Every entity name this type mentions, in order.
    pub fn references(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_references(&mut out);
        out
    }

    fn collect_references<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            FieldType::Entity { name } => out.push(name),
            FieldType::Array { items } => items.collect_references(out),
            FieldType::Union { members } => {
                for m in members {
                    m.collect_references(out);
                }
            }
            _ => {}
        }
    }
}

/// Display name used in the fill-in templates.
impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::Boolean => f.write_str("boolean"),
            FieldType::Integer => f.write_str("integer"),
            FieldType::Number => f.write_str("number"),
            FieldType::String => f.write_str("string"),
            FieldType::Null => f.write_str("null"),
            FieldType::Object => f.write_str("object"),
            FieldType::Array { items } => write!(f, "List[{items}]"),
            FieldType::Entity { name } => f.write_str(name),
            FieldType::Union { members } => {
                let names: Vec<String> = members.iter().map(ToString::to_string).collect();
                f.write_str(&names.join(" OR "))
            }
            FieldType::Enum { values } => {
                let names: Vec<String> = values.iter().map(ToString::to_string).collect();
                f.write_str(&names.join(" OR "))
            }
        }
    }
}

impl FieldDescriptor {
    pub fn new(name: impl Into<String>, ty: FieldType) -> Self {
        Self {
            name: name.into(),
            ty,
            description: None,
            default: None,
            required: true,
            bound_value: None,
            pattern: None,
        }
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// A default implies the field may be omitted.
    pub fn default_value(mut self, default: impl Into<serde_json::Value>) -> Self {
        self.default = Some(default.into());
        self.required = false;
        self
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    pub fn bind(mut self, value: impl Into<serde_json::Value>) -> Self {
        self.bound_value = Some(value.into());
        self
    }

    pub fn pattern(mut self, expansion: impl Into<String>) -> Self {
        self.pattern = Some(expansion.into());
        self
    }

    /// Default worth showing in a template: set and not null.
    pub fn shown_default(&self) -> Option<&serde_json::Value> {
        self.default.as_ref().filter(|v| !v.is_null())
    }
}

impl EntitySchema {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            fields: IndexMap::new(),
            definitions: Vec::new(),
        }
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn field(mut self, field: FieldDescriptor) -> Self {
        self.fields.insert(field.name.clone(), field);
        self
    }

    /// Register a referenced entity. Its own definitions are hoisted so the
    /// set stays flat, as in JSON Schema `definitions`.
    pub fn define(mut self, mut entity: EntitySchema) -> Self {
        let nested = std::mem::take(&mut entity.definitions);
        for def in std::iter::once(entity).chain(nested) {
            if !self.definitions.iter().any(|d| d.name == def.name) {
                self.definitions.push(def);
            }
        }
        self
    }

    pub fn definition(&self, name: &str) -> Option<&EntitySchema> {
        self.definitions.iter().find(|d| d.name == name)
    }

    pub fn has_references(&self) -> bool {
        self.fields.values().any(|f| !f.ty.references().is_empty())
    }

    /// Bind an instance: every key of `values` that names a field becomes
    /// that field's bound value.
    pub fn bind(&mut self, values: serde_json::Value) -> Result<()> {
        let serde_json::Value::Object(map) = values else {
            return Err(CodecError::schema(&self.name, "bound instance must serialize to an object"));
        };
        for (key, value) in map {
            match self.fields.get_mut(&key) {
                Some(field) => field.bound_value = Some(value),
                None => {
                    return Err(CodecError::schema(&self.name, format!("bound value for unknown field `{key}`")));
                }
            }
        }
        Ok(())
    }
}

impl From<EntitySchemaFile> for EntitySchema {
    fn from(file: EntitySchemaFile) -> Self {
        let fields = file
            .fields
            .into_iter()
            .map(|(name, mut field)| {
                field.name = name.clone();
                (name, field)
            })
            .collect();
        let mut schema = EntitySchema {
            name: file.name,
            description: file.description,
            fields,
            definitions: Vec::new(),
        };
        for def in file.definitions {
            schema = schema.define(def);
        }
        schema
    }
}

// ————————————————————————————————————————————————————————————————————————————
// INTERNAL HELPERS
// ————————————————————————————————————————————————————————————————————————————

// Distinguishes an explicit `null` from an absent key.
fn present<'de, D>(de: D) -> std::result::Result<Option<serde_json::Value>, D::Error>
where
    D: Deserializer<'de>,
{
    serde_json::Value::deserialize(de).map(Some)
}

fn yes() -> bool {
    true
}
