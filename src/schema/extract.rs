use indexmap::IndexMap;

use super::{EntitySchema, FieldDescriptor, FieldType};
use crate::error::{CodecError, Result};

/// Field tables for a set of entities and everything they reference.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Extraction {
    /// Top-level entities first (in request order), then referenced
    /// entities in discovery order.
    pub fields_by_entity: IndexMap<String, IndexMap<String, FieldDescriptor>>,
    pub has_nested: bool,
}

#[derive(Clone, Copy, PartialEq)]
enum Mark {
    Visiting,
    Done,
}

pub fn extract(entities: &[EntitySchema]) -> Result<Extraction> {
    let mut out = Extraction::default();
    for entity in entities {
        for field in entity.fields.values() {
            check_type(&entity.name, field)?;
        }
        out.fields_by_entity.insert(entity.name.clone(), entity.fields.clone());
    }

    for entity in entities {
        let mut marks: IndexMap<&str, Mark> = IndexMap::new();
        let mut order: Vec<&EntitySchema> = Vec::new();
        visit(entity, entity, &mut marks, &mut order)?;

        // `order` is post-order; the root comes last and is already recorded.
        for nested in order.iter().rev().filter(|e| e.name != entity.name) {
            out.has_nested = true;
            if !out.fields_by_entity.contains_key(&nested.name) {
                for field in nested.fields.values() {
                    check_type(&nested.name, field)?;
                }
                out.fields_by_entity.insert(nested.name.clone(), nested.fields.clone());
            }
        }
    }

    tracing::debug!(
        entities = out.fields_by_entity.len(),
        has_nested = out.has_nested,
        "extracted field tables"
    );
    Ok(out)
}

fn visit<'a>(
    root: &'a EntitySchema,
    current: &'a EntitySchema,
    marks: &mut IndexMap<&'a str, Mark>,
    order: &mut Vec<&'a EntitySchema>,
) -> Result<()> {
    match marks.get(current.name.as_str()) {
        Some(Mark::Done) => return Ok(()),
        Some(Mark::Visiting) => {
            let path: Vec<&str> = marks
                .iter()
                .filter(|(_, m)| **m == Mark::Visiting)
                .map(|(n, _)| *n)
                .collect();
            return Err(CodecError::schema(
                &root.name,
                format!("reference cycle through `{}` ({})", current.name, path.join(" -> ")),
            ));
        }
        None => {}
    }
    marks.insert(current.name.as_str(), Mark::Visiting);

    for field in current.fields.values() {
        for name in field.ty.references() {
            let target = root.definition(name).or_else(|| (name == root.name).then_some(root));
            let Some(target) = target else {
                return Err(CodecError::schema(
                    &current.name,
                    format!("field `{}` references undefined entity `{name}`", field.name),
                ));
            };
            visit(root, target, marks, order)?;
        }
    }

    marks.insert(current.name.as_str(), Mark::Done);
    order.push(current);
    Ok(())
}

fn check_type(entity: &str, field: &FieldDescriptor) -> Result<()> {
    fn walk(entity: &str, field: &str, ty: &FieldType) -> Result<()> {
        match ty {
            FieldType::Enum { values } if values.is_empty() => Err(CodecError::schema(
                entity,
                format!("field `{field}` is an enum without values"),
            )),
            FieldType::Union { members } if members.is_empty() => Err(CodecError::schema(
                entity,
                format!("field `{field}` is a union without members"),
            )),
            FieldType::Union { members } => members.iter().try_for_each(|m| walk(entity, field, m)),
            FieldType::Array { items } => walk(entity, field, items),
            _ => Ok(()),
        }
    }
    walk(entity, &field.name, &field.ty)
}
