//! Human-readable "fill this in" templates, one dialect per format.
//!
//! Each task renders as a fenced block for its top-level entities, followed
//! (when fields reference other entities) by a second fenced block describing
//! every referenced entity, so the model reads the root shape first.
pub mod json;
pub mod toml;
pub mod xml;

use indexmap::IndexMap;

use crate::config::{Cardinality, Format};
use crate::error::{CodecError, Result};
use crate::schema::{extract, EntitySchema, FieldDescriptor};

pub const NESTED_INTRO: &str = "Use the data types given below to fill in the above model";

/// Field tables keyed by entity name, in rendering order.
pub type FieldTables<'a> = Vec<(&'a str, &'a IndexMap<String, FieldDescriptor>)>;

/// One unit of the response the model is asked for.
#[derive(Debug, Clone, Default)]
pub struct EntityTask {
    pub entities: Vec<EntitySchema>,
    /// Free-text question; replaces the entity names as the task label.
    pub query: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Rendered {
    pub body: String,
    pub labels: Vec<String>,
    pub instruction: String,
    pub reminder: String,
}

impl EntityTask {
    pub fn single(entity: EntitySchema) -> Self {
        Self { entities: vec![entity], ..Self::default() }
    }

    pub fn group(entities: Vec<EntitySchema>) -> Self {
        Self { entities, ..Self::default() }
    }

    pub fn query(query: impl Into<String>) -> Self {
        Self { query: Some(query.into()), ..Self::default() }
    }

    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Undecorated label: query text, joined group names, or the entity name.
    pub fn label(&self) -> Result<String> {
        if let Some(q) = &self.query {
            return Ok(format!("For query: '{q}'"));
        }
        match self.entities.as_slice() {
            [] => Err(CodecError::Config("task has neither entities nor a query".into())),
            [one] => Ok(one.name.clone()),
            many => Ok(many.iter().map(|e| e.name.as_str()).collect::<Vec<_>>().join("_")),
        }
    }
}

impl Rendered {
    /// Instruction, body and reminder as one prompt section.
    pub fn section(&self) -> String {
        format!("{}\n\n{}{}", self.instruction, self.body, self.reminder)
    }
}

pub fn render(format: Format, tasks: &[EntityTask], cardinality: Cardinality) -> Result<Rendered> {
    if tasks.is_empty() {
        return Err(CodecError::Config("you need to provide at least one task to render".into()));
    }

    let mut body = String::new();
    let mut labels = Vec::with_capacity(tasks.len());
    for task in tasks {
        let label = task.label()?;
        body.push_str(&render_task(format, task, &label)?);
        labels.push(decorate(format, &label));
    }

    let (instruction, reminder) = instructions(format, &labels, cardinality);
    tracing::debug!(%format, tasks = tasks.len(), "rendered templates");
    Ok(Rendered { body, labels, instruction, reminder })
}

/// Template block for one entity, without fences. With every field bound
/// this is literal text the matching parser reads back.
pub fn render_entity(format: Format, entity: &EntitySchema) -> String {
    let tables: FieldTables = vec![(entity.name.as_str(), &entity.fields)];
    fields_block(format, &tables)
}

fn render_task(format: Format, task: &EntityTask, label: &str) -> Result<String> {
    let extraction = extract(&task.entities)?;
    let (roots, nested): (FieldTables, FieldTables) = extraction
        .fields_by_entity
        .iter()
        .map(|(name, fields)| (name.as_str(), fields))
        .partition(|(name, _)| task.entities.iter().any(|e| e.name == *name));

    let mut out = String::new();
    let heading = match format {
        Format::Xml => Some(task.description.as_deref().unwrap_or(label)),
        Format::Json | Format::Toml => task.description.as_deref(),
    };
    if let Some(heading) = heading {
        out.push_str(&format!("{heading}:\n"));
    }
    out.push_str(&format!("```\n{}\n```\n", fields_block(format, &roots)));

    if extraction.has_nested && !nested.is_empty() {
        out.push_str(&format!("{NESTED_INTRO}\n```\n"));
        for table in &nested {
            out.push_str(&fields_block(format, std::slice::from_ref(table)));
            out.push('\n');
        }
        out.push_str("```\n");
    }
    Ok(out)
}

fn fields_block(format: Format, tables: &[(&str, &IndexMap<String, FieldDescriptor>)]) -> String {
    match format {
        Format::Json => json::fields_block(tables),
        Format::Toml => toml::fields_block(tables),
        Format::Xml => xml::fields_block(tables),
    }
}

fn decorate(format: Format, label: &str) -> String {
    match format {
        Format::Json => format!("\"{label}\""),
        Format::Toml => format!("[{label}]"),
        Format::Xml => label.to_string(),
    }
}

fn instructions(format: Format, labels: &[String], cardinality: Cardinality) -> (String, String) {
    let fmt = format.as_str().to_uppercase();
    let response_type = match cardinality {
        Cardinality::Single => "ONLY",
        Cardinality::Multiple => "ALL OF",
    };
    if labels.len() > 1 {
        (
            format!("Here are the {fmt} output formats you are expected to return your responses in."),
            format!(
                "\nRETURN {response_type} {}. DO NOT FORGET TO COVER YOUR OUTPUTS WITH '```'",
                labels.join(", ")
            ),
        )
    } else {
        (
            format!("Here is the {fmt} output format you are expected to return your response in."),
            format!(
                "\nRETURN {response_type} ONE OF {}. DO NOT FORGET TO COVER YOUR OUTPUTS WITH '```'.",
                labels.join(", ")
            ),
        )
    }
}

/// Default as shown in templates: strings bare, everything else as JSON text.
pub(crate) fn plain(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FieldDescriptor as F, FieldType};
    use pretty_assertions::assert_eq;

    fn step() -> EntitySchema {
        EntitySchema::new("AgentStep")
            .field(F::new("thought", FieldType::String).describe("Your thought."))
            .field(F::new("action", FieldType::String))
    }

    fn nested() -> EntitySchema {
        EntitySchema::new("Route")
            .field(F::new("stop", FieldType::entity("Stop")))
            .define(EntitySchema::new("Stop").field(F::new("name", FieldType::String)))
    }

    #[test]
    fn labels_follow_task_kind() {
        assert_eq!(EntityTask::single(step()).label().unwrap(), "AgentStep");
        assert_eq!(
            EntityTask::group(vec![step(), nested()]).label().unwrap(),
            "AgentStep_Route"
        );
        assert_eq!(
            EntityTask::single(step()).with_query("who?").label().unwrap(),
            "For query: 'who?'"
        );
        assert!(EntityTask::default().label().is_err());
    }

    #[test]
    fn single_label_uses_one_of_reminder() {
        let r = render(Format::Json, &[EntityTask::single(step())], Cardinality::Single).unwrap();
        assert_eq!(r.labels, ["\"AgentStep\""]);
        assert_eq!(
            r.instruction,
            "Here is the JSON output format you are expected to return your response in."
        );
        assert_eq!(
            r.reminder,
            "\nRETURN ONLY ONE OF \"AgentStep\". DO NOT FORGET TO COVER YOUR OUTPUTS WITH '```'."
        );
        assert!(r.section().starts_with("Here is the JSON"));
    }

    #[test]
    fn several_labels_use_plural_instruction() {
        let tasks = [EntityTask::single(step()), EntityTask::single(nested())];
        let r = render(Format::Toml, &tasks, Cardinality::Multiple).unwrap();
        assert_eq!(r.labels, ["[AgentStep]", "[Route]"]);
        assert!(r.instruction.starts_with("Here are the TOML output formats"));
        assert!(r.reminder.contains("RETURN ALL OF [AgentStep], [Route]."));
    }

    #[test]
    fn nested_entities_render_in_a_second_block() {
        let r = render(Format::Json, &[EntityTask::single(nested())], Cardinality::Single).unwrap();
        let root_at = r.body.find("\"Route\": {").unwrap();
        let intro_at = r.body.find(NESTED_INTRO).unwrap();
        let stop_at = r.body.find("\"Stop\": {").unwrap();
        assert!(root_at < intro_at && intro_at < stop_at, "{}", r.body);
        // the nested entity must not appear in the root block
        assert_eq!(r.body.matches("\"Stop\": {").count(), 1);
    }

    #[test]
    fn xml_heading_prefers_description() {
        let task = EntityTask::single(step()).with_description("Next step");
        let r = render(Format::Xml, &[task], Cardinality::Single).unwrap();
        assert!(r.body.starts_with("Next step:\n```\n<AgentStep>"), "{}", r.body);
        assert_eq!(r.labels, ["AgentStep"]);
    }

    #[test]
    fn empty_task_list_is_config_error() {
        assert!(matches!(
            render(Format::Json, &[], Cardinality::Single),
            Err(CodecError::Config(_))
        ));
    }
}
