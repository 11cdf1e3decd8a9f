//! Schema → context-free grammar, one rule per line (`name ::= expansion`),
//! specialized to each format's literal syntax.
//!
//! The compiler walks the JSON Schema view of an entity. Definitions are
//! compiled before the root so every reference resolves; the root entity
//! gets the synthetic `root` rule plus its own rule on the first two lines.
pub mod builder;
pub mod check;

use std::fmt;

use serde_json::{Map, Value};

use crate::config::Format;
use crate::error::{CodecError, Result};
use crate::schema::{extract, json_schema, EntitySchema};
use crate::template;

pub use builder::{literal, sanitize, RuleSet};
pub use check::{check, GrammarDiagnostics};

const NEWLINE: &str = r#""\n""#;

// ------------------------------- Base rules -------------------------------- //

const BOOLEAN: &str = r#"("true" | "false")"#;
const INTEGER: &str = r#"("-"? ([0-9] | [1-9] [0-9]*))"#;
const NUMBER: &str = r#"("-"? ([0-9] | [1-9] [0-9]*)) ("." [0-9]+)? ([eE] [-+]? [0-9]+)?"#;
const QUOTED_STRING: &str = r#""\"" ([^"\\] | "\\" (["\\/bfnrt] | "u" [0-9a-fA-F] [0-9a-fA-F] [0-9a-fA-F] [0-9a-fA-F]))* "\"""#;
const XML_TEXT: &str = r"[^<]*";
const NULL: &str = r#""null""#;
const SCALAR: &str = "string | number | boolean | null";
const KEY: &str = r"[a-zA-Z_] [a-zA-Z0-9_-]*";

/// Rule names the compiler defines itself; entities never take them.
const RESERVED: &[&str] = &["root", "ws", "boolean", "integer", "number", "string", "null", "scalar", "key", "object"];

/// Compiled grammar; immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grammar {
    /// `(name, expansion)` in output order, `root` first.
    rules: Vec<(String, String)>,
}

impl Grammar {
    pub fn rules(&self) -> impl Iterator<Item = (&str, &str)> {
        self.rules.iter().map(|(n, e)| (n.as_str(), e.as_str()))
    }

    pub fn rule(&self, name: &str) -> Option<&str> {
        self.rules().find(|(n, _)| *n == name).map(|(_, e)| e)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn text(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Grammar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let lines: Vec<String> = self.rules.iter().map(|(n, e)| format!("{n} ::= {e}")).collect();
        f.write_str(&lines.join("\n"))
    }
}

/// Rejects undefined references and reference cycles before compiling.
pub fn compile(entity: &EntitySchema, format: Format) -> Result<Grammar> {
    extract(std::slice::from_ref(entity))?;
    compile_schema(&json_schema::emit(entity), format)
}

/// Compile a raw JSON Schema document (pydantic dialect).
pub fn compile_schema(schema: &Value, format: Format) -> Result<Grammar> {
    let title = schema.get("title").and_then(Value::as_str).unwrap_or("Root");
    let defs = schema
        .get("definitions")
        .or_else(|| schema.get("$defs"))
        .and_then(Value::as_object);
    let mut compiler = Compiler { format, rules: RuleSet::new(), defs };

    if let Some(defs) = defs {
        for (name, def) in defs {
            compiler.definition(name, def)?;
        }
    }
    let expansion = compiler.object(title, schema, Form::Root)?;
    let entity = compiler.rules.add(&entity_rule(title), expansion)?;

    let mut rules = compiler.rules.into_inner();
    let entity_rule = rules.shift_remove(&entity).unwrap_or_default();
    let mut ordered = vec![
        ("root".to_string(), format!("{entity} ws")),
        (entity, entity_rule),
    ];
    ordered.extend(rules);

    tracing::debug!(%format, entity = title, rules = ordered.len(), "compiled grammar");
    Ok(Grammar { rules: ordered })
}

// ------------------------------- Compiler --------------------------------- //

/// How an object schema is spelled at its use site.
#[derive(Clone, Copy, PartialEq)]
enum Form {
    /// The top-level entity, or a TOML section.
    Root,
    /// A value nested inside another value (TOML inline table).
    Inline,
}

struct Compiler<'s> {
    format: Format,
    rules: RuleSet,
    defs: Option<&'s Map<String, Value>>,
}

impl<'s> Compiler<'s> {
    fn definition(&mut self, name: &str, def: &Value) -> Result<()> {
        if def.get("enum").is_some() {
            self.value(&entity_rule(name), def)?;
            return Ok(());
        }
        let expansion = self.object(name, def, Form::Root)?;
        self.rules.add(&entity_rule(name), expansion)?;
        if self.format == Format::Toml {
            let inline = self.object(name, def, Form::Inline)?;
            self.rules.add(&inline_name(name), inline)?;
        }
        Ok(())
    }

    /// Grammar fragment for `schema`; `name` names any rule it has to create.
    fn value(&mut self, name: &str, schema: &Value) -> Result<String> {
        if let Some(pattern) = schema.get("pattern").and_then(Value::as_str) {
            match self.pattern_fragment(pattern) {
                Ok(()) => return self.rules.add(name, pattern),
                Err(reason) => {
                    tracing::warn!(rule = %sanitize(name), %pattern, %reason, "ignoring pattern that is not a grammar expansion");
                }
            }
        }
        if let Some(c) = schema.get("const") {
            return Ok(self.literal_value(c));
        }
        if let Some(reference) = schema.get("$ref").and_then(Value::as_str) {
            return Ok(self.reference(reference));
        }
        if let Some([single]) = schema.get("allOf").and_then(Value::as_array).map(Vec::as_slice) {
            return self.value(name, single);
        }
        if let Some(members) = schema
            .get("anyOf")
            .or_else(|| schema.get("oneOf"))
            .and_then(Value::as_array)
        {
            let mut alts = Vec::with_capacity(members.len());
            for (i, member) in members.iter().enumerate() {
                alts.push(self.value(&format!("{name}-{i}"), member)?);
            }
            return self.rules.add(name, alts.join(" | "));
        }
        if let Some(values) = schema.get("enum").and_then(Value::as_array) {
            let alts: Vec<String> = values.iter().map(|v| self.literal_value(v)).collect();
            return self.rules.add(name, alts.join(" | "));
        }

        match schema.get("type") {
            Some(Value::String(t)) => self.typed(name, t, schema),
            Some(Value::Array(ts)) => {
                let mut alts = Vec::with_capacity(ts.len());
                for t in ts {
                    let t = t.as_str().ok_or_else(|| unresolved(name))?;
                    alts.push(self.typed(name, t, schema)?);
                }
                self.rules.add(name, alts.join(" | "))
            }
            _ => Err(unresolved(name)),
        }
    }

    /// A pattern is spliced in verbatim, so it must already be grammar syntax
    /// over literals, classes and rules defined so far. Regex dialects fail here.
    fn pattern_fragment(&self, pattern: &str) -> std::result::Result<(), String> {
        if pattern.trim().is_empty() {
            return Err("empty expansion".to_string());
        }
        let refs = check::tokenize(pattern)?;
        match refs.iter().find(|r| !self.rules.contains(r) || sanitize(r) != **r) {
            Some(r) => Err(format!("unknown rule `{r}`")),
            None => Ok(()),
        }
    }

    fn typed(&mut self, name: &str, t: &str, schema: &Value) -> Result<String> {
        match t {
            "object" if schema.get("properties").is_some() => {
                let expansion = self.object(name, schema, Form::Inline)?;
                self.rules.add(name, expansion)
            }
            "object" => self.generic_object(),
            "array" => {
                let elem = self.array_item(name, schema)?;
                self.rules.add(&format!("{elem}-list"), list_of(&elem))
            }
            "boolean" | "integer" | "number" | "string" | "null" => self.base(t),
            other => Err(CodecError::schema(name, format!("unsupported type `{other}`"))),
        }
    }

    fn base(&mut self, t: &str) -> Result<String> {
        let expansion = match (t, self.format) {
            ("boolean", _) => BOOLEAN,
            ("integer", _) => INTEGER,
            ("number", _) => NUMBER,
            ("string", Format::Xml) => XML_TEXT,
            ("string", _) => QUOTED_STRING,
            ("null", _) => NULL,
            (other, _) => return Err(unresolved(other)),
        };
        self.rules.add(t, expansion)
    }

    fn scalar(&mut self) -> Result<String> {
        for t in ["string", "number", "boolean", "null"] {
            self.base(t)?;
        }
        self.rules.add("scalar", SCALAR)
    }

    /// Free-form map of scalars.
    fn generic_object(&mut self) -> Result<String> {
        let scalar = self.scalar()?;
        let expansion = match self.format {
            Format::Json => {
                let pair = format!("string ws \":\" ws {scalar}");
                format!("\"{{\" ws ({pair} (\",\" ws {pair})*)? ws \"}}\"")
            }
            Format::Toml => {
                self.rules.add("key", KEY)?;
                let pair = format!("key \" = \" {scalar}");
                format!("\"{{\" ws ({pair} (\",\" ws {pair})*)? ws \"}}\"")
            }
            Format::Xml => {
                self.rules.add("key", KEY)?;
                format!("(\"<\" key \">\" ws {scalar} ws \"</\" key \">\" ws)*")
            }
        };
        self.rules.add("object", expansion)
    }

    /// Rule name for an array's element type.
    fn array_item(&mut self, name: &str, schema: &Value) -> Result<String> {
        match schema.get("items") {
            Some(items) if !items.as_object().is_some_and(Map::is_empty) => {
                let item_name = format!("{name}-item");
                let fragment = self.value(&item_name, items)?;
                if builder::is_rule_ref(&fragment) {
                    Ok(fragment)
                } else {
                    self.rules.add(&item_name, fragment)
                }
            }
            _ => self.scalar(),
        }
    }

    fn object(&mut self, entity: &str, schema: &Value, form: Form) -> Result<String> {
        let empty = Map::new();
        let props = schema.get("properties").and_then(Value::as_object).unwrap_or(&empty);

        match self.format {
            Format::Json => {
                let mut parts = Vec::with_capacity(props.len());
                for (prop, ps) in props {
                    let v = self.value(&format!("{entity}-{prop}"), ps)?;
                    parts.push(format!("{} ws \":\" ws {v}", literal(&format!("\"{prop}\""))));
                }
                Ok(if parts.is_empty() {
                    r#""{" ws "}""#.to_string()
                } else {
                    format!("\"{{\" ws {} ws \"}}\"", parts.join(r#" "," ws "#))
                })
            }
            Format::Xml => {
                let mut parts = Vec::with_capacity(props.len());
                for (prop, ps) in props {
                    let open = literal(&format!("<{prop}>"));
                    let close = literal(&format!("</{prop}>"));
                    if is_array(ps) {
                        // repeated sibling tags, one per element
                        let elem = self.array_item(&format!("{entity}-{prop}"), ps)?;
                        parts.push(format!("({open} ws {elem} ws {close} ws)*"));
                    } else {
                        let v = self.value(&format!("{entity}-{prop}"), ps)?;
                        parts.push(format!("{open} ws {v} ws {close}"));
                    }
                }
                let mut seq = vec![literal(&format!("<{entity}>"))];
                seq.extend(parts);
                seq.push(literal(&format!("</{entity}>")));
                Ok(seq.join(" ws "))
            }
            Format::Toml if form == Form::Root => {
                let mut pairs = Vec::new();
                let mut tables = Vec::new();
                for (prop, ps) in props {
                    match self.entity_reference(ps) {
                        // sub-tables go last so later keys don't land in them
                        Some(target) => tables.push(entity_rule(target)),
                        None => {
                            let v = self.value(&format!("{entity}-{prop}"), ps)?;
                            pairs.push(format!("{} {v}", literal(&format!("{prop} = "))));
                        }
                    }
                }
                let mut seq = vec![literal(&format!("[{entity}]"))];
                seq.extend(pairs);
                seq.extend(tables);
                Ok(seq.join(&format!(" {NEWLINE} ")))
            }
            Format::Toml => {
                let mut pairs = Vec::with_capacity(props.len());
                for (prop, ps) in props {
                    let v = self.value(&format!("{entity}-{prop}"), ps)?;
                    pairs.push(format!("{} {v}", literal(&format!("{prop} = "))));
                }
                Ok(if pairs.is_empty() {
                    r#""{" ws "}""#.to_string()
                } else {
                    format!("\"{{\" ws {} ws \"}}\"", pairs.join(r#" "," ws "#))
                })
            }
        }
    }

    /// Name of the object definition `schema` points at, if any.
    fn entity_reference<'v>(&self, schema: &'v Value) -> Option<&'v str> {
        let reference = match schema.get("allOf").and_then(Value::as_array).map(Vec::as_slice) {
            Some([single]) => single.get("$ref"),
            _ => schema.get("$ref"),
        }?;
        let name = ref_name(reference.as_str()?);
        (!self.is_enum_definition(name)).then_some(name)
    }

    fn reference(&self, reference: &str) -> String {
        let name = ref_name(reference);
        if self.format == Format::Toml && !self.is_enum_definition(name) {
            inline_name(name)
        } else {
            entity_rule(name)
        }
    }

    fn is_enum_definition(&self, name: &str) -> bool {
        self.defs
            .and_then(|d| d.get(name))
            .is_some_and(|d| d.get("enum").is_some())
    }

    fn literal_value(&self, v: &Value) -> String {
        match self.format {
            Format::Xml => literal(&template::plain(v)),
            Format::Toml => literal(&template::toml::literal(v)),
            Format::Json => literal(&v.to_string()),
        }
    }
}

fn list_of(elem: &str) -> String {
    format!(r#""[" ws ({elem} ("," ws {elem})*)? ws "]""#)
}

fn is_array(schema: &Value) -> bool {
    schema.get("type").and_then(Value::as_str) == Some("array")
        && schema.get("pattern").is_none()
        && schema.get("const").is_none()
}

fn ref_name(reference: &str) -> &str {
    reference.rsplit('/').next().unwrap_or(reference)
}

/// Rule name of an entity or definition, suffixed when it would shadow a built-in rule.
fn entity_rule(name: &str) -> String {
    let rule = sanitize(name);
    if RESERVED.contains(&rule.as_str()) { format!("{rule}-entity") } else { rule }
}

fn inline_name(name: &str) -> String {
    format!("{}-inline", sanitize(name))
}

fn unresolved(name: &str) -> CodecError {
    CodecError::schema(name, "cannot resolve a grammar type")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FieldDescriptor as F, FieldType};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn step() -> EntitySchema {
        EntitySchema::new("AgentStep")
            .field(F::new("thought", FieldType::String))
            .field(F::new("action", FieldType::String))
            .field(F::new("action_input", FieldType::String))
    }

    #[test]
    fn json_grammar_for_flat_entity() {
        let g = compile(&step(), Format::Json).unwrap();
        let text = g.text();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "root ::= agentstep ws");
        assert_eq!(
            lines[1],
            r#"agentstep ::= "{" ws "\"thought\"" ws ":" ws string "," ws "\"action\"" ws ":" ws string "," ws "\"action_input\"" ws ":" ws string ws "}""#
        );
        assert_eq!(lines[2], r"ws ::= [ \t\n]*");
        assert_eq!(g.rule("string"), Some(QUOTED_STRING));
        assert_eq!(lines.len(), 4);
        check(&text).unwrap();
    }

    #[test]
    fn compiling_twice_is_byte_identical() {
        let entity = EntitySchema::new("Plan")
            .field(F::new("steps", FieldType::array(FieldType::entity("Step"))))
            .field(F::new("risk", FieldType::one_of(["low", "high"])))
            .define(EntitySchema::new("Step").field(F::new("n", FieldType::Integer)));
        for format in [Format::Json, Format::Toml, Format::Xml] {
            let a = compile(&entity, format).unwrap().text();
            let b = compile(&entity, format).unwrap().text();
            assert_eq!(a, b);
            check(&a).unwrap();
        }
    }

    #[test]
    fn arrays_share_their_element_rule() {
        let entity = EntitySchema::new("Tags")
            .field(F::new("a", FieldType::array(FieldType::String)))
            .field(F::new("b", FieldType::array(FieldType::String)));
        let g = compile(&entity, Format::Json).unwrap();
        assert_eq!(
            g.rule("string-list"),
            Some(r#""[" ws (string ("," ws string)*)? ws "]""#)
        );
        assert_eq!(g.rules().filter(|(n, _)| n.ends_with("-list")).count(), 1);
    }

    #[test]
    fn enums_unions_patterns_and_constants() {
        let entity = EntitySchema::new("Move")
            .field(F::new("dir", FieldType::one_of(["up", "down"])))
            .field(F::new("n", FieldType::union([FieldType::Integer, FieldType::Null])))
            .field(F::new("code", FieldType::String).pattern(r#"[A-Z] [0-9]"#))
            .field(F::new("kind", FieldType::String).bind("move"));
        let g = compile(&entity, Format::Json).unwrap();
        assert_eq!(g.rule("move-dir"), Some(r#""\"up\"" | "\"down\"""#));
        assert_eq!(g.rule("move-n"), Some("integer | null"));
        assert_eq!(g.rule("move-code"), Some("[A-Z] [0-9]"));
        assert!(g.rule("move").unwrap().contains(r#""\"kind\"" ws ":" ws "\"move\"""#));
        check(&g.text()).unwrap();
    }

    #[test]
    fn regex_patterns_fall_back_to_the_field_type() {
        let schema = json!({
            "title": "Doc",
            "type": "object",
            "properties": {
                "slug": {"type": "string", "pattern": "^[a-z]+$"},
                "id": {"type": "string", "pattern": "\\d{3}"},
                "ok": {"type": "string", "pattern": "[a-z]+"}
            }
        });
        let entity = json_schema::read(&schema).unwrap();
        for g in [compile_schema(&schema, Format::Json).unwrap(), compile(&entity, Format::Json).unwrap()] {
            assert_eq!(g.rule("doc-slug"), None);
            assert_eq!(g.rule("doc-id"), None);
            assert_eq!(g.rule("doc-ok"), Some("[a-z]+"));
            assert!(g.rule("doc").unwrap().contains(r#""\"slug\"" ws ":" ws string"#));
            check(&g.text()).unwrap();
        }
    }

    #[test]
    fn toml_sub_tables_drop_the_key_prefix() {
        let entity = EntitySchema::new("Route")
            .field(F::new("stop", FieldType::entity("Stop")))
            .field(F::new("name", FieldType::String))
            .define(EntitySchema::new("Stop").field(F::new("at", FieldType::Integer)));
        let g = compile(&entity, Format::Toml).unwrap();
        assert_eq!(
            g.rule("route"),
            Some(r#""[Route]" "\n" "name = " string "\n" stop"#)
        );
        assert_eq!(g.rule("stop"), Some(r#""[Stop]" "\n" "at = " integer"#));
        assert_eq!(g.rule("stop-inline"), Some(r#""{" ws "at = " integer ws "}""#));
        check(&g.text()).unwrap();
    }

    #[test]
    fn xml_arrays_repeat_the_field_tag() {
        let entity = EntitySchema::new("CoT")
            .field(F::new("chain_of_thought", FieldType::array(FieldType::String)))
            .field(F::new("answer", FieldType::Boolean));
        let g = compile(&entity, Format::Xml).unwrap();
        assert_eq!(
            g.rule("cot"),
            Some(
                r#""<CoT>" ws ("<chain_of_thought>" ws string ws "</chain_of_thought>" ws)* ws "<answer>" ws boolean ws "</answer>" ws "</CoT>""#
            )
        );
        assert_eq!(g.rule("string"), Some(XML_TEXT));
    }

    #[test]
    fn conflicting_rule_names_are_errors() {
        // the `Mode_kind` definition and the `kind` property both claim `mode-kind`
        let schema = json!({
            "title": "Mode",
            "properties": { "kind": { "enum": ["a"] } },
            "definitions": { "Mode_kind": { "enum": ["z"] } }
        });
        let err = compile_schema(&schema, Format::Json).unwrap_err();
        assert!(matches!(err, CodecError::GrammarConflict { .. }), "{err}");
    }

    #[test]
    fn cyclic_entities_are_rejected() {
        let entity = EntitySchema::new("Node")
            .field(F::new("next", FieldType::entity("Link")))
            .define(EntitySchema::new("Link").field(F::new("to", FieldType::entity("Node"))));
        assert!(matches!(compile(&entity, Format::Json), Err(CodecError::Schema { .. })));
    }

    #[test]
    fn entities_named_like_built_in_rules_get_their_own_rule() {
        let entity = EntitySchema::new("Root").field(F::new("n", FieldType::Integer));
        for format in [Format::Json, Format::Toml, Format::Xml] {
            let g = compile(&entity, format).unwrap();
            assert_eq!(g.rule("root"), Some("root-entity ws"), "{format}");
            check(&g.text()).unwrap();
        }

        let untitled = json!({"type": "object", "properties": {"n": {"type": "integer"}}});
        let g = compile_schema(&untitled, Format::Json).unwrap();
        assert_eq!(g.rule("root"), Some("root-entity ws"));
        check(&g.text()).unwrap();

        let entity = EntitySchema::new("String")
            .field(F::new("text", FieldType::String))
            .field(F::new("key", FieldType::entity("Key")))
            .define(EntitySchema::new("Key").field(F::new("id", FieldType::Integer)));
        for format in [Format::Json, Format::Toml, Format::Xml] {
            let g = compile(&entity, format).unwrap();
            assert_eq!(g.rule("root"), Some("string-entity ws"), "{format}");
            assert!(g.rule("key-entity").is_some(), "{format}");
            check(&g.text()).unwrap();
        }
    }

    #[test]
    fn unknown_types_are_schema_errors() {
        let schema = json!({ "title": "T", "properties": { "d": { "type": "date" } } });
        assert!(matches!(
            compile_schema(&schema, Format::Json),
            Err(CodecError::Schema { .. })
        ));
    }

    #[test]
    fn free_form_objects_use_scalar_pairs() {
        let entity = EntitySchema::new("Meta").field(F::new("extra", FieldType::Object));
        for format in [Format::Json, Format::Toml, Format::Xml] {
            let g = compile(&entity, format).unwrap();
            assert!(g.rule("object").is_some(), "{format}");
            assert_eq!(g.rule("scalar"), Some(SCALAR));
            check(&g.text()).unwrap();
        }
    }
}
