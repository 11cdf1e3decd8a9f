//! CLI: schema files → (template | grammar | schema), responses → parsed JSON
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use rayon::prelude::*;

use crate::codec::{Codec, Parsed};
use crate::config::{Cardinality, CodecConfig, Format};
use crate::grammar;
use crate::path_de::from_str_with_path;
use crate::schema::{json_schema, EntitySchema};
use crate::template::EntityTask;

// ————————————————————————————————————————————————————————————————————————————
// TYPES
// ————————————————————————————————————————————————————————————————————————————

/// derive LLM prompt templates and decoding grammars from entity schemas, and parse responses back
#[derive(Parser, Debug)]
#[command(name = "schema-codec", version)]
pub struct CommandLineInterface {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// render the fill-in template with its response instructions
    Template(TemplateOut),
    /// compile a decoding grammar for one root entity
    Grammar(GrammarOut),
    /// parse model responses into JSON
    Parse(ParseOut),
    /// print the JSON Schema view of the input entities
    Schema(SchemaOut),
}

#[derive(Args, Debug, Clone)]
struct SchemaSettings {
    /// inputs are JSON Schema documents rather than native entity files
    #[arg(long, default_value_t = false)]
    json_schema: bool,

    /// One or more schema files. May be literal paths or quoted glob patterns
    #[arg(long, short, num_args = 1.., required = true)]
    input: Vec<String>,
}

#[derive(clap::Parser, Debug)]
struct TemplateOut {
    #[command(flatten)]
    schema_settings: SchemaSettings,

    #[arg(long, value_enum, default_value_t)]
    format: Format,

    #[arg(long, value_enum, default_value_t)]
    cardinality: Cardinality,

    /// render all inputs as one task instead of one task per input
    #[arg(long)]
    group: bool,

    /// query text used as the task label
    #[arg(long)]
    query: Option<String>,

    /// heading printed before each task block
    #[arg(long)]
    description: Option<String>,

    /// output file (stdout if omitted)
    #[arg(short, long)]
    out: Option<PathBuf>,
}

#[derive(clap::Parser, Debug)]
struct GrammarOut {
    #[command(flatten)]
    schema_settings: SchemaSettings,

    #[arg(long, value_enum, default_value_t)]
    format: Format,

    /// lint the compiled grammar and fail on any problem
    #[arg(long)]
    check: bool,

    /// output .gbnf file (stdout if omitted)
    #[arg(short, long)]
    out: Option<PathBuf>,
}

#[derive(clap::Parser, Debug)]
struct ParseOut {
    /// One or more response files. May be literal paths or quoted glob patterns
    #[arg(long, short, num_args = 1.., required = true)]
    input: Vec<String>,

    #[arg(long, value_enum, default_value_t)]
    format: Format,

    #[arg(long, value_enum, default_value_t)]
    cardinality: Cardinality,

    /// output .json file (stdout if omitted)
    #[arg(short, long)]
    out: Option<PathBuf>,
}

#[derive(clap::Parser, Debug)]
struct SchemaOut {
    #[command(flatten)]
    schema_settings: SchemaSettings,

    /// output .json file (stdout if omitted)
    #[arg(short, long)]
    out: Option<PathBuf>,
}

// ————————————————————————————————————————————————————————————————————————————
// IMPLEMENTATION
// ————————————————————————————————————————————————————————————————————————————

impl SchemaSettings {
    fn load(&self) -> anyhow::Result<Vec<EntitySchema>> {
        let source_paths = resolve_file_path_patterns(&self.input)?;
        let mut entities = Vec::with_capacity(source_paths.len());
        for source_path in source_paths {
            let source = std::fs::read_to_string(&source_path)
                .with_context(|| format!("failed to read schema file {}", source_path.display()))?;
            let entity = if self.json_schema {
                let document = from_str_with_path::<serde_json::Value>(&source)
                    .with_context(|| format!("invalid JSON in {}", source_path.display()))?;
                json_schema::read(&document)
                    .with_context(|| format!("unsupported JSON Schema in {}", source_path.display()))?
            } else {
                from_str_with_path::<EntitySchema>(&source)
                    .with_context(|| format!("invalid entity file {}", source_path.display()))?
            };
            tracing::debug!(path = %source_path.display(), entity = %entity.name, "loaded schema");
            entities.push(entity);
        }
        Ok(entities)
    }
}

impl CommandLineInterface {
    pub fn load() -> Self {
        Self::parse()
    }

    pub fn run(&self) -> anyhow::Result<()> {
        match &self.cmd {
            Command::Template(target) => {
                let entities = target.schema_settings.load()?;
                let tasks: Vec<EntityTask> = if target.group {
                    vec![EntityTask::group(entities)]
                } else {
                    entities.into_iter().map(EntityTask::single).collect()
                };
                let tasks: Vec<EntityTask> = tasks
                    .into_iter()
                    .map(|mut task| {
                        task.query = target.query.clone();
                        task.description = target.description.clone();
                        task
                    })
                    .collect();
                let codec = Codec::new(CodecConfig::new(target.format, target.cardinality));
                let rendered = codec.render(&tasks)?;
                write_output(target.out.as_deref(), &rendered.section())
            }
            Command::Grammar(target) => {
                let entities = target.schema_settings.load()?;
                let [entity] = entities.as_slice() else {
                    bail!("grammar compiles exactly one root entity, got {}", entities.len());
                };
                let grammar = Codec::new(CodecConfig::new(target.format, Cardinality::Single)).grammar(entity)?;
                let text = grammar.text();
                if target.check {
                    grammar::check(&text)?;
                    eprintln!("{} {} rules", "grammar ok:".green(), grammar.len());
                }
                write_output(target.out.as_deref(), &text)
            }
            Command::Parse(target) => {
                let source_paths = resolve_file_path_patterns(&target.input)?;
                let codec = Codec::new(CodecConfig::new(target.format, target.cardinality));
                let results: Vec<(PathBuf, anyhow::Result<Parsed>)> = source_paths
                    .into_par_iter()
                    .map(|source_path| {
                        let parsed = parse_file(&codec, &source_path);
                        (source_path, parsed)
                    })
                    .collect();

                let mut outputs = serde_json::Map::new();
                let mut failures = 0usize;
                for (source_path, parsed) in &results {
                    match parsed {
                        Ok(parsed) => {
                            let key = source_path.to_string_lossy().to_string();
                            outputs.insert(key, serde_json::to_value(parsed)?);
                        }
                        Err(error) => {
                            failures += 1;
                            eprintln!("{} {error:#}", "failed:".red());
                        }
                    }
                }
                if failures > 0 {
                    bail!("{failures} of {} responses failed to parse", results.len());
                }
                let output = match outputs.len() {
                    1 => outputs.into_iter().map(|(_, v)| v).next().unwrap_or_default(),
                    _ => serde_json::Value::Object(outputs),
                };
                write_output(target.out.as_deref(), &serde_json::to_string_pretty(&output)?)
            }
            Command::Schema(target) => {
                let entities = target.schema_settings.load()?;
                let schemas: Vec<serde_json::Value> = entities.iter().map(json_schema::emit).collect();
                let schema_src = match schemas.as_slice() {
                    [one] => serde_json::to_string_pretty(one)?,
                    _ => serde_json::to_string_pretty(&schemas)?,
                };
                write_output(target.out.as_deref(), &schema_src)
            }
        }
    }
}

// ————————————————————————————————————————————————————————————————————————————
// INTERNAL HELPERS
// ————————————————————————————————————————————————————————————————————————————

fn parse_file(codec: &Codec, source_path: &Path) -> anyhow::Result<Parsed> {
    let source = std::fs::read_to_string(source_path)
        .with_context(|| format!("failed to read response file {}", source_path.display()))?;
    codec
        .parse(&source)
        .with_context(|| format!("failed to parse {}", source_path.display()))
}

fn write_output(out: Option<&Path>, contents: &str) -> anyhow::Result<()> {
    match out {
        Some(out) => {
            if let Some(parent) = out.parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create {}", parent.display()))?;
            }
            std::fs::write(out, contents).with_context(|| format!("failed to write {}", out.display()))
        }
        None => {
            println!("{contents}");
            Ok(())
        }
    }
}

fn resolve_file_path_patterns<I>(patterns: I) -> anyhow::Result<Vec<PathBuf>>
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    fn has_glob_chars(s: &str) -> bool {
        // Minimal glob detection for the `glob` crate syntax.
        s.bytes().any(|b| matches!(b, b'*' | b'?' | b'[' | b'{'))
    }

    let mut out = Vec::<PathBuf>::new();

    for raw in patterns {
        let pattern = raw.as_ref();

        if has_glob_chars(pattern) {
            let mut matched_any = false;
            for entry in glob::glob(pattern).with_context(|| format!("invalid glob pattern: {pattern}"))? {
                out.push(entry?);
                matched_any = true;
            }
            if !matched_any {
                // Pattern was explicitly a glob but matched nothing -> surface as an error
                bail!("glob pattern matched no files: {pattern}");
            }
        } else {
            out.push(PathBuf::from(pattern));
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subcommands_parse() {
        let cli = CommandLineInterface::try_parse_from([
            "schema-codec", "grammar", "--format", "toml", "--check", "-i", "step.json",
        ])
        .unwrap();
        match cli.cmd {
            Command::Grammar(g) => {
                assert_eq!(g.format, Format::Toml);
                assert!(g.check);
                assert_eq!(g.schema_settings.input, vec!["step.json"]);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn literal_paths_pass_through_and_empty_globs_fail() {
        let paths = resolve_file_path_patterns(["a/b.json"]).unwrap();
        assert_eq!(paths, vec![PathBuf::from("a/b.json")]);
        assert!(resolve_file_path_patterns(["/definitely/not/here/*.json"]).is_err());
    }
}
