//! Format-selecting facade: templates, grammar and parsing for one
//! configured format, plus the fenced terminal-block policy for responses.
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use crate::config::{Cardinality, CodecConfig, Format};
use crate::error::Result;
use crate::grammar::{self, Grammar};
use crate::parse;
use crate::schema::EntitySchema;
use crate::template::{self, EntityTask, Rendered};
use crate::value::Value;

pub const FENCE: &str = "```";

static LANGUAGE_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9_+-]*[ \t]*\r?\n").expect("static regex"));

/// Parsed response: one value per terminal block.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Parsed {
    One(Value),
    Many(Vec<Value>),
}

impl Parsed {
    pub fn len(&self) -> usize {
        match self {
            Parsed::One(_) => 1,
            Parsed::Many(vs) => vs.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn into_values(self) -> Vec<Value> {
        match self {
            Parsed::One(v) => vec![v],
            Parsed::Many(vs) => vs,
        }
    }

    pub fn first(&self) -> Option<&Value> {
        match self {
            Parsed::One(v) => Some(v),
            Parsed::Many(vs) => vs.first(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Codec {
    config: CodecConfig,
}

impl Codec {
    pub fn new(config: CodecConfig) -> Self {
        Self { config }
    }

    pub fn with_format(format: Format) -> Self {
        Self::new(CodecConfig { format, ..CodecConfig::default() })
    }

    pub fn config(&self) -> CodecConfig {
        self.config
    }

    pub fn format(&self) -> Format {
        self.config.format
    }

    pub fn cardinality(&self) -> Cardinality {
        self.config.cardinality
    }

    pub fn render(&self, tasks: &[EntityTask]) -> Result<Rendered> {
        template::render(self.config.format, tasks, self.config.cardinality)
    }

    pub fn grammar(&self, entity: &EntitySchema) -> Result<Grammar> {
        grammar::compile(entity, self.config.format)
    }

    /// Parse every terminal block of `text`. The first failing block fails
    /// the whole call.
    pub fn parse(&self, text: &str) -> Result<Parsed> {
        let blocks = split_blocks(text);
        tracing::debug!(format = %self.config.format, blocks = blocks.len(), "split response");

        match blocks.as_slice() {
            [] => Ok(Parsed::One(self.parse_block(&text.replace(FENCE, ""))?)),
            [one] => Ok(Parsed::One(self.parse_block(one)?)),
            many => {
                let values = many.iter().map(|b| self.parse_block(b)).collect::<Result<Vec<_>>>()?;
                Ok(Parsed::Many(values))
            }
        }
    }

    pub fn parse_block(&self, block: &str) -> Result<Value> {
        Ok(parse::parse(self.config.format, block)?)
    }
}

/// Content between fence pairs, in encounter order; the whole text when
/// there are no fences. Blocks are trimmed, empty ones dropped.
pub fn split_blocks(text: &str) -> Vec<String> {
    if !text.contains(FENCE) {
        let trimmed = text.trim();
        return if trimmed.is_empty() { Vec::new() } else { vec![trimmed.to_string()] };
    }
    text.split(FENCE)
        .skip(1)
        .step_by(2)
        .map(|block| LANGUAGE_TAG.replace(block, "").trim().to_string())
        .filter(|block| !block.is_empty())
        .collect()
}
