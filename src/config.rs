use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CodecError;

/// Target text format of the model response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    #[default]
    Json,
    Toml,
    Xml,
}

/// Whether the model must return one of the requested entities or all of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Cardinality {
    #[default]
    Single,
    Multiple,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CodecConfig {
    #[serde(default)]
    pub format: Format,
    #[serde(default)]
    pub cardinality: Cardinality,
}

impl CodecConfig {
    pub fn new(format: Format, cardinality: Cardinality) -> Self {
        Self { format, cardinality }
    }
}

impl Format {
    pub fn as_str(&self) -> &'static str {
        match self {
            Format::Json => "json",
            Format::Toml => "toml",
            Format::Xml => "xml",
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Format {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Format::Json),
            "toml" => Ok(Format::Toml),
            "xml" => Ok(Format::Xml),
            other => Err(CodecError::Config(format!(
                "serialization type must be one of 'json', 'toml', 'xml', got '{other}'"
            ))),
        }
    }
}

impl FromStr for Cardinality {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "single" | "single_response" => Ok(Cardinality::Single),
            "multiple" | "multi_response" => Ok(Cardinality::Multiple),
            other => Err(CodecError::Config(format!(
                "return cardinality must be one of 'single', 'multiple', got '{other}'"
            ))),
        }
    }
}
