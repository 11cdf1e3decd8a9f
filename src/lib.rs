//! Schema-driven codec for language-model responses.
//!
//! One [`EntitySchema`] yields a fill-in template for the prompt, a grammar
//! for constrained decoding, and (via the schema-agnostic parsers) a
//! [`Value`] tree back out of the model's reply, in JSON-, TOML- or
//! XML-like syntax.
pub mod cli;
pub mod codec;
pub mod config;
pub mod error;
pub mod grammar;
pub mod parse;
pub mod path_de;
pub mod schema;
pub mod template;
pub mod value;

pub use codec::{split_blocks, Codec, Parsed};
pub use config::{Cardinality, CodecConfig, Format};
pub use error::{CodecError, ParsingError, ParsingErrorKind, Result};
pub use grammar::{compile, compile_schema, Grammar};
pub use schema::{Entity, EntitySchema, FieldDescriptor, FieldType, TypeTag};
pub use template::{render, render_entity, EntityTask, Rendered};
pub use value::Value;
