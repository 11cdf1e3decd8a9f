//! Rule accumulation for a single compilation.
use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{CodecError, Result};

static NON_RULE_CHARS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-zA-Z0-9-]+").expect("static regex"));

/// Lower-cased, with every run of characters outside `[a-zA-Z0-9-]` (including `_`) replaced by `-`.
pub fn sanitize(name: &str) -> String {
    NON_RULE_CHARS.replace_all(name, "-").to_lowercase()
}

/// True when `fragment` is a bare reference to a rule, not a composite expansion.
pub fn is_rule_ref(fragment: &str) -> bool {
    !fragment.is_empty()
        && fragment
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}

/// Quoted grammar literal matching `text` exactly.
pub fn literal(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('"');
    for c in text.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

/// Named rules in first-definition order. Never shared between compilations.
#[derive(Debug, Clone)]
pub struct RuleSet {
    rules: IndexMap<String, String>,
}

impl RuleSet {
    pub fn new() -> Self {
        let mut rules = IndexMap::new();
        rules.insert("ws".to_string(), r"[ \t\n]*".to_string());
        Self { rules }
    }

    /// Adds `name ::= expansion` and returns the sanitized name.
    ///
    /// Re-adding an identical definition is a no-op; a different expansion
    /// under an existing name is a [`CodecError::GrammarConflict`].
    pub fn add(&mut self, name: &str, expansion: impl Into<String>) -> Result<String> {
        let name = sanitize(name);
        let expansion = expansion.into();
        match self.rules.get(&name) {
            Some(existing) if *existing == expansion => Ok(name),
            Some(existing) => Err(CodecError::GrammarConflict {
                rule: name,
                existing: existing.clone(),
                attempted: expansion,
            }),
            None => {
                tracing::trace!(rule = %name, "grammar rule added");
                self.rules.insert(name.clone(), expansion);
                Ok(name)
            }
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.rules.contains_key(&sanitize(name))
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn into_inner(self) -> IndexMap<String, String> {
        self.rules
    }
}

impl Default for RuleSet {
    fn default() -> Self {
        Self::new()
    }
}
