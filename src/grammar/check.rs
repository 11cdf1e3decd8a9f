//! Structural lint for grammar text: every line a well-formed rule, every
//! reference defined, a `root` present.
use std::collections::HashSet;
use std::fmt;

use indexmap::IndexMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrammarDiagnostics(pub Vec<String>);

impl std::error::Error for GrammarDiagnostics {}

impl fmt::Display for GrammarDiagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} grammar problem(s)", self.0.len())?;
        for d in &self.0 {
            write!(f, "\n  - {d}")?;
        }
        Ok(())
    }
}

pub fn check(text: &str) -> Result<(), GrammarDiagnostics> {
    let mut problems = Vec::new();
    let mut defined: IndexMap<&str, usize> = IndexMap::new();
    let mut referenced: Vec<(usize, String)> = Vec::new();

    for (i, line) in text.lines().enumerate() {
        let lineno = i + 1;
        if line.trim().is_empty() {
            continue;
        }
        let Some((name, expansion)) = line.split_once("::=") else {
            problems.push(format!("line {lineno}: missing `::=`"));
            continue;
        };
        let name = name.trim();
        if name.is_empty() || !name.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-') {
            problems.push(format!("line {lineno}: invalid rule name `{name}`"));
        }
        if let Some(first) = defined.insert(name, lineno) {
            problems.push(format!("line {lineno}: `{name}` already defined on line {first}"));
        }
        match tokenize(expansion) {
            Ok(refs) => referenced.extend(refs.into_iter().map(|r| (lineno, r))),
            Err(e) => problems.push(format!("line {lineno}: {e}")),
        }
    }

    let mut reported = HashSet::new();
    for (lineno, r) in referenced {
        if !defined.contains_key(r.as_str()) && reported.insert(r.clone()) {
            problems.push(format!("line {lineno}: undefined rule `{r}`"));
        }
    }
    if !defined.contains_key("root") {
        problems.push("no `root` rule".to_string());
    }

    if problems.is_empty() { Ok(()) } else { Err(GrammarDiagnostics(problems)) }
}

/// Rule names referenced by one expansion.
pub(crate) fn tokenize(expansion: &str) -> Result<Vec<String>, String> {
    let mut refs = Vec::new();
    let mut depth = 0usize;
    let mut chars = expansion.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' => skip_delimited(&mut chars, '"').ok_or("unterminated literal")?,
            '[' => skip_delimited(&mut chars, ']').ok_or("unterminated character class")?,
            '(' => depth += 1,
            ')' => depth = depth.checked_sub(1).ok_or("unbalanced `)`")?,
            '|' | '*' | '+' | '?' => {}
            c if c.is_whitespace() => {}
            c if c.is_ascii_alphanumeric() || c == '-' || c == '_' => {
                let mut name = String::from(c);
                while let Some(&n) = chars.peek() {
                    if !(n.is_ascii_alphanumeric() || n == '-' || n == '_') {
                        break;
                    }
                    name.push(n);
                    chars.next();
                }
                refs.push(name);
            }
            other => return Err(format!("unexpected `{other}`")),
        }
    }
    if depth != 0 {
        return Err("unbalanced `(`".to_string());
    }
    Ok(refs)
}

/// Consumes through the closing delimiter, honoring backslash escapes.
fn skip_delimited(chars: &mut impl Iterator<Item = char>, close: char) -> Option<()> {
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                chars.next()?;
            }
            c if c == close => return Some(()),
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_a_well_formed_grammar() {
        let text = "root ::= item ws\n\
                    item ::= \"{\" ws (\"\\\"k\\\"\" ws \":\" ws [^\"\\\\]*)? ws \"}\"\n\
                    ws ::= [ \\t\\n]*";
        assert_eq!(check(text), Ok(()));
    }

    #[test]
    fn reports_every_problem() {
        let text = "root ::= a b\na ::= \"x\"\na ::= \"y\"\nBad_Name ::= (a\nnot a rule";
        let GrammarDiagnostics(problems) = check(text).unwrap_err();
        assert!(problems.iter().any(|p| p.contains("already defined on line 2")));
        assert!(problems.iter().any(|p| p.contains("invalid rule name `Bad_Name`")));
        assert!(problems.iter().any(|p| p.contains("unbalanced `(`")));
        assert!(problems.iter().any(|p| p.contains("missing `::=`")));
        assert!(problems.iter().any(|p| p.contains("undefined rule `b`")));
    }

    #[test]
    fn missing_root_and_open_literals() {
        let GrammarDiagnostics(problems) = check("a ::= \"open").unwrap_err();
        assert!(problems.contains(&"line 1: unterminated literal".to_string()));
        assert!(problems.contains(&"no `root` rule".to_string()));
    }
}
