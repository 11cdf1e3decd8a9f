//! Fixture-driven check of the response parsers.
//!
//! Each `fixtures/<name>.<format>.txt` is a raw model reply. Next to it lives
//! either `<name>.<format>.expected.json` (the parsed output) or
//! `<name>.<format>.error` (a substring the parse error must contain).
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use colored::Colorize;
use once_cell::sync::Lazy;
use regex::Regex;
use schema_codec::path_de::from_str_with_path;
use schema_codec::{Codec, Format};

static FIXTURE_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?P<name>.+)\.(?P<format>json|toml|xml)\.txt$").expect("static regex"));

struct Fixture {
    name: String,
    format: Format,
    path: PathBuf,
}

enum Expectation {
    Value(serde_json::Value),
    Error(String),
}

fn main() -> anyhow::Result<()> {
    let dir = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| Path::new(env!("CARGO_MANIFEST_DIR")).join("fixtures"));

    let fixtures = discover(&dir)?;
    let mut failed = 0usize;
    for fixture in &fixtures {
        match run(fixture) {
            Ok(()) => eprintln!("{} {} ({})", "✅".green(), fixture.name, fixture.format),
            Err(error) => {
                failed += 1;
                eprintln!("{} {} ({}): {error:#}", "❌".red(), fixture.name, fixture.format);
            }
        }
    }

    eprintln!("—— {} passed, {} failed ——", fixtures.len() - failed, failed);
    if failed > 0 {
        bail!("{failed} fixture(s) failed");
    }
    Ok(())
}

fn discover(dir: &Path) -> anyhow::Result<Vec<Fixture>> {
    let mut fixtures = Vec::new();
    for entry in std::fs::read_dir(dir).with_context(|| format!("failed to read {}", dir.display()))? {
        let path = entry?.path();
        let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let Some(caps) = FIXTURE_NAME.captures(file_name) else {
            continue;
        };
        let format: Format = caps["format"].parse()?;
        fixtures.push(Fixture { name: caps["name"].to_string(), format, path: path.clone() });
    }
    fixtures.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(fixtures)
}

fn expectation(fixture: &Fixture) -> anyhow::Result<Expectation> {
    let stem = fixture.path.with_extension("");
    let expected_path = stem.with_extension(format!("{}.expected.json", fixture.format));
    let error_path = stem.with_extension(format!("{}.error", fixture.format));
    if expected_path.exists() {
        let source = std::fs::read_to_string(&expected_path)?;
        let value = from_str_with_path::<serde_json::Value>(&source)
            .with_context(|| format!("invalid expectation {}", expected_path.display()))?;
        Ok(Expectation::Value(value))
    } else if error_path.exists() {
        Ok(Expectation::Error(std::fs::read_to_string(&error_path)?.trim().to_string()))
    } else {
        bail!("no .expected.json or .error file next to {}", fixture.path.display())
    }
}

fn run(fixture: &Fixture) -> anyhow::Result<()> {
    let response = std::fs::read_to_string(&fixture.path)?;
    let parsed = Codec::with_format(fixture.format).parse(&response);
    match (expectation(fixture)?, parsed) {
        (Expectation::Value(expected), Ok(parsed)) => {
            let actual = serde_json::to_value(&parsed)?;
            if actual != expected {
                bail!(
                    "output mismatch\n  expected: {}\n  actual:   {}",
                    serde_json::to_string(&expected)?,
                    serde_json::to_string(&actual)?
                );
            }
            Ok(())
        }
        (Expectation::Value(_), Err(error)) => bail!("unexpected parse error: {error}"),
        (Expectation::Error(needle), Err(error)) => {
            let message = error.to_string();
            if !message.contains(&needle) {
                bail!("error `{message}` does not mention `{needle}`");
            }
            Ok(())
        }
        (Expectation::Error(needle), Ok(parsed)) => {
            bail!("expected an error mentioning `{needle}`, parsed {}", serde_json::to_string(&parsed)?)
        }
    }
}
