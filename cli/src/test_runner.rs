//! Runner for `.test.md` files.
//!
//! A test file is TOML frontmatter between `---` lines followed by the
//! Markdown of the root document. The root is written to `main.md` in a
//! scratch directory next to any extra `[files]`, expanded, and compared
//! against the expectations.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tempfile::TempDir;
use weave::SourceMap;

use crate::config::{Config, ExpandConfig, ModifiersConfig};

const ROOT_FILE: &str = "main.md";

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TestConfig {
    /// Human-readable test description.
    #[serde(default)]
    pub description: Option<String>,

    /// Expected expanded document (trimmed comparison).
    #[serde(default)]
    pub expect_output: Option<String>,

    /// The error's Display string must contain this substring.
    #[serde(default)]
    pub expect_error: Option<String>,

    /// Expected artifact names, in order.
    #[serde(default)]
    pub expect_artifacts: Option<Vec<String>>,

    /// Extra files next to the root document, keyed by relative path.
    #[serde(default)]
    pub files: BTreeMap<String, String>,

    #[serde(default)]
    pub expand: ExpandConfig,

    #[serde(default)]
    pub modifiers: ModifiersConfig,
}

/// Split a `.test.md` file into its TOML config and document source.
fn parse_test_file(content: &str) -> Result<(TestConfig, &str), String> {
    let content = content.trim_start_matches('\u{feff}');
    let rest = content
        .strip_prefix("---")
        .ok_or("missing opening --- frontmatter delimiter")?;
    let rest = rest
        .strip_prefix('\n')
        .or_else(|| rest.strip_prefix("\r\n"))
        .unwrap_or(rest);

    let close = rest
        .find("\n---")
        .ok_or("missing closing --- frontmatter delimiter")?;
    let frontmatter = rest[..close].trim_end_matches('\r');
    let body = &rest[close + 4..];
    let body = body
        .strip_prefix("\r\n")
        .or_else(|| body.strip_prefix('\n'))
        .unwrap_or(body);

    let config: TestConfig =
        toml::from_str(frontmatter).map_err(|e| format!("TOML parse error: {e}"))?;
    Ok((config, body))
}

pub enum TestOutcome {
    Pass,
    Fail(String),
}

pub struct TestResult {
    pub path: PathBuf,
    pub description: Option<String>,
    pub outcome: TestOutcome,
}

impl TestResult {
    fn label(&self) -> &str {
        self.description.as_deref().unwrap_or_else(|| {
            self.path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("?")
        })
    }
}

fn run_single_test(path: &Path) -> TestResult {
    let (description, outcome) = match evaluate(path) {
        Ok((description, None)) => (description, TestOutcome::Pass),
        Ok((description, Some(reason))) => (description, TestOutcome::Fail(reason)),
        Err(reason) => (None, TestOutcome::Fail(reason)),
    };
    TestResult {
        path: path.to_path_buf(),
        description,
        outcome,
    }
}

/// Run one test. `Err` means the test could not be set up; `Ok(Some(_))`
/// is a failed expectation.
fn evaluate(path: &Path) -> Result<(Option<String>, Option<String>), String> {
    let content =
        std::fs::read_to_string(path).map_err(|e| format!("cannot read file: {e}"))?;
    let (test, source) =
        parse_test_file(&content).map_err(|e| format!("frontmatter error: {e}"))?;
    let description = test.description.clone();

    let scratch = TempDir::new().map_err(|e| format!("cannot create scratch dir: {e}"))?;
    let dir = scratch.path();
    let files = test
        .files
        .iter()
        .map(|(name, text)| (name.as_str(), text.as_str()))
        .chain([(ROOT_FILE, source)]);
    for (name, text) in files {
        let target = dir.join(name);
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent).map_err(|e| format!("cannot create {name}: {e}"))?;
        }
        std::fs::write(&target, text).map_err(|e| format!("cannot write {name}: {e}"))?;
    }

    let config = Config {
        expand: test.expand.clone(),
        modifiers: test.modifiers.clone(),
    };
    let options = config.options().map_err(|e| e.to_string())?;
    let mut executor = config.executor().map_err(|e| e.to_string())?;

    let mut sources = SourceMap::new();
    let result = engine::Pipeline::new(options).expand(
        &mut sources,
        &dir.join(ROOT_FILE),
        dir,
        &mut executor,
    );
    tracing::debug!(test = %path.display(), ok = result.is_ok(), "test expanded");

    let failure = match (&test.expect_error, result) {
        (Some(expected), Err(error)) => {
            let message = error.to_string();
            (!message.contains(expected.as_str()))
                .then(|| format!("expected error containing \"{expected}\", got: {message}"))
        }
        (Some(expected), Ok(_)) => Some(format!(
            "expected error containing \"{expected}\", but expansion succeeded"
        )),
        (None, Err(error)) => Some(format!("unexpected error: {error}")),
        (None, Ok(expansion)) => check_expansion(&test, &expansion),
    };
    Ok((description, failure))
}

fn check_expansion(test: &TestConfig, expansion: &engine::Expansion) -> Option<String> {
    if let Some(expected) = &test.expect_output {
        let expected = expected.trim();
        let actual = expansion.markdown.trim();
        if expected != actual {
            return Some(format!(
                "output mismatch\n  expected:\n{}\n  actual:\n{}",
                indent(expected),
                indent(actual)
            ));
        }
    }
    if let Some(expected) = &test.expect_artifacts {
        let actual: Vec<&str> = expansion.artifacts.iter().map(|a| a.name.as_str()).collect();
        if *expected != actual {
            return Some(format!(
                "artifact mismatch\n  expected: {expected:?}\n  actual:   {actual:?}"
            ));
        }
    }
    None
}

fn indent(text: &str) -> String {
    text.lines()
        .map(|line| format!("    {line}"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// `.test.md` files grouped by subfolder relative to `root`; files directly
/// in `root` get category "". Sorted by category, then path.
fn discover_categorized(root: &Path) -> BTreeMap<String, Vec<PathBuf>> {
    let mut categories: BTreeMap<String, Vec<PathBuf>> = BTreeMap::new();
    collect_tests(root, root, &mut categories);
    for files in categories.values_mut() {
        files.sort();
    }
    categories
}

fn collect_tests(dir: &Path, root: &Path, out: &mut BTreeMap<String, Vec<PathBuf>>) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for path in entries.flatten().map(|entry| entry.path()) {
        if path.is_dir() {
            collect_tests(&path, root, out);
            continue;
        }
        let is_test = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.ends_with(".test.md"));
        if is_test {
            let category = path
                .parent()
                .and_then(|p| p.strip_prefix(root).ok())
                .map(|p| p.to_string_lossy().replace('\\', "/"))
                .unwrap_or_default();
            out.entry(category).or_default().push(path);
        }
    }
}

fn category_label(category: &str) -> &str {
    if category.is_empty() { "(root)" } else { category }
}

/// List available categories for the given test path.
pub fn list_categories(path: &Path) {
    if path.is_file() {
        eprintln!("(single file, no categories)");
        return;
    }

    let categories = discover_categorized(path);
    if categories.is_empty() {
        eprintln!("no .test.md files found in {}", path.display());
        return;
    }

    eprintln!("available categories:");
    for (category, files) in &categories {
        eprintln!("  {} ({} tests)", category_label(category), files.len());
    }
}

/// Pick the categories to run. Unknown names are warned about and skipped.
fn select<'a>(
    all: &'a BTreeMap<String, Vec<PathBuf>>,
    requested: &[String],
) -> BTreeMap<&'a str, &'a [PathBuf]> {
    if requested.is_empty() {
        return all.iter().map(|(k, v)| (k.as_str(), v.as_slice())).collect();
    }

    let mut selected = BTreeMap::new();
    for name in requested {
        let name = name.trim_matches('/');
        let prefix = format!("{name}/");
        let before = selected.len();
        for (category, files) in all {
            if category == name || category.starts_with(&prefix) {
                selected.insert(category.as_str(), files.as_slice());
            }
        }
        if selected.len() == before {
            let available: Vec<&str> = all.keys().map(|k| category_label(k)).collect();
            eprintln!(
                "warning: category '{name}' not found (available: {})",
                available.join(", ")
            );
        }
    }
    selected
}

struct Style {
    no_color: bool,
}

impl Style {
    fn paint(&self, text: &str, code: &str) -> String {
        if self.no_color {
            text.to_string()
        } else {
            format!("\x1b[{code}m{text}\x1b[0m")
        }
    }

    fn pass(&self) -> String {
        self.paint("PASS", "32")
    }

    fn fail(&self) -> String {
        self.paint("FAIL", "31")
    }

    fn bold(&self, text: &str) -> String {
        self.paint(text, "1")
    }
}

/// Run all `.test.md` files under `path` (or a single file). If
/// `categories` is non-empty, only those categories run. Returns the exit
/// code: 0 when everything passed.
pub fn run_tests(path: &Path, no_color: bool, categories: &[String]) -> i32 {
    let style = Style { no_color };

    let all = if path.is_file() {
        BTreeMap::from([(String::new(), vec![path.to_path_buf()])])
    } else {
        discover_categorized(path)
    };
    if all.is_empty() {
        eprintln!("no .test.md files found in {}", path.display());
        return 1;
    }

    let selected = if path.is_file() {
        select(&all, &[])
    } else {
        select(&all, categories)
    };
    if selected.is_empty() {
        eprintln!("no matching categories found");
        return 1;
    }

    let mut passed = 0usize;
    let mut failures: Vec<TestResult> = Vec::new();
    for (category, files) in &selected {
        if !path.is_file() {
            eprintln!();
            eprintln!("{}", style.bold(category_label(category)));
        }
        for file in *files {
            let result = run_single_test(file);
            match &result.outcome {
                TestOutcome::Pass => {
                    passed += 1;
                    eprintln!("  {}  {}", style.pass(), result.label());
                }
                TestOutcome::Fail(_) => {
                    eprintln!("  {}  {}", style.fail(), result.label());
                    failures.push(result);
                }
            }
        }
    }

    if !failures.is_empty() {
        eprintln!();
        eprintln!("failures:");
        for failure in &failures {
            eprintln!();
            eprintln!("  --- {} ---", failure.path.display());
            if let TestOutcome::Fail(reason) = &failure.outcome {
                for line in reason.lines() {
                    eprintln!("  {line}");
                }
            }
        }
    }

    eprintln!();
    let failed = failures.len();
    if failed == 0 {
        eprintln!("test result: {}. {passed} passed, 0 failed", style.paint("ok", "32"));
        0
    } else {
        eprintln!(
            "test result: {}. {passed} passed, {failed} failed (of {})",
            style.paint("FAILED", "31"),
            passed + failed
        );
        1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixtures() -> PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures")
    }

    #[test]
    fn frontmatter_splits_from_body() {
        let (config, body) = parse_test_file(
            "---\ndescription = \"demo\"\n[files]\n\"b.md\" = \"hi\"\n---\n# Doc\n",
        )
        .unwrap();
        assert_eq!(config.description.as_deref(), Some("demo"));
        assert_eq!(config.files.get("b.md").map(String::as_str), Some("hi"));
        assert_eq!(body, "# Doc\n");
    }

    #[test]
    fn missing_delimiters_are_reported() {
        assert!(parse_test_file("# no frontmatter\n").is_err());
        assert!(parse_test_file("---\ndescription = \"x\"\n").is_err());
    }

    #[test]
    fn fixtures_are_grouped_by_folder() {
        let categories = discover_categorized(&fixtures());
        for name in ["artifacts", "conditionals", "errors", "includes", "modifiers"] {
            assert!(categories.contains_key(name), "missing category {name}");
        }
    }

    #[test]
    fn fixture_suite_passes() {
        assert_eq!(run_tests(&fixtures(), true, &[]), 0);
    }

    #[test]
    fn single_category_runs() {
        assert_eq!(run_tests(&fixtures(), true, &["includes".to_string()]), 0);
        assert_eq!(run_tests(&fixtures(), true, &["nope".to_string()]), 1);
    }

    #[test]
    fn wrong_expectation_fails() {
        let scratch = TempDir::new().unwrap();
        let file = scratch.path().join("wrong.test.md");
        std::fs::write(&file, "---\nexpect_output = \"other\"\n---\nactual\n").unwrap();
        let result = run_single_test(&file);
        assert!(matches!(result.outcome, TestOutcome::Fail(_)));
        assert_eq!(run_tests(&file, true, &[]), 1);
    }
}
