use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use project::{LoadReport, Loader, NoDecoder, OperationTable, Project};

#[derive(Debug, Default, Deserialize)]
pub struct TestConfig {
    /// Human-readable test description.
    #[serde(default)]
    pub description: Option<String>,

    /// The load must fail with an error whose Display string contains this.
    #[serde(default)]
    pub expect_error: Option<String>,

    /// Sprite names in stage order.
    #[serde(default)]
    pub expect_sprites: Option<Vec<String>>,

    /// Number of blocks that must have been replaced by placeholders.
    #[serde(default)]
    pub expect_placeholders: Option<usize>,

    /// If true, saving and reloading must reproduce the saved text.
    #[serde(default)]
    pub round_trip: bool,
}

/// Parse a `.test.xml` file into its TOML config and the project document.
fn parse_test_file(content: &str) -> Result<(TestConfig, &str), String> {
    let content = content.trim_start_matches('\u{feff}'); // strip BOM

    let after_open = content
        .strip_prefix("---")
        .ok_or("missing opening --- frontmatter delimiter")?;
    let after_open = after_open
        .strip_prefix('\n')
        .or_else(|| after_open.strip_prefix("\r\n"))
        .unwrap_or(after_open);

    let close_pos = after_open
        .find("\n---")
        .ok_or("missing closing --- frontmatter delimiter")?;

    let toml_str = after_open[..close_pos].trim_end_matches('\r');
    let rest = &after_open[close_pos + 4..];
    let source = rest
        .strip_prefix("\r\n")
        .or_else(|| rest.strip_prefix('\n'))
        .unwrap_or(rest);

    let config: TestConfig =
        toml::from_str(toml_str).map_err(|e| format!("TOML parse error: {}", e))?;

    Ok((config, source))
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
                .file_name()
                .and_then(|s| s.to_str())
                .and_then(|s| s.strip_suffix(".test.xml"))
                .unwrap_or("?")
        })
    }
}

fn load(source: &str, operations: &OperationTable) -> Result<(Project, LoadReport), project::LoadError> {
    let mut decoder = NoDecoder;
    Loader::new(operations, &mut decoder).load(source)
}

fn run_single_test(path: &Path, operations: &OperationTable) -> TestResult {
    let fail = |description: Option<String>, reason: String| TestResult {
        path: path.to_path_buf(),
        description,
        outcome: TestOutcome::Fail(reason),
    };

    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) => return fail(None, format!("cannot read file: {}", e)),
    };
    let (config, source) = match parse_test_file(&content) {
        Ok(pair) => pair,
        Err(e) => return fail(None, format!("frontmatter error: {}", e)),
    };
    let description = config.description.clone();

    let (project, report) = match (load(source, operations), &config.expect_error) {
        (Err(err), Some(expected)) => {
            let message = err.to_string();
            return if message.contains(expected.as_str()) {
                TestResult {
                    path: path.to_path_buf(),
                    description,
                    outcome: TestOutcome::Pass,
                }
            } else {
                fail(
                    description,
                    format!("expected error containing \"{}\", got: {}", expected, message),
                )
            };
        }
        (Ok(_), Some(expected)) => {
            return fail(
                description,
                format!("expected error containing \"{}\", but the load succeeded", expected),
            );
        }
        (Err(err), None) => return fail(description, format!("unexpected load error: {}", err)),
        (Ok(loaded), None) => loaded,
    };

    if let Some(reason) = check_project(&config, &project, &report, operations) {
        return fail(description, reason);
    }

    TestResult {
        path: path.to_path_buf(),
        description,
        outcome: TestOutcome::Pass,
    }
}

/// Check a loaded project against the expectations. Returns `Some(reason)` on mismatch.
fn check_project(
    config: &TestConfig,
    project: &Project,
    report: &LoadReport,
    operations: &OperationTable,
) -> Option<String> {
    if let Some(expected) = &config.expect_sprites {
        let actual: Vec<String> = project
            .sprites()
            .iter()
            .map(|sprite| sprite.borrow().name.clone())
            .collect();
        if &actual != expected {
            return Some(format!(
                "sprite mismatch\n  expected: {:?}\n  actual:   {:?}",
                expected, actual
            ));
        }
    }

    if let Some(expected) = config.expect_placeholders {
        if report.placeholders.len() != expected {
            let specs: Vec<String> = report
                .placeholders
                .iter()
                .map(|p| format!("  - {} (in {})", p.spec, p.owner))
                .collect();
            return Some(format!(
                "expected {} placeholder(s), got {}\n{}",
                expected,
                report.placeholders.len(),
                if specs.is_empty() {
                    "  (none)".to_string()
                } else {
                    specs.join("\n")
                }
            ));
        }
    }

    if config.round_trip {
        let saved = project::save(project);
        let (reloaded, reloaded_report) = match load(&saved, operations) {
            Ok(loaded) => loaded,
            Err(err) => return Some(format!("saved document does not reload: {}", err)),
        };
        if reloaded_report.placeholders.len() != report.placeholders.len() {
            return Some(format!(
                "round trip changed the placeholder count from {} to {}",
                report.placeholders.len(),
                reloaded_report.placeholders.len()
            ));
        }
        let resaved = project::save(&reloaded);
        if resaved != saved {
            return Some(format!(
                "round trip changed the document\n  first:  {}\n  second: {}",
                saved, resaved
            ));
        }
    }

    None
}

/// Discover `.test.xml` files grouped by category (subfolder relative to root).
/// Files directly in `root` get category "" (uncategorized).
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
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect_tests(&path, root, out);
        } else if path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|name| name.ends_with(".test.xml"))
        {
            let category = path
                .parent()
                .and_then(|p| p.strip_prefix(root).ok())
                .map(|p| p.to_string_lossy().replace('\\', "/"))
                .unwrap_or_default();
            out.entry(category).or_default().push(path);
        }
    }
}

/// List available categories for the given test path.
pub fn list_categories(path: &Path) {
    if path.is_file() {
        eprintln!("(single file, no categories)");
        return;
    }

    let categories = discover_categorized(path);
    if categories.is_empty() {
        eprintln!("no .test.xml files found in {}", path.display());
        return;
    }

    eprintln!("available categories:");
    for (cat, files) in &categories {
        let label = if cat.is_empty() { "(root)" } else { cat.as_str() };
        eprintln!("  {} ({} tests)", label, files.len());
    }
}

fn paint(text: &str, code: &str, no_color: bool) -> String {
    if no_color {
        text.to_string()
    } else {
        format!("\x1b[{}m{}\x1b[0m", code, text)
    }
}

/// Pick the categories to run. Unknown requests are reported and skipped.
fn select_categories<'c>(
    all: &'c BTreeMap<String, Vec<PathBuf>>,
    requested: &[String],
) -> BTreeMap<&'c str, &'c Vec<PathBuf>> {
    if requested.is_empty() {
        return all.iter().map(|(k, v)| (k.as_str(), v)).collect();
    }
    let mut selected = BTreeMap::new();
    for request in requested {
        let req = request.trim_matches('/');
        let prefix = format!("{}/", req);
        let mut found = false;
        for (cat, files) in all {
            if cat == req || cat.starts_with(&prefix) {
                selected.insert(cat.as_str(), files);
                found = true;
            }
        }
        if !found {
            eprintln!(
                "warning: category '{}' not found (available: {})",
                req,
                all.keys()
                    .map(|k| if k.is_empty() { "(root)" } else { k.as_str() })
                    .collect::<Vec<_>>()
                    .join(", ")
            );
        }
    }
    selected
}

/// Run all `.test.xml` files under `path` (or a single file).
/// If `categories` is non-empty, only run tests in those categories.
/// Returns exit code: 0 = all pass, 1 = any failure.
pub fn run_tests(
    path: &Path,
    no_color: bool,
    categories: &[String],
    operations: &OperationTable,
) -> i32 {
    let all_categories = if path.is_file() {
        BTreeMap::from([(String::new(), vec![path.to_path_buf()])])
    } else {
        discover_categorized(path)
    };
    if all_categories.is_empty() {
        eprintln!("no .test.xml files found in {}", path.display());
        return 1;
    }

    let run_categories = select_categories(&all_categories, categories);
    if run_categories.is_empty() {
        eprintln!("no matching categories found");
        return 1;
    }

    let mut passed = 0usize;
    let mut failures: Vec<TestResult> = Vec::new();

    for (cat, files) in &run_categories {
        if !path.is_file() {
            let header = if cat.is_empty() { "(root)" } else { *cat };
            eprintln!();
            eprintln!("{}", paint(header, "1", no_color));
        }

        for file in *files {
            let result = run_single_test(file, operations);
            match &result.outcome {
                TestOutcome::Pass => {
                    passed += 1;
                    eprintln!("  {}  {}", paint("PASS", "32", no_color), result.label());
                }
                TestOutcome::Fail(_) => {
                    eprintln!("  {}  {}", paint("FAIL", "31", no_color), result.label());
                    failures.push(result);
                }
            }
        }
    }

    if !failures.is_empty() {
        eprintln!();
        eprintln!("failures:");
        for f in &failures {
            eprintln!();
            eprintln!("  --- {} ---", f.path.display());
            if let TestOutcome::Fail(reason) = &f.outcome {
                for line in reason.lines() {
                    eprintln!("  {}", line);
                }
            }
        }
    }

    eprintln!();
    let failed = failures.len();
    if failed == 0 {
        eprintln!("test result: {}. {} passed, 0 failed", paint("ok", "32", no_color), passed);
        0
    } else {
        eprintln!(
            "test result: {}. {} passed, {} failed (of {})",
            paint("FAILED", "31", no_color),
            passed,
            failed,
            passed + failed
        );
        1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROJECT: &str = r#"<project name="t" version="1"><stage name="Stage"><variables/><scripts/><sprites><sprite name="A"><variables/><scripts><script><block s="forward"><l>10</l></block><block s="doTeleport"/></script></scripts></sprite><sprite name="B"><variables/><scripts/></sprite></sprites></stage></project>"#;

    fn fixture(frontmatter: &str, body: &str) -> String {
        format!("---\n{}\n---\n{}", frontmatter, body)
    }

    #[test]
    fn frontmatter_is_split_from_the_document() {
        let content = fixture("description = \"d\"\nround_trip = true", PROJECT);
        let (config, source) = parse_test_file(&content).unwrap();
        assert_eq!(config.description.as_deref(), Some("d"));
        assert!(config.round_trip);
        assert_eq!(source, PROJECT);
    }

    #[test]
    fn missing_frontmatter_is_reported() {
        assert!(parse_test_file(PROJECT).is_err());
        assert!(parse_test_file("---\nround_trip = true\n").is_err());
    }

    #[test]
    fn passing_and_failing_fixtures() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("loading");
        std::fs::create_dir(&good).unwrap();
        std::fs::write(
            good.join("sprites.test.xml"),
            fixture(
                "expect_sprites = [\"A\", \"B\"]\nexpect_placeholders = 1\nround_trip = true",
                PROJECT,
            ),
        )
        .unwrap();
        std::fs::write(
            good.join("version.test.xml"),
            fixture(
                "expect_error = \"newer than supported\"",
                r#"<project version="7"><stage/></project>"#,
            ),
        )
        .unwrap();

        let operations = OperationTable::builtin();
        assert_eq!(run_tests(dir.path(), true, &[], &operations), 0);

        let bad = dir.path().join("broken");
        std::fs::create_dir(&bad).unwrap();
        std::fs::write(
            bad.join("count.test.xml"),
            fixture("expect_placeholders = 0", PROJECT),
        )
        .unwrap();
        assert_eq!(run_tests(dir.path(), true, &[], &operations), 1);
        assert_eq!(run_tests(dir.path(), true, &["loading".to_string()], &operations), 0);
        assert_eq!(run_tests(&bad.join("count.test.xml"), true, &[], &operations), 1);
    }

    #[test]
    fn extra_operations_remove_placeholders() {
        let mut operations = OperationTable::builtin();
        operations.insert(project::Operation::new(
            "doTeleport",
            project::BlockKind::Command,
            "motion",
            "teleport",
        ));
        let (_, report) = load(PROJECT, &operations).unwrap();
        assert!(report.placeholders.is_empty());
    }

    #[test]
    fn round_trip_reloads_with_the_same_operations() {
        let mut operations = OperationTable::builtin();
        operations.insert(project::Operation::new(
            "doTeleport",
            project::BlockKind::Command,
            "motion",
            "teleport",
        ));
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("teleport.test.xml"),
            fixture("expect_placeholders = 0\nround_trip = true", PROJECT),
        )
        .unwrap();

        assert_eq!(run_tests(dir.path(), true, &[], &operations), 0);
        assert_eq!(run_tests(dir.path(), true, &[], &OperationTable::builtin()), 1);
    }
}
