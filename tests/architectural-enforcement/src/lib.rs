//! Architectural Enforcement Integration Tests
//!
//! Source scanning helpers shared by the tests in `tests/`. The tests enforce
//! rules that the compiler cannot:
//! - No sleeping or blocking I/O inside the streaming core
//! - No panicking shortcuts (`unwrap`, `expect`, `panic!`) in production code
//!
//! Production code is everything in a file before its first `#[cfg(test)]`.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// Source directories of the streaming core, relative to the workspace root
pub const CORE_SOURCES: &[&str] = &["chat/core/src"];

/// Source directories of the terminal client, relative to the workspace root
pub const CLI_SOURCES: &[&str] = &["chat/cli/src"];

/// One offending source line
#[derive(Debug, Clone)]
pub struct Violation {
    /// File the line lives in
    pub file: PathBuf,
    /// 1-based line number
    pub line: usize,
    /// The trimmed source line
    pub text: String,
    /// What rule the line breaks
    pub rule: &'static str,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{} - {}: {}",
            self.file.display(),
            self.line,
            self.rule,
            self.text
        )
    }
}

/// A forbidden pattern and the rule it breaks
#[derive(Debug, Clone, Copy)]
pub struct Forbidden {
    /// Substring matched against the code part of each line
    pub pattern: &'static str,
    /// Rule description for reports
    pub rule: &'static str,
}

/// Workspace root, two levels above this crate
pub fn workspace_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../..")
}

/// All `.rs` files below `dir`
pub fn rust_files(dir: &Path) -> Vec<PathBuf> {
    if !dir.exists() {
        return Vec::new();
    }
    let mut files: Vec<PathBuf> = walkdir::WalkDir::new(dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.path().extension().and_then(|s| s.to_str()) == Some("rs"))
        .map(|e| e.into_path())
        .collect();
    files.sort();
    files
}

/// Production lines of `content` as `(line_number, code)`, comments removed
pub fn production_lines(content: &str) -> Vec<(usize, &str)> {
    content
        .lines()
        .enumerate()
        .take_while(|(_, line)| line.trim() != "#[cfg(test)]")
        .map(|(idx, line)| (idx + 1, line.split("//").next().unwrap_or(line)))
        .filter(|(_, code)| !code.trim().is_empty())
        .collect()
}

/// Scan every production line under `dirs` for `forbidden` patterns
pub fn scan(dirs: &[&str], forbidden: &[Forbidden]) -> Vec<Violation> {
    let root = workspace_root();
    let mut violations = Vec::new();

    for dir in dirs {
        for file in rust_files(&root.join(dir)) {
            let Ok(content) = fs::read_to_string(&file) else {
                continue;
            };
            for (line, code) in production_lines(&content) {
                for rule in forbidden {
                    if code.contains(rule.pattern) {
                        violations.push(Violation {
                            file: file.clone(),
                            line,
                            text: code.trim().to_string(),
                            rule: rule.rule,
                        });
                    }
                }
            }
        }
    }
    violations
}

/// Print violations and fail the calling test if there are any
pub fn report(title: &str, violations: &[Violation]) {
    if violations.is_empty() {
        return;
    }
    eprintln!("\n❌ {title}\n");
    for violation in violations {
        eprintln!("  ❌ {violation}");
    }
    panic!(
        "\nFound {} violation(s) in production code.\nFix these before merging!",
        violations.len()
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_production_lines_stop_at_test_module() {
        let source = "fn a() {}\n// note\nlet x = y.unwrap(); // trailing\n#[cfg(test)]\nmod tests {}\n";
        let lines = production_lines(source);
        assert_eq!(lines, vec![(1, "fn a() {}"), (3, "let x = y.unwrap(); ")]);
    }

    #[test]
    fn test_core_sources_exist() {
        for dir in CORE_SOURCES.iter().chain(CLI_SOURCES) {
            assert!(
                !rust_files(&workspace_root().join(dir)).is_empty(),
                "no sources under {dir}"
            );
        }
    }
}
