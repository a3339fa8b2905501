//! Built-in capabilities available to policy rules (spec §4.7). All take
//! project-relative paths and go through a filesystem abstraction so tests
//! can inject a virtual tree instead of touching disk.

use std::path::{Path, PathBuf};

use codeintel_storage::{CancellationContext, SymbolRepository};
use regex::Regex;

/// Filesystem seam for policy built-ins, so evaluation can be driven against
/// an in-memory tree in tests instead of the real project directory.
pub trait PolicyFs: Send + Sync {
    fn read_to_string(&self, path: &str) -> Option<String>;
    fn exists(&self, path: &str) -> bool;
}

/// The real project directory.
pub struct DiskFs {
    root: PathBuf,
}

impl DiskFs {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl PolicyFs for DiskFs {
    fn read_to_string(&self, path: &str) -> Option<String> {
        std::fs::read_to_string(self.root.join(path)).ok()
    }

    fn exists(&self, path: &str) -> bool {
        self.root.join(path).exists()
    }
}

/// Line count of `path`, or `-1` if it cannot be read (spec §4.7).
pub fn file_line_count(fs: &dyn PolicyFs, path: &str) -> i64 {
    match fs.read_to_string(path) {
        Some(content) => content.lines().count() as i64,
        None => -1,
    }
}

/// Whether `path`'s content matches `pattern`. Safe-fail: an unreadable
/// file or an invalid pattern is simply `false`, never an error.
pub fn has_pattern(fs: &dyn PolicyFs, path: &str, pattern: &str) -> bool {
    let Some(content) = fs.read_to_string(path) else {
        return false;
    };
    Regex::new(pattern).map(|re| re.is_match(&content)).unwrap_or(false)
}

/// Best-effort, language-aware import extraction, keyed off the path's
/// extension. Unreadable files or unrecognized extensions yield no imports,
/// never an error.
pub fn file_imports(fs: &dyn PolicyFs, path: &str) -> Vec<String> {
    let Some(content) = fs.read_to_string(path) else {
        return Vec::new();
    };
    let ext = Path::new(path).extension().and_then(|e| e.to_str()).unwrap_or("");
    match ext {
        "go" => go_imports(&content),
        "ts" | "tsx" => ts_imports(&content),
        "py" => py_imports(&content),
        "rs" => rust_imports(&content),
        _ => Vec::new(),
    }
}

fn go_imports(content: &str) -> Vec<String> {
    let single = Regex::new(r#"^\s*import\s+"([^"]+)""#).unwrap();
    let block_line = Regex::new(r#"^\s*(?:\w+\s+)?"([^"]+)"\s*$"#).unwrap();
    let mut imports = Vec::new();
    let mut in_block = false;
    for line in content.lines() {
        if line.trim_start().starts_with("import (") {
            in_block = true;
            continue;
        }
        if in_block {
            if line.trim() == ")" {
                in_block = false;
                continue;
            }
            if let Some(c) = block_line.captures(line) {
                imports.push(c[1].to_string());
            }
            continue;
        }
        if let Some(c) = single.captures(line) {
            imports.push(c[1].to_string());
        }
    }
    imports
}

fn ts_imports(content: &str) -> Vec<String> {
    let re = Regex::new(r#"(?:import|export)\s[^'"]*from\s+['"]([^'"]+)['"]"#).unwrap();
    re.captures_iter(content).map(|c| c[1].to_string()).collect()
}

fn py_imports(content: &str) -> Vec<String> {
    let from_re = Regex::new(r"^\s*from\s+([\w\.]+)\s+import\b").unwrap();
    let import_re = Regex::new(r"^\s*import\s+([\w\.]+)").unwrap();
    let mut imports = Vec::new();
    for line in content.lines() {
        if let Some(c) = from_re.captures(line) {
            imports.push(c[1].to_string());
        } else if let Some(c) = import_re.captures(line) {
            imports.push(c[1].to_string());
        }
    }
    imports
}

fn rust_imports(content: &str) -> Vec<String> {
    let re = Regex::new(r"^\s*use\s+([\w:]+)").unwrap();
    content
        .lines()
        .filter_map(|line| re.captures(line).map(|c| c[1].to_string()))
        .collect()
}

/// Whether a symbol named `name` is defined in `path`. Prefers the symbol
/// repository when available; falls back to a regex heuristic scoped by
/// the path's extension.
pub fn symbol_exists(
    ctx: &CancellationContext,
    repository: Option<&SymbolRepository>,
    fs: &dyn PolicyFs,
    path: &str,
    name: &str,
) -> bool {
    if let Some(repo) = repository {
        if let Ok(symbols) = repo.find_symbols_by_file(ctx, path) {
            if symbols.iter().any(|s| s.name == name) {
                return true;
            }
            if !symbols.is_empty() {
                return false;
            }
        }
    }

    let Some(content) = fs.read_to_string(path) else {
        return false;
    };
    let needle = regex::escape(name);
    let pattern = format!(r"\b(?:fn|func|def|class|struct|interface|type)\s+{needle}\b");
    Regex::new(&pattern).map(|re| re.is_match(&content)).unwrap_or(false)
}

pub fn file_exists(fs: &dyn PolicyFs, path: &str) -> bool {
    fs.exists(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    struct MemFs(Mutex<HashMap<String, String>>);

    impl MemFs {
        fn new(files: &[(&str, &str)]) -> Self {
            Self(Mutex::new(
                files.iter().map(|(p, c)| (p.to_string(), c.to_string())).collect(),
            ))
        }
    }

    impl PolicyFs for MemFs {
        fn read_to_string(&self, path: &str) -> Option<String> {
            self.0.lock().unwrap().get(path).cloned()
        }

        fn exists(&self, path: &str) -> bool {
            self.0.lock().unwrap().contains_key(path)
        }
    }

    #[test]
    fn test_file_line_count_missing_file_is_negative_one() {
        let fs = MemFs::new(&[]);
        assert_eq!(file_line_count(&fs, "missing.go"), -1);
    }

    #[test]
    fn test_file_line_count_counts_lines() {
        let fs = MemFs::new(&[("a.go", "line1\nline2\nline3")]);
        assert_eq!(file_line_count(&fs, "a.go"), 3);
    }

    #[test]
    fn test_has_pattern_matches() {
        let fs = MemFs::new(&[("a.go", "func TODO() {}")]);
        assert!(has_pattern(&fs, "a.go", "TODO"));
        assert!(!has_pattern(&fs, "a.go", "FIXME"));
    }

    #[test]
    fn test_has_pattern_safe_fails_on_missing_file() {
        let fs = MemFs::new(&[]);
        assert!(!has_pattern(&fs, "missing.go", "TODO"));
    }

    #[test]
    fn test_go_imports() {
        let fs = MemFs::new(&[(
            "a.go",
            "package main\n\nimport (\n\t\"fmt\"\n\t\"os\"\n)\n",
        )]);
        let imports = file_imports(&fs, "a.go");
        assert_eq!(imports, vec!["fmt", "os"]);
    }

    #[test]
    fn test_python_imports() {
        let fs = MemFs::new(&[("a.py", "import os\nfrom foo.bar import baz\n")]);
        let imports = file_imports(&fs, "a.py");
        assert_eq!(imports, vec!["os", "foo.bar"]);
    }

    #[test]
    fn test_file_exists() {
        let fs = MemFs::new(&[("a.go", "x")]);
        assert!(file_exists(&fs, "a.go"));
        assert!(!file_exists(&fs, "b.go"));
    }

    #[test]
    fn test_symbol_exists_falls_back_to_regex_without_repository() {
        let ctx = CancellationContext::new();
        let fs = MemFs::new(&[("a.go", "func Helper() {}")]);
        assert!(symbol_exists(&ctx, None, &fs, "a.go", "Helper"));
        assert!(!symbol_exists(&ctx, None, &fs, "a.go", "Missing"));
    }
}
