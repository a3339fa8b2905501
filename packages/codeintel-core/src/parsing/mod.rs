//! Language Parsers (C3): per-language file → (symbols, relations) extractor.
//!
//! Each parser is a pure function of file bytes, a project-relative path,
//! and the project root: no persistent state, no I/O beyond reading the one
//! file it was handed.

mod go;
mod python;
mod rust_lang;
mod typescript;

use codeintel_storage::{Symbol, SymbolRelation};
use sha2::{Digest, Sha256};

use crate::errors::{Error, Result};

/// Output of parsing a single file.
#[derive(Debug, Clone, Default)]
pub struct ParseResult {
    pub symbols: Vec<Symbol>,
    pub relations: Vec<SymbolRelation>,
}

/// A per-language extractor.
pub trait LanguageParser: Send + Sync {
    fn language(&self) -> &'static str;

    /// File extensions (without the dot) this parser claims.
    fn extensions(&self) -> &'static [&'static str];

    /// Parses `source` (the bytes of `file_path`, already read by the
    /// caller) into symbols and relations. `file_path` must already be
    /// project-relative and forward-slash normalized.
    fn parse(&self, source: &str, file_path: &str) -> Result<ParseResult>;
}

/// Returns the parser registered for `file_path`'s extension, if any.
pub fn parser_for_path(file_path: &str) -> Option<Box<dyn LanguageParser>> {
    let ext = std::path::Path::new(file_path)
        .extension()?
        .to_str()?
        .to_lowercase();
    all_parsers().into_iter().find(|p| p.extensions().contains(&ext.as_str()))
}

pub fn all_parsers() -> Vec<Box<dyn LanguageParser>> {
    vec![
        Box::new(go::GoParser),
        Box::new(typescript::TypeScriptParser),
        Box::new(python::PythonParser),
        Box::new(rust_lang::RustParser),
    ]
}

/// Hex-encoded SHA-256 of the file's bytes, per the data model's `file_hash`.
pub fn hash_file_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Project-relative directory of `file_path`, forward-slash normalized.
pub fn module_path_of(file_path: &str) -> Option<String> {
    let parent = std::path::Path::new(file_path).parent()?;
    let s = parent.to_string_lossy().replace('\\', "/");
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}

pub(crate) fn parse_error(lang: &str, path: &str, detail: impl std::fmt::Display) -> Error {
    Error::parse(format!("{lang} parser failed on {path}: {detail}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parser_for_path_dispatches_by_extension() {
        assert_eq!(parser_for_path("a/b.go").unwrap().language(), "go");
        assert_eq!(parser_for_path("a/b.ts").unwrap().language(), "typescript");
        assert_eq!(parser_for_path("a/b.tsx").unwrap().language(), "typescript");
        assert_eq!(parser_for_path("a/b.py").unwrap().language(), "python");
        assert_eq!(parser_for_path("a/b.rs").unwrap().language(), "rust");
        assert!(parser_for_path("a/b.unknown").is_none());
    }

    #[test]
    fn test_module_path_of() {
        assert_eq!(module_path_of("pkg/sub/file.go").as_deref(), Some("pkg/sub"));
        assert_eq!(module_path_of("file.go"), None);
    }

    #[test]
    fn test_hash_is_deterministic() {
        let a = hash_file_bytes(b"hello");
        let b = hash_file_bytes(b"hello");
        assert_eq!(a, b);
        assert_ne!(a, hash_file_bytes(b"world"));
    }
}
