//! File-System Indexer (C4): walks a project tree, dispatches per-language
//! parsers, and persists the result through the symbol repository.
//!
//! Workers are disjoint over files: each worker owns a short-lived parser
//! instance and submits its own symbol/relation upserts, with the
//! repository's `Store` as the single serialization point (see the
//! concurrency design, spec §5).

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Instant;

use codeintel_storage::{
    CancellationContext, ErrorKind, IndexStats, RelationType, SymbolRelation, SymbolRepository,
};
use globset::GlobSet;
use rayon::prelude::*;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::config::IndexerConfig;
use crate::errors::{Error, Result};
use crate::parsing::{self, ParseResult};

/// Outcome of attempting to incrementally (re-)index a single file.
pub enum IncrementalOutcome {
    Unchanged,
    Indexed { symbols: u64, relations: u64 },
}

/// Resolves a parser's name-carrying pending relation (see each language
/// parser's `pending_*_relation` helpers) to real symbol ids using the
/// `name -> id` map built while upserting this file's symbols. Relations
/// referencing a name not defined in this file (external calls, unresolved
/// base classes) are dropped rather than guessed at.
fn resolve_relation(name_to_id: &HashMap<String, i64>, rel: SymbolRelation) -> Option<SymbolRelation> {
    let meta = rel.metadata.as_ref()?;
    let (from_key, to_key) = match rel.relation_type {
        RelationType::Calls => ("callerName", "calleeName"),
        RelationType::Extends | RelationType::Implements => ("fromName", "toName"),
        _ => return None,
    };
    let from_name = meta.get(from_key)?.as_str()?;
    let to_name = meta.get(to_key)?.as_str()?;
    let from_id = *name_to_id.get(from_name)?;
    let to_id = *name_to_id.get(to_name)?;
    Some(SymbolRelation {
        from_symbol_id: from_id,
        to_symbol_id: to_id,
        relation_type: rel.relation_type,
        call_site_line: rel.call_site_line,
        metadata: None,
    })
}

fn is_test_file(path: &Path) -> bool {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
    if name.ends_with("_test.go") || name.ends_with("_test.py") {
        return true;
    }
    if name.starts_with("test_") && name.ends_with(".py") {
        return true;
    }
    if name.ends_with(".test.ts") || name.ends_with(".test.tsx") {
        return true;
    }
    if name.ends_with(".spec.ts") || name.ends_with(".spec.tsx") {
        return true;
    }
    path.components().any(|c| c.as_os_str() == "tests")
}

/// The indexer (C4): owns no state of its own beyond its configuration and a
/// handle to the repository it writes through.
pub struct Indexer {
    repository: SymbolRepository,
    config: IndexerConfig,
    exclude_set: GlobSet,
}

impl Indexer {
    pub fn new(repository: SymbolRepository, config: IndexerConfig) -> Result<Self> {
        config.validate()?;
        let exclude_set = config.build_exclude_set()?;
        Ok(Self {
            repository,
            config,
            exclude_set,
        })
    }

    pub fn config(&self) -> &IndexerConfig {
        &self.config
    }

    fn configure_pool(&self) {
        rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.workers)
            .build_global()
            .ok();
    }

    /// An entry is excluded if its bare name or its project-relative path
    /// matches any compiled `exclude_patterns` glob. Bare-name matching lets
    /// a pattern like `vendor` exclude that directory at any depth; the
    /// relative-path match is what lets a multi-segment pattern like
    /// `generated/**` or a suffix glob like `*.pb.go` target a location.
    fn entry_allowed(&self, root: &Path, entry: &walkdir::DirEntry) -> bool {
        let name = entry.file_name().to_string_lossy();
        if entry.depth() > 0 && name.starts_with('.') {
            return false;
        }
        let name_str: &str = &name;
        if self.exclude_set.is_match(name_str) {
            return false;
        }
        match self.rel_path(root, entry.path()) {
            Some(rel) => !self.exclude_set.is_match(rel.as_str()),
            None => true,
        }
    }

    fn discover_files(&self, root: &Path) -> Vec<PathBuf> {
        WalkDir::new(root)
            .follow_links(false)
            .into_iter()
            .filter_entry(|e| self.entry_allowed(root, e))
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .filter(|e| parsing::parser_for_path(&e.path().to_string_lossy()).is_some())
            .filter(|e| self.config.include_tests || !is_test_file(e.path()))
            .map(|e| e.path().to_path_buf())
            .collect()
    }

    fn rel_path(&self, root: &Path, abs: &Path) -> Option<String> {
        abs.strip_prefix(root)
            .ok()
            .map(|p| p.to_string_lossy().replace('\\', "/"))
    }

    fn read_file(&self, abs: &Path) -> Result<Vec<u8>> {
        let meta = std::fs::metadata(abs)?;
        if meta.len() > self.config.max_file_size_bytes {
            return Err(Error::validation(format!(
                "{} ({} bytes) exceeds max_file_size_bytes",
                abs.display(),
                meta.len()
            )));
        }
        Ok(std::fs::read(abs)?)
    }

    /// Parses one file's bytes and upserts its symbols and (resolved)
    /// relations. Returns `(symbols_upserted, relations_upserted)`.
    fn parse_and_upsert(
        &self,
        ctx: &CancellationContext,
        rel_path: &str,
        bytes: &[u8],
        hash: &str,
    ) -> Result<(u64, u64)> {
        ctx.check()?;
        let source = String::from_utf8_lossy(bytes);
        let parser = parsing::parser_for_path(rel_path)
            .ok_or_else(|| Error::parse(format!("no parser registered for {rel_path}")))?;
        let ParseResult {
            mut symbols,
            relations,
        } = parser.parse(&source, rel_path)?;

        for sym in symbols.iter_mut() {
            sym.file_hash = Some(hash.to_string());
        }

        let mut name_to_id: HashMap<String, i64> = HashMap::with_capacity(symbols.len());
        for sym in &symbols {
            let id = self.repository.upsert_symbol(ctx, sym)?;
            name_to_id.insert(sym.name.clone(), id);
        }

        let mut relation_count = 0u64;
        for rel in relations {
            if let Some(resolved) = resolve_relation(&name_to_id, rel) {
                self.repository.upsert_relation(ctx, &resolved)?;
                relation_count += 1;
            }
        }

        Ok((symbols.len() as u64, relation_count))
    }

    fn index_one_file(&self, root: &Path, abs: &Path, ctx: &CancellationContext) -> Result<(u64, u64)> {
        ctx.check()?;
        let rel_path = self
            .rel_path(root, abs)
            .ok_or_else(|| Error::fatal(format!("{} escapes index root", abs.display())))?;
        let bytes = self.read_file(abs)?;
        let hash = parsing::hash_file_bytes(&bytes);
        self.parse_and_upsert(ctx, &rel_path, &bytes, &hash)
    }

    fn incremental_one_file(
        &self,
        root: &Path,
        abs: &Path,
        ctx: &CancellationContext,
    ) -> Result<IncrementalOutcome> {
        ctx.check()?;
        let rel_path = self
            .rel_path(root, abs)
            .ok_or_else(|| Error::fatal(format!("{} escapes index root", abs.display())))?;
        let bytes = self.read_file(abs)?;
        let hash = parsing::hash_file_bytes(&bytes);

        if self.repository.file_hash_of(ctx, &rel_path)?.as_deref() == Some(hash.as_str()) {
            return Ok(IncrementalOutcome::Unchanged);
        }

        self.repository.delete_symbols_by_file(ctx, &rel_path)?;
        let (symbols, relations) = self.parse_and_upsert(ctx, &rel_path, &bytes, &hash)?;
        Ok(IncrementalOutcome::Indexed { symbols, relations })
    }

    fn finalize_stats(&self, stats: &mut IndexStats) -> Result<()> {
        stats.symbols_by_language = self.repository.count_by_column("language")?.into_iter().collect();
        stats.symbols_by_kind = self.repository.count_by_column("kind")?.into_iter().collect();
        Ok(())
    }

    pub fn count_supported_files(&self, root: impl AsRef<Path>) -> Result<usize> {
        Ok(self.discover_files(root.as_ref()).len())
    }

    /// Full reindex: clears the store, walks `root`, and parses every
    /// supported file from scratch. Workers run disjoint over files; a
    /// per-file parse or upsert failure is recorded in `IndexStats.errors`
    /// and does not abort the run.
    pub fn index_directory(&self, root: impl AsRef<Path>, ctx: &CancellationContext) -> Result<IndexStats> {
        let root = root.as_ref();
        debug!("index_directory: starting full reindex of {}", root.display());
        let started = Instant::now();
        self.repository.clear_all(ctx)?;
        self.configure_pool();

        let files = self.discover_files(root);
        let mut stats = IndexStats {
            files_scanned: files.len() as u64,
            ..Default::default()
        };

        let outcomes: Vec<Result<(u64, u64)>> = files
            .par_iter()
            .map(|abs| self.index_one_file(root, abs, ctx))
            .collect();

        for (abs, outcome) in files.iter().zip(outcomes) {
            match outcome {
                Ok((symbols, relations)) => {
                    stats.files_indexed += 1;
                    stats.symbols_found += symbols;
                    stats.relations_found += relations;
                }
                Err(e) if e.kind == ErrorKind::Cancelled => return Err(e),
                Err(e) => {
                    warn!("failed to index {}: {e}", abs.display());
                    stats.files_skipped += 1;
                    stats.errors.push(format!("{}: {e}", abs.display()));
                }
            }
        }

        ctx.check()?;
        self.repository.rebuild_symbols_fts(ctx)?;
        self.finalize_stats(&mut stats)?;
        stats.duration_ms = started.elapsed().as_millis() as u64;
        debug!(
            "index_directory complete: {} scanned, {} indexed, {} symbols",
            stats.files_scanned, stats.files_indexed, stats.symbols_found
        );
        Ok(stats)
    }

    /// Re-indexes only files whose content hash changed since the last run,
    /// and prunes files that exist in the store but no longer on disk.
    pub fn incremental_index(&self, root: impl AsRef<Path>, ctx: &CancellationContext) -> Result<IndexStats> {
        let root = root.as_ref();
        let started = Instant::now();
        self.configure_pool();

        let files = self.discover_files(root);
        let mut stats = IndexStats {
            files_scanned: files.len() as u64,
            ..Default::default()
        };

        let disk_paths: HashSet<String> = files.iter().filter_map(|p| self.rel_path(root, p)).collect();
        for known in self.repository.list_file_paths(ctx)? {
            if !disk_paths.contains(&known) {
                self.repository.delete_symbols_by_file(ctx, &known)?;
                debug!("pruned deleted file from index: {known}");
            }
        }

        let outcomes: Vec<Result<IncrementalOutcome>> = files
            .par_iter()
            .map(|abs| self.incremental_one_file(root, abs, ctx))
            .collect();

        for (abs, outcome) in files.iter().zip(outcomes) {
            match outcome {
                Ok(IncrementalOutcome::Unchanged) => stats.files_skipped += 1,
                Ok(IncrementalOutcome::Indexed { symbols, relations }) => {
                    stats.files_indexed += 1;
                    stats.symbols_found += symbols;
                    stats.relations_found += relations;
                }
                Err(e) if e.kind == ErrorKind::Cancelled => return Err(e),
                Err(e) => {
                    warn!("failed to re-index {}: {e}", abs.display());
                    stats.files_skipped += 1;
                    stats.errors.push(format!("{}: {e}", abs.display()));
                }
            }
        }

        ctx.check()?;
        self.repository.rebuild_symbols_fts(ctx)?;
        self.finalize_stats(&mut stats)?;
        stats.duration_ms = started.elapsed().as_millis() as u64;
        debug!(
            "incremental_index complete: {} scanned, {} reindexed, {} unchanged",
            stats.files_scanned, stats.files_indexed, stats.files_skipped
        );
        Ok(stats)
    }

    pub fn clear_index(&self, ctx: &CancellationContext) -> Result<()> {
        self.repository.clear_all(ctx)
    }

    pub fn get_stats(&self, ctx: &CancellationContext) -> Result<IndexStats> {
        let mut stats = IndexStats {
            symbols_found: self.repository.get_symbol_count(ctx)? as u64,
            relations_found: self.repository.get_relation_count(ctx)? as u64,
            files_indexed: self.repository.get_file_count(ctx)? as u64,
            ..Default::default()
        };
        self.finalize_stats(&mut stats)?;
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use codeintel_storage::Store;

    fn write(dir: &tempfile::TempDir, rel: &str, content: &str) -> PathBuf {
        let path = dir.path().join(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(&path, content).unwrap();
        path
    }

    fn indexer() -> (Indexer, SymbolRepository) {
        let repository = SymbolRepository::new(Store::in_memory().unwrap());
        let indexer = Indexer::new(repository.clone(), IndexerConfig::default()).unwrap();
        (indexer, repository)
    }

    const GO_SRC: &str = "package main\n\nfunc Helper() {}\n\nfunc Main() {\n\tHelper()\n}\n";

    #[test]
    fn test_count_supported_files_filters_by_extension() {
        let (indexer, _repo) = indexer();
        let dir = tempfile::tempdir().unwrap();
        write(&dir, "main.go", GO_SRC);
        write(&dir, "README.md", "not code");
        assert_eq!(indexer.count_supported_files(dir.path()).unwrap(), 1);
    }

    #[test]
    fn test_count_supported_files_skips_excluded_dirs() {
        let (indexer, _repo) = indexer();
        let dir = tempfile::tempdir().unwrap();
        write(&dir, "main.go", GO_SRC);
        write(&dir, "vendor/dep.go", GO_SRC);
        write(&dir, "node_modules/pkg/index.go", GO_SRC);
        assert_eq!(indexer.count_supported_files(dir.path()).unwrap(), 1);
    }

    #[test]
    fn test_index_directory_resolves_call_relation() {
        let (indexer, repo) = indexer();
        let dir = tempfile::tempdir().unwrap();
        write(&dir, "main.go", GO_SRC);
        let ctx = CancellationContext::new();

        let stats = indexer.index_directory(dir.path(), &ctx).unwrap();
        assert_eq!(stats.files_indexed, 1);
        assert_eq!(stats.symbols_found, 3); // package + 2 funcs
        assert_eq!(stats.relations_found, 1);
        assert_eq!(repo.get_relation_count(&ctx).unwrap(), 1);

        let main_fn = repo
            .find_symbols_by_name(&ctx, "Main", None)
            .unwrap()
            .into_iter()
            .next()
            .unwrap();
        let callees = repo.get_callees(&ctx, main_fn.id).unwrap();
        assert_eq!(callees.len(), 1);
        assert_eq!(callees[0].name, "Helper");
    }

    #[test]
    fn test_incremental_index_skips_unchanged_file() {
        let (indexer, _repo) = indexer();
        let dir = tempfile::tempdir().unwrap();
        write(&dir, "main.go", GO_SRC);
        let ctx = CancellationContext::new();

        let first = indexer.incremental_index(dir.path(), &ctx).unwrap();
        assert_eq!(first.files_indexed, 1);

        let second = indexer.incremental_index(dir.path(), &ctx).unwrap();
        assert_eq!(second.files_indexed, 0);
        assert_eq!(second.files_skipped, 1);
    }

    #[test]
    fn test_incremental_index_reindexes_changed_file() {
        let (indexer, repo) = indexer();
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "main.go", GO_SRC);
        let ctx = CancellationContext::new();
        indexer.incremental_index(dir.path(), &ctx).unwrap();

        std::fs::write(&path, "package main\n\nfunc Only() {}\n").unwrap();
        let stats = indexer.incremental_index(dir.path(), &ctx).unwrap();
        assert_eq!(stats.files_indexed, 1);
        assert!(repo
            .find_symbols_by_name(&ctx, "Only", None)
            .unwrap()
            .into_iter()
            .next()
            .is_some());
        assert!(repo
            .find_symbols_by_name(&ctx, "Helper", None)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_incremental_index_prunes_deleted_file() {
        let (indexer, repo) = indexer();
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "main.go", GO_SRC);
        let ctx = CancellationContext::new();
        indexer.incremental_index(dir.path(), &ctx).unwrap();
        assert_eq!(repo.get_file_count(&ctx).unwrap(), 1);

        std::fs::remove_file(&path).unwrap();
        indexer.incremental_index(dir.path(), &ctx).unwrap();
        assert_eq!(repo.get_file_count(&ctx).unwrap(), 0);
    }

    #[test]
    fn test_clear_index_removes_everything() {
        let (indexer, repo) = indexer();
        let dir = tempfile::tempdir().unwrap();
        write(&dir, "main.go", GO_SRC);
        let ctx = CancellationContext::new();
        indexer.index_directory(dir.path(), &ctx).unwrap();
        indexer.clear_index(&ctx).unwrap();
        assert_eq!(repo.get_symbol_count(&ctx).unwrap(), 0);
    }

    #[test]
    fn test_get_stats_breaks_down_by_language_and_kind() {
        let (indexer, _repo) = indexer();
        let dir = tempfile::tempdir().unwrap();
        write(&dir, "main.go", GO_SRC);
        let ctx = CancellationContext::new();
        indexer.index_directory(dir.path(), &ctx).unwrap();

        let stats = indexer.get_stats(&ctx).unwrap();
        assert_eq!(stats.symbols_found, 3);
        assert_eq!(stats.symbols_by_language.get("go"), Some(&3));
        assert!(stats.symbols_by_kind.get("function").is_some());
    }

    #[test]
    fn test_cancelled_context_aborts_index_directory() {
        let (indexer, _repo) = indexer();
        let dir = tempfile::tempdir().unwrap();
        write(&dir, "main.go", GO_SRC);
        let ctx = CancellationContext::new();
        ctx.cancel();
        let err = indexer.index_directory(dir.path(), &ctx).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Cancelled);
    }

    #[test]
    fn test_oversized_file_is_skipped_with_error() {
        let repository = SymbolRepository::new(Store::in_memory().unwrap());
        let config = IndexerConfig {
            max_file_size_bytes: 4,
            ..IndexerConfig::default()
        };
        let indexer = Indexer::new(repository, config).unwrap();
        let dir = tempfile::tempdir().unwrap();
        write(&dir, "main.go", GO_SRC);
        let ctx = CancellationContext::new();

        let stats = indexer.index_directory(dir.path(), &ctx).unwrap();
        assert_eq!(stats.files_indexed, 0);
        assert_eq!(stats.files_skipped, 1);
        assert_eq!(stats.errors.len(), 1);
    }

    #[test]
    fn test_exclude_patterns_support_glob_syntax() {
        let repository = SymbolRepository::new(Store::in_memory().unwrap());
        let config = IndexerConfig {
            exclude_patterns: vec!["generated/**".to_string(), "*.pb.go".to_string()],
            ..IndexerConfig::default()
        };
        let indexer = Indexer::new(repository, config).unwrap();
        let dir = tempfile::tempdir().unwrap();
        write(&dir, "main.go", GO_SRC);
        write(&dir, "generated/models.go", GO_SRC);
        write(&dir, "api.pb.go", GO_SRC);
        assert_eq!(indexer.count_supported_files(dir.path()).unwrap(), 1);
    }

    #[test]
    fn test_invalid_exclude_pattern_is_rejected_at_construction() {
        let repository = SymbolRepository::new(Store::in_memory().unwrap());
        let config = IndexerConfig {
            exclude_patterns: vec!["[".to_string()],
            ..IndexerConfig::default()
        };
        assert!(Indexer::new(repository, config).is_err());
    }

    #[test]
    fn test_include_tests_false_skips_test_files() {
        let repository = SymbolRepository::new(Store::in_memory().unwrap());
        let config = IndexerConfig {
            include_tests: false,
            ..IndexerConfig::default()
        };
        let indexer = Indexer::new(repository, config).unwrap();
        let dir = tempfile::tempdir().unwrap();
        write(&dir, "main.go", GO_SRC);
        write(&dir, "main_test.go", GO_SRC);
        assert_eq!(indexer.count_supported_files(dir.path()).unwrap(), 1);
    }
}
