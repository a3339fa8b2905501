//! Query Service (C6): hybrid search and call-graph/impact-analysis queries
//! over the symbol repository. Read-mostly; the only mutation it performs is
//! via `update_symbol_embedding`, when backfilling missing embeddings.

mod sanitize;

use std::collections::{BTreeMap, HashMap, HashSet};

use codeintel_storage::{CancellationContext, Symbol, SymbolKind, SymbolRepository};
use tracing::warn;

use crate::config::QueryConfig;
use crate::errors::Result;

pub use sanitize::sanitize_fts_query;

/// External collaborator (spec §4.5, §6.2): generates a fixed-width
/// embedding for a piece of text. Failures are non-fatal to search; the
/// query service falls back to FTS-only ranking.
pub trait EmbeddingClient: Send + Sync {
    fn generate_embedding(&self, text: &str) -> Result<Vec<f32>>;
}

/// Which retrieval path(s) contributed to a hybrid search hit's score.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchSource {
    Fts,
    Vector,
    Hybrid,
}

#[derive(Debug, Clone, Copy, Default)]
struct MatchFlags {
    fts: bool,
    vector: bool,
}

impl MatchFlags {
    fn resolve(self) -> MatchSource {
        match (self.fts, self.vector) {
            (true, true) => MatchSource::Hybrid,
            (true, false) => MatchSource::Fts,
            (false, _) => MatchSource::Vector,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SearchHit {
    pub symbol: Symbol,
    pub score: f32,
    pub source: MatchSource,
}

/// Result of `analyze_impact` (spec §4.6.3).
#[derive(Debug, Clone)]
pub struct ImpactAnalysis {
    pub source: Symbol,
    pub affected: Vec<(Symbol, i64)>,
    pub by_depth: BTreeMap<i64, Vec<Symbol>>,
    pub affected_count: usize,
    pub affected_files: usize,
    pub max_depth: i64,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct QueryStats {
    pub symbols: i64,
    pub relations: i64,
    pub files: i64,
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

pub struct QueryService {
    repository: SymbolRepository,
    config: QueryConfig,
    embedding_client: Option<Box<dyn EmbeddingClient>>,
}

impl QueryService {
    pub fn new(repository: SymbolRepository, config: QueryConfig) -> Self {
        Self {
            repository,
            config,
            embedding_client: None,
        }
    }

    pub fn with_embedding_client(mut self, client: Box<dyn EmbeddingClient>) -> Self {
        self.embedding_client = Some(client);
        self
    }

    fn hybrid_search_raw(&self, ctx: &CancellationContext, query: &str, limit: usize) -> Result<Vec<SearchHit>> {
        ctx.check()?;
        let sanitized = sanitize_fts_query(query);
        let mut combined: HashMap<i64, (Symbol, f32, MatchFlags)> = HashMap::new();

        if !sanitized.is_empty() {
            match self.repository.search_symbols_fts(ctx, &sanitized, 2 * limit) {
                Ok(hits) => {
                    let n = hits.len() as f32;
                    for (i, sym) in hits.into_iter().enumerate() {
                        let fts_score = 1.0 - (i as f32) / (n + 1.0);
                        let entry = combined
                            .entry(sym.id)
                            .or_insert_with(|| (sym.clone(), 0.0, MatchFlags::default()));
                        entry.1 += fts_score * self.config.fts_weight;
                        entry.2.fts = true;
                    }
                }
                Err(e) => warn!("fts search failed, continuing vector-only: {e}"),
            }
        }

        if let Some(client) = &self.embedding_client {
            match client.generate_embedding(query) {
                Ok(query_vec) => {
                    for sym in self.repository.list_symbols_with_embeddings(ctx)? {
                        let Some(emb) = sym.embedding.as_ref() else {
                            continue;
                        };
                        let sim = cosine_similarity(&query_vec, emb);
                        if sim < self.config.vector_threshold {
                            continue;
                        }
                        let entry = combined
                            .entry(sym.id)
                            .or_insert_with(|| (sym.clone(), 0.0, MatchFlags::default()));
                        entry.1 += sim * self.config.vector_weight;
                        entry.2.vector = true;
                    }
                }
                Err(e) => warn!("embedding generation failed, continuing fts-only: {e}"),
            }
        }

        let mut hits: Vec<SearchHit> = combined
            .into_values()
            .filter(|(_, score, _)| *score >= self.config.min_result_threshold)
            .map(|(symbol, score, flags)| SearchHit {
                symbol,
                score,
                source: flags.resolve(),
            })
            .collect();

        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.symbol.id.cmp(&b.symbol.id))
        });
        hits.truncate(limit);
        Ok(hits)
    }

    fn resolve_limit(&self, limit: usize) -> usize {
        if limit > 0 {
            limit
        } else {
            self.config.default_limit
        }
    }

    pub fn hybrid_search(&self, ctx: &CancellationContext, query: &str, limit: usize) -> Result<Vec<SearchHit>> {
        let l = self.resolve_limit(limit);
        self.hybrid_search_raw(ctx, query, l)
    }

    pub fn search_by_kind(
        &self,
        ctx: &CancellationContext,
        query: &str,
        kind: SymbolKind,
        limit: usize,
    ) -> Result<Vec<SearchHit>> {
        let l = self.resolve_limit(limit);
        let pool = self.hybrid_search_raw(ctx, query, l * 3)?;
        Ok(pool.into_iter().filter(|h| h.symbol.kind == kind).take(l).collect())
    }

    pub fn search_by_file(
        &self,
        ctx: &CancellationContext,
        query: &str,
        path: &str,
        limit: usize,
    ) -> Result<Vec<SearchHit>> {
        let l = self.resolve_limit(limit);
        let pool = self.hybrid_search_raw(ctx, query, l * 3)?;
        Ok(pool.into_iter().filter(|h| h.symbol.file_path == path).take(l).collect())
    }

    pub fn find_symbol(&self, ctx: &CancellationContext, id: i64) -> Result<Symbol> {
        self.repository.get_symbol(ctx, id)
    }

    pub fn find_symbol_by_name(&self, ctx: &CancellationContext, name: &str) -> Result<Vec<Symbol>> {
        self.repository.find_symbols_by_name(ctx, name, None)
    }

    pub fn find_symbol_by_name_and_lang(
        &self,
        ctx: &CancellationContext,
        name: &str,
        language: &str,
    ) -> Result<Vec<Symbol>> {
        self.repository.find_symbols_by_name(ctx, name, Some(language))
    }

    pub fn get_symbols_in_file(&self, ctx: &CancellationContext, path: &str) -> Result<Vec<Symbol>> {
        self.repository.find_symbols_by_file(ctx, path)
    }

    pub fn get_callers(&self, ctx: &CancellationContext, id: i64) -> Result<Vec<Symbol>> {
        self.repository.get_callers(ctx, id)
    }

    pub fn get_callees(&self, ctx: &CancellationContext, id: i64) -> Result<Vec<Symbol>> {
        self.repository.get_callees(ctx, id)
    }

    pub fn get_implementations(&self, ctx: &CancellationContext, id: i64) -> Result<Vec<Symbol>> {
        self.repository.get_implementations(ctx, id)
    }

    /// Reverse-`calls` BFS from `symbol_id` (spec §4.6.3). `max_depth <= 0`
    /// falls back to the configured `max_impact_depth`.
    pub fn analyze_impact(
        &self,
        ctx: &CancellationContext,
        symbol_id: i64,
        max_depth: i64,
    ) -> Result<ImpactAnalysis> {
        let source = self.repository.get_symbol(ctx, symbol_id)?;
        let depth = if max_depth <= 0 { self.config.max_impact_depth } else { max_depth };
        let affected = self.repository.get_impact_radius(ctx, symbol_id, depth)?;

        let mut by_depth: BTreeMap<i64, Vec<Symbol>> = BTreeMap::new();
        let mut files: HashSet<String> = HashSet::new();
        for (sym, d) in &affected {
            files.insert(sym.file_path.clone());
            by_depth.entry(*d).or_default().push(sym.clone());
        }

        Ok(ImpactAnalysis {
            affected_count: affected.len(),
            affected_files: files.len(),
            max_depth: depth,
            source,
            affected,
            by_depth,
        })
    }

    pub fn get_stats(&self, ctx: &CancellationContext) -> Result<QueryStats> {
        Ok(QueryStats {
            symbols: self.repository.get_symbol_count(ctx)?,
            relations: self.repository.get_relation_count(ctx)?,
            files: self.repository.get_file_count(ctx)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use codeintel_storage::{RelationType, Store, SymbolRelation, Visibility};

    struct StubEmbeddingClient {
        vector: Vec<f32>,
    }

    impl EmbeddingClient for StubEmbeddingClient {
        fn generate_embedding(&self, _text: &str) -> Result<Vec<f32>> {
            Ok(self.vector.clone())
        }
    }

    fn make_symbol(name: &str, file: &str, kind: SymbolKind) -> Symbol {
        Symbol {
            id: 0,
            name: name.to_string(),
            kind,
            file_path: file.to_string(),
            start_line: 1,
            end_line: 5,
            signature: Some(format!("fn {name}()")),
            doc_comment: None,
            module_path: None,
            visibility: Visibility::Public,
            language: "go".to_string(),
            file_hash: None,
            embedding: None,
            last_modified: Utc::now(),
        }
    }

    fn service() -> (QueryService, SymbolRepository) {
        let repo = SymbolRepository::new(Store::in_memory().unwrap());
        (QueryService::new(repo.clone(), QueryConfig::default()), repo)
    }

    #[test]
    fn test_hybrid_search_ranks_fts_hit() {
        let (svc, repo) = service();
        let ctx = CancellationContext::new();
        repo.upsert_symbol(&ctx, &make_symbol("ParseConfig", "a.go", SymbolKind::Function))
            .unwrap();
        repo.upsert_symbol(&ctx, &make_symbol("WriteConfig", "a.go", SymbolKind::Function))
            .unwrap();

        let hits = svc.hybrid_search(&ctx, "ParseConfig", 10).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].symbol.name, "ParseConfig");
        assert_eq!(hits[0].source, MatchSource::Fts);
    }

    #[test]
    fn test_hybrid_search_empty_query_yields_no_fts_results() {
        let (svc, repo) = service();
        let ctx = CancellationContext::new();
        repo.upsert_symbol(&ctx, &make_symbol("Anything", "a.go", SymbolKind::Function))
            .unwrap();
        let hits = svc.hybrid_search(&ctx, "the of a", 10).unwrap();
        assert!(hits.is_empty());
    }

    #[test]
    fn test_search_by_kind_filters() {
        let (svc, repo) = service();
        let ctx = CancellationContext::new();
        repo.upsert_symbol(&ctx, &make_symbol("Worker", "a.go", SymbolKind::Function))
            .unwrap();
        repo.upsert_symbol(&ctx, &make_symbol("WorkerPool", "a.go", SymbolKind::Struct))
            .unwrap();

        let hits = svc.search_by_kind(&ctx, "Worker*", SymbolKind::Struct, 10).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].symbol.name, "WorkerPool");
    }

    #[test]
    fn test_vector_search_respects_threshold_and_combines_with_fts() {
        let repo = SymbolRepository::new(Store::in_memory().unwrap());
        let ctx = CancellationContext::new();
        let id = repo
            .upsert_symbol(&ctx, &make_symbol("Match", "a.go", SymbolKind::Function))
            .unwrap();
        repo.update_symbol_embedding(&ctx, id, &[1.0, 0.0]).unwrap();

        let svc = QueryService::new(repo, QueryConfig::default())
            .with_embedding_client(Box::new(StubEmbeddingClient { vector: vec![1.0, 0.0] }));

        let hits = svc.hybrid_search(&ctx, "Match", 10).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].source, MatchSource::Hybrid);
    }

    #[test]
    fn test_analyze_impact_defaults_max_depth_from_config() {
        let (svc, repo) = service();
        let ctx = CancellationContext::new();
        let a = repo.upsert_symbol(&ctx, &make_symbol("A", "a.go", SymbolKind::Function)).unwrap();
        let b = repo.upsert_symbol(&ctx, &make_symbol("B", "a.go", SymbolKind::Function)).unwrap();
        repo.upsert_relation(
            &ctx,
            &SymbolRelation {
                from_symbol_id: a,
                to_symbol_id: b,
                relation_type: RelationType::Calls,
                call_site_line: None,
                metadata: None,
            },
        )
        .unwrap();

        let analysis = svc.analyze_impact(&ctx, b, 0).unwrap();
        assert_eq!(analysis.max_depth, QueryConfig::default().max_impact_depth);
        assert_eq!(analysis.affected_count, 1);
        assert_eq!(analysis.affected_files, 1);
        assert_eq!(analysis.by_depth.get(&1).unwrap()[0].name, "A");
    }

    #[test]
    fn test_cosine_similarity_mismatched_lengths_is_zero() {
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[1.0]), 0.0);
    }

    #[test]
    fn test_cosine_similarity_zero_vector_is_zero() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }

    #[test]
    fn test_get_stats_counts() {
        let (svc, repo) = service();
        let ctx = CancellationContext::new();
        repo.upsert_symbol(&ctx, &make_symbol("A", "a.go", SymbolKind::Function)).unwrap();
        let stats = svc.get_stats(&ctx).unwrap();
        assert_eq!(stats.symbols, 1);
        assert_eq!(stats.files, 1);
    }
}
