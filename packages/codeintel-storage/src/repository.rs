//! Symbol Repository (C2): CRUD + relation ops, FTS sync, recursive traversal.

use std::collections::{HashMap, HashSet, VecDeque};

use rusqlite::{params, OptionalExtension, Row};

use crate::context::CancellationContext;
use crate::domain::{RelationType, Symbol, SymbolKind, SymbolRelation, Visibility};
use crate::error::{Error, Result};
use crate::store::Store;

#[derive(Clone)]
pub struct SymbolRepository {
    store: Store,
}

fn encode_embedding(v: &[f32]) -> Vec<u8> {
    v.iter().flat_map(|f| f.to_le_bytes()).collect()
}

fn decode_embedding(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

fn row_to_symbol(row: &Row<'_>) -> rusqlite::Result<Symbol> {
    let kind_str: String = row.get("kind")?;
    let visibility_str: String = row.get("visibility")?;
    let embedding_bytes: Option<Vec<u8>> = row.get("embedding")?;
    let last_modified_ts: i64 = row.get("last_modified")?;

    Ok(Symbol {
        id: row.get("id")?,
        name: row.get("name")?,
        kind: SymbolKind::parse(&kind_str).unwrap_or(SymbolKind::Function),
        file_path: row.get("file_path")?,
        start_line: row.get("start_line")?,
        end_line: row.get("end_line")?,
        signature: row.get("signature")?,
        doc_comment: row.get("doc_comment")?,
        module_path: row.get("module_path")?,
        visibility: Visibility::parse(&visibility_str).unwrap_or(Visibility::Private),
        language: row.get("language")?,
        file_hash: row.get("file_hash")?,
        embedding: embedding_bytes.map(|b| decode_embedding(&b)),
        last_modified: chrono::DateTime::from_timestamp(last_modified_ts, 0).unwrap_or_default(),
    })
}

const SYMBOL_COLUMNS: &str = "id, name, kind, file_path, start_line, end_line, signature, \
    doc_comment, module_path, visibility, language, file_hash, embedding, last_modified";

impl SymbolRepository {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Inserts or, on a `(name, file_path, start_line)` conflict, updates in
    /// place and returns the existing id. The embedding column is preserved
    /// across updates: it is managed only by `update_symbol_embedding`.
    pub fn upsert_symbol(&self, ctx: &CancellationContext, sym: &Symbol) -> Result<i64> {
        ctx.check()?;
        if sym.start_line < 1 {
            return Err(Error::validation("start_line must be >= 1"));
        }
        if sym.end_line < sym.start_line {
            return Err(Error::validation("end_line must be >= start_line"));
        }

        let conn = self.store.conn();
        let tx = conn.unchecked_transaction()?;

        let existing_id: Option<i64> = tx
            .query_row(
                "SELECT id FROM symbols WHERE name = ?1 AND file_path = ?2 AND start_line = ?3",
                params![sym.name, sym.file_path, sym.start_line],
                |r| r.get(0),
            )
            .optional()?;

        let last_modified = sym.last_modified.timestamp();

        let id = if let Some(id) = existing_id {
            tx.execute(
                "UPDATE symbols SET kind = ?1, end_line = ?2, signature = ?3, doc_comment = ?4,
                    module_path = ?5, visibility = ?6, language = ?7, file_hash = ?8,
                    last_modified = ?9
                 WHERE id = ?10",
                params![
                    sym.kind.as_str(),
                    sym.end_line,
                    sym.signature,
                    sym.doc_comment,
                    sym.module_path,
                    sym.visibility.as_str(),
                    sym.language,
                    sym.file_hash,
                    last_modified,
                    id,
                ],
            )?;
            id
        } else {
            tx.execute(
                "INSERT INTO symbols
                    (name, kind, file_path, start_line, end_line, signature, doc_comment,
                     module_path, visibility, language, file_hash, last_modified)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                params![
                    sym.name,
                    sym.kind.as_str(),
                    sym.file_path,
                    sym.start_line,
                    sym.end_line,
                    sym.signature,
                    sym.doc_comment,
                    sym.module_path,
                    sym.visibility.as_str(),
                    sym.language,
                    sym.file_hash,
                    last_modified,
                ],
            )?;
            tx.last_insert_rowid()
        };

        tx.execute("DELETE FROM symbols_fts WHERE rowid = ?1", params![id])?;
        tx.execute(
            "INSERT INTO symbols_fts(rowid, name, signature, doc_comment, module_path)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![id, sym.name, sym.signature, sym.doc_comment, sym.module_path],
        )?;

        tx.commit()?;
        Ok(id)
    }

    pub fn get_symbol(&self, ctx: &CancellationContext, id: i64) -> Result<Symbol> {
        ctx.check()?;
        let conn = self.store.conn();
        let sql = format!("SELECT {SYMBOL_COLUMNS} FROM symbols WHERE id = ?1");
        conn.query_row(&sql, params![id], row_to_symbol)
            .optional()?
            .ok_or_else(|| Error::not_found(format!("symbol {id}")))
    }

    pub fn delete_symbol(&self, ctx: &CancellationContext, id: i64) -> Result<()> {
        ctx.check()?;
        let conn = self.store.conn();
        let tx = conn.unchecked_transaction()?;
        tx.execute("DELETE FROM symbols_fts WHERE rowid = ?1", params![id])?;
        let affected = tx.execute("DELETE FROM symbols WHERE id = ?1", params![id])?;
        tx.commit()?;
        if affected == 0 {
            return Err(Error::not_found(format!("symbol {id}")));
        }
        Ok(())
    }

    pub fn delete_symbols_by_file(&self, ctx: &CancellationContext, path: &str) -> Result<()> {
        ctx.check()?;
        let conn = self.store.conn();
        let tx = conn.unchecked_transaction()?;
        let ids: Vec<i64> = {
            let mut stmt = tx.prepare("SELECT id FROM symbols WHERE file_path = ?1")?;
            let rows = stmt.query_map(params![path], |r| r.get(0))?;
            rows.collect::<rusqlite::Result<Vec<_>>>()?
        };
        for id in &ids {
            tx.execute("DELETE FROM symbols_fts WHERE rowid = ?1", params![id])?;
        }
        tx.execute("DELETE FROM symbols WHERE file_path = ?1", params![path])?;
        tx.commit()?;
        Ok(())
    }

    pub fn find_symbols_by_name(
        &self,
        ctx: &CancellationContext,
        name: &str,
        language: Option<&str>,
    ) -> Result<Vec<Symbol>> {
        ctx.check()?;
        let conn = self.store.conn();
        let symbols = if let Some(lang) = language {
            let sql =
                format!("SELECT {SYMBOL_COLUMNS} FROM symbols WHERE name = ?1 AND language = ?2 ORDER BY id ASC");
            let mut stmt = conn.prepare(&sql)?;
            stmt.query_map(params![name, lang], row_to_symbol)?
                .collect::<rusqlite::Result<Vec<_>>>()?
        } else {
            let sql = format!("SELECT {SYMBOL_COLUMNS} FROM symbols WHERE name = ?1 ORDER BY id ASC");
            let mut stmt = conn.prepare(&sql)?;
            stmt.query_map(params![name], row_to_symbol)?
                .collect::<rusqlite::Result<Vec<_>>>()?
        };
        Ok(symbols)
    }

    pub fn find_symbols_by_file(&self, ctx: &CancellationContext, path: &str) -> Result<Vec<Symbol>> {
        ctx.check()?;
        let conn = self.store.conn();
        let sql = format!(
            "SELECT {SYMBOL_COLUMNS} FROM symbols WHERE file_path = ?1 ORDER BY start_line ASC"
        );
        let mut stmt = conn.prepare(&sql)?;
        let symbols = stmt
            .query_map(params![path], row_to_symbol)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(symbols)
    }

    /// Executes an already-sanitized FTS query (see the query service's
    /// sanitization algorithm) and returns results in BM25 rank order, best
    /// first. An empty query yields an empty result, not an error.
    pub fn search_symbols_fts(
        &self,
        ctx: &CancellationContext,
        sanitized_query: &str,
        limit: usize,
    ) -> Result<Vec<Symbol>> {
        ctx.check()?;
        if sanitized_query.is_empty() {
            return Ok(Vec::new());
        }
        let conn = self.store.conn();
        let sql = format!(
            "SELECT {cols} FROM symbols s
             JOIN (SELECT rowid, rank FROM symbols_fts WHERE symbols_fts MATCH ?1) f
               ON s.id = f.rowid
             ORDER BY f.rank ASC, s.id ASC
             LIMIT ?2",
            cols = SYMBOL_COLUMNS
                .split(", ")
                .map(|c| format!("s.{c}"))
                .collect::<Vec<_>>()
                .join(", ")
        );
        let mut stmt = conn.prepare(&sql)?;
        let symbols = stmt
            .query_map(params![sanitized_query, limit as i64], row_to_symbol)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(symbols)
    }

    pub fn upsert_relation(&self, ctx: &CancellationContext, rel: &SymbolRelation) -> Result<()> {
        ctx.check()?;
        let conn = self.store.conn();
        let metadata_json = rel
            .metadata
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        conn.execute(
            "INSERT INTO symbol_relations (from_symbol_id, to_symbol_id, relation_type, call_site_line, metadata)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(from_symbol_id, to_symbol_id, relation_type)
             DO UPDATE SET call_site_line = excluded.call_site_line, metadata = excluded.metadata",
            params![
                rel.from_symbol_id,
                rel.to_symbol_id,
                rel.relation_type.as_str(),
                rel.call_site_line,
                metadata_json,
            ],
        )?;
        Ok(())
    }

    pub fn get_relation_count(&self, ctx: &CancellationContext) -> Result<i64> {
        ctx.check()?;
        let conn = self.store.conn();
        Ok(conn.query_row("SELECT COUNT(*) FROM symbol_relations", [], |r| r.get(0))?)
    }

    pub fn get_symbol_count(&self, ctx: &CancellationContext) -> Result<i64> {
        ctx.check()?;
        let conn = self.store.conn();
        Ok(conn.query_row("SELECT COUNT(*) FROM symbols", [], |r| r.get(0))?)
    }

    /// Distinct `file_path`s currently indexed, for incremental re-indexing
    /// and prune detection.
    pub fn list_file_paths(&self, ctx: &CancellationContext) -> Result<Vec<String>> {
        ctx.check()?;
        let conn = self.store.conn();
        let mut stmt = conn.prepare("SELECT DISTINCT file_path FROM symbols")?;
        let paths = stmt
            .query_map([], |r| r.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(paths)
    }

    /// The stored `file_hash` of an already-indexed file's first symbol, used
    /// by incremental re-indexing to detect unchanged files cheaply. `None`
    /// if the file has no indexed symbols.
    pub fn file_hash_of(&self, ctx: &CancellationContext, path: &str) -> Result<Option<String>> {
        ctx.check()?;
        let conn = self.store.conn();
        let hash: Option<Option<String>> = conn
            .query_row(
                "SELECT file_hash FROM symbols WHERE file_path = ?1 LIMIT 1",
                params![path],
                |r| r.get(0),
            )
            .optional()?;
        Ok(hash.flatten())
    }

    pub fn get_file_count(&self, ctx: &CancellationContext) -> Result<i64> {
        ctx.check()?;
        let conn = self.store.conn();
        Ok(conn.query_row("SELECT COUNT(DISTINCT file_path) FROM symbols", [], |r| {
            r.get(0)
        })?)
    }

    fn symbols_by_relation(
        &self,
        ctx: &CancellationContext,
        id: i64,
        relation_type: RelationType,
        endpoint_is_from: bool,
    ) -> Result<Vec<Symbol>> {
        ctx.check()?;
        let conn = self.store.conn();
        let sql = if endpoint_is_from {
            format!(
                "SELECT {cols} FROM symbols s
                 JOIN symbol_relations r ON r.from_symbol_id = s.id
                 WHERE r.to_symbol_id = ?1 AND r.relation_type = ?2
                 ORDER BY s.id ASC",
                cols = SYMBOL_COLUMNS
                    .split(", ")
                    .map(|c| format!("s.{c}"))
                    .collect::<Vec<_>>()
                    .join(", ")
            )
        } else {
            format!(
                "SELECT {cols} FROM symbols s
                 JOIN symbol_relations r ON r.to_symbol_id = s.id
                 WHERE r.from_symbol_id = ?1 AND r.relation_type = ?2
                 ORDER BY s.id ASC",
                cols = SYMBOL_COLUMNS
                    .split(", ")
                    .map(|c| format!("s.{c}"))
                    .collect::<Vec<_>>()
                    .join(", ")
            )
        };
        let mut stmt = conn.prepare(&sql)?;
        let symbols = stmt
            .query_map(params![id, relation_type.as_str()], row_to_symbol)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(symbols)
    }

    /// Symbols `x` such that `(x, id, calls)` exists.
    pub fn get_callers(&self, ctx: &CancellationContext, id: i64) -> Result<Vec<Symbol>> {
        self.symbols_by_relation(ctx, id, RelationType::Calls, true)
    }

    /// Symbols `y` such that `(id, y, calls)` exists.
    pub fn get_callees(&self, ctx: &CancellationContext, id: i64) -> Result<Vec<Symbol>> {
        self.symbols_by_relation(ctx, id, RelationType::Calls, false)
    }

    /// Symbols `x` such that `(x, id, implements)` exists.
    pub fn get_implementations(&self, ctx: &CancellationContext, id: i64) -> Result<Vec<Symbol>> {
        self.symbols_by_relation(ctx, id, RelationType::Implements, true)
    }

    /// Reverse-`calls` BFS from `id` up to `max_depth` hops. Each symbol is
    /// kept at the smallest depth it is reachable at; cycles cannot cause
    /// non-termination because of the `visited` set.
    pub fn get_impact_radius(
        &self,
        ctx: &CancellationContext,
        id: i64,
        max_depth: i64,
    ) -> Result<Vec<(Symbol, i64)>> {
        ctx.check()?;
        if max_depth < 1 {
            return Err(Error::validation("max_depth must be >= 1"));
        }

        let mut visited: HashSet<i64> = HashSet::new();
        visited.insert(id);
        let mut queue: VecDeque<(i64, i64)> = VecDeque::new();
        queue.push_back((id, 0));
        let mut result: Vec<(i64, i64)> = Vec::new();

        while let Some((current, depth)) = queue.pop_front() {
            ctx.check()?;
            if depth >= max_depth {
                continue;
            }
            for caller in self.get_callers(ctx, current)? {
                if visited.insert(caller.id) {
                    result.push((caller.id, depth + 1));
                    queue.push_back((caller.id, depth + 1));
                }
            }
        }

        result.sort_by_key(|(sid, _)| *sid);
        let mut out = Vec::with_capacity(result.len());
        for (sid, depth) in result {
            out.push((self.get_symbol(ctx, sid)?, depth));
        }
        Ok(out)
    }

    pub fn update_symbol_embedding(
        &self,
        ctx: &CancellationContext,
        id: i64,
        vector: &[f32],
    ) -> Result<()> {
        ctx.check()?;
        let conn = self.store.conn();
        let bytes = encode_embedding(vector);
        let affected = conn.execute(
            "UPDATE symbols SET embedding = ?1 WHERE id = ?2",
            params![bytes, id],
        )?;
        if affected == 0 {
            return Err(Error::not_found(format!("symbol {id}")));
        }
        Ok(())
    }

    pub fn get_symbols_without_embeddings(
        &self,
        ctx: &CancellationContext,
        limit: usize,
    ) -> Result<Vec<Symbol>> {
        ctx.check()?;
        let conn = self.store.conn();
        let sql =
            format!("SELECT {SYMBOL_COLUMNS} FROM symbols WHERE embedding IS NULL ORDER BY id ASC LIMIT ?1");
        let mut stmt = conn.prepare(&sql)?;
        let symbols = stmt
            .query_map(params![limit as i64], row_to_symbol)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(symbols)
    }

    pub fn list_symbols_with_embeddings(&self, ctx: &CancellationContext) -> Result<Vec<Symbol>> {
        ctx.check()?;
        let conn = self.store.conn();
        let sql =
            format!("SELECT {SYMBOL_COLUMNS} FROM symbols WHERE embedding IS NOT NULL ORDER BY id ASC");
        let mut stmt = conn.prepare(&sql)?;
        let symbols = stmt
            .query_map([], row_to_symbol)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(symbols)
    }

    pub fn rebuild_symbols_fts(&self, ctx: &CancellationContext) -> Result<()> {
        ctx.check()?;
        self.store.rebuild_fts()
    }

    fn find_ids_by_prefix(&self, table: &str, prefix: &str) -> Result<Vec<String>> {
        let conn = self.store.conn();
        let sql = format!("SELECT id FROM {table} WHERE id LIKE ?1 ORDER BY id ASC");
        let mut stmt = conn.prepare(&sql)?;
        let pattern = format!("{prefix}%");
        let ids = stmt
            .query_map(params![pattern], |r| r.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(ids)
    }

    pub fn find_task_ids_by_prefix(
        &self,
        ctx: &CancellationContext,
        prefix: &str,
    ) -> Result<Vec<String>> {
        ctx.check()?;
        self.find_ids_by_prefix("tasks", prefix)
    }

    pub fn find_plan_ids_by_prefix(
        &self,
        ctx: &CancellationContext,
        prefix: &str,
    ) -> Result<Vec<String>> {
        ctx.check()?;
        self.find_ids_by_prefix("plans", prefix)
    }

    /// Crate-internal accessor for callers (e.g. the indexer) that need to
    /// register a task/plan id for prefix resolution.
    pub fn register_task_id(&self, id: &str) -> Result<()> {
        let conn = self.store.conn();
        conn.execute(
            "INSERT OR IGNORE INTO tasks (id) VALUES (?1)",
            params![id],
        )?;
        Ok(())
    }

    pub fn register_plan_id(&self, id: &str) -> Result<()> {
        let conn = self.store.conn();
        conn.execute(
            "INSERT OR IGNORE INTO plans (id) VALUES (?1)",
            params![id],
        )?;
        Ok(())
    }

    /// Counts grouped by `column` (`"language"` or `"kind"`), for the
    /// indexer's `get_stats` breakdown.
    pub fn count_by_column(&self, column: &str) -> Result<HashMap<String, u64>> {
        count_by(&self.store, column)
    }

    /// Truncates `symbols`; `symbol_relations` cascades via its foreign keys.
    pub fn clear_all(&self, ctx: &CancellationContext) -> Result<()> {
        ctx.check()?;
        let conn = self.store.conn();
        let tx = conn.unchecked_transaction()?;
        tx.execute("DELETE FROM symbols_fts", [])?;
        tx.execute("DELETE FROM symbols", [])?;
        tx.commit()?;
        Ok(())
    }
}

/// Counts grouped by a symbol column, used by the indexer's `get_stats`.
pub fn count_by(
    store: &Store,
    column: &str,
) -> Result<HashMap<String, u64>> {
    let conn = store.conn();
    let sql = format!("SELECT {column}, COUNT(*) FROM symbols GROUP BY {column}");
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([], |r| {
        let key: String = r.get(0)?;
        let count: i64 = r.get(1)?;
        Ok((key, count as u64))
    })?;
    let mut map = HashMap::new();
    for row in rows {
        let (key, count) = row?;
        map.insert(key, count);
    }
    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn make_symbol(name: &str, file: &str, start: i64, end: i64) -> Symbol {
        Symbol {
            id: 0,
            name: name.to_string(),
            kind: SymbolKind::Function,
            file_path: file.to_string(),
            start_line: start,
            end_line: end,
            signature: Some(format!("func {name}()")),
            doc_comment: None,
            module_path: None,
            visibility: Visibility::Public,
            language: "go".to_string(),
            file_hash: None,
            embedding: None,
            last_modified: Utc::now(),
        }
    }

    fn repo() -> SymbolRepository {
        SymbolRepository::new(Store::in_memory().unwrap())
    }

    #[test]
    fn test_upsert_idempotent_same_key() {
        // upsert conflict updates in place and returns the existing id.
        let repo = repo();
        let ctx = CancellationContext::new();
        let mut sym = make_symbol("MyFunc", "test.go", 1, 10);
        let id = repo.upsert_symbol(&ctx, &sym).unwrap();

        sym.end_line = 20;
        sym.signature = Some("func MyFunc(x int)".to_string());
        let id2 = repo.upsert_symbol(&ctx, &sym).unwrap();

        assert_eq!(id, id2);
        let fetched = repo.get_symbol(&ctx, id).unwrap();
        assert_eq!(fetched.end_line, 20);
        assert_eq!(fetched.signature.as_deref(), Some("func MyFunc(x int)"));
    }

    #[test]
    fn test_upsert_preserves_embedding() {
        let repo = repo();
        let ctx = CancellationContext::new();
        let sym = make_symbol("Embedded", "a.go", 1, 5);
        let id = repo.upsert_symbol(&ctx, &sym).unwrap();
        repo.update_symbol_embedding(&ctx, id, &[1.0, 2.0, 3.0]).unwrap();

        repo.upsert_symbol(&ctx, &sym).unwrap();
        let fetched = repo.get_symbol(&ctx, id).unwrap();
        assert_eq!(fetched.embedding, Some(vec![1.0, 2.0, 3.0]));
    }

    #[test]
    fn test_delete_symbol_removes_fts_row() {
        let repo = repo();
        let ctx = CancellationContext::new();
        let sym = make_symbol("Gone", "a.go", 1, 5);
        let id = repo.upsert_symbol(&ctx, &sym).unwrap();
        repo.delete_symbol(&ctx, id).unwrap();
        assert!(repo.get_symbol(&ctx, id).unwrap_err().is_not_found());
    }

    #[test]
    fn test_delete_cascades_relations() {
        let repo = repo();
        let ctx = CancellationContext::new();
        let a = repo.upsert_symbol(&ctx, &make_symbol("A", "a.go", 1, 2)).unwrap();
        let b = repo.upsert_symbol(&ctx, &make_symbol("B", "a.go", 3, 4)).unwrap();
        repo.upsert_relation(
            &ctx,
            &SymbolRelation {
                from_symbol_id: a,
                to_symbol_id: b,
                relation_type: RelationType::Calls,
                call_site_line: Some(3),
                metadata: None,
            },
        )
        .unwrap();
        assert_eq!(repo.get_relation_count(&ctx).unwrap(), 1);
        repo.delete_symbol(&ctx, a).unwrap();
        assert_eq!(repo.get_relation_count(&ctx).unwrap(), 0);
    }

    #[test]
    fn test_impact_chain_reports_depth_per_hop() {
        // A -> B -> C -> D (calls); impact radius from D reaches C@1, B@2, A@3.
        let repo = repo();
        let ctx = CancellationContext::new();
        let a = repo.upsert_symbol(&ctx, &make_symbol("A", "a.go", 1, 2)).unwrap();
        let b = repo.upsert_symbol(&ctx, &make_symbol("B", "a.go", 3, 4)).unwrap();
        let c = repo.upsert_symbol(&ctx, &make_symbol("C", "a.go", 5, 6)).unwrap();
        let d = repo.upsert_symbol(&ctx, &make_symbol("D", "a.go", 7, 8)).unwrap();
        for (from, to) in [(a, b), (b, c), (c, d)] {
            repo.upsert_relation(
                &ctx,
                &SymbolRelation {
                    from_symbol_id: from,
                    to_symbol_id: to,
                    relation_type: RelationType::Calls,
                    call_site_line: None,
                    metadata: None,
                },
            )
            .unwrap();
        }

        let radius = repo.get_impact_radius(&ctx, d, 10).unwrap();
        let mut by_id: HashMap<i64, i64> = HashMap::new();
        for (sym, depth) in &radius {
            by_id.insert(sym.id, *depth);
        }
        assert_eq!(by_id.get(&c), Some(&1));
        assert_eq!(by_id.get(&b), Some(&2));
        assert_eq!(by_id.get(&a), Some(&3));
        assert_eq!(radius.len(), 3);
    }

    #[test]
    fn test_impact_cycle_terminates() {
        // A -> B -> C -> A; the traversal must not loop forever on the cycle.
        let repo = repo();
        let ctx = CancellationContext::new();
        let a = repo.upsert_symbol(&ctx, &make_symbol("A", "a.go", 1, 2)).unwrap();
        let b = repo.upsert_symbol(&ctx, &make_symbol("B", "a.go", 3, 4)).unwrap();
        let c = repo.upsert_symbol(&ctx, &make_symbol("C", "a.go", 5, 6)).unwrap();
        for (from, to) in [(a, b), (b, c), (c, a)] {
            repo.upsert_relation(
                &ctx,
                &SymbolRelation {
                    from_symbol_id: from,
                    to_symbol_id: to,
                    relation_type: RelationType::Calls,
                    call_site_line: None,
                    metadata: None,
                },
            )
            .unwrap();
        }

        let radius = repo.get_impact_radius(&ctx, c, 10).unwrap();
        let ids: HashSet<i64> = radius.iter().map(|(s, _)| s.id).collect();
        assert!(ids.is_subset(&HashSet::from([a, b])));
        assert_eq!(ids.len(), radius.len());
    }

    #[test]
    fn test_impact_diamond_keeps_shortest_depth_per_symbol() {
        // A->B, A->C, B->D, C->D; impact radius from D reaches B@1, C@1, A@2 (not A@2 and A@3).
        let repo = repo();
        let ctx = CancellationContext::new();
        let a = repo.upsert_symbol(&ctx, &make_symbol("A", "a.go", 1, 2)).unwrap();
        let b = repo.upsert_symbol(&ctx, &make_symbol("B", "a.go", 3, 4)).unwrap();
        let c = repo.upsert_symbol(&ctx, &make_symbol("C", "a.go", 5, 6)).unwrap();
        let d = repo.upsert_symbol(&ctx, &make_symbol("D", "a.go", 7, 8)).unwrap();
        for (from, to) in [(a, b), (a, c), (b, d), (c, d)] {
            repo.upsert_relation(
                &ctx,
                &SymbolRelation {
                    from_symbol_id: from,
                    to_symbol_id: to,
                    relation_type: RelationType::Calls,
                    call_site_line: None,
                    metadata: None,
                },
            )
            .unwrap();
        }

        let radius = repo.get_impact_radius(&ctx, d, 5).unwrap();
        let mut by_depth: HashMap<i64, Vec<i64>> = HashMap::new();
        for (sym, depth) in &radius {
            by_depth.entry(*depth).or_default().push(sym.id);
        }
        assert_eq!(radius.len(), 3);
        assert_eq!(by_depth.get(&1).map(|v| v.len()), Some(2));
        assert_eq!(by_depth.get(&2).map(|v| v.len()), Some(1));
    }

    #[test]
    fn test_impact_leaf_empty() {
        let repo = repo();
        let ctx = CancellationContext::new();
        let a = repo.upsert_symbol(&ctx, &make_symbol("Leaf", "a.go", 1, 2)).unwrap();
        let radius = repo.get_impact_radius(&ctx, a, 5).unwrap();
        assert!(radius.is_empty());
    }

    #[test]
    fn test_find_symbols_by_file_ordered_by_start_line() {
        let repo = repo();
        let ctx = CancellationContext::new();
        repo.upsert_symbol(&ctx, &make_symbol("Second", "a.go", 10, 20)).unwrap();
        repo.upsert_symbol(&ctx, &make_symbol("First", "a.go", 1, 5)).unwrap();
        let symbols = repo.find_symbols_by_file(&ctx, "a.go").unwrap();
        assert_eq!(symbols[0].name, "First");
        assert_eq!(symbols[1].name, "Second");
    }

    #[test]
    fn test_search_symbols_fts_empty_query() {
        let repo = repo();
        let ctx = CancellationContext::new();
        let results = repo.search_symbols_fts(&ctx, "", 10).unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn test_search_symbols_fts_matches() {
        let repo = repo();
        let ctx = CancellationContext::new();
        repo.upsert_symbol(&ctx, &make_symbol("HandleRequest", "a.go", 1, 5)).unwrap();
        let results = repo.search_symbols_fts(&ctx, "\"handlerequest\"", 10).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].name, "HandleRequest");
    }

    #[test]
    fn test_task_prefix_resolution() {
        let repo = repo();
        let ctx = CancellationContext::new();
        repo.register_task_id("abcd1234").unwrap();
        repo.register_task_id("abcd5678").unwrap();
        let matches = repo.find_task_ids_by_prefix(&ctx, "abcd").unwrap();
        assert_eq!(matches.len(), 2);
    }
}
