//! The embedded relational backend (C1): schema owner and transactional boundary.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use rusqlite::Connection;

use crate::error::Result;

/// Single transactional SQLite backend shared by the repository and audit store.
///
/// Owns the on-disk data file exclusively; every other component holds only a
/// cloned handle to this struct, never a raw `Connection`.
#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

impl Store {
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(db_path)?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// In-memory store, for tests.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema()?;
        Ok(store)
    }

    pub(crate) fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap()
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.conn();
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS symbols (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                kind TEXT NOT NULL,
                file_path TEXT NOT NULL,
                start_line INTEGER NOT NULL,
                end_line INTEGER NOT NULL,
                signature TEXT,
                doc_comment TEXT,
                module_path TEXT,
                visibility TEXT NOT NULL,
                language TEXT NOT NULL,
                file_hash TEXT,
                embedding BLOB,
                last_modified INTEGER NOT NULL,
                UNIQUE(name, file_path, start_line)
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_symbols_file_path ON symbols(file_path)",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_symbols_name ON symbols(name)",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_symbols_language ON symbols(language)",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS symbol_relations (
                from_symbol_id INTEGER NOT NULL REFERENCES symbols(id) ON DELETE CASCADE,
                to_symbol_id INTEGER NOT NULL REFERENCES symbols(id) ON DELETE CASCADE,
                relation_type TEXT NOT NULL,
                call_site_line INTEGER,
                metadata TEXT,
                PRIMARY KEY (from_symbol_id, to_symbol_id, relation_type)
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_relations_to ON symbol_relations(to_symbol_id, relation_type)",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_relations_from ON symbol_relations(from_symbol_id, relation_type)",
            [],
        )?;

        conn.execute(
            "CREATE VIRTUAL TABLE IF NOT EXISTS symbols_fts USING fts5(
                name, signature, doc_comment, module_path,
                content='', contentless_delete=1
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS policy_decisions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                decision_id TEXT NOT NULL UNIQUE,
                policy_path TEXT NOT NULL,
                result TEXT NOT NULL,
                violations_json TEXT NOT NULL,
                input_json TEXT NOT NULL,
                task_id TEXT,
                session_id TEXT,
                evaluated_at INTEGER NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_decisions_task ON policy_decisions(task_id)",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_decisions_session ON policy_decisions(session_id)",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_decisions_result ON policy_decisions(result)",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_decisions_evaluated_at ON policy_decisions(evaluated_at)",
            [],
        )?;

        // Minimal reference tables backing the id-resolution utility (spec §6.5);
        // task/plan lifecycle itself lives in an external collaborator.
        conn.execute(
            "CREATE TABLE IF NOT EXISTS tasks (id TEXT PRIMARY KEY)",
            [],
        )?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS plans (id TEXT PRIMARY KEY)",
            [],
        )?;

        Ok(())
    }

    /// Reconstructs `symbols_fts` from scratch from the current `symbols` table.
    /// Used after bulk restores or schema migrations.
    pub fn rebuild_fts(&self) -> Result<()> {
        let conn = self.conn();
        let tx = conn.unchecked_transaction()?;
        tx.execute("DELETE FROM symbols_fts", [])?;
        tx.execute(
            "INSERT INTO symbols_fts(rowid, name, signature, doc_comment, module_path)
             SELECT id, name, signature, doc_comment, module_path FROM symbols",
            [],
        )?;
        tx.commit()?;
        Ok(())
    }
}
