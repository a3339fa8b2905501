//! Embedded relational storage for the code intelligence engine.
//!
//! Owns the on-disk data file (SQLite, with FTS5) exclusively: the Store
//! (C1) is the schema owner and transactional boundary, the Symbol
//! Repository (C2) layers CRUD and traversal queries over it, and the Audit
//! Store (C8) persists policy decisions for compliance and retention.

pub mod audit;
pub mod context;
pub mod domain;
pub mod error;
pub mod repository;
pub mod store;

pub use audit::{AuditStore, ListOpts, RetentionPlan};
pub use context::CancellationContext;
pub use domain::{
    IndexStats, PolicyDecision, PolicyFile, PolicyResult, RelationType, Rule, RuleSource,
    RuleType, Severity, Symbol, SymbolKind, SymbolRelation, Visibility,
};
pub use error::{Error, ErrorKind, Result};
pub use repository::SymbolRepository;
pub use store::Store;
