//! Code intelligence engine core: language parsers, the file-system
//! indexer, the hybrid query service, the policy engine, and id resolution.
//! Storage (the embedded relational store and repository) lives in
//! `codeintel-storage`; this crate is everything built on top of it.

/// Engine configuration (indexer/query/policy tunables).
pub mod config;

/// Shared error type, re-exported from `codeintel-storage`.
pub mod errors;

/// Language Parsers (C3): per-language file -> (symbols, relations) extraction.
pub mod parsing;

/// File-System Indexer (C4): tree walk + parser dispatch + repository upserts.
pub mod indexer;

/// Query Service (C6): hybrid search and call-graph/impact-analysis queries.
pub mod query;

/// Policy Engine (C7): declarative policy evaluation.
pub mod policy;

/// Short-prefix id resolution (spec's task/plan id lookup utility).
pub mod id_resolver;

pub use errors::{Error, ErrorKind, Result};
pub use indexer::{IncrementalOutcome, Indexer};
pub use policy::{PolicyEngine, PolicyInput, PolicyVerdict};
pub use query::QueryService;
