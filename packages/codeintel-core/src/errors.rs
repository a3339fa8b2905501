//! Re-exports the shared error type; see `codeintel_storage::error` for the definition.

pub use codeintel_storage::{Error, ErrorKind, Result};
