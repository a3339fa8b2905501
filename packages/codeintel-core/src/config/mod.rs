//! Engine configuration: per-component tunables constructed directly by the
//! caller at construction time, no global singleton or config search.
//! Loadable from TOML or YAML via [`load_toml`]/[`load_yaml`].

pub mod engine;

pub use engine::{load_toml, load_yaml, IndexerConfig, PolicyEngineConfig, QueryConfig};
