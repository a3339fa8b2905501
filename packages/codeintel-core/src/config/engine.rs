//! Engine-tunable configuration: constructed directly by the caller at
//! component construction time, no global singleton or config search.

use std::path::{Path, PathBuf};
use std::time::Duration;

use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::{Deserialize, Serialize};

use crate::errors::{Error, Result};

fn default_exclude_patterns() -> Vec<String> {
    vec![
        "vendor".to_string(),
        "node_modules".to_string(),
        ".git".to_string(),
    ]
}

/// Indexer tunables (spec §4.4). `exclude_patterns` entries are globs,
/// matched against both a walked entry's bare name (so a bare directory
/// name like `vendor` excludes it at any depth) and its project-relative
/// path (so a multi-segment pattern like `generated/**` or a suffix glob
/// like `*.pb.go` can target a specific location).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexerConfig {
    pub workers: usize,
    pub batch_size: usize,
    pub exclude_patterns: Vec<String>,
    pub include_tests: bool,
    pub max_file_size_bytes: u64,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            workers: num_cpus::get().max(1),
            batch_size: 50,
            exclude_patterns: default_exclude_patterns(),
            include_tests: true,
            max_file_size_bytes: 5 * 1024 * 1024,
        }
    }
}

impl IndexerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.workers < 1 {
            return Err(Error::validation("workers must be >= 1"));
        }
        if self.batch_size < 1 {
            return Err(Error::validation("batch_size must be >= 1"));
        }
        self.build_exclude_set()?;
        Ok(())
    }

    /// Compiles `exclude_patterns` into a matchable glob set. Fails closed:
    /// a malformed glob is a validation error, not a silently-ignored pattern.
    pub fn build_exclude_set(&self) -> Result<GlobSet> {
        let mut builder = GlobSetBuilder::new();
        for pattern in &self.exclude_patterns {
            let glob = Glob::new(pattern)
                .map_err(|e| Error::validation(format!("invalid exclude pattern {pattern:?}: {e}")))?;
            builder.add(glob);
        }
        builder
            .build()
            .map_err(|e| Error::validation(format!("invalid exclude_patterns: {e}")))
    }
}

/// Query service tunables (spec §4.6.2).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    pub fts_weight: f32,
    pub vector_weight: f32,
    pub vector_threshold: f32,
    pub min_result_threshold: f32,
    pub default_limit: usize,
    pub max_impact_depth: i64,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            fts_weight: 0.3,
            vector_weight: 0.7,
            vector_threshold: 0.5,
            min_result_threshold: 0.1,
            default_limit: 20,
            max_impact_depth: 5,
        }
    }
}

/// Policy engine tunables (spec §4.7).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyEngineConfig {
    pub policies_dir: PathBuf,
    #[serde(with = "duration_millis")]
    pub evaluation_timeout: Duration,
}

impl Default for PolicyEngineConfig {
    fn default() -> Self {
        Self {
            policies_dir: PathBuf::from(".codeintel/policies"),
            evaluation_timeout: Duration::from_millis(500),
        }
    }
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> std::result::Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}

/// Reads and parses a TOML config file, grounded in the teacher's
/// `config::io` load-from-disk pattern but generic over the target type.
pub fn load_toml<T: serde::de::DeserializeOwned>(path: impl AsRef<Path>) -> Result<T> {
    let raw = std::fs::read_to_string(path)?;
    toml::from_str(&raw).map_err(|e| Error::storage(format!("invalid toml config: {e}")))
}

/// Reads and parses a YAML config file.
pub fn load_yaml<T: serde::de::DeserializeOwned>(path: impl AsRef<Path>) -> Result<T> {
    let raw = std::fs::read_to_string(path)?;
    serde_yaml::from_str(&raw).map_err(|e| Error::storage(format!("invalid yaml config: {e}")))
}
