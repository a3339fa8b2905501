//! Core data model: symbols, relations, and the auditable policy record.

use serde::{Deserialize, Serialize};

/// Kind of a program element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SymbolKind {
    Function,
    Method,
    Struct,
    Interface,
    Type,
    Variable,
    Constant,
    Field,
    Package,
}

impl SymbolKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SymbolKind::Function => "function",
            SymbolKind::Method => "method",
            SymbolKind::Struct => "struct",
            SymbolKind::Interface => "interface",
            SymbolKind::Type => "type",
            SymbolKind::Variable => "variable",
            SymbolKind::Constant => "constant",
            SymbolKind::Field => "field",
            SymbolKind::Package => "package",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "function" => SymbolKind::Function,
            "method" => SymbolKind::Method,
            "struct" => SymbolKind::Struct,
            "interface" => SymbolKind::Interface,
            "type" => SymbolKind::Type,
            "variable" => SymbolKind::Variable,
            "constant" => SymbolKind::Constant,
            "field" => SymbolKind::Field,
            "package" => SymbolKind::Package,
            _ => return None,
        })
    }
}

/// Exported-ness of a symbol, language-agnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    Public,
    Private,
}

impl Visibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Visibility::Public => "public",
            Visibility::Private => "private",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "public" => Visibility::Public,
            "private" => Visibility::Private,
            _ => return None,
        })
    }
}

/// An atomic program element extracted from source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Symbol {
    pub id: i64,
    pub name: String,
    pub kind: SymbolKind,
    /// Project-relative, forward-slash normalized.
    pub file_path: String,
    /// 1-indexed, inclusive.
    pub start_line: i64,
    /// 1-indexed, inclusive.
    pub end_line: i64,
    pub signature: Option<String>,
    pub doc_comment: Option<String>,
    pub module_path: Option<String>,
    pub visibility: Visibility,
    /// Lowercase tag, e.g. `go`, `typescript`, `python`, `rust`.
    pub language: String,
    /// Hex-encoded SHA-256 of the source file's bytes.
    pub file_hash: Option<String>,
    /// Fixed-width embedding vector; length is model-dependent.
    pub embedding: Option<Vec<f32>>,
    pub last_modified: chrono::DateTime<chrono::Utc>,
}

impl Symbol {
    /// The key used to detect an existing row on upsert.
    pub fn identity_key(&self) -> (&str, &str, i64) {
        (&self.name, &self.file_path, self.start_line)
    }
}

/// A directed edge between two symbols.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationType {
    Calls,
    CalledBy,
    Implements,
    Extends,
    Uses,
    Defines,
    References,
}

impl RelationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelationType::Calls => "calls",
            RelationType::CalledBy => "called_by",
            RelationType::Implements => "implements",
            RelationType::Extends => "extends",
            RelationType::Uses => "uses",
            RelationType::Defines => "defines",
            RelationType::References => "references",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "calls" => RelationType::Calls,
            "called_by" => RelationType::CalledBy,
            "implements" => RelationType::Implements,
            "extends" => RelationType::Extends,
            "uses" => RelationType::Uses,
            "defines" => RelationType::Defines,
            "references" => RelationType::References,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolRelation {
    pub from_symbol_id: i64,
    pub to_symbol_id: i64,
    pub relation_type: RelationType,
    pub call_site_line: Option<i64>,
    pub metadata: Option<serde_json::Value>,
}

/// Ephemeral per-run indexing counters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndexStats {
    pub files_scanned: u64,
    pub files_indexed: u64,
    pub files_skipped: u64,
    pub symbols_found: u64,
    pub relations_found: u64,
    pub embeddings_generated: u64,
    pub duration_ms: u64,
    pub errors: Vec<String>,
    /// Supplemental breakdown: symbol counts per language.
    pub symbols_by_language: std::collections::BTreeMap<String, u64>,
    /// Supplemental breakdown: symbol counts per kind.
    pub symbols_by_kind: std::collections::BTreeMap<String, u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyResult {
    Allow,
    Deny,
}

impl PolicyResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            PolicyResult::Allow => "allow",
            PolicyResult::Deny => "deny",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "allow" => PolicyResult::Allow,
            "deny" => PolicyResult::Deny,
            _ => return None,
        })
    }
}

/// An immutable, auditable record of a policy evaluation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyDecision {
    pub id: i64,
    pub decision_id: String,
    pub policy_path: String,
    pub result: PolicyResult,
    pub violations: Vec<String>,
    pub input_json: serde_json::Value,
    pub task_id: Option<String>,
    pub session_id: Option<String>,
    pub evaluated_at: chrono::DateTime<chrono::Utc>,
}

impl PolicyDecision {
    /// A fresh decision, ready for `AuditStore::save`: id is a placeholder,
    /// `decision_id` and `evaluated_at` are assigned by the store if unset.
    pub fn new(
        policy_path: impl Into<String>,
        result: PolicyResult,
        violations: Vec<String>,
        input_json: serde_json::Value,
    ) -> Self {
        Self {
            id: 0,
            decision_id: String::new(),
            policy_path: policy_path.into(),
            result,
            violations,
            input_json,
            task_id: None,
            session_id: None,
            evaluated_at: chrono::DateTime::<chrono::Utc>::from_timestamp(0, 0).unwrap(),
        }
    }
}

/// A loaded policy document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyFile {
    pub path: String,
    pub name: String,
    pub source: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleType {
    Import,
    Naming,
    Dependency,
    Pattern,
    Structure,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Error,
    Warning,
    Info,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleSource {
    pub node_id: String,
    pub node_type: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// A drift-detection rule derived from a loaded policy, for consumers that
/// classify policy intent against a knowledge graph. The core only carries
/// the shape; classification is an external collaborator (see spec §9).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rule {
    pub id: String,
    pub name: String,
    pub description: String,
    pub rule_type: RuleType,
    pub source: RuleSource,
    pub checks: Vec<String>,
    pub severity: Severity,
    pub exemptions: Vec<String>,
}
