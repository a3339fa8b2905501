//! The declarative policy document format: a YAML file naming a set of
//! rules, each a single built-in check against a set of target files.

use serde::{Deserialize, Serialize};

use crate::errors::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleTarget {
    FilesModified,
    FilesCreated,
    AllFiles,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "check", rename_all = "snake_case")]
pub enum CheckSpec {
    MaxLineCount { target: RuleTarget, max_lines: i64 },
    ForbidPattern { target: RuleTarget, pattern: String },
    RequirePattern { target: RuleTarget, pattern: String },
    ForbidImport { target: RuleTarget, module: String },
    RequireSymbol { target: RuleTarget, symbol_name: String },
    RequireFileExists { path: String },
    ForbidProtectedZone,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyRule {
    pub id: String,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(flatten)]
    pub check: CheckSpec,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyDocument {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub rules: Vec<PolicyRule>,
}

/// Parses and structurally validates a policy document. Does not evaluate
/// anything; a document that parses is guaranteed to be evaluable.
pub fn parse_policy(source: &str) -> Result<PolicyDocument> {
    let doc: PolicyDocument =
        serde_yaml::from_str(source).map_err(|e| Error::validation(format!("invalid policy document: {e}")))?;
    if doc.name.trim().is_empty() {
        return Err(Error::validation("policy document must have a non-empty name"));
    }
    for rule in &doc.rules {
        if rule.id.trim().is_empty() {
            return Err(Error::validation("policy rule must have a non-empty id"));
        }
    }
    Ok(doc)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_policy() {
        let yaml = "name: no-todo\nrules:\n  - id: no-todo-comments\n    check: forbid_pattern\n    target: files_modified\n    pattern: 'TODO'\n";
        let doc = parse_policy(yaml).unwrap();
        assert_eq!(doc.name, "no-todo");
        assert_eq!(doc.rules.len(), 1);
    }

    #[test]
    fn test_parse_rejects_missing_name() {
        let yaml = "rules: []\n";
        assert!(parse_policy(yaml).is_err());
    }

    #[test]
    fn test_parse_rejects_malformed_yaml() {
        assert!(parse_policy("not: [valid yaml").is_err());
    }

    #[test]
    fn test_parse_rejects_unknown_check_kind() {
        let yaml = "name: x\nrules:\n  - id: r1\n    check: does_not_exist\n";
        assert!(parse_policy(yaml).is_err());
    }
}
