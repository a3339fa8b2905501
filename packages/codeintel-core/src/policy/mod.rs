//! Policy Engine (C7): loads declarative policy documents and evaluates
//! them against a task/plan/context input, producing allow/deny verdicts.
//! Stateless per evaluation beyond the loaded policy set and the fs handle;
//! evaluations are independent and safely parallelizable by the caller.

mod builtins;
mod document;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use codeintel_storage::{CancellationContext, PolicyResult, SymbolRepository};
use serde::{Deserialize, Serialize};
use tracing::warn;
use walkdir::WalkDir;

pub use builtins::{file_exists, file_imports, file_line_count, has_pattern, symbol_exists, DiskFs, PolicyFs};
pub use document::{parse_policy, CheckSpec, PolicyDocument, PolicyRule, RuleTarget};

use crate::config::PolicyEngineConfig;
use crate::errors::{Error, Result};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskInput {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub files_modified: Vec<String>,
    #[serde(default)]
    pub files_created: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlanInput {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub goal: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContextInput {
    #[serde(default)]
    pub protected_zones: Vec<String>,
    #[serde(default)]
    pub project_type: Option<String>,
}

/// Structured evaluation input (spec §4.7).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PolicyInput {
    #[serde(default)]
    pub task: TaskInput,
    #[serde(default)]
    pub plan: Option<PlanInput>,
    #[serde(default)]
    pub context: Option<ContextInput>,
}

#[derive(Debug, Clone)]
pub struct PolicyVerdict {
    pub result: PolicyResult,
    pub violations: Vec<String>,
}

#[derive(Clone)]
struct LoadedPolicy {
    name: String,
    #[allow(dead_code)]
    path: String,
    document: PolicyDocument,
}

fn target_files<'a>(target: RuleTarget, input: &'a PolicyInput) -> Vec<&'a str> {
    match target {
        RuleTarget::FilesModified => input.task.files_modified.iter().map(String::as_str).collect(),
        RuleTarget::FilesCreated => input.task.files_created.iter().map(String::as_str).collect(),
        RuleTarget::AllFiles => all_task_files(input),
    }
}

fn all_task_files(input: &PolicyInput) -> Vec<&str> {
    input
        .task
        .files_modified
        .iter()
        .chain(input.task.files_created.iter())
        .map(String::as_str)
        .collect()
}

fn evaluate_rule(
    rule: &PolicyRule,
    input: &PolicyInput,
    fs: &dyn PolicyFs,
    ctx: &CancellationContext,
    repository: Option<&SymbolRepository>,
) -> Vec<String> {
    let describe = |detail: String| -> String {
        match &rule.message {
            Some(m) => format!("{m} ({detail})"),
            None => format!("{}: {detail}", rule.id),
        }
    };

    match &rule.check {
        CheckSpec::MaxLineCount { target, max_lines } => target_files(*target, input)
            .into_iter()
            .filter_map(|f| {
                let n = file_line_count(fs, f);
                (n > *max_lines).then(|| describe(format!("{f} has {n} lines (max {max_lines})")))
            })
            .collect(),
        CheckSpec::ForbidPattern { target, pattern } => target_files(*target, input)
            .into_iter()
            .filter_map(|f| {
                has_pattern(fs, f, pattern).then(|| describe(format!("{f} matches forbidden pattern `{pattern}`")))
            })
            .collect(),
        CheckSpec::RequirePattern { target, pattern } => target_files(*target, input)
            .into_iter()
            .filter_map(|f| {
                (!has_pattern(fs, f, pattern)).then(|| describe(format!("{f} is missing required pattern `{pattern}`")))
            })
            .collect(),
        CheckSpec::ForbidImport { target, module } => target_files(*target, input)
            .into_iter()
            .filter_map(|f| {
                file_imports(fs, f)
                    .iter()
                    .any(|i| i == module)
                    .then(|| describe(format!("{f} imports forbidden module `{module}`")))
            })
            .collect(),
        CheckSpec::RequireSymbol { target, symbol_name } => target_files(*target, input)
            .into_iter()
            .filter_map(|f| {
                (!symbol_exists(ctx, repository, fs, f, symbol_name))
                    .then(|| describe(format!("{f} is missing required symbol `{symbol_name}`")))
            })
            .collect(),
        CheckSpec::RequireFileExists { path } => {
            if file_exists(fs, path) {
                Vec::new()
            } else {
                vec![describe(format!("required file `{path}` does not exist"))]
            }
        }
        CheckSpec::ForbidProtectedZone => {
            let zones: &[String] = input
                .context
                .as_ref()
                .map(|c| c.protected_zones.as_slice())
                .unwrap_or(&[]);
            all_task_files(input)
                .into_iter()
                .filter_map(|f| {
                    zones
                        .iter()
                        .any(|z| f.starts_with(z.as_str()))
                        .then(|| describe(format!("{f} touches a protected zone")))
                })
                .collect()
        }
    }
}

fn run_policies(
    policies: &[LoadedPolicy],
    input: &PolicyInput,
    fs: &dyn PolicyFs,
    ctx: &CancellationContext,
    repository: Option<&SymbolRepository>,
) -> PolicyVerdict {
    let mut violations = Vec::new();
    for policy in policies {
        for rule in &policy.document.rules {
            violations.extend(evaluate_rule(rule, input, fs, ctx, repository));
        }
    }
    let result = if violations.is_empty() { PolicyResult::Allow } else { PolicyResult::Deny };
    PolicyVerdict { result, violations }
}

/// The policy engine (C7).
pub struct PolicyEngine {
    config: PolicyEngineConfig,
    fs: Arc<dyn PolicyFs>,
    repository: Option<SymbolRepository>,
    policies: Vec<LoadedPolicy>,
}

impl PolicyEngine {
    pub fn new(config: PolicyEngineConfig, fs: Arc<dyn PolicyFs>) -> Self {
        Self {
            config,
            fs,
            repository: None,
            policies: Vec::new(),
        }
    }

    pub fn with_repository(mut self, repository: SymbolRepository) -> Self {
        self.repository = Some(repository);
        self
    }

    /// Loads every `*.policy` file under the configured policies directory.
    /// A non-existent directory yields zero policies, not an error.
    pub fn load_all(&mut self) -> Result<()> {
        let dir = self.config.policies_dir.clone();
        self.reload_policies(dir)
    }

    /// Clears the currently loaded policies and reloads from `dir`.
    pub fn reload_policies(&mut self, dir: impl AsRef<Path>) -> Result<()> {
        self.policies.clear();
        let dir = dir.as_ref();
        if !dir.exists() {
            return Ok(());
        }
        for entry in WalkDir::new(dir).into_iter().filter_map(|e| e.ok()) {
            if !entry.file_type().is_file() {
                continue;
            }
            if entry.path().extension().and_then(|e| e.to_str()) != Some("policy") {
                continue;
            }
            let path = entry.path().to_string_lossy().to_string();
            match std::fs::read_to_string(entry.path()) {
                Ok(source) => match parse_policy(&source) {
                    Ok(document) => self.policies.push(LoadedPolicy {
                        name: document.name.clone(),
                        path,
                        document,
                    }),
                    Err(e) => warn!("skipping malformed policy {path}: {e}"),
                },
                Err(e) => warn!("could not read policy file {path}: {e}"),
            }
        }
        Ok(())
    }

    pub fn add_policy(&mut self, name: &str, source: &str) -> Result<()> {
        let document = parse_policy(source)?;
        self.policies.push(LoadedPolicy {
            name: name.to_string(),
            path: format!("<inline:{name}>"),
            document,
        });
        Ok(())
    }

    pub fn clear_policies(&mut self) {
        self.policies.clear();
    }

    pub fn policy_count(&self) -> usize {
        self.policies.len()
    }

    pub fn policy_names(&self) -> Vec<String> {
        self.policies.iter().map(|p| p.name.clone()).collect()
    }

    pub fn validate(&self, source: &str) -> Result<()> {
        parse_policy(source).map(|_| ())
    }

    /// Evaluates every loaded policy against `input`, deny iff any rule
    /// surfaced a violation. Bounded by `evaluation_timeout`: exceeding it
    /// is a fatal error, never a silent allow.
    pub fn evaluate(&self, input: &PolicyInput) -> Result<PolicyVerdict> {
        self.evaluate_with_timeout(input, self.config.evaluation_timeout)
    }

    fn evaluate_with_timeout(&self, input: &PolicyInput, timeout: Duration) -> Result<PolicyVerdict> {
        let policies = self.policies.clone();
        let fs = Arc::clone(&self.fs);
        let repository = self.repository.clone();
        let input = input.clone();
        let ctx = CancellationContext::new();

        let (tx, rx) = std::sync::mpsc::channel();
        std::thread::spawn(move || {
            let verdict = run_policies(&policies, &input, fs.as_ref(), &ctx, repository.as_ref());
            let _ = tx.send(verdict);
        });

        rx.recv_timeout(timeout)
            .map_err(|_| Error::fatal("policy evaluation exceeded the configured timeout"))
    }

    pub fn evaluate_task(
        &self,
        task: TaskInput,
        plan: Option<PlanInput>,
        context: Option<ContextInput>,
    ) -> Result<PolicyVerdict> {
        self.evaluate(&PolicyInput { task, plan, context })
    }

    pub fn evaluate_files(&self, files_modified: Vec<String>, files_created: Vec<String>) -> Result<PolicyVerdict> {
        self.evaluate(&PolicyInput {
            task: TaskInput {
                files_modified,
                files_created,
                ..Default::default()
            },
            plan: None,
            context: None,
        })
    }
}
