//! Audit Store (C8): persists policy decisions for compliance queries and retention pruning.

use rusqlite::{params, OptionalExtension, Row};
use uuid::Uuid;

use crate::context::CancellationContext;
use crate::domain::{PolicyDecision, PolicyResult};
use crate::error::{Error, Result};
use crate::store::Store;

#[derive(Debug, Clone, Default)]
pub struct ListOpts {
    pub task_id: Option<String>,
    pub session_id: Option<String>,
    pub result: Option<PolicyResult>,
    pub since: Option<chrono::DateTime<chrono::Utc>>,
    pub limit: Option<usize>,
}

/// The outcome of a `prune` call, named rather than a bare tuple so both the
/// dry-run preview and the mutating call share one return shape.
#[derive(Debug, Clone, Default)]
pub struct RetentionPlan {
    pub deleted_by_age: usize,
    pub deleted_by_budget: usize,
    pub remaining_count: usize,
    pub applied: bool,
}

impl RetentionPlan {
    pub fn total_deleted(&self) -> usize {
        self.deleted_by_age + self.deleted_by_budget
    }
}

fn row_to_decision(row: &Row<'_>) -> rusqlite::Result<PolicyDecision> {
    let result_str: String = row.get("result")?;
    let violations_json: String = row.get("violations_json")?;
    let input_json: String = row.get("input_json")?;
    let evaluated_at_ts: i64 = row.get("evaluated_at")?;

    Ok(PolicyDecision {
        id: row.get("id")?,
        decision_id: row.get("decision_id")?,
        policy_path: row.get("policy_path")?,
        result: PolicyResult::parse(&result_str).unwrap_or(PolicyResult::Allow),
        violations: serde_json::from_str(&violations_json).unwrap_or_default(),
        input_json: serde_json::from_str(&input_json).unwrap_or(serde_json::Value::Null),
        task_id: row.get("task_id")?,
        session_id: row.get("session_id")?,
        evaluated_at: chrono::DateTime::from_timestamp(evaluated_at_ts, 0).unwrap_or_default(),
    })
}

const DECISION_COLUMNS: &str = "id, decision_id, policy_path, result, violations_json, \
    input_json, task_id, session_id, evaluated_at";

#[derive(Clone)]
pub struct AuditStore {
    store: Store,
}

impl AuditStore {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Assigns a UUID if absent and `evaluated_at = now` if unset, then persists.
    pub fn save(&self, ctx: &CancellationContext, decision: &mut PolicyDecision) -> Result<i64> {
        ctx.check()?;
        if decision.decision_id.is_empty() {
            decision.decision_id = Uuid::new_v4().to_string();
        }
        if decision.evaluated_at.timestamp() == 0 {
            decision.evaluated_at = chrono::Utc::now();
        }

        let conn = self.store.conn();
        let violations_json = serde_json::to_string(&decision.violations)?;
        let input_json = serde_json::to_string(&decision.input_json)?;
        conn.execute(
            "INSERT INTO policy_decisions
                (decision_id, policy_path, result, violations_json, input_json, task_id, session_id, evaluated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                decision.decision_id,
                decision.policy_path,
                decision.result.as_str(),
                violations_json,
                input_json,
                decision.task_id,
                decision.session_id,
                decision.evaluated_at.timestamp(),
            ],
        )?;
        let id = conn.last_insert_rowid();
        decision.id = id;
        Ok(id)
    }

    pub fn get(&self, ctx: &CancellationContext, decision_id: &str) -> Result<PolicyDecision> {
        ctx.check()?;
        let conn = self.store.conn();
        let sql = format!("SELECT {DECISION_COLUMNS} FROM policy_decisions WHERE decision_id = ?1");
        conn.query_row(&sql, params![decision_id], row_to_decision)
            .optional()?
            .ok_or_else(|| Error::not_found(format!("policy decision {decision_id}")))
    }

    pub fn list(&self, ctx: &CancellationContext, opts: &ListOpts) -> Result<Vec<PolicyDecision>> {
        ctx.check()?;
        let conn = self.store.conn();

        let mut clauses = Vec::new();
        let mut bound: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(task_id) = &opts.task_id {
            clauses.push(format!("task_id = ?{}", bound.len() + 1));
            bound.push(Box::new(task_id.clone()));
        }
        if let Some(session_id) = &opts.session_id {
            clauses.push(format!("session_id = ?{}", bound.len() + 1));
            bound.push(Box::new(session_id.clone()));
        }
        if let Some(result) = &opts.result {
            clauses.push(format!("result = ?{}", bound.len() + 1));
            bound.push(Box::new(result.as_str().to_string()));
        }
        if let Some(since) = &opts.since {
            clauses.push(format!("evaluated_at >= ?{}", bound.len() + 1));
            bound.push(Box::new(since.timestamp()));
        }

        let where_clause = if clauses.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", clauses.join(" AND "))
        };

        let limit = opts.limit.unwrap_or(usize::MAX);
        let sql = format!(
            "SELECT {DECISION_COLUMNS} FROM policy_decisions {where_clause} ORDER BY evaluated_at DESC LIMIT ?{}",
            bound.len() + 1
        );
        bound.push(Box::new(limit as i64));

        let mut stmt = conn.prepare(&sql)?;
        let params_ref: Vec<&dyn rusqlite::ToSql> = bound.iter().map(|b| b.as_ref()).collect();
        let decisions = stmt
            .query_map(params_ref.as_slice(), row_to_decision)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(decisions)
    }

    /// Counts only `deny` results since the given timestamp.
    pub fn count_violations(
        &self,
        ctx: &CancellationContext,
        since: chrono::DateTime<chrono::Utc>,
    ) -> Result<i64> {
        ctx.check()?;
        let conn = self.store.conn();
        Ok(conn.query_row(
            "SELECT COUNT(*) FROM policy_decisions WHERE result = 'deny' AND evaluated_at >= ?1",
            params![since.timestamp()],
            |r| r.get(0),
        )?)
    }

    pub fn delete(&self, ctx: &CancellationContext, decision_id: &str) -> Result<()> {
        ctx.check()?;
        let conn = self.store.conn();
        let affected = conn.execute(
            "DELETE FROM policy_decisions WHERE decision_id = ?1",
            params![decision_id],
        )?;
        if affected == 0 {
            return Err(Error::not_found(format!("policy decision {decision_id}")));
        }
        Ok(())
    }

    /// Deletes decisions older than the cutoff, then (if `max_total_bytes` is
    /// supplied and the remaining set still exceeds it) deletes the oldest
    /// remaining entries until under budget. `dry_run` computes the plan
    /// without mutating the store.
    pub fn prune(
        &self,
        ctx: &CancellationContext,
        older_than: chrono::Duration,
        max_total_bytes: Option<u64>,
        dry_run: bool,
    ) -> Result<RetentionPlan> {
        ctx.check()?;
        let cutoff = (chrono::Utc::now() - older_than).timestamp();
        let conn = self.store.conn();

        let deleted_by_age: usize = conn.query_row(
            "SELECT COUNT(*) FROM policy_decisions WHERE evaluated_at < ?1",
            params![cutoff],
            |r| r.get::<_, i64>(0),
        )? as usize;

        if !dry_run {
            conn.execute(
                "DELETE FROM policy_decisions WHERE evaluated_at < ?1",
                params![cutoff],
            )?;
        }

        let mut deleted_by_budget = 0usize;
        if let Some(budget) = max_total_bytes {
            // Approximate row size via the serialized input/violations text;
            // this is the only per-row cost we track.
            let sizes: Vec<(i64, i64)> = {
                let mut stmt = conn.prepare(
                    "SELECT id, LENGTH(input_json) + LENGTH(violations_json)
                     FROM policy_decisions WHERE evaluated_at >= ?1 ORDER BY evaluated_at ASC",
                )?;
                stmt.query_map(params![cutoff], |r| Ok((r.get(0)?, r.get(1)?)))?
                    .collect::<rusqlite::Result<Vec<_>>>()?
            };
            let mut total: u64 = sizes.iter().map(|(_, sz)| *sz as u64).sum();
            let mut to_delete = Vec::new();
            for (id, sz) in &sizes {
                if total <= budget {
                    break;
                }
                to_delete.push(*id);
                total = total.saturating_sub(*sz as u64);
            }
            deleted_by_budget = to_delete.len();
            if !dry_run && !to_delete.is_empty() {
                for id in &to_delete {
                    conn.execute("DELETE FROM policy_decisions WHERE id = ?1", params![id])?;
                }
            }
        }

        let remaining_count: i64 = if dry_run {
            conn.query_row("SELECT COUNT(*) FROM policy_decisions", [], |r| r.get(0))?
        } else {
            conn.query_row("SELECT COUNT(*) FROM policy_decisions", [], |r| r.get(0))?
        };
        let remaining_count = if dry_run {
            (remaining_count as usize)
                .saturating_sub(deleted_by_age)
                .saturating_sub(deleted_by_budget)
        } else {
            remaining_count as usize
        };

        Ok(RetentionPlan {
            deleted_by_age,
            deleted_by_budget,
            remaining_count,
            applied: !dry_run,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> AuditStore {
        AuditStore::new(Store::in_memory().unwrap())
    }

    fn decision(result: PolicyResult) -> PolicyDecision {
        PolicyDecision::new("core/naming.policy", result, vec![], serde_json::json!({}))
    }

    #[test]
    fn test_save_assigns_uuid_and_timestamp() {
        let audit = store();
        let ctx = CancellationContext::new();
        let mut d = decision(PolicyResult::Allow);
        audit.save(&ctx, &mut d).unwrap();
        assert!(!d.decision_id.is_empty());
        assert!(d.evaluated_at.timestamp() > 0);
    }

    #[test]
    fn test_get_roundtrip() {
        let audit = store();
        let ctx = CancellationContext::new();
        let mut d = decision(PolicyResult::Deny);
        d.violations = vec!["core/router.go touched".to_string()];
        audit.save(&ctx, &mut d).unwrap();

        let fetched = audit.get(&ctx, &d.decision_id).unwrap();
        assert_eq!(fetched.result, PolicyResult::Deny);
        assert_eq!(fetched.violations, vec!["core/router.go touched"]);
    }

    #[test]
    fn test_get_missing_is_not_found() {
        let audit = store();
        let ctx = CancellationContext::new();
        assert!(audit.get(&ctx, "nope").unwrap_err().is_not_found());
    }

    #[test]
    fn test_count_violations_only_counts_deny() {
        let audit = store();
        let ctx = CancellationContext::new();
        let mut allow = decision(PolicyResult::Allow);
        let mut deny = decision(PolicyResult::Deny);
        audit.save(&ctx, &mut allow).unwrap();
        audit.save(&ctx, &mut deny).unwrap();

        let count = audit
            .count_violations(&ctx, chrono::Utc::now() - chrono::Duration::hours(1))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_prune_dry_run_does_not_mutate() {
        let audit = store();
        let ctx = CancellationContext::new();
        let mut d = decision(PolicyResult::Allow);
        d.evaluated_at = chrono::Utc::now() - chrono::Duration::days(30);
        audit.save(&ctx, &mut d).unwrap();

        let plan = audit
            .prune(&ctx, chrono::Duration::days(7), None, true)
            .unwrap();
        assert_eq!(plan.deleted_by_age, 1);
        assert!(!plan.applied);
        assert!(audit.get(&ctx, &d.decision_id).is_ok());
    }

    #[test]
    fn test_prune_applies_age_cutoff() {
        let audit = store();
        let ctx = CancellationContext::new();
        let mut old = decision(PolicyResult::Allow);
        old.evaluated_at = chrono::Utc::now() - chrono::Duration::days(30);
        audit.save(&ctx, &mut old).unwrap();
        let mut recent = decision(PolicyResult::Allow);
        audit.save(&ctx, &mut recent).unwrap();

        let plan = audit
            .prune(&ctx, chrono::Duration::days(7), None, false)
            .unwrap();
        assert_eq!(plan.deleted_by_age, 1);
        assert!(audit.get(&ctx, &old.decision_id).is_err());
        assert!(audit.get(&ctx, &recent.decision_id).is_ok());
    }

    #[test]
    fn test_delete_missing_surfaces_not_found() {
        let audit = store();
        let ctx = CancellationContext::new();
        assert!(audit.delete(&ctx, "nope").unwrap_err().is_not_found());
    }
}
