//! Short-prefix id resolution (spec §6.5): resolves an 8-hex-char-style
//! prefix to a full task/plan id, surfacing `NotFound` or `Conflict`
//! (ambiguous, up to 5 candidates) rather than guessing.

use codeintel_storage::{CancellationContext, SymbolRepository};

use crate::errors::{Error, Result};

const MAX_CANDIDATES: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IdKind {
    Task,
    Plan,
}

impl IdKind {
    fn label(self) -> &'static str {
        match self {
            IdKind::Task => "task",
            IdKind::Plan => "plan",
        }
    }
}

fn resolve(
    repository: &SymbolRepository,
    ctx: &CancellationContext,
    kind: IdKind,
    prefix: &str,
) -> Result<String> {
    if prefix.is_empty() {
        return Err(Error::validation(format!("{} id prefix must not be empty", kind.label())));
    }

    let candidates = match kind {
        IdKind::Task => repository.find_task_ids_by_prefix(ctx, prefix)?,
        IdKind::Plan => repository.find_plan_ids_by_prefix(ctx, prefix)?,
    };

    match candidates.len() {
        0 => Err(Error::not_found(format!(
            "no {} id matches prefix `{prefix}`",
            kind.label()
        ))),
        1 => Ok(candidates.into_iter().next().unwrap()),
        _ => {
            let shown: Vec<&str> = candidates.iter().take(MAX_CANDIDATES).map(String::as_str).collect();
            Err(Error::conflict(format!(
                "ambiguous {} id prefix `{prefix}`, candidates: {}",
                kind.label(),
                shown.join(", ")
            )))
        }
    }
}

/// Resolves a short prefix to a full task id.
pub fn resolve_task_id(repository: &SymbolRepository, ctx: &CancellationContext, prefix: &str) -> Result<String> {
    resolve(repository, ctx, IdKind::Task, prefix)
}

/// Resolves a short prefix to a full plan id.
pub fn resolve_plan_id(repository: &SymbolRepository, ctx: &CancellationContext, prefix: &str) -> Result<String> {
    resolve(repository, ctx, IdKind::Plan, prefix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use codeintel_storage::Store;

    fn repo() -> SymbolRepository {
        SymbolRepository::new(Store::in_memory().unwrap())
    }

    #[test]
    fn test_resolve_task_id_unique_prefix() {
        let repository = repo();
        repository.register_task_id("abc12345").unwrap();
        let ctx = CancellationContext::new();
        assert_eq!(resolve_task_id(&repository, &ctx, "abc1").unwrap(), "abc12345");
    }

    #[test]
    fn test_resolve_task_id_not_found() {
        let repository = repo();
        let ctx = CancellationContext::new();
        let err = resolve_task_id(&repository, &ctx, "zzzz").unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_resolve_task_id_ambiguous_lists_candidates() {
        let repository = repo();
        repository.register_task_id("abc11111").unwrap();
        repository.register_task_id("abc22222").unwrap();
        let ctx = CancellationContext::new();
        let err = resolve_task_id(&repository, &ctx, "abc").unwrap_err();
        assert_eq!(err.kind, codeintel_storage::ErrorKind::Conflict);
        assert!(err.message.contains("abc11111"));
        assert!(err.message.contains("abc22222"));
    }

    #[test]
    fn test_resolve_task_id_ambiguous_caps_candidate_list() {
        let repository = repo();
        for i in 0..8 {
            repository.register_task_id(&format!("pfx{i:05}")).unwrap();
        }
        let ctx = CancellationContext::new();
        let err = resolve_task_id(&repository, &ctx, "pfx").unwrap_err();
        let candidate_count = err.message.matches("pfx").count();
        assert_eq!(candidate_count, MAX_CANDIDATES);
    }

    #[test]
    fn test_resolve_plan_id_unique_prefix() {
        let repository = repo();
        repository.register_plan_id("plan9999").unwrap();
        let ctx = CancellationContext::new();
        assert_eq!(resolve_plan_id(&repository, &ctx, "plan9").unwrap(), "plan9999");
    }

    #[test]
    fn test_resolve_rejects_empty_prefix() {
        let repository = repo();
        let ctx = CancellationContext::new();
        assert!(resolve_task_id(&repository, &ctx, "").is_err());
    }
}
