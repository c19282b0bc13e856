//! `ParallelExecutor` — scope-conflict-aware concurrent task scheduling
//!. Tasks whose allowed-scope globs share a common ancestor are
//! never run in the same wave, even if their `forbidden` lists would
//! otherwise keep them apart — conflict detection only looks at `allowed`
//!.
//!
//! Scheduling itself is grounded on the teacher's former
//! `parallel::dependency_analyzer`/`resource_pool` split: build a conflict
//! graph, then greedily peel off maximal independent sets as waves, bounding
//! in-flight work with a `tokio::sync::Semaphore` the way the teacher's
//! resource pool bounded concurrent tool calls.

use crate::context::LoadedContext;
use crate::executor::{Executor, ExecutorCallbacks, ExecutorResult, PhaseEvent, RunOptions};
use crate::git_ops::GitOps;
use crate::task::TaskScope;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::info;

const DEFAULT_CONCURRENCY: usize = 3;

/// Options for a parallel run.
pub struct ParallelOptions {
    pub working_dir: PathBuf,
    pub concurrency: usize,
    pub callbacks: Arc<dyn ExecutorCallbacks>,
}

impl ParallelOptions {
    pub fn new(working_dir: PathBuf) -> Self {
        Self {
            working_dir,
            concurrency: DEFAULT_CONCURRENCY,
            callbacks: Arc::new(crate::executor::NoopCallbacks),
        }
    }
}

/// Outcome of a parallel run.
#[derive(Debug)]
pub struct ParallelResult {
    pub success: bool,
    pub results: Vec<ExecutorResult>,
}

/// Wraps a shared [`ExecutorCallbacks`] to prefix streamed output with a
/// short task name, so concurrent runs stay distinguishable in one stream
///.
struct PrefixedCallbacks {
    inner: Arc<dyn ExecutorCallbacks>,
    prefix: String,
}

#[async_trait::async_trait]
impl ExecutorCallbacks for PrefixedCallbacks {
    fn on_phase(&self, event: PhaseEvent) {
        self.inner.on_phase(event);
    }

    fn on_iteration(&self, state: &crate::executor::ExecutorState) {
        self.inner.on_iteration(state);
    }

    fn on_output(&self, chunk: &str) {
        for line in chunk.lines() {
            self.inner.on_output(&format!("[{}] {}", self.prefix, line));
        }
    }

    async fn on_ask_user(&self, prompt: &str, files: &[String]) -> bool {
        self.inner.on_ask_user(&format!("[{}] {}", self.prefix, prompt), files).await
    }
}

/// Short task label used as the output prefix: the task file's stem.
fn task_label(context: &LoadedContext) -> String {
    context
        .task
        .file_path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "task".to_string())
}

/// Two tasks conflict when one's `allowed` scope is an ancestor (or equal)
/// of the other's, judged on the literal prefix before the first wildcard —
/// the same heuristic [`crate::scope`] uses for pattern matching, applied
/// pairwise rather than path-vs-pattern.
fn scopes_conflict(a: &TaskScope, b: &TaskScope) -> bool {
    if a.allowed.is_empty() || b.allowed.is_empty() {
        // An unrestricted task can touch anything, so it conflicts with
        // everyone.
        return true;
    }
    a.allowed
        .iter()
        .any(|pa| b.allowed.iter().any(|pb| patterns_overlap(pa, pb)))
}

fn literal_prefix(pattern: &str) -> &str {
    let end = pattern.find(['*', '?']).unwrap_or(pattern.len());
    &pattern[..end]
}

fn patterns_overlap(a: &str, b: &str) -> bool {
    let (pa, pb) = (literal_prefix(a), literal_prefix(b));
    pa.starts_with(pb) || pb.starts_with(pa)
}

/// Partition `contexts` into waves: within a wave, no two tasks conflict, so
/// they can run concurrently; later waves run only after earlier ones
/// finish.
fn schedule(contexts: &[LoadedContext]) -> Vec<Vec<usize>> {
    let n = contexts.len();
    let mut conflict = vec![vec![false; n]; n];
    for i in 0..n {
        for j in (i + 1)..n {
            if scopes_conflict(&contexts[i].task.scope, &contexts[j].task.scope) {
                conflict[i][j] = true;
                conflict[j][i] = true;
            }
        }
    }

    let mut scheduled = vec![false; n];
    let mut waves = Vec::new();

    while scheduled.iter().any(|done| !done) {
        let mut wave = Vec::new();
        for i in 0..n {
            if scheduled[i] {
                continue;
            }
            if wave.iter().any(|&w| conflict[i][w]) {
                continue;
            }
            wave.push(i);
        }
        for &i in &wave {
            scheduled[i] = true;
        }
        waves.push(wave);
    }

    waves
}

/// Runs a batch of independent tasks, each in its own [`Executor`], bounding
/// concurrency and scheduling around scope conflicts.
pub struct ParallelExecutor {
    config: crate::config::Config,
    git_ops: Arc<dyn GitOps>,
}

impl ParallelExecutor {
    pub fn new(config: crate::config::Config, git_ops: Arc<dyn GitOps>) -> Self {
        Self { config, git_ops }
    }

    pub async fn run(&self, contexts: Vec<LoadedContext>, options: ParallelOptions) -> ParallelResult {
        let waves = schedule(&contexts);
        let concurrency = options.concurrency.max(1);
        let semaphore = Arc::new(Semaphore::new(concurrency));

        info!(tasks = contexts.len(), waves = waves.len(), concurrency, "scheduled parallel run");

        let mut results: Vec<Option<ExecutorResult>> = (0..contexts.len()).map(|_| None).collect();

        for (wave_idx, wave) in waves.iter().enumerate() {
            info!(wave = wave_idx, size = wave.len(), "starting wave");
            let mut handles = Vec::with_capacity(wave.len());

            for &idx in wave {
                let context = contexts[idx].clone();
                let label = task_label(&context);
                let executor = Executor::new(self.config.clone(), Arc::clone(&self.git_ops));
                let permit = Arc::clone(&semaphore);
                let working_dir = options.working_dir.clone();
                let callbacks: Arc<dyn ExecutorCallbacks> =
                    Arc::new(PrefixedCallbacks { inner: Arc::clone(&options.callbacks), prefix: label });

                handles.push(tokio::spawn(async move {
                    let _permit = permit.acquire_owned().await.expect("semaphore not closed");
                    let mut run_options = RunOptions::new(working_dir);
                    run_options.callbacks = callbacks;
                    let result = executor.run(context, run_options).await;
                    (idx, result)
                }));
            }

            for handle in handles {
                match handle.await {
                    Ok((idx, result)) => results[idx] = Some(result),
                    Err(join_err) => {
                        tracing::error!(error = %join_err, "parallel task panicked");
                    }
                }
            }
        }

        let results: Vec<ExecutorResult> = results.into_iter().flatten().collect();
        let success = !results.is_empty()
            && results
                .iter()
                .all(|r| r.status == crate::executor::ExecutorStatus::Completed);

        ParallelResult { success, results }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scope(allowed: &[&str]) -> TaskScope {
        TaskScope {
            allowed: allowed.iter().map(|s| s.to_string()).collect(),
            forbidden: vec![],
            ask_before: vec![],
        }
    }

    fn ctx_with_scope(allowed: &[&str]) -> LoadedContext {
        LoadedContext {
            agents_content: String::new(),
            role: None,
            task: crate::task::Task {
                file_path: PathBuf::from("t.md"),
                goal: String::new(),
                task_type: String::new(),
                requirements: String::new(),
                notes: String::new(),
                suggested_roles: vec![],
                scope: scope(allowed),
                definition_of_done: vec![],
                blocked_status: None,
            },
            plan: None,
            skills: vec![],
        }
    }

    #[test]
    fn disjoint_scopes_do_not_conflict() {
        assert!(!scopes_conflict(&scope(&["src/a/**"]), &scope(&["src/b/**"])));
    }

    #[test]
    fn shared_ancestor_conflicts() {
        assert!(scopes_conflict(&scope(&["src/**"]), &scope(&["src/a/**"])));
    }

    #[test]
    fn unrestricted_scope_conflicts_with_everything() {
        assert!(scopes_conflict(&scope(&[]), &scope(&["src/a/**"])));
    }

    #[test]
    fn schedule_groups_independent_tasks_into_one_wave() {
        let contexts = vec![
            ctx_with_scope(&["src/a/**"]),
            ctx_with_scope(&["src/b/**"]),
            ctx_with_scope(&["src/a/**"]),
        ];
        let waves = schedule(&contexts);
        assert_eq!(waves.len(), 2);
        assert_eq!(waves[0].len(), 2);
        assert_eq!(waves[1].len(), 1);
    }
}
