//! The numbered iteration loop: prompt, call the
//! provider, reactively re-check scope, validate, commit, check for a
//! terminal signal, repeat until completed/blocked/failed or a limit trips.

use super::prompt;
use super::{ExecutorState, ExecutorStatus, ExitReason, RunOptions};
use crate::config::Config;
use crate::errors::{ErrorCategory, ErrorCode};
use crate::executor::preflight::PreFlightResult;
use crate::git_ops::GitOps;
use crate::provider::ExecuteOptions;
use crate::scope::Decision;
use crate::task::append_section;
use crate::context::LoadedContext;
use crate::validator::ValidationPhase;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

const RATE_LIMIT_BACKOFF_SECS: u64 = 5;

/// Run the loop to a terminal state.
pub async fn run(
    context: &LoadedContext,
    config: &Config,
    pf: &mut PreFlightResult,
    git_ops: Arc<dyn GitOps>,
    state: &mut ExecutorState,
    options: &RunOptions,
) -> ExitReason {
    state.status = ExecutorStatus::Running;
    let task_file = relative_task_path(context, &options.working_dir);

    loop {
        if *options.cancel.borrow() {
            return ExitReason::Cancelled;
        }

        if state.iteration >= config.execution.max_iterations {
            return ExitReason::MaxIterations;
        }
        if state.consecutive_failures >= config.execution.max_consecutive_failures {
            return ExitReason::MaxFailures;
        }

        // Step 1: build the prompt from project context + task + any
        // feedback from the previous iteration.
        let iteration_prompt = prompt::build(context, state);

        // Step 2: call the provider.
        let callbacks = Arc::clone(&options.callbacks);
        let exec_options = ExecuteOptions {
            working_dir: options.working_dir.clone(),
            model: config.provider.model.clone(),
            max_tokens: None,
            timeout: std::time::Duration::from_secs(config.execution.timeout_per_iteration),
            cancel: options.cancel.clone(),
            api_key: config.provider.api_key.clone(),
            conversation_state: state.conversation_state.clone(),
            conversation_config: config.execution.conversation.clone(),
            scope: &context.task.scope,
            scope_mode: crate::scope::EnforcementMode::from(config.permissions.scope_enforcement),
            on_output: Some(Arc::new(move |chunk: &str| callbacks.on_output(chunk))),
        };
        let result = pf.provider.execute(&iteration_prompt, exec_options).await;

        // Step 3: branch on error category before anything else runs.
        if !result.success {
            match branch_on_error(result.error_code) {
                ErrorBranch::FailImmediately => {
                    let code = result.error_code.unwrap_or(ErrorCode::ProviderCrash);
                    return ExitReason::ConfigOrPermissionError(
                        result.error.unwrap_or_else(|| "provider error".to_string()),
                        code,
                    );
                }
                ErrorBranch::BackoffNoCounter => {
                    state.last_error_code = result.error_code;
                    warn!("rate limited, backing off {}s", RATE_LIMIT_BACKOFF_SECS);
                    tokio::time::sleep(std::time::Duration::from_secs(RATE_LIMIT_BACKOFF_SECS)).await;
                    continue;
                }
                ErrorBranch::RetryWithCounter => {
                    state.last_error_code = result.error_code;
                    state.consecutive_failures += 1;
                    state.iteration += 1;
                    options.callbacks.on_iteration(state);
                    continue;
                }
            }
        }
        state.conversation_state = result.conversation_state.clone();
        state.conversation_message_count = state.conversation_state.as_ref().map_or(0, |m| m.len());

        // Step 4: reactive scope check — ask git what
        // actually changed, excluding the task file itself, and revert
        // anything that decides BLOCK.
        let changed = match git_ops.status().await {
            Ok(changes) => changes
                .into_iter()
                .map(|c| c.path_str())
                .filter(|p| Some(p.as_str()) != task_file.as_deref())
                .collect::<Vec<_>>(),
            Err(err) => {
                state.last_error_code = Some(crate::errors::ErrorCode::GitStatusFailed);
                state.consecutive_failures += 1;
                warn!(error = %err, "git status failed during reactive scope check");
                state.iteration += 1;
                options.callbacks.on_iteration(state);
                continue;
            }
        };

        let verdict = pf.scope_guard.validate(&changed);
        if verdict.is_ask() {
            let ask_paths: Vec<String> = verdict
                .verdicts
                .iter()
                .filter(|v| v.decision == Decision::AskUser)
                .map(|v| v.path.clone())
                .collect();
            let approved = options
                .callbacks
                .on_ask_user("the provider touched files outside the task's allowed scope", &ask_paths)
                .await;
            if approved {
                for path in &ask_paths {
                    pf.scope_guard.approve(path);
                }
            }
        }

        // Anything still BLOCK or un-approved ASK_USER after the prompt
        // above is reverted; only ALLOW survives into `files_modified`.
        let revalidated = pf.scope_guard.validate(&changed);
        let to_revert: Vec<String> = revalidated
            .verdicts
            .iter()
            .filter(|v| v.decision != Decision::Allow)
            .map(|v| v.path.clone())
            .collect();
        if !to_revert.is_empty() {
            let report = pf.scope_guard.generate_violation_report(&changed);
            state.last_scope_violation = Some(report.clone());
            if let Err(err) = git_ops.checkout(&to_revert.iter().map(PathBuf::from).collect::<Vec<_>>()).await {
                warn!(error = %err, "failed to revert out-of-scope files");
            }
            append_violation_report(&options.working_dir, &task_file, &report);
        }

        for path in &changed {
            if !to_revert.contains(path) {
                state.files_modified.insert(path.clone());
            }
        }

        // Step 5: validate before committing.
        let commands = &config.validation.pre_commit;
        let phase_result = pf.validator.run_phase(ValidationPhase::PreCommit, commands).await;
        let validation_passed = phase_result.passed;
        state.validation_results.push(phase_result.clone());

        if !validation_passed {
            let summary = phase_result
                .results
                .iter()
                .find(|r| !r.passed)
                .map(|r| format!("`{}` failed (exit {})", r.command, r.exit_code))
                .unwrap_or_else(|| "validation failed".to_string());

            if result.iteration_complete {
                // The provider thought it was done, but it isn't: report
                // back instead of terminating.
                state.last_validation_error = Some(summary);
                state.consecutive_failures += 1;
            } else {
                state.consecutive_failures += 1;
            }
            state.iteration += 1;
            options.callbacks.on_iteration(state);
            continue;
        }
        state.last_validation_error = None;
        state.consecutive_failures = 0;

        // Step 6: commit (retry once, then warn and keep going — a failed
        // commit is not itself fatal to the run).
        if config.permissions.auto_commit && !changed.is_empty() {
            commit_with_retry(git_ops.as_ref(), &config.git.commit_prefix, &context.task.goal).await;
        }

        // Step 9: this iteration is done; count it before the step 7/8
        // terminal checks below so a task that finishes on its first pass
        // reports iteration=1.
        state.iteration += 1;

        // Step 7/8: terminal checks.
        if let Some(reason) = &result.blocked {
            state.blocked_reason = Some(reason.clone());
            return ExitReason::Blocked(reason.clone());
        }
        if result.iteration_complete {
            return ExitReason::Completed;
        }

        options.callbacks.on_iteration(state);
    }
}

enum ErrorBranch {
    FailImmediately,
    BackoffNoCounter,
    RetryWithCounter,
}

/// Maps a provider error code to how the loop should react to it.
fn branch_on_error(code: Option<ErrorCode>) -> ErrorBranch {
    let Some(code) = code else {
        return ErrorBranch::RetryWithCounter;
    };

    match code {
        ErrorCode::ConfigInvalid
        | ErrorCode::ConfigMissing
        | ErrorCode::ConfigParseError
        | ErrorCode::ConfigEnvVarMissing
        | ErrorCode::PermissionSkipDenied
        | ErrorCode::PermissionCommandBlocked
        | ErrorCode::PermissionFileAccess
        | ErrorCode::PermissionAuth
        | ErrorCode::ProviderNotAvailable
        | ErrorCode::GitRevertFailed => ErrorBranch::FailImmediately,
        ErrorCode::ProviderRateLimit => ErrorBranch::BackoffNoCounter,
        _ if code.category() == ErrorCategory::Provider || code.category() == ErrorCategory::Timeout => {
            ErrorBranch::RetryWithCounter
        }
        _ if code.retryable() => ErrorBranch::RetryWithCounter,
        _ => ErrorBranch::FailImmediately,
    }
}

async fn commit_with_retry(git_ops: &dyn GitOps, commit_prefix: &str, goal: &str) {
    if let Err(err) = git_ops.add(&[]).await {
        warn!(error = %err, "git add failed before commit");
        return;
    }

    let truncated_goal: String = goal.chars().take(72).collect();
    let message = format!("{}{}", commit_prefix, truncated_goal);
    if let Err(first_err) = git_ops.commit(&message).await {
        warn!(error = %first_err, "commit failed, retrying once");
        if let Err(second_err) = git_ops.commit(&message).await {
            warn!(error = %second_err, "commit failed again, continuing without committing this iteration");
        } else {
            info!("committed on retry");
        }
    } else {
        info!("committed iteration");
    }
}

fn relative_task_path(context: &LoadedContext, working_dir: &std::path::Path) -> Option<String> {
    context
        .task
        .file_path
        .strip_prefix(working_dir)
        .ok()
        .map(|p| p.to_string_lossy().to_string())
}

fn append_violation_report(working_dir: &std::path::Path, task_file: &Option<String>, report: &str) {
    let Some(task_file) = task_file else { return };
    let path = working_dir.join(task_file);
    let Ok(content) = std::fs::read_to_string(&path) else { return };
    let updated = append_section(&content, &format!("## Status: SCOPE VIOLATION\n\n{}", report));
    if let Err(err) = std::fs::write(&path, updated) {
        warn!(error = %err, "failed to append scope violation report to task file");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::preflight;
    use crate::git_ops::FileChange;
    use crate::provider::{ExecuteOptions, ExecutionResult, Provider};
    use crate::task::{Task, TaskScope};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct ScriptedProvider {
        results: Mutex<Vec<ExecutionResult>>,
    }

    impl ScriptedProvider {
        fn new(results: Vec<ExecutionResult>) -> Self {
            Self { results: Mutex::new(results.into_iter().rev().collect()) }
        }
    }

    #[async_trait]
    impl Provider for ScriptedProvider {
        fn name(&self) -> &str {
            "scripted"
        }
        async fn is_available(&self) -> bool {
            true
        }
        async fn execute(&self, _prompt: &str, _options: ExecuteOptions<'_>) -> ExecutionResult {
            self.results.lock().unwrap().pop().unwrap_or_else(|| ExecutionResult {
                success: true,
                iteration_complete: true,
                ..Default::default()
            })
        }
    }

    struct RecordingGitOps {
        changed: Vec<String>,
        checkouts: Mutex<Vec<PathBuf>>,
        commits: AtomicUsize,
    }

    impl RecordingGitOps {
        fn new(changed: Vec<&str>) -> Self {
            Self {
                changed: changed.into_iter().map(String::from).collect(),
                checkouts: Mutex::new(Vec::new()),
                commits: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl GitOps for RecordingGitOps {
        async fn status(&self) -> Result<Vec<FileChange>, crate::errors::GitError> {
            Ok(self.changed.iter().map(|p| FileChange { path: PathBuf::from(p), staged: false }).collect())
        }
        async fn add(&self, _paths: &[PathBuf]) -> Result<(), crate::errors::GitError> {
            Ok(())
        }
        async fn commit(&self, _message: &str) -> Result<String, crate::errors::GitError> {
            self.commits.fetch_add(1, Ordering::SeqCst);
            Ok("abc123".to_string())
        }
        async fn checkout(&self, paths: &[PathBuf]) -> Result<(), crate::errors::GitError> {
            self.checkouts.lock().unwrap().extend(paths.iter().cloned());
            Ok(())
        }
        async fn push(&self) -> Result<(), crate::errors::GitError> {
            Ok(())
        }
    }

    fn task(allowed: &[&str]) -> Task {
        Task {
            file_path: PathBuf::from("/repo/.ai/tasks/pending/t.md"),
            goal: "widget".to_string(),
            task_type: "feature".to_string(),
            requirements: String::new(),
            notes: String::new(),
            suggested_roles: vec![],
            scope: TaskScope {
                allowed: allowed.iter().map(|s| s.to_string()).collect(),
                forbidden: vec![],
                ask_before: vec![],
            },
            definition_of_done: vec![],
            blocked_status: None,
        }
    }

    fn context(allowed: &[&str]) -> LoadedContext {
        LoadedContext {
            agents_content: String::new(),
            role: None,
            task: task(allowed),
            plan: None,
            skills: vec![],
        }
    }

    #[tokio::test]
    async fn completes_on_first_iteration_when_provider_signals_done() {
        let ctx = context(&["src/**"]);
        let config = Config::default();
        let git_ops: Arc<dyn GitOps> = Arc::new(RecordingGitOps::new(vec!["src/a.rs"]));
        let mut pf = preflight::run(&config, &ctx.task, PathBuf::from("/repo"), Arc::clone(&git_ops));
        pf.provider = Arc::new(ScriptedProvider::new(vec![ExecutionResult {
            success: true,
            iteration_complete: true,
            ..Default::default()
        }]));
        let mut state = ExecutorState::new();
        let options = RunOptions::new(PathBuf::from("/repo"));

        let outcome = run(&ctx, &config, &mut pf, git_ops, &mut state, &options).await;
        assert_eq!(outcome, ExitReason::Completed);
        assert_eq!(state.iteration, 1);
    }

    #[tokio::test]
    async fn blocked_sentinel_stops_the_loop() {
        let ctx = context(&["src/**"]);
        let config = Config::default();
        let git_ops: Arc<dyn GitOps> = Arc::new(RecordingGitOps::new(vec![]));
        let mut pf = preflight::run(&config, &ctx.task, PathBuf::from("/repo"), Arc::clone(&git_ops));
        pf.provider = Arc::new(ScriptedProvider::new(vec![ExecutionResult {
            success: true,
            blocked: Some("missing API key".to_string()),
            ..Default::default()
        }]));
        let mut state = ExecutorState::new();
        let options = RunOptions::new(PathBuf::from("/repo"));

        let outcome = run(&ctx, &config, &mut pf, git_ops, &mut state, &options).await;
        assert_eq!(outcome, ExitReason::Blocked("missing API key".to_string()));
    }

    #[tokio::test]
    async fn out_of_scope_changes_are_reverted() {
        let ctx = context(&["src/**"]);
        let config = Config::default();
        let git_ops: Arc<dyn GitOps> = Arc::new(RecordingGitOps::new(vec!["src/a.rs", "README.md"]));
        let mut pf = preflight::run(&config, &ctx.task, PathBuf::from("/repo"), Arc::clone(&git_ops));
        pf.provider = Arc::new(ScriptedProvider::new(vec![ExecutionResult {
            success: true,
            iteration_complete: true,
            ..Default::default()
        }]));
        let mut state = ExecutorState::new();
        let options = RunOptions::new(PathBuf::from("/repo"));

        let outcome = run(&ctx, &config, &mut pf, git_ops, &mut state, &options).await;
        assert_eq!(outcome, ExitReason::Completed);
        assert!(state.last_scope_violation.is_some());
        assert!(state.files_modified.contains("src/a.rs"));
        assert!(!state.files_modified.contains("README.md"));
    }

    #[tokio::test]
    async fn max_iterations_is_a_terminal_exit() {
        let ctx = context(&["src/**"]);
        let mut config = Config::default();
        config.execution.max_iterations = 2;
        let git_ops: Arc<dyn GitOps> = Arc::new(RecordingGitOps::new(vec![]));
        let mut pf = preflight::run(&config, &ctx.task, PathBuf::from("/repo"), Arc::clone(&git_ops));
        pf.provider = Arc::new(ScriptedProvider::new(vec![
            ExecutionResult { success: true, iteration_complete: false, ..Default::default() },
            ExecutionResult { success: true, iteration_complete: false, ..Default::default() },
        ]));
        let mut state = ExecutorState::new();
        let options = RunOptions::new(PathBuf::from("/repo"));

        let outcome = run(&ctx, &config, &mut pf, git_ops, &mut state, &options).await;
        assert_eq!(outcome, ExitReason::MaxIterations);
    }

    #[tokio::test]
    async fn config_error_fails_immediately_without_consuming_failure_budget() {
        let ctx = context(&["src/**"]);
        let config = Config::default();
        let git_ops: Arc<dyn GitOps> = Arc::new(RecordingGitOps::new(vec![]));
        let mut pf = preflight::run(&config, &ctx.task, PathBuf::from("/repo"), Arc::clone(&git_ops));
        pf.provider = Arc::new(ScriptedProvider::new(vec![ExecutionResult::failure(
            "bad config",
            crate::errors::ErrorCode::ConfigInvalid,
        )]));
        let mut state = ExecutorState::new();
        let options = RunOptions::new(PathBuf::from("/repo"));

        let outcome = run(&ctx, &config, &mut pf, git_ops, &mut state, &options).await;
        assert!(matches!(outcome, ExitReason::ConfigOrPermissionError(_, crate::errors::ErrorCode::ConfigInvalid)));
        assert_eq!(state.consecutive_failures, 0);
    }
}
