//! PostFlight: write the outcome into the task file, move
//! it between `.ai/tasks/{pending,completed,blocked}/`, commit/push if
//! configured, and produce the [`ExecutorResult`] handed back to the caller.

use super::{ExecutorResult, ExecutorState, ExecutorStatus, ExitReason};
use crate::config::Config;
use crate::context::LoadedContext;
use crate::git_ops::GitOps;
use crate::task::{self, LifecycleFolder};
use tracing::{info, warn};

pub async fn run(
    context: &LoadedContext,
    config: &Config,
    git_ops: &dyn GitOps,
    state: ExecutorState,
    outcome: ExitReason,
    elapsed_secs: u64,
) -> ExecutorResult {
    let task_path = context.task.file_path.clone();
    let mut files_modified: Vec<String> = state.files_modified.into_iter().collect();
    files_modified.sort();

    let (status, section, target_folder, result_fields) = match &outcome {
        ExitReason::Completed => {
            let mut section = task::render_completed_section(state.iteration, &files_modified, elapsed_secs);
            if let Some(blocked) = &context.task.blocked_status {
                section.push_str("\n\n");
                section.push_str(&task::render_execution_history_section(
                    &blocked.blocking_issue,
                    blocked.previous_iteration,
                    state.iteration,
                ));
            }
            (ExecutorStatus::Completed, section, Some(LifecycleFolder::Completed), (None, None, None, None))
        }
        ExitReason::Blocked(reason) => {
            let started_at = context
                .task
                .blocked_status
                .as_ref()
                .map(|b| b.started_at)
                .unwrap_or_else(chrono::Utc::now);
            let section = task::render_blocked_section(state.iteration, &files_modified, reason, started_at);
            (
                ExecutorStatus::Blocked,
                section,
                Some(LifecycleFolder::Blocked),
                (
                    None,
                    state.last_error_code.map(|c| c.category()),
                    state.last_error_code,
                    Some(reason.clone()),
                ),
            )
        }
        ExitReason::MaxIterations => {
            let reason = "max_iterations".to_string();
            let started_at = context
                .task
                .blocked_status
                .as_ref()
                .map(|b| b.started_at)
                .unwrap_or_else(chrono::Utc::now);
            let section = task::render_blocked_section(state.iteration, &files_modified, &reason, started_at);
            (
                ExecutorStatus::Blocked,
                section,
                Some(LifecycleFolder::Blocked),
                (
                    None,
                    state.last_error_code.map(|c| c.category()),
                    state.last_error_code,
                    Some(reason),
                ),
            )
        }
        ExitReason::MaxFailures => {
            let reason = "max_failures".to_string();
            let started_at = context
                .task
                .blocked_status
                .as_ref()
                .map(|b| b.started_at)
                .unwrap_or_else(chrono::Utc::now);
            let section = task::render_blocked_section(state.iteration, &files_modified, &reason, started_at);
            (
                ExecutorStatus::Blocked,
                section,
                Some(LifecycleFolder::Blocked),
                (
                    None,
                    state.last_error_code.map(|c| c.category()),
                    state.last_error_code,
                    Some(reason),
                ),
            )
        }
        ExitReason::Cancelled => {
            let message = "run cancelled".to_string();
            let section = task::render_failed_section(state.iteration, &message);
            (ExecutorStatus::Failed, section, None, (Some(message), None, None, None))
        }
        ExitReason::ConfigOrPermissionError(message, code) => {
            let section = task::render_failed_section(state.iteration, message);
            (
                ExecutorStatus::Failed,
                section,
                None,
                (Some(message.clone()), Some(code.category()), Some(*code), None),
            )
        }
        ExitReason::DryRun => unreachable!("DryRun is handled before PostFlight"),
    };

    write_status_section(&task_path, &section);
    let final_path = target_folder
        .map(|folder| move_task_file(&task_path, folder))
        .unwrap_or_else(|| task_path.clone());

    if config.permissions.auto_commit {
        if let Err(err) = git_ops.add(&[]).await {
            warn!(error = %err, "postflight: git add failed");
        } else if let Err(err) = git_ops
            .commit(&format!("{}postflight: {:?}", config.git.commit_prefix, status))
            .await
        {
            warn!(error = %err, "postflight: git commit failed");
        }
    }

    if config.permissions.auto_push && status == ExecutorStatus::Completed {
        if let Err(err) = git_ops.push().await {
            warn!(error = %err, "postflight: git push failed");
        }
    }

    info!(task = %final_path.display(), status = ?status, iterations = state.iteration, "task run finished");

    let (error, error_category, error_code, blocked_reason) = result_fields;
    ExecutorResult {
        status,
        iterations: state.iteration,
        files_modified,
        task_path: final_path,
        error,
        error_category,
        error_code,
        error_details: None,
        blocked_reason,
    }
}

fn write_status_section(task_path: &std::path::Path, section: &str) {
    let Ok(content) = std::fs::read_to_string(task_path) else {
        warn!(path = %task_path.display(), "postflight: could not read task file to append status");
        return;
    };
    let updated = task::append_section(&content, section);
    if let Err(err) = std::fs::write(task_path, updated) {
        warn!(path = %task_path.display(), error = %err, "postflight: failed to write status section");
    }
}

/// Move the task file into its new lifecycle folder. A failed move is a
/// warning, not a run failure — the task file is left where it is.
fn move_task_file(task_path: &std::path::Path, target: LifecycleFolder) -> std::path::PathBuf {
    let Some(dir_name) = target.dir_name() else {
        return task_path.to_path_buf();
    };
    let Some(tasks_root) = task_path.parent().and_then(|p| p.parent()) else {
        return task_path.to_path_buf();
    };
    let Some(file_name) = task_path.file_name() else {
        return task_path.to_path_buf();
    };

    let new_dir = tasks_root.join(dir_name);
    let new_path = new_dir.join(file_name);

    if new_path.as_path() == task_path {
        return task_path.to_path_buf();
    }

    if let Err(err) = std::fs::create_dir_all(&new_dir) {
        warn!(error = %err, "postflight: failed to create lifecycle folder {}", new_dir.display());
        return task_path.to_path_buf();
    }

    match std::fs::rename(task_path, &new_path) {
        Ok(()) => new_path,
        Err(err) => {
            warn!(error = %err, from = %task_path.display(), to = %new_path.display(), "postflight: failed to move task file");
            task_path.to_path_buf()
        }
    }
}
