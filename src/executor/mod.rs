//! `Executor` — the iteration state machine, composed from three
//! phases matching the teacher's `agent/{execution, task_runner,
//! checkpointing}.rs` split:
//! [`preflight`] constructs collaborators, [`execution_loop`] runs the
//! numbered 1-9 steps until a terminal state, [`postflight`] writes the
//! status section and moves the task file between lifecycle folders.

pub mod execution_loop;
pub mod postflight;
pub mod preflight;
pub mod prompt;

use crate::conversation::Message;
use crate::errors::{ErrorCategory, ErrorCode};
use crate::git_ops::GitOps;
use crate::validator::PhaseResult;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

/// Terminal and transient run states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecutorStatus {
    #[default]
    Idle,
    Running,
    Completed,
    Blocked,
    Failed,
    DryRun,
}

/// Mutable, single-owner run state.
#[derive(Debug, Clone, Default)]
pub struct ExecutorState {
    pub status: ExecutorStatus,
    pub iteration: usize,
    pub files_modified: HashSet<String>,
    pub validation_results: Vec<PhaseResult>,
    pub consecutive_failures: usize,
    pub last_validation_error: Option<String>,
    pub last_scope_violation: Option<String>,
    pub conversation_state: Option<Vec<Message>>,
    pub conversation_message_count: usize,
    pub last_error_code: Option<ErrorCode>,
    pub blocked_reason: Option<String>,
}

impl ExecutorState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed iteration/files from a prior `BlockedStatus` on resume.
    pub fn seed_from_blocked(&mut self, blocked: &crate::task::BlockedStatus) {
        self.iteration = blocked.previous_iteration;
        self.files_modified = blocked.files_modified.iter().cloned().collect();
    }
}

/// Why the execution loop stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitReason {
    Completed,
    Blocked(String),
    MaxIterations,
    MaxFailures,
    DryRun,
    Cancelled,
    ConfigOrPermissionError(String, ErrorCode),
}

/// Per-task outcome.
#[derive(Debug, Clone)]
pub struct ExecutorResult {
    pub status: ExecutorStatus,
    pub iterations: usize,
    pub files_modified: Vec<String>,
    pub task_path: PathBuf,
    pub error: Option<String>,
    pub error_category: Option<ErrorCategory>,
    pub error_code: Option<ErrorCode>,
    pub error_details: Option<String>,
    pub blocked_reason: Option<String>,
}

/// Phase-transition notifications for `onPhase`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseEvent {
    PreFlight,
    ExecutionLoop,
    PostFlight,
}

/// Collaborator callbacks injected into a run. Default bodies
/// are no-ops so tests/CLI adapters only override what they need.
#[async_trait::async_trait]
pub trait ExecutorCallbacks: Send + Sync {
    fn on_phase(&self, _event: PhaseEvent) {}
    fn on_iteration(&self, _state: &ExecutorState) {}
    fn on_output(&self, _chunk: &str) {}
    async fn on_ask_user(&self, _prompt: &str, _files: &[String]) -> bool {
        false
    }
}

pub struct NoopCallbacks;
impl ExecutorCallbacks for NoopCallbacks {}

/// Per-run options.
pub struct RunOptions {
    pub working_dir: PathBuf,
    pub dry_run: bool,
    pub callbacks: Arc<dyn ExecutorCallbacks>,
    pub cancel: tokio::sync::watch::Receiver<bool>,
}

impl RunOptions {
    pub fn new(working_dir: PathBuf) -> Self {
        let (_tx, rx) = tokio::sync::watch::channel(false);
        Self {
            working_dir,
            dry_run: false,
            callbacks: Arc::new(NoopCallbacks),
            cancel: rx,
        }
    }
}

/// The state machine itself: `run()` composes PreFlight → ExecutionLoop →
/// PostFlight.
pub struct Executor {
    config: crate::config::Config,
    git_ops: Arc<dyn GitOps>,
}

impl Executor {
    pub fn new(config: crate::config::Config, git_ops: Arc<dyn GitOps>) -> Self {
        Self { config, git_ops }
    }

    pub async fn run(&self, context: crate::context::LoadedContext, options: RunOptions) -> ExecutorResult {
        let task_path = context.task.file_path.clone();
        let started_at = std::time::Instant::now();

        options.callbacks.on_phase(PhaseEvent::PreFlight);
        let mut pf = preflight::run(&self.config, &context.task, options.working_dir.clone(), Arc::clone(&self.git_ops));
        if let Some(warning) = &pf.security_warning {
            options.callbacks.on_output(warning);
        }

        let mut state = ExecutorState::new();
        if let Some(blocked) = &context.task.blocked_status {
            state.seed_from_blocked(blocked);
        }

        if options.dry_run {
            options.callbacks.on_phase(PhaseEvent::ExecutionLoop);
            let prompt = prompt::build(&context, &state);
            options.callbacks.on_output(&prompt);
            return ExecutorResult {
                status: ExecutorStatus::DryRun,
                iterations: state.iteration,
                files_modified: state.files_modified.into_iter().collect(),
                task_path,
                error: None,
                error_category: None,
                error_code: None,
                error_details: None,
                blocked_reason: None,
            };
        }

        options.callbacks.on_phase(PhaseEvent::ExecutionLoop);
        let outcome = execution_loop::run(
            &context,
            &self.config,
            &mut pf,
            Arc::clone(&self.git_ops),
            &mut state,
            &options,
        )
        .await;

        options.callbacks.on_phase(PhaseEvent::PostFlight);
        postflight::run(&context, &self.config, &*self.git_ops, state, outcome, started_at.elapsed().as_secs()).await
    }
}
