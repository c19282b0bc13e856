//! PreFlight: construct the run's collaborators and detect
//! whether this is a fresh run or a resume.
//!
//! Loading `LoadedContext` itself is the caller's job; PreFlight only wires up the `ScopeGuard`,
//! `Validator`, and `Provider` around an already-loaded [`crate::task::Task`].

use crate::config::Config;
use crate::git_ops::GitOps;
use crate::provider::{Provider, ProviderFactory};
use crate::scope::{EnforcementMode, ScopeGuard};
use crate::task::Task;
use crate::validator::Validator;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::warn;

/// Collaborators assembled for one run, handed to `execution_loop::run`.
pub struct PreFlightResult {
    pub scope_guard: ScopeGuard,
    pub validator: Validator,
    pub provider: Arc<dyn Provider>,
    pub resuming: bool,
    pub security_warning: Option<String>,
}

/// Build the `ScopeGuard`/`Validator`/`Provider` for a run, detect resume
/// from `task.blocked_status`, and produce a security warning string when
/// `skip_permissions` is set with `warn_on_skip` so the risk is still
/// surfaced even though enforcement itself is disabled.
pub fn run(config: &Config, task: &Task, working_dir: PathBuf, git_ops: Arc<dyn GitOps>) -> PreFlightResult {
    let mode = EnforcementMode::from(config.permissions.scope_enforcement);
    let scope_guard = ScopeGuard::new(task.scope.clone(), mode);
    let validator = Validator::new(working_dir);
    let provider = ProviderFactory::create(&config.provider, git_ops);
    let resuming = task.blocked_status.is_some();

    let security_warning = if config.security.skip_permissions && config.security.warn_on_skip {
        let message = format!(
            "permission checks are disabled for this run (skip_permissions=true); \
            scope and command enforcement will not stop unexpected changes to {}",
            task.file_path.display()
        );
        warn!(task = %task.file_path.display(), "{}", message);
        Some(message)
    } else {
        None
    };

    PreFlightResult {
        scope_guard,
        validator,
        provider,
        resuming,
        security_warning,
    }
}
