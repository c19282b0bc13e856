//! Subprocess providers (`claude-cli`, `cursor-cli`) — spawn an external
//! process, stream stdout, scan for completion/block sentinels, then infer
//! `filesChanged` via `GitOps.status()`.
//!
//! Spawn/stream/timeout shape is grounded on the teacher's
//! `tools::shell::ShellExec` (`kill_on_drop` + `tokio::time::timeout`),
//! generalized to streaming stdout line-by-line rather than collecting a
//! single `Output`.

use super::{scan_sentinels, wait_for_cancel, ExecuteOptions, ExecutionResult, Provider};
use crate::errors::ErrorCode;
use crate::git_ops::GitOps;
use async_trait::async_trait;
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;

pub struct SubprocessProvider {
    name: &'static str,
    binary: &'static str,
    git_ops: Arc<dyn GitOps>,
}

impl SubprocessProvider {
    pub fn new(name: &'static str, binary: &'static str, git_ops: Arc<dyn GitOps>) -> Self {
        Self { name, binary, git_ops }
    }
}

#[async_trait]
impl Provider for SubprocessProvider {
    fn name(&self) -> &str {
        self.name
    }

    async fn is_available(&self) -> bool {
        Command::new(self.binary)
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|status| status.success())
            .unwrap_or(false)
    }

    async fn execute(&self, prompt: &str, options: ExecuteOptions<'_>) -> ExecutionResult {
        let mut cmd = Command::new(self.binary);
        cmd.kill_on_drop(true);
        cmd.current_dir(&options.working_dir);
        cmd.stdin(Stdio::piped());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => return ExecutionResult::failure(format!("failed to spawn {}: {}", self.binary, e), ErrorCode::ProviderCrash),
        };

        if let Some(mut stdin) = child.stdin.take() {
            if let Err(e) = stdin.write_all(prompt.as_bytes()).await {
                return ExecutionResult::failure(format!("failed to write prompt to stdin: {}", e), ErrorCode::ProviderCrash);
            }
        }

        let stdout = child.stdout.take().expect("stdout piped");
        let mut reader = BufReader::new(stdout).lines();
        let mut output = String::new();

        let read_loop = async {
            while let Ok(Some(line)) = reader.next_line().await {
                if let Some(callback) = &options.on_output {
                    callback(&line);
                }
                output.push_str(&line);
                output.push('\n');
            }
        };

        tokio::select! {
            biased;
            _ = wait_for_cancel(options.cancel.clone()) => {
                let _ = child.start_kill();
                return ExecutionResult::failure("iteration cancelled", ErrorCode::OperationTimeout);
            }
            outcome = tokio::time::timeout(options.timeout, read_loop) => {
                if outcome.is_err() {
                    let _ = child.start_kill();
                    return ExecutionResult::failure(
                        format!("iteration exceeded {}s", options.timeout.as_secs()),
                        ErrorCode::IterationTimeout,
                    );
                }
            }
        }

        let status = match child.wait().await {
            Ok(status) => status,
            Err(e) => return ExecutionResult::failure(format!("provider process error: {}", e), ErrorCode::ProviderCrash),
        };

        if !status.success() {
            return ExecutionResult::failure(
                format!("{} exited with {:?}", self.binary, status.code()),
                ErrorCode::ProviderApiError,
            );
        }

        let (iteration_complete, blocked) = scan_sentinels(&output);

        let files_changed = match self.git_ops.status().await {
            Ok(changes) => changes.into_iter().map(|c| c.path_str()).collect(),
            Err(_) => Vec::new(),
        };

        ExecutionResult {
            success: true,
            output,
            files_changed,
            iteration_complete,
            blocked,
            error: None,
            error_category: None,
            error_code: None,
            conversation_state: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git_ops::FileChange;
    use std::path::PathBuf;

    struct EmptyGitOps;

    #[async_trait]
    impl GitOps for EmptyGitOps {
        async fn status(&self) -> Result<Vec<FileChange>, crate::errors::GitError> {
            Ok(vec![])
        }
        async fn add(&self, _paths: &[PathBuf]) -> Result<(), crate::errors::GitError> {
            Ok(())
        }
        async fn commit(&self, _message: &str) -> Result<String, crate::errors::GitError> {
            Ok("abc123".to_string())
        }
        async fn checkout(&self, _paths: &[PathBuf]) -> Result<(), crate::errors::GitError> {
            Ok(())
        }
        async fn push(&self) -> Result<(), crate::errors::GitError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn unavailable_binary_reports_false() {
        let provider = SubprocessProvider::new("nonexistent-cli", "definitely-not-a-real-binary-xyz", Arc::new(EmptyGitOps));
        assert!(!provider.is_available().await);
    }

    #[test]
    fn provider_name_matches_configured_variant() {
        let provider = SubprocessProvider::new("claude-cli", "claude", Arc::new(EmptyGitOps));
        assert_eq!(provider.name(), "claude-cli");
    }
}
