//! `Validator` — runs an ordered list of shell commands with a per-command
//! timeout, per validation phase.
//!
//! Command spawning and timeout handling is grounded on the teacher's
//! `tools::shell::ShellExec` (`kill_on_drop(true)` + `tokio::time::timeout`
//! wrapping `Command::output()`); SIGTERM-on-timeout semantics follow from
//! `kill_on_drop` sending the process a kill signal when the future is
//! dropped at the timeout boundary.

use crate::tools::shell::default_shell;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::warn;

const MAX_OUTPUT_CHARS: usize = 5000;
const DEFAULT_TIMEOUT_SECS: u64 = 300;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationPhase {
    PreCommit,
    PrePush,
    PrePr,
}

impl ValidationPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PreCommit => "pre_commit",
            Self::PrePush => "pre_push",
            Self::PrePr => "pre_pr",
        }
    }

    /// Whether this phase stops at the first failing command.
    fn stop_on_first_failure(&self) -> bool {
        !matches!(self, Self::PrePr)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandResult {
    pub command: String,
    pub passed: bool,
    pub output: String,
    pub duration_ms: u64,
    pub exit_code: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseResult {
    pub phase: String,
    pub passed: bool,
    pub results: Vec<CommandResult>,
    pub total_duration_ms: u64,
}

pub struct Validator {
    working_dir: std::path::PathBuf,
    timeout: Duration,
}

impl Validator {
    pub fn new(working_dir: std::path::PathBuf) -> Self {
        Self {
            working_dir,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub async fn run_phase(&self, phase: ValidationPhase, commands: &[String]) -> PhaseResult {
        let phase_start = Instant::now();
        let mut results = Vec::with_capacity(commands.len());

        for command in commands {
            let result = self.run_command(command).await;
            let passed = result.passed;
            results.push(result);

            if !passed && phase.stop_on_first_failure() {
                break;
            }
        }

        let passed = results.iter().all(|r| r.passed);

        PhaseResult {
            phase: phase.as_str().to_string(),
            passed,
            results,
            total_duration_ms: phase_start.elapsed().as_millis() as u64,
        }
    }

    async fn run_command(&self, command: &str) -> CommandResult {
        let (shell, flag) = default_shell();
        let mut cmd = tokio::process::Command::new(shell);
        cmd.kill_on_drop(true);
        cmd.arg(flag).arg(command);
        cmd.current_dir(&self.working_dir);

        let start = Instant::now();
        let outcome = tokio::time::timeout(self.timeout, cmd.output()).await;
        let duration_ms = start.elapsed().as_millis() as u64;

        match outcome {
            Ok(Ok(output)) => {
                let stdout = String::from_utf8_lossy(&output.stdout);
                let stderr = String::from_utf8_lossy(&output.stderr);
                let combined = format!("{}\n--- stderr ---\n{}", stdout, stderr);
                CommandResult {
                    command: command.to_string(),
                    passed: output.status.success(),
                    output: truncate(&combined),
                    duration_ms,
                    exit_code: output.status.code().unwrap_or(-1),
                }
            }
            Ok(Err(err)) => CommandResult {
                command: command.to_string(),
                passed: false,
                output: truncate(&format!("failed to spawn: {}", err)),
                duration_ms,
                exit_code: -1,
            },
            Err(_) => {
                warn!(command, "validation command timed out, sending SIGTERM");
                CommandResult {
                    command: command.to_string(),
                    passed: false,
                    output: truncate("command timed out"),
                    duration_ms,
                    exit_code: -1,
                }
            }
        }
    }
}

fn truncate(s: &str) -> String {
    s.chars().take(MAX_OUTPUT_CHARS).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn passing_command_reports_success() {
        let validator = Validator::new(std::env::temp_dir());
        let result = validator.run_command("true").await;
        assert!(result.passed);
        assert_eq!(result.exit_code, 0);
    }

    #[tokio::test]
    async fn failing_command_reports_exit_code() {
        let validator = Validator::new(std::env::temp_dir());
        let result = validator.run_command("exit 3").await;
        assert!(!result.passed);
        assert_eq!(result.exit_code, 3);
    }

    #[tokio::test]
    async fn timeout_reports_exit_code_minus_one() {
        let validator = Validator::new(std::env::temp_dir()).with_timeout(Duration::from_millis(50));
        let result = validator.run_command("sleep 5").await;
        assert!(!result.passed);
        assert_eq!(result.exit_code, -1);
    }

    #[tokio::test]
    async fn pre_commit_stops_on_first_failure() {
        let validator = Validator::new(std::env::temp_dir());
        let commands = vec!["exit 1".to_string(), "true".to_string()];
        let phase = validator.run_phase(ValidationPhase::PreCommit, &commands).await;
        assert!(!phase.passed);
        assert_eq!(phase.results.len(), 1);
    }

    #[tokio::test]
    async fn pre_pr_runs_all_even_on_failure() {
        let validator = Validator::new(std::env::temp_dir());
        let commands = vec!["exit 1".to_string(), "true".to_string()];
        let phase = validator.run_phase(ValidationPhase::PrePr, &commands).await;
        assert!(!phase.passed);
        assert_eq!(phase.results.len(), 2);
    }

    #[tokio::test]
    async fn output_truncated_to_5000_chars() {
        let validator = Validator::new(std::env::temp_dir());
        let result = validator.run_command("yes | head -c 20000").await;
        assert!(result.output.chars().count() <= MAX_OUTPUT_CHARS);
    }
}
