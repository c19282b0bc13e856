//! `GitOps` — the narrow git-plumbing capability (status/add/commit/
//! checkout/push) injected into the core rather than built into it, so
//! tests can swap in a fake and the CLI can wire up a real one.
//!
//! Grounded on the teacher's `tools::git` tool implementations: status via
//! `git2` (no subprocess needed for a read), commit/push/checkout via the
//! `git` CLI (simpler to get exactly right for index/worktree edge cases).

use crate::errors::GitError;
use async_trait::async_trait;
use git2::{Repository, StatusOptions};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// A single changed path as reported by `git status`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileChange {
    pub path: PathBuf,
    pub staged: bool,
}

/// Narrow git capability the Executor depends on. Real implementation is
/// [`Git2Ops`]; tests inject a `MockGitOps`.
#[async_trait]
pub trait GitOps: Send + Sync {
    async fn status(&self) -> Result<Vec<FileChange>, GitError>;
    async fn add(&self, paths: &[PathBuf]) -> Result<(), GitError>;
    async fn commit(&self, message: &str) -> Result<String, GitError>;
    async fn checkout(&self, paths: &[PathBuf]) -> Result<(), GitError>;
    async fn push(&self) -> Result<(), GitError>;
}

pub struct Git2Ops {
    repo_path: PathBuf,
}

impl Git2Ops {
    pub fn new(repo_path: PathBuf) -> Self {
        Self { repo_path }
    }

    async fn run_git(&self, args: &[&str]) -> Result<std::process::Output, std::io::Error> {
        tokio::process::Command::new("git")
            .arg("-C")
            .arg(&self.repo_path)
            .args(args)
            .output()
            .await
    }
}

#[async_trait]
impl GitOps for Git2Ops {
    async fn status(&self) -> Result<Vec<FileChange>, GitError> {
        let repo_path = self.repo_path.clone();
        tokio::task::spawn_blocking(move || {
            let repo = Repository::open(&repo_path)
                .map_err(|e| GitError::StatusFailed(e.to_string()))?;
            let mut opts = StatusOptions::new();
            opts.include_untracked(true);
            let statuses = repo
                .statuses(Some(&mut opts))
                .map_err(|e| GitError::StatusFailed(e.to_string()))?;

            let mut changes = Vec::new();
            for entry in statuses.iter() {
                let Some(path) = entry.path() else { continue };
                let bits = entry.status();
                let staged = bits.is_index_new() || bits.is_index_modified() || bits.is_index_deleted();
                changes.push(FileChange { path: PathBuf::from(path), staged });
            }
            Ok(changes)
        })
        .await
        .map_err(|e| GitError::StatusFailed(e.to_string()))?
    }

    async fn add(&self, paths: &[PathBuf]) -> Result<(), GitError> {
        let mut args = vec!["add".to_string()];
        if paths.is_empty() {
            args.push("-A".to_string());
        } else {
            args.extend(paths.iter().map(|p| p.to_string_lossy().to_string()));
        }
        let args_ref: Vec<&str> = args.iter().map(|s| s.as_str()).collect();
        let output = self
            .run_git(&args_ref)
            .await
            .map_err(|e| GitError::CommitFailed(e.to_string()))?;
        if !output.status.success() {
            return Err(GitError::CommitFailed(
                String::from_utf8_lossy(&output.stderr).to_string(),
            ));
        }
        Ok(())
    }

    async fn commit(&self, message: &str) -> Result<String, GitError> {
        let output = self
            .run_git(&["commit", "-m", message])
            .await
            .map_err(|e| GitError::CommitFailed(e.to_string()))?;
        if !output.status.success() {
            return Err(GitError::CommitFailed(
                String::from_utf8_lossy(&output.stderr).to_string(),
            ));
        }
        let hash_output = self
            .run_git(&["rev-parse", "HEAD"])
            .await
            .map_err(|e| GitError::CommitFailed(e.to_string()))?;
        info!("committed changes");
        Ok(String::from_utf8_lossy(&hash_output.stdout).trim().to_string())
    }

    async fn checkout(&self, paths: &[PathBuf]) -> Result<(), GitError> {
        if paths.is_empty() {
            return Ok(());
        }
        let mut args = vec!["checkout".to_string(), "--".to_string()];
        args.extend(paths.iter().map(|p| p.to_string_lossy().to_string()));
        let args_ref: Vec<&str> = args.iter().map(|s| s.as_str()).collect();
        let output = self
            .run_git(&args_ref)
            .await
            .map_err(|e| GitError::RevertFailed(e.to_string()))?;
        if !output.status.success() {
            return Err(GitError::RevertFailed(
                String::from_utf8_lossy(&output.stderr).to_string(),
            ));
        }
        warn!(count = paths.len(), "reverted out-of-scope files");
        Ok(())
    }

    async fn push(&self) -> Result<(), GitError> {
        let output = self
            .run_git(&["push"])
            .await
            .map_err(|e| GitError::PushFailed(e.to_string()))?;
        if !output.status.success() {
            return Err(GitError::PushFailed(
                String::from_utf8_lossy(&output.stderr).to_string(),
            ));
        }
        Ok(())
    }
}

impl FileChange {
    pub fn path_str(&self) -> String {
        self.path.to_string_lossy().to_string()
    }
}

pub fn is_repo(path: &Path) -> bool {
    Repository::open(path).is_ok()
}
