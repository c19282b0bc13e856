//! The central error taxonomy for the executor.
//!
//! Every error that crosses the [`Executor`](crate::executor::Executor)
//! boundary carries a `category`, a stable `code`, and a `retryable` flag.
//! The executor's error-branching table (see `executor::execution`) is the
//! single source of propagation policy; this module only classifies.

use std::path::PathBuf;
use thiserror::Error;

/// Top-level error for the AIDF core.
#[derive(Error, Debug)]
pub enum AidfError {
    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("scope error: {0}")]
    Scope(#[from] ScopeError),

    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("git error: {0}")]
    Git(#[from] GitError),

    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("task error: {0}")]
    Task(#[from] TaskError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Stable, coarse-grained error categories used for branching and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    Provider,
    Timeout,
    Permission,
    Git,
    Config,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Provider => "provider",
            Self::Timeout => "timeout",
            Self::Permission => "permission",
            Self::Git => "git",
            Self::Config => "config",
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stable error codes, each mapped to a category and a retryability flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    ProviderCrash,
    ProviderApiError,
    ProviderRateLimit,
    ProviderNotAvailable,
    IterationTimeout,
    OperationTimeout,
    PermissionSkipDenied,
    PermissionCommandBlocked,
    PermissionFileAccess,
    PermissionAuth,
    GitStatusFailed,
    GitCommitFailed,
    GitPushFailed,
    GitRevertFailed,
    ConfigInvalid,
    ConfigMissing,
    ConfigParseError,
    ConfigEnvVarMissing,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ProviderCrash => "PROVIDER_CRASH",
            Self::ProviderApiError => "PROVIDER_API_ERROR",
            Self::ProviderRateLimit => "PROVIDER_RATE_LIMIT",
            Self::ProviderNotAvailable => "PROVIDER_NOT_AVAILABLE",
            Self::IterationTimeout => "ITERATION_TIMEOUT",
            Self::OperationTimeout => "OPERATION_TIMEOUT",
            Self::PermissionSkipDenied => "PERMISSION_SKIP_DENIED",
            Self::PermissionCommandBlocked => "PERMISSION_COMMAND_BLOCKED",
            Self::PermissionFileAccess => "PERMISSION_FILE_ACCESS",
            Self::PermissionAuth => "PERMISSION_AUTH",
            Self::GitStatusFailed => "GIT_STATUS_FAILED",
            Self::GitCommitFailed => "GIT_COMMIT_FAILED",
            Self::GitPushFailed => "GIT_PUSH_FAILED",
            Self::GitRevertFailed => "GIT_REVERT_FAILED",
            Self::ConfigInvalid => "CONFIG_INVALID",
            Self::ConfigMissing => "CONFIG_MISSING",
            Self::ConfigParseError => "CONFIG_PARSE_ERROR",
            Self::ConfigEnvVarMissing => "CONFIG_ENV_VAR_MISSING",
        }
    }

    /// Whether the executor should retry (consuming a `consecutiveFailures`
    /// slot) after seeing this code. Rate limits are retryable but are
    /// handled specially by the executor (back-off sleep, no counter
    /// increment) — see `executor::execution::branch_on_error`.
    pub fn retryable(&self) -> bool {
        match self {
            Self::ProviderCrash
            | Self::ProviderApiError
            | Self::ProviderRateLimit
            | Self::IterationTimeout
            | Self::OperationTimeout
            | Self::GitStatusFailed
            | Self::GitCommitFailed
            | Self::GitPushFailed => true,
            Self::ProviderNotAvailable
            | Self::PermissionSkipDenied
            | Self::PermissionCommandBlocked
            | Self::PermissionFileAccess
            | Self::PermissionAuth
            | Self::GitRevertFailed
            | Self::ConfigInvalid
            | Self::ConfigMissing
            | Self::ConfigParseError
            | Self::ConfigEnvVarMissing => false,
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::ProviderCrash
            | Self::ProviderApiError
            | Self::ProviderRateLimit
            | Self::ProviderNotAvailable => ErrorCategory::Provider,
            Self::IterationTimeout | Self::OperationTimeout => ErrorCategory::Timeout,
            Self::PermissionSkipDenied
            | Self::PermissionCommandBlocked
            | Self::PermissionFileAccess
            | Self::PermissionAuth => ErrorCategory::Permission,
            Self::GitStatusFailed
            | Self::GitCommitFailed
            | Self::GitPushFailed
            | Self::GitRevertFailed => ErrorCategory::Git,
            Self::ConfigInvalid
            | Self::ConfigMissing
            | Self::ConfigParseError
            | Self::ConfigEnvVarMissing => ErrorCategory::Config,
        }
    }
}

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("provider process crashed: {0}")]
    Crash(String),

    #[error("provider API returned an error: {0}")]
    ApiError(String),

    #[error("rate limited, retry after {retry_after_secs:?}s")]
    RateLimit { retry_after_secs: Option<u64> },

    #[error("provider '{0}' is not available")]
    NotAvailable(String),

    #[error("iteration exceeded {seconds}s")]
    IterationTimeout { seconds: u64 },

    #[error("operation timed out")]
    OperationTimeout,
}

impl ProviderError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Crash(_) => ErrorCode::ProviderCrash,
            Self::ApiError(_) => ErrorCode::ProviderApiError,
            Self::RateLimit { .. } => ErrorCode::ProviderRateLimit,
            Self::NotAvailable(_) => ErrorCode::ProviderNotAvailable,
            Self::IterationTimeout { .. } => ErrorCode::IterationTimeout,
            Self::OperationTimeout => ErrorCode::OperationTimeout,
        }
    }
}

#[derive(Error, Debug)]
pub enum ScopeError {
    #[error("path '{path}' is forbidden by task scope")]
    Forbidden { path: String },

    #[error("command blocked by policy: {command} ({reason})")]
    CommandBlocked { command: String, reason: String },

    #[error("operation requires user approval but none was given: {action}")]
    SkipDenied { action: String },
}

impl ScopeError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Forbidden { .. } | Self::SkipDenied { .. } => ErrorCode::PermissionSkipDenied,
            Self::CommandBlocked { .. } => ErrorCode::PermissionCommandBlocked,
        }
    }
}

#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("validation phase '{phase}' failed: {summary}")]
    PhaseFailed { phase: String, summary: String },
}

#[derive(Error, Debug)]
pub enum GitError {
    #[error("git status failed: {0}")]
    StatusFailed(String),

    #[error("git commit failed: {0}")]
    CommitFailed(String),

    #[error("git push failed: {0}")]
    PushFailed(String),

    #[error("git revert (checkout) failed: {0}")]
    RevertFailed(String),
}

impl GitError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::StatusFailed(_) => ErrorCode::GitStatusFailed,
            Self::CommitFailed(_) => ErrorCode::GitCommitFailed,
            Self::PushFailed(_) => ErrorCode::GitPushFailed,
            Self::RevertFailed(_) => ErrorCode::GitRevertFailed,
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("configuration missing: {0}")]
    Missing(String),

    #[error("failed to parse configuration at {path}: {message}")]
    ParseError { path: PathBuf, message: String },

    #[error("required environment variable missing: {0}")]
    EnvVarMissing(String),
}

#[derive(Error, Debug)]
pub enum TaskError {
    #[error("task file not found: {0}")]
    NotFound(PathBuf),

    #[error("task file malformed: {0}")]
    Malformed(String),

    #[error("failed to move task file from {from} to {to}: {message}")]
    MoveFailed {
        from: PathBuf,
        to: PathBuf,
        message: String,
    },
}

pub type Result<T> = std::result::Result<T, AidfError>;
