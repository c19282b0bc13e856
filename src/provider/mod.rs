//! `Provider` — the uniform contract over subprocess-spawning CLI providers
//! and tool-using API providers.

pub mod api;
pub mod subprocess;
pub mod tool_handler;

use crate::config::{ProviderConfig, ProviderType};
use crate::conversation::Message;
use crate::errors::{ErrorCategory, ErrorCode};
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;

/// Sentinels the model emits in streamed text to signal completion or a
/// block.
pub const COMPLETE_SENTINELS: &[&str] = &["<TASK_COMPLETE>", "<DONE>"];
pub const BLOCK_SENTINEL_PREFIX: &str = "<TASK_BLOCKED:";

/// Scan streamed text for the completion/block sentinels. They may appear
/// anywhere in the text, not just at the end.
pub fn scan_sentinels(text: &str) -> (bool, Option<String>) {
    let complete = COMPLETE_SENTINELS.iter().any(|s| text.contains(s));

    let blocked = text.find(BLOCK_SENTINEL_PREFIX).map(|idx| {
        let rest = &text[idx + BLOCK_SENTINEL_PREFIX.len()..];
        let reason = rest.split('>').next().unwrap_or("").trim();
        reason.to_string()
    });

    (complete, blocked)
}

/// Cooperative cancellation signal shared by the Executor and a Provider call.
pub type CancelSignal = watch::Receiver<bool>;

/// Resolves once `cancel` flips to `true`. Never resolves otherwise (a
/// closed channel without ever signalling cancellation means "never
/// cancelled", not "cancel now"), so callers race it against real work in a
/// `tokio::select!` rather than awaiting it on its own.
pub async fn wait_for_cancel(mut cancel: CancelSignal) {
    if *cancel.borrow() {
        return;
    }
    while cancel.changed().await.is_ok() {
        if *cancel.borrow() {
            return;
        }
    }
    std::future::pending::<()>().await;
}

/// Per-call options passed to `Provider::execute`.
pub struct ExecuteOptions<'a> {
    pub working_dir: PathBuf,
    pub model: String,
    pub max_tokens: Option<u32>,
    pub timeout: std::time::Duration,
    pub cancel: CancelSignal,
    pub api_key: Option<String>,
    pub conversation_state: Option<Vec<Message>>,
    pub conversation_config: crate::config::ConversationHistoryConfig,
    pub scope: &'a crate::task::TaskScope,
    /// The configured scope-enforcement mode, so a provider that does its own
    /// preventive tool-call checking (the API providers' `ToolHandler`) can
    /// honor strict/ask/permissive instead of hardcoding one mode.
    pub scope_mode: crate::scope::EnforcementMode,
    pub on_output: Option<Arc<dyn Fn(&str) + Send + Sync>>,
}

/// Outcome of a single `Provider::execute` call.
#[derive(Debug, Clone, Default)]
pub struct ExecutionResult {
    pub success: bool,
    pub output: String,
    pub files_changed: Vec<String>,
    pub iteration_complete: bool,
    pub blocked: Option<String>,
    pub error: Option<String>,
    pub error_category: Option<ErrorCategory>,
    pub error_code: Option<ErrorCode>,
    pub conversation_state: Option<Vec<Message>>,
}

impl ExecutionResult {
    pub fn failure(message: impl Into<String>, code: ErrorCode) -> Self {
        Self {
            success: false,
            error: Some(message.into()),
            error_category: Some(code.category()),
            error_code: Some(code),
            ..Default::default()
        }
    }
}

/// Exactly three operations.
#[async_trait]
pub trait Provider: Send + Sync {
    fn name(&self) -> &str;
    async fn is_available(&self) -> bool;
    async fn execute(&self, prompt: &str, options: ExecuteOptions<'_>) -> ExecutionResult;
}

/// Constructs the configured `Provider` — the seam tests use to inject a
/// `MockProvider`.
pub struct ProviderFactory;

impl ProviderFactory {
    pub fn create(config: &ProviderConfig, git_ops: Arc<dyn crate::git_ops::GitOps>) -> Arc<dyn Provider> {
        match config.provider_type {
            ProviderType::ClaudeCli => {
                Arc::new(subprocess::SubprocessProvider::new("claude-cli", "claude", git_ops))
            }
            ProviderType::CursorCli => {
                Arc::new(subprocess::SubprocessProvider::new("cursor-cli", "cursor-agent", git_ops))
            }
            ProviderType::AnthropicApi => Arc::new(api::ApiProvider::anthropic(config.model.clone())),
            ProviderType::OpenaiApi => Arc::new(api::ApiProvider::openai(config.model.clone())),
        }
    }
}
