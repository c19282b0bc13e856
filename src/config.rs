//! Configuration shape consumed by the core.
//!
//! Parsing YAML/JSON, `${VAR}`/`$VAR` environment substitution, and default
//! file discovery are explicit non-goals and live outside this
//! crate; `Config` here is the already-parsed struct every other component
//! depends on, mirroring the teacher's `config::Config` shape and
//! `#[serde(default = "...")]` idiom.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum ProviderType {
    ClaudeCli,
    CursorCli,
    AnthropicApi,
    OpenaiApi,
}

impl std::fmt::Display for ProviderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::ClaudeCli => "claude-cli",
            Self::CursorCli => "cursor-cli",
            Self::AnthropicApi => "anthropic-api",
            Self::OpenaiApi => "openai-api",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(rename = "type")]
    pub provider_type: ProviderType,
    #[serde(default = "default_model")]
    pub model: String,
    pub api_key: Option<String>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            provider_type: ProviderType::ClaudeCli,
            model: default_model(),
            api_key: None,
        }
    }
}

fn default_model() -> String {
    "default".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationHistoryConfig {
    #[serde(default = "default_max_messages")]
    pub max_messages: usize,
    #[serde(default = "default_preserve_head")]
    pub preserve_head: usize,
    #[serde(default = "default_preserve_tail")]
    pub preserve_tail: usize,
    #[serde(default)]
    pub summarize_on_trim: bool,
    #[serde(default = "default_summarizer_max_tokens")]
    pub summarizer_max_tokens: usize,
    #[serde(default = "default_summarize_every_n")]
    pub summarize_every_n: usize,
}

impl Default for ConversationHistoryConfig {
    fn default() -> Self {
        Self {
            max_messages: default_max_messages(),
            preserve_head: default_preserve_head(),
            preserve_tail: default_preserve_tail(),
            summarize_on_trim: false,
            summarizer_max_tokens: default_summarizer_max_tokens(),
            summarize_every_n: default_summarize_every_n(),
        }
    }
}

fn default_max_messages() -> usize {
    100
}
fn default_preserve_head() -> usize {
    5
}
fn default_preserve_tail() -> usize {
    20
}
fn default_summarizer_max_tokens() -> usize {
    1024
}
fn default_summarize_every_n() -> usize {
    10
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
    #[serde(default = "default_max_consecutive_failures")]
    pub max_consecutive_failures: usize,
    #[serde(default = "default_timeout_per_iteration")]
    pub timeout_per_iteration: u64,
    #[serde(default)]
    pub conversation: ConversationHistoryConfig,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            max_consecutive_failures: default_max_consecutive_failures(),
            timeout_per_iteration: default_timeout_per_iteration(),
            conversation: ConversationHistoryConfig::default(),
        }
    }
}

fn default_max_iterations() -> usize {
    50
}
fn default_max_consecutive_failures() -> usize {
    3
}
fn default_timeout_per_iteration() -> u64 {
    300
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ScopeEnforcement {
    Strict,
    #[default]
    Ask,
    Permissive,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PermissionsConfig {
    #[serde(default)]
    pub scope_enforcement: ScopeEnforcement,
    #[serde(default = "default_true")]
    pub auto_commit: bool,
    #[serde(default)]
    pub auto_push: bool,
    #[serde(default)]
    pub auto_pr: bool,
}

impl Default for PermissionsConfig {
    fn default() -> Self {
        Self {
            scope_enforcement: ScopeEnforcement::default(),
            auto_commit: true,
            auto_push: false,
            auto_pr: false,
        }
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationConfig {
    #[serde(default)]
    pub pre_commit: Vec<String>,
    #[serde(default)]
    pub pre_push: Vec<String>,
    #[serde(default)]
    pub pre_pr: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandsConfig {
    #[serde(default)]
    pub allowed: Vec<String>,
    #[serde(default)]
    pub blocked: Vec<String>,
    #[serde(default)]
    pub strict: bool,
}

impl Default for CommandsConfig {
    fn default() -> Self {
        Self {
            allowed: Vec::new(),
            blocked: Vec::new(),
            strict: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    #[serde(default)]
    pub skip_permissions: bool,
    #[serde(default = "default_true")]
    pub warn_on_skip: bool,
    #[serde(default)]
    pub commands: CommandsConfig,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            skip_permissions: false,
            warn_on_skip: true,
            commands: CommandsConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitConfig {
    #[serde(default = "default_commit_prefix")]
    pub commit_prefix: String,
    #[serde(default = "default_branch_prefix")]
    pub branch_prefix: String,
}

impl Default for GitConfig {
    fn default() -> Self {
        Self {
            commit_prefix: default_commit_prefix(),
            branch_prefix: default_branch_prefix(),
        }
    }
}

fn default_commit_prefix() -> String {
    "[aidf] ".to_string()
}
fn default_branch_prefix() -> String {
    "aidf/".to_string()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SkillsConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub directories: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default)]
    pub execution: ExecutionConfig,
    #[serde(default)]
    pub permissions: PermissionsConfig,
    #[serde(default)]
    pub validation: ValidationConfig,
    #[serde(default)]
    pub security: SecurityConfig,
    #[serde(default)]
    pub git: GitConfig,
    #[serde(default)]
    pub skills: SkillsConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            provider: ProviderConfig::default(),
            execution: ExecutionConfig::default(),
            permissions: PermissionsConfig::default(),
            validation: ValidationConfig::default(),
            security: SecurityConfig::default(),
            git: GitConfig::default(),
            skills: SkillsConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults_match_spec() {
        let config = Config::default();
        assert_eq!(config.execution.max_iterations, 50);
        assert_eq!(config.execution.max_consecutive_failures, 3);
        assert_eq!(config.execution.conversation.max_messages, 100);
        assert_eq!(config.execution.conversation.preserve_head, 5);
        assert_eq!(config.execution.conversation.preserve_tail, 20);
        assert!(!config.execution.conversation.summarize_on_trim);
        assert_eq!(config.permissions.scope_enforcement, ScopeEnforcement::Ask);
        assert!(config.permissions.auto_commit);
        assert!(!config.permissions.auto_push);
    }

    #[test]
    fn deserializes_partial_yaml_like_json() {
        let json = r#"{
            "provider": { "type": "anthropic-api", "model": "claude-x" },
            "execution": { "max_iterations": 10 }
        }"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.provider.provider_type, ProviderType::AnthropicApi);
        assert_eq!(config.provider.model, "claude-x");
        assert_eq!(config.execution.max_iterations, 10);
        // Untouched sections fall back to defaults.
        assert_eq!(config.execution.max_consecutive_failures, 3);
    }

    #[test]
    fn provider_type_display() {
        assert_eq!(ProviderType::ClaudeCli.to_string(), "claude-cli");
        assert_eq!(ProviderType::AnthropicApi.to_string(), "anthropic-api");
    }

    #[test]
    fn config_roundtrips_through_json() {
        let config = Config::default();
        let json = serde_json::to_string(&config).unwrap();
        let parsed: Config = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.execution.max_iterations, config.execution.max_iterations);
        assert_eq!(parsed.git.commit_prefix, config.git.commit_prefix);
    }
}
