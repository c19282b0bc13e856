//! `ToolHandler` — serves the six built-in tool calls API providers expose
//! to the model: `read_file`, `write_file`, `list_files`,
//! `run_command`, `task_complete`, `task_blocked`.
//!
//! Command pattern matching is grounded on the teacher's
//! `safety::checker::DANGEROUS_COMMAND_PATTERNS` (a static `Vec<(Regex,
//! &str)>` built with `once_cell::Lazy`); file tools are grounded on
//! `tools::file::{FileRead, FileWrite}` and `tools::search` for listing.

use crate::scope::{Decision, ScopeGuard};
use crate::task::TaskScope;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};

/// Result of a tool call: always returns, success or error, as the model
/// needs the failure message to self-correct on the next turn.
#[derive(Debug, Clone)]
pub struct ToolResult {
    pub is_error: bool,
    pub content: String,
}

impl ToolResult {
    fn ok(content: impl Into<String>) -> Self {
        Self { is_error: false, content: content.into() }
    }
    fn err(content: impl Into<String>) -> Self {
        Self { is_error: true, content: content.into() }
    }
}

/// Signal extracted from `task_complete`/`task_blocked` tool calls.
#[derive(Debug, Clone)]
pub enum TaskSignal {
    Complete { summary: String },
    Blocked { reason: String, attempted: Option<String>, suggestion: Option<String> },
}

static DANGEROUS_COMMAND_PATTERNS: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    vec![
        (Regex::new(r"rm\s+(-[a-zA-Z]+\s+)*(/+|\*|/\*)\s*$").unwrap(), "rm -rf / (delete root filesystem)"),
        (Regex::new(r"\bsudo\b").unwrap(), "sudo without explicit allowance"),
        (Regex::new(r"(curl|wget)\s+[^|]*\|\s*(sh|bash|zsh|ksh|dash)").unwrap(), "pipe remote content to shell"),
        (Regex::new(r"chmod\s+(-[a-zA-Z]+\s+)*777\s+/+").unwrap(), "chmod 777 / (remove all file permissions)"),
        (Regex::new(r">\s*/dev/(sd|hd|nvme|vd|xvd)").unwrap(), "raw write to block device"),
    ]
});

/// Two-layer command policy.
pub struct CommandPolicy {
    pub allowed: Vec<String>,
    pub blocked: Vec<String>,
    pub strict: bool,
}

impl CommandPolicy {
    /// Returns `Some(reason)` if the command should be blocked.
    pub fn check(&self, command: &str) -> Option<String> {
        for (pattern, description) in DANGEROUS_COMMAND_PATTERNS.iter() {
            if pattern.is_match(command) {
                return Some(format!("blocked by default policy: {}", description));
            }
        }

        let leading_token = command.split_whitespace().next().unwrap_or("");
        for pattern in &self.blocked {
            if command.contains(pattern.as_str()) || leading_token == pattern {
                return Some(format!("blocked by user policy: matches '{}'", pattern));
            }
        }

        if self.strict && !self.allowed.is_empty() {
            let allowed = self
                .allowed
                .iter()
                .any(|pattern| command.contains(pattern.as_str()) || leading_token == pattern);
            if !allowed {
                return Some("not in allowlist (commands.strict=true)".to_string());
            }
        }

        None
    }
}

/// Serves `read_file`/`write_file`/`list_files`/`run_command` with
/// preventive scope enforcement on writes.
pub struct ToolHandler {
    working_dir: PathBuf,
    scope_guard: ScopeGuard,
    command_policy: CommandPolicy,
}

impl ToolHandler {
    pub fn new(working_dir: PathBuf, scope: TaskScope, mode: crate::scope::EnforcementMode, command_policy: CommandPolicy) -> Self {
        Self {
            working_dir,
            scope_guard: ScopeGuard::new(scope, mode),
            command_policy,
        }
    }

    pub fn approve(&mut self, path: &str) {
        self.scope_guard.approve(path);
    }

    fn resolve(&self, path: &str) -> PathBuf {
        let p = Path::new(path);
        if p.is_absolute() {
            p.to_path_buf()
        } else {
            self.working_dir.join(p)
        }
    }

    fn relative(&self, path: &str) -> String {
        self.resolve(path)
            .strip_prefix(&self.working_dir)
            .map(|p| p.to_string_lossy().to_string())
            .unwrap_or_else(|_| path.to_string())
    }

    /// Dispatch a named tool call. Returns `Ok(ToolResult)` for the five
    /// file/command tools, or `Err(TaskSignal)` when the call is
    /// `task_complete`/`task_blocked`.
    pub async fn dispatch(&mut self, tool_name: &str, args: &Value) -> Result<ToolResult, TaskSignal> {
        match tool_name {
            "read_file" => Ok(self.read_file(args)),
            "write_file" => Ok(self.write_file(args)),
            "list_files" => Ok(self.list_files(args)),
            "run_command" => Ok(self.run_command(args).await),
            "task_complete" => Err(self.task_complete(args)),
            "task_blocked" => Err(self.task_blocked(args)),
            other => Ok(ToolResult::err(format!("unknown tool: {}", other))),
        }
    }

    fn read_file(&self, args: &Value) -> ToolResult {
        #[derive(Deserialize)]
        struct Args {
            path: String,
        }
        let args: Args = match serde_json::from_value(args.clone()) {
            Ok(a) => a,
            Err(e) => return ToolResult::err(format!("invalid arguments: {}", e)),
        };

        match std::fs::read_to_string(self.resolve(&args.path)) {
            Ok(content) => ToolResult::ok(content),
            Err(e) => ToolResult::err(format!("failed to read {}: {}", args.path, e)),
        }
    }

    fn write_file(&self, args: &Value) -> ToolResult {
        #[derive(Deserialize)]
        struct Args {
            path: String,
            content: String,
        }
        let args: Args = match serde_json::from_value(args.clone()) {
            Ok(a) => a,
            Err(e) => return ToolResult::err(format!("invalid arguments: {}", e)),
        };

        let relative = self.relative(&args.path);
        let (decision, _) = self.scope_guard.decide(&relative);
        if decision != Decision::Allow {
            return ToolResult::err(format!(
                "write blocked by task scope (decision={:?}). allowed={:?} forbidden={:?}",
                decision, self.scope_guard_allowed(), self.scope_guard_forbidden(),
            ));
        }

        let resolved = self.resolve(&args.path);
        if let Some(parent) = resolved.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                return ToolResult::err(format!("failed to create parent directories: {}", e));
            }
        }

        match std::fs::write(&resolved, &args.content) {
            Ok(()) => ToolResult::ok(format!("File written: {}", args.path)),
            Err(e) => ToolResult::err(format!("failed to write {}: {}", args.path, e)),
        }
    }

    fn list_files(&self, args: &Value) -> ToolResult {
        #[derive(Deserialize)]
        struct Args {
            path: String,
            pattern: Option<String>,
        }
        let args: Args = match serde_json::from_value(args.clone()) {
            Ok(a) => a,
            Err(e) => return ToolResult::err(format!("invalid arguments: {}", e)),
        };

        let root = self.resolve(&args.path);
        let mut entries = Vec::new();
        for entry in walkdir::WalkDir::new(&root).into_iter().filter_map(|e| e.ok()) {
            let path = entry.path();
            if let Some(pattern) = &args.pattern {
                if let Ok(glob_pattern) = glob::Pattern::new(pattern) {
                    if !glob_pattern.matches(&path.to_string_lossy()) {
                        continue;
                    }
                }
            }
            entries.push(path.to_string_lossy().to_string());
        }

        ToolResult::ok(entries.join("\n"))
    }

    async fn run_command(&self, args: &Value) -> ToolResult {
        #[derive(Deserialize)]
        struct Args {
            command: String,
        }
        let args: Args = match serde_json::from_value(args.clone()) {
            Ok(a) => a,
            Err(e) => return ToolResult::err(format!("invalid arguments: {}", e)),
        };

        if let Some(reason) = self.command_policy.check(&args.command) {
            return ToolResult::err(format!("command blocked: {}", reason));
        }

        let (shell, flag) = crate::tools::shell::default_shell();
        let mut cmd = tokio::process::Command::new(shell);
        cmd.kill_on_drop(true);
        cmd.arg(flag).arg(&args.command);
        cmd.current_dir(&self.working_dir);

        match cmd.output().await {
            Ok(output) => {
                let stdout = String::from_utf8_lossy(&output.stdout);
                let stderr = String::from_utf8_lossy(&output.stderr);
                let exit_code = output.status.code().unwrap_or(-1);
                ToolResult::ok(format!("Exit code: {}\n{}{}", exit_code, stdout, stderr))
            }
            Err(e) => ToolResult::err(format!("failed to spawn command: {}", e)),
        }
    }

    fn task_complete(&self, args: &Value) -> TaskSignal {
        #[derive(Deserialize, Default)]
        struct Args {
            #[serde(default)]
            summary: String,
        }
        let args: Args = serde_json::from_value(args.clone()).unwrap_or_default();
        TaskSignal::Complete { summary: args.summary }
    }

    fn task_blocked(&self, args: &Value) -> TaskSignal {
        #[derive(Deserialize, Default)]
        struct Args {
            #[serde(default)]
            reason: String,
            attempted: Option<String>,
            suggestion: Option<String>,
        }
        let args: Args = serde_json::from_value(args.clone()).unwrap_or_default();
        TaskSignal::Blocked { reason: args.reason, attempted: args.attempted, suggestion: args.suggestion }
    }

    fn scope_guard_allowed(&self) -> &[String] {
        &self.scope_guard.scope().allowed
    }
    fn scope_guard_forbidden(&self) -> &[String] {
        &self.scope_guard.scope().forbidden
    }
}

/// Built-in tool schemas advertised to API providers.
pub fn tool_schemas() -> Vec<Value> {
    vec![
        json!({
            "name": "read_file",
            "description": "Read the contents of a file.",
            "input_schema": {"type": "object", "properties": {"path": {"type": "string"}}, "required": ["path"]}
        }),
        json!({
            "name": "write_file",
            "description": "Write or overwrite a file's contents.",
            "input_schema": {"type": "object", "properties": {"path": {"type": "string"}, "content": {"type": "string"}}, "required": ["path", "content"]}
        }),
        json!({
            "name": "list_files",
            "description": "List files under a directory, optionally filtered by glob pattern.",
            "input_schema": {"type": "object", "properties": {"path": {"type": "string"}, "pattern": {"type": "string"}}, "required": ["path"]}
        }),
        json!({
            "name": "run_command",
            "description": "Run a shell command and return its output.",
            "input_schema": {"type": "object", "properties": {"command": {"type": "string"}}, "required": ["command"]}
        }),
        json!({
            "name": "task_complete",
            "description": "Signal that the task is complete.",
            "input_schema": {"type": "object", "properties": {"summary": {"type": "string"}}, "required": ["summary"]}
        }),
        json!({
            "name": "task_blocked",
            "description": "Signal that the task is blocked and cannot proceed.",
            "input_schema": {"type": "object", "properties": {"reason": {"type": "string"}, "attempted": {"type": "string"}, "suggestion": {"type": "string"}}, "required": ["reason"]}
        }),
    ]
}
