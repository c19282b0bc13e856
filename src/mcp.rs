//! Model Context Protocol adapter.
//!
//! This is deliberately a read-only facade, not a general tool-execution
//! server: an MCP client can ask an [`McpServer`] about the task currently
//! being run (goal, scope, Definition of Done, blocked status) but cannot
//! use it to mutate files or run commands — that capability stays behind
//! [`crate::provider::tool_handler::ToolHandler`], reachable only from
//! inside an [`crate::executor::Executor`] run.
//!
//! The tool-schema shapes (`ToolParameter`, `ToolSchema`, `ToolRequest`,
//! `ToolResponse`) are carried over from the teacher's original MCP
//! implementation; the tool *registry* and `execute` dispatch are narrowed
//! to the handful of read-only task-introspection tools this adapter
//! actually serves.

use crate::context::LoadedContext;
use crate::executor::ExecutorStatus;
use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};
use std::collections::HashMap;
use std::sync::RwLock;

/// MCP protocol version this adapter speaks.
pub const MCP_VERSION: &str = "0.1.0";

/// Tool parameter type (JSON Schema primitive).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    #[default]
    String,
    Boolean,
}

/// A single parameter in a [`ToolSchema`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolParameter {
    pub name: String,
    #[serde(rename = "type")]
    pub param_type: ParamType,
    pub description: String,
    #[serde(default)]
    pub required: bool,
}

impl ToolParameter {
    pub fn optional_bool(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            param_type: ParamType::Boolean,
            description: description.into(),
            required: false,
        }
    }
}

/// Declares one callable tool: name, description, and its parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub parameters: Vec<ToolParameter>,
}

impl ToolSchema {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self { name: name.into(), description: description.into(), parameters: Vec::new() }
    }

    pub fn with_param(mut self, param: ToolParameter) -> Self {
        self.parameters.push(param);
        self
    }
}

/// A tool invocation request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolRequest {
    pub id: String,
    pub tool: String,
    #[serde(default)]
    pub arguments: HashMap<String, JsonValue>,
}

impl ToolRequest {
    pub fn new(tool: impl Into<String>) -> Self {
        Self { id: uuid::Uuid::new_v4().to_string(), tool: tool.into(), arguments: HashMap::new() }
    }

    pub fn with_bool(mut self, name: impl Into<String>, value: bool) -> Self {
        self.arguments.insert(name.into(), JsonValue::Bool(value));
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
    #[default]
    Success,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResponse {
    pub id: String,
    pub status: ResponseStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<JsonValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolResponse {
    pub fn success(id: impl Into<String>, result: JsonValue) -> Self {
        Self { id: id.into(), status: ResponseStatus::Success, result: Some(result), error: None }
    }

    pub fn error(id: impl Into<String>, message: impl Into<String>) -> Self {
        Self { id: id.into(), status: ResponseStatus::Error, result: None, error: Some(message.into()) }
    }
}

/// Tool names this adapter serves.
const TOOL_GET_TASK: &str = "get_task";
const TOOL_GET_SCOPE: &str = "get_scope";
const TOOL_GET_DEFINITION_OF_DONE: &str = "get_definition_of_done";
const TOOL_GET_STATUS: &str = "get_status";

/// Snapshot of run state an [`McpServer`] reports alongside task data.
#[derive(Debug, Clone, Default)]
pub struct RunSnapshot {
    pub status: Option<ExecutorStatus>,
    pub iteration: usize,
}

/// A thin, read-only MCP server over one task's [`LoadedContext`].
///
/// Built once PreFlight has loaded a task and updated as the executor
/// advances, so an external client (an IDE extension, a dashboard) can poll
/// `get_status` without reading the task file off disk itself.
pub struct McpServer {
    context: RwLock<Option<LoadedContext>>,
    run: RwLock<RunSnapshot>,
}

impl McpServer {
    pub fn new() -> Self {
        Self { context: RwLock::new(None), run: RwLock::new(RunSnapshot::default()) }
    }

    pub fn with_context(context: LoadedContext) -> Self {
        let server = Self::new();
        server.set_context(context);
        server
    }

    pub fn set_context(&self, context: LoadedContext) {
        *self.context.write().expect("mcp context lock poisoned") = Some(context);
    }

    pub fn update_run(&self, status: ExecutorStatus, iteration: usize) {
        *self.run.write().expect("mcp run lock poisoned") = RunSnapshot { status: Some(status), iteration };
    }

    /// Schemas for every tool this server exposes.
    pub fn list_tools(&self) -> Vec<ToolSchema> {
        vec![
            ToolSchema::new(TOOL_GET_TASK, "Return the goal, type, and requirements of the task currently loaded"),
            ToolSchema::new(TOOL_GET_SCOPE, "Return the task's allowed/forbidden/askBefore scope patterns"),
            ToolSchema::new(
                TOOL_GET_DEFINITION_OF_DONE,
                "Return the task's Definition of Done checklist and each item's checked state",
            ),
            ToolSchema::new(TOOL_GET_STATUS, "Return the current run status and iteration count")
                .with_param(ToolParameter::optional_bool(
                    "include_blocked_reason",
                    "Include the blocking reason if the task is currently blocked",
                )),
        ]
    }

    /// Dispatches one request against the loaded task.
    pub fn execute(&self, request: ToolRequest) -> ToolResponse {
        let context = self.context.read().expect("mcp context lock poisoned");
        let Some(context) = context.as_ref() else {
            return ToolResponse::error(request.id, "no task is currently loaded");
        };

        match request.tool.as_str() {
            TOOL_GET_TASK => ToolResponse::success(
                request.id,
                json!({
                    "goal": context.task.goal,
                    "task_type": context.task.task_type,
                    "requirements": context.task.requirements,
                    "notes": context.task.notes,
                    "suggested_roles": context.task.suggested_roles,
                }),
            ),
            TOOL_GET_SCOPE => ToolResponse::success(
                request.id,
                json!({
                    "allowed": context.task.scope.allowed,
                    "forbidden": context.task.scope.forbidden,
                    "ask_before": context.task.scope.ask_before,
                }),
            ),
            TOOL_GET_DEFINITION_OF_DONE => ToolResponse::success(
                request.id,
                json!(context
                    .task
                    .definition_of_done
                    .iter()
                    .map(|item| json!({"text": item.text, "checked": item.checked}))
                    .collect::<Vec<_>>()),
            ),
            TOOL_GET_STATUS => {
                let run = self.run.read().expect("mcp run lock poisoned");
                let include_blocked_reason = request
                    .arguments
                    .get("include_blocked_reason")
                    .and_then(JsonValue::as_bool)
                    .unwrap_or(false);
                let mut payload = json!({
                    "status": run.status.map(|s| format!("{:?}", s)),
                    "iteration": run.iteration,
                });
                if include_blocked_reason {
                    if let Some(blocked) = &context.task.blocked_status {
                        payload["blocking_issue"] = json!(blocked.blocking_issue);
                    }
                }
                ToolResponse::success(request.id, payload)
            }
            other => ToolResponse::error(request.id, format!("unknown tool: {other}")),
        }
    }
}

impl Default for McpServer {
    fn default() -> Self {
        Self::new()
    }
}
