//! Tool-using API providers (`anthropic-api`, `openai-api`) — run an inner
//! loop against an HTTP API, dispatching tool calls through the
//! [`ToolHandler`] and trimming history via the [`ConversationWindow`]
//!.
//!
//! Request shape and non-streaming `chat()` call grounded on the teacher's
//! `api::mod::LlmClient::chat` (JSON body with `model`/`messages`/`tools`,
//! `reqwest::Client` POST, HTTP-status-to-`ApiError` mapping). The two
//! providers differ only in endpoint/wire format, mapped in
//! `Self::request_body`/`Self::parse_response`; the inner tool-use loop is
//! shared.

use super::tool_handler::{tool_schemas, TaskSignal, ToolHandler};
use super::{wait_for_cancel, ExecuteOptions, ExecutionResult, Provider};
use crate::conversation::{ConversationWindow, Message as ConvMessage, ToolCall as ConvToolCall};
use crate::errors::ErrorCode;
use crate::provider::tool_handler::CommandPolicy;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;

const MAX_TOOL_USE_ROUNDS: usize = 50;

#[derive(Clone, Copy, PartialEq, Eq)]
enum ApiKind {
    Anthropic,
    OpenAi,
}

pub struct ApiProvider {
    kind: ApiKind,
    model: String,
    client: Client,
}

impl ApiProvider {
    pub fn anthropic(model: String) -> Self {
        Self { kind: ApiKind::Anthropic, model, client: Client::new() }
    }

    pub fn openai(model: String) -> Self {
        Self { kind: ApiKind::OpenAi, model, client: Client::new() }
    }

    fn endpoint(&self) -> &'static str {
        match self.kind {
            ApiKind::Anthropic => "https://api.anthropic.com/v1/messages",
            ApiKind::OpenAi => "https://api.openai.com/v1/chat/completions",
        }
    }

    fn request_body(&self, messages: &[ConvMessage], api_key_present: bool) -> Value {
        let _ = api_key_present;
        match self.kind {
            ApiKind::Anthropic => json!({
                "model": self.model,
                "max_tokens": 4096,
                "messages": messages.iter().map(to_anthropic_message).collect::<Vec<_>>(),
                "tools": tool_schemas(),
            }),
            ApiKind::OpenAi => json!({
                "model": self.model,
                "messages": messages.iter().map(to_openai_message).collect::<Vec<_>>(),
                "tools": tool_schemas(),
            }),
        }
    }

    async fn call_api(&self, api_key: &str, body: &Value) -> Result<(String, Vec<ConvToolCall>), ExecutionResult> {
        let response = self
            .client
            .post(self.endpoint())
            .header("Authorization", format!("Bearer {}", api_key))
            .json(body)
            .send()
            .await
            .map_err(|e| ExecutionResult::failure(format!("request failed: {}", e), ErrorCode::ProviderApiError))?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(ExecutionResult::failure("rate limited", ErrorCode::ProviderRateLimit));
        }
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(ExecutionResult::failure(format!("auth error: {}", status), ErrorCode::PermissionAuth));
        }
        if !status.is_success() {
            return Err(ExecutionResult::failure(format!("API returned {}", status), ErrorCode::ProviderApiError));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| ExecutionResult::failure(format!("invalid JSON response: {}", e), ErrorCode::ProviderCrash))?;

        parse_response(self.kind, &body)
    }
}

fn to_anthropic_message(m: &ConvMessage) -> Value {
    json!({"role": m.role, "content": m.content})
}

fn to_openai_message(m: &ConvMessage) -> Value {
    json!({"role": m.role, "content": m.content})
}

fn parse_response(kind: ApiKind, body: &Value) -> Result<(String, Vec<ConvToolCall>), ExecutionResult> {
    match kind {
        ApiKind::Anthropic => {
            let content = body["content"].as_array().cloned().unwrap_or_default();
            let mut text = String::new();
            let mut tool_calls = Vec::new();
            for block in content {
                match block["type"].as_str() {
                    Some("text") => text.push_str(block["text"].as_str().unwrap_or("")),
                    Some("tool_use") => tool_calls.push(ConvToolCall {
                        id: block["id"].as_str().unwrap_or_default().to_string(),
                        name: block["name"].as_str().unwrap_or_default().to_string(),
                        arguments: block["input"].to_string(),
                    }),
                    _ => {}
                }
            }
            Ok((text, tool_calls))
        }
        ApiKind::OpenAi => {
            let message = &body["choices"][0]["message"];
            let text = message["content"].as_str().unwrap_or_default().to_string();
            let tool_calls = message["tool_calls"]
                .as_array()
                .cloned()
                .unwrap_or_default()
                .into_iter()
                .map(|call| ConvToolCall {
                    id: call["id"].as_str().unwrap_or_default().to_string(),
                    name: call["function"]["name"].as_str().unwrap_or_default().to_string(),
                    arguments: call["function"]["arguments"].as_str().unwrap_or_default().to_string(),
                })
                .collect();
            Ok((text, tool_calls))
        }
    }
}

#[async_trait]
impl Provider for ApiProvider {
    fn name(&self) -> &str {
        match self.kind {
            ApiKind::Anthropic => "anthropic-api",
            ApiKind::OpenAi => "openai-api",
        }
    }

    async fn is_available(&self) -> bool {
        true
    }

    async fn execute(&self, prompt: &str, options: ExecuteOptions<'_>) -> ExecutionResult {
        let Some(api_key) = options.api_key.clone() else {
            return ExecutionResult::failure("no API key configured", ErrorCode::ConfigMissing);
        };

        let mut messages = options.conversation_state.clone().unwrap_or_default();
        messages.push(ConvMessage::user(prompt));

        let window = ConversationWindow::new(
            options.conversation_config.max_messages,
            options.conversation_config.preserve_head,
            options.conversation_config.preserve_tail,
        );

        let command_policy = CommandPolicy { allowed: vec![], blocked: vec![], strict: false };
        let tool_handler = ToolHandler::new(
            options.working_dir.clone(),
            options.scope.clone(),
            options.scope_mode,
            command_policy,
        );

        let timeout = options.timeout;
        let cancel = options.cancel.clone();
        let on_output = options.on_output.clone();

        match tokio::time::timeout(
            timeout,
            self.run_tool_use_loop(api_key, messages, window, tool_handler, on_output, cancel),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => ExecutionResult::failure(
                format!("iteration exceeded {}s", timeout.as_secs()),
                ErrorCode::IterationTimeout,
            ),
        }
    }
}

impl ApiProvider {
    /// The inner tool-use loop, bounded by `MAX_TOOL_USE_ROUNDS` and raced
    /// against cancellation each round; the overall per-iteration deadline
    /// is enforced by the caller wrapping this in `tokio::time::timeout`.
    async fn run_tool_use_loop(
        &self,
        api_key: String,
        mut messages: Vec<ConvMessage>,
        mut window: ConversationWindow,
        mut tool_handler: ToolHandler,
        on_output: Option<std::sync::Arc<dyn Fn(&str) + Send + Sync>>,
        cancel: super::CancelSignal,
    ) -> ExecutionResult {
        let mut combined_output = String::new();
        let mut files_changed = Vec::new();

        for _ in 0..MAX_TOOL_USE_ROUNDS {
            window.trim(&mut messages, None).await;

            let body = self.request_body(&messages, true);
            let (text, tool_calls) = tokio::select! {
                biased;
                _ = wait_for_cancel(cancel.clone()) => {
                    return ExecutionResult::failure("iteration cancelled", ErrorCode::OperationTimeout);
                }
                result = self.call_api(&api_key, &body) => match result {
                    Ok(result) => result,
                    Err(failure) => return failure,
                },
            };

            if let Some(callback) = &on_output {
                callback(&text);
            }
            combined_output.push_str(&text);

            if tool_calls.is_empty() {
                let (iteration_complete, blocked) = super::scan_sentinels(&text);
                messages.push(ConvMessage::assistant(text));
                return ExecutionResult {
                    success: true,
                    output: combined_output,
                    files_changed,
                    iteration_complete,
                    blocked,
                    error: None,
                    error_category: None,
                    error_code: None,
                    conversation_state: Some(messages),
                };
            }

            messages.push(ConvMessage::assistant(text));

            for call in &tool_calls {
                let args: Value = serde_json::from_str(&call.arguments).unwrap_or(json!({}));
                match tool_handler.dispatch(&call.name, &args).await {
                    Ok(result) => {
                        if call.name == "write_file" {
                            if let Some(path) = args.get("path").and_then(|p| p.as_str()) {
                                files_changed.push(path.to_string());
                            }
                        }
                        let mut msg = ConvMessage::user(result.content);
                        msg.tool_call_id = Some(call.id.clone());
                        messages.push(msg);
                    }
                    Err(TaskSignal::Complete { summary }) => {
                        let mut msg = ConvMessage::user(format!("task_complete: {}", summary));
                        msg.tool_call_id = Some(call.id.clone());
                        messages.push(msg);
                        return ExecutionResult {
                            success: true,
                            output: combined_output,
                            files_changed,
                            iteration_complete: true,
                            blocked: None,
                            error: None,
                            error_category: None,
                            error_code: None,
                            conversation_state: Some(messages),
                        };
                    }
                    Err(TaskSignal::Blocked { reason, .. }) => {
                        let mut msg = ConvMessage::user(format!("task_blocked: {}", reason));
                        msg.tool_call_id = Some(call.id.clone());
                        messages.push(msg);
                        return ExecutionResult {
                            success: true,
                            output: combined_output,
                            files_changed,
                            iteration_complete: false,
                            blocked: Some(reason),
                            error: None,
                            error_category: None,
                            error_code: None,
                            conversation_state: Some(messages),
                        };
                    }
                }
            }
        }

        ExecutionResult::failure("exceeded max tool-use rounds without a completion signal", ErrorCode::OperationTimeout)
    }
}
