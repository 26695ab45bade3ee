//! LLM orchestrator with tool loop execution.
//!
//! The orchestrator manages one assistant turn:
//! 1. Send the conversation to the LLM
//! 2. Stream the response, detecting tool calls
//! 3. Execute tool calls via the [`ToolRegistry`]
//! 4. Feed tool results back to the LLM
//! 5. Repeat until the model produces a final response
//!
//! # Example
//!
//! ```rust,ignore
//! use lefte_portal::llm::{Message, Orchestrator};
//!
//! let orchestrator = Orchestrator::new(settings, tools);
//! let done = orchestrator
//!     .complete(vec![Message::user("今日の予定は？")], None)
//!     .await?;
//! println!("{}", done.text);
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use futures::{Stream, StreamExt};
use uuid::Uuid;

use crate::normalized::{NormalizedEvent, event_name};
use crate::tools::{ToolRegistry, result_text};

use super::{ChatCompletionsDriver, LlmDriver, LlmRequest, LlmSettings, Message, ToolCall, ToolCallFunction};

/// Maximum number of tool loop iterations to prevent infinite loops.
const MAX_TOOL_ITERATIONS: usize = 10;

#[derive(Debug, Default, Clone)]
struct ToolCallAccumulator {
    id: Option<String>,
    name: Option<String>,
    arguments: String,
}

/// Final outcome of a tool-loop run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Completion {
    /// Text of the last model response (earlier tool-calling turns are dropped).
    pub text: String,
    /// Text of every tool result, in execution order.
    pub tool_outputs: Vec<String>,
}

/// Wraps an [`LlmDriver`] and runs the tool loop on top of it.
#[derive(Clone)]
pub struct Orchestrator {
    driver: Arc<dyn LlmDriver>,
    tools: Arc<ToolRegistry>,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("tools", &self.tools)
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    #[must_use]
    pub fn new(settings: LlmSettings, tools: Arc<ToolRegistry>) -> Self {
        Self::with_driver(Arc::new(ChatCompletionsDriver::new(settings)), tools)
    }

    /// Use a custom driver, e.g. a scripted one in tests.
    #[must_use]
    pub fn with_driver(driver: Arc<dyn LlmDriver>, tools: Arc<ToolRegistry>) -> Self {
        Self { driver, tools }
    }

    #[must_use]
    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Start a chat interaction with existing message history.
    ///
    /// Yields `StreamStart`, the driver's deltas, a `ToolResult` per executed
    /// tool call, and ends with either `Done` or `Error`.
    #[allow(clippy::too_many_lines)]
    pub fn chat_with_history(
        &self,
        messages: Vec<Message>,
        model: Option<String>,
    ) -> impl Stream<Item = NormalizedEvent> + Send + 'static {
        let request_id = Uuid::new_v4().to_string();
        let tools = self.tools.openai_tools_json();

        tracing::info!(
            request_id = %request_id,
            message_count = messages.len(),
            tool_count = tools.len(),
            model = ?model,
            "Starting orchestrator chat"
        );

        let orchestrator = self.clone();

        async_stream::stream! {
            yield NormalizedEvent::StreamStart {
                request_id: request_id.clone(),
            };

            let mut message_json: Vec<serde_json::Value> = Vec::with_capacity(messages.len());
            for m in &messages {
                match serde_json::to_value(m) {
                    Ok(v) => message_json.push(v),
                    Err(e) => {
                        yield NormalizedEvent::Error {
                            message: format!("failed to encode message: {e}"),
                            code: None,
                        };
                        return;
                    }
                }
            }

            let mut iteration = 0;

            loop {
                if iteration >= MAX_TOOL_ITERATIONS {
                    tracing::error!(
                        request_id = %request_id,
                        max_iterations = MAX_TOOL_ITERATIONS,
                        "Maximum tool loop iterations exceeded"
                    );
                    yield NormalizedEvent::Error {
                        message: "Maximum tool loop iterations exceeded".to_string(),
                        code: Some("MAX_ITERATIONS".to_string()),
                    };
                    break;
                }
                iteration += 1;

                let req = LlmRequest {
                    model: model.clone(),
                    messages: message_json.clone(),
                    tools: tools.clone(),
                };

                let driver_stream = match orchestrator.driver.stream(req).await {
                    Ok(s) => s,
                    Err(e) => {
                        tracing::error!(
                            request_id = %request_id,
                            iteration = iteration,
                            error = %e,
                            "Failed to create driver stream"
                        );
                        yield NormalizedEvent::Error {
                            message: e.to_string(),
                            code: None,
                        };
                        break;
                    }
                };

                let mut accumulators: BTreeMap<usize, ToolCallAccumulator> = BTreeMap::new();
                let mut assistant_text = String::new();
                let mut has_tool_calls = false;

                futures::pin_mut!(driver_stream);

                while let Some(result) = driver_stream.next().await {
                    let event = match result {
                        Ok(event) => event,
                        Err(e) => {
                            yield NormalizedEvent::Error {
                                message: e.to_string(),
                                code: None,
                            };
                            return;
                        }
                    };
                    match &event {
                        NormalizedEvent::MessageDelta { text } => {
                            assistant_text.push_str(text);
                        }
                        NormalizedEvent::ToolCallDelta { call_index, id, name, arguments_delta } => {
                            has_tool_calls = true;
                            let acc = accumulators.entry(*call_index).or_default();
                            if acc.id.is_none() {
                                acc.id.clone_from(id);
                            }
                            if acc.name.is_none() {
                                acc.name.clone_from(name);
                            }
                            if let Some(delta) = arguments_delta {
                                acc.arguments.push_str(delta);
                            }
                        }
                        NormalizedEvent::ToolCallComplete { call_index, id, name, arguments_json } => {
                            has_tool_calls = true;
                            // The completed form is authoritative over the deltas.
                            accumulators.insert(*call_index, ToolCallAccumulator {
                                id: Some(id.clone()),
                                name: Some(name.clone()),
                                arguments: arguments_json.clone(),
                            });
                        }
                        // Our own Done is emitted once the loop settles.
                        NormalizedEvent::Done => continue,
                        NormalizedEvent::Error { .. } => {
                            yield event;
                            return;
                        }
                        NormalizedEvent::StreamStart { .. } | NormalizedEvent::ToolResult { .. } => {}
                    }
                    yield event;
                }

                let tool_calls: Vec<ToolCall> = accumulators
                    .values()
                    .filter_map(|acc| {
                        Some(ToolCall {
                            id: acc.id.clone()?,
                            call_type: "function".to_string(),
                            function: ToolCallFunction {
                                name: acc.name.clone()?,
                                arguments: acc.arguments.clone(),
                            },
                        })
                    })
                    .collect();

                if !has_tool_calls || tool_calls.is_empty() {
                    tracing::info!(
                        request_id = %request_id,
                        iteration = iteration,
                        text_length = assistant_text.len(),
                        "No tool calls to process, completing stream"
                    );
                    yield NormalizedEvent::Done;
                    break;
                }

                message_json.push(serde_json::json!({
                    "role": "assistant",
                    "content": if assistant_text.is_empty() {
                        serde_json::Value::Null
                    } else {
                        serde_json::Value::String(assistant_text.clone())
                    },
                    "tool_calls": tool_calls,
                }));

                for tool_call in &tool_calls {
                    let tool_name = &tool_call.function.name;
                    let arguments: serde_json::Value = if tool_call.function.arguments.trim().is_empty() {
                        serde_json::Value::Object(serde_json::Map::new())
                    } else {
                        serde_json::from_str(&tool_call.function.arguments)
                            .unwrap_or_else(|_| serde_json::Value::Object(serde_json::Map::new()))
                    };

                    tracing::info!(
                        request_id = %request_id,
                        iteration = iteration,
                        tool_id = %tool_call.id,
                        tool_name = %tool_name,
                        "Executing tool call"
                    );

                    let (content, success) = match orchestrator.tools.call(tool_name, arguments).await {
                        Ok(result) => (result_text(&result), true),
                        Err(e) => {
                            tracing::warn!(
                                request_id = %request_id,
                                tool_name = %tool_name,
                                error = %e,
                                "Tool call failed"
                            );
                            (format!("Error: {e}"), false)
                        }
                    };

                    yield NormalizedEvent::ToolResult {
                        id: tool_call.id.clone(),
                        name: tool_name.clone(),
                        content: content.clone(),
                        success,
                    };

                    message_json.push(serde_json::json!({
                        "role": "tool",
                        "tool_call_id": tool_call.id,
                        "content": content
                    }));
                }
            }
        }
    }

    /// Run the tool loop to the end and collect the final answer.
    ///
    /// # Errors
    ///
    /// Returns the first `Error` event as an error.
    pub async fn complete(
        &self,
        messages: Vec<Message>,
        model: Option<String>,
    ) -> anyhow::Result<Completion> {
        let stream = self.chat_with_history(messages, model);
        futures::pin_mut!(stream);

        let mut completion = Completion::default();
        let mut current = String::new();

        while let Some(event) = stream.next().await {
            match event {
                NormalizedEvent::MessageDelta { text } => current.push_str(&text),
                NormalizedEvent::ToolResult { content, .. } => {
                    completion.tool_outputs.push(content);
                    // A tool result starts a new model turn.
                    current.clear();
                }
                NormalizedEvent::Error { message, .. } => anyhow::bail!(message),
                NormalizedEvent::Done => break,
                other => tracing::trace!(event = event_name(&other), "Skipping stream event"),
            }
        }

        completion.text = current;
        Ok(completion)
    }
}
