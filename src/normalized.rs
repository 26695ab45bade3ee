//! Normalized event types for streaming LLM responses.
//!
//! Drivers translate provider wire formats into [`NormalizedEvent`]s and the
//! orchestrator consumes them to run the tool loop.

/// Events emitted by drivers and the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NormalizedEvent {
    /// Start of an orchestrated response.
    StreamStart {
        /// Unique identifier for this request/response pair.
        request_id: String,
    },

    /// Incremental text from the assistant.
    MessageDelta { text: String },

    /// Incremental tool call fragment.
    ToolCallDelta {
        call_index: usize,
        /// May arrive in the first delta or later.
        id: Option<String>,
        name: Option<String>,
        arguments_delta: Option<String>,
    },

    /// Tool call fully assembled and ready for execution.
    ToolCallComplete {
        call_index: usize,
        id: String,
        name: String,
        arguments_json: String,
    },

    /// Result from executing a tool.
    ToolResult {
        id: String,
        name: String,
        content: String,
        success: bool,
    },

    /// An error occurred during streaming.
    Error {
        message: String,
        code: Option<String>,
    },

    /// Stream has completed.
    Done,
}

/// Stable event name used in logs.
pub fn event_name(evt: &NormalizedEvent) -> &'static str {
    match evt {
        NormalizedEvent::StreamStart { .. } => "stream.start",
        NormalizedEvent::MessageDelta { .. } => "message.delta",
        NormalizedEvent::ToolCallDelta { .. } => "tool_call.delta",
        NormalizedEvent::ToolCallComplete { .. } => "tool_call.complete",
        NormalizedEvent::ToolResult { .. } => "tool_result",
        NormalizedEvent::Error { .. } => "error",
        NormalizedEvent::Done => "done",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_names() {
        assert_eq!(event_name(&NormalizedEvent::Done), "done");
        assert_eq!(
            event_name(&NormalizedEvent::MessageDelta {
                text: "x".to_string()
            }),
            "message.delta"
        );
    }
}
