//! Chat Completions driver.
//!
//! Implements [`LlmDriver`] against `/chat/completions` with `stream: true`,
//! decoding server-sent event frames into [`NormalizedEvent`]s.

use std::collections::BTreeMap;

use futures::StreamExt;

use crate::normalized::NormalizedEvent;

use super::{EventStream, LlmDriver, LlmRequest, LlmSettings};

/// Streaming tool call under assembly.
#[derive(Default)]
struct ToolAccum {
    id: Option<String>,
    name: Option<String>,
    args: String,
}

/// Driver for `OpenAI`-compatible Chat Completions endpoints.
#[derive(Clone)]
pub struct ChatCompletionsDriver {
    http: reqwest::Client,
    settings: LlmSettings,
}

impl std::fmt::Debug for ChatCompletionsDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatCompletionsDriver")
            .field("settings", &self.settings)
            .finish()
    }
}

impl ChatCompletionsDriver {
    #[must_use]
    pub fn new(settings: LlmSettings) -> Self {
        Self {
            http: reqwest::Client::new(),
            settings,
        }
    }
}

#[async_trait::async_trait]
impl LlmDriver for ChatCompletionsDriver {
    async fn stream(&self, req: LlmRequest) -> anyhow::Result<EventStream> {
        let url = self.settings.provider.build_chat_url(&self.settings.base_url);
        let model = req.model.unwrap_or_else(|| self.settings.model.clone());

        let mut body = serde_json::json!({
            "model": model,
            "stream": true,
            "messages": req.messages,
        });
        if !req.tools.is_empty() {
            body["tools"] = serde_json::Value::Array(req.tools);
        }

        tracing::debug!(url = %url, model = %model, "Sending chat completions request");

        let mut rb = self.http.post(&url).json(&body);
        if let Some(k) = &self.settings.api_key {
            rb = rb.bearer_auth(k);
        }

        let resp = rb.send().await?.error_for_status()?;
        let byte_stream = resp.bytes_stream();

        let out = async_stream::try_stream! {
            let mut buf = Vec::<u8>::new();
            let mut tool_accum: BTreeMap<usize, ToolAccum> = BTreeMap::new();

            futures::pin_mut!(byte_stream);
            while let Some(chunk) = byte_stream.next().await {
                let chunk = chunk?;
                buf.extend_from_slice(&chunk);

                while let Some(pos) = find_frame_end(&buf) {
                    let frame = buf.drain(..pos).collect::<Vec<_>>();
                    let text = String::from_utf8_lossy(&frame);

                    for data in frame_data_lines(&text) {
                        if data == "[DONE]" {
                            yield NormalizedEvent::Done;
                            continue;
                        }

                        let v: serde_json::Value = serde_json::from_str(data)?;
                        let choice = &v["choices"][0];
                        let delta = &choice["delta"];

                        if let Some(s) = delta.get("content").and_then(|x| x.as_str())
                            && !s.is_empty()
                        {
                            yield NormalizedEvent::MessageDelta { text: s.to_string() };
                        }

                        if let Some(arr) = delta.get("tool_calls").and_then(|x| x.as_array()) {
                            for tc in arr {
                                let idx = usize::try_from(
                                    tc.get("index").and_then(serde_json::Value::as_u64).unwrap_or(0),
                                )
                                .unwrap_or(0);
                                let id = tc.get("id").and_then(|x| x.as_str()).map(ToString::to_string);
                                let function = tc.get("function");
                                let name = function
                                    .and_then(|f| f.get("name"))
                                    .and_then(|x| x.as_str())
                                    .map(ToString::to_string);
                                let args_delta = function
                                    .and_then(|f| f.get("arguments"))
                                    .and_then(|x| x.as_str())
                                    .map(ToString::to_string);

                                let entry = tool_accum.entry(idx).or_default();
                                if entry.id.is_none() {
                                    entry.id.clone_from(&id);
                                }
                                if entry.name.is_none() {
                                    entry.name.clone_from(&name);
                                }
                                if let Some(ad) = &args_delta {
                                    entry.args.push_str(ad);
                                }

                                yield NormalizedEvent::ToolCallDelta {
                                    call_index: idx,
                                    id,
                                    name,
                                    arguments_delta: args_delta,
                                };
                            }
                        }

                        // Gemini reports "stop" even when tool calls were streamed
                        let finished = choice.get("finish_reason").and_then(|x| x.as_str()).is_some();
                        if finished && !tool_accum.is_empty() {
                            for (idx, a) in std::mem::take(&mut tool_accum) {
                                if let (Some(id), Some(name)) = (a.id, a.name) {
                                    yield NormalizedEvent::ToolCallComplete {
                                        call_index: idx,
                                        id,
                                        name,
                                        arguments_json: a.args,
                                    };
                                }
                            }
                        }
                    }
                }
            }
        };

        Ok(Box::pin(out))
    }
}

/// End offset (exclusive) of the first complete SSE frame in the buffer.
fn find_frame_end(buf: &[u8]) -> Option<usize> {
    let lf = buf.windows(2).position(|w| w == b"\n\n").map(|p| p + 2);
    let crlf = buf.windows(4).position(|w| w == b"\r\n\r\n").map(|p| p + 4);
    match (lf, crlf) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}

fn frame_data_lines(frame: &str) -> impl Iterator<Item = &str> {
    frame
        .lines()
        .map(str::trim)
        .filter_map(|line| line.strip_prefix("data:"))
        .map(str::trim)
        .filter(|data| !data.is_empty())
}
