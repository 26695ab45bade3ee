//! The chat pipeline behind `chat_request`.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context as _;
use base64::Engine as _;
use chrono::{Local, Utc};
use tokio::sync::mpsc;

use crate::config::AssistantConfig;
use crate::launcher::{LAUNCH_MARKER, extract_launch_url, strip_launch_signal};
use crate::llm::{ContentPart, Message, MessageContent, Orchestrator};
use crate::storage::{ChatStore, Role};
use crate::tools::media::MediaRoot;
use crate::voice::{VoicevoxClient, voice_file_name};

use super::events::{ChatRequest, ChatUpdate, ServerEvent};
use super::hub::RelayHub;

/// Stored messages replayed to the model as context.
pub const CONTEXT_MESSAGES: usize = 10;

/// Reply used when the model returns no text.
pub const EMPTY_REPLY: &str = "完了だよ。";

pub const DEFAULT_PERSONALITY: &str = "あなたは助手の L.E.F.T.E. です。";

const FUNCTIONAL_RULES: &str = "\
1. カレンダー/ドライブ等は当然の日常として使い、説明は不要。
2. 簡潔に回答せよ。
3. アプリを起動する際は、ツールが返した '🚀LAUNCH_SIGNAL:...' を必ず含めること。
4. ツール実行に失敗した場合は、技術的なエラーログを出すのではなく、ユーザーに「何ができなかったか」を1行で伝える。
5. 音声合成（Voicevox）で読み上げるため、URLや複雑な記号、メタデータは本文に含めない。";

/// Personality text followed by the fixed behaviour rules.
pub fn system_instruction(personality: &str, user_name: Option<&str>) -> String {
    let mut prompt = format!("{}\n{FUNCTIONAL_RULES}\n", personality.trim_end());
    if let Some(name) = user_name.filter(|n| !n.trim().is_empty()) {
        prompt.push_str(&format!(
            "6. ユーザーを「{name}」と認識し、適度な距離感のアシスタントとして振る舞う。\n"
        ));
    }
    prompt
}

/// `【現在時刻: YYYY-MM-DD HH:MM:SS】` followed by the user's text.
pub fn stamped_user_text(now: chrono::NaiveDateTime, message: &str) -> String {
    format!("【現在時刻: {}】\n{message}", now.format("%Y-%m-%d %H:%M:%S"))
}

/// Split an assistant reply into visible text and an optional launch URL.
///
/// The reply text is searched first, then tool outputs in order.
pub fn split_launch(text: &str, tool_outputs: &[String]) -> (String, Option<String>) {
    let launch_url = extract_launch_url(text)
        .or_else(|| tool_outputs.iter().find_map(|out| extract_launch_url(out)));

    let visible = if text.contains(LAUNCH_MARKER) {
        strip_launch_signal(text)
    } else {
        text.trim()
    };
    let visible = if visible.is_empty() { EMPTY_REPLY } else { visible };
    (visible.to_string(), launch_url)
}

/// Runs one chat turn end to end and broadcasts the result.
#[derive(Debug)]
pub struct ChatService {
    store: ChatStore,
    hub: RelayHub,
    orchestrator: Orchestrator,
    voice: Option<VoicevoxClient>,
    media: MediaRoot,
    assistant: AssistantConfig,
}

impl ChatService {
    pub fn new(
        store: ChatStore,
        hub: RelayHub,
        orchestrator: Orchestrator,
        voice: Option<VoicevoxClient>,
        media: MediaRoot,
        assistant: AssistantConfig,
    ) -> Self {
        Self {
            store,
            hub,
            orchestrator,
            voice,
            media,
            assistant,
        }
    }

    /// Handle a request in the background. Failures go to `reply` only.
    pub fn dispatch(self: &Arc<Self>, req: ChatRequest, reply: Option<mpsc::Sender<ServerEvent>>) {
        let service = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(e) = service.handle(req).await {
                tracing::error!(name: "chat.failed", error = %format!("{e:#}"), "Chat request failed");
                service.hub.broadcast(ServerEvent::AiThinking { active: false });
                if let Some(reply) = reply
                    && reply.send(ServerEvent::error(format!("{e:#}"))).await.is_err()
                {
                    tracing::debug!("Requesting connection closed before error reply");
                }
            }
        });
    }

    pub async fn handle(&self, req: ChatRequest) -> anyhow::Result<ChatUpdate> {
        tracing::info!(
            name: "chat.request",
            message_length = req.message.len(),
            model = ?req.model,
            has_image = req.has_attachment(),
            "Chat request received"
        );
        self.hub.broadcast(ServerEvent::AiThinking { active: true });

        let saved_id = self
            .store
            .save_message(Role::User, &req.message, req.image_url.as_deref(), None)
            .await
            .context("failed to save user message")?;

        let messages = self.build_context(&req, saved_id).await?;
        let model = req
            .model
            .clone()
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| self.assistant.default_model.clone());

        let completion = self.orchestrator.complete(messages, Some(model)).await?;
        let (response, launch_url) = split_launch(&completion.text, &completion.tool_outputs);

        let voice_url = self.speak(&response).await;

        self.store
            .save_message(Role::Assistant, &response, None, voice_url.as_deref())
            .await
            .context("failed to save assistant message")?;

        #[allow(clippy::cast_precision_loss)]
        let timestamp = Utc::now().timestamp_millis() as f64 / 1000.0;
        let update = ChatUpdate {
            user_message: req.message,
            response,
            voice_url,
            launch_url,
            timestamp,
        };
        let receivers = self.hub.broadcast(ServerEvent::ChatUpdate(update.clone()));
        tracing::info!(
            name: "chat.completed",
            receivers,
            launch = update.launch_url.is_some(),
            "Chat update broadcast"
        );
        Ok(update)
    }

    async fn build_context(
        &self,
        req: &ChatRequest,
        saved_id: Option<i64>,
    ) -> anyhow::Result<Vec<Message>> {
        let personality = match tokio::fs::read_to_string(&self.assistant.personality_file).await {
            Ok(text) => text,
            Err(_) => DEFAULT_PERSONALITY.to_string(),
        };
        let mut messages = vec![Message::system(system_instruction(
            &personality,
            self.assistant.user_name.as_deref(),
        ))];

        let history = self.store.today_history().await?;
        let past: Vec<_> = history
            .into_iter()
            .filter(|row| Some(row.id) != saved_id && !row.content.is_empty())
            .collect();
        let skip = past.len().saturating_sub(CONTEXT_MESSAGES);
        for row in past.into_iter().skip(skip) {
            if row.is_user() {
                messages.push(Message::user(row.content));
            } else {
                messages.push(Message::assistant(row.content));
            }
        }

        let text = stamped_user_text(Local::now().naive_local(), &req.message);
        let content = match self.image_data_url(req).await {
            Some(url) => MessageContent::parts(vec![ContentPart::text(text), ContentPart::image_url(url)]),
            None => MessageContent::text(text),
        };
        messages.push(Message::user(content));
        Ok(messages)
    }

    /// Inline payload first, otherwise the uploaded file read back from disk.
    async fn image_data_url(&self, req: &ChatRequest) -> Option<String> {
        if let Some(b64) = req.image.as_deref().filter(|s| !s.is_empty()) {
            let mime = req.mime_type.as_deref().unwrap_or("image/jpeg");
            return Some(format!("data:{mime};base64,{b64}"));
        }

        let url = req.image_url.as_deref()?;
        let path: PathBuf = self.media.resolve(url.trim_start_matches('/'))?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let mime = req
                    .mime_type
                    .clone()
                    .unwrap_or_else(|| mime_guess::from_path(&path).first_or_octet_stream().to_string());
                let b64 = base64::engine::general_purpose::STANDARD.encode(bytes);
                Some(format!("data:{mime};base64,{b64}"))
            }
            Err(e) => {
                tracing::warn!(name: "chat.image_unreadable", path = %path.display(), error = %e, "Attached image not readable");
                None
            }
        }
    }

    /// Synthesize the reply; `None` when voice is off or synthesis fails.
    async fn speak(&self, text: &str) -> Option<String> {
        let voice = self.voice.as_ref()?;
        let file_name = voice_file_name(Utc::now().timestamp());
        match voice.synthesize(text, &file_name).await {
            Ok(_) => Some(format!("/wav_files/{file_name}")),
            Err(e) => {
                tracing::warn!(name: "voice.failed", error = %e, "Voice generation failed");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::config::AppConfig;
    use crate::llm::{EventStream, LlmDriver, LlmRequest};
    use crate::normalized::NormalizedEvent;
    use crate::tools::ToolRegistry;

    #[derive(Default)]
    struct FixedReply {
        reply: String,
        seen: Mutex<Vec<LlmRequest>>,
    }

    #[async_trait]
    impl LlmDriver for FixedReply {
        async fn stream(&self, req: LlmRequest) -> anyhow::Result<EventStream> {
            self.seen.lock().unwrap().push(req);
            let events = vec![
                Ok(NormalizedEvent::MessageDelta {
                    text: self.reply.clone(),
                }),
                Ok(NormalizedEvent::Done),
            ];
            Ok(Box::pin(futures::stream::iter(events)))
        }
    }

    async fn service(reply: &str) -> (Arc<ChatService>, Arc<FixedReply>, RelayHub) {
        let store = ChatStore::in_memory().await.unwrap();
        let hub = RelayHub::new();
        let driver = Arc::new(FixedReply {
            reply: reply.to_string(),
            ..FixedReply::default()
        });
        let orchestrator = Orchestrator::with_driver(driver.clone(), Arc::new(ToolRegistry::new()));
        let mut assistant = AppConfig::defaults().unwrap().assistant;
        assistant.personality_file = PathBuf::from("no-such-personality.txt");
        let svc = ChatService::new(
            store,
            hub.clone(),
            orchestrator,
            None,
            MediaRoot::new("media"),
            assistant,
        );
        (Arc::new(svc), driver, hub)
    }

    #[test]
    fn test_split_launch_from_text() {
        let (text, url) = split_launch("起動するよ！🚀LAUNCH_SIGNAL:lefte-launch://ZZZ", &[]);
        assert_eq!(text, "起動するよ！");
        assert_eq!(url.as_deref(), Some("lefte-launch://ZZZ"));
    }

    #[test]
    fn test_split_launch_from_tool_output() {
        let outputs = vec!["🚀LAUNCH_SIGNAL:lefte-launch://メモ帳".to_string()];
        let (text, url) = split_launch("メモ帳を開いたよ", &outputs);
        assert_eq!(text, "メモ帳を開いたよ");
        assert_eq!(url.as_deref(), Some("lefte-launch://メモ帳"));
    }

    #[test]
    fn test_split_launch_empty_reply() {
        assert_eq!(split_launch("  ", &[]), (EMPTY_REPLY.to_string(), None));
    }

    #[test]
    fn test_system_instruction() {
        let prompt = system_instruction(DEFAULT_PERSONALITY, Some("しゅんた"));
        assert!(prompt.starts_with(DEFAULT_PERSONALITY));
        assert!(prompt.contains("2. 簡潔に回答せよ。"));
        assert!(prompt.contains("「しゅんた」"));
        assert!(!system_instruction("x", None).contains("6."));
    }

    #[test]
    fn test_stamped_user_text() {
        let now = chrono::NaiveDate::from_ymd_opt(2026, 10, 19)
            .unwrap()
            .and_hms_opt(9, 5, 0)
            .unwrap();
        assert_eq!(stamped_user_text(now, "おはよう"), "【現在時刻: 2026-10-19 09:05:00】\nおはよう");
    }

    #[tokio::test]
    async fn test_handle_broadcasts_and_persists() {
        let (svc, driver, hub) = service("おはよう！").await;
        let mut rx = hub.subscribe();

        let update = svc
            .handle(ChatRequest {
                message: "おはよう".to_string(),
                ..ChatRequest::default()
            })
            .await
            .unwrap();
        assert_eq!(update.response, "おはよう！");
        assert_eq!(update.voice_url, None);

        assert_eq!(rx.recv().await.unwrap(), ServerEvent::AiThinking { active: true });
        assert!(matches!(rx.recv().await.unwrap(), ServerEvent::ChatUpdate(u) if u.response == "おはよう！"));

        let history = svc.store.today_history().await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].role, "assistant");

        let seen = driver.seen.lock().unwrap();
        assert_eq!(seen[0].model.as_deref(), Some("gemini-3-flash-preview"));
        let msgs = &seen[0].messages;
        // system + new user turn; the saved copy is not repeated
        assert_eq!(msgs.len(), 2);
        assert!(msgs[1]["content"].as_str().unwrap().contains("【現在時刻:"));
    }

    #[tokio::test]
    async fn test_inline_image_becomes_part() {
        let (svc, driver, _hub) = service("猫だね").await;
        svc.handle(ChatRequest {
            message: "これ何？".to_string(),
            model: Some("gemini-2.5-pro".to_string()),
            image: Some("AAAA".to_string()),
            mime_type: Some("image/png".to_string()),
            ..ChatRequest::default()
        })
        .await
        .unwrap();

        let seen = driver.seen.lock().unwrap();
        assert_eq!(seen[0].model.as_deref(), Some("gemini-2.5-pro"));
        let last = seen[0].messages.last().unwrap();
        assert_eq!(last["content"][1]["image_url"]["url"], "data:image/png;base64,AAAA");
    }

    #[tokio::test]
    async fn test_dispatch_reports_error_to_requester() {
        let store = ChatStore::in_memory().await.unwrap();
        let hub = RelayHub::new();
        let tools = Arc::new(ToolRegistry::new());
        // Nothing listens on port 9
        let orchestrator = Orchestrator::new(
            crate::llm::LlmSettings {
                base_url: "http://127.0.0.1:9/v1".to_string(),
                api_key: None,
                model: "m".to_string(),
                provider: crate::llm::Provider::Generic,
            },
            tools,
        );
        let assistant = AppConfig::defaults().unwrap().assistant;
        let svc = Arc::new(ChatService::new(
            store,
            hub,
            orchestrator,
            None,
            MediaRoot::new("media"),
            assistant,
        ));

        let (tx, mut rx) = mpsc::channel(4);
        svc.dispatch(
            ChatRequest {
                message: "hi".to_string(),
                ..ChatRequest::default()
            },
            Some(tx),
        );
        match rx.recv().await.unwrap() {
            ServerEvent::ErrorMessage { response } => assert!(response.starts_with("エラー：")),
            other => panic!("unexpected {other:?}"),
        }
    }
}
