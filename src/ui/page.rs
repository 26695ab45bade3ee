//! The portal page (`GET /`) and the history endpoint.

use axum::{Json, extract::State, response::Html};
use serde::Serialize;

use crate::AppState;
use crate::storage::StoredMessage;

use super::transcript::{Transcript, html_escape};

const TEMPLATE: &str = include_str!("../../static/desktpo.html");

/// Replaced with the configured Google Calendar id.
pub const CALENDAR_PLACEHOLDER: &str = "YOUR_CALENDAR_ID_HERE";
const HISTORY_SLOT: &str = "{{HISTORY}}";
const MODELS_SLOT: &str = "{{MODELS}}";

fn model_picker(models: &[String], default_model: &str) -> String {
    let mut choices: Vec<&str> = models.iter().map(String::as_str).collect();
    if !choices.contains(&default_model) {
        choices.insert(0, default_model);
    }
    choices
        .into_iter()
        .map(|m| {
            let checked = if m == default_model { " checked" } else { "" };
            let m = html_escape(m);
            format!(r#"<label><input type="radio" name="modelSelect" value="{m}"{checked}> {m}</label>"#)
        })
        .collect()
}

/// The full page with history pre-rendered.
pub fn render_page(
    calendar_id: &str,
    models: &[String],
    default_model: &str,
    transcript: &Transcript,
) -> String {
    let calendar: String = url::form_urlencoded::byte_serialize(calendar_id.as_bytes()).collect();
    TEMPLATE
        .replace(CALENDAR_PLACEHOLDER, &calendar)
        .replace(MODELS_SLOT, &model_picker(models, default_model))
        .replace(HISTORY_SLOT, &transcript.render())
}

/// GET /
pub async fn index(State(state): State<AppState>) -> Html<String> {
    let history = state.store.today_history().await.unwrap_or_else(|e| {
        tracing::error!(name: "ui.history_failed", error = %e, "Could not load history for page");
        Vec::new()
    });
    let assistant = &state.config.assistant;
    Html(render_page(
        &assistant.calendar_id,
        &assistant.models,
        &assistant.default_model,
        &Transcript::from_history(&history),
    ))
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct HistoryEntry {
    pub role: String,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voice_url: Option<String>,
}

impl From<StoredMessage> for HistoryEntry {
    fn from(msg: StoredMessage) -> Self {
        Self {
            role: msg.role,
            content: msg.content,
            image_url: msg.image_url,
            voice_url: msg.voice_url,
        }
    }
}

/// GET /history: today's messages, oldest first. Empty on storage failure.
pub async fn history(State(state): State<AppState>) -> Json<Vec<HistoryEntry>> {
    match state.store.today_history().await {
        Ok(rows) => Json(rows.into_iter().map(HistoryEntry::from).collect()),
        Err(e) => {
            tracing::error!(name: "history.failed", error = %e, "History query failed");
            Json(Vec::new())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ui::transcript::BubbleRole;

    #[test]
    fn test_page_substitutes_calendar_and_models() {
        let models = vec!["gemini-3-flash-preview".to_string(), "gemini-2.5-pro".to_string()];
        let page = render_page(
            "family@group.calendar.google.com",
            &models,
            "gemini-2.5-pro",
            &Transcript::new(),
        );
        assert!(!page.contains(CALENDAR_PLACEHOLDER));
        assert!(page.contains("src=family%40group.calendar.google.com"));
        assert!(page.contains(r#"value="gemini-2.5-pro" checked"#));
        assert!(!page.contains(HISTORY_SLOT));
    }

    #[test]
    fn test_page_includes_history() {
        let mut transcript = Transcript::new();
        transcript.submit("前の話", None);
        let page = render_page("primary", &[], "m", &transcript);
        assert!(page.contains("前の話"));
        assert!(page.contains(r#"value="m" checked"#));
        assert_eq!(transcript.bubbles()[0].role, BubbleRole::User);
    }

    #[test]
    fn test_history_entry_skips_missing_urls() {
        let entry = HistoryEntry::from(StoredMessage {
            id: 1,
            timestamp: "2026-10-19 10:00:00".to_string(),
            role: "assistant".to_string(),
            content: "はい".to_string(),
            image_url: None,
            voice_url: Some("/wav_files/v_1.wav".to_string()),
        });
        let json = serde_json::to_value(entry).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"role": "assistant", "content": "はい", "voice_url": "/wav_files/v_1.wav"})
        );
    }
}
