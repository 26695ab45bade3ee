//! Text-to-speech through a VOICEVOX engine.
//!
//! Synthesis is two calls: `POST /audio_query` builds a query for the text,
//! which is tuned and sent to `POST /synthesis` to get WAV bytes.

use std::path::PathBuf;
use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

use crate::config::VoiceConfig;

/// Spoken in place of text that is empty after cleanup.
const FALLBACK_TEXT: &str = "了解だよ。";
const SPEED_SCALE: f64 = 1.15;
const INTONATION_SCALE: f64 = 1.4;

// Stage directions in half- or full-width parentheses are not read aloud.
static PARENTHETICAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\(.*?\)|（.*?）").expect("valid regex"));

#[derive(Debug, Error)]
pub enum VoiceError {
    #[error("VOICEVOX request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("audio query was not a JSON object")]
    BadQuery,
    #[error("failed to write audio: {0}")]
    Io(#[from] std::io::Error),
}

/// Text that will actually be spoken.
pub fn speech_text(text: &str) -> String {
    let cleaned = PARENTHETICAL.replace_all(text, "");
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        FALLBACK_TEXT.to_string()
    } else {
        cleaned.to_string()
    }
}

/// `v_<unix seconds>.wav`
pub fn voice_file_name(unix_secs: i64) -> String {
    format!("v_{unix_secs}.wav")
}

#[derive(Debug, Clone)]
pub struct VoicevoxClient {
    http: reqwest::Client,
    base_url: String,
    speaker: u32,
    output_dir: PathBuf,
}

impl VoicevoxClient {
    pub fn new(config: &VoiceConfig, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            speaker: config.speaker,
            output_dir: output_dir.into(),
        }
    }

    /// Synthesize `text` into `<output_dir>/<file_name>` and return the path.
    pub async fn synthesize(&self, text: &str, file_name: &str) -> Result<PathBuf, VoiceError> {
        let spoken = speech_text(text);
        let speaker = self.speaker.to_string();

        let mut query: serde_json::Value = self
            .http
            .post(format!("{}/audio_query", self.base_url))
            .query(&[("text", spoken.as_str()), ("speaker", speaker.as_str())])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let fields = query.as_object_mut().ok_or(VoiceError::BadQuery)?;
        fields.insert("speedScale".to_string(), SPEED_SCALE.into());
        fields.insert("intonationScale".to_string(), INTONATION_SCALE.into());

        let audio = self
            .http
            .post(format!("{}/synthesis", self.base_url))
            .query(&[("speaker", speaker.as_str())])
            .json(&query)
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;

        tokio::fs::create_dir_all(&self.output_dir).await?;
        let path = self.output_dir.join(file_name);
        tokio::fs::write(&path, &audio).await?;

        tracing::debug!(
            name: "voice.synthesized",
            file = %path.display(),
            bytes = audio.len(),
            "Voice synthesized"
        );
        Ok(path)
    }
}
