use crate::llm::{LlmSettings, Provider};
use clap::Parser;
use config::builder::DefaultState;
use config::{Config, ConfigBuilder, Environment, File};
use serde::Deserialize;
use std::env;
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Config file path
    #[arg(short, long, env = "CONFIG_FILE")]
    pub config: Option<String>,

    /// Port to listen on
    #[arg(long, env = "PORT")]
    pub port: Option<u16>,

    /// Address to bind
    #[arg(long, env = "HOST")]
    pub host: Option<String>,

    /// Enable rate limiting
    #[arg(long, env = "RATE_LIMIT_ENABLED")]
    pub rate_limit_enabled: Option<bool>,

    /// Disable timeout middleware
    #[arg(long, env = "TIMEOUT_DISABLED")]
    pub timeout_disabled: Option<bool>,

    /// Disable VOICEVOX speech synthesis
    #[arg(long, env = "VOICE_DISABLED")]
    pub voice_disabled: Option<bool>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub assistant: AssistantConfig,
    pub voice: VoiceConfig,
    pub storage: StorageConfig,
    pub widgets: WidgetsConfig,
    pub monitor: MonitorConfig,
    pub offline: OfflineConfig,
    pub resilience: ResilienceConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
    pub static_dir: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AssistantConfig {
    /// Model used when a chat request does not name one.
    pub default_model: String,
    /// Models offered by the model picker in the chat panel.
    pub models: Vec<String>,
    pub personality_file: PathBuf,
    /// How the assistant addresses its user, if set.
    #[serde(default)]
    pub user_name: Option<String>,
    /// Substituted for the calendar placeholder in the portal page.
    pub calendar_id: String,
    /// Optional MCP server definitions for external tools.
    pub mcp_config: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct VoiceConfig {
    pub enabled: bool,
    pub base_url: String,
    pub speaker: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    pub database_url: String,
    /// Root directory for uploads and media browsing tools.
    pub media_root: PathBuf,
    pub voice_dir: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct WidgetsConfig {
    pub news_feed_url: String,
    pub news_api_url: String,
    pub weather_api_url: String,
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct MonitorConfig {
    pub enabled: bool,
    pub thermal_path: PathBuf,
    pub interval_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct OfflineConfig {
    pub cache_name: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ResilienceConfig {
    pub rate_limit_enabled: bool,
    pub timeout_disabled: bool,
    pub requests_per_second: f32,
    pub burst_size: f32,
}

impl AppConfig {
    pub fn load() -> Result<Self, config::ConfigError> {
        Self::load_from_args(std::env::args())
    }

    /// Built-in defaults only, ignoring files, environment and arguments.
    pub fn defaults() -> Result<Self, config::ConfigError> {
        Self::default_builder()?.build()?.try_deserialize()
    }

    pub fn load_from_args<I, T>(args: I) -> Result<Self, config::ConfigError>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        let cli =
            Cli::try_parse_from(args).map_err(|e| config::ConfigError::Message(e.to_string()))?;

        let mut builder = Self::default_builder()?;

        // Explicit file wins over ./config.yaml
        if let Some(path) = &cli.config {
            builder = builder.add_source(File::with_name(path).required(true));
        } else if Path::new("config.yaml").exists() {
            builder = builder.add_source(File::with_name("config.yaml").required(false));
        }

        // PORTAL_SERVER__PORT=8000 style keys
        builder = builder.add_source(
            Environment::with_prefix("PORTAL")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        // Priority: CLI flag > CLI env var > PORTAL_ env > config file > defaults.
        if let Some(port) = cli.port {
            builder = builder.set_override("server.port", i64::from(port))?;
        }
        if let Some(host) = cli.host {
            builder = builder.set_override("server.host", host)?;
        }
        if let Some(rl) = cli.rate_limit_enabled {
            builder = builder.set_override("resilience.rate_limit_enabled", rl)?;
        }
        if let Some(td) = cli.timeout_disabled {
            builder = builder.set_override("resilience.timeout_disabled", td)?;
        }
        if let Some(off) = cli.voice_disabled {
            builder = builder.set_override("voice.enabled", !off)?;
        }

        // Legacy names used by existing deployments
        if let Ok(url) = env::var("VOICEVOX_URL") {
            builder = builder.set_override("voice.base_url", url)?;
        }
        if let Ok(file) = env::var("PERSONALITY_FILE") {
            builder = builder.set_override("assistant.personality_file", file)?;
        }
        if let Ok(id) = env::var("GOOGLE_CALENDAR_ID") {
            builder = builder.set_override("assistant.calendar_id", id)?;
        }

        let cfg = builder.build()?;
        cfg.try_deserialize()
    }

    fn default_builder() -> Result<ConfigBuilder<DefaultState>, config::ConfigError> {
        Config::builder()
            .set_default("server.port", 5000)?
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.static_dir", "static")?
            .set_default("assistant.default_model", "gemini-3-flash-preview")?
            .set_default(
                "assistant.models",
                vec!["gemini-3-flash-preview", "gemini-2.5-pro"],
            )?
            .set_default("assistant.personality_file", "personality.txt")?
            .set_default("assistant.calendar_id", "primary")?
            .set_default("assistant.mcp_config", "mcp.json")?
            .set_default("voice.enabled", true)?
            .set_default("voice.base_url", "http://127.0.0.1:50021")?
            .set_default("voice.speaker", 8)?
            .set_default("storage.database_url", "sqlite://chat_history.db")?
            .set_default("storage.media_root", "media")?
            .set_default("storage.voice_dir", "wav_files")?
            .set_default(
                "widgets.news_feed_url",
                "https://www3.nhk.or.jp/rss/news/cat0.xml",
            )?
            .set_default("widgets.news_api_url", "https://api.rss2json.com/v1/api.json")?
            .set_default(
                "widgets.weather_api_url",
                "https://api.open-meteo.com/v1/forecast",
            )?
            .set_default("widgets.latitude", 34.397)?
            .set_default("widgets.longitude", 132.475)?
            .set_default("monitor.enabled", true)?
            .set_default("monitor.thermal_path", "/sys/class/thermal/thermal_zone0/temp")?
            .set_default("monitor.interval_secs", 5)?
            .set_default("offline.cache_name", "lefte-cache-v5.5.1")?
            .set_default("resilience.rate_limit_enabled", false)?
            .set_default("resilience.timeout_disabled", false)?
            .set_default("resilience.requests_per_second", 5.0)?
            .set_default("resilience.burst_size", 10.0)
    }
}

pub fn load_llm_settings() -> Result<LlmSettings, String> {
    let base_url = std::env::var("LLM_BASE_URL")
        .map_err(|_| "Missing required env var: LLM_BASE_URL".to_string())?;
    if base_url.trim().is_empty() {
        return Err("LLM_BASE_URL cannot be empty".to_string());
    }

    let model = std::env::var("LLM_MODEL")
        .map_err(|_| "Missing required env var: LLM_MODEL".to_string())?;
    if model.trim().is_empty() {
        return Err("LLM_MODEL cannot be empty".to_string());
    }

    // GEMINI_API_KEY is what older .env files carry
    let api_key = std::env::var("LLM_API_KEY")
        .or_else(|_| std::env::var("GEMINI_API_KEY"))
        .ok()
        .filter(|s| !s.trim().is_empty());

    let provider = Provider::detect_from_url(&base_url);

    Ok(LlmSettings {
        base_url,
        api_key,
        model,
        provider,
    })
}
