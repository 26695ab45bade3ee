//! L.E.F.T.E. desktop portal
//!
//! A single-page personal dashboard: chat with an LLM assistant (tools, voice,
//! app launch signals), widgets, an app launcher and an offline-capable PWA
//! shell.
//!
//! # Architecture
//!
//! - **Server**: Axum HTTP server with a WebSocket relay at `/ws`
//! - **Assistant**: OpenAI-compatible chat completions driver with a tool loop
//! - **Tools**: native notes/apps/media tools plus optional MCP servers
//! - **UI**: server-rendered page shell and transcript, browser script for the rest
//!
//! # Modules
//!
//! - [`relay`]: event protocol, broadcast hub and the chat pipeline
//! - [`llm`]: driver trait, chat completions driver, orchestrator
//! - [`tools`]: tool registry and the assistant's native tools
//! - [`storage`]: SQLite chat history, notes and app registry
//! - [`offline`]: service worker policy and script
//! - [`widgets`]: news, weather and system monitor

// Allow pedantic clippy warnings that don't add value for this codebase
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::missing_fields_in_debug)]
#![allow(clippy::implicit_hasher)]
#![allow(clippy::match_same_arms)]
#![allow(clippy::unused_async)]

pub mod config;
pub mod error;
pub mod launcher;
pub mod llm;
pub mod normalized;
pub mod offline;
pub mod relay;
pub mod resilience;
pub mod server;
pub mod storage;
pub mod telemetry;
pub mod tools;
pub mod ui;
pub mod uploads;
pub mod voice;
pub mod widgets;

use std::sync::Arc;

use crate::config::AppConfig;
use crate::launcher::ShortcutCatalog;
use crate::llm::Orchestrator;
use crate::offline::ServiceWorkerPolicy;
use crate::relay::{ChatService, RelayHub};
use crate::resilience::TokenBucket;
use crate::storage::ChatStore;
use crate::tools::media::MediaRoot;
use crate::voice::VoicevoxClient;
use crate::widgets::{NewsService, WeatherService};

/// Application state shared across all handlers.
#[derive(Debug, Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub store: ChatStore,
    /// Broadcast hub for every open socket.
    pub relay: RelayHub,
    pub chat: Arc<ChatService>,
    /// Uploads and media tools live under this root.
    pub media: MediaRoot,
    pub news: Arc<NewsService>,
    pub weather: Arc<WeatherService>,
    pub offline: Arc<ServiceWorkerPolicy>,
    pub shortcuts: Arc<ShortcutCatalog>,
    pub rate_limiter: Arc<TokenBucket>,
}

impl AppState {
    pub fn new(
        config: Arc<AppConfig>,
        store: ChatStore,
        orchestrator: Orchestrator,
        voice: Option<VoicevoxClient>,
    ) -> Self {
        let relay = RelayHub::new();
        let media = MediaRoot::new(config.storage.media_root.clone());
        let chat = Arc::new(ChatService::new(
            store.clone(),
            relay.clone(),
            orchestrator,
            voice,
            media.clone(),
            config.assistant.clone(),
        ));

        Self {
            store,
            relay,
            chat,
            media,
            news: Arc::new(NewsService::new(&config.widgets)),
            weather: Arc::new(WeatherService::new(&config.widgets)),
            offline: Arc::new(ServiceWorkerPolicy::from_config(&config.offline)),
            shortcuts: Arc::new(ShortcutCatalog::default()),
            rate_limiter: Arc::new(TokenBucket::from_config(&config.resilience)),
            config,
        }
    }
}
