use std::sync::Arc;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::AppState;
use crate::config::AppConfig;
use crate::llm::{LlmSettings, Orchestrator};
use crate::storage::ChatStore;
use crate::tools::ToolRegistry;
use crate::tools::mcp::McpTools;
use crate::voice::VoicevoxClient;
use crate::{launcher, offline, relay, resilience, ui, uploads, widgets};

pub const BODY_LIMIT: usize = 10 * 1024 * 1024;

/// Every route and layer, ready to serve.
pub fn build_router(state: AppState) -> Router {
    let static_dir = state.config.server.static_dir.clone();
    let uploads_dir = state.media.uploads_dir();
    let voice_dir = state.config.storage.voice_dir.clone();

    Router::new()
        // Page
        .route("/", get(ui::page::index))
        .route("/history", get(ui::page::history))
        // Relay
        .route("/ws", get(relay::socket::ws_handler))
        .route("/api/chat", post(relay::form::api_chat))
        // Uploads
        .route("/upload_to_hdd", post(uploads::upload_to_hdd))
        .route("/upload_photo", post(uploads::upload_photo))
        // Launcher
        .route("/launch_app", post(launcher::launch_app))
        .route("/api/shortcuts", get(launcher::list_shortcuts))
        // Widgets
        .route("/get_news", get(widgets::news::get_news))
        .route("/api/weather", get(widgets::weather::get_weather))
        // PWA
        .route("/service-worker.js", get(offline::service_worker))
        .route("/manifest.json", get(offline::manifest))
        // Files
        .nest_service("/static", ServeDir::new(static_dir))
        .nest_service("/uploads", ServeDir::new(uploads_dir))
        .nest_service("/wav_files", ServeDir::new(voice_dir))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            offline::no_store_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .layer(DefaultBodyLimit::max(BODY_LIMIT))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            resilience::timeout_middleware,
        ))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            resilience::rate_limit_middleware,
        ))
        .with_state(state)
}

/// Connect storage and tools, start the monitor, and serve until shutdown.
pub async fn start_server(config: Arc<AppConfig>, settings: LlmSettings) -> anyhow::Result<()> {
    info!(
        name: "llm.config.loaded",
        base_url = %settings.base_url,
        model = %settings.model,
        "LLM configuration loaded"
    );

    tokio::fs::create_dir_all(config.storage.media_root.join("uploads")).await?;
    tokio::fs::create_dir_all(&config.storage.voice_dir).await?;

    let store = ChatStore::connect(&config.storage.database_url).await?;

    let mut tools = ToolRegistry::assistant_tools(&store, config.storage.media_root.clone());
    match McpTools::load_from_file(&config.assistant.mcp_config).await {
        Ok(Some(mcp)) => {
            for name in mcp.names() {
                info!(name: "mcp.tool.discovered", tool = %name, "MCP tool discovered");
            }
            tools = tools.with_mcp(mcp);
        }
        Ok(None) => {}
        // External tools are optional; the assistant still runs without them
        Err(e) => tracing::error!(name: "mcp.load_failed", error = %format!("{e:#}"), "Failed to load MCP servers"),
    }

    let orchestrator = Orchestrator::new(settings, Arc::new(tools));
    info!(name: "tools.ready", tools = ?orchestrator.tools().names(), "Assistant tools ready");
    let voice = config
        .voice
        .enabled
        .then(|| VoicevoxClient::new(&config.voice, config.storage.voice_dir.clone()));

    let state = AppState::new(Arc::clone(&config), store, orchestrator, voice);

    let monitor = config
        .monitor
        .enabled
        .then(|| widgets::spawn_monitor(state.relay.clone(), &config.monitor));

    let app = build_router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!(
        name: "server.started",
        address = %addr,
        "Server started"
    );

    let served = axum::serve(listener, app.into_make_service()).await;
    if let Some(handle) = monitor {
        handle.abort();
    }
    served?;
    Ok(())
}
