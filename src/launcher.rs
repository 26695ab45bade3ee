//! App launcher: shortcut catalog, launch signals and local program start.
//!
//! Desktop apps are opened through the `lefte-launch://` protocol handler on
//! the client machine. The assistant asks for a launch by emitting
//! [`LAUNCH_MARKER`] followed by such a URL.

use std::path::Path;
use std::str::FromStr;

use axum::{
    Json,
    extract::{Query, State},
};
use serde::{Deserialize, Serialize};

use crate::AppState;

/// Prefix of a launch request inside assistant text or tool output.
pub const LAUNCH_MARKER: &str = "🚀LAUNCH_SIGNAL:";

/// URL scheme handled by the desktop launcher.
pub const LAUNCH_SCHEME: &str = "lefte-launch://";

/// `🚀LAUNCH_SIGNAL:lefte-launch://<name>`
pub fn launch_signal(app_name: &str) -> String {
    format!("{LAUNCH_MARKER}{LAUNCH_SCHEME}{app_name}")
}

/// Text after the marker, trimmed. `None` without a marker or with nothing after it.
pub fn extract_launch_url(text: &str) -> Option<String> {
    let (_, rest) = text.split_once(LAUNCH_MARKER)?;
    let rest = rest.trim();
    (!rest.is_empty()).then(|| rest.to_string())
}

/// Visible text with any launch signal cut off.
pub fn strip_launch_signal(text: &str) -> &str {
    match text.split_once(LAUNCH_MARKER) {
        Some((before, _)) => before.trim(),
        None => text,
    }
}

/// Decode the target of a `lefte-launch://` URL: scheme and trailing `/`
/// removed, percent escapes decoded.
pub fn parse_launch_url(url: &str) -> Option<String> {
    let target = url.trim().strip_prefix(LAUNCH_SCHEME)?.trim_end_matches('/');
    if target.is_empty() {
        return None;
    }
    // form_urlencoded treats '+' as a space; launch targets keep it literal.
    let escaped = target.replace('+', "%2B");
    let decoded: String = url::form_urlencoded::parse(format!("t={escaped}").as_bytes())
        .map(|(_, v)| v.into_owned())
        .next()?;
    Some(decoded)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Media,
    Work,
    Sns,
    Game,
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "media" => Ok(Self::Media),
            "work" => Ok(Self::Work),
            "sns" => Ok(Self::Sns),
            "game" => Ok(Self::Game),
            other => Err(format!("unknown category: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShortcutKind {
    Web,
    App,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shortcut {
    pub name: String,
    pub url: String,
    pub icon: String,
    pub category: Category,
    #[serde(rename = "type")]
    pub kind: ShortcutKind,
}

impl Shortcut {
    fn web(name: &str, url: &str, icon: &str, category: Category) -> Self {
        Self {
            name: name.to_string(),
            url: url.to_string(),
            icon: icon.to_string(),
            category,
            kind: ShortcutKind::Web,
        }
    }

    /// Link target for the launcher card.
    pub fn href(&self) -> String {
        match self.kind {
            ShortcutKind::App => format!("{LAUNCH_SCHEME}{}", self.url),
            ShortcutKind::Web => self.url.clone(),
        }
    }
}

/// Shortcuts shown in the launcher grid.
#[derive(Debug, Clone)]
pub struct ShortcutCatalog {
    shortcuts: Vec<Shortcut>,
}

impl Default for ShortcutCatalog {
    fn default() -> Self {
        Self {
            shortcuts: vec![
                Shortcut::web("YouTube", "https://www.youtube.com", "📺", Category::Media),
                Shortcut::web("GitHub", "https://github.com", "🐙", Category::Work),
                Shortcut::web("Twitter", "https://twitter.com", "🐦", Category::Sns),
                Shortcut::web("Gmail", "https://mail.google.com", "📧", Category::Work),
                Shortcut::web("Netflix", "https://www.netflix.com", "🎬", Category::Media),
                Shortcut {
                    name: "ZZZ".to_string(),
                    url: "ZZZ".to_string(),
                    icon: "⚔️".to_string(),
                    category: Category::Game,
                    kind: ShortcutKind::App,
                },
            ],
        }
    }
}

impl ShortcutCatalog {
    /// `None` means every category.
    pub fn filter(&self, category: Option<Category>) -> Vec<&Shortcut> {
        self.shortcuts
            .iter()
            .filter(|s| category.is_none_or(|c| s.category == c))
            .collect()
    }
}

/// Parse a launcher tab name; `all` and empty select everything.
pub fn parse_category_filter(raw: Option<&str>) -> Result<Option<Category>, String> {
    match raw.map(str::trim) {
        None | Some("" | "all") => Ok(None),
        Some(other) => other.parse().map(Some),
    }
}

/// Start a local program without waiting for it to exit.
pub fn launch_program(path: &str) -> std::io::Result<u32> {
    let path = path.trim();
    if path.is_empty() {
        return Err(std::io::Error::new(std::io::ErrorKind::InvalidInput, "empty path"));
    }
    if !Path::new(path).exists() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("{path} が見つかりません"),
        ));
    }

    let mut child = tokio::process::Command::new(path)
        .stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .spawn()?;
    let pid = child.id().unwrap_or_default();

    tokio::spawn(async move {
        if let Err(e) = child.wait().await {
            tracing::warn!(name: "launcher.wait_failed", error = %e, "Launched program wait failed");
        }
    });
    Ok(pid)
}

// ─────────────────────────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ShortcutQuery {
    #[serde(default)]
    pub category: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ShortcutDto {
    #[serde(flatten)]
    pub shortcut: Shortcut,
    pub href: String,
}

/// GET /api/shortcuts?category=
pub async fn list_shortcuts(
    State(state): State<AppState>,
    Query(query): Query<ShortcutQuery>,
) -> Result<Json<Vec<ShortcutDto>>, crate::error::PortalError> {
    let category = parse_category_filter(query.category.as_deref())
        .map_err(crate::error::PortalError::BadRequest)?;
    let items = state
        .shortcuts
        .filter(category)
        .into_iter()
        .map(|s| ShortcutDto {
            href: s.href(),
            shortcut: s.clone(),
        })
        .collect();
    Ok(Json(items))
}

#[derive(Debug, Deserialize)]
pub struct LaunchRequest {
    pub path: String,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct LaunchResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// POST /launch_app
///
/// `path` is either an executable path or a `lefte-launch://` URL naming a
/// registered app.
pub async fn launch_app(
    State(state): State<AppState>,
    Json(req): Json<LaunchRequest>,
) -> Json<LaunchResponse> {
    let path = match parse_launch_url(&req.path) {
        Some(name) => match state.store.find_app(&name).await {
            Ok(Some(app)) => app.exe_path,
            Ok(None) => {
                return Json(LaunchResponse {
                    success: false,
                    error: Some(format!("『{name}』は未登録です")),
                });
            }
            Err(e) => {
                tracing::error!(name: "launcher.lookup_failed", error = %e, "App lookup failed");
                return Json(LaunchResponse {
                    success: false,
                    error: Some(e.to_string()),
                });
            }
        },
        None => req.path,
    };

    match launch_program(&path) {
        Ok(pid) => {
            tracing::info!(name: "launcher.started", path = %path, pid, "Program launched");
            Json(LaunchResponse {
                success: true,
                error: None,
            })
        }
        Err(e) => {
            tracing::warn!(name: "launcher.failed", path = %path, error = %e, "Program launch failed");
            Json(LaunchResponse {
                success: false,
                error: Some(e.to_string()),
            })
        }
    }
}
