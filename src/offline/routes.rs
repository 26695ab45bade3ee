use axum::{
    extract::{Request, State},
    http::{HeaderValue, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde_json::json;

use crate::AppState;

use super::policy::{APP_ICON, Strategy};

/// GET /service-worker.js
pub async fn service_worker(State(state): State<AppState>) -> impl IntoResponse {
    (
        [
            (header::CONTENT_TYPE, "application/javascript; charset=utf-8"),
            // The browser must see a new cache name as soon as it ships
            (header::CACHE_CONTROL, "no-cache"),
        ],
        state.offline.render_script(),
    )
}

pub fn manifest_json() -> serde_json::Value {
    json!({
        "name": "L.E.F.T.E. Desktop Portal",
        "short_name": "L.E.F.T.E.",
        "start_url": "/",
        "display": "standalone",
        "background_color": "#0b0f1a",
        "theme_color": "#0b0f1a",
        "icons": [
            { "src": APP_ICON, "sizes": "512x512", "type": "image/png", "purpose": "any maskable" }
        ]
    })
}

/// GET /manifest.json
pub async fn manifest() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "application/manifest+json")],
        manifest_json().to_string(),
    )
}

/// Marks responses the worker must never cache.
pub async fn no_store_middleware(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Response {
    let strategy = state.offline.strategy(req.method(), req.uri().path());
    let mut response = next.run(req).await;
    if strategy == Strategy::Network {
        response
            .headers_mut()
            .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manifest_fields() {
        let m = manifest_json();
        assert_eq!(m["start_url"], "/");
        assert_eq!(m["display"], "standalone");
        assert_eq!(m["icons"][0]["src"], APP_ICON);
    }
}
