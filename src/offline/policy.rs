use axum::http::Method;
use serde::Serialize;

use crate::config::OfflineConfig;

pub const DEFAULT_CACHE_NAME: &str = "lefte-cache-v5.5.1";
pub const MARKED_CDN: &str = "https://cdn.jsdelivr.net/npm/marked/marked.min.js";
pub const APP_ICON: &str = "https://cdn-icons-png.flaticon.com/512/1698/1698535.png";

/// How the worker answers a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Straight to the network, never cached.
    Network,
    /// Cached copy if present, network otherwise.
    CacheFirst,
}

#[derive(Debug, Clone, Serialize)]
pub struct ServiceWorkerPolicy {
    pub cache_name: String,
    pub precache_urls: Vec<String>,
    pub bypass_prefixes: Vec<String>,
}

impl Default for ServiceWorkerPolicy {
    fn default() -> Self {
        Self::with_cache_name(DEFAULT_CACHE_NAME)
    }
}

impl ServiceWorkerPolicy {
    pub fn with_cache_name(cache_name: impl Into<String>) -> Self {
        Self {
            cache_name: cache_name.into(),
            precache_urls: [
                "/",
                "/manifest.json",
                "/static/desktpo.css",
                "/static/desktpo.js",
                MARKED_CDN,
                APP_ICON,
            ]
            .map(String::from)
            .to_vec(),
            bypass_prefixes: ["/socket.io", "/history", "/ws"].map(String::from).to_vec(),
        }
    }

    pub fn from_config(config: &OfflineConfig) -> Self {
        Self::with_cache_name(config.cache_name.clone())
    }

    pub fn bypasses(&self, path: &str) -> bool {
        self.bypass_prefixes.iter().any(|p| path.starts_with(p.as_str()))
    }

    pub fn strategy(&self, method: &Method, path: &str) -> Strategy {
        if method != Method::GET || self.bypasses(path) {
            Strategy::Network
        } else {
            Strategy::CacheFirst
        }
    }

    /// Cache keys that `activate` deletes.
    pub fn stale_caches<'a>(&self, keys: impl IntoIterator<Item = &'a str>) -> Vec<String> {
        keys.into_iter()
            .filter(|k| *k != self.cache_name)
            .map(String::from)
            .collect()
    }

    /// The worker script with this policy's constants embedded.
    pub fn render_script(&self) -> String {
        SCRIPT_TEMPLATE
            .replace("__CACHE_NAME__", &js_literal(&self.cache_name))
            .replace("__PRECACHE_URLS__", &js_literal(&self.precache_urls))
            .replace("__BYPASS_PREFIXES__", &js_literal(&self.bypass_prefixes))
    }
}

fn js_literal<T: Serialize + ?Sized>(value: &T) -> String {
    // Strings and string lists always serialize
    serde_json::to_string(value).unwrap_or_else(|_| "null".to_string())
}

const SCRIPT_TEMPLATE: &str = r"const CACHE_NAME = __CACHE_NAME__;
const urlsToCache = __PRECACHE_URLS__;
const bypassPrefixes = __BYPASS_PREFIXES__;

self.addEventListener('install', event => {
  event.waitUntil(
    caches.open(CACHE_NAME).then(cache => cache.addAll(urlsToCache))
  );
});

self.addEventListener('fetch', event => {
  const url = new URL(event.request.url);
  if (
    event.request.method !== 'GET' ||
    bypassPrefixes.some(prefix => url.pathname.startsWith(prefix))
  ) {
    return;
  }
  event.respondWith(
    caches.match(event.request).then(response => response || fetch(event.request))
  );
});

self.addEventListener('activate', event => {
  event.waitUntil(
    caches.keys().then(names =>
      Promise.all(names.filter(name => name !== CACHE_NAME).map(name => caches.delete(name)))
    )
  );
});
";
