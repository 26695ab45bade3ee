//! In-process model of the browser's named caches.

use std::collections::{BTreeMap, HashMap};

use axum::http::Method;

use super::policy::{ServiceWorkerPolicy, Strategy};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Served {
    FromCache(Vec<u8>),
    Network,
}

/// Cache name to (URL to cached body).
#[derive(Debug, Default)]
pub struct OfflineCache {
    caches: BTreeMap<String, HashMap<String, Vec<u8>>>,
}

/// Path component of an absolute or site-relative URL.
fn path_of(url: &str) -> String {
    match url::Url::parse(url) {
        Ok(parsed) => parsed.path().to_string(),
        Err(_) => url.split(['?', '#']).next().unwrap_or_default().to_string(),
    }
}

impl OfflineCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn keys(&self) -> Vec<&str> {
        self.caches.keys().map(String::as_str).collect()
    }

    pub fn contains(&self, cache_name: &str, url: &str) -> bool {
        self.caches.get(cache_name).is_some_and(|c| c.contains_key(url))
    }

    /// Store a response in a named cache, creating it if needed.
    pub fn put(&mut self, cache_name: &str, url: &str, body: Vec<u8>) {
        self.caches
            .entry(cache_name.to_string())
            .or_default()
            .insert(url.to_string(), body);
    }

    /// Fill the current cache with every precache URL. Any failed fetch fails
    /// the whole install and leaves the cache untouched, like `cache.addAll`.
    pub fn install<F, E>(&mut self, policy: &ServiceWorkerPolicy, mut fetch: F) -> Result<(), E>
    where
        F: FnMut(&str) -> Result<Vec<u8>, E>,
    {
        let mut fetched = HashMap::with_capacity(policy.precache_urls.len());
        for url in &policy.precache_urls {
            fetched.insert(url.clone(), fetch(url)?);
        }
        self.caches
            .entry(policy.cache_name.clone())
            .or_default()
            .extend(fetched);
        Ok(())
    }

    /// Cache lookups search every cache, as `caches.match` does.
    pub fn fetch(&self, policy: &ServiceWorkerPolicy, method: &Method, url: &str) -> Served {
        if policy.strategy(method, &path_of(url)) == Strategy::Network {
            return Served::Network;
        }
        self.caches
            .values()
            .find_map(|c| c.get(url))
            .map_or(Served::Network, |body| Served::FromCache(body.clone()))
    }

    /// Drop every cache but the current one and return the deleted names.
    pub fn activate(&mut self, policy: &ServiceWorkerPolicy) -> Vec<String> {
        let stale = policy.stale_caches(self.caches.keys().map(String::as_str));
        for name in &stale {
            self.caches.remove(name);
        }
        stale
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn installed(policy: &ServiceWorkerPolicy) -> OfflineCache {
        let mut cache = OfflineCache::new();
        cache
            .install(policy, |url| Ok::<_, ()>(url.as_bytes().to_vec()))
            .unwrap();
        cache
    }

    #[test]
    fn test_install_populates_current_cache() {
        let policy = ServiceWorkerPolicy::default();
        let cache = installed(&policy);
        for url in &policy.precache_urls {
            assert!(cache.contains(&policy.cache_name, url));
        }
    }

    #[test]
    fn test_install_failure_is_atomic() {
        let policy = ServiceWorkerPolicy::default();
        let mut cache = OfflineCache::new();
        let result = cache.install(&policy, |url| {
            if url.ends_with(".css") { Err("offline") } else { Ok(Vec::new()) }
        });
        assert_eq!(result, Err("offline"));
        assert!(cache.keys().is_empty());
    }

    #[test]
    fn test_never_serves_cached_post_or_bypassed_paths() {
        let policy = ServiceWorkerPolicy::default();
        let mut cache = installed(&policy);
        cache.put(&policy.cache_name, "/history", b"[]".to_vec());
        cache.put(&policy.cache_name, "/socket.io/?EIO=4", b"x".to_vec());
        cache.put(&policy.cache_name, "http://portal.local/history", b"[]".to_vec());

        assert_eq!(cache.fetch(&policy, &Method::POST, "/"), Served::Network);
        assert_eq!(cache.fetch(&policy, &Method::GET, "/history"), Served::Network);
        assert_eq!(cache.fetch(&policy, &Method::GET, "/socket.io/?EIO=4"), Served::Network);
        assert_eq!(
            cache.fetch(&policy, &Method::GET, "http://portal.local/history"),
            Served::Network
        );
        assert_eq!(cache.fetch(&policy, &Method::GET, "/"), Served::FromCache(b"/".to_vec()));
        assert_eq!(cache.fetch(&policy, &Method::GET, "/not-cached"), Served::Network);
    }

    #[test]
    fn test_activate_keeps_only_current_cache() {
        let old = ServiceWorkerPolicy::with_cache_name("lefte-cache-v5.4.0");
        let older = ServiceWorkerPolicy::with_cache_name("lefte-cache-v5.0.0");
        let current = ServiceWorkerPolicy::default();

        let mut cache = installed(&older);
        cache.install(&old, |_| Ok::<_, ()>(Vec::new())).unwrap();
        cache.install(&current, |_| Ok::<_, ()>(Vec::new())).unwrap();

        let mut deleted = cache.activate(&current);
        deleted.sort();
        assert_eq!(deleted, vec!["lefte-cache-v5.0.0", "lefte-cache-v5.4.0"]);
        assert_eq!(cache.keys(), vec![current.cache_name.as_str()]);
    }
}
