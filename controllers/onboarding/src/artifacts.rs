//! OS artifact resolution
//!
//! The artifact service curates OS images and overlay (installer) scripts.
//! [`ArtifactResolver`] asks it where the artifacts for an OS live;
//! [`CachedResolver`] keeps answers for a TTL so periodic reconciles do not hit
//! the service every time.

use crate::error::ProvisioningError;
use serde::Deserialize;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Where the artifacts of one OS live
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Artifacts {
    pub os_url: String,
    #[serde(alias = "overlayscript_url")]
    pub overlay_script_url: String,
}

#[async_trait::async_trait]
pub trait ArtifactResolver: Send + Sync {
    /// Resolve the artifacts of OS profile `name` on `arch`
    async fn resolve(&self, name: &str, arch: &str) -> Result<Artifacts, ProvisioningError>;
}

/// Artifact service over HTTP
#[derive(Debug, Clone)]
pub struct HttpArtifactResolver {
    client: reqwest::Client,
    base_url: String,
}

impl HttpArtifactResolver {
    pub fn new(base_url: String, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait::async_trait]
impl ArtifactResolver for HttpArtifactResolver {
    async fn resolve(&self, name: &str, arch: &str) -> Result<Artifacts, ProvisioningError> {
        let url = format!("{}/api/v1/artifacts", self.base_url);
        debug!("Resolving artifacts for OS {} ({}) at {}", name, arch, url);

        let response = self
            .client
            .get(&url)
            .query(&[("profile", name), ("platform", arch)])
            .send()
            .await
            .map_err(|e| ProvisioningError::Artifact(format!("request to {url} failed: {e}")))?;
        let status = response.status();
        if !status.is_success() {
            return Err(ProvisioningError::Artifact(format!(
                "artifact service returned {status} for OS {name}"
            )));
        }
        let artifacts: Artifacts = response
            .json()
            .await
            .map_err(|e| ProvisioningError::Artifact(format!("invalid artifact response for OS {name}: {e}")))?;
        if artifacts.os_url.is_empty() || artifacts.overlay_script_url.is_empty() {
            return Err(ProvisioningError::Artifact(format!(
                "artifact service returned empty URLs for OS {name}"
            )));
        }
        Ok(artifacts)
    }
}

/// Map whose entries expire `ttl` after insertion
#[derive(Debug)]
pub struct TtlCache<K, V> {
    ttl: Duration,
    entries: Mutex<HashMap<K, (Instant, V)>>,
}

impl<K: Eq + Hash, V: Clone> TtlCache<K, V> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn get(&self, key: &K) -> Option<V> {
        let mut entries = self.entries.lock().ok()?;
        match entries.get(key) {
            Some((inserted, value)) if inserted.elapsed() < self.ttl => Some(value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    pub fn insert(&self, key: K, value: V) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(key, (Instant::now(), value));
        }
    }
}

/// Resolver answering from a [`TtlCache`] before asking the wrapped one
pub struct CachedResolver {
    inner: Arc<dyn ArtifactResolver>,
    cache: TtlCache<(String, String), Artifacts>,
}

impl std::fmt::Debug for CachedResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachedResolver")
            .field("ttl", &self.cache.ttl)
            .finish_non_exhaustive()
    }
}

impl CachedResolver {
    pub fn new(inner: Arc<dyn ArtifactResolver>, ttl: Duration) -> Self {
        Self {
            inner,
            cache: TtlCache::new(ttl),
        }
    }
}

#[async_trait::async_trait]
impl ArtifactResolver for CachedResolver {
    async fn resolve(&self, name: &str, arch: &str) -> Result<Artifacts, ProvisioningError> {
        let key = (name.to_string(), arch.to_string());
        if let Some(artifacts) = self.cache.get(&key) {
            return Ok(artifacts);
        }
        let artifacts = self.inner.resolve(name, arch).await?;
        self.cache.insert(key, artifacts.clone());
        Ok(artifacts)
    }
}


#[cfg(test)]
mod tests {
    use super::mock::MockArtifactResolver;
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_cached_resolver_skips_network_within_ttl() {
        let inner = MockArtifactResolver::new();
        inner.add("ubuntu", "http://os", "http://overlay");
        let resolver = CachedResolver::new(Arc::new(inner.clone()), Duration::from_secs(60));

        let first = resolver.resolve("ubuntu", "x86_64").await.unwrap();
        let second = resolver.resolve("ubuntu", "x86_64").await.unwrap();
        assert_eq!(first, second);
        assert_eq!(inner.calls().len(), 1);

        tokio::time::advance(Duration::from_secs(61)).await;
        resolver.resolve("ubuntu", "x86_64").await.unwrap();
        assert_eq!(inner.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_cached_resolver_does_not_cache_errors() {
        let inner = MockArtifactResolver::new();
        let resolver = CachedResolver::new(Arc::new(inner.clone()), Duration::from_secs(60));

        assert!(resolver.resolve("missing", "x86_64").await.is_err());
        assert!(resolver.resolve("missing", "x86_64").await.is_err());
        assert_eq!(inner.calls().len(), 2);
    }

    #[test]
    fn test_artifacts_accept_service_field_names() {
        let artifacts: Artifacts = serde_json::from_value(serde_json::json!({
            "os_url": "http://os",
            "overlayscript_url": "http://overlay"
        }))
        .unwrap();
        assert_eq!(artifacts.overlay_script_url, "http://overlay");
    }
}
