//! Offline request interception backed by the local response cache.
//!
//! [`OfflineInterceptor`] wraps any [`Network`] and answers requests the way
//! an offline shell needs: API calls go to the network first and fall back
//! to a cached copy, while shell pages and scripts are served from the cache
//! whenever a copy exists.

use crate::db::CachedResponse;
use crate::error::Result;
use crate::http::{HttpRequest, HttpResponse, Method, Network, TransportError};
use crate::services::LocalStore;

/// Cache generation used when none is configured.
pub const DEFAULT_CACHE_GENERATION: &str = "offline-crm-v1";

/// Shell pages and scripts fetched by [`OfflineInterceptor::install`].
pub const DEFAULT_MANIFEST: &[&str] = &[
    "/offline/products/",
    "/offline/sales/",
    "/offline/expenses/",
    "/offline/status/",
    "/static/offline/idb.js",
    "/static/offline/sync.js",
    "/static/offline/app.js",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CachePolicy {
    NetworkFirst,
    CacheFirst,
}

/// Pick the caching policy for a request path.
pub fn classify(path: &str) -> CachePolicy {
    if path.starts_with("/api/") {
        CachePolicy::NetworkFirst
    } else {
        CachePolicy::CacheFirst
    }
}

pub struct OfflineInterceptor<N> {
    inner: N,
    store: LocalStore,
    generation: String,
    manifest: Vec<String>,
}

impl<N: Network> OfflineInterceptor<N> {
    pub fn new(inner: N, store: LocalStore) -> Self {
        Self {
            inner,
            store,
            generation: DEFAULT_CACHE_GENERATION.to_string(),
            manifest: DEFAULT_MANIFEST.iter().map(ToString::to_string).collect(),
        }
    }

    #[must_use]
    pub fn with_generation(mut self, generation: impl Into<String>) -> Self {
        self.generation = generation.into();
        self
    }

    #[must_use]
    pub fn with_manifest(mut self, manifest: Vec<String>) -> Self {
        self.manifest = manifest;
        self
    }

    pub fn generation(&self) -> &str {
        &self.generation
    }

    pub fn manifest(&self) -> &[String] {
        &self.manifest
    }

    pub const fn inner(&self) -> &N {
        &self.inner
    }

    /// Fetch every manifest entry into the current generation.
    ///
    /// Nothing is stored unless every entry succeeds.
    pub async fn install(&self) -> Result<usize> {
        let mut responses = Vec::with_capacity(self.manifest.len());
        for path in &self.manifest {
            let response = self
                .inner
                .send(&HttpRequest::get(path.as_str()))
                .await?
                .error_for_status()?;
            responses.push(CachedResponse {
                path: path.clone(),
                status: response.status,
                content_type: response.content_type,
                body: response.body,
            });
        }

        self.store
            .cache_store_all(&self.generation, &responses)
            .await?;
        tracing::info!(
            "Installed {} offline assets into cache '{}'",
            responses.len(),
            self.generation
        );
        Ok(responses.len())
    }

    /// Delete every cache generation except the current one.
    pub async fn activate(&self) -> Result<Vec<String>> {
        let dropped = self.store.cache_retain_only(&self.generation).await?;
        for generation in &dropped {
            tracing::info!("Deleted stale offline cache '{}'", generation);
        }
        Ok(dropped)
    }

    async fn cached(&self, request: &HttpRequest) -> Option<HttpResponse> {
        if request.method != Method::Get {
            return None;
        }
        match self.store.cache_lookup(&self.generation, &request.path).await {
            Ok(hit) => hit.map(|cached| HttpResponse {
                status: cached.status,
                content_type: cached.content_type,
                body: cached.body,
            }),
            Err(error) => {
                tracing::warn!("Offline cache lookup failed for {}: {}", request.path, error);
                None
            }
        }
    }
}

impl<N: Network> Network for OfflineInterceptor<N> {
    async fn send(&self, request: &HttpRequest) -> std::result::Result<HttpResponse, TransportError> {
        match classify(request.route()) {
            CachePolicy::NetworkFirst => match self.inner.send(request).await {
                Ok(response) => Ok(response),
                Err(error) => match self.cached(request).await {
                    Some(response) => {
                        tracing::debug!("Serving {} from offline cache", request.route());
                        Ok(response)
                    }
                    None => Err(error),
                },
            },
            CachePolicy::CacheFirst => match self.cached(request).await {
                Some(response) => Ok(response),
                None => self.inner.send(request).await,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    /// Serves fixed bodies per path and can be switched offline.
    #[derive(Default)]
    struct FakeOrigin {
        pages: HashMap<String, (u16, String)>,
        offline: AtomicBool,
        hits: Mutex<Vec<String>>,
    }

    impl FakeOrigin {
        fn with_page(mut self, path: &str, status: u16, body: &str) -> Self {
            self.pages.insert(path.to_string(), (status, body.to_string()));
            self
        }

        fn go_offline(&self) {
            self.offline.store(true, Ordering::SeqCst);
        }

        fn hits(&self) -> Vec<String> {
            self.hits.lock().unwrap().clone()
        }
    }

    impl Network for FakeOrigin {
        async fn send(
            &self,
            request: &HttpRequest,
        ) -> std::result::Result<HttpResponse, TransportError> {
            self.hits.lock().unwrap().push(request.path.clone());
            if self.offline.load(Ordering::SeqCst) {
                return Err(TransportError::Unreachable("connection refused".to_string()));
            }
            let (status, body) = self
                .pages
                .get(&request.path)
                .cloned()
                .unwrap_or((404, "missing".to_string()));
            Ok(HttpResponse {
                status,
                content_type: Some("text/html".to_string()),
                body: body.into_bytes(),
            })
        }
    }

    fn origin_with_manifest() -> FakeOrigin {
        DEFAULT_MANIFEST
            .iter()
            .fold(FakeOrigin::default(), |origin, path| {
                origin.with_page(path, 200, &format!("shell {path}"))
            })
    }

    #[test]
    fn api_paths_are_network_first() {
        assert_eq!(classify("/api/sync/pull"), CachePolicy::NetworkFirst);
        assert_eq!(classify("/offline/products/"), CachePolicy::CacheFirst);
        assert_eq!(classify("/apiary"), CachePolicy::CacheFirst);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn install_caches_manifest_and_serves_offline() {
        let store = LocalStore::open_in_memory().await.unwrap();
        let interceptor = OfflineInterceptor::new(origin_with_manifest(), store);

        assert_eq!(interceptor.install().await.unwrap(), DEFAULT_MANIFEST.len());
        interceptor.inner().go_offline();

        let response = interceptor
            .send(&HttpRequest::get("/offline/sales/"))
            .await
            .unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(response.body, b"shell /offline/sales/".to_vec());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn cache_first_skips_network_on_hit() {
        let store = LocalStore::open_in_memory().await.unwrap();
        let interceptor = OfflineInterceptor::new(origin_with_manifest(), store);
        interceptor.install().await.unwrap();
        let installed_hits = interceptor.inner().hits().len();

        interceptor
            .send(&HttpRequest::get("/static/offline/app.js"))
            .await
            .unwrap();
        assert_eq!(interceptor.inner().hits().len(), installed_hits);

        interceptor
            .send(&HttpRequest::get("/offline/other/"))
            .await
            .unwrap();
        assert_eq!(interceptor.inner().hits().len(), installed_hits + 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn install_is_all_or_nothing() {
        let store = LocalStore::open_in_memory().await.unwrap();
        let origin = FakeOrigin::default().with_page("/offline/products/", 200, "ok");
        let interceptor = OfflineInterceptor::new(origin, store.clone()).with_manifest(vec![
            "/offline/products/".to_string(),
            "/offline/missing/".to_string(),
        ]);

        let error = interceptor.install().await.unwrap_err();
        assert!(matches!(
            error,
            Error::Transport(TransportError::Status { status: 404, .. })
        ));
        assert!(store
            .cache_lookup(DEFAULT_CACHE_GENERATION, "/offline/products/")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn network_first_falls_back_to_cached_get() {
        let store = LocalStore::open_in_memory().await.unwrap();
        store
            .cache_store_all(
                DEFAULT_CACHE_GENERATION,
                &[CachedResponse {
                    path: "/api/products/".to_string(),
                    status: 200,
                    content_type: Some("application/json".to_string()),
                    body: b"[]".to_vec(),
                }],
            )
            .await
            .unwrap();
        let origin = FakeOrigin::default().with_page("/api/products/", 200, "[1]");
        let interceptor = OfflineInterceptor::new(origin, store);

        let online = interceptor
            .send(&HttpRequest::get("/api/products/"))
            .await
            .unwrap();
        assert_eq!(online.body, b"[1]".to_vec());

        interceptor.inner().go_offline();
        let offline = interceptor
            .send(&HttpRequest::get("/api/products/"))
            .await
            .unwrap();
        assert_eq!(offline.body, b"[]".to_vec());

        let uncached = interceptor
            .send(&HttpRequest::get("/api/sync/pull?since="))
            .await;
        assert!(matches!(uncached, Err(TransportError::Unreachable(_))));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn network_first_never_replays_posts() {
        let store = LocalStore::open_in_memory().await.unwrap();
        store
            .cache_store_all(
                DEFAULT_CACHE_GENERATION,
                &[CachedResponse {
                    path: "/api/sync/push".to_string(),
                    status: 200,
                    content_type: None,
                    body: b"{}".to_vec(),
                }],
            )
            .await
            .unwrap();
        let origin = FakeOrigin::default();
        origin.go_offline();
        let interceptor = OfflineInterceptor::new(origin, store);

        let request = HttpRequest::post_json("/api/sync/push", &serde_json::json!({})).unwrap();
        assert!(interceptor.send(&request).await.is_err());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn activate_drops_other_generations() {
        let store = LocalStore::open_in_memory().await.unwrap();
        let page = CachedResponse {
            path: "/offline/products/".to_string(),
            status: 200,
            content_type: None,
            body: b"old".to_vec(),
        };
        store
            .cache_store_all("offline-crm-v0", std::slice::from_ref(&page))
            .await
            .unwrap();
        store
            .cache_store_all(DEFAULT_CACHE_GENERATION, &[page])
            .await
            .unwrap();

        let interceptor = OfflineInterceptor::new(FakeOrigin::default(), store.clone());
        assert_eq!(
            interceptor.activate().await.unwrap(),
            vec!["offline-crm-v0".to_string()]
        );
        assert!(store
            .cache_lookup("offline-crm-v0", "/offline/products/")
            .await
            .unwrap()
            .is_none());
        assert!(interceptor.activate().await.unwrap().is_empty());
    }
}
