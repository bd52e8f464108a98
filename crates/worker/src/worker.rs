//! The offline cache manager.
//!
//! Owns one named cache instance per deployment version: precaches the
//! application shell on install, answers fetch events cache-first, and
//! prunes superseded instances on activate.

use std::collections::BTreeMap;
use std::sync::Arc;

use bytes::Bytes;
use offshell_client::{FetchResponse, ShellFetcher, resolve_asset};
use offshell_core::{AppConfig, CacheDb, Error, StoredResponse};
use tokio::sync::Mutex;
use tokio::task::JoinSet;

use crate::lifecycle::{LifecycleEvent, ShellRequest, WorkerState};

/// Where a served response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
    Cache,
    Network,
}

/// Response handed back to the host for delivery to the requester.
#[derive(Debug, Clone)]
pub struct ShellResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Bytes,
    pub source: ResponseSource,
}

/// One worker instance.
///
/// The store handle is passed in rather than reached for globally, so
/// every handler operates on an explicit collaborator. Fetch events may
/// interleave freely; install and activate are serialized by the host and
/// gated by the state machine.
pub struct Worker {
    config: AppConfig,
    store: CacheDb,
    fetcher: Arc<dyn ShellFetcher>,
    state: Mutex<WorkerState>,
}

impl Worker {
    pub fn new(config: AppConfig, store: CacheDb, fetcher: Arc<dyn ShellFetcher>) -> Self {
        Self { config, store, fetcher, state: Mutex::new(WorkerState::Installing) }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub async fn state(&self) -> WorkerState {
        *self.state.lock().await
    }

    /// Route one host-delivered event to its handler.
    ///
    /// Only fetch events produce a response; install and activate are
    /// awaited for their side effects.
    pub async fn handle_event(&self, event: LifecycleEvent) -> Result<Option<ShellResponse>, Error> {
        match event {
            LifecycleEvent::Install => self.install().await.map(|()| None),
            LifecycleEvent::Fetch(request) => self.handle_fetch(&request).await.map(Some),
            LifecycleEvent::Activate => self.activate().await.map(|()| None),
        }
    }

    /// Precache the configured asset list into the current cache instance.
    ///
    /// All-or-nothing: the first unfetchable or non-success asset aborts
    /// the attempt and the worker stays in `Installing` for the host to
    /// retry. Entries already stored are left in place; the upsert on the
    /// next attempt converges them.
    pub async fn install(&self) -> Result<(), Error> {
        self.expect_state(WorkerState::Installing, "install").await?;

        let name = self.config.cache_name();
        let instance = self.store.open_instance(&name).await?;

        for path in &self.config.precache_paths {
            let url = resolve_asset(&self.config.origin, path).map_err(|e| Error::InvalidUrl(e.to_string()))?;
            let response = self
                .fetcher
                .fetch("GET", &url)
                .await
                .map_err(|e| Error::Precache(format!("{path}: {e}")))?;

            if !response.status.is_success() {
                return Err(Error::Precache(format!("{path}: status {}", response.status.as_u16())));
            }

            instance.put(&stored_response("GET", &response)).await?;
            tracing::debug!(path = %path, bytes = response.bytes.len(), "precached asset");
        }

        tracing::info!(
            cache = %name,
            assets = self.config.precache_paths.len(),
            "install complete"
        );

        self.set_state(WorkerState::Waiting).await;
        Ok(())
    }

    /// Serve a fetch event cache-first.
    ///
    /// A hit returns the stored response unchanged, with no freshness
    /// check and no network race. A miss forwards to the network exactly
    /// once and returns the result uncached, whatever its status; only the
    /// precache list is durable offline content.
    pub async fn handle_fetch(&self, request: &ShellRequest) -> Result<ShellResponse, Error> {
        let instance = self.store.open_instance(&self.config.cache_name()).await?;

        if let Some(stored) = instance.get(&request.method, request.url.as_str()).await? {
            tracing::debug!(url = %request.url, "cache hit");
            return Ok(ShellResponse {
                status: stored.status,
                content_type: stored.content_type,
                body: Bytes::from(stored.body),
                source: ResponseSource::Cache,
            });
        }

        tracing::debug!(url = %request.url, "cache miss, forwarding to network");
        let response = self.fetcher.fetch(&request.method, &request.url).await?;

        Ok(ShellResponse {
            status: response.status.as_u16(),
            content_type: response.content_type.clone(),
            body: response.bytes.clone(),
            source: ResponseSource::Network,
        })
    }

    /// Delete every cache instance whose name is not the current one.
    ///
    /// Deletions run as independent tasks with no ordering between them;
    /// activation completes once all of them have settled. A failed
    /// deletion is logged and does not fail activation.
    pub async fn activate(&self) -> Result<(), Error> {
        self.expect_state(WorkerState::Waiting, "activate").await?;
        self.set_state(WorkerState::Activating).await;

        let keep = self.config.cache_name();
        let names = self.store.list_instances().await?;

        let mut deletions = JoinSet::new();
        for name in names.into_iter().filter(|name| *name != keep) {
            let store = self.store.clone();
            deletions.spawn(async move {
                let outcome = store.delete_instance(&name).await;
                (name, outcome)
            });
        }

        while let Some(joined) = deletions.join_next().await {
            match joined {
                Ok((name, Ok(_))) => tracing::info!(cache = %name, "pruned stale cache instance"),
                Ok((name, Err(e))) => {
                    tracing::warn!(cache = %name, error = %e, "failed to prune stale cache instance")
                }
                Err(e) => tracing::warn!(error = %e, "prune task failed to complete"),
            }
        }

        self.set_state(WorkerState::Activated).await;
        tracing::info!(cache = %keep, "activation complete");
        Ok(())
    }

    async fn expect_state(&self, expected: WorkerState, operation: &str) -> Result<(), Error> {
        let state = *self.state.lock().await;
        if state != expected {
            return Err(Error::Lifecycle(format!("{operation} is not legal in state {state}")));
        }
        Ok(())
    }

    async fn set_state(&self, next: WorkerState) {
        *self.state.lock().await = next;
    }
}

/// Snapshot a network response under the identity it was requested with.
fn stored_response(method: &str, response: &FetchResponse) -> StoredResponse {
    let headers: BTreeMap<String, String> = response
        .headers
        .iter()
        .filter_map(|(name, value)| value.to_str().ok().map(|v| (name.as_str().to_string(), v.to_string())))
        .collect();

    StoredResponse {
        method: method.to_string(),
        url: response.url.to_string(),
        status: response.status.as_u16(),
        content_type: response.content_type.clone(),
        headers_json: serde_json::to_string(&headers).ok(),
        body: response.bytes.to_vec(),
        stored_at: chrono::Utc::now().to_rfc3339(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use offshell_client::{HeaderMap, StatusCode};
    use std::collections::{HashMap, HashSet};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use url::Url;

    struct StubFetcher {
        routes: HashMap<String, (u16, String)>,
        unreachable: HashSet<String>,
        calls: AtomicUsize,
    }

    impl StubFetcher {
        fn new() -> Self {
            Self { routes: HashMap::new(), unreachable: HashSet::new(), calls: AtomicUsize::new(0) }
        }

        fn route(mut self, url: &str, status: u16, body: &str) -> Self {
            self.routes.insert(url.to_string(), (status, body.to_string()));
            self
        }

        fn unreachable(mut self, url: &str) -> Self {
            self.unreachable.insert(url.to_string());
            self
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ShellFetcher for StubFetcher {
        async fn fetch(&self, _method: &str, url: &Url) -> Result<FetchResponse, Error> {
            self.calls.fetch_add(1, Ordering::SeqCst);

            if self.unreachable.contains(url.as_str()) {
                return Err(Error::HttpError("network error: connection refused".to_string()));
            }

            let (status, body) = self
                .routes
                .get(url.as_str())
                .cloned()
                .unwrap_or((404, "not found".to_string()));

            Ok(FetchResponse {
                url: url.clone(),
                final_url: url.clone(),
                status: StatusCode::from_u16(status).unwrap(),
                content_type: Some("text/html".to_string()),
                bytes: Bytes::from(body),
                headers: HeaderMap::new(),
                fetch_ms: 1,
            })
        }
    }

    fn shell_config(version: &str) -> AppConfig {
        AppConfig {
            origin: "http://shell.test".into(),
            precache_paths: vec!["/".into(), "/index.html".into()],
            cache_version: version.into(),
            ..Default::default()
        }
    }

    fn shell_stub() -> StubFetcher {
        StubFetcher::new()
            .route("http://shell.test/", 200, "<html>root</html>")
            .route("http://shell.test/index.html", 200, "<html>index</html>")
    }

    fn request(url: &str) -> ShellRequest {
        ShellRequest::get(Url::parse(url).unwrap())
    }

    #[tokio::test]
    async fn test_install_precaches_every_asset() {
        let store = CacheDb::open_in_memory().await.unwrap();
        let stub = Arc::new(shell_stub());
        let worker = Worker::new(shell_config("v1"), store.clone(), stub.clone());

        worker.install().await.unwrap();
        assert_eq!(worker.state().await, WorkerState::Waiting);
        assert_eq!(stub.calls(), 2);

        let instance = store.open_instance("offshell-shell-v1").await.unwrap();
        assert_eq!(instance.entry_count().await.unwrap(), 2);
        for url in ["http://shell.test/", "http://shell.test/index.html"] {
            assert!(instance.get("GET", url).await.unwrap().is_some(), "missing precache for {url}");
        }
    }

    #[tokio::test]
    async fn test_install_fails_when_asset_unreachable() {
        let store = CacheDb::open_in_memory().await.unwrap();
        let stub = Arc::new(
            StubFetcher::new()
                .route("http://shell.test/", 200, "<html>root</html>")
                .unreachable("http://shell.test/index.html"),
        );
        let worker = Worker::new(shell_config("v1"), store, stub);

        let result = worker.install().await;
        assert!(matches!(result, Err(Error::Precache(_))));
        assert_eq!(worker.state().await, WorkerState::Installing);
    }

    #[tokio::test]
    async fn test_install_fails_on_error_status() {
        let store = CacheDb::open_in_memory().await.unwrap();
        let stub = Arc::new(StubFetcher::new().route("http://shell.test/", 200, "<html>root</html>"));
        // /index.html falls through to the stub's 404 default
        let worker = Worker::new(shell_config("v1"), store, stub);

        let result = worker.install().await;
        assert!(matches!(result, Err(Error::Precache(_))));
        assert_eq!(worker.state().await, WorkerState::Installing);
    }

    #[tokio::test]
    async fn test_fetch_hit_served_from_cache_without_network() {
        let store = CacheDb::open_in_memory().await.unwrap();
        let stub = Arc::new(shell_stub());
        let worker = Worker::new(shell_config("v1"), store, stub.clone());
        worker.install().await.unwrap();

        let response = worker.handle_fetch(&request("http://shell.test/")).await.unwrap();
        assert_eq!(response.source, ResponseSource::Cache);
        assert_eq!(response.status, 200);
        assert_eq!(response.body.as_ref(), b"<html>root</html>");
        // both calls happened during install; the hit added none
        assert_eq!(stub.calls(), 2);
    }

    #[tokio::test]
    async fn test_fetch_miss_forwards_once_and_does_not_cache() {
        let store = CacheDb::open_in_memory().await.unwrap();
        let stub = Arc::new(shell_stub().route("http://shell.test/extra.js", 200, "console.log(1)"));
        let worker = Worker::new(shell_config("v1"), store.clone(), stub.clone());
        worker.install().await.unwrap();

        let response = worker
            .handle_fetch(&request("http://shell.test/extra.js"))
            .await
            .unwrap();
        assert_eq!(response.source, ResponseSource::Network);
        assert_eq!(response.body.as_ref(), b"console.log(1)");
        assert_eq!(stub.calls(), 3);

        // no write-through: the instance still holds only the shell, and a
        // repeat miss goes back to the network
        let instance = store.open_instance("offshell-shell-v1").await.unwrap();
        assert_eq!(instance.entry_count().await.unwrap(), 2);
        worker
            .handle_fetch(&request("http://shell.test/extra.js"))
            .await
            .unwrap();
        assert_eq!(stub.calls(), 4);
    }

    #[tokio::test]
    async fn test_fetch_miss_passes_404_through_unmodified() {
        let store = CacheDb::open_in_memory().await.unwrap();
        let stub = Arc::new(shell_stub());
        let worker = Worker::new(shell_config("v1"), store.clone(), stub);
        worker.install().await.unwrap();

        let response = worker
            .handle_fetch(&request("http://shell.test/missing.png"))
            .await
            .unwrap();
        assert_eq!(response.status, 404);
        assert_eq!(response.source, ResponseSource::Network);

        let instance = store.open_instance("offshell-shell-v1").await.unwrap();
        assert_eq!(instance.entry_count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_fetch_miss_network_failure_propagates() {
        let store = CacheDb::open_in_memory().await.unwrap();
        let stub = Arc::new(shell_stub().unreachable("http://shell.test/api/data"));
        let worker = Worker::new(shell_config("v1"), store, stub);
        worker.install().await.unwrap();

        let result = worker.handle_fetch(&request("http://shell.test/api/data")).await;
        assert!(matches!(result, Err(Error::HttpError(_))));
    }

    #[tokio::test]
    async fn test_activate_keeps_only_current_instance() {
        let store = CacheDb::open_in_memory().await.unwrap();

        let v1 = Worker::new(shell_config("v1"), store.clone(), Arc::new(shell_stub()));
        v1.install().await.unwrap();
        v1.activate().await.unwrap();

        // deploy: bump the version tag, reinstall, activate
        let v2 = Worker::new(shell_config("v2"), store.clone(), Arc::new(shell_stub()));
        v2.install().await.unwrap();
        v2.activate().await.unwrap();

        assert_eq!(store.list_instances().await.unwrap(), vec!["offshell-shell-v2"]);
        let instance = store.open_instance("offshell-shell-v2").await.unwrap();
        assert_eq!(instance.entry_count().await.unwrap(), 2);
        assert_eq!(v2.state().await, WorkerState::Activated);
    }

    #[tokio::test]
    async fn test_activate_with_nothing_stale() {
        let store = CacheDb::open_in_memory().await.unwrap();
        let worker = Worker::new(shell_config("v1"), store.clone(), Arc::new(shell_stub()));
        worker.install().await.unwrap();
        worker.activate().await.unwrap();

        assert_eq!(store.list_instances().await.unwrap(), vec!["offshell-shell-v1"]);
    }

    #[tokio::test]
    async fn test_activate_before_install_is_rejected() {
        let store = CacheDb::open_in_memory().await.unwrap();
        let worker = Worker::new(shell_config("v1"), store, Arc::new(shell_stub()));

        let result = worker.activate().await;
        assert!(matches!(result, Err(Error::Lifecycle(_))));
        assert_eq!(worker.state().await, WorkerState::Installing);
    }

    #[tokio::test]
    async fn test_double_install_is_rejected() {
        let store = CacheDb::open_in_memory().await.unwrap();
        let worker = Worker::new(shell_config("v1"), store, Arc::new(shell_stub()));
        worker.install().await.unwrap();

        let result = worker.install().await;
        assert!(matches!(result, Err(Error::Lifecycle(_))));
    }

    #[tokio::test]
    async fn test_handle_event_dispatch() {
        let store = CacheDb::open_in_memory().await.unwrap();
        let worker = Worker::new(shell_config("v1"), store, Arc::new(shell_stub()));

        assert!(worker.handle_event(LifecycleEvent::Install).await.unwrap().is_none());
        let fetched = worker
            .handle_event(LifecycleEvent::Fetch(request("http://shell.test/")))
            .await
            .unwrap()
            .expect("fetch events produce a response");
        assert_eq!(fetched.source, ResponseSource::Cache);
        assert!(worker.handle_event(LifecycleEvent::Activate).await.unwrap().is_none());
        assert_eq!(worker.state().await, WorkerState::Activated);
    }
}
