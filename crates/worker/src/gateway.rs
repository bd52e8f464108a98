//! HTTP gateway that plays the interception point.
//!
//! Every incoming request, whatever its path, is turned into a fetch event
//! against the configured origin and handed to the worker. Routing beyond
//! that is deliberately out of scope.

use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    extract::State,
    http::{Method, StatusCode, Uri, header},
    response::{IntoResponse, Response},
};

use offshell_client::resolve_asset;

use crate::lifecycle::ShellRequest;
use crate::worker::Worker;

/// Build the gateway router: a single fallback route delivering every
/// request as a fetch event.
pub fn router(worker: Arc<Worker>) -> Router {
    Router::new().fallback(handle_fetch_event).with_state(worker)
}

async fn handle_fetch_event(State(worker): State<Arc<Worker>>, method: Method, uri: Uri) -> Response {
    let path = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");

    let url = match resolve_asset(&worker.config().origin, path) {
        Ok(url) => url,
        Err(e) => return (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
    };

    let request = ShellRequest { method: method.to_string(), url };

    match worker.handle_fetch(&request).await {
        Ok(shell) => {
            let mut builder = Response::builder().status(shell.status);
            if let Some(content_type) = &shell.content_type {
                builder = builder.header(header::CONTENT_TYPE, content_type.as_str());
            }
            match builder.body(Body::from(shell.body)) {
                Ok(response) => response,
                Err(e) => {
                    tracing::error!(error = %e, "failed to materialize stored response");
                    StatusCode::INTERNAL_SERVER_ERROR.into_response()
                }
            }
        }
        // a failed miss-path fetch surfaces to the requester as a failed
        // fetch, not as fallback content
        Err(e) => {
            tracing::error!(url = %request.url, error = %e, "fetch event failed");
            (StatusCode::BAD_GATEWAY, e.to_string()).into_response()
        }
    }
}

/// Bind the listen address and serve fetch events until shutdown.
pub async fn serve(addr: &str, worker: Arc<Worker>) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(addr = %listener.local_addr()?, "gateway listening");

    axum::serve(listener, router(worker))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("shutdown signal received"),
        Err(e) => {
            tracing::warn!(error = %e, "failed to install shutdown handler");
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::http::Request;
    use bytes::Bytes;
    use offshell_client::{FetchResponse, HeaderMap, ShellFetcher};
    use offshell_core::{AppConfig, CacheDb, Error};
    use tower::ServiceExt;
    use url::Url;

    struct ShellOnlyFetcher;

    #[async_trait]
    impl ShellFetcher for ShellOnlyFetcher {
        async fn fetch(&self, _method: &str, url: &Url) -> Result<FetchResponse, Error> {
            let (status, body) = if url.as_str() == "http://shell.test/" {
                (StatusCode::OK, "<html>shell</html>")
            } else {
                (StatusCode::NOT_FOUND, "not found")
            };

            Ok(FetchResponse {
                url: url.clone(),
                final_url: url.clone(),
                status,
                content_type: Some("text/html".to_string()),
                bytes: Bytes::from_static(body.as_bytes()),
                headers: HeaderMap::new(),
                fetch_ms: 1,
            })
        }
    }

    async fn activated_worker() -> Arc<Worker> {
        let config = AppConfig {
            origin: "http://shell.test".into(),
            precache_paths: vec!["/".into()],
            ..Default::default()
        };
        let store = CacheDb::open_in_memory().await.unwrap();
        let worker = Arc::new(Worker::new(config, store, Arc::new(ShellOnlyFetcher)));
        worker.install().await.unwrap();
        worker.activate().await.unwrap();
        worker
    }

    #[tokio::test]
    async fn test_gateway_serves_precached_shell() {
        let app = router(activated_worker().await);

        let response = app
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "text/html"
        );
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(body.as_ref(), b"<html>shell</html>");
    }

    #[tokio::test]
    async fn test_gateway_passes_miss_status_through() {
        let app = router(activated_worker().await);

        let response = app
            .oneshot(Request::builder().uri("/missing.png").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
