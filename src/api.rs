use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use prometheus_client::registry::Registry;
use tokio::net::ToSocketAddrs;

use crate::metrics::PluginMetrics;

const LOG_TARGET: &str = "api";
const OPENMETRICS_CONTENT_TYPE: &str =
    "application/openmetrics-text; version=1.0.0; charset=utf-8";

#[derive(Debug, serde::Serialize)]
struct ServiceInfo {
    id: &'static str,
    version: &'static str,
}

async fn root() -> Json<ServiceInfo> {
    Json(ServiceInfo {
        id: "Plugin Controller",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn metrics(registry: State<Arc<Registry>>) -> Response {
    match PluginMetrics::encode(&registry) {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, OPENMETRICS_CONTENT_TYPE)],
            body,
        )
            .into_response(),
        Err(err) => {
            log::error!(target: LOG_TARGET, "Failed to encode metrics: {err}");
            (StatusCode::INTERNAL_SERVER_ERROR, "failed to encode metrics").into_response()
        }
    }
}

pub struct APIServer {
    router: axum::Router,
}

impl APIServer {
    pub fn new(registry: Arc<Registry>) -> Self {
        let router = axum::Router::new()
            .route("/", get(root))
            .route("/metrics", get(metrics))
            .with_state(registry);
        Self { router }
    }

    /// Serves the API until the process exits.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the address cannot be bound or serving fails.
    pub async fn listen(self, addr: impl ToSocketAddrs) -> std::io::Result<()> {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        self.serve(listener).await
    }

    async fn serve(self, listener: tokio::net::TcpListener) -> std::io::Result<()> {
        if let Ok(addr) = listener.local_addr() {
            log::info!(target: LOG_TARGET, "listening on {addr}");
        }
        axum::serve(listener, self.router.into_make_service()).await
    }
}

#[cfg(test)]
mod tests {
    use prometheus_client::metrics::counter::Counter;

    use super::*;

    async fn spawn_server(registry: Registry) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(APIServer::new(Arc::new(registry)).serve(listener));
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn test_root_identifies_service() {
        let base = spawn_server(Registry::default()).await;
        let body = reqwest::get(format!("{base}/"))
            .await
            .unwrap()
            .text()
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(body["id"], "Plugin Controller");
        assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    }

    #[tokio::test]
    async fn test_metrics_exposition() {
        let metrics = PluginMetrics::default();
        let mut registry = Registry::default();
        metrics.register(&mut registry, Counter::default());
        metrics.observe_working_set(1024);
        let base = spawn_server(registry).await;

        let response = reqwest::get(format!("{base}/metrics")).await.unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::OK);
        assert_eq!(
            response.headers()[reqwest::header::CONTENT_TYPE],
            OPENMETRICS_CONTENT_TYPE
        );
        let body = response.text().await.unwrap();
        assert!(body.contains("plugin_memory_workingset_bytes 1024"));
    }
}
