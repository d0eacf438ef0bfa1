use std::sync::Arc;

use tenant_console::{api::KubeQuotas, config::Config, server::State, telemetry};
use tokio::net::TcpListener;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    telemetry::init().await?;

    let config = Config::from_env()?;

    // Quotas are read straight from the cluster
    let client = kube::Client::try_default().await?;
    let state = State::new(Arc::new(KubeQuotas::new(client)))?;

    // Start web server
    let listener = TcpListener::bind(config.listen_addr).await?;
    info!(addr = %config.listen_addr, "serving console api");
    axum::serve(listener, handlers::router().with_state(state)).await?;

    Ok(())
}

/// Handlers for the web server portion of the console
mod handlers {
    use axum::{
        extract::{Path, State},
        http::StatusCode,
        response::{IntoResponse, Response},
        routing, Json, Router,
    };
    use prometheus::{Encoder, TextEncoder};
    use tracing::{field, instrument, warn, Span};

    use tenant_console::{
        api::{ApiErrorBody, ResourceQuota},
        parity::possible_parity_values,
        server::State as ConsoleState,
        telemetry, Error,
    };

    /// Construct the router for all the handlers
    pub fn router() -> Router<ConsoleState> {
        Router::new()
            .route("/api/v1/get-parity/:nodes/:disks", routing::get(parity))
            .route(
                "/api/v1/namespaces/:namespace/resourcequotas/:name",
                routing::get(resource_quota),
            )
            .route("/metrics", routing::get(metrics))
            .route("/health", routing::get(health))
            .route("/", routing::get(index))
    }

    /// Library error rendered as the console API error body
    pub struct Failure(Error);

    impl Failure {
        fn status(&self) -> StatusCode {
            let code = match &self.0 {
                Error::InvalidTopology(_) | Error::InvalidParity(_) => 400,
                Error::KubeError(kube::Error::Api(ae)) => ae.code,
                Error::ApiError { status, .. } => *status,
                _ => 500,
            };

            StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }

    impl IntoResponse for Failure {
        fn into_response(self) -> Response {
            let status = self.status();
            let body = ApiErrorBody {
                code: status.as_u16(),
                message: self.0.to_string(),
            };

            (status, Json(body)).into_response()
        }
    }

    /// Parity levels available for a server/drive topology
    #[instrument(skip(state), fields(trace_id))]
    async fn parity(
        State(state): State<ConsoleState>,
        Path((nodes, disks)): Path<(u64, u64)>,
    ) -> Result<Json<Vec<String>>, Failure> {
        Span::current().record("trace_id", &field::display(&telemetry::get_trace_id()));
        let metrics = state.recorder();
        let _timer = metrics.measure("parity");
        metrics.parity_requests.inc();
        state.touch().await;

        match possible_parity_values(nodes, disks) {
            Ok(parities) => Ok(Json(parities.into_iter().map(String::from).collect())),
            Err(e) => {
                warn!("parity enumeration failed: {e}");
                metrics.failure("parity", &e);
                Err(Failure(e))
            }
        }
    }

    /// Storage quota of a namespace
    #[instrument(skip(state), fields(trace_id))]
    async fn resource_quota(
        State(state): State<ConsoleState>,
        Path((namespace, name)): Path<(String, String)>,
    ) -> Result<Json<ResourceQuota>, Failure> {
        Span::current().record("trace_id", &field::display(&telemetry::get_trace_id()));
        let metrics = state.recorder();
        let _timer = metrics.measure("resource_quota");
        metrics.quota_lookups.inc();
        state.touch().await;

        match state.quotas().resource_quota(&namespace, &name).await {
            Ok(quota) => Ok(Json(quota)),
            Err(e) => {
                warn!("resource quota lookup failed: {e}");
                metrics.failure("resource_quota", &e);
                Err(Failure(e))
            }
        }
    }

    /// Handler for exposing prometheus metrics
    async fn metrics(State(state): State<ConsoleState>) -> impl IntoResponse {
        let metrics = state.metrics();
        let encoder = TextEncoder::new();
        let mut buffer = vec![];

        match encoder.encode(&metrics, &mut buffer) {
            Ok(()) => (StatusCode::OK, buffer),
            Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string().into_bytes()),
        }
    }

    /// Handler for checking the health of the server
    async fn health() -> impl IntoResponse {
        (StatusCode::OK, Json("healthy"))
    }

    /// Handler for inspecting the console
    async fn index(State(state): State<ConsoleState>) -> impl IntoResponse {
        let diagnostics = state.diagnostics().await;

        (StatusCode::OK, Json(diagnostics))
    }

    #[cfg(test)]
    mod tests {
        use std::sync::Arc;

        use async_trait::async_trait;
        use axum::{
            body::{to_bytes, Body},
            http::Request,
        };
        use serde_json::{json, Value};
        use tower::ServiceExt;

        use super::*;
        use tenant_console::{
            api::{QuotaProvider, ResourceQuotaElement},
            Result,
        };

        struct FakeQuotas;

        #[async_trait]
        impl QuotaProvider for FakeQuotas {
            async fn resource_quota(&self, namespace: &str, name: &str) -> Result<ResourceQuota> {
                match namespace {
                    "tenants" => Ok(ResourceQuota {
                        name: name.into(),
                        elements: vec![ResourceQuotaElement {
                            name: "standard.storageclass.storage.k8s.io/requests.storage".into(),
                            hard: 1 << 40,
                            used: 1 << 30,
                        }],
                    }),
                    "gone" => Err(Error::KubeError(kube::Error::Api(
                        kube::core::ErrorResponse {
                            status: "Failure".into(),
                            message: "namespaces \"gone\" not found".into(),
                            reason: "NotFound".into(),
                            code: 404,
                        },
                    ))),
                    _ => Err(Error::ApiError {
                        status: 503,
                        message: "cluster unreachable".into(),
                    }),
                }
            }
        }

        async fn get(uri: &str) -> (StatusCode, Vec<u8>) {
            let state = ConsoleState::new(Arc::new(FakeQuotas)).unwrap();
            let response = router()
                .with_state(state)
                .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
                .await
                .unwrap();

            let status = response.status();
            let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
            (status, body.to_vec())
        }

        async fn get_json(uri: &str) -> (StatusCode, Value) {
            let (status, body) = get(uri).await;
            (status, serde_json::from_slice(&body).unwrap())
        }

        #[tokio::test]
        async fn lists_parities() {
            let (status, body) = get_json("/api/v1/get-parity/4/10").await;

            assert_eq!(status, StatusCode::OK);
            assert_eq!(body, json!(["EC:4", "EC:3", "EC:2"]));
        }

        #[tokio::test]
        async fn rejects_tiny_topologies() {
            let (status, body) = get_json("/api/v1/get-parity/1/1").await;

            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert_eq!(body["code"], 400);
            assert!(body["message"].as_str().unwrap().starts_with("Invalid topology"));
        }

        #[tokio::test]
        async fn serves_resource_quotas() {
            let (status, body) =
                get_json("/api/v1/namespaces/tenants/resourcequotas/tenants-storagequota").await;

            assert_eq!(status, StatusCode::OK);
            assert_eq!(body["name"], "tenants-storagequota");
            assert_eq!(body["elements"][0]["used"], 1 << 30);
        }

        #[tokio::test]
        async fn maps_quota_failures() {
            let (status, body) =
                get_json("/api/v1/namespaces/gone/resourcequotas/gone-storagequota").await;
            assert_eq!(status, StatusCode::NOT_FOUND);
            assert_eq!(body["code"], 404);

            let (status, _) =
                get_json("/api/v1/namespaces/other/resourcequotas/other-storagequota").await;
            assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        }

        #[tokio::test]
        async fn reports_health_and_diagnostics() {
            let (status, body) = get_json("/health").await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(body, json!("healthy"));

            let (status, body) = get_json("/").await;
            assert_eq!(status, StatusCode::OK);
            assert!(body.get("last_event").is_some());
        }

        #[tokio::test]
        async fn exposes_metrics() {
            let (status, body) = get("/metrics").await;

            assert_eq!(status, StatusCode::OK);
            let text = String::from_utf8(body).unwrap();
            assert!(text.contains("console_parity_requests_total 0"));
        }
    }
}
