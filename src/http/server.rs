//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with all handlers
//! - Wire up middleware (tracing, timeout, request ID)
//! - Bind server and optional admin listener
//! - Serve aggregate and per-upstream health
//! - Forward requests to upstreams through their guarded clients
//! - Apply reloaded configuration to the running registry

use axum::{
    body::{Body, Bytes},
    extract::{Path, State},
    http::{header, request::Parts, HeaderValue, Request, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::{any, get},
    Json, Router,
};
use arc_swap::ArcSwap;
use hyper::body::Incoming;
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tower::ServiceBuilder;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::admin::setup_admin_router;
use crate::config::GuardConfig;
use crate::health::{OverallStatus, ServiceHealth};
use crate::http::request::{
    propagate_request_id_layer, set_request_id_layer, RequestIdExt, X_REQUEST_ID,
};
use crate::http::response::{is_failure_status, ForwardError};
use crate::lifecycle::shutdown::signalled;
use crate::observability::metrics;
use crate::resilience::{GuardError, Operation, RetryPolicy};
use crate::upstream::{ReconcileSummary, UpstreamRegistry};

/// Largest request body buffered for forwarding (and replay on retry).
const MAX_BUFFERED_BODY: usize = 1024 * 1024;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<UpstreamRegistry>,
    pub config: Arc<ArcSwap<GuardConfig>>,
    pub client: Client<HttpConnector, Body>,
}

impl AppState {
    pub fn new(config: GuardConfig, registry: Arc<UpstreamRegistry>) -> Self {
        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());
        Self {
            registry,
            config: Arc::new(ArcSwap::from_pointee(config)),
            client,
        }
    }

    /// Retry policy from the current configuration.
    pub fn retry_policy(&self) -> RetryPolicy {
        self.config.load().retries.policy()
    }

    /// Reconcile the registry with `config` and make it current.
    pub fn apply_config(&self, config: GuardConfig) -> ReconcileSummary {
        let summary = self.registry.reconcile(&config);
        self.config.store(Arc::new(config));
        summary
    }
}

/// HTTP server for the gateway.
pub struct HttpServer {
    router: Router,
    config: GuardConfig,
    state: AppState,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration.
    pub fn new(config: GuardConfig) -> Self {
        let registry = Arc::new(UpstreamRegistry::new(&config));
        Self::with_registry(config, registry)
    }

    /// Create a server around an existing registry.
    pub fn with_registry(config: GuardConfig, registry: Arc<UpstreamRegistry>) -> Self {
        let state = AppState::new(config.clone(), registry);
        let router = Self::build_router(&config, state.clone());
        Self {
            router,
            config,
            state,
        }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &GuardConfig, state: AppState) -> Router {
        Router::new()
            .route("/health", get(health_handler))
            .route("/health/{name}", get(resource_health_handler))
            .route("/upstream/{name}", any(forward_root_handler))
            .route("/upstream/{name}/{*path}", any(forward_handler))
            .with_state(state)
            .layer(
                ServiceBuilder::new()
                    .layer(set_request_id_layer())
                    .layer(TraceLayer::new_for_http())
                    .layer(propagate_request_id_layer())
                    .layer(TimeoutLayer::new(Duration::from_secs(
                        config.listener.request_timeout_secs,
                    ))),
            )
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn config(&self) -> &GuardConfig {
        &self.config
    }

    /// Run the server, accepting connections on the given listener.
    ///
    /// Configs received on `config_updates` are applied live. Both the main
    /// and admin listeners drain and stop when `shutdown` fires.
    pub async fn run(
        self,
        listener: TcpListener,
        mut config_updates: mpsc::UnboundedReceiver<GuardConfig>,
        shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            upstreams = self.state.registry.len(),
            "HTTP server starting"
        );

        let state = self.state.clone();
        tokio::spawn(async move {
            while let Some(config) = config_updates.recv().await {
                state.apply_config(config);
            }
        });

        if self.config.admin.enabled {
            let admin_listener = TcpListener::bind(&self.config.admin.bind_address).await?;
            let admin_app = setup_admin_router(self.state.clone());
            let admin_shutdown = shutdown.resubscribe();
            tracing::info!(address = %self.config.admin.bind_address, "Admin server starting");
            tokio::spawn(async move {
                if let Err(e) = axum::serve(admin_listener, admin_app)
                    .with_graceful_shutdown(signalled(admin_shutdown))
                    .await
                {
                    tracing::error!(error = %e, "Admin server failed");
                }
            });
        }

        axum::serve(listener, self.router)
            .with_graceful_shutdown(signalled(shutdown))
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Aggregate health: 503 once any breaker is open.
async fn health_handler(State(state): State<AppState>) -> Response {
    let health = ServiceHealth::new(state.registry.reports());
    let status = match health.status {
        OverallStatus::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
        OverallStatus::Healthy | OverallStatus::Degraded => StatusCode::OK,
    };
    (status, Json(health)).into_response()
}

async fn resource_health_handler(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Response {
    match state.registry.get(&name) {
        Some(upstream) => Json(upstream.report()).into_response(),
        None => unknown_upstream(&name),
    }
}

async fn forward_handler(
    State(state): State<AppState>,
    Path((name, path)): Path<(String, String)>,
    request: Request<Body>,
) -> Response {
    forward(state, name, path, request).await
}

async fn forward_root_handler(
    State(state): State<AppState>,
    Path(name): Path<String>,
    request: Request<Body>,
) -> Response {
    forward(state, name, String::new(), request).await
}

fn unknown_upstream(name: &str) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "error": "unknown_upstream", "resource": name })),
    )
        .into_response()
}

/// Forward one request to `name` under its breaker, deadline and retry policy.
async fn forward(state: AppState, name: String, path: String, request: Request<Body>) -> Response {
    let start = Instant::now();
    let request_id = request.request_id().to_string();
    let method = request.method().clone();

    let Some(upstream) = state.registry.get(&name) else {
        tracing::warn!(request_id = %request_id, upstream = %name, "Unknown upstream");
        metrics::record_request(method.as_str(), 404, "none", start);
        return unknown_upstream(&name);
    };
    let upstream = upstream.track();
    let target = upstream.target();

    let url = target.forward_url(&path, request.uri().query());
    let uri = match url.parse::<Uri>() {
        Ok(uri) => uri,
        Err(e) => {
            let err = ForwardError::InvalidUri {
                uri: url,
                reason: e.to_string(),
            };
            tracing::error!(request_id = %request_id, upstream = %name, error = %err, "Cannot forward");
            metrics::record_request(method.as_str(), 502, &name, start);
            return GuardError::Operation(err).into_response();
        }
    };

    let (parts, body) = request.into_parts();
    let body = match axum::body::to_bytes(body, MAX_BUFFERED_BODY).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!(request_id = %request_id, error = %e, "Failed to buffer request body");
            metrics::record_request(method.as_str(), 413, &name, start);
            return (StatusCode::PAYLOAD_TOO_LARGE, "Request body too large").into_response();
        }
    };

    let mut operation = Operation::new(format!("{} /{}", method, path), target.timeout);
    if method.is_idempotent() {
        operation = operation.idempotent();
    }

    tracing::debug!(
        request_id = %request_id,
        upstream = %name,
        uri = %uri,
        "Forwarding request"
    );

    let client = &state.client;
    let parts = &parts;
    let uri = &uri;
    let rid = request_id.as_str();
    let result = state
        .retry_policy()
        .run_if(
            upstream.client(),
            &operation,
            move |_attempt| send_upstream(client, parts, uri.clone(), rid, body.clone()),
            |err| !matches!(err, GuardError::Operation(ForwardError::Build(_))),
        )
        .await;

    match result {
        Ok(response) => {
            metrics::record_request(method.as_str(), response.status().as_u16(), &name, start);
            let (parts, body) = response.into_parts();
            Response::from_parts(parts, Body::new(body))
        }
        Err(err) => {
            tracing::warn!(request_id = %request_id, upstream = %name, error = %err, "Guarded forward failed");
            let response = err.into_response();
            metrics::record_request(method.as_str(), response.status().as_u16(), &name, start);
            response
        }
    }
}

/// One forwarding attempt. Upstream 502/503/504 are returned as errors so the
/// breaker counts them.
async fn send_upstream(
    client: &Client<HttpConnector, Body>,
    parts: &Parts,
    uri: Uri,
    request_id: &str,
    body: Bytes,
) -> Result<Response<Incoming>, ForwardError> {
    let mut builder = Request::builder().method(parts.method.clone()).uri(uri);
    if let Some(headers) = builder.headers_mut() {
        for (name, value) in parts.headers.iter() {
            if *name != header::HOST {
                headers.append(name.clone(), value.clone());
            }
        }
        if let Ok(value) = HeaderValue::from_str(request_id) {
            headers.insert(X_REQUEST_ID, value);
        }
    }

    let response = client.request(builder.body(Body::from(body))?).await?;
    if is_failure_status(response.status()) {
        return Err(ForwardError::Status(response.status()));
    }
    Ok(response)
}
