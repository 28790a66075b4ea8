mod config;
mod engine;
mod error;
mod gateway;
mod openai_engine;
mod retry;
mod types;

use axum::{
    Router,
    extract::{DefaultBodyLimit, State, rejection::JsonRejection},
    http::StatusCode,
    response::Json,
    routing::{get, post},
};
use axum_prometheus::PrometheusMetricLayer;
use clap::Parser;
use metrics::counter;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use config::{Config, RetryConfig};
use error::{ApiError, ClassifyError};
use gateway::Gateway;
use openai_engine::{OpenAiConfig, OpenAiEngine};
use types::{
    ClassificationResult, ImageRequestBody, RequestKind, SuccessEnvelope, TextRequestBody,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();
    init_tracing(config.log_json);

    tracing::info!("Starting classification gateway with config: {:?}", config);

    if config.openai_api_key.trim().is_empty() {
        anyhow::bail!("OPENAI_API_KEY must not be empty");
    }

    let engine = OpenAiEngine::new(OpenAiConfig {
        base_url: config.openai_base_url.clone(),
        api_key: config.openai_api_key.clone(),
        model: config.model.clone(),
        timeout: config.request_timeout(),
    })?;
    let retry_config = RetryConfig::from(&config);
    let state = AppState::new(Gateway::new(Arc::new(engine), retry_config));

    let (prometheus_layer, metric_handle) = PrometheusMetricLayer::pair();

    let app = app(state, config.body_limit_bytes)
        .route("/metrics", get(|| async move { metric_handle.render() }))
        .layer(prometheus_layer);

    let listener = TcpListener::bind(&config.server_address()).await?;
    tracing::info!("Server running on http://{}", config.server_address());
    tracing::info!(
        "Retry policy: {} attempts, {:?} delay",
        retry_config.max_attempts,
        retry_config.delay
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,smartbin_gateway=debug".into());

    if json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received, draining in-flight requests");
}

#[derive(Clone)]
struct AppState {
    gateway: Arc<Gateway>,
}

impl AppState {
    fn new(gateway: Gateway) -> Self {
        Self {
            gateway: Arc::new(gateway),
        }
    }
}

fn app(state: AppState, body_limit: usize) -> Router {
    Router::new()
        .route("/", get(health_handler))
        .route("/api/classify", post(classify_text_handler))
        .route("/api/classify-image", post(classify_image_handler))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_handler() -> &'static str {
    "SmartBin+ Backend Running!"
}

type ClassifyResponse = Result<Json<SuccessEnvelope<ClassificationResult>>, ApiError>;

#[tracing::instrument(skip_all, fields(request_id = %uuid::Uuid::new_v4().simple()))]
async fn classify_text_handler(
    State(state): State<AppState>,
    body: Result<Json<TextRequestBody>, JsonRejection>,
) -> ClassifyResponse {
    let label = extract_field(body, |b| b.label);
    classify(&state, RequestKind::Text, label).await
}

#[tracing::instrument(skip_all, fields(request_id = %uuid::Uuid::new_v4().simple()))]
async fn classify_image_handler(
    State(state): State<AppState>,
    body: Result<Json<ImageRequestBody>, JsonRejection>,
) -> ClassifyResponse {
    let image = extract_field(body, |b| b.image);
    classify(&state, RequestKind::Image, image).await
}

/// Pulls the required field out of the body. Oversized bodies are reported as
/// such; any other rejection (bad JSON, wrong type) counts as a missing field.
fn extract_field<T>(
    body: Result<Json<T>, JsonRejection>,
    field: impl FnOnce(T) -> Option<String>,
) -> Result<Option<String>, ClassifyError> {
    match body {
        Ok(Json(body)) => Ok(field(body)),
        Err(rejection) if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE => {
            Err(ClassifyError::PayloadTooLarge)
        }
        Err(rejection) => {
            tracing::debug!(error = %rejection, "Rejected request body");
            Ok(None)
        }
    }
}

async fn classify(
    state: &AppState,
    kind: RequestKind,
    field: Result<Option<String>, ClassifyError>,
) -> ClassifyResponse {
    counter!("classification_requests_total", "kind" => kind.as_str()).increment(1);

    let result = match field.and_then(|field| Gateway::validate(kind, field)) {
        Ok(request) => state.gateway.classify(request).await,
        Err(err) => Err(err),
    };

    match result {
        Ok(data) => {
            tracing::info!(bin = %data.bin, item = %data.item_name, "Classification completed successfully");
            Ok(Json(SuccessEnvelope::new(data)))
        }
        Err(err) => {
            counter!(
                "classification_failures_total",
                "kind" => kind.as_str(),
                "reason" => err.reason()
            )
            .increment(1);
            log_failure(kind, &err);
            Err(ApiError::new(kind, err))
        }
    }
}

fn log_failure(kind: RequestKind, err: &ClassifyError) {
    match err {
        ClassifyError::InvalidInput(_) | ClassifyError::PayloadTooLarge => {
            tracing::info!(kind = kind.as_str(), "Rejected request: {}", err)
        }
        _ => tracing::error!(kind = kind.as_str(), error = %err, "Classification failed"),
    }
}
