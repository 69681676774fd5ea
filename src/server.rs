use crate::adapters::LLMAdapter;
use crate::config::Config;
use crate::github::webhook::SIGNATURE_HEADER;
use crate::github::{verify_signature, GitHubClient, PullRequestEvent};
use crate::pipeline::{process_pull_request_review, ReviewJob, ReviewSettings};
use anyhow::{Context, Result};
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};
use std::sync::Arc;
use thiserror::Error;
use tokio::signal;
use tracing::{error, info, warn};

const SERVICE_NAME: &str = "GitHub PR Reviewer API";

pub struct AppState {
    pub config: Config,
    pub github: GitHubClient,
    pub llm: Arc<dyn LLMAdapter>,
    pub settings: ReviewSettings,
}

impl AppState {
    pub fn new(config: Config, github: GitHubClient, llm: Arc<dyn LLMAdapter>) -> Self {
        let settings = ReviewSettings::from_config(&config);
        Self {
            config,
            github,
            llm,
            settings,
        }
    }

    fn webhook_secret(&self) -> &str {
        self.config.github_webhook_secret.as_deref().unwrap_or_default()
    }
}

/// Rejections of a webhook delivery.
#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("Invalid signature")]
    InvalidSignature,

    #[error("Invalid JSON payload")]
    InvalidJson(#[source] serde_json::Error),

    #[error("Invalid GitHub payload")]
    InvalidPayload(#[source] serde_json::Error),
}

impl WebhookError {
    fn status_code(&self) -> StatusCode {
        match self {
            WebhookError::InvalidSignature => StatusCode::UNAUTHORIZED,
            WebhookError::InvalidJson(_) | WebhookError::InvalidPayload(_) => {
                StatusCode::BAD_REQUEST
            }
        }
    }
}

impl IntoResponse for WebhookError {
    fn into_response(self) -> Response {
        (self.status_code(), Json(json!({ "detail": self.to_string() }))).into_response()
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    let api = Router::new()
        .route("/webhook", get(webhook_info).post(handle_webhook))
        .route("/health", get(api_health));

    Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        .nest("/api/v1", api)
        .with_state(state)
}

async fn root(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "message": SERVICE_NAME,
        "version": env!("CARGO_PKG_VERSION"),
        "status": "active",
        "environment": state.config.environment,
    }))
}

async fn health_check(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "environment": state.config.environment,
    }))
}

async fn api_health() -> Json<Value> {
    Json(json!({ "status": "healthy" }))
}

async fn webhook_info() -> Json<Value> {
    Json(json!({
        "message": "GitHub PR Reviewer Webhook",
        "endpoint": "/webhook",
        "method": "POST",
        "supported_events": ["pull_request"],
    }))
}

async fn handle_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, WebhookError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok());
    if signature.is_none() {
        warn!("No GitHub signature header found");
    }
    if !verify_signature(state.webhook_secret(), &body, signature) {
        error!("Webhook validation failed: invalid signature");
        return Err(WebhookError::InvalidSignature);
    }

    let payload: Value = serde_json::from_slice(&body).map_err(|err| {
        error!("Invalid JSON payload: {}", err);
        WebhookError::InvalidJson(err)
    })?;

    if payload.get("pull_request").is_none() {
        info!("Not a pull request event, ignoring");
        return Ok(message("Not a pull request event"));
    }

    let event: PullRequestEvent = serde_json::from_value(payload).map_err(|err| {
        error!("Failed to parse GitHub payload: {}", err);
        WebhookError::InvalidPayload(err)
    })?;

    if !event.should_review() {
        info!("Ignoring PR action: {}", event.action);
        return Ok(message(&format!("Ignoring action: {}", event.action)));
    }

    let job = ReviewJob::from(&event);
    let task_state = Arc::clone(&state);
    tokio::spawn(async move {
        process_pull_request_review(
            &task_state.github,
            task_state.llm.as_ref(),
            &task_state.settings,
            job,
        )
        .await;
    });

    Ok(message("Pull request review queued"))
}

fn message(text: &str) -> Json<Value> {
    Json(json!({ "message": text }))
}

pub async fn serve(state: Arc<AppState>) -> Result<()> {
    let address = format!("{}:{}", state.config.host, state.config.port);
    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("Failed to bind {}", address))?;

    info!("Starting {} on {}", SERVICE_NAME, address);
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", err);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::github::webhook::fixtures::{pull_request_payload, sign_payload};
    use crate::pipeline::testing::StubAdapter;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    const SECRET: &str = "webhook-secret";

    fn test_state() -> Arc<AppState> {
        let config = Config {
            github_webhook_secret: Some(SECRET.to_string()),
            github_token: Some("t".to_string()),
            environment: "test".to_string(),
            ..Config::default()
        };
        // Nothing listens on this port; queued reviews fail and are logged.
        let github = GitHubClient::new("t", "http://127.0.0.1:9").unwrap();
        let llm: Arc<dyn LLMAdapter> = Arc::new(StubAdapter::new("{}"));
        Arc::new(AppState::new(config, github, llm))
    }

    fn signed_post(body: &[u8], signature: Option<String>) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri("/api/v1/webhook")
            .header("content-type", "application/json");
        if let Some(signature) = signature {
            builder = builder.header(SIGNATURE_HEADER, signature);
        }
        builder.body(Body::from(body.to_vec())).unwrap()
    }

    async fn send(request: Request<Body>) -> (StatusCode, Value) {
        let response = router(test_state()).oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    async fn deliver(payload: &Value) -> (StatusCode, Value) {
        let body = serde_json::to_vec(payload).unwrap();
        let signature = sign_payload(SECRET, &body);
        send(signed_post(&body, Some(signature))).await
    }

    #[tokio::test]
    async fn rejects_missing_signature() {
        let (status, body) = send(signed_post(b"{}", None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["detail"], "Invalid signature");
    }

    #[tokio::test]
    async fn rejects_signature_from_other_secret() {
        let signature = sign_payload("wrong", b"{}");
        let (status, _) = send(signed_post(b"{}", Some(signature))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn rejects_invalid_json() {
        let body = b"not json";
        let signature = sign_payload(SECRET, body);
        let (status, response) = send(signed_post(body, Some(signature))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(response["detail"], "Invalid JSON payload");
    }

    #[tokio::test]
    async fn ignores_non_pull_request_events() {
        let (status, body) = deliver(&json!({"zen": "Keep it simple", "hook_id": 1})).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Not a pull request event");
    }

    #[tokio::test]
    async fn rejects_incomplete_pull_request_payload() {
        let (status, body) = deliver(&json!({"action": "opened", "pull_request": {}})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["detail"], "Invalid GitHub payload");
    }

    #[tokio::test]
    async fn ignores_other_actions() {
        let (status, body) = deliver(&pull_request_payload("closed")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Ignoring action: closed");
    }

    #[tokio::test]
    async fn queues_review_for_opened_pull_request() {
        let (status, body) = deliver(&pull_request_payload("synchronize")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Pull request review queued");
    }

    #[tokio::test]
    async fn health_and_info_endpoints() {
        let request = Request::get("/health").body(Body::empty()).unwrap();
        let (status, body) = send(request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["environment"], "test");

        let request = Request::get("/api/v1/webhook").body(Body::empty()).unwrap();
        let (_, body) = send(request).await;
        assert_eq!(body["supported_events"][0], "pull_request");

        let request = Request::get("/").body(Body::empty()).unwrap();
        let (_, body) = send(request).await;
        assert_eq!(body["status"], "active");
    }
}
