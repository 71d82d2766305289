//! HTTP API: health, status, reconnect, send, bulk send, and webhook configuration.
//!
//! Handlers validate input, delegate to the messaging client or supervisor,
//! and map the outcome to `{success, ...}` JSON.

use crate::supervisor::Supervisor;
use crate::webhook::WebhookDispatcher;
use anyhow::Context;
use axum::{
    extract::{rejection::JsonRejection, DefaultBodyLimit, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use chrono::{SecondsFormat, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use std::any::Any;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{catch_panic::CatchPanicLayer, cors::CorsLayer};
use tracing::{error, info, warn};
use wabridge_core::{
    context::BridgeContext, error::BridgeError, phone, traits::MessagingClient,
};
use wabridge_store::{event_log::preview, EventKind, EventLogger};

const MAX_BODY_BYTES: usize = 1024 * 1024;
const SENT_PREVIEW_CHARS: usize = 50;
const UNKNOWN_SA: &str = "unknown";

type ApiError = (StatusCode, Json<Value>);

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    ctx: Arc<BridgeContext>,
    client: Arc<dyn MessagingClient>,
    supervisor: Arc<Supervisor>,
    dispatcher: Arc<WebhookDispatcher>,
    logger: Arc<EventLogger>,
    bulk_delay: Duration,
}

impl ApiState {
    pub fn new(
        ctx: Arc<BridgeContext>,
        client: Arc<dyn MessagingClient>,
        supervisor: Arc<Supervisor>,
        dispatcher: Arc<WebhookDispatcher>,
        logger: Arc<EventLogger>,
        bulk_delay: Duration,
    ) -> Self {
        Self {
            ctx,
            client,
            supervisor,
            dispatcher,
            logger,
            bulk_delay,
        }
    }
}

#[derive(Debug, Deserialize)]
struct SendMessageRequest {
    phone: Option<String>,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SendBulkRequest {
    messages: Option<Vec<Value>>,
}

/// One bulk entry. Malformed entries decode to all-`None` and fail individually.
#[derive(Debug, Default, Deserialize)]
struct BulkItem {
    phone: Option<String>,
    message: Option<String>,
    sa: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SetWebhookRequest {
    url: Option<String>,
}

fn bad_request(message: &str) -> ApiError {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({"success": false, "message": message})),
    )
}

fn internal_error(message: &str, err: impl std::fmt::Display) -> ApiError {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({"success": false, "message": message, "error": err.to_string()})),
    )
}

fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Field that is present and not blank. The value is returned untouched.
fn required(field: Option<String>) -> Option<String> {
    field.filter(|s| !s.trim().is_empty())
}

/// Build the router with all routes and layers.
pub fn build_router(state: ApiState) -> Router {
    let logger = state.logger.clone();
    Router::new()
        .route("/api/health", get(health))
        .route("/api/status", get(status))
        .route("/api/reconnect", post(reconnect))
        .route("/api/send-message", post(send_message))
        .route("/api/send-bulk", post(send_bulk))
        .route("/api/set-webhook", post(set_webhook))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(CatchPanicLayer::custom(panic_handler(logger)))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Turns a handler panic into a logged `api_error` and a 500 response.
pub fn panic_handler(
    logger: Arc<EventLogger>,
) -> impl Fn(Box<dyn Any + Send + 'static>) -> Response + Clone + Send + Sync + 'static {
    move |err: Box<dyn Any + Send + 'static>| {
        let detail = if let Some(s) = err.downcast_ref::<String>() {
            s.clone()
        } else if let Some(s) = err.downcast_ref::<&str>() {
            (*s).to_string()
        } else {
            "unknown panic".to_string()
        };
        error!("API handler panicked: {detail}");
        logger.log(EventKind::ApiError, format!("handler panicked: {detail}"));
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"success": false, "message": "internal server error"})),
        )
            .into_response()
    }
}

/// Bind `host:port` and serve until `shutdown` resolves.
pub async fn serve<F>(host: &str, port: u16, state: ApiState, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = build_router(state);
    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind API server to {addr}"))?;

    info!("API server listening on {addr}");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .context("API server error")?;
    Ok(())
}

/// `GET /api/health`: liveness, counters, webhook summary, and recent errors.
async fn health(State(state): State<ApiState>) -> Json<Value> {
    let status = state.ctx.status_snapshot().await;
    let stats = state.ctx.stats_snapshot().await;
    let webhook_url = state
        .ctx
        .webhook_url()
        .await
        .unwrap_or_else(|| "not configured".to_string());

    Json(json!({
        "success": true,
        "status": if status.is_ready { "up" } else { "down" },
        "timestamp": now_rfc3339(),
        "uptime": state.ctx.uptime_secs(),
        "port": state.ctx.port,
        "stats": {
            "messagesReceived": stats.messages_received,
            "messagesSent": stats.messages_sent,
            "reconnectAttempts": stats.reconnect_attempts,
            "lastReconnect": stats
                .last_reconnect
                .map(|t| t.to_rfc3339_opts(SecondsFormat::Millis, true)),
            "webhook": {
                "url": webhook_url,
                "success": stats.webhook_success,
                "failed": stats.webhook_failed,
                "successRate": stats.webhook_success_rate(),
            },
        },
        "lastErrors": state.logger.recent_errors(3),
    }))
}

/// `GET /api/status`: client connection status.
async fn status(State(state): State<ApiState>) -> Json<Value> {
    let status = state.ctx.status_snapshot().await;
    let stats = state.ctx.stats_snapshot().await;
    Json(json!({
        "success": true,
        "ready": status.is_ready,
        "qrCode": status.qr_code,
        "error": status.last_error,
        "reconnecting": status.reconnecting,
        "state": status.state,
        "stats": {
            "messagesReceived": stats.messages_received,
            "messagesSent": stats.messages_sent,
        },
    }))
}

/// `POST /api/reconnect`: reset the attempt counter and reconnect.
async fn reconnect(State(state): State<ApiState>) -> Result<Json<Value>, ApiError> {
    match state.supervisor.reset_and_reconnect().await {
        Ok(()) => Ok(Json(json!({
            "success": true,
            "message": "reconnection started",
        }))),
        Err(BridgeError::AlreadyReconnecting) => {
            Err(bad_request("reconnection already in progress"))
        }
        Err(e) => {
            error!("manual reconnect failed: {e}");
            state
                .logger
                .log(EventKind::ApiError, format!("reconnect failed: {e}"));
            Err(internal_error("failed to start reconnection", e))
        }
    }
}

/// `POST /api/send-message`: send one text message.
async fn send_message(
    State(state): State<ApiState>,
    body: Result<Json<SendMessageRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    if !state.ctx.is_ready().await {
        return Err(bad_request("WhatsApp client is not ready"));
    }

    let (phone_raw, text) = match body {
        Ok(Json(req)) => match (required(req.phone), required(req.message)) {
            (Some(p), Some(m)) => (p, m),
            _ => return Err(bad_request("phone and message are required")),
        },
        Err(e) => {
            warn!("send-message: rejected body: {e}");
            return Err(bad_request("phone and message are required"));
        }
    };

    let chat_id = phone::normalize(&phone_raw);

    match state.client.is_registered_user(&chat_id).await {
        Ok(true) => {}
        Ok(false) => return Err(bad_request("number is not registered on WhatsApp")),
        Err(e) => {
            error!("registration check failed for {chat_id}: {e}");
            state
                .logger
                .log(EventKind::Error, format!("failed to send message: {e}"));
            return Err(internal_error("failed to send message", e));
        }
    }

    if let Err(e) = state.client.send_message(&chat_id, &text).await {
        error!("send to {chat_id} failed: {e}");
        state
            .logger
            .log(EventKind::Error, format!("failed to send message: {e}"));
        return Err(internal_error("failed to send message", e));
    }

    state.ctx.stats.lock().await.messages_sent += 1;
    info!("message sent to {chat_id}");
    state.logger.log(
        EventKind::MessageSent,
        format!("to: {phone_raw}, msg: {}", preview(&text, SENT_PREVIEW_CHARS)),
    );

    Ok(Json(json!({
        "success": true,
        "message": "message sent successfully",
    })))
}

/// `POST /api/send-bulk`: send a list of messages sequentially.
///
/// Each entry succeeds or fails on its own; the configured pause follows
/// every successful send.
async fn send_bulk(
    State(state): State<ApiState>,
    body: Result<Json<SendBulkRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    if !state.ctx.is_ready().await {
        return Err(bad_request("WhatsApp client is not ready"));
    }

    let items = match body {
        Ok(Json(SendBulkRequest {
            messages: Some(items),
        })) if !items.is_empty() => items,
        _ => return Err(bad_request("messages must be a non-empty array")),
    };

    let total = items.len();
    let mut results = Vec::with_capacity(total);
    let mut sent = 0usize;
    let mut failed = 0usize;

    for raw in items {
        let item: BulkItem = serde_json::from_value(raw).unwrap_or_default();
        let sa = item.sa.unwrap_or_else(|| UNKNOWN_SA.to_string());

        let (phone_raw, text) = match (required(item.phone), required(item.message)) {
            (Some(p), Some(m)) => (p, m),
            _ => {
                failed += 1;
                results.push(json!({
                    "success": false,
                    "message": "phone and message are required",
                    "sa": sa,
                }));
                continue;
            }
        };

        let chat_id = phone::normalize(&phone_raw);
        let outcome = match state.client.is_registered_user(&chat_id).await {
            Ok(true) => state.client.send_message(&chat_id, &text).await.map(|_| true),
            Ok(false) => Ok(false),
            Err(e) => Err(e),
        };

        match outcome {
            Ok(true) => {
                sent += 1;
                state.ctx.stats.lock().await.messages_sent += 1;
                state
                    .logger
                    .log(EventKind::BulkMessageSent, format!("to: {phone_raw}, sa: {sa}"));
                results.push(json!({
                    "success": true,
                    "message": "message sent",
                    "phone": phone_raw,
                    "sa": sa,
                }));
                tokio::time::sleep(state.bulk_delay).await;
            }
            Ok(false) => {
                failed += 1;
                results.push(json!({
                    "success": false,
                    "message": "number is not registered on WhatsApp",
                    "phone": phone_raw,
                    "sa": sa,
                }));
            }
            Err(e) => {
                failed += 1;
                warn!("bulk send to {chat_id} failed: {e}");
                state
                    .logger
                    .log(EventKind::Error, format!("bulk send to {phone_raw} failed: {e}"));
                results.push(json!({
                    "success": false,
                    "message": e.to_string(),
                    "phone": phone_raw,
                    "sa": sa,
                }));
            }
        }
    }

    info!("bulk send finished: {sent} sent, {failed} failed of {total}");

    Ok(Json(json!({
        "success": true,
        "results": results,
        "stats": {
            "total": total,
            "success": sent,
            "failed": failed,
        },
    })))
}

/// `POST /api/set-webhook`: activate a new webhook URL and test it.
///
/// The URL becomes active even when the test delivery fails; the response
/// then carries a `warning`. A passing test resets the webhook counters.
async fn set_webhook(
    State(state): State<ApiState>,
    body: Result<Json<SetWebhookRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let url = match body {
        Ok(Json(req)) => required(req.url),
        Err(_) => None,
    }
    .ok_or_else(|| bad_request("url is required"))?;

    match reqwest::Url::parse(&url) {
        Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => {}
        _ => return Err(bad_request("url must be a valid http(s) URL")),
    }

    state.ctx.set_webhook_url(&url).await;
    info!("webhook URL set to {url}");

    let test_payload = json!({
        "type": "test",
        "message": "webhook configured",
        "timestamp": now_rfc3339(),
    });

    if state.dispatcher.deliver(&url, &test_payload).await {
        let mut stats = state.ctx.stats.lock().await;
        stats.webhook_success = 0;
        stats.webhook_failed = 0;
        state
            .logger
            .log(EventKind::WebhookSet, format!("webhook set to: {url}"));
        Ok(Json(json!({
            "success": true,
            "message": "webhook configured and tested",
            "port": state.ctx.port,
        })))
    } else {
        warn!("webhook test delivery to {url} failed");
        state.logger.log(
            EventKind::Warning,
            format!("webhook set but test delivery failed: {url}"),
        );
        Ok(Json(json!({
            "success": true,
            "message": "webhook configured",
            "port": state.ctx.port,
            "warning": "test delivery failed, check that the URL is reachable",
        })))
    }
}
