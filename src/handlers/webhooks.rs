//! # Webhook Handlers
//!
//! Public endpoint for ticketing provider push notifications. The handler only
//! records, verifies and enqueues; effects are applied by
//! [`crate::webhook_processor::WebhookProcessor`].

use std::collections::BTreeMap;

use axum::{
    extract::{Path, Request, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
};
use chrono::Utc;
use metrics::counter;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::{debug, error, info, warn};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::adapters::WebhookRequest;
use crate::models::ticketing_provider::ProviderType;
use crate::server::AppState;

/// Headers never persisted in webhook logs.
const SENSITIVE_HEADERS: &[&str] = &[
    "authorization",
    "cookie",
    "set-cookie",
    "proxy-authorization",
    "x-api-key",
    "x-auth-token",
    "x-eventbrite-signature",
    "tailor-signature",
    "x-webhook-secret",
];

#[derive(Debug, Deserialize, IntoParams)]
pub struct WebhookPath {
    /// Provider type, e.g. `eventbrite` or `ticket_tailor`
    #[param(example = "eventbrite")]
    pub provider_type: String,
    /// Per-provider webhook token
    pub token: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct WebhookAccepted {
    pub received: bool,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct WebhookRejected {
    pub error: String,
}

fn reject(status: StatusCode, result: &'static str, message: &str) -> Response {
    counter!("ticketing_webhooks_received_total", "result" => result).increment(1);
    (
        status,
        Json(WebhookRejected {
            error: message.to_string(),
        }),
    )
        .into_response()
}

/// Unknown type, unknown token and disabled webhooks look identical.
fn not_found() -> Response {
    reject(StatusCode::NOT_FOUND, "not_found", "webhook endpoint not found")
}

fn filtered_headers(headers: &HeaderMap) -> JsonValue {
    let kept: BTreeMap<String, String> = headers
        .iter()
        .filter_map(|(name, value)| {
            let name = name.as_str().to_ascii_lowercase();
            if SENSITIVE_HEADERS.contains(&name.as_str()) {
                return None;
            }
            Some((name, value.to_str().unwrap_or("").to_string()))
        })
        .collect();
    serde_json::to_value(kept).unwrap_or(JsonValue::Null)
}

/// Receive a provider webhook
#[utoipa::path(
    post,
    path = "/webhooks/ticketing/{provider_type}/{token}",
    params(WebhookPath),
    request_body(content = String, description = "Raw provider payload", content_type = "application/json"),
    responses(
        (status = 200, description = "Webhook recorded and queued", body = WebhookAccepted),
        (status = 401, description = "Signature verification failed", body = WebhookRejected),
        (status = 404, description = "Unknown provider type or token", body = WebhookRejected),
        (status = 413, description = "Payload too large", body = WebhookRejected),
        (status = 500, description = "Internal error", body = WebhookRejected)
    ),
    tag = "webhooks"
)]
pub async fn receive_webhook(
    State(state): State<AppState>,
    Path(path): Path<WebhookPath>,
    req: Request,
) -> Response {
    let Ok(provider_type) = path.provider_type.parse::<ProviderType>() else {
        debug!(provider_type = %path.provider_type, "Webhook for unknown provider type");
        return not_found();
    };

    let providers = state.engine.providers();
    let provider = match providers
        .find_by_webhook_token(provider_type, &path.token)
        .await
    {
        Ok(Some(provider)) if provider.active && provider.webhook_enabled => provider,
        Ok(_) => return not_found(),
        Err(err) => {
            error!(error = ?err, "Failed to look up webhook provider");
            return reject(StatusCode::INTERNAL_SERVER_ERROR, "error", "internal error");
        }
    };

    let headers = req.headers().clone();
    let max_bytes = state.config.webhook_max_body_kb * 1024;
    let body = match axum::body::to_bytes(req.into_body(), max_bytes).await {
        Ok(bytes) => bytes,
        Err(err) => {
            warn!(provider_id = %provider.id, error = %err, "Webhook body rejected");
            record_oversized(&state, provider.id, &headers, max_bytes).await;
            return reject(StatusCode::PAYLOAD_TOO_LARGE, "too_large", "payload too large");
        }
    };

    let logs = state.engine.webhook_logs();
    let log = match logs
        .record_received(
            provider.id,
            String::from_utf8_lossy(&body).into_owned(),
            filtered_headers(&headers),
        )
        .await
    {
        Ok(log) => log,
        Err(err) => {
            error!(provider_id = %provider.id, error = ?err, "Failed to record webhook");
            return reject(StatusCode::INTERNAL_SERVER_ERROR, "error", "internal error");
        }
    };

    let received_at = Utc::now();
    let check = match state.engine.registry.resolve(&provider) {
        Ok(adapter) => adapter.verify_webhook_signature(&WebhookRequest {
            headers: &headers,
            body: &body,
            received_at,
        }),
        Err(err) => {
            error!(provider_id = %provider.id, error = %err, "Cannot resolve adapter for webhook");
            if let Err(err) = logs.mark_failed(log.id, &err.to_string()).await {
                error!(log_id = %log.id, error = ?err, "Failed to mark webhook log failed");
            }
            return reject(StatusCode::INTERNAL_SERVER_ERROR, "error", "internal error");
        }
    };

    if !check.valid {
        let message = check.error.unwrap_or_else(|| "invalid signature".to_string());
        warn!(provider_id = %provider.id, log_id = %log.id, error = %message, "Webhook signature rejected");
        if let Err(err) = logs.mark_signature_invalid(log.id, &message).await {
            error!(log_id = %log.id, error = ?err, "Failed to mark webhook signature invalid");
        }
        return reject(StatusCode::UNAUTHORIZED, "invalid_signature", &message);
    }

    if let Err(err) = logs.mark_signature_valid(log.id).await {
        error!(log_id = %log.id, error = ?err, "Failed to mark webhook signature valid");
        return reject(StatusCode::INTERNAL_SERVER_ERROR, "error", "internal error");
    }
    if let Err(err) = providers.touch_last_webhook(provider.id, received_at).await {
        warn!(provider_id = %provider.id, error = ?err, "Failed to stamp last webhook time");
    }

    state.webhook_queue.enqueue(log.id);
    counter!("ticketing_webhooks_received_total", "result" => "accepted").increment(1);
    info!(provider_id = %provider.id, log_id = %log.id, "Webhook accepted");

    (StatusCode::OK, Json(WebhookAccepted { received: true })).into_response()
}

/// Leaves an empty-payload `failed` log so rejected bodies stay auditable.
async fn record_oversized(state: &AppState, provider_id: Uuid, headers: &HeaderMap, max_bytes: usize) {
    let logs = state.engine.webhook_logs();
    match logs
        .record_received(provider_id, String::new(), filtered_headers(headers))
        .await
    {
        Ok(log) => {
            let reason = format!("payload exceeds {} bytes", max_bytes);
            if let Err(err) = logs.mark_failed(log.id, &reason).await {
                error!(log_id = %log.id, error = ?err, "Failed to mark webhook log failed");
            }
        }
        Err(err) => error!(%provider_id, error = ?err, "Failed to record oversized webhook"),
    }
    counter!("ticketing_webhooks_received_total", "result" => "too_large").increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn sensitive_headers_are_not_persisted() {
        let mut headers = HeaderMap::new();
        headers.insert("content-type", HeaderValue::from_static("application/json"));
        headers.insert("authorization", HeaderValue::from_static("Bearer secret"));
        headers.insert("x-eventbrite-signature", HeaderValue::from_static("abc"));

        let kept = filtered_headers(&headers);
        assert_eq!(kept["content-type"], "application/json");
        assert!(kept.get("authorization").is_none());
        assert!(kept.get("x-eventbrite-signature").is_none());
    }
}
