//! Shared HTTP plumbing for the API-backed adapters.

use chrono::{DateTime, Duration, Utc};
use reqwest::{Response, StatusCode, header::HeaderMap};
use serde::de::DeserializeOwned;

use super::trait_::AdapterError;

/// Window assumed when a 429 carries no usable reset hint.
const DEFAULT_RATE_LIMIT_SECONDS: i64 = 60;
const BODY_SNIPPET_CHARS: usize = 200;

/// Map a transport-level reqwest failure.
pub fn transport_error(err: reqwest::Error) -> AdapterError {
    if err.is_timeout() {
        AdapterError::transport(format!("request timed out: {}", err))
    } else {
        AdapterError::transport(err.to_string())
    }
}

/// When a rate-limit window ends, from `Retry-After` (seconds) or a reset header
/// carrying a unix timestamp.
pub fn rate_limit_reset(headers: &HeaderMap, now: DateTime<Utc>) -> DateTime<Utc> {
    let header_str = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());

    if let Some(seconds) = header_str("retry-after").and_then(|s| s.trim().parse::<i64>().ok()) {
        return now + Duration::seconds(seconds.max(0));
    }

    for name in ["x-rate-limit-reset", "x-ratelimit-reset"] {
        if let Some(reset) = header_str(name)
            .and_then(|s| s.trim().parse::<i64>().ok())
            .and_then(|ts| DateTime::<Utc>::from_timestamp(ts, 0))
            && reset > now
        {
            return reset;
        }
    }

    now + Duration::seconds(DEFAULT_RATE_LIMIT_SECONDS)
}

/// Turn a non-success response into the canonical adapter error.
pub async fn error_for_response(provider: &str, response: Response) -> AdapterError {
    let status = response.status();
    let reset = rate_limit_reset(response.headers(), Utc::now());
    let body = response.text().await.unwrap_or_default();
    let snippet: String = body.chars().take(BODY_SNIPPET_CHARS).collect();

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => AdapterError::authentication(
            format!("{} rejected credentials ({}): {}", provider, status, snippet),
        ),
        StatusCode::TOO_MANY_REQUESTS => AdapterError::RateLimit { resets_at: reset },
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY | StatusCode::NOT_FOUND => {
            AdapterError::validation(format!("{} returned {}: {}", provider, status, snippet))
        }
        status if status.is_server_error() => {
            AdapterError::transport(format!("{} returned {}: {}", provider, status, snippet))
        }
        status => AdapterError::validation(format!(
            "{} returned unexpected {}: {}",
            provider, status, snippet
        )),
    }
}

/// Decode a JSON success body, or classify the failure.
pub async fn json_or_error<T: DeserializeOwned>(
    provider: &str,
    response: Response,
) -> Result<T, AdapterError> {
    if !response.status().is_success() {
        return Err(error_for_response(provider, response).await);
    }
    response
        .json::<T>()
        .await
        .map_err(|e| AdapterError::malformed(format!("{} response: {}", provider, e)))
}

/// Accept any success status, discarding the body.
pub async fn empty_or_error(provider: &str, response: Response) -> Result<(), AdapterError> {
    if response.status().is_success() {
        Ok(())
    } else {
        Err(error_for_response(provider, response).await)
    }
}

/// Read an id that providers emit as either a string or a number.
pub fn id_string(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
