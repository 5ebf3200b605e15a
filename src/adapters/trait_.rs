//! Ticketing adapter trait definition
//!
//! Defines the provider-agnostic contract every ticketing platform integration
//! implements, plus the canonical failure taxonomy the engine reasons about.

use async_trait::async_trait;
use axum::http::HeaderMap;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::models::ticketing_provider::ProviderType;

/// Decrypted provider credentials.
#[derive(Clone, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct ProviderCredentials {
    pub api_token: String,
    /// Provider-side organization/account id used to scope listing calls
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_organization_id: Option<String>,
    /// Shared secret for webhook signatures; `None` relies on the URL token
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook_secret: Option<String>,
}

impl std::fmt::Debug for ProviderCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderCredentials")
            .field("api_token", &"[REDACTED]")
            .field("remote_organization_id", &self.remote_organization_id)
            .field(
                "webhook_secret",
                &self.webhook_secret.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}

/// Adapter failures, already normalized from provider-specific responses.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AdapterError {
    #[error("rate limited until {resets_at}")]
    RateLimit { resets_at: DateTime<Utc> },
    #[error("authentication failed: {message}")]
    Authentication { message: String },
    #[error("rejected by provider: {message}")]
    Validation { message: String },
    #[error("transport error: {message}")]
    Transport { message: String },
    #[error("malformed provider response: {message}")]
    Malformed { message: String },
}

impl AdapterError {
    pub fn authentication<S: Into<String>>(message: S) -> Self {
        Self::Authentication {
            message: message.into(),
        }
    }

    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn transport<S: Into<String>>(message: S) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    pub fn malformed<S: Into<String>>(message: S) -> Self {
        Self::Malformed {
            message: message.into(),
        }
    }
}

/// What the engine should do about a failed adapter call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureKind {
    /// Abandon the pass and defer until the window closes
    RateLimited { resets_at: DateTime<Utc> },
    /// Mark credentials invalid; stop automated calls
    AuthExpired,
    /// Permanent for this item; record and move on
    Rejected,
    /// Retry on a later pass
    Transient,
}

/// The single place adapter failures are classified.
pub fn classify(error: &AdapterError) -> FailureKind {
    match error {
        AdapterError::RateLimit { resets_at } => FailureKind::RateLimited {
            resets_at: *resets_at,
        },
        AdapterError::Authentication { .. } => FailureKind::AuthExpired,
        AdapterError::Validation { .. } => FailureKind::Rejected,
        AdapterError::Transport { .. } | AdapterError::Malformed { .. } => FailureKind::Transient,
    }
}

/// Provider-agnostic listing payload built from the declarative setup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventPayload {
    pub show_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub starts_at: DateTime<Utc>,
    pub ends_at: Option<DateTime<Utc>>,
    pub venue_name: Option<String>,
    pub venue_address: Option<String>,
    pub capacity: Option<i32>,
    /// Opaque tier template, passed through untouched
    pub pricing_tiers: Option<Value>,
    pub image_url: Option<String>,
    /// Series/parent event when grouping shows as occurrences of one event
    pub parent_external_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedEvent {
    pub event_id: String,
    pub url: Option<String>,
    pub status: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SalesSnapshot {
    pub tickets_sold: i32,
    pub tickets_available: Option<i32>,
    pub capacity: Option<i32>,
    pub revenue_cents: i64,
    pub remote_status: Option<String>,
}

/// A provider-side event returned by discovery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveredEvent {
    pub external_event_id: String,
    pub title: String,
    pub starts_at: Option<DateTime<Utc>>,
    pub venue_name: Option<String>,
    pub url: Option<String>,
    pub status: Option<String>,
    pub raw: Value,
}

/// Normalized webhook envelope. `event_type` is lower-case dotted, e.g. `order.placed`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ParsedWebhook {
    pub event_type: String,
    pub external_order_id: Option<String>,
    pub external_event_id: Option<String>,
    pub delivery_id: Option<String>,
}

impl ParsedWebhook {
    pub fn is_order_event(&self) -> bool {
        self.event_type.starts_with("order.")
    }

    pub fn is_removal_event(&self) -> bool {
        matches!(
            self.event_type.as_str(),
            "event.cancelled" | "event.canceled" | "event.deleted"
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureCheck {
    pub valid: bool,
    pub error: Option<String>,
}

impl SignatureCheck {
    pub fn valid() -> Self {
        Self {
            valid: true,
            error: None,
        }
    }

    pub fn invalid<S: Into<String>>(error: S) -> Self {
        Self {
            valid: false,
            error: Some(error.into()),
        }
    }
}

/// Raw inbound webhook as received at the HTTP boundary.
#[derive(Debug, Clone, Copy)]
pub struct WebhookRequest<'a> {
    pub headers: &'a HeaderMap,
    pub body: &'a [u8],
    pub received_at: DateTime<Utc>,
}

#[async_trait]
pub trait TicketingAdapter: Send + Sync {
    fn provider_type(&self) -> ProviderType;

    /// Create a listing; returns the provider's id, public URL and status.
    async fn create_event(&self, payload: &EventPayload) -> Result<CreatedEvent, AdapterError>;

    async fn update_event(&self, event_id: &str, payload: &EventPayload)
    -> Result<(), AdapterError>;

    async fn delete_event(&self, event_id: &str) -> Result<(), AdapterError>;

    async fn get_sales(&self, event_id: &str) -> Result<SalesSnapshot, AdapterError>;

    /// All events visible to these credentials, for discovery.
    async fn list_events(&self) -> Result<Vec<DiscoveredEvent>, AdapterError>;

    async fn test_credentials(&self) -> Result<(), AdapterError>;

    fn parse_webhook(&self, raw: &[u8]) -> Result<ParsedWebhook, AdapterError>;

    fn verify_webhook_signature(&self, request: &WebhookRequest<'_>) -> SignatureCheck;
}

/// Parses the neutral `{event_type, order_id, event_id, delivery_id}` envelope.
pub fn parse_generic_webhook(raw: &[u8]) -> Result<ParsedWebhook, AdapterError> {
    let value: Value = serde_json::from_slice(raw)
        .map_err(|e| AdapterError::malformed(format!("webhook body is not JSON: {}", e)))?;

    let text = |key: &str| {
        value.get(key).and_then(|v| match v {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
    };

    let event_type = text("event_type")
        .or_else(|| text("type"))
        .ok_or_else(|| AdapterError::malformed("webhook body has no event type"))?;

    Ok(ParsedWebhook {
        event_type: event_type.to_ascii_lowercase(),
        external_order_id: text("order_id"),
        external_event_id: text("event_id"),
        delivery_id: text("delivery_id"),
    })
}
