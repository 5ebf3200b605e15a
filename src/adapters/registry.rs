//! Adapter registry
//!
//! Resolves a provider row to a ready-to-use adapter: decrypts its credentials,
//! picks the implementation for its [`ProviderType`] and bounds every call with
//! the configured timeout.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use super::eventbrite::EventbriteAdapter;
use super::manual::ManualAdapter;
use super::ticket_tailor::TicketTailorAdapter;
use super::trait_::{
    AdapterError, CreatedEvent, DiscoveredEvent, EventPayload, ParsedWebhook, ProviderCredentials,
    SalesSnapshot, SignatureCheck, TicketingAdapter, WebhookRequest,
};
use crate::config::AppConfig;
use crate::crypto::{CryptoError, CryptoKey, decrypt_provider_credentials};
use crate::models::ticketing_provider::{Model as ProviderModel, ProviderType};

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("provider {provider_type} has no stored credentials")]
    MissingCredentials { provider_type: ProviderType },
    #[error("failed to decrypt provider credentials: {0}")]
    Credentials(#[from] CryptoError),
    #[error("invalid crypto key: {0}")]
    InvalidKey(CryptoError),
    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),
}

/// Shared HTTP settings handed to API-backed adapters.
#[derive(Clone)]
pub struct HttpSettings {
    pub client: Client,
    pub eventbrite_api_base: String,
    pub ticket_tailor_api_base: String,
    pub signature_tolerance_seconds: u64,
}

/// Pure selection of the adapter implementation for a provider type.
pub fn adapter_for(
    provider_type: ProviderType,
    credentials: Option<&ProviderCredentials>,
    http: &HttpSettings,
) -> Result<Arc<dyn TicketingAdapter>, RegistryError> {
    let require = || credentials.cloned().ok_or(RegistryError::MissingCredentials { provider_type });

    Ok(match provider_type {
        ProviderType::Manual => Arc::new(ManualAdapter),
        ProviderType::Eventbrite => Arc::new(EventbriteAdapter::new(
            http.client.clone(),
            http.eventbrite_api_base.clone(),
            require()?,
        )),
        ProviderType::TicketTailor => Arc::new(TicketTailorAdapter::new(
            http.client.clone(),
            http.ticket_tailor_api_base.clone(),
            require()?,
            http.signature_tolerance_seconds,
        )),
    })
}

pub struct AdapterRegistry {
    http: HttpSettings,
    crypto_key: Option<CryptoKey>,
    timeout: Duration,
    overrides: HashMap<ProviderType, Arc<dyn TicketingAdapter>>,
}

impl AdapterRegistry {
    pub fn from_config(config: &AppConfig) -> Result<Self, RegistryError> {
        let client = Client::builder()
            .timeout(config.adapter_timeout())
            .user_agent(concat!("ticketing-sync/", env!("CARGO_PKG_VERSION")))
            .build()?;

        let crypto_key = config
            .crypto_key
            .clone()
            .map(CryptoKey::new)
            .transpose()
            .map_err(RegistryError::InvalidKey)?;

        Ok(Self {
            http: HttpSettings {
                client,
                eventbrite_api_base: config.eventbrite_api_base.clone(),
                ticket_tailor_api_base: config.ticket_tailor_api_base.clone(),
                signature_tolerance_seconds: config.webhook_signature_tolerance_seconds,
            },
            crypto_key,
            timeout: config.adapter_timeout(),
            overrides: HashMap::new(),
        })
    }

    /// Use `adapter` for every provider of `provider_type` instead of the built-in one.
    pub fn with_adapter(
        mut self,
        provider_type: ProviderType,
        adapter: Arc<dyn TicketingAdapter>,
    ) -> Self {
        self.overrides.insert(provider_type, adapter);
        self
    }

    pub fn crypto_key(&self) -> Option<&CryptoKey> {
        self.crypto_key.as_ref()
    }

    /// Adapter for `provider`, bounded by the adapter timeout.
    pub fn resolve(
        &self,
        provider: &ProviderModel,
    ) -> Result<Arc<dyn TicketingAdapter>, RegistryError> {
        let provider_type = if provider.manual_only {
            ProviderType::Manual
        } else {
            provider.provider_type
        };

        let inner = match self.overrides.get(&provider_type) {
            Some(adapter) => adapter.clone(),
            None if provider_type == ProviderType::Manual => {
                adapter_for(provider_type, None, &self.http)?
            }
            None => {
                let credentials = decrypt_provider_credentials(self.crypto_key.as_ref(), provider)?;
                adapter_for(provider_type, credentials.as_ref(), &self.http)?
            }
        };

        Ok(Arc::new(TimedAdapter {
            inner,
            timeout: self.timeout,
        }))
    }
}

/// Bounds each network call with `tokio::time::timeout`.
struct TimedAdapter {
    inner: Arc<dyn TicketingAdapter>,
    timeout: Duration,
}

impl TimedAdapter {
    async fn bounded<T, F>(&self, operation: &str, future: F) -> Result<T, AdapterError>
    where
        F: std::future::Future<Output = Result<T, AdapterError>> + Send,
    {
        match tokio::time::timeout(self.timeout, future).await {
            Ok(result) => result,
            Err(_) => Err(AdapterError::transport(format!(
                "{} {} timed out after {:?}",
                self.inner.provider_type(),
                operation,
                self.timeout
            ))),
        }
    }
}

#[async_trait]
impl TicketingAdapter for TimedAdapter {
    fn provider_type(&self) -> ProviderType {
        self.inner.provider_type()
    }

    async fn create_event(&self, payload: &EventPayload) -> Result<CreatedEvent, AdapterError> {
        self.bounded("create_event", self.inner.create_event(payload))
            .await
    }

    async fn update_event(
        &self,
        event_id: &str,
        payload: &EventPayload,
    ) -> Result<(), AdapterError> {
        self.bounded("update_event", self.inner.update_event(event_id, payload))
            .await
    }

    async fn delete_event(&self, event_id: &str) -> Result<(), AdapterError> {
        self.bounded("delete_event", self.inner.delete_event(event_id))
            .await
    }

    async fn get_sales(&self, event_id: &str) -> Result<SalesSnapshot, AdapterError> {
        self.bounded("get_sales", self.inner.get_sales(event_id)).await
    }

    async fn list_events(&self) -> Result<Vec<DiscoveredEvent>, AdapterError> {
        self.bounded("list_events", self.inner.list_events()).await
    }

    async fn test_credentials(&self) -> Result<(), AdapterError> {
        self.bounded("test_credentials", self.inner.test_credentials())
            .await
    }

    fn parse_webhook(&self, raw: &[u8]) -> Result<ParsedWebhook, AdapterError> {
        self.inner.parse_webhook(raw)
    }

    fn verify_webhook_signature(&self, request: &WebhookRequest<'_>) -> SignatureCheck {
        self.inner.verify_webhook_signature(request)
    }
}
