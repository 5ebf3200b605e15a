//! Manual adapter for human-operated providers with no API.
//!
//! Every listing call succeeds immediately; nothing leaves the process.

use async_trait::async_trait;

use super::trait_::{
    AdapterError, CreatedEvent, DiscoveredEvent, EventPayload, ParsedWebhook, SalesSnapshot,
    SignatureCheck, TicketingAdapter, WebhookRequest, parse_generic_webhook,
};
use crate::models::ticketing_provider::ProviderType;

pub const MANUAL_EVENT_PREFIX: &str = "manual-";
pub const MANUAL_REMOTE_STATUS: &str = "manual";

#[derive(Debug, Clone, Copy, Default)]
pub struct ManualAdapter;

#[async_trait]
impl TicketingAdapter for ManualAdapter {
    fn provider_type(&self) -> ProviderType {
        ProviderType::Manual
    }

    async fn create_event(&self, _payload: &EventPayload) -> Result<CreatedEvent, AdapterError> {
        Ok(CreatedEvent {
            event_id: format!("{}{}", MANUAL_EVENT_PREFIX, uuid::Uuid::new_v4().simple()),
            url: None,
            status: Some(MANUAL_REMOTE_STATUS.to_string()),
        })
    }

    async fn update_event(
        &self,
        _event_id: &str,
        _payload: &EventPayload,
    ) -> Result<(), AdapterError> {
        Ok(())
    }

    async fn delete_event(&self, _event_id: &str) -> Result<(), AdapterError> {
        Ok(())
    }

    async fn get_sales(&self, _event_id: &str) -> Result<SalesSnapshot, AdapterError> {
        Ok(SalesSnapshot {
            remote_status: Some(MANUAL_REMOTE_STATUS.to_string()),
            ..SalesSnapshot::default()
        })
    }

    async fn list_events(&self) -> Result<Vec<DiscoveredEvent>, AdapterError> {
        Ok(Vec::new())
    }

    async fn test_credentials(&self) -> Result<(), AdapterError> {
        Ok(())
    }

    fn parse_webhook(&self, raw: &[u8]) -> Result<ParsedWebhook, AdapterError> {
        parse_generic_webhook(raw)
    }

    /// Manual providers rely on the unguessable URL token alone.
    fn verify_webhook_signature(&self, _request: &WebhookRequest<'_>) -> SignatureCheck {
        SignatureCheck::valid()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[tokio::test]
    async fn create_reports_manual_id_and_zero_sales() {
        let adapter = ManualAdapter;
        let payload = EventPayload {
            show_id: uuid::Uuid::new_v4(),
            title: "Door sales".to_string(),
            description: None,
            starts_at: Utc::now(),
            ends_at: None,
            venue_name: None,
            venue_address: None,
            capacity: None,
            pricing_tiers: None,
            image_url: None,
            parent_external_id: None,
        };

        let created = adapter.create_event(&payload).await.expect("created");
        assert!(created.event_id.starts_with(MANUAL_EVENT_PREFIX));

        let sales = adapter.get_sales(&created.event_id).await.expect("sales");
        assert_eq!(sales.tickets_sold, 0);
        assert_eq!(sales.revenue_cents, 0);
    }
}
