//! Ticket Tailor adapter
//!
//! HTTP basic auth with the API key as username. Shapes used:
//!
//! - `POST {base}/events` → `{id, url, status}`; `POST {base}/events/{id}` updates
//! - `DELETE {base}/events/{id}`
//! - `GET {base}/events/{id}` → `{status, total_issued_tickets, tickets_available,
//!   capacity, revenue_cents}`
//! - `GET {base}/events` → `{data: [...], links: {next}}`
//! - `GET {base}/overview` for credential checks
//!
//! Webhooks carry `{"id", "event": "ORDER.CREATED", "payload": {...}}` and are signed
//! with `Tailor-Signature: t=<unix>,v1=<hex>`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Value, json};

use super::http::{empty_or_error, id_string, json_or_error, transport_error};
use super::trait_::{
    AdapterError, CreatedEvent, DiscoveredEvent, EventPayload, ParsedWebhook, ProviderCredentials,
    SalesSnapshot, SignatureCheck, TicketingAdapter, WebhookRequest,
};
use crate::models::ticketing_provider::ProviderType;
use crate::webhook_verification::{TICKET_TAILOR_SIGNATURE_HEADER, verify_ticket_tailor_signature};

const PROVIDER: &str = "ticket_tailor";
const MAX_DISCOVERY_PAGES: usize = 20;

#[derive(Clone)]
pub struct TicketTailorAdapter {
    client: Client,
    api_base: String,
    credentials: ProviderCredentials,
    signature_tolerance_seconds: u64,
}

#[derive(Debug, Deserialize)]
struct CreatedEventResponse {
    id: Value,
    url: Option<String>,
    status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EventResponse {
    status: Option<String>,
    #[serde(default)]
    total_issued_tickets: i32,
    tickets_available: Option<i32>,
    capacity: Option<i32>,
    #[serde(default)]
    revenue_cents: i64,
}

#[derive(Debug, Deserialize)]
struct EventListResponse {
    #[serde(default)]
    data: Vec<Value>,
    links: Option<Links>,
}

#[derive(Debug, Deserialize)]
struct Links {
    next: Option<String>,
}

impl TicketTailorAdapter {
    pub fn new(
        client: Client,
        api_base: String,
        credentials: ProviderCredentials,
        signature_tolerance_seconds: u64,
    ) -> Self {
        Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            credentials,
            signature_tolerance_seconds,
        }
    }

    fn event_body(payload: &EventPayload) -> Value {
        json!({
            "name": payload.title,
            "description": payload.description,
            "start_at": payload.starts_at.to_rfc3339(),
            "end_at": payload.ends_at.map(|e| e.to_rfc3339()),
            "venue": {
                "name": payload.venue_name,
                "address": payload.venue_address,
            },
            "capacity": payload.capacity,
            "ticket_types": payload.pricing_tiers,
            "image_url": payload.image_url,
            "event_series_id": payload.parent_external_id,
        })
    }

    fn discovered_from(raw: Value) -> Option<DiscoveredEvent> {
        let external_event_id = raw.get("id").and_then(id_string)?;
        let starts_at = raw
            .pointer("/start/iso")
            .or_else(|| raw.get("start_at"))
            .and_then(|v| v.as_str())
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc));

        Some(DiscoveredEvent {
            external_event_id,
            title: raw
                .get("name")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string(),
            starts_at,
            venue_name: raw
                .pointer("/venue/name")
                .and_then(|v| v.as_str())
                .map(str::to_string),
            url: raw.get("url").and_then(|v| v.as_str()).map(str::to_string),
            status: raw
                .get("status")
                .and_then(|v| v.as_str())
                .map(str::to_string),
            raw,
        })
    }

    fn get(&self, url: &str) -> reqwest::RequestBuilder {
        self.client
            .get(url)
            .basic_auth(&self.credentials.api_token, None::<&str>)
    }
}

#[async_trait]
impl TicketingAdapter for TicketTailorAdapter {
    fn provider_type(&self) -> ProviderType {
        ProviderType::TicketTailor
    }

    async fn create_event(&self, payload: &EventPayload) -> Result<CreatedEvent, AdapterError> {
        let response = self
            .client
            .post(format!("{}/events", self.api_base))
            .basic_auth(&self.credentials.api_token, None::<&str>)
            .json(&Self::event_body(payload))
            .send()
            .await
            .map_err(transport_error)?;

        let created: CreatedEventResponse = json_or_error(PROVIDER, response).await?;
        let event_id = id_string(&created.id)
            .ok_or_else(|| AdapterError::malformed("Ticket Tailor create returned no event id"))?;

        Ok(CreatedEvent {
            event_id,
            url: created.url,
            status: created.status,
        })
    }

    async fn update_event(
        &self,
        event_id: &str,
        payload: &EventPayload,
    ) -> Result<(), AdapterError> {
        let response = self
            .client
            .post(format!("{}/events/{}", self.api_base, event_id))
            .basic_auth(&self.credentials.api_token, None::<&str>)
            .json(&Self::event_body(payload))
            .send()
            .await
            .map_err(transport_error)?;

        empty_or_error(PROVIDER, response).await
    }

    async fn delete_event(&self, event_id: &str) -> Result<(), AdapterError> {
        let response = self
            .client
            .delete(format!("{}/events/{}", self.api_base, event_id))
            .basic_auth(&self.credentials.api_token, None::<&str>)
            .send()
            .await
            .map_err(transport_error)?;

        empty_or_error(PROVIDER, response).await
    }

    async fn get_sales(&self, event_id: &str) -> Result<SalesSnapshot, AdapterError> {
        let response = self
            .get(&format!("{}/events/{}", self.api_base, event_id))
            .send()
            .await
            .map_err(transport_error)?;

        let event: EventResponse = json_or_error(PROVIDER, response).await?;

        Ok(SalesSnapshot {
            tickets_sold: event.total_issued_tickets,
            tickets_available: event.tickets_available,
            capacity: event.capacity,
            revenue_cents: event.revenue_cents,
            remote_status: event.status,
        })
    }

    async fn list_events(&self) -> Result<Vec<DiscoveredEvent>, AdapterError> {
        let mut next_url = Some(format!("{}/events", self.api_base));
        let mut events = Vec::new();

        for _ in 0..MAX_DISCOVERY_PAGES {
            let Some(url) = next_url.take() else {
                break;
            };

            let response = self.get(&url).send().await.map_err(transport_error)?;
            let page: EventListResponse = json_or_error(PROVIDER, response).await?;
            events.extend(page.data.into_iter().filter_map(Self::discovered_from));

            next_url = page
                .links
                .and_then(|links| links.next)
                .filter(|next| !next.is_empty())
                .map(|next| {
                    if next.starts_with("http") {
                        next
                    } else {
                        format!("{}{}", self.api_base, next)
                    }
                });
        }

        Ok(events)
    }

    async fn test_credentials(&self) -> Result<(), AdapterError> {
        let response = self
            .get(&format!("{}/overview", self.api_base))
            .send()
            .await
            .map_err(transport_error)?;

        empty_or_error(PROVIDER, response).await
    }

    fn parse_webhook(&self, raw: &[u8]) -> Result<ParsedWebhook, AdapterError> {
        let value: Value = serde_json::from_slice(raw)
            .map_err(|e| AdapterError::malformed(format!("Ticket Tailor webhook: {}", e)))?;

        let event = value
            .get("event")
            .and_then(|v| v.as_str())
            .ok_or_else(|| AdapterError::malformed("Ticket Tailor webhook has no event"))?
            .to_ascii_lowercase();

        let payload = value.get("payload").cloned().unwrap_or(Value::Null);
        let (external_order_id, external_event_id) = if event.starts_with("order.") {
            (
                payload.get("id").and_then(id_string),
                payload
                    .get("event_id")
                    .or_else(|| payload.pointer("/event_summary/event_id"))
                    .and_then(id_string),
            )
        } else {
            (None, payload.get("id").and_then(id_string))
        };

        Ok(ParsedWebhook {
            event_type: event,
            external_order_id,
            external_event_id,
            delivery_id: value.get("id").and_then(id_string),
        })
    }

    fn verify_webhook_signature(&self, request: &WebhookRequest<'_>) -> SignatureCheck {
        let Some(secret) = self.credentials.webhook_secret.as_deref() else {
            return SignatureCheck::valid();
        };

        let header = request
            .headers
            .get(TICKET_TAILOR_SIGNATURE_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");

        match verify_ticket_tailor_signature(
            request.body,
            header,
            secret,
            self.signature_tolerance_seconds,
            request.received_at.timestamp(),
        ) {
            Ok(()) => SignatureCheck::valid(),
            Err(e) => SignatureCheck::invalid(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use uuid::Uuid;
    use wiremock::matchers::{header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn adapter(base: &str) -> TicketTailorAdapter {
        TicketTailorAdapter::new(
            Client::new(),
            base.to_string(),
            ProviderCredentials {
                api_token: "sk_test".to_string(),
                remote_organization_id: None,
                webhook_secret: Some("tt-secret".to_string()),
            },
            300,
        )
    }

    fn payload() -> EventPayload {
        EventPayload {
            show_id: Uuid::new_v4(),
            title: "Cabaret".to_string(),
            description: None,
            starts_at: Utc.with_ymd_and_hms(2026, 12, 1, 20, 0, 0).unwrap(),
            ends_at: None,
            venue_name: Some("Studio".to_string()),
            venue_address: None,
            capacity: Some(80),
            pricing_tiers: Some(json!([{ "name": "General", "price": 2500 }])),
            image_url: None,
            parent_external_id: Some("es_1".to_string()),
        }
    }

    #[tokio::test]
    async fn create_uses_basic_auth() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/events"))
            .and(header_exists("authorization"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "id": "ev_100",
                "url": "https://tickettailor.example/ev_100",
                "status": "published"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let created = adapter(&server.uri())
            .create_event(&payload())
            .await
            .expect("created");

        assert_eq!(created.event_id, "ev_100");
    }

    #[tokio::test]
    async fn forbidden_is_authentication_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/overview"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        assert!(matches!(
            adapter(&server.uri()).test_credentials().await,
            Err(AdapterError::Authentication { .. })
        ));
    }

    #[tokio::test]
    async fn malformed_sales_body_is_classified() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/events/ev_1"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&server)
            .await;

        assert!(matches!(
            adapter(&server.uri()).get_sales("ev_1").await,
            Err(AdapterError::Malformed { .. })
        ));
    }

    #[tokio::test]
    async fn list_events_follows_next_links() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/events/page2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [{ "id": "ev_2", "name": "Matinee" }],
                "links": { "next": null }
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/events"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [{
                    "id": "ev_1",
                    "name": "Evening",
                    "start": { "iso": "2026-12-01T20:00:00+00:00" },
                    "venue": { "name": "Studio" }
                }],
                "links": { "next": "/events/page2" }
            })))
            .mount(&server)
            .await;

        let events = adapter(&server.uri())
            .list_events()
            .await
            .expect("events");

        let ids: Vec<_> = events.iter().map(|e| e.external_event_id.as_str()).collect();
        assert_eq!(ids, vec!["ev_1", "ev_2"]);
    }

    #[test]
    fn parse_order_webhook() {
        let parsed = adapter("http://unused")
            .parse_webhook(
                br#"{"id":"wh_9","event":"ORDER.CREATED","payload":{"id":"or_5","event_id":"ev_1"}}"#,
            )
            .expect("parsed");

        assert_eq!(parsed.event_type, "order.created");
        assert_eq!(parsed.delivery_id.as_deref(), Some("wh_9"));
        assert_eq!(parsed.external_order_id.as_deref(), Some("or_5"));
        assert_eq!(parsed.external_event_id.as_deref(), Some("ev_1"));
    }

    #[test]
    fn signature_uses_received_at_for_tolerance() {
        let body = br#"{"event":"EVENT.UPDATED"}"#;
        let received_at = Utc.with_ymd_and_hms(2026, 10, 1, 12, 0, 0).unwrap();
        let ts = received_at.timestamp() - 10;
        let mut signed = format!("{}.", ts).into_bytes();
        signed.extend_from_slice(body);
        let value = format!(
            "t={},v1={}",
            ts,
            crate::webhook_verification::hmac_sha256_hex("tt-secret", &signed)
        );

        let mut headers = axum::http::HeaderMap::new();
        headers.insert(TICKET_TAILOR_SIGNATURE_HEADER, value.parse().unwrap());

        let fresh = WebhookRequest {
            headers: &headers,
            body,
            received_at,
        };
        assert!(adapter("http://unused").verify_webhook_signature(&fresh).valid);

        let late = WebhookRequest {
            received_at: received_at + chrono::Duration::minutes(10),
            ..fresh
        };
        let check = adapter("http://unused").verify_webhook_signature(&late);
        assert!(!check.valid);
        assert!(check.error.is_some());
    }
}
