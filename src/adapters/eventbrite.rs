//! Eventbrite adapter
//!
//! Talks to an Eventbrite-style REST API with bearer-token auth. Shapes used:
//!
//! - `POST {base}/organizations/{org}/events/` `{"event": {...}}` → `{id, url, status}`
//! - `POST {base}/events/{id}/` update, `DELETE {base}/events/{id}/`
//! - `GET {base}/events/{id}/?expand=ticket_availability` for sales
//! - `GET {base}/organizations/{org}/events/?continuation=..` for discovery
//! - `GET {base}/users/me/` for credential checks
//!
//! Webhooks carry `{"config": {"action"}, "api_url", "event_id"?, "delivery_id"?}`
//! and are signed with `X-Eventbrite-Signature`.

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
use crate::webhook_verification::{EVENTBRITE_SIGNATURE_HEADER, verify_eventbrite_signature};

const PROVIDER: &str = "eventbrite";
const MAX_DISCOVERY_PAGES: usize = 20;

#[derive(Clone)]
pub struct EventbriteAdapter {
    client: Client,
    api_base: String,
    credentials: ProviderCredentials,
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
    capacity: Option<i32>,
    #[serde(default)]
    ticket_availability: Option<TicketAvailability>,
}

#[derive(Debug, Deserialize)]
struct TicketAvailability {
    #[serde(default)]
    quantity_sold: i32,
    quantity_remaining: Option<i32>,
    revenue: Option<Money>,
}

#[derive(Debug, Deserialize)]
struct Money {
    #[serde(default)]
    value: i64,
}

#[derive(Debug, Deserialize)]
struct EventListResponse {
    #[serde(default)]
    events: Vec<Value>,
    pagination: Option<Pagination>,
}

#[derive(Debug, Deserialize)]
struct Pagination {
    #[serde(default)]
    has_more_items: bool,
    continuation: Option<String>,
}

impl EventbriteAdapter {
    pub fn new(client: Client, api_base: String, credentials: ProviderCredentials) -> Self {
        Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            credentials,
        }
    }

    fn organization(&self) -> Result<&str, AdapterError> {
        self.credentials
            .remote_organization_id
            .as_deref()
            .ok_or_else(|| AdapterError::validation("Eventbrite organization id is not configured"))
    }

    fn event_body(payload: &EventPayload) -> Value {
        json!({
            "event": {
                "name": { "html": payload.title },
                "description": payload.description.as_ref().map(|d| json!({ "html": d })),
                "start": { "utc": payload.starts_at.format("%Y-%m-%dT%H:%M:%SZ").to_string(), "timezone": "UTC" },
                "end": payload.ends_at.map(|e| json!({ "utc": e.format("%Y-%m-%dT%H:%M:%SZ").to_string(), "timezone": "UTC" })),
                "capacity": payload.capacity,
                "venue_name": payload.venue_name,
                "venue_address": payload.venue_address,
                "logo_url": payload.image_url,
                "ticket_classes": payload.pricing_tiers,
                "series_parent_id": payload.parent_external_id,
            }
        })
    }

    fn discovered_from(raw: Value) -> Option<DiscoveredEvent> {
        let external_event_id = raw.get("id").and_then(id_string)?;
        let title = raw
            .pointer("/name/text")
            .or_else(|| raw.pointer("/name/html"))
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        let starts_at = raw
            .pointer("/start/utc")
            .and_then(|v| v.as_str())
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc));
        let venue_name = raw
            .pointer("/venue/name")
            .and_then(|v| v.as_str())
            .map(str::to_string);
        let url = raw.get("url").and_then(|v| v.as_str()).map(str::to_string);
        let status = raw
            .get("status")
            .and_then(|v| v.as_str())
            .map(str::to_string);

        Some(DiscoveredEvent {
            external_event_id,
            title,
            starts_at,
            venue_name,
            url,
            status,
            raw,
        })
    }
}

/// Pull the id following `segment` out of an Eventbrite `api_url`.
fn id_after_segment(api_url: &str, segment: &str) -> Option<String> {
    let parsed = url::Url::parse(api_url).ok()?;
    let mut parts = parsed.path_segments()?;
    parts.by_ref().find(|part| *part == segment)?;
    parts.next().filter(|id| !id.is_empty()).map(str::to_string)
}

#[async_trait]
impl TicketingAdapter for EventbriteAdapter {
    fn provider_type(&self) -> ProviderType {
        ProviderType::Eventbrite
    }

    async fn create_event(&self, payload: &EventPayload) -> Result<CreatedEvent, AdapterError> {
        let url = format!(
            "{}/organizations/{}/events/",
            self.api_base,
            self.organization()?
        );
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.credentials.api_token)
            .json(&Self::event_body(payload))
            .send()
            .await
            .map_err(transport_error)?;

        let created: CreatedEventResponse = json_or_error(PROVIDER, response).await?;
        let event_id = id_string(&created.id)
            .ok_or_else(|| AdapterError::malformed("Eventbrite create returned no event id"))?;

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
            .post(format!("{}/events/{}/", self.api_base, event_id))
            .bearer_auth(&self.credentials.api_token)
            .json(&Self::event_body(payload))
            .send()
            .await
            .map_err(transport_error)?;

        empty_or_error(PROVIDER, response).await
    }

    async fn delete_event(&self, event_id: &str) -> Result<(), AdapterError> {
        let response = self
            .client
            .delete(format!("{}/events/{}/", self.api_base, event_id))
            .bearer_auth(&self.credentials.api_token)
            .send()
            .await
            .map_err(transport_error)?;

        empty_or_error(PROVIDER, response).await
    }

    async fn get_sales(&self, event_id: &str) -> Result<SalesSnapshot, AdapterError> {
        let response = self
            .client
            .get(format!("{}/events/{}/", self.api_base, event_id))
            .query(&[("expand", "ticket_availability")])
            .bearer_auth(&self.credentials.api_token)
            .send()
            .await
            .map_err(transport_error)?;

        let event: EventResponse = json_or_error(PROVIDER, response).await?;
        let availability = event.ticket_availability;

        Ok(SalesSnapshot {
            tickets_sold: availability.as_ref().map(|a| a.quantity_sold).unwrap_or(0),
            tickets_available: availability.as_ref().and_then(|a| a.quantity_remaining),
            capacity: event.capacity,
            revenue_cents: availability
                .as_ref()
                .and_then(|a| a.revenue.as_ref())
                .map(|m| m.value)
                .unwrap_or(0),
            remote_status: event.status,
        })
    }

    async fn list_events(&self) -> Result<Vec<DiscoveredEvent>, AdapterError> {
        let url = format!(
            "{}/organizations/{}/events/",
            self.api_base,
            self.organization()?
        );
        let mut continuation: Option<String> = None;
        let mut events = Vec::new();

        for _ in 0..MAX_DISCOVERY_PAGES {
            let mut request = self
                .client
                .get(&url)
                .bearer_auth(&self.credentials.api_token)
                .query(&[("expand", "venue")]);
            if let Some(token) = continuation.as_deref() {
                request = request.query(&[("continuation", token)]);
            }

            let response = request.send().await.map_err(transport_error)?;
            let page: EventListResponse = json_or_error(PROVIDER, response).await?;
            events.extend(page.events.into_iter().filter_map(Self::discovered_from));

            match page.pagination {
                Some(Pagination {
                    has_more_items: true,
                    continuation: Some(next),
                }) => continuation = Some(next),
                _ => break,
            }
        }

        Ok(events)
    }

    async fn test_credentials(&self) -> Result<(), AdapterError> {
        let response = self
            .client
            .get(format!("{}/users/me/", self.api_base))
            .bearer_auth(&self.credentials.api_token)
            .send()
            .await
            .map_err(transport_error)?;

        empty_or_error(PROVIDER, response).await
    }

    fn parse_webhook(&self, raw: &[u8]) -> Result<ParsedWebhook, AdapterError> {
        let value: Value = serde_json::from_slice(raw)
            .map_err(|e| AdapterError::malformed(format!("Eventbrite webhook: {}", e)))?;

        let action = value
            .pointer("/config/action")
            .and_then(|v| v.as_str())
            .ok_or_else(|| AdapterError::malformed("Eventbrite webhook has no config.action"))?;
        let api_url = value.get("api_url").and_then(|v| v.as_str()).unwrap_or("");

        let external_order_id = id_after_segment(api_url, "orders")
            .or_else(|| value.get("order_id").and_then(id_string));
        let external_event_id = value
            .get("event_id")
            .and_then(id_string)
            .or_else(|| id_after_segment(api_url, "events"));

        Ok(ParsedWebhook {
            event_type: action.to_ascii_lowercase(),
            external_order_id,
            external_event_id,
            delivery_id: value.get("delivery_id").and_then(id_string),
        })
    }

    fn verify_webhook_signature(&self, request: &WebhookRequest<'_>) -> SignatureCheck {
        let Some(secret) = self.credentials.webhook_secret.as_deref() else {
            return SignatureCheck::valid();
        };

        let header = request
            .headers
            .get(EVENTBRITE_SIGNATURE_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");

        match verify_eventbrite_signature(request.body, header, secret) {
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
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn adapter(base: &str, secret: Option<&str>) -> EventbriteAdapter {
        EventbriteAdapter::new(
            Client::new(),
            base.to_string(),
            ProviderCredentials {
                api_token: "eb-token".to_string(),
                remote_organization_id: Some("org-1".to_string()),
                webhook_secret: secret.map(str::to_string),
            },
        )
    }

    fn payload() -> EventPayload {
        EventPayload {
            show_id: Uuid::new_v4(),
            title: "Hamlet - Fri 7:30pm".to_string(),
            description: Some("Opening night".to_string()),
            starts_at: Utc.with_ymd_and_hms(2026, 11, 6, 19, 30, 0).unwrap(),
            ends_at: None,
            venue_name: Some("Main Stage".to_string()),
            venue_address: None,
            capacity: Some(200),
            pricing_tiers: None,
            image_url: None,
            parent_external_id: None,
        }
    }

    #[tokio::test]
    async fn create_event_returns_provider_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/organizations/org-1/events/"))
            .and(header("authorization", "Bearer eb-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "12345",
                "url": "https://eventbrite.example/e/12345",
                "status": "live"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let created = adapter(&server.uri(), None)
            .create_event(&payload())
            .await
            .expect("created");

        assert_eq!(created.event_id, "12345");
        assert_eq!(created.status.as_deref(), Some("live"));
    }

    #[tokio::test]
    async fn rate_limit_uses_retry_after() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/organizations/org-1/events/"))
            .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "600"))
            .mount(&server)
            .await;

        let before = Utc::now();
        let err = adapter(&server.uri(), None)
            .create_event(&payload())
            .await
            .unwrap_err();

        match err {
            AdapterError::RateLimit { resets_at } => {
                assert!(resets_at >= before + chrono::Duration::seconds(599));
            }
            other => panic!("expected rate limit, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn status_codes_map_to_canonical_errors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/users/me/"))
            .respond_with(ResponseTemplate::new(401).set_body_string("token expired"))
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/events/9/"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/events/9/"))
            .respond_with(ResponseTemplate::new(400).set_body_string("bad start date"))
            .mount(&server)
            .await;

        let adapter = adapter(&server.uri(), None);

        assert!(matches!(
            adapter.test_credentials().await,
            Err(AdapterError::Authentication { .. })
        ));
        assert!(matches!(
            adapter.delete_event("9").await,
            Err(AdapterError::Transport { .. })
        ));
        assert!(matches!(
            adapter.update_event("9", &payload()).await,
            Err(AdapterError::Validation { .. })
        ));
    }

    #[tokio::test]
    async fn get_sales_reads_ticket_availability() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/events/77/"))
            .and(query_param("expand", "ticket_availability"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "77",
                "status": "live",
                "capacity": 100,
                "ticket_availability": {
                    "quantity_sold": 15,
                    "quantity_remaining": 85,
                    "revenue": { "value": 37500 }
                }
            })))
            .mount(&server)
            .await;

        let sales = adapter(&server.uri(), None)
            .get_sales("77")
            .await
            .expect("sales");

        assert_eq!(sales.tickets_sold, 15);
        assert_eq!(sales.tickets_available, Some(85));
        assert_eq!(sales.revenue_cents, 37500);
        assert_eq!(sales.remote_status.as_deref(), Some("live"));
    }

    #[tokio::test]
    async fn list_events_follows_continuation() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/organizations/org-1/events/"))
            .and(query_param("continuation", "page-2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "events": [{ "id": "2", "name": { "text": "Second" }, "status": "live" }],
                "pagination": { "has_more_items": false }
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/organizations/org-1/events/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "events": [{
                    "id": "1",
                    "name": { "text": "First" },
                    "start": { "utc": "2026-11-06T19:30:00Z" },
                    "venue": { "name": "Main Stage" }
                }],
                "pagination": { "has_more_items": true, "continuation": "page-2" }
            })))
            .mount(&server)
            .await;

        let events = adapter(&server.uri(), None)
            .list_events()
            .await
            .expect("events");

        assert_eq!(events.len(), 2);
        assert_eq!(events[0].title, "First");
        assert_eq!(events[0].venue_name.as_deref(), Some("Main Stage"));
        assert!(events[0].starts_at.is_some());
        assert_eq!(events[1].external_event_id, "2");
    }

    #[test]
    fn parse_webhook_extracts_ids_from_api_url() {
        let parsed = adapter("http://unused", None)
            .parse_webhook(
                br#"{"config":{"action":"order.placed"},"api_url":"https://www.eventbriteapi.com/v3/orders/555/","event_id":"77"}"#,
            )
            .expect("parsed");

        assert_eq!(parsed.event_type, "order.placed");
        assert_eq!(parsed.external_order_id.as_deref(), Some("555"));
        assert_eq!(parsed.external_event_id.as_deref(), Some("77"));
    }

    #[test]
    fn signature_check_uses_configured_secret() {
        let body = br#"{"config":{"action":"event.updated"}}"#;
        let mut headers = axum::http::HeaderMap::new();
        headers.insert(
            EVENTBRITE_SIGNATURE_HEADER,
            crate::webhook_verification::hmac_sha256_hex("whsec", body)
                .parse()
                .unwrap(),
        );
        let request = WebhookRequest {
            headers: &headers,
            body,
            received_at: Utc::now(),
        };

        assert!(adapter("http://unused", Some("whsec")).verify_webhook_signature(&request).valid);
        assert!(!adapter("http://unused", Some("other")).verify_webhook_signature(&request).valid);
        assert!(adapter("http://unused", None).verify_webhook_signature(&request).valid);
    }
}
