//! Test utilities for database and engine testing.
//!
//! Provides an in-memory SQLite database with migrations applied, catalog and
//! provider fixtures, and a scripted adapter that records every call.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use migration::{Migrator, MigratorTrait};
use sea_orm::{ActiveModelTrait, ConnectOptions, Database, DatabaseConnection, Set};
use ticketing_sync::adapters::{
    AdapterError, AdapterRegistry, CreatedEvent, DiscoveredEvent, EventPayload, ParsedWebhook,
    SalesSnapshot, SignatureCheck, TicketingAdapter, WebhookRequest, parse_generic_webhook,
};
use ticketing_sync::broadcast::StatusBroadcaster;
use ticketing_sync::config::AppConfig;
use ticketing_sync::engine::EngineContext;
use ticketing_sync::models::ticketing_provider::{self, ProviderType};
use ticketing_sync::models::{organization, production, show, ticketing_setup};
use ticketing_sync::repositories::{NewProvider, NewSetup};
use uuid::Uuid;

pub const TEST_OPERATOR_TOKEN: &str = "test-operator-token";

/// Header the scripted adapter checks instead of a real signature.
pub const TEST_SIGNATURE_HEADER: &str = "x-test-signature";

/// Sets up an in-memory SQLite database with all migrations applied.
///
/// A single pooled connection keeps every query on the same in-memory database.
pub async fn setup_test_db() -> Result<DatabaseConnection> {
    let mut options = ConnectOptions::new("sqlite::memory:");
    options
        .max_connections(1)
        .min_connections(1)
        .acquire_timeout(Duration::from_secs(5))
        .sqlx_logging(false);
    let db = Database::connect(options).await?;

    Migrator::up(&db, None).await?;

    Ok(db)
}

pub fn test_config() -> AppConfig {
    AppConfig {
        profile: "test".to_string(),
        operator_tokens: vec![TEST_OPERATOR_TOKEN.to_string()],
        ..AppConfig::default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Create,
    Update,
    Delete,
    Sales,
    List,
    TestCredentials,
}

/// Adapter double. Creates, updates and deletes succeed unless a failure was
/// queued; every call is counted per operation.
#[derive(Default)]
pub struct ScriptedAdapter {
    created: AtomicUsize,
    calls: Mutex<Vec<Op>>,
    create_failures: Mutex<VecDeque<Option<AdapterError>>>,
    update_failures: Mutex<VecDeque<Option<AdapterError>>>,
    delete_failures: Mutex<VecDeque<Option<AdapterError>>>,
    updated_ids: Mutex<Vec<String>>,
    deleted_ids: Mutex<Vec<String>>,
    payloads: Mutex<Vec<EventPayload>>,
    sales: Mutex<SalesSnapshot>,
    sales_failure: Mutex<Option<AdapterError>>,
    events: Mutex<Vec<DiscoveredEvent>>,
    list_failure: Mutex<Option<AdapterError>>,
    credentials_failure: Mutex<Option<AdapterError>>,
}

impl ScriptedAdapter {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Queues the outcome of the next create calls; `None` means success.
    pub fn script_creates(&self, outcomes: Vec<Option<AdapterError>>) {
        self.create_failures.lock().unwrap().extend(outcomes);
    }

    /// Queues the outcome of the next update calls; `None` means success.
    pub fn script_updates(&self, outcomes: Vec<Option<AdapterError>>) {
        self.update_failures.lock().unwrap().extend(outcomes);
    }

    /// Queues the outcome of the next delete calls; `None` means success.
    pub fn script_deletes(&self, outcomes: Vec<Option<AdapterError>>) {
        self.delete_failures.lock().unwrap().extend(outcomes);
    }

    /// External ids passed to successful update calls, in order.
    pub fn updated_ids(&self) -> Vec<String> {
        self.updated_ids.lock().unwrap().clone()
    }

    /// External ids passed to successful delete calls, in order.
    pub fn deleted_ids(&self) -> Vec<String> {
        self.deleted_ids.lock().unwrap().clone()
    }

    /// Every payload sent to create or update, in order.
    pub fn payloads(&self) -> Vec<EventPayload> {
        self.payloads.lock().unwrap().clone()
    }

    pub fn set_sales(&self, snapshot: SalesSnapshot) {
        *self.sales.lock().unwrap() = snapshot;
    }

    pub fn fail_sales(&self, error: AdapterError) {
        *self.sales_failure.lock().unwrap() = Some(error);
    }

    pub fn set_events(&self, events: Vec<DiscoveredEvent>) {
        *self.events.lock().unwrap() = events;
    }

    pub fn fail_listing(&self, error: AdapterError) {
        *self.list_failure.lock().unwrap() = Some(error);
    }

    pub fn fail_credentials(&self, error: AdapterError) {
        *self.credentials_failure.lock().unwrap() = Some(error);
    }

    pub fn calls(&self, op: Op) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| **c == op).count()
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    fn record(&self, op: Op) {
        self.calls.lock().unwrap().push(op);
    }
}

#[async_trait]
impl TicketingAdapter for ScriptedAdapter {
    fn provider_type(&self) -> ProviderType {
        ProviderType::Eventbrite
    }

    async fn create_event(&self, payload: &EventPayload) -> Result<CreatedEvent, AdapterError> {
        self.record(Op::Create);
        self.payloads.lock().unwrap().push(payload.clone());
        if let Some(Some(error)) = self.create_failures.lock().unwrap().pop_front() {
            return Err(error);
        }
        let n = self.created.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(CreatedEvent {
            event_id: format!("ext-{}", n),
            url: Some(format!("https://tickets.example.com/e/{}", n)),
            status: Some("live".to_string()),
        })
    }

    async fn update_event(
        &self,
        event_id: &str,
        payload: &EventPayload,
    ) -> Result<(), AdapterError> {
        self.record(Op::Update);
        self.payloads.lock().unwrap().push(payload.clone());
        if let Some(Some(error)) = self.update_failures.lock().unwrap().pop_front() {
            return Err(error);
        }
        self.updated_ids.lock().unwrap().push(event_id.to_string());
        Ok(())
    }

    async fn delete_event(&self, event_id: &str) -> Result<(), AdapterError> {
        self.record(Op::Delete);
        if let Some(Some(error)) = self.delete_failures.lock().unwrap().pop_front() {
            return Err(error);
        }
        self.deleted_ids.lock().unwrap().push(event_id.to_string());
        Ok(())
    }

    async fn get_sales(&self, _event_id: &str) -> Result<SalesSnapshot, AdapterError> {
        self.record(Op::Sales);
        if let Some(error) = self.sales_failure.lock().unwrap().clone() {
            return Err(error);
        }
        Ok(self.sales.lock().unwrap().clone())
    }

    async fn list_events(&self) -> Result<Vec<DiscoveredEvent>, AdapterError> {
        self.record(Op::List);
        if let Some(error) = self.list_failure.lock().unwrap().clone() {
            return Err(error);
        }
        Ok(self.events.lock().unwrap().clone())
    }

    async fn test_credentials(&self) -> Result<(), AdapterError> {
        self.record(Op::TestCredentials);
        match self.credentials_failure.lock().unwrap().clone() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn parse_webhook(&self, raw: &[u8]) -> Result<ParsedWebhook, AdapterError> {
        parse_generic_webhook(raw)
    }

    fn verify_webhook_signature(&self, request: &WebhookRequest<'_>) -> SignatureCheck {
        match request.headers.get(TEST_SIGNATURE_HEADER) {
            Some(value) if value == "ok" => SignatureCheck::valid(),
            _ => SignatureCheck::invalid("signature mismatch"),
        }
    }
}

/// Engine wired to an in-memory database with the scripted adapter standing
/// in for every Eventbrite provider.
pub struct TestEngine {
    pub ctx: EngineContext,
    pub adapter: Arc<ScriptedAdapter>,
}

impl TestEngine {
    pub async fn new() -> Result<Self> {
        Self::with_config(test_config()).await
    }

    pub async fn with_config(config: AppConfig) -> Result<Self> {
        let db = setup_test_db().await?;
        let adapter = ScriptedAdapter::new();
        let registry = AdapterRegistry::from_config(&config)?
            .with_adapter(ProviderType::Eventbrite, adapter.clone());
        let ctx = EngineContext::new(
            Arc::new(db),
            Arc::new(config),
            Arc::new(registry),
            Arc::new(StatusBroadcaster::default()),
        );
        Ok(Self { ctx, adapter })
    }

    pub fn db(&self) -> &DatabaseConnection {
        &self.ctx.db
    }
}

pub async fn create_organization(db: &DatabaseConnection) -> Result<organization::Model> {
    Ok(organization::ActiveModel {
        id: Set(Uuid::new_v4()),
        name: Set("Riverside Players".to_string()),
        created_at: Set(Utc::now().fixed_offset()),
    }
    .insert(db)
    .await?)
}

pub async fn create_production(
    db: &DatabaseConnection,
    organization_id: Uuid,
    title: &str,
) -> Result<production::Model> {
    Ok(production::ActiveModel {
        id: Set(Uuid::new_v4()),
        organization_id: Set(organization_id),
        title: Set(title.to_string()),
        description: Set(Some(format!("{} in three acts", title))),
        image_key: Set(None),
        created_at: Set(Utc::now().fixed_offset()),
    }
    .insert(db)
    .await?)
}

pub async fn create_show(
    db: &DatabaseConnection,
    production_id: Uuid,
    starts_at: DateTime<Utc>,
    venue_name: Option<&str>,
) -> Result<show::Model> {
    Ok(show::ActiveModel {
        id: Set(Uuid::new_v4()),
        production_id: Set(production_id),
        starts_at: Set(starts_at.fixed_offset()),
        ends_at: Set(None),
        venue_name: Set(venue_name.map(str::to_string)),
        venue_address: Set(None),
        capacity: Set(Some(120)),
        status: Set("scheduled".to_string()),
        created_at: Set(Utc::now().fixed_offset()),
    }
    .insert(db)
    .await?)
}

pub async fn cancel_show(db: &DatabaseConnection, show_id: Uuid) -> Result<show::Model> {
    Ok(show::ActiveModel {
        id: Set(show_id),
        status: Set(show::SHOW_STATUS_CANCELLED.to_string()),
        ..Default::default()
    }
    .update(db)
    .await?)
}

pub async fn create_provider(
    ctx: &EngineContext,
    organization_id: Uuid,
) -> Result<ticketing_provider::Model> {
    ctx.providers()
        .create(
            NewProvider {
                organization_id,
                provider_type: ProviderType::Eventbrite,
                name: "Eventbrite".to_string(),
                credentials: None,
                manual_only: false,
                webhook_enabled: true,
                auto_sync_enabled: true,
            },
            None,
        )
        .await
}

/// Active all-shows setup for `production_id` with `provider_id` enabled.
pub async fn create_setup(
    ctx: &EngineContext,
    production_id: Uuid,
    provider_id: Uuid,
) -> Result<ticketing_setup::Model> {
    let setups = ctx.setups();
    let setup = setups.create(NewSetup::active(production_id)).await?;
    setups.add_provider_setup(setup.id, provider_id, None).await?;
    Ok(setup)
}

/// Organization, production, `show_count` future shows, provider and setup.
pub struct Fixture {
    pub organization: organization::Model,
    pub production: production::Model,
    pub shows: Vec<show::Model>,
    pub provider: ticketing_provider::Model,
    pub setup: ticketing_setup::Model,
}

pub async fn seed_fixture(ctx: &EngineContext, show_count: usize) -> Result<Fixture> {
    let db = &*ctx.db;
    let organization = create_organization(db).await?;
    let production = create_production(db, organization.id, "Hamlet").await?;

    let mut shows = Vec::with_capacity(show_count);
    for day in 0..show_count {
        let starts_at = Utc::now() + chrono::Duration::days(7 + day as i64);
        shows.push(create_show(db, production.id, starts_at, Some("Globe Theatre")).await?);
    }

    let provider = create_provider(ctx, organization.id).await?;
    let setup = create_setup(ctx, production.id, provider.id).await?;

    Ok(Fixture {
        organization,
        production,
        shows,
        provider,
        setup,
    })
}
