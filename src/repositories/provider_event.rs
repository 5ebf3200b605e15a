use anyhow::{Context, Result};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
};
use serde_json::Value as JsonValue;
use std::sync::Arc;
use uuid::Uuid;

use crate::adapters::DiscoveredEvent;
use crate::models::provider_event::{self, Entity as ProviderEvent, MatchStatus};

/// Outcome of matching recorded on a provider event.
#[derive(Debug, Clone)]
pub struct MatchUpdate {
    pub status: MatchStatus,
    pub confidence: f64,
    pub reasons: Vec<String>,
    pub matched_show_id: Option<Uuid>,
    pub suggested_show_id: Option<Uuid>,
}

#[derive(Debug, Clone)]
pub struct ProviderEventRepository {
    pub db: Arc<DatabaseConnection>,
}

impl ProviderEventRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Inserts or refreshes a discovered event. Match fields are left as they
    /// are on existing rows, so matched and dismissed events keep their status.
    pub async fn upsert_seen(
        &self,
        provider_id: Uuid,
        organization_id: Uuid,
        event: &DiscoveredEvent,
    ) -> Result<provider_event::Model> {
        let now = Utc::now().fixed_offset();
        let existing = ProviderEvent::find()
            .filter(provider_event::Column::ProviderId.eq(provider_id))
            .filter(provider_event::Column::ExternalEventId.eq(event.external_event_id.as_str()))
            .one(&*self.db)
            .await?;

        let starts_at = event.starts_at.map(|t| t.fixed_offset());

        match existing {
            Some(row) => Ok(provider_event::ActiveModel {
                id: Set(row.id),
                title: Set(event.title.clone()),
                starts_at: Set(starts_at),
                venue_name: Set(event.venue_name.clone()),
                external_url: Set(event.url.clone()),
                remote_status: Set(event.status.clone()),
                raw_data: Set(Some(event.raw.clone())),
                last_seen_at: Set(now),
                updated_at: Set(now),
                ..Default::default()
            }
            .update(&*self.db)
            .await?),
            None => provider_event::ActiveModel {
                id: Set(Uuid::new_v4()),
                provider_id: Set(provider_id),
                organization_id: Set(organization_id),
                external_event_id: Set(event.external_event_id.clone()),
                title: Set(event.title.clone()),
                starts_at: Set(starts_at),
                venue_name: Set(event.venue_name.clone()),
                external_url: Set(event.url.clone()),
                remote_status: Set(event.status.clone()),
                raw_data: Set(Some(event.raw.clone())),
                match_status: Set(MatchStatus::Unmatched),
                match_confidence: Set(0.0),
                match_reasons: Set(None),
                matched_show_id: Set(None),
                suggested_show_id: Set(None),
                last_seen_at: Set(now),
                created_at: Set(now),
                updated_at: Set(now),
            }
            .insert(&*self.db)
            .await
            .context("Failed to insert provider event"),
        }
    }

    pub async fn set_match(&self, id: Uuid, update: MatchUpdate) -> Result<provider_event::Model> {
        let reasons = JsonValue::Array(update.reasons.into_iter().map(JsonValue::String).collect());
        Ok(provider_event::ActiveModel {
            id: Set(id),
            match_status: Set(update.status),
            match_confidence: Set(update.confidence),
            match_reasons: Set(Some(reasons)),
            matched_show_id: Set(update.matched_show_id),
            suggested_show_id: Set(update.suggested_show_id),
            updated_at: Set(Utc::now().fixed_offset()),
            ..Default::default()
        }
        .update(&*self.db)
        .await?)
    }

    pub async fn list_for_organization(
        &self,
        organization_id: Uuid,
    ) -> Result<Vec<provider_event::Model>> {
        Ok(ProviderEvent::find()
            .filter(provider_event::Column::OrganizationId.eq(organization_id))
            .order_by_asc(provider_event::Column::CreatedAt)
            .all(&*self.db)
            .await?)
    }
}
