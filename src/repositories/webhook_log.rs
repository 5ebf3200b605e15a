//! Webhook log repository
//!
//! The partial unique index on `(provider_id, external_id) WHERE status =
//! 'processed'` is the last line against double counting: callers map a unique
//! violation from [`WebhookLogRepository::mark_processed`] to `duplicate`.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter,
    QueryOrder, Set,
};
use serde_json::Value as JsonValue;
use std::sync::Arc;
use uuid::Uuid;

use crate::models::webhook_log::{self, Entity as WebhookLog, SignatureStatus, WebhookStatus};

#[derive(Debug, Clone)]
pub struct WebhookLogRepository {
    pub db: Arc<DatabaseConnection>,
}

impl WebhookLogRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Records a call as `received` / `unverified` before anything else happens.
    pub async fn record_received(
        &self,
        provider_id: Uuid,
        payload: String,
        headers: JsonValue,
    ) -> Result<webhook_log::Model> {
        let now = Utc::now().fixed_offset();
        webhook_log::ActiveModel {
            id: Set(Uuid::new_v4()),
            provider_id: Set(provider_id),
            event_type: Set(None),
            external_id: Set(None),
            payload: Set(payload),
            headers: Set(Some(headers)),
            signature_status: Set(SignatureStatus::Unverified),
            status: Set(WebhookStatus::Received),
            error: Set(None),
            processed_at: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.db)
        .await
        .context("Failed to insert webhook log")
    }

    pub async fn get_by_id(&self, id: Uuid) -> Result<Option<webhook_log::Model>> {
        Ok(WebhookLog::find_by_id(id).one(&*self.db).await?)
    }

    pub async fn mark_signature_valid(&self, id: Uuid) -> Result<()> {
        webhook_log::ActiveModel {
            id: Set(id),
            signature_status: Set(SignatureStatus::Valid),
            updated_at: Set(Utc::now().fixed_offset()),
            ..Default::default()
        }
        .update(&*self.db)
        .await?;
        Ok(())
    }

    pub async fn mark_signature_invalid(&self, id: Uuid, error: &str) -> Result<()> {
        webhook_log::ActiveModel {
            id: Set(id),
            signature_status: Set(SignatureStatus::Invalid),
            status: Set(WebhookStatus::Failed),
            error: Set(Some(error.to_string())),
            updated_at: Set(Utc::now().fixed_offset()),
            ..Default::default()
        }
        .update(&*self.db)
        .await?;
        Ok(())
    }

    /// A `processed` log of the same provider with the same dedupe key.
    pub async fn find_processed(
        &self,
        provider_id: Uuid,
        external_id: &str,
    ) -> Result<Option<webhook_log::Model>> {
        Ok(WebhookLog::find()
            .filter(webhook_log::Column::ProviderId.eq(provider_id))
            .filter(webhook_log::Column::ExternalId.eq(external_id))
            .filter(webhook_log::Column::Status.eq(WebhookStatus::Processed))
            .one(&*self.db)
            .await?)
    }

    pub async fn mark_processing(
        &self,
        id: Uuid,
        event_type: &str,
        external_id: &str,
    ) -> Result<()> {
        webhook_log::ActiveModel {
            id: Set(id),
            status: Set(WebhookStatus::Processing),
            event_type: Set(Some(event_type.to_string())),
            external_id: Set(Some(external_id.to_string())),
            updated_at: Set(Utc::now().fixed_offset()),
            ..Default::default()
        }
        .update(&*self.db)
        .await?;
        Ok(())
    }

    /// Returns the raw [`DbErr`] so callers can recognize a unique violation.
    pub async fn mark_processed(
        &self,
        id: Uuid,
        note: Option<String>,
        at: DateTime<Utc>,
    ) -> Result<(), DbErr> {
        webhook_log::ActiveModel {
            id: Set(id),
            status: Set(WebhookStatus::Processed),
            error: Set(note),
            processed_at: Set(Some(at.fixed_offset())),
            updated_at: Set(Utc::now().fixed_offset()),
            ..Default::default()
        }
        .update(&*self.db)
        .await?;
        Ok(())
    }

    pub async fn mark_duplicate(&self, id: Uuid, at: DateTime<Utc>) -> Result<()> {
        webhook_log::ActiveModel {
            id: Set(id),
            status: Set(WebhookStatus::Duplicate),
            processed_at: Set(Some(at.fixed_offset())),
            updated_at: Set(Utc::now().fixed_offset()),
            ..Default::default()
        }
        .update(&*self.db)
        .await?;
        Ok(())
    }

    pub async fn mark_failed(&self, id: Uuid, error: &str) -> Result<()> {
        webhook_log::ActiveModel {
            id: Set(id),
            status: Set(WebhookStatus::Failed),
            error: Set(Some(error.to_string())),
            updated_at: Set(Utc::now().fixed_offset()),
            ..Default::default()
        }
        .update(&*self.db)
        .await?;
        Ok(())
    }

    /// Signature-valid logs still in `received` that were created before `cutoff`.
    pub async fn list_stuck_received(&self, cutoff: DateTime<Utc>) -> Result<Vec<webhook_log::Model>> {
        let rows = WebhookLog::find()
            .filter(webhook_log::Column::Status.eq(WebhookStatus::Received))
            .filter(webhook_log::Column::SignatureStatus.eq(SignatureStatus::Valid))
            .order_by_asc(webhook_log::Column::CreatedAt)
            .all(&*self.db)
            .await?;
        Ok(rows
            .into_iter()
            .filter(|log| log.created_at.with_timezone(&Utc) < cutoff)
            .collect())
    }

    pub async fn list_for_provider(&self, provider_id: Uuid) -> Result<Vec<webhook_log::Model>> {
        Ok(WebhookLog::find()
            .filter(webhook_log::Column::ProviderId.eq(provider_id))
            .order_by_asc(webhook_log::Column::CreatedAt)
            .all(&*self.db)
            .await?)
    }
}
