//! Remote event repository (the remote state cache)
//!
//! Every write is a single-row update keyed by primary key. Status changes go
//! through [`RemoteEventRepository::set_status`], which enforces the sync state
//! machine.

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, ModelTrait, QueryFilter,
    QueryOrder, Set,
};
use serde_json::Value as JsonValue;
use std::sync::Arc;
use uuid::Uuid;

use crate::adapters::{CreatedEvent, SalesSnapshot};
use crate::models::remote_event::{
    self, AUTH_EXPIRED_REMOTE_STATUS, AUTH_SENSITIVE_REMOTE_STATUSES, Entity as RemoteEvent,
    SyncStatus,
};

/// Identity of a new cache row.
#[derive(Debug, Clone, Copy)]
pub struct RemoteEventKey {
    pub provider_id: Uuid,
    pub show_id: Uuid,
    pub production_id: Uuid,
    pub setup_id: Option<Uuid>,
}

/// Fields copied from a provider-side event that already exists.
#[derive(Debug, Clone, Default)]
pub struct ExistingListing {
    pub external_event_id: String,
    pub external_url: Option<String>,
    pub remote_status: Option<String>,
    pub raw_data: Option<JsonValue>,
}

#[derive(Debug, Clone)]
pub struct RemoteEventRepository {
    pub db: Arc<DatabaseConnection>,
}

impl RemoteEventRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    pub async fn get_by_id(&self, id: Uuid) -> Result<Option<remote_event::Model>> {
        Ok(RemoteEvent::find_by_id(id).one(&*self.db).await?)
    }

    pub async fn list_for_setup(&self, setup_id: Uuid) -> Result<Vec<remote_event::Model>> {
        Ok(RemoteEvent::find()
            .filter(remote_event::Column::SetupId.eq(setup_id))
            .order_by_asc(remote_event::Column::CreatedAt)
            .all(&*self.db)
            .await?)
    }

    /// Non-deleted rows of one provider for one production.
    pub async fn list_active_for_provider_production(
        &self,
        provider_id: Uuid,
        production_id: Uuid,
    ) -> Result<Vec<remote_event::Model>> {
        Ok(RemoteEvent::find()
            .filter(remote_event::Column::ProviderId.eq(provider_id))
            .filter(remote_event::Column::ProductionId.eq(production_id))
            .filter(remote_event::Column::SyncStatus.ne(SyncStatus::Deleted))
            .order_by_asc(remote_event::Column::CreatedAt)
            .all(&*self.db)
            .await?)
    }

    pub async fn find_by_external_id(
        &self,
        provider_id: Uuid,
        external_event_id: &str,
    ) -> Result<Option<remote_event::Model>> {
        Ok(RemoteEvent::find()
            .filter(remote_event::Column::ProviderId.eq(provider_id))
            .filter(remote_event::Column::ExternalEventId.eq(external_event_id))
            .one(&*self.db)
            .await?)
    }

    pub async fn find_active_for_show(
        &self,
        provider_id: Uuid,
        show_id: Uuid,
    ) -> Result<Option<remote_event::Model>> {
        Ok(RemoteEvent::find()
            .filter(remote_event::Column::ProviderId.eq(provider_id))
            .filter(remote_event::Column::ShowId.eq(show_id))
            .filter(remote_event::Column::SyncStatus.ne(SyncStatus::Deleted))
            .one(&*self.db)
            .await?)
    }

    /// Inserts the `pending_create` row that precedes an adapter create call.
    /// Fails with a unique violation when the show is already listed.
    pub async fn insert_pending_create(
        &self,
        key: RemoteEventKey,
        capacity: Option<i32>,
    ) -> Result<remote_event::Model> {
        self.insert(key, SyncStatus::PendingCreate, capacity, None)
            .await
            .context("Failed to insert pending remote event")
    }

    /// Inserts a `synced` row for a listing that already exists remotely.
    pub async fn insert_synced(
        &self,
        key: RemoteEventKey,
        listing: ExistingListing,
    ) -> Result<remote_event::Model> {
        self.insert(key, SyncStatus::Synced, None, Some(listing))
            .await
            .context("Failed to insert linked remote event")
    }

    async fn insert(
        &self,
        key: RemoteEventKey,
        sync_status: SyncStatus,
        capacity: Option<i32>,
        listing: Option<ExistingListing>,
    ) -> Result<remote_event::Model, sea_orm::DbErr> {
        let now = Utc::now().fixed_offset();
        let synced_at = listing.as_ref().map(|_| now);
        let listing = listing.unwrap_or_default();
        let external_event_id =
            Some(listing.external_event_id).filter(|id| !id.is_empty());

        remote_event::ActiveModel {
            id: Set(Uuid::new_v4()),
            provider_id: Set(key.provider_id),
            show_id: Set(key.show_id),
            production_id: Set(key.production_id),
            setup_id: Set(key.setup_id),
            external_event_id: Set(external_event_id),
            external_url: Set(listing.external_url),
            remote_status: Set(listing.remote_status),
            sync_status: Set(sync_status),
            tickets_sold: Set(0),
            tickets_available: Set(None),
            capacity: Set(capacity),
            revenue_cents: Set(0),
            raw_data: Set(listing.raw_data),
            content_hash: Set(None),
            last_synced_at: Set(synced_at),
            last_sync_error: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.db)
        .await
    }

    /// Moves a row to `next`, rejecting transitions the state machine forbids.
    pub async fn set_status(
        &self,
        event: &remote_event::Model,
        next: SyncStatus,
        error: Option<String>,
    ) -> Result<remote_event::Model> {
        if !event.sync_status.can_transition_to(next) {
            bail!(
                "invalid sync_status transition {:?} -> {:?} for remote event {}",
                event.sync_status,
                next,
                event.id
            );
        }

        let mut active = remote_event::ActiveModel {
            id: Set(event.id),
            sync_status: Set(next),
            updated_at: Set(Utc::now().fixed_offset()),
            ..Default::default()
        };
        match next {
            SyncStatus::Error => active.last_sync_error = Set(error),
            SyncStatus::Synced => active.last_sync_error = Set(None),
            _ => {}
        }
        Ok(active.update(&*self.db).await?)
    }

    /// `pending_create -> synced` (or `error -> pending_create -> synced` on retry),
    /// recording what the provider returned.
    pub async fn mark_synced_after_create(
        &self,
        event: &remote_event::Model,
        created: &CreatedEvent,
        content_hash: &str,
    ) -> Result<remote_event::Model> {
        if !event.sync_status.can_transition_to(SyncStatus::Synced) {
            bail!(
                "remote event {} cannot become synced from {:?}",
                event.id,
                event.sync_status
            );
        }
        let now = Utc::now().fixed_offset();
        Ok(remote_event::ActiveModel {
            id: Set(event.id),
            external_event_id: Set(Some(created.event_id.clone())),
            external_url: Set(created.url.clone()),
            remote_status: Set(created.status.clone()),
            sync_status: Set(SyncStatus::Synced),
            content_hash: Set(Some(content_hash.to_string())),
            last_synced_at: Set(Some(now)),
            last_sync_error: Set(None),
            updated_at: Set(now),
            ..Default::default()
        }
        .update(&*self.db)
        .await?)
    }

    /// `pending_update -> synced` with the new content hash.
    pub async fn mark_updated(
        &self,
        event: &remote_event::Model,
        content_hash: &str,
    ) -> Result<remote_event::Model> {
        if !event.sync_status.can_transition_to(SyncStatus::Synced) {
            bail!(
                "remote event {} cannot become synced from {:?}",
                event.id,
                event.sync_status
            );
        }
        let now = Utc::now().fixed_offset();
        Ok(remote_event::ActiveModel {
            id: Set(event.id),
            sync_status: Set(SyncStatus::Synced),
            content_hash: Set(Some(content_hash.to_string())),
            last_synced_at: Set(Some(now)),
            last_sync_error: Set(None),
            updated_at: Set(now),
            ..Default::default()
        }
        .update(&*self.db)
        .await?)
    }

    /// Stores a sales snapshot and stamps `last_synced_at`.
    pub async fn update_sales(
        &self,
        id: Uuid,
        snapshot: &SalesSnapshot,
        synced_at: DateTime<Utc>,
    ) -> Result<remote_event::Model> {
        let mut active = remote_event::ActiveModel {
            id: Set(id),
            tickets_sold: Set(snapshot.tickets_sold),
            tickets_available: Set(snapshot.tickets_available),
            revenue_cents: Set(snapshot.revenue_cents),
            last_synced_at: Set(Some(synced_at.fixed_offset())),
            updated_at: Set(Utc::now().fixed_offset()),
            ..Default::default()
        };
        if snapshot.capacity.is_some() {
            active.capacity = Set(snapshot.capacity);
        }
        if snapshot.remote_status.is_some() {
            active.remote_status = Set(snapshot.remote_status.clone());
        }
        Ok(active.update(&*self.db).await?)
    }

    pub async fn set_remote_status(&self, id: Uuid, remote_status: &str) -> Result<()> {
        remote_event::ActiveModel {
            id: Set(id),
            remote_status: Set(Some(remote_status.to_string())),
            updated_at: Set(Utc::now().fixed_offset()),
            ..Default::default()
        }
        .update(&*self.db)
        .await?;
        Ok(())
    }

    /// Removes a row outright. Only used for `pending_create` rows whose create
    /// call was rejected before anything existed remotely.
    pub async fn delete(&self, event: remote_event::Model) -> Result<()> {
        event.delete(&*self.db).await?;
        Ok(())
    }

    /// Flips the provider's auth-sensitive listings to `auth_expired`.
    /// Returns the rows that changed.
    pub async fn flip_remote_status_for_provider(
        &self,
        provider_id: Uuid,
    ) -> Result<Vec<remote_event::Model>> {
        let candidates = RemoteEvent::find()
            .filter(remote_event::Column::ProviderId.eq(provider_id))
            .filter(remote_event::Column::SyncStatus.ne(SyncStatus::Deleted))
            .filter(remote_event::Column::RemoteStatus.is_in(AUTH_SENSITIVE_REMOTE_STATUSES.iter().copied()))
            .all(&*self.db)
            .await?;

        let mut flipped = Vec::with_capacity(candidates.len());
        for event in candidates {
            self.set_remote_status(event.id, AUTH_EXPIRED_REMOTE_STATUS)
                .await?;
            flipped.push(remote_event::Model {
                remote_status: Some(AUTH_EXPIRED_REMOTE_STATUS.to_string()),
                ..event
            });
        }
        Ok(flipped)
    }

    /// `synced` rows whose provider status is live.
    pub async fn list_live_synced(&self) -> Result<Vec<remote_event::Model>> {
        let rows = RemoteEvent::find()
            .filter(remote_event::Column::SyncStatus.eq(SyncStatus::Synced))
            .filter(remote_event::Column::ExternalEventId.is_not_null())
            .order_by_asc(remote_event::Column::ProviderId)
            .order_by_asc(remote_event::Column::LastSyncedAt)
            .all(&*self.db)
            .await?;
        Ok(rows.into_iter().filter(|e| e.is_live()).collect())
    }
}
