use anyhow::{Context, Result};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
};
use serde_json::Value as JsonValue;
use std::sync::Arc;
use uuid::Uuid;

use crate::models::activity::{self, ActivityKind, Entity as Activity};

/// Input for one activity-log entry.
#[derive(Debug, Clone)]
pub struct NewActivity {
    pub production_id: Uuid,
    pub provider_id: Option<Uuid>,
    pub show_id: Option<Uuid>,
    pub remote_event_id: Option<Uuid>,
    pub kind: ActivityKind,
    pub message: String,
    pub metadata: Option<JsonValue>,
}

impl NewActivity {
    pub fn new(production_id: Uuid, kind: ActivityKind, message: impl Into<String>) -> Self {
        Self {
            production_id,
            provider_id: None,
            show_id: None,
            remote_event_id: None,
            kind,
            message: message.into(),
            metadata: None,
        }
    }

    pub fn provider(mut self, provider_id: Uuid) -> Self {
        self.provider_id = Some(provider_id);
        self
    }

    pub fn show(mut self, show_id: Uuid) -> Self {
        self.show_id = Some(show_id);
        self
    }

    pub fn remote_event(mut self, remote_event_id: Uuid) -> Self {
        self.remote_event_id = Some(remote_event_id);
        self
    }

    pub fn metadata(mut self, metadata: JsonValue) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

#[derive(Debug, Clone)]
pub struct ActivityRepository {
    pub db: Arc<DatabaseConnection>,
}

impl ActivityRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    pub async fn record(&self, entry: NewActivity) -> Result<activity::Model> {
        activity::ActiveModel {
            id: Set(Uuid::new_v4()),
            production_id: Set(entry.production_id),
            provider_id: Set(entry.provider_id),
            show_id: Set(entry.show_id),
            remote_event_id: Set(entry.remote_event_id),
            kind: Set(entry.kind),
            message: Set(entry.message),
            metadata: Set(entry.metadata),
            created_at: Set(Utc::now().fixed_offset()),
        }
        .insert(&*self.db)
        .await
        .context("Failed to insert activity")
    }

    pub async fn list_for_production(&self, production_id: Uuid) -> Result<Vec<activity::Model>> {
        Ok(Activity::find()
            .filter(activity::Column::ProductionId.eq(production_id))
            .order_by_asc(activity::Column::CreatedAt)
            .all(&*self.db)
            .await?)
    }
}
