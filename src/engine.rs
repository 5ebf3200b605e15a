//! Shared handles for the engine's components.
//!
//! Repositories are cheap to build (an `Arc` clone), so components construct the
//! ones they need from an [`EngineContext`] instead of threading each through.

use std::sync::Arc;

use sea_orm::DatabaseConnection;

use crate::activity_log::ActivityRecorder;
use crate::adapters::AdapterRegistry;
use crate::broadcast::StatusBroadcaster;
use crate::config::AppConfig;
use crate::provider_health::ProviderHealth;
use crate::repositories::{
    ActivityRepository, CatalogRepository, ProviderEventRepository, ProviderRepository,
    RemoteEventRepository, ScheduledTaskRepository, SetupRepository, WebhookLogRepository,
};
use crate::sales_sync::SalesRecorder;

#[derive(Clone)]
pub struct EngineContext {
    pub db: Arc<DatabaseConnection>,
    pub config: Arc<AppConfig>,
    pub registry: Arc<AdapterRegistry>,
    pub broadcaster: Arc<StatusBroadcaster>,
}

impl EngineContext {
    pub fn new(
        db: Arc<DatabaseConnection>,
        config: Arc<AppConfig>,
        registry: Arc<AdapterRegistry>,
        broadcaster: Arc<StatusBroadcaster>,
    ) -> Self {
        Self {
            db,
            config,
            registry,
            broadcaster,
        }
    }

    pub fn providers(&self) -> ProviderRepository {
        ProviderRepository::new(self.db.clone())
    }

    pub fn setups(&self) -> SetupRepository {
        SetupRepository::new(self.db.clone())
    }

    pub fn remote_events(&self) -> RemoteEventRepository {
        RemoteEventRepository::new(self.db.clone())
    }

    pub fn provider_events(&self) -> ProviderEventRepository {
        ProviderEventRepository::new(self.db.clone())
    }

    pub fn webhook_logs(&self) -> WebhookLogRepository {
        WebhookLogRepository::new(self.db.clone())
    }

    pub fn tasks(&self) -> ScheduledTaskRepository {
        ScheduledTaskRepository::new(self.db.clone())
    }

    pub fn catalog(&self) -> CatalogRepository {
        CatalogRepository::new(self.db.clone())
    }

    pub fn activity(&self) -> ActivityRecorder {
        ActivityRecorder::new(
            ActivityRepository::new(self.db.clone()),
            self.broadcaster.clone(),
        )
    }

    pub fn health(&self) -> ProviderHealth {
        ProviderHealth::new(self.providers(), self.remote_events(), self.activity())
    }

    pub fn sales_recorder(&self) -> SalesRecorder {
        SalesRecorder::new(
            self.remote_events(),
            self.broadcaster.clone(),
            self.activity(),
        )
    }
}
