//! Declarative setup repository
//!
//! Reads setups, provider setups and show rules, and records the durable
//! re-run guard (`last_sync_started_at`) for reconciliation passes.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
};
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::models::provider_setup::{self, Entity as ProviderSetup};
use crate::models::show_rule::{self, Entity as ShowRule, RuleType};
use crate::models::ticketing_provider::{self, Entity as Provider};
use crate::models::ticketing_setup::{
    self, Entity as TicketingSetup, GroupingStrategy, ListingMode, SetupStatus,
};

/// Input for creating a declarative setup.
#[derive(Debug, Clone)]
pub struct NewSetup {
    pub production_id: Uuid,
    pub listing_mode: ListingMode,
    pub grouping_strategy: GroupingStrategy,
    pub title_template: Option<String>,
    pub description_template: Option<String>,
    pub default_venue_name: Option<String>,
    pub default_venue_address: Option<String>,
    pub pricing_tiers: Option<JsonValue>,
    pub status: SetupStatus,
}

impl NewSetup {
    pub fn active(production_id: Uuid) -> Self {
        Self {
            production_id,
            listing_mode: ListingMode::AllShows,
            grouping_strategy: GroupingStrategy::EventPerShow,
            title_template: None,
            description_template: None,
            default_venue_name: None,
            default_venue_address: None,
            pricing_tiers: None,
            status: SetupStatus::Active,
        }
    }
}

/// An enabled provider setup that auto-sync may pick up.
#[derive(Debug, Clone)]
pub struct SyncCandidate {
    pub setup: ticketing_setup::Model,
    pub provider_setup: provider_setup::Model,
    pub provider: ticketing_provider::Model,
}

#[derive(Debug, Clone)]
pub struct SetupRepository {
    pub db: Arc<DatabaseConnection>,
}

impl SetupRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    pub async fn get_by_id(&self, id: Uuid) -> Result<Option<ticketing_setup::Model>> {
        Ok(TicketingSetup::find_by_id(id).one(&*self.db).await?)
    }

    pub async fn find_active_for_production(
        &self,
        production_id: Uuid,
    ) -> Result<Option<ticketing_setup::Model>> {
        Ok(TicketingSetup::find()
            .filter(ticketing_setup::Column::ProductionId.eq(production_id))
            .filter(ticketing_setup::Column::Status.eq(SetupStatus::Active))
            .one(&*self.db)
            .await?)
    }

    pub async fn create(&self, new: NewSetup) -> Result<ticketing_setup::Model> {
        let now = Utc::now().fixed_offset();
        ticketing_setup::ActiveModel {
            id: Set(Uuid::new_v4()),
            production_id: Set(new.production_id),
            listing_mode: Set(new.listing_mode),
            grouping_strategy: Set(new.grouping_strategy),
            title_template: Set(new.title_template),
            description_template: Set(new.description_template),
            default_venue_name: Set(new.default_venue_name),
            default_venue_address: Set(new.default_venue_address),
            pricing_tiers: Set(new.pricing_tiers),
            status: Set(new.status),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.db)
        .await
        .context("Failed to insert ticketing setup")
    }

    pub async fn add_provider_setup(
        &self,
        setup_id: Uuid,
        provider_id: Uuid,
        overrides: Option<JsonValue>,
    ) -> Result<provider_setup::Model> {
        let now = Utc::now().fixed_offset();
        provider_setup::ActiveModel {
            id: Set(Uuid::new_v4()),
            setup_id: Set(setup_id),
            provider_id: Set(provider_id),
            enabled: Set(true),
            overrides: Set(overrides),
            series_external_id: Set(None),
            last_sync_started_at: Set(None),
            last_synced_at: Set(None),
            last_sync_error: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.db)
        .await
        .context("Failed to insert provider setup")
    }

    pub async fn add_show_rule(
        &self,
        setup_id: Uuid,
        show_id: Uuid,
        rule_type: RuleType,
        provider_ids: Option<Vec<Uuid>>,
        overrides: Option<JsonValue>,
    ) -> Result<show_rule::Model> {
        let now = Utc::now().fixed_offset();
        show_rule::ActiveModel {
            id: Set(Uuid::new_v4()),
            setup_id: Set(setup_id),
            show_id: Set(show_id),
            rule_type: Set(rule_type),
            provider_ids: Set(provider_ids.map(|ids| {
                JsonValue::Array(
                    ids.into_iter()
                        .map(|id| JsonValue::String(id.to_string()))
                        .collect(),
                )
            })),
            overrides: Set(overrides),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.db)
        .await
        .context("Failed to insert show rule")
    }

    pub async fn provider_setups(&self, setup_id: Uuid) -> Result<Vec<provider_setup::Model>> {
        Ok(ProviderSetup::find()
            .filter(provider_setup::Column::SetupId.eq(setup_id))
            .order_by_asc(provider_setup::Column::CreatedAt)
            .all(&*self.db)
            .await?)
    }

    pub async fn get_provider_setup(
        &self,
        setup_id: Uuid,
        provider_id: Uuid,
    ) -> Result<Option<provider_setup::Model>> {
        Ok(ProviderSetup::find()
            .filter(provider_setup::Column::SetupId.eq(setup_id))
            .filter(provider_setup::Column::ProviderId.eq(provider_id))
            .one(&*self.db)
            .await?)
    }

    pub async fn show_rules(&self, setup_id: Uuid) -> Result<Vec<show_rule::Model>> {
        Ok(ShowRule::find()
            .filter(show_rule::Column::SetupId.eq(setup_id))
            .order_by_asc(show_rule::Column::CreatedAt)
            .all(&*self.db)
            .await?)
    }

    /// Enabled provider setups of active setups whose provider has auto-sync on
    /// and is outside any rate-limit window at `now`.
    pub async fn list_sync_candidates(&self, now: DateTime<Utc>) -> Result<Vec<SyncCandidate>> {
        let setups: HashMap<Uuid, ticketing_setup::Model> = TicketingSetup::find()
            .filter(ticketing_setup::Column::Status.eq(SetupStatus::Active))
            .all(&*self.db)
            .await?
            .into_iter()
            .map(|s| (s.id, s))
            .collect();

        if setups.is_empty() {
            return Ok(Vec::new());
        }

        let providers: HashMap<Uuid, ticketing_provider::Model> = Provider::find()
            .filter(ticketing_provider::Column::Active.eq(true))
            .filter(ticketing_provider::Column::AutoSyncEnabled.eq(true))
            .all(&*self.db)
            .await?
            .into_iter()
            .filter(|p| !p.is_rate_limited_at(now))
            .map(|p| (p.id, p))
            .collect();

        let provider_setups = ProviderSetup::find()
            .filter(provider_setup::Column::Enabled.eq(true))
            .filter(provider_setup::Column::SetupId.is_in(setups.keys().copied()))
            .all(&*self.db)
            .await?;

        Ok(provider_setups
            .into_iter()
            .filter_map(|ps| {
                let setup = setups.get(&ps.setup_id)?.clone();
                let provider = providers.get(&ps.provider_id)?.clone();
                Some(SyncCandidate {
                    setup,
                    provider_setup: ps,
                    provider,
                })
            })
            .collect())
    }

    pub async fn mark_sync_started(&self, provider_setup_id: Uuid, at: DateTime<Utc>) -> Result<()> {
        provider_setup::ActiveModel {
            id: Set(provider_setup_id),
            last_sync_started_at: Set(Some(at.fixed_offset())),
            updated_at: Set(Utc::now().fixed_offset()),
            ..Default::default()
        }
        .update(&*self.db)
        .await?;
        Ok(())
    }

    pub async fn mark_sync_finished(
        &self,
        provider_setup_id: Uuid,
        at: DateTime<Utc>,
        error: Option<String>,
    ) -> Result<()> {
        provider_setup::ActiveModel {
            id: Set(provider_setup_id),
            last_synced_at: Set(Some(at.fixed_offset())),
            last_sync_error: Set(error),
            updated_at: Set(Utc::now().fixed_offset()),
            ..Default::default()
        }
        .update(&*self.db)
        .await?;
        Ok(())
    }

    /// Records the series parent listing; `None` clears it.
    pub async fn set_series_external_id(
        &self,
        provider_setup_id: Uuid,
        external_id: Option<&str>,
    ) -> Result<()> {
        provider_setup::ActiveModel {
            id: Set(provider_setup_id),
            series_external_id: Set(external_id.map(str::to_string)),
            updated_at: Set(Utc::now().fixed_offset()),
            ..Default::default()
        }
        .update(&*self.db)
        .await?;
        Ok(())
    }
}
