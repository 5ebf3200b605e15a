//! Reconciliation loop
//!
//! One pass diffs the shows a (setup, provider) pair should list against the
//! non-deleted remote events cached for that provider, then drives creates,
//! deletes and updates through the provider adapter. A rate-limit signal
//! abandons the rest of the pass and schedules a deferred one; an
//! authentication failure stops the pass and degrades the provider.

pub mod desired;
pub mod diff;

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Duration, Utc};
use metrics::{counter, histogram};
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tracing::{debug, error, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::activity_log::ActivityRecorder;
use crate::adapters::{AdapterError, AdapterRegistry, EventPayload, FailureKind, RegistryError, TicketingAdapter};
use crate::broadcast::{EngineMessage, PassPhase, StatusBroadcaster};
use crate::config::SyncConfig;
use crate::engine::EngineContext;
use crate::error::is_unique_violation_anyhow;
use crate::models::activity::ActivityKind;
use crate::models::provider_setup::Model as ProviderSetupModel;
use crate::models::remote_event::{Model as RemoteEventModel, SyncStatus};
use crate::models::show::Model as ShowModel;
use crate::models::ticketing_provider::Model as ProviderModel;
use crate::models::ticketing_setup::{GroupingStrategy, Model as SetupModel, SetupStatus};
use crate::provider_health::ProviderHealth;
use crate::repositories::{
    CatalogRepository, NewActivity, ProviderRepository, RemoteEventKey, RemoteEventRepository,
    ScheduledTaskRepository, SetupRepository,
};
use crate::sales_sync::{SalesRecorder, is_fresh};

use desired::{PayloadContext, PayloadOverrides, content_hash, should_list_ids, show_overrides};
use diff::diff;

/// What started a pass. Only periodic passes honor the re-run guard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SyncTrigger {
    Manual,
    Periodic,
    Deferred,
}

impl SyncTrigger {
    pub fn bypasses_guard(self) -> bool {
        !matches!(self, SyncTrigger::Periodic)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PassOutcome {
    Completed,
    RateLimited { retry_at: DateTime<Utc> },
    AuthFailed,
    Skipped { reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct ReconcileReport {
    pub setup_id: Uuid,
    pub provider_id: Uuid,
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
    /// Listings whose sales metrics were refreshed
    pub synced: usize,
    pub errors: Vec<String>,
    pub outcome: PassOutcome,
}

impl ReconcileReport {
    fn new(setup_id: Uuid, provider_id: Uuid) -> Self {
        Self {
            setup_id,
            provider_id,
            created: 0,
            updated: 0,
            deleted: 0,
            synced: 0,
            errors: Vec::new(),
            outcome: PassOutcome::Completed,
        }
    }

    pub fn operations(&self) -> usize {
        self.created + self.updated + self.deleted
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    #[error("setup {0} not found")]
    SetupNotFound(Uuid),
    #[error("provider {0} not found")]
    ProviderNotFound(Uuid),
    #[error("provider {provider_id} is not configured for setup {setup_id}")]
    ProviderSetupNotFound { setup_id: Uuid, provider_id: Uuid },
    #[error("production {0} not found")]
    ProductionNotFound(Uuid),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error("reconciler is shutting down")]
    Closed,
    #[error(transparent)]
    Database(#[from] anyhow::Error),
}

enum Step {
    Continue,
    Halt(PassOutcome),
}

/// State shared by the operations of one pass.
struct Pass<'a> {
    setup: &'a SetupModel,
    provider_setup: &'a ProviderSetupModel,
    provider: &'a ProviderModel,
    adapter: Arc<dyn TicketingAdapter>,
    series_external_id: Option<String>,
}

impl Pass<'_> {
    fn grouped(&self) -> bool {
        self.setup.grouping_strategy == GroupingStrategy::SingleEventMultipleOccurrences
    }

    /// Parent id for a listing; the series event itself has none.
    fn parent_for(&self, own_external_id: Option<&str>) -> Option<String> {
        if !self.grouped() {
            return None;
        }
        self.series_external_id
            .clone()
            .filter(|series| Some(series.as_str()) != own_external_id)
    }
}

#[derive(Clone)]
pub struct Reconciler {
    setups: SetupRepository,
    providers: ProviderRepository,
    remote_events: RemoteEventRepository,
    tasks: ScheduledTaskRepository,
    catalog: CatalogRepository,
    registry: Arc<AdapterRegistry>,
    broadcaster: Arc<StatusBroadcaster>,
    activity: ActivityRecorder,
    health: ProviderHealth,
    sales: SalesRecorder,
    config: SyncConfig,
    image_base_url: Option<String>,
    permits: Arc<Semaphore>,
}

impl Reconciler {
    pub fn new(ctx: &EngineContext) -> Self {
        Self {
            setups: ctx.setups(),
            providers: ctx.providers(),
            remote_events: ctx.remote_events(),
            tasks: ctx.tasks(),
            catalog: ctx.catalog(),
            registry: ctx.registry.clone(),
            broadcaster: ctx.broadcaster.clone(),
            activity: ctx.activity(),
            health: ctx.health(),
            sales: ctx.sales_recorder(),
            config: ctx.config.sync.clone(),
            image_base_url: ctx.config.image_base_url.clone(),
            permits: Arc::new(Semaphore::new(ctx.config.sync.max_concurrent_passes as usize)),
        }
    }

    /// Reconciles every enabled provider of a setup. Per-provider failures are
    /// reported, not raised.
    pub async fn reconcile_setup(
        &self,
        setup_id: Uuid,
        trigger: SyncTrigger,
    ) -> Result<Vec<ReconcileReport>, ReconcileError> {
        self.setups
            .get_by_id(setup_id)
            .await?
            .ok_or(ReconcileError::SetupNotFound(setup_id))?;

        let mut reports = Vec::new();
        for provider_setup in self.setups.provider_setups(setup_id).await? {
            if !provider_setup.enabled {
                continue;
            }
            let provider_id = provider_setup.provider_id;
            match self.reconcile(setup_id, provider_id, trigger).await {
                Ok(report) => reports.push(report),
                Err(err) => {
                    error!(%setup_id, %provider_id, error = %err, "Reconciliation pass failed");
                    let mut report = ReconcileReport::new(setup_id, provider_id);
                    report.errors.push(err.to_string());
                    report.outcome = PassOutcome::Skipped {
                        reason: "pass failed".to_string(),
                    };
                    reports.push(report);
                }
            }
        }
        Ok(reports)
    }

    /// Runs one pass for a (setup, provider) pair.
    #[instrument(skip(self), fields(setup_id = %setup_id, provider_id = %provider_id))]
    pub async fn reconcile(
        &self,
        setup_id: Uuid,
        provider_id: Uuid,
        trigger: SyncTrigger,
    ) -> Result<ReconcileReport, ReconcileError> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| ReconcileError::Closed)?;

        let now = Utc::now();
        let setup = self
            .setups
            .get_by_id(setup_id)
            .await?
            .ok_or(ReconcileError::SetupNotFound(setup_id))?;
        let provider = self
            .providers
            .get_by_id(provider_id)
            .await?
            .ok_or(ReconcileError::ProviderNotFound(provider_id))?;
        let provider_setup = self
            .setups
            .get_provider_setup(setup_id, provider_id)
            .await?
            .ok_or(ReconcileError::ProviderSetupNotFound {
                setup_id,
                provider_id,
            })?;

        let mut report = ReconcileReport::new(setup_id, provider_id);

        if let Some(reason) = self.precondition_failure(&setup, &provider_setup, &provider, trigger, now) {
            info!(%reason, ?trigger, "Skipping reconciliation pass");
            report.outcome = PassOutcome::Skipped { reason };
            return Ok(report);
        }

        if let Some(until) = provider
            .rate_limited_until
            .map(|until| until.with_timezone(&Utc))
            .filter(|until| *until > now)
        {
            let retry_at = self
                .defer(&setup, &provider, until, "provider inside rate-limit window")
                .await?;
            report.outcome = PassOutcome::RateLimited { retry_at };
            return Ok(report);
        }

        self.setups.mark_sync_started(provider_setup.id, now).await?;
        self.publish_status(&setup, &provider, PassPhase::Started, None);

        let started = Instant::now();
        let result = self
            .run_pass(&setup, &provider_setup, &provider, now, &mut report)
            .await;
        histogram!("ticketing_reconcile_pass_duration_ms").record(started.elapsed().as_millis() as f64);

        let finished_error = match &result {
            Err(err) => Some(err.to_string()),
            Ok(_) if !report.errors.is_empty() => Some(report.errors.join("; ")),
            Ok(_) => None,
        };
        if let Err(err) = self
            .setups
            .mark_sync_finished(provider_setup.id, Utc::now(), finished_error)
            .await
        {
            error!(error = %err, "Failed to record pass completion");
        }

        report.outcome = match result {
            Ok(outcome) => outcome,
            Err(err) => {
                self.publish_status(&setup, &provider, PassPhase::Completed, Some(err.to_string()));
                return Err(err);
            }
        };

        let (phase, detail) = match &report.outcome {
            PassOutcome::RateLimited { retry_at } => {
                (PassPhase::RateLimited, Some(format!("retry at {}", retry_at)))
            }
            PassOutcome::AuthFailed => (PassPhase::AuthFailed, None),
            _ => (PassPhase::Completed, None),
        };
        self.publish_status(&setup, &provider, phase, detail);

        info!(
            created = report.created,
            updated = report.updated,
            deleted = report.deleted,
            synced = report.synced,
            errors = report.errors.len(),
            outcome = ?report.outcome,
            "Reconciliation pass finished"
        );
        Ok(report)
    }

    fn precondition_failure(
        &self,
        setup: &SetupModel,
        provider_setup: &ProviderSetupModel,
        provider: &ProviderModel,
        trigger: SyncTrigger,
        now: DateTime<Utc>,
    ) -> Option<String> {
        if setup.status != SetupStatus::Active {
            return Some("setup is not active".to_string());
        }
        if !provider_setup.enabled {
            return Some("provider setup is disabled".to_string());
        }
        if !provider.active {
            return Some("provider is inactive".to_string());
        }
        if !provider.credentials_valid {
            return Some("provider credentials are invalid".to_string());
        }
        if !trigger.bypasses_guard()
            && let Some(started) = provider_setup.last_sync_started_at
        {
            let elapsed = now - started.with_timezone(&Utc);
            if elapsed < Duration::seconds(self.config.reconcile_guard_seconds as i64) {
                return Some(format!(
                    "a pass started {}s ago",
                    elapsed.num_seconds().max(0)
                ));
            }
        }
        None
    }

    async fn run_pass(
        &self,
        setup: &SetupModel,
        provider_setup: &ProviderSetupModel,
        provider: &ProviderModel,
        now: DateTime<Utc>,
        report: &mut ReconcileReport,
    ) -> Result<PassOutcome, ReconcileError> {
        let adapter = self.registry.resolve(provider)?;
        let production = self
            .catalog
            .get_production(setup.production_id)
            .await?
            .ok_or(ReconcileError::ProductionNotFound(setup.production_id))?;
        let shows = self.catalog.list_shows_for_production(production.id).await?;
        let rules = self.setups.show_rules(setup.id).await?;

        let should_list = should_list_ids(setup, &shows, &rules, provider.id, now);
        let listed: BTreeMap<Uuid, RemoteEventModel> = self
            .remote_events
            .list_active_for_provider_production(provider.id, production.id)
            .await?
            .into_iter()
            .map(|event| (event.show_id, event))
            .collect();
        let listed_ids: BTreeSet<Uuid> = listed.keys().copied().collect();
        let plan = diff(&should_list, &listed_ids);
        debug!(
            to_create = plan.to_create.len(),
            to_delete = plan.to_delete.len(),
            to_sync = plan.to_sync.len(),
            "Computed listing diff"
        );

        let shows_by_id: HashMap<Uuid, &ShowModel> = shows.iter().map(|s| (s.id, s)).collect();
        let provider_overrides = PayloadOverrides::from_json(provider_setup.overrides.as_ref());
        let ctx = PayloadContext {
            production: &production,
            setup,
            provider_overrides: &provider_overrides,
            image_base_url: self.image_base_url.as_deref(),
        };
        let mut pass = Pass {
            setup,
            provider_setup,
            provider,
            adapter,
            series_external_id: provider_setup.series_external_id.clone(),
        };
        let payload_for = |pass: &Pass<'_>, show: &ShowModel, own: Option<&str>| -> EventPayload {
            ctx.build(
                show,
                &show_overrides(&rules, show.id, provider.id),
                pass.parent_for(own),
            )
        };

        for show_id in &plan.to_create {
            let Some(show) = shows_by_id.get(show_id) else {
                continue;
            };
            let payload = payload_for(&pass, show, None);
            if let Step::Halt(outcome) = self.create_listing(&mut pass, report, show, payload, None).await? {
                return Ok(outcome);
            }
        }

        for show_id in &plan.to_delete {
            let Some(event) = listed.get(show_id) else {
                continue;
            };
            if let Step::Halt(outcome) = self.delete_listing(&mut pass, report, event.clone()).await? {
                return Ok(outcome);
            }
        }

        for show_id in &plan.to_sync {
            let (Some(show), Some(event)) = (shows_by_id.get(show_id), listed.get(show_id)) else {
                continue;
            };
            let payload = payload_for(&pass, show, event.external_event_id.as_deref());
            if let Step::Halt(outcome) = self
                .sync_listing(&mut pass, report, show, event.clone(), payload, now)
                .await?
            {
                return Ok(outcome);
            }
        }

        Ok(PassOutcome::Completed)
    }

    /// Creates a listing. `existing` is a row without an external id being
    /// retried; otherwise a fresh `pending_create` row is inserted first.
    async fn create_listing(
        &self,
        pass: &mut Pass<'_>,
        report: &mut ReconcileReport,
        show: &ShowModel,
        payload: EventPayload,
        existing: Option<RemoteEventModel>,
    ) -> Result<Step, ReconcileError> {
        let hash = content_hash(&payload);
        let (row, fresh) = match existing {
            Some(row) => (row, false),
            None => {
                let key = RemoteEventKey {
                    provider_id: pass.provider.id,
                    show_id: show.id,
                    production_id: show.production_id,
                    setup_id: Some(pass.setup.id),
                };
                match self.remote_events.insert_pending_create(key, payload.capacity).await {
                    Ok(row) => (row, true),
                    Err(err) if is_unique_violation_anyhow(&err) => {
                        debug!(show_id = %show.id, "Show already listed by a concurrent pass");
                        return Ok(Step::Continue);
                    }
                    Err(err) => return Err(err.into()),
                }
            }
        };

        counter!("ticketing_reconcile_operations_total", "op" => "create").increment(1);
        match pass.adapter.create_event(&payload).await {
            Ok(created) => {
                let row = self
                    .remote_events
                    .mark_synced_after_create(&row, &created, &hash)
                    .await?;
                report.created += 1;

                if pass.grouped() && pass.series_external_id.is_none() {
                    self.setups
                        .set_series_external_id(pass.provider_setup.id, Some(&created.event_id))
                        .await?;
                    pass.series_external_id = Some(created.event_id.clone());
                }

                self.announce(
                    pass,
                    &row,
                    ActivityKind::EventCreated,
                    format!("Listed \"{}\" on {}", payload.title, pass.provider.name),
                    None,
                )
                .await;
                Ok(Step::Continue)
            }
            Err(err) => {
                let kind = self.health.record_failure(pass.provider, &err).await;
                if matches!(kind, FailureKind::RateLimited { .. }) {
                    if fresh {
                        // Nothing exists remotely for a rejected create.
                        self.remote_events.delete(row).await?;
                    } else {
                        self.remote_events
                            .set_status(&row, SyncStatus::Error, Some(err.to_string()))
                            .await?;
                    }
                } else {
                    self.record_item_error(pass, report, &row, &err).await?;
                }
                Ok(self.halt_for(pass, kind).await?.map_or(Step::Continue, Step::Halt))
            }
        }
    }

    async fn delete_listing(
        &self,
        pass: &mut Pass<'_>,
        report: &mut ReconcileReport,
        event: RemoteEventModel,
    ) -> Result<Step, ReconcileError> {
        let Some(external_id) = event.external_event_id.clone() else {
            // Never created remotely: retire the row without an adapter call.
            let row = if event.sync_status == SyncStatus::PendingCreate {
                self.remote_events
                    .set_status(&event, SyncStatus::Error, Some("withdrawn before creation".to_string()))
                    .await?
            } else {
                event
            };
            if row.sync_status.can_transition_to(SyncStatus::Deleted) {
                let row = self
                    .remote_events
                    .set_status(&row, SyncStatus::Deleted, None)
                    .await?;
                report.deleted += 1;
                self.announce(pass, &row, ActivityKind::EventDeleted, "Unlisted before creation".to_string(), None)
                    .await;
            }
            return Ok(Step::Continue);
        };

        let row = match event.sync_status {
            SyncStatus::PendingDelete => event,
            status if status.can_transition_to(SyncStatus::PendingDelete) => {
                self.remote_events
                    .set_status(&event, SyncStatus::PendingDelete, None)
                    .await?
            }
            status => {
                warn!(remote_event_id = %event.id, ?status, "Cannot delete listing in its current state");
                return Ok(Step::Continue);
            }
        };

        counter!("ticketing_reconcile_operations_total", "op" => "delete").increment(1);
        match pass.adapter.delete_event(&external_id).await {
            Ok(()) => {
                let row = self
                    .remote_events
                    .set_status(&row, SyncStatus::Deleted, None)
                    .await?;
                report.deleted += 1;
                self.announce(
                    pass,
                    &row,
                    ActivityKind::EventDeleted,
                    format!("Removed listing {} from {}", external_id, pass.provider.name),
                    None,
                )
                .await;
                if pass.series_external_id.as_deref() == Some(external_id.as_str()) {
                    self.replace_series_parent(pass, &external_id).await?;
                }
                Ok(Step::Continue)
            }
            Err(err) => {
                let kind = self.health.record_failure(pass.provider, &err).await;
                if let Some(outcome) = self.halt_for(pass, kind).await? {
                    // Stays pending_delete; the next pass retries it.
                    return Ok(Step::Halt(outcome));
                }
                self.record_item_error(pass, report, &row, &err).await?;
                Ok(Step::Continue)
            }
        }
    }

    async fn sync_listing(
        &self,
        pass: &mut Pass<'_>,
        report: &mut ReconcileReport,
        show: &ShowModel,
        event: RemoteEventModel,
        payload: EventPayload,
        now: DateTime<Utc>,
    ) -> Result<Step, ReconcileError> {
        let Some(external_id) = event.external_event_id.clone() else {
            return match event.sync_status {
                SyncStatus::Error => {
                    let row = self
                        .remote_events
                        .set_status(&event, SyncStatus::PendingCreate, None)
                        .await?;
                    self.create_listing(pass, report, show, payload, Some(row)).await
                }
                SyncStatus::PendingCreate => {
                    self.create_listing(pass, report, show, payload, Some(event)).await
                }
                _ => Ok(Step::Continue),
            };
        };

        if event.sync_status == SyncStatus::PendingDelete {
            debug!(remote_event_id = %event.id, "Listing awaits deletion");
            return Ok(Step::Continue);
        }

        let hash = content_hash(&payload);
        let unchanged = event.content_hash.as_deref() == Some(hash.as_str());
        let mut row = event;
        if row.sync_status == SyncStatus::Error {
            row = self
                .remote_events
                .set_status(&row, SyncStatus::PendingUpdate, None)
                .await?;
            if unchanged {
                row = self
                    .remote_events
                    .set_status(&row, SyncStatus::Synced, None)
                    .await?;
                info!(remote_event_id = %row.id, "Listing recovered from error without changes");
            }
        }

        if row.sync_status == SyncStatus::PendingUpdate || !unchanged {
            if row.sync_status == SyncStatus::Synced {
                row = self
                    .remote_events
                    .set_status(&row, SyncStatus::PendingUpdate, None)
                    .await?;
            }

            counter!("ticketing_reconcile_operations_total", "op" => "update").increment(1);
            match pass.adapter.update_event(&external_id, &payload).await {
                Ok(()) => {
                    row = self.remote_events.mark_updated(&row, &hash).await?;
                    report.updated += 1;
                    self.announce(
                        pass,
                        &row,
                        ActivityKind::EventUpdated,
                        format!("Updated \"{}\" on {}", payload.title, pass.provider.name),
                        None,
                    )
                    .await;
                }
                Err(err) => {
                    let kind = self.health.record_failure(pass.provider, &err).await;
                    if let Some(outcome) = self.halt_for(pass, kind).await? {
                        return Ok(Step::Halt(outcome));
                    }
                    self.record_item_error(pass, report, &row, &err).await?;
                    return Ok(Step::Continue);
                }
            }
        }

        let last_synced = row.last_synced_at.map(|t| t.with_timezone(&Utc));
        if is_fresh(last_synced, now, self.config.sales_freshness_seconds) {
            return Ok(Step::Continue);
        }

        counter!("ticketing_reconcile_operations_total", "op" => "sales").increment(1);
        match pass.adapter.get_sales(&external_id).await {
            Ok(snapshot) => {
                self.sales.apply(&row, &snapshot).await?;
                report.synced += 1;
                Ok(Step::Continue)
            }
            Err(err) => {
                let kind = self.health.record_failure(pass.provider, &err).await;
                if let Some(outcome) = self.halt_for(pass, kind).await? {
                    return Ok(Step::Halt(outcome));
                }
                warn!(remote_event_id = %row.id, error = %err, "Sales refresh failed");
                report.errors.push(format!("show {}: {}", row.show_id, err));
                Ok(Step::Continue)
            }
        }
    }

    /// Re-points the series at the oldest remaining listing of this setup, or
    /// clears it when none is left.
    async fn replace_series_parent(
        &self,
        pass: &mut Pass<'_>,
        removed: &str,
    ) -> Result<(), ReconcileError> {
        let successor = self
            .remote_events
            .list_active_for_provider_production(pass.provider.id, pass.setup.production_id)
            .await?
            .into_iter()
            .filter(|event| event.setup_id == Some(pass.setup.id))
            .filter(|event| matches!(event.sync_status, SyncStatus::Synced | SyncStatus::PendingUpdate))
            .filter_map(|event| event.external_event_id)
            .find(|id| id != removed);

        self.setups
            .set_series_external_id(pass.provider_setup.id, successor.as_deref())
            .await?;
        info!(previous = removed, next = ?successor, "Series parent replaced");
        pass.series_external_id = successor;
        Ok(())
    }

    /// Turns a pass-level failure into the outcome that ends the pass.
    async fn halt_for(
        &self,
        pass: &Pass<'_>,
        kind: FailureKind,
    ) -> Result<Option<PassOutcome>, ReconcileError> {
        match kind {
            FailureKind::RateLimited { resets_at } => {
                let retry_at = self
                    .defer(pass.setup, pass.provider, resets_at, "rate limited during pass")
                    .await?;
                Ok(Some(PassOutcome::RateLimited { retry_at }))
            }
            FailureKind::AuthExpired => Ok(Some(PassOutcome::AuthFailed)),
            FailureKind::Rejected | FailureKind::Transient => Ok(None),
        }
    }

    /// Schedules a deferred pass one grace period after `resets_at`. The
    /// activity entry is only written when the pending task was inserted or
    /// pushed back.
    async fn defer(
        &self,
        setup: &SetupModel,
        provider: &ProviderModel,
        resets_at: DateTime<Utc>,
        reason: &str,
    ) -> Result<DateTime<Utc>, ReconcileError> {
        let not_before = resets_at + Duration::seconds(self.config.rate_limit_grace_seconds as i64);
        let scheduled = self
            .tasks
            .schedule_reconcile(setup.id, provider.id, not_before, reason)
            .await?;
        let retry_at = scheduled.task.not_before.with_timezone(&Utc);

        if !scheduled.changed {
            debug!(setup_id = %setup.id, provider_id = %provider.id, %retry_at, "Deferral already scheduled");
            return Ok(retry_at);
        }

        info!(setup_id = %setup.id, provider_id = %provider.id, %retry_at, "Deferred reconciliation");
        self.activity
            .record(
                NewActivity::new(
                    setup.production_id,
                    ActivityKind::RateLimited,
                    format!("{} rate limited; sync resumes at {}", provider.name, retry_at),
                )
                .provider(provider.id)
                .metadata(serde_json::json!({
                    "resets_at": resets_at,
                    "retry_at": retry_at,
                    "reason": reason,
                })),
            )
            .await;
        Ok(retry_at)
    }

    async fn record_item_error(
        &self,
        pass: &Pass<'_>,
        report: &mut ReconcileReport,
        row: &RemoteEventModel,
        err: &AdapterError,
    ) -> Result<(), ReconcileError> {
        warn!(remote_event_id = %row.id, show_id = %row.show_id, error = %err, "Listing operation failed");
        let row = self
            .remote_events
            .set_status(row, SyncStatus::Error, Some(err.to_string()))
            .await?;
        report.errors.push(format!("show {}: {}", row.show_id, err));
        self.announce(
            pass,
            &row,
            ActivityKind::SyncError,
            format!("{} sync failed: {}", pass.provider.name, err),
            Some(err.to_string()),
        )
        .await;
        Ok(())
    }

    /// Activity entry plus `show_sync` broadcast for one row.
    async fn announce(
        &self,
        pass: &Pass<'_>,
        row: &RemoteEventModel,
        kind: ActivityKind,
        message: String,
        error: Option<String>,
    ) {
        self.broadcaster.publish(
            row.production_id,
            EngineMessage::ShowSync {
                show_id: row.show_id,
                provider_id: pass.provider.id,
                remote_event_id: row.id,
                sync_status: row.sync_status,
                external_event_id: row.external_event_id.clone(),
                error,
            },
        );
        self.activity
            .record(
                NewActivity::new(row.production_id, kind, message)
                    .provider(pass.provider.id)
                    .show(row.show_id)
                    .remote_event(row.id),
            )
            .await;
    }

    fn publish_status(
        &self,
        setup: &SetupModel,
        provider: &ProviderModel,
        phase: PassPhase,
        detail: Option<String>,
    ) {
        self.broadcaster.publish(
            setup.production_id,
            EngineMessage::EngineStatus {
                setup_id: setup.id,
                provider_id: provider.id,
                phase,
                detail,
            },
        );
    }
}
