//! # Task Scheduler
//!
//! Background loops that drive the engine: deferred and periodic reconciliation,
//! health checks, sales polling, discovery and the webhook sweep. Each loop has
//! the same shape: sleep a tick, run, record duration, never propagate errors.

use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use metrics::{counter, histogram};
use tokio::time::{Duration as TokioDuration, Instant, sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::config::SyncConfig;
use crate::discovery::Discovery;
use crate::engine::EngineContext;
use crate::health_monitor::HealthMonitor;
use crate::reconciler::{PassOutcome, Reconciler, SyncTrigger};
use crate::repositories::{ProviderRepository, ScheduledTaskRepository, SetupRepository, SyncCandidate};
use crate::sales_sync::SalesSync;
use crate::webhook_processor::{WebhookProcessor, WebhookQueue};

/// Tasks claimed per tick.
const CLAIM_BATCH_SIZE: usize = 32;

const WEBHOOK_SWEEP_INTERVAL_SECONDS: u64 = 120;

/// Verified logs still `received` after this long are re-enqueued.
const WEBHOOK_STUCK_AFTER_SECONDS: i64 = 120;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TickStats {
    pub tasks_claimed: usize,
    pub tasks_failed: usize,
    pub periodic_started: usize,
}

#[derive(Clone)]
pub struct TaskScheduler {
    config: SyncConfig,
    reconciler: Reconciler,
    tasks: ScheduledTaskRepository,
    setups: SetupRepository,
    providers: ProviderRepository,
    sales: SalesSync,
    health: HealthMonitor,
    discovery: Discovery,
    webhooks: WebhookProcessor,
    queue: WebhookQueue,
}

impl TaskScheduler {
    pub fn new(ctx: &EngineContext, reconciler: Reconciler, queue: WebhookQueue) -> Self {
        Self {
            config: ctx.config.sync.clone(),
            reconciler,
            tasks: ctx.tasks(),
            setups: ctx.setups(),
            providers: ctx.providers(),
            sales: SalesSync::new(ctx),
            health: HealthMonitor::new(ctx),
            discovery: Discovery::new(ctx),
            webhooks: WebhookProcessor::new(ctx),
            queue,
        }
    }

    /// Runs every loop until `shutdown` fires.
    #[instrument(skip_all)]
    pub async fn run(self, shutdown: CancellationToken) {
        info!("Starting task scheduler");
        let this = Arc::new(self);

        let reconcile = {
            let this = this.clone();
            every("reconcile", this.config.tick(), shutdown.clone(), move || {
                let this = this.clone();
                async move { this.tick(Utc::now()).await.map(|_| ()) }
            })
        };
        let health = {
            let this = this.clone();
            every(
                "health",
                TokioDuration::from_secs(this.config.health_interval_seconds),
                shutdown.clone(),
                move || {
                    let this = this.clone();
                    async move { this.health.run_checks().await.map(|_| ()) }
                },
            )
        };
        let sales = {
            let this = this.clone();
            every(
                "sales",
                TokioDuration::from_secs(this.config.sales_interval_seconds),
                shutdown.clone(),
                move || {
                    let this = this.clone();
                    async move { this.sales.run().await.map(|_| ()) }
                },
            )
        };
        let discovery = {
            let this = this.clone();
            every(
                "discovery",
                TokioDuration::from_secs(this.config.discovery_interval_seconds),
                shutdown.clone(),
                move || {
                    let this = this.clone();
                    async move { this.discover_all().await }
                },
            )
        };
        let sweep = {
            let this = this.clone();
            every(
                "webhook_sweep",
                TokioDuration::from_secs(WEBHOOK_SWEEP_INTERVAL_SECONDS),
                shutdown.clone(),
                move || {
                    let this = this.clone();
                    async move {
                        this.webhooks
                            .sweep(&this.queue, Duration::seconds(WEBHOOK_STUCK_AFTER_SECONDS))
                            .await
                            .map(|_| ())
                    }
                },
            )
        };

        tokio::join!(reconcile, health, sales, discovery, sweep);
        info!("Task scheduler stopped");
    }

    /// One reconciliation tick: due deferred tasks, then periodic passes.
    pub async fn tick(&self, now: DateTime<Utc>) -> anyhow::Result<TickStats> {
        let mut stats = TickStats::default();
        self.run_due_tasks(now, &mut stats).await?;
        self.run_periodic(now, &mut stats).await?;

        debug!(
            tasks_claimed = stats.tasks_claimed,
            tasks_failed = stats.tasks_failed,
            periodic_started = stats.periodic_started,
            "Scheduler tick completed"
        );
        Ok(stats)
    }

    async fn run_due_tasks(&self, now: DateTime<Utc>, stats: &mut TickStats) -> anyhow::Result<()> {
        let claimed = self.tasks.claim_due(now, CLAIM_BATCH_SIZE).await?;
        stats.tasks_claimed = claimed.len();

        for task in claimed {
            info!(task_id = %task.id, setup_id = %task.setup_id, provider_id = %task.provider_id, "Running deferred reconciliation");
            let result = self
                .reconciler
                .reconcile(task.setup_id, task.provider_id, SyncTrigger::Deferred)
                .await;

            let recorded = match result {
                Ok(report) => {
                    if let PassOutcome::RateLimited { retry_at } = report.outcome {
                        debug!(task_id = %task.id, %retry_at, "Deferred pass deferred again");
                    }
                    self.tasks.mark_done(task.id).await
                }
                Err(err) => {
                    stats.tasks_failed += 1;
                    warn!(task_id = %task.id, error = %err, "Deferred reconciliation failed");
                    self.tasks.mark_failed(task.id, &err.to_string()).await
                }
            };
            if let Err(err) = recorded {
                error!(task_id = %task.id, error = ?err, "Failed to record task result");
            }
        }
        Ok(())
    }

    async fn run_periodic(&self, now: DateTime<Utc>, stats: &mut TickStats) -> anyhow::Result<()> {
        let due: Vec<SyncCandidate> = self
            .setups
            .list_sync_candidates(now)
            .await?
            .into_iter()
            .filter(|candidate| is_due(candidate, now, self.config.reconcile_interval_seconds))
            .collect();
        stats.periodic_started = due.len();

        let mut handles = Vec::with_capacity(due.len());
        for candidate in due {
            let reconciler = self.reconciler.clone();
            handles.push(tokio::spawn(async move {
                reconciler
                    .reconcile(candidate.setup.id, candidate.provider.id, SyncTrigger::Periodic)
                    .await
            }));
        }

        for handle in handles {
            match handle.await {
                Ok(Ok(report)) => {
                    counter!("ticketing_reconcile_operations_total", "op" => "periodic_pass").increment(1);
                    debug!(setup_id = %report.setup_id, provider_id = %report.provider_id, outcome = ?report.outcome, "Periodic pass finished");
                }
                Ok(Err(err)) => error!(error = %err, "Periodic reconciliation failed"),
                Err(err) => error!(error = ?err, "Periodic reconciliation task panicked or was cancelled"),
            }
        }
        Ok(())
    }

    async fn discover_all(&self) -> anyhow::Result<()> {
        for organization_id in self.providers.organizations_with_api_providers().await? {
            if let Err(err) = self.discovery.discover_organization(organization_id).await {
                error!(%organization_id, error = ?err, "Discovery failed for organization");
            }
        }
        Ok(())
    }
}

/// Whether a candidate's last successful sync is older than the interval.
fn is_due(candidate: &SyncCandidate, now: DateTime<Utc>, interval_seconds: u64) -> bool {
    match candidate.provider_setup.last_synced_at {
        Some(at) => now - at.with_timezone(&Utc) >= Duration::seconds(interval_seconds as i64),
        None => true,
    }
}

async fn every<F, Fut>(name: &'static str, interval: TokioDuration, shutdown: CancellationToken, mut job: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = anyhow::Result<()>>,
{
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                debug!(loop_name = name, "Scheduler loop shutdown requested");
                break;
            }
            _ = sleep(interval) => {
                let tick_started = Instant::now();
                if let Err(err) = job().await {
                    counter!("ticketing_scheduler_tick_failures_total", "loop" => name).increment(1);
                    error!(loop_name = name, error = ?err, "Scheduler tick failed");
                }
                histogram!("ticketing_scheduler_tick_duration_ms", "loop" => name)
                    .record(tick_started.elapsed().as_secs_f64() * 1_000.0);
            }
        }
    }
}
