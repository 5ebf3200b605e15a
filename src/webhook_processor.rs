//! # Webhook Processor
//!
//! Applies verified webhook logs asynchronously. The HTTP handler only records
//! and verifies; ids of accepted logs travel over an in-process channel to
//! [`WebhookProcessor::run`]. Processing is idempotent per log and per
//! (provider, dedupe key).

use std::sync::Arc;

use chrono::{Duration, Utc};
use sha2::{Digest, Sha256};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::adapters::{AdapterRegistry, ParsedWebhook};
use crate::engine::EngineContext;
use crate::error::is_unique_violation;
use crate::models::remote_event::{Model as RemoteEventModel, SyncStatus};
use crate::models::ticketing_provider::Model as ProviderModel;
use crate::models::webhook_log::{Model as WebhookLogModel, SignatureStatus};
use crate::provider_health::ProviderHealth;
use crate::repositories::{ProviderRepository, RemoteEventRepository, WebhookLogRepository};
use crate::sales_sync::SalesRecorder;

const QUEUE_CAPACITY: usize = 1024;

/// Sending half of the processing queue, held by the HTTP layer and the sweep.
#[derive(Debug, Clone)]
pub struct WebhookQueue {
    tx: mpsc::Sender<Uuid>,
}

impl WebhookQueue {
    pub fn channel() -> (Self, mpsc::Receiver<Uuid>) {
        let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);
        (Self { tx }, rx)
    }

    /// Queues a log for processing. A full or closed queue leaves the log in
    /// `received` for the sweep to pick up.
    pub fn enqueue(&self, log_id: Uuid) -> bool {
        match self.tx.try_send(log_id) {
            Ok(()) => true,
            Err(err) => {
                warn!(%log_id, error = %err, "Webhook queue unavailable; leaving log for sweep");
                false
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessOutcome {
    Processed,
    Duplicate,
    Failed,
    /// Already final or not verified
    Skipped,
}

/// Deduplication key of a delivery: delivery id, else order id, else a body digest.
pub fn dedupe_key(parsed: &ParsedWebhook, body: &[u8]) -> String {
    parsed
        .delivery_id
        .clone()
        .or_else(|| parsed.external_order_id.clone())
        .unwrap_or_else(|| format!("sha256:{}", hex::encode(Sha256::digest(body))))
}

/// What a webhook does to the cache, decided before the log is claimed.
enum Effect {
    RefreshSales(RemoteEventModel),
    SetRemoteStatus(RemoteEventModel, &'static str),
    RefreshStatus(RemoteEventModel),
    None,
}

#[derive(Clone)]
pub struct WebhookProcessor {
    logs: WebhookLogRepository,
    providers: ProviderRepository,
    remote_events: RemoteEventRepository,
    registry: Arc<AdapterRegistry>,
    health: ProviderHealth,
    recorder: SalesRecorder,
}

impl WebhookProcessor {
    pub fn new(ctx: &EngineContext) -> Self {
        Self {
            logs: ctx.webhook_logs(),
            providers: ctx.providers(),
            remote_events: ctx.remote_events(),
            registry: ctx.registry.clone(),
            health: ctx.health(),
            recorder: ctx.sales_recorder(),
        }
    }

    /// Drains the queue until shutdown.
    pub async fn run(&self, mut rx: mpsc::Receiver<Uuid>, shutdown: CancellationToken) {
        info!("Starting webhook processor");
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Webhook processor shutdown requested");
                    break;
                }
                next = rx.recv() => {
                    let Some(log_id) = next else {
                        debug!("Webhook queue closed");
                        break;
                    };
                    if let Err(err) = self.process(log_id).await {
                        error!(%log_id, error = ?err, "Webhook processing failed");
                    }
                }
            }
        }
        info!("Webhook processor stopped");
    }

    /// Processes one log. Safe to call any number of times for the same id.
    #[instrument(skip(self), fields(log_id = %log_id))]
    pub async fn process(&self, log_id: Uuid) -> anyhow::Result<ProcessOutcome> {
        let Some(log) = self.logs.get_by_id(log_id).await? else {
            anyhow::bail!("webhook log {} not found", log_id);
        };
        if log.status.is_final() || log.signature_status != SignatureStatus::Valid {
            debug!(status = ?log.status, signature = ?log.signature_status, "Skipping webhook log");
            return Ok(ProcessOutcome::Skipped);
        }

        let Some(provider) = self.providers.get_by_id(log.provider_id).await? else {
            self.logs.mark_failed(log.id, "provider no longer exists").await?;
            return Ok(ProcessOutcome::Failed);
        };

        let parsed = match self
            .registry
            .resolve(&provider)
            .map_err(|e| e.to_string())
            .and_then(|adapter| {
                adapter
                    .parse_webhook(log.payload.as_bytes())
                    .map_err(|e| e.to_string())
            }) {
            Ok(parsed) => parsed,
            Err(message) => {
                warn!(error = %message, "Unparseable webhook");
                self.logs.mark_failed(log.id, &message).await?;
                return Ok(ProcessOutcome::Failed);
            }
        };

        let key = dedupe_key(&parsed, log.payload.as_bytes());
        if self.logs.find_processed(provider.id, &key).await?.is_some() {
            info!(dedupe_key = %key, "Duplicate webhook delivery");
            self.logs.mark_duplicate(log.id, Utc::now()).await?;
            return Ok(ProcessOutcome::Duplicate);
        }
        self.logs
            .mark_processing(log.id, &parsed.event_type, &key)
            .await?;

        let (effect, note) = match self.plan(&provider, &parsed).await {
            Ok(planned) => planned,
            Err(err) => return self.fail(&log, &err.to_string()).await,
        };

        // `processed` is claimed before effects apply; the partial unique
        // index rejects a concurrent twin here.
        match self.logs.mark_processed(log.id, note, Utc::now()).await {
            Ok(()) => {}
            Err(err) if is_unique_violation(&err) => {
                info!(dedupe_key = %key, "Concurrent duplicate webhook delivery");
                self.logs.mark_duplicate(log.id, Utc::now()).await?;
                return Ok(ProcessOutcome::Duplicate);
            }
            Err(err) => return self.fail(&log, &err.to_string()).await,
        }

        if let Err(err) = self.apply(&provider, effect).await {
            return self.fail(&log, &err.to_string()).await;
        }

        debug!(event_type = %parsed.event_type, "Webhook processed");
        Ok(ProcessOutcome::Processed)
    }

    /// Re-enqueues verified logs stuck in `received` for longer than `older_than`.
    pub async fn sweep(&self, queue: &WebhookQueue, older_than: Duration) -> anyhow::Result<usize> {
        let stuck = self
            .logs
            .list_stuck_received(Utc::now() - older_than)
            .await?;
        let mut enqueued = 0;
        for log in stuck {
            if queue.enqueue(log.id) {
                enqueued += 1;
            }
        }
        if enqueued > 0 {
            info!(enqueued, "Re-enqueued stuck webhook logs");
        }
        Ok(enqueued)
    }

    async fn plan(
        &self,
        provider: &ProviderModel,
        parsed: &ParsedWebhook,
    ) -> anyhow::Result<(Effect, Option<String>)> {
        let target = match parsed.external_event_id.as_deref() {
            Some(external_id) => self
                .remote_events
                .find_by_external_id(provider.id, external_id)
                .await?
                .filter(|event| event.sync_status != SyncStatus::Deleted),
            None => None,
        };

        let Some(event) = target else {
            let note = if parsed.is_order_event() || parsed.is_removal_event() || parsed.event_type.starts_with("event.") {
                "no listing mapped to this event"
            } else {
                "unrecognized event type"
            };
            return Ok((Effect::None, Some(note.to_string())));
        };

        let effect = if parsed.is_order_event() {
            Effect::RefreshSales(event)
        } else if parsed.is_removal_event() {
            let status = if parsed.event_type == "event.deleted" {
                "deleted"
            } else {
                "cancelled"
            };
            Effect::SetRemoteStatus(event, status)
        } else if parsed.event_type.starts_with("event.") {
            Effect::RefreshStatus(event)
        } else {
            return Ok((Effect::None, Some("unrecognized event type".to_string())));
        };
        Ok((effect, None))
    }

    async fn apply(&self, provider: &ProviderModel, effect: Effect) -> anyhow::Result<()> {
        match effect {
            Effect::None => Ok(()),
            Effect::SetRemoteStatus(event, status) => {
                info!(remote_event_id = %event.id, status, "Listing removed on provider");
                self.remote_events.set_remote_status(event.id, status).await
            }
            Effect::RefreshSales(event) | Effect::RefreshStatus(event) => {
                let Some(external_id) = event.external_event_id.as_deref() else {
                    return Ok(());
                };
                let adapter = self.registry.resolve(provider)?;
                match adapter.get_sales(external_id).await {
                    Ok(snapshot) => {
                        self.recorder.apply(&event, &snapshot).await?;
                        Ok(())
                    }
                    Err(err) => {
                        self.health.record_failure(provider, &err).await;
                        Err(err.into())
                    }
                }
            }
        }
    }

    async fn fail(&self, log: &WebhookLogModel, message: &str) -> anyhow::Result<ProcessOutcome> {
        warn!(log_id = %log.id, error = %message, "Webhook processing failed");
        self.logs.mark_failed(log.id, message).await?;
        Ok(ProcessOutcome::Failed)
    }
}
