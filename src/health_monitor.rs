//! # Provider Health Monitor
//!
//! Periodically tests provider credentials and reports on webhook configuration.
//! Failures are applied through [`ProviderHealth`] so a rejected token degrades
//! the provider and its listings exactly as a failed sync call would.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use metrics::counter;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::adapters::{AdapterRegistry, FailureKind};
use crate::crypto::decrypt_provider_credentials;
use crate::engine::EngineContext;
use crate::models::ticketing_provider::Model as ProviderModel;
use crate::provider_health::ProviderHealth;
use crate::repositories::ProviderRepository;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum CheckOutcome {
    Ok,
    AuthFailed,
    RateLimited,
    Error,
    /// Manual-only or inactive provider; nothing to call
    NotApplicable,
}

impl CheckOutcome {
    fn as_label(self) -> &'static str {
        match self {
            CheckOutcome::Ok => "ok",
            CheckOutcome::AuthFailed => "auth_failed",
            CheckOutcome::RateLimited => "rate_limited",
            CheckOutcome::Error => "error",
            CheckOutcome::NotApplicable => "not_applicable",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct WebhookHealth {
    pub enabled: bool,
    pub secret_configured: bool,
    pub last_webhook_at: Option<DateTime<Utc>>,
    /// Enabled, but nothing received within the staleness window
    pub stale: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct HealthCheckResult {
    pub provider_id: Uuid,
    pub outcome: CheckOutcome,
    pub error: Option<String>,
    pub webhook: WebhookHealth,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HealthSweepReport {
    pub checked: usize,
    pub skipped: usize,
    pub failed: usize,
}

#[derive(Clone)]
pub struct HealthMonitor {
    providers: ProviderRepository,
    registry: Arc<AdapterRegistry>,
    health: ProviderHealth,
    cooldown_seconds: u64,
    webhook_stale_hours: u64,
}

impl HealthMonitor {
    pub fn new(ctx: &EngineContext) -> Self {
        Self {
            providers: ctx.providers(),
            registry: ctx.registry.clone(),
            health: ctx.health(),
            cooldown_seconds: ctx.config.sync.health_cooldown_seconds,
            webhook_stale_hours: ctx.config.sync.webhook_stale_hours,
        }
    }

    /// Checks every active provider not checked within the cooldown.
    #[instrument(skip(self))]
    pub async fn run_checks(&self) -> anyhow::Result<HealthSweepReport> {
        let now = Utc::now();
        let mut report = HealthSweepReport::default();

        for provider in self.providers.list_active().await? {
            let recently_checked = provider
                .credentials_checked_at
                .map(|at| now - at.with_timezone(&Utc) < Duration::seconds(self.cooldown_seconds as i64))
                .unwrap_or(false);
            if recently_checked || !provider.is_api_enabled() || provider.is_rate_limited_at(now) {
                report.skipped += 1;
                continue;
            }

            let result = self.check(&provider, now).await;
            report.checked += 1;
            if result.outcome != CheckOutcome::Ok {
                report.failed += 1;
            }
        }

        debug!(
            checked = report.checked,
            skipped = report.skipped,
            failed = report.failed,
            "Health sweep completed"
        );
        Ok(report)
    }

    /// Checks one provider now, ignoring the cooldown. `None` if it does not exist.
    pub async fn check_provider(&self, provider_id: Uuid) -> anyhow::Result<Option<HealthCheckResult>> {
        let Some(provider) = self.providers.get_by_id(provider_id).await? else {
            return Ok(None);
        };
        Ok(Some(self.check(&provider, Utc::now()).await))
    }

    #[instrument(skip(self, provider), fields(provider_id = %provider.id, provider_type = %provider.provider_type))]
    async fn check(&self, provider: &ProviderModel, now: DateTime<Utc>) -> HealthCheckResult {
        let webhook = self.webhook_health(provider, now);

        if !provider.is_api_enabled() {
            return HealthCheckResult {
                provider_id: provider.id,
                outcome: CheckOutcome::NotApplicable,
                error: None,
                webhook,
            };
        }

        let (outcome, error) = match self.registry.resolve(provider) {
            Err(err) => {
                warn!(error = %err, "Cannot build adapter for health check");
                (CheckOutcome::Error, Some(err.to_string()))
            }
            Ok(adapter) => match adapter.test_credentials().await {
                Ok(()) => {
                    self.health.record_success(provider).await;
                    (CheckOutcome::Ok, None)
                }
                Err(err) => {
                    let outcome = match self.health.record_failure(provider, &err).await {
                        FailureKind::AuthExpired => CheckOutcome::AuthFailed,
                        FailureKind::RateLimited { .. } => CheckOutcome::RateLimited,
                        FailureKind::Rejected | FailureKind::Transient => CheckOutcome::Error,
                    };
                    (outcome, Some(err.to_string()))
                }
            },
        };

        counter!("ticketing_health_checks_total", "result" => outcome.as_label()).increment(1);
        info!(outcome = outcome.as_label(), "Provider health checked");

        HealthCheckResult {
            provider_id: provider.id,
            outcome,
            error,
            webhook,
        }
    }

    fn webhook_health(&self, provider: &ProviderModel, now: DateTime<Utc>) -> WebhookHealth {
        let secret_configured = decrypt_provider_credentials(self.registry.crypto_key(), provider)
            .ok()
            .flatten()
            .is_some_and(|c| c.webhook_secret.as_deref().is_some_and(|s| !s.is_empty()));
        let last_webhook_at = provider.last_webhook_at.map(|at| at.with_timezone(&Utc));
        let stale = provider.webhook_enabled
            && !provider.manual_only
            && last_webhook_at
                .map(|at| now - at > Duration::hours(self.webhook_stale_hours as i64))
                .unwrap_or(false);

        if stale {
            warn!(
                provider_id = %provider.id,
                last_webhook_at = ?last_webhook_at,
                "No webhooks received recently"
            );
        }
        if provider.webhook_enabled && !provider.manual_only && !secret_configured {
            debug!(provider_id = %provider.id, "Webhooks rely on the URL token only");
        }

        WebhookHealth {
            enabled: provider.webhook_enabled,
            secret_configured,
            last_webhook_at,
            stale,
        }
    }
}
