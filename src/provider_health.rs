//! Provider failure bookkeeping
//!
//! The one place a classified adapter failure mutates provider state. Used by
//! reconciliation, sales sync, discovery, webhook processing and the health
//! monitor so every path degrades a provider the same way.

use std::collections::BTreeMap;

use chrono::Utc;
use metrics::counter;
use serde_json::json;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::activity_log::ActivityRecorder;
use crate::adapters::{AdapterError, FailureKind, classify};
use crate::models::activity::ActivityKind;
use crate::models::ticketing_provider::Model as ProviderModel;
use crate::repositories::{NewActivity, ProviderRepository, RemoteEventRepository};

#[derive(Debug, Clone)]
pub struct ProviderHealth {
    providers: ProviderRepository,
    remote_events: RemoteEventRepository,
    activity: ActivityRecorder,
}

impl ProviderHealth {
    pub fn new(
        providers: ProviderRepository,
        remote_events: RemoteEventRepository,
        activity: ActivityRecorder,
    ) -> Self {
        Self {
            providers,
            remote_events,
            activity,
        }
    }

    /// Classifies `error` and applies its provider-level effects.
    pub async fn record_failure(&self, provider: &ProviderModel, error: &AdapterError) -> FailureKind {
        let kind = classify(error);
        match kind {
            FailureKind::RateLimited { resets_at } => {
                counter!("ticketing_rate_limited_total").increment(1);
                warn!(provider_id = %provider.id, %resets_at, "Provider rate limited");
                if let Err(err) = self
                    .providers
                    .set_rate_limited_until(provider.id, resets_at, Some(0))
                    .await
                {
                    error!(provider_id = %provider.id, error = %err, "Failed to record rate-limit window");
                }
            }
            FailureKind::AuthExpired => {
                self.mark_auth_expired(provider, &error.to_string()).await;
            }
            FailureKind::Transient => {
                if let Err(err) = self
                    .providers
                    .record_credentials_error(provider.id, &error.to_string(), Utc::now())
                    .await
                {
                    error!(provider_id = %provider.id, error = %err, "Failed to record provider error");
                }
            }
            FailureKind::Rejected => {}
        }
        kind
    }

    pub async fn record_success(&self, provider: &ProviderModel) {
        if let Err(err) = self
            .providers
            .mark_credentials_valid(provider.id, Utc::now())
            .await
        {
            error!(provider_id = %provider.id, error = %err, "Failed to mark credentials valid");
        }
    }

    /// Marks credentials invalid and flips auth-sensitive listings to
    /// `auth_expired`, with one activity entry per affected production.
    async fn mark_auth_expired(&self, provider: &ProviderModel, message: &str) {
        warn!(provider_id = %provider.id, provider_type = %provider.provider_type, "Provider credentials rejected");

        if let Err(err) = self
            .providers
            .mark_credentials_invalid(provider.id, message, Utc::now())
            .await
        {
            error!(provider_id = %provider.id, error = %err, "Failed to mark credentials invalid");
        }

        let flipped = match self
            .remote_events
            .flip_remote_status_for_provider(provider.id)
            .await
        {
            Ok(rows) => rows,
            Err(err) => {
                error!(provider_id = %provider.id, error = %err, "Failed to flip remote events to auth_expired");
                return;
            }
        };

        let mut per_production: BTreeMap<Uuid, usize> = BTreeMap::new();
        for event in &flipped {
            *per_production.entry(event.production_id).or_default() += 1;
        }

        for (production_id, count) in per_production {
            info!(%production_id, provider_id = %provider.id, count, "Listings flipped to auth_expired");
            self.activity
                .record(
                    NewActivity::new(
                        production_id,
                        ActivityKind::AuthExpired,
                        format!(
                            "{} credentials expired; {} listing(s) need attention",
                            provider.name, count
                        ),
                    )
                    .provider(provider.id)
                    .metadata(json!({ "affected_events": count, "error": message })),
                )
                .await;
        }
    }
}
