//! Discovery & matching
//!
//! Pulls events from every API-enabled provider of an organization, records
//! them as provider events and links them to shows when the match is strong
//! enough.

pub mod matcher;

use std::sync::Arc;

use chrono::Utc;
use metrics::counter;
use serde::Serialize;
use serde_json::json;
use tracing::{debug, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::activity_log::ActivityRecorder;
use crate::adapters::{AdapterRegistry, DiscoveredEvent};
use crate::engine::EngineContext;
use crate::error::is_unique_violation_anyhow;
use crate::models::activity::ActivityKind;
use crate::models::production::Model as ProductionModel;
use crate::models::provider_event::{MatchStatus, Model as ProviderEventModel};
use crate::models::show::Model as ShowModel;
use crate::models::ticketing_provider::Model as ProviderModel;
use crate::provider_health::ProviderHealth;
use crate::repositories::{
    CatalogRepository, ExistingListing, MatchUpdate, NewActivity, ProviderEventRepository,
    ProviderRepository, RemoteEventKey, RemoteEventRepository,
};

pub use matcher::{EventFacts, MatchDecision, MatchScore, MatchScorer};

#[derive(Debug, Clone, Default, PartialEq, Serialize, ToSchema)]
pub struct DiscoveryReport {
    pub providers_scanned: usize,
    pub events_seen: usize,
    pub matched: usize,
    pub suggested: usize,
    pub unmatched: usize,
    pub errors: Vec<String>,
}

#[derive(Clone)]
pub struct Discovery {
    providers: ProviderRepository,
    provider_events: ProviderEventRepository,
    remote_events: RemoteEventRepository,
    catalog: CatalogRepository,
    registry: Arc<AdapterRegistry>,
    health: ProviderHealth,
    activity: ActivityRecorder,
    scorer: MatchScorer,
}

impl Discovery {
    pub fn new(ctx: &EngineContext) -> Self {
        Self {
            providers: ctx.providers(),
            provider_events: ctx.provider_events(),
            remote_events: ctx.remote_events(),
            catalog: ctx.catalog(),
            registry: ctx.registry.clone(),
            health: ctx.health(),
            activity: ctx.activity(),
            scorer: MatchScorer::new(
                ctx.config.sync.auto_link_threshold,
                ctx.config.sync.suggest_threshold,
            ),
        }
    }

    /// Runs discovery over every API-enabled provider of an organization. A
    /// failing provider is reported and does not stop the others.
    #[instrument(skip(self), fields(organization_id = %organization_id))]
    pub async fn discover_organization(&self, organization_id: Uuid) -> anyhow::Result<DiscoveryReport> {
        let now = Utc::now();
        let mut report = DiscoveryReport::default();

        let candidates = self
            .catalog
            .list_schedulable_shows_for_organization(organization_id)
            .await?;

        for provider in self
            .providers
            .list_active_for_organization(organization_id)
            .await?
        {
            if !provider.is_api_enabled() || !provider.credentials_valid {
                continue;
            }
            if provider.is_rate_limited_at(now) {
                debug!(provider_id = %provider.id, "Skipping rate-limited provider");
                continue;
            }

            report.providers_scanned += 1;
            if let Err(message) = self.scan_provider(&provider, &candidates, &mut report).await {
                warn!(provider_id = %provider.id, error = %message, "Discovery failed for provider");
                report.errors.push(format!("{}: {}", provider.name, message));
            }
        }

        info!(
            providers = report.providers_scanned,
            events = report.events_seen,
            matched = report.matched,
            suggested = report.suggested,
            unmatched = report.unmatched,
            errors = report.errors.len(),
            "Discovery finished"
        );
        Ok(report)
    }

    async fn scan_provider(
        &self,
        provider: &ProviderModel,
        candidates: &[(ShowModel, ProductionModel)],
        report: &mut DiscoveryReport,
    ) -> Result<(), String> {
        let adapter = self.registry.resolve(provider).map_err(|e| e.to_string())?;
        let events = match adapter.list_events().await {
            Ok(events) => events,
            Err(err) => {
                self.health.record_failure(provider, &err).await;
                return Err(err.to_string());
            }
        };

        for event in events {
            report.events_seen += 1;
            if let Err(err) = self.consider(provider, &event, candidates, report).await {
                warn!(
                    provider_id = %provider.id,
                    external_event_id = %event.external_event_id,
                    error = %err,
                    "Failed to record discovered event"
                );
                report
                    .errors
                    .push(format!("{} event {}: {}", provider.name, event.external_event_id, err));
            }
        }
        Ok(())
    }

    async fn consider(
        &self,
        provider: &ProviderModel,
        event: &DiscoveredEvent,
        candidates: &[(ShowModel, ProductionModel)],
        report: &mut DiscoveryReport,
    ) -> anyhow::Result<()> {
        let row = self
            .provider_events
            .upsert_seen(provider.id, provider.organization_id, event)
            .await?;
        if row.match_status.is_settled() {
            return Ok(());
        }

        if let Some(existing) = self
            .remote_events
            .find_by_external_id(provider.id, &event.external_event_id)
            .await?
        {
            self.provider_events
                .set_match(
                    row.id,
                    MatchUpdate {
                        status: MatchStatus::Matched,
                        confidence: 1.0,
                        reasons: vec!["already linked to a show".to_string()],
                        matched_show_id: Some(existing.show_id),
                        suggested_show_id: None,
                    },
                )
                .await?;
            report.matched += 1;
            return Ok(());
        }

        let facts = EventFacts {
            title: &event.title,
            starts_at: event.starts_at,
            venue_name: event.venue_name.as_deref(),
        };
        let best = self
            .scorer
            .best_match(&facts, candidates.iter().map(|(s, p)| (s, p)));

        let Some(best) = best else {
            self.record_unmatched(&row, 0.0, Vec::new(), report).await?;
            return Ok(());
        };

        match self.scorer.decide(best.confidence) {
            MatchDecision::AutoLink => {
                let Some((show, _)) = candidates.iter().find(|(s, _)| s.id == best.show_id) else {
                    return Ok(());
                };
                self.auto_link(provider, event, &row, show, best, report).await
            }
            MatchDecision::Suggest => self.record_suggestion(&row, best, report).await,
            MatchDecision::NoMatch => {
                self.record_unmatched(&row, best.confidence, best.reasons, report)
                    .await
            }
        }
    }

    async fn auto_link(
        &self,
        provider: &ProviderModel,
        event: &DiscoveredEvent,
        row: &ProviderEventModel,
        show: &ShowModel,
        mut score: MatchScore,
        report: &mut DiscoveryReport,
    ) -> anyhow::Result<()> {
        if self
            .remote_events
            .find_active_for_show(provider.id, show.id)
            .await?
            .is_some()
        {
            score
                .reasons
                .push("show already has a listing on this provider".to_string());
            return self.record_suggestion(row, score, report).await;
        }

        let key = RemoteEventKey {
            provider_id: provider.id,
            show_id: show.id,
            production_id: show.production_id,
            setup_id: None,
        };
        let listing = ExistingListing {
            external_event_id: event.external_event_id.clone(),
            external_url: event.url.clone(),
            remote_status: event.status.clone(),
            raw_data: Some(event.raw.clone()),
        };
        let remote_event = match self.remote_events.insert_synced(key, listing).await {
            Ok(remote_event) => remote_event,
            Err(err) if is_unique_violation_anyhow(&err) => {
                score
                    .reasons
                    .push("show already has a listing on this provider".to_string());
                return self.record_suggestion(row, score, report).await;
            }
            Err(err) => return Err(err),
        };

        self.provider_events
            .set_match(
                row.id,
                MatchUpdate {
                    status: MatchStatus::Matched,
                    confidence: score.confidence,
                    reasons: score.reasons,
                    matched_show_id: Some(show.id),
                    suggested_show_id: None,
                },
            )
            .await?;
        counter!("ticketing_discovery_matches_total", "status" => "matched").increment(1);
        report.matched += 1;

        self.activity
            .record(
                NewActivity::new(
                    show.production_id,
                    ActivityKind::EventMatched,
                    format!(
                        "Linked \"{}\" on {} ({:.0}% confidence)",
                        event.title,
                        provider.name,
                        score.confidence * 100.0
                    ),
                )
                .provider(provider.id)
                .show(show.id)
                .remote_event(remote_event.id)
                .metadata(json!({
                    "external_event_id": event.external_event_id,
                    "confidence": score.confidence,
                })),
            )
            .await;
        Ok(())
    }

    async fn record_suggestion(
        &self,
        row: &ProviderEventModel,
        score: MatchScore,
        report: &mut DiscoveryReport,
    ) -> anyhow::Result<()> {
        self.provider_events
            .set_match(
                row.id,
                MatchUpdate {
                    status: MatchStatus::Suggested,
                    confidence: score.confidence,
                    reasons: score.reasons,
                    matched_show_id: None,
                    suggested_show_id: Some(score.show_id),
                },
            )
            .await?;
        counter!("ticketing_discovery_matches_total", "status" => "suggested").increment(1);
        report.suggested += 1;
        Ok(())
    }

    async fn record_unmatched(
        &self,
        row: &ProviderEventModel,
        confidence: f64,
        reasons: Vec<String>,
        report: &mut DiscoveryReport,
    ) -> anyhow::Result<()> {
        self.provider_events
            .set_match(
                row.id,
                MatchUpdate {
                    status: MatchStatus::Unmatched,
                    confidence,
                    reasons,
                    matched_show_id: None,
                    suggested_show_id: None,
                },
            )
            .await?;
        counter!("ticketing_discovery_matches_total", "status" => "unmatched").increment(1);
        report.unmatched += 1;
        Ok(())
    }
}
