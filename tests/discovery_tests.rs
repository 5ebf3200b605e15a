//! Integration tests for discovery and show matching

use chrono::{Duration, Utc};
use serde_json::json;
use ticketing_sync::adapters::{AdapterError, DiscoveredEvent};
use ticketing_sync::discovery::Discovery;
use ticketing_sync::models::provider_event::MatchStatus;

#[path = "test_utils/mod.rs"]
mod test_utils;

use test_utils::{Op, TestEngine, create_show, seed_fixture};

fn discovered(id: &str, title: &str, starts_at: chrono::DateTime<Utc>, venue: Option<&str>) -> DiscoveredEvent {
    DiscoveredEvent {
        external_event_id: id.to_string(),
        title: title.to_string(),
        starts_at: Some(starts_at),
        venue_name: venue.map(str::to_string),
        url: None,
        status: Some("live".to_string()),
        raw: json!({ "id": id }),
    }
}

#[tokio::test]
async fn strong_match_links_and_medium_match_suggests() {
    let engine = TestEngine::new().await.unwrap();
    let fixture = seed_fixture(&engine.ctx, 1).await.unwrap();
    let show = &fixture.shows[0];
    let later = Utc::now() + Duration::days(30);
    let late_show = create_show(engine.db(), fixture.production.id, later, None)
        .await
        .unwrap();

    engine.adapter.set_events(vec![
        discovered(
            "eb-1",
            "Hamlet",
            show.starts_at.with_timezone(&Utc),
            Some("Globe Theatre"),
        ),
        // Same start as the late show, nothing else in common: 0.5.
        discovered("eb-2", "Jazz Night", later, None),
    ]);

    let report = Discovery::new(&engine.ctx)
        .discover_organization(fixture.organization.id)
        .await
        .unwrap();
    assert_eq!(report.providers_scanned, 1);
    assert_eq!(report.events_seen, 2);
    assert_eq!(report.matched, 1);
    assert_eq!(report.suggested, 1);
    assert!(report.errors.is_empty());

    let events = engine
        .ctx
        .provider_events()
        .list_for_organization(fixture.organization.id)
        .await
        .unwrap();
    let linked = events.iter().find(|e| e.external_event_id == "eb-1").unwrap();
    assert_eq!(linked.match_status, MatchStatus::Matched);
    assert_eq!(linked.matched_show_id, Some(show.id));

    let suggested = events.iter().find(|e| e.external_event_id == "eb-2").unwrap();
    assert_eq!(suggested.match_status, MatchStatus::Suggested);
    assert_eq!(suggested.suggested_show_id, Some(late_show.id));
    assert!((suggested.match_confidence - 0.5).abs() < 1e-9);

    let remote_events = engine.ctx.remote_events();
    let listing = remote_events
        .find_by_external_id(fixture.provider.id, "eb-1")
        .await
        .unwrap()
        .expect("auto-link creates a remote event");
    assert_eq!(listing.show_id, show.id);
    assert!(listing.setup_id.is_none());
    assert!(
        remote_events
            .find_by_external_id(fixture.provider.id, "eb-2")
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
async fn rediscovery_leaves_matched_events_alone() {
    let engine = TestEngine::new().await.unwrap();
    let fixture = seed_fixture(&engine.ctx, 1).await.unwrap();
    let show = &fixture.shows[0];
    engine.adapter.set_events(vec![discovered(
        "eb-1",
        "Hamlet",
        show.starts_at.with_timezone(&Utc),
        Some("Globe Theatre"),
    )]);

    let discovery = Discovery::new(&engine.ctx);
    discovery
        .discover_organization(fixture.organization.id)
        .await
        .unwrap();
    let second = discovery
        .discover_organization(fixture.organization.id)
        .await
        .unwrap();

    assert_eq!(second.events_seen, 1);
    assert_eq!(second.matched, 0);
    assert_eq!(second.suggested, 0);
    assert_eq!(
        engine
            .ctx
            .remote_events()
            .list_active_for_provider_production(fixture.provider.id, fixture.production.id)
            .await
            .unwrap()
            .len(),
        1
    );
}

#[tokio::test]
async fn strong_match_for_already_listed_show_becomes_suggestion() {
    let engine = TestEngine::new().await.unwrap();
    let fixture = seed_fixture(&engine.ctx, 1).await.unwrap();
    let show = &fixture.shows[0];

    // The reconciler listed the show first.
    ticketing_sync::reconciler::Reconciler::new(&engine.ctx)
        .reconcile(
            fixture.setup.id,
            fixture.provider.id,
            ticketing_sync::reconciler::SyncTrigger::Manual,
        )
        .await
        .unwrap();

    engine.adapter.set_events(vec![discovered(
        "eb-dup",
        "Hamlet",
        show.starts_at.with_timezone(&Utc),
        Some("Globe Theatre"),
    )]);
    let report = Discovery::new(&engine.ctx)
        .discover_organization(fixture.organization.id)
        .await
        .unwrap();

    assert_eq!(report.matched, 0);
    assert_eq!(report.suggested, 1);
    assert_eq!(
        engine
            .ctx
            .remote_events()
            .list_active_for_provider_production(fixture.provider.id, fixture.production.id)
            .await
            .unwrap()
            .len(),
        1
    );
}

#[tokio::test]
async fn listing_failure_is_reported_per_provider() {
    let engine = TestEngine::new().await.unwrap();
    let fixture = seed_fixture(&engine.ctx, 1).await.unwrap();
    engine
        .adapter
        .fail_listing(AdapterError::transport("connection reset"));

    let report = Discovery::new(&engine.ctx)
        .discover_organization(fixture.organization.id)
        .await
        .unwrap();

    assert_eq!(report.providers_scanned, 1);
    assert_eq!(report.events_seen, 0);
    assert_eq!(report.errors.len(), 1);
    assert!(report.errors[0].contains("connection reset"));
    assert_eq!(engine.adapter.calls(Op::List), 1);
}

#[tokio::test]
async fn rate_limited_providers_are_not_scanned() {
    let engine = TestEngine::new().await.unwrap();
    let fixture = seed_fixture(&engine.ctx, 1).await.unwrap();
    engine
        .ctx
        .providers()
        .set_rate_limited_until(fixture.provider.id, Utc::now() + Duration::minutes(5), Some(0))
        .await
        .unwrap();

    let report = Discovery::new(&engine.ctx)
        .discover_organization(fixture.organization.id)
        .await
        .unwrap();

    assert_eq!(report.providers_scanned, 0);
    assert_eq!(engine.adapter.total_calls(), 0);
}
