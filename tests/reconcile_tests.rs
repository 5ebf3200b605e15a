//! Integration tests for reconciliation passes and deferral

use chrono::{Duration, Utc};
use serde_json::json;
use ticketing_sync::adapters::{AdapterError, SalesSnapshot};
use ticketing_sync::error::is_unique_violation_anyhow;
use ticketing_sync::models::activity::ActivityKind;
use ticketing_sync::models::remote_event::{Model as RemoteEventModel, SyncStatus};
use ticketing_sync::models::show_rule::RuleType;
use ticketing_sync::models::ticketing_provider::ProviderType;
use ticketing_sync::models::ticketing_setup::{GroupingStrategy, ListingMode};
use ticketing_sync::reconciler::{PassOutcome, Reconciler, SyncTrigger};
use ticketing_sync::repositories::{ActivityRepository, NewProvider, NewSetup, RemoteEventKey};
use ticketing_sync::scheduler::TaskScheduler;
use ticketing_sync::webhook_processor::WebhookQueue;
use uuid::Uuid;

#[path = "test_utils/mod.rs"]
mod test_utils;

use test_utils::{
    Fixture, Op, TestEngine, cancel_show, create_production, create_provider, create_show,
    seed_fixture, test_config,
};

async fn listings(engine: &TestEngine, fixture: &Fixture) -> Vec<RemoteEventModel> {
    engine
        .ctx
        .remote_events()
        .list_for_setup(fixture.setup.id)
        .await
        .unwrap()
}

async fn listing_for(engine: &TestEngine, fixture: &Fixture, show_id: Uuid) -> RemoteEventModel {
    listings(engine, fixture)
        .await
        .into_iter()
        .find(|event| event.show_id == show_id && event.sync_status != SyncStatus::Deleted)
        .unwrap()
}

async fn manual_pass(
    reconciler: &Reconciler,
    fixture: &Fixture,
) -> ticketing_sync::reconciler::ReconcileReport {
    reconciler
        .reconcile(fixture.setup.id, fixture.provider.id, SyncTrigger::Manual)
        .await
        .unwrap()
}

/// Retitles one show through an override rule so its content hash changes.
async fn retitle(engine: &TestEngine, fixture: &Fixture, show_id: Uuid, title: &str) {
    engine
        .ctx
        .setups()
        .add_show_rule(
            fixture.setup.id,
            show_id,
            RuleType::Override,
            None,
            Some(json!({ "title": title })),
        )
        .await
        .unwrap();
}

async fn exclude(engine: &TestEngine, setup_id: Uuid, show_id: Uuid, providers: Option<Vec<Uuid>>) {
    engine
        .ctx
        .setups()
        .add_show_rule(setup_id, show_id, RuleType::Exclude, providers, None)
        .await
        .unwrap();
}

#[tokio::test]
async fn second_manual_pass_is_a_no_op() {
    let engine = TestEngine::new().await.unwrap();
    let fixture = seed_fixture(&engine.ctx, 2).await.unwrap();
    let reconciler = Reconciler::new(&engine.ctx);

    let first = reconciler
        .reconcile(fixture.setup.id, fixture.provider.id, SyncTrigger::Manual)
        .await
        .unwrap();
    assert_eq!(first.outcome, PassOutcome::Completed);
    assert_eq!(first.created, 2);
    assert_eq!(engine.adapter.calls(Op::Create), 2);

    let calls_after_first = engine.adapter.total_calls();
    let second = reconciler
        .reconcile(fixture.setup.id, fixture.provider.id, SyncTrigger::Manual)
        .await
        .unwrap();

    assert_eq!(second.outcome, PassOutcome::Completed);
    assert_eq!(second.operations(), 0);
    assert_eq!(second.synced, 0);
    assert_eq!(engine.adapter.total_calls(), calls_after_first);

    let events = engine
        .ctx
        .remote_events()
        .list_for_setup(fixture.setup.id)
        .await
        .unwrap();
    assert_eq!(events.len(), 2);
    assert!(events.iter().all(|e| e.sync_status == SyncStatus::Synced));
    assert!(events.iter().all(|e| e.external_event_id.is_some()));
}

#[tokio::test]
async fn periodic_pass_respects_the_rerun_guard() {
    let engine = TestEngine::new().await.unwrap();
    let fixture = seed_fixture(&engine.ctx, 1).await.unwrap();
    let reconciler = Reconciler::new(&engine.ctx);

    reconciler
        .reconcile(fixture.setup.id, fixture.provider.id, SyncTrigger::Manual)
        .await
        .unwrap();

    let report = reconciler
        .reconcile(fixture.setup.id, fixture.provider.id, SyncTrigger::Periodic)
        .await
        .unwrap();
    assert!(matches!(report.outcome, PassOutcome::Skipped { .. }));
    assert_eq!(engine.adapter.calls(Op::Create), 1);
}

#[tokio::test]
async fn rate_limit_abandons_pass_and_schedules_deferral() {
    let engine = TestEngine::new().await.unwrap();
    let fixture = seed_fixture(&engine.ctx, 3).await.unwrap();
    let reconciler = Reconciler::new(&engine.ctx);

    let resets_at = Utc::now() + Duration::minutes(10);
    engine
        .adapter
        .script_creates(vec![None, Some(AdapterError::RateLimit { resets_at })]);

    let report = reconciler
        .reconcile(fixture.setup.id, fixture.provider.id, SyncTrigger::Manual)
        .await
        .unwrap();

    assert_eq!(report.created, 1);
    assert_eq!(engine.adapter.calls(Op::Create), 2);
    assert_eq!(engine.adapter.total_calls(), 2);
    let PassOutcome::RateLimited { retry_at } = report.outcome else {
        panic!("expected rate limited outcome, got {:?}", report.outcome);
    };
    let grace = engine.ctx.config.sync.rate_limit_grace_seconds as i64;
    assert!(retry_at.timestamp() >= (resets_at + Duration::seconds(grace)).timestamp());

    let pending = engine.ctx.tasks().list_pending().await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].setup_id, fixture.setup.id);
    assert_eq!(pending[0].provider_id, fixture.provider.id);

    // The rejected create left nothing behind.
    let live = engine
        .ctx
        .remote_events()
        .list_active_for_provider_production(fixture.provider.id, fixture.production.id)
        .await
        .unwrap();
    assert_eq!(live.len(), 1);

    let provider = engine
        .ctx
        .providers()
        .get_by_id(fixture.provider.id)
        .await
        .unwrap()
        .unwrap();
    assert!(provider.is_rate_limited_at(Utc::now()));

    // Still inside the window: no adapter calls at all.
    let again = reconciler
        .reconcile(fixture.setup.id, fixture.provider.id, SyncTrigger::Manual)
        .await
        .unwrap();
    assert!(matches!(again.outcome, PassOutcome::RateLimited { .. }));
    assert_eq!(engine.adapter.total_calls(), 2);
    assert_eq!(engine.ctx.tasks().list_pending().await.unwrap().len(), 1);
}

#[tokio::test]
async fn deferred_task_resumes_the_remaining_operations() {
    let engine = TestEngine::new().await.unwrap();
    let fixture = seed_fixture(&engine.ctx, 3).await.unwrap();
    let reconciler = Reconciler::new(&engine.ctx);

    // Window already closed, so the deferred pass is due one grace period later.
    let resets_at = Utc::now() - Duration::minutes(5);
    engine
        .adapter
        .script_creates(vec![None, Some(AdapterError::RateLimit { resets_at })]);

    let report = reconciler
        .reconcile(fixture.setup.id, fixture.provider.id, SyncTrigger::Manual)
        .await
        .unwrap();
    assert!(matches!(report.outcome, PassOutcome::RateLimited { .. }));

    let (queue, _rx) = WebhookQueue::channel();
    let scheduler = TaskScheduler::new(&engine.ctx, reconciler, queue);
    let stats = scheduler.tick(Utc::now()).await.unwrap();
    assert_eq!(stats.tasks_claimed, 1);
    assert_eq!(stats.tasks_failed, 0);

    assert_eq!(engine.adapter.calls(Op::Create), 4);
    let live = engine
        .ctx
        .remote_events()
        .list_active_for_provider_production(fixture.provider.id, fixture.production.id)
        .await
        .unwrap();
    assert_eq!(live.len(), 3);
    assert!(engine.ctx.tasks().list_pending().await.unwrap().is_empty());
}

#[tokio::test]
async fn authentication_failure_stops_the_pass() {
    let engine = TestEngine::new().await.unwrap();
    let fixture = seed_fixture(&engine.ctx, 2).await.unwrap();
    let reconciler = Reconciler::new(&engine.ctx);

    engine
        .adapter
        .script_creates(vec![Some(AdapterError::authentication("token revoked"))]);

    let report = reconciler
        .reconcile(fixture.setup.id, fixture.provider.id, SyncTrigger::Manual)
        .await
        .unwrap();
    assert_eq!(report.outcome, PassOutcome::AuthFailed);
    assert_eq!(engine.adapter.calls(Op::Create), 1);

    let provider = engine
        .ctx
        .providers()
        .get_by_id(fixture.provider.id)
        .await
        .unwrap()
        .unwrap();
    assert!(!provider.credentials_valid);

    let next = reconciler
        .reconcile(fixture.setup.id, fixture.provider.id, SyncTrigger::Manual)
        .await
        .unwrap();
    assert!(matches!(next.outcome, PassOutcome::Skipped { .. }));
    assert_eq!(engine.adapter.calls(Op::Create), 1);
}

#[tokio::test]
async fn one_live_remote_event_per_provider_and_show() {
    let engine = TestEngine::new().await.unwrap();
    let fixture = seed_fixture(&engine.ctx, 1).await.unwrap();
    let remote_events = engine.ctx.remote_events();
    let key = RemoteEventKey {
        provider_id: fixture.provider.id,
        show_id: fixture.shows[0].id,
        production_id: fixture.production.id,
        setup_id: Some(fixture.setup.id),
    };

    let first = remote_events.insert_pending_create(key, None).await.unwrap();
    let err = remote_events
        .insert_pending_create(key, None)
        .await
        .expect_err("second live row must be rejected");
    assert!(is_unique_violation_anyhow(&err));

    // Once the first row is deleted the show can be listed again.
    let errored = remote_events
        .set_status(&first, SyncStatus::Error, Some("withdrawn".to_string()))
        .await
        .unwrap();
    remote_events
        .set_status(&errored, SyncStatus::Deleted, None)
        .await
        .unwrap();
    remote_events.insert_pending_create(key, None).await.unwrap();
}

#[tokio::test]
async fn forbidden_status_transitions_are_rejected() {
    let engine = TestEngine::new().await.unwrap();
    let fixture = seed_fixture(&engine.ctx, 1).await.unwrap();
    let remote_events = engine.ctx.remote_events();

    let row = remote_events
        .insert_pending_create(
            RemoteEventKey {
                provider_id: fixture.provider.id,
                show_id: fixture.shows[0].id,
                production_id: fixture.production.id,
                setup_id: Some(fixture.setup.id),
            },
            None,
        )
        .await
        .unwrap();

    assert!(
        remote_events
            .set_status(&row, SyncStatus::Deleted, None)
            .await
            .is_err()
    );
}

#[tokio::test]
async fn excluded_show_is_removed_from_the_provider() {
    let engine = TestEngine::new().await.unwrap();
    let fixture = seed_fixture(&engine.ctx, 2).await.unwrap();
    let reconciler = Reconciler::new(&engine.ctx);
    manual_pass(&reconciler, &fixture).await;

    let dropped = listing_for(&engine, &fixture, fixture.shows[0].id).await;
    exclude(&engine, fixture.setup.id, fixture.shows[0].id, None).await;

    let report = manual_pass(&reconciler, &fixture).await;
    assert_eq!(report.outcome, PassOutcome::Completed);
    assert_eq!(report.deleted, 1);
    assert!(report.errors.is_empty());
    assert_eq!(engine.adapter.deleted_ids(), vec![dropped.external_event_id.clone().unwrap()]);

    let row = engine
        .ctx
        .remote_events()
        .get_by_id(dropped.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.sync_status, SyncStatus::Deleted);
    let kept = listing_for(&engine, &fixture, fixture.shows[1].id).await;
    assert_eq!(kept.sync_status, SyncStatus::Synced);
}

#[tokio::test]
async fn cancelled_show_is_removed_from_the_provider() {
    let engine = TestEngine::new().await.unwrap();
    let fixture = seed_fixture(&engine.ctx, 1).await.unwrap();
    let reconciler = Reconciler::new(&engine.ctx);
    manual_pass(&reconciler, &fixture).await;

    cancel_show(engine.db(), fixture.shows[0].id).await.unwrap();

    let report = manual_pass(&reconciler, &fixture).await;
    assert_eq!(report.deleted, 1);
    assert_eq!(engine.adapter.calls(Op::Delete), 1);
    let events = listings(&engine, &fixture).await;
    assert!(events.iter().all(|e| e.sync_status == SyncStatus::Deleted));
}

#[tokio::test]
async fn content_change_is_pushed_as_an_update() {
    let engine = TestEngine::new().await.unwrap();
    let fixture = seed_fixture(&engine.ctx, 2).await.unwrap();
    let reconciler = Reconciler::new(&engine.ctx);
    manual_pass(&reconciler, &fixture).await;
    let before = listing_for(&engine, &fixture, fixture.shows[0].id).await;

    retitle(&engine, &fixture, fixture.shows[0].id, "Hamlet: Student Matinee").await;

    let report = manual_pass(&reconciler, &fixture).await;
    assert_eq!(report.updated, 1);
    assert_eq!(report.created, 0);
    assert_eq!(engine.adapter.updated_ids(), vec![before.external_event_id.clone().unwrap()]);
    let sent = engine.adapter.payloads();
    assert_eq!(sent.last().unwrap().title, "Hamlet: Student Matinee");

    let after = listing_for(&engine, &fixture, fixture.shows[0].id).await;
    assert_eq!(after.sync_status, SyncStatus::Synced);
    assert_ne!(after.content_hash, before.content_hash);

    let again = manual_pass(&reconciler, &fixture).await;
    assert_eq!(again.operations(), 0);
    assert_eq!(engine.adapter.calls(Op::Update), 1);
}

#[tokio::test]
async fn rejected_create_marks_one_row_and_the_rest_proceed() {
    let engine = TestEngine::new().await.unwrap();
    let fixture = seed_fixture(&engine.ctx, 3).await.unwrap();
    let reconciler = Reconciler::new(&engine.ctx);

    engine
        .adapter
        .script_creates(vec![None, Some(AdapterError::validation("start date in the past")), None]);

    let report = manual_pass(&reconciler, &fixture).await;
    assert_eq!(report.outcome, PassOutcome::Completed);
    assert_eq!(report.created, 2);
    assert_eq!(report.errors.len(), 1);
    assert!(report.errors[0].contains("start date in the past"));

    let events = listings(&engine, &fixture).await;
    let failed: Vec<_> = events
        .iter()
        .filter(|e| e.sync_status == SyncStatus::Error)
        .collect();
    assert_eq!(failed.len(), 1);
    assert!(failed[0].external_event_id.is_none());
    assert!(failed[0].last_sync_error.as_deref().unwrap().contains("start date in the past"));
    assert_eq!(
        events.iter().filter(|e| e.sync_status == SyncStatus::Synced).count(),
        2
    );

    // Credentials and the provider are untouched by a validation failure.
    let provider = engine
        .ctx
        .providers()
        .get_by_id(fixture.provider.id)
        .await
        .unwrap()
        .unwrap();
    assert!(provider.credentials_valid);

    let retry = manual_pass(&reconciler, &fixture).await;
    assert_eq!(retry.created, 1);
    assert!(
        listings(&engine, &fixture)
            .await
            .iter()
            .all(|e| e.sync_status == SyncStatus::Synced)
    );
}

#[tokio::test]
async fn listing_interrupted_mid_update_can_still_be_unlisted() {
    let engine = TestEngine::new().await.unwrap();
    let fixture = seed_fixture(&engine.ctx, 1).await.unwrap();
    let reconciler = Reconciler::new(&engine.ctx);
    manual_pass(&reconciler, &fixture).await;

    // Window already over, so later passes are not deferred.
    retitle(&engine, &fixture, fixture.shows[0].id, "Hamlet (revised)").await;
    engine.adapter.script_updates(vec![Some(AdapterError::RateLimit {
        resets_at: Utc::now() - Duration::minutes(1),
    })]);
    let halted = manual_pass(&reconciler, &fixture).await;
    assert!(matches!(halted.outcome, PassOutcome::RateLimited { .. }));
    let stuck = listing_for(&engine, &fixture, fixture.shows[0].id).await;
    assert_eq!(stuck.sync_status, SyncStatus::PendingUpdate);

    exclude(&engine, fixture.setup.id, fixture.shows[0].id, None).await;
    let report = manual_pass(&reconciler, &fixture).await;

    assert_eq!(report.outcome, PassOutcome::Completed);
    assert_eq!(report.deleted, 1);
    assert_eq!(engine.adapter.deleted_ids(), vec![stuck.external_event_id.clone().unwrap()]);
    let row = engine
        .ctx
        .remote_events()
        .get_by_id(stuck.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.sync_status, SyncStatus::Deleted);
}

#[tokio::test]
async fn failed_update_is_retried_on_the_next_pass() {
    let engine = TestEngine::new().await.unwrap();
    let fixture = seed_fixture(&engine.ctx, 1).await.unwrap();
    let reconciler = Reconciler::new(&engine.ctx);
    manual_pass(&reconciler, &fixture).await;

    retitle(&engine, &fixture, fixture.shows[0].id, "Hamlet (revised)").await;
    engine
        .adapter
        .script_updates(vec![Some(AdapterError::transport("502 Bad Gateway"))]);

    let failed = manual_pass(&reconciler, &fixture).await;
    assert_eq!(failed.updated, 0);
    assert_eq!(failed.errors.len(), 1);
    let errored = listing_for(&engine, &fixture, fixture.shows[0].id).await;
    assert_eq!(errored.sync_status, SyncStatus::Error);

    let retried = manual_pass(&reconciler, &fixture).await;
    assert_eq!(retried.updated, 1);
    assert!(retried.errors.is_empty());
    assert_eq!(engine.adapter.calls(Op::Update), 2);

    let row = listing_for(&engine, &fixture, fixture.shows[0].id).await;
    assert_eq!(row.id, errored.id);
    assert_eq!(row.sync_status, SyncStatus::Synced);
    assert!(row.last_sync_error.is_none());
}

#[tokio::test]
async fn errored_listing_without_changes_returns_to_synced_and_pulls_sales() {
    let mut config = test_config();
    config.sync.sales_freshness_seconds = 0;
    let engine = TestEngine::with_config(config).await.unwrap();
    let fixture = seed_fixture(&engine.ctx, 1).await.unwrap();
    let reconciler = Reconciler::new(&engine.ctx);
    manual_pass(&reconciler, &fixture).await;

    let remote_events = engine.ctx.remote_events();
    let row = listing_for(&engine, &fixture, fixture.shows[0].id).await;
    let row = remote_events
        .set_status(&row, SyncStatus::PendingUpdate, None)
        .await
        .unwrap();
    remote_events
        .set_status(&row, SyncStatus::Error, Some("502 Bad Gateway".to_string()))
        .await
        .unwrap();

    engine.adapter.set_sales(SalesSnapshot {
        tickets_sold: 7,
        tickets_available: Some(113),
        capacity: Some(120),
        revenue_cents: 17_500,
        remote_status: Some("live".to_string()),
    });

    let report = manual_pass(&reconciler, &fixture).await;
    assert_eq!(report.outcome, PassOutcome::Completed);
    assert_eq!(report.updated, 0);
    assert_eq!(report.synced, 1);
    assert_eq!(engine.adapter.calls(Op::Update), 0);
    assert_eq!(engine.adapter.calls(Op::Sales), 1);

    let recovered = listing_for(&engine, &fixture, fixture.shows[0].id).await;
    assert_eq!(recovered.sync_status, SyncStatus::Synced);
    assert!(recovered.last_sync_error.is_none());
    assert_eq!(recovered.tickets_sold, 7);
}

#[tokio::test]
async fn rate_limited_provider_is_not_repicked_by_every_tick() {
    let engine = TestEngine::new().await.unwrap();
    let fixture = seed_fixture(&engine.ctx, 1).await.unwrap();
    let reconciler = Reconciler::new(&engine.ctx);

    let start = Utc::now();
    engine
        .ctx
        .providers()
        .set_rate_limited_until(fixture.provider.id, start + Duration::minutes(10), Some(0))
        .await
        .unwrap();

    let (queue, _rx) = WebhookQueue::channel();
    let scheduler = TaskScheduler::new(&engine.ctx, reconciler.clone(), queue);
    for tick in 0..5 {
        let stats = scheduler
            .tick(start + Duration::seconds(30 * tick))
            .await
            .unwrap();
        assert_eq!(stats.periodic_started, 0);
        assert_eq!(stats.tasks_claimed, 0);
    }

    // Repeated manual attempts inside the same window share one deferral.
    for _ in 0..3 {
        let report = manual_pass(&reconciler, &fixture).await;
        assert!(matches!(report.outcome, PassOutcome::RateLimited { .. }));
    }

    let rate_limited = ActivityRepository::new(engine.ctx.db.clone())
        .list_for_production(fixture.production.id)
        .await
        .unwrap()
        .into_iter()
        .filter(|entry| entry.kind == ActivityKind::RateLimited)
        .count();
    assert_eq!(rate_limited, 1);
    assert_eq!(engine.ctx.tasks().list_pending().await.unwrap().len(), 1);
    assert_eq!(engine.adapter.total_calls(), 0);
}

#[tokio::test]
async fn provider_scoped_rules_only_affect_their_provider() {
    let engine = TestEngine::new().await.unwrap();
    let fixture = seed_fixture(&engine.ctx, 2).await.unwrap();
    let second = create_provider(&engine.ctx, fixture.organization.id).await.unwrap();
    let setups = engine.ctx.setups();
    setups
        .add_provider_setup(fixture.setup.id, second.id, None)
        .await
        .unwrap();

    exclude(&engine, fixture.setup.id, fixture.shows[0].id, Some(vec![second.id])).await;

    let reports = Reconciler::new(&engine.ctx)
        .reconcile_setup(fixture.setup.id, SyncTrigger::Manual)
        .await
        .unwrap();
    assert_eq!(reports.len(), 2);

    let remote_events = engine.ctx.remote_events();
    let first_listed: Vec<Uuid> = remote_events
        .list_active_for_provider_production(fixture.provider.id, fixture.production.id)
        .await
        .unwrap()
        .iter()
        .map(|e| e.show_id)
        .collect();
    let second_listed: Vec<Uuid> = remote_events
        .list_active_for_provider_production(second.id, fixture.production.id)
        .await
        .unwrap()
        .iter()
        .map(|e| e.show_id)
        .collect();
    assert_eq!(first_listed.len(), 2);
    assert_eq!(second_listed, vec![fixture.shows[1].id]);
}

#[tokio::test]
async fn provider_scoped_include_selects_shows_per_provider() {
    let engine = TestEngine::new().await.unwrap();
    let fixture = seed_fixture(&engine.ctx, 1).await.unwrap();
    let db = engine.db();
    let production = create_production(db, fixture.organization.id, "Macbeth")
        .await
        .unwrap();
    let mut shows = Vec::new();
    for day in 0..2 {
        let starts_at = Utc::now() + Duration::days(3 + day);
        shows.push(create_show(db, production.id, starts_at, None).await.unwrap());
    }
    let second = create_provider(&engine.ctx, fixture.organization.id).await.unwrap();

    let setups = engine.ctx.setups();
    let setup = setups
        .create(NewSetup {
            listing_mode: ListingMode::Selected,
            ..NewSetup::active(production.id)
        })
        .await
        .unwrap();
    setups
        .add_provider_setup(setup.id, fixture.provider.id, None)
        .await
        .unwrap();
    setups.add_provider_setup(setup.id, second.id, None).await.unwrap();
    setups
        .add_show_rule(setup.id, shows[0].id, RuleType::Include, None, None)
        .await
        .unwrap();
    setups
        .add_show_rule(setup.id, shows[1].id, RuleType::Include, Some(vec![second.id]), None)
        .await
        .unwrap();

    Reconciler::new(&engine.ctx)
        .reconcile_setup(setup.id, SyncTrigger::Manual)
        .await
        .unwrap();

    let remote_events = engine.ctx.remote_events();
    let mut first_listed: Vec<Uuid> = remote_events
        .list_active_for_provider_production(fixture.provider.id, production.id)
        .await
        .unwrap()
        .iter()
        .map(|e| e.show_id)
        .collect();
    let mut second_listed: Vec<Uuid> = remote_events
        .list_active_for_provider_production(second.id, production.id)
        .await
        .unwrap()
        .iter()
        .map(|e| e.show_id)
        .collect();
    first_listed.sort();
    second_listed.sort();
    let mut both = vec![shows[0].id, shows[1].id];
    both.sort();

    assert_eq!(first_listed, vec![shows[0].id]);
    assert_eq!(second_listed, both);
}

#[tokio::test]
async fn unlisting_the_series_parent_repoints_the_series() {
    let engine = TestEngine::new().await.unwrap();
    let fixture = seed_fixture(&engine.ctx, 1).await.unwrap();
    let db = engine.db();
    let production = create_production(db, fixture.organization.id, "Twelfth Night")
        .await
        .unwrap();
    for day in 0..3 {
        let starts_at = Utc::now() + Duration::days(5 + day);
        create_show(db, production.id, starts_at, Some("Globe Theatre"))
            .await
            .unwrap();
    }

    let setups = engine.ctx.setups();
    let setup = setups
        .create(NewSetup {
            grouping_strategy: GroupingStrategy::SingleEventMultipleOccurrences,
            ..NewSetup::active(production.id)
        })
        .await
        .unwrap();
    setups
        .add_provider_setup(setup.id, fixture.provider.id, None)
        .await
        .unwrap();
    let reconciler = Reconciler::new(&engine.ctx);
    let pass = || reconciler.reconcile(setup.id, fixture.provider.id, SyncTrigger::Manual);

    let created = pass().await.unwrap();
    assert_eq!(created.created, 3);
    let series = setups
        .get_provider_setup(setup.id, fixture.provider.id)
        .await
        .unwrap()
        .unwrap()
        .series_external_id
        .unwrap();
    let parent_row = engine
        .ctx
        .remote_events()
        .find_by_external_id(fixture.provider.id, &series)
        .await
        .unwrap()
        .unwrap();

    exclude(&engine, setup.id, parent_row.show_id, None).await;
    let report = pass().await.unwrap();
    assert_eq!(report.deleted, 1);
    assert_eq!(engine.adapter.deleted_ids(), vec![series.clone()]);

    let successor = setups
        .get_provider_setup(setup.id, fixture.provider.id)
        .await
        .unwrap()
        .unwrap()
        .series_external_id
        .expect("a remaining listing becomes the series parent");
    assert_ne!(successor, series);

    // The survivors are re-sent against the new parent.
    assert_eq!(report.updated, 2);
    let updates = engine.adapter.payloads();
    let updates = &updates[updates.len() - 2..];
    assert!(
        updates
            .iter()
            .all(|p| p.parent_external_id.as_deref() != Some(series.as_str()))
    );
    assert!(
        updates
            .iter()
            .any(|p| p.parent_external_id.as_deref() == Some(successor.as_str()))
    );

    for event in engine.ctx.remote_events().list_for_setup(setup.id).await.unwrap() {
        if event.sync_status != SyncStatus::Deleted {
            exclude(&engine, setup.id, event.show_id, None).await;
        }
    }
    let emptied = pass().await.unwrap();
    assert_eq!(emptied.deleted, 2);
    let cleared = setups
        .get_provider_setup(setup.id, fixture.provider.id)
        .await
        .unwrap()
        .unwrap();
    assert!(cleared.series_external_id.is_none());
}

#[tokio::test]
async fn manual_only_provider_is_reconciled_without_api_calls() {
    let engine = TestEngine::new().await.unwrap();
    let fixture = seed_fixture(&engine.ctx, 1).await.unwrap();
    let manual = engine
        .ctx
        .providers()
        .create(
            NewProvider {
                organization_id: fixture.organization.id,
                provider_type: ProviderType::Eventbrite,
                name: "Box office".to_string(),
                credentials: None,
                manual_only: true,
                webhook_enabled: false,
                auto_sync_enabled: true,
            },
            None,
        )
        .await
        .unwrap();
    engine
        .ctx
        .setups()
        .add_provider_setup(fixture.setup.id, manual.id, None)
        .await
        .unwrap();

    let report = Reconciler::new(&engine.ctx)
        .reconcile(fixture.setup.id, manual.id, SyncTrigger::Manual)
        .await
        .unwrap();
    assert_eq!(report.outcome, PassOutcome::Completed);
    assert_eq!(report.created, 1);
    assert_eq!(engine.adapter.total_calls(), 0);

    let rows = engine
        .ctx
        .remote_events()
        .list_active_for_provider_production(manual.id, fixture.production.id)
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert!(rows[0].external_event_id.as_deref().unwrap().starts_with("manual-"));
    assert_eq!(rows[0].remote_status.as_deref(), Some("manual"));
}

#[tokio::test]
async fn failed_delete_is_kept_as_error_and_retried() {
    let engine = TestEngine::new().await.unwrap();
    let fixture = seed_fixture(&engine.ctx, 1).await.unwrap();
    let reconciler = Reconciler::new(&engine.ctx);
    manual_pass(&reconciler, &fixture).await;
    let listed = listing_for(&engine, &fixture, fixture.shows[0].id).await;

    exclude(&engine, fixture.setup.id, fixture.shows[0].id, None).await;
    engine
        .adapter
        .script_deletes(vec![Some(AdapterError::transport("503 Service Unavailable"))]);

    let failed = manual_pass(&reconciler, &fixture).await;
    assert_eq!(failed.deleted, 0);
    assert_eq!(failed.errors.len(), 1);
    let errored = listing_for(&engine, &fixture, fixture.shows[0].id).await;
    assert_eq!(errored.sync_status, SyncStatus::Error);
    assert_eq!(errored.external_event_id, listed.external_event_id);

    let retried = manual_pass(&reconciler, &fixture).await;
    assert_eq!(retried.deleted, 1);
    assert_eq!(engine.adapter.calls(Op::Delete), 2);
    assert_eq!(engine.adapter.deleted_ids(), vec![listed.external_event_id.clone().unwrap()]);
}
