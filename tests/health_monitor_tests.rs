//! Integration tests for provider credential health checks

use ticketing_sync::adapters::AdapterError;
use ticketing_sync::health_monitor::{CheckOutcome, HealthMonitor};
use ticketing_sync::models::activity::ActivityKind;
use ticketing_sync::models::ticketing_provider::ProviderType;
use ticketing_sync::reconciler::{Reconciler, SyncTrigger};
use ticketing_sync::repositories::{ActivityRepository, NewProvider};

#[path = "test_utils/mod.rs"]
mod test_utils;

use test_utils::{Op, TestEngine, seed_fixture};

#[tokio::test]
async fn rejected_credentials_expire_sensitive_listings() {
    let engine = TestEngine::new().await.unwrap();
    let fixture = seed_fixture(&engine.ctx, 4).await.unwrap();
    Reconciler::new(&engine.ctx)
        .reconcile(fixture.setup.id, fixture.provider.id, SyncTrigger::Manual)
        .await
        .unwrap();

    let remote_events = engine.ctx.remote_events();
    let rows = remote_events.list_for_setup(fixture.setup.id).await.unwrap();
    assert_eq!(rows.len(), 4);
    let statuses = ["live", "ready", "pending_sync", "draft"];
    for (row, status) in rows.iter().zip(statuses) {
        remote_events.set_remote_status(row.id, status).await.unwrap();
    }

    engine
        .adapter
        .fail_credentials(AdapterError::authentication("token revoked"));
    let report = HealthMonitor::new(&engine.ctx).run_checks().await.unwrap();
    assert_eq!(report.checked, 1);
    assert_eq!(report.failed, 1);

    let provider = engine
        .ctx
        .providers()
        .get_by_id(fixture.provider.id)
        .await
        .unwrap()
        .unwrap();
    assert!(!provider.credentials_valid);
    assert!(provider.credentials_error.unwrap().contains("token revoked"));

    for (row, before) in rows.iter().zip(statuses) {
        let after = remote_events.get_by_id(row.id).await.unwrap().unwrap();
        let expected = if before == "draft" { "draft" } else { "auth_expired" };
        assert_eq!(after.remote_status.as_deref(), Some(expected), "was {before}");
    }

    let expired = ActivityRepository::new(engine.ctx.db.clone())
        .list_for_production(fixture.production.id)
        .await
        .unwrap()
        .into_iter()
        .filter(|entry| entry.kind == ActivityKind::AuthExpired)
        .count();
    assert_eq!(expired, 1);
}

#[tokio::test]
async fn recently_checked_provider_is_skipped_until_cooldown_passes() {
    let engine = TestEngine::new().await.unwrap();
    let fixture = seed_fixture(&engine.ctx, 1).await.unwrap();
    let monitor = HealthMonitor::new(&engine.ctx);

    let first = monitor.run_checks().await.unwrap();
    assert_eq!(first.checked, 1);
    assert_eq!(first.failed, 0);
    assert_eq!(engine.adapter.calls(Op::TestCredentials), 1);

    let second = monitor.run_checks().await.unwrap();
    assert_eq!(second.checked, 0);
    assert_eq!(second.skipped, 1);
    assert_eq!(engine.adapter.calls(Op::TestCredentials), 1);

    // An explicit check ignores the cooldown.
    let result = monitor
        .check_provider(fixture.provider.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(result.outcome, CheckOutcome::Ok);
    assert_eq!(engine.adapter.calls(Op::TestCredentials), 2);
}

#[tokio::test]
async fn manual_only_provider_is_not_applicable() {
    let engine = TestEngine::new().await.unwrap();
    let fixture = seed_fixture(&engine.ctx, 0).await.unwrap();
    let manual = engine
        .ctx
        .providers()
        .create(
            NewProvider {
                organization_id: fixture.organization.id,
                provider_type: ProviderType::Manual,
                name: "Box office".to_string(),
                credentials: None,
                manual_only: true,
                webhook_enabled: false,
                auto_sync_enabled: false,
            },
            None,
        )
        .await
        .unwrap();
    let monitor = HealthMonitor::new(&engine.ctx);

    let report = monitor.run_checks().await.unwrap();
    assert_eq!(report.checked, 1);
    assert_eq!(report.skipped, 1);

    let result = monitor.check_provider(manual.id).await.unwrap().unwrap();
    assert_eq!(result.outcome, CheckOutcome::NotApplicable);
    assert!(!result.webhook.enabled);
}
