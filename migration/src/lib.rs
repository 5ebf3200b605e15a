//! Database migrations for the ticketing sync engine.
//!
//! Collaborator tables (organizations, productions, shows) are created here so the
//! engine can run standalone; the engine itself only reads them.

pub use sea_orm_migration::prelude::*;
use sea_orm_migration::sea_orm::Statement;

mod m2025_01_01_000001_create_catalog;
mod m2025_01_02_000001_create_ticketing_providers;
mod m2025_01_02_000002_create_ticketing_setups;
mod m2025_01_02_000003_create_remote_events;
mod m2025_01_02_000004_create_provider_events;
mod m2025_01_02_000005_create_webhook_logs;
mod m2025_01_02_000006_create_scheduled_tasks;
mod m2025_01_02_000007_create_activities;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m2025_01_01_000001_create_catalog::Migration),
            Box::new(m2025_01_02_000001_create_ticketing_providers::Migration),
            Box::new(m2025_01_02_000002_create_ticketing_setups::Migration),
            Box::new(m2025_01_02_000003_create_remote_events::Migration),
            Box::new(m2025_01_02_000004_create_provider_events::Migration),
            Box::new(m2025_01_02_000005_create_webhook_logs::Migration),
            Box::new(m2025_01_02_000006_create_scheduled_tasks::Migration),
            Box::new(m2025_01_02_000007_create_activities::Migration),
        ]
    }
}

/// Creates a partial unique index. Postgres and SQLite both accept the
/// `CREATE UNIQUE INDEX ... WHERE` form.
pub(crate) async fn create_partial_unique_index(
    manager: &SchemaManager<'_>,
    name: &str,
    table: &str,
    columns: &str,
    predicate: &str,
) -> Result<(), DbErr> {
    let sql = format!(
        "CREATE UNIQUE INDEX IF NOT EXISTS {name} ON {table} ({columns}) WHERE {predicate}"
    );
    manager
        .get_connection()
        .execute(Statement::from_string(manager.get_database_backend(), sql))
        .await
        .map(|_| ())
}

pub(crate) async fn drop_index_if_exists(
    manager: &SchemaManager<'_>,
    name: &str,
) -> Result<(), DbErr> {
    manager
        .get_connection()
        .execute(Statement::from_string(
            manager.get_database_backend(),
            format!("DROP INDEX IF EXISTS {name}"),
        ))
        .await
        .map(|_| ())
}
