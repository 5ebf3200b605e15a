//! Creates the ticketing_remote_events table, the engine's cache of what exists on
//! each provider for each show.

use sea_orm_migration::prelude::*;

use crate::{create_partial_unique_index, drop_index_if_exists};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(RemoteEvents::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(RemoteEvents::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(RemoteEvents::ProviderId).uuid().not_null())
                    .col(ColumnDef::new(RemoteEvents::ShowId).uuid().not_null())
                    .col(ColumnDef::new(RemoteEvents::ProductionId).uuid().not_null())
                    .col(ColumnDef::new(RemoteEvents::SetupId).uuid().null())
                    .col(ColumnDef::new(RemoteEvents::ExternalEventId).text().null())
                    .col(ColumnDef::new(RemoteEvents::ExternalUrl).text().null())
                    .col(ColumnDef::new(RemoteEvents::RemoteStatus).text().null())
                    .col(
                        ColumnDef::new(RemoteEvents::SyncStatus)
                            .text()
                            .not_null()
                            .default("pending_create"),
                    )
                    .col(
                        ColumnDef::new(RemoteEvents::TicketsSold)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(RemoteEvents::TicketsAvailable).integer().null())
                    .col(ColumnDef::new(RemoteEvents::Capacity).integer().null())
                    .col(
                        ColumnDef::new(RemoteEvents::RevenueCents)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(RemoteEvents::RawData).json_binary().null())
                    .col(ColumnDef::new(RemoteEvents::ContentHash).text().null())
                    .col(
                        ColumnDef::new(RemoteEvents::LastSyncedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(ColumnDef::new(RemoteEvents::LastSyncError).text().null())
                    .col(
                        ColumnDef::new(RemoteEvents::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(RemoteEvents::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_ticketing_remote_events_provider_id")
                            .from(RemoteEvents::Table, RemoteEvents::ProviderId)
                            .to(TicketingProviders::Table, TicketingProviders::Id)
                            .on_delete(ForeignKeyAction::Restrict),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_ticketing_remote_events_provider_external")
                    .table(RemoteEvents::Table)
                    .col(RemoteEvents::ProviderId)
                    .col(RemoteEvents::ExternalEventId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // Exactly one live cache row per (provider, show).
        create_partial_unique_index(
            manager,
            "idx_ticketing_remote_events_provider_show_live",
            "ticketing_remote_events",
            "provider_id, show_id",
            "sync_status <> 'deleted'",
        )
        .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_ticketing_remote_events_production")
                    .table(RemoteEvents::Table)
                    .col(RemoteEvents::ProductionId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        drop_index_if_exists(manager, "idx_ticketing_remote_events_provider_show_live").await?;
        manager
            .drop_table(Table::drop().table(RemoteEvents::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum RemoteEvents {
    #[sea_orm(iden = "ticketing_remote_events")]
    Table,
    Id,
    ProviderId,
    ShowId,
    ProductionId,
    SetupId,
    ExternalEventId,
    ExternalUrl,
    RemoteStatus,
    SyncStatus,
    TicketsSold,
    TicketsAvailable,
    Capacity,
    RevenueCents,
    RawData,
    ContentHash,
    LastSyncedAt,
    LastSyncError,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum TicketingProviders {
    Table,
    Id,
}
