//! Creates the ticketing_webhook_logs table. Every inbound webhook call gets a row,
//! including calls rejected by signature verification.

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
                    .table(WebhookLogs::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(WebhookLogs::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(WebhookLogs::ProviderId).uuid().not_null())
                    .col(ColumnDef::new(WebhookLogs::EventType).text().null())
                    .col(ColumnDef::new(WebhookLogs::ExternalId).text().null())
                    .col(ColumnDef::new(WebhookLogs::Payload).text().not_null())
                    .col(ColumnDef::new(WebhookLogs::Headers).json_binary().null())
                    .col(
                        ColumnDef::new(WebhookLogs::SignatureStatus)
                            .text()
                            .not_null()
                            .default("unverified"),
                    )
                    .col(
                        ColumnDef::new(WebhookLogs::Status)
                            .text()
                            .not_null()
                            .default("received"),
                    )
                    .col(ColumnDef::new(WebhookLogs::Error).text().null())
                    .col(
                        ColumnDef::new(WebhookLogs::ProcessedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(WebhookLogs::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(WebhookLogs::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_ticketing_webhook_logs_provider_id")
                            .from(WebhookLogs::Table, WebhookLogs::ProviderId)
                            .to(TicketingProviders::Table, TicketingProviders::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // A delivery can only be applied once per provider.
        create_partial_unique_index(
            manager,
            "idx_ticketing_webhook_logs_processed_once",
            "ticketing_webhook_logs",
            "provider_id, external_id",
            "status = 'processed'",
        )
        .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_ticketing_webhook_logs_status_created")
                    .table(WebhookLogs::Table)
                    .col(WebhookLogs::Status)
                    .col(WebhookLogs::CreatedAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        drop_index_if_exists(manager, "idx_ticketing_webhook_logs_processed_once").await?;
        manager
            .drop_table(Table::drop().table(WebhookLogs::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum WebhookLogs {
    #[sea_orm(iden = "ticketing_webhook_logs")]
    Table,
    Id,
    ProviderId,
    EventType,
    ExternalId,
    Payload,
    Headers,
    SignatureStatus,
    Status,
    Error,
    ProcessedAt,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum TicketingProviders {
    Table,
    Id,
}
