//! Creates the ticketing_scheduled_tasks table: durable deferral records read by
//! the scheduler loop.

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
                    .table(ScheduledTasks::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ScheduledTasks::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(ScheduledTasks::Kind).text().not_null())
                    .col(ColumnDef::new(ScheduledTasks::SetupId).uuid().not_null())
                    .col(ColumnDef::new(ScheduledTasks::ProviderId).uuid().not_null())
                    .col(
                        ColumnDef::new(ScheduledTasks::NotBefore)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ScheduledTasks::Status)
                            .text()
                            .not_null()
                            .default("pending"),
                    )
                    .col(
                        ColumnDef::new(ScheduledTasks::Attempts)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(ScheduledTasks::Reason).text().null())
                    .col(ColumnDef::new(ScheduledTasks::LastError).text().null())
                    .col(
                        ColumnDef::new(ScheduledTasks::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(ScheduledTasks::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        create_partial_unique_index(
            manager,
            "idx_ticketing_scheduled_tasks_one_pending",
            "ticketing_scheduled_tasks",
            "kind, setup_id, provider_id",
            "status = 'pending'",
        )
        .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_ticketing_scheduled_tasks_status_not_before")
                    .table(ScheduledTasks::Table)
                    .col(ScheduledTasks::Status)
                    .col(ScheduledTasks::NotBefore)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        drop_index_if_exists(manager, "idx_ticketing_scheduled_tasks_one_pending").await?;
        manager
            .drop_table(Table::drop().table(ScheduledTasks::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum ScheduledTasks {
    #[sea_orm(iden = "ticketing_scheduled_tasks")]
    Table,
    Id,
    Kind,
    SetupId,
    ProviderId,
    NotBefore,
    Status,
    Attempts,
    Reason,
    LastError,
    CreatedAt,
    UpdatedAt,
}
