//! Creates the ticketing_activities audit table.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Activities::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Activities::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Activities::ProductionId).uuid().not_null())
                    .col(ColumnDef::new(Activities::ProviderId).uuid().null())
                    .col(ColumnDef::new(Activities::ShowId).uuid().null())
                    .col(ColumnDef::new(Activities::RemoteEventId).uuid().null())
                    .col(ColumnDef::new(Activities::Kind).text().not_null())
                    .col(ColumnDef::new(Activities::Message).text().not_null())
                    .col(ColumnDef::new(Activities::Metadata).json_binary().null())
                    .col(
                        ColumnDef::new(Activities::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_ticketing_activities_production_created")
                    .table(Activities::Table)
                    .col(Activities::ProductionId)
                    .col(Activities::CreatedAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Activities::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Activities {
    #[sea_orm(iden = "ticketing_activities")]
    Table,
    Id,
    ProductionId,
    ProviderId,
    ShowId,
    RemoteEventId,
    Kind,
    Message,
    Metadata,
    CreatedAt,
}
