//! Creates the ticketing_provider_events table holding events observed during
//! discovery polling and their match state.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(ProviderEvents::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ProviderEvents::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(ProviderEvents::ProviderId).uuid().not_null())
                    .col(
                        ColumnDef::new(ProviderEvents::OrganizationId)
                            .uuid()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ProviderEvents::ExternalEventId)
                            .text()
                            .not_null(),
                    )
                    .col(ColumnDef::new(ProviderEvents::Title).text().not_null())
                    .col(
                        ColumnDef::new(ProviderEvents::StartsAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(ColumnDef::new(ProviderEvents::VenueName).text().null())
                    .col(ColumnDef::new(ProviderEvents::ExternalUrl).text().null())
                    .col(ColumnDef::new(ProviderEvents::RemoteStatus).text().null())
                    .col(ColumnDef::new(ProviderEvents::RawData).json_binary().null())
                    .col(
                        ColumnDef::new(ProviderEvents::MatchStatus)
                            .text()
                            .not_null()
                            .default("unmatched"),
                    )
                    .col(
                        ColumnDef::new(ProviderEvents::MatchConfidence)
                            .double()
                            .not_null()
                            .default(0.0),
                    )
                    .col(
                        ColumnDef::new(ProviderEvents::MatchReasons)
                            .json_binary()
                            .null(),
                    )
                    .col(ColumnDef::new(ProviderEvents::MatchedShowId).uuid().null())
                    .col(ColumnDef::new(ProviderEvents::SuggestedShowId).uuid().null())
                    .col(
                        ColumnDef::new(ProviderEvents::LastSeenAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(ProviderEvents::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(ProviderEvents::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_ticketing_provider_events_provider_id")
                            .from(ProviderEvents::Table, ProviderEvents::ProviderId)
                            .to(TicketingProviders::Table, TicketingProviders::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_ticketing_provider_events_provider_external")
                    .table(ProviderEvents::Table)
                    .col(ProviderEvents::ProviderId)
                    .col(ProviderEvents::ExternalEventId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_ticketing_provider_events_org_status")
                    .table(ProviderEvents::Table)
                    .col(ProviderEvents::OrganizationId)
                    .col(ProviderEvents::MatchStatus)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(ProviderEvents::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum ProviderEvents {
    #[sea_orm(iden = "ticketing_provider_events")]
    Table,
    Id,
    ProviderId,
    OrganizationId,
    ExternalEventId,
    Title,
    StartsAt,
    VenueName,
    ExternalUrl,
    RemoteStatus,
    RawData,
    MatchStatus,
    MatchConfidence,
    MatchReasons,
    MatchedShowId,
    SuggestedShowId,
    LastSeenAt,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum TicketingProviders {
    Table,
    Id,
}
