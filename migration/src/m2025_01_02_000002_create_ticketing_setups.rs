//! Creates the declarative setup tables: ticketing_setups, ticketing_provider_setups
//! and ticketing_show_rules.

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
                    .table(TicketingSetups::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(TicketingSetups::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(TicketingSetups::ProductionId).uuid().not_null())
                    .col(
                        ColumnDef::new(TicketingSetups::ListingMode)
                            .text()
                            .not_null()
                            .default("all_shows"),
                    )
                    .col(
                        ColumnDef::new(TicketingSetups::GroupingStrategy)
                            .text()
                            .not_null()
                            .default("event_per_show"),
                    )
                    .col(ColumnDef::new(TicketingSetups::TitleTemplate).text().null())
                    .col(
                        ColumnDef::new(TicketingSetups::DescriptionTemplate)
                            .text()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(TicketingSetups::DefaultVenueName)
                            .text()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(TicketingSetups::DefaultVenueAddress)
                            .text()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(TicketingSetups::PricingTiers)
                            .json_binary()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(TicketingSetups::Status)
                            .text()
                            .not_null()
                            .default("draft"),
                    )
                    .col(
                        ColumnDef::new(TicketingSetups::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(TicketingSetups::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_ticketing_setups_production_id")
                            .from(TicketingSetups::Table, TicketingSetups::ProductionId)
                            .to(Productions::Table, Productions::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // At most one active setup per production.
        create_partial_unique_index(
            manager,
            "idx_ticketing_setups_one_active",
            "ticketing_setups",
            "production_id",
            "status = 'active'",
        )
        .await?;

        manager
            .create_table(
                Table::create()
                    .table(TicketingProviderSetups::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(TicketingProviderSetups::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(TicketingProviderSetups::SetupId)
                            .uuid()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(TicketingProviderSetups::ProviderId)
                            .uuid()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(TicketingProviderSetups::Enabled)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(TicketingProviderSetups::Overrides)
                            .json_binary()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(TicketingProviderSetups::SeriesExternalId)
                            .text()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(TicketingProviderSetups::LastSyncStartedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(TicketingProviderSetups::LastSyncedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(TicketingProviderSetups::LastSyncError)
                            .text()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(TicketingProviderSetups::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(TicketingProviderSetups::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_ticketing_provider_setups_setup_id")
                            .from(
                                TicketingProviderSetups::Table,
                                TicketingProviderSetups::SetupId,
                            )
                            .to(TicketingSetups::Table, TicketingSetups::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_ticketing_provider_setups_provider_id")
                            .from(
                                TicketingProviderSetups::Table,
                                TicketingProviderSetups::ProviderId,
                            )
                            .to(TicketingProviders::Table, TicketingProviders::Id)
                            .on_delete(ForeignKeyAction::Restrict),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_ticketing_provider_setups_setup_provider")
                    .table(TicketingProviderSetups::Table)
                    .col(TicketingProviderSetups::SetupId)
                    .col(TicketingProviderSetups::ProviderId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(TicketingShowRules::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(TicketingShowRules::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(TicketingShowRules::SetupId).uuid().not_null())
                    .col(ColumnDef::new(TicketingShowRules::ShowId).uuid().not_null())
                    .col(ColumnDef::new(TicketingShowRules::RuleType).text().not_null())
                    .col(
                        ColumnDef::new(TicketingShowRules::ProviderIds)
                            .json_binary()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(TicketingShowRules::Overrides)
                            .json_binary()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(TicketingShowRules::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(TicketingShowRules::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_ticketing_show_rules_setup_id")
                            .from(TicketingShowRules::Table, TicketingShowRules::SetupId)
                            .to(TicketingSetups::Table, TicketingSetups::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_ticketing_show_rules_setup")
                    .table(TicketingShowRules::Table)
                    .col(TicketingShowRules::SetupId)
                    .col(TicketingShowRules::ShowId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(TicketingShowRules::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(TicketingProviderSetups::Table).to_owned())
            .await?;
        drop_index_if_exists(manager, "idx_ticketing_setups_one_active").await?;
        manager
            .drop_table(Table::drop().table(TicketingSetups::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum TicketingSetups {
    Table,
    Id,
    ProductionId,
    ListingMode,
    GroupingStrategy,
    TitleTemplate,
    DescriptionTemplate,
    DefaultVenueName,
    DefaultVenueAddress,
    PricingTiers,
    Status,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum TicketingProviderSetups {
    Table,
    Id,
    SetupId,
    ProviderId,
    Enabled,
    Overrides,
    SeriesExternalId,
    LastSyncStartedAt,
    LastSyncedAt,
    LastSyncError,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum TicketingShowRules {
    Table,
    Id,
    SetupId,
    ShowId,
    RuleType,
    ProviderIds,
    Overrides,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Productions {
    Table,
    Id,
}

#[derive(DeriveIden)]
enum TicketingProviders {
    Table,
    Id,
}
