//! Creates the read-only catalog tables the engine consumes: organizations,
//! productions and shows.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Organizations::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Organizations::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Organizations::Name).text().not_null())
                    .col(
                        ColumnDef::new(Organizations::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Productions::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Productions::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Productions::OrganizationId).uuid().not_null())
                    .col(ColumnDef::new(Productions::Title).text().not_null())
                    .col(ColumnDef::new(Productions::Description).text().null())
                    .col(ColumnDef::new(Productions::ImageKey).text().null())
                    .col(
                        ColumnDef::new(Productions::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_productions_organization_id")
                            .from(Productions::Table, Productions::OrganizationId)
                            .to(Organizations::Table, Organizations::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Shows::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Shows::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Shows::ProductionId).uuid().not_null())
                    .col(
                        ColumnDef::new(Shows::StartsAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Shows::EndsAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(ColumnDef::new(Shows::VenueName).text().null())
                    .col(ColumnDef::new(Shows::VenueAddress).text().null())
                    .col(ColumnDef::new(Shows::Capacity).integer().null())
                    .col(
                        ColumnDef::new(Shows::Status)
                            .text()
                            .not_null()
                            .default("scheduled"),
                    )
                    .col(
                        ColumnDef::new(Shows::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_shows_production_id")
                            .from(Shows::Table, Shows::ProductionId)
                            .to(Productions::Table, Productions::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_shows_production_starts_at")
                    .table(Shows::Table)
                    .col(Shows::ProductionId)
                    .col(Shows::StartsAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Shows::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Productions::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Organizations::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Organizations {
    Table,
    Id,
    Name,
    CreatedAt,
}

#[derive(DeriveIden)]
enum Productions {
    Table,
    Id,
    OrganizationId,
    Title,
    Description,
    ImageKey,
    CreatedAt,
}

#[derive(DeriveIden)]
enum Shows {
    Table,
    Id,
    ProductionId,
    StartsAt,
    EndsAt,
    VenueName,
    VenueAddress,
    Capacity,
    Status,
    CreatedAt,
}
