//! Creates the ticketing_providers table: one row per external ticketing
//! integration owned by an organization.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(TicketingProviders::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(TicketingProviders::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(TicketingProviders::OrganizationId)
                            .uuid()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(TicketingProviders::ProviderType)
                            .text()
                            .not_null(),
                    )
                    .col(ColumnDef::new(TicketingProviders::Name).text().not_null())
                    .col(
                        ColumnDef::new(TicketingProviders::CredentialsCiphertext)
                            .binary()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(TicketingProviders::ManualOnly)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(TicketingProviders::Active)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(TicketingProviders::CredentialsValid)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(TicketingProviders::CredentialsCheckedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(TicketingProviders::CredentialsError)
                            .text()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(TicketingProviders::RateLimitRemaining)
                            .integer()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(TicketingProviders::RateLimitedUntil)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(TicketingProviders::WebhookToken)
                            .text()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(TicketingProviders::WebhookEnabled)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(TicketingProviders::LastWebhookAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(TicketingProviders::AutoSyncEnabled)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(TicketingProviders::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(TicketingProviders::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_ticketing_providers_organization_id")
                            .from(TicketingProviders::Table, TicketingProviders::OrganizationId)
                            .to(Organizations::Table, Organizations::Id)
                            .on_delete(ForeignKeyAction::Restrict),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_ticketing_providers_webhook_token")
                    .table(TicketingProviders::Table)
                    .col(TicketingProviders::WebhookToken)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_ticketing_providers_organization")
                    .table(TicketingProviders::Table)
                    .col(TicketingProviders::OrganizationId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(TicketingProviders::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum TicketingProviders {
    Table,
    Id,
    OrganizationId,
    ProviderType,
    Name,
    CredentialsCiphertext,
    ManualOnly,
    Active,
    CredentialsValid,
    CredentialsCheckedAt,
    CredentialsError,
    RateLimitRemaining,
    RateLimitedUntil,
    WebhookToken,
    WebhookEnabled,
    LastWebhookAt,
    AutoSyncEnabled,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Organizations {
    Table,
    Id,
}
