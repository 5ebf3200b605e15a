//! Activity log entity: audit trail of engine actions per production.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use utoipa::ToSchema;

#[derive(
    Clone, Copy, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize, ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::None)")]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    #[sea_orm(string_value = "event_created")]
    EventCreated,
    #[sea_orm(string_value = "event_updated")]
    EventUpdated,
    #[sea_orm(string_value = "event_deleted")]
    EventDeleted,
    #[sea_orm(string_value = "sync_error")]
    SyncError,
    #[sea_orm(string_value = "tickets_sold")]
    TicketsSold,
    #[sea_orm(string_value = "auth_expired")]
    AuthExpired,
    #[sea_orm(string_value = "rate_limited")]
    RateLimited,
    #[sea_orm(string_value = "event_matched")]
    EventMatched,
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "ticketing_activities")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub production_id: Uuid,
    pub provider_id: Option<Uuid>,
    pub show_id: Option<Uuid>,
    pub remote_event_id: Option<Uuid>,
    pub kind: ActivityKind,
    pub message: String,
    #[sea_orm(column_type = "JsonBinary")]
    pub metadata: Option<JsonValue>,
    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
