//! Provider event entity: an event seen on a provider during discovery that is not
//! necessarily tied to a show yet.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use utoipa::ToSchema;

#[derive(
    Clone, Copy, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize, ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::None)")]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    #[sea_orm(string_value = "unmatched")]
    Unmatched,
    #[sea_orm(string_value = "suggested")]
    Suggested,
    #[sea_orm(string_value = "matched")]
    Matched,
    #[sea_orm(string_value = "dismissed")]
    Dismissed,
}

impl MatchStatus {
    /// Statuses decided by a human or already linked; discovery leaves them alone.
    pub fn is_settled(self) -> bool {
        matches!(self, MatchStatus::Matched | MatchStatus::Dismissed)
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "ticketing_provider_events")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub provider_id: Uuid,
    pub organization_id: Uuid,
    pub external_event_id: String,
    pub title: String,
    pub starts_at: Option<DateTimeWithTimeZone>,
    pub venue_name: Option<String>,
    pub external_url: Option<String>,
    pub remote_status: Option<String>,
    #[sea_orm(column_type = "JsonBinary")]
    pub raw_data: Option<JsonValue>,
    pub match_status: MatchStatus,
    pub match_confidence: f64,
    /// JSON array of human-readable strings
    #[sea_orm(column_type = "JsonBinary")]
    pub match_reasons: Option<JsonValue>,
    pub matched_show_id: Option<Uuid>,
    pub suggested_show_id: Option<Uuid>,
    pub last_seen_at: DateTimeWithTimeZone,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
