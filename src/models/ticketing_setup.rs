//! Declarative setup entity: what a production wants listed, and how.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use utoipa::ToSchema;

#[derive(
    Clone, Copy, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize, ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::None)")]
#[serde(rename_all = "snake_case")]
pub enum ListingMode {
    /// Every non-cancelled show of the production
    #[sea_orm(string_value = "all_shows")]
    AllShows,
    /// Non-cancelled shows that have not started yet
    #[sea_orm(string_value = "future_only")]
    FutureOnly,
    /// Only shows named by include rules
    #[sea_orm(string_value = "selected")]
    Selected,
}

#[derive(
    Clone, Copy, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize, ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::None)")]
#[serde(rename_all = "snake_case")]
pub enum GroupingStrategy {
    #[sea_orm(string_value = "event_per_show")]
    EventPerShow,
    #[sea_orm(string_value = "single_event_multiple_occurrences")]
    SingleEventMultipleOccurrences,
}

#[derive(
    Clone, Copy, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize, ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::None)")]
#[serde(rename_all = "snake_case")]
pub enum SetupStatus {
    #[sea_orm(string_value = "draft")]
    Draft,
    #[sea_orm(string_value = "active")]
    Active,
    #[sea_orm(string_value = "paused")]
    Paused,
    #[sea_orm(string_value = "archived")]
    Archived,
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "ticketing_setups")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub production_id: Uuid,
    pub listing_mode: ListingMode,
    pub grouping_strategy: GroupingStrategy,
    pub title_template: Option<String>,
    pub description_template: Option<String>,
    pub default_venue_name: Option<String>,
    pub default_venue_address: Option<String>,
    /// Passed through to adapters untouched
    #[sea_orm(column_type = "JsonBinary")]
    pub pricing_tiers: Option<JsonValue>,
    pub status: SetupStatus,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::provider_setup::Entity")]
    ProviderSetup,
    #[sea_orm(has_many = "super::show_rule::Entity")]
    ShowRule,
}

impl Related<super::provider_setup::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ProviderSetup.def()
    }
}

impl Related<super::show_rule::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ShowRule.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
