//! Show rule entity: include, exclude or override one show, optionally scoped to
//! a subset of providers.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use utoipa::ToSchema;

#[derive(
    Clone, Copy, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize, ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::None)")]
#[serde(rename_all = "snake_case")]
pub enum RuleType {
    #[sea_orm(string_value = "exclude")]
    Exclude,
    #[sea_orm(string_value = "include")]
    Include,
    #[sea_orm(string_value = "override")]
    Override,
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "ticketing_show_rules")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub setup_id: Uuid,
    pub show_id: Uuid,
    pub rule_type: RuleType,
    /// JSON array of provider ids; `None` applies to every provider
    #[sea_orm(column_type = "JsonBinary")]
    pub provider_ids: Option<JsonValue>,
    #[sea_orm(column_type = "JsonBinary")]
    pub overrides: Option<JsonValue>,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

impl Model {
    /// Whether this rule applies to the given provider.
    pub fn applies_to(&self, provider_id: Uuid) -> bool {
        match self.provider_ids.as_ref().and_then(|v| v.as_array()) {
            None => true,
            Some(ids) => ids
                .iter()
                .filter_map(|v| v.as_str())
                .filter_map(|s| Uuid::parse_str(s).ok())
                .any(|id| id == provider_id),
        }
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::ticketing_setup::Entity",
        from = "Column::SetupId",
        to = "super::ticketing_setup::Column::Id"
    )]
    Setup,
}

impl Related<super::ticketing_setup::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Setup.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
