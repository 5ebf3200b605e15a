//! Provider setup entity: enables one provider for a declarative setup and
//! carries per-provider overrides plus the re-run guard timestamps.

use sea_orm::entity::prelude::*;
use serde_json::Value as JsonValue;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "ticketing_provider_setups")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub setup_id: Uuid,
    pub provider_id: Uuid,
    pub enabled: bool,
    /// See [`crate::reconciler::desired::PayloadOverrides`]
    #[sea_orm(column_type = "JsonBinary")]
    pub overrides: Option<JsonValue>,
    /// Parent event id when the setup groups shows as occurrences of one event
    pub series_external_id: Option<String>,
    pub last_sync_started_at: Option<DateTimeWithTimeZone>,
    pub last_synced_at: Option<DateTimeWithTimeZone>,
    pub last_sync_error: Option<String>,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
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
