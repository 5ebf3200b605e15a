//! Show entity (read-only collaborator record).

use sea_orm::entity::prelude::*;

/// Status value the scheduling system uses for cancelled performances.
pub const SHOW_STATUS_CANCELLED: &str = "cancelled";

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "shows")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub production_id: Uuid,
    pub starts_at: DateTimeWithTimeZone,
    pub ends_at: Option<DateTimeWithTimeZone>,
    pub venue_name: Option<String>,
    pub venue_address: Option<String>,
    pub capacity: Option<i32>,
    pub status: String,
    pub created_at: DateTimeWithTimeZone,
}

impl Model {
    pub fn is_cancelled(&self) -> bool {
        self.status == SHOW_STATUS_CANCELLED
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::production::Entity",
        from = "Column::ProductionId",
        to = "super::production::Column::Id"
    )]
    Production,
}

impl Related<super::production::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Production.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
