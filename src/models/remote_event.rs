//! Remote event entity
//!
//! The engine's cached belief of what exists on a provider for one show. At most
//! one non-deleted row exists per (provider, show), and `external_event_id` is
//! unique per provider; both are enforced by indexes.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use utoipa::ToSchema;

/// Provider statuses that mean a listing is on sale and worth polling.
pub const LIVE_REMOTE_STATUSES: &[&str] = &["live", "started"];

/// Provider statuses flipped to [`AUTH_EXPIRED_REMOTE_STATUS`] when credentials fail.
pub const AUTH_SENSITIVE_REMOTE_STATUSES: &[&str] = &["live", "ready", "pending_sync"];

pub const AUTH_EXPIRED_REMOTE_STATUS: &str = "auth_expired";

/// Engine-owned synchronization state of a remote event.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
    ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::None)")]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    #[sea_orm(string_value = "pending_create")]
    PendingCreate,
    #[sea_orm(string_value = "synced")]
    Synced,
    #[sea_orm(string_value = "pending_update")]
    PendingUpdate,
    #[sea_orm(string_value = "pending_delete")]
    PendingDelete,
    #[sea_orm(string_value = "error")]
    Error,
    #[sea_orm(string_value = "deleted")]
    Deleted,
}

impl SyncStatus {
    /// Allowed transitions of the sync state machine. `error -> pending_create`
    /// is only used for rows that never obtained an external id, and
    /// `error -> pending_update` only for rows that have one.
    pub fn can_transition_to(self, next: SyncStatus) -> bool {
        use SyncStatus::*;
        matches!(
            (self, next),
            (PendingCreate, Synced)
                | (PendingCreate, Error)
                | (Synced, PendingUpdate)
                | (PendingUpdate, Synced)
                | (PendingUpdate, Error)
                | (PendingUpdate, PendingDelete)
                | (Synced, PendingDelete)
                | (Error, PendingDelete)
                | (PendingDelete, Deleted)
                | (PendingDelete, Error)
                | (Error, PendingCreate)
                | (Error, PendingUpdate)
                | (Error, Deleted)
        )
    }

    pub fn is_terminal(self) -> bool {
        self == SyncStatus::Deleted
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "ticketing_remote_events")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub provider_id: Uuid,
    pub show_id: Uuid,
    pub production_id: Uuid,
    /// `None` for rows materialized by discovery
    pub setup_id: Option<Uuid>,
    pub external_event_id: Option<String>,
    pub external_url: Option<String>,
    /// The provider's own status string
    pub remote_status: Option<String>,
    pub sync_status: SyncStatus,
    pub tickets_sold: i32,
    pub tickets_available: Option<i32>,
    pub capacity: Option<i32>,
    pub revenue_cents: i64,
    #[sea_orm(column_type = "JsonBinary")]
    pub raw_data: Option<JsonValue>,
    pub content_hash: Option<String>,
    pub last_synced_at: Option<DateTimeWithTimeZone>,
    pub last_sync_error: Option<String>,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

impl Model {
    pub fn is_live(&self) -> bool {
        self.remote_status
            .as_deref()
            .map(|status| LIVE_REMOTE_STATUSES.contains(&status))
            .unwrap_or(false)
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::ticketing_provider::Entity",
        from = "Column::ProviderId",
        to = "super::ticketing_provider::Column::Id"
    )]
    Provider,
}

impl Related<super::ticketing_provider::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Provider.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

#[cfg(test)]
mod tests {
    use super::SyncStatus::*;

    #[test]
    fn create_path_transitions() {
        assert!(PendingCreate.can_transition_to(Synced));
        assert!(PendingCreate.can_transition_to(Error));
        assert!(!PendingCreate.can_transition_to(Deleted));
    }

    #[test]
    fn update_and_delete_paths() {
        assert!(Synced.can_transition_to(PendingUpdate));
        assert!(PendingUpdate.can_transition_to(Synced));
        assert!(Synced.can_transition_to(PendingDelete));
        assert!(Error.can_transition_to(PendingDelete));
        assert!(PendingDelete.can_transition_to(Deleted));
        assert!(PendingDelete.can_transition_to(Error));
    }

    #[test]
    fn interrupted_rows_can_still_be_retried_or_unlisted() {
        assert!(PendingUpdate.can_transition_to(PendingDelete));
        assert!(Error.can_transition_to(PendingUpdate));
        assert!(Error.can_transition_to(PendingCreate));
        assert!(!PendingDelete.can_transition_to(PendingUpdate));
        assert!(!Synced.can_transition_to(Error));
    }

    #[test]
    fn deleted_is_terminal() {
        assert!(Deleted.is_terminal());
        for next in [PendingCreate, Synced, PendingUpdate, PendingDelete, Error] {
            assert!(!Deleted.can_transition_to(next));
        }
    }
}
