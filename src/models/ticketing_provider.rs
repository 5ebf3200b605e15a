//! Ticketing provider entity
//!
//! One external ticketing integration owned by an organization. Credentials are
//! stored encrypted (see [`crate::crypto`]); health and rate-limit state is owned by
//! [`crate::provider_health`].

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Closed set of supported ticketing platforms. Adapter selection is a pure
/// function of this value, see [`crate::adapters::adapter_for`].
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
pub enum ProviderType {
    #[sea_orm(string_value = "eventbrite")]
    Eventbrite,
    #[sea_orm(string_value = "ticket_tailor")]
    TicketTailor,
    #[sea_orm(string_value = "manual")]
    Manual,
}

impl ProviderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderType::Eventbrite => "eventbrite",
            ProviderType::TicketTailor => "ticket_tailor",
            ProviderType::Manual => "manual",
        }
    }
}

impl fmt::Display for ProviderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown provider type '{0}'")]
pub struct UnknownProviderType(pub String);

impl FromStr for ProviderType {
    type Err = UnknownProviderType;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "eventbrite" => Ok(ProviderType::Eventbrite),
            "ticket_tailor" | "ticket-tailor" => Ok(ProviderType::TicketTailor),
            "manual" => Ok(ProviderType::Manual),
            other => Err(UnknownProviderType(other.to_string())),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "ticketing_providers")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub organization_id: Uuid,
    pub provider_type: ProviderType,
    pub name: String,
    /// AES-GCM encrypted credentials JSON; legacy rows may hold plaintext
    pub credentials_ciphertext: Option<Vec<u8>>,
    /// Human-operated provider with no API access
    pub manual_only: bool,
    pub active: bool,
    pub credentials_valid: bool,
    pub credentials_checked_at: Option<DateTimeWithTimeZone>,
    pub credentials_error: Option<String>,
    pub rate_limit_remaining: Option<i32>,
    pub rate_limited_until: Option<DateTimeWithTimeZone>,
    /// Unguessable token embedded in the webhook URL
    pub webhook_token: String,
    pub webhook_enabled: bool,
    pub last_webhook_at: Option<DateTimeWithTimeZone>,
    pub auto_sync_enabled: bool,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

impl Model {
    /// Whether the provider is inside a recorded rate-limit window at `now`.
    pub fn is_rate_limited_at(&self, now: DateTime<Utc>) -> bool {
        self.rate_limited_until
            .map(|until| until.with_timezone(&Utc) > now)
            .unwrap_or(false)
    }

    /// Whether automated API calls may be made against this provider.
    pub fn is_api_enabled(&self) -> bool {
        self.active && !self.manual_only && self.provider_type != ProviderType::Manual
    }

    /// Associated data binding encrypted credentials to this provider row.
    pub fn credentials_aad(&self) -> String {
        format!(
            "{}|{}|{}",
            self.organization_id, self.provider_type, self.id
        )
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
