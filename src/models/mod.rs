//! # Data Models
//!
//! SeaORM entities for the ticketing engine plus the read-only catalog entities
//! (organizations, productions, shows) it consumes.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub mod activity;
pub mod organization;
pub mod production;
pub mod provider_event;
pub mod provider_setup;
pub mod remote_event;
pub mod scheduled_task;
pub mod show;
pub mod show_rule;
pub mod ticketing_provider;
pub mod ticketing_setup;
pub mod webhook_log;

pub use activity::Entity as Activity;
pub use organization::Entity as Organization;
pub use production::Entity as Production;
pub use provider_event::Entity as ProviderEvent;
pub use provider_setup::Entity as ProviderSetup;
pub use remote_event::Entity as RemoteEvent;
pub use scheduled_task::Entity as ScheduledTask;
pub use show::Entity as Show;
pub use show_rule::Entity as ShowRule;
pub use ticketing_provider::Entity as TicketingProvider;
pub use ticketing_setup::Entity as TicketingSetup;
pub use webhook_log::Entity as WebhookLog;

/// Basic service information response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ServiceInfo {
    /// The name of the service
    pub service: String,
    /// The version of the service
    pub version: String,
}

impl Default for ServiceInfo {
    fn default() -> Self {
        Self {
            service: "ticketing-sync".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}
