//! # Repository Layer
//!
//! SeaORM data access for the engine's tables plus read-only access to the
//! collaborator catalog. Every repository holds an `Arc<DatabaseConnection>` and
//! returns `anyhow::Result`.

pub mod activity;
pub mod catalog;
pub mod provider;
pub mod provider_event;
pub mod remote_event;
pub mod scheduled_task;
pub mod setup;
pub mod webhook_log;

pub use activity::{ActivityRepository, NewActivity};
pub use catalog::CatalogRepository;
pub use provider::{NewProvider, ProviderRepository};
pub use provider_event::{MatchUpdate, ProviderEventRepository};
pub use remote_event::{ExistingListing, RemoteEventKey, RemoteEventRepository};
pub use scheduled_task::{Scheduled, ScheduledTaskRepository};
pub use setup::{NewSetup, SetupRepository, SyncCandidate};
pub use webhook_log::WebhookLogRepository;
