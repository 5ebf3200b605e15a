//! Ticketing provider adapters
//!
//! One implementation per [`ProviderType`](crate::models::ticketing_provider::ProviderType)
//! behind the [`TicketingAdapter`] trait.

pub mod eventbrite;
pub mod http;
pub mod manual;
pub mod registry;
pub mod ticket_tailor;
pub mod trait_;

pub use eventbrite::EventbriteAdapter;
pub use manual::ManualAdapter;
pub use registry::{AdapterRegistry, HttpSettings, RegistryError, adapter_for};
pub use ticket_tailor::TicketTailorAdapter;
pub use trait_::{
    AdapterError, CreatedEvent, DiscoveredEvent, EventPayload, FailureKind, ParsedWebhook,
    ProviderCredentials, SalesSnapshot, SignatureCheck, TicketingAdapter, WebhookRequest,
    classify, parse_generic_webhook,
};
