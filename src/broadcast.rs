//! In-process status broadcaster backed by a `tokio::sync::broadcast` channel.
//!
//! Every message is scoped to a production. Consumers (for example a websocket
//! fan-out in the web tier) subscribe and filter by `production_id`.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;
use uuid::Uuid;

use crate::models::activity::ActivityKind;
use crate::models::remote_event::SyncStatus;

/// Default buffer capacity for the broadcast channel.
pub const DEFAULT_CAPACITY: usize = 1024;

/// Phase of a reconciliation pass reported through `engine_status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PassPhase {
    Started,
    Completed,
    RateLimited,
    AuthFailed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineMessage {
    EngineStatus {
        setup_id: Uuid,
        provider_id: Uuid,
        phase: PassPhase,
        #[serde(skip_serializing_if = "Option::is_none")]
        detail: Option<String>,
    },
    ShowSync {
        show_id: Uuid,
        provider_id: Uuid,
        remote_event_id: Uuid,
        sync_status: SyncStatus,
        #[serde(skip_serializing_if = "Option::is_none")]
        external_event_id: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    SalesUpdate {
        show_id: Uuid,
        provider_id: Uuid,
        remote_event_id: Uuid,
        sold: i32,
        previous_sold: i32,
        available: Option<i32>,
        revenue_cents: i64,
    },
    Activity {
        activity_id: Uuid,
        kind: ActivityKind,
        message: String,
    },
}

impl EngineMessage {
    pub fn type_name(&self) -> &'static str {
        match self {
            EngineMessage::EngineStatus { .. } => "engine_status",
            EngineMessage::ShowSync { .. } => "show_sync",
            EngineMessage::SalesUpdate { .. } => "sales_update",
            EngineMessage::Activity { .. } => "activity",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BroadcastMessage {
    pub production_id: Uuid,
    #[serde(flatten)]
    pub message: EngineMessage,
}

/// Fan-out channel of [`BroadcastMessage`]s, shared via `Arc`.
#[derive(Debug)]
pub struct StatusBroadcaster {
    sender: broadcast::Sender<BroadcastMessage>,
}

impl StatusBroadcaster {
    /// When the buffer is full the oldest messages are dropped and slow
    /// receivers observe `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publishes to all current subscribers. Never fails.
    pub fn publish(&self, production_id: Uuid, message: EngineMessage) {
        let kind = message.type_name();
        if self
            .sender
            .send(BroadcastMessage {
                production_id,
                message,
            })
            .is_err()
        {
            debug!(%production_id, kind, "No broadcast subscribers; message dropped");
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BroadcastMessage> {
        self.sender.subscribe()
    }
}

impl Default for StatusBroadcaster {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
