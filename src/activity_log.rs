//! Activity recording: persists an entry and broadcasts it in one call.

use std::sync::Arc;

use tracing::warn;

use crate::broadcast::{EngineMessage, StatusBroadcaster};
use crate::repositories::{ActivityRepository, NewActivity};

#[derive(Debug, Clone)]
pub struct ActivityRecorder {
    repo: ActivityRepository,
    broadcaster: Arc<StatusBroadcaster>,
}

impl ActivityRecorder {
    pub fn new(repo: ActivityRepository, broadcaster: Arc<StatusBroadcaster>) -> Self {
        Self { repo, broadcaster }
    }

    /// Records `entry` and publishes an `activity` message. Failures are logged
    /// and swallowed; an audit write never fails the caller's pass.
    pub async fn record(&self, entry: NewActivity) {
        let production_id = entry.production_id;
        let kind = entry.kind;
        match self.repo.record(entry).await {
            Ok(activity) => self.broadcaster.publish(
                production_id,
                EngineMessage::Activity {
                    activity_id: activity.id,
                    kind: activity.kind,
                    message: activity.message,
                },
            ),
            Err(err) => warn!(%production_id, ?kind, error = %err, "Failed to record activity"),
        }
    }
}
