//! Scheduled task repository
//!
//! Durable deferral records. At most one `pending` task exists per
//! (kind, setup, provider); scheduling again only moves `not_before` forward.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sea_orm::prelude::*;
use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use crate::error::is_unique_violation;
use crate::models::scheduled_task::{self, Entity as ScheduledTask, TaskKind, TaskStatus};

/// Result of scheduling: the pending task, and whether this call inserted it
/// or moved its `not_before`.
#[derive(Debug, Clone)]
pub struct Scheduled {
    pub task: scheduled_task::Model,
    pub changed: bool,
}

#[derive(Debug, Clone)]
pub struct ScheduledTaskRepository {
    pub db: Arc<DatabaseConnection>,
}

impl ScheduledTaskRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    pub async fn find_pending(
        &self,
        kind: TaskKind,
        setup_id: Uuid,
        provider_id: Uuid,
    ) -> Result<Option<scheduled_task::Model>> {
        Ok(ScheduledTask::find()
            .filter(scheduled_task::Column::Kind.eq(kind))
            .filter(scheduled_task::Column::SetupId.eq(setup_id))
            .filter(scheduled_task::Column::ProviderId.eq(provider_id))
            .filter(scheduled_task::Column::Status.eq(TaskStatus::Pending))
            .one(&*self.db)
            .await?)
    }

    /// Schedules a deferred reconciliation pass no earlier than `not_before`.
    pub async fn schedule_reconcile(
        &self,
        setup_id: Uuid,
        provider_id: Uuid,
        not_before: DateTime<Utc>,
        reason: &str,
    ) -> Result<Scheduled> {
        if let Some(existing) = self
            .find_pending(TaskKind::Reconcile, setup_id, provider_id)
            .await?
        {
            return self.push_back(existing, not_before, reason).await;
        }

        let now = Utc::now().fixed_offset();
        let inserted = scheduled_task::ActiveModel {
            id: Set(Uuid::new_v4()),
            kind: Set(TaskKind::Reconcile),
            setup_id: Set(setup_id),
            provider_id: Set(provider_id),
            not_before: Set(not_before.fixed_offset()),
            status: Set(TaskStatus::Pending),
            attempts: Set(0),
            reason: Set(Some(reason.to_string())),
            last_error: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.db)
        .await;

        match inserted {
            Ok(task) => Ok(Scheduled { task, changed: true }),
            Err(err) if is_unique_violation(&err) => {
                debug!(%setup_id, %provider_id, "Concurrent deferral won; reusing pending task");
                let existing = self
                    .find_pending(TaskKind::Reconcile, setup_id, provider_id)
                    .await?
                    .context("pending task vanished after unique violation")?;
                self.push_back(existing, not_before, reason).await
            }
            Err(err) => Err(err).context("Failed to insert scheduled task"),
        }
    }

    async fn push_back(
        &self,
        existing: scheduled_task::Model,
        not_before: DateTime<Utc>,
        reason: &str,
    ) -> Result<Scheduled> {
        // Compared at the database's microsecond precision.
        let current = existing.not_before.with_timezone(&Utc);
        if current.timestamp_micros() >= not_before.timestamp_micros() {
            return Ok(Scheduled {
                task: existing,
                changed: false,
            });
        }
        let task = scheduled_task::ActiveModel {
            id: Set(existing.id),
            not_before: Set(not_before.fixed_offset()),
            reason: Set(Some(reason.to_string())),
            updated_at: Set(Utc::now().fixed_offset()),
            ..Default::default()
        }
        .update(&*self.db)
        .await?;
        Ok(Scheduled { task, changed: true })
    }

    /// Claims pending tasks that are due at `now`. Each claim is a conditional
    /// `pending -> running` update, so concurrent claimers never share a task.
    pub async fn claim_due(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<scheduled_task::Model>> {
        let due: Vec<scheduled_task::Model> = ScheduledTask::find()
            .filter(scheduled_task::Column::Status.eq(TaskStatus::Pending))
            .order_by_asc(scheduled_task::Column::NotBefore)
            .all(&*self.db)
            .await?
            .into_iter()
            .filter(|task| task.not_before.with_timezone(&Utc) <= now)
            .take(limit)
            .collect();

        let mut claimed = Vec::with_capacity(due.len());
        for task in due {
            let result = ScheduledTask::update_many()
                .col_expr(scheduled_task::Column::Status, Expr::value(TaskStatus::Running))
                .col_expr(
                    scheduled_task::Column::Attempts,
                    Expr::value(Expr::col(scheduled_task::Column::Attempts).add(1)),
                )
                .col_expr(
                    scheduled_task::Column::UpdatedAt,
                    Expr::value(Utc::now().fixed_offset()),
                )
                .filter(scheduled_task::Column::Id.eq(task.id))
                .filter(scheduled_task::Column::Status.eq(TaskStatus::Pending))
                .exec(&*self.db)
                .await?;

            if result.rows_affected == 1 {
                claimed.push(scheduled_task::Model {
                    status: TaskStatus::Running,
                    attempts: task.attempts + 1,
                    ..task
                });
            }
        }
        Ok(claimed)
    }

    pub async fn mark_done(&self, id: Uuid) -> Result<()> {
        scheduled_task::ActiveModel {
            id: Set(id),
            status: Set(TaskStatus::Done),
            updated_at: Set(Utc::now().fixed_offset()),
            ..Default::default()
        }
        .update(&*self.db)
        .await?;
        Ok(())
    }

    pub async fn mark_failed(&self, id: Uuid, error: &str) -> Result<()> {
        scheduled_task::ActiveModel {
            id: Set(id),
            status: Set(TaskStatus::Failed),
            last_error: Set(Some(error.to_string())),
            updated_at: Set(Utc::now().fixed_offset()),
            ..Default::default()
        }
        .update(&*self.db)
        .await?;
        Ok(())
    }

    pub async fn list_pending(&self) -> Result<Vec<scheduled_task::Model>> {
        Ok(ScheduledTask::find()
            .filter(scheduled_task::Column::Status.eq(TaskStatus::Pending))
            .order_by_asc(scheduled_task::Column::NotBefore)
            .all(&*self.db)
            .await?)
    }
}
