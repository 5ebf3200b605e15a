//! Read-only access to the collaborator catalog: organizations, productions and shows.

use anyhow::Result;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder};
use std::sync::Arc;
use uuid::Uuid;

use crate::models::production::{self, Entity as Production};
use crate::models::show::{self, Entity as Show, SHOW_STATUS_CANCELLED};

#[derive(Debug, Clone)]
pub struct CatalogRepository {
    pub db: Arc<DatabaseConnection>,
}

impl CatalogRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    pub async fn get_production(&self, id: Uuid) -> Result<Option<production::Model>> {
        Ok(Production::find_by_id(id).one(&*self.db).await?)
    }

    pub async fn get_show(&self, id: Uuid) -> Result<Option<show::Model>> {
        Ok(Show::find_by_id(id).one(&*self.db).await?)
    }

    /// Every show of a production, cancelled ones included, ordered by start.
    pub async fn list_shows_for_production(&self, production_id: Uuid) -> Result<Vec<show::Model>> {
        Ok(Show::find()
            .filter(show::Column::ProductionId.eq(production_id))
            .order_by_asc(show::Column::StartsAt)
            .all(&*self.db)
            .await?)
    }

    /// Non-cancelled shows of an organization, paired with their production.
    pub async fn list_schedulable_shows_for_organization(
        &self,
        organization_id: Uuid,
    ) -> Result<Vec<(show::Model, production::Model)>> {
        let rows = Show::find()
            .find_also_related(Production)
            .filter(production::Column::OrganizationId.eq(organization_id))
            .filter(show::Column::Status.ne(SHOW_STATUS_CANCELLED))
            .order_by_asc(show::Column::StartsAt)
            .all(&*self.db)
            .await?;

        Ok(rows
            .into_iter()
            .filter_map(|(show, production)| production.map(|p| (show, p)))
            .collect())
    }
}
