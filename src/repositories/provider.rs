//! Ticketing provider repository
//!
//! Lookup by webhook token, health bookkeeping writes and credential storage for
//! the `ticketing_providers` table.

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Utc};
use rand::RngCore;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
};
use std::collections::BTreeSet;
use std::sync::Arc;
use uuid::Uuid;

use crate::adapters::ProviderCredentials;
use crate::crypto::{CryptoKey, encrypt_provider_credentials, is_encrypted_payload};
use crate::models::ticketing_provider::{self, Entity as Provider, ProviderType};

/// Input for creating a provider.
#[derive(Debug, Clone)]
pub struct NewProvider {
    pub organization_id: Uuid,
    pub provider_type: ProviderType,
    pub name: String,
    pub credentials: Option<ProviderCredentials>,
    pub manual_only: bool,
    pub webhook_enabled: bool,
    pub auto_sync_enabled: bool,
}

#[derive(Debug, Clone)]
pub struct ProviderRepository {
    pub db: Arc<DatabaseConnection>,
}

/// Unguessable URL-safe token for webhook URLs.
pub fn generate_webhook_token() -> String {
    let mut bytes = [0u8; 24];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

impl ProviderRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    pub async fn get_by_id(&self, id: Uuid) -> Result<Option<ticketing_provider::Model>> {
        Ok(Provider::find_by_id(id).one(&*self.db).await?)
    }

    /// Finds the provider addressed by a webhook URL.
    pub async fn find_by_webhook_token(
        &self,
        provider_type: ProviderType,
        token: &str,
    ) -> Result<Option<ticketing_provider::Model>> {
        let provider = Provider::find()
            .filter(ticketing_provider::Column::WebhookToken.eq(token))
            .filter(ticketing_provider::Column::ProviderType.eq(provider_type))
            .one(&*self.db)
            .await?;
        Ok(provider)
    }

    pub async fn list_active(&self) -> Result<Vec<ticketing_provider::Model>> {
        Ok(Provider::find()
            .filter(ticketing_provider::Column::Active.eq(true))
            .order_by_asc(ticketing_provider::Column::CreatedAt)
            .all(&*self.db)
            .await?)
    }

    pub async fn list_active_for_organization(
        &self,
        organization_id: Uuid,
    ) -> Result<Vec<ticketing_provider::Model>> {
        Ok(Provider::find()
            .filter(ticketing_provider::Column::OrganizationId.eq(organization_id))
            .filter(ticketing_provider::Column::Active.eq(true))
            .order_by_asc(ticketing_provider::Column::CreatedAt)
            .all(&*self.db)
            .await?)
    }

    /// Organizations owning at least one active provider that can be called.
    pub async fn organizations_with_api_providers(&self) -> Result<Vec<Uuid>> {
        let ids: BTreeSet<Uuid> = self
            .list_active()
            .await?
            .into_iter()
            .filter(|p| p.is_api_enabled())
            .map(|p| p.organization_id)
            .collect();
        Ok(ids.into_iter().collect())
    }

    /// Creates a provider, encrypting credentials when a key is available.
    pub async fn create(
        &self,
        new: NewProvider,
        crypto_key: Option<&CryptoKey>,
    ) -> Result<ticketing_provider::Model> {
        let now = Utc::now().fixed_offset();
        let mut model = ticketing_provider::Model {
            id: Uuid::new_v4(),
            organization_id: new.organization_id,
            provider_type: new.provider_type,
            name: new.name,
            credentials_ciphertext: None,
            manual_only: new.manual_only,
            active: true,
            credentials_valid: true,
            credentials_checked_at: None,
            credentials_error: None,
            rate_limit_remaining: None,
            rate_limited_until: None,
            webhook_token: generate_webhook_token(),
            webhook_enabled: new.webhook_enabled,
            last_webhook_at: None,
            auto_sync_enabled: new.auto_sync_enabled,
            created_at: now,
            updated_at: now,
        };

        if let Some(credentials) = new.credentials.as_ref() {
            model.credentials_ciphertext = Some(match crypto_key {
                Some(key) => encrypt_provider_credentials(key, &model, credentials)
                    .map_err(|e| anyhow!("Credential encryption failed: {}", e))?,
                None => serde_json::to_vec(credentials)?,
            });
        }

        let active: ticketing_provider::ActiveModel = model.into();
        active
            .insert(&*self.db)
            .await
            .context("Failed to insert ticketing provider")
    }

    pub async fn mark_credentials_valid(&self, id: Uuid, checked_at: DateTime<Utc>) -> Result<()> {
        ticketing_provider::ActiveModel {
            id: Set(id),
            credentials_valid: Set(true),
            credentials_error: Set(None),
            credentials_checked_at: Set(Some(checked_at.fixed_offset())),
            updated_at: Set(Utc::now().fixed_offset()),
            ..Default::default()
        }
        .update(&*self.db)
        .await?;
        Ok(())
    }

    pub async fn mark_credentials_invalid(
        &self,
        id: Uuid,
        error: &str,
        checked_at: DateTime<Utc>,
    ) -> Result<()> {
        ticketing_provider::ActiveModel {
            id: Set(id),
            credentials_valid: Set(false),
            credentials_error: Set(Some(error.to_string())),
            credentials_checked_at: Set(Some(checked_at.fixed_offset())),
            updated_at: Set(Utc::now().fixed_offset()),
            ..Default::default()
        }
        .update(&*self.db)
        .await?;
        Ok(())
    }

    /// Records a non-auth failure without touching credential validity.
    pub async fn record_credentials_error(
        &self,
        id: Uuid,
        error: &str,
        checked_at: DateTime<Utc>,
    ) -> Result<()> {
        ticketing_provider::ActiveModel {
            id: Set(id),
            credentials_error: Set(Some(error.to_string())),
            credentials_checked_at: Set(Some(checked_at.fixed_offset())),
            updated_at: Set(Utc::now().fixed_offset()),
            ..Default::default()
        }
        .update(&*self.db)
        .await?;
        Ok(())
    }

    pub async fn set_rate_limited_until(
        &self,
        id: Uuid,
        until: DateTime<Utc>,
        remaining: Option<i32>,
    ) -> Result<()> {
        ticketing_provider::ActiveModel {
            id: Set(id),
            rate_limited_until: Set(Some(until.fixed_offset())),
            rate_limit_remaining: Set(remaining),
            updated_at: Set(Utc::now().fixed_offset()),
            ..Default::default()
        }
        .update(&*self.db)
        .await?;
        Ok(())
    }

    pub async fn touch_last_webhook(&self, id: Uuid, at: DateTime<Utc>) -> Result<()> {
        ticketing_provider::ActiveModel {
            id: Set(id),
            last_webhook_at: Set(Some(at.fixed_offset())),
            ..Default::default()
        }
        .update(&*self.db)
        .await?;
        Ok(())
    }

    /// Providers whose stored credentials are still legacy plaintext.
    pub async fn list_with_plaintext_credentials(&self) -> Result<Vec<ticketing_provider::Model>> {
        let providers = Provider::find()
            .filter(ticketing_provider::Column::CredentialsCiphertext.is_not_null())
            .all(&*self.db)
            .await?;

        Ok(providers
            .into_iter()
            .filter(|p| {
                p.credentials_ciphertext
                    .as_deref()
                    .is_some_and(|bytes| !bytes.is_empty() && !is_encrypted_payload(bytes))
            })
            .collect())
    }

    pub async fn replace_credentials_ciphertext(&self, id: Uuid, ciphertext: Vec<u8>) -> Result<()> {
        ticketing_provider::ActiveModel {
            id: Set(id),
            credentials_ciphertext: Set(Some(ciphertext)),
            updated_at: Set(Utc::now().fixed_offset()),
            ..Default::default()
        }
        .update(&*self.db)
        .await?;
        Ok(())
    }
}
