use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use ticketing_sync::{
    adapters::ProviderCredentials,
    config::ConfigLoader,
    crypto::{CryptoKey, encrypt_provider_credentials},
    db,
    repositories::ProviderRepository,
};

/// Re-encrypts ticketing provider credentials still stored as legacy plaintext.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Report affected providers without writing
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = ConfigLoader::new().load().context("loading configuration")?;

    let key_bytes = config
        .crypto_key
        .clone()
        .context("crypto key not present in configuration")?;
    let crypto_key = CryptoKey::new(key_bytes).context("initializing crypto key")?;

    let db = db::init_pool(&config)
        .await
        .context("initializing database connection pool")?;
    let providers = ProviderRepository::new(Arc::new(db));

    let legacy = providers
        .list_with_plaintext_credentials()
        .await
        .context("querying providers")?;

    let mut updated_count = 0usize;
    for provider in legacy {
        let plaintext = provider.credentials_ciphertext.as_deref().unwrap_or_default();
        let credentials: ProviderCredentials = serde_json::from_slice(plaintext)
            .with_context(|| format!("provider {} holds unreadable credentials", provider.id))?;

        if args.dry_run {
            println!("would re-encrypt provider {} ({})", provider.id, provider.name);
            continue;
        }

        let ciphertext = encrypt_provider_credentials(&crypto_key, &provider, &credentials)
            .map_err(|err| anyhow!("failed to encrypt credentials for {}: {}", provider.id, err))?;
        providers
            .replace_credentials_ciphertext(provider.id, ciphertext)
            .await
            .with_context(|| format!("updating provider {}", provider.id))?;
        updated_count += 1;
    }

    println!(
        "Re-encrypted {} provider(s) containing legacy plaintext credentials.",
        updated_count
    );

    Ok(())
}
