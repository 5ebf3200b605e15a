use std::{
    env, fs,
    path::PathBuf,
    sync::{Mutex, MutexGuard, OnceLock},
};

use tempfile::TempDir;
use ticketing_sync::config::{ConfigError, ConfigLoader};

const KEY_B64: &str = "YWFhYWFhYWFhYWFhYWFhYWFhYWFhYWFhYWFhYWFhYWE=";

const VARS: &[&str] = &[
    "TICKETING_PROFILE",
    "TICKETING_API_BIND_ADDR",
    "TICKETING_LOG_LEVEL",
    "TICKETING_CRYPTO_KEY",
    "TICKETING_OPERATOR_TOKEN",
    "TICKETING_OPERATOR_TOKENS",
    "TICKETING_SYNC_RECONCILE_GUARD_SECONDS",
    "TICKETING_SYNC_SUGGEST_THRESHOLD",
];

fn env_lock() -> &'static Mutex<()> {
    static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    LOCK.get_or_init(|| Mutex::new(()))
}

fn env_guard() -> MutexGuard<'static, ()> {
    env_lock()
        .lock()
        .unwrap_or_else(|poison| poison.into_inner())
}

fn clear_env() {
    unsafe {
        for var in VARS {
            env::remove_var(var);
        }
    }
}

fn write_env_file(dir: &TempDir, name: &str, contents: &str) {
    fs::write(dir.path().join(name), contents).unwrap();
}

fn loader_for(dir: &TempDir) -> ConfigLoader {
    ConfigLoader::with_base_dir(PathBuf::from(dir.path()))
}

#[test]
fn loads_defaults_when_no_env_present() {
    let _guard = env_guard();
    clear_env();

    let temp_dir = TempDir::new().unwrap();
    let cfg = loader_for(&temp_dir)
        .load()
        .expect("config loads with defaults");

    assert_eq!(cfg.profile, "local");
    assert_eq!(cfg.api_bind_addr, "0.0.0.0:8080");
    assert_eq!(cfg.log_level, "info");
    assert!(cfg.operator_tokens.is_empty());
    assert!(cfg.crypto_key.is_none());
    assert_eq!(cfg.sync.reconcile_guard_seconds, 120);
    assert_eq!(cfg.sync.rate_limit_grace_seconds, 60);
    cfg.bind_addr().expect("default bind addr parses");
}

#[test]
fn layered_env_files_apply_in_order() {
    let _guard = env_guard();
    clear_env();

    let temp_dir = TempDir::new().unwrap();
    write_env_file(&temp_dir, ".env", "TICKETING_API_BIND_ADDR=127.0.0.1:3000\n");
    write_env_file(
        &temp_dir,
        ".env.staging",
        "TICKETING_API_BIND_ADDR=192.168.0.10:5000\n",
    );
    write_env_file(
        &temp_dir,
        ".env.staging.local",
        "TICKETING_API_BIND_ADDR=10.0.0.5:6000\n",
    );

    // Profile selected in .env.local before the profile files load.
    write_env_file(
        &temp_dir,
        ".env.local",
        &format!(
            "TICKETING_PROFILE=staging\nTICKETING_API_BIND_ADDR=127.0.0.1:4000\nTICKETING_OPERATOR_TOKEN=layered-token\nTICKETING_CRYPTO_KEY={KEY_B64}\n"
        ),
    );

    let cfg = loader_for(&temp_dir)
        .load()
        .expect("config loads with layered env files");

    assert_eq!(cfg.profile, "staging");
    assert_eq!(cfg.api_bind_addr, "10.0.0.5:6000");
    assert_eq!(cfg.operator_tokens, vec!["layered-token".to_string()]);
    assert_eq!(cfg.crypto_key.as_ref().map(Vec::len), Some(32));
}

#[test]
fn os_environment_has_highest_precedence() {
    let _guard = env_guard();
    clear_env();

    let temp_dir = TempDir::new().unwrap();
    write_env_file(
        &temp_dir,
        ".env",
        "TICKETING_API_BIND_ADDR=127.0.0.1:3000\nTICKETING_SYNC_RECONCILE_GUARD_SECONDS=30\n",
    );

    unsafe {
        env::set_var("TICKETING_API_BIND_ADDR", "0.0.0.0:9090");
        env::set_var("TICKETING_SYNC_RECONCILE_GUARD_SECONDS", "45");
    }

    let cfg = loader_for(&temp_dir)
        .load()
        .expect("config loads with env override");
    assert_eq!(cfg.api_bind_addr, "0.0.0.0:9090");
    assert_eq!(cfg.sync.reconcile_guard_seconds, 45);

    clear_env();
}

#[test]
fn operator_token_list_is_split_and_trimmed() {
    let _guard = env_guard();
    clear_env();

    unsafe {
        env::set_var("TICKETING_OPERATOR_TOKENS", " first , second,,third ");
        env::set_var("TICKETING_OPERATOR_TOKEN", "ignored-when-list-present");
    }

    let temp_dir = TempDir::new().unwrap();
    let cfg = loader_for(&temp_dir).load().expect("config loads");
    assert_eq!(cfg.operator_tokens, vec!["first", "second", "third"]);

    clear_env();
}

#[test]
fn production_profile_requires_secrets() {
    let _guard = env_guard();
    clear_env();

    unsafe {
        env::set_var("TICKETING_PROFILE", "production");
    }
    let temp_dir = TempDir::new().unwrap();
    let err = loader_for(&temp_dir)
        .load()
        .expect_err("production without a crypto key should fail");
    assert!(matches!(err, ConfigError::MissingCryptoKey));

    unsafe {
        env::set_var("TICKETING_CRYPTO_KEY", KEY_B64);
    }
    let err = loader_for(&temp_dir)
        .load()
        .expect_err("production without operator tokens should fail");
    assert!(matches!(err, ConfigError::MissingOperatorTokens));

    unsafe {
        env::set_var("TICKETING_OPERATOR_TOKEN", "prod-token");
    }
    let cfg = loader_for(&temp_dir).load().expect("production config loads");
    assert_eq!(cfg.profile, "production");

    clear_env();
}

#[test]
fn invalid_crypto_key_is_rejected() {
    let _guard = env_guard();
    clear_env();

    unsafe {
        env::set_var("TICKETING_CRYPTO_KEY", "not base64!");
    }
    let temp_dir = TempDir::new().unwrap();
    let err = loader_for(&temp_dir).load().expect_err("bad key should fail");
    assert!(matches!(err, ConfigError::InvalidCryptoKeyBase64 { .. }));

    unsafe {
        // 16 bytes
        env::set_var("TICKETING_CRYPTO_KEY", "YWFhYWFhYWFhYWFhYWFhYQ==");
    }
    let err = loader_for(&temp_dir).load().expect_err("short key should fail");
    assert!(matches!(
        err,
        ConfigError::InvalidCryptoKeyLength { length: 16 }
    ));

    clear_env();
}

#[test]
fn unparseable_number_names_the_field() {
    let _guard = env_guard();
    clear_env();

    unsafe {
        env::set_var("TICKETING_SYNC_SUGGEST_THRESHOLD", "lots");
    }
    let temp_dir = TempDir::new().unwrap();
    let err = loader_for(&temp_dir).load().expect_err("bad number should fail");
    assert!(format!("{}", err).contains("SYNC_SUGGEST_THRESHOLD"));

    clear_env();
}

#[test]
fn invalid_bind_addr_returns_error() {
    let _guard = env_guard();
    clear_env();

    unsafe {
        env::set_var("TICKETING_API_BIND_ADDR", "not-an-addr");
    }
    let temp_dir = TempDir::new().unwrap();
    let err = loader_for(&temp_dir)
        .load()
        .expect_err("invalid bind addr should fail");
    assert!(format!("{}", err).contains("invalid api bind address 'not-an-addr'"));

    clear_env();
}
