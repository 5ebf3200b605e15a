//! # Ticketing Sync Library
//!
//! Keeps ticket listings on external ticketing providers in step with a
//! production's shows: declarative setups, reconciliation, discovery, webhook
//! ingestion, sales polling and provider health.

pub mod activity_log;
pub mod adapters;
pub mod auth;
pub mod broadcast;
pub mod config;
pub mod crypto;
pub mod db;
pub mod discovery;
pub mod engine;
pub mod error;
pub mod handlers;
pub mod health_monitor;
pub mod models;
pub mod provider_health;
pub mod reconciler;
pub mod repositories;
pub mod sales_sync;
pub mod scheduler;
pub mod server;
pub mod telemetry;
pub mod webhook_processor;
pub mod webhook_verification;
pub use migration;
