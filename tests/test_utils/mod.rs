//! Test utilities for database testing.
//!
//! This module provides utilities for setting up in-memory SQLite databases
//! with migrations applied, plus fixtures for integrations and their fields.

#![allow(dead_code)]

use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};
use kpi_sync::adapters::{Adapter, AdapterMetadata, Registry};
use kpi_sync::config::HttpConfig;
use kpi_sync::crypto::AesGcmCredentialStore;
use kpi_sync::models::{DataType, data_field, integration};
use kpi_sync::repositories::{DataFieldRepository, IntegrationRepository, NewIntegration};
use kpi_sync::scheduler::{RetryPolicy, Scheduler};
use kpi_sync::sync_engine::SyncEngine;
use migration::{Migrator, MigratorTrait};
use sea_orm::{ActiveModelTrait, Database, DatabaseConnection, EntityTrait, IntoActiveModel, Set};
use serde_json::Value;
use uuid::Uuid;

/// Sets up an in-memory SQLite database with all migrations applied.
pub async fn setup_test_db() -> Result<DatabaseConnection> {
    let db = Database::connect("sqlite::memory:").await?;
    Migrator::up(&db, None).await?;
    Ok(db)
}

/// Registry with the built-in adapters and default HTTP settings.
pub fn builtin_registry() -> Arc<Registry> {
    Arc::new(Registry::with_builtin_adapters(&HttpConfig::default()).expect("registry builds"))
}

/// Built-in registry plus one extra sync-capable adapter under `tag`.
pub fn registry_with(tag: &str, adapter: Arc<dyn Adapter>) -> Arc<Registry> {
    let mut registry =
        Registry::with_builtin_adapters(&HttpConfig::default()).expect("registry builds");
    registry.register(adapter, AdapterMetadata::new(tag, tag, true));
    Arc::new(registry)
}

/// Engine over `db` reading plaintext configuration blobs.
pub fn test_engine(db: &DatabaseConnection, registry: Arc<Registry>) -> SyncEngine {
    let scheduler = Scheduler::new(db.clone(), registry.clone(), RetryPolicy::default());
    SyncEngine::new(
        db.clone(),
        registry,
        Arc::new(AesGcmCredentialStore::default()),
        scheduler,
    )
}

/// Inserts an enabled integration whose configuration is stored as plaintext JSON.
pub async fn insert_integration(
    db: &DatabaseConnection,
    integration_type: &str,
    config: Value,
    sync_interval: Option<i32>,
) -> Result<integration::Model> {
    let repo = IntegrationRepository::new(db.clone());
    let model = repo
        .create(NewIntegration {
            name: format!("{integration_type} fixture"),
            integration_type: integration_type.to_string(),
            config_ciphertext: serde_json::to_vec(&config)?,
            sync_enabled: true,
            sync_interval,
        })
        .await?;
    Ok(model)
}

pub async fn insert_field(
    db: &DatabaseConnection,
    integration_id: Uuid,
    name: &str,
    path: &str,
) -> Result<data_field::Model> {
    let repo = DataFieldRepository::new(db.clone());
    Ok(repo
        .create(integration_id, name, path, DataType::Number)
        .await?)
}

/// Overwrites the scheduling columns of an integration.
pub async fn set_schedule(
    db: &DatabaseConnection,
    integration_id: Uuid,
    sync_enabled: bool,
    next_sync_at: Option<DateTime<Utc>>,
    last_sync: Option<DateTime<Utc>>,
) -> Result<integration::Model> {
    let model = reload(db, integration_id).await?;
    let mut active = model.into_active_model();
    active.sync_enabled = Set(sync_enabled);
    active.next_sync_at = Set(next_sync_at.map(|t| t.fixed_offset()));
    active.last_sync = Set(last_sync.map(|t| t.fixed_offset()));
    Ok(active.update(db).await?)
}

pub async fn reload(db: &DatabaseConnection, integration_id: Uuid) -> Result<integration::Model> {
    integration::Entity::find_by_id(integration_id)
        .one(db)
        .await?
        .ok_or_else(|| anyhow::anyhow!("integration {integration_id} missing"))
}
