//! Database migrations for the integration sync service.
//!
//! This module contains all database migrations using SeaORM Migration.

pub use sea_orm_migration::prelude::*;

mod m2026_10_01_000100_create_integrations;
mod m2026_10_01_000200_create_data_fields;
mod m2026_10_01_000300_create_data_values;
mod m2026_10_01_000400_create_sync_logs;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m2026_10_01_000100_create_integrations::Migration),
            Box::new(m2026_10_01_000200_create_data_fields::Migration),
            Box::new(m2026_10_01_000300_create_data_values::Migration),
            Box::new(m2026_10_01_000400_create_sync_logs::Migration),
        ]
    }
}
