//! Migration to create the integrations table.
//!
//! Integrations are configured data sources. Besides the opaque encrypted
//! configuration blob they carry the scheduling state mutated by every sync
//! attempt (status, retry count, next due time).

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Integrations::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Integrations::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Integrations::Name).text().not_null())
                    .col(
                        ColumnDef::new(Integrations::IntegrationType)
                            .text()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Integrations::ConfigCiphertext)
                            .binary()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Integrations::Status)
                            .text()
                            .not_null()
                            .default("pending"),
                    )
                    .col(
                        ColumnDef::new(Integrations::SyncEnabled)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(ColumnDef::new(Integrations::SyncInterval).integer().null())
                    .col(
                        ColumnDef::new(Integrations::RetryCount)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Integrations::NextSyncAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Integrations::LastSync)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Integrations::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Integrations::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        // Supports the due-for-sync poll
        manager
            .create_index(
                Index::create()
                    .name("idx_integrations_due")
                    .table(Integrations::Table)
                    .col(Integrations::SyncEnabled)
                    .col(Integrations::NextSyncAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(Index::drop().name("idx_integrations_due").to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(Integrations::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Integrations {
    Table,
    Id,
    Name,
    IntegrationType,
    ConfigCiphertext,
    Status,
    SyncEnabled,
    SyncInterval,
    RetryCount,
    NextSyncAt,
    LastSync,
    CreatedAt,
    UpdatedAt,
}
