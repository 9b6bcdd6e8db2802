//! Migration to create the sync_logs table.
//!
//! One row per sync attempt. Rows are inserted as RUNNING and closed exactly
//! once with a terminal status.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(SyncLogs::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(SyncLogs::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(SyncLogs::IntegrationId).uuid().not_null())
                    .col(
                        ColumnDef::new(SyncLogs::Status)
                            .text()
                            .not_null()
                            .default("RUNNING"),
                    )
                    .col(
                        ColumnDef::new(SyncLogs::StartedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(SyncLogs::CompletedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(ColumnDef::new(SyncLogs::DurationMs).big_integer().null())
                    .col(ColumnDef::new(SyncLogs::RecordsCount).integer().null())
                    .col(ColumnDef::new(SyncLogs::ErrorMessage).text().null())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_sync_logs_integration_id")
                            .from(SyncLogs::Table, SyncLogs::IntegrationId)
                            .to(Integrations::Table, Integrations::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_sync_logs_integration_started")
                    .table(SyncLogs::Table)
                    .col(SyncLogs::IntegrationId)
                    .col(SyncLogs::StartedAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_sync_logs_integration_started")
                    .to_owned(),
            )
            .await?;

        manager
            .drop_table(Table::drop().table(SyncLogs::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum SyncLogs {
    Table,
    Id,
    IntegrationId,
    Status,
    StartedAt,
    CompletedAt,
    DurationMs,
    RecordsCount,
    ErrorMessage,
}

#[derive(DeriveIden)]
enum Integrations {
    Table,
    Id,
}
