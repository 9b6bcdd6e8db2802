//! Migration to create the data_values table.
//!
//! Append-only observations; the newest row per field (by `synced_at`) is the
//! current value. There is no foreign key to data_fields: deleting a field
//! leaves its values in place for external cleanup.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(DataValues::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(DataValues::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(DataValues::DataFieldId).uuid().not_null())
                    .col(ColumnDef::new(DataValues::Value).json_binary().not_null())
                    .col(
                        ColumnDef::new(DataValues::SyncedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_data_values_field_synced")
                    .table(DataValues::Table)
                    .col(DataValues::DataFieldId)
                    .col(DataValues::SyncedAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_data_values_field_synced")
                    .to_owned(),
            )
            .await?;

        manager
            .drop_table(Table::drop().table(DataValues::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum DataValues {
    Table,
    Id,
    DataFieldId,
    Value,
    SyncedAt,
}
