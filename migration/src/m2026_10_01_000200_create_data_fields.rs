//! Migration to create the data_fields table.
//!
//! A data field is a named, path-addressed extraction point owned by one
//! integration.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(DataFields::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(DataFields::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(DataFields::IntegrationId).uuid().not_null())
                    .col(ColumnDef::new(DataFields::Name).text().not_null())
                    .col(ColumnDef::new(DataFields::Path).text().not_null())
                    .col(
                        ColumnDef::new(DataFields::DataType)
                            .text()
                            .not_null()
                            .default("string"),
                    )
                    .col(
                        ColumnDef::new(DataFields::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(DataFields::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_data_fields_integration_id")
                            .from(DataFields::Table, DataFields::IntegrationId)
                            .to(Integrations::Table, Integrations::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_data_fields_integration_path")
                    .table(DataFields::Table)
                    .col(DataFields::IntegrationId)
                    .col(DataFields::Path)
                    .unique()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_data_fields_integration_path")
                    .to_owned(),
            )
            .await?;

        manager
            .drop_table(Table::drop().table(DataFields::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum DataFields {
    Table,
    Id,
    IntegrationId,
    Name,
    Path,
    DataType,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Integrations {
    Table,
    Id,
}
