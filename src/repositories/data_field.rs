//! # DataField Repository

use std::collections::HashSet;

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
};
use uuid::Uuid;

use crate::adapters::FieldSchema;
use crate::error::{StoreError, is_unique_violation, map_db_err};
use crate::models::DataType;
use crate::models::data_field::{ActiveModel, Column, Entity, Model};

/// Repository for data field database operations
#[derive(Clone)]
pub struct DataFieldRepository {
    db: DatabaseConnection,
}

impl DataFieldRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub async fn create(
        &self,
        integration_id: Uuid,
        name: &str,
        path: &str,
        data_type: DataType,
    ) -> Result<Model, StoreError> {
        let now = Utc::now().fixed_offset();
        ActiveModel {
            id: Set(Uuid::new_v4()),
            integration_id: Set(integration_id),
            name: Set(name.to_string()),
            path: Set(path.to_string()),
            data_type: Set(data_type.as_str().to_string()),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&self.db)
        .await
        .map_err(|e| map_db_err("create data field", e))
    }

    pub async fn list_for_integration(&self, integration_id: Uuid) -> Result<Vec<Model>, StoreError> {
        Entity::find()
            .filter(Column::IntegrationId.eq(integration_id))
            .order_by_asc(Column::CreatedAt)
            .order_by_asc(Column::Path)
            .all(&self.db)
            .await
            .map_err(|e| map_db_err("list data fields", e))
    }

    /// Store discovered fields whose paths are not mapped yet. Returns the
    /// newly created rows.
    pub async fn upsert_discovered(
        &self,
        integration_id: Uuid,
        discovered: &[FieldSchema],
    ) -> Result<Vec<Model>, StoreError> {
        let mut known: HashSet<String> = self
            .list_for_integration(integration_id)
            .await?
            .into_iter()
            .map(|field| field.path)
            .collect();

        let mut created = Vec::new();
        for schema in discovered {
            if !known.insert(schema.path.clone()) {
                continue;
            }
            match self
                .create(integration_id, &schema.name, &schema.path, schema.data_type)
                .await
            {
                Ok(model) => created.push(model),
                // A concurrent discovery stored the same path first.
                Err(StoreError::Database { source, .. }) if is_unique_violation(&source) => {}
                Err(e) => return Err(e),
            }
        }

        tracing::info!(
            integration_id = %integration_id,
            discovered = discovered.len(),
            created = created.len(),
            "Discovered fields stored"
        );
        Ok(created)
    }
}
