//! # DataValue Repository
//!
//! Append-only storage of observed field values. The newest row per field by
//! `synced_at` is that field's current value.

use chrono::{DateTime, Utc};
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
    TransactionTrait,
};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::error::{StoreError, map_db_err};
use crate::models::data_field;
use crate::models::data_value::{ActiveModel, Column, Entity, Model};

/// Repository for data value database operations
#[derive(Clone)]
pub struct DataValueRepository {
    db: DatabaseConnection,
}

impl DataValueRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Insert one value per field in a single multi-row statement, all sharing
    /// `synced_at`. Returns the number of rows written.
    pub async fn insert_batch(
        &self,
        values: Vec<(Uuid, JsonValue)>,
        synced_at: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        if values.is_empty() {
            return Ok(0);
        }

        let synced_at = synced_at.fixed_offset();
        let rows: Vec<ActiveModel> = values
            .into_iter()
            .map(|(data_field_id, value)| ActiveModel {
                id: Set(Uuid::new_v4()),
                data_field_id: Set(data_field_id),
                value: Set(value),
                synced_at: Set(synced_at),
            })
            .collect();
        let count = rows.len() as u64;

        let txn = self
            .db
            .begin()
            .await
            .map_err(|e| map_db_err("begin data value transaction", e))?;
        Entity::insert_many(rows)
            .exec_without_returning(&txn)
            .await
            .map_err(|e| map_db_err("insert data values", e))?;
        txn.commit()
            .await
            .map_err(|e| map_db_err("commit data values", e))?;

        Ok(count)
    }

    /// Current value of each field of an integration. Fields without any
    /// value are omitted.
    pub async fn latest_for_integration(
        &self,
        integration_id: Uuid,
    ) -> Result<Vec<(data_field::Model, Model)>, StoreError> {
        let fields = data_field::Entity::find()
            .filter(data_field::Column::IntegrationId.eq(integration_id))
            .order_by_asc(data_field::Column::Path)
            .all(&self.db)
            .await
            .map_err(|e| map_db_err("list data fields", e))?;

        let mut current = Vec::with_capacity(fields.len());
        for field in fields {
            let latest = Entity::find()
                .filter(Column::DataFieldId.eq(field.id))
                .order_by_desc(Column::SyncedAt)
                .one(&self.db)
                .await
                .map_err(|e| map_db_err("find latest data value", e))?;
            if let Some(value) = latest {
                current.push((field, value));
            }
        }
        Ok(current)
    }
}
