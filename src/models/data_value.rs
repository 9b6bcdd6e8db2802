//! DataValue entity model
//!
//! One timestamped observation for one data field. Rows are only ever inserted.

use super::data_field::Entity as DataField;
use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde_json::Value as JsonValue;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "data_values")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Field this observation belongs to
    pub data_field_id: Uuid,

    /// Scalar, array of scalars, or arbitrary JSON
    #[sea_orm(column_type = "JsonBinary")]
    pub value: JsonValue,

    /// Shared by every value written in the same sync batch
    pub synced_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "DataField",
        from = "Column::DataFieldId",
        to = "super::data_field::Column::Id"
    )]
    DataField,
}

impl Related<DataField> for Entity {
    fn to() -> RelationDef {
        Relation::DataField.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
