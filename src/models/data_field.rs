//! DataField entity model
//!
//! A named, path-addressed extraction point owned by one integration.

use super::integration::Entity as Integration;
use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "data_fields")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Owning integration
    pub integration_id: Uuid,

    /// Variable name used by formulas
    pub name: String,

    /// Dot-notation path, may contain `[]` array markers
    pub path: String,

    /// Declared type (string|number|boolean|date|object|array)
    pub data_type: String,

    pub created_at: DateTimeWithTimeZone,

    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "Integration",
        from = "Column::IntegrationId",
        to = "super::integration::Column::Id"
    )]
    Integration,
    #[sea_orm(has_many = "super::data_value::Entity")]
    DataValue,
}

impl Related<Integration> for Entity {
    fn to() -> RelationDef {
        Relation::Integration.def()
    }
}

impl Related<super::data_value::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::DataValue.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
