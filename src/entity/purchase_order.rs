use chrono::Local;
use sea_orm::{entity::prelude::*, ActiveValue::NotSet, Set};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PoStatus {
    #[sea_orm(string_value = "OPEN")]
    Open,
    #[sea_orm(string_value = "PARTIAL")]
    Partial,
    #[sea_orm(string_value = "RECEIVED")]
    Received,
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "purchase_order")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub supplier_id: i32,
    pub status: PoStatus,
    pub updated_at: DateTime,
    pub created_at: DateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::party::Entity",
        from = "Column::SupplierId",
        to = "super::party::Column::Id"
    )]
    Supplier,
}

impl ActiveModelBehavior for ActiveModel {}

impl ActiveModel {
    pub fn new(supplier_id: i32) -> Self {
        let create_at = Local::now().naive_local();
        Self {
            id: NotSet,
            supplier_id: Set(supplier_id),
            status: Set(PoStatus::Open),
            updated_at: Set(create_at),
            created_at: Set(create_at),
        }
    }
}
