use chrono::Local;
use sea_orm::{entity::prelude::*, ActiveValue::NotSet, Set};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProdStatus {
    #[sea_orm(string_value = "PLANNED")]
    Planned,
    #[sea_orm(string_value = "IN_PROGRESS")]
    InProgress,
    #[sea_orm(string_value = "DONE")]
    Done,
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "production_order")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub status: ProdStatus,
    pub notes: Option<String>,
    pub updated_at: DateTime,
    pub created_at: DateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl ActiveModel {
    pub fn new(status: ProdStatus, notes: Option<String>) -> Self {
        let create_at = Local::now().naive_local();
        Self {
            id: NotSet,
            status: Set(status),
            notes: Set(notes),
            updated_at: Set(create_at),
            created_at: Set(create_at),
        }
    }
}
