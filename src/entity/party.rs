use chrono::Local;
use sea_orm::{entity::prelude::*, ActiveValue::NotSet, Set};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PartyRole {
    #[sea_orm(string_value = "SUPPLIER")]
    Supplier,
    #[sea_orm(string_value = "CUSTOMER")]
    Customer,
}

/// Trading partner. `name` is unique so find-or-create can be a single
/// conflict-aware insert.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "party")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    #[sea_orm(unique)]
    pub name: String,
    pub role: PartyRole,
    pub whatsapp: Option<String>,
    pub email: Option<String>,
    pub updated_at: DateTime,
    pub created_at: DateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl ActiveModel {
    pub fn new(name: &str, role: PartyRole) -> Self {
        let create_at = Local::now().naive_local();
        Self {
            id: NotSet,
            name: Set(name.to_owned()),
            role: Set(role),
            whatsapp: Set(None),
            email: Set(None),
            updated_at: Set(create_at),
            created_at: Set(create_at),
        }
    }
}
