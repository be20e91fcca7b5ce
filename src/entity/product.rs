use chrono::Local;
use sea_orm::{entity::prelude::*, ActiveValue::NotSet, Set};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProductType {
    #[sea_orm(string_value = "RAW")]
    Raw,
    #[sea_orm(string_value = "FINISHED")]
    Finished,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FinishedKind {
    #[sea_orm(string_value = "PLATE")]
    Plate,
    #[sea_orm(string_value = "BOWL")]
    Bowl,
    #[sea_orm(string_value = "SHEET")]
    Sheet,
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "product")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    #[sea_orm(unique)]
    pub code: String,
    pub name: String,
    pub product_type: ProductType,
    pub uom: String,
    pub finished_kind: Option<FinishedKind>,
    pub size: Option<String>,
    pub attributes: Option<Json>,
    pub updated_at: DateTime,
    pub created_at: DateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl ActiveModel {
    pub fn new(code: &str) -> Self {
        let create_at = Local::now().naive_local();
        Self {
            id: NotSet,
            code: Set(code.to_owned()),
            name: NotSet,
            product_type: NotSet,
            uom: NotSet,
            finished_kind: Set(None),
            size: Set(None),
            attributes: Set(None),
            updated_at: Set(create_at),
            created_at: Set(create_at),
        }
    }
}
