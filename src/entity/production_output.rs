use sea_orm::{entity::prelude::*, ActiveValue::NotSet, Set};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "production_output")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub production_order_id: i32,
    pub product_id: i32,
    pub qty: i64,
    pub batch_no: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::production_order::Entity",
        from = "Column::ProductionOrderId",
        to = "super::production_order::Column::Id"
    )]
    ProductionOrder,
    #[sea_orm(
        belongs_to = "super::product::Entity",
        from = "Column::ProductId",
        to = "super::product::Column::Id"
    )]
    Product,
}

impl ActiveModelBehavior for ActiveModel {}

impl ActiveModel {
    pub fn new(
        production_order_id: i32,
        product_id: i32,
        qty: i64,
        batch_no: Option<String>,
    ) -> Self {
        Self {
            id: NotSet,
            production_order_id: Set(production_order_id),
            product_id: Set(product_id),
            qty: Set(qty),
            batch_no: Set(batch_no),
        }
    }
}
