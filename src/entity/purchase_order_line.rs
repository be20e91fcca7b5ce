use sea_orm::{entity::prelude::*, ActiveValue::NotSet, Set};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "purchase_order_line")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub purchase_order_id: i32,
    pub product_id: i32,
    pub qty: i64,
    #[sea_orm(column_type = "Decimal(Some((12, 4)))")]
    pub unit_cost: Decimal,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::purchase_order::Entity",
        from = "Column::PurchaseOrderId",
        to = "super::purchase_order::Column::Id"
    )]
    PurchaseOrder,
    #[sea_orm(
        belongs_to = "super::product::Entity",
        from = "Column::ProductId",
        to = "super::product::Column::Id"
    )]
    Product,
}

impl ActiveModelBehavior for ActiveModel {}

impl ActiveModel {
    pub fn new(purchase_order_id: i32, product_id: i32, qty: i64, unit_cost: Decimal) -> Self {
        Self {
            id: NotSet,
            purchase_order_id: Set(purchase_order_id),
            product_id: Set(product_id),
            qty: Set(qty),
            unit_cost: Set(unit_cost),
        }
    }
}
