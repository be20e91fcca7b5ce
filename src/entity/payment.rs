use chrono::Local;
use sea_orm::{entity::prelude::*, ActiveValue::NotSet, Set};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    #[sea_orm(string_value = "UNPAID")]
    Unpaid,
    #[sea_orm(string_value = "PARTIAL")]
    Partial,
    #[sea_orm(string_value = "PAID")]
    Paid,
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "payment")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    #[sea_orm(unique)]
    pub sales_order_id: i32,
    pub status: PaymentStatus,
    #[sea_orm(column_type = "Decimal(Some((14, 2)))", nullable)]
    pub amount: Option<Decimal>,
    pub paid_date: Option<Date>,
    pub created_at: DateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::sales_order::Entity",
        from = "Column::SalesOrderId",
        to = "super::sales_order::Column::Id"
    )]
    SalesOrder,
}

impl ActiveModelBehavior for ActiveModel {}

impl ActiveModel {
    pub fn new(
        sales_order_id: i32,
        status: PaymentStatus,
        amount: Option<Decimal>,
        paid_date: Option<Date>,
    ) -> Self {
        Self {
            id: NotSet,
            sales_order_id: Set(sales_order_id),
            status: Set(status),
            amount: Set(amount),
            paid_date: Set(paid_date),
            created_at: Set(Local::now().naive_local()),
        }
    }
}
