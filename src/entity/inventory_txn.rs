use chrono::Local;
use sea_orm::{entity::prelude::*, ActiveValue::NotSet, Set};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TxnType {
    /// Goods received against a purchase order.
    #[sea_orm(string_value = "GRN")]
    Grn,
    #[sea_orm(string_value = "PROD_CONS")]
    ProdCons,
    #[sea_orm(string_value = "PROD_OUT")]
    ProdOut,
    #[sea_orm(string_value = "SHIP")]
    Ship,
}

impl TxnType {
    /// Whether the movement adds to stock. Outbound types carry negative quantities.
    pub fn is_inbound(self) -> bool {
        matches!(self, TxnType::Grn | TxnType::ProdOut)
    }

    /// The only document table a movement of this type may reference.
    pub fn ref_table(self) -> RefTable {
        match self {
            TxnType::Grn => RefTable::Po,
            TxnType::ProdCons | TxnType::ProdOut => RefTable::Prod,
            TxnType::Ship => RefTable::So,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(8))")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RefTable {
    #[sea_orm(string_value = "PO")]
    Po,
    #[sea_orm(string_value = "PROD")]
    Prod,
    #[sea_orm(string_value = "SO")]
    So,
}

/// One ledger row. Rows are only ever inserted.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "inventory_txn")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub txn_type: TxnType,
    pub product_id: i32,
    pub qty: i64,
    pub warehouse: String,
    pub ref_table: RefTable,
    pub ref_id: i32,
    pub batch_no: Option<String>,
    pub created_at: DateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
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
        txn_type: TxnType,
        product_id: i32,
        qty: i64,
        warehouse: &str,
        ref_id: i32,
        batch_no: Option<String>,
    ) -> Self {
        Self {
            id: NotSet,
            txn_type: Set(txn_type),
            product_id: Set(product_id),
            qty: Set(qty),
            warehouse: Set(warehouse.to_owned()),
            ref_table: Set(txn_type.ref_table()),
            ref_id: Set(ref_id),
            batch_no: Set(batch_no),
            created_at: Set(Local::now().naive_local()),
        }
    }
}
