//! Append-only inventory ledger.
//!
//! Stock is never stored: every balance is a `SUM` over `inventory_txn`
//! computed at read time, so a read always reflects the latest committed
//! append. Rows are inserted through [`append`] and never updated or deleted.

use std::collections::BTreeSet;

use sea_orm::{
    sea_query::{Alias, Expr, SimpleExpr},
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseBackend, EntityTrait,
    FromQueryResult, JoinType, QueryFilter, QueryOrder, QuerySelect, RelationTrait, Select,
    TransactionTrait,
};
use serde::Serialize;
use tracing::debug;

use crate::entity::{
    inventory_txn::{self, RefTable, TxnType},
    product, production_consumption, production_order, production_output, purchase_order,
    purchase_order_line, sales_order, sales_order_line,
};
use crate::error::{LedgerError, Result};

pub const MAIN_WAREHOUSE: &str = "MAIN";

/// A quantity movement to record against an order document.
#[derive(Debug, Clone)]
pub struct Movement {
    pub txn_type: TxnType,
    pub product_id: i32,
    /// Signed delta: positive for inbound types, negative for outbound.
    pub qty: i64,
    pub warehouse: String,
    pub ref_id: i32,
    pub batch_no: Option<String>,
}

impl Movement {
    pub fn new(txn_type: TxnType, product_id: i32, qty: i64, warehouse: &str, ref_id: i32) -> Self {
        Self {
            txn_type,
            product_id,
            qty,
            warehouse: warehouse.to_owned(),
            ref_id,
            batch_no: None,
        }
    }

    pub fn batch(mut self, batch_no: Option<String>) -> Self {
        self.batch_no = batch_no;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, FromQueryResult, Serialize)]
pub struct StockBalance {
    pub product_id: i32,
    pub code: String,
    pub uom: String,
    pub warehouse: String,
    pub on_hand: i64,
}

#[derive(Debug, Clone, Default)]
pub struct BalanceFilter {
    pub product_code: Option<String>,
    pub warehouse: Option<String>,
}

/// `SUM(column)` decoded as a 64-bit integer on every backend.
pub(crate) fn sum_i64(backend: DatabaseBackend, column: impl ColumnTrait) -> SimpleExpr {
    let sum = Expr::col((column.entity_name(), column)).sum();
    match backend {
        // SUM(bigint) is numeric on postgres and decimal on mysql.
        DatabaseBackend::Postgres => sum.cast_as(Alias::new("BIGINT")),
        DatabaseBackend::MySql => sum.cast_as(Alias::new("SIGNED")),
        _ => sum,
    }
}

pub(crate) async fn sum_qty<E, C>(conn: &C, select: Select<E>, column: E::Column) -> Result<i64>
where
    E: EntityTrait,
    C: ConnectionTrait,
{
    let total: Option<Option<i64>> = select
        .select_only()
        .column_as(sum_i64(conn.get_database_backend(), column), "total")
        .into_tuple()
        .one(conn)
        .await?;
    Ok(total.flatten().unwrap_or(0))
}

/// Records one movement. The referenced document row is locked for the
/// duration of the check-then-insert so concurrent appends against the same
/// document cannot overshoot its plan.
pub async fn append<C>(conn: &C, movement: Movement) -> Result<inventory_txn::Model>
where
    C: ConnectionTrait + TransactionTrait,
{
    let Movement {
        txn_type,
        product_id,
        qty,
        ref_id,
        ..
    } = movement;
    if qty == 0 || (qty > 0) != txn_type.is_inbound() {
        return Err(LedgerError::DirectionMismatch { txn_type, qty });
    }
    let requested = qty.checked_abs().ok_or(LedgerError::InvalidQuantity(qty))?;

    let txn = conn.begin().await?;
    product::Entity::find_by_id(product_id)
        .one(&txn)
        .await?
        .ok_or_else(|| LedgerError::not_found("product", product_id))?;
    lock_document(&txn, txn_type.ref_table(), ref_id).await?;

    let planned = planned(&txn, txn_type, ref_id, product_id).await?;
    let moved = moved(&txn, txn_type, ref_id, product_id).await?.saturating_abs();
    if moved.checked_add(requested).map_or(true, |total| total > planned) {
        return Err(LedgerError::ExceedsPlan {
            txn_type,
            ref_id,
            product_id,
            planned,
            moved,
            requested,
        });
    }

    let model = inventory_txn::ActiveModel::new(
        txn_type,
        product_id,
        qty,
        &movement.warehouse,
        ref_id,
        movement.batch_no,
    )
    .insert(&txn)
    .await?;
    txn.commit().await?;
    debug!(
        id = model.id,
        txn_type = ?txn_type,
        product_id,
        qty,
        warehouse = %model.warehouse,
        ref_id,
        "ledger append"
    );
    Ok(model)
}

async fn lock_document<C: ConnectionTrait>(conn: &C, table: RefTable, id: i32) -> Result<()> {
    let found = match table {
        RefTable::Po => purchase_order::Entity::find_by_id(id)
            .lock_exclusive()
            .one(conn)
            .await?
            .is_some(),
        RefTable::Prod => production_order::Entity::find_by_id(id)
            .lock_exclusive()
            .one(conn)
            .await?
            .is_some(),
        RefTable::So => sales_order::Entity::find_by_id(id)
            .lock_exclusive()
            .one(conn)
            .await?
            .is_some(),
    };
    if found {
        Ok(())
    } else {
        Err(LedgerError::not_found(document_name(table), id))
    }
}

pub(crate) fn document_name(table: RefTable) -> &'static str {
    match table {
        RefTable::Po => "purchase order",
        RefTable::Prod => "production order",
        RefTable::So => "sales order",
    }
}

/// Quantity of `product_id` the document's lines allow for this movement type.
pub async fn planned<C: ConnectionTrait>(
    conn: &C,
    txn_type: TxnType,
    ref_id: i32,
    product_id: i32,
) -> Result<i64> {
    match txn_type {
        TxnType::Grn => {
            let select = purchase_order_line::Entity::find()
                .filter(purchase_order_line::Column::PurchaseOrderId.eq(ref_id))
                .filter(purchase_order_line::Column::ProductId.eq(product_id));
            sum_qty(conn, select, purchase_order_line::Column::Qty).await
        }
        TxnType::ProdCons => {
            let select = production_consumption::Entity::find()
                .filter(production_consumption::Column::ProductionOrderId.eq(ref_id))
                .filter(production_consumption::Column::ProductId.eq(product_id));
            sum_qty(conn, select, production_consumption::Column::Qty).await
        }
        TxnType::ProdOut => {
            let select = production_output::Entity::find()
                .filter(production_output::Column::ProductionOrderId.eq(ref_id))
                .filter(production_output::Column::ProductId.eq(product_id));
            sum_qty(conn, select, production_output::Column::Qty).await
        }
        TxnType::Ship => {
            let select = sales_order_line::Entity::find()
                .filter(sales_order_line::Column::SalesOrderId.eq(ref_id))
                .filter(sales_order_line::Column::ProductId.eq(product_id));
            sum_qty(conn, select, sales_order_line::Column::Qty).await
        }
    }
}

/// Signed sum of one document's movements of `txn_type` for `product_id`.
pub async fn moved<C: ConnectionTrait>(
    conn: &C,
    txn_type: TxnType,
    ref_id: i32,
    product_id: i32,
) -> Result<i64> {
    let select = inventory_txn::Entity::find()
        .filter(inventory_txn::Column::TxnType.eq(txn_type))
        .filter(inventory_txn::Column::RefTable.eq(txn_type.ref_table()))
        .filter(inventory_txn::Column::RefId.eq(ref_id))
        .filter(inventory_txn::Column::ProductId.eq(product_id));
    sum_qty(conn, select, inventory_txn::Column::Qty).await
}

/// Planned versus moved quantity of one product on one document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Progress {
    pub product_id: i32,
    pub planned: i64,
    /// Magnitude of what has been moved so far.
    pub moved: i64,
}

impl Progress {
    pub fn is_complete(&self) -> bool {
        self.moved >= self.planned
    }

    pub fn outstanding(&self) -> i64 {
        (self.planned - self.moved).max(0)
    }
}

/// Progress of every product on the document for `txn_type`, by product id.
/// Products moved against the document without a line show up with a plan of 0.
pub async fn progress<C: ConnectionTrait>(
    conn: &C,
    txn_type: TxnType,
    ref_id: i32,
) -> Result<Vec<Progress>> {
    let line_ids: Vec<i32> = match txn_type {
        TxnType::Grn => {
            purchase_order_line::Entity::find()
                .select_only()
                .column(purchase_order_line::Column::ProductId)
                .filter(purchase_order_line::Column::PurchaseOrderId.eq(ref_id))
                .distinct()
                .order_by_asc(purchase_order_line::Column::ProductId)
                .into_tuple()
                .all(conn)
                .await?
        }
        TxnType::ProdCons => {
            production_consumption::Entity::find()
                .select_only()
                .column(production_consumption::Column::ProductId)
                .filter(production_consumption::Column::ProductionOrderId.eq(ref_id))
                .distinct()
                .order_by_asc(production_consumption::Column::ProductId)
                .into_tuple()
                .all(conn)
                .await?
        }
        TxnType::ProdOut => {
            production_output::Entity::find()
                .select_only()
                .column(production_output::Column::ProductId)
                .filter(production_output::Column::ProductionOrderId.eq(ref_id))
                .distinct()
                .order_by_asc(production_output::Column::ProductId)
                .into_tuple()
                .all(conn)
                .await?
        }
        TxnType::Ship => {
            sales_order_line::Entity::find()
                .select_only()
                .column(sales_order_line::Column::ProductId)
                .filter(sales_order_line::Column::SalesOrderId.eq(ref_id))
                .distinct()
                .order_by_asc(sales_order_line::Column::ProductId)
                .into_tuple()
                .all(conn)
                .await?
        }
    };

    let moved_ids: Vec<i32> = inventory_txn::Entity::find()
        .select_only()
        .column(inventory_txn::Column::ProductId)
        .filter(inventory_txn::Column::TxnType.eq(txn_type))
        .filter(inventory_txn::Column::RefTable.eq(txn_type.ref_table()))
        .filter(inventory_txn::Column::RefId.eq(ref_id))
        .distinct()
        .into_tuple()
        .all(conn)
        .await?;
    let product_ids: BTreeSet<i32> = line_ids.into_iter().chain(moved_ids).collect();

    let mut out = Vec::with_capacity(product_ids.len());
    for product_id in product_ids {
        out.push(Progress {
            product_id,
            planned: planned(conn, txn_type, ref_id, product_id).await?,
            moved: moved(conn, txn_type, ref_id, product_id).await?.saturating_abs(),
        });
    }
    Ok(out)
}

/// Current stock on hand of `product_id` at `warehouse`.
pub async fn stock<C: ConnectionTrait>(conn: &C, product_id: i32, warehouse: &str) -> Result<i64> {
    let select = inventory_txn::Entity::find()
        .filter(inventory_txn::Column::ProductId.eq(product_id))
        .filter(inventory_txn::Column::Warehouse.eq(warehouse));
    sum_qty(conn, select, inventory_txn::Column::Qty).await
}

/// One balance per (product, warehouse) that has at least one movement.
pub async fn balances<C: ConnectionTrait>(
    conn: &C,
    filter: &BalanceFilter,
) -> Result<Vec<StockBalance>> {
    let mut select = inventory_txn::Entity::find()
        .select_only()
        .column(inventory_txn::Column::ProductId)
        .column_as(product::Column::Code, "code")
        .column_as(product::Column::Uom, "uom")
        .column(inventory_txn::Column::Warehouse)
        .column_as(
            sum_i64(conn.get_database_backend(), inventory_txn::Column::Qty),
            "on_hand",
        )
        .join(JoinType::InnerJoin, inventory_txn::Relation::Product.def())
        .group_by(inventory_txn::Column::ProductId)
        .group_by(product::Column::Code)
        .group_by(product::Column::Uom)
        .group_by(inventory_txn::Column::Warehouse)
        .order_by_asc(product::Column::Code)
        .order_by_asc(inventory_txn::Column::Warehouse);
    if let Some(code) = &filter.product_code {
        select = select.filter(product::Column::Code.eq(code.as_str()));
    }
    if let Some(warehouse) = &filter.warehouse {
        select = select.filter(inventory_txn::Column::Warehouse.eq(warehouse.as_str()));
    }
    Ok(select.into_model::<StockBalance>().all(conn).await?)
}

/// Every movement recorded against one document, oldest first.
pub async fn document_movements<C: ConnectionTrait>(
    conn: &C,
    table: RefTable,
    ref_id: i32,
) -> Result<Vec<inventory_txn::Model>> {
    Ok(inventory_txn::Entity::find()
        .filter(inventory_txn::Column::RefTable.eq(table))
        .filter(inventory_txn::Column::RefId.eq(ref_id))
        .order_by_asc(inventory_txn::Column::Id)
        .all(conn)
        .await?)
}
