//! Purchase orders and goods received.

use chrono::Local;
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, ConnectionTrait, EntityTrait, Set, TransactionTrait};
use tracing::info;

use crate::entity::{
    inventory_txn::TxnType,
    party::PartyRole,
    product,
    purchase_order::{self, PoStatus},
    purchase_order_line,
};
use crate::error::{LedgerError, Result};
use crate::ledger::{self, Movement, Progress};
use crate::master;

#[derive(Debug, Clone)]
pub struct NewPurchaseLine {
    pub product_id: i32,
    pub qty: i64,
    pub unit_cost: Decimal,
}

impl NewPurchaseLine {
    pub fn new(product_id: i32, qty: i64, unit_cost: Decimal) -> Self {
        Self {
            product_id,
            qty,
            unit_cost,
        }
    }
}

/// Quantity of one product arriving against a purchase order.
#[derive(Debug, Clone, Copy)]
pub struct Receipt {
    pub product_id: i32,
    pub qty: i64,
}

/// Creates an `OPEN` purchase order with its lines.
pub async fn create_purchase_order<C>(
    conn: &C,
    supplier_id: i32,
    lines: Vec<NewPurchaseLine>,
) -> Result<purchase_order::Model>
where
    C: ConnectionTrait + TransactionTrait,
{
    if lines.is_empty() {
        return Err(LedgerError::EmptyDocument("purchase order"));
    }
    for line in &lines {
        if line.qty <= 0 {
            return Err(LedgerError::InvalidQuantity(line.qty));
        }
        if line.unit_cost.is_sign_negative() {
            return Err(LedgerError::ConstraintViolation(format!(
                "unit cost {} is negative",
                line.unit_cost
            )));
        }
    }

    let txn = conn.begin().await?;
    master::party_with_role(&txn, supplier_id, PartyRole::Supplier).await?;
    let po = purchase_order::ActiveModel::new(supplier_id)
        .insert(&txn)
        .await?;
    for line in lines {
        product::Entity::find_by_id(line.product_id)
            .one(&txn)
            .await?
            .ok_or_else(|| LedgerError::not_found("product", line.product_id))?;
        purchase_order_line::ActiveModel::new(po.id, line.product_id, line.qty, line.unit_cost)
            .insert(&txn)
            .await?;
    }
    txn.commit().await?;
    info!(po = po.id, supplier_id, "purchase order created");
    Ok(po)
}

/// Status implied by what has been received so far.
pub fn derive_status(progress: &[Progress]) -> PoStatus {
    if progress.iter().all(Progress::is_complete) {
        PoStatus::Received
    } else if progress.iter().any(|p| p.moved > 0) {
        PoStatus::Partial
    } else {
        PoStatus::Open
    }
}

/// Books a goods-received note: one GRN ledger row per receipt, then the
/// order status follows the received quantities. All or nothing.
pub async fn receive<C>(
    conn: &C,
    po_id: i32,
    receipts: &[Receipt],
    warehouse: &str,
) -> Result<purchase_order::Model>
where
    C: ConnectionTrait + TransactionTrait,
{
    if receipts.is_empty() {
        return Err(LedgerError::EmptyDocument("goods received note"));
    }
    let txn = conn.begin().await?;
    for receipt in receipts {
        ledger::append(
            &txn,
            Movement::new(TxnType::Grn, receipt.product_id, receipt.qty, warehouse, po_id),
        )
        .await?;
    }
    let po = refresh_status(&txn, po_id).await?;
    txn.commit().await?;
    info!(po = po.id, status = ?po.status, receipts = receipts.len(), "goods received");
    Ok(po)
}

/// Receives everything still outstanding on the order.
pub async fn receive_all<C>(conn: &C, po_id: i32, warehouse: &str) -> Result<purchase_order::Model>
where
    C: ConnectionTrait + TransactionTrait,
{
    let receipts: Vec<Receipt> = ledger::progress(conn, TxnType::Grn, po_id)
        .await?
        .into_iter()
        .filter(|p| p.outstanding() > 0)
        .map(|p| Receipt {
            product_id: p.product_id,
            qty: p.outstanding(),
        })
        .collect();
    receive(conn, po_id, &receipts, warehouse).await
}

async fn refresh_status<C: ConnectionTrait>(conn: &C, po_id: i32) -> Result<purchase_order::Model> {
    let po = purchase_order::Entity::find_by_id(po_id)
        .one(conn)
        .await?
        .ok_or_else(|| LedgerError::not_found("purchase order", po_id))?;
    let status = derive_status(&ledger::progress(conn, TxnType::Grn, po_id).await?);
    if po.status == status {
        return Ok(po);
    }
    let mut active: purchase_order::ActiveModel = po.into();
    active.status = Set(status);
    active.updated_at = Set(Local::now().naive_local());
    Ok(active.update(conn).await?)
}
