//! Production runs: raw material consumed, finished goods produced.

use sea_orm::{ActiveModelTrait, ConnectionTrait, EntityTrait, TransactionTrait};
use tracing::info;

use crate::entity::{
    inventory_txn::TxnType,
    product,
    production_consumption,
    production_order::{self, ProdStatus},
    production_output,
};
use crate::error::{LedgerError, Result};
use crate::ledger::{self, Movement};

#[derive(Debug, Clone)]
pub struct NewProductionOrder {
    pub status: ProdStatus,
    pub notes: Option<String>,
    /// (product id, quantity consumed)
    pub consumption: Vec<(i32, i64)>,
    pub output: Vec<NewOutput>,
}

#[derive(Debug, Clone)]
pub struct NewOutput {
    pub product_id: i32,
    pub qty: i64,
    pub batch_no: Option<String>,
}

impl NewOutput {
    pub fn new(product_id: i32, qty: i64, batch_no: &str) -> Self {
        Self {
            product_id,
            qty,
            batch_no: Some(batch_no.to_owned()),
        }
    }
}

async fn ensure_product<C: ConnectionTrait>(conn: &C, product_id: i32) -> Result<()> {
    product::Entity::find_by_id(product_id)
        .one(conn)
        .await?
        .ok_or_else(|| LedgerError::not_found("product", product_id))?;
    Ok(())
}

/// Creates an `IN_PROGRESS` or `DONE` order with its consumption and output
/// lines and posts the whole run to the ledger: `PROD_CONS` (negative) for every consumption line
/// and `PROD_OUT` (positive, batch tagged) for every output line.
pub async fn create_production_order<C>(
    conn: &C,
    new: NewProductionOrder,
    warehouse: &str,
) -> Result<production_order::Model>
where
    C: ConnectionTrait + TransactionTrait,
{
    if new.consumption.is_empty() && new.output.is_empty() {
        return Err(LedgerError::EmptyDocument("production order"));
    }
    if let Some(&(_, qty)) = new.consumption.iter().find(|(_, qty)| *qty <= 0) {
        return Err(LedgerError::InvalidQuantity(qty));
    }
    if let Some(out) = new.output.iter().find(|out| out.qty <= 0) {
        return Err(LedgerError::InvalidQuantity(out.qty));
    }
    // Posting moves stock at once, so the run must already be under way.
    if new.status == ProdStatus::Planned {
        return Err(LedgerError::InvalidState {
            document: "new production order",
            id: 0,
            status: format!("{:?}", new.status),
        });
    }

    let txn = conn.begin().await?;
    let order = production_order::ActiveModel::new(new.status, new.notes)
        .insert(&txn)
        .await?;

    for &(product_id, qty) in &new.consumption {
        ensure_product(&txn, product_id).await?;
        production_consumption::ActiveModel::new(order.id, product_id, qty)
            .insert(&txn)
            .await?;
    }
    for out in &new.output {
        ensure_product(&txn, out.product_id).await?;
        production_output::ActiveModel::new(order.id, out.product_id, out.qty, out.batch_no.clone())
            .insert(&txn)
            .await?;
    }

    for (product_id, qty) in new.consumption {
        ledger::append(
            &txn,
            Movement::new(TxnType::ProdCons, product_id, -qty, warehouse, order.id),
        )
        .await?;
    }
    for out in new.output {
        ledger::append(
            &txn,
            Movement::new(TxnType::ProdOut, out.product_id, out.qty, warehouse, order.id)
                .batch(out.batch_no),
        )
        .await?;
    }
    txn.commit().await?;
    info!(prod = order.id, status = ?order.status, "production order posted");
    Ok(order)
}
