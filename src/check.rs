//! Read-only audit of the ledger against the documents it references.

use std::collections::HashSet;
use std::fmt;

use sea_orm::{ConnectionTrait, EntityTrait, QueryOrder, QuerySelect};
use serde::Serialize;

use crate::entity::{
    inventory_txn::{self, RefTable, TxnType},
    product, production_order,
    purchase_order::{self, PoStatus},
    sales_order::{self, OrderStatus},
};
use crate::error::Result;
use crate::ledger::{self, Progress};
use crate::purchasing;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Violation {
    DanglingProduct {
        txn_id: i32,
        product_id: i32,
    },
    DanglingDocument {
        txn_id: i32,
        ref_table: RefTable,
        ref_id: i32,
    },
    WrongDirection {
        txn_id: i32,
        txn_type: TxnType,
        qty: i64,
    },
    WrongRefTable {
        txn_id: i32,
        txn_type: TxnType,
        ref_table: RefTable,
    },
    ExceedsPlan {
        txn_type: TxnType,
        ref_id: i32,
        product_id: i32,
        planned: i64,
        moved: i64,
    },
    PoStatusMismatch {
        po_id: i32,
        recorded: PoStatus,
        derived: PoStatus,
    },
    ShippedWhileShort {
        so_id: i32,
    },
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Violation::DanglingProduct { txn_id, product_id } => {
                write!(f, "txn {txn_id}: product {product_id} does not exist")
            }
            Violation::DanglingDocument {
                txn_id,
                ref_table,
                ref_id,
            } => write!(f, "txn {txn_id}: {ref_table:?} {ref_id} does not exist"),
            Violation::WrongDirection {
                txn_id,
                txn_type,
                qty,
            } => write!(f, "txn {txn_id}: {txn_type:?} with quantity {qty}"),
            Violation::WrongRefTable {
                txn_id,
                txn_type,
                ref_table,
            } => write!(f, "txn {txn_id}: {txn_type:?} must not reference {ref_table:?}"),
            Violation::ExceedsPlan {
                txn_type,
                ref_id,
                product_id,
                planned,
                moved,
            } => write!(
                f,
                "{txn_type:?} on document {ref_id}, product {product_id}: moved {moved} of {planned}"
            ),
            Violation::PoStatusMismatch {
                po_id,
                recorded,
                derived,
            } => write!(f, "purchase order {po_id} is {recorded:?} but receipts say {derived:?}"),
            Violation::ShippedWhileShort { so_id } => {
                write!(f, "sales order {so_id} is SHIPPED with lines outstanding")
            }
        }
    }
}

async fn ids<E, C>(conn: &C, id: E::Column) -> Result<HashSet<i32>>
where
    E: EntityTrait,
    C: ConnectionTrait,
{
    let ids: Vec<i32> = E::find()
        .select_only()
        .column(id)
        .into_tuple()
        .all(conn)
        .await?;
    Ok(ids.into_iter().collect())
}

fn exceeded(txn_type: TxnType, ref_id: i32, progress: &[Progress], out: &mut Vec<Violation>) {
    for p in progress.iter().filter(|p| p.moved > p.planned) {
        out.push(Violation::ExceedsPlan {
            txn_type,
            ref_id,
            product_id: p.product_id,
            planned: p.planned,
            moved: p.moved,
        });
    }
}

/// Walks every ledger row and every order document and reports what breaks
/// the ledger invariants. An empty result means the books are consistent.
pub async fn audit<C: ConnectionTrait>(conn: &C) -> Result<Vec<Violation>> {
    let mut violations = Vec::new();

    let products = ids::<product::Entity, _>(conn, product::Column::Id).await?;
    let purchase_orders = ids::<purchase_order::Entity, _>(conn, purchase_order::Column::Id).await?;
    let production_orders =
        ids::<production_order::Entity, _>(conn, production_order::Column::Id).await?;
    let sales_orders = ids::<sales_order::Entity, _>(conn, sales_order::Column::Id).await?;

    let txns = inventory_txn::Entity::find()
        .order_by_asc(inventory_txn::Column::Id)
        .all(conn)
        .await?;
    for txn in &txns {
        if !products.contains(&txn.product_id) {
            violations.push(Violation::DanglingProduct {
                txn_id: txn.id,
                product_id: txn.product_id,
            });
        }
        let documents = match txn.ref_table {
            RefTable::Po => &purchase_orders,
            RefTable::Prod => &production_orders,
            RefTable::So => &sales_orders,
        };
        if !documents.contains(&txn.ref_id) {
            violations.push(Violation::DanglingDocument {
                txn_id: txn.id,
                ref_table: txn.ref_table,
                ref_id: txn.ref_id,
            });
        }
        if txn.qty == 0 || (txn.qty > 0) != txn.txn_type.is_inbound() {
            violations.push(Violation::WrongDirection {
                txn_id: txn.id,
                txn_type: txn.txn_type,
                qty: txn.qty,
            });
        }
        if txn.ref_table != txn.txn_type.ref_table() {
            violations.push(Violation::WrongRefTable {
                txn_id: txn.id,
                txn_type: txn.txn_type,
                ref_table: txn.ref_table,
            });
        }
    }

    for po in purchase_order::Entity::find()
        .order_by_asc(purchase_order::Column::Id)
        .all(conn)
        .await?
    {
        let progress = ledger::progress(conn, TxnType::Grn, po.id).await?;
        exceeded(TxnType::Grn, po.id, &progress, &mut violations);
        let derived = purchasing::derive_status(&progress);
        if derived != po.status {
            violations.push(Violation::PoStatusMismatch {
                po_id: po.id,
                recorded: po.status,
                derived,
            });
        }
    }

    let mut prod_ids: Vec<i32> = production_orders.into_iter().collect();
    prod_ids.sort_unstable();
    for prod_id in prod_ids {
        for txn_type in [TxnType::ProdCons, TxnType::ProdOut] {
            let progress = ledger::progress(conn, txn_type, prod_id).await?;
            exceeded(txn_type, prod_id, &progress, &mut violations);
        }
    }

    for so in sales_order::Entity::find()
        .order_by_asc(sales_order::Column::Id)
        .all(conn)
        .await?
    {
        let progress = ledger::progress(conn, TxnType::Ship, so.id).await?;
        exceeded(TxnType::Ship, so.id, &progress, &mut violations);
        if so.status == OrderStatus::Shipped && !progress.iter().all(Progress::is_complete) {
            violations.push(Violation::ShippedWhileShort { so_id: so.id });
        }
    }

    Ok(violations)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::test_db;
    use crate::seed::{self, Config};
    use sea_orm::{ActiveModelTrait, Set};

    #[tokio::test]
    async fn seeded_books_are_consistent() {
        let db = test_db().await;
        seed::execute(&db, Config::default()).await.unwrap();
        assert_eq!(audit(&db).await.unwrap(), vec![]);
    }

    #[tokio::test]
    async fn rows_written_around_the_ledger_are_flagged() {
        let db = test_db().await;
        seed::execute(&db, Config::default()).await.unwrap();
        let po = purchase_order::Entity::find()
            .order_by_asc(purchase_order::Column::Id)
            .one(&db)
            .await
            .unwrap()
            .unwrap();
        let line = crate::entity::purchase_order_line::Entity::find()
            .order_by_asc(crate::entity::purchase_order_line::Column::Id)
            .one(&db)
            .await
            .unwrap()
            .unwrap();

        // Extra GRN beyond the order, and a shipment with the wrong sign.
        let extra = inventory_txn::ActiveModel::new(TxnType::Grn, line.product_id, 5, "MAIN", po.id, None)
            .insert(&db)
            .await
            .unwrap();
        let mut wrong = inventory_txn::ActiveModel::new(TxnType::Ship, line.product_id, 5, "MAIN", po.id, None);
        wrong.ref_table = Set(RefTable::Po);
        let wrong = wrong.insert(&db).await.unwrap();

        let violations = audit(&db).await.unwrap();
        assert!(violations.contains(&Violation::ExceedsPlan {
            txn_type: TxnType::Grn,
            ref_id: po.id,
            product_id: line.product_id,
            planned: line.qty,
            moved: line.qty + 5,
        }));
        assert!(violations.contains(&Violation::WrongDirection {
            txn_id: wrong.id,
            txn_type: TxnType::Ship,
            qty: 5,
        }));
        assert!(violations.contains(&Violation::WrongRefTable {
            txn_id: wrong.id,
            txn_type: TxnType::Ship,
            ref_table: RefTable::Po,
        }));
        assert!(!violations
            .iter()
            .any(|v| matches!(v, Violation::DanglingDocument { txn_id, .. } if *txn_id == extra.id)));
    }

    #[tokio::test]
    async fn movement_of_unordered_product_is_flagged() {
        let db = test_db().await;
        seed::execute(&db, Config::default()).await.unwrap();
        let po = purchase_order::Entity::find()
            .order_by_asc(purchase_order::Column::Id)
            .one(&db)
            .await
            .unwrap()
            .unwrap();
        let plate8 = crate::master::find_product(&db, "PLATE-8IN-P25")
            .await
            .unwrap()
            .unwrap();

        inventory_txn::ActiveModel::new(TxnType::Grn, plate8.id, 999, "MAIN", po.id, None)
            .insert(&db)
            .await
            .unwrap();

        let violations = audit(&db).await.unwrap();
        assert_eq!(
            violations,
            vec![Violation::ExceedsPlan {
                txn_type: TxnType::Grn,
                ref_id: po.id,
                product_id: plate8.id,
                planned: 0,
                moved: 999,
            }]
        );
    }

    #[tokio::test]
    async fn status_drift_is_flagged() {
        let db = test_db().await;
        seed::execute(&db, Config::default()).await.unwrap();
        let partial = purchase_order::Entity::find()
            .all(&db)
            .await
            .unwrap()
            .into_iter()
            .find(|po| po.status == PoStatus::Partial)
            .unwrap();
        let mut active: purchase_order::ActiveModel = partial.clone().into();
        active.status = Set(PoStatus::Received);
        active.update(&db).await.unwrap();

        let violations = audit(&db).await.unwrap();
        assert_eq!(
            violations,
            vec![Violation::PoStatusMismatch {
                po_id: partial.id,
                recorded: PoStatus::Received,
                derived: PoStatus::Partial,
            }]
        );
    }
}
