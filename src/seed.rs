//! Demo data for a paper-plate plant, wired through the ledger.
//!
//! Masters are idempotent (products upsert by code, parties find-or-create by
//! name). Each document group (purchase orders, production orders, sales
//! orders with payments) is seeded only when its table is empty, inside one
//! transaction per group. A second run therefore changes nothing.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use sea_orm::{
    ConnectionTrait, DatabaseConnection, DatabaseTransaction, EntityTrait, PaginatorTrait,
    TransactionTrait,
};
use serde_json::json;
use tracing::{info, warn};

use crate::entity::{
    inventory_txn,
    party::PartyRole,
    payment::PaymentStatus,
    product::FinishedKind,
    production_order::{self, ProdStatus},
    purchase_order,
    sales_order::{self, OrderStatus},
    schema_setup,
};
use crate::error::LedgerError;
use crate::ledger::MAIN_WAREHOUSE;
use crate::master::{self, NewParty, NewProduct};
use crate::production::{self, NewOutput, NewProductionOrder};
use crate::purchasing::{self, NewPurchaseLine, Receipt};
use crate::sales::{self, NewPayment, Shipment};

const PURCHASE_ORDERS: u64 = 3;
const PRODUCTION_ORDERS: u64 = 3;
const SALES_ORDERS: u64 = 3;

#[derive(Debug, Clone)]
pub struct Config {
    warehouse: String,
    strict: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            warehouse: MAIN_WAREHOUSE.to_owned(),
            strict: false,
        }
    }
}

impl From<&super::Args> for Config {
    fn from(args: &super::Args) -> Self {
        match &args.command {
            super::SubCommandArgs::Seed { warehouse, strict } => Self {
                warehouse: warehouse.clone(),
                strict: *strict,
            },
            _ => unreachable!(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupOutcome {
    Seeded(u64),
    /// The table already held this many rows.
    Skipped(u64),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeedReport {
    pub purchase_orders: GroupOutcome,
    pub production_orders: GroupOutcome,
    pub sales_orders: GroupOutcome,
    pub ledger_rows: u64,
}

struct Masters {
    raw_paper: i32,
    raw_kraft: i32,
    plate8: i32,
    plate10: i32,
    sheet12: i32,
    sapco: i32,
    coastal: i32,
    nellore: i32,
    vizag: i32,
}

pub async fn execute<T: Into<Config>>(db: &DatabaseConnection, config: T) -> Result<SeedReport> {
    let config = config.into();
    schema_setup(db, false)
        .await
        .context("Failed to setup schema")?;

    info!("seeding masters (products, parties)");
    let masters = seed_masters(db).await.context("Failed to seed masters")?;

    let purchase_orders = {
        let txn = db.begin().await?;
        let outcome = match guard::<purchase_order::Entity, _>(
            &txn,
            "purchase_order",
            PURCHASE_ORDERS,
            config.strict,
        )
        .await?
        {
            Some(existing) => GroupOutcome::Skipped(existing),
            None => GroupOutcome::Seeded(
                seed_purchase_orders(&txn, &masters, &config.warehouse)
                    .await
                    .context("Failed to seed purchase orders")?,
            ),
        };
        txn.commit().await?;
        outcome
    };

    let production_orders = {
        let txn = db.begin().await?;
        let outcome = match guard::<production_order::Entity, _>(
            &txn,
            "production_order",
            PRODUCTION_ORDERS,
            config.strict,
        )
        .await?
        {
            Some(existing) => GroupOutcome::Skipped(existing),
            None => GroupOutcome::Seeded(
                seed_production_orders(&txn, &masters, &config.warehouse)
                    .await
                    .context("Failed to seed production orders")?,
            ),
        };
        txn.commit().await?;
        outcome
    };

    let sales_orders = {
        let txn = db.begin().await?;
        let outcome = match guard::<sales_order::Entity, _>(
            &txn,
            "sales_order",
            SALES_ORDERS,
            config.strict,
        )
        .await?
        {
            Some(existing) => GroupOutcome::Skipped(existing),
            None => GroupOutcome::Seeded(
                seed_sales_orders(&txn, &masters, &config.warehouse)
                    .await
                    .context("Failed to seed sales orders")?,
            ),
        };
        txn.commit().await?;
        outcome
    };

    let ledger_rows = inventory_txn::Entity::find().count(db).await?;
    info!(ledger_rows, "seed complete");
    Ok(SeedReport {
        purchase_orders,
        production_orders,
        sales_orders,
        ledger_rows,
    })
}

/// `None` when the group's table is empty and may be seeded, otherwise the
/// number of rows already present.
async fn guard<E, C>(
    conn: &C,
    group: &'static str,
    expected: u64,
    strict: bool,
) -> Result<Option<u64>, LedgerError>
where
    E: EntityTrait,
    E::Model: Sync,
    C: ConnectionTrait,
{
    let existing = E::find().count(conn).await?;
    if existing == 0 {
        return Ok(None);
    }
    if existing < expected {
        let err = LedgerError::PartialSeedState {
            group,
            existing,
            expected,
        };
        if strict {
            return Err(err);
        }
        warn!("{err}");
    } else {
        info!(group, existing, "rows exist -> skipping");
    }
    Ok(Some(existing))
}

async fn seed_masters(db: &DatabaseConnection) -> Result<Masters, LedgerError> {
    let raw_paper = master::upsert_product(
        db,
        "RAW-ROLL-100KG",
        NewProduct::raw("Paper Roll 100kg", "KG").attributes(json!({ "gsm": 180 })),
    )
    .await?;
    let raw_kraft = master::upsert_product(
        db,
        "RAW-KRAFT-80GSM",
        NewProduct::raw("Kraft Paper 80gsm", "KG").attributes(json!({ "gsm": 80 })),
    )
    .await?;
    let plate8 = master::upsert_product(
        db,
        "PLATE-8IN-P25",
        NewProduct::finished("8\" Plate Pack (25)", FinishedKind::Plate, "8in", "PACK")
            .attributes(json!({ "pack": 25 })),
    )
    .await?;
    let plate10 = master::upsert_product(
        db,
        "PLATE-10IN-P25",
        NewProduct::finished("10\" Plate Pack (25)", FinishedKind::Plate, "10in", "PACK")
            .attributes(json!({ "pack": 25 })),
    )
    .await?;
    let sheet12 = master::upsert_product(
        db,
        "SHEET-12x12",
        NewProduct::finished("Paper Sheet 12x12in", FinishedKind::Sheet, "12x12in", "SHEET"),
    )
    .await?;

    let sapco = master::find_or_create_party(
        db,
        "SAPCO Papers",
        NewParty::new(PartyRole::Supplier).contact("+911234567890", "sapco@example.com"),
    )
    .await?;
    let coastal = master::find_or_create_party(
        db,
        "Coastal Pulp",
        NewParty::new(PartyRole::Supplier).contact("+919999000111", "coastal@example.com"),
    )
    .await?;
    let nellore = master::find_or_create_party(
        db,
        "Nellore Retail",
        NewParty::new(PartyRole::Customer).contact("+919876543210", "buyer@example.com"),
    )
    .await?;
    let vizag = master::find_or_create_party(
        db,
        "Vizag Mart",
        NewParty::new(PartyRole::Customer).contact("+919123456789", "vizag@example.com"),
    )
    .await?;

    info!(
        products = ?[&raw_paper.code, &raw_kraft.code, &plate8.code, &plate10.code, &sheet12.code],
        parties = ?[&sapco.name, &coastal.name, &nellore.name, &vizag.name],
        "masters ready"
    );
    Ok(Masters {
        raw_paper: raw_paper.id,
        raw_kraft: raw_kraft.id,
        plate8: plate8.id,
        plate10: plate10.id,
        sheet12: sheet12.id,
        sapco: sapco.id,
        coastal: coastal.id,
        nellore: nellore.id,
        vizag: vizag.id,
    })
}

async fn seed_purchase_orders(
    txn: &DatabaseTransaction,
    m: &Masters,
    warehouse: &str,
) -> Result<u64, LedgerError> {
    info!("seeding purchase orders with GRN ledger rows");
    // Fully received.
    let po1 = purchasing::create_purchase_order(
        txn,
        m.sapco,
        vec![
            NewPurchaseLine::new(m.raw_paper, 200, Decimal::new(12, 1)),
            NewPurchaseLine::new(m.raw_kraft, 100, Decimal::new(9, 1)),
        ],
    )
    .await?;
    purchasing::receive_all(txn, po1.id, warehouse).await?;

    // 50 of 150 received.
    let po2 = purchasing::create_purchase_order(
        txn,
        m.coastal,
        vec![NewPurchaseLine::new(m.raw_paper, 150, Decimal::new(125, 2))],
    )
    .await?;
    purchasing::receive(
        txn,
        po2.id,
        &[Receipt {
            product_id: m.raw_paper,
            qty: 50,
        }],
        warehouse,
    )
    .await?;

    let po3 = purchasing::create_purchase_order(
        txn,
        m.sapco,
        vec![NewPurchaseLine::new(m.raw_kraft, 200, Decimal::new(88, 2))],
    )
    .await?;
    purchasing::receive_all(txn, po3.id, warehouse).await?;

    info!(ids = ?[po1.id, po2.id, po3.id], "created purchase orders");
    Ok(PURCHASE_ORDERS)
}

async fn seed_production_orders(
    txn: &DatabaseTransaction,
    m: &Masters,
    warehouse: &str,
) -> Result<u64, LedgerError> {
    info!("seeding production orders with consumption and output");
    let runs = [
        (ProdStatus::Done, "Run A", m.raw_paper, 80, m.plate8, 300, "A-2025-08-17"),
        (ProdStatus::InProgress, "Sheets S batch", m.raw_kraft, 40, m.sheet12, 500, "S-2025-08-17"),
        (ProdStatus::Done, "Run B", m.raw_paper, 30, m.plate10, 100, "B-2025-08-17"),
    ];
    let mut ids = Vec::with_capacity(runs.len());
    for (status, notes, input, used, output, made, batch) in runs {
        let order = production::create_production_order(
            txn,
            NewProductionOrder {
                status,
                notes: Some(notes.to_owned()),
                consumption: vec![(input, used)],
                output: vec![NewOutput::new(output, made, batch)],
            },
            warehouse,
        )
        .await?;
        ids.push(order.id);
    }
    info!(?ids, "created production orders");
    Ok(PRODUCTION_ORDERS)
}

async fn seed_sales_orders(
    txn: &DatabaseTransaction,
    m: &Masters,
    warehouse: &str,
) -> Result<u64, LedgerError> {
    info!("seeding sales orders with SHIP ledger rows and payments");
    // Shipped in full.
    let so1 = sales::create_sales_order(txn, m.nellore, OrderStatus::Confirmed, vec![(m.plate8, 120)])
        .await?;
    sales::ship(
        txn,
        so1.id,
        &[Shipment {
            product_id: m.plate8,
            qty: 120,
        }],
        warehouse,
    )
    .await?;

    // 30 of 60 shipped.
    let so2 = sales::create_sales_order(txn, m.vizag, OrderStatus::Confirmed, vec![(m.plate10, 60)])
        .await?;
    sales::ship(
        txn,
        so2.id,
        &[Shipment {
            product_id: m.plate10,
            qty: 30,
        }],
        warehouse,
    )
    .await?;

    // Not shipped yet.
    let so3 = sales::create_sales_order(txn, m.nellore, OrderStatus::Draft, vec![(m.sheet12, 200)])
        .await?;
    info!(ids = ?[so1.id, so2.id, so3.id], "created sales orders");

    sales::record_payment(
        txn,
        so1.id,
        NewPayment {
            status: PaymentStatus::Partial,
            amount: Some(Decimal::new(120000, 2)),
            paid_date: NaiveDate::from_ymd_opt(2025, 8, 18),
        },
    )
    .await?;
    sales::record_payment(txn, so2.id, NewPayment::unpaid()).await?;
    sales::record_payment(txn, so3.id, NewPayment::unpaid()).await?;
    Ok(SALES_ORDERS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{
        inventory_txn::TxnType, party, payment, product, purchase_order::PoStatus,
        purchase_order_line, test_db,
    };
    use crate::ledger;
    use sea_orm::{ColumnTrait, QueryFilter};

    async fn stock_of(db: &DatabaseConnection, code: &str) -> i64 {
        let product = master::find_product(db, code).await.unwrap().unwrap();
        ledger::stock(db, product.id, MAIN_WAREHOUSE).await.unwrap()
    }

    #[tokio::test]
    async fn seed_builds_expected_stock() {
        let db = test_db().await;
        let report = execute(&db, Config::default()).await.unwrap();
        assert_eq!(report.purchase_orders, GroupOutcome::Seeded(3));
        assert_eq!(report.production_orders, GroupOutcome::Seeded(3));
        assert_eq!(report.sales_orders, GroupOutcome::Seeded(3));
        // 4 GRN + 6 production + 2 SHIP
        assert_eq!(report.ledger_rows, 12);

        assert_eq!(stock_of(&db, "RAW-ROLL-100KG").await, 140);
        assert_eq!(stock_of(&db, "RAW-KRAFT-80GSM").await, 260);
        assert_eq!(stock_of(&db, "PLATE-8IN-P25").await, 180);
        assert_eq!(stock_of(&db, "PLATE-10IN-P25").await, 70);
        assert_eq!(stock_of(&db, "SHEET-12x12").await, 500);
        assert_eq!(payment::Entity::find().count(&db).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn second_run_duplicates_nothing() {
        let db = test_db().await;
        execute(&db, Config::default()).await.unwrap();
        let products = product::Entity::find().count(&db).await.unwrap();
        let parties = party::Entity::find().count(&db).await.unwrap();

        let report = execute(&db, Config::default()).await.unwrap();
        assert_eq!(report.purchase_orders, GroupOutcome::Skipped(3));
        assert_eq!(report.production_orders, GroupOutcome::Skipped(3));
        assert_eq!(report.sales_orders, GroupOutcome::Skipped(3));
        assert_eq!(report.ledger_rows, 12);
        assert_eq!(product::Entity::find().count(&db).await.unwrap(), products);
        assert_eq!(party::Entity::find().count(&db).await.unwrap(), parties);
        assert_eq!((products, parties), (5, 4));
    }

    #[tokio::test]
    async fn purchase_order_status_matches_receipts() {
        let db = test_db().await;
        execute(&db, Config::default()).await.unwrap();

        for po in purchase_order::Entity::find().all(&db).await.unwrap() {
            let lines = purchase_order_line::Entity::find()
                .filter(purchase_order_line::Column::PurchaseOrderId.eq(po.id))
                .all(&db)
                .await
                .unwrap();
            let ordered: i64 = lines.iter().map(|l| l.qty).sum();
            let mut received = 0;
            let mut short = false;
            for line in &lines {
                let got = ledger::moved(&db, TxnType::Grn, po.id, line.product_id)
                    .await
                    .unwrap();
                received += got;
                short |= got < line.qty;
            }
            match po.status {
                PoStatus::Received => assert_eq!(received, ordered),
                PoStatus::Partial => assert!(short),
                PoStatus::Open => panic!("seeded purchase order {} left open", po.id),
            }
        }
    }

    #[tokio::test]
    async fn failing_group_leaves_no_documents_or_movements() {
        let db = test_db().await;
        // The second purchase order names this party as supplier, so the
        // group fails after the first order has been created and received.
        master::find_or_create_party(&db, "Coastal Pulp", NewParty::new(PartyRole::Customer))
            .await
            .unwrap();

        let err = execute(&db, Config::default()).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<LedgerError>(),
            Some(LedgerError::RoleMismatch { .. })
        ));
        assert_eq!(purchase_order::Entity::find().count(&db).await.unwrap(), 0);
        assert_eq!(purchase_order_line::Entity::find().count(&db).await.unwrap(), 0);
        assert_eq!(inventory_txn::Entity::find().count(&db).await.unwrap(), 0);
        assert_eq!(production_order::Entity::find().count(&db).await.unwrap(), 0);
        // Masters are written outside the group transactions.
        assert_eq!(product::Entity::find().count(&db).await.unwrap(), 5);
    }

    #[tokio::test]
    async fn partial_group_is_skipped_or_rejected() {
        let db = test_db().await;
        let supplier = master::find_or_create_party(&db, "SAPCO Papers", NewParty::new(PartyRole::Supplier))
            .await
            .unwrap();
        let paper = master::upsert_product(&db, "RAW-ROLL-100KG", NewProduct::raw("Paper Roll 100kg", "KG"))
            .await
            .unwrap();
        purchasing::create_purchase_order(
            &db,
            supplier.id,
            vec![NewPurchaseLine::new(paper.id, 10, Decimal::ONE)],
        )
        .await
        .unwrap();

        let strict = Config {
            strict: true,
            ..Config::default()
        };
        let err = execute(&db, strict).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<LedgerError>(),
            Some(LedgerError::PartialSeedState {
                existing: 1,
                expected: 3,
                ..
            })
        ));

        let report = execute(&db, Config::default()).await.unwrap();
        assert_eq!(report.purchase_orders, GroupOutcome::Skipped(1));
        assert_eq!(report.sales_orders, GroupOutcome::Seeded(3));
        // Production ran without any receipts, so raw paper went negative.
        assert_eq!(stock_of(&db, "RAW-ROLL-100KG").await, -110);
    }
}
