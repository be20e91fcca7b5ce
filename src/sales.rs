//! Sales orders, shipments and payments.

use chrono::{Local, NaiveDate};
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, ConnectionTrait, EntityTrait, Set, TransactionTrait};
use tracing::info;

use crate::entity::{
    inventory_txn::TxnType,
    party::PartyRole,
    payment::{self, PaymentStatus},
    product,
    sales_order::{self, OrderStatus},
    sales_order_line,
};
use crate::error::{LedgerError, Result};
use crate::ledger::{self, Movement, Progress};
use crate::master;

/// Quantity of one product leaving against a sales order.
#[derive(Debug, Clone, Copy)]
pub struct Shipment {
    pub product_id: i32,
    pub qty: i64,
}

#[derive(Debug, Clone)]
pub struct NewPayment {
    pub status: PaymentStatus,
    pub amount: Option<Decimal>,
    pub paid_date: Option<NaiveDate>,
}

impl NewPayment {
    pub fn unpaid() -> Self {
        Self {
            status: PaymentStatus::Unpaid,
            amount: None,
            paid_date: None,
        }
    }
}

async fn find_order<C: ConnectionTrait>(conn: &C, so_id: i32) -> Result<sales_order::Model> {
    sales_order::Entity::find_by_id(so_id)
        .one(conn)
        .await?
        .ok_or_else(|| LedgerError::not_found("sales order", so_id))
}

fn invalid_state(order: &sales_order::Model) -> LedgerError {
    LedgerError::InvalidState {
        document: "sales order",
        id: order.id,
        status: format!("{:?}", order.status),
    }
}

/// Creates a `DRAFT` or `CONFIRMED` order with its lines. Nothing moves until
/// the order ships.
pub async fn create_sales_order<C>(
    conn: &C,
    customer_id: i32,
    status: OrderStatus,
    lines: Vec<(i32, i64)>,
) -> Result<sales_order::Model>
where
    C: ConnectionTrait + TransactionTrait,
{
    if lines.is_empty() {
        return Err(LedgerError::EmptyDocument("sales order"));
    }
    if let Some(&(_, qty)) = lines.iter().find(|(_, qty)| *qty <= 0) {
        return Err(LedgerError::InvalidQuantity(qty));
    }
    if status == OrderStatus::Shipped {
        return Err(LedgerError::InvalidState {
            document: "new sales order",
            id: 0,
            status: format!("{status:?}"),
        });
    }

    let txn = conn.begin().await?;
    master::party_with_role(&txn, customer_id, PartyRole::Customer).await?;
    let order = sales_order::ActiveModel::new(customer_id, status)
        .insert(&txn)
        .await?;
    for (product_id, qty) in lines {
        product::Entity::find_by_id(product_id)
            .one(&txn)
            .await?
            .ok_or_else(|| LedgerError::not_found("product", product_id))?;
        sales_order_line::ActiveModel::new(order.id, product_id, qty)
            .insert(&txn)
            .await?;
    }
    txn.commit().await?;
    info!(so = order.id, customer_id, status = ?order.status, "sales order created");
    Ok(order)
}

/// Moves a `DRAFT` order to `CONFIRMED`.
pub async fn confirm<C: ConnectionTrait>(conn: &C, so_id: i32) -> Result<sales_order::Model> {
    let order = find_order(conn, so_id).await?;
    if order.status != OrderStatus::Draft {
        return Err(invalid_state(&order));
    }
    let mut active: sales_order::ActiveModel = order.into();
    active.status = Set(OrderStatus::Confirmed);
    active.updated_at = Set(Local::now().naive_local());
    Ok(active.update(conn).await?)
}

/// Ships against a confirmed order: one SHIP ledger row (negative) per
/// shipment. The order turns `SHIPPED` once every line is covered.
pub async fn ship<C>(
    conn: &C,
    so_id: i32,
    shipments: &[Shipment],
    warehouse: &str,
) -> Result<sales_order::Model>
where
    C: ConnectionTrait + TransactionTrait,
{
    if shipments.is_empty() {
        return Err(LedgerError::EmptyDocument("shipment"));
    }
    let txn = conn.begin().await?;
    let order = find_order(&txn, so_id).await?;
    if order.status != OrderStatus::Confirmed {
        return Err(invalid_state(&order));
    }
    for shipment in shipments {
        if shipment.qty <= 0 {
            return Err(LedgerError::InvalidQuantity(shipment.qty));
        }
        ledger::append(
            &txn,
            Movement::new(TxnType::Ship, shipment.product_id, -shipment.qty, warehouse, so_id),
        )
        .await?;
    }

    let progress = ledger::progress(&txn, TxnType::Ship, so_id).await?;
    let order = if progress.iter().all(Progress::is_complete) {
        let mut active: sales_order::ActiveModel = order.into();
        active.status = Set(OrderStatus::Shipped);
        active.updated_at = Set(Local::now().naive_local());
        active.update(&txn).await?
    } else {
        order
    };
    txn.commit().await?;
    info!(so = order.id, status = ?order.status, shipments = shipments.len(), "shipped");
    Ok(order)
}

/// Records the single payment row of a sales order.
pub async fn record_payment<C: ConnectionTrait>(
    conn: &C,
    so_id: i32,
    new: NewPayment,
) -> Result<payment::Model> {
    find_order(conn, so_id).await?;
    match (new.status, new.amount) {
        (_, Some(amount)) if amount.is_sign_negative() => {
            return Err(LedgerError::ConstraintViolation(format!(
                "payment amount {amount} is negative"
            )))
        }
        (PaymentStatus::Partial | PaymentStatus::Paid, None) => {
            return Err(LedgerError::ConstraintViolation(format!(
                "{:?} payment needs an amount",
                new.status
            )))
        }
        _ => {}
    }
    let payment = payment::ActiveModel::new(so_id, new.status, new.amount, new.paid_date)
        .insert(conn)
        .await?;
    info!(so = so_id, status = ?payment.status, "payment recorded");
    Ok(payment)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{inventory_txn, product::FinishedKind, test_db};
    use crate::ledger::MAIN_WAREHOUSE;
    use crate::master::{NewParty, NewProduct};
    use rust_decimal_macros::dec;
    use sea_orm::{DatabaseConnection, PaginatorTrait};

    async fn fixture(db: &DatabaseConnection) -> (i32, i32) {
        let plate10 = master::upsert_product(
            db,
            "PLATE-10IN-P25",
            NewProduct::finished("10\" Plate Pack (25)", FinishedKind::Plate, "10in", "PACK"),
        )
        .await
        .unwrap();
        let customer = master::find_or_create_party(db, "Vizag Mart", NewParty::new(PartyRole::Customer))
            .await
            .unwrap();
        (customer.id, plate10.id)
    }

    #[tokio::test]
    async fn partial_then_full_shipment() {
        let db = test_db().await;
        let (customer, plate10) = fixture(&db).await;
        let order = create_sales_order(&db, customer, OrderStatus::Confirmed, vec![(plate10, 60)])
            .await
            .unwrap();

        let order = ship(
            &db,
            order.id,
            &[Shipment {
                product_id: plate10,
                qty: 30,
            }],
            MAIN_WAREHOUSE,
        )
        .await
        .unwrap();
        assert_eq!(order.status, OrderStatus::Confirmed);
        assert_eq!(ledger::stock(&db, plate10, MAIN_WAREHOUSE).await.unwrap(), -30);

        let order = ship(
            &db,
            order.id,
            &[Shipment {
                product_id: plate10,
                qty: 30,
            }],
            MAIN_WAREHOUSE,
        )
        .await
        .unwrap();
        assert_eq!(order.status, OrderStatus::Shipped);
        assert_eq!(
            ledger::moved(&db, TxnType::Ship, order.id, plate10).await.unwrap(),
            -60
        );
    }

    #[tokio::test]
    async fn over_shipment_is_rejected() {
        let db = test_db().await;
        let (customer, plate10) = fixture(&db).await;
        let order = create_sales_order(&db, customer, OrderStatus::Confirmed, vec![(plate10, 60)])
            .await
            .unwrap();
        let err = ship(
            &db,
            order.id,
            &[Shipment {
                product_id: plate10,
                qty: 61,
            }],
            MAIN_WAREHOUSE,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, LedgerError::ExceedsPlan { planned: 60, requested: 61, .. }));
        assert_eq!(inventory_txn::Entity::find().count(&db).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn draft_orders_do_not_ship_until_confirmed() {
        let db = test_db().await;
        let (customer, plate10) = fixture(&db).await;
        let order = create_sales_order(&db, customer, OrderStatus::Draft, vec![(plate10, 10)])
            .await
            .unwrap();
        let shipment = [Shipment {
            product_id: plate10,
            qty: 10,
        }];
        let err = ship(&db, order.id, &shipment, MAIN_WAREHOUSE)
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidState { .. }));

        confirm(&db, order.id).await.unwrap();
        let order = ship(&db, order.id, &shipment, MAIN_WAREHOUSE).await.unwrap();
        assert_eq!(order.status, OrderStatus::Shipped);
        assert!(matches!(
            confirm(&db, order.id).await.unwrap_err(),
            LedgerError::InvalidState { .. }
        ));
    }

    #[tokio::test]
    async fn create_rejects_supplier_and_shipped_status() {
        let db = test_db().await;
        let (_, plate10) = fixture(&db).await;
        let supplier = master::find_or_create_party(&db, "SAPCO Papers", NewParty::new(PartyRole::Supplier))
            .await
            .unwrap();
        let err = create_sales_order(&db, supplier.id, OrderStatus::Draft, vec![(plate10, 1)])
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::RoleMismatch { .. }));

        let (customer, _) = fixture(&db).await;
        let err = create_sales_order(&db, customer, OrderStatus::Shipped, vec![(plate10, 1)])
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidState { .. }));
        assert_eq!(sales_order::Entity::find().count(&db).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn one_payment_per_order() {
        let db = test_db().await;
        let (customer, plate10) = fixture(&db).await;
        let order = create_sales_order(&db, customer, OrderStatus::Confirmed, vec![(plate10, 60)])
            .await
            .unwrap();

        let paid = record_payment(
            &db,
            order.id,
            NewPayment {
                status: PaymentStatus::Partial,
                amount: Some(dec!(1200.00)),
                paid_date: NaiveDate::from_ymd_opt(2025, 8, 18),
            },
        )
        .await
        .unwrap();
        assert_eq!(paid.amount, Some(dec!(1200.00)));

        let err = record_payment(&db, order.id, NewPayment::unpaid())
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::ConstraintViolation(_)));
        assert_eq!(payment::Entity::find().count(&db).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn payment_amount_rules() {
        let db = test_db().await;
        let (customer, plate10) = fixture(&db).await;
        let order = create_sales_order(&db, customer, OrderStatus::Draft, vec![(plate10, 5)])
            .await
            .unwrap();
        let err = record_payment(
            &db,
            order.id,
            NewPayment {
                status: PaymentStatus::Paid,
                amount: None,
                paid_date: None,
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, LedgerError::ConstraintViolation(_)));

        let err = record_payment(&db, order.id + 1, NewPayment::unpaid())
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::NotFound { entity: "sales order", .. }));
    }
}
