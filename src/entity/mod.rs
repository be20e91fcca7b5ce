use sea_orm::{
    sea_query::Table, ConnectionTrait, DatabaseConnection, DbErr, EntityTrait, Schema,
    TransactionTrait,
};
use tracing::{debug, info};

pub mod inventory_txn;
pub mod party;
pub mod payment;
pub mod product;
pub mod production_consumption;
pub mod production_order;
pub mod production_output;
pub mod purchase_order;
pub mod purchase_order_line;
pub mod sales_order;
pub mod sales_order_line;

async fn _schema_setup<C, E>(conn: &C, entity: E) -> Result<(), DbErr>
where
    C: ConnectionTrait,
    E: EntityTrait,
{
    let backend = conn.get_database_backend();
    let schema = Schema::new(backend);
    let mut create_stmt = schema.create_table_from_entity(entity);
    create_stmt.if_not_exists();
    conn.execute(backend.build(&create_stmt)).await?;
    debug!(table = entity.table_name(), "table ready");
    Ok(())
}

async fn _schema_drop<C, E>(conn: &C, entity: E) -> Result<(), DbErr>
where
    C: ConnectionTrait,
    E: EntityTrait,
{
    let backend = conn.get_database_backend();
    let mut drop_stmt = Table::drop();
    drop_stmt.if_exists().table(entity.table_ref());
    conn.execute(backend.build(&drop_stmt)).await?;
    Ok(())
}

/// Creates every table in foreign-key order inside one transaction. With
/// `reset` the tables are dropped first, dependents before their parents.
pub async fn schema_setup(db: &DatabaseConnection, reset: bool) -> Result<(), DbErr> {
    let txn = db.begin().await?;
    if reset {
        _schema_drop(&txn, inventory_txn::Entity).await?;
        _schema_drop(&txn, payment::Entity).await?;
        _schema_drop(&txn, sales_order_line::Entity).await?;
        _schema_drop(&txn, sales_order::Entity).await?;
        _schema_drop(&txn, production_output::Entity).await?;
        _schema_drop(&txn, production_consumption::Entity).await?;
        _schema_drop(&txn, production_order::Entity).await?;
        _schema_drop(&txn, purchase_order_line::Entity).await?;
        _schema_drop(&txn, purchase_order::Entity).await?;
        _schema_drop(&txn, party::Entity).await?;
        _schema_drop(&txn, product::Entity).await?;
        info!("existing tables dropped");
    }
    _schema_setup(&txn, product::Entity).await?;
    _schema_setup(&txn, party::Entity).await?;
    _schema_setup(&txn, purchase_order::Entity).await?;
    _schema_setup(&txn, purchase_order_line::Entity).await?;
    _schema_setup(&txn, production_order::Entity).await?;
    _schema_setup(&txn, production_consumption::Entity).await?;
    _schema_setup(&txn, production_output::Entity).await?;
    _schema_setup(&txn, sales_order::Entity).await?;
    _schema_setup(&txn, sales_order_line::Entity).await?;
    _schema_setup(&txn, payment::Entity).await?;
    _schema_setup(&txn, inventory_txn::Entity).await?;
    txn.commit().await?;
    info!("schema ready");
    Ok(())
}

#[cfg(test)]
pub(crate) async fn test_db() -> DatabaseConnection {
    use sea_orm::{ConnectOptions, Database};

    // One connection: every pooled connection would get its own in-memory database.
    let mut options = ConnectOptions::new("sqlite::memory:".to_owned());
    options.max_connections(1).sqlx_logging(false);
    let db = Database::connect(options)
        .await
        .expect("Failed to connect to sqlite");
    schema_setup(&db, false)
        .await
        .expect("Failed to setup schema");
    db
}
