//! Products and parties: long-lived reference data, written idempotently.

use chrono::Local;
use sea_orm::{
    sea_query::OnConflict, ColumnTrait, ConnectionTrait, EntityTrait, Insert, PaginatorTrait,
    QueryFilter, QuerySelect, Set,
};
use serde_json::Value;
use tracing::debug;

use crate::entity::{
    party::{self, PartyRole},
    product::{self, FinishedKind, ProductType},
};
use crate::error::{LedgerError, Result};

#[derive(Debug, Clone)]
pub struct NewProduct {
    pub name: String,
    pub product_type: ProductType,
    pub uom: String,
    pub finished_kind: Option<FinishedKind>,
    pub size: Option<String>,
    pub attributes: Option<Value>,
}

impl NewProduct {
    pub fn raw(name: &str, uom: &str) -> Self {
        Self {
            name: name.to_owned(),
            product_type: ProductType::Raw,
            uom: uom.to_owned(),
            finished_kind: None,
            size: None,
            attributes: None,
        }
    }

    pub fn finished(name: &str, kind: FinishedKind, size: &str, uom: &str) -> Self {
        Self {
            name: name.to_owned(),
            product_type: ProductType::Finished,
            uom: uom.to_owned(),
            finished_kind: Some(kind),
            size: Some(size.to_owned()),
            attributes: None,
        }
    }

    pub fn attributes(mut self, attributes: Value) -> Self {
        self.attributes = Some(attributes);
        self
    }
}

#[derive(Debug, Clone)]
pub struct NewParty {
    pub role: PartyRole,
    pub whatsapp: Option<String>,
    pub email: Option<String>,
}

impl NewParty {
    pub fn new(role: PartyRole) -> Self {
        Self {
            role,
            whatsapp: None,
            email: None,
        }
    }

    pub fn contact(mut self, whatsapp: &str, email: &str) -> Self {
        self.whatsapp = Some(whatsapp.to_owned());
        self.email = Some(email.to_owned());
        self
    }
}

pub async fn find_product<C: ConnectionTrait>(conn: &C, code: &str) -> Result<Option<product::Model>> {
    Ok(product::Entity::find()
        .filter(product::Column::Code.eq(code))
        .one(conn)
        .await?)
}

/// Inserts the product or overwrites every attribute of the row holding `code`.
pub async fn upsert_product<C: ConnectionTrait>(
    conn: &C,
    code: &str,
    new: NewProduct,
) -> Result<product::Model> {
    if code.trim().is_empty() {
        return Err(LedgerError::ConstraintViolation(
            "product code must not be empty".to_owned(),
        ));
    }
    if new.product_type == ProductType::Raw && new.finished_kind.is_some() {
        return Err(LedgerError::ConstraintViolation(format!(
            "raw product {code} cannot carry a finished kind"
        )));
    }

    let mut active = product::ActiveModel::new(code);
    active.name = Set(new.name);
    active.product_type = Set(new.product_type);
    active.uom = Set(new.uom);
    active.finished_kind = Set(new.finished_kind);
    active.size = Set(new.size);
    active.attributes = Set(new.attributes);
    active.updated_at = Set(Local::now().naive_local());

    product::Entity::insert(active)
        .on_conflict(
            OnConflict::column(product::Column::Code)
                .update_columns([
                    product::Column::Name,
                    product::Column::ProductType,
                    product::Column::Uom,
                    product::Column::FinishedKind,
                    product::Column::Size,
                    product::Column::Attributes,
                    product::Column::UpdatedAt,
                ])
                .to_owned(),
        )
        .exec_without_returning(conn)
        .await?;
    debug!(code, "product upserted");
    find_product(conn, code)
        .await?
        .ok_or_else(|| LedgerError::not_found("product", code))
}

/// Looks a party up by name. More than one match means the table was created
/// without the unique constraint and two creators raced.
pub async fn find_party<C: ConnectionTrait>(conn: &C, name: &str) -> Result<Option<party::Model>> {
    let mut found = party::Entity::find()
        .filter(party::Column::Name.eq(name))
        .limit(2)
        .all(conn)
        .await?;
    if found.len() > 1 {
        let count = party::Entity::find()
            .filter(party::Column::Name.eq(name))
            .count(conn)
            .await?;
        return Err(LedgerError::RaceDuplicate {
            name: name.to_owned(),
            count,
        });
    }
    Ok(found.pop())
}

/// Insert that leaves an existing row with the same name untouched. MySQL has
/// no `DO NOTHING`, so the conflict clause names the key it may rewrite in place.
fn party_insert(name: &str, new: NewParty) -> Insert<party::ActiveModel> {
    let mut active = party::ActiveModel::new(name, new.role);
    active.whatsapp = Set(new.whatsapp);
    active.email = Set(new.email);
    party::Entity::insert(active).on_conflict(
        OnConflict::column(party::Column::Name)
            .do_nothing_on([party::Column::Id])
            .to_owned(),
    )
}

/// Returns the party called `name`, creating it from `new` when absent. An
/// existing row is returned as is.
pub async fn find_or_create_party<C: ConnectionTrait>(
    conn: &C,
    name: &str,
    new: NewParty,
) -> Result<party::Model> {
    if let Some(existing) = find_party(conn, name).await? {
        return Ok(existing);
    }

    let inserted = party_insert(name, new)
        .exec_without_returning(conn)
        .await?;
    if inserted == 0 {
        debug!(name, "party created concurrently");
    }
    find_party(conn, name)
        .await?
        .ok_or_else(|| LedgerError::not_found("party", name))
}

/// Resolves `party_id` and checks it plays `role`.
pub async fn party_with_role<C: ConnectionTrait>(
    conn: &C,
    party_id: i32,
    role: PartyRole,
) -> Result<party::Model> {
    let party = party::Entity::find_by_id(party_id)
        .one(conn)
        .await?
        .ok_or_else(|| LedgerError::not_found("party", party_id))?;
    if party.role != role {
        return Err(LedgerError::RoleMismatch {
            name: party.name,
            expected: role,
        });
    }
    Ok(party)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::test_db;
    use futures::future::join_all;
    use serde_json::json;

    #[tokio::test]
    async fn upsert_product_updates_in_place() {
        let db = test_db().await;
        let first = upsert_product(
            &db,
            "RAW-ROLL-100KG",
            NewProduct::raw("Paper Roll 100kg", "KG").attributes(json!({ "gsm": 180 })),
        )
        .await
        .unwrap();
        let second = upsert_product(
            &db,
            "RAW-ROLL-100KG",
            NewProduct::raw("Paper Roll 100kg (bleached)", "KG").attributes(json!({ "gsm": 200 })),
        )
        .await
        .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.name, "Paper Roll 100kg (bleached)");
        assert_eq!(second.attributes, Some(json!({ "gsm": 200 })));
        let rows = product::Entity::find()
            .filter(product::Column::Code.eq("RAW-ROLL-100KG"))
            .count(&db)
            .await
            .unwrap();
        assert_eq!(rows, 1);
    }

    #[tokio::test]
    async fn upsert_product_validates_input() {
        let db = test_db().await;
        let err = upsert_product(&db, " ", NewProduct::raw("Blank", "KG"))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::ConstraintViolation(_)));

        let mut bad = NewProduct::raw("Odd roll", "KG");
        bad.finished_kind = Some(FinishedKind::Plate);
        let err = upsert_product(&db, "RAW-ODD", bad).await.unwrap_err();
        assert!(matches!(err, LedgerError::ConstraintViolation(_)));
        assert!(find_product(&db, "RAW-ODD").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn find_or_create_party_keeps_first_row() {
        let db = test_db().await;
        let created = find_or_create_party(
            &db,
            "Nellore Retail",
            NewParty::new(PartyRole::Customer).contact("+919876543210", "buyer@example.com"),
        )
        .await
        .unwrap();
        let again = find_or_create_party(&db, "Nellore Retail", NewParty::new(PartyRole::Supplier))
            .await
            .unwrap();

        assert_eq!(created, again);
        assert_eq!(again.role, PartyRole::Customer);
        assert_eq!(again.email.as_deref(), Some("buyer@example.com"));
        assert_eq!(party::Entity::find().count(&db).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn concurrent_find_or_create_yields_one_party() {
        let db = test_db().await;
        let calls = (0..8).map(|_| {
            find_or_create_party(&db, "Vizag Mart", NewParty::new(PartyRole::Customer))
        });
        let parties = join_all(calls).await;
        let ids: Vec<i32> = parties.into_iter().map(|p| p.unwrap().id).collect();
        assert!(ids.windows(2).all(|w| w[0] == w[1]));
        assert_eq!(party::Entity::find().count(&db).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn duplicate_names_without_constraint_are_reported() {
        let db = test_db().await;
        db.execute_unprepared("DROP TABLE party").await.unwrap();
        db.execute_unprepared(
            "CREATE TABLE party (id integer PRIMARY KEY AUTOINCREMENT, name text NOT NULL, \
             role text NOT NULL, whatsapp text, email text, updated_at text NOT NULL, \
             created_at text NOT NULL)",
        )
        .await
        .unwrap();
        for _ in 0..2 {
            db.execute_unprepared(
                "INSERT INTO party (name, role, updated_at, created_at) \
                 VALUES ('SAPCO Papers', 'SUPPLIER', '2025-08-17 00:00:00', '2025-08-17 00:00:00')",
            )
            .await
            .unwrap();
        }

        let err = find_or_create_party(&db, "SAPCO Papers", NewParty::new(PartyRole::Supplier))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::RaceDuplicate { count: 2, .. }));
    }

    #[test]
    fn party_insert_ignores_conflicts_on_every_backend() {
        use sea_orm::{DbBackend, QueryTrait};

        let sql = |backend| {
            party_insert("SAPCO Papers", NewParty::new(PartyRole::Supplier))
                .build(backend)
                .to_string()
        };
        let mysql = sql(DbBackend::MySql);
        assert!(mysql.contains("ON DUPLICATE KEY UPDATE"), "{mysql}");
        assert!(!mysql.contains("IGNORE"), "{mysql}");
        assert!(sql(DbBackend::Postgres).contains(r#"ON CONFLICT ("name") DO NOTHING"#));
        assert!(sql(DbBackend::Sqlite).contains(r#"ON CONFLICT ("name") DO NOTHING"#));
    }

    #[tokio::test]
    async fn party_with_role_checks_role() {
        let db = test_db().await;
        let supplier = find_or_create_party(&db, "Coastal Pulp", NewParty::new(PartyRole::Supplier))
            .await
            .unwrap();
        assert!(party_with_role(&db, supplier.id, PartyRole::Supplier).await.is_ok());
        let err = party_with_role(&db, supplier.id, PartyRole::Customer)
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::RoleMismatch { .. }));
        let err = party_with_role(&db, supplier.id + 1, PartyRole::Supplier)
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::NotFound { entity: "party", .. }));
    }
}
