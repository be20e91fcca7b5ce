use sea_orm::{DbErr, SqlErr};
use thiserror::Error;

use crate::entity::{inventory_txn::TxnType, party::PartyRole};

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("{entity} {key} not found")]
    NotFound { entity: &'static str, key: String },

    #[error("constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("{count} parties share the name {name:?}; add a unique constraint on party.name")]
    RaceDuplicate { name: String, count: u64 },

    #[error("{group} table holds {existing} documents but the seed creates {expected}; skipped")]
    PartialSeedState {
        group: &'static str,
        existing: u64,
        expected: u64,
    },

    #[error("quantity must be positive, got {0}")]
    InvalidQuantity(i64),

    #[error("{txn_type:?} movement has the wrong sign: {qty}")]
    DirectionMismatch { txn_type: TxnType, qty: i64 },

    #[error("{txn_type:?} movement for product {product_id} exceeds plan on document {ref_id}: planned {planned}, already moved {moved}, requested {requested}")]
    ExceedsPlan {
        txn_type: TxnType,
        ref_id: i32,
        product_id: i32,
        planned: i64,
        moved: i64,
        requested: i64,
    },

    #[error("party {name:?} is not a {expected:?}")]
    RoleMismatch { name: String, expected: PartyRole },

    #[error("{document} {id} is {status}")]
    InvalidState {
        document: &'static str,
        id: i32,
        status: String,
    },

    #[error("{0} needs at least one line")]
    EmptyDocument(&'static str),

    #[error(transparent)]
    Db(DbErr),
}

impl LedgerError {
    pub fn not_found(entity: &'static str, key: impl ToString) -> Self {
        Self::NotFound {
            entity,
            key: key.to_string(),
        }
    }
}

impl From<DbErr> for LedgerError {
    fn from(err: DbErr) -> Self {
        match err.sql_err() {
            Some(SqlErr::UniqueConstraintViolation(msg)) => Self::ConstraintViolation(msg),
            Some(SqlErr::ForeignKeyConstraintViolation(msg)) => Self::ConstraintViolation(msg),
            _ => Self::Db(err),
        }
    }
}

pub type Result<T, E = LedgerError> = std::result::Result<T, E>;
