use ember_catalog::CatalogError;
use ember_storage::StorageError;
use ember_transaction::{Timestamp, TimestampError, TxnState, TxnStateError};
use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error, Diagnostic)]
pub enum Error {
    #[error(transparent)]
    #[diagnostic(code(ember::catalog))]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    #[diagnostic(code(ember::storage))]
    Storage(#[from] StorageError),

    #[error(transparent)]
    #[diagnostic(code(ember::timestamp))]
    Timestamp(#[from] TimestampError),

    #[error(transparent)]
    #[diagnostic(
        code(ember::invalid_state),
        help("this is a bug in the caller, the transaction must not be used again")
    )]
    InvalidState(#[from] TxnStateError),

    #[error("transaction {txn_id} isn't started, it is {state}")]
    #[diagnostic(code(ember::txn_not_started))]
    TxnNotStarted { txn_id: Timestamp, state: TxnState },

    #[error("transaction writes database {pinned}, cannot also write database {requested}")]
    #[diagnostic(
        code(ember::cross_database_write),
        help("write each database in its own transaction")
    )]
    CrossDatabaseWrite { pinned: String, requested: String },

    #[error("no scan is open on table {db}.{table}")]
    #[diagnostic(code(ember::scan_not_open), help("call `init_scan` first"))]
    ScanNotOpen { db: String, table: String },

    #[error("invalid config: {0}")]
    #[diagnostic(code(ember::invalid_config))]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, Error>;
