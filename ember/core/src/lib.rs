//! Ember: an embeddable, multi-version catalog and transaction engine over an append-only
//! segmented row store.
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use ember::common::data_type::{ColumnDef, LogicalType, TableDef};
//! use ember::{Database, DatabaseConfig};
//!
//! # fn main() -> ember::Result<()> {
//! let db = Database::open(DatabaseConfig::default())?;
//! let mut txn = db.begin()?;
//! txn.create_database("shop")?;
//! txn.create_table("shop", TableDef::new("item", vec![
//!     ColumnDef::new("id", LogicalType::Int64, false),
//! ]))?;
//! txn.commit()?;
//! # Ok(())
//! # }
//! ```

mod config;
mod database;
mod error;
pub mod txn;

pub use config::DatabaseConfig;
pub use database::Database;
pub use error::{Error, Result};
pub use txn::{Txn, TxnManager, TxnTableStore};
pub use {
    ember_catalog as catalog, ember_common as common, ember_storage as storage,
    ember_transaction as transaction,
};
