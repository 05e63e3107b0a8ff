use std::sync::Arc;

use ember_transaction::Timestamp;
use thiserror::Error;

use crate::entry::EntryType;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CatalogError {
    #[error("{entry_type} {name} already exists")]
    EntryAlreadyExists { entry_type: EntryType, name: String },

    #[error("{entry_type} {name} not found")]
    EntryNotFound { entry_type: EntryType, name: String },

    #[error("database {0} not found")]
    DatabaseNotFound(String),

    #[error("write-write conflict on {entry_type} {name}, latest version is {version}")]
    WriteWriteConflict {
        entry_type: EntryType,
        name: String,
        version: Timestamp,
    },
}

pub type CatalogResult<T> = Result<T, CatalogError>;

/// Uniform result of a catalog lookup or mutation: the affected entry, or why there is none.
pub type EntryResult<E> = CatalogResult<Arc<E>>;
