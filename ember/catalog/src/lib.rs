//! Multi-version catalog of databases and tables.
//!
//! Every database or table name owns a version chain of entries. Writers prepend uncommitted
//! versions stamped with their transaction id, readers pick the newest version visible at their
//! begin timestamp.

pub mod catalog;
pub mod chain;
pub mod database;
pub mod entry;
pub mod error;
pub mod meta;
pub mod table;

pub use catalog::Catalog;
pub use chain::VersionChain;
pub use database::DBEntry;
pub use entry::{CatalogEntry, EntryBase, EntryType};
pub use error::{CatalogError, CatalogResult, EntryResult};
pub use meta::{DBMeta, Meta, TableMeta};
pub use table::TableEntry;
