use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};

use ember_common::data_type::TableDefRef;
use ember_storage::DataTable;

use crate::database::DBEntry;
use crate::entry::{CatalogEntry, EntryBase, EntryType};

/// One version of a table.
#[derive(Debug)]
pub struct TableEntry {
    base: EntryBase,
    def: TableDefRef,
    dir: PathBuf,
    data_table: Arc<DataTable>,
    /// The database version this table was created in. Not owning.
    db: Weak<DBEntry>,
}

impl CatalogEntry for TableEntry {
    const ENTRY_TYPE: EntryType = EntryType::Table;

    #[inline]
    fn base(&self) -> &EntryBase {
        &self.base
    }

    /// A tombstone shares the dropped version's data, so older snapshots keep reading it.
    fn to_tombstone(&self, base: EntryBase) -> Self {
        Self {
            base,
            def: self.def.clone(),
            dir: self.dir.clone(),
            data_table: self.data_table.clone(),
            db: self.db.clone(),
        }
    }
}

impl TableEntry {
    pub fn new(
        base: EntryBase,
        def: TableDefRef,
        dir: PathBuf,
        data_table: Arc<DataTable>,
        db: &Arc<DBEntry>,
    ) -> Self {
        Self {
            base,
            def,
            dir,
            data_table,
            db: Arc::downgrade(db),
        }
    }

    #[inline]
    pub fn table_name(&self) -> &str {
        self.def.table_name()
    }

    #[inline]
    pub fn def(&self) -> &TableDefRef {
        &self.def
    }

    #[inline]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    #[inline]
    pub fn data_table(&self) -> &Arc<DataTable> {
        &self.data_table
    }

    /// The owning database version, if it is still alive.
    #[inline]
    pub fn db(&self) -> Option<Arc<DBEntry>> {
        self.db.upgrade()
    }
}
