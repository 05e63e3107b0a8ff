use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use ember_common::data_type::TableDefRef;
use ember_storage::{BufferManager, DataTable};
use ember_transaction::Timestamp;
use parking_lot::RwLock;
use smol_str::SmolStr;

use crate::entry::{CatalogEntry, EntryBase, EntryType};
use crate::error::{CatalogError, EntryResult};
use crate::meta::TableMeta;
use crate::table::TableEntry;

/// One version of a database. Owns the table namespace of that version.
#[derive(Debug)]
pub struct DBEntry {
    base: EntryBase,
    name: SmolStr,
    dir: PathBuf,
    buffer_mgr: Arc<BufferManager>,
    segment_capacity: usize,
    tables: RwLock<HashMap<SmolStr, Arc<TableMeta>>>,
}

impl CatalogEntry for DBEntry {
    const ENTRY_TYPE: EntryType = EntryType::Database;

    #[inline]
    fn base(&self) -> &EntryBase {
        &self.base
    }

    fn to_tombstone(&self, base: EntryBase) -> Self {
        Self::new(
            base,
            self.name.clone(),
            self.dir.clone(),
            self.buffer_mgr.clone(),
            self.segment_capacity,
        )
    }
}

impl DBEntry {
    pub fn new(
        base: EntryBase,
        name: SmolStr,
        dir: PathBuf,
        buffer_mgr: Arc<BufferManager>,
        segment_capacity: usize,
    ) -> Self {
        Self {
            base,
            name,
            dir,
            buffer_mgr,
            segment_capacity,
            tables: RwLock::new(HashMap::new()),
        }
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Returns the meta of `name`, registering an empty one if there is none yet.
    fn table_meta_or_insert(&self, name: &str) -> Arc<TableMeta> {
        if let Some(meta) = self.tables.read().get(name) {
            return meta.clone();
        }
        self.tables
            .write()
            .entry(name.into())
            .or_insert_with(|| {
                Arc::new(TableMeta::new(
                    name,
                    self.dir.join(name),
                    self.buffer_mgr.clone(),
                ))
            })
            .clone()
    }

    fn table_meta(&self, name: &str) -> Option<Arc<TableMeta>> {
        self.tables.read().get(name).cloned()
    }

    pub fn create_table(
        self: &Arc<Self>,
        txn_id: Timestamp,
        begin_ts: Timestamp,
        def: TableDefRef,
    ) -> EntryResult<TableEntry> {
        let meta = self.table_meta_or_insert(def.table_name());
        let entry = meta.create_new_entry(txn_id, begin_ts, |base| {
            let data_table = Arc::new(DataTable::new(
                def.clone(),
                meta.dir().to_path_buf(),
                self.segment_capacity,
                self.buffer_mgr.clone(),
            ));
            TableEntry::new(base, def, meta.dir().to_path_buf(), data_table, self)
        })?;
        tracing::debug!(db = %self.name, table = entry.table_name(), %txn_id, "create table");
        Ok(entry)
    }

    pub fn drop_table(
        &self,
        txn_id: Timestamp,
        begin_ts: Timestamp,
        name: &str,
    ) -> EntryResult<TableEntry> {
        let meta = self.table_meta(name).ok_or_else(|| table_not_found(name))?;
        let entry = meta.drop_new_entry(txn_id, begin_ts)?;
        tracing::debug!(db = %self.name, table = name, %txn_id, "drop table");
        Ok(entry)
    }

    pub fn get_table(
        &self,
        txn_id: Timestamp,
        begin_ts: Timestamp,
        name: &str,
    ) -> EntryResult<TableEntry> {
        self.table_meta(name)
            .ok_or_else(|| table_not_found(name))?
            .get_entry(txn_id, begin_ts)
    }

    /// Removes the versions of table `name` pending in `txn_id`.
    pub fn remove_table_entry(&self, name: &str, txn_id: Timestamp) -> usize {
        self.table_meta(name)
            .map_or(0, |meta| meta.delete_new_entry(txn_id))
    }

    /// Names of the tables live at `(txn_id, begin_ts)`, sorted.
    pub fn table_names(&self, txn_id: Timestamp, begin_ts: Timestamp) -> Vec<String> {
        let mut names: Vec<String> = self
            .tables
            .read()
            .values()
            .filter(|meta| meta.get_entry(txn_id, begin_ts).is_ok())
            .map(|meta| meta.name().to_string())
            .collect();
        names.sort_unstable();
        names
    }
}

fn table_not_found(name: &str) -> CatalogError {
    CatalogError::EntryNotFound {
        entry_type: EntryType::Table,
        name: name.to_string(),
    }
}
