use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use ember_common::data_type::TableDefRef;
use ember_storage::BufferManager;
use ember_transaction::Timestamp;
use parking_lot::RwLock;
use smol_str::SmolStr;

use crate::database::DBEntry;
use crate::entry::EntryType;
use crate::error::{CatalogError, EntryResult};
use crate::meta::DBMeta;
use crate::table::TableEntry;

/// Root of the catalog: database name to its meta.
#[derive(Debug)]
pub struct Catalog {
    base_dir: PathBuf,
    buffer_mgr: Arc<BufferManager>,
    segment_capacity: usize,
    databases: RwLock<HashMap<SmolStr, Arc<DBMeta>>>,
}

impl Catalog {
    pub fn new(base_dir: PathBuf, buffer_mgr: Arc<BufferManager>, segment_capacity: usize) -> Self {
        Self {
            base_dir,
            buffer_mgr,
            segment_capacity,
            databases: RwLock::new(HashMap::new()),
        }
    }

    #[inline]
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    #[inline]
    pub fn buffer_mgr(&self) -> &Arc<BufferManager> {
        &self.buffer_mgr
    }

    fn db_meta(&self, name: &str) -> Option<Arc<DBMeta>> {
        self.databases.read().get(name).cloned()
    }

    fn db_meta_or_insert(&self, name: &str) -> Arc<DBMeta> {
        if let Some(meta) = self.databases.read().get(name) {
            return meta.clone();
        }
        self.databases
            .write()
            .entry(name.into())
            .or_insert_with(|| {
                Arc::new(DBMeta::new(
                    name,
                    self.base_dir.join(name),
                    self.buffer_mgr.clone(),
                ))
            })
            .clone()
    }

    pub fn create_database(
        &self,
        txn_id: Timestamp,
        begin_ts: Timestamp,
        name: &str,
    ) -> EntryResult<DBEntry> {
        let meta = self.db_meta_or_insert(name);
        let entry = meta.create_new_entry(txn_id, begin_ts, |base| {
            DBEntry::new(
                base,
                name.into(),
                meta.dir().to_path_buf(),
                self.buffer_mgr.clone(),
                self.segment_capacity,
            )
        })?;
        tracing::debug!(db = name, %txn_id, "create database");
        Ok(entry)
    }

    pub fn drop_database(
        &self,
        txn_id: Timestamp,
        begin_ts: Timestamp,
        name: &str,
    ) -> EntryResult<DBEntry> {
        let meta = self.db_meta(name).ok_or_else(|| db_not_found(name))?;
        let entry = meta.drop_new_entry(txn_id, begin_ts)?;
        tracing::debug!(db = name, %txn_id, "drop database");
        Ok(entry)
    }

    pub fn get_database(
        &self,
        txn_id: Timestamp,
        begin_ts: Timestamp,
        name: &str,
    ) -> EntryResult<DBEntry> {
        self.db_meta(name)
            .ok_or_else(|| db_not_found(name))?
            .get_entry(txn_id, begin_ts)
    }

    /// Removes the versions of database `name` pending in `txn_id`.
    pub fn remove_db_entry(&self, name: &str, txn_id: Timestamp) -> usize {
        self.db_meta(name)
            .map_or(0, |meta| meta.delete_new_entry(txn_id))
    }

    /// Names of the databases live at `(txn_id, begin_ts)`, sorted.
    pub fn database_names(&self, txn_id: Timestamp, begin_ts: Timestamp) -> Vec<String> {
        let mut names: Vec<String> = self
            .databases
            .read()
            .values()
            .filter(|meta| meta.get_entry(txn_id, begin_ts).is_ok())
            .map(|meta| meta.name().to_string())
            .collect();
        names.sort_unstable();
        names
    }

    /// Resolves the visible version of database `name`, reporting its absence as
    /// [`CatalogError::DatabaseNotFound`].
    fn resolve_database(
        &self,
        txn_id: Timestamp,
        begin_ts: Timestamp,
        name: &str,
    ) -> EntryResult<DBEntry> {
        self.get_database(txn_id, begin_ts, name)
            .map_err(|err| match err {
                CatalogError::EntryNotFound { .. } => {
                    CatalogError::DatabaseNotFound(name.to_string())
                }
                err => err,
            })
    }

    pub fn create_table(
        &self,
        txn_id: Timestamp,
        begin_ts: Timestamp,
        db: &str,
        def: TableDefRef,
    ) -> EntryResult<TableEntry> {
        self.resolve_database(txn_id, begin_ts, db)?
            .create_table(txn_id, begin_ts, def)
    }

    pub fn drop_table(
        &self,
        txn_id: Timestamp,
        begin_ts: Timestamp,
        db: &str,
        table: &str,
    ) -> EntryResult<TableEntry> {
        self.resolve_database(txn_id, begin_ts, db)?
            .drop_table(txn_id, begin_ts, table)
    }

    pub fn get_table(
        &self,
        txn_id: Timestamp,
        begin_ts: Timestamp,
        db: &str,
        table: &str,
    ) -> EntryResult<TableEntry> {
        self.resolve_database(txn_id, begin_ts, db)?
            .get_table(txn_id, begin_ts, table)
    }
}

fn db_not_found(name: &str) -> CatalogError {
    CatalogError::EntryNotFound {
        entry_type: EntryType::Database,
        name: name.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use ember_common::data_type::{ColumnDef, LogicalType, TableDef};
    use ember_storage::BufferManagerConfig;

    use super::*;
    use crate::entry::CatalogEntry;

    fn catalog() -> Catalog {
        let mgr = Arc::new(BufferManager::new("/tmp/ember", &BufferManagerConfig::default()));
        Catalog::new(PathBuf::from("/tmp/ember"), mgr, 128)
    }

    fn txn(n: u64) -> Timestamp {
        Timestamp::with_ts(Timestamp::TXN_ID_START + n)
    }

    fn ts(n: u64) -> Timestamp {
        Timestamp::with_ts(n)
    }

    fn person() -> TableDefRef {
        Arc::new(TableDef::new("person", vec![
            ColumnDef::new("id", LogicalType::Int64, false),
            ColumnDef::new("name", LogicalType::String, true),
        ]))
    }

    #[test]
    fn test_database_lifecycle() {
        let catalog = catalog();
        let db = catalog.create_database(txn(1), ts(10), "d1").unwrap();
        assert_eq!(db.name(), "d1");
        assert_eq!(db.dir(), Path::new("/tmp/ember/d1"));
        assert!(catalog.get_database(txn(2), ts(11), "d1").is_err());
        db.base().commit(ts(20));

        assert_eq!(catalog.database_names(txn(3), ts(21)), vec!["d1"]);
        assert!(catalog.database_names(txn(3), ts(19)).is_empty());

        let tombstone = catalog.drop_database(txn(3), ts(21), "d1").unwrap();
        assert!(tombstone.base().is_deleted());
        assert!(catalog.get_database(txn(3), ts(21), "d1").is_err());
        assert_eq!(catalog.remove_db_entry("d1", txn(3)), 1);
        assert!(catalog.get_database(txn(3), ts(21), "d1").is_ok());
    }

    #[test]
    fn test_table_requires_database() {
        let catalog = catalog();
        assert_eq!(
            catalog.create_table(txn(1), ts(1), "nope", person()).unwrap_err(),
            CatalogError::DatabaseNotFound("nope".into())
        );
        assert_eq!(
            catalog.get_table(txn(1), ts(1), "nope", "person").unwrap_err(),
            CatalogError::DatabaseNotFound("nope".into())
        );
    }

    #[test]
    fn test_table_lifecycle() {
        let catalog = catalog();
        catalog
            .create_database(txn(1), ts(1), "d1")
            .unwrap()
            .base()
            .commit(ts(2));

        let table = catalog.create_table(txn(2), ts(2), "d1", person()).unwrap();
        assert_eq!(table.table_name(), "person");
        assert_eq!(table.dir(), Path::new("/tmp/ember/d1/person"));
        assert_eq!(table.db().unwrap().name(), "d1");
        assert!(matches!(
            catalog.create_table(txn(2), ts(2), "d1", person()),
            Err(CatalogError::EntryAlreadyExists { .. })
        ));
        // Pending in txn 2 only.
        assert!(catalog.get_table(txn(3), ts(2), "d1", "person").is_err());
        assert!(matches!(
            catalog.create_table(txn(3), ts(2), "d1", person()),
            Err(CatalogError::WriteWriteConflict { .. })
        ));
        table.base().commit(ts(3));

        let db = catalog.get_database(txn(4), ts(3), "d1").unwrap();
        assert_eq!(db.table_names(txn(4), ts(3)), vec!["person"]);
        assert!(db.table_names(txn(4), ts(2)).is_empty());
        let found = catalog.get_table(txn(4), ts(3), "d1", "person").unwrap();
        assert!(Arc::ptr_eq(&found, &table));

        let tombstone = catalog.drop_table(txn(4), ts(3), "d1", "person").unwrap();
        assert!(tombstone.base().is_deleted());
        assert!(Arc::ptr_eq(tombstone.data_table(), table.data_table()));
        assert_eq!(db.remove_table_entry("person", txn(4)), 1);
        assert!(catalog.get_table(txn(4), ts(3), "d1", "person").is_ok());
    }

    #[test]
    fn test_missing_table() {
        let catalog = catalog();
        catalog
            .create_database(txn(1), ts(1), "d1")
            .unwrap()
            .base()
            .commit(ts(2));
        assert_eq!(
            catalog.drop_table(txn(2), ts(2), "d1", "t").unwrap_err(),
            CatalogError::EntryNotFound {
                entry_type: EntryType::Table,
                name: "t".into()
            }
        );
    }
}
