use std::path::{Path, PathBuf};
use std::sync::Arc;

use ember_storage::BufferManager;
use ember_transaction::Timestamp;
use parking_lot::RwLock;
use smol_str::SmolStr;

use crate::chain::VersionChain;
use crate::database::DBEntry;
use crate::entry::{CatalogEntry, EntryBase};
use crate::error::{CatalogError, CatalogResult, EntryResult};
use crate::table::TableEntry;

/// Container of all versions of one catalog name.
///
/// Creation and drop check write conflicts, check existence and prepend the new version in a
/// single critical section of the chain's writer lock, so two transactions can never both pass
/// the existence check for the same name.
#[derive(Debug)]
pub struct Meta<E> {
    name: SmolStr,
    dir: PathBuf,
    buffer_mgr: Arc<BufferManager>,
    chain: RwLock<VersionChain<E>>,
}

pub type DBMeta = Meta<DBEntry>;
pub type TableMeta = Meta<TableEntry>;

impl<E: CatalogEntry> Meta<E> {
    pub fn new(name: impl Into<SmolStr>, dir: PathBuf, buffer_mgr: Arc<BufferManager>) -> Self {
        Self {
            name: name.into(),
            dir,
            buffer_mgr,
            chain: RwLock::new(VersionChain::default()),
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

    #[inline]
    pub fn buffer_mgr(&self) -> &Arc<BufferManager> {
        &self.buffer_mgr
    }

    /// Number of versions, including tombstones and pending ones.
    pub fn num_versions(&self) -> usize {
        self.chain.read().len()
    }

    /// Prepends a new version built by `make`, unless a live version is visible to the caller.
    pub fn create_new_entry<F>(
        &self,
        txn_id: Timestamp,
        begin_ts: Timestamp,
        make: F,
    ) -> EntryResult<E>
    where
        F: FnOnce(EntryBase) -> E,
    {
        let mut chain = self.chain.write();
        self.check_write_conflict(&chain, txn_id, begin_ts)?;
        if chain
            .visible(txn_id, begin_ts)
            .is_some_and(|entry| !entry.base().is_deleted())
        {
            return Err(CatalogError::EntryAlreadyExists {
                entry_type: E::ENTRY_TYPE,
                name: self.name.to_string(),
            });
        }
        let entry = Arc::new(make(EntryBase::new(E::ENTRY_TYPE, txn_id, false)));
        chain.prepend(entry.clone());
        Ok(entry)
    }

    /// Drops the version visible to the caller.
    ///
    /// If that version is the caller's own pending creation it is removed from the chain and
    /// returned as is. Otherwise a tombstone is prepended and returned.
    pub fn drop_new_entry(&self, txn_id: Timestamp, begin_ts: Timestamp) -> EntryResult<E> {
        let mut chain = self.chain.write();
        self.check_write_conflict(&chain, txn_id, begin_ts)?;
        let Some(visible) = chain
            .visible(txn_id, begin_ts)
            .filter(|entry| !entry.base().is_deleted())
            .cloned()
        else {
            return Err(self.not_found());
        };
        if visible.base().is_uncommitted_by(txn_id) {
            chain.remove(&visible);
            return Ok(visible);
        }
        let base = EntryBase::new(E::ENTRY_TYPE, txn_id, true);
        let tombstone = Arc::new(visible.to_tombstone(base));
        chain.prepend(tombstone.clone());
        Ok(tombstone)
    }

    /// The live version visible to `(txn_id, begin_ts)`.
    pub fn get_entry(&self, txn_id: Timestamp, begin_ts: Timestamp) -> EntryResult<E> {
        self.chain
            .read()
            .visible(txn_id, begin_ts)
            .filter(|entry| !entry.base().is_deleted())
            .cloned()
            .ok_or_else(|| self.not_found())
    }

    /// Removes every version pending in `txn_id`. Returns how many were removed.
    pub fn delete_new_entry(&self, txn_id: Timestamp) -> usize {
        self.chain.write().remove_uncommitted(txn_id)
    }

    fn check_write_conflict(
        &self,
        chain: &VersionChain<E>,
        txn_id: Timestamp,
        begin_ts: Timestamp,
    ) -> CatalogResult<()> {
        let Some(head) = chain.head() else {
            return Ok(());
        };
        match head.base().commit_ts() {
            // Pending in another transaction.
            ts if ts.is_txn_id() && ts != txn_id => Err(self.conflict(ts)),
            // Committed after the caller's snapshot.
            ts if ts.is_commit_ts() && ts > begin_ts => Err(self.conflict(ts)),
            _ => Ok(()),
        }
    }

    fn conflict(&self, version: Timestamp) -> CatalogError {
        CatalogError::WriteWriteConflict {
            entry_type: E::ENTRY_TYPE,
            name: self.name.to_string(),
            version,
        }
    }

    fn not_found(&self) -> CatalogError {
        CatalogError::EntryNotFound {
            entry_type: E::ENTRY_TYPE,
            name: self.name.to_string(),
        }
    }
}
