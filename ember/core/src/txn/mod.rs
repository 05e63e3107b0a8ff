//! Transactions.
//!
//! A [`Txn`] reads the catalog and the tables as of its begin timestamp, stages its own changes,
//! and publishes them at commit:
//!
//! 1. `Started -> Committing` under the transaction's context lock.
//! 2. Under the manager's commit lock: a commit timestamp is assigned and stamped onto every
//!    catalog entry the transaction wrote, then every table store is applied to storage.
//! 3. `Committing -> Committed` under the context lock.
//!
//! A requested commit timestamp that is rejected in step 2 rolls the transaction back before
//! anything is stamped. A table store that fails to apply in step 2 is logged and skipped. The
//! catalog entries stamped before it stay committed.

mod manager;
mod store;

use std::collections::HashMap;
use std::sync::Arc;

use ember_catalog::{CatalogEntry, DBEntry, TableEntry};
use ember_common::data_block::DataBlock;
use ember_common::data_type::TableDefRef;
use ember_common::types::{ColumnId, RowId};
use ember_storage::{ScanOutput, TableScanState};
use ember_transaction::{Timestamp, TimestampError, TxnContext, TxnState};
pub use manager::TxnManager;
use smol_str::SmolStr;
pub use store::TxnTableStore;

use crate::error::{Error, Result};

type TableKey = (SmolStr, SmolStr);

/// A transaction handle. Owned by a single caller.
///
/// Dropping a transaction that is still running rolls it back.
#[derive(Debug)]
pub struct Txn {
    manager: Arc<TxnManager>,
    context: TxnContext,
    /// Database versions written by this transaction, net of drops of its own creations.
    db_entries: Vec<Arc<DBEntry>>,
    /// Table versions written by this transaction, net of drops of its own creations.
    table_entries: Vec<Arc<TableEntry>>,
    /// Table entries resolved by this transaction, pinned until it ends.
    tables: HashMap<TableKey, Arc<TableEntry>>,
    /// The database this transaction writes rows to.
    write_db: Option<SmolStr>,
    stores: HashMap<SmolStr, TxnTableStore>,
    scans: HashMap<TableKey, TableScanState>,
}

impl Txn {
    pub(crate) fn new(manager: Arc<TxnManager>, txn_id: Timestamp) -> Self {
        Self {
            manager,
            context: TxnContext::new(txn_id),
            db_entries: Vec::new(),
            table_entries: Vec::new(),
            tables: HashMap::new(),
            write_db: None,
            stores: HashMap::new(),
            scans: HashMap::new(),
        }
    }

    #[inline]
    pub fn txn_id(&self) -> Timestamp {
        self.context.txn_id()
    }

    #[inline]
    pub fn state(&self) -> TxnState {
        self.context.state()
    }

    #[inline]
    pub fn begin_ts(&self) -> Timestamp {
        self.context.begin_ts()
    }

    #[inline]
    pub fn commit_ts(&self) -> Option<Timestamp> {
        self.context.commit_ts()
    }

    #[inline]
    pub fn tracked_databases(&self) -> &[Arc<DBEntry>] {
        &self.db_entries
    }

    #[inline]
    pub fn tracked_tables(&self) -> &[Arc<TableEntry>] {
        &self.table_entries
    }

    #[inline]
    pub fn table_store(&self, table: &str) -> Option<&TxnTableStore> {
        self.stores.get(table)
    }

    /// Starts the transaction, reading as of `begin_ts` or as of the latest commit if `None`.
    pub fn begin(&mut self, begin_ts: Option<Timestamp>) -> Result<()> {
        let begin_ts = self.manager.assign_begin_ts(begin_ts)?;
        self.context.begin(begin_ts)?;
        self.manager.register(self.txn_id(), begin_ts);
        tracing::debug!(txn_id = %self.txn_id(), %begin_ts, "begin transaction");
        Ok(())
    }

    /// Returns the begin timestamp if the transaction is running.
    fn started(&self) -> Result<Timestamp> {
        match self.context.snapshot() {
            (begin_ts, TxnState::Started) => Ok(begin_ts),
            (_, state) => Err(Error::TxnNotStarted {
                txn_id: self.txn_id(),
                state,
            }),
        }
    }

    pub fn create_database(&mut self, name: &str) -> Result<Arc<DBEntry>> {
        let begin_ts = self.started()?;
        let entry = self
            .manager
            .catalog()
            .create_database(self.txn_id(), begin_ts, name)?;
        toggle(&mut self.db_entries, &entry);
        Ok(entry)
    }

    pub fn drop_database(&mut self, name: &str) -> Result<Arc<DBEntry>> {
        let begin_ts = self.started()?;
        let entry = self
            .manager
            .catalog()
            .drop_database(self.txn_id(), begin_ts, name)?;
        toggle(&mut self.db_entries, &entry);
        self.tables.retain(|(db, _), _| db != name);
        self.scans.retain(|(db, _), _| db != name);
        if self.write_db.as_deref() == Some(name) {
            self.stores.clear();
            self.write_db = None;
        }
        Ok(entry)
    }

    pub fn get_database(&self, name: &str) -> Result<Arc<DBEntry>> {
        let begin_ts = self.started()?;
        Ok(self
            .manager
            .catalog()
            .get_database(self.txn_id(), begin_ts, name)?)
    }

    /// Names of the databases visible to this transaction.
    pub fn list_databases(&self) -> Result<Vec<String>> {
        let begin_ts = self.started()?;
        Ok(self
            .manager
            .catalog()
            .database_names(self.txn_id(), begin_ts))
    }

    /// Names of the tables of `db` visible to this transaction.
    pub fn list_tables(&self, db: &str) -> Result<Vec<String>> {
        let begin_ts = self.started()?;
        let entry = self
            .manager
            .catalog()
            .get_database(self.txn_id(), begin_ts, db)?;
        Ok(entry.table_names(self.txn_id(), begin_ts))
    }

    pub fn create_table(
        &mut self,
        db: &str,
        def: impl Into<TableDefRef>,
    ) -> Result<Arc<TableEntry>> {
        let begin_ts = self.started()?;
        let entry = self
            .manager
            .catalog()
            .create_table(self.txn_id(), begin_ts, db, def.into())?;
        toggle(&mut self.table_entries, &entry);
        self.tables
            .insert((db.into(), entry.table_name().into()), entry.clone());
        Ok(entry)
    }

    pub fn drop_table_by_name(&mut self, db: &str, table: &str) -> Result<Arc<TableEntry>> {
        let begin_ts = self.started()?;
        let entry = self
            .manager
            .catalog()
            .drop_table(self.txn_id(), begin_ts, db, table)?;
        toggle(&mut self.table_entries, &entry);
        let key = (SmolStr::from(db), SmolStr::from(table));
        self.tables.remove(&key);
        self.scans.remove(&key);
        if self.write_db.as_deref() == Some(db) {
            self.stores.remove(table);
        }
        Ok(entry)
    }

    /// Resolves table `db.table`. The first resolution is pinned: later calls return the same
    /// entry for the rest of the transaction, whatever other transactions commit meanwhile.
    pub fn get_table_by_name(&mut self, db: &str, table: &str) -> Result<Arc<TableEntry>> {
        let begin_ts = self.started()?;
        let key = (SmolStr::from(db), SmolStr::from(table));
        if let Some(entry) = self.tables.get(&key) {
            return Ok(entry.clone());
        }
        let entry = self
            .manager
            .catalog()
            .get_table(self.txn_id(), begin_ts, db, table)?;
        self.tables.insert(key, entry.clone());
        Ok(entry)
    }

    /// Returns the store of `db.table`, pinning the transaction's row writes to `db`.
    fn store_for_write(&mut self, db: &str, table: &str) -> Result<&mut TxnTableStore> {
        if let Some(pinned) = self.write_db.as_deref().filter(|pinned| *pinned != db) {
            tracing::warn!(
                txn_id = %self.txn_id(),
                pinned,
                requested = db,
                "rejected write to a second database"
            );
            return Err(Error::CrossDatabaseWrite {
                pinned: pinned.to_string(),
                requested: db.to_string(),
            });
        }
        let entry = self.get_table_by_name(db, table)?;
        self.write_db.get_or_insert_with(|| db.into());
        let (txn_id, begin_ts) = (self.txn_id(), self.begin_ts());
        Ok(self
            .stores
            .entry(table.into())
            .or_insert_with(|| TxnTableStore::new(entry, txn_id, begin_ts)))
    }

    /// Stages `block` for appending to `db.table`.
    pub fn append(&mut self, db: &str, table: &str, block: DataBlock) -> Result<()> {
        self.started()?;
        self.store_for_write(db, table)?.append(block)?;
        Ok(())
    }

    /// Stages deletion of `row_ids` from `db.table`. Every row must be visible to this
    /// transaction.
    pub fn delete(&mut self, db: &str, table: &str, row_ids: &[RowId]) -> Result<()> {
        self.started()?;
        self.store_for_write(db, table)?.delete(row_ids)?;
        Ok(())
    }

    /// Opens a scan of `db.table` over the rows committed as of the begin timestamp. Reopening
    /// restarts the scan.
    pub fn init_scan(&mut self, db: &str, table: &str, column_ids: Vec<ColumnId>) -> Result<()> {
        let begin_ts = self.started()?;
        let entry = self.get_table_by_name(db, table)?;
        let state = entry.data_table().init_scan(begin_ts, column_ids)?;
        self.scans.insert((db.into(), table.into()), state);
        Ok(())
    }

    /// Returns the next block of the scan on `db.table`, or `None` once it is exhausted.
    pub fn scan(&mut self, db: &str, table: &str) -> Result<Option<ScanOutput>> {
        self.started()?;
        let key = (SmolStr::from(db), SmolStr::from(table));
        let state = self
            .scans
            .get_mut(&key)
            .ok_or_else(|| scan_not_open(db, table))?;
        Ok(state.next())
    }

    pub fn complete_scan(&mut self, db: &str, table: &str) -> Result<()> {
        self.started()?;
        let key = (SmolStr::from(db), SmolStr::from(table));
        self.scans
            .remove(&key)
            .map(|_| ())
            .ok_or_else(|| scan_not_open(db, table))
    }

    pub fn commit(&mut self) -> Result<Timestamp> {
        self.commit_at(None)
    }

    /// Commits at `commit_ts`, or at the next timestamp if `None`.
    ///
    /// A requested timestamp must be a commit timestamp above every timestamp handed out so far.
    /// If it is rejected before the commit starts, the transaction stays `Started`. If it is
    /// rejected under the commit lock, the transaction is rolled back and the error returned.
    pub fn commit_at(&mut self, commit_ts: Option<Timestamp>) -> Result<Timestamp> {
        if let (Some(ts), (begin_ts, TxnState::Started)) = (commit_ts, self.context.snapshot()) {
            check_requested_commit_ts(ts, begin_ts)?;
        }
        let txn_id = self.txn_id();
        self.context.start_commit()?;

        let manager = self.manager.clone();
        let guard = manager.lock_commit();
        let assigned = manager.assign_commit_ts(commit_ts).and_then(|ts| {
            self.context.set_commit_ts(ts)?;
            Ok(ts)
        });
        let commit_ts = match assigned {
            Ok(ts) => ts,
            Err(err) => {
                drop(guard);
                tracing::warn!(%txn_id, %err, "commit rejected, rolling back");
                self.context.abort_commit()?;
                self.finish_rollback()?;
                return Err(err);
            }
        };
        for entry in &self.db_entries {
            entry.base().commit(commit_ts);
        }
        for entry in &self.table_entries {
            entry.base().commit(commit_ts);
        }
        for (table, store) in &self.stores {
            if let Err(err) = store.commit(commit_ts) {
                tracing::error!(
                    %txn_id,
                    %commit_ts,
                    table = %table,
                    %err,
                    "failed to commit table store"
                );
            }
        }
        manager.publish_commit(commit_ts);
        drop(guard);

        self.context.finish_commit()?;
        self.manager.finish(txn_id);
        self.release();
        tracing::debug!(%txn_id, %commit_ts, "commit transaction");
        Ok(commit_ts)
    }

    /// Removes every pending version this transaction wrote. Retrying a rollback is tolerated.
    pub fn rollback(&mut self) -> Result<()> {
        self.context.start_rollback()?;
        self.finish_rollback()?;
        tracing::debug!(txn_id = %self.txn_id(), "rollback transaction");
        Ok(())
    }

    /// Unlinks the pending versions and ends a transaction in `Rollbacking` state.
    fn finish_rollback(&mut self) -> Result<()> {
        let txn_id = self.txn_id();
        for entry in &self.table_entries {
            if let Some(db) = entry.db() {
                db.remove_table_entry(entry.table_name(), txn_id);
            }
        }
        let catalog = self.manager.catalog();
        for entry in &self.db_entries {
            catalog.remove_db_entry(entry.name(), txn_id);
        }
        self.context.finish_rollback()?;
        self.manager.finish(txn_id);
        self.release();
        Ok(())
    }

    fn release(&mut self) {
        self.db_entries.clear();
        self.table_entries.clear();
        self.tables.clear();
        self.write_db = None;
        self.stores.clear();
        self.scans.clear();
    }
}

impl Drop for Txn {
    fn drop(&mut self) {
        if matches!(self.state(), TxnState::Started | TxnState::Rollbacking) {
            tracing::debug!(txn_id = %self.txn_id(), "rollback unfinished transaction on drop");
            if let Err(err) = self.rollback() {
                tracing::error!(txn_id = %self.txn_id(), %err, "failed to roll back on drop");
            }
        }
    }
}

/// Adds `entry` to `tracked`, or removes it if it is already there.
fn toggle<E: CatalogEntry>(tracked: &mut Vec<Arc<E>>, entry: &Arc<E>) {
    match tracked.iter().position(|e| Arc::ptr_eq(e, entry)) {
        Some(pos) => {
            tracked.remove(pos);
        }
        None => tracked.push(entry.clone()),
    }
}

/// Checks what can be checked about a requested commit timestamp without the commit lock.
fn check_requested_commit_ts(ts: Timestamp, begin_ts: Timestamp) -> Result<()> {
    if !ts.is_commit_ts() {
        return Err(TimestampError::WrongDomainCommit(ts.raw()).into());
    }
    if ts >= Timestamp::max_commit_ts() {
        return Err(TimestampError::CommitTsOverflow(ts.raw()).into());
    }
    if ts <= begin_ts {
        return Err(TimestampError::StaleCommit {
            requested: ts.raw(),
            min: begin_ts.raw() + 1,
        }
        .into());
    }
    Ok(())
}

fn scan_not_open(db: &str, table: &str) -> Error {
    Error::ScanNotOpen {
        db: db.to_string(),
        table: table.to_string(),
    }
}
