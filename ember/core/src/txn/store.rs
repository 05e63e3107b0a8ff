use std::sync::Arc;

use ember_catalog::TableEntry;
use ember_common::data_block::DataBlock;
use ember_common::types::RowId;
use ember_storage::StorageResult;
use ember_transaction::Timestamp;

/// Rows a transaction staged for one table. Nothing here is visible to other transactions until
/// [`commit`](Self::commit) applies it to the table's storage.
#[derive(Debug)]
pub struct TxnTableStore {
    entry: Arc<TableEntry>,
    txn_id: Timestamp,
    begin_ts: Timestamp,
    blocks: Vec<DataBlock>,
    deletes: Vec<RowId>,
}

impl TxnTableStore {
    pub fn new(entry: Arc<TableEntry>, txn_id: Timestamp, begin_ts: Timestamp) -> Self {
        Self {
            entry,
            txn_id,
            begin_ts,
            blocks: Vec::new(),
            deletes: Vec::new(),
        }
    }

    #[inline]
    pub fn table_name(&self) -> &str {
        self.entry.table_name()
    }

    #[inline]
    pub fn entry(&self) -> &Arc<TableEntry> {
        &self.entry
    }

    #[inline]
    pub fn txn_id(&self) -> Timestamp {
        self.txn_id
    }

    /// Rows staged for appending, after filters.
    pub fn staged_rows(&self) -> usize {
        self.blocks.iter().map(|block| block.cardinality()).sum()
    }

    #[inline]
    pub fn staged_deletes(&self) -> &[RowId] {
        &self.deletes
    }

    /// Stages `block` after checking it against the table definition.
    pub fn append(&mut self, block: DataBlock) -> StorageResult<()> {
        self.entry.data_table().validate_block(&block)?;
        if block.cardinality() > 0 {
            self.blocks.push(block);
        }
        Ok(())
    }

    /// Stages deletion of `row_ids`, which must be visible at the transaction's begin timestamp.
    ///
    /// The rows are checked again at commit, where a delete committed by another transaction in
    /// the meantime fails the whole store.
    pub fn delete(&mut self, row_ids: &[RowId]) -> StorageResult<()> {
        self.entry
            .data_table()
            .check_delete(self.begin_ts, row_ids)?;
        self.deletes.extend_from_slice(row_ids);
        Ok(())
    }

    /// Applies the staged appends, then the staged deletes, at `commit_ts`.
    pub fn commit(&self, commit_ts: Timestamp) -> StorageResult<()> {
        let data_table = self.entry.data_table();
        let appended = if self.blocks.is_empty() {
            0
        } else {
            data_table.append(commit_ts, &self.blocks)?
        };
        let deleted = if self.deletes.is_empty() {
            0
        } else {
            data_table.delete(self.begin_ts, commit_ts, &self.deletes)?
        };
        tracing::trace!(
            txn_id = %self.txn_id,
            table = self.table_name(),
            %commit_ts,
            appended,
            deleted,
            "table store committed"
        );
        Ok(())
    }
}
