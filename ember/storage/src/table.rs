use std::collections::{BTreeMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use ember_common::data_block::DataBlock;
use ember_common::data_type::TableDefRef;
use ember_common::types::{ColumnId, RowId, SegmentId};
use ember_transaction::Timestamp;
use parking_lot::RwLock;

use crate::buffer::BufferManager;
use crate::error::{StorageError, StorageResult};
use crate::scan::TableScanState;
use crate::segment::{AppendState, Segment};

#[derive(Debug, Default)]
struct SegmentSet {
    segments: BTreeMap<SegmentId, Arc<Segment>>,
    /// The single segment accepting appends. `None` before the first append.
    unsealed: Option<Arc<Segment>>,
    next_segment_id: SegmentId,
}

/// Owns the segments of one table.
#[derive(Debug)]
pub struct DataTable {
    def: TableDefRef,
    dir: PathBuf,
    segment_capacity: usize,
    buffer_mgr: Arc<BufferManager>,
    /// Guards segment-map and `unsealed` mutation only. Rows are copied outside of it.
    inner: RwLock<SegmentSet>,
}

impl DataTable {
    pub fn new(
        def: TableDefRef,
        dir: PathBuf,
        segment_capacity: usize,
        buffer_mgr: Arc<BufferManager>,
    ) -> Self {
        assert!(segment_capacity > 0, "segment capacity must be positive");
        Self {
            def,
            dir,
            segment_capacity,
            buffer_mgr,
            inner: RwLock::new(SegmentSet::default()),
        }
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
    pub fn segment_capacity(&self) -> usize {
        self.segment_capacity
    }

    /// Checks that `block` has the column count and column types of the table.
    pub fn validate_block(&self, block: &DataBlock) -> StorageResult<()> {
        if block.num_columns() != self.def.num_columns() {
            return Err(StorageError::SchemaMismatch(format!(
                "table {} has {} columns, block has {}",
                self.def.table_name(),
                self.def.num_columns(),
                block.num_columns()
            )));
        }
        for (column, actual) in self.def.columns().iter().zip(block.data_types()) {
            let expected = column.ty().to_arrow_data_type();
            if &expected != actual {
                return Err(StorageError::SchemaMismatch(format!(
                    "column {} expects {}, block has {}",
                    column.name(),
                    expected,
                    actual
                )));
            }
        }
        Ok(())
    }

    /// Appends all rows of `blocks`, stamped with `commit_ts`, rolling over to new segments as
    /// segments fill up. Returns the number of rows appended.
    ///
    /// On a buffer-manager failure the rows appended before the failure stay in place.
    pub fn append(&self, commit_ts: Timestamp, blocks: &[DataBlock]) -> StorageResult<usize> {
        let blocks: Vec<DataBlock> = blocks
            .iter()
            .map(|block| {
                let mut block = block.clone();
                block.compact();
                block
            })
            .collect();
        let mut state = AppendState::new(&blocks);
        while !state.finished() {
            let segment = self.unsealed_segment();
            let appended = segment.append(commit_ts, &mut state)?;
            tracing::trace!(
                table = self.def.table_name(),
                segment_id = segment.segment_id(),
                "segment is appended with {appended} rows"
            );
        }
        Ok(state.appended_rows())
    }

    /// Returns a segment with free capacity, allocating one if needed.
    ///
    /// Double-checked allocation: the unsealed segment is first read under the shared lock. Only
    /// when it is missing or full is the exclusive lock taken, and the check repeated under it,
    /// since another appender may have rolled the table over in between. Concurrent appenders that
    /// all observe a full segment therefore allocate exactly one successor.
    fn unsealed_segment(&self) -> Arc<Segment> {
        if let Some(segment) = self.inner.read().unsealed.as_ref() {
            if segment.available_capacity() > 0 {
                return segment.clone();
            }
        }

        let mut inner = self.inner.write();
        if let Some(segment) = inner.unsealed.as_ref() {
            if segment.available_capacity() > 0 {
                return segment.clone();
            }
        }

        let segment_id = inner.next_segment_id;
        inner.next_segment_id += 1;
        let segment = Arc::new(Segment::new(
            segment_id,
            &self.dir,
            self.segment_capacity,
            &self.def,
            self.buffer_mgr.clone(),
        ));
        inner.segments.insert(segment_id, segment.clone());
        if let Some(prev) = inner.unsealed.replace(segment.clone()) {
            prev.seal();
        }
        tracing::trace!(
            table = self.def.table_name(),
            segment_id,
            "add new segment"
        );
        segment
    }

    /// Groups `row_ids` by segment, failing if any segment does not exist.
    fn resolve_rows(&self, row_ids: &[RowId]) -> StorageResult<Vec<(Arc<Segment>, Vec<u32>)>> {
        let mut by_segment: BTreeMap<SegmentId, Vec<u32>> = BTreeMap::new();
        for row_id in row_ids {
            by_segment
                .entry(row_id.segment_id)
                .or_default()
                .push(row_id.offset);
        }
        let inner = self.inner.read();
        by_segment
            .into_iter()
            .map(|(segment_id, offsets)| match inner.segments.get(&segment_id) {
                Some(segment) => Ok((segment.clone(), offsets)),
                None => Err(StorageError::RowNotFound(RowId::new(segment_id, offsets[0]))),
            })
            .collect()
    }

    /// Checks that a transaction reading at `begin_ts` may delete `row_ids`.
    pub fn check_delete(&self, begin_ts: Timestamp, row_ids: &[RowId]) -> StorageResult<()> {
        for (segment, offsets) in self.resolve_rows(row_ids)? {
            segment.check_delete(begin_ts, &offsets)?;
        }
        Ok(())
    }

    /// Marks `row_ids` as deleted at `commit_ts` on behalf of a transaction reading at
    /// `begin_ts`.
    ///
    /// Every row is resolved and checked before any is touched. Deletes only run under the
    /// commit lock, so no other delete lands between the check and the apply.
    pub fn delete(
        &self,
        begin_ts: Timestamp,
        commit_ts: Timestamp,
        row_ids: &[RowId],
    ) -> StorageResult<usize> {
        let targets = self.resolve_rows(row_ids)?;
        for (segment, offsets) in &targets {
            segment.check_delete(begin_ts, offsets)?;
        }
        let mut deleted = 0;
        for (segment, offsets) in &targets {
            deleted += segment.delete(begin_ts, commit_ts, offsets)?;
        }
        Ok(deleted)
    }

    /// Opens a scan over the segments that exist now, yielding rows visible at `begin_ts`.
    pub fn init_scan(
        &self,
        begin_ts: Timestamp,
        column_ids: Vec<ColumnId>,
    ) -> StorageResult<TableScanState> {
        if column_ids.is_empty() {
            return Err(StorageError::EmptyProjection);
        }
        if let Some(id) = column_ids.iter().find(|id| **id >= self.def.num_columns()) {
            return Err(StorageError::ColumnNotFound(*id));
        }
        let segments: VecDeque<_> = self.inner.read().segments.values().cloned().collect();
        Ok(TableScanState::new(begin_ts, column_ids, segments))
    }

    pub fn segment(&self, segment_id: SegmentId) -> Option<Arc<Segment>> {
        self.inner.read().segments.get(&segment_id).cloned()
    }

    pub fn segment_ids(&self) -> Vec<SegmentId> {
        self.inner.read().segments.keys().copied().collect()
    }

    pub fn unsealed_segment_id(&self) -> Option<SegmentId> {
        self.inner
            .read()
            .unsealed
            .as_ref()
            .map(|segment| segment.segment_id())
    }

    /// Physical row count across all segments, regardless of visibility.
    pub fn row_count(&self) -> usize {
        self.inner
            .read()
            .segments
            .values()
            .map(|segment| segment.row_count())
            .sum()
    }
}
