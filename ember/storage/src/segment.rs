use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use arrow::array::BooleanArray;
use ember_common::data_block::DataBlock;
use ember_common::data_type::TableDef;
use ember_common::types::{ColumnId, RowId, SegmentId};
use ember_transaction::Timestamp;
use parking_lot::Mutex;

use crate::buffer::BufferManager;
use crate::error::{StorageError, StorageResult};
use crate::scan::ScanOutput;

pub const DEFAULT_SEGMENT_CAPACITY: usize = 8192;

/// Cursor over the staged blocks of one append call.
///
/// Blocks must be compact (unfiltered).
#[derive(Debug)]
pub struct AppendState<'a> {
    blocks: &'a [DataBlock],
    block_idx: usize,
    offset: usize,
    appended: usize,
}

impl<'a> AppendState<'a> {
    pub fn new(blocks: &'a [DataBlock]) -> Self {
        let mut state = Self {
            blocks,
            block_idx: 0,
            offset: 0,
            appended: 0,
        };
        state.skip_exhausted();
        state
    }

    #[inline]
    pub fn finished(&self) -> bool {
        self.block_idx >= self.blocks.len()
    }

    /// Rows handed out so far.
    #[inline]
    pub fn appended_rows(&self) -> usize {
        self.appended
    }

    /// Takes up to `max` rows from the current block.
    fn take(&mut self, max: usize) -> Option<DataBlock> {
        if self.finished() || max == 0 {
            return None;
        }
        let block = &self.blocks[self.block_idx];
        let len = max.min(block.len() - self.offset);
        let rows = block.slice(self.offset, len);
        self.offset += len;
        self.appended += len;
        self.skip_exhausted();
        Some(rows)
    }

    fn skip_exhausted(&mut self) {
        while self.block_idx < self.blocks.len() && self.offset >= self.blocks[self.block_idx].len()
        {
            self.block_idx += 1;
            self.offset = 0;
        }
    }
}

/// Rows `[start, next range's start)` were appended by a transaction committed at `commit_ts`.
#[derive(Debug, Clone, Copy)]
struct AppendRange {
    start: usize,
    commit_ts: Timestamp,
}

#[derive(Debug, Default)]
struct SegmentData {
    blocks: Vec<DataBlock>,
    appends: Vec<AppendRange>,
    deletes: BTreeMap<u32, Timestamp>,
    reserved_bytes: usize,
}

impl SegmentData {
    fn is_appended(&self, offset: usize, begin_ts: Timestamp) -> bool {
        let idx = self.appends.partition_point(|r| r.start <= offset);
        idx > 0 && self.appends[idx - 1].commit_ts <= begin_ts
    }

    fn is_visible(&self, offset: usize, begin_ts: Timestamp) -> bool {
        self.is_appended(offset, begin_ts)
            && self
                .deletes
                .get(&(offset as u32))
                .is_none_or(|deleted_ts| *deleted_ts > begin_ts)
    }

    /// A row can be deleted by a reader at `begin_ts` if it sees the row and nobody else has
    /// deleted it since.
    fn check_delete(
        &self,
        segment_id: SegmentId,
        row_count: usize,
        begin_ts: Timestamp,
        offsets: &[u32],
    ) -> StorageResult<()> {
        for offset in offsets {
            let row_id = RowId::new(segment_id, *offset);
            if *offset as usize >= row_count || !self.is_appended(*offset as usize, begin_ts) {
                return Err(StorageError::RowNotFound(row_id));
            }
            match self.deletes.get(offset) {
                Some(deleted_at) if *deleted_at > begin_ts => {
                    return Err(StorageError::DeleteConflict {
                        row_id,
                        deleted_at: *deleted_at,
                    });
                }
                Some(_) => return Err(StorageError::RowNotFound(row_id)),
                None => {}
            }
        }
        Ok(())
    }
}

/// A fixed-capacity, append-only block of rows of one table.
///
/// The segment stays unsealed while it is the append target of its table, and is sealed once its
/// table publishes a newer segment.
#[derive(Debug)]
pub struct Segment {
    segment_id: SegmentId,
    dir: PathBuf,
    capacity: usize,
    row_width: usize,
    buffer_mgr: Arc<BufferManager>,
    /// Only written while holding `data`, readable without it.
    row_count: AtomicUsize,
    sealed: AtomicBool,
    data: Mutex<SegmentData>,
}

impl Segment {
    pub fn new(
        segment_id: SegmentId,
        table_dir: &Path,
        capacity: usize,
        def: &TableDef,
        buffer_mgr: Arc<BufferManager>,
    ) -> Self {
        Self {
            segment_id,
            dir: table_dir.join(format!("seg_{segment_id}")),
            capacity,
            row_width: def.estimated_row_width(),
            buffer_mgr,
            row_count: AtomicUsize::new(0),
            sealed: AtomicBool::new(false),
            data: Mutex::new(SegmentData::default()),
        }
    }

    #[inline]
    pub fn segment_id(&self) -> SegmentId {
        self.segment_id
    }

    #[inline]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline]
    pub fn row_count(&self) -> usize {
        self.row_count.load(Ordering::Acquire)
    }

    #[inline]
    pub fn available_capacity(&self) -> usize {
        self.capacity - self.row_count()
    }

    #[inline]
    pub fn is_sealed(&self) -> bool {
        self.sealed.load(Ordering::Acquire)
    }

    pub(crate) fn seal(&self) {
        self.sealed.store(true, Ordering::Release);
    }

    /// Copies as many rows from `state` as fit, stamping them with `commit_ts`.
    ///
    /// Returns the number of rows taken, which is 0 if the segment filled up in the meantime.
    pub fn append(&self, commit_ts: Timestamp, state: &mut AppendState<'_>) -> StorageResult<usize> {
        let mut data = self.data.lock();
        let row_count = self.row_count();
        let available = self.capacity - row_count;
        if available == 0 || state.finished() {
            return Ok(0);
        }

        let block = &state.blocks[state.block_idx];
        let want = available.min(block.len() - state.offset);
        let bytes = want * self.row_width;
        self.buffer_mgr.reserve(bytes)?;
        data.reserved_bytes += bytes;

        let Some(rows) = state.take(want) else {
            return Ok(0);
        };
        if data
            .appends
            .last()
            .is_none_or(|last| last.commit_ts != commit_ts)
        {
            data.appends.push(AppendRange {
                start: row_count,
                commit_ts,
            });
        }
        data.blocks.push(rows);
        self.row_count.store(row_count + want, Ordering::Release);
        Ok(want)
    }

    /// Checks that a transaction reading at `begin_ts` may delete the rows at `offsets`.
    ///
    /// Fails with [`StorageError::RowNotFound`] for a row the reader does not see, and with
    /// [`StorageError::DeleteConflict`] for a row deleted by a commit after `begin_ts`.
    pub fn check_delete(&self, begin_ts: Timestamp, offsets: &[u32]) -> StorageResult<()> {
        let data = self.data.lock();
        data.check_delete(self.segment_id, self.row_count(), begin_ts, offsets)
    }

    /// Marks rows at `offsets` as deleted at `commit_ts` on behalf of a transaction reading at
    /// `begin_ts`.
    ///
    /// All offsets are checked as in [`check_delete`](Self::check_delete) before any is applied.
    /// Returns the number of distinct rows deleted.
    pub fn delete(
        &self,
        begin_ts: Timestamp,
        commit_ts: Timestamp,
        offsets: &[u32],
    ) -> StorageResult<usize> {
        let mut data = self.data.lock();
        data.check_delete(self.segment_id, self.row_count(), begin_ts, offsets)?;
        let deleted = offsets
            .iter()
            .filter(|offset| data.deletes.insert(**offset, commit_ts).is_none())
            .count();
        Ok(deleted)
    }

    /// Returns the rows visible at `begin_ts`, projected to `column_ids`, or `None` if no row is.
    pub fn scan(&self, begin_ts: Timestamp, column_ids: &[ColumnId]) -> Option<ScanOutput> {
        let data = self.data.lock();
        let row_count = self.row_count();
        let mut mask = Vec::with_capacity(row_count);
        let mut row_ids = Vec::new();
        for offset in 0..row_count {
            let visible = data.is_visible(offset, begin_ts);
            if visible {
                row_ids.push(RowId::new(self.segment_id, offset as u32));
            }
            mask.push(visible);
        }
        if row_ids.is_empty() {
            return None;
        }

        let block: DataBlock = data.blocks.iter().map(|b| b.project(column_ids)).collect();
        let mut block = block.with_filter(BooleanArray::from(mask));
        block.compact();
        Some(ScanOutput { block, row_ids })
    }

    pub fn visible_row_count(&self, begin_ts: Timestamp) -> usize {
        let data = self.data.lock();
        (0..self.row_count())
            .filter(|offset| data.is_visible(*offset, begin_ts))
            .count()
    }
}

impl Drop for Segment {
    fn drop(&mut self) {
        let reserved = self.data.get_mut().reserved_bytes;
        self.buffer_mgr.release(reserved);
    }
}

#[cfg(test)]
mod tests {
    use arrow::array::{Array, AsArray};
    use arrow::datatypes::Int32Type;
    use ember_common::data_block;
    use ember_common::data_type::{ColumnDef, LogicalType};

    use super::*;
    use crate::buffer::BufferManagerConfig;

    fn def() -> TableDef {
        TableDef::new("t", vec![
            ColumnDef::new("a", LogicalType::Int32, false),
            ColumnDef::new("b", LogicalType::String, false),
        ])
    }

    fn segment(capacity: usize, memory_limit: usize) -> (Segment, Arc<BufferManager>) {
        let mgr = Arc::new(BufferManager::new("/tmp/ember", &BufferManagerConfig {
            memory_limit,
        }));
        let seg = Segment::new(3, Path::new("/tmp/ember/db/t"), capacity, &def(), mgr.clone());
        (seg, mgr)
    }

    fn ts(raw: u64) -> Timestamp {
        Timestamp::with_ts(raw)
    }

    fn column_a(out: &ScanOutput) -> Vec<i32> {
        out.block
            .column(0)
            .as_primitive::<Int32Type>()
            .values()
            .to_vec()
    }

    #[test]
    fn test_append_stops_at_capacity() {
        let (seg, mgr) = segment(4, 1 << 20);
        assert_eq!(seg.dir(), Path::new("/tmp/ember/db/t/seg_3"));
        let blocks = vec![
            data_block!((Int32, [1, 2, 3]), (Utf8, ["a", "b", "c"])),
            data_block!((Int32, [4, 5, 6]), (Utf8, ["d", "e", "f"])),
        ];
        let mut state = AppendState::new(&blocks);
        assert_eq!(seg.append(ts(5), &mut state).unwrap(), 3);
        assert_eq!(seg.append(ts(5), &mut state).unwrap(), 1);
        assert_eq!(seg.append(ts(5), &mut state).unwrap(), 0);
        assert!(!state.finished());
        assert_eq!(state.appended_rows(), 4);
        assert_eq!(seg.row_count(), 4);
        assert_eq!(seg.available_capacity(), 0);
        assert_eq!(mgr.used_bytes(), 4 * 20);

        drop(seg);
        assert_eq!(mgr.used_bytes(), 0);
    }

    #[test]
    fn test_append_fails_when_buffer_is_exhausted() {
        let (seg, mgr) = segment(16, 50);
        let blocks = vec![data_block!((Int32, [1, 2, 3]), (Utf8, ["a", "b", "c"]))];
        let mut state = AppendState::new(&blocks);
        let err = seg.append(ts(1), &mut state).unwrap_err();
        assert!(matches!(err, StorageError::BufferExhausted { .. }));
        assert_eq!(seg.row_count(), 0);
        assert_eq!(state.appended_rows(), 0);
        assert_eq!(mgr.used_bytes(), 0);
    }

    #[test]
    fn test_scan_respects_commit_ts() {
        let (seg, _mgr) = segment(16, 1 << 20);
        let first = vec![data_block!((Int32, [1, 2]), (Utf8, ["a", "b"]))];
        let second = vec![data_block!((Int32, [3]), (Utf8, ["c"]))];
        seg.append(ts(10), &mut AppendState::new(&first)).unwrap();
        seg.append(ts(20), &mut AppendState::new(&second)).unwrap();

        assert!(seg.scan(ts(9), &[0]).is_none());
        let out = seg.scan(ts(15), &[0]).unwrap();
        assert_eq!(column_a(&out), vec![1, 2]);
        assert_eq!(out.row_ids, vec![RowId::new(3, 0), RowId::new(3, 1)]);

        let out = seg.scan(ts(20), &[1, 0]).unwrap();
        assert_eq!(out.block.num_columns(), 2);
        assert_eq!(out.block.column(0).len(), 3);
        assert_eq!(seg.visible_row_count(ts(20)), 3);
    }

    #[test]
    fn test_delete_is_versioned() {
        let (seg, _mgr) = segment(16, 1 << 20);
        let blocks = vec![data_block!((Int32, [1, 2, 3]), (Utf8, ["a", "b", "c"]))];
        seg.append(ts(10), &mut AppendState::new(&blocks)).unwrap();

        assert_eq!(seg.delete(ts(10), ts(20), &[1, 1]).unwrap(), 1);
        assert_eq!(
            seg.delete(ts(30), ts(40), &[1]).unwrap_err(),
            StorageError::RowNotFound(RowId::new(3, 1))
        );
        assert_eq!(
            seg.delete(ts(30), ts(40), &[0, 3]).unwrap_err(),
            StorageError::RowNotFound(RowId::new(3, 3))
        );

        assert_eq!(column_a(&seg.scan(ts(15), &[0]).unwrap()), vec![1, 2, 3]);
        assert_eq!(column_a(&seg.scan(ts(20), &[0]).unwrap()), vec![1, 3]);
        // The rejected batch left row 0 alone.
        assert_eq!(seg.visible_row_count(ts(40)), 2);
    }

    #[test]
    fn test_delete_of_row_appended_after_snapshot() {
        let (seg, _mgr) = segment(16, 1 << 20);
        let first = vec![data_block!((Int32, [1]), (Utf8, ["a"]))];
        let second = vec![data_block!((Int32, [2]), (Utf8, ["b"]))];
        seg.append(ts(10), &mut AppendState::new(&first)).unwrap();
        seg.append(ts(20), &mut AppendState::new(&second)).unwrap();

        assert_eq!(
            seg.check_delete(ts(15), &[0, 1]).unwrap_err(),
            StorageError::RowNotFound(RowId::new(3, 1))
        );
        assert_eq!(
            seg.delete(ts(15), ts(30), &[0, 1]).unwrap_err(),
            StorageError::RowNotFound(RowId::new(3, 1))
        );
        assert_eq!(seg.visible_row_count(ts(30)), 2);
        seg.check_delete(ts(20), &[0, 1]).unwrap();
    }

    #[test]
    fn test_concurrent_delete_conflicts() {
        let (seg, _mgr) = segment(16, 1 << 20);
        let blocks = vec![data_block!((Int32, [1, 2]), (Utf8, ["a", "b"]))];
        seg.append(ts(10), &mut AppendState::new(&blocks)).unwrap();

        // Two readers at 10 both see row 0. The first to commit wins.
        seg.check_delete(ts(10), &[0]).unwrap();
        assert_eq!(seg.delete(ts(10), ts(20), &[0]).unwrap(), 1);
        let conflict = StorageError::DeleteConflict {
            row_id: RowId::new(3, 0),
            deleted_at: ts(20),
        };
        assert_eq!(seg.check_delete(ts(10), &[0]).unwrap_err(), conflict);
        assert_eq!(seg.delete(ts(10), ts(30), &[1, 0]).unwrap_err(), conflict);

        // Row 1 was not touched by the rejected batch.
        assert_eq!(column_a(&seg.scan(ts(30), &[0]).unwrap()), vec![2]);
    }
}
