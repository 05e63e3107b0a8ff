use std::collections::VecDeque;
use std::sync::Arc;

use ember_common::data_block::DataBlock;
use ember_common::types::{ColumnId, RowId};
use ember_transaction::Timestamp;

use crate::segment::Segment;

/// Rows produced by one scan step, with the address of every row.
#[derive(Debug, Clone)]
pub struct ScanOutput {
    pub block: DataBlock,
    pub row_ids: Vec<RowId>,
}

/// Segment-at-a-time scan over a snapshot of a table's segments.
#[derive(Debug)]
pub struct TableScanState {
    begin_ts: Timestamp,
    column_ids: Vec<ColumnId>,
    segments: VecDeque<Arc<Segment>>,
}

impl TableScanState {
    pub(crate) fn new(
        begin_ts: Timestamp,
        column_ids: Vec<ColumnId>,
        segments: VecDeque<Arc<Segment>>,
    ) -> Self {
        Self {
            begin_ts,
            column_ids,
            segments,
        }
    }

    #[inline]
    pub fn begin_ts(&self) -> Timestamp {
        self.begin_ts
    }

    #[inline]
    pub fn column_ids(&self) -> &[ColumnId] {
        &self.column_ids
    }

    /// Segments not yet visited.
    #[inline]
    pub fn remaining_segments(&self) -> usize {
        self.segments.len()
    }
}

impl Iterator for TableScanState {
    type Item = ScanOutput;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(segment) = self.segments.pop_front() {
            if let Some(output) = segment.scan(self.begin_ts, &self.column_ids) {
                return Some(output);
            }
        }
        None
    }
}
