use std::fmt;

use serde::{Deserialize, Serialize};

/// Internal identifier associated with a segment (table-wide unique).
pub type SegmentId = u64;

/// Index of a column inside a table definition.
pub type ColumnId = usize;

/// Physical address of a row: the segment it lives in and its offset inside that segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RowId {
    pub segment_id: SegmentId,
    pub offset: u32,
}

impl RowId {
    #[inline]
    pub const fn new(segment_id: SegmentId, offset: u32) -> Self {
        Self { segment_id, offset }
    }
}

impl fmt::Display for RowId {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.segment_id, self.offset)
    }
}
