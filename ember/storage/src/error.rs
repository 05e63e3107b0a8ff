use ember_common::types::{ColumnId, RowId};
use ember_transaction::Timestamp;
use thiserror::Error;

pub type StorageResult<T> = Result<T, StorageError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    #[error("buffer manager exhausted: requested {requested} bytes, {available} bytes available")]
    BufferExhausted { requested: usize, available: usize },
    #[error("schema mismatch: {0}")]
    SchemaMismatch(String),
    #[error("row {0} not found")]
    RowNotFound(RowId),
    #[error("row {row_id} was deleted at {deleted_at} by a concurrent transaction")]
    DeleteConflict { row_id: RowId, deleted_at: Timestamp },
    #[error("column {0} not found")]
    ColumnNotFound(ColumnId),
    #[error("scan projection is empty")]
    EmptyProjection,
}
