pub mod buffer;
pub mod error;
pub mod scan;
pub mod segment;
pub mod table;

pub use buffer::{BufferManager, BufferManagerConfig};
pub use error::{StorageError, StorageResult};
pub use scan::{ScanOutput, TableScanState};
pub use segment::{AppendState, DEFAULT_SEGMENT_CAPACITY, Segment};
pub use table::DataTable;
