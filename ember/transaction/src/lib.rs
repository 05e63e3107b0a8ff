//! Transaction infrastructure shared by the catalog and storage layers: timestamps, id
//! generation, and the per-transaction state machine.

pub mod context;
pub mod error;
pub mod timestamp;

pub use context::{TxnContext, TxnState};
pub use error::{TimestampError, TxnStateError};
pub use timestamp::{Timestamp, TimestampGenerator, TxnIdGenerator};
