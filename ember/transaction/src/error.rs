use thiserror::Error;

use crate::context::TxnState;
use crate::timestamp::Timestamp;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TimestampError {
    #[error("expected commit-ts, but got txn-id ({0})")]
    WrongDomainCommit(u64),

    #[error("commit-ts {requested} is stale, the next commit-ts must be at least {min}")]
    StaleCommit { requested: u64, min: u64 },

    #[error("commit-ts overflow, reached {0}")]
    CommitTsOverflow(u64),

    #[error("txn-id overflow, reached {0}")]
    TxnIdOverflow(u64),
}

/// A state-machine precondition did not hold. This is a bug in the caller, not a data condition.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TxnStateError {
    #[error("transaction {txn_id} is in {actual} state, expected {expected}")]
    InvalidState {
        txn_id: Timestamp,
        expected: TxnState,
        actual: TxnState,
    },
}
