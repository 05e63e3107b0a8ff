//! Per-transaction state machine.
//!
//! ```text
//! NotStarted -> Started -> Committing -> Committed
//!                  |           |
//!                  v           |
//!             Rollbacking <----+
//!                  |
//!                  v
//!             Rollbacked
//! ```
//!
//! A commit that fails before publishing anything falls back to `Rollbacking`.
//!
//! Every transition takes the context lock and checks its precondition. A failed check is a
//! contract violation reported as [`TxnStateError::InvalidState`].

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use strum::Display;

use crate::error::TxnStateError;
use crate::timestamp::Timestamp;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum TxnState {
    NotStarted,
    Started,
    Committing,
    Committed,
    Rollbacking,
    Rollbacked,
}

#[derive(Debug)]
struct ContextInner {
    begin_ts: Timestamp,
    commit_ts: Option<Timestamp>,
    state: TxnState,
}

#[derive(Debug)]
pub struct TxnContext {
    txn_id: Timestamp,
    inner: RwLock<ContextInner>,
}

impl TxnContext {
    pub fn new(txn_id: Timestamp) -> Self {
        debug_assert!(txn_id.is_txn_id());
        Self {
            txn_id,
            inner: RwLock::new(ContextInner {
                begin_ts: Timestamp::default(),
                commit_ts: None,
                state: TxnState::NotStarted,
            }),
        }
    }

    #[inline]
    pub fn txn_id(&self) -> Timestamp {
        self.txn_id
    }

    /// Reads `(begin_ts, state)` in one lock scope.
    #[inline]
    pub fn snapshot(&self) -> (Timestamp, TxnState) {
        let inner = self.inner.read();
        (inner.begin_ts, inner.state)
    }

    #[inline]
    pub fn state(&self) -> TxnState {
        self.inner.read().state
    }

    #[inline]
    pub fn begin_ts(&self) -> Timestamp {
        self.inner.read().begin_ts
    }

    #[inline]
    pub fn commit_ts(&self) -> Option<Timestamp> {
        self.inner.read().commit_ts
    }

    /// The only `NotStarted -> Started` transition. Stamps `begin_ts`.
    pub fn begin(&self, begin_ts: Timestamp) -> Result<(), TxnStateError> {
        let mut inner = self.inner.write();
        self.check(inner.state, TxnState::NotStarted)?;
        inner.begin_ts = begin_ts;
        inner.state = TxnState::Started;
        Ok(())
    }

    pub fn start_commit(&self) -> Result<(), TxnStateError> {
        self.transit(TxnState::Started, TxnState::Committing)
    }

    /// Records the commit timestamp assigned while the transaction is committing.
    pub fn set_commit_ts(&self, commit_ts: Timestamp) -> Result<(), TxnStateError> {
        let mut inner = self.inner.write();
        self.check(inner.state, TxnState::Committing)?;
        inner.commit_ts = Some(commit_ts);
        Ok(())
    }

    pub fn finish_commit(&self) -> Result<(), TxnStateError> {
        self.transit(TxnState::Committing, TxnState::Committed)
    }

    /// `Committing -> Rollbacking`, for a commit that failed before any of its changes were
    /// published. Clears the commit timestamp.
    pub fn abort_commit(&self) -> Result<(), TxnStateError> {
        let mut inner = self.inner.write();
        self.check(inner.state, TxnState::Committing)?;
        inner.commit_ts = None;
        inner.state = TxnState::Rollbacking;
        Ok(())
    }

    /// `Started -> Rollbacking`. Repeating it while already rolling back is a no-op, so a retried
    /// rollback is tolerated.
    pub fn start_rollback(&self) -> Result<(), TxnStateError> {
        let mut inner = self.inner.write();
        match inner.state {
            TxnState::Started => {
                inner.state = TxnState::Rollbacking;
                Ok(())
            }
            TxnState::Rollbacking => Ok(()),
            actual => self.check(actual, TxnState::Started),
        }
    }

    pub fn finish_rollback(&self) -> Result<(), TxnStateError> {
        self.transit(TxnState::Rollbacking, TxnState::Rollbacked)
    }

    fn transit(&self, expected: TxnState, next: TxnState) -> Result<(), TxnStateError> {
        let mut inner = self.inner.write();
        self.check(inner.state, expected)?;
        inner.state = next;
        Ok(())
    }

    #[inline]
    fn check(&self, actual: TxnState, expected: TxnState) -> Result<(), TxnStateError> {
        if actual == expected {
            Ok(())
        } else {
            Err(TxnStateError::InvalidState {
                txn_id: self.txn_id,
                expected,
                actual,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> TxnContext {
        TxnContext::new(Timestamp::with_ts(Timestamp::TXN_ID_START + 1))
    }

    #[test]
    fn test_commit_path() {
        let ctx = context();
        assert_eq!(ctx.state(), TxnState::NotStarted);
        ctx.begin(Timestamp::with_ts(10)).unwrap();
        assert_eq!(ctx.snapshot(), (Timestamp::with_ts(10), TxnState::Started));
        ctx.start_commit().unwrap();
        ctx.set_commit_ts(Timestamp::with_ts(20)).unwrap();
        ctx.finish_commit().unwrap();
        assert_eq!(ctx.state(), TxnState::Committed);
        assert_eq!(ctx.commit_ts(), Some(Timestamp::with_ts(20)));
    }

    #[test]
    fn test_rollback_is_idempotent() {
        let ctx = context();
        ctx.begin(Timestamp::with_ts(1)).unwrap();
        ctx.start_rollback().unwrap();
        ctx.start_rollback().unwrap();
        ctx.finish_rollback().unwrap();
        assert_eq!(ctx.state(), TxnState::Rollbacked);
        assert_eq!(ctx.commit_ts(), None);
    }

    #[test]
    fn test_begin_twice_is_rejected() {
        let ctx = context();
        ctx.begin(Timestamp::with_ts(1)).unwrap();
        let err = ctx.begin(Timestamp::with_ts(2)).unwrap_err();
        assert_eq!(err, TxnStateError::InvalidState {
            txn_id: ctx.txn_id(),
            expected: TxnState::NotStarted,
            actual: TxnState::Started,
        });
        assert_eq!(ctx.begin_ts(), Timestamp::with_ts(1));
    }

    #[test]
    fn test_invalid_transitions() {
        let ctx = context();
        assert!(ctx.start_commit().is_err());
        assert!(ctx.start_rollback().is_err());

        ctx.begin(Timestamp::with_ts(1)).unwrap();
        assert!(ctx.finish_commit().is_err());
        assert!(ctx.set_commit_ts(Timestamp::with_ts(2)).is_err());

        ctx.start_commit().unwrap();
        assert!(ctx.start_rollback().is_err());
        ctx.finish_commit().unwrap();
        assert!(ctx.start_commit().is_err());
    }

    #[test]
    fn test_abort_commit() {
        let ctx = context();
        ctx.begin(Timestamp::with_ts(1)).unwrap();
        assert!(ctx.abort_commit().is_err());

        ctx.start_commit().unwrap();
        ctx.set_commit_ts(Timestamp::with_ts(7)).unwrap();
        ctx.abort_commit().unwrap();
        assert_eq!(ctx.state(), TxnState::Rollbacking);
        assert_eq!(ctx.commit_ts(), None);
        ctx.finish_rollback().unwrap();
        assert_eq!(ctx.state(), TxnState::Rollbacked);
    }

    #[test]
    fn test_state_display() {
        assert_eq!(TxnState::NotStarted.to_string(), "NOT_STARTED");
        assert_eq!(TxnState::Rollbacking.to_string(), "ROLLBACKING");
    }
}
