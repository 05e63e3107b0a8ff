//! Timestamps and transaction ids.
//!
//! Both share a single `u64` space split by the highest bit, so a catalog entry can carry the id
//! of its writer in its commit-timestamp slot until the writer commits.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::error::TimestampError;

/// A commit timestamp or a transaction id.
///
/// Commit timestamps start from 0, transaction ids start from `1 << 63`. A timestamp is a
/// transaction id iff its highest bit is set.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct Timestamp(u64);

impl Timestamp {
    /// The start of the transaction ID range.
    pub const TXN_ID_START: u64 = 1 << 63;

    /// Creates a timestamp from a raw value, in either domain.
    #[inline]
    pub const fn with_ts(timestamp: u64) -> Self {
        Self(timestamp)
    }

    /// Returns the maximum possible commit timestamp.
    #[inline]
    pub const fn max_commit_ts() -> Self {
        Self(!Self::TXN_ID_START)
    }

    #[inline]
    pub fn is_txn_id(&self) -> bool {
        self.0 & Self::TXN_ID_START != 0
    }

    #[inline]
    pub fn is_commit_ts(&self) -> bool {
        self.0 & Self::TXN_ID_START == 0
    }

    #[inline]
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_txn_id() {
            write!(f, "txn#{}", self.0 & !Self::TXN_ID_START)
        } else {
            write!(f, "{}", self.0)
        }
    }
}

/// Monotonic source of begin and commit timestamps.
#[derive(Debug)]
pub struct TimestampGenerator {
    counter: AtomicU64,
}

impl TimestampGenerator {
    pub fn new() -> Self {
        Self::with_start(1)
    }

    pub fn with_start(start: u64) -> Self {
        Self {
            counter: AtomicU64::new(start),
        }
    }

    /// Hands out the current value and advances the counter.
    pub fn next(&self) -> Result<Timestamp, TimestampError> {
        let mut cur = self.counter.load(Ordering::SeqCst);
        loop {
            if cur >= Timestamp::max_commit_ts().raw() {
                return Err(TimestampError::CommitTsOverflow(cur));
            }
            match self.counter.compare_exchange_weak(
                cur,
                cur + 1,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => return Ok(Timestamp::with_ts(cur)),
                Err(actual) => cur = actual,
            }
        }
    }

    /// Returns the value the next call to [`next`](Self::next) would hand out.
    pub fn current(&self) -> Timestamp {
        Timestamp::with_ts(self.counter.load(Ordering::SeqCst))
    }

    /// Moves the counter past `ts`, so that externally chosen timestamps are never reissued.
    pub fn update_if_greater(&self, ts: Timestamp) -> Result<(), TimestampError> {
        if !ts.is_commit_ts() {
            return Err(TimestampError::WrongDomainCommit(ts.raw()));
        }
        if ts.raw() >= Timestamp::max_commit_ts().raw() {
            return Err(TimestampError::CommitTsOverflow(ts.raw()));
        }
        self.counter.fetch_max(ts.raw() + 1, Ordering::SeqCst);
        Ok(())
    }
}

impl Default for TimestampGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug)]
pub struct TxnIdGenerator {
    counter: AtomicU64,
}

impl TxnIdGenerator {
    pub fn new() -> Self {
        Self {
            counter: AtomicU64::new(Timestamp::TXN_ID_START + 1),
        }
    }

    pub fn next(&self) -> Result<Timestamp, TimestampError> {
        let cur = self.counter.fetch_add(1, Ordering::SeqCst);
        if cur == u64::MAX {
            return Err(TimestampError::TxnIdOverflow(cur));
        }
        Ok(Timestamp::with_ts(cur))
    }
}

impl Default for TxnIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}
