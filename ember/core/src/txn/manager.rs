use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use ember_catalog::Catalog;
use ember_transaction::{Timestamp, TimestampError, TimestampGenerator, TxnIdGenerator};
use parking_lot::{Mutex, MutexGuard};

use super::Txn;
use crate::error::Result;

/// Hands out transactions and serializes their commits.
#[derive(Debug)]
pub struct TxnManager {
    catalog: Arc<Catalog>,
    ts_generator: TimestampGenerator,
    txn_id_generator: TxnIdGenerator,
    /// Held for the whole apply phase of a commit.
    commit_lock: Mutex<()>,
    /// Commit timestamp of the last fully applied commit. New transactions read as of it.
    latest_commit_ts: AtomicU64,
    /// Active transactions' begin timestamps by txn id.
    active_txns: DashMap<Timestamp, Timestamp>,
}

impl TxnManager {
    pub fn new(catalog: Arc<Catalog>) -> Self {
        Self {
            catalog,
            ts_generator: TimestampGenerator::new(),
            txn_id_generator: TxnIdGenerator::new(),
            commit_lock: Mutex::new(()),
            latest_commit_ts: AtomicU64::new(0),
            active_txns: DashMap::new(),
        }
    }

    #[inline]
    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    /// Creates a transaction in `NotStarted` state.
    pub fn create_txn(self: &Arc<Self>) -> Result<Txn> {
        let txn_id = self.txn_id_generator.next()?;
        Ok(Txn::new(self.clone(), txn_id))
    }

    /// Begins a transaction reading the latest committed state.
    pub fn begin_txn(self: &Arc<Self>) -> Result<Txn> {
        self.begin_txn_at(None)
    }

    /// Begins a transaction reading as of `begin_ts`, or as of the latest commit if `None`.
    pub fn begin_txn_at(self: &Arc<Self>, begin_ts: Option<Timestamp>) -> Result<Txn> {
        let mut txn = self.create_txn()?;
        txn.begin(begin_ts)?;
        Ok(txn)
    }

    #[inline]
    pub fn latest_commit_ts(&self) -> Timestamp {
        Timestamp::with_ts(self.latest_commit_ts.load(Ordering::Acquire))
    }

    /// The minimum begin timestamp of the active transactions, or the latest commit timestamp if
    /// there is none. No active transaction reads versions older than this.
    pub fn low_watermark(&self) -> Timestamp {
        self.active_txns
            .iter()
            .map(|entry| *entry.value())
            .min()
            .unwrap_or_else(|| self.latest_commit_ts())
    }

    pub fn num_active_txns(&self) -> usize {
        self.active_txns.len()
    }

    pub(crate) fn assign_begin_ts(&self, requested: Option<Timestamp>) -> Result<Timestamp> {
        match requested {
            Some(ts) => {
                self.ts_generator.update_if_greater(ts)?;
                Ok(ts)
            }
            None => Ok(self.latest_commit_ts()),
        }
    }

    pub(crate) fn register(&self, txn_id: Timestamp, begin_ts: Timestamp) {
        self.active_txns.insert(txn_id, begin_ts);
    }

    pub(crate) fn finish(&self, txn_id: Timestamp) {
        self.active_txns.remove(&txn_id);
    }

    pub(crate) fn lock_commit(&self) -> MutexGuard<'_, ()> {
        self.commit_lock.lock()
    }

    /// Picks the commit timestamp. Must be called with the commit lock held, so commit timestamps
    /// are issued in commit order.
    ///
    /// A requested timestamp must not be below any timestamp handed out so far, whether as a
    /// commit timestamp or as an explicit begin timestamp. Otherwise running transactions would
    /// see the commit appear inside their snapshots.
    pub(crate) fn assign_commit_ts(&self, requested: Option<Timestamp>) -> Result<Timestamp> {
        match requested {
            Some(ts) => {
                let min = self.ts_generator.current();
                if ts < min {
                    return Err(TimestampError::StaleCommit {
                        requested: ts.raw(),
                        min: min.raw(),
                    }
                    .into());
                }
                self.ts_generator.update_if_greater(ts)?;
                Ok(ts)
            }
            None => Ok(self.ts_generator.next()?),
        }
    }

    /// Makes a fully applied commit the read point of new transactions. Must be called with the
    /// commit lock held.
    pub(crate) fn publish_commit(&self, commit_ts: Timestamp) {
        self.latest_commit_ts
            .fetch_max(commit_ts.raw(), Ordering::AcqRel);
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use ember_storage::{BufferManager, BufferManagerConfig};
    use ember_transaction::TxnState;

    use super::*;
    use crate::error::Error;

    fn manager() -> Arc<TxnManager> {
        let mgr = Arc::new(BufferManager::new("/tmp/ember", &BufferManagerConfig::default()));
        let catalog = Arc::new(Catalog::new(PathBuf::from("/tmp/ember"), mgr, 16));
        Arc::new(TxnManager::new(catalog))
    }

    #[test]
    fn test_create_txn_is_not_started() {
        let manager = manager();
        let txn = manager.create_txn().unwrap();
        assert_eq!(txn.state(), TxnState::NotStarted);
        assert!(txn.txn_id().is_txn_id());
        assert_eq!(manager.num_active_txns(), 0);
    }

    #[test]
    fn test_commit_advances_read_point() {
        let manager = manager();
        let mut txn = manager.begin_txn().unwrap();
        assert_eq!(txn.begin_ts(), Timestamp::with_ts(0));
        let commit_ts = txn.commit().unwrap();
        assert_eq!(manager.latest_commit_ts(), commit_ts);

        let txn = manager.begin_txn().unwrap();
        assert_eq!(txn.begin_ts(), commit_ts);
    }

    #[test]
    fn test_low_watermark() {
        let manager = manager();
        assert_eq!(manager.low_watermark(), Timestamp::with_ts(0));

        let mut t1 = manager.begin_txn_at(Some(Timestamp::with_ts(5))).unwrap();
        let t2 = manager.begin_txn_at(Some(Timestamp::with_ts(9))).unwrap();
        assert_eq!(manager.num_active_txns(), 2);
        assert_eq!(manager.low_watermark(), Timestamp::with_ts(5));

        t1.rollback().unwrap();
        assert_eq!(manager.low_watermark(), Timestamp::with_ts(9));
        drop(t2);
        assert_eq!(manager.num_active_txns(), 0);
        assert_eq!(manager.low_watermark(), manager.latest_commit_ts());
    }

    #[test]
    fn test_explicit_timestamps_are_not_reissued() {
        let manager = manager();
        let mut txn = manager.begin_txn_at(Some(Timestamp::with_ts(100))).unwrap();
        let commit_ts = txn.commit().unwrap();
        assert!(commit_ts > Timestamp::with_ts(100));

        let txn_id = Timestamp::with_ts(Timestamp::TXN_ID_START + 7);
        assert!(manager.begin_txn_at(Some(txn_id)).is_err());
    }

    #[test]
    fn test_stale_commit_ts_is_rejected() {
        let manager = manager();
        let _reader = manager.begin_txn_at(Some(Timestamp::with_ts(40))).unwrap();
        let _guard = manager.lock_commit();
        assert_eq!(
            manager.assign_commit_ts(Some(Timestamp::with_ts(40))),
            Err(Error::Timestamp(TimestampError::StaleCommit {
                requested: 40,
                min: 41,
            }))
        );
        assert_eq!(
            manager.assign_commit_ts(Some(Timestamp::with_ts(41))),
            Ok(Timestamp::with_ts(41))
        );
        assert_eq!(manager.assign_commit_ts(None), Ok(Timestamp::with_ts(42)));
    }
}
