use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use ember_transaction::Timestamp;
use strum::Display;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "lowercase")]
pub enum EntryType {
    Database,
    Table,
}

/// Versioning state shared by all catalog entries.
///
/// `commit_ts` holds the id of the writing transaction until the writer commits, then the commit
/// timestamp. Once it holds a commit timestamp it never changes again.
#[derive(Debug)]
pub struct EntryBase {
    entry_type: EntryType,
    txn_id: Timestamp,
    commit_ts: AtomicU64,
    deleted: bool,
}

impl EntryBase {
    pub fn new(entry_type: EntryType, txn_id: Timestamp, deleted: bool) -> Self {
        debug_assert!(txn_id.is_txn_id());
        Self {
            entry_type,
            txn_id,
            commit_ts: AtomicU64::new(txn_id.raw()),
            deleted,
        }
    }

    #[inline]
    pub fn entry_type(&self) -> EntryType {
        self.entry_type
    }

    /// The transaction that wrote this version.
    #[inline]
    pub fn txn_id(&self) -> Timestamp {
        self.txn_id
    }

    #[inline]
    pub fn commit_ts(&self) -> Timestamp {
        Timestamp::with_ts(self.commit_ts.load(Ordering::Acquire))
    }

    #[inline]
    pub fn is_deleted(&self) -> bool {
        self.deleted
    }

    #[inline]
    pub fn is_committed(&self) -> bool {
        self.commit_ts().is_commit_ts()
    }

    /// Whether this version is still pending in transaction `txn_id`.
    #[inline]
    pub fn is_uncommitted_by(&self, txn_id: Timestamp) -> bool {
        self.commit_ts() == txn_id
    }

    /// Publishes this version at `commit_ts`.
    pub fn commit(&self, commit_ts: Timestamp) {
        debug_assert!(commit_ts.is_commit_ts());
        debug_assert!(!self.is_committed(), "entry is already committed");
        self.commit_ts.store(commit_ts.raw(), Ordering::Release);
    }

    /// A version is a visibility candidate for `(txn_id, begin_ts)` if the reader wrote it itself,
    /// or if it committed no later than `begin_ts`.
    pub fn is_visible(&self, txn_id: Timestamp, begin_ts: Timestamp) -> bool {
        let commit_ts = self.commit_ts();
        (commit_ts.is_txn_id() && commit_ts == txn_id)
            || (commit_ts.is_commit_ts() && commit_ts <= begin_ts)
    }
}

/// An object kept in a version chain.
pub trait CatalogEntry: fmt::Debug + Send + Sync {
    const ENTRY_TYPE: EntryType;

    fn base(&self) -> &EntryBase;

    /// Builds the deletion marker written when this version is dropped.
    fn to_tombstone(&self, base: EntryBase) -> Self
    where
        Self: Sized;
}
