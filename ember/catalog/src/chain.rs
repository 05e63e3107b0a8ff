use std::sync::Arc;

use ember_transaction::Timestamp;

use crate::entry::CatalogEntry;

/// Versions of one catalog name, newest first.
///
/// Stored as a stack: the newest version is the last element, so prepending a version is a push.
#[derive(Debug)]
pub struct VersionChain<E> {
    versions: Vec<Arc<E>>,
}

impl<E> Default for VersionChain<E> {
    fn default() -> Self {
        Self {
            versions: Vec::new(),
        }
    }
}

impl<E: CatalogEntry> VersionChain<E> {
    #[inline]
    pub fn len(&self) -> usize {
        self.versions.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }

    /// The newest version.
    #[inline]
    pub fn head(&self) -> Option<&Arc<E>> {
        self.versions.last()
    }

    /// Iterates from the newest to the oldest version.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<E>> {
        self.versions.iter().rev()
    }

    #[inline]
    pub fn prepend(&mut self, entry: Arc<E>) {
        self.versions.push(entry);
    }

    /// The first version visible to `(txn_id, begin_ts)`, possibly a tombstone.
    pub fn visible(&self, txn_id: Timestamp, begin_ts: Timestamp) -> Option<&Arc<E>> {
        self.iter()
            .find(|entry| entry.base().is_visible(txn_id, begin_ts))
    }

    /// Removes `entry` by identity. Returns whether it was in the chain.
    pub fn remove(&mut self, entry: &Arc<E>) -> bool {
        match self.versions.iter().rposition(|e| Arc::ptr_eq(e, entry)) {
            Some(pos) => {
                self.versions.remove(pos);
                true
            }
            None => false,
        }
    }

    /// Removes every version still pending in `txn_id`, returning how many were removed.
    pub fn remove_uncommitted(&mut self, txn_id: Timestamp) -> usize {
        let before = self.versions.len();
        self.versions
            .retain(|entry| !entry.base().is_uncommitted_by(txn_id));
        before - self.versions.len()
    }
}
