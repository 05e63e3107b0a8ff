use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use serde::{Deserialize, Serialize};

use crate::error::{StorageError, StorageResult};

const DEFAULT_MEMORY_LIMIT: usize = 1 << 30;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BufferManagerConfig {
    /// Upper bound on the bytes all segments may hold at once.
    pub memory_limit: usize,
}

impl Default for BufferManagerConfig {
    fn default() -> Self {
        Self {
            memory_limit: DEFAULT_MEMORY_LIMIT,
        }
    }
}

/// Handle to the storage backing column data.
///
/// The catalog only passes it along; segments reserve memory from it before accepting rows and
/// give the memory back when they are dropped.
#[derive(Debug)]
pub struct BufferManager {
    base_dir: PathBuf,
    memory_limit: usize,
    used: AtomicUsize,
}

impl BufferManager {
    pub fn new(base_dir: impl Into<PathBuf>, config: &BufferManagerConfig) -> Self {
        Self {
            base_dir: base_dir.into(),
            memory_limit: config.memory_limit,
            used: AtomicUsize::new(0),
        }
    }

    #[inline]
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    #[inline]
    pub fn memory_limit(&self) -> usize {
        self.memory_limit
    }

    #[inline]
    pub fn used_bytes(&self) -> usize {
        self.used.load(Ordering::Acquire)
    }

    #[inline]
    pub fn available_bytes(&self) -> usize {
        self.memory_limit.saturating_sub(self.used_bytes())
    }

    /// Reserves `bytes`, failing without side effects if the limit would be exceeded.
    pub fn reserve(&self, bytes: usize) -> StorageResult<()> {
        let mut used = self.used.load(Ordering::Acquire);
        loop {
            let available = self.memory_limit.saturating_sub(used);
            if bytes > available {
                return Err(StorageError::BufferExhausted {
                    requested: bytes,
                    available,
                });
            }
            match self.used.compare_exchange_weak(
                used,
                used + bytes,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return Ok(()),
                Err(actual) => used = actual,
            }
        }
    }

    pub fn release(&self, bytes: usize) {
        let prev = self.used.fetch_sub(bytes, Ordering::AcqRel);
        debug_assert!(prev >= bytes, "released more bytes than reserved");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reserve_and_release() {
        let mgr = BufferManager::new("/tmp/ember", &BufferManagerConfig { memory_limit: 100 });
        mgr.reserve(60).unwrap();
        assert_eq!(mgr.used_bytes(), 60);
        assert_eq!(mgr.available_bytes(), 40);

        let err = mgr.reserve(41).unwrap_err();
        assert_eq!(err, StorageError::BufferExhausted {
            requested: 41,
            available: 40
        });
        assert_eq!(mgr.used_bytes(), 60);

        mgr.release(60);
        mgr.reserve(100).unwrap();
        assert_eq!(mgr.available_bytes(), 0);
    }
}
