use std::sync::Arc;

use ember_catalog::Catalog;
use ember_storage::BufferManager;

use crate::config::DatabaseConfig;
use crate::error::Result;
use crate::txn::{Txn, TxnManager};

/// An open database: the catalog, its storage, and the transaction manager coordinating them.
#[derive(Debug)]
pub struct Database {
    config: DatabaseConfig,
    txn_manager: Arc<TxnManager>,
}

impl Database {
    pub fn open(config: DatabaseConfig) -> Result<Self> {
        config.validate()?;
        let buffer_mgr = Arc::new(BufferManager::new(
            config.data_dir.clone(),
            &config.buffer_config(),
        ));
        let catalog = Arc::new(Catalog::new(
            config.data_dir.clone(),
            buffer_mgr,
            config.segment_capacity,
        ));
        let txn_manager = Arc::new(TxnManager::new(catalog));
        tracing::info!(
            data_dir = %config.data_dir.display(),
            segment_capacity = config.segment_capacity,
            buffer_memory_limit = config.buffer_memory_limit,
            "database opened"
        );
        Ok(Self {
            config,
            txn_manager,
        })
    }

    /// Begins a transaction reading the latest committed state.
    pub fn begin(&self) -> Result<Txn> {
        self.txn_manager.begin_txn()
    }

    #[inline]
    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    #[inline]
    pub fn txn_manager(&self) -> &Arc<TxnManager> {
        &self.txn_manager
    }

    #[inline]
    pub fn catalog(&self) -> &Arc<Catalog> {
        self.txn_manager.catalog()
    }
}
