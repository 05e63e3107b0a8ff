use std::path::PathBuf;

use ember_storage::{BufferManagerConfig, DEFAULT_SEGMENT_CAPACITY};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Root of the database and table directories.
    pub data_dir: PathBuf,
    /// Rows per segment.
    pub segment_capacity: usize,
    /// Bytes the buffer manager hands out to segments in total.
    pub buffer_memory_limit: usize,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("ember_data"),
            segment_capacity: DEFAULT_SEGMENT_CAPACITY,
            buffer_memory_limit: BufferManagerConfig::default().memory_limit,
        }
    }
}

impl DatabaseConfig {
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Default::default()
        }
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.segment_capacity == 0 {
            return Err(Error::InvalidConfig(
                "segment_capacity must be positive".to_string(),
            ));
        }
        if self.segment_capacity > u32::MAX as usize {
            return Err(Error::InvalidConfig(format!(
                "segment_capacity must fit row offsets, got {}",
                self.segment_capacity
            )));
        }
        Ok(())
    }

    pub(crate) fn buffer_config(&self) -> BufferManagerConfig {
        BufferManagerConfig {
            memory_limit: self.buffer_memory_limit,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate() {
        assert!(DatabaseConfig::default().validate().is_ok());
        let config = DatabaseConfig {
            segment_capacity: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_buffer_config() {
        let config = DatabaseConfig {
            buffer_memory_limit: 4096,
            ..DatabaseConfig::with_data_dir("/tmp/ember")
        };
        assert_eq!(config.buffer_config().memory_limit, 4096);
        assert_eq!(config.segment_capacity, DEFAULT_SEGMENT_CAPACITY);
    }

    #[test]
    fn test_deserialize_partial() {
        let config: DatabaseConfig =
            serde_json::from_str(r#"{"data_dir": "/var/lib/ember", "segment_capacity": 128}"#)
                .unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/var/lib/ember"));
        assert_eq!(config.segment_capacity, 128);
        assert_eq!(
            config.buffer_memory_limit,
            DatabaseConfig::default().buffer_memory_limit
        );
    }
}
