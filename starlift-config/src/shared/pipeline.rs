use serde::{Deserialize, Serialize};

use crate::shared::{PgConnectionConfig, ValidationError};
use crate::Config;

/// Top-level configuration for the pipeline binaries.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct PipelineConfig {
    /// The operational source database.
    pub source: PgConnectionConfig,
    /// The warehouse database loads are applied to.
    pub warehouse: PgConnectionConfig,
    /// Blob storage layout.
    pub storage: StorageConfig,
    /// Optional restriction of extraction to the named source tables.
    /// Empty means every allow-listed table.
    #[serde(default)]
    pub source_tables: Vec<String>,
}

/// Where staged and processed objects live inside the blob store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct StorageConfig {
    /// Filesystem root the object store is mounted at.
    pub root: String,
    /// Area prefix for staged CSV snapshots and the watermark marker.
    pub staging_area: String,
    /// Area prefix for processed parquet tables.
    pub processed_area: String,
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.source.validate()?;
        self.warehouse.validate()?;
        self.storage.validate()
    }
}

impl StorageConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.staging_area.is_empty() || self.processed_area.is_empty() {
            return Err(ValidationError::EmptyStorageArea);
        }
        // The areas share one store; equal prefixes would let processed
        // writes shadow staged runs.
        if self.staging_area == self.processed_area {
            return Err(ValidationError::OverlappingStorageAreas);
        }
        Ok(())
    }
}

impl Config for PipelineConfig {
    const LIST_PARSE_KEYS: &'static [&'static str] = &["source_tables"];
}

#[cfg(test)]
mod tests {
    use super::*;

    fn storage(staging: &str, processed: &str) -> StorageConfig {
        StorageConfig {
            root: "/var/lib/starlift".to_string(),
            staging_area: staging.to_string(),
            processed_area: processed.to_string(),
        }
    }

    #[test]
    fn distinct_areas_validate() {
        assert_eq!(storage("staging", "processed").validate(), Ok(()));
    }

    #[test]
    fn equal_areas_are_rejected() {
        assert_eq!(
            storage("data", "data").validate(),
            Err(ValidationError::OverlappingStorageAreas)
        );
    }

    #[test]
    fn empty_areas_are_rejected() {
        assert_eq!(
            storage("", "processed").validate(),
            Err(ValidationError::EmptyStorageArea)
        );
    }
}
