//! Star-schema transformation of staged snapshots.
//!
//! The per-entity rules are driven by a registry: each entry names the
//! target table, the staged inputs it needs and the transform function.
//! The stage iterates the registry and handles failures uniformly, so a
//! missing input fails one entity without aborting the rest.

pub mod calendar;
pub mod entities;

use crate::error::PipelineResult;
use crate::staging::{staged_table_key, table_from_csv, RunContext, INGESTED_DIR};
use crate::store::ObjectStore;
use crate::types::{parse_timestamp, TableData};
use crate::watermark::Watermark;

/// Output of one entity transform.
#[derive(Debug, Clone, PartialEq)]
pub enum TransformOutput {
    /// A warehouse-ready dimension or fact table.
    Table(TableData),
    /// Nothing to produce on this run; the existing output still stands.
    /// Used by the calendar dimension outside the bootstrap run.
    AlreadyCurrent,
}

/// A per-entity transform rule.
pub struct EntityTransform {
    /// Target warehouse table name.
    pub entity: &'static str,
    /// Staged source tables the rule reads, in argument order.
    pub inputs: &'static [&'static str],
    pub apply: TransformFn,
}

pub type TransformFn = fn(&RunContext, &[TableData]) -> PipelineResult<TransformOutput>;

/// The full set of entity rules, in load-friendly order: dimensions first so
/// fact-table foreign keys always resolve against the same run's output.
pub fn registry() -> &'static [EntityTransform] {
    static REGISTRY: &[EntityTransform] = &[
        EntityTransform {
            entity: "dim_currency",
            inputs: &["currency"],
            apply: entities::currency,
        },
        EntityTransform {
            entity: "dim_design",
            inputs: &["design"],
            apply: entities::design,
        },
        EntityTransform {
            entity: "dim_staff",
            inputs: &["staff", "department"],
            apply: entities::staff,
        },
        EntityTransform {
            entity: "dim_location",
            inputs: &["address"],
            apply: entities::location,
        },
        EntityTransform {
            entity: "dim_counterparty",
            inputs: &["counterparty", "address"],
            apply: entities::counterparty,
        },
        EntityTransform {
            entity: "dim_date",
            inputs: &[],
            apply: calendar::calendar,
        },
        EntityTransform {
            entity: "fact_sales_order",
            inputs: &["sales_order"],
            apply: entities::sales_order,
        },
        EntityTransform {
            entity: "fact_purchase_order",
            inputs: &["purchase_order"],
            apply: entities::purchase_order,
        },
    ];
    REGISTRY
}

/// The latest staged run: its context plus every object key sharing its
/// prefix.
#[derive(Debug, Clone, PartialEq)]
pub struct DiscoveredRun {
    pub run: RunContext,
    pub keys: Vec<String>,
}

/// Reads the most recent staged snapshots and applies the entity rules.
#[derive(Debug, Clone)]
pub struct SnapshotTransformer<S> {
    store: S,
    staging_area: String,
}

impl<S: ObjectStore> SnapshotTransformer<S> {
    pub fn new(store: S, staging_area: impl Into<String>) -> Self {
        Self {
            store,
            staging_area: staging_area.into(),
        }
    }

    /// Discovers the staged run to transform.
    ///
    /// While the watermark is still the epoch sentinel no incremental run
    /// has ever completed, so the bootstrap dump is the authoritative input.
    /// Otherwise the lexicographically greatest timestamp-shaped segment
    /// wins; string ordering of these timestamps is chronological.
    pub async fn latest_run(&self, watermark: &Watermark) -> PipelineResult<DiscoveredRun> {
        let prefix = format!("{}/{INGESTED_DIR}/", self.staging_area);
        let keys = self.store.list_objects(&prefix).await?;

        let run = if watermark.is_epoch() {
            RunContext::Bootstrap
        } else {
            let latest = keys
                .iter()
                .filter_map(|key| key.strip_prefix(&prefix))
                .filter_map(|rest| rest.split('/').next())
                .filter(|segment| parse_timestamp(segment).is_some())
                .max()
                .map(|segment| RunContext::Run(segment.to_string()));
            latest.unwrap_or(RunContext::Bootstrap)
        };

        let run_prefix = format!("{prefix}{}/", run.segment());
        let keys = keys
            .into_iter()
            .filter(|key| key.starts_with(&run_prefix))
            .collect();

        Ok(DiscoveredRun { run, keys })
    }

    /// Reads one staged snapshot belonging to the discovered run.
    pub async fn read_snapshot(&self, run: &RunContext, table: &str) -> PipelineResult<TableData> {
        let key = staged_table_key(&self.staging_area, run, table);
        let body = self.store.get_object(&key).await?;
        table_from_csv(table, &body)
    }

    /// Applies one registry rule: reads its staged inputs and runs the
    /// transform. A missing input propagates the store's
    /// "no files found at path" failure for this entity alone.
    pub async fn transform_entity(
        &self,
        run: &RunContext,
        rule: &EntityTransform,
    ) -> PipelineResult<TransformOutput> {
        let mut inputs = Vec::with_capacity(rule.inputs.len());
        for input in rule.inputs {
            inputs.push(self.read_snapshot(run, input).await?);
        }
        (rule.apply)(run, &inputs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::store::MemoryObjectStore;
    use bytes::Bytes;

    async fn staged(keys: &[&str]) -> MemoryObjectStore {
        let store = MemoryObjectStore::new();
        for key in keys {
            store
                .put_object(key, Bytes::from_static(b"col\nvalue\n"))
                .await
                .unwrap();
        }
        store
    }

    #[tokio::test]
    async fn epoch_watermark_resolves_to_the_bootstrap_dump() {
        let store = staged(&[
            "staging/ingested_data/original_data_dump/currency.csv",
            "staging/ingested_data/2024-05-20 12:10:03.998128/currency.csv",
        ])
        .await;
        let transformer = SnapshotTransformer::new(store, "staging");

        let discovered = transformer.latest_run(&Watermark::Epoch).await.unwrap();

        assert_eq!(discovered.run, RunContext::Bootstrap);
        assert_eq!(
            discovered.keys,
            vec!["staging/ingested_data/original_data_dump/currency.csv".to_string()]
        );
    }

    #[tokio::test]
    async fn latest_timestamp_segment_wins_over_the_bootstrap_dump() {
        let store = staged(&[
            "staging/ingested_data/original_data_dump/currency.csv",
            "staging/ingested_data/2024-05-20 12:10:03.998128/currency.csv",
            "staging/ingested_data/2024-05-21 08:00:00.000000/currency.csv",
            "staging/ingested_data/2024-05-21 08:00:00.000000/staff.csv",
        ])
        .await;
        let transformer = SnapshotTransformer::new(store, "staging");
        let watermark = Watermark::At(parse_timestamp("2024-05-20 12:10:03.998128").unwrap());

        let discovered = transformer.latest_run(&watermark).await.unwrap();

        assert_eq!(
            discovered.run,
            RunContext::Run("2024-05-21 08:00:00.000000".to_string())
        );
        assert_eq!(discovered.keys.len(), 2);
    }

    #[tokio::test]
    async fn missing_snapshot_names_the_absent_path() {
        let store = staged(&["staging/ingested_data/original_data_dump/currency.csv"]).await;
        let transformer = SnapshotTransformer::new(store, "staging");

        let err = transformer
            .read_snapshot(&RunContext::Bootstrap, "staff")
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::NoSuchObject);
        assert_eq!(
            err.detail(),
            Some("staging/ingested_data/original_data_dump/staff.csv")
        );
    }
}
