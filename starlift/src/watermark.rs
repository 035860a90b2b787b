//! The watermark separating already-processed from not-yet-processed rows.

use chrono::{Datelike, NaiveDateTime};

use crate::error::{ErrorKind, PipelineResult};
use crate::pipeline_error;
use crate::staging::{run_marker_key, RunContext};
use crate::store::ObjectStore;
use crate::types::parse_timestamp;

/// File name of the well-known watermark marker inside the staging area, and
/// of the per-run completion marker sharing each run's prefix.
pub const MARKER_FILE: &str = "last_ran_at.csv";

/// Timestamps before this year are treated as the epoch sentinel.
const EPOCH_CUTOFF_YEAR: i32 = 2000;

/// The last-successful-run boundary.
///
/// `Epoch` means no prior run: extraction takes everything and stages it as
/// the one-time bootstrap dump.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Watermark {
    Epoch,
    At(NaiveDateTime),
}

impl Watermark {
    pub fn is_epoch(&self) -> bool {
        matches!(self, Watermark::Epoch)
    }

    /// Parses a marker body. The first line is the column header, the second
    /// the timestamp value. Implausibly old timestamps normalize to the
    /// epoch sentinel.
    fn from_marker_body(body: &str) -> PipelineResult<Watermark> {
        let value = body.lines().nth(1).ok_or_else(|| {
            pipeline_error!(
                ErrorKind::DeserializationError,
                "watermark marker has no value line",
                body
            )
        })?;

        let timestamp = parse_timestamp(value).ok_or_else(|| {
            pipeline_error!(
                ErrorKind::DeserializationError,
                "watermark marker is not a timestamp",
                value
            )
        })?;

        if timestamp.year() < EPOCH_CUTOFF_YEAR {
            return Ok(Watermark::Epoch);
        }
        Ok(Watermark::At(timestamp))
    }
}

/// Reads and advances the watermark marker in the staging area.
///
/// The marker is the only cross-invocation mutable state in the system.
/// There is no lock around it: the invoking scheduler must guarantee a
/// single writer, running one pipeline stage at a time.
#[derive(Debug, Clone)]
pub struct WatermarkStore<S> {
    store: S,
    staging_area: String,
}

impl<S: ObjectStore> WatermarkStore<S> {
    pub fn new(store: S, staging_area: impl Into<String>) -> Self {
        Self {
            store,
            staging_area: staging_area.into(),
        }
    }

    /// Key of the well-known marker object.
    pub fn marker_key(&self) -> String {
        format!("{}/{MARKER_FILE}", self.staging_area)
    }

    /// Fetches the last-promoted watermark.
    ///
    /// A missing marker means no pipeline run has completed yet and yields
    /// [`Watermark::Epoch`]. An unreachable store propagates as
    /// [`ErrorKind::StoreUnavailable`]; it must never be mistaken for "no
    /// watermark".
    pub async fn get(&self) -> PipelineResult<Watermark> {
        match self.store.get_object(&self.marker_key()).await {
            Ok(body) => {
                let text = String::from_utf8_lossy(&body);
                Watermark::from_marker_body(&text)
            }
            Err(err) if err.kind() == ErrorKind::NoSuchObject => Ok(Watermark::Epoch),
            Err(err) => Err(err),
        }
    }

    /// Copies the given run's completion marker onto the well-known key,
    /// making the run's timestamp the next invocation's lower bound.
    ///
    /// Only called by the load stage after at least one table loaded
    /// successfully, which keeps the watermark monotonically non-decreasing
    /// across successful executions.
    pub async fn promote(&self, run: &RunContext) -> PipelineResult<()> {
        let src = run_marker_key(&self.staging_area, run);
        self.store.copy_object(&src, &self.marker_key()).await
    }
}
