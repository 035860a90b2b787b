//! Object store capability consumed by every pipeline stage.

use std::future::Future;

use bytes::Bytes;

use crate::error::PipelineResult;

/// Trait for blob storage holding staged snapshots, processed tables and the
/// watermark marker.
///
/// Implementations must distinguish two failure modes: a missing object
/// ([`crate::error::ErrorKind::NoSuchObject`]) and an unreachable store
/// ([`crate::error::ErrorKind::StoreUnavailable`]). The watermark logic
/// depends on that distinction: a missing marker means "bootstrap run", an
/// unreachable store must abort the run.
///
/// Objects are write-once by convention. The pipeline never rewrites a key;
/// a corrected run produces a new run prefix, leaving prior runs as an audit
/// trail.
pub trait ObjectStore {
    /// Lists the keys of all objects whose key starts with `prefix`.
    ///
    /// An empty result is a valid outcome, not an error.
    fn list_objects(&self, prefix: &str)
    -> impl Future<Output = PipelineResult<Vec<String>>> + Send;

    /// Fetches the full body of an object.
    fn get_object(&self, key: &str) -> impl Future<Output = PipelineResult<Bytes>> + Send;

    /// Writes an object, creating any intermediate hierarchy.
    fn put_object(
        &self,
        key: &str,
        body: Bytes,
    ) -> impl Future<Output = PipelineResult<()>> + Send;

    /// Copies an object to a new key inside the same store.
    fn copy_object(&self, src: &str, dst: &str)
    -> impl Future<Output = PipelineResult<()>> + Send;
}
