//! In-memory object store for tests and development.

use std::collections::BTreeMap;
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::Mutex;

use crate::error::{ErrorKind, PipelineResult};
use crate::pipeline_error;
use crate::store::base::ObjectStore;

#[derive(Debug, Default)]
struct Inner {
    objects: BTreeMap<String, Bytes>,
    unavailable: bool,
}

/// Object store backed by an in-memory map.
///
/// All data is lost when the process terminates, which makes this ideal for
/// exercising the pipeline in tests: after a run, the staged and processed
/// objects can be inspected directly. The store can also be switched into an
/// unavailable mode to test the fatal-setup failure paths.
#[derive(Debug, Clone, Default)]
pub struct MemoryObjectStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryObjectStore {
    /// Creates a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent call fail with `StoreUnavailable`.
    pub async fn set_unavailable(&self, unavailable: bool) {
        self.inner.lock().await.unavailable = unavailable;
    }

    /// Returns a snapshot of every stored key, for test assertions.
    pub async fn keys(&self) -> Vec<String> {
        let inner = self.inner.lock().await;
        inner.objects.keys().cloned().collect()
    }
}

impl ObjectStore for MemoryObjectStore {
    async fn list_objects(&self, prefix: &str) -> PipelineResult<Vec<String>> {
        let inner = self.inner.lock().await;
        check_available(&inner)?;

        Ok(inner
            .objects
            .keys()
            .filter(|key| key.starts_with(prefix))
            .cloned()
            .collect())
    }

    async fn get_object(&self, key: &str) -> PipelineResult<Bytes> {
        let inner = self.inner.lock().await;
        check_available(&inner)?;

        inner.objects.get(key).cloned().ok_or_else(|| {
            pipeline_error!(ErrorKind::NoSuchObject, "no files found at path", key)
        })
    }

    async fn put_object(&self, key: &str, body: Bytes) -> PipelineResult<()> {
        let mut inner = self.inner.lock().await;
        check_available(&inner)?;

        inner.objects.insert(key.to_string(), body);
        Ok(())
    }

    async fn copy_object(&self, src: &str, dst: &str) -> PipelineResult<()> {
        let mut inner = self.inner.lock().await;
        check_available(&inner)?;

        let body = inner.objects.get(src).cloned().ok_or_else(|| {
            pipeline_error!(ErrorKind::NoSuchObject, "no files found at path", src)
        })?;
        inner.objects.insert(dst.to_string(), body);
        Ok(())
    }
}

fn check_available(inner: &Inner) -> PipelineResult<()> {
    if inner.unavailable {
        return Err(pipeline_error!(
            ErrorKind::StoreUnavailable,
            "object store is unreachable"
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn get_distinguishes_missing_object_from_unavailable_store() {
        let store = MemoryObjectStore::new();

        let missing = store.get_object("nope").await.unwrap_err();
        assert_eq!(missing.kind(), ErrorKind::NoSuchObject);

        store.set_unavailable(true).await;
        let down = store.get_object("nope").await.unwrap_err();
        assert_eq!(down.kind(), ErrorKind::StoreUnavailable);
    }

    #[tokio::test]
    async fn list_filters_by_prefix() {
        let store = MemoryObjectStore::new();
        store
            .put_object("a/one.csv", Bytes::from_static(b"1"))
            .await
            .unwrap();
        store
            .put_object("b/two.csv", Bytes::from_static(b"2"))
            .await
            .unwrap();

        let keys = store.list_objects("a/").await.unwrap();
        assert_eq!(keys, vec!["a/one.csv".to_string()]);
        assert!(store.list_objects("c/").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn copy_duplicates_the_body() {
        let store = MemoryObjectStore::new();
        store
            .put_object("src", Bytes::from_static(b"payload"))
            .await
            .unwrap();
        store.copy_object("src", "dst").await.unwrap();

        assert_eq!(store.get_object("dst").await.unwrap().as_ref(), b"payload");
    }
}
