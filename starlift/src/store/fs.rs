//! Filesystem-backed object store used by the runner.
//!
//! A local directory plays the part of the bucket: object keys map to
//! relative paths beneath the root. This keeps the pipeline runnable end to
//! end without any cloud credentials; a hosted blob store is an external
//! collaborator behind the same [`ObjectStore`] seam.

use std::io;
use std::path::{Path, PathBuf};

use bytes::Bytes;

use crate::error::{ErrorKind, PipelineResult};
use crate::pipeline_error;
use crate::store::base::ObjectStore;

/// Object store rooted at a local directory.
#[derive(Debug, Clone)]
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    /// Creates a store over `root`. The directory must already exist; a
    /// missing root is reported as `StoreUnavailable`, mirroring a missing
    /// bucket.
    pub fn new(root: impl Into<PathBuf>) -> PipelineResult<Self> {
        let root = root.into();
        if !root.is_dir() {
            return Err(pipeline_error!(
                ErrorKind::StoreUnavailable,
                "object store root does not exist",
                root.display()
            ));
        }
        Ok(Self { root })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }
}

impl ObjectStore for FsObjectStore {
    async fn list_objects(&self, prefix: &str) -> PipelineResult<Vec<String>> {
        let mut keys = Vec::new();
        collect_keys(&self.root, &self.root, &mut keys).await?;
        keys.retain(|key| key.starts_with(prefix));
        keys.sort();
        Ok(keys)
    }

    async fn get_object(&self, key: &str) -> PipelineResult<Bytes> {
        match tokio::fs::read(self.path_for(key)).await {
            Ok(body) => Ok(Bytes::from(body)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Err(pipeline_error!(
                ErrorKind::NoSuchObject,
                "no files found at path",
                key
            )),
            Err(err) => Err(pipeline_error!(
                ErrorKind::StoreUnavailable,
                "failed to read object",
                key,
                source: err
            )),
        }
    }

    async fn put_object(&self, key: &str, body: Bytes) -> PipelineResult<()> {
        let path = self.path_for(key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|err| {
                pipeline_error!(
                    ErrorKind::StoreUnavailable,
                    "failed to create object hierarchy",
                    key,
                    source: err
                )
            })?;
        }

        tokio::fs::write(&path, body).await.map_err(|err| {
            pipeline_error!(
                ErrorKind::StoreUnavailable,
                "failed to write object",
                key,
                source: err
            )
        })
    }

    async fn copy_object(&self, src: &str, dst: &str) -> PipelineResult<()> {
        let body = self.get_object(src).await?;
        self.put_object(dst, body).await
    }
}

/// Walks the tree under `dir`, pushing keys relative to `root`.
async fn collect_keys(root: &Path, dir: &Path, keys: &mut Vec<String>) -> PipelineResult<()> {
    let mut pending = vec![dir.to_path_buf()];

    while let Some(current) = pending.pop() {
        let mut entries = tokio::fs::read_dir(&current).await.map_err(|err| {
            pipeline_error!(
                ErrorKind::StoreUnavailable,
                "failed to list objects",
                current.display(),
                source: err
            )
        })?;

        while let Some(entry) = entries.next_entry().await.map_err(|err| {
            pipeline_error!(
                ErrorKind::StoreUnavailable,
                "failed to list objects",
                current.display(),
                source: err
            )
        })? {
            let path = entry.path();
            if path.is_dir() {
                pending.push(path);
            } else if let Ok(relative) = path.strip_prefix(root) {
                keys.push(relative.to_string_lossy().replace('\\', "/"));
            }
        }
    }

    Ok(())
}
