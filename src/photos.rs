//! Bulk photo retrieval: per-restaurant folders, deterministic filenames,
//! continue-on-error per reference.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::FuturesUnordered;
use futures::StreamExt;
use tokio::sync::Semaphore;
use tracing::{info, warn};

use crate::error::PipelineError;

/// Seam over the provider's photo endpoint so retrieval failures can be
/// exercised without a network.
#[async_trait]
pub trait PhotoSource: Send + Sync {
    /// Resolve one opaque photo reference into image bytes.
    async fn fetch_photo(&self, reference: &str) -> Result<Bytes, PipelineError>;
}

/// One reference that failed to fetch or store. The remaining references are
/// unaffected.
#[derive(Debug)]
pub struct PhotoFailure {
    /// 1-based position in the input reference list.
    pub index: usize,
    pub reference: String,
    pub error: PipelineError,
}

/// Result of a per-restaurant fetch: stored paths in index order plus the
/// failures that were skipped over.
#[derive(Debug, Default)]
pub struct StoredPhotos {
    pub paths: Vec<PathBuf>,
    pub failures: Vec<PhotoFailure>,
}

pub struct PhotoFetcher {
    source: Arc<dyn PhotoSource>,
    root: PathBuf,
    max_concurrency: usize,
}

impl PhotoFetcher {
    pub fn new(source: Arc<dyn PhotoSource>, root: impl Into<PathBuf>) -> Self {
        Self {
            source,
            root: root.into(),
            max_concurrency: 4,
        }
    }

    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency.max(1);
        self
    }

    /// Fetch every reference and write it under the restaurant's folder as
    /// `<folder>/<folder>_<label>_photo_<n>.jpg`, n 1-based in input order.
    ///
    /// Folder creation is idempotent and reruns with an unchanged reference
    /// list overwrite the same paths. A single failing reference lands in
    /// the failure list and never aborts the rest.
    pub async fn fetch_and_store(
        &self,
        restaurant_name: &str,
        source_label: &str,
        photo_refs: &[String],
    ) -> Result<StoredPhotos, PipelineError> {
        let folder = sanitize_folder_name(restaurant_name);
        if folder.is_empty() {
            warn!(name = %restaurant_name, "restaurant name sanitized to nothing; skipping photos");
            return Ok(StoredPhotos::default());
        }
        let dir = self.root.join(&folder);
        tokio::fs::create_dir_all(&dir).await?;

        let sem = Arc::new(Semaphore::new(self.max_concurrency));
        let mut futs: FuturesUnordered<_> = FuturesUnordered::new();
        for (i, reference) in photo_refs.iter().enumerate() {
            let index = i + 1;
            let path = dir.join(format!("{folder}_{source_label}_photo_{index}.jpg"));
            let source = Arc::clone(&self.source);
            let reference = reference.clone();
            let sem = sem.clone();
            futs.push(async move {
                // Permit held until the write is done.
                let _p = sem
                    .acquire_owned()
                    .await
                    .expect("photo semaphore closed mid-run");
                let result = fetch_one(source.as_ref(), &reference, &path).await;
                (index, reference, path, result)
            });
        }

        let mut stored: Vec<(usize, PathBuf)> = Vec::new();
        let mut failures: Vec<PhotoFailure> = Vec::new();
        while let Some((index, reference, path, result)) = futs.next().await {
            match result {
                Ok(()) => {
                    info!(path = %path.display(), "stored photo");
                    stored.push((index, path));
                }
                Err(error) => {
                    warn!(%reference, index, error = %error, "photo fetch failed; continuing");
                    failures.push(PhotoFailure {
                        index,
                        reference,
                        error,
                    });
                }
            }
        }

        stored.sort_by_key(|(index, _)| *index);
        failures.sort_by_key(|f| f.index);
        Ok(StoredPhotos {
            paths: stored.into_iter().map(|(_, p)| p).collect(),
            failures,
        })
    }
}

async fn fetch_one(
    source: &dyn PhotoSource,
    reference: &str,
    path: &Path,
) -> Result<(), PipelineError> {
    let bytes = source.fetch_photo(reference).await?;
    tokio::fs::write(path, &bytes).await?;
    Ok(())
}

/// Folder-name sanitizer: keep alphanumeric, space and underscore, drop
/// everything else, then trim.
pub fn sanitize_folder_name(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_alphanumeric() || *c == ' ' || *c == '_')
        .collect::<String>()
        .trim()
        .to_string()
}
