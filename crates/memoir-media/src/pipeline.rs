use std::sync::Arc;

use futures_util::future::join_all;
use tracing::{info, warn};

use memoir_types::models::NewPhoto;

use crate::storage::{AssetStore, remove_quietly};
use crate::transform::{OUTPUT_EXTENSION, normalize_file};
use crate::{IngestError, Upload, validate_batch};

/// Turns a batch of spooled uploads into stored assets and photo descriptors.
#[derive(Clone)]
pub struct Ingestor {
    store: Arc<AssetStore>,
}

impl Ingestor {
    pub fn new(store: Arc<AssetStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &AssetStore {
        &self.store
    }

    /// Validate, normalize and store every upload in the batch.
    ///
    /// Items are processed concurrently but the returned descriptors follow
    /// submission order, with `order` set to the submission index. Each
    /// spool file is removed once its own item is done, whatever the outcome.
    /// The batch is all-or-nothing: if any item fails, assets already written
    /// for its siblings are deleted and the first failure (by index) is
    /// returned.
    pub async fn ingest(&self, uploads: Vec<Upload>) -> Result<Vec<NewPhoto>, IngestError> {
        if let Err(e) = validate_batch(&uploads) {
            discard_spooled(&uploads).await;
            return Err(e);
        }

        let results = join_all(
            uploads
                .into_iter()
                .enumerate()
                .map(|(index, upload)| self.process(index, upload)),
        )
        .await;

        let mut stored = Vec::with_capacity(results.len());
        let mut failure = None;
        for result in results {
            match result {
                Ok(name) => stored.push(name),
                Err(e) if failure.is_none() => failure = Some(e),
                Err(e) => warn!("Additional ingestion failure: {}", e),
            }
        }

        if let Some(err) = failure {
            self.discard(&stored).await;
            return Err(err);
        }

        info!("Ingested {} photo(s)", stored.len());
        Ok(stored
            .iter()
            .enumerate()
            .map(|(index, name)| NewPhoto {
                url: self.store.public_url(name),
                caption: Some(String::new()),
                order: index as i64,
            })
            .collect())
    }

    /// Remove stored assets, e.g. when the rows referencing them could not be
    /// committed.
    pub async fn discard(&self, names: &[String]) {
        for name in names {
            if let Err(e) = self.store.delete(name).await {
                warn!("Failed to remove asset {}: {}", name, e);
            }
        }
    }

    async fn process(&self, index: usize, upload: Upload) -> Result<String, IngestError> {
        let path = upload.temp_path.clone();
        let normalized = tokio::task::spawn_blocking(move || normalize_file(&path)).await;

        let result = match normalized {
            Ok(Ok(bytes)) => self
                .store
                .put(&bytes, OUTPUT_EXTENSION)
                .await
                .map_err(IngestError::from),
            Ok(Err(source)) => Err(IngestError::Processing { index, source }),
            Err(join) => Err(IngestError::from(join)),
        };

        if let Err(e) = remove_quietly(&upload.temp_path).await {
            warn!("Failed to remove spool file {}: {}", upload.temp_path.display(), e);
        }

        result
    }
}

/// Asset name from a public URL produced by `AssetStore::public_url`.
pub fn asset_name(url: &str) -> Option<&str> {
    url.strip_prefix(crate::storage::PUBLIC_PREFIX)?
        .strip_prefix('/')
        .filter(|name| !name.is_empty() && !name.contains('/'))
}

/// Remove the spool files of a batch that will not be ingested.
pub async fn discard_spooled(uploads: &[Upload]) {
    for upload in uploads {
        if let Err(e) = remove_quietly(&upload.temp_path).await {
            warn!("Failed to remove spool file {}: {}", upload.temp_path.display(), e);
        }
    }
}
