//! Upload ingestion: validates a batch of spooled image uploads, normalizes
//! each one (bounded resize, JPEG re-encode), and stores the result under a
//! fresh opaque name.

pub mod pipeline;
pub mod storage;
pub mod transform;

use std::path::PathBuf;

pub use pipeline::{Ingestor, asset_name, discard_spooled};
pub use storage::AssetStore;

/// Maximum number of images accepted in one batch.
pub const MAX_FILES: usize = 10;

/// Per-file ceiling, checked before any decoding happens.
pub const MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;

/// A file delivered by the upload transport and spooled to disk.
#[derive(Debug, Clone)]
pub struct Upload {
    pub temp_path: PathBuf,
    pub mime_type: String,
    pub size: u64,
}

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("too many photos: {count} submitted, at most {max} allowed", max = MAX_FILES)]
    TooManyFiles { count: usize },

    #[error("photo {} is {size} bytes, limit is {max}", .index + 1, max = MAX_FILE_SIZE)]
    FileTooLarge { index: usize, size: u64 },

    #[error("photo {} has type {mime_type}, only images are allowed", .index + 1)]
    UnsupportedType { index: usize, mime_type: String },

    #[error("photo {} could not be processed: {source}", .index + 1)]
    Processing {
        index: usize,
        #[source]
        source: image::ImageError,
    },

    #[error("asset storage: {0}")]
    Io(#[from] std::io::Error),

    #[error("image worker failed: {0}")]
    Worker(#[from] tokio::task::JoinError),
}

impl IngestError {
    /// Whether the failure is attributable to the submitted batch rather than
    /// to the server.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::TooManyFiles { .. }
                | Self::FileTooLarge { .. }
                | Self::UnsupportedType { .. }
                | Self::Processing { .. }
        )
    }
}

/// Checks batch-level limits. Runs before any file is decoded.
pub fn validate_batch(uploads: &[Upload]) -> Result<(), IngestError> {
    if uploads.len() > MAX_FILES {
        return Err(IngestError::TooManyFiles {
            count: uploads.len(),
        });
    }

    for (index, upload) in uploads.iter().enumerate() {
        if !upload.mime_type.starts_with("image/") {
            return Err(IngestError::UnsupportedType {
                index,
                mime_type: upload.mime_type.clone(),
            });
        }
        if upload.size > MAX_FILE_SIZE {
            return Err(IngestError::FileTooLarge {
                index,
                size: upload.size,
            });
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upload(mime: &str, size: u64) -> Upload {
        Upload {
            temp_path: PathBuf::from("/nonexistent"),
            mime_type: mime.into(),
            size,
        }
    }

    #[test]
    fn accepts_up_to_ten_images() {
        let batch: Vec<_> = (0..MAX_FILES).map(|_| upload("image/png", 1024)).collect();
        assert!(validate_batch(&batch).is_ok());
        assert!(validate_batch(&[]).is_ok());
    }

    #[test]
    fn rejects_eleven_images() {
        let batch: Vec<_> = (0..MAX_FILES + 1).map(|_| upload("image/png", 1024)).collect();
        assert!(matches!(
            validate_batch(&batch),
            Err(IngestError::TooManyFiles { count: 11 })
        ));
    }

    #[test]
    fn rejects_oversized_and_non_image_files() {
        let batch = [upload("image/jpeg", 10), upload("image/jpeg", MAX_FILE_SIZE + 1)];
        assert!(matches!(
            validate_batch(&batch),
            Err(IngestError::FileTooLarge { index: 1, .. })
        ));

        let batch = [upload("application/pdf", 10)];
        let err = validate_batch(&batch).unwrap_err();
        assert!(matches!(err, IngestError::UnsupportedType { index: 0, .. }));
        assert_eq!(err.to_string(), "photo 1 has type application/pdf, only images are allowed");
    }

    #[test]
    fn exactly_ten_mebibytes_is_allowed() {
        assert!(validate_batch(&[upload("image/png", MAX_FILE_SIZE)]).is_ok());
    }
}
