pub mod chunked;
pub mod single;

use crate::api::{Client, StoredFileDescriptor, TransactionType};
use crate::compress::{Compression, compress};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::progress::{InvocationGuard, ProgressReporter};
use crate::source::{MEGABYTE, SourceFile};
use crate::validate::validate;
use async_trait::async_trait;
use log::info;

pub use chunked::ChunkedUploader;
pub use single::SmallFileUploader;

/// Files above this size are sent in chunks of this size.
pub const CHUNK_SIZE: u64 = 4 * MEGABYTE;

/// Nothing larger than this is ever handed to an uploader.
pub const MAX_UPLOAD_SIZE: u64 = 12 * MEGABYTE;

/// Options for uploading a file
#[derive(Debug, Clone, Default)]
pub struct UploadOptions {
    pub transaction_type: TransactionType,
    pub progress: ProgressReporter,
}

/// One way of getting a prepared file into the image store.
#[async_trait]
pub trait UploadStrategy: Send + Sync {
    async fn upload(
        &self,
        file: &SourceFile,
        progress: &ProgressReporter,
    ) -> Result<StoredFileDescriptor>;
}

/// Validates and compresses `file`, then checks the upload ceiling.
///
/// # Errors
///
/// Returns an error if:
/// - The MIME type is not accepted
/// - The compression task panicked
/// - The resulting file is larger than [`MAX_UPLOAD_SIZE`]
pub async fn prepare(file: SourceFile) -> Result<Compression> {
    validate(&file)?;

    let compression = tokio::task::spawn_blocking(move || compress(file))
        .await
        .map_err(|e| Error::Compression(e.to_string()))?;

    let size = compression.file().size();
    if size > MAX_UPLOAD_SIZE {
        return Err(Error::SizeCeilingExceeded {
            size,
            limit: MAX_UPLOAD_SIZE,
        });
    }

    Ok(compression)
}

/// Upload a receipt image to the image store
///
/// Runs validation, compression and the ceiling check, then picks the
/// single-request or chunked path by the prepared size. Progress in
/// `options` starts at 0 and is back at 0 if anything fails.
///
/// # Errors
///
/// Returns an error if:
/// - The file is rejected or cannot be brought under [`MAX_UPLOAD_SIZE`]
/// - Any request to the image store fails
pub async fn upload_file(
    config: &Config,
    file: SourceFile,
    options: &UploadOptions,
) -> Result<StoredFileDescriptor> {
    let progress = &options.progress;
    let guard = InvocationGuard::begin(progress);

    let client = Client::new(config.clone())?;

    progress.set_message(format!("Preparing {}", file.name));
    let file = prepare(file).await?.into_file();

    let strategy: Box<dyn UploadStrategy> = if file.size() > CHUNK_SIZE {
        info!(
            "Uploading {} ({:.2} MB) in chunks",
            file.name,
            file.size_mb()
        );
        Box::new(ChunkedUploader::new(client, options.transaction_type))
    } else {
        info!("Uploading {} ({:.2} MB)", file.name, file.size_mb());
        Box::new(SmallFileUploader::new(client))
    };

    progress.set_message(format!("Uploading {}", file.name));
    let descriptor = strategy.upload(&file, progress).await?;

    progress.advance_to(100);
    guard.complete();

    Ok(descriptor)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_prepare_rejects_bad_mime_type() {
        let file = SourceFile::new("statement.pdf", "application/pdf", vec![1; 32]);
        assert!(matches!(prepare(file).await, Err(Error::Validation(_))));
    }

    #[tokio::test]
    async fn test_prepare_enforces_ceiling() {
        let size = MAX_UPLOAD_SIZE + 1;
        #[allow(clippy::cast_possible_truncation)]
        let file = SourceFile::new("huge.heic", "image/heic", vec![0xCD; size as usize]);

        match prepare(file).await {
            Err(Error::SizeCeilingExceeded { size: got, limit }) => {
                assert_eq!(got, size);
                assert_eq!(limit, MAX_UPLOAD_SIZE);
            }
            other => panic!("expected SizeCeilingExceeded, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_prepare_accepts_file_at_ceiling() {
        #[allow(clippy::cast_possible_truncation)]
        let file = SourceFile::new("limit.heic", "image/heic", vec![0xCD; MAX_UPLOAD_SIZE as usize]);

        let prepared = prepare(file).await.unwrap();
        assert!(matches!(prepared, Compression::Degraded(_)));
        assert_eq!(prepared.file().size(), MAX_UPLOAD_SIZE);
    }

    #[tokio::test]
    async fn test_prepare_passes_small_files_through() {
        let file = SourceFile::new("small.png", "image/png", vec![9; 1024]);
        let prepared = prepare(file.clone()).await.unwrap();
        assert!(matches!(prepared, Compression::Skipped(_)));
        assert_eq!(prepared.into_file(), file);
    }
}
