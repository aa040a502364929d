use crate::api::{Client, StoredFileDescriptor, TransactionType};
use crate::error::{Error, Result};
use crate::progress::ProgressReporter;
use crate::source::SourceFile;
use crate::upload::{CHUNK_SIZE, UploadStrategy};
use async_trait::async_trait;
use log::{debug, info};
use std::ops::Range;

/// Progress once the session is open.
const SESSION_OPENED: u8 = 10;

/// Progress once every chunk is accepted.
const CHUNKS_DONE: u8 = 90;

/// Sends a file through an upload session, one byte range at a time.
pub struct ChunkedUploader {
    client: Client,
    transaction_type: TransactionType,
}

impl ChunkedUploader {
    #[must_use]
    pub fn new(client: Client, transaction_type: TransactionType) -> Self {
        Self {
            client,
            transaction_type,
        }
    }
}

/// Splits `total` bytes into ascending, non-overlapping ranges of
/// `chunk_size`; the last range may be shorter.
#[must_use]
pub fn chunk_ranges(total: u64, chunk_size: u64) -> Vec<Range<u64>> {
    let chunk_size = chunk_size.max(1);
    let mut ranges = Vec::new();
    let mut start = 0;
    while start < total {
        let end = (start + chunk_size).min(total);
        ranges.push(start..end);
        start = end;
    }
    ranges
}

/// Progress after `uploaded` of `count` chunks, spread over 10..=90.
#[must_use]
pub fn chunk_progress(uploaded: usize, count: usize) -> u8 {
    if count == 0 {
        return CHUNKS_DONE;
    }
    let span = u64::from(CHUNKS_DONE - SESSION_OPENED);
    let done = (span * uploaded.min(count) as u64) / count as u64;
    #[allow(clippy::cast_possible_truncation)]
    let done = done as u8;
    SESSION_OPENED + done
}

/// Wraps a stage failure, keeping 413 distinct.
fn stage_error(error: Error, wrap: impl FnOnce(String) -> Error) -> Error {
    match error {
        Error::FileTooLarge => Error::FileTooLarge,
        Error::Api(message) => wrap(message),
        other => wrap(other.to_string()),
    }
}

#[async_trait]
impl UploadStrategy for ChunkedUploader {
    /// Uploads a file through an upload session.
    ///
    /// Chunks go out strictly in order, each awaited before the next. Any
    /// failure aborts the whole upload; the session is not resumed.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The session cannot be opened
    /// - A chunk is answered with anything but 2xx or 308
    /// - The session cannot be finalized
    async fn upload(
        &self,
        file: &SourceFile,
        progress: &ProgressReporter,
    ) -> Result<StoredFileDescriptor> {
        let total = file.size();

        let session = self
            .client
            .generate_upload_url(file, self.transaction_type)
            .await
            .map_err(|e| stage_error(e, Error::SessionInit))?;
        progress.advance_to(SESSION_OPENED);

        let ranges = chunk_ranges(total, CHUNK_SIZE);
        let count = ranges.len();
        info!(
            "Upload session {} opened - {count} chunks of {} MB",
            session.session_id,
            CHUNK_SIZE / 1024 / 1024
        );

        for (index, range) in ranges.iter().enumerate() {
            #[allow(clippy::cast_possible_truncation)]
            let data = file.data[range.start as usize..range.end as usize].to_vec();
            let chunk = index + 1;

            self.client
                .upload_chunk(&session, &file.mime_type, data, range, total)
                .await
                .map_err(|e| {
                    stage_error(e, |message| Error::ChunkUpload {
                        chunk,
                        total: count,
                        message,
                    })
                })?;

            progress.advance_to(chunk_progress(chunk, count));
            debug!("Chunk {chunk}/{count} uploaded");
        }

        let descriptor = self
            .client
            .finalize_upload(&session, file, self.transaction_type)
            .await
            .map_err(|e| stage_error(e, Error::Finalize))?;
        progress.advance_to(100);

        info!("Chunked upload of {} stored as {}", file.name, descriptor.file_id);

        Ok(descriptor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::MEGABYTE;

    #[test]
    fn test_ten_megabytes_is_three_chunks() {
        let ranges = chunk_ranges(10 * MEGABYTE, CHUNK_SIZE);
        assert_eq!(
            ranges,
            vec![
                0..4 * MEGABYTE,
                4 * MEGABYTE..8 * MEGABYTE,
                8 * MEGABYTE..10 * MEGABYTE
            ]
        );
    }

    #[test]
    fn test_ranges_cover_input_in_order() {
        for total in [1, 3, 4, 5, 17, 4096] {
            let ranges = chunk_ranges(total, 4);
            assert_eq!(ranges.len() as u64, total.div_ceil(4));
            assert_eq!(ranges.first().map(|r| r.start), Some(0));
            assert_eq!(ranges.last().map(|r| r.end), Some(total));
            for pair in ranges.windows(2) {
                assert_eq!(pair[0].end, pair[1].start);
            }
        }
        assert!(chunk_ranges(0, 4).is_empty());
    }

    #[test]
    fn test_chunk_progress_is_linear() {
        assert_eq!(chunk_progress(0, 4), 10);
        assert_eq!(chunk_progress(1, 4), 30);
        assert_eq!(chunk_progress(2, 4), 50);
        assert_eq!(chunk_progress(4, 4), 90);
        assert_eq!(chunk_progress(1, 3), 36);
        assert_eq!(chunk_progress(3, 3), 90);
    }

    #[test]
    fn test_stage_error_keeps_payload_too_large() {
        assert!(matches!(
            stage_error(Error::FileTooLarge, Error::Finalize),
            Error::FileTooLarge
        ));
        match stage_error(Error::Api("Status 500: boom".to_string()), Error::SessionInit) {
            Error::SessionInit(message) => assert_eq!(message, "Status 500: boom"),
            other => panic!("unexpected {other:?}"),
        }
    }
}
