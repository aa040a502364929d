use crate::api::{Client, StoredFileDescriptor};
use crate::error::Result;
use crate::progress::ProgressReporter;
use crate::source::SourceFile;
use crate::upload::UploadStrategy;
use async_trait::async_trait;
use log::{debug, info};
use rand::Rng;
use std::time::Duration;

const TICK_INTERVAL: Duration = Duration::from_millis(200);

/// The in-flight estimate never passes this until the server answers.
const SYNTHETIC_CAP: u8 = 90;

/// Sends the whole file in one multipart request.
pub struct SmallFileUploader {
    client: Client,
}

impl SmallFileUploader {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

fn jitter() -> u8 {
    rand::rng().random_range(1..=10)
}

#[async_trait]
impl UploadStrategy for SmallFileUploader {
    /// Uploads a file in a single request.
    ///
    /// A single request gives no byte-level feedback, so progress is
    /// estimated: it creeps up on a timer until the response arrives.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server does not return a
    /// stored file.
    async fn upload(
        &self,
        file: &SourceFile,
        progress: &ProgressReporter,
    ) -> Result<StoredFileDescriptor> {
        let ticker = progress.clone();
        let ticks = tokio::spawn(async move {
            let mut interval = tokio::time::interval(TICK_INTERVAL);
            loop {
                interval.tick().await;
                ticker.bump(jitter(), SYNTHETIC_CAP);
            }
        });

        let result = self.client.upload_small(file).await;

        // Wait for the ticker to stop so it cannot write after a reset.
        ticks.abort();
        let _ = ticks.await;

        let descriptor = result?;
        debug!("Single request upload returned {}", descriptor.file_id);

        progress.advance_to(100);
        info!("{} uploaded", file.name);

        Ok(descriptor)
    }
}
