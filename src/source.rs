use crate::error::{Error, Result};
use log::debug;
use std::path::Path;

pub const MEGABYTE: u64 = 1024 * 1024;

/// An image picked for upload, owned by a single pipeline invocation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SourceFile {
    pub name: String,
    pub mime_type: String,
    pub data: Vec<u8>,
}

impl SourceFile {
    #[must_use]
    pub fn new(name: impl Into<String>, mime_type: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            data,
        }
    }

    /// Reads a file from disk, guessing its MIME type from the extension
    /// unless `mime_override` is given.
    ///
    /// # Errors
    ///
    /// Returns an error if the path has no usable filename or cannot be read.
    pub async fn from_path(path: &Path, mime_override: Option<&str>) -> Result<Self> {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| Error::Config(format!("Invalid filename: {}", path.display())))?
            .to_string();

        let mime_type = match mime_override {
            Some(mime) => mime.to_string(),
            None => mime_guess::from_path(path)
                .first_raw()
                .unwrap_or("application/octet-stream")
                .to_string(),
        };

        let data = tokio::fs::read(path).await?;
        debug!("Read {} ({mime_type}, {} bytes)", name, data.len());

        Ok(Self::new(name, mime_type, data))
    }

    #[must_use]
    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }

    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn size_mb(&self) -> f64 {
        self.size() as f64 / MEGABYTE as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn test_from_path_guesses_mime_type() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fuel-receipt.PNG");
        std::fs::File::create(&path)
            .unwrap()
            .write_all(b"not really a png")
            .unwrap();

        let file = SourceFile::from_path(&path, None).await.unwrap();
        assert_eq!(file.name, "fuel-receipt.PNG");
        assert_eq!(file.mime_type, "image/png");
        assert_eq!(file.size(), 16);

        let file = SourceFile::from_path(&path, Some("image/heic"))
            .await
            .unwrap();
        assert_eq!(file.mime_type, "image/heic");
    }

    #[tokio::test]
    async fn test_from_path_missing_file() {
        let result = SourceFile::from_path(Path::new("/definitely/not/here.jpg"), None).await;
        assert!(matches!(result, Err(Error::File(_))));
    }
}
