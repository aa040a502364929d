use crate::config::Config;
use crate::error::{Error, Result};
use crate::source::SourceFile;
use log::{debug, info};
use reqwest::header::{CONTENT_RANGE, CONTENT_TYPE};
use reqwest::multipart::{Form, Part};
use reqwest::{Client as HttpClient, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::ops::Range;

/// Status the storage service answers with while it expects more chunks.
pub const RESUME_INCOMPLETE: u16 = 308;

#[derive(Clone)]
pub struct Client {
    config: Config,
    http: HttpClient,
}

/// Ledger side of a receipt; the image store files receipts by it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    #[default]
    Expense,
    Income,
}

impl TransactionType {
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            TransactionType::Expense => "expense",
            TransactionType::Income => "income",
        }
    }
}

impl std::str::FromStr for TransactionType {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "expense" | "expenses" => Ok(TransactionType::Expense),
            "income" => Ok(TransactionType::Income),
            _ => Err(Error::Config(format!(
                "Invalid transaction type: '{s}'. Valid types are: expense, income"
            ))),
        }
    }
}

/// Where a stored receipt image can be found.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredFileDescriptor {
    pub file_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub direct_view_link: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail_link: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_link: Option<String>,
}

impl StoredFileDescriptor {
    /// Best link to show for the receipt.
    #[must_use]
    pub fn primary_link(&self) -> Option<&str> {
        self.direct_view_link
            .as_deref()
            .or(self.download_link.as_deref())
            .or(self.thumbnail_link.as_deref())
    }
}

/// Server-issued session for a chunked upload.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadSession {
    pub session_id: String,
    pub upload_url: String,
}

/// Response of `POST /upload`. The image host answers with its own field
/// names (`secure_url`, `public_id`), the storage names, or both.
#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct SmallUploadResponse {
    #[serde(default)]
    pub success: bool,
    pub direct_view_link: Option<String>,
    #[serde(rename = "secure_url")]
    pub secure_url: Option<String>,
    pub file_id: Option<String>,
    #[serde(rename = "public_id")]
    pub public_id: Option<String>,
    pub thumbnail_link: Option<String>,
    pub download_link: Option<String>,
    pub error: Option<String>,
    pub message: Option<String>,
}

impl SmallUploadResponse {
    fn into_descriptor(self) -> Result<StoredFileDescriptor> {
        if !self.success {
            return Err(Error::Api(
                self.error
                    .or(self.message)
                    .unwrap_or_else(|| "Upload was not accepted".to_string()),
            ));
        }

        let file_id = self
            .file_id
            .or(self.public_id)
            .ok_or_else(|| Error::Api("Upload response has no file id".to_string()))?;

        let descriptor = StoredFileDescriptor {
            file_id,
            direct_view_link: self.direct_view_link.or(self.secure_url),
            thumbnail_link: self.thumbnail_link,
            download_link: self.download_link,
        };

        if descriptor.primary_link().is_none() {
            return Err(Error::Api("Upload response has no file URL".to_string()));
        }

        Ok(descriptor)
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateUploadUrlRequest<'a> {
    pub filename: &'a str,
    pub mime_type: &'a str,
    pub file_size: u64,
    pub transaction_type: TransactionType,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalizeUploadRequest<'a> {
    pub session_id: &'a str,
    pub filename: &'a str,
    pub mime_type: &'a str,
    pub transaction_type: TransactionType,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct FinalizeUploadResponse {
    #[serde(default)]
    pub success: bool,
    pub file_id: Option<String>,
    pub thumbnail_link: Option<String>,
    pub direct_view_link: Option<String>,
    pub download_link: Option<String>,
    pub error: Option<String>,
}

impl FinalizeUploadResponse {
    fn into_descriptor(self) -> Result<StoredFileDescriptor> {
        if !self.success {
            return Err(Error::Api(self.error.unwrap_or_else(|| {
                "Server did not confirm the upload".to_string()
            })));
        }

        let file_id = self
            .file_id
            .ok_or_else(|| Error::Api("Finalize response has no file id".to_string()))?;

        Ok(StoredFileDescriptor {
            file_id,
            direct_view_link: self.direct_view_link,
            thumbnail_link: self.thumbnail_link,
            download_link: self.download_link,
        })
    }
}

#[derive(Deserialize, Default)]
struct ErrorBody {
    error: Option<String>,
    message: Option<String>,
}

/// `bytes {start}-{end-1}/{total}` for the half-open `range`.
#[must_use]
pub fn content_range(range: &Range<u64>, total: u64) -> String {
    format!(
        "bytes {}-{}/{total}",
        range.start,
        range.end.saturating_sub(1)
    )
}

/// Turns a failed response into an error, keeping the server's message
/// when the body carries one.
async fn error_from_response(response: Response) -> Error {
    let status = response.status();
    if status == StatusCode::PAYLOAD_TOO_LARGE {
        return Error::FileTooLarge;
    }

    let body = response.text().await.unwrap_or_default();
    debug!("Error response body: {body}");

    let message = serde_json::from_str::<ErrorBody>(&body)
        .ok()
        .and_then(|b| b.error.or(b.message))
        .unwrap_or_else(|| "Upload failed. Please try again".to_string());

    Error::Api(format!("Status {status}: {message}"))
}

impl Client {
    /// Creates a client for the image storage API.
    ///
    /// Redirects are not followed: a 308 from the chunk endpoint means
    /// "send the next chunk", not "go elsewhere".
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: Config) -> Result<Self> {
        let http = HttpClient::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()?;
        Ok(Self { config, http })
    }

    fn with_api_key(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.config.api_key {
            Some(key) => request.header("x-api-key", key),
            None => request,
        }
    }

    /// Upload a whole file in one multipart request
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP request fails, the server returns a
    /// non-success status or the response does not describe a stored file.
    pub async fn upload_small(&self, file: &SourceFile) -> Result<StoredFileDescriptor> {
        let url = self.config.endpoint("upload");
        debug!("Uploading {} ({} bytes) to: {url}", file.name, file.size());

        let part = Part::bytes(file.data.clone())
            .file_name(file.name.clone())
            .mime_str(&file.mime_type)?;
        let form = Form::new().part("file", part);

        let response = self
            .with_api_key(self.http.post(&url))
            .multipart(form)
            .send()
            .await?;

        debug!("Received response with status: {}", response.status());

        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }

        let body = response.text().await?;
        debug!("Response body: {body}");

        let upload_response: SmallUploadResponse = serde_json::from_str(&body).map_err(|e| {
            Error::Api(format!("Failed to parse response: {e}. Body was: {body}"))
        })?;

        let descriptor = upload_response.into_descriptor()?;
        info!("Stored {} as {}", file.name, descriptor.file_id);
        Ok(descriptor)
    }

    /// Open a chunked upload session
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP request fails or if the server returns a non-success status code.
    pub async fn generate_upload_url(
        &self,
        file: &SourceFile,
        transaction_type: TransactionType,
    ) -> Result<UploadSession> {
        let url = self.config.endpoint("generate-upload-url");
        debug!("Requesting upload session from: {url}");

        let request = GenerateUploadUrlRequest {
            filename: &file.name,
            mime_type: &file.mime_type,
            file_size: file.size(),
            transaction_type,
        };

        let response = self
            .with_api_key(self.http.post(&url))
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }

        let body = response.text().await?;
        debug!("Session response body: {body}");

        let session: UploadSession = serde_json::from_str(&body).map_err(|e| {
            Error::Api(format!("Failed to parse response: {e}. Body was: {body}"))
        })?;

        debug!("Opened upload session {}", session.session_id);
        Ok(session)
    }

    /// PUT one byte range of a chunked upload
    ///
    /// Both 2xx and 308 (Resume Incomplete) count as accepted.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP request fails or the server answers with
    /// any other status.
    pub async fn upload_chunk(
        &self,
        session: &UploadSession,
        mime_type: &str,
        data: Vec<u8>,
        range: &Range<u64>,
        total: u64,
    ) -> Result<()> {
        let header = content_range(range, total);
        debug!("PUT {} bytes ({header})", data.len());

        let response = self
            .http
            .put(&session.upload_url)
            .header(CONTENT_TYPE, mime_type)
            .header(CONTENT_RANGE, &header)
            .header("X-Upload-Content-Type", mime_type)
            .body(data)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() || status.as_u16() == RESUME_INCOMPLETE {
            debug!("Chunk {header} accepted with status {status}");
            return Ok(());
        }

        Err(error_from_response(response).await)
    }

    /// Close a chunked upload session and fetch the stored file
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP request fails, the server returns a
    /// non-success status or does not confirm the upload.
    pub async fn finalize_upload(
        &self,
        session: &UploadSession,
        file: &SourceFile,
        transaction_type: TransactionType,
    ) -> Result<StoredFileDescriptor> {
        let url = self.config.endpoint("finalize-upload");
        debug!("Finalizing upload session {}", session.session_id);

        let request = FinalizeUploadRequest {
            session_id: &session.session_id,
            filename: &file.name,
            mime_type: &file.mime_type,
            transaction_type,
        };

        let response = self
            .with_api_key(self.http.post(&url))
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }

        let body = response.text().await?;
        debug!("Finalize response body: {body}");

        let finalize: FinalizeUploadResponse = serde_json::from_str(&body).map_err(|e| {
            Error::Api(format!("Failed to parse response: {e}. Body was: {body}"))
        })?;

        let descriptor = finalize.into_descriptor()?;
        info!("Upload session {} finalized", session.session_id);
        Ok(descriptor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_range() {
        assert_eq!(content_range(&(0..4), 10), "bytes 0-3/10");
        assert_eq!(content_range(&(8..10), 10), "bytes 8-9/10");
    }

    #[test]
    fn test_transaction_type_round_trip() {
        assert_eq!(
            "Income".parse::<TransactionType>().unwrap(),
            TransactionType::Income
        );
        assert_eq!(TransactionType::Expense.as_str(), "expense");
        assert!("transfer".parse::<TransactionType>().is_err());
        assert_eq!(
            serde_json::to_string(&TransactionType::Income).unwrap(),
            "\"income\""
        );
    }

    #[test]
    fn test_small_response_accepts_image_host_fields() {
        let response: SmallUploadResponse = serde_json::from_str(
            r#"{"success": true, "secure_url": "https://img.example.com/r.jpg", "public_id": "receipts/r"}"#,
        )
        .unwrap();
        let descriptor = response.into_descriptor().unwrap();
        assert_eq!(descriptor.file_id, "receipts/r");
        assert_eq!(
            descriptor.primary_link(),
            Some("https://img.example.com/r.jpg")
        );
    }

    #[test]
    fn test_small_response_accepts_storage_fields() {
        let response: SmallUploadResponse = serde_json::from_str(
            r#"{"success": true, "fileId": "abc", "directViewLink": "https://v/abc",
                "thumbnailLink": "https://t/abc", "downloadLink": "https://d/abc"}"#,
        )
        .unwrap();
        let descriptor = response.into_descriptor().unwrap();
        assert_eq!(descriptor.file_id, "abc");
        assert_eq!(descriptor.thumbnail_link.as_deref(), Some("https://t/abc"));
        assert_eq!(descriptor.download_link.as_deref(), Some("https://d/abc"));
    }

    #[test]
    fn test_small_response_with_both_field_names() {
        let response: SmallUploadResponse = serde_json::from_str(
            r#"{"success": true, "secure_url": "https://img/a", "directViewLink": "https://view/a",
                "public_id": "receipts/a", "fileId": "drive-a"}"#,
        )
        .unwrap();
        let descriptor = response.into_descriptor().unwrap();
        assert_eq!(descriptor.file_id, "drive-a");
        assert_eq!(descriptor.primary_link(), Some("https://view/a"));
    }

    #[test]
    fn test_small_response_failure_keeps_server_message() {
        let response: SmallUploadResponse =
            serde_json::from_str(r#"{"success": false, "error": "Drive quota exceeded"}"#)
                .unwrap();
        let err = response.into_descriptor().unwrap_err();
        assert!(err.to_string().contains("Drive quota exceeded"));
    }

    #[test]
    fn test_small_response_without_url_is_rejected() {
        let response: SmallUploadResponse =
            serde_json::from_str(r#"{"success": true, "fileId": "abc"}"#).unwrap();
        assert!(response.into_descriptor().is_err());
    }

    #[test]
    fn test_finalize_requires_success() {
        let response: FinalizeUploadResponse =
            serde_json::from_str(r#"{"success": false}"#).unwrap();
        assert!(response.into_descriptor().is_err());

        let response: FinalizeUploadResponse = serde_json::from_str(
            r#"{"success": true, "fileId": "f1", "thumbnailLink": "t", "directViewLink": "v", "downloadLink": "d"}"#,
        )
        .unwrap();
        let descriptor = response.into_descriptor().unwrap();
        assert_eq!(descriptor.file_id, "f1");
        assert_eq!(descriptor.primary_link(), Some("v"));
    }
}
