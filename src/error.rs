use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("{0}")]
    Validation(String),

    #[error(
        "Image is still {:.1} MB after compression (limit {:.0} MB). Please choose a lower-resolution image",
        megabytes(.size),
        megabytes(.limit)
    )]
    SizeCeilingExceeded { size: u64, limit: u64 },

    #[error("Failed to start upload session: {0}")]
    SessionInit(String),

    #[error("Chunk {chunk}/{total} failed: {message}")]
    ChunkUpload {
        chunk: usize,
        total: usize,
        message: String,
    },

    #[error("Failed to finalize upload: {0}")]
    Finalize(String),

    #[error("File is too large for the image store. Please choose a smaller image")]
    FileTooLarge,

    #[error("Compression failed: {0}")]
    Compression(String),

    #[error("API request failed: {0}")]
    Api(String),

    #[error("File error: {0}")]
    File(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

#[allow(clippy::cast_precision_loss, clippy::trivially_copy_pass_by_ref)]
fn megabytes(bytes: &u64) -> f64 {
    *bytes as f64 / 1_048_576.0
}

pub type Result<T> = std::result::Result<T, Error>;
