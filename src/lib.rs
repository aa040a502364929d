//! Receipt image compression and upload pipeline

pub mod config;
pub mod error;
pub mod file_config;

pub mod api;
pub mod compress;
pub mod progress;
pub mod source;
pub mod upload;
pub mod validate;

pub use config::Config;
pub use error::{Error, Result};

// Re-export commonly used types
pub use api::{Client, StoredFileDescriptor, TransactionType};
pub use compress::{Compression, CompressionPlan, CompressionReport, compress};
pub use progress::ProgressReporter;
pub use source::SourceFile;
pub use upload::{UploadOptions, prepare, upload_file};
