pub mod client;

pub use client::{Client, StoredFileDescriptor, TransactionType, UploadSession};
