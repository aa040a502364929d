use crate::error::{Error, Result};
use crate::source::SourceFile;

/// MIME types accepted for receipt images.
pub const ALLOWED_MIME_TYPES: &[&str] = &[
    "image/jpeg",
    "image/png",
    "image/heic",
    "image/heif",
    "image/webp",
];

/// Checks the declared MIME type against [`ALLOWED_MIME_TYPES`].
///
/// # Errors
///
/// Returns [`Error::Validation`] with a user-facing reason when the type is
/// not accepted.
pub fn validate(file: &SourceFile) -> Result<()> {
    let essence = file
        .mime_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();

    if ALLOWED_MIME_TYPES.contains(&essence.as_str()) {
        Ok(())
    } else {
        Err(Error::Validation(format!(
            "Unsupported file type '{}' for {}. Please select a JPEG, PNG, HEIC, HEIF or WebP image",
            file.mime_type, file.name
        )))
    }
}
