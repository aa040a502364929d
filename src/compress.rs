//! Adaptive JPEG compression for receipt photos.
//!
//! Large photos are downscaled to a size-dependent maximum dimension and
//! re-encoded as JPEG, lowering the quality step by step until the result
//! fits a size budget. Compression is best-effort: anything the decoder
//! cannot read is passed through untouched.

use crate::source::{MEGABYTE, SourceFile};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{
    DynamicImage, ExtendedColorType, ImageDecoder, ImageReader, ImageResult, Limits, RgbImage,
};
use log::{debug, info, warn};
use std::io::Cursor;
use std::path::Path;

/// Files at or below this size are uploaded as-is.
pub const COMPRESSION_THRESHOLD: u64 = MEGABYTE;

/// Lowest JPEG quality (percent) the search will go down to.
pub const MIN_QUALITY: u8 = 50;

/// Maximum number of encodings per compression run.
pub const MAX_ATTEMPTS: u32 = 8;

pub const OUTPUT_MIME_TYPE: &str = "image/jpeg";

/// Guards against decompression bombs.
const MAX_IMAGE_DIMENSION: u32 = 16384;

/// Resize and quality parameters picked from the original file size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompressionPlan {
    pub max_dimension: u32,
    /// JPEG quality in percent for the first encoding.
    pub initial_quality: u8,
    /// Size budget in bytes.
    pub target_size: u64,
    /// Quality decrement in percent between attempts.
    pub quality_step: u8,
}

impl CompressionPlan {
    #[must_use]
    pub fn for_size(size: u64) -> Self {
        let (max_dimension, initial_quality, target_mb) = if size > 40 * MEGABYTE {
            (2200, 80, 8)
        } else if size > 25 * MEGABYTE {
            (2300, 82, 7)
        } else {
            (2400, 85, 6)
        };

        // Very large originals get finer steps so quality holds up longer.
        let quality_step = if size > 30 * MEGABYTE { 5 } else { 8 };

        Self {
            max_dimension,
            initial_quality,
            target_size: target_mb * MEGABYTE,
            quality_step,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompressionReport {
    pub original_size: u64,
    pub compressed_size: u64,
    pub width: u32,
    pub height: u32,
    /// Quality (percent) of the accepted encoding.
    pub quality: u8,
    pub attempts: u32,
}

/// Outcome of [`compress`].
#[derive(Debug, Clone)]
pub enum Compression {
    /// Small enough to upload unchanged.
    Skipped(SourceFile),
    /// Could not be decoded; the original is uploaded instead.
    Degraded(SourceFile),
    Compressed {
        file: SourceFile,
        report: CompressionReport,
    },
}

impl Compression {
    #[must_use]
    pub fn file(&self) -> &SourceFile {
        match self {
            Compression::Skipped(file)
            | Compression::Degraded(file)
            | Compression::Compressed { file, .. } => file,
        }
    }

    #[must_use]
    pub fn into_file(self) -> SourceFile {
        match self {
            Compression::Skipped(file)
            | Compression::Degraded(file)
            | Compression::Compressed { file, .. } => file,
        }
    }

    #[must_use]
    pub fn report(&self) -> Option<&CompressionReport> {
        match self {
            Compression::Compressed { report, .. } => Some(report),
            _ => None,
        }
    }
}

/// Compresses `file` according to the plan for its size.
///
/// Files of at most [`COMPRESSION_THRESHOLD`] bytes are returned unchanged.
/// This is CPU bound; call it from a blocking context.
#[must_use]
pub fn compress(file: SourceFile) -> Compression {
    if file.size() <= COMPRESSION_THRESHOLD {
        debug!("{} is {} bytes, skipping compression", file.name, file.size());
        return Compression::Skipped(file);
    }

    let plan = CompressionPlan::for_size(file.size());
    compress_with_plan(file, plan)
}

/// Runs the resize and quality search with an explicit plan.
#[must_use]
pub fn compress_with_plan(file: SourceFile, plan: CompressionPlan) -> Compression {
    let image = match decode(&file.data) {
        Ok(image) => image,
        Err(e) => {
            warn!(
                "Could not decode {} ({}), uploading original: {e}",
                file.name, file.mime_type
            );
            return Compression::Degraded(file);
        }
    };

    let (width, height) = fit_within(image.width(), image.height(), plan.max_dimension);
    let rgb = if (width, height) == (image.width(), image.height()) {
        image.to_rgb8()
    } else {
        debug!(
            "Resizing {} from {}x{} to {width}x{height}",
            file.name,
            image.width(),
            image.height()
        );
        image
            .resize_exact(width, height, FilterType::Triangle)
            .to_rgb8()
    };
    drop(image);

    let (data, quality, attempts) = match search_quality(&rgb, &plan) {
        Ok(result) => result,
        Err(e) => {
            warn!("Could not encode {}, uploading original: {e}", file.name);
            return Compression::Degraded(file);
        }
    };

    let report = CompressionReport {
        original_size: file.size(),
        compressed_size: data.len() as u64,
        width,
        height,
        quality,
        attempts,
    };

    info!(
        "Compressed {} from {:.2} MB to {:.2} MB ({width}x{height}, quality {quality}, {attempts} attempt(s))",
        file.name,
        file.size_mb(),
        megabytes(report.compressed_size)
    );

    Compression::Compressed {
        file: SourceFile::new(jpeg_name(&file.name), OUTPUT_MIME_TYPE, data),
        report,
    }
}

/// Scales `(width, height)` down so the larger side is at most
/// `max_dimension`, keeping the aspect ratio. Never scales up.
#[must_use]
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::similar_names
)]
pub fn fit_within(width: u32, height: u32, max_dimension: u32) -> (u32, u32) {
    let larger = width.max(height);
    if larger <= max_dimension {
        return (width, height);
    }

    let scale = f64::from(max_dimension) / f64::from(larger);
    let scaled_w = (f64::from(width) * scale).round() as u32;
    let scaled_h = (f64::from(height) * scale).round() as u32;
    (scaled_w.max(1), scaled_h.max(1))
}

fn decode(data: &[u8]) -> ImageResult<DynamicImage> {
    let mut reader = ImageReader::new(Cursor::new(data)).with_guessed_format()?;
    let mut limits = Limits::default();
    limits.max_image_width = Some(MAX_IMAGE_DIMENSION);
    limits.max_image_height = Some(MAX_IMAGE_DIMENSION);
    reader.limits(limits);

    // Phone cameras store rotation in EXIF; bake it in since the JPEG we
    // write carries no EXIF.
    let mut decoder = reader.into_decoder()?;
    let orientation = decoder.orientation()?;
    let mut image = DynamicImage::from_decoder(decoder)?;
    image.apply_orientation(orientation);
    Ok(image)
}

/// Encodes at decreasing quality until the budget, the quality floor or the
/// attempt cap is reached. Returns the last encoding with its quality and
/// the number of encodings made.
fn search_quality(image: &RgbImage, plan: &CompressionPlan) -> ImageResult<(Vec<u8>, u8, u32)> {
    let mut quality = plan.initial_quality.clamp(MIN_QUALITY, 100);
    let mut encoded = encode_jpeg(image, quality)?;
    let mut attempts = 1;

    while encoded.len() as u64 > plan.target_size
        && quality > MIN_QUALITY
        && attempts < MAX_ATTEMPTS
    {
        quality = quality.saturating_sub(plan.quality_step).max(MIN_QUALITY);
        encoded = encode_jpeg(image, quality)?;
        attempts += 1;
        debug!(
            "Attempt {attempts}: quality {quality} -> {:.2} MB",
            megabytes(encoded.len() as u64)
        );
    }

    Ok((encoded, quality, attempts))
}

fn encode_jpeg(image: &RgbImage, quality: u8) -> ImageResult<Vec<u8>> {
    let mut buf = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut buf, quality);
    encoder.encode(
        image.as_raw(),
        image.width(),
        image.height(),
        ExtendedColorType::Rgb8,
    )?;
    Ok(buf)
}

fn jpeg_name(name: &str) -> String {
    Path::new(name)
        .with_extension("jpg")
        .to_string_lossy()
        .into_owned()
}

#[allow(clippy::cast_precision_loss)]
fn megabytes(bytes: u64) -> f64 {
    bytes as f64 / MEGABYTE as f64
}
