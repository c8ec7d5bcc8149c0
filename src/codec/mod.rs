//! Codec layer interface.
//!
//! A codec loads and saves [`ImageDescriptor`]s by path and format name.
//! Codec failures reach the caller unchanged as
//! [`UpstreamError::Codec`](crate::core::error::UpstreamError::Codec).

mod image_io;

pub use image_io::ImageIoCodec;

use crate::core::error::{ProcessError, ProcessResult};
use crate::core::image::ImageDescriptor;
use std::path::Path;

/// Format names understood by [`check_format`], in canonical spelling.
pub const FORMATS: [&str; 6] = ["PNG", "JPEG", "BMP", "TIFF", "GIF", "WEBP"];

/// Loads and saves images.
pub trait ImageCodec: Send + Sync {
    /// Short identifier for diagnostics.
    fn name(&self) -> &str;

    /// Formats this codec can write.
    fn formats(&self) -> &[&'static str];

    fn load(&self, path: &Path) -> ProcessResult<ImageDescriptor>;

    fn save(&self, image: &ImageDescriptor, path: &Path, format: &str) -> ProcessResult<()>;
}

/// Canonical name of a format, case-insensitive. Unknown names are an
/// `InvalidArgument`.
pub fn check_format(name: &str) -> ProcessResult<&'static str> {
    let canonical = match name.to_ascii_uppercase().as_str() {
        "PNG" => "PNG",
        "JPEG" | "JPG" => "JPEG",
        "BMP" => "BMP",
        "TIFF" | "TIF" => "TIFF",
        "GIF" => "GIF",
        "WEBP" => "WEBP",
        _ => {
            return Err(ProcessError::invalid_argument(
                "format",
                format!("unknown format '{}', expected one of {}", name, FORMATS.join(", ")),
            ))
        }
    };
    Ok(canonical)
}

/// Format implied by the extension of `path`.
pub fn format_for_path(path: &Path) -> ProcessResult<&'static str> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .ok_or_else(|| ProcessError::invalid_argument("path", "file has no extension"))?;
    check_format(extension)
}
