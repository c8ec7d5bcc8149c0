//! Fail-fast precondition checks.
//!
//! Each operation states its preconditions as a short sequence of these
//! functions joined with `?`. A failed requirement returns before any pixel
//! buffer is touched.

use crate::core::error::{ProcessError, ProcessResult};
use crate::core::image::ImageDescriptor;
use crate::core::types::{ColorSpace, DataType};
use crate::validation::predicates::{match_color_space, match_data_type, match_size};

pub fn require_color_space(image: &ImageDescriptor, expected: ColorSpace) -> ProcessResult<()> {
    if image.color_space() != expected {
        return Err(ProcessError::ColorSpaceMismatch {
            expected,
            found: image.color_space(),
        });
    }
    Ok(())
}

pub fn require_data_type(image: &ImageDescriptor, expected: DataType) -> ProcessResult<()> {
    if image.data_type() != expected {
        return Err(ProcessError::DataTypeMismatch {
            expected,
            found: image.data_type(),
        });
    }
    Ok(())
}

/// Complex planes have no ordering, so rank, morphology and point
/// callbacks cannot run on them.
pub fn require_not_complex(image: &ImageDescriptor) -> ProcessResult<()> {
    if image.data_type().is_complex() {
        return Err(ProcessError::unsupported(
            image.data_type(),
            "operation is not defined for complex data",
        ));
    }
    Ok(())
}

/// Histograms are only defined for byte, short and ushort images.
pub fn require_histogram_eligible(image: &ImageDescriptor) -> ProcessResult<()> {
    if image.data_type().histogram_bins().is_none() {
        return Err(ProcessError::unsupported(
            image.data_type(),
            "image data type must be byte, short or ushort",
        ));
    }
    Ok(())
}

pub fn require_match_size(a: &ImageDescriptor, b: &ImageDescriptor) -> ProcessResult<()> {
    if !match_size(a, b) {
        return Err(ProcessError::SizeMismatch {
            expected_width: a.width(),
            expected_height: a.height(),
            found_width: b.width(),
            found_height: b.height(),
        });
    }
    Ok(())
}

pub fn require_match_data_type(a: &ImageDescriptor, b: &ImageDescriptor) -> ProcessResult<()> {
    if !match_data_type(a, b) {
        return require_data_type(b, a.data_type());
    }
    Ok(())
}

pub fn require_match_color_space(a: &ImageDescriptor, b: &ImageDescriptor) -> ProcessResult<()> {
    if !match_color_space(a, b) {
        return require_color_space(b, a.color_space());
    }
    Ok(())
}

/// Data type, then color space. `a` supplies the expected values.
pub fn require_match_color(a: &ImageDescriptor, b: &ImageDescriptor) -> ProcessResult<()> {
    require_match_data_type(a, b)?;
    require_match_color_space(a, b)
}

/// Size, then data type, then color space. The error names the first
/// attribute that differs.
pub fn require_match_full(a: &ImageDescriptor, b: &ImageDescriptor) -> ProcessResult<()> {
    require_match_size(a, b)?;
    require_match_color(a, b)
}

/// Equal plane counts (alpha included).
pub fn require_same_depth(a: &ImageDescriptor, b: &ImageDescriptor) -> ProcessResult<()> {
    if a.depth() != b.depth() {
        return Err(ProcessError::invalid_argument(
            "images",
            format!("images must have the same depth ({} vs {})", a.depth(), b.depth()),
        ));
    }
    Ok(())
}

/// A plane index valid for `image`.
pub fn require_plane(image: &ImageDescriptor, plane: usize) -> ProcessResult<()> {
    if plane >= image.depth() {
        return Err(ProcessError::invalid_argument(
            "plane",
            format!("plane {} out of range for depth {}", plane, image.depth()),
        ));
    }
    Ok(())
}
