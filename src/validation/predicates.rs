//! Pairwise and group compatibility predicates.
//!
//! All predicates are pure comparisons of descriptor attributes; none of them
//! look at pixel data.

use crate::core::image::ImageDescriptor;
use serde::{Deserialize, Serialize};

/// The five compatibility predicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Compatibility {
    /// Widths and heights are equal.
    Size,
    /// Data types are equal.
    DataType,
    /// Color spaces are equal.
    ColorSpace,
    /// Data type and color space are equal.
    Color,
    /// Size, data type and color space are equal.
    Full,
}

impl Compatibility {
    /// Evaluate this predicate on a pair of images.
    pub fn holds(self, a: &ImageDescriptor, b: &ImageDescriptor) -> bool {
        match self {
            Compatibility::Size => match_size(a, b),
            Compatibility::DataType => match_data_type(a, b),
            Compatibility::ColorSpace => match_color_space(a, b),
            Compatibility::Color => match_color(a, b),
            Compatibility::Full => match_full(a, b),
        }
    }

    /// Evaluate this predicate on every image against the first one.
    ///
    /// All five predicates are equivalence relations, so checking against the
    /// first image is the same as checking every pair. An empty or single
    /// image list trivially matches.
    pub fn holds_for_all(self, images: &[&ImageDescriptor]) -> bool {
        match images.split_first() {
            Some((first, rest)) => rest.iter().all(|image| self.holds(first, image)),
            None => true,
        }
    }
}

pub fn match_size(a: &ImageDescriptor, b: &ImageDescriptor) -> bool {
    a.width() == b.width() && a.height() == b.height()
}

pub fn match_data_type(a: &ImageDescriptor, b: &ImageDescriptor) -> bool {
    a.data_type() == b.data_type()
}

pub fn match_color_space(a: &ImageDescriptor, b: &ImageDescriptor) -> bool {
    a.color_space() == b.color_space()
}

pub fn match_color(a: &ImageDescriptor, b: &ImageDescriptor) -> bool {
    match_data_type(a, b) && match_color_space(a, b)
}

pub fn match_full(a: &ImageDescriptor, b: &ImageDescriptor) -> bool {
    match_size(a, b) && match_color(a, b)
}
