//! Histograms and color counting.

use crate::core::error::{ProcessError, ProcessResult};
use crate::core::image::ImageDescriptor;
use crate::core::params::ParameterArray;
use crate::core::types::{ColorSpace, DataType};
use crate::validation::requirements::{
    require_data_type, require_histogram_eligible, require_plane,
};
use std::collections::HashSet;

/// Offset applied to signed 16-bit samples so that `i16::MIN` lands in bin 0.
pub const SHORT_OFFSET: i32 = 32768;

/// Bin of a sample value for a histogram of `data_type`.
///
/// Returns `None` for types without a histogram.
pub fn histogram_index(data_type: DataType, value: f32) -> Option<usize> {
    let value = value as i32;
    match data_type {
        DataType::Byte | DataType::UShort => usize::try_from(value).ok(),
        DataType::Short => usize::try_from(value + SHORT_OFFSET).ok(),
        _ => None,
    }
}

/// Count the samples of one plane.
///
/// Byte images have 256 bins, Short and UShort images 65536. With
/// `cumulative` each bin holds the count of itself and every lower bin.
/// The returned array belongs to the caller.
pub fn calc_histogram(
    image: &ImageDescriptor,
    plane: usize,
    cumulative: bool,
) -> ProcessResult<ParameterArray<u64>> {
    require_histogram_eligible(image)?;
    require_plane(image, plane)?;
    let data_type = image.data_type();
    let bins = data_type
        .histogram_bins()
        .ok_or_else(|| ProcessError::unsupported(data_type, "histogram"))?;

    let mut histogram = vec![0u64; bins];
    if let Some(samples) = image.plane(plane) {
        for i in 0..samples.len() {
            if let Some(bin) = histogram_index(data_type, samples.get(i)) {
                histogram[bin] += 1;
            }
        }
    }

    if cumulative {
        let mut total = 0;
        for count in histogram.iter_mut() {
            total += *count;
            *count = total;
        }
    }
    Ok(ParameterArray::from_vec(histogram))
}

/// Number of distinct colors in the image.
///
/// Single-plane images may be any histogram type. Multi-plane images must be
/// Byte and not CMYK; only the first three color planes are compared.
pub fn count_colors(image: &ImageDescriptor) -> ProcessResult<usize> {
    if image.color_depth() > 1 {
        if image.color_space() == ColorSpace::Cmyk {
            return Err(ProcessError::invalid_argument(
                "image",
                "color space can not be CMYK",
            ));
        }
        require_data_type(image, DataType::Byte)?;

        let planes = image.planes();
        let mut colors = HashSet::new();
        for i in 0..image.count() {
            let rgb = planes[..3]
                .iter()
                .fold(0u32, |acc, plane| (acc << 8) | plane.get(i) as u32);
            colors.insert(rgb);
        }
        return Ok(colors.len());
    }

    let histogram = calc_histogram(image, 0, false)?;
    Ok(histogram.iter().filter(|&&count| count > 0).count())
}
