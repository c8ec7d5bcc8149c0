//! Error metrics and per-plane statistics.

use crate::core::error::ProcessResult;
use crate::core::image::ImageDescriptor;
use crate::validation::requirements::{require_match_full, require_not_complex};
use serde::{Deserialize, Serialize};

/// Summary of one plane.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlaneStatistics {
    pub max: f64,
    pub min: f64,
    /// Number of samples greater than zero.
    pub positive: usize,
    /// Number of samples less than zero.
    pub negative: usize,
    pub zeros: usize,
    pub mean: f64,
    /// Population standard deviation.
    pub stddev: f64,
}

/// Root mean square difference over every sample of two fully matching images.
pub fn calc_rms_error(a: &ImageDescriptor, b: &ImageDescriptor) -> ProcessResult<f64> {
    require_match_full(a, b)?;

    let mut sum = 0.0f64;
    for (pa, pb) in a.planes().iter().zip(b.planes()) {
        for i in 0..pa.len() {
            let diff = pa.get(i) as f64 - pb.get(i) as f64;
            sum += diff * diff;
        }
    }
    let samples = (a.count() * a.depth()) as f64;
    Ok((sum / samples).sqrt())
}

/// Signal to noise ratio in decibels: `10 * log10(signal power / noise power)`.
///
/// A noise image with zero power yields positive infinity.
pub fn calc_snr(src: &ImageDescriptor, noise: &ImageDescriptor) -> ProcessResult<f64> {
    require_match_full(src, noise)?;

    let power = |image: &ImageDescriptor| -> f64 {
        image
            .planes()
            .iter()
            .flat_map(|plane| (0..plane.len()).map(move |i| plane.get(i) as f64))
            .map(|v| v * v)
            .sum()
    };
    let signal = power(src);
    let noise = power(noise);
    if noise == 0.0 {
        return Ok(f64::INFINITY);
    }
    Ok(10.0 * (signal / noise).log10())
}

/// Statistics for every stored plane, alpha included.
pub fn calc_image_statistics(image: &ImageDescriptor) -> ProcessResult<Vec<PlaneStatistics>> {
    require_not_complex(image)?;

    let count = image.count() as f64;
    let stats = image
        .planes()
        .iter()
        .map(|plane| {
            let mut stats = PlaneStatistics {
                max: f64::MIN,
                min: f64::MAX,
                positive: 0,
                negative: 0,
                zeros: 0,
                mean: 0.0,
                stddev: 0.0,
            };
            let mut sum = 0.0;
            let mut sum_sq = 0.0;
            for i in 0..plane.len() {
                let v = plane.get(i) as f64;
                stats.max = stats.max.max(v);
                stats.min = stats.min.min(v);
                if v > 0.0 {
                    stats.positive += 1;
                } else if v < 0.0 {
                    stats.negative += 1;
                } else {
                    stats.zeros += 1;
                }
                sum += v;
                sum_sq += v * v;
            }
            stats.mean = sum / count;
            stats.stddev = (sum_sq / count - stats.mean * stats.mean).max(0.0).sqrt();
            stats
        })
        .collect();
    Ok(stats)
}
