//! Image measurements: histograms, color counts, error metrics and
//! per-plane statistics.

pub mod histogram;
pub mod statistics;

pub use histogram::{calc_histogram, count_colors, histogram_index};
pub use statistics::{calc_image_statistics, calc_rms_error, calc_snr, PlaneStatistics};
