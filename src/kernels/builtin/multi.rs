//! Multi-image kernels.

use crate::execution::callback::{MultiColorPoint, MultiPoint, Outcome};
use crate::kernels::registry::{Kernel, KernelMetadata, KernelRegistry};

/// Register multi-image kernels.
pub fn register(registry: &mut KernelRegistry) {
    registry.register(
        KernelMetadata::builder("average", "Average")
            .description("Mean of the samples of every source image")
            .sources(1..=usize::MAX)
            .build(),
        Kernel::multi_point(average),
    );
    registry.register_with_check(
        KernelMetadata::builder("blend", "Blend")
            .description("alpha * first + (1 - alpha) * second, pixel by pixel")
            .param("alpha", "Weight of the first image (0.0 to 1.0)")
            .sources(2..=2)
            .build(),
        Kernel::multi_color(blend),
        |params| {
            if (0.0..=1.0).contains(&params[0]) {
                Ok(())
            } else {
                Err(format!("alpha must be in [0, 1], got {}", params[0]))
            }
        },
    );
}

pub fn average(point: MultiPoint<'_>) -> Outcome<f32> {
    let sum: f32 = point.src.iter().sum();
    Outcome::Value(sum / point.src.len() as f32)
}

/// Planes beyond the shorter of source and destination are left unchanged.
pub fn blend(point: MultiColorPoint<'_>) -> Outcome<()> {
    if point.source_count() < 2 {
        return Outcome::Decline;
    }
    let alpha = point.params[0];
    let depth = point.src_depth;
    let (first, second) = (&point.src[..depth], &point.src[depth..2 * depth]);
    for (value, (a, b)) in point.dst.iter_mut().zip(first.iter().zip(second)) {
        *value = alpha * a + (1.0 - alpha) * b;
    }
    Outcome::Value(())
}
