//! Single-image point kernels.

use crate::execution::callback::{ColorPoint, Outcome, UnaryPoint};
use crate::kernels::registry::{Kernel, KernelMetadata, KernelRegistry};

/// Register point kernels.
pub fn register(registry: &mut KernelRegistry) {
    registry.register(
        KernelMetadata::builder("linear", "Linear")
            .description("Scale and offset every sample: v * scale + offset")
            .param("scale", "Multiplier")
            .param("offset", "Added after scaling")
            .build(),
        Kernel::unary_point(linear),
    );
    registry.register_with_check(
        KernelMetadata::builder("threshold", "Threshold")
            .description("Samples at or above the level become 1, the rest 0")
            .param("level", "Threshold level")
            .build(),
        Kernel::unary_point(threshold),
        |params| {
            if params[0].is_finite() {
                Ok(())
            } else {
                Err("level must be a finite number".to_string())
            }
        },
    );
    registry.register(
        KernelMetadata::builder("rgb_to_gray", "RGB to Gray")
            .description("Rec. 601 luma of the first three source planes")
            .build(),
        Kernel::unary_color(rgb_to_gray),
    );
}

pub fn linear(point: UnaryPoint<'_>) -> Outcome<f32> {
    Outcome::Value(point.src * point.params[0] + point.params[1])
}

pub fn threshold(point: UnaryPoint<'_>) -> Outcome<f32> {
    Outcome::Value(if point.src >= point.params[0] { 1.0 } else { 0.0 })
}

/// Declines pixels with fewer than three source planes.
pub fn rgb_to_gray(point: ColorPoint<'_>) -> Outcome<()> {
    match (point.src, point.dst.first_mut()) {
        ([r, g, b, ..], Some(gray)) => {
            *gray = 0.299 * r + 0.587 * g + 0.114 * b;
            Outcome::Value(())
        }
        _ => Outcome::Decline,
    }
}
