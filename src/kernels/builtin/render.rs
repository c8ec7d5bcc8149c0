//! Render kernels: values computed from the pixel position alone.

use crate::execution::callback::{Conditional, Outcome, RenderPoint};
use crate::kernels::registry::{Kernel, KernelMetadata, KernelRegistry};

/// Register render kernels.
pub fn register(registry: &mut KernelRegistry) {
    registry.register(
        KernelMetadata::builder("ramp", "Ramp")
            .description("Horizontal ramp: start + step * x")
            .param("start", "Value at x = 0")
            .param("step", "Increment per column")
            .build(),
        Kernel::render(ramp),
    );
    registry.register_with_check(
        KernelMetadata::builder("wheel", "Wheel")
            .description("Paint a ring between two radii around a center")
            .param("cx", "Center column")
            .param("cy", "Center row")
            .param("inner", "Inner radius")
            .param("outer", "Outer radius")
            .param("value", "Value written inside the ring")
            .build(),
        Kernel::render_cond(wheel),
        |params| {
            let (inner, outer) = (params[2], params[3]);
            if inner < 0.0 || outer < inner {
                Err(format!("radii must satisfy 0 <= inner <= outer, got {} and {}", inner, outer))
            } else {
                Ok(())
            }
        },
    );
}

pub fn ramp(point: RenderPoint<'_>) -> Outcome<f32> {
    Outcome::Value(point.params[0] + point.params[1] * point.pos.x as f32)
}

pub fn wheel(point: RenderPoint<'_>) -> Outcome<Conditional> {
    let p = point.params;
    let dx = point.pos.x as f32 - p[0];
    let dy = point.pos.y as f32 - p[1];
    let distance = (dx * dx + dy * dy).sqrt();
    if distance >= p[2] && distance <= p[3] {
        Outcome::Value(Conditional::apply(p[4]))
    } else {
        Outcome::Value(Conditional::skip())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::ErrorKind;
    use crate::core::image::ImageDescriptor;
    use crate::core::types::{ColorSpace, DataType};
    use crate::execution::dispatcher::Dispatcher;

    fn registry() -> KernelRegistry {
        let mut registry = KernelRegistry::new();
        register(&mut registry);
        registry
    }

    #[test]
    fn test_ramp_and_accumulate() {
        let registry = registry();
        let dispatcher = Dispatcher::new();
        let mut image = ImageDescriptor::create(4, 2, ColorSpace::Gray, DataType::Int).unwrap();

        registry
            .apply(&dispatcher, "ramp", &[], &mut image, &[10.0, 2.0])
            .unwrap();
        assert_eq!(image.get(3, 1, 0), 16.0);

        registry
            .accumulate(&dispatcher, "ramp", &mut image, &[1.0, 0.0])
            .unwrap();
        assert_eq!(image.get(3, 1, 0), 17.0);
        assert_eq!(image.get(0, 0, 0), 11.0);
    }

    #[test]
    fn test_wheel_center_only() {
        let mut image = ImageDescriptor::create(3, 3, ColorSpace::Gray, DataType::Byte).unwrap();
        image.fill(2.0);

        registry()
            .apply(
                &Dispatcher::new(),
                "wheel",
                &[],
                &mut image,
                &[1.0, 1.0, 0.0, 0.5, 7.0],
            )
            .unwrap();

        assert_eq!(image.get(1, 1, 0), 7.0);
        assert_eq!(image.get(0, 1, 0), 2.0);
        assert_eq!(image.get(2, 2, 0), 2.0);
    }

    #[test]
    fn test_wheel_rejects_inverted_radii() {
        let mut image = ImageDescriptor::create(3, 3, ColorSpace::Gray, DataType::Byte).unwrap();
        let err = registry()
            .apply(&Dispatcher::new(), "wheel", &[], &mut image, &[1.0, 1.0, 2.0, 1.0, 7.0])
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn test_render_rejects_sources() {
        let src = ImageDescriptor::create(3, 3, ColorSpace::Gray, DataType::Byte).unwrap();
        let mut image = src.create_based();
        let err = registry()
            .apply(&Dispatcher::new(), "ramp", &[&src], &mut image, &[0.0, 1.0])
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }
}
