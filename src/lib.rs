//! # Pixcore - Typed Image Descriptors and Pixel Dispatch
//!
//! Pixcore models images as planar typed buffers and runs per-pixel
//! callbacks over them after checking that the images involved are
//! compatible.
//!
//! ## Features
//!
//! - **Image model**: color space, data type, optional alpha, typed planes
//! - **Compatibility checks**: size, data type, color space and full matches,
//!   as predicates and as fail-fast requirements
//! - **Parameter marshaling**: host value lists to typed arrays, released on
//!   every exit path
//! - **Dispatch**: six operation signatures (unary, unary color, multi,
//!   multi color, render, conditional render) with explicit callback context
//! - **Kernels**: a registry of named numeric kernels for the dispatcher
//! - **Analysis and codecs**: histograms, error metrics, load/save
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use pixcore::prelude::*;
//!
//! let src = ImageDescriptor::create(640, 480, ColorSpace::Gray, DataType::Byte)?;
//! let mut dst = src.create_based();
//!
//! let dispatcher = Dispatcher::new();
//! dispatcher.invoke_unary_point_op(
//!     &src,
//!     &mut dst,
//!     &(),
//!     |_, p| Outcome::Value(255.0 - p.src),
//!     &[],
//!     "invert",
//! )?;
//!
//! // Or through the kernel registry
//! let registry = KernelRegistry::with_builtins();
//! registry.apply(&dispatcher, "linear", &[&src], &mut dst, &[0.5, 10.0])?;
//! ```
//!
//! ## Architecture
//!
//! - [`core`]: image model, parameter marshaling and errors
//! - [`validation`]: compatibility predicates and requirements
//! - [`execution`]: callback types, execution mode and the dispatcher
//! - [`kernels`]: kernel registry and built-in kernels
//! - [`analysis`]: histograms and statistics
//! - [`codec`]: image file loading and saving

#![warn(clippy::all)]

pub mod analysis;
pub mod codec;
pub mod core;
pub mod execution;
pub mod kernels;
pub mod validation;

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use pixcore::prelude::*;
/// ```
pub mod prelude {
    // Image model
    pub use crate::core::image::{ImageDescriptor, PlaneData};
    pub use crate::core::types::{ColorSpace, Complex32, DataType, Sample};

    // Parameters
    pub use crate::core::params::{
        check_mask, ArgValue, IndexBase, MarshalStats, Marshaller, ParameterArray,
    };

    // Errors
    pub use crate::core::error::{
        CodecError, ConfigError, ErrorKind, ProcessError, ProcessResult, UpstreamError,
    };

    // Validation
    pub use crate::validation::predicates::{
        match_color, match_color_space, match_data_type, match_full, match_size, Compatibility,
    };

    // Execution
    pub use crate::execution::callback::{
        ColorPoint, Conditional, MultiColorPoint, MultiPoint, Outcome, PixelPos, RenderPoint,
        UnaryPoint,
    };
    pub use crate::execution::dispatcher::Dispatcher;
    pub use crate::execution::mode::{CallbackMode, ThreadBudget};
    pub use crate::execution::options::DispatchOptions;

    // Kernels
    pub use crate::kernels::registry::{Kernel, KernelMetadata, KernelRegistry, Signature};

    // Analysis and codecs
    pub use crate::analysis::{
        calc_histogram, calc_image_statistics, calc_rms_error, calc_snr, count_colors,
    };
    pub use crate::codec::{check_format, ImageCodec, ImageIoCodec};
}

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name.
pub const NAME: &str = env!("CARGO_PKG_NAME");

#[cfg(test)]
mod tests {
    use super::prelude::*;

    #[test]
    fn test_version() {
        assert!(!super::VERSION.is_empty());
        assert_eq!(super::NAME, "pixcore");
    }

    #[test]
    fn test_registry_with_builtins() {
        let registry = KernelRegistry::with_builtins();

        for id in ["linear", "threshold", "rgb_to_gray", "average", "blend", "ramp", "wheel"] {
            assert!(registry.contains(id), "missing kernel {}", id);
        }
        assert_eq!(registry.kernels_by_signature(Signature::Render), vec!["ramp"]);
    }

    #[test]
    fn test_prelude_pipeline() {
        let dispatcher = Dispatcher::new();
        let registry = KernelRegistry::with_builtins();
        let mut src = ImageDescriptor::create(8, 8, ColorSpace::Gray, DataType::Byte).unwrap();
        registry
            .apply(&dispatcher, "ramp", &[], &mut src, &[0.0, 30.0])
            .unwrap();

        let mut binary = ImageDescriptor::create(8, 8, ColorSpace::Binary, DataType::Byte).unwrap();
        registry
            .apply(&dispatcher, "threshold", &[&src], &mut binary, &[100.0])
            .unwrap();

        let histogram = calc_histogram(&binary, 0, false).unwrap();
        // columns 4..8 hold 120, 150, 180, 210
        assert_eq!(histogram[1], 4 * 8);
        assert_eq!(histogram[0], 4 * 8);
    }
}
