//! Built-in kernel implementations.
//!
//! This module contains the kernels that ship with pixcore.

mod multi;
mod point;
mod render;

use crate::kernels::registry::KernelRegistry;

/// Register all built-in kernels.
pub fn register_all(registry: &mut KernelRegistry) {
    point::register(registry);
    multi::register(registry);
    render::register(registry);
}

// Re-export for direct use with the dispatcher
pub use multi::{average, blend};
pub use point::{linear, rgb_to_gray, threshold};
pub use render::{ramp, wheel};
