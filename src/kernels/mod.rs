//! Named numeric kernels.
//!
//! Kernels are pure functions matching one dispatcher signature. The
//! registry validates their parameters and routes them to the dispatcher.

pub mod builtin;
pub mod registry;

pub use registry::{
    Kernel, KernelEntry, KernelMetadata, KernelParam, KernelRegistry, Signature,
};
