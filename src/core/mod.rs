//! Core types for the pixcore image model.
//!
//! This module contains the foundational pieces every operation builds on:
//! - Color spaces, data types and the `Sample` element trait
//! - The image descriptor and its typed planes
//! - Parameter marshaling between host values and typed arrays
//! - Error types

pub mod error;
pub mod image;
pub mod params;
pub mod types;

// Re-export commonly used types
pub use error::{CodecError, ErrorKind, ProcessError, ProcessResult, UpstreamError};
pub use image::{ImageDescriptor, PlaneData, RowMut};
pub use params::{ArgValue, IndexBase, MarshalStats, Marshaller, ParameterArray};
pub use types::{ColorSpace, Complex32, DataType, Sample};
