//! Error types for pixcore.
//!
//! Uses thiserror for structured errors. Every precondition failure carries
//! enough context (expected vs. found, argument name, pixel position) for the
//! caller to report it without re-inspecting the images.

use crate::core::types::{ColorSpace, DataType};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Discriminant of [`ProcessError`], for callers that branch on the kind only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    InvalidDimension,
    SizeMismatch,
    ColorSpaceMismatch,
    DataTypeMismatch,
    UnsupportedDataType,
    InvalidArgument,
    CallbackAbort,
    UpstreamFailure,
}

/// Failures reported by the codec layer.
///
/// This is a closed set; `code()` returns the numeric value the codec layer
/// historically used for each condition.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CodecError {
    #[error("error while opening the file")]
    Open,

    #[error("insufficient access to the file")]
    Access,

    #[error("invalid or unrecognized file format")]
    Format,

    #[error("image data not supported by the file format")]
    Data,

    #[error("compression not supported by the file format")]
    Compress,

    #[error("insufficient memory")]
    Memory,
}

impl CodecError {
    /// Numeric code of this error.
    pub fn code(self) -> i32 {
        match self {
            CodecError::Open => 1,
            CodecError::Access => 2,
            CodecError::Format => 3,
            CodecError::Data => 4,
            CodecError::Compress => 5,
            CodecError::Memory => 6,
        }
    }

    /// Inverse of [`CodecError::code`]. Zero means "no error" and maps to `None`.
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            1 => Some(CodecError::Open),
            2 => Some(CodecError::Access),
            3 => Some(CodecError::Format),
            4 => Some(CodecError::Data),
            5 => Some(CodecError::Compress),
            6 => Some(CodecError::Memory),
            _ => None,
        }
    }
}

/// A failure raised by a collaborator and passed through unchanged.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum UpstreamError {
    #[error("codec: {0}")]
    Codec(#[from] CodecError),

    #[error("kernel '{kernel}': {message}")]
    Kernel { kernel: String, message: String },
}

/// Errors produced by descriptor creation, validation and dispatch.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ProcessError {
    #[error("invalid image dimensions {width}x{height}")]
    InvalidDimension { width: usize, height: usize },

    #[error("images must have the same size ({expected_width}x{expected_height} vs {found_width}x{found_height})")]
    SizeMismatch {
        expected_width: usize,
        expected_height: usize,
        found_width: usize,
        found_height: usize,
    },

    #[error("color space must be {expected}, got {found}")]
    ColorSpaceMismatch { expected: ColorSpace, found: ColorSpace },

    #[error("data type must be {expected}, got {found}")]
    DataTypeMismatch { expected: DataType, found: DataType },

    #[error("image data type can not be {data_type}: {reason}")]
    UnsupportedDataType { data_type: DataType, reason: String },

    #[error("invalid argument '{argument}': {reason}")]
    InvalidArgument { argument: String, reason: String },

    #[error("callback aborted '{operation}' at ({x}, {y}) plane {plane}")]
    CallbackAbort {
        operation: String,
        x: usize,
        y: usize,
        plane: usize,
    },

    #[error("upstream failure: {0}")]
    Upstream(#[from] UpstreamError),
}

impl From<CodecError> for ProcessError {
    fn from(error: CodecError) -> Self {
        ProcessError::Upstream(UpstreamError::Codec(error))
    }
}

impl ProcessError {
    /// Shorthand for an [`ProcessError::InvalidArgument`].
    pub fn invalid_argument(argument: impl Into<String>, reason: impl Into<String>) -> Self {
        ProcessError::InvalidArgument {
            argument: argument.into(),
            reason: reason.into(),
        }
    }

    /// Shorthand for an [`ProcessError::UnsupportedDataType`].
    pub fn unsupported(data_type: DataType, reason: impl Into<String>) -> Self {
        ProcessError::UnsupportedDataType {
            data_type,
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ProcessError::InvalidDimension { .. } => ErrorKind::InvalidDimension,
            ProcessError::SizeMismatch { .. } => ErrorKind::SizeMismatch,
            ProcessError::ColorSpaceMismatch { .. } => ErrorKind::ColorSpaceMismatch,
            ProcessError::DataTypeMismatch { .. } => ErrorKind::DataTypeMismatch,
            ProcessError::UnsupportedDataType { .. } => ErrorKind::UnsupportedDataType,
            ProcessError::InvalidArgument { .. } => ErrorKind::InvalidArgument,
            ProcessError::CallbackAbort { .. } => ErrorKind::CallbackAbort,
            ProcessError::Upstream(_) => ErrorKind::UpstreamFailure,
        }
    }

    /// Get suggestion for fixing this error.
    pub fn suggested_fix(&self) -> Option<String> {
        match self {
            ProcessError::ColorSpaceMismatch { expected, .. } => {
                Some(format!("Convert the image to {} first", expected))
            }
            ProcessError::DataTypeMismatch { expected, .. } => {
                Some(format!("Convert the image data type to {} first", expected))
            }
            ProcessError::SizeMismatch {
                expected_width,
                expected_height,
                ..
            } => Some(format!(
                "Resize the image to {}x{}",
                expected_width, expected_height
            )),
            ProcessError::UnsupportedDataType { data_type, .. } if data_type.is_complex() => {
                Some("Take the real part or magnitude before this operation".to_string())
            }
            _ => None,
        }
    }
}

/// Errors while loading dispatcher configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Result type alias for pixcore operations.
pub type ProcessResult<T> = Result<T, ProcessError>;
