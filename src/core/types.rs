//! Scalar vocabulary of the image model: color spaces, data types and the
//! sample trait that lets the dispatcher read and write every plane type as `f32`.
//!
//! Both enums are closed sets. Exhaustive matching keeps plane allocation,
//! byte widths and diagnostics in one place for each variant.

use bytemuck::{Pod, Zeroable};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Semantic interpretation of an image's planes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorSpace {
    /// Two-level image stored as 0/1 bytes.
    Binary,
    /// Single luminance plane.
    Gray,
    /// Red, green, blue.
    Rgb,
    /// Red, green, blue, alpha (alpha is part of the color model).
    Rgba,
    /// Cyan, magenta, yellow, black.
    Cmyk,
    /// Luma plus two chroma planes.
    YCbCr,
    /// CIE L*a*b*.
    Lab,
    /// CIE L*u*v*.
    Luv,
    /// CIE XYZ.
    Xyz,
    /// Palette indices into a color map.
    Map,
}

/// Numeric representation of each pixel sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    /// Unsigned 8-bit.
    Byte,
    /// Signed 16-bit.
    Short,
    /// Unsigned 16-bit.
    UShort,
    /// Signed 32-bit.
    Int,
    /// 32-bit float.
    Float,
    /// Pair of 32-bit floats (real, imaginary).
    CFloat,
}

impl ColorSpace {
    /// Every color space, in declaration order.
    pub const ALL: [ColorSpace; 10] = [
        ColorSpace::Binary,
        ColorSpace::Gray,
        ColorSpace::Rgb,
        ColorSpace::Rgba,
        ColorSpace::Cmyk,
        ColorSpace::YCbCr,
        ColorSpace::Lab,
        ColorSpace::Luv,
        ColorSpace::Xyz,
        ColorSpace::Map,
    ];

    /// Canonical number of color planes, not counting a separate alpha plane.
    pub fn plane_count(self) -> usize {
        match self {
            ColorSpace::Binary | ColorSpace::Gray | ColorSpace::Map => 1,
            ColorSpace::Rgb
            | ColorSpace::YCbCr
            | ColorSpace::Lab
            | ColorSpace::Luv
            | ColorSpace::Xyz => 3,
            ColorSpace::Rgba | ColorSpace::Cmyk => 4,
        }
    }

    /// Human-readable name used in diagnostics.
    pub fn name(self) -> &'static str {
        match self {
            ColorSpace::Binary => "Binary",
            ColorSpace::Gray => "Gray",
            ColorSpace::Rgb => "RGB",
            ColorSpace::Rgba => "RGBA",
            ColorSpace::Cmyk => "CMYK",
            ColorSpace::YCbCr => "YCbCr",
            ColorSpace::Lab => "Lab",
            ColorSpace::Luv => "Luv",
            ColorSpace::Xyz => "XYZ",
            ColorSpace::Map => "Map",
        }
    }

    /// Binary and Map images index into a palette and only hold bytes.
    pub fn requires_byte(self) -> bool {
        matches!(self, ColorSpace::Binary | ColorSpace::Map)
    }
}

impl DataType {
    /// Every data type, in declaration order.
    pub const ALL: [DataType; 6] = [
        DataType::Byte,
        DataType::Short,
        DataType::UShort,
        DataType::Int,
        DataType::Float,
        DataType::CFloat,
    ];

    /// Width in bytes of one sample.
    pub fn byte_size(self) -> usize {
        match self {
            DataType::Byte => 1,
            DataType::Short | DataType::UShort => 2,
            DataType::Int | DataType::Float => 4,
            DataType::CFloat => 8,
        }
    }

    /// Human-readable name used in diagnostics.
    pub fn name(self) -> &'static str {
        match self {
            DataType::Byte => "byte",
            DataType::Short => "short",
            DataType::UShort => "ushort",
            DataType::Int => "int",
            DataType::Float => "float",
            DataType::CFloat => "cfloat",
        }
    }

    pub fn is_complex(self) -> bool {
        matches!(self, DataType::CFloat)
    }

    /// Number of histogram bins for the discrete types, `None` otherwise.
    pub fn histogram_bins(self) -> Option<usize> {
        match self {
            DataType::Byte => Some(256),
            DataType::Short | DataType::UShort => Some(65536),
            _ => None,
        }
    }
}

impl fmt::Display for ColorSpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Complex sample with single-precision parts.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable, Serialize, Deserialize)]
pub struct Complex32 {
    pub re: f32,
    pub im: f32,
}

impl Complex32 {
    pub fn new(re: f32, im: f32) -> Self {
        Self { re, im }
    }

    pub fn magnitude(self) -> f32 {
        (self.re * self.re + self.im * self.im).sqrt()
    }
}

/// A plane element that can be read and written through `f32`.
///
/// Writes round to the nearest integer and saturate at the type's range, so a
/// callback result of `300.0` lands in a byte plane as `255`.
///
/// `f32` holds every integer up to 2^24 exactly. `Int` samples beyond that
/// magnitude are rounded to the nearest representable float on every read
/// and write, even when a callback returns its input unchanged.
pub trait Sample: Copy + Default + Send + Sync + 'static {
    const DATA_TYPE: DataType;

    fn to_f32(self) -> f32;
    fn from_f32(value: f32) -> Self;
}

impl Sample for u8 {
    const DATA_TYPE: DataType = DataType::Byte;

    fn to_f32(self) -> f32 {
        self as f32
    }

    fn from_f32(value: f32) -> Self {
        value.round().clamp(0.0, u8::MAX as f32) as u8
    }
}

impl Sample for i16 {
    const DATA_TYPE: DataType = DataType::Short;

    fn to_f32(self) -> f32 {
        self as f32
    }

    fn from_f32(value: f32) -> Self {
        value.round().clamp(i16::MIN as f32, i16::MAX as f32) as i16
    }
}

impl Sample for u16 {
    const DATA_TYPE: DataType = DataType::UShort;

    fn to_f32(self) -> f32 {
        self as f32
    }

    fn from_f32(value: f32) -> Self {
        value.round().clamp(0.0, u16::MAX as f32) as u16
    }
}

impl Sample for i32 {
    const DATA_TYPE: DataType = DataType::Int;

    fn to_f32(self) -> f32 {
        self as f32
    }

    fn from_f32(value: f32) -> Self {
        // `as` saturates for out-of-range floats and maps NaN to 0.
        value.round() as i32
    }
}

impl Sample for f32 {
    const DATA_TYPE: DataType = DataType::Float;

    fn to_f32(self) -> f32 {
        self
    }

    fn from_f32(value: f32) -> Self {
        value
    }
}

impl Sample for Complex32 {
    const DATA_TYPE: DataType = DataType::CFloat;

    fn to_f32(self) -> f32 {
        self.re
    }

    fn from_f32(value: f32) -> Self {
        Complex32::new(value, 0.0)
    }
}
