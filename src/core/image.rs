//! The canonical in-memory image representation.
//!
//! An [`ImageDescriptor`] owns one typed buffer per plane. Planes are stored
//! separately (not interleaved) so a plane-wise kernel can borrow a single
//! plane, and so row slices of different planes never alias.

use crate::core::error::{ProcessError, ProcessResult};
use crate::core::types::{ColorSpace, Complex32, DataType, Sample};

/// Applies `$body` to the vector (or slice) held by any plane variant.
macro_rules! with_plane {
    ($value:expr, $enum:ident, $inner:ident => $body:expr) => {
        match $value {
            $enum::Byte($inner) => $body,
            $enum::Short($inner) => $body,
            $enum::UShort($inner) => $body,
            $enum::Int($inner) => $body,
            $enum::Float($inner) => $body,
            $enum::CFloat($inner) => $body,
        }
    };
}

/// Pixel storage for one plane.
#[derive(Debug, Clone, PartialEq)]
pub enum PlaneData {
    Byte(Vec<u8>),
    Short(Vec<i16>),
    UShort(Vec<u16>),
    Int(Vec<i32>),
    Float(Vec<f32>),
    CFloat(Vec<Complex32>),
}

impl PlaneData {
    /// Allocate a zero-filled plane of `count` samples.
    pub fn zeroed(data_type: DataType, count: usize) -> Self {
        match data_type {
            DataType::Byte => PlaneData::Byte(vec![0; count]),
            DataType::Short => PlaneData::Short(vec![0; count]),
            DataType::UShort => PlaneData::UShort(vec![0; count]),
            DataType::Int => PlaneData::Int(vec![0; count]),
            DataType::Float => PlaneData::Float(vec![0.0; count]),
            DataType::CFloat => PlaneData::CFloat(vec![Complex32::default(); count]),
        }
    }

    pub fn data_type(&self) -> DataType {
        match self {
            PlaneData::Byte(_) => DataType::Byte,
            PlaneData::Short(_) => DataType::Short,
            PlaneData::UShort(_) => DataType::UShort,
            PlaneData::Int(_) => DataType::Int,
            PlaneData::Float(_) => DataType::Float,
            PlaneData::CFloat(_) => DataType::CFloat,
        }
    }

    pub fn len(&self) -> usize {
        with_plane!(self, PlaneData, v => v.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Read sample `index` as `f32`. Complex samples yield their real part.
    pub fn get(&self, index: usize) -> f32 {
        with_plane!(self, PlaneData, v => v[index].to_f32())
    }

    /// Write sample `index`, rounding and saturating to the plane's type.
    pub fn set(&mut self, index: usize, value: f32) {
        with_plane!(self, PlaneData, v => v[index] = Sample::from_f32(value))
    }

    /// Fill every sample with `value`.
    pub fn fill(&mut self, value: f32) {
        with_plane!(self, PlaneData, v => {
            for sample in v.iter_mut() {
                *sample = Sample::from_f32(value);
            }
        })
    }

    /// Raw native-endian bytes of the plane.
    pub fn as_bytes(&self) -> &[u8] {
        with_plane!(self, PlaneData, v => bytemuck::cast_slice(v.as_slice()))
    }

    /// Split the plane into mutable rows of `width` samples.
    pub fn rows_mut(&mut self, width: usize) -> Vec<RowMut<'_>> {
        match self {
            PlaneData::Byte(v) => v.chunks_mut(width).map(RowMut::Byte).collect(),
            PlaneData::Short(v) => v.chunks_mut(width).map(RowMut::Short).collect(),
            PlaneData::UShort(v) => v.chunks_mut(width).map(RowMut::UShort).collect(),
            PlaneData::Int(v) => v.chunks_mut(width).map(RowMut::Int).collect(),
            PlaneData::Float(v) => v.chunks_mut(width).map(RowMut::Float).collect(),
            PlaneData::CFloat(v) => v.chunks_mut(width).map(RowMut::CFloat).collect(),
        }
    }
}

/// A mutable row of one plane, borrowed from an [`ImageDescriptor`].
#[derive(Debug)]
pub enum RowMut<'a> {
    Byte(&'a mut [u8]),
    Short(&'a mut [i16]),
    UShort(&'a mut [u16]),
    Int(&'a mut [i32]),
    Float(&'a mut [f32]),
    CFloat(&'a mut [Complex32]),
}

impl RowMut<'_> {
    pub fn len(&self) -> usize {
        with_plane!(self, RowMut, v => v.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, x: usize) -> f32 {
        with_plane!(self, RowMut, v => v[x].to_f32())
    }

    pub fn set(&mut self, x: usize, value: f32) {
        with_plane!(self, RowMut, v => v[x] = Sample::from_f32(value))
    }
}

/// One raster image buffer: dimensions, interpretation and owned planes.
///
/// `depth()` counts every stored plane, including the alpha plane when
/// `has_alpha()` is set. All planes hold `count()` samples of `data_type()`.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageDescriptor {
    width: usize,
    height: usize,
    color_space: ColorSpace,
    data_type: DataType,
    has_alpha: bool,
    planes: Vec<PlaneData>,
    palette: Option<Vec<[u8; 3]>>,
}

impl ImageDescriptor {
    /// Create a zero-filled image.
    ///
    /// Fails with `InvalidDimension` when either dimension is zero or the
    /// sample count overflows, and with `UnsupportedDataType` when a Binary or
    /// Map image is requested with anything other than bytes.
    pub fn create(
        width: usize,
        height: usize,
        color_space: ColorSpace,
        data_type: DataType,
    ) -> ProcessResult<Self> {
        Self::allocate(width, height, color_space, data_type, false)
    }

    /// Like [`ImageDescriptor::create`] with an extra alpha plane.
    pub fn create_with_alpha(
        width: usize,
        height: usize,
        color_space: ColorSpace,
        data_type: DataType,
    ) -> ProcessResult<Self> {
        Self::allocate(width, height, color_space, data_type, true)
    }

    /// Create an image with the same size, color space, data type and alpha as `self`.
    pub fn create_based(&self) -> Self {
        Self {
            width: self.width,
            height: self.height,
            color_space: self.color_space,
            data_type: self.data_type,
            has_alpha: self.has_alpha,
            planes: (0..self.depth())
                .map(|_| PlaneData::zeroed(self.data_type, self.count()))
                .collect(),
            palette: self.palette.clone(),
        }
    }

    /// Assemble an image from planes produced elsewhere (e.g. by a codec).
    ///
    /// The plane count, plane lengths and plane types must agree with the
    /// other arguments.
    pub fn from_planes(
        width: usize,
        height: usize,
        color_space: ColorSpace,
        has_alpha: bool,
        planes: Vec<PlaneData>,
    ) -> ProcessResult<Self> {
        let count = checked_count(width, height)?;
        let expected_depth = color_space.plane_count() + usize::from(has_alpha);
        if planes.len() != expected_depth {
            return Err(ProcessError::invalid_argument(
                "planes",
                format!("{} needs {} planes, got {}", color_space, expected_depth, planes.len()),
            ));
        }

        let data_type = planes[0].data_type();
        if let Some(bad) = planes
            .iter()
            .position(|p| p.data_type() != data_type || p.len() != count)
        {
            return Err(ProcessError::invalid_argument(
                "planes",
                format!("plane {} does not hold {} {} samples", bad, count, data_type),
            ));
        }
        check_color_data(color_space, data_type)?;

        Ok(Self {
            width,
            height,
            color_space,
            data_type,
            has_alpha,
            planes,
            palette: default_palette(color_space),
        })
    }

    fn allocate(
        width: usize,
        height: usize,
        color_space: ColorSpace,
        data_type: DataType,
        has_alpha: bool,
    ) -> ProcessResult<Self> {
        let count = checked_count(width, height)?;
        check_color_data(color_space, data_type)?;

        let depth = color_space.plane_count() + usize::from(has_alpha);
        Ok(Self {
            width,
            height,
            color_space,
            data_type,
            has_alpha,
            planes: (0..depth).map(|_| PlaneData::zeroed(data_type, count)).collect(),
            palette: default_palette(color_space),
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn color_space(&self) -> ColorSpace {
        self.color_space
    }

    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    pub fn has_alpha(&self) -> bool {
        self.has_alpha
    }

    /// Number of stored planes, alpha included.
    pub fn depth(&self) -> usize {
        self.planes.len()
    }

    /// Number of color planes, alpha excluded.
    pub fn color_depth(&self) -> usize {
        self.color_space.plane_count()
    }

    /// Samples per plane (`width * height`).
    pub fn count(&self) -> usize {
        self.width * self.height
    }

    /// Total size of the pixel buffers in bytes.
    pub fn byte_size(&self) -> usize {
        self.count() * self.depth() * self.data_type.byte_size()
    }

    pub fn planes(&self) -> &[PlaneData] {
        &self.planes
    }

    pub fn plane(&self, index: usize) -> Option<&PlaneData> {
        self.planes.get(index)
    }

    pub fn plane_mut(&mut self, index: usize) -> Option<&mut PlaneData> {
        self.planes.get_mut(index)
    }

    /// Sample at `(x, y)` of `plane` as `f32`.
    ///
    /// # Panics
    /// Panics when the position or plane is out of range.
    pub fn get(&self, x: usize, y: usize, plane: usize) -> f32 {
        self.planes[plane].get(y * self.width + x)
    }

    /// Write the sample at `(x, y)` of `plane`.
    ///
    /// # Panics
    /// Panics when the position or plane is out of range.
    pub fn set(&mut self, x: usize, y: usize, plane: usize, value: f32) {
        let index = y * self.width + x;
        self.planes[plane].set(index, value);
    }

    /// Set every sample of every plane to `value`.
    pub fn fill(&mut self, value: f32) {
        self.planes.iter_mut().for_each(|p| p.fill(value));
    }

    /// Color map of Binary and Map images.
    pub fn palette(&self) -> Option<&[[u8; 3]]> {
        self.palette.as_deref()
    }

    /// Replace the color map. Only Map images accept a custom palette.
    pub fn set_palette(&mut self, palette: Vec<[u8; 3]>) -> ProcessResult<()> {
        if self.color_space != ColorSpace::Map {
            return Err(ProcessError::ColorSpaceMismatch {
                expected: ColorSpace::Map,
                found: self.color_space,
            });
        }
        if palette.is_empty() || palette.len() > 256 {
            return Err(ProcessError::invalid_argument(
                "palette",
                format!("must have 1 to 256 entries, got {}", palette.len()),
            ));
        }
        self.palette = Some(palette);
        Ok(())
    }

    /// Borrow every plane as mutable rows, indexed `[y][plane]`.
    pub fn rows_mut(&mut self) -> Vec<Vec<RowMut<'_>>> {
        let width = self.width;
        let height = self.height;
        let mut rows: Vec<Vec<RowMut<'_>>> = (0..height)
            .map(|_| Vec::with_capacity(self.planes.len()))
            .collect();
        for plane in self.planes.iter_mut() {
            for (y, row) in plane.rows_mut(width).into_iter().enumerate() {
                rows[y].push(row);
            }
        }
        rows
    }
}

fn checked_count(width: usize, height: usize) -> ProcessResult<usize> {
    match width.checked_mul(height) {
        Some(count) if count > 0 => Ok(count),
        _ => Err(ProcessError::InvalidDimension { width, height }),
    }
}

fn check_color_data(color_space: ColorSpace, data_type: DataType) -> ProcessResult<()> {
    if color_space.requires_byte() && data_type != DataType::Byte {
        return Err(ProcessError::unsupported(
            data_type,
            format!("{} images must be byte", color_space),
        ));
    }
    Ok(())
}

fn default_palette(color_space: ColorSpace) -> Option<Vec<[u8; 3]>> {
    match color_space {
        ColorSpace::Binary => Some(vec![[0, 0, 0], [255, 255, 255]]),
        ColorSpace::Map => Some((0..=255u8).map(|i| [i, i, i]).collect()),
        _ => None,
    }
}
