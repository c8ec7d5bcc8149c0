//! [`ImageCodec`] backed by the `image` crate.

use super::{check_format, ImageCodec, FORMATS};
use crate::core::error::{CodecError, ProcessResult};
use crate::core::image::{ImageDescriptor, PlaneData};
use crate::core::types::{ColorSpace, DataType, Sample};
use image::error::UnsupportedErrorKind;
use image::{DynamicImage, ImageBuffer, ImageError, ImageFormat};
use log::debug;
use std::path::Path;

/// Codec for the raster formats of the `image` crate.
///
/// Loads 8-bit, 16-bit and float gray and RGB files, with or without alpha,
/// into planar images. Saves Gray and RGB images of type Byte, UShort and
/// (RGB only) Float, plus Binary and Map images expanded through their
/// palette.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageIoCodec;

impl ImageIoCodec {
    pub fn new() -> Self {
        Self
    }
}

impl ImageCodec for ImageIoCodec {
    fn name(&self) -> &str {
        "image-io"
    }

    fn formats(&self) -> &[&'static str] {
        &FORMATS
    }

    fn load(&self, path: &Path) -> ProcessResult<ImageDescriptor> {
        let dynamic = image::open(path).map_err(codec_error)?;
        let width = dynamic.width() as usize;
        let height = dynamic.height() as usize;

        let (color_space, has_alpha, planes) = match dynamic {
            DynamicImage::ImageLuma8(b) => (ColorSpace::Gray, false, split(b.as_raw(), 1, PlaneData::Byte)),
            DynamicImage::ImageLumaA8(b) => (ColorSpace::Gray, true, split(b.as_raw(), 2, PlaneData::Byte)),
            DynamicImage::ImageRgb8(b) => (ColorSpace::Rgb, false, split(b.as_raw(), 3, PlaneData::Byte)),
            DynamicImage::ImageRgba8(b) => (ColorSpace::Rgb, true, split(b.as_raw(), 4, PlaneData::Byte)),
            DynamicImage::ImageLuma16(b) => (ColorSpace::Gray, false, split(b.as_raw(), 1, PlaneData::UShort)),
            DynamicImage::ImageLumaA16(b) => (ColorSpace::Gray, true, split(b.as_raw(), 2, PlaneData::UShort)),
            DynamicImage::ImageRgb16(b) => (ColorSpace::Rgb, false, split(b.as_raw(), 3, PlaneData::UShort)),
            DynamicImage::ImageRgba16(b) => (ColorSpace::Rgb, true, split(b.as_raw(), 4, PlaneData::UShort)),
            DynamicImage::ImageRgb32F(b) => (ColorSpace::Rgb, false, split(b.as_raw(), 3, PlaneData::Float)),
            DynamicImage::ImageRgba32F(b) => (ColorSpace::Rgb, true, split(b.as_raw(), 4, PlaneData::Float)),
            other => {
                let rgba = other.to_rgba8();
                (ColorSpace::Rgb, true, split(rgba.as_raw(), 4, PlaneData::Byte))
            }
        };

        let image = ImageDescriptor::from_planes(width, height, color_space, has_alpha, planes)?;
        debug!(
            "loaded {} ({}x{} {} {})",
            path.display(),
            width,
            height,
            image.color_space(),
            image.data_type()
        );
        Ok(image)
    }

    fn save(&self, image: &ImageDescriptor, path: &Path, format: &str) -> ProcessResult<()> {
        let format = image_format(check_format(format)?);
        let dynamic = to_dynamic(image)?;
        dynamic
            .save_with_format(path, format)
            .map_err(codec_error)?;
        debug!("saved {} as {:?}", path.display(), format);
        Ok(())
    }
}

fn image_format(name: &str) -> ImageFormat {
    match name {
        "JPEG" => ImageFormat::Jpeg,
        "BMP" => ImageFormat::Bmp,
        "TIFF" => ImageFormat::Tiff,
        "GIF" => ImageFormat::Gif,
        "WEBP" => ImageFormat::WebP,
        _ => ImageFormat::Png,
    }
}

/// De-interleave `channels`-wide pixels into one plane per channel.
fn split<T: Copy>(samples: &[T], channels: usize, wrap: fn(Vec<T>) -> PlaneData) -> Vec<PlaneData> {
    (0..channels)
        .map(|c| wrap(samples.iter().skip(c).step_by(channels).copied().collect()))
        .collect()
}

/// Interleave every plane into `T` samples.
fn interleave<T: Sample>(image: &ImageDescriptor) -> Vec<T> {
    let planes = image.planes();
    let mut samples = Vec::with_capacity(image.count() * planes.len());
    for i in 0..image.count() {
        samples.extend(planes.iter().map(|p| T::from_f32(p.get(i))));
    }
    samples
}

fn to_dynamic(image: &ImageDescriptor) -> Result<DynamicImage, CodecError> {
    let width = u32::try_from(image.width()).map_err(|_| CodecError::Data)?;
    let height = u32::try_from(image.height()).map_err(|_| CodecError::Data)?;
    let alpha = image.has_alpha();

    let dynamic = match (image.color_space(), image.data_type()) {
        (ColorSpace::Gray, DataType::Byte) if alpha => {
            ImageBuffer::from_raw(width, height, interleave::<u8>(image)).map(DynamicImage::ImageLumaA8)
        }
        (ColorSpace::Gray, DataType::Byte) => {
            ImageBuffer::from_raw(width, height, interleave::<u8>(image)).map(DynamicImage::ImageLuma8)
        }
        (ColorSpace::Rgb, DataType::Byte) if alpha => {
            ImageBuffer::from_raw(width, height, interleave::<u8>(image)).map(DynamicImage::ImageRgba8)
        }
        (ColorSpace::Rgb, DataType::Byte) => {
            ImageBuffer::from_raw(width, height, interleave::<u8>(image)).map(DynamicImage::ImageRgb8)
        }
        (ColorSpace::Gray, DataType::UShort) if alpha => {
            ImageBuffer::from_raw(width, height, interleave::<u16>(image)).map(DynamicImage::ImageLumaA16)
        }
        (ColorSpace::Gray, DataType::UShort) => {
            ImageBuffer::from_raw(width, height, interleave::<u16>(image)).map(DynamicImage::ImageLuma16)
        }
        (ColorSpace::Rgb, DataType::UShort) if alpha => {
            ImageBuffer::from_raw(width, height, interleave::<u16>(image)).map(DynamicImage::ImageRgba16)
        }
        (ColorSpace::Rgb, DataType::UShort) => {
            ImageBuffer::from_raw(width, height, interleave::<u16>(image)).map(DynamicImage::ImageRgb16)
        }
        (ColorSpace::Rgb, DataType::Float) if alpha => {
            ImageBuffer::from_raw(width, height, interleave::<f32>(image)).map(DynamicImage::ImageRgba32F)
        }
        (ColorSpace::Rgb, DataType::Float) => {
            ImageBuffer::from_raw(width, height, interleave::<f32>(image)).map(DynamicImage::ImageRgb32F)
        }
        (ColorSpace::Binary, _) | (ColorSpace::Map, _) => {
            let samples = expand_palette(image).ok_or(CodecError::Data)?;
            ImageBuffer::from_raw(width, height, samples).map(DynamicImage::ImageRgb8)
        }
        _ => None,
    };
    dynamic.ok_or(CodecError::Data)
}

/// RGB bytes of an indexed image, looked up through its palette.
fn expand_palette(image: &ImageDescriptor) -> Option<Vec<u8>> {
    let palette = image.palette()?;
    let indices = image.plane(0)?;
    let mut samples = Vec::with_capacity(image.count() * 3);
    for i in 0..image.count() {
        let index = (indices.get(i) as usize).min(palette.len() - 1);
        samples.extend_from_slice(&palette[index]);
    }
    Some(samples)
}

fn codec_error(error: ImageError) -> CodecError {
    match error {
        ImageError::IoError(e) => match e.kind() {
            std::io::ErrorKind::PermissionDenied => CodecError::Access,
            std::io::ErrorKind::OutOfMemory => CodecError::Memory,
            _ => CodecError::Open,
        },
        ImageError::Decoding(_) => CodecError::Format,
        ImageError::Unsupported(e) => match e.kind() {
            UnsupportedErrorKind::Format(_) => CodecError::Format,
            _ => CodecError::Data,
        },
        ImageError::Limits(_) => CodecError::Memory,
        ImageError::Encoding(_) | ImageError::Parameter(_) => CodecError::Data,
        #[allow(unreachable_patterns)]
        _ => CodecError::Data,
    }
}
