use image::{imageops::FilterType, io::Reader as ImageReader, DynamicImage};
use ndarray::Array3;
use std::io::Cursor;
use std::path::Path;

use crate::error::{AppError, Result};

/// Side length of the square input every extractor consumes.
pub const INPUT_SIZE: u32 = 224;

/// Colour channels per pixel (RGB).
pub const CHANNELS: usize = 3;

/// An image resized to `INPUT_SIZE`×`INPUT_SIZE` RGB, laid out as
/// `(height, width, channel)`.
#[derive(Debug, Clone, PartialEq)]
pub struct PreprocessedImage {
    pixels: Array3<u8>,
}

impl PreprocessedImage {
    /// Builds the fixed-shape array from a decoded image
    pub fn from_dynamic(img: &DynamicImage) -> Result<Self> {
        let resized = img
            .resize_exact(INPUT_SIZE, INPUT_SIZE, FilterType::CatmullRom)
            .to_rgb8();

        let side = INPUT_SIZE as usize;
        let pixels = Array3::from_shape_vec((side, side, CHANNELS), resized.into_raw())
            .map_err(|e| AppError::Internal(format!("unexpected pixel buffer shape: {}", e)))?;

        Ok(Self { pixels })
    }

    /// Borrow the underlying `(224, 224, 3)` array
    pub fn pixels(&self) -> &Array3<u8> {
        &self.pixels
    }

    /// Channel values scaled to `[0, 1]` in CHW order, the layout
    /// convolutional backbones expect.
    pub fn to_chw_unit(&self) -> Vec<f32> {
        self.pixels
            .view()
            .permuted_axes([2, 0, 1])
            .iter()
            .map(|&v| v as f32 / 255.0)
            .collect()
    }
}

/// Decode raw upload bytes into the fixed-shape RGB array.
///
/// The format is sniffed from the bytes, not taken from the declared MIME type.
pub fn decode_image(bytes: &[u8]) -> Result<PreprocessedImage> {
    let img = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()?
        .decode()?;

    PreprocessedImage::from_dynamic(&img)
}

/// Decode an image staged on disk
pub fn decode_file<P: AsRef<Path>>(path: P) -> Result<PreprocessedImage> {
    let path = path.as_ref();
    log::debug!("Decoding staged image: {}", path.display());

    let img = ImageReader::open(path)?.with_guessed_format()?.decode()?;
    PreprocessedImage::from_dynamic(&img)
}
