//! Compression of captured 8-bit images.

use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::{ColorType, ImageEncoder as _};
use thiserror::Error;

/// Encoding error type
#[derive(Error, Debug)]
pub enum EncodeError {
    #[error("Pixel buffer of {actual} bytes is not a {width}x{height} BGRA8 image ({expected} bytes)")]
    IncompatibleSource {
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },
    #[error("Image encoding failed: {0}")]
    Image(#[from] image::ImageError),
}

/// Turns BGRA8 pixels into a compressed image blob.
pub trait CompressionEncoder: Send + Sync {
    /// `quality` is in `0..=100`; higher trades speed for smaller output.
    fn encode_bgra8(
        &self,
        pixels: &[u8],
        width: u32,
        height: u32,
        quality: u8,
    ) -> Result<Vec<u8>, EncodeError>;
}

/// PNG encoder on top of the `image` crate
#[derive(Debug, Clone, Copy, Default)]
pub struct PngCompressor;

impl PngCompressor {
    fn compression_type(quality: u8) -> CompressionType {
        match quality {
            0..=33 => CompressionType::Fast,
            34..=66 => CompressionType::Default,
            _ => CompressionType::Best,
        }
    }
}

impl CompressionEncoder for PngCompressor {
    fn encode_bgra8(
        &self,
        pixels: &[u8],
        width: u32,
        height: u32,
        quality: u8,
    ) -> Result<Vec<u8>, EncodeError> {
        let expected = width as usize * height as usize * 4;
        if pixels.len() != expected || expected == 0 {
            return Err(EncodeError::IncompatibleSource {
                width,
                height,
                expected,
                actual: pixels.len(),
            });
        }

        let mut rgba = Vec::with_capacity(expected);
        for bgra in pixels.chunks_exact(4) {
            rgba.extend_from_slice(&[bgra[2], bgra[1], bgra[0], bgra[3]]);
        }

        let mut out = Vec::new();
        PngEncoder::new_with_quality(&mut out, Self::compression_type(quality), FilterType::Adaptive)
            .write_image(&rgba, width, height, ColorType::Rgba8)?;
        Ok(out)
    }
}
