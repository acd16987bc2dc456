//! Conversion of raw readbacks into the representation the caller asked for.
//!
//! | source | representation | compress | payload                                  |
//! |--------|----------------|----------|------------------------------------------|
//! | planar | uint8          | no       | BGR triplets, alpha dropped              |
//! | planar | uint8          | yes      | PNG                                      |
//! | planar | float          | -        | red channel as f32                       |
//! | cube   | uint8          | no       | unwrapped BGRA bytes, verbatim           |
//! | cube   | uint8          | yes      | PNG of the unwrapped image               |
//! | cube   | float          | -        | red channel as f32, scaled (cm -> m)     |
//!
//! A cube representation that does not match the target format fails the
//! entry with [`CaptureStatus::FormatMismatch`].

pub mod encode;

use std::sync::Arc;

use half::f16;

use crate::backend::{Color, Float16Color};
use crate::capture::{
    CaptureRequestParams, CaptureResult, CaptureStatus, ImagePayload, PixelRepresentation,
};
use crate::readback::RawReadback;
use encode::{CompressionEncoder, PngCompressor};

/// Centimeters to meters.
pub const CENTIMETERS_TO_METERS: f32 = 0.01;

/// Pack BGRA pixels into tight `[b, g, r]` triplets, row-major, top to bottom.
///
/// The triplet order is the reverse of the pixels' logical RGB order.
pub fn pack_bgr(pixels: &[Color]) -> Vec<u8> {
    let mut out = Vec::with_capacity(pixels.len() * 3);
    for pixel in pixels {
        out.extend_from_slice(&[pixel.b, pixel.g, pixel.r]);
    }
    out
}

/// Expand the red channel of half-precision pixels to `f32`.
pub fn float16_red_channel(pixels: &[Float16Color]) -> Vec<f32> {
    pixels.iter().map(|p| p.r.to_f32()).collect()
}

/// Read raw unwrapped half-float cube bytes as `f32` samples.
///
/// Each pixel is four little-endian halves (8 bytes); only the first half of
/// every pixel is kept, multiplied by `scale`. `raw.len() / 8` samples are
/// produced.
pub fn cube_half_to_float(raw: &[u8], scale: f32) -> Vec<f32> {
    raw.chunks_exact(8)
        .map(|pixel| f16::from_le_bytes([pixel[0], pixel[1]]).to_f32() * scale)
        .collect()
}

/// Converts finalized capture results into their delivered payloads
#[derive(Clone)]
pub struct FormatConverter {
    encoder: Arc<dyn CompressionEncoder>,
    quality: u8,
    cube_float_scale: f32,
}

impl FormatConverter {
    pub fn new(encoder: Arc<dyn CompressionEncoder>, quality: u8, cube_float_scale: f32) -> Self {
        Self {
            encoder,
            quality,
            cube_float_scale,
        }
    }

    /// Populate `result.payload` from its raw readback.
    ///
    /// Entries that did not reach [`CaptureStatus::Captured`] keep an empty
    /// payload. The intermediate buffers are released either way.
    pub fn convert(&self, params: &CaptureRequestParams, result: &mut CaptureResult) {
        let raw = result.raw.take();
        let cube_raw = result.cube_raw.take();
        if result.status != CaptureStatus::Captured {
            return;
        }

        let payload = if params.is_cube() {
            let Some(image) = cube_raw else {
                result.fail(CaptureStatus::UnwrapFailed);
                return;
            };
            let wants_float = params.representation() == PixelRepresentation::Float;
            if image.format.is_float() != wants_float {
                log::warn!(
                    "Cube capture asked for {:?} pixels from a {:?} target",
                    params.representation(),
                    image.format
                );
                result.fail(CaptureStatus::FormatMismatch);
                return;
            }
            match params.representation() {
                PixelRepresentation::Float => {
                    ImagePayload::Float(cube_half_to_float(&image.data, self.cube_float_scale))
                }
                PixelRepresentation::Uint8 if params.compress() => {
                    match self.encode(&image.data, image.width, image.height) {
                        Some(png) => ImagePayload::Compressed(png),
                        None => {
                            result.fail(CaptureStatus::EncodeFailed);
                            return;
                        }
                    }
                }
                PixelRepresentation::Uint8 => ImagePayload::Uint8(image.data),
            }
        } else {
            match (params.representation(), raw) {
                (PixelRepresentation::Uint8, Some(RawReadback::Color(pixels))) => {
                    if result.width == 0 || result.height == 0 {
                        return;
                    }
                    if params.compress() {
                        let bytes: &[u8] = bytemuck::cast_slice(&pixels);
                        match self.encode(bytes, result.width, result.height) {
                            Some(png) => ImagePayload::Compressed(png),
                            None => {
                                result.fail(CaptureStatus::EncodeFailed);
                                return;
                            }
                        }
                    } else {
                        ImagePayload::Uint8(pack_bgr(&pixels))
                    }
                }
                (PixelRepresentation::Float, Some(RawReadback::Float16(pixels))) => {
                    ImagePayload::Float(float16_red_channel(&pixels))
                }
                _ => {
                    result.fail(CaptureStatus::ReadbackFailed);
                    return;
                }
            }
        };

        result.payload = payload;
    }

    fn encode(&self, bgra: &[u8], width: u32, height: u32) -> Option<Vec<u8>> {
        match self.encoder.encode_bgra8(bgra, width, height, self.quality) {
            Ok(bytes) => Some(bytes),
            Err(err) => {
                log::warn!("Failed to compress {}x{} capture: {}", width, height, err);
                None
            }
        }
    }
}

impl Default for FormatConverter {
    fn default() -> Self {
        Self::new(Arc::new(PngCompressor), 100, CENTIMETERS_TO_METERS)
    }
}
