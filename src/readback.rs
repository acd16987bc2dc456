//! Surface readback into CPU-accessible pixel buffers.

use crate::backend::{BackendResult, Color, Float16Color, ReadbackMode, RenderTarget2D};
use crate::capture::PixelRepresentation;

/// Pixels copied out of a 2D render target
#[derive(Debug, Clone, PartialEq)]
pub enum RawReadback {
    Color(Vec<Color>),
    Float16(Vec<Float16Color>),
}

impl RawReadback {
    pub fn len(&self) -> usize {
        match self {
            RawReadback::Color(pixels) => pixels.len(),
            RawReadback::Float16(pixels) => pixels.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A readback together with the true size of the surface it came from
#[derive(Debug, Clone, PartialEq)]
pub struct SurfaceReadbackData {
    pub pixels: RawReadback,
    pub width: u32,
    pub height: u32,
}

/// Reads 2D render targets on the render context.
///
/// 8-bit reads go through the configured [`ReadbackMode`]. When the fast path
/// fails and `fallback_to_flushing` is set, the read is retried once through
/// the flushing path before the error is reported.
#[derive(Debug, Clone, Copy)]
pub struct SurfaceReadback {
    mode: ReadbackMode,
    fallback_to_flushing: bool,
}

impl SurfaceReadback {
    pub fn new(mode: ReadbackMode, fallback_to_flushing: bool) -> Self {
        Self {
            mode,
            fallback_to_flushing,
        }
    }

    pub fn mode(&self) -> ReadbackMode {
        self.mode
    }

    /// Same reader, but always flushing. Used by the synchronous capture path.
    pub fn flushing() -> Self {
        Self::new(ReadbackMode::Flushing, false)
    }

    pub fn read(
        &self,
        target: &dyn RenderTarget2D,
        representation: PixelRepresentation,
    ) -> BackendResult<SurfaceReadbackData> {
        let (width, height) = target.size();
        let pixels = match representation {
            PixelRepresentation::Uint8 => RawReadback::Color(self.read_colors(target)?),
            PixelRepresentation::Float => RawReadback::Float16(target.read_float16_pixels()?),
        };

        Ok(SurfaceReadbackData {
            pixels,
            width,
            height,
        })
    }

    fn read_colors(&self, target: &dyn RenderTarget2D) -> BackendResult<Vec<Color>> {
        match target.read_pixels(self.mode) {
            Ok(pixels) => Ok(pixels),
            Err(err) if self.mode == ReadbackMode::Fast && self.fallback_to_flushing => {
                log::warn!(
                    "Fast readback of '{}' failed ({}), retrying with flush",
                    target.label(),
                    err
                );
                target.read_pixels(ReadbackMode::Flushing)
            }
            Err(err) => Err(err),
        }
    }
}

impl Default for SurfaceReadback {
    fn default() -> Self {
        Self::new(ReadbackMode::Fast, true)
    }
}
