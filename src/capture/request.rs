//! Capture request parameters and results.

use std::sync::Arc;

use crate::backend::LongLatImage;
use crate::readback::RawReadback;
use crate::scene::{SceneCaptureComponent2D, SceneCaptureComponentCube};

/// Camera image kinds a capture rig can be asked for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageType {
    Scene,
    DepthPlanar,
    DepthPerspective,
    DepthVis,
    DisparityNormalized,
    Segmentation,
    SurfaceNormals,
    Infrared,
    CubeScene,
    CubeDepth,
}

impl ImageType {
    pub fn is_cube(&self) -> bool {
        matches!(self, ImageType::CubeScene | ImageType::CubeDepth)
    }

    /// Index among the cube image types, `None` for planar types.
    pub fn cube_index(&self) -> Option<usize> {
        match self {
            ImageType::CubeScene => Some(0),
            ImageType::CubeDepth => Some(1),
            _ => None,
        }
    }

    /// Whether this kind is naturally delivered as float samples.
    pub fn is_depth_like(&self) -> bool {
        matches!(
            self,
            ImageType::DepthPlanar
                | ImageType::DepthPerspective
                | ImageType::DisparityNormalized
                | ImageType::CubeDepth
        )
    }
}

/// Pixel representation requested by the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PixelRepresentation {
    #[default]
    Uint8,
    Float,
}

/// Scene object a request captures from. Planar and cube sources are
/// mutually exclusive; each owns its component and, through it, its target.
#[derive(Clone)]
pub enum CaptureSource {
    Planar(Arc<SceneCaptureComponent2D>),
    Cube(Arc<SceneCaptureComponentCube>),
}

impl CaptureSource {
    pub fn is_cube(&self) -> bool {
        matches!(self, CaptureSource::Cube(_))
    }

    pub fn name(&self) -> &str {
        match self {
            CaptureSource::Planar(component) => component.name(),
            CaptureSource::Cube(component) => component.name(),
        }
    }
}

impl std::fmt::Debug for CaptureSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CaptureSource::Planar(c) => f.debug_tuple("Planar").field(&c.name()).finish(),
            CaptureSource::Cube(c) => f.debug_tuple("Cube").field(&c.name()).finish(),
        }
    }
}

/// One camera's capture request within a batch
#[derive(Debug, Clone)]
pub struct CaptureRequestParams {
    source: CaptureSource,
    representation: PixelRepresentation,
    compress: bool,
}

impl CaptureRequestParams {
    pub fn planar(
        component: Arc<SceneCaptureComponent2D>,
        representation: PixelRepresentation,
        compress: bool,
    ) -> Self {
        Self {
            source: CaptureSource::Planar(component),
            representation,
            compress,
        }
    }

    pub fn cube(
        component: Arc<SceneCaptureComponentCube>,
        representation: PixelRepresentation,
        compress: bool,
    ) -> Self {
        Self {
            source: CaptureSource::Cube(component),
            representation,
            compress,
        }
    }

    pub fn source(&self) -> &CaptureSource {
        &self.source
    }

    pub fn representation(&self) -> PixelRepresentation {
        self.representation
    }

    pub fn compress(&self) -> bool {
        self.compress
    }

    pub fn is_cube(&self) -> bool {
        self.source.is_cube()
    }
}

/// Outcome of one entry in a batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CaptureStatus {
    /// Not finalized yet, or the batch was abandoned.
    #[default]
    Pending,
    Captured,
    ReadbackFailed,
    UnwrapFailed,
    EncodeFailed,
    /// Requested representation does not fit the target's pixel format.
    FormatMismatch,
}

/// Delivered image bytes. At most one representation is ever populated.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum ImagePayload {
    #[default]
    Empty,
    /// Packed 8-bit pixels: BGR triplets for planar sources, the raw
    /// unwrapped BGRA bytes for cube sources.
    Uint8(Vec<u8>),
    /// One float sample per pixel.
    Float(Vec<f32>),
    /// Compressed (PNG) image.
    Compressed(Vec<u8>),
}

impl ImagePayload {
    pub fn is_empty(&self) -> bool {
        match self {
            ImagePayload::Empty => true,
            ImagePayload::Uint8(data) | ImagePayload::Compressed(data) => data.is_empty(),
            ImagePayload::Float(data) => data.is_empty(),
        }
    }

    pub fn as_uint8(&self) -> Option<&[u8]> {
        match self {
            ImagePayload::Uint8(data) => Some(data),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<&[f32]> {
        match self {
            ImagePayload::Float(data) => Some(data),
            _ => None,
        }
    }

    pub fn as_compressed(&self) -> Option<&[u8]> {
        match self {
            ImagePayload::Compressed(data) => Some(data),
            _ => None,
        }
    }
}

/// Captured image for one request
#[derive(Debug, Clone, Default)]
pub struct CaptureResult {
    pub width: u32,
    pub height: u32,
    /// Monotonic clock, nanoseconds.
    pub time_stamp: u64,
    pub status: CaptureStatus,
    pub payload: ImagePayload,

    /// Planar readback awaiting conversion.
    pub(crate) raw: Option<RawReadback>,
    /// Unwrapped cube bytes awaiting conversion.
    pub(crate) cube_raw: Option<LongLatImage>,
}

impl CaptureResult {
    pub fn is_captured(&self) -> bool {
        self.status == CaptureStatus::Captured
    }

    /// Mark the entry as failed unless an earlier stage already did.
    pub(crate) fn fail(&mut self, status: CaptureStatus) {
        if matches!(self.status, CaptureStatus::Pending | CaptureStatus::Captured) {
            self.status = status;
        }
    }
}
