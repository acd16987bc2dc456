//! Core backend abstraction traits
//!
//! These traits define the interface that the memory and wgpu backends implement.
//! Render targets are shared between the producer context (which owns the
//! capture components) and the render context (which reads them back), so
//! every target is `Send + Sync` and uses interior mutability.

use crate::backend::types::*;
use crate::scene::{SceneCaptureComponent2D, SceneCaptureComponentCube};
use thiserror::Error;

/// Backend error type
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    #[error("Failed to initialize backend: {0}")]
    InitializationFailed(String),
    #[error("Failed to create render target: {0}")]
    TargetCreationFailed(String),
    #[error("Surface readback failed: {0}")]
    ReadbackFailed(String),
    #[error("Unsupported texture format {0:?}")]
    UnsupportedFormat(TextureFormat),
    #[error("Pixel data size mismatch: expected {expected} bytes, got {actual}")]
    SizeMismatch { expected: usize, actual: usize },
    #[error("Device lost")]
    DeviceLost,
}

pub type BackendResult<T> = Result<T, BackendError>;

/// Off-screen 2D surface a planar capture component renders into
pub trait RenderTarget2D: Send + Sync {
    fn label(&self) -> &str;

    /// Size in pixels as `(width, height)`.
    fn size(&self) -> (u32, u32);

    fn format(&self) -> TextureFormat;

    /// Read the surface as packed 8-bit color, row-major, top to bottom.
    fn read_pixels(&self, mode: ReadbackMode) -> BackendResult<Vec<Color>>;

    /// Read the surface as half-precision color.
    fn read_float16_pixels(&self) -> BackendResult<Vec<Float16Color>>;

    /// Upload tightly packed pixel data in the target's native format.
    fn write_pixels(&self, data: &[u8]) -> BackendResult<()>;
}

/// Off-screen cube surface (six square faces) a cube capture component renders into
pub trait RenderTargetCube: Send + Sync {
    fn label(&self) -> &str;

    /// Edge length of one face in pixels.
    fn face_size(&self) -> u32;

    fn format(&self) -> TextureFormat;

    /// Read one face as tightly packed bytes in the target's native format.
    fn read_face(&self, face: CubeFace) -> BackendResult<Vec<u8>>;

    /// Upload one face as tightly packed bytes in the target's native format.
    fn write_face(&self, face: CubeFace, data: &[u8]) -> BackendResult<()>;

    /// Project the six faces onto a 2:1 longitude-latitude image in the
    /// target's native format.
    fn generate_long_lat_unwrap(&self) -> BackendResult<LongLatImage> {
        let mut faces = Vec::with_capacity(CubeFace::ALL.len());
        for face in CubeFace::ALL {
            faces.push(self.read_face(face)?);
        }
        crate::cube::project_long_lat(self.face_size(), self.format(), &faces)
    }
}

/// Draws the scene for a capture component into its render target.
///
/// Always invoked on the render context, in frame order.
pub trait SceneRenderer: Send {
    fn draw_planar(&mut self, frame: u64, component: &SceneCaptureComponent2D)
        -> BackendResult<()>;

    fn draw_cube(&mut self, frame: u64, component: &SceneCaptureComponentCube)
        -> BackendResult<()>;
}
