//! Common types shared between backends

use bytemuck::{Pod, Zeroable};
use half::f16;

/// Pixel format of a render target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureFormat {
    Bgra8Unorm,
    Rgba8Unorm,
    Rgba16Float,
}

impl TextureFormat {
    pub fn bytes_per_pixel(&self) -> u32 {
        match self {
            TextureFormat::Bgra8Unorm | TextureFormat::Rgba8Unorm => 4,
            TextureFormat::Rgba16Float => 8,
        }
    }

    pub fn is_float(&self) -> bool {
        matches!(self, TextureFormat::Rgba16Float)
    }
}

/// Packed 8-bit color in BGRA memory order.
///
/// This is the layout `Bgra8Unorm` surfaces read back into, so a readback
/// buffer can be cast straight to `&[Color]`.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Pod, Zeroable)]
pub struct Color {
    pub b: u8,
    pub g: u8,
    pub r: u8,
    pub a: u8,
}

impl Color {
    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { b, g, r, a }
    }

    pub const fn opaque(r: u8, g: u8, b: u8) -> Self {
        Self::new(r, g, b, 255)
    }
}

/// Half-precision RGBA color, 8 bytes per pixel.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct Float16Color {
    pub r: f16,
    pub g: f16,
    pub b: f16,
    pub a: f16,
}

impl Float16Color {
    pub fn from_f32(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self {
            r: f16::from_f32(r),
            g: f16::from_f32(g),
            b: f16::from_f32(b),
            a: f16::from_f32(a),
        }
    }

    /// Single-channel value replicated into RGB with opaque alpha.
    pub fn splat(value: f32) -> Self {
        Self::from_f32(value, value, value, 1.0)
    }
}

/// Cube map face, in the array-layer order used by GPU cube textures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CubeFace {
    PosX,
    NegX,
    PosY,
    NegY,
    PosZ,
    NegZ,
}

impl CubeFace {
    pub const ALL: [CubeFace; 6] = [
        CubeFace::PosX,
        CubeFace::NegX,
        CubeFace::PosY,
        CubeFace::NegY,
        CubeFace::PosZ,
        CubeFace::NegZ,
    ];

    /// Array layer of this face inside a cube texture.
    pub fn layer(&self) -> u32 {
        match self {
            CubeFace::PosX => 0,
            CubeFace::NegX => 1,
            CubeFace::PosY => 2,
            CubeFace::NegY => 3,
            CubeFace::PosZ => 4,
            CubeFace::NegZ => 5,
        }
    }
}

/// How an 8-bit surface readback synchronizes with outstanding GPU work
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReadbackMode {
    /// Reads without flushing queued work first. Cheaper, but may fail
    /// transiently on some backends.
    #[default]
    Fast,
    /// Flushes all outstanding work before reading.
    Flushing,
}

/// Equirectangular (longitude-latitude) image generated from a cube target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LongLatImage {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
}
