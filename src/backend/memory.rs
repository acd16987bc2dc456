//! CPU-resident render targets and a deterministic scene renderer.
//!
//! Used for headless runs and tests. Memory targets behave like GPU surfaces:
//! they are written by the renderer on the render context and read back by
//! the capture pipeline, and the fast 8-bit readback path can be told to fail
//! transiently to exercise recovery.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use half::f16;
use parking_lot::RwLock;

use crate::backend::traits::*;
use crate::backend::types::*;
use crate::scene::{SceneCaptureComponent2D, SceneCaptureComponentCube};

fn unorm_to_f16(value: u8) -> f16 {
    f16::from_f32(value as f32 / 255.0)
}

fn f16_to_unorm(value: f16) -> u8 {
    (value.to_f32().clamp(0.0, 1.0) * 255.0).round() as u8
}

/// Decode tightly packed native pixels into BGRA colors.
pub(crate) fn decode_colors(format: TextureFormat, bytes: &[u8]) -> Vec<Color> {
    match format {
        TextureFormat::Bgra8Unorm => bytemuck::pod_collect_to_vec(bytes),
        TextureFormat::Rgba8Unorm => bytes
            .chunks_exact(4)
            .map(|p| Color::new(p[0], p[1], p[2], p[3]))
            .collect(),
        TextureFormat::Rgba16Float => {
            let pixels: Vec<Float16Color> = bytemuck::pod_collect_to_vec(bytes);
            pixels
                .iter()
                .map(|p| Color::new(f16_to_unorm(p.r), f16_to_unorm(p.g), f16_to_unorm(p.b), f16_to_unorm(p.a)))
                .collect()
        }
    }
}

/// Decode tightly packed native pixels into half-precision colors.
pub(crate) fn decode_float16(format: TextureFormat, bytes: &[u8]) -> Vec<Float16Color> {
    match format {
        TextureFormat::Rgba16Float => bytemuck::pod_collect_to_vec(bytes),
        TextureFormat::Bgra8Unorm | TextureFormat::Rgba8Unorm => decode_colors(format, bytes)
            .iter()
            .map(|c| Float16Color {
                r: unorm_to_f16(c.r),
                g: unorm_to_f16(c.g),
                b: unorm_to_f16(c.b),
                a: unorm_to_f16(c.a),
            })
            .collect(),
    }
}

/// Encode a color into the native byte layout of `format`.
pub(crate) fn encode_color(format: TextureFormat, color: Color, out: &mut Vec<u8>) {
    match format {
        TextureFormat::Bgra8Unorm => out.extend_from_slice(bytemuck::bytes_of(&color)),
        TextureFormat::Rgba8Unorm => out.extend_from_slice(&[color.r, color.g, color.b, color.a]),
        TextureFormat::Rgba16Float => {
            let half = Float16Color {
                r: unorm_to_f16(color.r),
                g: unorm_to_f16(color.g),
                b: unorm_to_f16(color.b),
                a: unorm_to_f16(color.a),
            };
            out.extend_from_slice(bytemuck::bytes_of(&half));
        }
    }
}

fn check_len(expected: usize, data: &[u8]) -> BackendResult<()> {
    if data.len() != expected {
        return Err(BackendError::SizeMismatch {
            expected,
            actual: data.len(),
        });
    }
    Ok(())
}

/// 2D render target held in system memory
pub struct MemoryRenderTarget2D {
    label: String,
    width: u32,
    height: u32,
    format: TextureFormat,
    pixels: RwLock<Vec<u8>>,
    failing_fast_reads: AtomicU32,
}

impl MemoryRenderTarget2D {
    /// Create a zero-initialized target.
    pub fn new(label: &str, width: u32, height: u32, format: TextureFormat) -> Self {
        let len = width as usize * height as usize * format.bytes_per_pixel() as usize;
        Self {
            label: label.to_string(),
            width,
            height,
            format,
            pixels: RwLock::new(vec![0; len]),
            failing_fast_reads: AtomicU32::new(0),
        }
    }

    /// Make the next `count` fast-path 8-bit readbacks fail.
    pub fn fail_next_fast_reads(&self, count: u32) {
        self.failing_fast_reads.store(count, Ordering::Release);
    }

    fn take_fast_read_failure(&self) -> bool {
        self.failing_fast_reads
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .is_ok()
    }
}

impl RenderTarget2D for MemoryRenderTarget2D {
    fn label(&self) -> &str {
        &self.label
    }

    fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn format(&self) -> TextureFormat {
        self.format
    }

    fn read_pixels(&self, mode: ReadbackMode) -> BackendResult<Vec<Color>> {
        if mode == ReadbackMode::Fast && self.take_fast_read_failure() {
            return Err(BackendError::ReadbackFailed(format!(
                "{}: fast readback returned no data",
                self.label
            )));
        }
        Ok(decode_colors(self.format, &self.pixels.read()))
    }

    fn read_float16_pixels(&self) -> BackendResult<Vec<Float16Color>> {
        Ok(decode_float16(self.format, &self.pixels.read()))
    }

    fn write_pixels(&self, data: &[u8]) -> BackendResult<()> {
        let mut pixels = self.pixels.write();
        check_len(pixels.len(), data)?;
        pixels.copy_from_slice(data);
        Ok(())
    }
}

/// Cube render target held in system memory
pub struct MemoryRenderTargetCube {
    label: String,
    face_size: u32,
    format: TextureFormat,
    faces: RwLock<Vec<Vec<u8>>>,
    fail_next_unwrap: AtomicBool,
}

impl MemoryRenderTargetCube {
    /// Create a zero-initialized cube target.
    pub fn new(label: &str, face_size: u32, format: TextureFormat) -> Self {
        let len = face_size as usize * face_size as usize * format.bytes_per_pixel() as usize;
        Self {
            label: label.to_string(),
            face_size,
            format,
            faces: RwLock::new(vec![vec![0; len]; CubeFace::ALL.len()]),
            fail_next_unwrap: AtomicBool::new(false),
        }
    }

    /// Make the next long-lat generation fail.
    pub fn fail_next_unwrap(&self) {
        self.fail_next_unwrap.store(true, Ordering::Release);
    }
}

impl RenderTargetCube for MemoryRenderTargetCube {
    fn label(&self) -> &str {
        &self.label
    }

    fn face_size(&self) -> u32 {
        self.face_size
    }

    fn format(&self) -> TextureFormat {
        self.format
    }

    fn read_face(&self, face: CubeFace) -> BackendResult<Vec<u8>> {
        Ok(self.faces.read()[face.layer() as usize].clone())
    }

    fn write_face(&self, face: CubeFace, data: &[u8]) -> BackendResult<()> {
        let mut faces = self.faces.write();
        let slot = &mut faces[face.layer() as usize];
        check_len(slot.len(), data)?;
        slot.copy_from_slice(data);
        Ok(())
    }

    fn generate_long_lat_unwrap(&self) -> BackendResult<LongLatImage> {
        if self.fail_next_unwrap.swap(false, Ordering::AcqRel) {
            return Err(BackendError::ReadbackFailed(format!(
                "{}: cube faces unavailable",
                self.label
            )));
        }
        let faces = self.faces.read();
        crate::cube::project_long_lat(self.face_size, self.format, &faces)
    }
}

/// Renders deterministic frames so captures can be checked pixel by pixel.
///
/// - Planar 8-bit: `r = x`, `g = y`, `b = frame` (all wrapping), opaque.
/// - Planar float: depth `1 + x + y` in every channel.
/// - Cube 8-bit: one solid color per face.
/// - Cube float: depth in centimeters, `100 * (layer + 1)`.
#[derive(Debug, Default)]
pub struct TestPatternRenderer {
    frames_drawn: u64,
}

impl TestPatternRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of capture draws performed so far.
    pub fn frames_drawn(&self) -> u64 {
        self.frames_drawn
    }

    pub fn planar_color(frame: u64, x: u32, y: u32) -> Color {
        Color::opaque(x as u8, y as u8, frame as u8)
    }

    pub fn planar_depth(x: u32, y: u32) -> f32 {
        1.0 + x as f32 + y as f32
    }

    pub fn cube_face_color(face: CubeFace) -> Color {
        match face {
            CubeFace::PosX => Color::opaque(255, 0, 0),
            CubeFace::NegX => Color::opaque(0, 255, 255),
            CubeFace::PosY => Color::opaque(0, 255, 0),
            CubeFace::NegY => Color::opaque(255, 0, 255),
            CubeFace::PosZ => Color::opaque(0, 0, 255),
            CubeFace::NegZ => Color::opaque(255, 255, 0),
        }
    }

    pub fn cube_depth_cm(face: CubeFace) -> f32 {
        100.0 * (face.layer() + 1) as f32
    }
}

impl SceneRenderer for TestPatternRenderer {
    fn draw_planar(
        &mut self,
        frame: u64,
        component: &SceneCaptureComponent2D,
    ) -> BackendResult<()> {
        let target = component.target();
        let (width, height) = target.size();
        let format = target.format();
        let mut data =
            Vec::with_capacity((width * height * format.bytes_per_pixel()) as usize);

        for y in 0..height {
            for x in 0..width {
                if format.is_float() {
                    let pixel = Float16Color::splat(Self::planar_depth(x, y));
                    data.extend_from_slice(bytemuck::bytes_of(&pixel));
                } else {
                    encode_color(format, Self::planar_color(frame, x, y), &mut data);
                }
            }
        }

        target.write_pixels(&data)?;
        self.frames_drawn += 1;
        Ok(())
    }

    fn draw_cube(&mut self, _frame: u64, component: &SceneCaptureComponentCube) -> BackendResult<()> {
        let target = component.target();
        let size = target.face_size();
        let format = target.format();
        let pixel_count = (size * size) as usize;

        for face in CubeFace::ALL {
            let mut data = Vec::with_capacity(pixel_count * format.bytes_per_pixel() as usize);
            if format.is_float() {
                let pixel = Float16Color::splat(Self::cube_depth_cm(face));
                for _ in 0..pixel_count {
                    data.extend_from_slice(bytemuck::bytes_of(&pixel));
                }
            } else {
                for _ in 0..pixel_count {
                    encode_color(format, Self::cube_face_color(face), &mut data);
                }
            }
            target.write_face(face, &data)?;
        }

        self.frames_drawn += 1;
        Ok(())
    }
}
