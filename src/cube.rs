//! Equirectangular unwrap of cube render targets.
//!
//! The unwrapped image is `2 * face_size` wide and `face_size` tall. Column 0
//! starts at longitude -pi, row 0 is the north pole (+Y).

use std::f32::consts::{FRAC_PI_2, PI};

use glam::Vec3;

use crate::backend::{BackendError, BackendResult, CubeFace, LongLatImage, RenderTargetCube};

/// Pick the cube face hit by `dir` and the texel coordinate on that face.
///
/// Face orientation follows the usual GPU cube map convention, so `u`/`v`
/// are in `[0, 1]` with `v` growing downwards.
fn face_uv(dir: Vec3) -> (CubeFace, f32, f32) {
    let abs = dir.abs();
    let (face, ma, sc, tc) = if abs.x >= abs.y && abs.x >= abs.z {
        if dir.x > 0.0 {
            (CubeFace::PosX, abs.x, -dir.z, -dir.y)
        } else {
            (CubeFace::NegX, abs.x, dir.z, -dir.y)
        }
    } else if abs.y >= abs.z {
        if dir.y > 0.0 {
            (CubeFace::PosY, abs.y, dir.x, dir.z)
        } else {
            (CubeFace::NegY, abs.y, dir.x, -dir.z)
        }
    } else if dir.z > 0.0 {
        (CubeFace::PosZ, abs.z, dir.x, -dir.y)
    } else {
        (CubeFace::NegZ, abs.z, -dir.x, -dir.y)
    };

    (face, 0.5 * (sc / ma + 1.0), 0.5 * (tc / ma + 1.0))
}

/// Direction for the center of unwrapped pixel `(x, y)`.
fn long_lat_direction(x: u32, y: u32, width: u32, height: u32) -> Vec3 {
    let lon = (x as f32 + 0.5) / width as f32 * 2.0 * PI - PI;
    let lat = FRAC_PI_2 - (y as f32 + 0.5) / height as f32 * PI;
    Vec3::new(lat.cos() * lon.cos(), lat.sin(), lat.cos() * lon.sin())
}

/// Project six tightly packed faces onto a longitude-latitude image.
///
/// `faces` is indexed by [`CubeFace::layer`]. Sampling is nearest-texel and
/// the output keeps the faces' native pixel format.
pub fn project_long_lat(
    face_size: u32,
    format: crate::backend::TextureFormat,
    faces: &[Vec<u8>],
) -> BackendResult<LongLatImage> {
    if face_size == 0 {
        return Err(BackendError::ReadbackFailed("cube face size is zero".into()));
    }
    let bpp = format.bytes_per_pixel() as usize;
    let face_len = face_size as usize * face_size as usize * bpp;
    if faces.len() != CubeFace::ALL.len() {
        return Err(BackendError::ReadbackFailed(format!(
            "expected 6 cube faces, got {}",
            faces.len()
        )));
    }
    if let Some(bad) = faces.iter().find(|f| f.len() != face_len) {
        return Err(BackendError::SizeMismatch {
            expected: face_len,
            actual: bad.len(),
        });
    }

    let width = face_size * 2;
    let height = face_size;
    let mut data = Vec::with_capacity(width as usize * height as usize * bpp);
    let last = face_size - 1;

    for y in 0..height {
        for x in 0..width {
            let (face, u, v) = face_uv(long_lat_direction(x, y, width, height));
            let tx = ((u * face_size as f32) as u32).min(last) as usize;
            let ty = ((v * face_size as f32) as u32).min(last) as usize;
            let offset = (ty * face_size as usize + tx) * bpp;
            data.extend_from_slice(&faces[face.layer() as usize][offset..offset + bpp]);
        }
    }

    Ok(LongLatImage {
        data,
        width,
        height,
        format,
    })
}

/// Unwrap a cube target into raw equirectangular bytes.
///
/// A failed long-lat generation is logged and returned as an error; the
/// caller leaves that result empty for the frame.
///
/// # Panics
///
/// Panics if the generated image is not `2 * face_size` by `face_size` or its
/// format differs from the target's. Either means the backend and the target
/// disagree about the cube's geometry, and continuing would hand out
/// silently wrong images.
pub fn unwrap_cube(target: &dyn RenderTargetCube) -> BackendResult<LongLatImage> {
    let image = match target.generate_long_lat_unwrap() {
        Ok(image) => image,
        Err(err) => {
            log::warn!("Long-lat unwrap of cube target '{}' failed: {}", target.label(), err);
            return Err(err);
        }
    };

    let face_size = target.face_size();
    assert_eq!(
        face_size, image.height,
        "cube '{}': face size = {}, unwrapped height = {}",
        target.label(), face_size, image.height
    );
    assert_eq!(
        face_size * 2,
        image.width,
        "cube '{}': face size = {}, unwrapped width = {}",
        target.label(),
        face_size,
        image.width
    );
    assert_eq!(
        target.format(),
        image.format,
        "cube '{}': target format = {:?}, unwrapped format = {:?}",
        target.label(),
        target.format(),
        image.format
    );

    Ok(image)
}
