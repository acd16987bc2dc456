//! Capture demo
//!
//! Registers a scene camera, a depth camera and a 360 degree camera, runs a
//! number of capture batches against a free-running frame loop and writes
//! every delivered image to disk.
//!
//! ```bash
//! capture_demo --batches 3 --output captures
//! capture_demo --backend wgpu --compress --width 320 --height 240
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;

use scene_capture::backend::memory::{MemoryRenderTarget2D, MemoryRenderTargetCube, TestPatternRenderer};
use scene_capture::backend::{RenderTarget2D, RenderTargetCube};
use scene_capture::{
    CaptureConfig, CaptureCoordinator, CaptureEngine, CaptureRequestParams, EngineConfig,
    ImagePayload, ImageType, PixelRepresentation, SceneCaptureComponent2D,
    SceneCaptureComponentCube, TextureFormat,
};

/// Render target backend for CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
enum CliBackend {
    /// System memory targets.
    #[default]
    Memory,
    /// GPU textures through wgpu (headless).
    #[cfg(feature = "wgpu-backend")]
    Wgpu,
}

#[derive(Parser, Debug)]
#[command(name = "capture_demo", about = "Synchronous scene capture demo")]
struct Args {
    /// Render target backend.
    #[arg(long, default_value = "memory", value_enum)]
    backend: CliBackend,

    /// Planar capture width in pixels.
    #[arg(long, default_value = "64")]
    width: u32,

    /// Planar capture height in pixels.
    #[arg(long, default_value = "48")]
    height: u32,

    /// Cube face edge length in pixels.
    #[arg(long, default_value = "32")]
    face_size: u32,

    /// Number of capture batches to run.
    #[arg(long, default_value = "2")]
    batches: u32,

    /// Frame loop interval in milliseconds.
    #[arg(long, default_value = "16")]
    frame_interval_ms: u64,

    /// Deliver 8-bit images as PNG.
    #[arg(long)]
    compress: bool,

    /// Directory the captures are written to.
    #[arg(long, default_value = "captures")]
    output: PathBuf,
}

struct Targets {
    scene: Arc<dyn RenderTarget2D>,
    depth: Arc<dyn RenderTarget2D>,
    cube_scene: Arc<dyn RenderTargetCube>,
    cube_depth: Arc<dyn RenderTargetCube>,
}

fn memory_targets(args: &Args) -> Targets {
    Targets {
        scene: Arc::new(MemoryRenderTarget2D::new(
            "scene",
            args.width,
            args.height,
            TextureFormat::Bgra8Unorm,
        )),
        depth: Arc::new(MemoryRenderTarget2D::new(
            "depth",
            args.width,
            args.height,
            TextureFormat::Rgba16Float,
        )),
        cube_scene: Arc::new(MemoryRenderTargetCube::new(
            "cube_scene",
            args.face_size,
            TextureFormat::Bgra8Unorm,
        )),
        cube_depth: Arc::new(MemoryRenderTargetCube::new(
            "cube_depth",
            args.face_size,
            TextureFormat::Rgba16Float,
        )),
    }
}

#[cfg(feature = "wgpu-backend")]
fn wgpu_targets(args: &Args) -> Result<Targets, Box<dyn std::error::Error>> {
    use scene_capture::backend::wgpu_backend::{WgpuContext, WgpuRenderTarget2D, WgpuRenderTargetCube};

    let context = WgpuContext::new_headless()?;
    Ok(Targets {
        scene: Arc::new(WgpuRenderTarget2D::new(
            context.clone(),
            "scene",
            args.width,
            args.height,
            TextureFormat::Bgra8Unorm,
        )?),
        depth: Arc::new(WgpuRenderTarget2D::new(
            context.clone(),
            "depth",
            args.width,
            args.height,
            TextureFormat::Rgba16Float,
        )?),
        cube_scene: Arc::new(WgpuRenderTargetCube::new(
            context.clone(),
            "cube_scene",
            args.face_size,
            TextureFormat::Bgra8Unorm,
        )?),
        cube_depth: Arc::new(WgpuRenderTargetCube::new(
            context,
            "cube_depth",
            args.face_size,
            TextureFormat::Rgba16Float,
        )?),
    })
}

fn build_targets(args: &Args) -> Result<Targets, Box<dyn std::error::Error>> {
    match args.backend {
        CliBackend::Memory => Ok(memory_targets(args)),
        #[cfg(feature = "wgpu-backend")]
        CliBackend::Wgpu => wgpu_targets(args),
    }
}

fn request(
    image_type: ImageType,
    planar: &[(ImageType, Arc<SceneCaptureComponent2D>)],
    cubes: &[(ImageType, Arc<SceneCaptureComponentCube>)],
    compress: bool,
) -> Option<CaptureRequestParams> {
    let representation = if image_type.is_depth_like() {
        PixelRepresentation::Float
    } else {
        PixelRepresentation::Uint8
    };
    if image_type.is_cube() {
        let (_, component) = cubes.iter().find(|(kind, _)| *kind == image_type)?;
        Some(CaptureRequestParams::cube(component.clone(), representation, compress))
    } else {
        let (_, component) = planar.iter().find(|(kind, _)| *kind == image_type)?;
        Some(CaptureRequestParams::planar(component.clone(), representation, compress))
    }
}

fn write_payload(
    dir: &Path,
    batch: u32,
    image_type: ImageType,
    width: u32,
    height: u32,
    payload: &ImagePayload,
) -> std::io::Result<Option<PathBuf>> {
    let stem = format!("{:03}_{:?}_{}x{}", batch, image_type, width, height);
    let (path, bytes): (PathBuf, &[u8]) = match payload {
        ImagePayload::Empty => return Ok(None),
        ImagePayload::Compressed(png) => (dir.join(format!("{}.png", stem)), png),
        ImagePayload::Uint8(data) => (dir.join(format!("{}.u8", stem)), data),
        ImagePayload::Float(data) => (dir.join(format!("{}.f32", stem)), bytemuck::cast_slice(data)),
    };
    fs::write(&path, bytes)?;
    Ok(Some(path))
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let targets = build_targets(&args)?;

    let engine = CaptureEngine::new(
        EngineConfig::default().with_frame_interval(Duration::from_millis(args.frame_interval_ms)),
        Box::new(TestPatternRenderer::new()),
    )?;

    let scene = engine.scene();
    let planar = vec![
        (
            ImageType::Scene,
            scene.add_planar(Arc::new(SceneCaptureComponent2D::new("scene", targets.scene))),
        ),
        (
            ImageType::DepthPlanar,
            scene.add_planar(Arc::new(SceneCaptureComponent2D::new("depth", targets.depth))),
        ),
    ];
    let cubes = vec![
        (
            ImageType::CubeScene,
            scene.add_cube(Arc::new(SceneCaptureComponentCube::new("cube_scene", targets.cube_scene))),
        ),
        (
            ImageType::CubeDepth,
            scene.add_cube(Arc::new(SceneCaptureComponentCube::new("cube_depth", targets.cube_depth))),
        ),
    ];

    let poses = Arc::new(AtomicU64::new(0));
    let pose_counter = poses.clone();
    let coordinator = CaptureCoordinator::new(
        &engine,
        Arc::new(move || {
            pose_counter.fetch_add(1, Ordering::Relaxed);
        }),
    )
    .with_config(CaptureConfig::default().with_wait_slice(Duration::from_secs(1)));

    fs::create_dir_all(&args.output)?;

    let kinds = [
        ImageType::Scene,
        ImageType::DepthPlanar,
        ImageType::CubeScene,
        ImageType::CubeDepth,
    ];
    for batch in 0..args.batches {
        let requests: Vec<_> = kinds
            .iter()
            .filter_map(|kind| request(*kind, &planar, &cubes, args.compress))
            .collect();
        let results = coordinator.capture(requests, false)?;

        for (kind, result) in kinds.iter().zip(&results) {
            match write_payload(&args.output, batch, *kind, result.width, result.height, &result.payload)? {
                Some(path) => log::info!("{:?}: {:?} -> {}", kind, result.status, path.display()),
                None => log::warn!("{:?}: {:?}, nothing written", kind, result.status),
            }
        }
    }

    let stats = coordinator.stats();
    log::info!(
        "Done: {} batches, {} poses sampled, {} wait timeouts, {} failed entries",
        stats.batches,
        poses.load(Ordering::Relaxed),
        stats.wait_timeouts,
        stats.failed_entries
    );
    Ok(())
}
