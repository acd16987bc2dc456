//! Common utilities for capture integration tests.
//!
//! Builds an engine on the memory backend with one planar camera per pixel
//! representation and one cube camera per cube image type.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use scene_capture::backend::memory::{
    MemoryRenderTarget2D, MemoryRenderTargetCube, TestPatternRenderer,
};
use scene_capture::backend::{
    BackendResult, CubeFace, LongLatImage, RenderTargetCube, TextureFormat,
};
use scene_capture::{
    CaptureConfig, CaptureCoordinator, CaptureEngine, CaptureRequestParams, EngineConfig,
    PixelRepresentation, SceneCaptureComponent2D, SceneCaptureComponentCube,
};

pub const WIDTH: u32 = 8;
pub const HEIGHT: u32 = 4;
pub const FACE_SIZE: u32 = 4;

/// Short slice so stalled batches show up quickly in tests.
pub const TEST_WAIT_SLICE: Duration = Duration::from_millis(20);

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Engine, coordinator and cameras wired together.
pub struct TestRig {
    pub engine: CaptureEngine,
    pub coordinator: Arc<CaptureCoordinator>,
    pub poses: Arc<AtomicUsize>,

    pub color_target: Arc<MemoryRenderTarget2D>,
    pub color: Arc<SceneCaptureComponent2D>,
    pub depth_target: Arc<MemoryRenderTarget2D>,
    pub depth: Arc<SceneCaptureComponent2D>,
    pub cube_target: Arc<MemoryRenderTargetCube>,
    pub cube: Arc<SceneCaptureComponentCube>,
    pub cube_depth_target: Arc<MemoryRenderTargetCube>,
    pub cube_depth: Arc<SceneCaptureComponentCube>,
}

impl TestRig {
    /// Rig with frames stepped manually.
    pub fn new(config: CaptureConfig) -> Self {
        Self::with_pose_callback(config, |_| {})
    }

    /// Rig whose pose callback also runs `extra` with the call count so far.
    pub fn with_pose_callback(
        config: CaptureConfig,
        extra: impl Fn(usize) + Send + Sync + 'static,
    ) -> Self {
        init_logging();

        let engine =
            CaptureEngine::new(EngineConfig::default(), Box::new(TestPatternRenderer::new()))
                .expect("engine");
        let scene = engine.scene().clone();

        let color_target = Arc::new(MemoryRenderTarget2D::new(
            "color",
            WIDTH,
            HEIGHT,
            TextureFormat::Bgra8Unorm,
        ));
        let color = scene.add_planar(Arc::new(SceneCaptureComponent2D::new(
            "color",
            color_target.clone(),
        )));

        let depth_target = Arc::new(MemoryRenderTarget2D::new(
            "depth",
            WIDTH,
            HEIGHT,
            TextureFormat::Rgba16Float,
        ));
        let depth = scene.add_planar(Arc::new(SceneCaptureComponent2D::new(
            "depth",
            depth_target.clone(),
        )));

        let cube_target = Arc::new(MemoryRenderTargetCube::new(
            "cube",
            FACE_SIZE,
            TextureFormat::Bgra8Unorm,
        ));
        let cube = scene.add_cube(Arc::new(SceneCaptureComponentCube::new(
            "cube",
            cube_target.clone(),
        )));

        let cube_depth_target = Arc::new(MemoryRenderTargetCube::new(
            "cube_depth",
            FACE_SIZE,
            TextureFormat::Rgba16Float,
        ));
        let cube_depth = scene.add_cube(Arc::new(SceneCaptureComponentCube::new(
            "cube_depth",
            cube_depth_target.clone(),
        )));

        let poses = Arc::new(AtomicUsize::new(0));
        let counter = poses.clone();
        let coordinator = CaptureCoordinator::new(
            &engine,
            Arc::new(move || {
                let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                extra(n);
            }),
        )
        .with_config(config);

        Self {
            engine,
            coordinator: Arc::new(coordinator),
            poses,
            color_target,
            color,
            depth_target,
            depth,
            cube_target,
            cube,
            cube_depth_target,
            cube_depth,
        }
    }

    /// Rig with a free-running frame loop.
    pub fn running(config: CaptureConfig) -> Self {
        let rig = Self::new(config);
        rig.engine
            .start_frame_loop(Duration::from_millis(2))
            .expect("frame loop");
        rig
    }

    pub fn color_request(&self, compress: bool) -> CaptureRequestParams {
        CaptureRequestParams::planar(self.color.clone(), PixelRepresentation::Uint8, compress)
    }

    pub fn depth_request(&self) -> CaptureRequestParams {
        CaptureRequestParams::planar(self.depth.clone(), PixelRepresentation::Float, false)
    }

    pub fn cube_request(&self, compress: bool) -> CaptureRequestParams {
        CaptureRequestParams::cube(self.cube.clone(), PixelRepresentation::Uint8, compress)
    }

    pub fn cube_depth_request(&self) -> CaptureRequestParams {
        CaptureRequestParams::cube(self.cube_depth.clone(), PixelRepresentation::Float, false)
    }
}

pub fn test_config() -> CaptureConfig {
    CaptureConfig::default().with_wait_slice(TEST_WAIT_SLICE)
}

/// Cube target whose unwrap disagrees with its reported face size.
pub struct MisreportingCube {
    pub inner: MemoryRenderTargetCube,
}

impl MisreportingCube {
    pub fn new(face_size: u32) -> Self {
        Self {
            inner: MemoryRenderTargetCube::new("liar", face_size, TextureFormat::Bgra8Unorm),
        }
    }
}

impl RenderTargetCube for MisreportingCube {
    fn label(&self) -> &str {
        self.inner.label()
    }

    fn face_size(&self) -> u32 {
        self.inner.face_size()
    }

    fn format(&self) -> TextureFormat {
        self.inner.format()
    }

    fn read_face(&self, face: CubeFace) -> BackendResult<Vec<u8>> {
        self.inner.read_face(face)
    }

    fn write_face(&self, face: CubeFace, data: &[u8]) -> BackendResult<()> {
        self.inner.write_face(face, data)
    }

    fn generate_long_lat_unwrap(&self) -> BackendResult<LongLatImage> {
        let mut image = self.inner.generate_long_lat_unwrap()?;
        image.height += 1;
        Ok(image)
    }
}
