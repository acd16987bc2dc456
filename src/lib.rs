//! Scene Capture - synchronous frame capture from a live renderer
//!
//! A caller thread asks for "a picture now" from one or more capture
//! components; the request is carried through a producer context (scene
//! mutation, draw submission) and a render context (surface readback) and
//! handed back as typed, timestamped pixel buffers.
//!
//! # Features
//! - Planar captures as BGR bytes, float samples or PNG
//! - 360 degree cube captures unwrapped to a 2:1 longitude-latitude image
//! - Batches of mixed requests resolved in a single frame
//! - In-memory backend for tests and an optional wgpu backend
//!
//! # Example
//!
//! ```ignore
//! let engine = CaptureEngine::new(EngineConfig::default(), Box::new(TestPatternRenderer::new()))?;
//! let target = Arc::new(MemoryRenderTarget2D::new("front", 640, 480, TextureFormat::Bgra8Unorm));
//! let camera = engine.scene().add_planar(Arc::new(SceneCaptureComponent2D::new("front", target)));
//! engine.start_frame_loop(Duration::from_millis(16))?;
//!
//! let coordinator = CaptureCoordinator::new(&engine, Arc::new(|| {}));
//! let request = CaptureRequestParams::planar(camera, PixelRepresentation::Uint8, false);
//! let results = coordinator.capture(vec![request], false)?;
//! ```

use std::time::Duration;

pub mod backend;
pub mod capture;
pub mod clock;
pub mod context;
pub mod convert;
pub mod cube;
pub mod engine;
pub mod error;
pub mod readback;
pub mod scene;
pub mod signal;
pub mod viewport;

pub use backend::{ReadbackMode, TextureFormat};
pub use capture::{
    CaptureCoordinator, CaptureRequestParams, CaptureResult, CaptureStats, CaptureStatus,
    ImagePayload, ImageType, PixelRepresentation, PoseCallback,
};
pub use engine::CaptureEngine;
pub use error::CaptureError;
pub use scene::{Scene, SceneCaptureComponent2D, SceneCaptureComponentCube};

/// Configuration for the execution contexts of a [`CaptureEngine`]
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Name of the producer (game) context thread
    pub producer_name: String,
    /// Name of the render context thread
    pub render_name: String,
    /// Automatic frame interval; `None` means frames are stepped manually
    pub frame_interval: Option<Duration>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            producer_name: "producer".to_string(),
            render_name: "render".to_string(),
            frame_interval: None,
        }
    }
}

impl EngineConfig {
    pub fn with_context_names(mut self, producer: &str, render: &str) -> Self {
        self.producer_name = producer.to_string();
        self.render_name = render.to_string();
        self
    }

    pub fn with_frame_interval(mut self, interval: Duration) -> Self {
        self.frame_interval = Some(interval);
        self
    }
}

/// Configuration for a [`CaptureCoordinator`]
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// How long the caller blocks before logging and waiting again
    pub wait_slice: Duration,
    /// Give up with [`CaptureError::Timeout`] after this many slices.
    /// `None` waits for as long as it takes.
    pub max_wait_slices: Option<u32>,
    /// Readback path for 8-bit planar surfaces
    pub readback_mode: ReadbackMode,
    /// Retry a failed fast readback once through the flushing path
    pub fallback_to_flushing_readback: bool,
    /// PNG compression effort, 0..=100
    pub png_compression: u8,
    /// Unit scale applied to unwrapped cube float samples
    pub cube_float_scale: f32,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            wait_slice: Duration::from_secs(5),
            max_wait_slices: None,
            readback_mode: ReadbackMode::Fast,
            fallback_to_flushing_readback: true,
            png_compression: 100,
            cube_float_scale: convert::CENTIMETERS_TO_METERS,
        }
    }
}

impl CaptureConfig {
    pub fn with_wait_slice(mut self, wait_slice: Duration) -> Self {
        self.wait_slice = wait_slice;
        self
    }

    pub fn with_max_wait_slices(mut self, slices: u32) -> Self {
        self.max_wait_slices = Some(slices);
        self
    }

    pub fn with_readback_mode(mut self, mode: ReadbackMode) -> Self {
        self.readback_mode = mode;
        self
    }

    pub fn with_fallback_to_flushing_readback(mut self, enabled: bool) -> Self {
        self.fallback_to_flushing_readback = enabled;
        self
    }

    pub fn with_png_compression(mut self, compression: u8) -> Self {
        self.png_compression = compression.min(100);
        self
    }

    pub fn with_cube_float_scale(mut self, scale: f32) -> Self {
        self.cube_float_scale = scale;
        self
    }
}
