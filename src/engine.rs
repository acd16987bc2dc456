//! Main engine orchestrator
//!
//! Owns the producer and render contexts and runs the frame loop that the
//! capture pipeline hooks into.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::Mutex;

use crate::backend::SceneRenderer;
use crate::capture::CaptureSource;
use crate::context::{ContextHandle, ExecutionContext};
use crate::error::CaptureError;
use crate::scene::Scene;
use crate::viewport::GameViewport;
use crate::EngineConfig;

type SharedRenderer = Arc<Mutex<Box<dyn SceneRenderer>>>;

/// Thread stepping frames at a fixed interval.
struct FrameDriver {
    stop: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

impl FrameDriver {
    fn stop(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

/// State a frame tick needs, cloned into every tick task.
#[derive(Clone)]
struct FrameLoop {
    render: ContextHandle,
    viewport: GameViewport,
    scene: Arc<Scene>,
    renderer: SharedRenderer,
    frame: Arc<AtomicU64>,
}

impl FrameLoop {
    /// Enqueue one tick on the producer context. Returns the frame number.
    fn step(&self, producer: &ContextHandle) -> Result<u64, CaptureError> {
        let frame = self.frame.fetch_add(1, Ordering::AcqRel) + 1;
        let this = self.clone();
        producer.enqueue(Box::new(move || this.tick(frame)))?;
        Ok(frame)
    }

    /// Producer context. Submits the frame's capture draws to the render
    /// context, then signals end of draw.
    fn tick(&self, frame: u64) {
        if !self.viewport.is_world_rendering_disabled() {
            let pending = self.scene.take_pending_captures();
            if !pending.is_empty() {
                let renderer = self.renderer.clone();
                let draw = Box::new(move || draw_captures(&renderer, frame, pending));
                if let Err(err) = self.render.enqueue(draw) {
                    log::error!("Dropping draws of frame {}: {}", frame, err);
                }
            }
        }
        self.viewport.end_draw();
    }
}

/// Render context.
fn draw_captures(renderer: &SharedRenderer, frame: u64, sources: Vec<CaptureSource>) {
    let mut renderer = renderer.lock();
    for source in sources {
        let result = match &source {
            CaptureSource::Planar(component) => renderer.draw_planar(frame, component),
            CaptureSource::Cube(component) => renderer.draw_cube(frame, component),
        };
        if let Err(err) = result {
            log::warn!("Failed to draw '{}' in frame {}: {}", source.name(), frame, err);
        }
    }
}

/// Main engine struct
pub struct CaptureEngine {
    config: EngineConfig,
    frame_loop: FrameLoop,
    driver: Mutex<Option<FrameDriver>>,
    // Producer before render: ticks drained on shutdown may still enqueue draws.
    producer: ExecutionContext,
    render: ExecutionContext,
}

impl CaptureEngine {
    /// Spawn the contexts. Starts the frame loop if the config asks for one.
    pub fn new(config: EngineConfig, renderer: Box<dyn SceneRenderer>) -> Result<Self, CaptureError> {
        let producer = ExecutionContext::spawn(config.producer_name.clone())
            .map_err(|err| CaptureError::ContextClosed(format!("{} ({})", config.producer_name, err)))?;
        let render = ExecutionContext::spawn(config.render_name.clone())
            .map_err(|err| CaptureError::ContextClosed(format!("{} ({})", config.render_name, err)))?;

        let frame_loop = FrameLoop {
            render: render.handle(),
            viewport: GameViewport::new(),
            scene: Arc::new(Scene::new()),
            renderer: Arc::new(Mutex::new(renderer)),
            frame: Arc::new(AtomicU64::new(0)),
        };

        let engine = Self {
            config,
            frame_loop,
            driver: Mutex::new(None),
            producer,
            render,
        };

        if let Some(interval) = engine.config.frame_interval {
            engine.start_frame_loop(interval)?;
        }

        log::info!(
            "Capture engine started ({} / {})",
            engine.producer.name(),
            engine.render.name()
        );
        Ok(engine)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn producer(&self) -> ContextHandle {
        self.producer.handle()
    }

    pub fn render(&self) -> ContextHandle {
        self.render.handle()
    }

    pub fn viewport(&self) -> &GameViewport {
        &self.frame_loop.viewport
    }

    pub fn scene(&self) -> &Arc<Scene> {
        &self.frame_loop.scene
    }

    /// Number of the most recently scheduled frame.
    pub fn frame(&self) -> u64 {
        self.frame_loop.frame.load(Ordering::Acquire)
    }

    /// Schedule one frame without waiting for it.
    pub fn step(&self) -> Result<u64, CaptureError> {
        self.frame_loop.step(&self.producer.handle())
    }

    /// Schedule one frame and wait until its draws have been executed.
    pub fn step_and_wait(&self) -> Result<u64, CaptureError> {
        let frame = self.step()?;
        self.producer.handle().flush()?;
        self.render.handle().flush()?;
        Ok(frame)
    }

    /// Step frames from a background thread every `interval`.
    ///
    /// Replaces a running frame loop.
    pub fn start_frame_loop(&self, interval: Duration) -> Result<(), CaptureError> {
        self.stop_frame_loop();

        let stop = Arc::new(AtomicBool::new(false));
        let (frame_loop, producer, flag) =
            (self.frame_loop.clone(), self.producer.handle(), stop.clone());
        let join = thread::Builder::new()
            .name("frame-driver".to_string())
            .spawn(move || {
                while !flag.load(Ordering::Acquire) {
                    if frame_loop.step(&producer).is_err() {
                        break;
                    }
                    thread::sleep(interval);
                }
            })
            .map_err(|err| CaptureError::ContextClosed(format!("frame-driver ({})", err)))?;

        log::debug!("Frame loop started at {:?}", interval);
        *self.driver.lock() = Some(FrameDriver {
            stop,
            join: Some(join),
        });
        Ok(())
    }

    pub fn stop_frame_loop(&self) {
        if let Some(mut driver) = self.driver.lock().take() {
            driver.stop();
            log::debug!("Frame loop stopped");
        }
    }
}

impl Drop for CaptureEngine {
    fn drop(&mut self) {
        self.stop_frame_loop();
    }
}
