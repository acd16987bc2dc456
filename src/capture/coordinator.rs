//! Cross-context capture protocol.
//!
//! A deferred batch travels caller -> producer -> render -> caller:
//!
//! 1. The caller publishes an `Arc<Batch>` and enqueues a [`CaptureTask`] on
//!    the producer context, then blocks on the batch's completion signal.
//! 2. On the producer, the task forces world rendering on, requests a
//!    deferred capture from every source, unwraps cube sources and parks
//!    itself as an end-of-draw hook on the viewport.
//! 3. When the frame's draws are submitted the hook samples the pose,
//!    restores the viewport flag and enqueues `finalize` on the render
//!    context, behind the draws it has to read.
//! 4. `finalize` reads back planar targets, stamps every entry and signals.
//! 5. The caller converts every entry into its payload.
//!
//! Cube entries are unwrapped in step 2, before the frame that draws the
//! newly requested capture, so they carry the faces of the previous capture.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::clock::{Clock, SteadyClock};
use crate::context::{panic_message, ContextHandle};
use crate::convert::encode::{CompressionEncoder, PngCompressor};
use crate::convert::FormatConverter;
use crate::cube::unwrap_cube;
use crate::engine::CaptureEngine;
use crate::error::CaptureError;
use crate::readback::SurfaceReadback;
use crate::signal::CompletionSignal;
use crate::viewport::{GameViewport, WorldRenderingScope};
use crate::CaptureConfig;

use super::request::{CaptureRequestParams, CaptureResult, CaptureSource, CaptureStatus};

/// Samples the camera pose for the frame being captured.
///
/// Invoked once per deferred batch, on the producer context, right after the
/// frame's draw commands have been emitted.
pub type PoseCallback = Arc<dyn Fn() + Send + Sync>;

/// Counters describing a coordinator's history.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CaptureStats {
    /// Batches handed back to the caller.
    pub batches: u64,
    /// Wait slices that elapsed without the batch completing.
    pub wait_timeouts: u64,
    /// Entries delivered with a status other than `Captured`.
    pub failed_entries: u64,
}

#[derive(Default)]
struct StatCounters {
    batches: AtomicU64,
    wait_timeouts: AtomicU64,
    failed_entries: AtomicU64,
}

/// Requests and results of one `capture` call, jointly owned by the caller
/// and the contexts working on it.
struct Batch {
    params: Vec<CaptureRequestParams>,
    results: Mutex<Vec<CaptureResult>>,
    signal: CompletionSignal,
}

impl Batch {
    fn new(params: Vec<CaptureRequestParams>) -> Self {
        let results = vec![CaptureResult::default(); params.len()];
        Self {
            params,
            results: Mutex::new(results),
            signal: CompletionSignal::new(),
        }
    }
}

/// Single-shot unit of work carrying a batch through the producer and
/// render contexts. Each stage consumes the task.
struct CaptureTask {
    batch: Arc<Batch>,
    render: ContextHandle,
    viewport: GameViewport,
    pose_callback: PoseCallback,
    readback: SurfaceReadback,
    clock: Arc<dyn Clock>,
}

impl CaptureTask {
    /// Producer context.
    fn schedule(self) {
        let scope = self.viewport.force_world_rendering();

        {
            let mut results = self.batch.results.lock();
            for (params, result) in self.batch.params.iter().zip(results.iter_mut()) {
                match params.source() {
                    CaptureSource::Planar(component) => component.capture_scene_deferred(),
                    CaptureSource::Cube(component) => {
                        component.capture_scene_deferred();
                        match unwrap_cube(component.target().as_ref()) {
                            Ok(image) => result.cube_raw = Some(image),
                            Err(_) => result.fail(CaptureStatus::UnwrapFailed),
                        }
                    }
                }
            }
        }

        let viewport = self.viewport.clone();
        viewport.on_end_draw_once(move || self.on_end_draw(scope));
    }

    /// Producer context, after the frame's draws were submitted.
    fn on_end_draw(self, scope: WorldRenderingScope) {
        let callback = self.pose_callback.clone();
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| callback())) {
            log::error!(
                "Pose callback panicked during capture: {}",
                panic_message(payload.as_ref())
            );
        }
        drop(scope);

        let render = self.render.clone();
        let batch = self.batch.clone();
        if let Err(err) = render.enqueue(Box::new(move || self.finalize())) {
            log::error!("Cannot finalize capture batch: {}", err);
            batch.signal.signal();
        }
    }

    /// Render context.
    fn finalize(self) {
        let mut results = self.batch.results.lock();
        for (params, result) in self.batch.params.iter().zip(results.iter_mut()) {
            match params.source() {
                CaptureSource::Cube(component) => {
                    let face_size = component.target().face_size();
                    result.width = face_size * 2;
                    result.height = face_size;
                }
                CaptureSource::Planar(component) => {
                    let target = component.target();
                    match self.readback.read(target.as_ref(), params.representation()) {
                        Ok(data) => {
                            result.width = data.width;
                            result.height = data.height;
                            result.raw = Some(data.pixels);
                        }
                        Err(err) => {
                            log::warn!("Readback of '{}' failed: {}", target.label(), err);
                            (result.width, result.height) = target.size();
                            result.fail(CaptureStatus::ReadbackFailed);
                        }
                    }
                }
            }
            result.time_stamp = self.clock.now_nanos();
            if result.status == CaptureStatus::Pending {
                result.status = CaptureStatus::Captured;
            }
        }
        drop(results);

        log::debug!("Finalized capture batch of {} entries", self.batch.params.len());
        self.batch.signal.signal();
    }
}

/// Issues capture batches against a [`CaptureEngine`].
///
/// One batch may be in flight per coordinator; use one coordinator per
/// camera rig.
pub struct CaptureCoordinator {
    producer: ContextHandle,
    render: ContextHandle,
    viewport: GameViewport,
    pose_callback: PoseCallback,
    config: CaptureConfig,
    encoder: Arc<dyn CompressionEncoder>,
    converter: FormatConverter,
    clock: Arc<dyn Clock>,
    current: Mutex<Option<Arc<Batch>>>,
    stats: Arc<StatCounters>,
}

impl CaptureCoordinator {
    pub fn new(engine: &CaptureEngine, pose_callback: PoseCallback) -> Self {
        let config = CaptureConfig::default();
        let encoder: Arc<dyn CompressionEncoder> = Arc::new(PngCompressor);
        let converter = FormatConverter::new(
            encoder.clone(),
            config.png_compression,
            config.cube_float_scale,
        );
        Self {
            producer: engine.producer(),
            render: engine.render(),
            viewport: engine.viewport().clone(),
            pose_callback,
            config,
            encoder,
            converter,
            clock: Arc::new(SteadyClock::new()),
            current: Mutex::new(None),
            stats: Arc::new(StatCounters::default()),
        }
    }

    pub fn with_config(mut self, config: CaptureConfig) -> Self {
        self.config = config;
        self.rebuild_converter();
        self
    }

    pub fn with_encoder(mut self, encoder: Arc<dyn CompressionEncoder>) -> Self {
        self.encoder = encoder;
        self.rebuild_converter();
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    fn rebuild_converter(&mut self) {
        self.converter = FormatConverter::new(
            self.encoder.clone(),
            self.config.png_compression,
            self.config.cube_float_scale,
        );
    }

    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }

    pub fn stats(&self) -> CaptureStats {
        CaptureStats {
            batches: self.stats.batches.load(Ordering::Relaxed),
            wait_timeouts: self.stats.wait_timeouts.load(Ordering::Relaxed),
            failed_entries: self.stats.failed_entries.load(Ordering::Relaxed),
        }
    }

    /// Whether a deferred batch is still being worked on.
    pub fn is_in_flight(&self) -> bool {
        self.current
            .lock()
            .as_ref()
            .is_some_and(|batch| !batch.signal.is_signaled())
    }

    /// Capture a batch and block until every entry is populated.
    ///
    /// With `use_safe_method` the surfaces are read inline on the calling
    /// thread; this is meant for callers already on the render context and
    /// is rejected on the producer context. Otherwise the batch is deferred
    /// through the producer and render contexts, which must both be
    /// different from the calling thread.
    ///
    /// The returned results are in request order. Entries that could not be
    /// captured carry an empty payload and a failure status.
    pub fn capture(
        &self,
        params: Vec<CaptureRequestParams>,
        use_safe_method: bool,
    ) -> Result<Vec<CaptureResult>, CaptureError> {
        if self.producer.is_current() {
            return Err(CaptureError::ForbiddenContext(self.producer.name().to_string()));
        }

        let mut results = if use_safe_method {
            self.capture_inline(&params)
        } else {
            if self.render.is_current() {
                return Err(CaptureError::ForbiddenContext(self.render.name().to_string()));
            }
            self.capture_deferred(params.clone())?
        };

        for (params, result) in params.iter().zip(results.iter_mut()) {
            self.converter.convert(params, result);
        }

        let failed = results.iter().filter(|r| !r.is_captured()).count() as u64;
        self.stats.failed_entries.fetch_add(failed, Ordering::Relaxed);
        self.stats.batches.fetch_add(1, Ordering::Relaxed);
        Ok(results)
    }

    fn capture_deferred(
        &self,
        params: Vec<CaptureRequestParams>,
    ) -> Result<Vec<CaptureResult>, CaptureError> {
        if params.is_empty() {
            return Ok(Vec::new());
        }

        let batch = {
            let mut current = self.current.lock();
            if current.as_ref().is_some_and(|b| !b.signal.is_signaled()) {
                return Err(CaptureError::BatchInFlight);
            }
            let batch = Arc::new(Batch::new(params));
            *current = Some(batch.clone());
            batch
        };

        let task = CaptureTask {
            batch: batch.clone(),
            render: self.render.clone(),
            viewport: self.viewport.clone(),
            pose_callback: self.pose_callback.clone(),
            readback: SurfaceReadback::new(
                self.config.readback_mode,
                self.config.fallback_to_flushing_readback,
            ),
            clock: self.clock.clone(),
        };
        if let Err(err) = self.producer.enqueue(Box::new(move || task.schedule())) {
            self.current.lock().take();
            return Err(err);
        }

        let mut slices = 0u32;
        while !batch.signal.wait_for(self.config.wait_slice) {
            slices += 1;
            self.stats.wait_timeouts.fetch_add(1, Ordering::Relaxed);
            log::warn!(
                "Capture batch of {} entries not finished after {:?}, still waiting",
                batch.params.len(),
                self.config.wait_slice * slices
            );
            if self.config.max_wait_slices.is_some_and(|max| slices >= max) {
                return Err(CaptureError::Timeout { slices });
            }
        }

        self.current.lock().take();
        let results = std::mem::take(&mut *batch.results.lock());
        Ok(results)
    }

    /// Reads every surface on the calling thread, flushing.
    ///
    /// Cube sources are unwrapped from their current faces; no new capture
    /// is requested.
    fn capture_inline(&self, params: &[CaptureRequestParams]) -> Vec<CaptureResult> {
        let readback = SurfaceReadback::flushing();
        params
            .iter()
            .map(|params| {
                let mut result = CaptureResult::default();
                match params.source() {
                    CaptureSource::Cube(component) => {
                        log::debug!("Unwrapping cube '{}' inline", component.name());
                        let target = component.target();
                        match unwrap_cube(target.as_ref()) {
                            Ok(image) => result.cube_raw = Some(image),
                            Err(_) => result.fail(CaptureStatus::UnwrapFailed),
                        }
                        result.width = target.face_size() * 2;
                        result.height = target.face_size();
                    }
                    CaptureSource::Planar(component) => {
                        let target = component.target();
                        match readback.read(target.as_ref(), params.representation()) {
                            Ok(data) => {
                                result.width = data.width;
                                result.height = data.height;
                                result.raw = Some(data.pixels);
                            }
                            Err(err) => {
                                log::warn!("Readback of '{}' failed: {}", target.label(), err);
                                (result.width, result.height) = target.size();
                                result.fail(CaptureStatus::ReadbackFailed);
                            }
                        }
                    }
                }
                result.time_stamp = self.clock.now_nanos();
                if result.status == CaptureStatus::Pending {
                    result.status = CaptureStatus::Captured;
                }
                result
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::memory::{MemoryRenderTarget2D, TestPatternRenderer};
    use crate::backend::TextureFormat;
    use crate::capture::PixelRepresentation;
    use crate::scene::SceneCaptureComponent2D;
    use crate::EngineConfig;

    fn engine_with_camera() -> (CaptureEngine, Arc<SceneCaptureComponent2D>) {
        let engine =
            CaptureEngine::new(EngineConfig::default(), Box::new(TestPatternRenderer::new()))
                .unwrap();
        let target = Arc::new(MemoryRenderTarget2D::new("rt", 4, 2, TextureFormat::Bgra8Unorm));
        let camera = engine
            .scene()
            .add_planar(Arc::new(SceneCaptureComponent2D::new("front", target)));
        (engine, camera)
    }

    #[test]
    fn empty_batch_returns_immediately() {
        let (engine, _) = engine_with_camera();
        let coordinator = CaptureCoordinator::new(&engine, Arc::new(|| {}));

        let results = coordinator.capture(Vec::new(), false).unwrap();
        assert!(results.is_empty());
        assert_eq!(coordinator.stats().batches, 1);
    }

    #[test]
    fn capture_from_producer_context_is_rejected() {
        let (engine, camera) = engine_with_camera();
        let coordinator = Arc::new(CaptureCoordinator::new(&engine, Arc::new(|| {})));
        let (tx, rx) = std::sync::mpsc::channel();

        let inner = coordinator.clone();
        engine
            .producer()
            .enqueue(Box::new(move || {
                let params =
                    CaptureRequestParams::planar(camera, PixelRepresentation::Uint8, false);
                let _ = tx.send(inner.capture(vec![params], true).map(|_| ()));
            }))
            .unwrap();

        let err = rx.recv().unwrap().unwrap_err();
        assert!(matches!(err, CaptureError::ForbiddenContext(name) if name == "producer"));
    }

    #[test]
    fn config_builder_keeps_encoder() {
        let (engine, _) = engine_with_camera();
        let coordinator = CaptureCoordinator::new(&engine, Arc::new(|| {}))
            .with_config(CaptureConfig::default().with_png_compression(10));
        assert_eq!(coordinator.config().png_compression, 10);
        assert!(!coordinator.is_in_flight());
    }
}
