//! Scene capture components

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::backend::{RenderTarget2D, RenderTargetCube};

/// Renders a perspective view into a 2D render target
pub struct SceneCaptureComponent2D {
    name: String,
    target: Arc<dyn RenderTarget2D>,
    pending: AtomicBool,
    capture_every_frame: AtomicBool,
}

impl SceneCaptureComponent2D {
    pub fn new(name: &str, target: Arc<dyn RenderTarget2D>) -> Self {
        Self {
            name: name.to_string(),
            target,
            pending: AtomicBool::new(false),
            capture_every_frame: AtomicBool::new(false),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn target(&self) -> &Arc<dyn RenderTarget2D> {
        &self.target
    }

    /// Request a capture the next time the world is drawn.
    pub fn capture_scene_deferred(&self) {
        self.pending.store(true, Ordering::Release);
    }

    /// Draw this component on every rendered frame, requested or not.
    pub fn set_capture_every_frame(&self, enabled: bool) {
        self.capture_every_frame.store(enabled, Ordering::Release);
    }

    pub fn is_capture_pending(&self) -> bool {
        self.pending.load(Ordering::Acquire)
    }

    /// Consume the pending request. Returns whether this frame should draw it.
    pub(crate) fn take_pending(&self) -> bool {
        let requested = self.pending.swap(false, Ordering::AcqRel);
        requested || self.capture_every_frame.load(Ordering::Acquire)
    }
}

/// Renders a full 360 degree view into a cube render target
pub struct SceneCaptureComponentCube {
    name: String,
    target: Arc<dyn RenderTargetCube>,
    pending: AtomicBool,
}

impl SceneCaptureComponentCube {
    pub fn new(name: &str, target: Arc<dyn RenderTargetCube>) -> Self {
        Self {
            name: name.to_string(),
            target,
            pending: AtomicBool::new(false),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn target(&self) -> &Arc<dyn RenderTargetCube> {
        &self.target
    }

    /// Request a capture the next time the world is drawn.
    pub fn capture_scene_deferred(&self) {
        self.pending.store(true, Ordering::Release);
    }

    pub fn is_capture_pending(&self) -> bool {
        self.pending.load(Ordering::Acquire)
    }

    pub(crate) fn take_pending(&self) -> bool {
        self.pending.swap(false, Ordering::AcqRel)
    }
}
