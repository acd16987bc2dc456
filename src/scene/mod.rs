//! Scene management
//!
//! The scene only tracks what the capture pipeline needs: the capture
//! components that render views into off-screen targets. It is mutated on the
//! producer context.

mod component;

pub use component::*;

use std::sync::Arc;

use parking_lot::RwLock;

use crate::capture::CaptureSource;

/// The scene containing all capture components
pub struct Scene {
    sources: RwLock<Vec<CaptureSource>>,
}

impl Scene {
    pub fn new() -> Self {
        Self {
            sources: RwLock::new(Vec::new()),
        }
    }

    /// Add a planar capture component to the scene
    pub fn add_planar(&self, component: Arc<SceneCaptureComponent2D>) -> Arc<SceneCaptureComponent2D> {
        self.sources
            .write()
            .push(CaptureSource::Planar(component.clone()));
        component
    }

    /// Add a cube capture component to the scene
    pub fn add_cube(&self, component: Arc<SceneCaptureComponentCube>) -> Arc<SceneCaptureComponentCube> {
        self.sources.write().push(CaptureSource::Cube(component.clone()));
        component
    }

    /// Find a registered component by name
    pub fn find(&self, name: &str) -> Option<CaptureSource> {
        self.sources.read().iter().find(|s| s.name() == name).cloned()
    }

    pub fn len(&self) -> usize {
        self.sources.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.read().is_empty()
    }

    /// Collect every component that must be drawn this frame, clearing their
    /// pending requests.
    pub(crate) fn take_pending_captures(&self) -> Vec<CaptureSource> {
        self.sources
            .read()
            .iter()
            .filter(|source| match source {
                CaptureSource::Planar(c) => c.take_pending(),
                CaptureSource::Cube(c) => c.take_pending(),
            })
            .cloned()
            .collect()
    }
}

impl Default for Scene {
    fn default() -> Self {
        Self::new()
    }
}
