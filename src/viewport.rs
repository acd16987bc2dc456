//! Game viewport state shared between the capture coordinator and the
//! frame loop.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

type EndDrawHook = Box<dyn FnOnce() + Send + 'static>;

struct ViewportState {
    disable_world_rendering: AtomicBool,
    /// Live `WorldRenderingScope`s. World rendering is on while non-zero.
    force_count: AtomicUsize,
    end_draw_hooks: Mutex<Vec<EndDrawHook>>,
}

/// Handle to the game viewport.
///
/// Carries the "disable world rendering" flag and the end-of-draw
/// notification hooks. Cloning yields another handle to the same viewport.
#[derive(Clone)]
pub struct GameViewport {
    state: Arc<ViewportState>,
}

impl GameViewport {
    pub fn new() -> Self {
        Self {
            state: Arc::new(ViewportState {
                disable_world_rendering: AtomicBool::new(false),
                force_count: AtomicUsize::new(0),
                end_draw_hooks: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Sets the user's flag. While any [`WorldRenderingScope`] is alive the
    /// world is still drawn; the flag takes effect once the last one drops.
    pub fn set_disable_world_rendering(&self, disable: bool) {
        self.state
            .disable_world_rendering
            .store(disable, Ordering::SeqCst);
    }

    /// The flag as last set by the user, ignoring live scopes.
    pub fn world_rendering_disabled_setting(&self) -> bool {
        self.state.disable_world_rendering.load(Ordering::SeqCst)
    }

    /// Whether the next frame skips drawing the world.
    pub fn is_world_rendering_disabled(&self) -> bool {
        self.world_rendering_disabled_setting() && self.forced_scopes() == 0
    }

    /// Number of live [`WorldRenderingScope`]s.
    pub fn forced_scopes(&self) -> usize {
        self.state.force_count.load(Ordering::SeqCst)
    }

    /// Forces world rendering on until the returned scope is dropped.
    ///
    /// Scopes are counted, so overlapping scopes from different callers
    /// release in any order without clobbering the user's flag.
    #[must_use = "world rendering is restored as soon as the scope is dropped"]
    pub fn force_world_rendering(&self) -> WorldRenderingScope {
        let previous = self.state.force_count.fetch_add(1, Ordering::SeqCst);
        if previous == 0 && self.world_rendering_disabled_setting() {
            log::debug!("World rendering forced on for capture");
        }
        WorldRenderingScope {
            viewport: self.clone(),
        }
    }

    /// Registers a hook that runs once, at the end of the next drawn frame.
    pub fn on_end_draw_once(&self, hook: impl FnOnce() + Send + 'static) {
        self.state.end_draw_hooks.lock().push(Box::new(hook));
    }

    /// Number of hooks waiting for the next end of draw.
    pub fn pending_end_draw_hooks(&self) -> usize {
        self.state.end_draw_hooks.lock().len()
    }

    /// Runs and clears every registered hook, in registration order.
    ///
    /// Hooks registered while this runs fire on the following frame.
    pub fn end_draw(&self) {
        let hooks = std::mem::take(&mut *self.state.end_draw_hooks.lock());
        for hook in hooks {
            hook();
        }
    }
}

impl Default for GameViewport {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for GameViewport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GameViewport")
            .field(
                "disable_world_rendering",
                &self.world_rendering_disabled_setting(),
            )
            .field("forced_scopes", &self.forced_scopes())
            .field("pending_end_draw_hooks", &self.pending_end_draw_hooks())
            .finish()
    }
}

/// Keeps world rendering forced on; releases its hold on drop.
pub struct WorldRenderingScope {
    viewport: GameViewport,
}

impl Drop for WorldRenderingScope {
    fn drop(&mut self) {
        self.viewport.state.force_count.fetch_sub(1, Ordering::SeqCst);
    }
}
