use std::rc::Rc;

use crate::native::{NativeDisplay, NativeWindow, Winsys};
use crate::swap_chain::SwapMode;
use crate::visual_config::VisualConfig;

pub mod egl;
pub mod extensions;
#[cfg(feature = "glx")]
pub mod glx;

pub use extensions::ExtensionTable;

/// Context settings shared by the EGL and GLX implementations.
#[derive(Debug, Clone, Copy, Default)]
pub struct GlOptions {
    pub swap_mode: SwapMode,
    /// Fail instead of warning when no config matches the request exactly.
    pub good_config: bool,
}

impl GlOptions {
    /// FIFO is the only mode that wants the swap tied to vblank.
    pub fn swap_interval(&self) -> i32 {
        match self.swap_mode {
            SwapMode::Fifo => 1,
            _ => 0,
        }
    }
}

/// GPU context bound to a native display and window.
///
/// Like [`crate::native::NativeState`], failures are logged and reported
/// through `bool`/`Option` results.
pub trait GlState {
    fn name(&self) -> &'static str;

    fn init_display(&mut self, display: NativeDisplay, requested: &VisualConfig) -> bool;

    fn init_surface(&mut self, window: NativeWindow) -> bool;

    /// Destroys the GL surface wrapping the current native window. Must run
    /// before that window is destroyed.
    fn release_surface(&mut self);

    /// Makes sure a config, context and current binding exist, creating
    /// whatever is missing. Extensions are loaded on the first success.
    fn valid(&mut self) -> bool;

    /// Destroys the context and creates a fresh one.
    fn reset(&mut self) -> bool;

    fn swap(&mut self);

    /// Native visual id of the negotiated config. Native backends need it
    /// before a context exists to create a compatible window.
    fn native_config(&mut self) -> Option<i64>;

    fn visual_config(&mut self) -> Option<VisualConfig>;

    fn gl(&self) -> Option<Rc<glow::Context>>;

    fn extensions(&self) -> &ExtensionTable;

    /// True for desktop OpenGL, false for OpenGL ES.
    fn is_desktop_gl(&self) -> bool;
}

pub fn create(winsys: Winsys, options: GlOptions) -> Result<Box<dyn GlState>, Box<dyn std::error::Error>> {
    if winsys.uses_glx() {
        #[cfg(feature = "glx")]
        return Ok(Box::new(glx::GlxState::new(options)?));

        #[cfg(not(feature = "glx"))]
        return Err("GLX support is not compiled in".into());
    }

    Ok(Box::new(egl::EglState::new(options)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_swap_interval_follows_swap_mode() {
        let mut options = GlOptions::default();
        assert_eq!(options.swap_interval(), 0);
        options.swap_mode = SwapMode::Fifo;
        assert_eq!(options.swap_interval(), 1);
        options.swap_mode = SwapMode::Mailbox;
        assert_eq!(options.swap_interval(), 0);
    }
}
