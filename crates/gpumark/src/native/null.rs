use super::{NativeDisplay, NativeOptions, NativeState, NativeWindow, Platform};
use crate::window::WindowProperties;

/// Headless backend. There is no window; rendering goes to an offscreen
/// framebuffer on a surfaceless context.
pub struct NativeStateNull {
    options: NativeOptions,
    properties: WindowProperties,
}

impl NativeStateNull {
    pub fn new(options: NativeOptions) -> Self {
        Self {
            options,
            properties: WindowProperties::default(),
        }
    }
}

impl NativeState for NativeStateNull {
    fn name(&self) -> &'static str {
        "null"
    }

    fn init_display(&mut self) -> bool {
        true
    }

    fn display(&self) -> NativeDisplay {
        NativeDisplay::new(Platform::Surfaceless, std::ptr::null_mut())
    }

    fn create_window(&mut self, properties: WindowProperties) -> bool {
        if properties.fullscreen {
            log::error!("[null] Fullscreen not supported");
            return false;
        }

        if !properties.has_valid_size() {
            log::error!(
                "[null] Invalid surface size {}x{}",
                properties.width,
                properties.height
            );
            return false;
        }

        self.properties = properties;
        true
    }

    fn window(&mut self, properties: &mut WindowProperties) -> NativeWindow {
        *properties = self.properties;
        NativeWindow::null()
    }

    fn visible(&mut self, _visible: bool) {}

    fn should_quit(&mut self) -> bool {
        self.options.quit.is_set()
    }

    fn flip(&mut self) {}
}
