use std::ffi::c_void;
use std::os::raw::c_int;

use super::{NativeDisplay, NativeOptions, NativeState, NativeWindow, Platform};
use crate::window::WindowProperties;

#[link(name = "android")]
extern "C" {
    fn ANativeWindow_fromSurface(env: *mut c_void, surface: *mut c_void) -> *mut c_void;
    fn ANativeWindow_acquire(window: *mut c_void);
    fn ANativeWindow_release(window: *mut c_void);
    fn ANativeWindow_getWidth(window: *mut c_void) -> i32;
    fn ANativeWindow_getHeight(window: *mut c_void) -> i32;
    fn ANativeWindow_setBuffersGeometry(
        window: *mut c_void,
        width: i32,
        height: i32,
        format: i32,
    ) -> c_int;
}

/// Surface owned by the host activity. Size is dictated by the view, so
/// requested sizes are ignored and the window is always reported fullscreen.
pub struct NativeStateAndroid {
    options: NativeOptions,
    window: *mut c_void,
    properties: WindowProperties,
}

impl NativeStateAndroid {
    /// Takes a reference on `window`; it is released when the state drops.
    pub fn new(window: *mut c_void, options: NativeOptions) -> Self {
        if !window.is_null() {
            unsafe { ANativeWindow_acquire(window) };
        }
        Self {
            options,
            window,
            properties: WindowProperties::default(),
        }
    }

    /// Wraps the window behind a Java `Surface`.
    ///
    /// # Safety
    /// `env` must be the calling thread's `JNIEnv` and `surface` a live
    /// `android.view.Surface` reference.
    pub unsafe fn from_surface(env: *mut c_void, surface: *mut c_void, options: NativeOptions) -> Self {
        // fromSurface already returns an acquired reference.
        let window = ANativeWindow_fromSurface(env, surface);
        Self {
            options,
            window,
            properties: WindowProperties::default(),
        }
    }
}

impl NativeState for NativeStateAndroid {
    fn name(&self) -> &'static str {
        "android"
    }

    fn init_display(&mut self) -> bool {
        if self.window.is_null() {
            log::error!("[android] No native window was provided by the host");
            return false;
        }
        true
    }

    fn display(&self) -> NativeDisplay {
        NativeDisplay::new(Platform::Android, std::ptr::null_mut())
    }

    fn create_window(&mut self, properties: WindowProperties) -> bool {
        if self.window.is_null() {
            return false;
        }

        let mut props = properties;
        if props.visual_id != 0 {
            let rc = unsafe { ANativeWindow_setBuffersGeometry(self.window, 0, 0, props.visual_id as i32) };
            if rc != 0 {
                log::warn!("[android] Failed to set buffer format {}: {}", props.visual_id, rc);
            }
        }

        props.width = unsafe { ANativeWindow_getWidth(self.window) };
        props.height = unsafe { ANativeWindow_getHeight(self.window) };
        props.fullscreen = true;

        if !props.has_valid_size() {
            log::error!("[android] Native window reports an invalid size");
            return false;
        }

        log::debug!("[android] Window is {}x{}", props.width, props.height);
        self.properties = props;
        true
    }

    fn window(&mut self, properties: &mut WindowProperties) -> NativeWindow {
        *properties = self.properties;
        NativeWindow {
            handle: self.window,
        }
    }

    fn visible(&mut self, _visible: bool) {}

    fn should_quit(&mut self) -> bool {
        self.options.quit.is_set()
    }

    fn flip(&mut self) {}
}

impl Drop for NativeStateAndroid {
    fn drop(&mut self) {
        if !self.window.is_null() {
            unsafe { ANativeWindow_release(self.window) };
        }
    }
}
