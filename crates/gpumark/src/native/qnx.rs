use std::ffi::c_void;
use std::os::raw::{c_char, c_int};

use super::{NativeDisplay, NativeOptions, NativeState, NativeWindow, Platform};
use crate::window::WindowProperties;

#[allow(non_camel_case_types)]
type screen_context_t = *mut c_void;
#[allow(non_camel_case_types)]
type screen_window_t = *mut c_void;
#[allow(non_camel_case_types)]
type screen_event_t = *mut c_void;

const SCREEN_PROPERTY_FORMAT: c_int = 14;
const SCREEN_PROPERTY_ID_STRING: c_int = 20;
const SCREEN_PROPERTY_SIZE: c_int = 40;
const SCREEN_PROPERTY_TYPE: c_int = 47;
const SCREEN_PROPERTY_USAGE: c_int = 48;
const SCREEN_PROPERTY_VISIBLE: c_int = 51;
const SCREEN_PROPERTY_FLAGS: c_int = 12;
const SCREEN_PROPERTY_SYM: c_int = 65;

const SCREEN_USAGE_OPENGL_ES2: c_int = 1 << 4;

const SCREEN_FORMAT_RGBA8888: c_int = 8;
const SCREEN_FORMAT_RGBX8888: c_int = 9;
const SCREEN_FORMAT_RGB565: c_int = 7;

const SCREEN_EVENT_NONE: c_int = 0;
const SCREEN_EVENT_CLOSE: c_int = 3;
const SCREEN_EVENT_KEYBOARD: c_int = 6;

const KEY_DOWN: c_int = 0x01;
const KEYCODE_ESCAPE: c_int = 0xf01b;

#[link(name = "screen")]
extern "C" {
    fn screen_create_context(ctx: *mut screen_context_t, flags: c_int) -> c_int;
    fn screen_destroy_context(ctx: screen_context_t) -> c_int;
    fn screen_create_event(ev: *mut screen_event_t) -> c_int;
    fn screen_destroy_event(ev: screen_event_t) -> c_int;
    fn screen_get_event(ctx: screen_context_t, ev: screen_event_t, timeout: u64) -> c_int;
    fn screen_get_event_property_iv(ev: screen_event_t, pname: c_int, param: *mut c_int) -> c_int;
    fn screen_create_window(win: *mut screen_window_t, ctx: screen_context_t) -> c_int;
    fn screen_destroy_window(win: screen_window_t) -> c_int;
    fn screen_create_window_buffers(win: screen_window_t, count: c_int) -> c_int;
    fn screen_set_window_property_iv(win: screen_window_t, pname: c_int, param: *const c_int) -> c_int;
    fn screen_get_window_property_iv(win: screen_window_t, pname: c_int, param: *mut c_int) -> c_int;
    fn screen_set_window_property_cv(
        win: screen_window_t,
        pname: c_int,
        len: c_int,
        param: *const c_char,
    ) -> c_int;
}

fn check(rc: c_int, what: &str) -> Result<(), Box<dyn std::error::Error>> {
    if rc != 0 {
        return Err(format!("{} failed, rc={}", what, rc).into());
    }
    Ok(())
}

/// QNX Screen window. EGL uses the default display.
pub struct NativeStateQnx {
    options: NativeOptions,
    context: screen_context_t,
    window: screen_window_t,
    event: screen_event_t,
    visible: c_int,
    properties: WindowProperties,
    closed: bool,
}

impl NativeStateQnx {
    pub fn new(options: NativeOptions) -> Self {
        Self {
            options,
            context: std::ptr::null_mut(),
            window: std::ptr::null_mut(),
            event: std::ptr::null_mut(),
            visible: 1,
            properties: WindowProperties::default(),
            closed: false,
        }
    }

    fn destroy_window(&mut self) {
        if !self.window.is_null() {
            unsafe { screen_destroy_window(self.window) };
            self.window = std::ptr::null_mut();
        }
    }

    fn build_window(&mut self, properties: WindowProperties) -> Result<(), Box<dyn std::error::Error>> {
        let mut props = properties;

        unsafe {
            check(screen_create_window(&mut self.window, self.context), "screen_create_window")?;

            let name = b"gpumark";
            check(
                screen_set_window_property_cv(
                    self.window,
                    SCREEN_PROPERTY_ID_STRING,
                    name.len() as c_int,
                    name.as_ptr() as *const c_char,
                ),
                "screen_set_window_property_cv(SCREEN_PROPERTY_ID_STRING)",
            )?;

            let mut size = [props.width, props.height];
            props.fullscreen = props.fullscreen || !props.has_valid_size();
            if !props.fullscreen {
                check(
                    screen_set_window_property_iv(self.window, SCREEN_PROPERTY_SIZE, size.as_ptr()),
                    "screen_set_window_property_iv(SCREEN_PROPERTY_SIZE)",
                )?;
            }

            let usage = SCREEN_USAGE_OPENGL_ES2;
            check(
                screen_set_window_property_iv(self.window, SCREEN_PROPERTY_USAGE, &usage),
                "screen_set_window_property_iv(SCREEN_PROPERTY_USAGE)",
            )?;

            let format = match props.visual_id as c_int {
                0 => SCREEN_FORMAT_RGBX8888,
                f @ (SCREEN_FORMAT_RGBA8888 | SCREEN_FORMAT_RGBX8888 | SCREEN_FORMAT_RGB565) => f,
                other => return Err(format!("unsupported native visual id {}", other).into()),
            };
            check(
                screen_set_window_property_iv(self.window, SCREEN_PROPERTY_FORMAT, &format),
                "screen_set_window_property_iv(SCREEN_PROPERTY_FORMAT)",
            )?;
            props.visual_id = format as i64;

            log::debug!(
                "[qnx] Creating window buffers {}x{} format {}",
                props.width,
                props.height,
                format
            );
            check(screen_create_window_buffers(self.window, 2), "screen_create_window_buffers")?;

            if props.fullscreen {
                check(
                    screen_get_window_property_iv(self.window, SCREEN_PROPERTY_SIZE, size.as_mut_ptr()),
                    "screen_get_window_property_iv(SCREEN_PROPERTY_SIZE)",
                )?;
            }
            props.width = size[0];
            props.height = size[1];

            if screen_set_window_property_iv(self.window, SCREEN_PROPERTY_VISIBLE, &self.visible) != 0 {
                log::warn!("[qnx] Failed to set window visibility");
            }
        }

        self.properties = props;
        Ok(())
    }
}

impl NativeState for NativeStateQnx {
    fn name(&self) -> &'static str {
        "qnx"
    }

    fn init_display(&mut self) -> bool {
        if !self.context.is_null() {
            return true;
        }

        let result = unsafe {
            check(screen_create_context(&mut self.context, 0), "screen_create_context")
                .and_then(|_| check(screen_create_event(&mut self.event), "screen_create_event"))
        };
        if let Err(e) = result {
            log::error!("[qnx] {}", e);
            return false;
        }
        true
    }

    fn display(&self) -> NativeDisplay {
        NativeDisplay::new(Platform::Qnx, std::ptr::null_mut())
    }

    fn create_window(&mut self, properties: WindowProperties) -> bool {
        self.destroy_window();

        match self.build_window(properties) {
            Ok(()) => true,
            Err(e) => {
                log::error!("[qnx] {}", e);
                self.destroy_window();
                false
            }
        }
    }

    fn window(&mut self, properties: &mut WindowProperties) -> NativeWindow {
        *properties = self.properties;
        NativeWindow {
            handle: self.window,
        }
    }

    fn visible(&mut self, visible: bool) {
        self.visible = visible as c_int;
    }

    fn should_quit(&mut self) -> bool {
        if !self.event.is_null() {
            unsafe {
                while screen_get_event(self.context, self.event, 0) == 0 {
                    let mut kind: c_int = SCREEN_EVENT_NONE;
                    let rc = screen_get_event_property_iv(self.event, SCREEN_PROPERTY_TYPE, &mut kind);
                    if rc != 0 || kind == SCREEN_EVENT_NONE {
                        break;
                    }
                    match kind {
                        SCREEN_EVENT_CLOSE => self.closed = true,
                        SCREEN_EVENT_KEYBOARD => {
                            let mut flags: c_int = 0;
                            let mut sym: c_int = 0;
                            screen_get_event_property_iv(self.event, SCREEN_PROPERTY_FLAGS, &mut flags);
                            screen_get_event_property_iv(self.event, SCREEN_PROPERTY_SYM, &mut sym);
                            if flags & KEY_DOWN != 0 && sym == KEYCODE_ESCAPE {
                                self.closed = true;
                            }
                        }
                        _ => {}
                    }
                }
            }
        }
        self.closed || self.options.quit.is_set()
    }

    fn flip(&mut self) {}
}

impl Drop for NativeStateQnx {
    fn drop(&mut self) {
        self.destroy_window();
        unsafe {
            if !self.event.is_null() {
                screen_destroy_event(self.event);
            }
            if !self.context.is_null() {
                screen_destroy_context(self.context);
            }
        }
    }
}
