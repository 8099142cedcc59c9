use std::ffi::{c_void, CStr, CString};
use std::os::raw::{c_int, c_uint, c_ulong};
use std::rc::Rc;

use glow::HasContext;
use x11_dl::glx::{GLXContext, GLXFBConfig, Glx};
use x11_dl::xlib::{Display, Xlib};

use super::extensions::split_extension_string;
use super::{ExtensionTable, GlOptions, GlState};
use crate::native::{NativeDisplay, NativeWindow, Platform};
use crate::visual_config::{select_best_config, VisualConfig};

const GLX_BUFFER_SIZE: c_int = 2;
const GLX_DOUBLEBUFFER: c_int = 5;
const GLX_RED_SIZE: c_int = 8;
const GLX_GREEN_SIZE: c_int = 9;
const GLX_BLUE_SIZE: c_int = 10;
const GLX_ALPHA_SIZE: c_int = 11;
const GLX_DEPTH_SIZE: c_int = 12;
const GLX_STENCIL_SIZE: c_int = 13;
const GLX_X_VISUAL_TYPE: c_int = 0x22;
const GLX_TRUE_COLOR: c_int = 0x8002;
const GLX_VISUAL_ID: c_int = 0x800B;
const GLX_DRAWABLE_TYPE: c_int = 0x8010;
const GLX_RENDER_TYPE: c_int = 0x8011;
const GLX_X_RENDERABLE: c_int = 0x8012;
const GLX_FBCONFIG_ID: c_int = 0x8013;
const GLX_RGBA_TYPE: c_int = 0x8014;
const GLX_WINDOW_BIT: c_int = 0x1;
const GLX_RGBA_BIT: c_int = 0x1;
const GLX_SAMPLES: c_int = 100001;

type SwapIntervalExt = unsafe extern "C" fn(*mut Display, c_ulong, c_int);
type SwapIntervalMesa = unsafe extern "C" fn(c_uint) -> c_int;

/// Desktop OpenGL context through GLX 1.3 FB configs.
pub struct GlxState {
    glx: Glx,
    xlib: Xlib,
    options: GlOptions,
    requested: VisualConfig,
    display: *mut Display,
    window: c_ulong,
    config: Option<GLXFBConfig>,
    context: GLXContext,
    gl: Option<Rc<glow::Context>>,
    extensions: ExtensionTable,
}

impl GlxState {
    pub fn new(options: GlOptions) -> Result<Self, Box<dyn std::error::Error>> {
        let glx = Glx::open().map_err(|e| format!("Failed to load libGL: {}", e))?;
        let xlib = Xlib::open().map_err(|e| format!("Failed to load Xlib: {}", e))?;

        Ok(Self {
            glx,
            xlib,
            options,
            requested: VisualConfig::default(),
            display: std::ptr::null_mut(),
            window: 0,
            config: None,
            context: std::ptr::null_mut(),
            gl: None,
            extensions: ExtensionTable::default(),
        })
    }

    fn screen(&self) -> c_int {
        unsafe { (self.xlib.XDefaultScreen)(self.display) }
    }

    fn attrib(&self, config: GLXFBConfig, attribute: c_int) -> i32 {
        let mut value: c_int = 0;
        unsafe { (self.glx.glXGetFBConfigAttrib)(self.display, config, attribute, &mut value) };
        value
    }

    fn to_visual(&self, config: GLXFBConfig) -> VisualConfig {
        VisualConfig {
            red: self.attrib(config, GLX_RED_SIZE),
            green: self.attrib(config, GLX_GREEN_SIZE),
            blue: self.attrib(config, GLX_BLUE_SIZE),
            alpha: self.attrib(config, GLX_ALPHA_SIZE),
            depth: self.attrib(config, GLX_DEPTH_SIZE),
            stencil: self.attrib(config, GLX_STENCIL_SIZE),
            buffer: self.attrib(config, GLX_BUFFER_SIZE),
            samples: self.attrib(config, GLX_SAMPLES),
            id: self.attrib(config, GLX_FBCONFIG_ID),
        }
    }

    fn check_version(&self) -> bool {
        let (mut major, mut minor) = (0, 0);
        let ok = unsafe { (self.glx.glXQueryVersion)(self.display, &mut major, &mut minor) };
        if ok == 0 || major < 1 || (major == 1 && minor < 3) {
            log::error!("[glx] GLX version >= 1.3 is required");
            return false;
        }
        true
    }

    fn select_config(&mut self) -> bool {
        if self.config.is_some() {
            return true;
        }
        if self.display.is_null() {
            log::error!("[glx] Display has not been initialized");
            return false;
        }
        if !self.check_version() {
            return false;
        }

        let attribs = [
            GLX_X_RENDERABLE, 1,
            GLX_DRAWABLE_TYPE, GLX_WINDOW_BIT,
            GLX_RENDER_TYPE, GLX_RGBA_BIT,
            GLX_X_VISUAL_TYPE, GLX_TRUE_COLOR,
            GLX_DOUBLEBUFFER, 1,
            0,
        ];

        let mut count: c_int = 0;
        let list = unsafe {
            (self.glx.glXChooseFBConfig)(self.display, self.screen(), attribs.as_ptr(), &mut count)
        };
        if list.is_null() || count <= 0 {
            log::error!("[glx] glXChooseFBConfig() failed");
            return false;
        }

        let configs: Vec<GLXFBConfig> = unsafe { std::slice::from_raw_parts(list, count as usize) }.to_vec();
        unsafe { (self.xlib.XFree)(list as *mut c_void) };
        log::debug!("[glx] Found {} matching FB configs", configs.len());

        let candidates: Vec<_> = configs.iter().map(|&c| (c, self.to_visual(c))).collect();
        match select_best_config(candidates, &self.requested, self.options.good_config, "GLX") {
            Some(best) => {
                log::debug!(
                    "[glx] Chosen config {} native visual 0x{:x}",
                    best.config,
                    self.attrib(best.native, GLX_VISUAL_ID)
                );
                self.config = Some(best.native);
                true
            }
            None => {
                log::error!("[glx] Failed to find suitable GLX FB config");
                false
            }
        }
    }

    fn proc_address(&self, name: &str) -> *const c_void {
        let Ok(name) = CString::new(name) else {
            return std::ptr::null();
        };
        match unsafe { (self.glx.glXGetProcAddress)(name.as_ptr() as *const u8) } {
            Some(f) => f as *const c_void,
            None => std::ptr::null(),
        }
    }

    fn set_swap_interval(&self) {
        let desired = self.options.swap_interval();

        let extensions = unsafe { (self.glx.glXQueryExtensionsString)(self.display, self.screen()) };
        let extensions = if extensions.is_null() {
            String::new()
        } else {
            unsafe { CStr::from_ptr(extensions) }.to_string_lossy().into_owned()
        };
        let has = |n: &str| split_extension_string(&extensions).any(|e| e == n);

        if has("GLX_EXT_swap_control") {
            let f = self.proc_address("glXSwapIntervalEXT");
            if !f.is_null() {
                let f: SwapIntervalExt = unsafe { std::mem::transmute(f) };
                unsafe { f(self.display, self.window, desired) };
                return;
            }
        }

        if has("GLX_MESA_swap_control") {
            let f = self.proc_address("glXSwapIntervalMESA");
            if !f.is_null() {
                let f: SwapIntervalMesa = unsafe { std::mem::transmute(f) };
                if unsafe { f(desired as c_uint) } == 0 {
                    return;
                }
            }
        }

        log::warn!("[glx] Failed to set swap interval, results may be bounded above by refresh rate");
    }

    fn load_extensions(&mut self) {
        let gl = unsafe { glow::Context::from_loader_function(|s| self.proc_address(s)) };
        self.extensions = ExtensionTable::new(gl.supported_extensions().iter().cloned(), true);
        log::debug!("[glx] {} GL extensions loaded", self.extensions.len());
        self.gl = Some(Rc::new(gl));
    }

    fn destroy_context(&mut self) {
        self.gl = None;
        if self.context.is_null() {
            return;
        }
        unsafe {
            if (self.glx.glXGetCurrentContext)() == self.context {
                (self.glx.glXMakeCurrent)(self.display, 0, std::ptr::null_mut());
            }
            (self.glx.glXDestroyContext)(self.display, self.context);
        }
        self.context = std::ptr::null_mut();
    }
}

impl GlState for GlxState {
    fn name(&self) -> &'static str {
        "glx"
    }

    fn init_display(&mut self, display: NativeDisplay, requested: &VisualConfig) -> bool {
        if display.platform != Platform::X11 || display.handle.is_null() {
            log::error!("[glx] GLX needs an X11 display");
            return false;
        }
        self.display = display.handle as *mut Display;
        self.requested = *requested;
        true
    }

    fn init_surface(&mut self, window: NativeWindow) -> bool {
        self.window = window.id() as c_ulong;
        self.window != 0
    }

    fn release_surface(&mut self) {
        if self.window == 0 {
            return;
        }
        unsafe {
            if (self.glx.glXGetCurrentDrawable)() == self.window {
                (self.glx.glXMakeCurrent)(self.display, 0, std::ptr::null_mut());
            }
        }
        self.window = 0;
    }

    fn valid(&mut self) -> bool {
        if !self.select_config() {
            return false;
        }
        let Some(config) = self.config else { return false };

        if self.context.is_null() {
            self.context = unsafe {
                (self.glx.glXCreateNewContext)(self.display, config, GLX_RGBA_TYPE, std::ptr::null_mut(), 1)
            };
            if self.context.is_null() {
                log::error!("[glx] glXCreateNewContext failed");
                return false;
            }
        }

        let current = unsafe { (self.glx.glXGetCurrentContext)() == self.context && (self.glx.glXGetCurrentDrawable)() == self.window };
        if current && self.gl.is_some() {
            return true;
        }

        if unsafe { (self.glx.glXMakeCurrent)(self.display, self.window, self.context) } == 0 {
            log::error!("[glx] glXMakeCurrent failed");
            return false;
        }

        if self.gl.is_none() {
            self.load_extensions();
        }
        self.set_swap_interval();
        true
    }

    fn reset(&mut self) -> bool {
        self.destroy_context();
        self.valid()
    }

    fn swap(&mut self) {
        if !self.display.is_null() && self.window != 0 {
            unsafe { (self.glx.glXSwapBuffers)(self.display, self.window) };
        }
    }

    fn native_config(&mut self) -> Option<i64> {
        if !self.select_config() {
            return None;
        }
        let config = self.config?;
        let mut id: c_int = 0;
        let rc = unsafe { (self.glx.glXGetFBConfigAttrib)(self.display, config, GLX_VISUAL_ID, &mut id) };
        if rc != 0 {
            log::debug!("[glx] Failed to get native visual id");
            return None;
        }
        Some(id as i64)
    }

    fn visual_config(&mut self) -> Option<VisualConfig> {
        if !self.select_config() {
            return None;
        }
        Some(self.to_visual(self.config?))
    }

    fn gl(&self) -> Option<Rc<glow::Context>> {
        self.gl.clone()
    }

    fn extensions(&self) -> &ExtensionTable {
        &self.extensions
    }

    fn is_desktop_gl(&self) -> bool {
        true
    }
}

impl Drop for GlxState {
    fn drop(&mut self) {
        self.destroy_context();
    }
}
