use std::ffi::c_void;
use std::rc::Rc;

use khronos_egl as egl;
use glow::HasContext;

use super::{ExtensionTable, GlOptions, GlState};
use crate::native::{NativeDisplay, NativeWindow, Platform};
use crate::visual_config::{select_best_config, VisualConfig};

const EGL_PLATFORM_X11_KHR: egl::Enum = 0x31D5;
const EGL_PLATFORM_GBM_KHR: egl::Enum = 0x31D7;
const EGL_PLATFORM_WAYLAND_KHR: egl::Enum = 0x31D8;
const EGL_PLATFORM_SURFACELESS_MESA: egl::Enum = 0x31DD;

type EglInstance = egl::DynamicInstance<egl::EGL1_4>;

/// OpenGL ES 2.0 context through EGL.
pub struct EglState {
    egl: EglInstance,
    options: GlOptions,
    platform: Platform,
    requested: VisualConfig,
    display: Option<egl::Display>,
    config: Option<egl::Config>,
    context: Option<egl::Context>,
    surface: Option<egl::Surface>,
    window: NativeWindow,
    platform_surfaces: bool,
    gl: Option<Rc<glow::Context>>,
    extensions: ExtensionTable,
}

impl EglState {
    pub fn new(options: GlOptions) -> Result<Self, Box<dyn std::error::Error>> {
        let egl = unsafe {
            EglInstance::load_required().map_err(|e| format!("Failed to load EGL: {:?}", e))?
        };

        Ok(Self {
            egl,
            options,
            platform: Platform::Surfaceless,
            requested: VisualConfig::default(),
            display: None,
            config: None,
            context: None,
            surface: None,
            window: NativeWindow::null(),
            platform_surfaces: false,
            gl: None,
            extensions: ExtensionTable::default(),
        })
    }

    fn platform_enum(platform: Platform) -> Option<egl::Enum> {
        match platform {
            Platform::Gbm => Some(EGL_PLATFORM_GBM_KHR),
            Platform::Wayland => Some(EGL_PLATFORM_WAYLAND_KHR),
            Platform::X11 => Some(EGL_PLATFORM_X11_KHR),
            Platform::Surfaceless => Some(EGL_PLATFORM_SURFACELESS_MESA),
            _ => None,
        }
    }

    fn open_display(&mut self, native: NativeDisplay) -> Result<egl::Display, Box<dyn std::error::Error>> {
        let platform = Self::platform_enum(native.platform);

        if let (Some(platform), Some(egl15)) = (platform, self.egl.upcast::<egl::EGL1_5>()) {
            let handle = if native.platform == Platform::Surfaceless {
                egl::DEFAULT_DISPLAY
            } else {
                native.handle
            };
            let display = unsafe {
                egl15
                    .get_platform_display(platform, handle, &[egl::NONE as egl::Attrib])
                    .map_err(|e| format!("eglGetPlatformDisplay failed: {}", e))?
            };
            self.platform_surfaces = matches!(native.platform, Platform::Gbm | Platform::Wayland);
            return Ok(display);
        }

        if native.platform == Platform::Surfaceless {
            return Err("surfaceless rendering needs EGL 1.5".into());
        }

        let handle = match native.platform {
            Platform::Fbdev | Platform::Android | Platform::Qnx => egl::DEFAULT_DISPLAY,
            _ => native.handle,
        };
        let display = unsafe { self.egl.get_display(handle) }.ok_or("eglGetDisplay failed")?;
        self.platform_surfaces = false;
        Ok(display)
    }

    fn attrib(&self, display: egl::Display, config: egl::Config, attribute: egl::Int) -> i32 {
        self.egl.get_config_attrib(display, config, attribute).unwrap_or(0)
    }

    fn to_visual(&self, display: egl::Display, config: egl::Config) -> VisualConfig {
        VisualConfig {
            red: self.attrib(display, config, egl::RED_SIZE),
            green: self.attrib(display, config, egl::GREEN_SIZE),
            blue: self.attrib(display, config, egl::BLUE_SIZE),
            alpha: self.attrib(display, config, egl::ALPHA_SIZE),
            depth: self.attrib(display, config, egl::DEPTH_SIZE),
            stencil: self.attrib(display, config, egl::STENCIL_SIZE),
            buffer: self.attrib(display, config, egl::BUFFER_SIZE),
            samples: self.attrib(display, config, egl::SAMPLES),
            id: self.attrib(display, config, egl::CONFIG_ID),
        }
    }

    fn select_config(&mut self) -> bool {
        if self.config.is_some() {
            return true;
        }
        let Some(display) = self.display else {
            log::error!("[egl] Display has not been initialized");
            return false;
        };

        let mut attribs = vec![
            egl::RED_SIZE, 1,
            egl::GREEN_SIZE, 1,
            egl::BLUE_SIZE, 1,
            egl::COLOR_BUFFER_TYPE, egl::RGB_BUFFER,
            egl::RENDERABLE_TYPE, egl::OPENGL_ES2_BIT,
        ];
        if self.platform != Platform::Surfaceless {
            attribs.extend_from_slice(&[egl::SURFACE_TYPE, egl::WINDOW_BIT]);
        }
        attribs.push(egl::NONE);

        let count = match self.egl.matching_config_count(display, &attribs) {
            Ok(n) if n > 0 => n,
            Ok(_) => {
                log::error!("[egl] No configs satisfy the base requirements");
                return false;
            }
            Err(e) => {
                log::error!("[egl] eglChooseConfig failed: {}", e);
                return false;
            }
        };

        let mut configs = Vec::with_capacity(count);
        if let Err(e) = self.egl.choose_config(display, &attribs, &mut configs) {
            log::error!("[egl] eglChooseConfig failed: {}", e);
            return false;
        }

        let candidates: Vec<_> = configs
            .iter()
            .map(|&config| (config, self.to_visual(display, config)))
            .collect();

        match select_best_config(candidates, &self.requested, self.options.good_config, "EGL") {
            Some(best) => {
                log::debug!("[egl] Selected config {} (score {})", best.config, best.score);
                self.config = Some(best.native);
                true
            }
            None => false,
        }
    }

    fn create_context(&mut self) -> Result<egl::Context, Box<dyn std::error::Error>> {
        let (Some(display), Some(config)) = (self.display, self.config) else {
            return Err("no display or config".into());
        };

        self.egl.bind_api(egl::OPENGL_ES_API)?;
        let attribs = [egl::CONTEXT_CLIENT_VERSION, 2, egl::NONE];
        let context = self.egl.create_context(display, config, None, &attribs)?;
        Ok(context)
    }

    fn create_surface(&mut self) -> Result<egl::Surface, Box<dyn std::error::Error>> {
        let (Some(display), Some(config)) = (self.display, self.config) else {
            return Err("no display or config".into());
        };

        let surface = if self.platform_surfaces {
            match self.egl.upcast::<egl::EGL1_5>() {
                Some(egl15) => unsafe {
                    egl15.create_platform_window_surface(display, config, self.window.handle, &[egl::NONE as egl::Attrib])?
                },
                None => return Err("platform surfaces need EGL 1.5".into()),
            }
        } else {
            unsafe {
                self.egl
                    .create_window_surface(display, config, self.window.handle as egl::NativeWindowType, None)?
            }
        };
        Ok(surface)
    }

    fn is_current(&self) -> bool {
        match (self.egl.get_current_context(), self.context) {
            (Some(current), Some(ours)) => current.as_ptr() == ours.as_ptr(),
            _ => false,
        }
    }

    fn surface_is_current(&self) -> bool {
        match (self.egl.get_current_surface(egl::DRAW), self.surface) {
            (Some(current), Some(ours)) => current.as_ptr() == ours.as_ptr(),
            (None, None) => true,
            _ => false,
        }
    }

    fn load_extensions(&mut self) {
        let egl = &self.egl;
        let gl = unsafe {
            glow::Context::from_loader_function(|s| {
                egl.get_proc_address(s)
                    .map(|p| p as *const c_void)
                    .unwrap_or(std::ptr::null())
            })
        };

        self.extensions = ExtensionTable::new(gl.supported_extensions().iter().cloned(), false);
        log::debug!("[egl] {} GL extensions loaded", self.extensions.len());
        self.gl = Some(Rc::new(gl));
    }

    fn destroy_context(&mut self) {
        let Some(display) = self.display else { return };

        self.gl = None;
        if let Err(e) = self.egl.make_current(display, None, None, None) {
            log::debug!("[egl] Failed to release context: {}", e);
        }
        if let Some(context) = self.context.take() {
            self.egl.destroy_context(display, context).ok();
        }
    }

    fn destroy_surface(&mut self) {
        let Some(display) = self.display else { return };
        if let Some(surface) = self.surface.take() {
            if self.is_current() {
                self.egl.make_current(display, None, None, self.context).ok();
            }
            self.egl.destroy_surface(display, surface).ok();
        }
    }
}

impl GlState for EglState {
    fn name(&self) -> &'static str {
        "egl"
    }

    fn init_display(&mut self, display: NativeDisplay, requested: &VisualConfig) -> bool {
        self.requested = *requested;
        if self.display.is_some() {
            return true;
        }

        let egl_display = match self.open_display(display) {
            Ok(d) => d,
            Err(e) => {
                log::error!("[egl] {}", e);
                return false;
            }
        };

        match self.egl.initialize(egl_display) {
            Ok((major, minor)) => log::debug!("[egl] EGL {}.{} initialized", major, minor),
            Err(e) => {
                log::error!("[egl] eglInitialize failed: {}", e);
                return false;
            }
        }

        if log::log_enabled!(log::Level::Debug) {
            for (name, id) in [
                ("Vendor", egl::VENDOR),
                ("Version", egl::VERSION),
                ("Client APIs", egl::CLIENT_APIS),
            ] {
                if let Ok(value) = self.egl.query_string(Some(egl_display), id) {
                    log::debug!("[egl] {}: {}", name, value.to_string_lossy());
                }
            }
        }

        self.platform = display.platform;
        self.display = Some(egl_display);
        true
    }

    fn init_surface(&mut self, window: NativeWindow) -> bool {
        if window.is_null() && self.platform != Platform::Surfaceless {
            log::error!("[egl] Invalid native window");
            return false;
        }
        self.destroy_surface();
        self.window = window;
        true
    }

    fn release_surface(&mut self) {
        self.destroy_surface();
        self.window = NativeWindow::null();
    }

    fn valid(&mut self) -> bool {
        if !self.select_config() {
            return false;
        }

        if self.context.is_none() {
            match self.create_context() {
                Ok(context) => self.context = Some(context),
                Err(e) => {
                    log::error!("[egl] Failed to create context: {}", e);
                    return false;
                }
            }
        }

        if self.surface.is_none() && !self.window.is_null() {
            match self.create_surface() {
                Ok(surface) => self.surface = Some(surface),
                Err(e) => {
                    log::error!("[egl] Failed to create window surface: {}", e);
                    return false;
                }
            }
        }

        if self.is_current() && self.surface_is_current() && self.gl.is_some() {
            return true;
        }

        let Some(display) = self.display else { return false };
        if let Err(e) = self.egl.make_current(display, self.surface, self.surface, self.context) {
            log::error!("[egl] eglMakeCurrent failed: {}", e);
            return false;
        }

        if self.surface.is_some() {
            let interval = self.options.swap_interval();
            if self.egl.swap_interval(display, interval).is_err() {
                log::warn!("[egl] Failed to set swap interval {}, results may be bounded above by refresh rate", interval);
            }
        }

        if self.gl.is_none() {
            self.load_extensions();
        }

        true
    }

    fn reset(&mut self) -> bool {
        if self.display.is_none() {
            return false;
        }
        self.destroy_context();
        self.valid()
    }

    fn swap(&mut self) {
        if let (Some(display), Some(surface)) = (self.display, self.surface) {
            if let Err(e) = self.egl.swap_buffers(display, surface) {
                log::debug!("[egl] eglSwapBuffers failed: {}", e);
            }
        }
    }

    fn native_config(&mut self) -> Option<i64> {
        if !self.select_config() {
            return None;
        }
        let display = self.display?;
        let config = self.config?;
        let id = self.egl.get_config_attrib(display, config, egl::NATIVE_VISUAL_ID).ok()?;
        Some(id as i64)
    }

    fn visual_config(&mut self) -> Option<VisualConfig> {
        if !self.select_config() {
            return None;
        }
        Some(self.to_visual(self.display?, self.config?))
    }

    fn gl(&self) -> Option<Rc<glow::Context>> {
        self.gl.clone()
    }

    fn extensions(&self) -> &ExtensionTable {
        &self.extensions
    }

    fn is_desktop_gl(&self) -> bool {
        false
    }
}

impl Drop for EglState {
    fn drop(&mut self) {
        self.destroy_surface();
        self.destroy_context();
        if let Some(display) = self.display.take() {
            self.egl.terminate(display).ok();
        }
    }
}
