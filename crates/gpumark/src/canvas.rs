use std::fmt;
use std::path::Path;
use std::rc::Rc;
use std::str::FromStr;

use glow::HasContext;

use crate::gl_state::{ExtensionTable, GlState};
use crate::matrix::Mat4;
use crate::native::{NativeState, NativeWindow};
use crate::visual_config::VisualConfig;
use crate::window::WindowProperties;

/// What "the frame is done" means for timing purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FrameEnd {
    /// `Finish` when offscreen, `Swap` otherwise.
    #[default]
    Default,
    None,
    Swap,
    Finish,
    ReadPixels,
}

impl FrameEnd {
    pub fn resolve(self, offscreen: bool) -> FrameEnd {
        match self {
            FrameEnd::Default if offscreen => FrameEnd::Finish,
            FrameEnd::Default => FrameEnd::Swap,
            other => other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FrameEnd::Default => "default",
            FrameEnd::None => "none",
            FrameEnd::Swap => "swap",
            FrameEnd::Finish => "finish",
            FrameEnd::ReadPixels => "readpixels",
        }
    }
}

impl fmt::Display for FrameEnd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FrameEnd {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "default" => Ok(FrameEnd::Default),
            "none" => Ok(FrameEnd::None),
            "swap" => Ok(FrameEnd::Swap),
            "finish" => Ok(FrameEnd::Finish),
            "readpixels" => Ok(FrameEnd::ReadPixels),
            other => Err(format!("unknown frame end method '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Pixel {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Pixel {
    pub fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// Packs the pixel as the little-endian word of its RGBA bytes.
    pub fn to_le32(&self) -> u32 {
        u32::from_le_bytes([self.r, self.g, self.b, self.a])
    }
}

/// Drawing surface the main loop and scenes render into.
pub trait Canvas {
    fn init(&mut self) -> bool;

    /// Recreates the GPU context. Only used when contexts are not reused
    /// between scenes.
    fn reset(&mut self) -> bool;

    fn resize(&mut self, width: i32, height: i32);

    fn clear(&mut self);

    /// Ends a frame according to the frame-end policy.
    fn update(&mut self, scene: &str, frame: u32);

    fn visible(&mut self, visible: bool);

    fn should_quit(&mut self) -> bool;

    fn print_info(&mut self);

    fn read_pixel(&mut self, x: i32, y: i32) -> Pixel;

    /// Writes the RGBA contents as raw rows, top row first.
    fn write_to_file(&mut self, path: &Path) -> Result<(), Box<dyn std::error::Error>>;

    fn projection(&self) -> &Mat4;

    fn width(&self) -> i32;

    fn height(&self) -> i32;

    fn gl(&self) -> Option<Rc<glow::Context>>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CanvasOptions {
    pub width: i32,
    pub height: i32,
    pub fullscreen: bool,
    pub offscreen: bool,
    pub frame_end: FrameEnd,
    pub visual_config: VisualConfig,
}

struct Offscreen {
    fbo: glow::Framebuffer,
    color: glow::Renderbuffer,
    depth: glow::Renderbuffer,
    color_format: u32,
    depth_format: u32,
}

/// GL details printed under the run banner.
struct GlInfo {
    api: &'static str,
    vendor: String,
    renderer: String,
    version: String,
    config: Option<VisualConfig>,
    width: i32,
    height: i32,
    offscreen: bool,
}

impl GlInfo {
    fn lines(&self) -> Vec<String> {
        let mut lines = vec![
            format!("    {} Information", self.api),
            format!("    GL_VENDOR:      {}", self.vendor),
            format!("    GL_RENDERER:    {}", self.renderer),
            format!("    GL_VERSION:     {}", self.version),
        ];
        if let Some(vc) = &self.config {
            lines.push(format!("    Surface Config: {}", vc));
        }
        lines.push(format!(
            "    Surface Size:   {}x{} {}",
            self.width,
            self.height,
            if self.offscreen { "offscreen" } else { "windowed" }
        ));
        lines.push("=".repeat(55));
        lines
    }
}

/// Canvas backed by one native window system and one GL binding.
pub struct NativeCanvas {
    // Declared before `native` so the GL surface goes away before its window.
    gl_state: Box<dyn GlState>,
    native: Box<dyn NativeState>,
    options: CanvasOptions,
    width: i32,
    height: i32,
    window: Option<NativeWindow>,
    offscreen: bool,
    fbo: Option<Offscreen>,
    projection: Mat4,
}

impl NativeCanvas {
    pub fn new(native: Box<dyn NativeState>, gl_state: Box<dyn GlState>, options: CanvasOptions) -> Self {
        Self {
            gl_state,
            native,
            width: options.width,
            height: options.height,
            offscreen: options.offscreen,
            options,
            window: None,
            fbo: None,
            projection: Mat4::identity(),
        }
    }

    pub fn is_offscreen(&self) -> bool {
        self.offscreen
    }

    pub fn extensions(&self) -> &ExtensionTable {
        self.gl_state.extensions()
    }

    fn resize_no_viewport(&mut self, width: i32, height: i32) -> bool {
        let fullscreen = self.options.fullscreen || width == -1 || height == -1;

        if self.window.is_some() && width == self.width && height == self.height {
            return true;
        }

        let Some(visual_id) = self.gl_state.native_config() else {
            log::error!("[canvas] Couldn't get GL visual config");
            return false;
        };

        // The GL surface wraps the old window, so it has to go first.
        if self.window.take().is_some() {
            self.gl_state.release_surface();
        }

        let mut properties = WindowProperties::new(width, height, fullscreen, visual_id);
        if !self.native.create_window(properties) {
            log::error!("[canvas] Couldn't create native window");
            return false;
        }

        let window = self.native.window(&mut properties);
        if window.is_null() && !self.offscreen {
            log::warn!("[canvas] {} has no native window, rendering offscreen", self.native.name());
            self.offscreen = true;
        }

        if !self.gl_state.init_surface(window) {
            log::error!("[canvas] Couldn't initialize GL surface");
            return false;
        }

        self.window = Some(window);
        self.width = properties.width;
        self.height = properties.height;

        if !self.make_current() {
            return false;
        }

        if let (Some(gl), Some(fbo)) = (self.gl_state.gl(), &self.fbo) {
            unsafe {
                gl.bind_renderbuffer(glow::RENDERBUFFER, Some(fbo.color));
                gl.renderbuffer_storage(glow::RENDERBUFFER, fbo.color_format, self.width, self.height);
                gl.bind_renderbuffer(glow::RENDERBUFFER, Some(fbo.depth));
                gl.renderbuffer_storage(glow::RENDERBUFFER, fbo.depth_format, self.width, self.height);
            }
        }

        self.projection = Mat4::perspective(60.0, self.width as f32 / self.height.max(1) as f32, 1.0, 1024.0);
        true
    }

    fn make_current(&mut self) -> bool {
        if !self.gl_state.valid() {
            log::error!("[canvas] Couldn't make GL context current");
            return false;
        }

        if self.offscreen {
            if !self.ensure_fbo() {
                return false;
            }
            if let (Some(gl), Some(fbo)) = (self.gl_state.gl(), &self.fbo) {
                unsafe { gl.bind_framebuffer(glow::FRAMEBUFFER, Some(fbo.fbo)) };
            }
        }
        true
    }

    fn gl_formats(&mut self) -> Option<(u32, u32)> {
        let vc = self.gl_state.visual_config()?;
        let ext = self.gl_state.extensions();
        let (rgba8, rgb8) = (ext.rgba8, ext.rgb8);

        let color = match (vc.buffer, vc.red, vc.green, vc.blue, vc.alpha) {
            (32, ..) if rgba8 => glow::RGBA8,
            (32, ..) => glow::RGBA4,
            (24, ..) if rgb8 => glow::RGB8,
            (24, ..) => glow::RGB565,
            (16, 4, 4, 4, 4) => glow::RGBA4,
            (16, 5, 5, 5, 1) => glow::RGB5_A1,
            (16, 5, 6, 5, 0) => glow::RGB565,
            _ => 0,
        };

        let depth = if vc.depth == 32 && ext.depth32 {
            glow::DEPTH_COMPONENT32
        } else if vc.depth >= 24 && ext.depth24 {
            glow::DEPTH_COMPONENT24
        } else if vc.depth >= 16 {
            glow::DEPTH_COMPONENT16
        } else {
            0
        };

        log::debug!(
            "[canvas] Selected renderbuffer color format {} depth format {}",
            format_name(color),
            format_name(depth)
        );

        (color != 0 && depth != 0).then_some((color, depth))
    }

    fn ensure_fbo(&mut self) -> bool {
        if self.fbo.is_some() {
            return true;
        }

        let Some((color_format, depth_format)) = self.gl_formats() else {
            log::error!("[canvas] No usable offscreen renderbuffer formats for this config");
            return false;
        };
        let Some(gl) = self.gl_state.gl() else { return false };

        let result: Result<Offscreen, String> = unsafe {
            (|| {
                let color = gl.create_renderbuffer()?;
                gl.bind_renderbuffer(glow::RENDERBUFFER, Some(color));
                gl.renderbuffer_storage(glow::RENDERBUFFER, color_format, self.width, self.height);

                let depth = gl.create_renderbuffer()?;
                gl.bind_renderbuffer(glow::RENDERBUFFER, Some(depth));
                gl.renderbuffer_storage(glow::RENDERBUFFER, depth_format, self.width, self.height);

                let fbo = gl.create_framebuffer()?;
                gl.bind_framebuffer(glow::FRAMEBUFFER, Some(fbo));
                gl.framebuffer_renderbuffer(glow::FRAMEBUFFER, glow::COLOR_ATTACHMENT0, glow::RENDERBUFFER, Some(color));
                gl.framebuffer_renderbuffer(glow::FRAMEBUFFER, glow::DEPTH_ATTACHMENT, glow::RENDERBUFFER, Some(depth));

                Ok(Offscreen {
                    fbo,
                    color,
                    depth,
                    color_format,
                    depth_format,
                })
            })()
        };

        match result {
            Ok(offscreen) => {
                let status = unsafe { gl.check_framebuffer_status(glow::FRAMEBUFFER) };
                if status != glow::FRAMEBUFFER_COMPLETE {
                    log::warn!("[canvas] Offscreen framebuffer is incomplete (0x{:x})", status);
                }
                self.fbo = Some(offscreen);
                true
            }
            Err(e) => {
                log::error!("[canvas] Failed to create offscreen framebuffer: {}", e);
                false
            }
        }
    }

    fn release_fbo(&mut self) {
        let Some(fbo) = self.fbo.take() else { return };
        if let Some(gl) = self.gl_state.gl() {
            unsafe {
                gl.bind_framebuffer(glow::FRAMEBUFFER, None);
                gl.delete_framebuffer(fbo.fbo);
                gl.delete_renderbuffer(fbo.color);
                gl.delete_renderbuffer(fbo.depth);
            }
        }
    }

    fn setup_gl(&mut self) -> bool {
        let Some(gl) = self.gl_state.gl() else { return false };

        let version = gl.version();
        if version.major < 2 {
            let s = unsafe { gl.get_parameter_string(glow::VERSION) };
            log::error!("[canvas] OpenGL(ES) version >= 2.0 is required (but version string is: '{}')", s);
            return false;
        }

        unsafe {
            gl.viewport(0, 0, self.width, self.height);
            gl.enable(glow::DEPTH_TEST);
            gl.depth_func(glow::LEQUAL);
            gl.enable(glow::CULL_FACE);
            gl.cull_face(glow::BACK);
        }
        self.clear();
        true
    }
}

impl Canvas for NativeCanvas {
    fn init(&mut self) -> bool {
        if !self.native.init_display() {
            log::error!("[canvas] Failed to initialize {} display", self.native.name());
            return false;
        }

        if !self.gl_state.init_display(self.native.display(), &self.options.visual_config) {
            log::error!("[canvas] Failed to initialize {} display", self.gl_state.name());
            return false;
        }

        if !self.resize_no_viewport(self.options.width, self.options.height) {
            return false;
        }

        if !self.make_current() {
            return false;
        }

        if !self.setup_gl() {
            return false;
        }

        if !self.offscreen {
            self.native.visible(true);
        }
        true
    }

    fn reset(&mut self) -> bool {
        self.release_fbo();

        if !self.gl_state.reset() {
            log::error!("[canvas] Failed to reset GL context");
            return false;
        }

        if !self.make_current() {
            return false;
        }

        self.setup_gl()
    }

    fn resize(&mut self, width: i32, height: i32) {
        if !self.resize_no_viewport(width, height) {
            return;
        }
        if let Some(gl) = self.gl_state.gl() {
            unsafe { gl.viewport(0, 0, self.width, self.height) };
        }
    }

    fn clear(&mut self) {
        let Some(gl) = self.gl_state.gl() else { return };
        unsafe {
            gl.clear_color(0.0, 0.0, 0.0, 1.0);
            gl.clear_depth_f32(1.0);
            gl.clear(glow::COLOR_BUFFER_BIT | glow::DEPTH_BUFFER_BIT);
        }
    }

    fn update(&mut self, scene: &str, frame: u32) {
        log::trace!("[canvas] {} frame {}", scene, frame);

        match self.options.frame_end.resolve(self.offscreen) {
            FrameEnd::Swap => {
                self.gl_state.swap();
                self.native.flip();
            }
            FrameEnd::Finish => {
                if let Some(gl) = self.gl_state.gl() {
                    unsafe { gl.finish() };
                }
            }
            FrameEnd::ReadPixels => {
                let (x, y) = (self.width / 2, self.height / 2);
                self.read_pixel(x, y);
            }
            FrameEnd::None | FrameEnd::Default => {}
        }
    }

    fn visible(&mut self, visible: bool) {
        if visible && !self.offscreen {
            self.native.visible(true);
        }
    }

    fn should_quit(&mut self) -> bool {
        self.native.should_quit()
    }

    fn print_info(&mut self) {
        self.make_current();

        let Some(gl) = self.gl_state.gl() else { return };
        let (vendor, renderer, version) = unsafe {
            (
                gl.get_parameter_string(glow::VENDOR),
                gl.get_parameter_string(glow::RENDERER),
                gl.get_parameter_string(glow::VERSION),
            )
        };

        let info = GlInfo {
            api: if self.gl_state.is_desktop_gl() { "OpenGL" } else { "OpenGL ES" },
            vendor,
            renderer,
            version,
            config: self.gl_state.visual_config(),
            width: self.width,
            height: self.height,
            offscreen: self.offscreen,
        };
        for line in info.lines() {
            log::info!("{}", line);
        }
    }

    fn read_pixel(&mut self, x: i32, y: i32) -> Pixel {
        let Some(gl) = self.gl_state.gl() else { return Pixel::default() };
        let mut p = [0u8; 4];
        unsafe {
            gl.read_pixels(x, y, 1, 1, glow::RGBA, glow::UNSIGNED_BYTE, glow::PixelPackData::Slice(Some(&mut p)));
        }
        Pixel::new(p[0], p[1], p[2], p[3])
    }

    fn write_to_file(&mut self, path: &Path) -> Result<(), Box<dyn std::error::Error>> {
        let gl = self.gl_state.gl().ok_or("no GL context")?;
        let (width, height) = (self.width.max(0) as usize, self.height.max(0) as usize);
        let stride = width * 4;
        let mut pixels = vec![0u8; stride * height];

        // GL rows start at the bottom.
        for i in 0..height {
            let row = height - i - 1;
            let dst = &mut pixels[row * stride..(row + 1) * stride];
            unsafe {
                gl.read_pixels(
                    0,
                    i as i32,
                    width as i32,
                    1,
                    glow::RGBA,
                    glow::UNSIGNED_BYTE,
                    glow::PixelPackData::Slice(Some(dst)),
                );
            }
        }

        std::fs::write(path, &pixels)?;
        Ok(())
    }

    fn projection(&self) -> &Mat4 {
        &self.projection
    }

    fn width(&self) -> i32 {
        self.width
    }

    fn height(&self) -> i32 {
        self.height
    }

    fn gl(&self) -> Option<Rc<glow::Context>> {
        self.gl_state.gl()
    }
}

impl Drop for NativeCanvas {
    fn drop(&mut self) {
        self.release_fbo();
    }
}

fn format_name(format: u32) -> &'static str {
    match format {
        glow::RGBA8 => "GL_RGBA8",
        glow::RGB8 => "GL_RGB8",
        glow::RGBA4 => "GL_RGBA4",
        glow::RGB5_A1 => "GL_RGB5_A1",
        glow::RGB565 => "GL_RGB565",
        glow::DEPTH_COMPONENT16 => "GL_DEPTH_COMPONENT16",
        glow::DEPTH_COMPONENT24 => "GL_DEPTH_COMPONENT24",
        glow::DEPTH_COMPONENT32 => "GL_DEPTH_COMPONENT32",
        0 => "GL_NONE",
        _ => "Unknown",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_end_default_depends_on_offscreen() {
        assert_eq!(FrameEnd::Default.resolve(true), FrameEnd::Finish);
        assert_eq!(FrameEnd::Default.resolve(false), FrameEnd::Swap);
        assert_eq!(FrameEnd::ReadPixels.resolve(true), FrameEnd::ReadPixels);
    }

    #[test]
    fn test_frame_end_parse() {
        assert_eq!("readpixels".parse::<FrameEnd>(), Ok(FrameEnd::ReadPixels));
        assert_eq!(" Finish ".parse::<FrameEnd>(), Ok(FrameEnd::Finish));
        assert!("flush".parse::<FrameEnd>().is_err());
    }

    #[test]
    fn test_pixel_to_le32() {
        assert_eq!(Pixel::new(0x11, 0x22, 0x33, 0x44).to_le32(), 0x4433_2211);
        assert_eq!(Pixel::default().to_le32(), 0);
    }

    #[test]
    fn test_format_names() {
        assert_eq!(format_name(glow::RGBA8), "GL_RGBA8");
        assert_eq!(format_name(0), "GL_NONE");
    }

    mod fakes {
        use super::super::*;
        use crate::native::{NativeDisplay, Platform};
        use std::cell::RefCell;

        pub type Events = Rc<RefCell<Vec<String>>>;

        pub struct FakeNative {
            pub events: Events,
            pub properties: WindowProperties,
            pub next_id: u64,
        }

        impl NativeState for FakeNative {
            fn name(&self) -> &'static str {
                "fake"
            }
            fn init_display(&mut self) -> bool {
                true
            }
            fn display(&self) -> NativeDisplay {
                NativeDisplay::new(Platform::Surfaceless, std::ptr::null_mut())
            }
            fn create_window(&mut self, properties: WindowProperties) -> bool {
                self.events
                    .borrow_mut()
                    .push(format!("create_window {}x{}", properties.width, properties.height));
                self.next_id += 1;
                self.properties = properties;
                true
            }
            fn window(&mut self, properties: &mut WindowProperties) -> NativeWindow {
                *properties = self.properties;
                NativeWindow::from_id(self.next_id)
            }
            fn visible(&mut self, _visible: bool) {}
            fn should_quit(&mut self) -> bool {
                false
            }
            fn flip(&mut self) {
                self.events.borrow_mut().push("flip".to_string());
            }
        }

        pub struct FakeGl {
            pub events: Events,
            pub extensions: ExtensionTable,
        }

        impl GlState for FakeGl {
            fn name(&self) -> &'static str {
                "fake-gl"
            }
            fn init_display(&mut self, _display: NativeDisplay, _requested: &VisualConfig) -> bool {
                true
            }
            fn init_surface(&mut self, window: NativeWindow) -> bool {
                self.events.borrow_mut().push(format!("init_surface {}", window.id()));
                true
            }
            fn release_surface(&mut self) {
                self.events.borrow_mut().push("release_surface".to_string());
            }
            fn valid(&mut self) -> bool {
                self.events.borrow_mut().push("valid".to_string());
                true
            }
            fn reset(&mut self) -> bool {
                true
            }
            fn swap(&mut self) {
                self.events.borrow_mut().push("swap".to_string());
            }
            fn native_config(&mut self) -> Option<i64> {
                Some(0x21)
            }
            fn visual_config(&mut self) -> Option<VisualConfig> {
                Some(VisualConfig::default())
            }
            fn gl(&self) -> Option<Rc<glow::Context>> {
                None
            }
            fn extensions(&self) -> &ExtensionTable {
                &self.extensions
            }
            fn is_desktop_gl(&self) -> bool {
                false
            }
        }
    }

    fn fake_canvas() -> (NativeCanvas, fakes::Events) {
        let events = fakes::Events::default();
        let native = fakes::FakeNative {
            events: events.clone(),
            properties: WindowProperties::default(),
            next_id: 0,
        };
        let gl = fakes::FakeGl {
            events: events.clone(),
            extensions: ExtensionTable::default(),
        };
        let canvas = NativeCanvas::new(Box::new(native), Box::new(gl), CanvasOptions::default());
        (canvas, events)
    }

    #[test]
    fn test_gl_info_follows_banner_without_repeating_it() {
        let info = GlInfo {
            api: "OpenGL ES",
            vendor: "Mesa".to_string(),
            renderer: "llvmpipe".to_string(),
            version: "OpenGL ES 3.2".to_string(),
            config: None,
            width: 800,
            height: 600,
            offscreen: true,
        };
        let lines = info.lines();

        assert_eq!(lines[0], "    OpenGL ES Information");
        assert!(lines.iter().all(|l| !l.contains("gpumark")));
        assert_eq!(lines.iter().filter(|l| l.starts_with("====")).count(), 1);
        assert_eq!(lines.last(), Some(&"=".repeat(55)));
        assert!(lines.contains(&"    Surface Size:   800x600 offscreen".to_string()));
    }

    #[test]
    fn test_resize_releases_gl_surface_before_new_window() {
        let (mut canvas, events) = fake_canvas();

        canvas.resize(800, 600);
        canvas.resize(640, 480);

        assert_eq!(
            *events.borrow(),
            vec![
                "create_window 800x600",
                "init_surface 1",
                "valid",
                "release_surface",
                "create_window 640x480",
                "init_surface 2",
                "valid",
            ]
        );
        assert_eq!((canvas.width(), canvas.height()), (640, 480));
    }

    #[test]
    fn test_resize_to_same_size_keeps_window() {
        let (mut canvas, events) = fake_canvas();

        canvas.resize(320, 200);
        events.borrow_mut().clear();
        canvas.resize(320, 200);

        assert!(events.borrow().is_empty());
    }

    #[test]
    fn test_frames_after_resize_are_presented() {
        let (mut canvas, events) = fake_canvas();

        canvas.resize(800, 600);
        canvas.resize(1024, 768);
        events.borrow_mut().clear();
        canvas.update("clear", 1);

        assert_eq!(*events.borrow(), vec!["swap", "flip"]);
    }
}
