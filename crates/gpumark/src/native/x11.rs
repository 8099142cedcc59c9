use std::ffi::{c_void, CString};
use std::os::raw::{c_int, c_uint};

use x11_dl::keysym;
use x11_dl::xlib;

use super::{NativeDisplay, NativeOptions, NativeState, NativeWindow, Platform};
use crate::window::WindowProperties;

pub const KNOWN_OPTIONS: &[&str] = &["display"];

const WINDOW_NAME: &str = "gpumark";

/// Xlib window, shared by the EGL and GLX context backends.
pub struct NativeStateX11 {
    options: NativeOptions,
    xlib: Option<xlib::Xlib>,
    display: *mut xlib::Display,
    window: xlib::Window,
    colormap: xlib::Colormap,
    wm_delete: xlib::Atom,
    properties: WindowProperties,
    closed: bool,
}

impl NativeStateX11 {
    pub fn new(options: NativeOptions) -> Self {
        Self {
            options,
            xlib: None,
            display: std::ptr::null_mut(),
            window: 0,
            colormap: 0,
            wm_delete: 0,
            properties: WindowProperties::default(),
            closed: false,
        }
    }

    fn open(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        let xlib = xlib::Xlib::open().map_err(|e| format!("Failed to load libX11: {}", e))?;

        let name = self.options.get("display").map(CString::new).transpose()?;
        let display = unsafe {
            (xlib.XOpenDisplay)(name.as_ref().map_or(std::ptr::null(), |n| n.as_ptr()))
        };
        if display.is_null() {
            return Err("Failed to open X display".into());
        }

        self.display = display;
        self.xlib = Some(xlib);
        Ok(())
    }

    fn destroy_window(&mut self) {
        let Some(xlib) = &self.xlib else {
            return;
        };

        unsafe {
            if self.window != 0 {
                (xlib.XDestroyWindow)(self.display, self.window);
                self.window = 0;
            }
            if self.colormap != 0 {
                (xlib.XFreeColormap)(self.display, self.colormap);
                self.colormap = 0;
            }
        }
    }

    fn intern(&self, xlib: &xlib::Xlib, name: &str) -> Result<xlib::Atom, Box<dyn std::error::Error>> {
        let name = CString::new(name)?;
        Ok(unsafe { (xlib.XInternAtom)(self.display, name.as_ptr(), xlib::False) })
    }

    fn build_window(&mut self, properties: WindowProperties) -> Result<(), Box<dyn std::error::Error>> {
        let xlib = self.xlib.as_ref().ok_or("X11 display has not been initialized")?;
        let dpy = self.display;

        let mut props = properties;
        let screen = unsafe { (xlib.XDefaultScreen)(dpy) };
        let root = unsafe { (xlib.XRootWindow)(dpy, screen) };

        if props.fullscreen || !props.has_valid_size() {
            props.fullscreen = true;
            props.width = unsafe { (xlib.XDisplayWidth)(dpy, screen) };
            props.height = unsafe { (xlib.XDisplayHeight)(dpy, screen) };
        }

        let (visual, depth, visual_id) = unsafe {
            let mut template: xlib::XVisualInfo = std::mem::zeroed();
            template.visualid = props.visual_id as xlib::VisualID;
            let mut count: c_int = 0;
            let info = if props.visual_id != 0 {
                (xlib.XGetVisualInfo)(dpy, xlib::VisualIDMask, &mut template, &mut count)
            } else {
                std::ptr::null_mut()
            };

            if info.is_null() || count == 0 {
                if props.visual_id != 0 {
                    log::warn!("[x11] Visual 0x{:x} not found, using default", props.visual_id);
                }
                let visual = (xlib.XDefaultVisual)(dpy, screen);
                let depth = (xlib.XDefaultDepth)(dpy, screen);
                (visual, depth, (xlib.XVisualIDFromVisual)(visual))
            } else {
                let found = (*info).visual;
                let depth = (*info).depth;
                let id = (*info).visualid;
                (xlib.XFree)(info as *mut c_void);
                (found, depth, id)
            }
        };

        log::debug!(
            "[x11] Creating window {}x{} visual 0x{:x}",
            props.width,
            props.height,
            visual_id
        );

        let wm_delete = self.intern(xlib, "WM_DELETE_WINDOW")?;
        let net_wm_state = self.intern(xlib, "_NET_WM_STATE")?;
        let fullscreen_atom = self.intern(xlib, "_NET_WM_STATE_FULLSCREEN")?;
        let title = CString::new(WINDOW_NAME)?;

        let (window, colormap) = unsafe {
            let colormap = (xlib.XCreateColormap)(dpy, root, visual, xlib::AllocNone);

            let mut attr: xlib::XSetWindowAttributes = std::mem::zeroed();
            attr.background_pixel = 0;
            attr.border_pixel = 0;
            attr.colormap = colormap;
            attr.event_mask = xlib::KeyPressMask | xlib::StructureNotifyMask;
            let mask = xlib::CWBackPixel | xlib::CWBorderPixel | xlib::CWColormap | xlib::CWEventMask;

            let window = (xlib.XCreateWindow)(
                dpy,
                root,
                0,
                0,
                props.width as c_uint,
                props.height as c_uint,
                0,
                depth,
                xlib::InputOutput as c_uint,
                visual,
                mask,
                &mut attr,
            );
            (window, colormap)
        };

        if window == 0 {
            unsafe { (xlib.XFreeColormap)(dpy, colormap) };
            return Err("XCreateWindow failed".into());
        }

        unsafe {
            if props.fullscreen {
                let atoms = [fullscreen_atom];
                (xlib.XChangeProperty)(
                    dpy,
                    window,
                    net_wm_state,
                    xlib::XA_ATOM,
                    32,
                    xlib::PropModeReplace,
                    atoms.as_ptr() as *const u8,
                    1,
                );
            } else {
                let mut hints: xlib::XSizeHints = std::mem::zeroed();
                hints.min_width = props.width;
                hints.min_height = props.height;
                hints.max_width = props.width;
                hints.max_height = props.height;
                hints.flags = xlib::PMinSize | xlib::PMaxSize;
                (xlib.XSetWMNormalHints)(dpy, window, &mut hints);
            }

            (xlib.XStoreName)(dpy, window, title.as_ptr());

            let mut protocols = [wm_delete];
            (xlib.XSetWMProtocols)(dpy, window, protocols.as_mut_ptr(), 1);
        }

        props.visual_id = visual_id as i64;
        self.window = window;
        self.colormap = colormap;
        self.wm_delete = wm_delete;
        self.properties = props;
        Ok(())
    }

    fn process_events(&mut self) {
        let Some(xlib) = &self.xlib else {
            return;
        };

        unsafe {
            while (xlib.XPending)(self.display) > 0 {
                let mut event: xlib::XEvent = std::mem::zeroed();
                (xlib.XNextEvent)(self.display, &mut event);

                match event.get_type() {
                    xlib::KeyPress => {
                        let sym = (xlib.XLookupKeysym)(&mut event.key, 0);
                        if sym == keysym::XK_Escape as xlib::KeySym {
                            self.closed = true;
                        }
                    }
                    xlib::ClientMessage => {
                        let atom = event.client_message.data.get_long(0) as xlib::Atom;
                        if atom == self.wm_delete {
                            self.closed = true;
                        }
                    }
                    _ => {}
                }
            }
        }
    }
}

impl NativeState for NativeStateX11 {
    fn name(&self) -> &'static str {
        "x11"
    }

    fn init_display(&mut self) -> bool {
        if !self.display.is_null() {
            return true;
        }

        match self.open() {
            Ok(()) => true,
            Err(e) => {
                log::error!("[x11] {}", e);
                false
            }
        }
    }

    fn display(&self) -> NativeDisplay {
        NativeDisplay::new(Platform::X11, self.display as *mut c_void)
    }

    fn create_window(&mut self, properties: WindowProperties) -> bool {
        self.destroy_window();

        match self.build_window(properties) {
            Ok(()) => true,
            Err(e) => {
                log::error!("[x11] Failed to create window: {}", e);
                false
            }
        }
    }

    fn window(&mut self, properties: &mut WindowProperties) -> NativeWindow {
        if self.window == 0 {
            return NativeWindow::null();
        }
        *properties = self.properties;
        NativeWindow::from_id(self.window as u64)
    }

    fn visible(&mut self, visible: bool) {
        let Some(xlib) = &self.xlib else {
            return;
        };
        if visible && self.window != 0 {
            unsafe {
                (xlib.XMapWindow)(self.display, self.window);
                (xlib.XFlush)(self.display);
            }
        }
    }

    fn should_quit(&mut self) -> bool {
        self.process_events();
        self.closed || self.options.quit.is_set()
    }

    fn flip(&mut self) {}
}

impl Drop for NativeStateX11 {
    fn drop(&mut self) {
        self.destroy_window();
        if let Some(xlib) = &self.xlib {
            if !self.display.is_null() {
                unsafe { (xlib.XCloseDisplay)(self.display) };
                self.display = std::ptr::null_mut();
            }
        }
    }
}

