use std::ffi::c_void;
use std::fs::{File, OpenOptions};
use std::os::fd::AsRawFd;

use super::{NativeDisplay, NativeOptions, NativeState, NativeWindow, Platform};
use crate::window::WindowProperties;

pub const KNOWN_OPTIONS: &[&str] = &["fbdev-device"];

#[cfg(target_os = "android")]
const DEFAULT_DEVICE: &str = "/dev/graphics/fb0";
#[cfg(not(target_os = "android"))]
const DEFAULT_DEVICE: &str = "/dev/fb0";

#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
pub struct FbBitfield {
    offset: u32,
    length: u32,
    msb_right: u32,
}

#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
pub struct FbVarScreeninfo {
    xres: u32,
    yres: u32,
    xres_virtual: u32,
    yres_virtual: u32,
    xoffset: u32,
    yoffset: u32,
    bits_per_pixel: u32,
    grayscale: u32,
    red: FbBitfield,
    green: FbBitfield,
    blue: FbBitfield,
    transp: FbBitfield,
    nonstd: u32,
    activate: u32,
    height: u32,
    width: u32,
    accel_flags: u32,
    pixclock: u32,
    left_margin: u32,
    right_margin: u32,
    upper_margin: u32,
    lower_margin: u32,
    hsync_len: u32,
    vsync_len: u32,
    sync: u32,
    vmode: u32,
    rotate: u32,
    colorspace: u32,
    reserved: [u32; 4],
}

nix::ioctl_read_bad!(fbioget_vscreeninfo, 0x4600, FbVarScreeninfo);

/// Native window layout expected by fbdev EGL drivers.
#[repr(C)]
struct FbdevWindow {
    width: u16,
    height: u16,
}

/// Linux framebuffer device. The EGL display is the device fd itself.
pub struct NativeStateFbdev {
    options: NativeOptions,
    file: Option<File>,
    window: Option<Box<FbdevWindow>>,
    properties: WindowProperties,
}

impl NativeStateFbdev {
    pub fn new(options: NativeOptions) -> Self {
        Self {
            options,
            file: None,
            window: None,
            properties: WindowProperties::default(),
        }
    }

    fn screen_info(&self) -> Result<FbVarScreeninfo, Box<dyn std::error::Error>> {
        let file = self.file.as_ref().ok_or("display has not been initialized")?;
        let mut info = FbVarScreeninfo::default();
        unsafe { fbioget_vscreeninfo(file.as_raw_fd(), &mut info) }
            .map_err(|e| format!("cannot get variable frame buffer info: {}", e))?;
        Ok(info)
    }
}

impl NativeState for NativeStateFbdev {
    fn name(&self) -> &'static str {
        "fbdev"
    }

    fn init_display(&mut self) -> bool {
        if self.file.is_some() {
            return true;
        }

        let path = self.options.get("fbdev-device").unwrap_or(DEFAULT_DEVICE).to_string();
        match OpenOptions::new().read(true).write(true).open(&path) {
            Ok(file) => {
                log::info!("[fbdev] Using device {}", path);
                self.file = Some(file);
                true
            }
            Err(e) => {
                log::error!("[fbdev] Cannot open framebuffer device {}: {}", path, e);
                false
            }
        }
    }

    fn display(&self) -> NativeDisplay {
        let handle = self
            .file
            .as_ref()
            .map(|f| f.as_raw_fd() as isize as *mut c_void)
            .unwrap_or(std::ptr::null_mut());
        NativeDisplay::new(Platform::Fbdev, handle)
    }

    fn create_window(&mut self, _properties: WindowProperties) -> bool {
        self.window = None;

        let info = match self.screen_info() {
            Ok(info) => info,
            Err(e) => {
                log::error!("[fbdev] {}", e);
                return false;
            }
        };

        self.properties = WindowProperties::new(info.xres as i32, info.yres as i32, true, 0);
        self.window = Some(Box::new(FbdevWindow {
            width: info.xres as u16,
            height: info.yres as u16,
        }));
        true
    }

    fn window(&mut self, properties: &mut WindowProperties) -> NativeWindow {
        *properties = self.properties;
        match self.window.as_mut() {
            Some(window) => NativeWindow {
                handle: window.as_mut() as *mut FbdevWindow as *mut c_void,
            },
            None => NativeWindow::null(),
        }
    }

    fn visible(&mut self, _visible: bool) {}

    fn should_quit(&mut self) -> bool {
        self.options.quit.is_set()
    }

    fn flip(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_screeninfo_matches_kernel_layout() {
        assert_eq!(std::mem::size_of::<FbVarScreeninfo>(), 160);
    }

    #[test]
    fn test_missing_device_fails_cleanly() {
        let options = NativeOptions {
            winsys_options: vec![("fbdev-device".into(), "/nonexistent/fb9".into())],
            ..NativeOptions::default()
        };
        let mut native = NativeStateFbdev::new(options);
        assert!(!native.init_display());
        assert!(!native.create_window(WindowProperties::default()));
        assert!(native.display().handle.is_null());
    }
}
