use std::ffi::c_void;
use std::fmt;
use std::str::FromStr;

use crate::quit::QuitFlag;
use crate::swap_chain::SwapMode;
use crate::window::WindowProperties;

#[cfg(target_os = "android")]
pub mod android;
#[cfg(feature = "drm")]
pub mod drm;
#[cfg(feature = "fbdev")]
pub mod fbdev;
pub mod null;
#[cfg(target_os = "nto")]
pub mod qnx;
#[cfg(feature = "wayland")]
pub mod wayland;
#[cfg(windows)]
pub mod win32;
#[cfg(feature = "x11")]
pub mod x11;

/// Which EGL platform (or GLX) a native display handle belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Gbm,
    Wayland,
    X11,
    Android,
    Windows,
    Qnx,
    Fbdev,
    Surfaceless,
}

#[derive(Debug, Clone, Copy)]
pub struct NativeDisplay {
    pub platform: Platform,
    pub handle: *mut c_void,
}

impl NativeDisplay {
    pub fn new(platform: Platform, handle: *mut c_void) -> Self {
        Self { platform, handle }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct NativeWindow {
    pub handle: *mut c_void,
}

impl NativeWindow {
    pub fn null() -> Self {
        Self {
            handle: std::ptr::null_mut(),
        }
    }

    pub fn from_id(id: u64) -> Self {
        Self {
            handle: id as usize as *mut c_void,
        }
    }

    pub fn is_null(&self) -> bool {
        self.handle.is_null()
    }

    /// Window-system ids (X11 XIDs) travel in the handle field.
    pub fn id(&self) -> u64 {
        self.handle as usize as u64
    }
}

/// Native display and window ownership for one backend.
///
/// Failures are logged and reported through the return values; once the
/// benchmark runs, fatal external conditions only surface through
/// [`NativeState::should_quit`].
pub trait NativeState {
    fn name(&self) -> &'static str;

    /// Connects to the display server or opens the device. Repeated calls
    /// after a success do nothing and return true.
    fn init_display(&mut self) -> bool;

    fn display(&self) -> NativeDisplay;

    /// Creates the native surface, replacing (and first destroying) any
    /// previous one.
    fn create_window(&mut self, properties: WindowProperties) -> bool;

    /// Returns the native window and writes the properties the window system
    /// actually granted into `properties`.
    fn window(&mut self, properties: &mut WindowProperties) -> NativeWindow;

    fn visible(&mut self, visible: bool);

    fn should_quit(&mut self) -> bool;

    /// Called after every rendered frame has been handed to the GPU API.
    fn flip(&mut self);
}

/// Window system selected on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Winsys {
    Drm,
    Wayland,
    X11,
    X11Glx,
    Fbdev,
    Null,
    Win32,
    Qnx,
}

impl Winsys {
    pub const ALL: [Winsys; 8] = [
        Winsys::Drm,
        Winsys::Wayland,
        Winsys::X11,
        Winsys::X11Glx,
        Winsys::Fbdev,
        Winsys::Null,
        Winsys::Win32,
        Winsys::Qnx,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Winsys::Drm => "drm",
            Winsys::Wayland => "wayland",
            Winsys::X11 => "x11",
            Winsys::X11Glx => "x11-glx",
            Winsys::Fbdev => "fbdev",
            Winsys::Null => "null",
            Winsys::Win32 => "win32",
            Winsys::Qnx => "qnx",
        }
    }

    pub fn is_compiled(&self) -> bool {
        match self {
            Winsys::Drm => cfg!(feature = "drm"),
            Winsys::Wayland => cfg!(feature = "wayland"),
            Winsys::X11 => cfg!(feature = "x11"),
            Winsys::X11Glx => cfg!(feature = "glx"),
            Winsys::Fbdev => cfg!(feature = "fbdev"),
            Winsys::Null => true,
            Winsys::Win32 => cfg!(windows),
            Winsys::Qnx => cfg!(target_os = "nto"),
        }
    }

    pub fn uses_glx(&self) -> bool {
        *self == Winsys::X11Glx
    }

    pub fn available() -> Vec<Winsys> {
        Self::ALL.into_iter().filter(Winsys::is_compiled).collect()
    }

    /// Picks a window system from the environment: a running compositor or
    /// X server first, then direct kernel display access.
    pub fn detect() -> Winsys {
        let wayland = std::env::var_os("WAYLAND_DISPLAY").is_some();
        let x11 = std::env::var_os("DISPLAY").is_some();

        let preferred = if wayland {
            [Winsys::Wayland, Winsys::X11, Winsys::Drm]
        } else if x11 {
            [Winsys::X11, Winsys::Wayland, Winsys::Drm]
        } else {
            [Winsys::Drm, Winsys::Wayland, Winsys::X11]
        };

        preferred
            .into_iter()
            .chain([Winsys::Win32, Winsys::Qnx, Winsys::Fbdev])
            .find(Winsys::is_compiled)
            .unwrap_or(Winsys::Null)
    }
}

impl fmt::Display for Winsys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Winsys {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|w| w.as_str() == s)
            .ok_or_else(|| format!("unknown window system '{}'", s))
    }
}

/// Settings every backend receives from the command line and config file.
#[derive(Debug, Clone, Default)]
pub struct NativeOptions {
    pub swap_mode: SwapMode,
    pub winsys_options: Vec<(String, String)>,
    pub quit: QuitFlag,
}

impl NativeOptions {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.winsys_options
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    fn warn_unknown(&self, winsys: Winsys, known: &[&str]) {
        for (key, _) in &self.winsys_options {
            if !known.contains(&key.as_str()) {
                log::warn!("Unknown {} winsys option '{}'", winsys, key);
            }
        }
    }
}

pub fn create(
    winsys: Winsys,
    options: NativeOptions,
) -> Result<Box<dyn NativeState>, Box<dyn std::error::Error>> {
    if !winsys.is_compiled() {
        return Err(format!("Window system '{}' is not supported by this build", winsys).into());
    }

    match winsys {
        #[cfg(feature = "drm")]
        Winsys::Drm => {
            options.warn_unknown(winsys, drm::KNOWN_OPTIONS);
            Ok(Box::new(drm::NativeStateDrm::new(options)))
        }
        #[cfg(feature = "wayland")]
        Winsys::Wayland => {
            options.warn_unknown(winsys, &[]);
            Ok(Box::new(wayland::NativeStateWayland::new(options)))
        }
        #[cfg(feature = "x11")]
        Winsys::X11 | Winsys::X11Glx => {
            options.warn_unknown(winsys, x11::KNOWN_OPTIONS);
            Ok(Box::new(x11::NativeStateX11::new(options)))
        }
        #[cfg(feature = "fbdev")]
        Winsys::Fbdev => {
            options.warn_unknown(winsys, fbdev::KNOWN_OPTIONS);
            Ok(Box::new(fbdev::NativeStateFbdev::new(options)))
        }
        #[cfg(windows)]
        Winsys::Win32 => {
            options.warn_unknown(winsys, &[]);
            Ok(Box::new(win32::NativeStateWin32::new(options)))
        }
        #[cfg(target_os = "nto")]
        Winsys::Qnx => {
            options.warn_unknown(winsys, &[]);
            Ok(Box::new(qnx::NativeStateQnx::new(options)))
        }
        Winsys::Null => {
            options.warn_unknown(winsys, &[]);
            Ok(Box::new(null::NativeStateNull::new(options)))
        }
        #[allow(unreachable_patterns)]
        _ => Err(format!("Window system '{}' is not supported by this build", winsys).into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_winsys_names_round_trip() {
        for winsys in Winsys::ALL {
            assert_eq!(winsys.as_str().parse::<Winsys>(), Ok(winsys));
        }
        assert!("sdl".parse::<Winsys>().is_err());
    }

    #[test]
    fn test_null_is_always_available() {
        assert!(Winsys::available().contains(&Winsys::Null));
        let native = create(Winsys::Null, NativeOptions::default()).unwrap();
        assert_eq!(native.name(), "null");
    }

    #[test]
    fn test_later_winsys_options_win() {
        let options = NativeOptions {
            winsys_options: vec![
                ("drm-device".into(), "/dev/dri/card0".into()),
                ("drm-device".into(), "/dev/dri/card1".into()),
            ],
            ..NativeOptions::default()
        };
        assert_eq!(options.get("drm-device"), Some("/dev/dri/card1"));
        assert_eq!(options.get("missing"), None);
    }

    #[test]
    fn test_window_id_round_trip() {
        let window = NativeWindow::from_id(0x4a0000b);
        assert_eq!(window.id(), 0x4a0000b);
        assert!(NativeWindow::null().is_null());
    }
}
