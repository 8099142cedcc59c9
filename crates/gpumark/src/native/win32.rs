use std::ffi::c_void;

use windows::core::{w, PCWSTR};
use windows::Win32::Foundation::{HINSTANCE, HWND, LPARAM, LRESULT, RECT, WPARAM};
use windows::Win32::Graphics::Gdi::{GetDC, ReleaseDC, HBRUSH, HDC};
use windows::Win32::System::LibraryLoader::GetModuleHandleW;
use windows::Win32::UI::Input::KeyboardAndMouse::VK_ESCAPE;
use windows::Win32::UI::WindowsAndMessaging::*;

use super::{NativeDisplay, NativeOptions, NativeState, NativeWindow, Platform};
use crate::quit::QuitFlag;
use crate::window::WindowProperties;

const CLASS_NAME: PCWSTR = w!("gpumark");
const INITIAL_SIZE: i32 = 128;

/// Top-level Win32 window; its device context doubles as the EGL display.
pub struct NativeStateWin32 {
    options: NativeOptions,
    hwnd: HWND,
    hdc: HDC,
    quit: Box<QuitFlag>,
    properties: WindowProperties,
}

impl NativeStateWin32 {
    pub fn new(options: NativeOptions) -> Self {
        let quit = Box::new(options.quit.clone());
        Self {
            options,
            hwnd: HWND::default(),
            hdc: HDC::default(),
            quit,
            properties: WindowProperties::default(),
        }
    }

    fn style() -> WINDOW_STYLE {
        WS_CAPTION | WS_THICKFRAME | WS_MINIMIZEBOX | WS_MAXIMIZEBOX | WS_SYSMENU
    }

    fn open(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        unsafe {
            let hinstance = GetModuleHandleW(None)?;

            let wc = WNDCLASSEXW {
                cbSize: std::mem::size_of::<WNDCLASSEXW>() as u32,
                style: CS_OWNDC,
                lpfnWndProc: Some(wnd_proc),
                cbClsExtra: 0,
                cbWndExtra: 0,
                hInstance: HINSTANCE::from(hinstance),
                hIcon: HICON::default(),
                hCursor: LoadCursorW(None, IDC_ARROW).unwrap_or_default(),
                hbrBackground: HBRUSH::default(),
                lpszMenuName: PCWSTR::null(),
                lpszClassName: CLASS_NAME,
                hIconSm: HICON::default(),
            };
            RegisterClassExW(&wc);

            let mut rect = RECT {
                left: 0,
                top: 0,
                right: INITIAL_SIZE,
                bottom: INITIAL_SIZE,
            };
            AdjustWindowRectEx(&mut rect, Self::style(), false, WS_EX_APPWINDOW)?;

            let quit_ptr: *const QuitFlag = &*self.quit;
            let hwnd = CreateWindowExW(
                WS_EX_APPWINDOW,
                CLASS_NAME,
                w!("gpumark"),
                Self::style(),
                CW_USEDEFAULT,
                CW_USEDEFAULT,
                rect.right - rect.left,
                rect.bottom - rect.top,
                None,
                None,
                HINSTANCE::from(hinstance),
                Some(quit_ptr as *const c_void),
            );
            if hwnd.0 == 0 {
                return Err("CreateWindowExW failed".into());
            }
            self.hwnd = hwnd;

            let hdc = GetDC(hwnd);
            if hdc.is_invalid() {
                return Err("GetDC failed".into());
            }
            self.hdc = hdc;
        }
        Ok(())
    }

    fn cleanup(&mut self) {
        unsafe {
            if !self.hdc.is_invalid() {
                ReleaseDC(self.hwnd, self.hdc);
                self.hdc = HDC::default();
            }
            if self.hwnd.0 != 0 {
                let _ = DestroyWindow(self.hwnd);
                self.hwnd = HWND::default();
            }
        }
    }

    fn pump_messages(&self) {
        unsafe {
            let mut msg = MSG::default();
            while PeekMessageW(&mut msg, None, 0, 0, PM_REMOVE).as_bool() {
                let _ = TranslateMessage(&msg);
                DispatchMessageW(&msg);
            }
        }
    }
}

impl NativeState for NativeStateWin32 {
    fn name(&self) -> &'static str {
        "win32"
    }

    fn init_display(&mut self) -> bool {
        if !self.hdc.is_invalid() {
            return true;
        }

        match self.open() {
            Ok(()) => true,
            Err(e) => {
                log::error!("[win32] Failed to create window: {}", e);
                self.cleanup();
                false
            }
        }
    }

    fn display(&self) -> NativeDisplay {
        NativeDisplay::new(Platform::Windows, self.hdc.0 as *mut c_void)
    }

    fn create_window(&mut self, properties: WindowProperties) -> bool {
        if self.hwnd.0 == 0 {
            log::error!("[win32] Display has not been initialized");
            return false;
        }

        let mut props = properties;
        if props.fullscreen || !props.has_valid_size() {
            props.fullscreen = true;
            props.width = unsafe { GetSystemMetrics(SM_CXSCREEN) };
            props.height = unsafe { GetSystemMetrics(SM_CYSCREEN) };
        }

        let result = unsafe {
            let mut window_rect = RECT::default();
            let mut client_rect = RECT::default();
            GetWindowRect(self.hwnd, &mut window_rect)
                .and_then(|_| GetClientRect(self.hwnd, &mut client_rect))
                .and_then(|_| {
                    let dx = (window_rect.right - window_rect.left) - client_rect.right;
                    let dy = (window_rect.bottom - window_rect.top) - client_rect.bottom;
                    MoveWindow(
                        self.hwnd,
                        window_rect.left,
                        window_rect.top,
                        props.width + dx,
                        props.height + dy,
                        true,
                    )
                })
        };

        if let Err(e) = result {
            log::error!("[win32] Failed to resize window: {}", e);
            return false;
        }

        self.properties = props;
        true
    }

    fn window(&mut self, properties: &mut WindowProperties) -> NativeWindow {
        *properties = self.properties;
        NativeWindow {
            handle: self.hwnd.0 as *mut c_void,
        }
    }

    fn visible(&mut self, visible: bool) {
        if self.hwnd.0 != 0 {
            let cmd = if visible { SW_SHOW } else { SW_HIDE };
            unsafe {
                ShowWindow(self.hwnd, cmd);
            }
        }
    }

    fn should_quit(&mut self) -> bool {
        self.pump_messages();
        self.options.quit.is_set()
    }

    fn flip(&mut self) {
        self.pump_messages();
    }
}

impl Drop for NativeStateWin32 {
    fn drop(&mut self) {
        self.cleanup();
    }
}

unsafe extern "system" fn wnd_proc(hwnd: HWND, msg: u32, wparam: WPARAM, lparam: LPARAM) -> LRESULT {
    if msg == WM_NCCREATE {
        let create = lparam.0 as *const CREATESTRUCTW;
        if !create.is_null() {
            SetWindowLongPtrW(hwnd, GWLP_USERDATA, (*create).lpCreateParams as isize);
        }
        return DefWindowProcW(hwnd, msg, wparam, lparam);
    }

    let quit = GetWindowLongPtrW(hwnd, GWLP_USERDATA) as *const QuitFlag;
    if !quit.is_null() {
        match msg {
            WM_CLOSE | WM_DESTROY => (*quit).request(),
            WM_KEYDOWN if wparam.0 as u16 == VK_ESCAPE.0 => (*quit).request(),
            _ => {}
        }
    }

    DefWindowProcW(hwnd, msg, wparam, lparam)
}
