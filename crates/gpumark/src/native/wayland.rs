use std::ffi::c_void;

use wayland_client::protocol::{wl_compositor, wl_output, wl_region, wl_registry, wl_surface};
use wayland_client::{Connection, Dispatch, EventQueue, Proxy, QueueHandle, WEnum};
use wayland_egl::WlEglSurface;
use wayland_protocols::xdg::shell::client::{xdg_surface, xdg_toplevel, xdg_wm_base};

use super::{NativeDisplay, NativeOptions, NativeState, NativeWindow, Platform};
use crate::window::WindowProperties;

const APP_ID: &str = "org.gpumark.gpumark";

struct Output {
    output: wl_output::WlOutput,
    width: i32,
    height: i32,
    refresh: i32,
    scale: i32,
}

/// Protocol state updated by the event queue.
struct WaylandState {
    compositor: Option<wl_compositor::WlCompositor>,
    wm_base: Option<xdg_wm_base::XdgWmBase>,
    outputs: Vec<Output>,
    properties: WindowProperties,
    waiting_for_configure: bool,
    resized: bool,
    closed: bool,
}

impl WaylandState {
    fn new() -> Self {
        Self {
            compositor: None,
            wm_base: None,
            outputs: Vec::new(),
            properties: WindowProperties::default(),
            waiting_for_configure: false,
            resized: false,
            closed: false,
        }
    }

    fn output_scale(&self) -> i32 {
        self.outputs.first().map(|o| o.scale).unwrap_or(1)
    }
}

struct Window {
    surface: wl_surface::WlSurface,
    xdg_surface: xdg_surface::XdgSurface,
    toplevel: xdg_toplevel::XdgToplevel,
    egl: Option<WlEglSurface>,
}

impl Drop for Window {
    fn drop(&mut self) {
        self.egl.take();
        self.toplevel.destroy();
        self.xdg_surface.destroy();
        self.surface.destroy();
    }
}

/// xdg-shell client rendering through a `wl_egl_window`.
pub struct NativeStateWayland {
    options: NativeOptions,
    conn: Option<Connection>,
    queue: Option<EventQueue<WaylandState>>,
    state: WaylandState,
    window: Option<Window>,
}

impl NativeStateWayland {
    pub fn new(options: NativeOptions) -> Self {
        Self {
            options,
            conn: None,
            queue: None,
            state: WaylandState::new(),
            window: None,
        }
    }

    fn connect(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        let conn = Connection::connect_to_env()?;
        let mut queue = conn.new_event_queue();
        let qh = queue.handle();

        let _registry = conn.display().get_registry(&qh, ());
        queue.roundtrip(&mut self.state)?;
        // Outputs bound during the first roundtrip report their modes in the second.
        queue.roundtrip(&mut self.state)?;

        if self.state.compositor.is_none() {
            return Err("compositor does not advertise wl_compositor".into());
        }
        if self.state.wm_base.is_none() {
            return Err("compositor does not advertise xdg_wm_base".into());
        }

        for output in &self.state.outputs {
            log::debug!(
                "[wayland] Output {}x{}@{}mHz scale {}",
                output.width,
                output.height,
                output.refresh,
                output.scale
            );
        }

        self.conn = Some(conn);
        self.queue = Some(queue);
        Ok(())
    }

    fn build_window(&mut self, properties: WindowProperties) -> Result<(), Box<dyn std::error::Error>> {
        let queue = self.queue.as_mut().ok_or("display has not been initialized")?;
        let qh = queue.handle();
        let (Some(compositor), Some(wm_base)) =
            (self.state.compositor.clone(), self.state.wm_base.clone())
        else {
            return Err("display has not been initialized".into());
        };

        let surface = compositor.create_surface(&qh, ());
        let xdg_surface = wm_base.get_xdg_surface(&surface, &qh, ());
        let toplevel = xdg_surface.get_toplevel(&qh, ());
        toplevel.set_app_id(APP_ID.to_string());
        toplevel.set_title("gpumark".to_string());

        let output = self.state.outputs.first().map(|o| o.output.clone());
        if properties.fullscreen {
            toplevel.set_fullscreen(output.as_ref());
        }
        surface.commit();

        self.state.properties = properties;
        self.state.waiting_for_configure = true;
        while self.state.waiting_for_configure && !self.state.closed {
            queue.roundtrip(&mut self.state)?;
        }
        self.state.resized = false;

        if self.state.properties.fullscreen {
            if let Some(first) = self.state.outputs.first() {
                if !self.state.properties.has_valid_size() {
                    self.state.properties.width = first.width * first.scale;
                    self.state.properties.height = first.height * first.scale;
                }
                if first.output.version() >= 2 {
                    surface.set_buffer_scale(first.scale);
                }
            }
        }

        let props = self.state.properties;
        if !props.has_valid_size() {
            return Err(format!("invalid window size {}x{}", props.width, props.height).into());
        }

        let egl = WlEglSurface::new(surface.id(), props.width, props.height)
            .map_err(|e| format!("wl_egl_window_create: {:?}", e))?;
        set_opaque(&compositor, &surface, &qh, props.width, props.height);

        log::info!(
            "[wayland] Window {}x{}{}",
            props.width,
            props.height,
            if props.fullscreen { " fullscreen" } else { "" }
        );

        self.window = Some(Window {
            surface,
            xdg_surface,
            toplevel,
            egl: Some(egl),
        });
        Ok(())
    }

    fn apply_resize(&mut self) {
        if !self.state.resized {
            return;
        }
        self.state.resized = false;

        let (Some(window), Some(queue), Some(compositor)) =
            (&self.window, &self.queue, &self.state.compositor)
        else {
            return;
        };

        let props = self.state.properties;
        if !props.has_valid_size() {
            return;
        }
        if let Some(egl) = &window.egl {
            egl.resize(props.width, props.height, 0, 0);
        }
        set_opaque(compositor, &window.surface, &queue.handle(), props.width, props.height);
    }
}

fn set_opaque(
    compositor: &wl_compositor::WlCompositor,
    surface: &wl_surface::WlSurface,
    qh: &QueueHandle<WaylandState>,
    width: i32,
    height: i32,
) {
    let region = compositor.create_region(qh, ());
    region.add(0, 0, width, height);
    surface.set_opaque_region(Some(&region));
    region.destroy();
}

impl NativeState for NativeStateWayland {
    fn name(&self) -> &'static str {
        "wayland"
    }

    fn init_display(&mut self) -> bool {
        if self.conn.is_some() {
            return true;
        }

        match self.connect() {
            Ok(()) => true,
            Err(e) => {
                log::error!("[wayland] Failed to connect to compositor: {}", e);
                self.state = WaylandState::new();
                false
            }
        }
    }

    fn display(&self) -> NativeDisplay {
        let handle = self
            .conn
            .as_ref()
            .map(|conn| conn.backend().display_ptr() as *mut c_void)
            .unwrap_or(std::ptr::null_mut());
        NativeDisplay::new(Platform::Wayland, handle)
    }

    fn create_window(&mut self, properties: WindowProperties) -> bool {
        self.window.take();

        match self.build_window(properties) {
            Ok(()) => true,
            Err(e) => {
                log::error!("[wayland] Failed to create window: {}", e);
                self.window.take();
                false
            }
        }
    }

    fn window(&mut self, properties: &mut WindowProperties) -> NativeWindow {
        match self.window.as_ref().and_then(|w| w.egl.as_ref()) {
            Some(egl) => {
                *properties = self.state.properties;
                NativeWindow {
                    handle: egl.ptr() as *mut c_void,
                }
            }
            None => NativeWindow::null(),
        }
    }

    fn visible(&mut self, _visible: bool) {}

    fn should_quit(&mut self) -> bool {
        self.state.closed || self.options.quit.is_set()
    }

    fn flip(&mut self) {
        let Some(queue) = self.queue.as_mut() else {
            return;
        };

        if let Err(e) = queue.roundtrip(&mut self.state) {
            log::error!("[wayland] Lost connection to compositor: {}", e);
            self.state.closed = true;
            return;
        }
        self.apply_resize();
    }
}

impl Drop for NativeStateWayland {
    fn drop(&mut self) {
        self.window.take();
        if let Some(wm_base) = self.state.wm_base.take() {
            wm_base.destroy();
        }
        for output in self.state.outputs.drain(..) {
            if output.output.version() >= 3 {
                output.output.release();
            }
        }
        if let Some(conn) = &self.conn {
            conn.flush().ok();
        }
    }
}

impl Dispatch<wl_registry::WlRegistry, ()> for WaylandState {
    fn event(
        state: &mut Self,
        registry: &wl_registry::WlRegistry,
        event: wl_registry::Event,
        _data: &(),
        _conn: &Connection,
        qh: &QueueHandle<Self>,
    ) {
        if let wl_registry::Event::Global { name, interface, version } = event {
            match interface.as_str() {
                "wl_compositor" => {
                    state.compositor = Some(registry.bind(name, version.min(4), qh, ()));
                }
                "xdg_wm_base" => {
                    state.wm_base = Some(registry.bind(name, version.min(2), qh, ()));
                }
                "wl_output" => {
                    let index = state.outputs.len();
                    let output = registry.bind(name, version.min(3), qh, index);
                    state.outputs.push(Output {
                        output,
                        width: 0,
                        height: 0,
                        refresh: 0,
                        scale: 1,
                    });
                }
                _ => {}
            }
        }
    }
}

impl Dispatch<wl_output::WlOutput, usize> for WaylandState {
    fn event(
        state: &mut Self,
        _proxy: &wl_output::WlOutput,
        event: wl_output::Event,
        index: &usize,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
    ) {
        let Some(output) = state.outputs.get_mut(*index) else {
            return;
        };

        match event {
            wl_output::Event::Mode { flags, width, height, refresh } => {
                let current = matches!(flags, WEnum::Value(f) if f.contains(wl_output::Mode::Current));
                if current {
                    output.width = width;
                    output.height = height;
                    output.refresh = refresh;
                }
            }
            wl_output::Event::Scale { factor } => {
                output.scale = factor;
            }
            _ => {}
        }
    }
}

impl Dispatch<xdg_wm_base::XdgWmBase, ()> for WaylandState {
    fn event(
        _state: &mut Self,
        wm_base: &xdg_wm_base::XdgWmBase,
        event: xdg_wm_base::Event,
        _data: &(),
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
    ) {
        if let xdg_wm_base::Event::Ping { serial } = event {
            wm_base.pong(serial);
        }
    }
}

impl Dispatch<xdg_surface::XdgSurface, ()> for WaylandState {
    fn event(
        state: &mut Self,
        xdg_surface: &xdg_surface::XdgSurface,
        event: xdg_surface::Event,
        _data: &(),
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
    ) {
        if let xdg_surface::Event::Configure { serial } = event {
            xdg_surface.ack_configure(serial);
            state.waiting_for_configure = false;
        }
    }
}

impl Dispatch<xdg_toplevel::XdgToplevel, ()> for WaylandState {
    fn event(
        state: &mut Self,
        _toplevel: &xdg_toplevel::XdgToplevel,
        event: xdg_toplevel::Event,
        _data: &(),
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
    ) {
        match event {
            xdg_toplevel::Event::Configure { width, height, states } => {
                let fullscreen = states
                    .chunks_exact(4)
                    .filter_map(|c| c.try_into().ok().map(u32::from_ne_bytes))
                    .any(|s| s == xdg_toplevel::State::Fullscreen as u32);

                let (mut width, mut height) = (width, height);
                if fullscreen {
                    let scale = state.output_scale();
                    width *= scale;
                    height *= scale;
                }

                let props = &mut state.properties;
                let unchanged = fullscreen == props.fullscreen
                    && (width == 0 || width == props.width)
                    && (height == 0 || height == props.height);
                if unchanged {
                    return;
                }

                props.fullscreen = fullscreen;
                if width > 0 {
                    props.width = width;
                }
                if height > 0 {
                    props.height = height;
                }
                state.resized = true;
            }
            xdg_toplevel::Event::Close => {
                state.closed = true;
            }
            _ => {}
        }
    }
}

impl Dispatch<wl_compositor::WlCompositor, ()> for WaylandState {
    fn event(
        _state: &mut Self,
        _proxy: &wl_compositor::WlCompositor,
        _event: wl_compositor::Event,
        _data: &(),
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
    ) {}
}

impl Dispatch<wl_surface::WlSurface, ()> for WaylandState {
    fn event(
        _state: &mut Self,
        _proxy: &wl_surface::WlSurface,
        _event: wl_surface::Event,
        _data: &(),
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
    ) {}
}

impl Dispatch<wl_region::WlRegion, ()> for WaylandState {
    fn event(
        _state: &mut Self,
        _proxy: &wl_region::WlRegion,
        _event: wl_region::Event,
        _data: &(),
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
    ) {}
}
