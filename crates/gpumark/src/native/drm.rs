use std::fs::{File, OpenOptions};
use std::os::fd::{AsFd, BorrowedFd};
use std::path::{Path, PathBuf};
use std::rc::Rc;

use drm::control::{connector, crtc, framebuffer, Device as ControlDevice, Mode, ModeTypeFlags};
use drm::control::{Event, PageFlipFlags};
use drm::{Device as _, DriverCapability};
use drm_fourcc::DrmFourcc;
use gbm::{AsRaw, BufferObject, BufferObjectFlags, Device as GbmDevice, Surface};
use nix::poll::{poll, PollFd, PollFlags, PollTimeout};

use super::{NativeDisplay, NativeOptions, NativeState, NativeWindow, Platform};
use crate::swap_chain::{FlipStatus, PresentationEngine, ScanoutDevice, Wait};
use crate::window::WindowProperties;

pub const KNOWN_OPTIONS: &[&str] = &["drm-device"];

const SYSFS_DRM: &str = "/sys/class/drm";

const DRM_MODULES: &[&str] = &[
    "i915", "imx-drm", "nouveau", "radeon", "vmgfx", "omapdrm", "exynos", "pl111", "vc4",
];

struct DrmCard(File);

impl AsFd for DrmCard {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.0.as_fd()
    }
}

impl drm::Device for DrmCard {}
impl ControlDevice for DrmCard {}

/// Kernel framebuffer attached to a GBM buffer object as user data. The
/// buffer object drops it when the swap-chain destroys the buffer.
struct Framebuffer {
    card: Rc<DrmCard>,
    handle: framebuffer::Handle,
}

impl Drop for Framebuffer {
    fn drop(&mut self) {
        if let Err(e) = self.card.destroy_framebuffer(self.handle) {
            log::debug!("[drm] Failed to remove framebuffer: {}", e);
        }
    }
}

/// Connector, mode and CRTC picked at start-up.
struct Output {
    connector: connector::Handle,
    crtc: crtc::Handle,
    mode: Mode,
    saved_crtc: Option<crtc::Info>,
}

/// GBM surface scanned out on one CRTC.
struct GbmScanout {
    card: Rc<DrmCard>,
    surface: Surface<Framebuffer>,
    format: DrmFourcc,
    connector: connector::Handle,
    crtc: crtc::Handle,
    mode: Mode,
    saved_crtc: Option<crtc::Info>,
}

impl GbmScanout {
    fn framebuffer_of(buffer: &BufferObject<Framebuffer>) -> Result<framebuffer::Handle, Box<dyn std::error::Error>> {
        buffer
            .userdata()
            .map(|fb| fb.handle)
            .ok_or_else(|| "buffer object has no framebuffer".into())
    }
}

impl ScanoutDevice for GbmScanout {
    type Buffer = BufferObject<Framebuffer>;

    fn acquire_master(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.card.acquire_master_lock()?;
        Ok(())
    }

    fn lock_front_buffer(&mut self) -> Result<Self::Buffer, Box<dyn std::error::Error>> {
        let buffer = unsafe { self.surface.lock_front_buffer() }
            .map_err(|e| format!("gbm_surface_lock_front_buffer: {}", e))?;
        Ok(buffer)
    }

    fn has_free_buffers(&self) -> bool {
        self.surface.has_free_buffers()
    }

    fn prepare_framebuffer(&mut self, buffer: &mut Self::Buffer) -> Result<(), Box<dyn std::error::Error>> {
        if buffer.userdata().is_some() {
            return Ok(());
        }

        let handle = match legacy_depth_bpp(self.format) {
            Some((depth, bpp)) => self.card.add_framebuffer(&*buffer, depth, bpp)?,
            None => self
                .card
                .add_planar_framebuffer(&*buffer, drm::control::FbCmd2Flags::empty())?,
        };
        log::debug!("[drm] Created framebuffer {:?}", handle);

        buffer.set_userdata(Framebuffer {
            card: self.card.clone(),
            handle,
        });
        Ok(())
    }

    fn set_crtc(&mut self, buffer: &Self::Buffer) -> Result<(), Box<dyn std::error::Error>> {
        let fb = Self::framebuffer_of(buffer)?;
        self.card
            .set_crtc(self.crtc, Some(fb), (0, 0), &[self.connector], Some(self.mode))?;
        Ok(())
    }

    fn page_flip(&mut self, buffer: &Self::Buffer, async_flip: bool) -> Result<(), Box<dyn std::error::Error>> {
        let fb = Self::framebuffer_of(buffer)?;
        let mut flags = PageFlipFlags::EVENT;
        if async_flip {
            flags |= PageFlipFlags::ASYNC;
        }
        self.card.page_flip(self.crtc, fb, flags, None)?;
        Ok(())
    }

    fn wait_for_event(&mut self, wait: Wait) -> Result<usize, Box<dyn std::error::Error>> {
        let timeout = match wait {
            Wait::Block => PollTimeout::NONE,
            Wait::Poll => PollTimeout::ZERO,
        };

        let ready = {
            let mut fds = [PollFd::new(self.card.as_fd(), PollFlags::POLLIN)];
            poll(&mut fds, timeout)?
        };
        if ready == 0 {
            return Ok(0);
        }

        let completed = self
            .card
            .receive_events()?
            .filter(|event| matches!(event, Event::PageFlip(_)))
            .count();
        Ok(completed)
    }

    fn restore(&mut self) {
        let Some(saved) = self.saved_crtc.take() else {
            return;
        };

        if let Err(e) = self.card.set_crtc(
            saved.handle(),
            saved.framebuffer(),
            saved.position(),
            &[self.connector],
            saved.mode(),
        ) {
            log::warn!("[drm] Failed to restore original crtc: {}", e);
        }
    }
}

/// Kernel mode-setting backend rendering through GBM.
pub struct NativeStateDrm {
    options: NativeOptions,
    card: Option<Rc<DrmCard>>,
    gbm: Option<GbmDevice<DrmCard>>,
    output: Option<Output>,
    async_supported: bool,
    engine: Option<PresentationEngine<GbmScanout>>,
    properties: WindowProperties,
}

impl NativeStateDrm {
    pub fn new(options: NativeOptions) -> Self {
        Self {
            options,
            card: None,
            gbm: None,
            output: None,
            async_supported: false,
            engine: None,
            properties: WindowProperties::default(),
        }
    }

    fn init(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        let (path, file) = open_device(self.options.get("drm-device"))?;
        log::info!("[drm] Using device {}", path.display());

        let card = Rc::new(DrmCard(file.try_clone()?));
        let gbm = GbmDevice::new(DrmCard(file))?;

        let output = find_output(&card)?;
        let (w, h) = output.mode.size();
        log::info!(
            "[drm] Mode {}x{}@{}Hz on {:?}",
            w,
            h,
            output.mode.vrefresh(),
            output.connector
        );

        self.async_supported = card
            .get_driver_capability(DriverCapability::ASyncPageFlip)
            .map(|v| v != 0)
            .unwrap_or(false);
        log::debug!("[drm] Async page flip: {}", self.async_supported);

        self.card = Some(card);
        self.gbm = Some(gbm);
        self.output = Some(output);
        Ok(())
    }

    fn create_surface(&mut self, properties: &WindowProperties) -> Result<(), Box<dyn std::error::Error>> {
        let (Some(card), Some(gbm), Some(output)) = (&self.card, &self.gbm, &mut self.output) else {
            return Err("DRM device has not been initialized".into());
        };

        let format = if properties.visual_id != 0 {
            DrmFourcc::try_from(properties.visual_id as u32)
                .map_err(|e| format!("unsupported visual id 0x{:x}: {:?}", properties.visual_id, e))?
        } else {
            DrmFourcc::Xrgb8888
        };

        let (w, h) = output.mode.size();
        let surface = gbm.create_surface::<Framebuffer>(
            w as u32,
            h as u32,
            format,
            BufferObjectFlags::SCANOUT | BufferObjectFlags::RENDERING,
        )?;

        let scanout = GbmScanout {
            card: card.clone(),
            surface,
            format,
            connector: output.connector,
            crtc: output.crtc,
            mode: output.mode,
            saved_crtc: output.saved_crtc.take(),
        };

        self.engine = Some(PresentationEngine::new(
            scanout,
            self.options.swap_mode,
            self.async_supported,
        ));
        self.properties = WindowProperties::new(w as i32, h as i32, true, format as u32 as i64);
        Ok(())
    }
}

impl NativeState for NativeStateDrm {
    fn name(&self) -> &'static str {
        "drm"
    }

    fn init_display(&mut self) -> bool {
        if self.gbm.is_some() {
            return true;
        }

        match self.init() {
            Ok(()) => true,
            Err(e) => {
                log::error!("[drm] Failed to initialize display: {}", e);
                self.card = None;
                self.gbm = None;
                self.output = None;
                false
            }
        }
    }

    fn display(&self) -> NativeDisplay {
        let handle = self
            .gbm
            .as_ref()
            .map(|gbm| gbm.as_raw() as *mut std::ffi::c_void)
            .unwrap_or(std::ptr::null_mut());
        NativeDisplay::new(Platform::Gbm, handle)
    }

    fn create_window(&mut self, properties: WindowProperties) -> bool {
        // The previous surface must be gone before a new one scans out.
        if let Some(mut engine) = self.engine.take() {
            if let Some(output) = self.output.as_mut() {
                output.saved_crtc = engine.device_mut().saved_crtc.take();
            }
        }

        match self.create_surface(&properties) {
            Ok(()) => true,
            Err(e) => {
                log::error!("[drm] Failed to create GBM surface: {}", e);
                false
            }
        }
    }

    fn window(&mut self, properties: &mut WindowProperties) -> NativeWindow {
        *properties = self.properties;
        match &self.engine {
            Some(engine) => NativeWindow {
                handle: engine.device().surface.as_raw() as *mut std::ffi::c_void,
            },
            None => NativeWindow::null(),
        }
    }

    fn visible(&mut self, _visible: bool) {}

    fn should_quit(&mut self) -> bool {
        self.options.quit.is_set()
    }

    fn flip(&mut self) {
        let Some(engine) = self.engine.as_mut() else {
            return;
        };

        if engine.flip() == FlipStatus::Fatal {
            self.options.quit.request();
        }
    }
}

impl Drop for NativeStateDrm {
    fn drop(&mut self) {
        self.engine.take();
        if let Some(card) = &self.card {
            card.release_master_lock().ok();
        }
    }
}

fn legacy_depth_bpp(format: DrmFourcc) -> Option<(u32, u32)> {
    match format {
        DrmFourcc::Xrgb8888 => Some((24, 32)),
        DrmFourcc::Argb8888 => Some((32, 32)),
        DrmFourcc::Rgb565 => Some((16, 16)),
        DrmFourcc::Xrgb2101010 => Some((30, 32)),
        _ => None,
    }
}

fn open_card(path: &Path) -> Result<File, Box<dyn std::error::Error>> {
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .open(path)
        .map_err(|e| format!("Failed to open {}: {}", path.display(), e))?;
    Ok(file)
}

/// Resolves and opens the DRM node: an explicit device first, then a sysfs
/// scan for the boot GPU, then any card whose driver is a known module.
fn open_device(explicit: Option<&str>) -> Result<(PathBuf, File), Box<dyn std::error::Error>> {
    if let Some(path) = explicit {
        let path = PathBuf::from(path);
        let file = open_card(&path)?;
        return Ok((path, file));
    }

    match find_primary_card(Path::new(SYSFS_DRM)) {
        Some(path) => {
            log::debug!("[drm] Trying to use the DRM node {}", path.display());
            match open_card(&path) {
                Ok(file) => return Ok((path, file)),
                Err(e) => log::error!("[drm] {}", e),
            }
        }
        None => log::error!("[drm] Can't determine the main graphics card DRM device node"),
    }

    open_by_module().ok_or_else(|| "Failed to find a suitable DRM device".into())
}

fn card_number(name: &str) -> Option<u32> {
    name.strip_prefix("card")?.parse().ok()
}

/// 0 for the boot VGA device, 1 for other hardware, 2 for virtual devices.
fn card_rank(card_dir: &Path) -> u8 {
    let boot_vga = std::fs::read_to_string(card_dir.join("device/boot_vga"))
        .map(|v| v.trim() == "1")
        .unwrap_or(false);
    if boot_vga {
        return 0;
    }

    let is_virtual = std::fs::canonicalize(card_dir)
        .map(|p| p.to_string_lossy().contains("/devices/virtual/"))
        .unwrap_or(true)
        || !card_dir.join("device").exists();
    if is_virtual {
        2
    } else {
        1
    }
}

/// Scans `sysfs_drm` (normally `/sys/class/drm`) and returns the device node
/// of the best card.
fn find_primary_card(sysfs_drm: &Path) -> Option<PathBuf> {
    let entries = std::fs::read_dir(sysfs_drm).ok()?;

    entries
        .flatten()
        .filter_map(|entry| {
            let name = entry.file_name().to_string_lossy().to_string();
            let number = card_number(&name)?;
            Some((card_rank(&entry.path()), number))
        })
        .min()
        .map(|(_, number)| PathBuf::from(format!("/dev/dri/card{}", number)))
}

fn open_by_module() -> Option<(PathBuf, File)> {
    let mut cards: Vec<(String, PathBuf, File)> = Vec::new();

    for number in 0..16 {
        let path = PathBuf::from(format!("/dev/dri/card{}", number));
        let Ok(file) = open_card(&path) else {
            continue;
        };
        let card = DrmCard(file);
        let driver = match card.get_driver() {
            Ok(driver) => driver.name().to_string_lossy().to_string(),
            Err(_) => continue,
        };
        cards.push((driver, path, card.0));
    }

    for module in DRM_MODULES {
        if let Some(pos) = cards.iter().position(|(driver, _, _)| driver == module) {
            let (_, path, file) = cards.swap_remove(pos);
            log::debug!("[drm] Opened DRM module '{}'", module);
            return Some((path, file));
        }
        log::debug!("[drm] Failed to open DRM module '{}'", module);
    }

    None
}

/// Index of the preferred mode, else of the mode with the largest area.
fn pick_mode(modes: &[(u16, u16, bool)]) -> Option<usize> {
    if let Some(i) = modes.iter().position(|&(_, _, preferred)| preferred) {
        return Some(i);
    }

    let mut best: Option<(usize, u32)> = None;
    for (i, &(w, h, _)) in modes.iter().enumerate() {
        let area = w as u32 * h as u32;
        if best.map_or(true, |(_, a)| area > a) {
            best = Some((i, area));
        }
    }
    best.map(|(i, _)| i)
}

fn find_output(card: &DrmCard) -> Result<Output, Box<dyn std::error::Error>> {
    let resources = card.resource_handles()?;

    let connector = resources
        .connectors()
        .iter()
        .filter_map(|&c| card.get_connector(c, true).ok())
        .find(|c| c.state() == connector::State::Connected)
        .ok_or("Failed to find a suitable connector")?;

    let summary: Vec<(u16, u16, bool)> = connector
        .modes()
        .iter()
        .map(|m| {
            let (w, h) = m.size();
            (w, h, m.mode_type().contains(ModeTypeFlags::PREFERRED))
        })
        .collect();
    let mode = pick_mode(&summary)
        .map(|i| connector.modes()[i])
        .ok_or("Failed to find a suitable mode")?;

    let current = connector
        .current_encoder()
        .and_then(|e| card.get_encoder(e).ok())
        .and_then(|e| e.crtc());

    let crtc = match current {
        Some(crtc) => crtc,
        None => {
            let mut candidates = Vec::new();
            for &encoder in connector.encoders() {
                let Ok(info) = card.get_encoder(encoder) else {
                    continue;
                };
                candidates.extend(resources.filter_crtcs(info.possible_crtcs()));
            }
            let free = candidates.iter().copied().find(|&c| {
                card.get_crtc(c)
                    .map(|info| info.mode().is_none())
                    .unwrap_or(false)
            });
            free.or_else(|| candidates.first().copied())
                .ok_or("Failed to find a suitable encoder")?
        }
    };

    let saved_crtc = match card.get_crtc(crtc) {
        Ok(info) => Some(info),
        Err(e) => {
            log::warn!("[drm] Failed to get current CRTC: {}", e);
            None
        }
    };

    Ok(Output {
        connector: connector.handle(),
        crtc,
        mode,
        saved_crtc,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_card(root: &Path, name: &str, boot_vga: Option<&str>) {
        let dir = root.join(name);
        std::fs::create_dir_all(dir.join("device")).unwrap();
        if let Some(value) = boot_vga {
            std::fs::write(dir.join("device/boot_vga"), value).unwrap();
        }
    }

    #[test]
    fn test_prefers_boot_vga() {
        let tmp = tempfile::tempdir().unwrap();
        make_card(tmp.path(), "card0", Some("0"));
        make_card(tmp.path(), "card1", Some("1"));
        std::fs::create_dir_all(tmp.path().join("card0-HDMI-A-1")).unwrap();
        std::fs::create_dir_all(tmp.path().join("renderD128")).unwrap();

        assert_eq!(
            find_primary_card(tmp.path()),
            Some(PathBuf::from("/dev/dri/card1"))
        );
    }

    #[test]
    fn test_skips_virtual_devices() {
        let tmp = tempfile::tempdir().unwrap();
        let virt = tmp.path().join("devices/virtual/drm/card0");
        std::fs::create_dir_all(virt.join("device")).unwrap();
        let class = tmp.path().join("class");
        std::fs::create_dir_all(&class).unwrap();
        std::os::unix::fs::symlink(&virt, class.join("card0")).unwrap();
        make_card(&class, "card2", None);

        assert_eq!(find_primary_card(&class), Some(PathBuf::from("/dev/dri/card2")));
    }

    #[test]
    fn test_falls_back_to_any_card() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(tmp.path().join("card3")).unwrap();
        assert_eq!(find_primary_card(tmp.path()), Some(PathBuf::from("/dev/dri/card3")));
        assert_eq!(find_primary_card(&tmp.path().join("missing")), None);
    }

    #[test]
    fn test_pick_mode() {
        assert_eq!(pick_mode(&[]), None);
        assert_eq!(pick_mode(&[(1024, 768, false), (1920, 1080, false), (1280, 720, false)]), Some(1));
        assert_eq!(pick_mode(&[(3840, 2160, false), (1920, 1080, true)]), Some(1));
    }

    #[test]
    fn test_legacy_formats() {
        assert_eq!(legacy_depth_bpp(DrmFourcc::Xrgb8888), Some((24, 32)));
        assert_eq!(legacy_depth_bpp(DrmFourcc::Nv12), None);
    }
}
