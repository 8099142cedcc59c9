use std::fmt;
use std::str::FromStr;

/// Presentation policy for the kernel display path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SwapMode {
    /// Mailbox when the device supports async flips, FIFO otherwise.
    #[default]
    Default,
    Immediate,
    Mailbox,
    Fifo,
}

impl SwapMode {
    pub fn resolve(self, async_supported: bool) -> SwapMode {
        match self {
            SwapMode::Default if async_supported => SwapMode::Mailbox,
            SwapMode::Default => SwapMode::Fifo,
            mode => mode,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SwapMode::Default => "default",
            SwapMode::Immediate => "immediate",
            SwapMode::Mailbox => "mailbox",
            SwapMode::Fifo => "fifo",
        }
    }
}

impl fmt::Display for SwapMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SwapMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "default" => Ok(SwapMode::Default),
            "immediate" => Ok(SwapMode::Immediate),
            "mailbox" => Ok(SwapMode::Mailbox),
            "fifo" => Ok(SwapMode::Fifo),
            other => Err(format!("unknown swap mode '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wait {
    Block,
    Poll,
}

/// Result of one [`PresentationEngine::flip`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlipStatus {
    /// First frame, shown by a direct mode-set.
    ModeSet,
    /// A page flip was queued.
    Scheduled,
    /// A flip was still in flight; the frame stays pending and may be replaced.
    Skipped,
    /// A device call failed. State is consistent and the next call retries.
    Failed,
    /// The display cannot be driven at all.
    Fatal,
}

/// Kernel-side operations the presentation engine needs. Implemented by the
/// GBM/DRM backend and by a fake device in tests.
pub trait ScanoutDevice {
    type Buffer;

    fn acquire_master(&mut self) -> Result<(), Box<dyn std::error::Error>>;

    /// Takes the most recently rendered buffer from the swap-chain.
    fn lock_front_buffer(&mut self) -> Result<Self::Buffer, Box<dyn std::error::Error>>;

    /// Hands a buffer back to the swap-chain.
    fn release_buffer(&mut self, buffer: Self::Buffer) {
        drop(buffer);
    }

    fn has_free_buffers(&self) -> bool;

    /// Creates the kernel framebuffer for `buffer`, or reuses the cached one.
    fn prepare_framebuffer(
        &mut self,
        buffer: &mut Self::Buffer,
    ) -> Result<(), Box<dyn std::error::Error>>;

    fn set_crtc(&mut self, buffer: &Self::Buffer) -> Result<(), Box<dyn std::error::Error>>;

    fn page_flip(
        &mut self,
        buffer: &Self::Buffer,
        async_flip: bool,
    ) -> Result<(), Box<dyn std::error::Error>>;

    /// Waits for kernel events and returns the number of completed flips.
    fn wait_for_event(&mut self, wait: Wait) -> Result<usize, Box<dyn std::error::Error>>;

    /// Puts the display back the way it was found. Called once before any
    /// buffer is released on teardown.
    fn restore(&mut self) {}
}

/// Pending/flipped/presented buffer triple driven by kernel flip events.
///
/// At most one buffer is ever in flight and every buffer is owned by exactly
/// one slot, so `presented` and `pending` can never alias.
pub struct PresentationEngine<D: ScanoutDevice> {
    device: D,
    mode: SwapMode,
    async_supported: bool,
    pending: Option<D::Buffer>,
    flipped: Option<D::Buffer>,
    presented: Option<D::Buffer>,
    crtc_set: bool,
    is_master: bool,
    dropped_frames: u64,
}

impl<D: ScanoutDevice> PresentationEngine<D> {
    pub fn new(device: D, requested: SwapMode, async_supported: bool) -> Self {
        let mode = requested.resolve(async_supported);
        if !async_supported && matches!(requested, SwapMode::Immediate | SwapMode::Mailbox) {
            log::warn!(
                "[drm] Async page flips are not supported, swap mode {} will wait for vblank",
                requested
            );
        }
        log::debug!("[drm] Swap mode: {}", mode);

        Self {
            device,
            mode,
            async_supported,
            pending: None,
            flipped: None,
            presented: None,
            crtc_set: false,
            is_master: false,
            dropped_frames: 0,
        }
    }

    pub fn mode(&self) -> SwapMode {
        self.mode
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    pub fn dropped_frames(&self) -> u64 {
        self.dropped_frames
    }

    pub fn flip_in_flight(&self) -> bool {
        self.flipped.is_some()
    }

    fn blocking(&self) -> bool {
        self.mode == SwapMode::Fifo || !self.async_supported
    }

    pub fn flip(&mut self) -> FlipStatus {
        if !self.is_master {
            if let Err(e) = self.device.acquire_master() {
                log::error!("[drm] Failed to become DRM master: {}", e);
                return FlipStatus::Fatal;
            }
            self.is_master = true;
        }

        if let Some(old) = self.pending.take() {
            self.device.release_buffer(old);
        }

        let mut buffer = match self.device.lock_front_buffer() {
            Ok(buffer) => buffer,
            Err(e) => {
                log::error!("[drm] Failed to lock front buffer: {}", e);
                self.ensure_free_buffer();
                return FlipStatus::Failed;
            }
        };

        if let Err(e) = self.device.prepare_framebuffer(&mut buffer) {
            log::error!("[drm] Failed to create framebuffer: {}", e);
            self.device.release_buffer(buffer);
            return FlipStatus::Failed;
        }
        self.pending = Some(buffer);

        if self.flipped.is_some() {
            let wait = if self.blocking() { Wait::Block } else { Wait::Poll };
            self.wait_for_flip(wait);
        }

        let status = if self.flipped.is_none() {
            self.submit()
        } else {
            self.dropped_frames += 1;
            log::debug!("[drm] Flip in flight, keeping frame pending");
            FlipStatus::Skipped
        };

        self.ensure_free_buffer();
        status
    }

    fn submit(&mut self) -> FlipStatus {
        let Some(buffer) = self.pending.take() else {
            return FlipStatus::Failed;
        };

        if !self.crtc_set {
            if let Err(e) = self.device.set_crtc(&buffer) {
                log::error!("[drm] Failed to set crtc: {}", e);
                self.pending = Some(buffer);
                return FlipStatus::Failed;
            }
            self.crtc_set = true;
            if let Some(old) = self.presented.replace(buffer) {
                self.device.release_buffer(old);
            }
            return FlipStatus::ModeSet;
        }

        let async_flip = self.async_supported && self.mode != SwapMode::Fifo;
        match self.device.page_flip(&buffer, async_flip) {
            Ok(()) => {
                self.flipped = Some(buffer);
                FlipStatus::Scheduled
            }
            Err(e) => {
                log::error!("[drm] Failed to queue page flip: {}", e);
                self.pending = Some(buffer);
                FlipStatus::Failed
            }
        }
    }

    /// Returns true if the in-flight flip completed.
    fn wait_for_flip(&mut self, wait: Wait) -> bool {
        match self.device.wait_for_event(wait) {
            Ok(0) => {
                if wait == Wait::Block {
                    log::debug!("[drm] Timed out waiting for page flip");
                }
                false
            }
            Ok(_) => {
                self.complete_flip();
                true
            }
            Err(e) => {
                log::debug!("[drm] Waiting for page flip failed: {}", e);
                false
            }
        }
    }

    fn complete_flip(&mut self) {
        if let Some(buffer) = self.flipped.take() {
            if let Some(old) = self.presented.replace(buffer) {
                self.device.release_buffer(old);
            }
        }
    }

    /// The renderer must never be handed a buffer the kernel still owns.
    fn ensure_free_buffer(&mut self) {
        while !self.device.has_free_buffers() {
            if self.flipped.is_some() {
                if !self.wait_for_flip(Wait::Block) {
                    break;
                }
            } else if let Some(stale) = self.pending.take() {
                self.device.release_buffer(stale);
                self.dropped_frames += 1;
            } else {
                break;
            }
        }
    }
}

impl<D: ScanoutDevice> Drop for PresentationEngine<D> {
    fn drop(&mut self) {
        if self.flipped.is_some() {
            self.wait_for_flip(Wait::Block);
        }
        if self.dropped_frames > 0 {
            log::info!(
                "[drm] {} frames replaced before reaching the screen",
                self.dropped_frames
            );
        }

        self.device.restore();

        for buffer in [self.pending.take(), self.flipped.take(), self.presented.take()]
            .into_iter()
            .flatten()
        {
            self.device.release_buffer(buffer);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Default)]
    struct Trace {
        in_flight: usize,
        max_in_flight: usize,
        locked: Vec<u32>,
        framebuffers_created: usize,
        flips: usize,
        async_flips: usize,
        mode_sets: usize,
        restored: bool,
    }

    struct FakeBuffer {
        id: u32,
        fb: Option<u32>,
    }

    /// Swap-chain of `capacity` buffers. Flip events arrive only when the
    /// engine blocks, or on a poll when `events_ready` is set.
    struct FakeDevice {
        free: Vec<u32>,
        fb_cache: Vec<u32>,
        events_ready: bool,
        master_ok: bool,
        flip_ok: bool,
        trace: Rc<RefCell<Trace>>,
    }

    impl FakeDevice {
        fn new(capacity: u32, trace: Rc<RefCell<Trace>>) -> Self {
            Self {
                free: (0..capacity).rev().collect(),
                fb_cache: Vec::new(),
                events_ready: false,
                master_ok: true,
                flip_ok: true,
                trace,
            }
        }
    }

    impl ScanoutDevice for FakeDevice {
        type Buffer = FakeBuffer;

        fn acquire_master(&mut self) -> Result<(), Box<dyn std::error::Error>> {
            if self.master_ok {
                Ok(())
            } else {
                Err("permission denied".into())
            }
        }

        fn lock_front_buffer(&mut self) -> Result<FakeBuffer, Box<dyn std::error::Error>> {
            let id = self.free.pop().ok_or("no buffer rendered")?;
            self.trace.borrow_mut().locked.push(id);
            let fb = self.fb_cache.contains(&id).then_some(id);
            Ok(FakeBuffer { id, fb })
        }

        fn release_buffer(&mut self, buffer: FakeBuffer) {
            let mut trace = self.trace.borrow_mut();
            let pos = trace.locked.iter().position(|&id| id == buffer.id);
            assert!(pos.is_some(), "buffer {} released twice", buffer.id);
            if let Some(pos) = pos {
                trace.locked.remove(pos);
            }
            self.free.insert(0, buffer.id);
        }

        fn has_free_buffers(&self) -> bool {
            !self.free.is_empty()
        }

        fn prepare_framebuffer(
            &mut self,
            buffer: &mut FakeBuffer,
        ) -> Result<(), Box<dyn std::error::Error>> {
            if buffer.fb.is_none() {
                self.fb_cache.push(buffer.id);
                buffer.fb = Some(buffer.id);
                self.trace.borrow_mut().framebuffers_created += 1;
            }
            Ok(())
        }

        fn set_crtc(&mut self, _buffer: &FakeBuffer) -> Result<(), Box<dyn std::error::Error>> {
            self.trace.borrow_mut().mode_sets += 1;
            Ok(())
        }

        fn page_flip(
            &mut self,
            _buffer: &FakeBuffer,
            async_flip: bool,
        ) -> Result<(), Box<dyn std::error::Error>> {
            if !self.flip_ok {
                return Err("invalid argument".into());
            }
            let mut trace = self.trace.borrow_mut();
            if trace.in_flight > 0 {
                return Err("device or resource busy".into());
            }
            trace.in_flight += 1;
            trace.max_in_flight = trace.max_in_flight.max(trace.in_flight);
            trace.flips += 1;
            if async_flip {
                trace.async_flips += 1;
            }
            Ok(())
        }

        fn wait_for_event(&mut self, wait: Wait) -> Result<usize, Box<dyn std::error::Error>> {
            let mut trace = self.trace.borrow_mut();
            if trace.in_flight == 0 {
                return Ok(0);
            }
            if wait == Wait::Block || self.events_ready {
                trace.in_flight -= 1;
                return Ok(1);
            }
            Ok(0)
        }

        fn restore(&mut self) {
            self.trace.borrow_mut().restored = true;
        }
    }

    fn engine(
        capacity: u32,
        mode: SwapMode,
        async_supported: bool,
    ) -> (PresentationEngine<FakeDevice>, Rc<RefCell<Trace>>) {
        let trace = Rc::new(RefCell::new(Trace::default()));
        let device = FakeDevice::new(capacity, trace.clone());
        (PresentationEngine::new(device, mode, async_supported), trace)
    }

    fn assert_slots_distinct(engine: &PresentationEngine<FakeDevice>) {
        let ids: Vec<u32> = [&engine.pending, &engine.flipped, &engine.presented]
            .into_iter()
            .flatten()
            .map(|b| b.id)
            .collect();
        let mut unique = ids.clone();
        unique.sort_unstable();
        unique.dedup();
        assert_eq!(ids.len(), unique.len(), "buffer held by two slots: {:?}", ids);
    }

    #[test]
    fn test_swap_mode_resolution() {
        assert_eq!(SwapMode::Default.resolve(true), SwapMode::Mailbox);
        assert_eq!(SwapMode::Default.resolve(false), SwapMode::Fifo);
        assert_eq!(SwapMode::Immediate.resolve(false), SwapMode::Immediate);
        assert_eq!("FIFO".parse::<SwapMode>(), Ok(SwapMode::Fifo));
        assert!("vsync".parse::<SwapMode>().is_err());
    }

    #[test]
    fn test_first_frame_sets_crtc() {
        let (mut engine, trace) = engine(3, SwapMode::Fifo, false);
        assert_eq!(engine.flip(), FlipStatus::ModeSet);
        assert_eq!(trace.borrow().mode_sets, 1);
        assert!(engine.presented.is_some());
        assert!(engine.pending.is_none());

        assert_eq!(engine.flip(), FlipStatus::Scheduled);
        assert_eq!(trace.borrow().mode_sets, 1);
        assert_eq!(trace.borrow().flips, 1);
    }

    #[test]
    fn test_fifo_never_skips_and_keeps_one_flip_in_flight() {
        let (mut engine, trace) = engine(3, SwapMode::Fifo, true);
        for _ in 0..50 {
            let status = engine.flip();
            assert!(matches!(status, FlipStatus::ModeSet | FlipStatus::Scheduled));
            assert_slots_distinct(&engine);
            assert!(trace.borrow().in_flight <= 1);
        }
        assert_eq!(trace.borrow().max_in_flight, 1);
        assert_eq!(trace.borrow().async_flips, 0);
        assert_eq!(engine.dropped_frames(), 0);
    }

    #[test]
    fn test_failed_flip_releases_stale_frame_as_dropped() {
        let (mut engine, trace) = engine(2, SwapMode::Fifo, false);
        assert_eq!(engine.flip(), FlipStatus::ModeSet);

        engine.device_mut().flip_ok = false;
        assert_eq!(engine.flip(), FlipStatus::Failed);

        assert!(engine.pending.is_none());
        assert!(engine.device().has_free_buffers());
        assert_eq!(engine.dropped_frames(), 1);
        assert_eq!(trace.borrow().locked, vec![0]);
    }

    #[test]
    fn test_mailbox_skips_while_flip_in_flight() {
        let (mut engine, trace) = engine(4, SwapMode::Default, true);
        assert_eq!(engine.mode(), SwapMode::Mailbox);

        assert_eq!(engine.flip(), FlipStatus::ModeSet);
        assert_eq!(engine.flip(), FlipStatus::Scheduled);
        assert_eq!(engine.flip(), FlipStatus::Skipped);
        assert_eq!(engine.dropped_frames(), 1);
        assert_slots_distinct(&engine);

        engine.device_mut().events_ready = true;
        assert_eq!(engine.flip(), FlipStatus::Scheduled);
        assert_eq!(trace.borrow().async_flips, 2);
        assert_eq!(trace.borrow().max_in_flight, 1);
    }

    #[test]
    fn test_invariants_hold_for_mixed_event_timing() {
        for capacity in 2..=4 {
            for mode in [SwapMode::Immediate, SwapMode::Mailbox, SwapMode::Fifo] {
                let (mut engine, trace) = engine(capacity, mode, true);
                for i in 0..64u32 {
                    engine.device_mut().events_ready = i % 3 == 0;
                    let status = engine.flip();
                    assert_ne!(status, FlipStatus::Failed, "capacity {} mode {}", capacity, mode);
                    assert_slots_distinct(&engine);
                    assert!(engine.device().has_free_buffers());
                    assert!(trace.borrow().in_flight <= 1);
                }
                assert_eq!(trace.borrow().max_in_flight, 1);
            }
        }
    }

    #[test]
    fn test_framebuffers_are_cached_per_buffer() {
        let (mut engine, trace) = engine(3, SwapMode::Fifo, false);
        for _ in 0..30 {
            engine.flip();
        }
        assert_eq!(trace.borrow().framebuffers_created, 3);
    }

    #[test]
    fn test_master_failure_is_fatal() {
        let (mut engine, trace) = engine(3, SwapMode::Fifo, false);
        engine.device_mut().master_ok = false;
        assert_eq!(engine.flip(), FlipStatus::Fatal);
        assert!(trace.borrow().locked.is_empty());
    }

    #[test]
    fn test_drop_restores_and_releases_everything() {
        let (mut engine, trace) = engine(3, SwapMode::Mailbox, true);
        engine.flip();
        engine.flip();
        engine.flip();
        drop(engine);
        let trace = trace.borrow();
        assert!(trace.restored);
        assert!(trace.locked.is_empty());
        assert_eq!(trace.in_flight, 0);
    }
}
