use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

static SIGNALED: AtomicBool = AtomicBool::new(false);
static HANDLER_INSTALLED: AtomicBool = AtomicBool::new(false);

/// Cancellation flag shared by a canvas, its native backend and the main
/// loop.
///
/// Each flag has its own state so independent canvases (and tests) do not
/// see each other's requests. Flags created with [`QuitFlag::with_signals`]
/// additionally observe the process-wide SIGINT/SIGTERM/SIGHUP flag, which is a
/// plain atomic so the handler stays async-signal-safe.
#[derive(Debug, Clone, Default)]
pub struct QuitFlag {
    flag: Arc<AtomicBool>,
    watch_signals: bool,
}

impl QuitFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_signals() -> Result<Self, Box<dyn std::error::Error>> {
        install_signal_handlers()?;
        Ok(Self {
            flag: Arc::new(AtomicBool::new(false)),
            watch_signals: true,
        })
    }

    pub fn request(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_set(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
            || (self.watch_signals && SIGNALED.load(Ordering::SeqCst))
    }
}

/// Signals that end the run cleanly.
#[cfg(unix)]
const QUIT_SIGNALS: [(libc::c_int, &str); 3] = [
    (libc::SIGINT, "SIGINT"),
    (libc::SIGTERM, "SIGTERM"),
    (libc::SIGHUP, "SIGHUP"),
];

#[cfg(unix)]
fn install_signal_handlers() -> Result<(), Box<dyn std::error::Error>> {
    if HANDLER_INSTALLED.swap(true, Ordering::SeqCst) {
        return Ok(());
    }

    unsafe {
        let mut sa: libc::sigaction = std::mem::zeroed();
        sa.sa_sigaction = signal_handler as usize;
        sa.sa_flags = libc::SA_RESTART;

        libc::sigemptyset(&mut sa.sa_mask);

        for (signal, name) in QUIT_SIGNALS {
            if libc::sigaction(signal, &sa, std::ptr::null_mut()) < 0 {
                HANDLER_INSTALLED.store(false, Ordering::SeqCst);
                return Err(format!("Failed to set {} handler", name).into());
            }
        }
    }

    Ok(())
}

#[cfg(not(unix))]
fn install_signal_handlers() -> Result<(), Box<dyn std::error::Error>> {
    HANDLER_INSTALLED.store(true, Ordering::SeqCst);
    Ok(())
}

#[cfg(unix)]
extern "C" fn signal_handler(_sig: libc::c_int) {
    SIGNALED.store(true, Ordering::SeqCst);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_is_visible_to_clones() {
        let flag = QuitFlag::new();
        let other = flag.clone();
        assert!(!other.is_set());
        flag.request();
        assert!(other.is_set());
    }

    #[test]
    fn test_flags_are_isolated() {
        let a = QuitFlag::new();
        let b = QuitFlag::new();
        a.request();
        assert!(a.is_set());
        assert!(!b.is_set());
    }

    #[test]
    fn test_plain_flag_ignores_signal_state() {
        let flag = QuitFlag::new();
        SIGNALED.store(true, Ordering::SeqCst);
        let set = flag.is_set();
        SIGNALED.store(false, Ordering::SeqCst);
        assert!(!set);
    }

    #[cfg(unix)]
    #[test]
    fn test_signal_flag_installs_all_quit_handlers() {
        let _flag = QuitFlag::with_signals().unwrap();

        for (signal, name) in QUIT_SIGNALS {
            let current = unsafe {
                let mut sa: libc::sigaction = std::mem::zeroed();
                assert_eq!(libc::sigaction(signal, std::ptr::null(), &mut sa), 0);
                sa.sa_sigaction
            };
            assert_eq!(current, signal_handler as usize, "{} handler", name);
        }
    }
}
