use std::collections::BTreeMap;

use gpumark_common::timestamp_us;

use crate::canvas::Canvas;

pub mod clear;
pub mod triangle;

pub use clear::SceneClear;
pub use triangle::SceneTriangle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetupStatus {
    Success,
    Unsupported,
    Failure,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationResult {
    Success,
    Failure,
    Unknown,
}

impl ValidationResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValidationResult::Success => "Success",
            ValidationResult::Failure => "Failure",
            ValidationResult::Unknown => "Unknown",
        }
    }
}

/// Averages gathered over one run of a scene. Times are in seconds.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SceneStats {
    pub average_frame_time: f64,
    pub average_user_time: f64,
    pub average_system_time: f64,
    pub cpu_busy_percent: f64,
    pub shader_compilation_time: f64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SceneOption {
    pub value: String,
    pub default_value: String,
    pub description: String,
    pub acceptable_values: Vec<String>,
    /// True once the value was given explicitly for the current run.
    pub set: bool,
}

/// Bookkeeping shared by every scene: options, frame counting, timing and
/// CPU usage.
#[derive(Debug, Clone)]
pub struct SceneBase {
    name: String,
    options: BTreeMap<String, SceneOption>,
    running: bool,
    frames: u32,
    start_us: u64,
    last_update_us: u64,
    duration: f64,
    nframes: u32,
    cpu_start: CpuTimes,
    cpu_end: CpuTimes,
    shader_compilation_time: f64,
}

impl SceneBase {
    pub fn new(name: &str) -> Self {
        let mut base = Self {
            name: name.to_string(),
            options: BTreeMap::new(),
            running: false,
            frames: 0,
            start_us: 0,
            last_update_us: 0,
            duration: 10.0,
            nframes: 0,
            cpu_start: CpuTimes::default(),
            cpu_end: CpuTimes::default(),
            shader_compilation_time: 0.0,
        };
        base.add_option("duration", "10.0", "The duration of each benchmark in seconds", &[]);
        base.add_option(
            "nframes",
            "",
            "The number of frames to render (overrides duration when set)",
            &[],
        );
        base
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn add_option(&mut self, name: &str, default: &str, description: &str, acceptable: &[&str]) {
        self.options.insert(
            name.to_string(),
            SceneOption {
                value: default.to_string(),
                default_value: default.to_string(),
                description: description.to_string(),
                acceptable_values: acceptable.iter().map(|s| s.to_string()).collect(),
                set: false,
            },
        );
    }

    pub fn options(&self) -> &BTreeMap<String, SceneOption> {
        &self.options
    }

    /// Sets an option for the next run. Unknown names and values outside
    /// the acceptable set are rejected.
    pub fn set_option(&mut self, name: &str, value: &str) -> bool {
        let Some(option) = self.options.get_mut(name) else {
            return false;
        };
        if !option.acceptable_values.is_empty() && !option.acceptable_values.iter().any(|v| v == value) {
            return false;
        }
        option.value = value.to_string();
        option.set = true;
        true
    }

    /// Changes the default an option falls back to between runs.
    pub fn set_option_default(&mut self, name: &str, value: &str) -> bool {
        let Some(option) = self.options.get_mut(name) else {
            return false;
        };
        option.default_value = value.to_string();
        option.value = value.to_string();
        true
    }

    pub fn reset_options(&mut self) {
        for option in self.options.values_mut() {
            option.value = option.default_value.clone();
            option.set = false;
        }
    }

    pub fn option(&self, name: &str) -> Option<&str> {
        self.options.get(name).map(|o| o.value.as_str())
    }

    pub fn option_f64(&self, name: &str) -> Option<f64> {
        self.option(name)?.trim().parse().ok()
    }

    pub fn option_bool(&self, name: &str) -> bool {
        matches!(self.option(name), Some("true") | Some("1"))
    }

    /// Starts a run: reads `duration`/`nframes` and resets the counters.
    pub fn start(&mut self) {
        self.duration = self.option_f64("duration").unwrap_or(10.0);
        self.nframes = self
            .option("nframes")
            .and_then(|s| s.trim().parse().ok())
            .unwrap_or(0);
        self.frames = 0;
        self.shader_compilation_time = 0.0;
        self.start_us = timestamp_us();
        self.last_update_us = self.start_us;
        self.cpu_start = CpuTimes::now();
        self.cpu_end = self.cpu_start;
        self.running = true;
    }

    /// Counts a frame and stops the run once the duration or frame count is
    /// reached.
    pub fn update(&mut self) {
        self.frames += 1;
        self.last_update_us = timestamp_us();
        self.cpu_end = CpuTimes::now();

        let elapsed = self.elapsed();
        let frames_done = self.nframes > 0 && self.frames >= self.nframes;
        let time_done = self.nframes == 0 && elapsed >= self.duration;
        if frames_done || time_done {
            self.running = false;
        }
    }

    pub fn running(&self) -> bool {
        self.running
    }

    pub fn set_running(&mut self, running: bool) {
        self.running = running;
    }

    pub fn frames(&self) -> u32 {
        self.frames
    }

    /// Seconds between `start` and the last `update`.
    pub fn elapsed(&self) -> f64 {
        self.last_update_us.saturating_sub(self.start_us) as f64 / 1_000_000.0
    }

    /// Seconds since `start`, for animation.
    pub fn time(&self) -> f64 {
        timestamp_us().saturating_sub(self.start_us) as f64 / 1_000_000.0
    }

    pub fn add_shader_compilation_time(&mut self, seconds: f64) {
        self.shader_compilation_time += seconds;
    }

    pub fn average_fps(&self) -> u32 {
        let elapsed = self.elapsed();
        if elapsed <= 0.0 {
            return 0;
        }
        (self.frames as f64 / elapsed) as u32
    }

    pub fn stats(&self) -> SceneStats {
        let elapsed = self.elapsed();
        let frames = self.frames.max(1) as f64;
        let user = self.cpu_end.user - self.cpu_start.user;
        let system = self.cpu_end.system - self.cpu_start.system;

        SceneStats {
            average_frame_time: if self.frames > 0 { elapsed / frames } else { 0.0 },
            average_user_time: user / frames,
            average_system_time: system / frames,
            cpu_busy_percent: if elapsed > 0.0 {
                100.0 * (user + system) / elapsed
            } else {
                0.0
            },
            shader_compilation_time: self.shader_compilation_time,
        }
    }

    /// `[name] opt=val:opt2=val2:` for explicitly set options, or
    /// `[name] <default>`.
    pub fn info_string(&self) -> String {
        let set: Vec<String> = self
            .options
            .iter()
            .filter(|(_, o)| o.set)
            .map(|(k, o)| format!("{}={}:", k, o.value))
            .collect();

        if set.is_empty() {
            format!("[{}] <default>", self.name)
        } else {
            format!("[{}] {}", self.name, set.concat())
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct CpuTimes {
    user: f64,
    system: f64,
}

impl CpuTimes {
    #[cfg(unix)]
    fn now() -> Self {
        let mut usage: libc::rusage = unsafe { std::mem::zeroed() };
        if unsafe { libc::getrusage(libc::RUSAGE_SELF, &mut usage) } != 0 {
            return Self::default();
        }
        let secs = |tv: libc::timeval| tv.tv_sec as f64 + tv.tv_usec as f64 / 1_000_000.0;
        Self {
            user: secs(usage.ru_utime),
            system: secs(usage.ru_stime),
        }
    }

    #[cfg(not(unix))]
    fn now() -> Self {
        Self::default()
    }
}

/// A benchmark workload driven by the main loop.
pub trait Scene {
    fn base(&self) -> &SceneBase;

    fn base_mut(&mut self) -> &mut SceneBase;

    fn name(&self) -> &str {
        self.base().name()
    }

    fn load(&mut self) -> bool {
        true
    }

    fn unload(&mut self) {}

    fn setup(&mut self, _canvas: &mut dyn Canvas) -> SetupStatus {
        self.base_mut().start();
        SetupStatus::Success
    }

    fn teardown(&mut self, _canvas: &mut dyn Canvas) {}

    fn update(&mut self) {
        self.base_mut().update();
    }

    fn draw(&mut self, canvas: &mut dyn Canvas);

    fn validate(&mut self, _canvas: &mut dyn Canvas) -> ValidationResult {
        ValidationResult::Unknown
    }

    fn running(&self) -> bool {
        self.base().running()
    }

    fn set_running(&mut self, running: bool) {
        self.base_mut().set_running(running);
    }

    fn average_fps(&self) -> u32 {
        self.base().average_fps()
    }

    fn stats(&self) -> SceneStats {
        self.base().stats()
    }

    fn info_string(&self) -> String {
        self.base().info_string()
    }

    fn options(&self) -> &BTreeMap<String, SceneOption> {
        self.base().options()
    }
}

/// Every scene that ships with the binary.
pub fn builtin_scenes() -> Vec<Box<dyn Scene>> {
    vec![Box::new(SceneClear::new()), Box::new(SceneTriangle::new())]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options_reset_to_defaults() {
        let mut base = SceneBase::new("test");
        base.add_option("color", "red", "Colour", &["red", "green"]);

        assert!(base.set_option("color", "green"));
        assert!(!base.set_option("color", "blue"));
        assert!(!base.set_option("missing", "1"));
        assert_eq!(base.option("color"), Some("green"));

        base.reset_options();
        assert_eq!(base.option("color"), Some("red"));
        assert!(!base.options()["color"].set);
    }

    #[test]
    fn test_option_default_survives_reset() {
        let mut base = SceneBase::new("test");
        assert!(base.set_option_default("duration", "2.0"));
        base.reset_options();
        assert_eq!(base.option_f64("duration"), Some(2.0));
    }

    #[test]
    fn test_info_string_lists_set_options() {
        let mut base = SceneBase::new("clear");
        assert_eq!(base.info_string(), "[clear] <default>");
        base.set_option("duration", "10");
        assert_eq!(base.info_string(), "[clear] duration=10:");
    }

    #[test]
    fn test_nframes_stops_run() {
        let mut base = SceneBase::new("test");
        base.set_option("nframes", "3");
        base.start();
        base.update();
        base.update();
        assert!(base.running());
        base.update();
        assert!(!base.running());
        assert_eq!(base.frames(), 3);
    }

    #[test]
    fn test_zero_duration_stops_after_first_frame() {
        let mut base = SceneBase::new("test");
        base.set_option("duration", "0");
        base.start();
        base.update();
        assert!(!base.running());
    }

    #[test]
    fn test_builtin_scene_names() {
        let names: Vec<String> = builtin_scenes().iter().map(|s| s.name().to_string()).collect();
        assert_eq!(names, vec!["clear", "triangle"]);
    }
}
