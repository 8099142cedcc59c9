use gpumark_common::timestamp_us;

use crate::benchmark::Benchmark;
use crate::canvas::Canvas;
use crate::scene::{Scene, SetupStatus};
use crate::text_renderer::TextRenderer;

/// How often the FPS overlay text is refreshed.
const FPS_INTERVAL_US: u64 = 500_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoopKind {
    #[default]
    Plain,
    /// Plain loop plus an on-screen FPS counter.
    Decoration,
    /// One frame per scene, then `Scene::validate`.
    Validation,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LoopOptions {
    pub reuse_context: bool,
    pub run_forever: bool,
}

#[derive(Debug, Clone, Copy)]
struct Current {
    scene: usize,
    status: SetupStatus,
}

struct Decoration {
    renderer: Option<TextRenderer>,
    fps_timestamp: u64,
    last_fps: u32,
}

/// Benchmark scheduler. Every [`MainLoop::step`] renders at most one frame
/// of one scene, so the loop can run natively or from a host's render
/// callback.
pub struct MainLoop {
    canvas: Box<dyn Canvas>,
    scenes: Vec<Box<dyn Scene>>,
    benchmarks: Vec<Benchmark>,
    options: LoopOptions,
    kind: LoopKind,
    decoration: Decoration,
    current: Option<Current>,
    next: usize,
    score_total: u64,
    benchmarks_run: u32,
}

impl MainLoop {
    pub fn new(
        canvas: Box<dyn Canvas>,
        scenes: Vec<Box<dyn Scene>>,
        benchmarks: Vec<Benchmark>,
        options: LoopOptions,
        kind: LoopKind,
    ) -> Self {
        Self {
            canvas,
            scenes,
            benchmarks,
            options,
            kind,
            decoration: Decoration {
                renderer: None,
                fps_timestamp: 0,
                last_fps: 0,
            },
            current: None,
            next: 0,
            score_total: 0,
            benchmarks_run: 0,
        }
    }

    pub fn canvas_mut(&mut self) -> &mut dyn Canvas {
        self.canvas.as_mut()
    }

    pub fn kind(&self) -> LoopKind {
        self.kind
    }

    /// Starts over from the first benchmark.
    pub fn reset(&mut self) {
        self.current = None;
        self.next = 0;
        self.score_total = 0;
        self.benchmarks_run = 0;
    }

    /// Average FPS over the scenes that ran to completion.
    pub fn score(&self) -> u32 {
        if self.benchmarks_run == 0 {
            return 0;
        }
        (self.score_total / self.benchmarks_run as u64) as u32
    }

    pub fn benchmarks_run(&self) -> u32 {
        self.benchmarks_run
    }

    /// Advances one frame. Returns false once every benchmark has run (and
    /// the loop is not running forever) or when a quit was requested.
    pub fn step(&mut self) -> bool {
        let should_quit = self.canvas.should_quit();

        if self.current.is_none() && (should_quit || !self.start_next()) {
            return false;
        }
        let Some(current) = self.current else {
            return false;
        };

        if self.scenes[current.scene].running() && !should_quit {
            self.draw(current.scene);
        }

        // draw() may have stopped the scene.
        if !self.scenes[current.scene].running() || should_quit {
            self.finish_scene(current, should_quit);
        }

        !should_quit
    }

    fn start_next(&mut self) -> bool {
        let scene = loop {
            if self.next >= self.benchmarks.len() {
                let has_scenes = self.benchmarks.iter().any(|b| !b.is_option_setter());
                if self.options.run_forever && has_scenes {
                    self.next = 0;
                } else {
                    return false;
                }
            }

            let bench = &self.benchmarks[self.next];
            if bench.is_option_setter() {
                self.benchmarks[self.next].apply_defaults(&mut self.scenes);
                self.next += 1;
                continue;
            }

            match self.scenes.iter().position(|s| s.name() == bench.scene) {
                Some(index) => break index,
                None => {
                    log::error!("[loop] Unknown scene '{}', skipping", bench.scene);
                    self.next += 1;
                }
            }
        };

        if !self.options.reuse_context && !self.canvas.reset() {
            log::error!("[loop] Failed to reset the canvas before '{}'", self.scenes[scene].name());
        }

        self.before_scene_setup();

        let status = self.benchmarks[self.next].setup_scene(self.scenes[scene].as_mut(), self.canvas.as_mut());
        if status != SetupStatus::Success {
            self.scenes[scene].set_running(false);
        }

        self.current = Some(Current { scene, status });
        true
    }

    fn before_scene_setup(&mut self) {
        if self.kind != LoopKind::Decoration {
            return;
        }
        if let Some(mut old) = self.decoration.renderer.take() {
            old.release(self.canvas.as_ref());
        }
        let mut renderer = TextRenderer::new(self.canvas.as_ref());
        renderer.text(&format!("FPS: {}", self.decoration.last_fps));
        self.decoration.renderer = Some(renderer);
        self.decoration.fps_timestamp = timestamp_us();
    }

    fn draw(&mut self, index: usize) {
        let canvas = self.canvas.as_mut();
        let scene = self.scenes[index].as_mut();

        canvas.clear();
        scene.draw(canvas);

        match self.kind {
            LoopKind::Plain => {
                scene.update();
            }
            LoopKind::Decoration => {
                scene.update();

                let now = timestamp_us();
                let decoration = &mut self.decoration;
                if now.saturating_sub(decoration.fps_timestamp) >= FPS_INTERVAL_US {
                    decoration.last_fps = scene.average_fps();
                    if let Some(renderer) = decoration.renderer.as_mut() {
                        renderer.text(&format!("FPS: {}", decoration.last_fps));
                    }
                    decoration.fps_timestamp = now;
                }
                if let Some(renderer) = decoration.renderer.as_mut() {
                    renderer.render(canvas);
                }
            }
            LoopKind::Validation => {}
        }

        canvas.update(scene.name(), scene.base().frames());

        if self.kind == LoopKind::Validation {
            scene.set_running(false);
        }
    }

    fn finish_scene(&mut self, current: Current, quit: bool) {
        let canvas = self.canvas.as_mut();
        let scene = self.scenes[current.scene].as_mut();
        let info = scene.info_string();

        match current.status {
            SetupStatus::Success => {
                if self.kind == LoopKind::Validation {
                    let result = scene.validate(canvas);
                    log::info!("{}: Validation: {}", info, result.as_str());
                } else {
                    let fps = scene.average_fps();
                    let stats = scene.stats();
                    log::info!(
                        "{}: FPS: {} FrameTime: {:.3} ms",
                        info,
                        fps,
                        stats.average_frame_time * 1000.0
                    );
                    log::debug!(
                        "[loop] {} user {:.3} ms system {:.3} ms cpu {:.0}% shader compilation {:.3} ms",
                        scene.name(),
                        stats.average_user_time * 1000.0,
                        stats.average_system_time * 1000.0,
                        stats.cpu_busy_percent,
                        stats.shader_compilation_time * 1000.0
                    );
                }

                if !quit {
                    self.score_total += scene.average_fps() as u64;
                    self.benchmarks_run += 1;
                }
            }
            SetupStatus::Unsupported => log::info!("{}: Unsupported", info),
            SetupStatus::Failure => log::info!("{}: Set up failed", info),
        }

        if let Some(mut renderer) = self.decoration.renderer.take() {
            renderer.release(canvas);
        }

        let bench = &self.benchmarks[self.next];
        bench.teardown_scene(scene, canvas);

        self.current = None;
        self.next += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::Pixel;
    use crate::matrix::Mat4;
    use crate::scene::{SceneBase, ValidationResult};
    use std::cell::RefCell;
    use std::path::Path;
    use std::rc::Rc;

    #[derive(Default)]
    struct Trace {
        quit: bool,
        resets: u32,
        updates: u32,
        draws: Vec<String>,
        setups: Vec<String>,
        teardowns: Vec<String>,
        validations: u32,
    }

    struct FakeCanvas {
        trace: Rc<RefCell<Trace>>,
        projection: Mat4,
    }

    impl Canvas for FakeCanvas {
        fn init(&mut self) -> bool {
            true
        }
        fn reset(&mut self) -> bool {
            self.trace.borrow_mut().resets += 1;
            true
        }
        fn resize(&mut self, _width: i32, _height: i32) {}
        fn clear(&mut self) {}
        fn update(&mut self, _scene: &str, _frame: u32) {
            self.trace.borrow_mut().updates += 1;
        }
        fn visible(&mut self, _visible: bool) {}
        fn should_quit(&mut self) -> bool {
            self.trace.borrow().quit
        }
        fn print_info(&mut self) {}
        fn read_pixel(&mut self, _x: i32, _y: i32) -> Pixel {
            Pixel::default()
        }
        fn write_to_file(&mut self, _path: &Path) -> Result<(), Box<dyn std::error::Error>> {
            Ok(())
        }
        fn projection(&self) -> &Mat4 {
            &self.projection
        }
        fn width(&self) -> i32 {
            64
        }
        fn height(&self) -> i32 {
            64
        }
        fn gl(&self) -> Option<Rc<glow::Context>> {
            None
        }
    }

    struct FakeScene {
        base: SceneBase,
        fps: u32,
        status: SetupStatus,
        trace: Rc<RefCell<Trace>>,
    }

    impl Scene for FakeScene {
        fn base(&self) -> &SceneBase {
            &self.base
        }
        fn base_mut(&mut self) -> &mut SceneBase {
            &mut self.base
        }
        fn setup(&mut self, _canvas: &mut dyn Canvas) -> SetupStatus {
            self.trace.borrow_mut().setups.push(self.base.name().to_string());
            self.base.start();
            self.status
        }
        fn teardown(&mut self, _canvas: &mut dyn Canvas) {
            self.trace.borrow_mut().teardowns.push(self.base.name().to_string());
        }
        fn draw(&mut self, _canvas: &mut dyn Canvas) {
            self.trace.borrow_mut().draws.push(self.base.name().to_string());
        }
        fn validate(&mut self, _canvas: &mut dyn Canvas) -> ValidationResult {
            self.trace.borrow_mut().validations += 1;
            ValidationResult::Success
        }
        fn average_fps(&self) -> u32 {
            self.fps
        }
    }

    struct Fixture {
        trace: Rc<RefCell<Trace>>,
        scenes: Vec<Box<dyn Scene>>,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                trace: Rc::new(RefCell::new(Trace::default())),
                scenes: Vec::new(),
            }
        }

        fn scene(mut self, name: &str, fps: u32, status: SetupStatus) -> Self {
            self.scenes.push(Box::new(FakeScene {
                base: SceneBase::new(name),
                fps,
                status,
                trace: self.trace.clone(),
            }));
            self
        }

        fn build(self, benchmarks: &[&str], options: LoopOptions, kind: LoopKind) -> (MainLoop, Rc<RefCell<Trace>>) {
            let canvas = Box::new(FakeCanvas {
                trace: self.trace.clone(),
                projection: Mat4::identity(),
            });
            let benchmarks = benchmarks.iter().map(|b| Benchmark::parse(b)).collect();
            (MainLoop::new(canvas, self.scenes, benchmarks, options, kind), self.trace)
        }
    }

    fn count_steps(main_loop: &mut MainLoop, limit: usize) -> usize {
        let mut steps = 0;
        while main_loop.step() {
            steps += 1;
            assert!(steps <= limit, "loop did not terminate");
        }
        steps
    }

    #[test]
    fn test_step_returns_true_once_per_frame() {
        let (mut main_loop, trace) = Fixture::new()
            .scene("a", 10, SetupStatus::Success)
            .scene("b", 10, SetupStatus::Success)
            .build(&["a:nframes=3", "b:nframes=2"], LoopOptions::default(), LoopKind::Plain);

        assert_eq!(count_steps(&mut main_loop, 100), 5);
        assert!(!main_loop.step());

        let trace = trace.borrow();
        assert_eq!(trace.draws, vec!["a", "a", "a", "b", "b"]);
        assert_eq!(trace.updates, 5);
        assert_eq!(trace.teardowns, vec!["a", "b"]);
    }

    #[test]
    fn test_score_is_integer_average() {
        let (mut main_loop, _) = Fixture::new()
            .scene("a", 60, SetupStatus::Success)
            .scene("b", 30, SetupStatus::Success)
            .scene("c", 90, SetupStatus::Success)
            .build(&["a:nframes=1", "b:nframes=1", "c:nframes=1"], LoopOptions::default(), LoopKind::Plain);

        count_steps(&mut main_loop, 100);
        assert_eq!(main_loop.benchmarks_run(), 3);
        assert_eq!(main_loop.score(), 60);
    }

    #[test]
    fn test_quit_tears_down_without_scoring() {
        let (mut main_loop, trace) = Fixture::new()
            .scene("a", 60, SetupStatus::Success)
            .build(&["a:nframes=10"], LoopOptions::default(), LoopKind::Plain);

        assert!(main_loop.step());
        assert!(main_loop.step());
        trace.borrow_mut().quit = true;
        assert!(!main_loop.step());

        let trace = trace.borrow();
        assert_eq!(trace.draws.len(), 2);
        assert_eq!(trace.teardowns, vec!["a"]);
        assert_eq!(main_loop.benchmarks_run(), 0);
        assert_eq!(main_loop.score(), 0);
    }

    #[test]
    fn test_quit_between_scenes_skips_next_setup() {
        let (mut main_loop, trace) = Fixture::new()
            .scene("a", 60, SetupStatus::Success)
            .scene("b", 60, SetupStatus::Success)
            .build(&["a:nframes=1", "b:nframes=5"], LoopOptions::default(), LoopKind::Plain);

        assert!(main_loop.step());
        trace.borrow_mut().quit = true;
        assert!(!main_loop.step());

        let trace = trace.borrow();
        assert_eq!(trace.setups, vec!["a"]);
        assert_eq!(trace.draws, vec!["a"]);
        assert_eq!(trace.teardowns, vec!["a"]);
    }

    #[test]
    fn test_failed_setup_scores_nothing() {
        let (mut main_loop, trace) = Fixture::new()
            .scene("good", 40, SetupStatus::Success)
            .scene("bad", 1000, SetupStatus::Failure)
            .scene("odd", 1000, SetupStatus::Unsupported)
            .build(&["bad", "good:nframes=2", "odd"], LoopOptions::default(), LoopKind::Plain);

        count_steps(&mut main_loop, 100);

        let trace = trace.borrow();
        assert_eq!(trace.draws, vec!["good", "good"]);
        assert_eq!(trace.teardowns, vec!["bad", "good", "odd"]);
        assert_eq!(main_loop.score(), 40);
    }

    #[test]
    fn test_validation_draws_one_frame_per_scene() {
        let (mut main_loop, trace) = Fixture::new()
            .scene("a", 10, SetupStatus::Success)
            .scene("b", 10, SetupStatus::Success)
            .build(&["a", "b"], LoopOptions::default(), LoopKind::Validation);

        assert_eq!(count_steps(&mut main_loop, 100), 2);
        let trace = trace.borrow();
        assert_eq!(trace.draws, vec!["a", "b"]);
        assert_eq!(trace.validations, 2);
    }

    #[test]
    fn test_option_setter_changes_defaults() {
        let (mut main_loop, trace) = Fixture::new()
            .scene("a", 10, SetupStatus::Success)
            .build(&[":nframes=4", "a"], LoopOptions::default(), LoopKind::Plain);

        assert_eq!(count_steps(&mut main_loop, 100), 4);
        assert_eq!(trace.borrow().setups, vec!["a"]);
    }

    #[test]
    fn test_context_reset_unless_reused() {
        let (mut fresh, trace) = Fixture::new()
            .scene("a", 10, SetupStatus::Success)
            .build(&["a:nframes=1", "a:nframes=1"], LoopOptions::default(), LoopKind::Plain);
        count_steps(&mut fresh, 100);
        assert_eq!(trace.borrow().resets, 2);

        let options = LoopOptions {
            reuse_context: true,
            ..LoopOptions::default()
        };
        let (mut reused, trace) = Fixture::new()
            .scene("a", 10, SetupStatus::Success)
            .build(&["a:nframes=1", "a:nframes=1"], options, LoopKind::Plain);
        count_steps(&mut reused, 100);
        assert_eq!(trace.borrow().resets, 0);
    }

    #[test]
    fn test_run_forever_restarts() {
        let options = LoopOptions {
            run_forever: true,
            ..LoopOptions::default()
        };
        let (mut main_loop, trace) = Fixture::new()
            .scene("a", 10, SetupStatus::Success)
            .build(&["a:nframes=1"], options, LoopKind::Plain);

        for _ in 0..5 {
            assert!(main_loop.step());
        }
        assert_eq!(trace.borrow().setups.len(), 5);
    }

    #[test]
    fn test_run_forever_without_scenes_ends() {
        let options = LoopOptions {
            run_forever: true,
            ..LoopOptions::default()
        };
        let (mut main_loop, _) = Fixture::new()
            .scene("a", 10, SetupStatus::Success)
            .build(&[":duration=1"], options, LoopKind::Plain);
        assert!(!main_loop.step());
    }

    #[test]
    fn test_decoration_runs_like_plain_loop() {
        let (mut main_loop, trace) = Fixture::new()
            .scene("a", 10, SetupStatus::Success)
            .build(&["a:nframes=3"], LoopOptions::default(), LoopKind::Decoration);

        assert_eq!(count_steps(&mut main_loop, 100), 3);
        assert_eq!(trace.borrow().updates, 3);
        assert_eq!(main_loop.score(), 10);
    }
}
