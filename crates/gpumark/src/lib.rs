pub mod benchmark;
pub mod canvas;
pub mod config;
pub mod gl_state;
pub mod main_loop;
pub mod matrix;
pub mod native;
pub mod options;
pub mod quit;
pub mod scene;
pub mod shader;
pub mod swap_chain;
pub mod text_renderer;
pub mod visual_config;
pub mod window;

#[cfg(target_os = "android")]
pub mod android_glue;

use benchmark::{build_collection, read_benchmark_file};
use canvas::{Canvas, CanvasOptions, NativeCanvas};
use gl_state::GlOptions;
use main_loop::MainLoop;
use native::NativeState;
use options::Settings;

/// Builds the canvas on top of `native`, brings it up and wraps it in the
/// loop selected by `settings`.
pub fn create_main_loop(
    settings: &Settings,
    native: Box<dyn NativeState>,
) -> Result<MainLoop, Box<dyn std::error::Error>> {
    let scenes = scene::builtin_scenes();

    let mut descriptions = settings.benchmarks.clone();
    if let Some(path) = &settings.benchmark_file {
        descriptions.extend(read_benchmark_file(path)?);
    }
    let benchmarks = build_collection(&descriptions, &scenes);
    if benchmarks.iter().all(|b| b.is_option_setter()) {
        return Err("No benchmarks to run".into());
    }

    let gl_state = gl_state::create(
        settings.winsys,
        GlOptions {
            swap_mode: settings.swap_mode,
            good_config: settings.good_config,
        },
    )?;

    let mut canvas = NativeCanvas::new(
        native,
        gl_state,
        CanvasOptions {
            width: settings.width,
            height: settings.height,
            fullscreen: settings.fullscreen,
            offscreen: settings.offscreen,
            frame_end: settings.frame_end,
            visual_config: settings.visual_config,
        },
    );

    if !canvas.init() {
        return Err("Failed to initialize the canvas".into());
    }

    log::info!("=======================================================");
    log::info!("    gpumark {}", env!("CARGO_PKG_VERSION"));
    log::info!("=======================================================");
    canvas.print_info();

    Ok(MainLoop::new(
        Box::new(canvas),
        scenes,
        benchmarks,
        settings.loop_options,
        settings.loop_kind,
    ))
}
