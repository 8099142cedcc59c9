use clap::builder::PossibleValuesParser;
use clap::Parser;
use gpumark_common::parse_option_pairs;
use std::path::PathBuf;

use crate::canvas::FrameEnd;
use crate::config::Config;
use crate::main_loop::{LoopKind, LoopOptions};
use crate::native::Winsys;
use crate::swap_chain::SwapMode;
use crate::visual_config::VisualConfig;
use crate::window::WindowProperties;

#[derive(Debug, Clone, Parser)]
#[command(name = "gpumark", version, about = "OpenGL (ES) 2.0 rendering benchmark")]
pub struct Options {
    /// Benchmark to run, `scene:opt=val:...`. Repeatable.
    #[arg(short = 'b', long = "benchmark", value_name = "BENCH")]
    pub benchmarks: Vec<String>,

    /// File with one benchmark description per line.
    #[arg(short = 'f', long, value_name = "FILE")]
    pub benchmark_file: Option<PathBuf>,

    /// Run a quick output validation test instead of benchmarking.
    #[arg(long)]
    pub validate: bool,

    /// How each frame ends.
    #[arg(long, value_parser = PossibleValuesParser::new(["default", "none", "swap", "finish", "readpixels"]))]
    pub frame_end: Option<String>,

    /// Presentation mode.
    #[arg(long, value_parser = PossibleValuesParser::new(["default", "immediate", "mailbox", "fifo"]))]
    pub swap_mode: Option<String>,

    /// Window size as WxH.
    #[arg(long, value_name = "WxH", allow_hyphen_values = true)]
    pub size: Option<String>,

    #[arg(long)]
    pub fullscreen: bool,

    /// Render to an offscreen framebuffer.
    #[arg(long)]
    pub offscreen: bool,

    /// Keep the same GL context for all scenes.
    #[arg(long)]
    pub reuse_context: bool,

    /// Restart the benchmark list after the last scene.
    #[arg(long)]
    pub run_forever: bool,

    /// Show an FPS counter on screen.
    #[arg(long)]
    pub annotate: bool,

    /// Requested visual config, e.g. `r=8:g=8:b=8:a=8:d=24`.
    #[arg(long, value_name = "STR")]
    pub visual_config: Option<String>,

    /// Fail instead of continuing when no config matches the request.
    #[arg(long)]
    pub good_config: bool,

    /// Window system to present with.
    #[arg(long, value_name = "NAME")]
    pub winsys: Option<String>,

    /// Window system options as `key=value:key2=value2`.
    #[arg(long, value_name = "OPTS")]
    pub winsys_options: Option<String>,

    /// List the available scenes and their options.
    #[arg(short = 'l', long)]
    pub list_scenes: bool,

    #[arg(long)]
    pub debug: bool,

    /// Also write the log to a session file.
    #[arg(long)]
    pub log_file: bool,

    /// Config file to load instead of the default locations.
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,
}

/// Command line merged over the config file, with every value parsed.
#[derive(Debug, Clone)]
pub struct Settings {
    pub width: i32,
    pub height: i32,
    pub fullscreen: bool,
    pub offscreen: bool,
    pub frame_end: FrameEnd,
    pub swap_mode: SwapMode,
    pub visual_config: VisualConfig,
    pub good_config: bool,
    pub winsys: Winsys,
    pub winsys_options: Vec<(String, String)>,
    pub benchmarks: Vec<String>,
    pub benchmark_file: Option<PathBuf>,
    pub loop_kind: LoopKind,
    pub loop_options: LoopOptions,
    pub list_scenes: bool,
    pub debug: bool,
    pub log_file: bool,
}

impl Settings {
    pub fn resolve(options: &Options, config: &Config) -> Result<Self, Box<dyn std::error::Error>> {
        let size = options.size.as_deref().unwrap_or(&config.display.size);
        let (width, height) = WindowProperties::parse_size(size)
            .ok_or_else(|| format!("Invalid size '{}', expected WxH", size))?;
        let fullscreen = options.fullscreen || config.display.fullscreen || (width, height) == (-1, -1);

        let frame_end: FrameEnd = options
            .frame_end
            .as_deref()
            .unwrap_or(&config.display.frame_end)
            .parse()?;
        let swap_mode: SwapMode = options
            .swap_mode
            .as_deref()
            .unwrap_or(&config.display.swap_mode)
            .parse()?;

        let visual_config = options
            .visual_config
            .as_deref()
            .unwrap_or(&config.display.visual_config)
            .parse::<VisualConfig>()?;

        let winsys = match options.winsys.as_deref().unwrap_or(&config.display.winsys) {
            "" => Winsys::detect(),
            name => name.parse::<Winsys>()?,
        };

        let mut winsys_options = Vec::new();
        if winsys == Winsys::Drm && !config.display.drm_device.is_empty() {
            winsys_options.push(("drm-device".to_string(), config.display.drm_device.clone()));
        }
        if let Some(extra) = &options.winsys_options {
            winsys_options.extend(parse_option_pairs(extra));
        }

        let benchmarks = if options.benchmarks.is_empty() && options.benchmark_file.is_none() {
            config.run.benchmarks.clone()
        } else {
            options.benchmarks.clone()
        };

        let loop_kind = if options.validate {
            LoopKind::Validation
        } else if options.annotate {
            LoopKind::Decoration
        } else {
            LoopKind::Plain
        };

        Ok(Self {
            width,
            height,
            fullscreen,
            offscreen: options.offscreen,
            frame_end,
            swap_mode,
            visual_config,
            good_config: options.good_config || config.run.good_config,
            winsys,
            winsys_options,
            benchmarks,
            benchmark_file: options.benchmark_file.clone(),
            loop_kind,
            loop_options: LoopOptions {
                reuse_context: options.reuse_context || config.run.reuse_context,
                run_forever: options.run_forever || config.run.run_forever,
            },
            list_scenes: options.list_scenes,
            debug: options.debug || config.log.debug,
            log_file: options.log_file || config.log.file,
        })
    }
}
