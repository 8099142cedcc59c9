use std::process::ExitCode;

use clap::Parser;
use gpumark::benchmark::list_scenes;
use gpumark::config::Config;
use gpumark::main_loop::LoopKind;
use gpumark::native::{self, NativeOptions};
use gpumark::options::{Options, Settings};
use gpumark::quit::QuitFlag;
use gpumark::scene::builtin_scenes;
use gpumark_common::Logger;

fn main() -> ExitCode {
    let options = Options::parse();

    let config = match Config::load(options.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let settings = match Settings::resolve(&options, &config) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = Logger::init(settings.debug, settings.log_file) {
        eprintln!("Error: {}", e);
        return ExitCode::FAILURE;
    }
    config.log_source();

    if settings.list_scenes {
        list_scenes(&builtin_scenes());
        return ExitCode::SUCCESS;
    }

    match run(&settings) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(settings: &Settings) -> Result<(), Box<dyn std::error::Error>> {
    let quit = QuitFlag::with_signals()?;

    log::debug!("[main] Using {} window system", settings.winsys);
    let native = native::create(
        settings.winsys,
        NativeOptions {
            swap_mode: settings.swap_mode,
            winsys_options: settings.winsys_options.clone(),
            quit,
        },
    )?;

    let mut main_loop = gpumark::create_main_loop(settings, native)?;

    while main_loop.step() {}

    if main_loop.kind() != LoopKind::Validation {
        log::info!("=======================================================");
        log::info!("                                  gpumark Score: {}", main_loop.score());
        log::info!("=======================================================");
    }

    Ok(())
}
