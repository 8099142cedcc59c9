//! JNI entry points for the Android host app.
//!
//! The host's GL thread calls `nativeInit` once the surface exists,
//! `nativeRender` from every `onDrawFrame`, and `nativeDone` when the
//! activity goes away.

use std::cell::RefCell;
use std::ffi::c_void;

use clap::Parser;
use jni::objects::{JClass, JObject, JString};
use jni::sys::{jboolean, JNI_FALSE, JNI_TRUE};
use jni::JNIEnv;

use crate::config::Config;
use crate::main_loop::MainLoop;
use crate::native::android::NativeStateAndroid;
use crate::native::NativeOptions;
use crate::options::{Options, Settings};
use crate::quit::QuitFlag;

thread_local! {
    // All callbacks arrive on the host's GL thread.
    static MAIN_LOOP: RefCell<Option<MainLoop>> = const { RefCell::new(None) };
}

fn init(env: &mut JNIEnv, surface: &JObject, args: &JString) -> Result<MainLoop, Box<dyn std::error::Error>> {
    let args: String = env.get_string(args)?.into();
    let options = Options::try_parse_from(std::iter::once("gpumark").chain(args.split_whitespace()))?;
    let config = Config::load(options.config.as_deref())?;
    let settings = Settings::resolve(&options, &config)?;

    if gpumark_common::Logger::init(settings.debug, settings.log_file).is_err() {
        // Already installed by an earlier init.
        log::debug!("[android] Reusing existing logger");
    }

    let native_options = NativeOptions {
        swap_mode: settings.swap_mode,
        winsys_options: settings.winsys_options.clone(),
        quit: QuitFlag::new(),
    };
    let native = unsafe {
        NativeStateAndroid::from_surface(env.get_raw() as *mut c_void, surface.as_raw() as *mut c_void, native_options)
    };

    crate::create_main_loop(&settings, Box::new(native))
}

#[no_mangle]
pub extern "system" fn Java_org_gpumark_GpumarkSurfaceView_nativeInit(
    mut env: JNIEnv,
    _class: JClass,
    surface: JObject,
    args: JString,
) -> jboolean {
    match init(&mut env, &surface, &args) {
        Ok(main_loop) => {
            MAIN_LOOP.with(|cell| *cell.borrow_mut() = Some(main_loop));
            JNI_TRUE
        }
        Err(e) => {
            log::error!("[android] {}", e);
            JNI_FALSE
        }
    }
}

/// Renders one frame. Returns false once the run has finished.
#[no_mangle]
pub extern "system" fn Java_org_gpumark_GpumarkSurfaceView_nativeRender(_env: JNIEnv, _class: JClass) -> jboolean {
    MAIN_LOOP.with(|cell| {
        let mut slot = cell.borrow_mut();
        let Some(main_loop) = slot.as_mut() else {
            return JNI_FALSE;
        };

        if main_loop.step() {
            return JNI_TRUE;
        }

        log::info!("gpumark Score: {}", main_loop.score());
        *slot = None;
        JNI_FALSE
    })
}

#[no_mangle]
pub extern "system" fn Java_org_gpumark_GpumarkSurfaceView_nativeDone(_env: JNIEnv, _class: JClass) {
    MAIN_LOOP.with(|cell| {
        if let Some(main_loop) = cell.borrow_mut().take() {
            log::debug!("[android] Stopping after {} benchmarks", main_loop.benchmarks_run());
        }
    });
}
