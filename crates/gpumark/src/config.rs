use gpumark_common::Dirs;
use serde::Deserialize;
use std::path::{Path, PathBuf};

fn default_size() -> String {
    "800x600".to_string()
}
fn default_swap_mode() -> String {
    "default".to_string()
}
fn default_frame_end() -> String {
    "default".to_string()
}

/// Defaults read from `config.toml`. Command line flags take precedence.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub display: DisplayConfig,
    pub run: RunConfig,
    pub log: LogConfig,

    /// File the values came from, `None` for built-in defaults.
    #[serde(skip)]
    pub source: Option<PathBuf>,
    /// Problems hit while searching for a config file. Reported once the
    /// logger is up.
    #[serde(skip)]
    pub warnings: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default, rename_all = "kebab-case")]
pub struct DisplayConfig {
    #[serde(default = "default_size")]
    pub size: String,

    pub fullscreen: bool,

    /// Empty picks a window system from the environment.
    pub winsys: String,

    /// Empty lets the DRM backend probe for a device.
    pub drm_device: String,

    #[serde(default = "default_swap_mode")]
    pub swap_mode: String,

    #[serde(default = "default_frame_end")]
    pub frame_end: String,

    pub visual_config: String,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            size: default_size(),
            fullscreen: false,
            winsys: String::new(),
            drm_device: String::new(),
            swap_mode: default_swap_mode(),
            frame_end: default_frame_end(),
            visual_config: String::new(),
        }
    }
}

#[derive(Debug, Default, Deserialize, Clone)]
#[serde(default, rename_all = "kebab-case")]
pub struct RunConfig {
    pub reuse_context: bool,
    pub run_forever: bool,
    pub good_config: bool,
    pub benchmarks: Vec<String>,
}

#[derive(Debug, Default, Deserialize, Clone)]
#[serde(default)]
pub struct LogConfig {
    pub debug: bool,
    pub file: bool,
}

impl Config {
    /// Loads `explicit` if given (a failure there is fatal), else the first
    /// readable file of the user and system locations, else defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self, Box<dyn std::error::Error>> {
        if let Some(path) = explicit {
            let mut config = Self::load_from_path(path)
                .map_err(|e| format!("Failed to load config {}: {}", path.display(), e))?;
            config.source = Some(path.to_path_buf());
            return Ok(config);
        }

        Ok(Self::load_first(&Dirs::from_env().config_search_paths()))
    }

    fn load_first(candidates: &[PathBuf]) -> Self {
        let mut warnings = Vec::new();

        for path in candidates {
            if !path.exists() {
                continue;
            }
            match Self::load_from_path(path) {
                Ok(mut config) => {
                    config.source = Some(path.clone());
                    config.warnings = warnings;
                    return config;
                }
                Err(e) => warnings.push(format!("Failed to load {}: {}", path.display(), e)),
            }
        }

        Self {
            warnings,
            ..Self::default()
        }
    }

    fn load_from_path(path: &Path) -> Result<Self, String> {
        let content =
            std::fs::read_to_string(path).map_err(|e| format!("Failed to read file: {}", e))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, String> {
        toml::from_str(content).map_err(|e| format!("Failed to parse TOML: {}", e))
    }

    pub fn log_source(&self) {
        for warning in &self.warnings {
            log::warn!("[config] {}", warning);
        }
        match &self.source {
            Some(path) => log::debug!("[config] Loaded config from {}", path.display()),
            None => log::debug!("[config] Using default configuration"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = Config::parse("").unwrap();
        assert_eq!(config.display.size, "800x600");
        assert_eq!(config.display.swap_mode, "default");
        assert_eq!(config.display.frame_end, "default");
        assert!(config.display.winsys.is_empty());
        assert!(!config.run.run_forever);
        assert!(config.run.benchmarks.is_empty());
        assert!(!config.log.debug);
    }

    #[test]
    fn test_parse_sections() {
        let config = Config::parse(
            r#"
            [display]
            size = "1920x1080"
            winsys = "drm"
            drm-device = "/dev/dri/card1"
            swap-mode = "mailbox"
            visual-config = "r=8:g=8:b=8"

            [run]
            reuse-context = true
            benchmarks = ["clear:duration=2", "triangle"]

            [log]
            file = true
            "#,
        )
        .unwrap();

        assert_eq!(config.display.size, "1920x1080");
        assert_eq!(config.display.winsys, "drm");
        assert_eq!(config.display.drm_device, "/dev/dri/card1");
        assert_eq!(config.display.swap_mode, "mailbox");
        assert_eq!(config.display.frame_end, "default");
        assert_eq!(config.display.visual_config, "r=8:g=8:b=8");
        assert!(config.run.reuse_context);
        assert!(!config.run.good_config);
        assert_eq!(config.run.benchmarks, vec!["clear:duration=2", "triangle"]);
        assert!(config.log.file);
        assert!(!config.log.debug);
    }

    #[test]
    fn test_invalid_toml_is_error() {
        assert!(Config::parse("[display\nsize = 3").is_err());
        assert!(Config::parse("[display]\nfullscreen = \"yes\"").is_err());
    }

    #[test]
    fn test_explicit_path_failure_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        assert!(Config::load(Some(&missing)).is_err());
    }

    #[test]
    fn test_search_falls_through_broken_file() {
        let dir = tempfile::tempdir().unwrap();
        let broken = dir.path().join("broken.toml");
        let good = dir.path().join("good.toml");
        let missing = dir.path().join("missing.toml");

        std::fs::File::create(&broken)
            .unwrap()
            .write_all(b"[run\n")
            .unwrap();
        std::fs::File::create(&good)
            .unwrap()
            .write_all(b"[run]\nrun-forever = true\n")
            .unwrap();

        let config = Config::load_first(&[missing.clone(), broken.clone(), good.clone()]);
        assert!(config.run.run_forever);
        assert_eq!(config.source, Some(good));
        assert_eq!(config.warnings.len(), 1);

        let config = Config::load_first(&[missing]);
        assert!(config.source.is_none());
        assert!(config.warnings.is_empty());
        assert_eq!(config.display.size, "800x600");
    }
}
