use std::path::PathBuf;

/// System-wide configuration, read when the user has none.
pub const SYSTEM_CONFIG_DIR: &str = "/etc/gpumark";

const CONFIG_FILE: &str = "config.toml";

/// Per-user gpumark locations.
///
/// `GPUMARK_CONFIG_DIR` and `GPUMARK_LOG_DIR` win over the XDG base
/// directories. Empty variables count as unset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dirs {
    pub config: PathBuf,
    pub logs: PathBuf,
}

impl Dirs {
    pub fn from_env() -> Self {
        Self::resolve(|key| std::env::var_os(key).map(PathBuf::from))
    }

    fn resolve(lookup: impl Fn(&str) -> Option<PathBuf>) -> Self {
        let var = |key: &str| lookup(key).filter(|p| !p.as_os_str().is_empty());
        let home = var("HOME");
        let base = |xdg: &str, under_home: &[&str]| {
            var(xdg)
                .or_else(|| home.as_ref().map(|h| under_home.iter().fold(h.clone(), |p, c| p.join(c))))
                .unwrap_or_else(std::env::temp_dir)
        };

        let config = var("GPUMARK_CONFIG_DIR").unwrap_or_else(|| base("XDG_CONFIG_HOME", &[".config"]).join("gpumark"));
        let logs = var("GPUMARK_LOG_DIR")
            .unwrap_or_else(|| base("XDG_STATE_HOME", &[".local", "state"]).join("gpumark").join("logs"));

        Self { config, logs }
    }

    /// Config files in load order: the user's, then the system one.
    pub fn config_search_paths(&self) -> Vec<PathBuf> {
        vec![
            self.config.join(CONFIG_FILE),
            PathBuf::from(SYSTEM_CONFIG_DIR).join(CONFIG_FILE),
        ]
    }
}
