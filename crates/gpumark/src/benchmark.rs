use std::path::Path;

use gpumark_common::parse_option_pairs;

use crate::canvas::Canvas;
use crate::scene::{Scene, SetupStatus};

/// One entry of the benchmark list: a scene name plus the options to run it
/// with. An empty scene name sets new option defaults for every scene.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Benchmark {
    pub scene: String,
    pub options: Vec<(String, String)>,
}

impl Benchmark {
    /// Parses `scene:opt=val:opt2=val2`.
    pub fn parse(description: &str) -> Self {
        let description = description.trim();
        let (scene, rest) = match description.split_once(':') {
            Some((scene, rest)) => (scene, rest),
            None => (description, ""),
        };

        Self {
            scene: scene.trim().to_string(),
            options: parse_option_pairs(rest),
        }
    }

    pub fn is_option_setter(&self) -> bool {
        self.scene.is_empty()
    }

    /// Applies this benchmark's options to `scene` and sets it up.
    pub fn setup_scene(&self, scene: &mut dyn Scene, canvas: &mut dyn Canvas) -> SetupStatus {
        scene.base_mut().reset_options();
        for (key, value) in &self.options {
            if !scene.base_mut().set_option(key, value) {
                log::warn!("[{}] Ignoring unknown or invalid option {}={}", scene.name(), key, value);
            }
        }

        if !scene.load() {
            return SetupStatus::Failure;
        }
        scene.setup(canvas)
    }

    pub fn teardown_scene(&self, scene: &mut dyn Scene, canvas: &mut dyn Canvas) {
        scene.teardown(canvas);
        scene.unload();
        scene.base_mut().reset_options();
    }

    /// Makes this benchmark's options the new defaults of every scene that
    /// knows them.
    pub fn apply_defaults(&self, scenes: &mut [Box<dyn Scene>]) {
        for (key, value) in &self.options {
            let mut known = false;
            for scene in scenes.iter_mut() {
                known |= scene.base_mut().set_option_default(key, value);
            }
            if !known {
                log::warn!("No scene has an option named '{}'", key);
            }
        }
    }
}

/// Reads one description per line, skipping blanks and `#` comments.
pub fn read_benchmark_file(path: &Path) -> Result<Vec<String>, Box<dyn std::error::Error>> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("Failed to read benchmark file {}: {}", path.display(), e))?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(str::to_string)
        .collect())
}

/// Resolves descriptions against the registered scenes. Unknown scenes are
/// reported and skipped. With no descriptions every scene runs once with
/// its defaults.
pub fn build_collection(descriptions: &[String], scenes: &[Box<dyn Scene>]) -> Vec<Benchmark> {
    if descriptions.is_empty() {
        return scenes
            .iter()
            .map(|s| Benchmark {
                scene: s.name().to_string(),
                options: Vec::new(),
            })
            .collect();
    }

    descriptions
        .iter()
        .map(|d| Benchmark::parse(d))
        .filter(|b| {
            let known = b.is_option_setter() || scenes.iter().any(|s| s.name() == b.scene);
            if !known {
                log::error!("Unknown scene '{}', skipping", b.scene);
            }
            known
        })
        .collect()
}

/// Logs every scene with its options, for `--list-scenes`.
pub fn list_scenes(scenes: &[Box<dyn Scene>]) {
    for scene in scenes {
        log::info!("[Scene] {}", scene.name());
        for (name, option) in scene.options() {
            let acceptable = if option.acceptable_values.is_empty() {
                String::new()
            } else {
                format!(" ({})", option.acceptable_values.join("|"))
            };
            log::info!(
                "  [Option] {}\n    Description: {}\n    Default Value: {}{}",
                name,
                option.description,
                option.default_value,
                acceptable
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::builtin_scenes;
    use std::io::Write;

    #[test]
    fn test_parse_description() {
        let b = Benchmark::parse("triangle:speed=45:duration=2");
        assert_eq!(b.scene, "triangle");
        assert_eq!(
            b.options,
            vec![
                ("speed".to_string(), "45".to_string()),
                ("duration".to_string(), "2".to_string())
            ]
        );
        assert!(!b.is_option_setter());
    }

    #[test]
    fn test_parse_option_setter() {
        let b = Benchmark::parse(":duration=2");
        assert!(b.is_option_setter());
        assert_eq!(b.options.len(), 1);
    }

    #[test]
    fn test_parse_bare_scene() {
        let b = Benchmark::parse("clear");
        assert_eq!(b.scene, "clear");
        assert!(b.options.is_empty());
    }

    #[test]
    fn test_collection_skips_unknown_scenes() {
        let scenes = builtin_scenes();
        let descriptions = vec!["clear".to_string(), "bogus:x=1".to_string(), ":duration=1".to_string()];
        let collection = build_collection(&descriptions, &scenes);
        assert_eq!(collection.len(), 2);
        assert_eq!(collection[0].scene, "clear");
        assert!(collection[1].is_option_setter());
    }

    #[test]
    fn test_empty_collection_runs_every_scene() {
        let scenes = builtin_scenes();
        let collection = build_collection(&[], &scenes);
        let names: Vec<_> = collection.iter().map(|b| b.scene.as_str()).collect();
        assert_eq!(names, vec!["clear", "triangle"]);
    }

    #[test]
    fn test_apply_defaults() {
        let mut scenes = builtin_scenes();
        Benchmark::parse(":duration=2.5").apply_defaults(&mut scenes);
        for scene in &scenes {
            assert_eq!(scene.base().option_f64("duration"), Some(2.5));
        }
    }

    #[test]
    fn test_read_benchmark_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "# comment\n\nclear:duration=1\n  triangle  ").unwrap();
        let lines = read_benchmark_file(file.path()).unwrap();
        assert_eq!(lines, vec!["clear:duration=1", "triangle"]);
    }
}
