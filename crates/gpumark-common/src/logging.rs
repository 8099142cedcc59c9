use chrono::Local;
use log::{Level, LevelFilter, Metadata, Record};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

use crate::paths::Dirs;

/// Console logger in benchmark-report form, optionally mirrored into a
/// per-session log file.
pub struct Logger {
    debug: bool,
    file: Option<Mutex<File>>,
}

impl Logger {
    pub fn init(debug: bool, log_to_file: bool) -> Result<(), Box<dyn std::error::Error>> {
        let mut session = None;
        let file = if log_to_file {
            let log_dir = Dirs::from_env().logs;
            fs::create_dir_all(&log_dir)?;

            let session_num = next_session_number(&log_dir);
            let path = log_dir.join(format!("session-{}.log", session_num));
            session = Some((session_num, path.clone()));
            Some(Mutex::new(open_log_file(&path)?))
        } else {
            None
        };

        let logger = Logger { debug, file };

        log::set_max_level(if debug {
            LevelFilter::Debug
        } else {
            LevelFilter::Info
        });
        log::set_logger(Box::leak(Box::new(logger)))
            .map_err(|e| format!("Failed to set logger: {}", e))?;

        if let Some((num, path)) = session {
            log::debug!("=== gpumark session {} ===", num);
            log::debug!("Log file: {}", path.display());
            log::debug!("Started at: {}", Local::now().format("%Y-%m-%d %H:%M:%S"));
        }

        Ok(())
    }

    fn write_file(&self, record: &Record) {
        let Some(file) = &self.file else { return };

        let timestamp = Local::now().format("%H:%M:%S%.3f");
        let line = format!(
            "{} {} {} {}\n",
            timestamp,
            level_char(record.level()),
            record.target(),
            record.args()
        );

        if let Ok(mut file) = file.lock() {
            let _ = file.write_all(line.as_bytes());
        }
    }
}

impl log::Log for Logger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= Level::Info || (self.debug && metadata.level() == Level::Debug)
    }

    fn log(&self, record: &Record) {
        if self.file.is_some() && record.level() <= Level::Debug {
            self.write_file(record);
        }

        if !self.enabled(record.metadata()) {
            return;
        }

        match record.level() {
            Level::Error => eprintln!("Error: {}", record.args()),
            Level::Warn => eprintln!("Warning: {}", record.args()),
            Level::Info => println!("{}", record.args()),
            Level::Debug | Level::Trace => eprintln!("Debug: {}", record.args()),
        }
    }

    fn flush(&self) {
        let _ = std::io::stdout().flush();
        if let Some(file) = &self.file {
            let _ = file.lock().map(|mut f| f.flush());
        }
    }
}

fn level_char(level: Level) -> char {
    match level {
        Level::Error => 'E',
        Level::Warn => 'W',
        Level::Info => 'I',
        Level::Debug => 'D',
        Level::Trace => 'T',
    }
}

fn open_log_file(path: &Path) -> Result<File, Box<dyn std::error::Error>> {
    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(path)?;
    Ok(file)
}

fn next_session_number(log_dir: &Path) -> u32 {
    let mut max_num = 0u32;

    if let Ok(entries) = fs::read_dir(log_dir) {
        for entry in entries.flatten() {
            let name = entry.file_name();
            let name_str = name.to_string_lossy();

            if let Some(rest) = name_str.strip_prefix("session-") {
                if let Some(num_part) = rest.split('.').next() {
                    if let Ok(num) = num_part.parse::<u32>() {
                        max_num = max_num.max(num);
                    }
                }
            }
        }
    }

    max_num + 1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_number_empty_dir() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(next_session_number(dir.path()), 1);
    }

    #[test]
    fn test_session_number_skips_unrelated_files() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["session-3.log", "session-12.log", "notes.txt", "session-x.log"] {
            File::create(dir.path().join(name)).unwrap();
        }
        assert_eq!(next_session_number(dir.path()), 13);
    }

    #[test]
    fn test_level_chars() {
        assert_eq!(level_char(Level::Error), 'E');
        assert_eq!(level_char(Level::Debug), 'D');
    }
}
