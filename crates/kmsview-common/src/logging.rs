use chrono::Local;
use log::{Level, LevelFilter, Metadata, Record};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::paths::kmsview_log_dir;

/// Logger writing one directory per run under the data dir.
///
/// Info and above go to `kmsview.log`, debug and trace to `kmsview.dbg.log`.
/// Every record is mirrored to stderr; `stderr_level` bounds what is echoed
/// so `--verbose` can be toggled without losing the debug file.
pub struct FileLogger {
    main_file: Mutex<File>,
    debug_file: Mutex<File>,
    stderr_level: LevelFilter,
}

impl FileLogger {
    pub fn init_with_stderr_level(level: LevelFilter) -> Result<(), Box<dyn std::error::Error>> {
        Self::init_in(&kmsview_log_dir(), level)
    }

    fn init_in(log_dir: &Path, stderr_level: LevelFilter) -> Result<(), Box<dyn std::error::Error>> {
        let (session_num, session_dir) = Self::create_session_dir(log_dir)?;
        let logger = Self::open_in(&session_dir, stderr_level)?;

        log::set_max_level(LevelFilter::Debug);
        log::set_logger(Box::leak(Box::new(logger)))
            .map_err(|e| format!("Failed to set logger: {}", e))?;

        let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S");
        log::info!("=== kmsview session {} ===", session_num);
        log::info!("Log directory: {}", session_dir.display());
        log::info!("Started at: {}", timestamp);

        Ok(())
    }

    fn open_in(session_dir: &Path, stderr_level: LevelFilter) -> Result<Self, Box<dyn std::error::Error>> {
        let main_file = Self::open_log_file(session_dir, "kmsview.log")?;
        let debug_file = Self::open_log_file(session_dir, "kmsview.dbg.log")?;
        Ok(FileLogger {
            main_file: Mutex::new(main_file),
            debug_file: Mutex::new(debug_file),
            stderr_level,
        })
    }

    fn create_session_dir(log_dir: &Path) -> Result<(u32, PathBuf), Box<dyn std::error::Error>> {
        fs::create_dir_all(log_dir)?;

        let session_num = Self::get_next_session_number(log_dir);
        let session_dir = log_dir.join(format!("session-{}", session_num));
        fs::create_dir_all(&session_dir)?;

        Ok((session_num, session_dir))
    }

    fn open_log_file(dir: &Path, name: &str) -> Result<File, Box<dyn std::error::Error>> {
        let path = dir.join(name);
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&path)?;
        Ok(file)
    }

    fn get_next_session_number(log_dir: &Path) -> u32 {
        let mut max_num = 0u32;

        if let Ok(entries) = fs::read_dir(log_dir) {
            for entry in entries.flatten() {
                let name = entry.file_name();
                let name_str = name.to_string_lossy();

                if let Some(rest) = name_str.strip_prefix("session-") {
                    if let Ok(num) = rest.parse::<u32>() {
                        max_num = max_num.max(num);
                    }
                }
            }
        }

        max_num + 1
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

impl log::Log for FileLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= Level::Debug
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let timestamp = Local::now().format("%H:%M:%S%.3f");
        let log_line = format!("{} {} {}\n", timestamp, record.target(), record.args());

        let file_mutex = if record.level() >= Level::Debug {
            &self.debug_file
        } else {
            &self.main_file
        };

        if let Ok(mut file) = file_mutex.lock() {
            let _ = file.write_all(log_line.as_bytes());
            let _ = file.flush();
        }

        if record.level() <= self.stderr_level {
            eprint!("{} {} {}", timestamp, level_char(record.level()), log_line);
        }
    }

    fn flush(&self) {
        let _ = self.main_file.lock().map(|mut f| f.flush());
        let _ = self.debug_file.lock().map(|mut f| f.flush());
    }
}
