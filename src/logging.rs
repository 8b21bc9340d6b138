//! Logging for ntfs-collector
//!
//! Components never reach for a process-wide logger on their own. Each one
//! receives a [`LogContext`] that carries the volume it is working on and the
//! most verbose level it may emit. Records are forwarded to the `log` facade,
//! so nothing is printed unless the binary installed a sink via [`init`].

use log::{Level, LevelFilter};
use simplelog::{ColorChoice, Config, ConfigBuilder, TermLogger, TerminalMode, WriteLogger};
use std::fs::File;
use std::path::Path;

const LOG_TARGET: &str = "ntfs_collector";

/// Logging capability handed to every component
#[derive(Debug, Clone)]
pub struct LogContext {
    max_level: LevelFilter,
    volume: Option<char>,
}

impl Default for LogContext {
    fn default() -> Self {
        Self {
            max_level: LevelFilter::Trace,
            volume: None,
        }
    }
}

impl LogContext {
    /// Context that forwards everything up to `max_level`
    pub fn new(max_level: LevelFilter) -> Self {
        Self {
            max_level,
            volume: None,
        }
    }

    /// Context that drops every record
    pub fn silent() -> Self {
        Self::new(LevelFilter::Off)
    }

    /// Derive a context scoped to one volume
    pub fn for_volume(&self, letter: char) -> Self {
        Self {
            max_level: self.max_level,
            volume: Some(letter),
        }
    }

    /// Volume this context is scoped to
    pub fn volume(&self) -> Option<char> {
        self.volume
    }

    fn log(&self, level: Level, module: &str, message: &str) {
        if level > self.max_level {
            return;
        }
        match self.volume {
            Some(letter) => log::log!(target: LOG_TARGET, level, "[{}] [{}:] {}", module, letter, message),
            None => log::log!(target: LOG_TARGET, level, "[{}] {}", module, message),
        }
    }

    /// Log debug message
    pub fn debug(&self, module: &str, message: &str) {
        self.log(Level::Debug, module, message);
    }

    /// Log info message
    pub fn info(&self, module: &str, message: &str) {
        self.log(Level::Info, module, message);
    }

    /// Log warning message
    pub fn warn(&self, module: &str, message: &str) {
        self.log(Level::Warn, module, message);
    }

    /// Log error message
    pub fn error(&self, module: &str, message: &str) {
        self.log(Level::Error, module, message);
    }

    /// Write a separator line for readability
    pub fn separator(&self, label: &str) {
        self.info("---", &format!("========== {} ==========", label));
    }
}

/// Install the process log sink.
///
/// With a debug file every record down to `Debug` goes to that file.
/// Without one only errors reach the terminal.
pub fn init(debug_file: Option<&Path>) -> std::io::Result<LevelFilter> {
    let config = log_config();
    match debug_file {
        Some(path) => {
            let file = File::create(path)?;
            WriteLogger::init(LevelFilter::Debug, config, file)
                .map_err(std::io::Error::other)?;
            Ok(LevelFilter::Debug)
        }
        None => {
            TermLogger::init(
                LevelFilter::Error,
                config,
                TerminalMode::Stderr,
                ColorChoice::Auto,
            )
            .map_err(std::io::Error::other)?;
            Ok(LevelFilter::Error)
        }
    }
}

fn log_config() -> Config {
    ConfigBuilder::new()
        .set_target_level(LevelFilter::Off)
        .set_thread_level(LevelFilter::Debug)
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_volume_scope_is_inherited() {
        let root = LogContext::new(LevelFilter::Info);
        let scoped = root.for_volume('C');
        assert_eq!(scoped.volume(), Some('C'));
        assert_eq!(scoped.max_level, LevelFilter::Info);
        assert_eq!(root.volume(), None);
    }

    #[test]
    fn test_silent_context_does_not_panic() {
        let log = LogContext::silent().for_volume('D');
        log.debug("TEST", "dropped");
        log.error("TEST", "dropped");
        log.separator("dropped");
    }
}
