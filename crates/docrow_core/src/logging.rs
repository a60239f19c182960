//! Process logging bootstrap.
//!
//! # Responsibility
//! - Start the rolling file logger once per process.
//! - Keep log lines metadata-only (`event=... module=... status=...`);
//!   record payloads are never logged.
//!
//! # Invariants
//! - Re-initializing with the same level and directory is a no-op.
//! - Re-initializing with a different level or directory is rejected.
//! - Initialization never panics.

use crate::config::LogConfig;
use flexi_logger::{
    Cleanup, Criterion, FileSpec, FlexiLoggerError, Logger, LoggerHandle, Naming, WriteMode,
};
use log::{error, info, LevelFilter};
use once_cell::sync::OnceCell;
use std::path::{Path, PathBuf};
use thiserror::Error;

const FILE_BASENAME: &str = "docrow";
const ROTATE_AT_BYTES: u64 = 8 * 1024 * 1024;
const KEEP_FILES: usize = 4;
const PANIC_TEXT_LIMIT: usize = 160;

static LOGGER: OnceCell<Installed> = OnceCell::new();
static PANIC_HOOK: OnceCell<()> = OnceCell::new();

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("unsupported log level `{0}`; expected trace|debug|info|warn|error")]
    UnsupportedLevel(String),
    #[error("log directory must be a non-empty absolute path, got `{}`", .0.display())]
    InvalidDir(PathBuf),
    #[error("create log directory `{}`: {source}", path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("start logger: {0}")]
    Backend(#[from] FlexiLoggerError),
    #[error("logging already runs at {active_level} in `{}`", active_dir.display())]
    AlreadyInitialized {
        active_level: LevelFilter,
        active_dir: PathBuf,
    },
}

struct Installed {
    level: LevelFilter,
    dir: PathBuf,
    _handle: LoggerHandle,
}

impl Installed {
    fn matches(&self, level: LevelFilter, dir: &Path) -> Result<(), LoggingError> {
        if self.level == level && self.dir == dir {
            return Ok(());
        }
        Err(LoggingError::AlreadyInitialized {
            active_level: self.level,
            active_dir: self.dir.clone(),
        })
    }
}

/// Starts file logging at `level` under the absolute directory `log_dir`.
pub fn init_logging(level: &str, log_dir: impl AsRef<Path>) -> Result<(), LoggingError> {
    let level = parse_level(level)?;
    let dir = check_dir(log_dir.as_ref())?;

    if let Some(installed) = LOGGER.get() {
        return installed.matches(level, &dir);
    }
    LOGGER
        .get_or_try_init(|| install(level, dir.clone()))?
        .matches(level, &dir)
}

/// Starts logging as configured. Returns `false` when no directory is set
/// and logging stays off.
pub fn init_from_config(config: &LogConfig) -> Result<bool, LoggingError> {
    match &config.dir {
        Some(dir) => init_logging(&config.level, dir).map(|()| true),
        None => Ok(false),
    }
}

/// Active `(level, directory)`, or `None` before `init_logging` succeeded.
pub fn logging_status() -> Option<(LevelFilter, PathBuf)> {
    LOGGER
        .get()
        .map(|installed| (installed.level, installed.dir.clone()))
}

/// `debug` in debug builds, `info` in release builds.
pub fn default_log_level() -> &'static str {
    if cfg!(debug_assertions) {
        "debug"
    } else {
        "info"
    }
}

fn install(level: LevelFilter, dir: PathBuf) -> Result<Installed, LoggingError> {
    std::fs::create_dir_all(&dir).map_err(|source| LoggingError::CreateDir {
        path: dir.clone(),
        source,
    })?;

    let handle = Logger::try_with_str(level.as_str())?
        .log_to_file(FileSpec::default().directory(dir.as_path()).basename(FILE_BASENAME))
        .rotate(
            Criterion::Size(ROTATE_AT_BYTES),
            Naming::Numbers,
            Cleanup::KeepLogFiles(KEEP_FILES),
        )
        .write_mode(WriteMode::BufferAndFlush)
        .append()
        .format_for_files(flexi_logger::detailed_format)
        .start()?;

    install_panic_hook();
    info!(
        "event=logging_init module=logging status=ok level={} log_dir={} version={}",
        level,
        dir.display(),
        env!("CARGO_PKG_VERSION")
    );
    Ok(Installed {
        level,
        dir,
        _handle: handle,
    })
}

fn parse_level(raw: &str) -> Result<LevelFilter, LoggingError> {
    let normalized = raw.trim().to_ascii_lowercase();
    let level = match normalized.as_str() {
        "warning" => LevelFilter::Warn,
        "off" => return Err(LoggingError::UnsupportedLevel(normalized)),
        other => other
            .parse::<LevelFilter>()
            .map_err(|_| LoggingError::UnsupportedLevel(normalized.clone()))?,
    };
    Ok(level)
}

fn check_dir(dir: &Path) -> Result<PathBuf, LoggingError> {
    if dir.as_os_str().is_empty() || !dir.is_absolute() {
        return Err(LoggingError::InvalidDir(dir.to_path_buf()));
    }
    Ok(dir.to_path_buf())
}

fn install_panic_hook() {
    if PANIC_HOOK.set(()).is_err() {
        return;
    }

    let previous = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let location = info
            .location()
            .map_or_else(|| "unknown".to_string(), |at| format!("{}:{}", at.file(), at.line()));
        let payload = info
            .payload()
            .downcast_ref::<&str>()
            .map(|text| (*text).to_string())
            .or_else(|| info.payload().downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "<opaque panic payload>".to_string());
        error!(
            "event=panic module=logging status=error location={} payload={}",
            location,
            single_line(&payload, PANIC_TEXT_LIMIT)
        );
        previous(info);
    }));
}

/// One-line form of `text`, cut to `limit` characters.
pub(crate) fn single_line(text: &str, limit: usize) -> String {
    let mut out: String = text
        .chars()
        .map(|c| if c == '\n' || c == '\r' { ' ' } else { c })
        .take(limit)
        .collect();
    if text.chars().nth(limit).is_some() {
        out.push_str("...");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::{
        check_dir, init_from_config, init_logging, logging_status, parse_level, single_line,
        LoggingError,
    };
    use crate::config::LogConfig;
    use log::LevelFilter;
    use std::path::Path;

    #[test]
    fn levels_parse_case_insensitively() {
        assert_eq!(parse_level("INFO").unwrap(), LevelFilter::Info);
        assert_eq!(parse_level(" warning ").unwrap(), LevelFilter::Warn);
        assert!(matches!(
            parse_level("loud"),
            Err(LoggingError::UnsupportedLevel(level)) if level == "loud"
        ));
        assert!(parse_level("off").is_err());
    }

    #[test]
    fn relative_and_empty_dirs_are_rejected() {
        assert!(matches!(
            check_dir(Path::new("logs/dev")),
            Err(LoggingError::InvalidDir(_))
        ));
        assert!(check_dir(Path::new("")).is_err());
    }

    #[test]
    fn single_line_flattens_and_truncates() {
        assert_eq!(single_line("a\nb", 10), "a b");
        let out = single_line("line1\nline2\rline3", 8);
        assert_eq!(out, "line1 li...");
    }

    #[test]
    fn init_is_idempotent_and_rejects_conflicts() {
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();

        assert!(!init_from_config(&LogConfig {
            level: "info".to_string(),
            dir: None,
        })
        .unwrap());

        init_logging("info", first.path()).unwrap();
        init_logging("INFO", first.path()).unwrap();

        assert!(matches!(
            init_logging("debug", first.path()),
            Err(LoggingError::AlreadyInitialized { .. })
        ));
        assert!(matches!(
            init_logging("info", second.path()),
            Err(LoggingError::AlreadyInitialized { .. })
        ));

        let (level, dir) = logging_status().unwrap();
        assert_eq!(level, LevelFilter::Info);
        assert_eq!(dir, first.path());
    }
}
