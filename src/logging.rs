//! Structured logging setup: console plus a daily rolling file.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::warn;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Maximum number of rolled log files kept on disk.
const MAX_LOG_FILES: usize = 10;

const LOG_FILE_PREFIX: &str = "order-pipeline";

const DEFAULT_FILTER: &str = "info,order_pipeline=debug";

/// Default log directory under the user's data dir.
pub fn default_log_dir() -> PathBuf {
    let base = std::env::var("XDG_DATA_HOME")
        .or_else(|_| std::env::var("LOCALAPPDATA"))
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()))
                .join(".local")
                .join("share")
        });
    base.join("order-pipeline").join("logs")
}

/// Delete rolled log files beyond the newest [`MAX_LOG_FILES`]. Files
/// without our prefix are left alone.
pub fn prune_old_logs(log_dir: &Path) {
    let Ok(entries) = fs::read_dir(log_dir) else {
        return;
    };

    let mut rolled: Vec<(SystemTime, PathBuf)> = entries
        .flatten()
        .filter(|entry| {
            entry
                .file_name()
                .to_str()
                .is_some_and(|name| name.starts_with(LOG_FILE_PREFIX))
        })
        .filter_map(|entry| {
            let meta = entry.metadata().ok().filter(|m| m.is_file())?;
            let modified = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
            Some((modified, entry.path()))
        })
        .collect();

    if rolled.len() <= MAX_LOG_FILES {
        return;
    }
    rolled.sort_unstable_by(|a, b| b.0.cmp(&a.0));

    for (_, path) in rolled.drain(MAX_LOG_FILES..) {
        if let Err(e) = fs::remove_file(&path) {
            warn!(path = %path.display(), error = %e, "Could not prune log file");
        }
    }
}

/// Install the global subscriber. `RUST_LOG` overrides the default filter.
///
/// Keep the returned guard alive for the life of the process; dropping it
/// flushes and stops the file writer.
pub fn init(log_dir: &Path) -> std::io::Result<WorkerGuard> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    prune_old_logs(log_dir);
    fs::create_dir_all(log_dir)?;

    let file_appender = tracing_appender::rolling::daily(log_dir, LOG_FILE_PREFIX);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(true);
    let console_layer = fmt::layer().with_target(true);

    // A second init (tests, embedding apps) keeps the first subscriber.
    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .try_init();

    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prune_keeps_newest_files() {
        let dir = tempfile::tempdir().unwrap();
        for i in 0..(MAX_LOG_FILES + 3) {
            fs::write(dir.path().join(format!("{LOG_FILE_PREFIX}.2026-01-{:02}", i + 1)), "x")
                .unwrap();
        }
        fs::write(dir.path().join("unrelated.txt"), "keep").unwrap();

        prune_old_logs(dir.path());

        let remaining: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .flatten()
            .filter_map(|e| e.file_name().to_str().map(str::to_string))
            .filter(|n| n.starts_with(LOG_FILE_PREFIX))
            .collect();
        assert_eq!(remaining.len(), MAX_LOG_FILES);
        assert!(dir.path().join("unrelated.txt").exists());
    }

    #[test]
    fn prune_missing_dir_is_noop() {
        prune_old_logs(Path::new("/definitely/not/here"));
    }

    #[test]
    fn init_creates_log_dir() {
        let dir = tempfile::tempdir().unwrap();
        let log_dir = dir.path().join("logs");
        let _guard = init(&log_dir).unwrap();
        assert!(log_dir.is_dir());
    }
}
