//! Structured logging: console plus a daily-rolling file under the log dir.

use anyhow::Context;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::AppConfig;

/// Rolling file prefix; files are named `pos.YYYY-MM-DD`.
pub const LOG_FILE_PREFIX: &str = "pos";

/// Number of rolled log files kept on disk.
pub const MAX_LOG_FILES: usize = 10;

/// Install the global subscriber.
///
/// The returned guard flushes the file writer when dropped, so the host keeps
/// it alive for the lifetime of the process.
pub fn init(config: &AppConfig) -> anyhow::Result<WorkerGuard> {
    let env_filter = EnvFilter::try_new(&config.log_filter)
        .or_else(|_| EnvFilter::try_new(crate::config::DEFAULT_LOG_FILTER))
        .context("invalid log filter")?;

    fs::create_dir_all(&config.log_dir)
        .with_context(|| format!("create log dir {}", config.log_dir.display()))?;
    prune_old_logs(&config.log_dir, MAX_LOG_FILES);

    let file_appender = tracing_appender::rolling::daily(&config.log_dir, LOG_FILE_PREFIX);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(true);
    let console_layer = fmt::layer().with_target(true);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .context("install tracing subscriber")?;

    Ok(guard)
}

/// Remove rolled log files beyond the newest `keep`. Returns how many were removed.
pub fn prune_old_logs(log_dir: &Path, keep: usize) -> usize {
    if !log_dir.exists() {
        return 0;
    }

    let mut log_files: Vec<(PathBuf, std::time::SystemTime)> = Vec::new();
    if let Ok(entries) = fs::read_dir(log_dir) {
        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let is_log = path
                .file_name()
                .and_then(|n| n.to_str())
                .map(|name| name.starts_with("pos."))
                .unwrap_or(false);
            if is_log {
                let modified = entry
                    .metadata()
                    .ok()
                    .and_then(|m| m.modified().ok())
                    .unwrap_or(std::time::UNIX_EPOCH);
                log_files.push((path, modified));
            }
        }
    }

    // Newest first; ties broken by name so dated files sort predictably.
    log_files.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| b.0.cmp(&a.0)));

    let mut removed = 0;
    for (path, _) in log_files.iter().skip(keep) {
        match fs::remove_file(path) {
            Ok(()) => removed += 1,
            Err(e) => warn!("Failed to prune log file {}: {e}", path.display()),
        }
    }
    removed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prune_keeps_newest_and_ignores_other_files() {
        let dir = std::env::temp_dir().join("kedai_pos_test_prune_logs");
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();

        for day in 1..=5 {
            fs::write(dir.join(format!("pos.2025-01-0{day}")), "log").unwrap();
        }
        fs::write(dir.join("notes.txt"), "keep me").unwrap();

        let removed = prune_old_logs(&dir, 3);
        assert_eq!(removed, 2);

        let remaining: Vec<String> = fs::read_dir(&dir)
            .unwrap()
            .flatten()
            .filter_map(|e| e.file_name().into_string().ok())
            .collect();
        assert_eq!(remaining.len(), 4);
        assert!(remaining.contains(&"notes.txt".to_string()));

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_prune_missing_dir_is_noop() {
        let dir = std::env::temp_dir().join("kedai_pos_test_no_such_logs");
        let _ = fs::remove_dir_all(&dir);
        assert_eq!(prune_old_logs(&dir, 3), 0);
    }
}
