//! Diagnostics for menu-sync.
//!
//! Provides:
//! - **Build info**: version, build timestamp, git SHA, target
//! - **Logging setup**: `EnvFilter` + console layer, plus a daily rolling
//!   file layer when a log directory is configured
//! - **Log rotation helpers**: pruning of old rolling log files

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::warn;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Maximum number of log files to retain.
pub const MAX_LOG_FILES: usize = 10;

/// File name prefix of the rolling log files (`menu-sync.YYYY-MM-DD`).
pub const LOG_FILE_PREFIX: &str = "menu-sync";

const DEFAULT_FILTER: &str = "info,menu_sync=debug";

// ---------------------------------------------------------------------------
// Build info
// ---------------------------------------------------------------------------

/// What was built, when, and for which target; logged once at start-up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildInfo {
    pub version: &'static str,
    pub built_at: &'static str,
    pub git_sha: &'static str,
    pub target: (&'static str, &'static str),
}

pub const BUILD_INFO: BuildInfo = BuildInfo {
    version: env!("CARGO_PKG_VERSION"),
    built_at: env!("BUILD_TIMESTAMP"),
    git_sha: env!("BUILD_GIT_SHA"),
    target: (std::env::consts::OS, std::env::consts::ARCH),
};

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

/// Install the global tracing subscriber.
///
/// The returned guard flushes the file writer on drop; keep it alive for the
/// lifetime of the process. Returns `None` when logging to console only.
/// Calling this twice leaves the first subscriber in place.
pub fn init_logging(log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let console_layer = fmt::layer().with_target(true);

    let Some(dir) = log_dir else {
        let _ = tracing_subscriber::registry()
            .with(env_filter)
            .with(console_layer)
            .try_init();
        return None;
    };

    prune_old_logs(dir);
    if let Err(e) = fs::create_dir_all(dir) {
        eprintln!("menu-sync: cannot create log dir {}: {e}", dir.display());
    }

    // Rolling file appender: creates daily log files in the logs directory
    let file_appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    let file_layer = fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(true);

    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .try_init();
    Some(guard)
}

/// Keep only the newest [`MAX_LOG_FILES`] rolling log files in `log_dir`.
/// Other files and a missing directory are left alone.
pub fn prune_old_logs(log_dir: &Path) {
    let Ok(entries) = fs::read_dir(log_dir) else {
        return;
    };
    let mut logs: Vec<(SystemTime, PathBuf)> = entries
        .flatten()
        .filter(|entry| {
            entry
                .file_name()
                .to_str()
                .is_some_and(|name| name.starts_with(LOG_FILE_PREFIX))
        })
        .filter_map(|entry| {
            let meta = entry.metadata().ok().filter(|m| m.is_file())?;
            Some((meta.modified().unwrap_or(UNIX_EPOCH), entry.path()))
        })
        .collect();

    logs.sort_unstable_by(|a, b| b.0.cmp(&a.0));
    for (_, path) in logs.into_iter().skip(MAX_LOG_FILES) {
        if let Err(err) = fs::remove_file(&path) {
            warn!(path = %path.display(), error = %err, "could not prune log file");
        }
    }
}
