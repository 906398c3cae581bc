//! Upload lifecycle: immediate removal after failed conversions and a
//! periodic age-based sweep of the upload and output directories.
//!
//! Both paths tolerate files vanishing underneath them. A request may finish
//! and its file be swept, or a sweep may race another sweep; "already gone"
//! is never an error.

use crate::config::ServerConfig;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Best-effort delete of a single stored upload.
///
/// Returns `true` when a file was actually removed. Failures are logged and
/// swallowed.
pub async fn remove_upload(path: &Path) -> bool {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {
            info!("janitor: removed {}", path.display());
            true
        }
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!("janitor: {} already gone", path.display());
            false
        }
        Err(e) => {
            warn!("janitor: could not remove {}: {}", path.display(), e);
            false
        }
    }
}

/// Outcome of one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Regular files inspected.
    pub scanned: usize,
    /// Files deleted for exceeding the retention window.
    pub removed: usize,
    /// Files that were old enough but could not be deleted.
    pub failed: usize,
}

/// Delete every regular file in `dir` last modified more than `max_age` ago.
///
/// A missing directory is an empty sweep.
pub async fn sweep(dir: &Path, max_age: Duration) -> SweepReport {
    sweep_at(dir, max_age, SystemTime::now()).await
}

async fn sweep_at(dir: &Path, max_age: Duration, now: SystemTime) -> SweepReport {
    let mut report = SweepReport::default();

    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!("janitor: {} does not exist, nothing to sweep", dir.display());
            return report;
        }
        Err(e) => {
            warn!("janitor: cannot read {}: {}", dir.display(), e);
            return report;
        }
    };

    loop {
        let entry = match entries.next_entry().await {
            Ok(Some(entry)) => entry,
            Ok(None) => break,
            Err(e) => {
                warn!("janitor: error listing {}: {}", dir.display(), e);
                break;
            }
        };

        // Entries can disappear between listing and stat.
        let Ok(metadata) = entry.metadata().await else {
            continue;
        };
        if !metadata.is_file() {
            continue;
        }
        report.scanned += 1;

        let Ok(modified) = metadata.modified() else {
            continue;
        };
        let age = now.duration_since(modified).unwrap_or(Duration::ZERO);
        if age <= max_age {
            continue;
        }

        match tokio::fs::remove_file(entry.path()).await {
            Ok(()) => {
                debug!(
                    "janitor: expired {} (age {}s)",
                    entry.path().display(),
                    age.as_secs()
                );
                report.removed += 1;
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => {
                warn!("janitor: could not remove {}: {}", entry.path().display(), e);
                report.failed += 1;
            }
        }
    }

    report
}

/// Run [`sweep`] over each of `dirs` every `every`, starting immediately,
/// until the runtime shuts down or the handle is aborted.
pub fn spawn_janitor(dirs: Vec<PathBuf>, max_age: Duration, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            for dir in &dirs {
                let report = sweep(dir, max_age).await;
                if report.removed > 0 || report.failed > 0 {
                    info!(
                        "janitor: swept {}: {} scanned, {} removed, {} failed",
                        dir.display(),
                        report.scanned,
                        report.removed,
                        report.failed
                    );
                } else {
                    debug!("janitor: swept {}: {} scanned", dir.display(), report.scanned);
                }
            }
        }
    })
}

/// Janitor for everything the service writes: stored uploads and the raw
/// Markdown next to them, both under the configured retention window.
pub fn spawn_retention_janitor(config: &ServerConfig) -> JoinHandle<()> {
    spawn_janitor(
        vec![config.upload_dir.clone(), config.output_dir.clone()],
        config.retention.max_age,
        config.retention.sweep_interval,
    )
}
