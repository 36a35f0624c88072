use chrono::{NaiveDateTime, Utc};
use log::{error, info, warn};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::thread;

use crate::cancel::CancelToken;
use crate::error::{ConfigError, ErrorKind};
use crate::fetch::{FetchConfig, FetchFailure, Fetcher, HttpTransport, Sleeper, THREAD_SLEEPER};
use crate::report::{ArchiveOutcome, ArchiveStatus, RunReport};
use crate::storage::{
    archive_path, canonical_path, ensure_dir, ensure_dir_under, format_timestamp, write_file,
};
use crate::target::{validate_targets, FetchTarget};

pub const DEFAULT_ROOT: &str = "assets/images/cw3e";

#[derive(Debug, Clone, PartialEq)]
pub struct ArchiverConfig {
    pub root_dir: PathBuf,
    /// Worker threads; 1 processes targets in order on the calling thread
    pub jobs: usize,
    pub fetch: FetchConfig,
}

impl Default for ArchiverConfig {
    fn default() -> Self {
        ArchiverConfig {
            root_dir: PathBuf::from(DEFAULT_ROOT),
            jobs: 1,
            fetch: FetchConfig::default(),
        }
    }
}

/// Fetches every target and keeps a canonical plus a timestamped copy of each.
///
/// A failing target never stops its siblings: every requested target ends up in the
/// report exactly once.
pub struct Archiver<'a> {
    transport: &'a dyn HttpTransport,
    config: ArchiverConfig,
    sleeper: &'a dyn Sleeper,
    cancel: CancelToken,
}

impl<'a> Archiver<'a> {
    pub fn new(transport: &'a dyn HttpTransport, config: ArchiverConfig) -> Self {
        Archiver {
            transport,
            config,
            sleeper: &THREAD_SLEEPER,
            cancel: CancelToken::default(),
        }
    }

    pub fn with_sleeper(mut self, sleeper: &'a dyn Sleeper) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Stamps the run in UTC so archive names keep sorting across DST changes.
    pub fn run(&self, targets: &[FetchTarget]) -> Result<RunReport, ConfigError> {
        self.run_at(targets, Utc::now().naive_utc())
    }

    /// Runs with an explicit run time, which names every archive copy of this run.
    pub fn run_at(
        &self,
        targets: &[FetchTarget],
        run_time: NaiveDateTime,
    ) -> Result<RunReport, ConfigError> {
        validate_targets(targets)?;
        self.config.fetch.validate()?;

        let timestamp = format_timestamp(&run_time);
        let jobs = self.config.jobs.max(1).min(targets.len());
        info!(
            "Starting download for {} targets ({} worker(s))",
            targets.len(),
            jobs
        );
        info!("Target root directory: {}", self.config.root_dir.display());

        let outcomes = if jobs <= 1 {
            targets
                .iter()
                .map(|target| self.process(target, &timestamp))
                .collect()
        } else {
            self.process_concurrently(targets, &timestamp, jobs)
        };

        let mut report = RunReport::new(&timestamp);
        for outcome in outcomes {
            report.push(outcome);
        }

        info!(
            "Finished: {} succeeded, {} degraded, {} failed",
            report.succeeded, report.degraded, report.failed
        );
        Ok(report)
    }

    fn process_concurrently(
        &self,
        targets: &[FetchTarget],
        timestamp: &str,
        jobs: usize,
    ) -> Vec<ArchiveOutcome> {
        let next = AtomicUsize::new(0);
        let slots: Mutex<Vec<Option<ArchiveOutcome>>> =
            Mutex::new(targets.iter().map(|_| None).collect());

        thread::scope(|scope| {
            for _ in 0..jobs {
                scope.spawn(|| loop {
                    let index = next.fetch_add(1, Ordering::SeqCst);
                    let Some(target) = targets.get(index) else {
                        break;
                    };
                    let outcome = self.process(target, timestamp);
                    let mut slots = slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
                    slots[index] = Some(outcome);
                });
            }
        });

        // scope re-raises worker panics, so every slot is filled here
        slots
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .into_iter()
            .flatten()
            .collect()
    }

    fn process(&self, target: &FetchTarget, timestamp: &str) -> ArchiveOutcome {
        let canonical = canonical_path(&self.config.root_dir, target);

        if self.cancel.is_cancelled() {
            warn!("Run cancelled, skipping site: {}", target.name);
            let failure = FetchFailure {
                kind: ErrorKind::Cancelled,
                message: "run cancelled before target started".to_string(),
                attempts: 0,
            };
            return ArchiveOutcome::fetch_failed(target.clone(), canonical, failure);
        }

        info!("Processing site: {}", target.name);

        let site_dir = self.config.root_dir.join(&target.name);
        if let Err(e) = prepare_dirs(&site_dir, &canonical) {
            let message = format!(
                "failed to create directory for {}: {}",
                canonical.display(),
                e
            );
            error!("{}", message);
            return ArchiveOutcome::write_failed(
                target.clone(),
                canonical,
                ArchiveStatus::WriteFailed,
                message,
                0,
            );
        }

        let fetched = match Fetcher::new(self.transport, &self.config.fetch)
            .with_sleeper(self.sleeper)
            .with_cancel(self.cancel.clone())
            .fetch(&target.source_url)
        {
            Ok(fetched) => fetched,
            Err(failure) => {
                error!(
                    "Failed to download image for site '{}' from {}: {}",
                    target.name, target.source_url, failure.message
                );
                return ArchiveOutcome::fetch_failed(target.clone(), canonical, failure);
            }
        };

        if let Err(e) = write_file(&canonical, &fetched.body) {
            let message = format!("failed to write {}: {}", canonical.display(), e);
            error!("{}", message);
            return ArchiveOutcome::write_failed(
                target.clone(),
                canonical,
                ArchiveStatus::WriteFailed,
                message,
                fetched.attempts,
            );
        }
        info!("Saved {} to {}", target.source_url, canonical.display());

        // Same-second reruns reuse the archive name; the later write wins.
        let archive = archive_path(&canonical, timestamp);
        if let Err(e) = write_file(&archive, &fetched.body) {
            let message = format!("failed to write archive copy {}: {}", archive.display(), e);
            warn!("{} (canonical copy is in place)", message);
            return ArchiveOutcome::write_failed(
                target.clone(),
                canonical,
                ArchiveStatus::ArchiveWriteFailed,
                message,
                fetched.attempts,
            );
        }
        info!("Archived copy saved to {}", archive.display());

        ArchiveOutcome::succeeded(target.clone(), canonical, archive, fetched.attempts)
    }
}

fn prepare_dirs(site_dir: &Path, canonical: &Path) -> std::io::Result<()> {
    match canonical.parent() {
        Some(parent) if parent.starts_with(site_dir) => ensure_dir_under(site_dir, parent),
        _ => ensure_dir(site_dir),
    }
}
