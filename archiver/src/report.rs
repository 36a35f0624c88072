use serde::Serialize;
use std::fmt;
use std::path::PathBuf;

use crate::fetch::FetchFailure;
use crate::target::FetchTarget;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ArchiveStatus {
    /// Canonical and archive copies written
    Succeeded,
    /// The fetcher exhausted its attempt budget or the run was cancelled
    FetchFailed,
    /// Nothing usable on disk: the target directory or canonical copy could not be written
    WriteFailed,
    /// Canonical copy is in place, the archive copy is missing
    ArchiveWriteFailed,
}

impl ArchiveStatus {
    pub fn is_failure(self) -> bool {
        matches!(self, ArchiveStatus::FetchFailed | ArchiveStatus::WriteFailed)
    }
}

impl fmt::Display for ArchiveStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ArchiveStatus::Succeeded => "ok",
            ArchiveStatus::FetchFailed => "fetch failed",
            ArchiveStatus::WriteFailed => "write failed",
            ArchiveStatus::ArchiveWriteFailed => "archive copy failed",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ArchiveOutcome {
    pub target: FetchTarget,
    pub canonical_path: PathBuf,
    pub archive_path: Option<PathBuf>,
    pub status: ArchiveStatus,
    /// Set when `status` is `FetchFailed`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fetch_failure: Option<FetchFailure>,
    /// Set when a filesystem write failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub write_error: Option<String>,
    /// Attempts the fetcher used, 0 when it never ran
    pub attempts: u32,
}

impl ArchiveOutcome {
    pub fn succeeded(
        target: FetchTarget,
        canonical_path: PathBuf,
        archive_path: PathBuf,
        attempts: u32,
    ) -> Self {
        ArchiveOutcome {
            target,
            canonical_path,
            archive_path: Some(archive_path),
            status: ArchiveStatus::Succeeded,
            fetch_failure: None,
            write_error: None,
            attempts,
        }
    }

    pub fn fetch_failed(
        target: FetchTarget,
        canonical_path: PathBuf,
        failure: FetchFailure,
    ) -> Self {
        ArchiveOutcome {
            target,
            canonical_path,
            archive_path: None,
            status: ArchiveStatus::FetchFailed,
            attempts: failure.attempts,
            fetch_failure: Some(failure),
            write_error: None,
        }
    }

    pub fn write_failed(
        target: FetchTarget,
        canonical_path: PathBuf,
        status: ArchiveStatus,
        error: String,
        attempts: u32,
    ) -> Self {
        ArchiveOutcome {
            target,
            canonical_path,
            archive_path: None,
            status,
            fetch_failure: None,
            write_error: Some(error),
            attempts,
        }
    }

    pub fn name(&self) -> &str {
        &self.target.name
    }

    /// Short human readable cause, empty on success.
    pub fn detail(&self) -> String {
        match (&self.fetch_failure, &self.write_error) {
            (Some(failure), _) => format!(
                "{} after {} attempt(s): {}",
                failure.kind, failure.attempts, failure.message
            ),
            (None, Some(error)) => error.clone(),
            (None, None) => String::new(),
        }
    }
}

/// One outcome per requested target, in request order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    pub timestamp: String,
    pub outcomes: Vec<ArchiveOutcome>,
    pub succeeded: usize,
    /// Canonical copy written, archive copy missing
    pub degraded: usize,
    pub failed: usize,
}

impl RunReport {
    pub fn new(timestamp: &str) -> Self {
        RunReport {
            timestamp: timestamp.to_string(),
            ..RunReport::default()
        }
    }

    pub fn push(&mut self, outcome: ArchiveOutcome) {
        if outcome.status.is_failure() {
            self.failed += 1;
        } else if outcome.status == ArchiveStatus::Succeeded {
            self.succeeded += 1;
        } else {
            self.degraded += 1;
        }
        self.outcomes.push(outcome);
    }

    pub fn get(&self, name: &str) -> Option<&ArchiveOutcome> {
        self.outcomes.iter().find(|outcome| outcome.name() == name)
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
