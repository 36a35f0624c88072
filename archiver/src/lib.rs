pub mod archiver;
pub mod cancel;
pub mod error;
pub mod fetch;
pub mod report;
pub mod storage;
pub mod target;

#[cfg(test)]
pub mod tests;

// Re-export key types and functions for easier access
pub use crate::archiver::{Archiver, ArchiverConfig, DEFAULT_ROOT};
pub use crate::cancel::CancelToken;
pub use crate::error::{ConfigError, ErrorKind, FetchError};
pub use crate::fetch::{
    build_client, Backoff, FetchConfig, FetchFailure, FetchResult, Fetched, Fetcher,
    HttpResponse, HttpTransport, Sleeper, ThreadSleeper,
};
pub use crate::report::{ArchiveOutcome, ArchiveStatus, RunReport};
pub use crate::target::{FetchTarget, SiteEntry, TargetTable};
