use chrono::{NaiveDate, NaiveDateTime};
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::archiver::ArchiverConfig;
use crate::fetch::{Backoff, FetchConfig};

pub mod fetch_tests;
pub mod fixtures;

/// Run configuration rooted in a temporary directory, with millisecond backoff.
pub fn test_config(root: &Path) -> ArchiverConfig {
    ArchiverConfig {
        root_dir: root.to_path_buf(),
        jobs: 1,
        fetch: FetchConfig {
            timeout: Duration::from_secs(1),
            max_attempts: 3,
            backoff: Backoff {
                base: 2,
                unit: Duration::from_millis(1),
                max_delay: None,
            },
            expected_content_type: "image/".to_string(),
        },
    }
}

pub fn run_time(hour: u32, minute: u32, second: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2025, 1, 15)
        .unwrap()
        .and_hms_opt(hour, minute, second)
        .unwrap()
}

/// Sorted file names directly inside `dir`.
pub fn file_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = match fs::read_dir(dir) {
        Ok(entries) => entries
            .filter_map(Result::ok)
            .filter(|entry| entry.path().is_file())
            .map(|entry| entry.file_name().to_string_lossy().into_owned())
            .collect(),
        Err(_) => Vec::new(),
    };
    names.sort();
    names
}
