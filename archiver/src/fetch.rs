use log::{debug, info, warn};
use reqwest::blocking::Client;
use reqwest::header::CONTENT_TYPE;
use std::thread;
use std::time::Duration;

use crate::cancel::CancelToken;
use crate::error::{ConfigError, ErrorKind, FetchError};

/// Raw response as seen by the fetcher, before validation.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

/// A single blocking GET. Implementations must be shareable between worker threads.
pub trait HttpTransport: Send + Sync {
    fn get_bytes(&self, url: &str, timeout: Duration) -> Result<HttpResponse, FetchError>;
}

impl HttpTransport for Client {
    fn get_bytes(&self, url: &str, timeout: Duration) -> Result<HttpResponse, FetchError> {
        let response = self
            .get(url)
            .timeout(timeout)
            .send()
            .map_err(|e| transport_error(url, e))?;

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.to_string());
        let body = response
            .bytes()
            .map_err(|e| transport_error(url, e))?
            .to_vec();

        Ok(HttpResponse {
            status,
            content_type,
            body,
        })
    }
}

fn transport_error(url: &str, err: reqwest::Error) -> FetchError {
    if err.is_timeout() {
        FetchError::Timeout {
            url: url.to_string(),
            message: err.to_string(),
        }
    } else {
        FetchError::Transport {
            url: url.to_string(),
            message: err.to_string(),
        }
    }
}

/// Client shared by every target of a run.
pub fn build_client() -> reqwest::Result<Client> {
    Client::builder()
        .user_agent(concat!("forecast-archiver/", env!("CARGO_PKG_VERSION")))
        .build()
}

/// Exponential backoff between failed attempts: `unit * base^(attempt - 1)`,
/// optionally capped. No jitter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Backoff {
    pub base: u32,
    pub unit: Duration,
    pub max_delay: Option<Duration>,
}

impl Default for Backoff {
    fn default() -> Self {
        Backoff {
            base: 2,
            unit: Duration::from_secs(1),
            max_delay: None,
        }
    }
}

impl Backoff {
    /// Delay to wait after the given failed attempt (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1);
        let factor = self.base.checked_pow(exponent).unwrap_or(u32::MAX);
        let delay = self.unit.checked_mul(factor).unwrap_or(Duration::MAX);
        match self.max_delay {
            Some(cap) => delay.min(cap),
            None => delay,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FetchConfig {
    /// Bound on each individual attempt
    pub timeout: Duration,
    /// Total attempts, not additional retries
    pub max_attempts: u32,
    pub backoff: Backoff,
    /// Required prefix of the response's Content-Type
    pub expected_content_type: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        FetchConfig {
            timeout: Duration::from_secs(10),
            max_attempts: 3,
            backoff: Backoff::default(),
            expected_content_type: "image/".to_string(),
        }
    }
}

impl FetchConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_attempts == 0 {
            return Err(ConfigError::ZeroAttempts);
        }
        if self.timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout);
        }
        if self.backoff.base < 2 {
            return Err(ConfigError::BackoffBase(self.backoff.base));
        }
        Ok(())
    }
}

pub trait Sleeper: Send + Sync {
    fn sleep(&self, duration: Duration);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        thread::sleep(duration);
    }
}

pub(crate) static THREAD_SLEEPER: ThreadSleeper = ThreadSleeper;

/// A validated response body.
#[derive(Debug, Clone, PartialEq)]
pub struct Fetched {
    pub body: Vec<u8>,
    pub content_type: String,
    pub attempts: u32,
}

/// Diagnosis of the final attempt once the attempt budget is spent.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct FetchFailure {
    pub kind: ErrorKind,
    pub message: String,
    pub attempts: u32,
}

pub type FetchResult = Result<Fetched, FetchFailure>;

/// Checks status and declared media type. The bytes themselves are never decoded,
/// so a body that merely claims to be an image passes.
pub fn validate_response(
    url: &str,
    response: HttpResponse,
    expected_content_type: &str,
) -> Result<Fetched, FetchError> {
    if response.status != 200 {
        return Err(FetchError::HttpStatus {
            url: url.to_string(),
            status: response.status,
        });
    }

    let content_type = response.content_type.unwrap_or_default();
    if !content_type.starts_with(expected_content_type) {
        return Err(FetchError::InvalidContentType {
            url: url.to_string(),
            content_type,
            expected: expected_content_type.to_string(),
        });
    }

    Ok(Fetched {
        body: response.body,
        content_type,
        attempts: 0,
    })
}

/// Runs the attempt loop for one URL. Does not touch the filesystem.
pub struct Fetcher<'a> {
    transport: &'a dyn HttpTransport,
    config: &'a FetchConfig,
    sleeper: &'a dyn Sleeper,
    cancel: CancelToken,
}

impl<'a> Fetcher<'a> {
    pub fn new(transport: &'a dyn HttpTransport, config: &'a FetchConfig) -> Self {
        Fetcher {
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

    pub fn fetch(&self, url: &str) -> FetchResult {
        let max_attempts = self.config.max_attempts.max(1);
        let mut last_error: Option<FetchError> = None;
        let mut attempts_made = 0;

        for attempt in 1..=max_attempts {
            if self.cancel.is_cancelled() {
                return Err(cancelled(url, attempt, attempts_made, last_error.as_ref()));
            }

            debug!("Downloading {} (attempt {}/{})", url, attempt, max_attempts);
            attempts_made = attempt;

            let outcome = self
                .transport
                .get_bytes(url, self.config.timeout)
                .and_then(|response| {
                    validate_response(url, response, &self.config.expected_content_type)
                });

            match outcome {
                Ok(mut fetched) => {
                    fetched.attempts = attempt;
                    info!(
                        "Downloaded {} ({} bytes, {}) after {} attempt(s)",
                        url,
                        fetched.body.len(),
                        fetched.content_type,
                        attempt
                    );
                    return Ok(fetched);
                }
                Err(e) => {
                    warn!("Attempt {} failed: {}", attempt, e);
                    let retryable = e.is_retryable();
                    last_error = Some(e);
                    if !retryable {
                        break;
                    }
                    if attempt < max_attempts {
                        let delay = self.config.backoff.delay_after(attempt);
                        debug!("Retrying in {:?}...", delay);
                        self.sleeper.sleep(delay);
                    }
                }
            }
        }

        Err(match last_error {
            Some(e) => FetchFailure {
                kind: e.kind(),
                message: e.to_string(),
                attempts: attempts_made,
            },
            None => cancelled(url, 1, attempts_made, None),
        })
    }
}

fn cancelled(
    url: &str,
    attempt: u32,
    attempts_made: u32,
    previous: Option<&FetchError>,
) -> FetchFailure {
    let error = FetchError::Cancelled {
        url: url.to_string(),
        attempt,
    };
    let message = match previous {
        Some(prev) => format!("{} (previous attempt: {})", error, prev),
        None => error.to_string(),
    };
    FetchFailure {
        kind: error.kind(),
        message,
        attempts: attempts_made,
    }
}
