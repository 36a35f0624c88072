use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use crate::cancel::CancelToken;
use crate::error::FetchError;
use crate::fetch::{HttpResponse, HttpTransport, Sleeper};

/// One scripted reply of the stub transport.
#[derive(Debug, Clone)]
pub enum Reply {
    Response(HttpResponse),
    ConnectionRefused,
    TimedOut,
}

impl Reply {
    pub fn image(body: &[u8]) -> Reply {
        Reply::Response(HttpResponse {
            status: 200,
            content_type: Some("image/png".to_string()),
            body: body.to_vec(),
        })
    }

    pub fn status(status: u16) -> Reply {
        Reply::Response(HttpResponse {
            status,
            content_type: Some("text/plain".to_string()),
            body: b"server error".to_vec(),
        })
    }

    pub fn html() -> Reply {
        Reply::Response(HttpResponse {
            status: 200,
            content_type: Some("text/html".to_string()),
            body: b"<html><body>Not Found</body></html>".to_vec(),
        })
    }
}

/// Scripted transport: each URL plays its replies in order and repeats the last one.
/// Unknown URLs behave like a refused connection.
#[derive(Default)]
pub struct StubTransport {
    scripts: Mutex<HashMap<String, Vec<Reply>>>,
    calls: Mutex<HashMap<String, u32>>,
}

impl StubTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(self, url: &str, replies: Vec<Reply>) -> Self {
        self.replace(url, replies);
        self
    }

    pub fn always(self, url: &str, reply: Reply) -> Self {
        self.script(url, vec![reply])
    }

    /// Swaps the script for `url` and resets its call counter.
    pub fn replace(&self, url: &str, replies: Vec<Reply>) {
        self.scripts.lock().unwrap().insert(url.to_string(), replies);
        self.calls.lock().unwrap().remove(url);
    }

    pub fn calls(&self, url: &str) -> u32 {
        self.calls.lock().unwrap().get(url).copied().unwrap_or(0)
    }
}

impl HttpTransport for StubTransport {
    fn get_bytes(&self, url: &str, _timeout: Duration) -> Result<HttpResponse, FetchError> {
        let call = {
            let mut calls = self.calls.lock().unwrap();
            let count = calls.entry(url.to_string()).or_insert(0);
            *count += 1;
            *count as usize
        };

        let reply = {
            let scripts = self.scripts.lock().unwrap();
            scripts
                .get(url)
                .and_then(|replies| replies.get(call - 1).or_else(|| replies.last()).cloned())
        };

        match reply {
            Some(Reply::Response(response)) => Ok(response),
            Some(Reply::TimedOut) => Err(FetchError::Timeout {
                url: url.to_string(),
                message: "operation timed out".to_string(),
            }),
            Some(Reply::ConnectionRefused) | None => Err(FetchError::Transport {
                url: url.to_string(),
                message: "connection refused".to_string(),
            }),
        }
    }
}

/// Records requested backoff delays instead of sleeping.
#[derive(Default)]
pub struct RecordingSleeper {
    delays: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn delays(&self) -> Vec<Duration> {
        self.delays.lock().unwrap().clone()
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, duration: Duration) {
        self.delays.lock().unwrap().push(duration);
    }
}

/// Fires the cancel token during the first backoff wait.
pub struct CancellingSleeper {
    pub token: CancelToken,
}

impl Sleeper for CancellingSleeper {
    fn sleep(&self, _duration: Duration) {
        self.token.cancel();
    }
}
