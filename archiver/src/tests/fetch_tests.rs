use std::time::Duration;

use super::fixtures::{CancellingSleeper, RecordingSleeper, Reply, StubTransport};
use crate::cancel::CancelToken;
use crate::error::ErrorKind;
use crate::fetch::{Backoff, FetchConfig, Fetcher};

const URL: &str = "https://example.com/panel.png";

fn fetch_config(max_attempts: u32) -> FetchConfig {
    FetchConfig {
        timeout: Duration::from_secs(1),
        max_attempts,
        backoff: Backoff {
            base: 2,
            unit: Duration::from_millis(10),
            max_delay: None,
        },
        expected_content_type: "image/".to_string(),
    }
}

#[test]
fn test_first_attempt_success_does_not_sleep() {
    let transport = StubTransport::new().always(URL, Reply::image(b"PNGDATA"));
    let sleeper = RecordingSleeper::default();
    let config = fetch_config(3);

    let fetched = Fetcher::new(&transport, &config)
        .with_sleeper(&sleeper)
        .fetch(URL)
        .unwrap();

    assert_eq!(fetched.body, b"PNGDATA");
    assert_eq!(fetched.content_type, "image/png");
    assert_eq!(fetched.attempts, 1);
    assert_eq!(transport.calls(URL), 1);
    assert!(sleeper.delays().is_empty());
}

#[test]
fn test_server_error_exhausts_budget() {
    let transport = StubTransport::new().always(URL, Reply::status(500));
    let sleeper = RecordingSleeper::default();
    let config = fetch_config(3);

    let failure = Fetcher::new(&transport, &config)
        .with_sleeper(&sleeper)
        .fetch(URL)
        .unwrap_err();

    assert_eq!(failure.kind, ErrorKind::HttpStatus);
    assert_eq!(failure.attempts, 3);
    assert!(failure.message.contains("HTTP 500"), "{}", failure.message);
    assert_eq!(transport.calls(URL), 3);
    // no sleep after the final attempt
    assert_eq!(
        sleeper.delays(),
        vec![Duration::from_millis(10), Duration::from_millis(20)]
    );
}

#[test]
fn test_html_response_is_invalid_content_type() {
    let transport = StubTransport::new().always(URL, Reply::html());
    let sleeper = RecordingSleeper::default();
    let config = fetch_config(2);

    let failure = Fetcher::new(&transport, &config)
        .with_sleeper(&sleeper)
        .fetch(URL)
        .unwrap_err();

    assert_eq!(failure.kind, ErrorKind::InvalidContentType);
    assert!(failure.message.contains("text/html"), "{}", failure.message);
    assert_eq!(transport.calls(URL), 2);
}

#[test]
fn test_backoff_grows_until_success() {
    let transport = StubTransport::new().script(
        URL,
        vec![
            Reply::ConnectionRefused,
            Reply::status(503),
            Reply::image(b"third time lucky"),
        ],
    );
    let sleeper = RecordingSleeper::default();
    let config = fetch_config(3);

    let fetched = Fetcher::new(&transport, &config)
        .with_sleeper(&sleeper)
        .fetch(URL)
        .unwrap();

    assert_eq!(fetched.attempts, 3);
    assert_eq!(fetched.body, b"third time lucky");

    let delays = sleeper.delays();
    assert_eq!(delays.len(), 2);
    assert!(delays[0] < delays[1], "delays should grow: {:?}", delays);
}

#[test]
fn test_failure_reports_last_attempt() {
    let transport = StubTransport::new().script(
        URL,
        vec![Reply::status(500), Reply::TimedOut, Reply::html()],
    );
    let config = fetch_config(3);
    let sleeper = RecordingSleeper::default();

    let failure = Fetcher::new(&transport, &config)
        .with_sleeper(&sleeper)
        .fetch(URL)
        .unwrap_err();
    assert_eq!(failure.kind, ErrorKind::InvalidContentType);

    let transport = StubTransport::new().script(URL, vec![Reply::html(), Reply::TimedOut]);
    let config = fetch_config(2);
    let failure = Fetcher::new(&transport, &config)
        .with_sleeper(&sleeper)
        .fetch(URL)
        .unwrap_err();
    assert_eq!(failure.kind, ErrorKind::Transport);
    assert!(failure.message.contains("timed out"), "{}", failure.message);
}

#[test]
fn test_single_attempt_budget() {
    let transport = StubTransport::new().always(URL, Reply::ConnectionRefused);
    let sleeper = RecordingSleeper::default();
    let config = fetch_config(1);

    let failure = Fetcher::new(&transport, &config)
        .with_sleeper(&sleeper)
        .fetch(URL)
        .unwrap_err();

    assert_eq!(failure.kind, ErrorKind::Transport);
    assert_eq!(failure.attempts, 1);
    assert!(sleeper.delays().is_empty());
}

#[test]
fn test_backoff_cap_limits_delays() {
    let transport = StubTransport::new().always(URL, Reply::status(502));
    let sleeper = RecordingSleeper::default();
    let mut config = fetch_config(5);
    config.backoff.max_delay = Some(Duration::from_millis(25));

    Fetcher::new(&transport, &config)
        .with_sleeper(&sleeper)
        .fetch(URL)
        .unwrap_err();

    assert_eq!(
        sleeper.delays(),
        vec![
            Duration::from_millis(10),
            Duration::from_millis(20),
            Duration::from_millis(25),
            Duration::from_millis(25),
        ]
    );
}

#[test]
fn test_cancelled_token_stops_before_first_attempt() {
    let transport = StubTransport::new().always(URL, Reply::image(b"x"));
    let config = fetch_config(3);
    let cancel = CancelToken::new();
    cancel.cancel();

    let failure = Fetcher::new(&transport, &config)
        .with_cancel(cancel)
        .fetch(URL)
        .unwrap_err();

    assert_eq!(failure.kind, ErrorKind::Cancelled);
    assert_eq!(failure.attempts, 0);
    assert_eq!(transport.calls(URL), 0);
}

#[test]
fn test_cancel_between_attempts_keeps_previous_diagnosis() {
    let transport = StubTransport::new().always(URL, Reply::status(500));
    let config = fetch_config(3);
    let cancel = CancelToken::new();
    let sleeper = CancellingSleeper {
        token: cancel.clone(),
    };

    let failure = Fetcher::new(&transport, &config)
        .with_sleeper(&sleeper)
        .with_cancel(cancel)
        .fetch(URL)
        .unwrap_err();

    assert_eq!(failure.kind, ErrorKind::Cancelled);
    assert_eq!(failure.attempts, 1);
    assert_eq!(transport.calls(URL), 1);
    assert!(failure.message.contains("before attempt 2"), "{}", failure.message);
    assert!(failure.message.contains("HTTP 500"), "{}", failure.message);
}

#[test]
fn test_custom_expected_type_prefix() {
    let transport = StubTransport::new().always(URL, Reply::image(b"x"));
    let mut config = fetch_config(1);
    config.expected_content_type = "application/json".to_string();

    let failure = Fetcher::new(&transport, &config).fetch(URL).unwrap_err();
    assert_eq!(failure.kind, ErrorKind::InvalidContentType);
}
