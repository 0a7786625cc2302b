use std::time::Duration;

use reqwest::Client;
use tokio::sync::watch;
use tracing::debug;
use url::Url;

use linkrot_core::{classify_error, ErrorCategory};

use crate::check::{check_url, CheckError, CheckSuccess};

/// A fully-retried failure: the Retry Executor gave up (§4.7).
#[derive(Debug, Clone)]
pub struct RetryFailure {
    pub category: ErrorCategory,
    pub status: u16,
    pub message: String,
}

/// Runs `check_url`, retrying retryable failures with exponential backoff
/// doubling from `base_delay` up to `max_delay`, capped at `retries`
/// attempts beyond the first. `cancel` lets the Coordinator cut retries
/// short on shutdown without leaving a worker stuck in a long sleep.
pub async fn check_with_retries(
    client: &Client,
    url: &Url,
    external: bool,
    retries: u32,
    base_delay: Duration,
    max_delay: Duration,
    verbose: bool,
    cancel: &mut watch::Receiver<bool>,
) -> Result<CheckSuccess, RetryFailure> {
    let mut attempt = 0u32;

    loop {
        if *cancel.borrow() {
            return Err(RetryFailure {
                category: ErrorCategory::Unknown,
                status: 0,
                message: "cancelled".to_string(),
            });
        }

        let outcome = tokio::select! {
            result = check_url(client, url, external, verbose) => result,
            _ = cancel.changed() => {
                return Err(RetryFailure {
                    category: ErrorCategory::Unknown,
                    status: 0,
                    message: "cancelled".to_string(),
                });
            }
        };

        match outcome {
            Ok(success) => return Ok(success),
            Err(err) => {
                let (category, status, message, retryable) = describe(err);

                if attempt >= retries || !retryable || *cancel.borrow() {
                    return Err(RetryFailure {
                        category,
                        status,
                        message: format!("{message} (after {} attempts)", attempt + 1),
                    });
                }

                let delay = base_delay
                    .saturating_mul(1u32.checked_shl(attempt).unwrap_or(u32::MAX))
                    .min(max_delay);
                debug!(%url, attempt, ?delay, "retrying after failure");

                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = cancel.changed() => {
                        return Err(RetryFailure {
                            category,
                            status,
                            message: format!("{message} (after {} attempts)", attempt + 1),
                        });
                    }
                }

                attempt += 1;
            }
        }
    }
}

fn describe(err: CheckError) -> (ErrorCategory, u16, String, bool) {
    match err {
        CheckError::Transport(failure, message) => {
            let category = classify_error(Some(failure), 0, false);
            (category, 0, message, failure.retryable())
        }
        CheckError::Http { status, message } => {
            let category = classify_error(None, status, false);
            let retryable = category.http_retryable(status);
            (category, status, message, retryable)
        }
        CheckError::RedirectLoop { status, chain_len } => {
            let category = classify_error(None, 0, true);
            (
                category,
                status,
                format!("redirect loop detected after {chain_len} hops"),
                false,
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn succeeds_without_retry_on_first_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ok"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let client = crate::check::build_client("linkrot-test/0.1", Duration::from_secs(5)).unwrap();
        let (_tx, mut rx) = watch::channel(false);
        let url = Url::parse(&format!("{}/ok", server.uri())).unwrap();
        let result = check_with_retries(&client, &url, true, 2, Duration::from_millis(1), Duration::from_millis(10), false, &mut rx)
            .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn gives_up_after_exhausting_retries_on_5xx() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/flaky"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let client = crate::check::build_client("linkrot-test/0.1", Duration::from_secs(5)).unwrap();
        let (_tx, mut rx) = watch::channel(false);
        let url = Url::parse(&format!("{}/flaky", server.uri())).unwrap();
        let result = check_with_retries(&client, &url, true, 2, Duration::from_millis(1), Duration::from_millis(5), false, &mut rx)
            .await;
        let failure = result.unwrap_err();
        assert_eq!(failure.category, ErrorCategory::ServerError);
        assert_eq!(failure.status, 503);
        assert!(failure.message.ends_with("(after 3 attempts)"));
    }

    #[tokio::test]
    async fn does_not_retry_plain_4xx() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/missing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = crate::check::build_client("linkrot-test/0.1", Duration::from_secs(5)).unwrap();
        let (_tx, mut rx) = watch::channel(false);
        let url = Url::parse(&format!("{}/missing", server.uri())).unwrap();
        let result = check_with_retries(&client, &url, true, 5, Duration::from_millis(1), Duration::from_millis(5), false, &mut rx)
            .await;
        let failure = result.unwrap_err();
        assert!(failure.message.ends_with("(after 1 attempts)"));
    }

    #[tokio::test]
    async fn already_cancelled_fails_without_making_a_request() {
        let server = MockServer::start().await;
        // No mocks registered: a real attempt would fail with a 404 from
        // wiremock's default "no matching mock" response, not a cancellation.
        let client = crate::check::build_client("linkrot-test/0.1", Duration::from_secs(5)).unwrap();
        let (tx, mut rx) = watch::channel(false);
        tx.send(true).unwrap();

        let url = Url::parse(&format!("{}/anything", server.uri())).unwrap();
        let result = check_with_retries(&client, &url, true, 2, Duration::from_millis(1), Duration::from_millis(5), false, &mut rx)
            .await;
        assert_eq!(result.unwrap_err().message, "cancelled");
    }

    #[tokio::test]
    async fn redirect_loop_failure_carries_the_last_response_status() {
        let server = MockServer::start().await;
        let self_url = format!("{}/loop", server.uri());
        Mock::given(method("GET"))
            .and(path("/loop"))
            .respond_with(ResponseTemplate::new(302).insert_header("location", self_url.as_str()))
            .mount(&server)
            .await;

        let client = crate::check::build_client("linkrot-test/0.1", Duration::from_secs(5)).unwrap();
        let (_tx, mut rx) = watch::channel(false);
        let url = Url::parse(&self_url).unwrap();
        let result = check_with_retries(&client, &url, false, 0, Duration::from_millis(1), Duration::from_millis(5), false, &mut rx)
            .await;
        let failure = result.unwrap_err();
        assert_eq!(failure.status, 302);
        assert_eq!(failure.category, ErrorCategory::RedirectLoop);
    }
}
