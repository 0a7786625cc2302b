use std::time::{Duration, Instant};

use reqwest::{Client, Method, StatusCode};
use tracing::{debug, trace};
use url::Url;

use linkrot_core::TransportFailure;

const MAX_REDIRECTS: usize = 10;

/// Content-type prefixes the Link Extractor never runs against (§4.8): the
/// default for anything else, including a missing header, is to extract.
const NON_EXTRACTABLE_PREFIXES: &[&str] = &["image/", "video/", "audio/", "font/"];
const NON_EXTRACTABLE_EXACT: &[&str] = &[
    "application/pdf",
    "application/zip",
    "application/x-zip-compressed",
    "application/gzip",
    "application/vnd.rar",
    "application/x-7z-compressed",
    "application/octet-stream",
];

#[derive(Debug)]
pub enum CheckError {
    Transport(TransportFailure, String),
    Http { status: u16, message: String },
    RedirectLoop { status: u16, chain_len: usize },
}

#[derive(Debug, Clone)]
pub struct CheckSuccess {
    pub status: u16,
    pub content_type: Option<String>,
    /// Response body, only populated for internal (extractable) checks whose
    /// content type looked like HTML.
    pub body: Option<String>,
    pub elapsed: Duration,
}

/// Builds the one shared client the whole crawl uses (§5): redirects are
/// disabled here so the checker can track the chain itself and detect loops
/// (§4.8), rather than leaving that to reqwest's own redirect policy.
pub fn build_client(user_agent: &str, timeout: Duration) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(user_agent.to_string())
        .redirect(reqwest::redirect::Policy::none())
        .timeout(timeout)
        .build()
}

/// True unless `content_type` names one of the closed set of binary formats
/// the Link Extractor never runs against (§4.8). Lowercased and parameter-
/// stripped before matching. A missing or unrecognized content type
/// defaults to "extract".
fn is_extractable(content_type: Option<&str>) -> bool {
    let Some(ct) = content_type else { return true };
    let ct = ct.split(';').next().unwrap_or(ct).trim().to_ascii_lowercase();
    if NON_EXTRACTABLE_PREFIXES.iter().any(|p| ct.starts_with(p)) {
        return false;
    }
    !NON_EXTRACTABLE_EXACT.contains(&ct.as_str())
}

/// Performs one check of `url` (§4.8). Internal links are fetched with GET
/// so the body is available for link extraction; external links are
/// validated with HEAD, falling back to GET if the server rejects HEAD.
pub async fn check_url(
    client: &Client,
    url: &Url,
    external: bool,
    verbose: bool,
) -> Result<CheckSuccess, CheckError> {
    let mut current = url.clone();
    let mut chain = vec![current.clone()];
    let mut method = if external { Method::HEAD } else { Method::GET };
    let mut fell_back_to_get = false;
    let start = Instant::now();

    loop {
        let response = client
            .request(method.clone(), current.clone())
            .send()
            .await
            .map_err(|e| {
                let failure = classify_transport_error(&e);
                CheckError::Transport(failure, transport_message(&e, start.elapsed(), verbose))
            })?;

        let status = response.status();

        if status.is_redirection() {
            let location = response
                .headers()
                .get(reqwest::header::LOCATION)
                .and_then(|v| v.to_str().ok())
                .map(str::to_owned);

            let Some(location) = location else {
                drain_body(response).await;
                return Err(CheckError::Http {
                    status: status.as_u16(),
                    message: "redirect response missing Location header".into(),
                });
            };

            let next = current.join(&location).map_err(|e| CheckError::Http {
                status: status.as_u16(),
                message: format!("invalid redirect target '{location}': {e}"),
            })?;

            if chain.contains(&next) || chain.len() >= MAX_REDIRECTS {
                drain_body(response).await;
                return Err(CheckError::RedirectLoop {
                    status: status.as_u16(),
                    chain_len: chain.len(),
                });
            }

            trace!(from = %current, to = %next, "following redirect");
            drain_body(response).await;
            current = next;
            chain.push(current.clone());
            continue;
        }

        if status == StatusCode::METHOD_NOT_ALLOWED && method == Method::HEAD && !fell_back_to_get {
            debug!(%current, "HEAD rejected with 405, retrying with GET");
            drain_body(response).await;
            method = Method::GET;
            fell_back_to_get = true;
            continue;
        }

        if !status.is_success() {
            let message = status
                .canonical_reason()
                .unwrap_or("unexpected status")
                .to_string();
            drain_body(response).await;
            return Err(CheckError::Http {
                status: status.as_u16(),
                message,
            });
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);

        let extractable = !external && method == Method::GET && is_extractable(content_type.as_deref());

        let body = if extractable {
            match response.text().await {
                Ok(text) => Some(text),
                Err(e) => {
                    return Err(CheckError::Transport(
                        TransportFailure::Other,
                        transport_message(&e, start.elapsed(), verbose),
                    ))
                }
            }
        } else {
            drain_body(response).await;
            None
        };

        return Ok(CheckSuccess {
            status: status.as_u16(),
            content_type,
            body,
            elapsed: start.elapsed(),
        });
    }
}

/// Fully consumes and discards a response body so the connection goes back
/// to the pool instead of being dropped mid-stream (§4.8.5). Read failures
/// here are not actionable; the status/outcome was already decided.
async fn drain_body(response: reqwest::Response) {
    if let Err(e) = response.bytes().await {
        debug!(error = %e, "failed to drain response body");
    }
}

fn classify_transport_error(e: &reqwest::Error) -> TransportFailure {
    if e.is_timeout() {
        return TransportFailure::Timeout;
    }
    if e.is_connect() {
        let message = e.to_string().to_ascii_lowercase();
        if message.contains("dns") || message.contains("resolve") || message.contains("lookup") {
            return TransportFailure::DnsFailure;
        }
        if message.contains("refused") {
            return TransportFailure::ConnectionRefused;
        }
        return TransportFailure::ConnectionRefused;
    }
    if e.is_request() || e.is_body() || e.is_decode() {
        return TransportFailure::Temporary;
    }
    TransportFailure::Other
}

/// Builds the transport error message (§4.8): a short human phrase normally,
/// or elapsed duration plus the failing operation under `--verbose-network`.
fn transport_message(e: &reqwest::Error, elapsed: Duration, verbose: bool) -> String {
    if !verbose {
        return short_transport_phrase(e);
    }
    let op = if e.is_timeout() {
        "request"
    } else if e.is_connect() {
        "dial"
    } else if e.is_body() {
        "read"
    } else if e.is_decode() {
        "decode"
    } else {
        "request"
    };
    format!("{op} failed after {elapsed:?}: {e}")
}

fn short_transport_phrase(e: &reqwest::Error) -> String {
    if e.is_timeout() {
        return "timed out".to_string();
    }
    if e.is_connect() {
        let message = e.to_string().to_ascii_lowercase();
        if message.contains("dns") || message.contains("resolve") || message.contains("lookup") {
            return "no such host".to_string();
        }
        return "connection refused".to_string();
    }
    "network error".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn successful_internal_get_returns_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/page"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("<html></html>")
                    .insert_header("content-type", "text/html"),
            )
            .mount(&server)
            .await;

        let client = build_client("linkrot-test/0.1", Duration::from_secs(5)).unwrap();
        let url = Url::parse(&format!("{}/page", server.uri())).unwrap();
        let result = check_url(&client, &url, false, false).await.unwrap();
        assert_eq!(result.status, 200);
        assert!(result.body.unwrap().contains("<html>"));
    }

    #[tokio::test]
    async fn missing_content_type_still_extracts_by_default() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/page"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html></html>"))
            .mount(&server)
            .await;

        let client = build_client("linkrot-test/0.1", Duration::from_secs(5)).unwrap();
        let url = Url::parse(&format!("{}/page", server.uri())).unwrap();
        let result = check_url(&client, &url, false, false).await.unwrap();
        assert!(result.body.is_some());
    }

    #[tokio::test]
    async fn image_content_type_skips_extraction() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/logo.png"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_bytes(vec![0u8; 16])
                    .insert_header("content-type", "image/png"),
            )
            .mount(&server)
            .await;

        let client = build_client("linkrot-test/0.1", Duration::from_secs(5)).unwrap();
        let url = Url::parse(&format!("{}/logo.png", server.uri())).unwrap();
        let result = check_url(&client, &url, false, false).await.unwrap();
        assert!(result.body.is_none());
    }

    #[tokio::test]
    async fn external_link_uses_head_and_skips_body() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .and(path("/ext"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let client = build_client("linkrot-test/0.1", Duration::from_secs(5)).unwrap();
        let url = Url::parse(&format!("{}/ext", server.uri())).unwrap();
        let result = check_url(&client, &url, true, false).await.unwrap();
        assert_eq!(result.status, 200);
        assert!(result.body.is_none());
    }

    #[tokio::test]
    async fn head_405_falls_back_to_get() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .and(path("/nohead"))
            .respond_with(ResponseTemplate::new(405))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/nohead"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let client = build_client("linkrot-test/0.1", Duration::from_secs(5)).unwrap();
        let url = Url::parse(&format!("{}/nohead", server.uri())).unwrap();
        let result = check_url(&client, &url, true, false).await.unwrap();
        assert_eq!(result.status, 200);
    }

    #[tokio::test]
    async fn redirect_to_self_is_a_loop() {
        let server = MockServer::start().await;
        let self_url = format!("{}/loop", server.uri());
        Mock::given(method("GET"))
            .and(path("/loop"))
            .respond_with(ResponseTemplate::new(302).insert_header("location", self_url.as_str()))
            .mount(&server)
            .await;

        let client = build_client("linkrot-test/0.1", Duration::from_secs(5)).unwrap();
        let url = Url::parse(&self_url).unwrap();
        let result = check_url(&client, &url, false, false).await;
        match result {
            Err(CheckError::RedirectLoop { status, .. }) => assert_eq!(status, 302),
            other => panic!("expected RedirectLoop, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn two_cycle_redirect_is_caught_before_the_hop_cap() {
        let server = MockServer::start().await;
        let a = format!("{}/a", server.uri());
        let b = format!("{}/b", server.uri());
        Mock::given(method("GET"))
            .and(path("/a"))
            .respond_with(ResponseTemplate::new(302).insert_header("location", b.as_str()))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/b"))
            .respond_with(ResponseTemplate::new(302).insert_header("location", a.as_str()))
            .mount(&server)
            .await;

        let client = build_client("linkrot-test/0.1", Duration::from_secs(5)).unwrap();
        let url = Url::parse(&a).unwrap();
        let result = check_url(&client, &url, false, false).await;
        match result {
            Err(CheckError::RedirectLoop { chain_len, .. }) => assert_eq!(chain_len, 2),
            other => panic!("expected RedirectLoop, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn non_success_status_is_an_http_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/missing"))
            .respond_with(ResponseTemplate::new(404).set_body_string("not found"))
            .mount(&server)
            .await;

        let client = build_client("linkrot-test/0.1", Duration::from_secs(5)).unwrap();
        let url = Url::parse(&format!("{}/missing", server.uri())).unwrap();
        let result = check_url(&client, &url, false, false).await;
        match result {
            Err(CheckError::Http { status, .. }) => assert_eq!(status, 404),
            other => panic!("expected Http error, got {other:?}"),
        }
    }
}
