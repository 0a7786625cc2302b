use std::time::Duration;

use url::Url;

/// A unit of crawl work. Created by the Coordinator, consumed exactly once
/// by one worker, destroyed after its result is emitted.
#[derive(Debug, Clone)]
pub struct Job {
    /// Normalized, HTTP(S) absolute URL.
    pub url: Url,
    /// The page this URL was discovered on. `None` for the seed.
    pub source_page: Option<Url>,
    /// True if this URL is outside the crawl's domain: validate only, never extract.
    pub external: bool,
    /// BFS depth. The seed is 0.
    pub depth: u32,
}

impl Job {
    pub fn seed(url: Url) -> Self {
        Self {
            url,
            source_page: None,
            external: false,
            depth: 0,
        }
    }

    pub fn child(url: Url, source_page: Url, external: bool, depth: u32) -> Self {
        Self {
            url,
            source_page: Some(source_page),
            external,
            depth,
        }
    }
}

/// The closed set of error categories surfaced to the UI layer and to
/// structured output. Stable, lowercase, underscore-separated identifiers —
/// a public contract; do not add variants without a corresponding spec change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    Timeout,
    DnsFailure,
    ConnectionRefused,
    ClientError,
    ServerError,
    RedirectLoop,
    MalformedHtml,
    AuthRequired,
    Unknown,
}

impl ErrorCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCategory::Timeout => "timeout",
            ErrorCategory::DnsFailure => "dns_failure",
            ErrorCategory::ConnectionRefused => "connection_refused",
            ErrorCategory::ClientError => "4xx",
            ErrorCategory::ServerError => "5xx",
            ErrorCategory::RedirectLoop => "redirect_loop",
            ErrorCategory::MalformedHtml => "malformed_html",
            ErrorCategory::AuthRequired => "auth_required",
            ErrorCategory::Unknown => "unknown",
        }
    }

    /// HTTP-side retryability (§4.7). Transport-side retryability is decided
    /// from the underlying `TransportFailure` instead, since several kinds of
    /// transport failure all classify as `Unknown`.
    pub fn http_retryable(self, status: u16) -> bool {
        match self {
            ErrorCategory::ServerError => true,
            ErrorCategory::ClientError | ErrorCategory::AuthRequired => status == 429,
            _ => false,
        }
    }
}

/// Coarse classification of a transport-level failure, independent of any
/// particular HTTP client crate so `linkrot-core` stays free of a `reqwest`
/// dependency. The checker crate maps `reqwest::Error` into this.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportFailure {
    Timeout,
    DnsFailure,
    ConnectionRefused,
    /// Connection reset, temporary I/O hiccup, or anything else transient
    /// and therefore retryable.
    Temporary,
    Other,
}

impl TransportFailure {
    pub fn retryable(self) -> bool {
        !matches!(self, TransportFailure::Other)
    }
}

/// A broken link as reported to the caller and serialized to JSON/CSV.
#[derive(Debug, Clone)]
pub struct BrokenLink {
    pub url: Url,
    /// 0 if the failure was a transport error rather than an HTTP response.
    pub status: u16,
    pub message: String,
    pub category: ErrorCategory,
    pub source_page: Option<Url>,
    pub external: bool,
}

/// The terminal outcome of one `Job`, after retries. Exactly one variant
/// holds per spec §3's "Result" invariant.
#[derive(Debug, Clone)]
pub enum JobOutcome {
    /// Successful internal fetch; links extracted from the page (empty for
    /// non-HTML content types that were intentionally skipped).
    InternalOk { links: Vec<Url> },
    /// Successful external validation (HEAD/GET, no extraction).
    ExternalOk,
    /// Robots.txt denied the fetch, or the rate limiter was cancelled
    /// mid-wait: the URL counts as checked but produces no finding.
    Skipped,
    /// Terminal failure after the Retry Executor gave up.
    Broken(BrokenLink),
}

#[derive(Debug, Clone)]
pub struct JobResult {
    pub job: Job,
    pub outcome: JobOutcome,
}

/// One event per terminal result, consumed by the UI layer (§4.11).
#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub url: Url,
    pub external: bool,
    pub status: u16,
    pub error_message: String,
    pub error_category: Option<ErrorCategory>,
    pub checked_count: u64,
    pub broken_count: u64,
}

/// Final crawl statistics, accumulated by the Coordinator (§4.12).
#[derive(Debug, Clone, Default)]
pub struct CrawlStats {
    pub total_checked: u64,
    pub broken_count: u64,
    pub duration: Duration,
}

/// The aggregated result of a whole crawl run.
#[derive(Debug, Clone)]
pub struct CrawlReport {
    pub broken_links: Vec<BrokenLink>,
    pub stats: CrawlStats,
}
