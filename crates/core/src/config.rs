use std::time::Duration;

use url::Url;

use crate::error::LinkRotError;

/// Immutable once the crawl starts. Defaults here are the single source of
/// truth — the CLI's `clap` defaults must equal them, not the other way
/// around (see §9 "config defaults drift").
#[derive(Debug, Clone)]
pub struct CrawlConfig {
    pub start_url: Url,
    pub concurrency: usize,
    pub request_timeout: Duration,
    pub rate_limit: f64,
    pub user_agent: String,
    pub retries: u32,
    pub retry_base_delay: Duration,
    pub retry_max_delay: Duration,
    /// 0 means unlimited.
    pub max_depth: u32,
    pub verbose_network: bool,
}

impl CrawlConfig {
    pub const DEFAULT_CONCURRENCY: usize = 10;
    pub const DEFAULT_RATE_LIMIT: f64 = 10.0;
    pub const DEFAULT_RETRIES: u32 = 2;
    pub const DEFAULT_RETRY_BASE_DELAY: Duration = Duration::from_secs(1);
    pub const DEFAULT_RETRY_MAX_DELAY: Duration = Duration::from_secs(30);
    pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
    pub const DEFAULT_MAX_DEPTH: u32 = 0;
    pub const DEFAULT_USER_AGENT: &'static str = concat!("linkrot/", env!("CARGO_PKG_VERSION"));

    pub fn builder(start_url: Url) -> CrawlConfigBuilder {
        CrawlConfigBuilder::new(start_url)
    }

    /// Job queue / result queue capacity: a small multiple of worker count
    /// (§4.9), so the pipeline can keep workers fed without growing
    /// unboundedly.
    pub fn channel_capacity(&self) -> usize {
        (self.concurrency * 3).max(16)
    }
}

pub struct CrawlConfigBuilder {
    start_url: Url,
    concurrency: usize,
    request_timeout: Duration,
    rate_limit: f64,
    user_agent: String,
    retries: u32,
    retry_base_delay: Duration,
    retry_max_delay: Duration,
    max_depth: u32,
    verbose_network: bool,
}

impl CrawlConfigBuilder {
    pub fn new(start_url: Url) -> Self {
        Self {
            start_url,
            concurrency: CrawlConfig::DEFAULT_CONCURRENCY,
            request_timeout: CrawlConfig::DEFAULT_REQUEST_TIMEOUT,
            rate_limit: CrawlConfig::DEFAULT_RATE_LIMIT,
            user_agent: CrawlConfig::DEFAULT_USER_AGENT.to_string(),
            retries: CrawlConfig::DEFAULT_RETRIES,
            retry_base_delay: CrawlConfig::DEFAULT_RETRY_BASE_DELAY,
            retry_max_delay: CrawlConfig::DEFAULT_RETRY_MAX_DELAY,
            max_depth: CrawlConfig::DEFAULT_MAX_DEPTH,
            verbose_network: false,
        }
    }

    pub fn concurrency(mut self, v: usize) -> Self {
        self.concurrency = v;
        self
    }

    pub fn request_timeout(mut self, v: Duration) -> Self {
        self.request_timeout = v;
        self
    }

    pub fn rate_limit(mut self, v: f64) -> Self {
        self.rate_limit = v;
        self
    }

    pub fn user_agent(mut self, v: impl Into<String>) -> Self {
        self.user_agent = v.into();
        self
    }

    pub fn retries(mut self, v: u32) -> Self {
        self.retries = v;
        self
    }

    pub fn retry_base_delay(mut self, v: Duration) -> Self {
        self.retry_base_delay = v;
        self
    }

    pub fn retry_max_delay(mut self, v: Duration) -> Self {
        self.retry_max_delay = v;
        self
    }

    pub fn max_depth(mut self, v: u32) -> Self {
        self.max_depth = v;
        self
    }

    pub fn verbose_network(mut self, v: bool) -> Self {
        self.verbose_network = v;
        self
    }

    pub fn build(self) -> Result<CrawlConfig, LinkRotError> {
        if self.concurrency == 0 {
            return Err(LinkRotError::Config("concurrency must be >= 1".into()));
        }
        if self.rate_limit <= 0.0 {
            return Err(LinkRotError::Config("rate-limit must be > 0".into()));
        }
        Ok(CrawlConfig {
            start_url: self.start_url,
            concurrency: self.concurrency,
            request_timeout: self.request_timeout,
            rate_limit: self.rate_limit,
            user_agent: self.user_agent,
            retries: self.retries,
            retry_base_delay: self.retry_base_delay,
            retry_max_delay: self.retry_max_delay,
            max_depth: self.max_depth,
            verbose_network: self.verbose_network,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let cfg = CrawlConfig::builder(Url::parse("https://example.com").unwrap())
            .build()
            .unwrap();
        assert_eq!(cfg.concurrency, 10);
        assert_eq!(cfg.rate_limit, 10.0);
        assert_eq!(cfg.retries, 2);
        assert_eq!(cfg.max_depth, 0);
    }

    #[test]
    fn rejects_zero_concurrency() {
        let err = CrawlConfig::builder(Url::parse("https://example.com").unwrap())
            .concurrency(0)
            .build();
        assert!(err.is_err());
    }
}
