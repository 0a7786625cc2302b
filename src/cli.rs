use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use linkrot_core::CrawlConfig;
use url::Url;

/// Finds dead links starting from a seed URL.
#[derive(Parser)]
#[command(name = "linkrot", about = "Find dead links starting from a seed URL")]
pub struct Cli {
    /// Seed URL. Must have an http or https scheme.
    pub url: String,

    /// Worker count.
    #[arg(long, default_value_t = CrawlConfig::DEFAULT_CONCURRENCY)]
    pub concurrency: usize,

    /// Initial requests/sec.
    #[arg(long, default_value_t = CrawlConfig::DEFAULT_RATE_LIMIT)]
    pub rate_limit: f64,

    /// Retry count beyond the first attempt. 0 is legal and distinct from unset.
    #[arg(long, default_value_t = CrawlConfig::DEFAULT_RETRIES)]
    pub retries: u32,

    /// Base backoff, in seconds.
    #[arg(long, default_value_t = CrawlConfig::DEFAULT_RETRY_BASE_DELAY.as_secs())]
    pub retry_delay: u64,

    /// HTTP User-Agent.
    #[arg(long, default_value_t = default_user_agent())]
    pub user_agent: String,

    /// Max internal depth. 0 means unlimited.
    #[arg(short = 'd', long, default_value_t = CrawlConfig::DEFAULT_MAX_DEPTH)]
    pub depth: u32,

    /// Emit JSON. Mutually exclusive with --csv.
    #[arg(short = 'j', long, conflicts_with = "csv")]
    pub json: bool,

    /// Emit CSV. Mutually exclusive with --json.
    #[arg(short = 'c', long)]
    pub csv: bool,

    /// File path for JSON/CSV output. Defaults to stdout.
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Detailed transport diagnostics.
    #[arg(long)]
    pub verbose_network: bool,
}

fn default_user_agent() -> String {
    CrawlConfig::DEFAULT_USER_AGENT.to_string()
}

impl Cli {
    pub fn into_config(self) -> anyhow::Result<CrawlConfig> {
        let start_url = Url::parse(&self.url)
            .map_err(|e| anyhow::anyhow!("invalid seed URL '{}': {e}", self.url))?;

        let config = CrawlConfig::builder(start_url)
            .concurrency(self.concurrency)
            .rate_limit(self.rate_limit)
            .retries(self.retries)
            .retry_base_delay(Duration::from_secs(self.retry_delay))
            .user_agent(self.user_agent)
            .max_depth(self.depth)
            .verbose_network(self.verbose_network)
            .build()?;

        Ok(config)
    }
}
