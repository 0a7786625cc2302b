mod cli;
mod output;
mod progress;

use std::fs::File;
use std::io;

use anyhow::Result;
use clap::Parser;
use tracing::error;

// mimalloc avoids the heap fragmentation glibc's allocator shows under the
// high worker-count concurrency this crawl uses.
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use crate::cli::Cli;

fn main() -> Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    let exit_code = runtime.block_on(async_main())?;
    std::process::exit(exit_code);
}

async fn async_main() -> Result<i32> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let json = cli.json;
    let csv = cli.csv;
    let output_path = cli.output.clone();

    let config = match cli.into_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {e}");
            return Ok(1);
        }
    };

    let handle = match linkrot_engine::run_crawl(config) {
        Ok(handle) => handle,
        Err(e) => {
            error!(error = %e, "failed to start crawl");
            eprintln!("error: {e}");
            return Ok(1);
        }
    };

    let progress_task = tokio::spawn(progress::run(handle.progress_rx));

    let report = match handle.wait().await {
        Ok(report) => report,
        Err(e) => {
            error!(error = %e, "crawl ended without a report");
            eprintln!("error: {e}");
            return Ok(1);
        }
    };
    let _ = progress_task.await;

    if json || csv {
        let result = match &output_path {
            Some(path) => {
                let file = File::create(path)?;
                if json {
                    output::write_json(&report.broken_links, file)
                } else {
                    output::write_csv(&report.broken_links, file)
                }
            }
            None if json => output::write_json(&report.broken_links, io::stdout()),
            None => output::write_csv(&report.broken_links, io::stdout()),
        };
        if let Err(e) = result {
            eprintln!("error writing output: {e}");
            return Ok(1);
        }
    } else {
        println!(
            "checked {} URLs, {} broken, in {:?}",
            report.stats.total_checked, report.stats.broken_count, report.stats.duration
        );
    }

    if report.stats.broken_count > 0 {
        Ok(1)
    } else {
        Ok(0)
    }
}
