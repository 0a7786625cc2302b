use std::sync::Arc;
use std::time::Instant;

use reqwest::Client;
use tokio::sync::{mpsc, oneshot, watch, Mutex};
use tracing::{debug, info, warn};

use linkrot_checker::check::build_client;
use linkrot_checker::check_with_retries;
use linkrot_core::url_utils::{normalize, same_domain};
use linkrot_core::{
    BrokenLink, CrawlConfig, CrawlReport, CrawlStats, ErrorCategory, Job, JobOutcome, JobResult,
    LinkRotError, ProgressEvent,
};
use linkrot_politeness::{RateLimiter, RobotsCache, RobotsVerdict};
use linkrot_visited::VisitedSet;

use crate::memory_watcher::{MemoryPressure, MemoryWatcher};

/// Handle to a running crawl: a stream of progress events, plus the final
/// report once the crawl has drained (§4.9, §4.12).
pub struct CrawlHandle {
    pub progress_rx: mpsc::Receiver<ProgressEvent>,
    report_rx: oneshot::Receiver<CrawlReport>,
}

impl CrawlHandle {
    pub async fn wait(self) -> Result<CrawlReport, LinkRotError> {
        self.report_rx
            .await
            .map_err(|_| LinkRotError::Other(anyhow::anyhow!("crawl ended without a report")))
    }
}

struct WorkerCtx {
    client: Client,
    robots: Arc<RobotsCache>,
    rate_limiter: Arc<RateLimiter>,
    job_rx: Mutex<mpsc::Receiver<Job>>,
    result_tx: mpsc::Sender<JobResult>,
    cancel_rx: watch::Receiver<bool>,
    config: CrawlConfig,
}

/// Starts a crawl rooted at `config.start_url` and returns immediately with a
/// handle streaming progress; the crawl itself runs on spawned tasks (§4.9).
/// Only the Coordinator task (spawned here) ever touches the Visited Set or
/// the in-flight counter — workers only check out a Job and send back a
/// Result, exactly as §4.9 requires.
pub fn run_crawl(config: CrawlConfig) -> Result<CrawlHandle, LinkRotError> {
    let seed_url = normalize(&config.start_url, true)?;
    let start_host = seed_url
        .host_str()
        .ok_or_else(|| LinkRotError::InvalidUrl("start URL has no host".into()))?
        .to_string();

    let client = build_client(&config.user_agent, config.request_timeout)
        .map_err(|e| LinkRotError::Network(e.to_string()))?;

    let visited = Arc::new(VisitedSet::new()?);
    let robots = Arc::new(RobotsCache::new(config.user_agent.clone()));
    let rate_limiter = Arc::new(RateLimiter::new(config.rate_limit));

    let capacity = config.channel_capacity();
    let (job_tx, job_rx) = mpsc::channel::<Job>(capacity);
    let (result_tx, result_rx) = mpsc::channel::<JobResult>(capacity);
    let (progress_tx, progress_rx) = mpsc::channel::<ProgressEvent>(capacity);
    let (cancel_tx, cancel_rx) = watch::channel(false);

    let memory_watcher = MemoryWatcher::spawn(cancel_rx.clone());
    spawn_memory_guard(memory_watcher, rate_limiter.clone(), cancel_tx.clone());

    let ctx = Arc::new(WorkerCtx {
        client,
        robots,
        rate_limiter,
        job_rx: Mutex::new(job_rx),
        result_tx,
        cancel_rx: cancel_rx.clone(),
        config: config.clone(),
    });

    for worker_id in 0..config.concurrency {
        let ctx = Arc::clone(&ctx);
        tokio::spawn(async move {
            worker_loop(worker_id, ctx).await;
        });
    }

    let report_rx = spawn_coordinator_loop(
        job_tx,
        result_rx,
        progress_tx,
        visited,
        start_host,
        config,
        seed_url,
        cancel_rx,
    );

    Ok(CrawlHandle {
        progress_rx,
        report_rx,
    })
}

fn spawn_memory_guard(watcher: MemoryWatcher, rate_limiter: Arc<RateLimiter>, cancel_tx: watch::Sender<bool>) {
    let mut pressure_rx = watcher.subscribe();
    tokio::spawn(async move {
        let _watcher = watcher;
        while pressure_rx.changed().await.is_ok() {
            match *pressure_rx.borrow() {
                MemoryPressure::Warning => {
                    let reduced = (rate_limiter.current_rate() * 0.5).max(1.0);
                    rate_limiter.set_rate(reduced);
                }
                MemoryPressure::Critical => {
                    warn!("pausing crawl: memory pressure critical");
                    let _ = cancel_tx.send(true);
                    break;
                }
                MemoryPressure::Normal => {}
            }
        }
    });
}

/// How often (in results processed) the coordinator snapshots the Visited
/// Set to its backing file. Best-effort, so a short crawl may never trip it.
const SNAPSHOT_INTERVAL: u64 = 500;

/// The only task that ever mutates the Visited Set or the in-flight counter
/// (§4.9). Reads every terminal `JobResult`, accumulates the report, and
/// decides what gets scheduled next.
#[allow(clippy::too_many_arguments)]
fn spawn_coordinator_loop(
    job_tx: mpsc::Sender<Job>,
    mut result_rx: mpsc::Receiver<JobResult>,
    progress_tx: mpsc::Sender<ProgressEvent>,
    visited: Arc<VisitedSet>,
    start_host: String,
    config: CrawlConfig,
    seed_url: url::Url,
    cancel_rx: watch::Receiver<bool>,
) -> oneshot::Receiver<CrawlReport> {
    let (report_tx, report_rx) = oneshot::channel();

    tokio::spawn(async move {
        let start = Instant::now();
        let mut stats = CrawlStats::default();
        let mut broken_links: Vec<BrokenLink> = Vec::new();
        let mut in_flight: i64 = 1;

        visited.insert_if_absent(&seed_url).await;
        if job_tx.send(Job::seed(seed_url)).await.is_err() {
            warn!("failed to enqueue seed job");
        }

        while let Some(result) = result_rx.recv().await {
            stats.total_checked += 1;

            if stats.total_checked % SNAPSHOT_INTERVAL == 0 {
                let visited = Arc::clone(&visited);
                tokio::spawn(async move {
                    if let Err(e) = visited.snapshot().await {
                        debug!(error = %e, "visited set snapshot failed");
                    }
                });
            }

            let (status, message, category) = match &result.outcome {
                JobOutcome::InternalOk { .. } => (200u16, String::new(), None),
                JobOutcome::ExternalOk => (200u16, String::new(), None),
                JobOutcome::Skipped => (0u16, String::new(), None),
                JobOutcome::Broken(broken) => {
                    stats.broken_count += 1;
                    broken_links.push(broken.clone());
                    (broken.status, broken.message.clone(), Some(broken.category))
                }
            };

            let event = ProgressEvent {
                url: result.job.url.clone(),
                external: result.job.external,
                status,
                error_message: message,
                error_category: category,
                checked_count: stats.total_checked,
                broken_count: stats.broken_count,
            };
            // §4.11: a slow or absent consumer must never stall the crawl, so
            // a full buffer drops the event instead of blocking the coordinator.
            if progress_tx.try_send(event).is_err() {
                debug!("progress channel full or closed, dropping event");
            }

            let cancelled = *cancel_rx.borrow();
            if !cancelled {
                if let JobOutcome::InternalOk { links } = &result.outcome {
                    let next_depth = result.job.depth + 1;
                    for link in links {
                        if !visited.insert_if_absent(link).await {
                            continue;
                        }
                        let external = link
                            .host_str()
                            .map(|h| !same_domain(h, &start_host))
                            .unwrap_or(true);

                        if !external && config.max_depth > 0 && next_depth > config.max_depth {
                            continue;
                        }

                        let child = Job::child(link.clone(), result.job.url.clone(), external, next_depth);
                        in_flight += 1;
                        if job_tx.send(child).await.is_err() {
                            in_flight -= 1;
                        }
                    }
                }
            }

            in_flight -= 1;
            if in_flight <= 0 {
                debug!("in-flight counter reached zero, closing job queue");
                break;
            }
        }

        drop(job_tx);
        stats.duration = start.elapsed();
        info!(
            checked = stats.total_checked,
            broken = stats.broken_count,
            elapsed = ?stats.duration,
            "crawl finished"
        );
        let _ = report_tx.send(CrawlReport { broken_links, stats });
    });

    report_rx
}

async fn worker_loop(worker_id: usize, ctx: Arc<WorkerCtx>) {
    loop {
        let job = {
            let mut guard = ctx.job_rx.lock().await;
            guard.recv().await
        };
        let Some(job) = job else { break };

        if *ctx.cancel_rx.borrow() {
            send_result(&ctx, job, JobOutcome::Skipped).await;
            continue;
        }

        let outcome = process_job(&ctx, &job).await;
        send_result(&ctx, job, outcome).await;
    }
    info!(worker_id, "worker stopped");
}

async fn send_result(ctx: &WorkerCtx, job: Job, outcome: JobOutcome) {
    if ctx.result_tx.send(JobResult { job, outcome }).await.is_err() {
        warn!("result channel closed while a worker still had output");
    }
}

async fn process_job(ctx: &WorkerCtx, job: &Job) -> JobOutcome {
    if ctx.robots.is_allowed(&ctx.client, &job.url).await == RobotsVerdict::Disallowed {
        return JobOutcome::Skipped;
    }

    let mut cancel_rx = ctx.cancel_rx.clone();
    if !ctx.rate_limiter.acquire_cancellable(&mut cancel_rx).await {
        return JobOutcome::Skipped;
    }

    let started = Instant::now();
    let mut cancel_rx = ctx.cancel_rx.clone();
    let outcome = check_with_retries(
        &ctx.client,
        &job.url,
        job.external,
        ctx.config.retries,
        ctx.config.retry_base_delay,
        ctx.config.retry_max_delay,
        ctx.config.verbose_network,
        &mut cancel_rx,
    )
    .await;
    ctx.rate_limiter.record_rtt(started.elapsed()).await;

    match outcome {
        Err(failure) => JobOutcome::Broken(BrokenLink {
            url: job.url.clone(),
            status: failure.status,
            message: failure.message,
            category: failure.category,
            source_page: job.source_page.clone(),
            external: job.external,
        }),
        Ok(_success) if job.external => JobOutcome::ExternalOk,
        Ok(success) => {
            let Some(body) = success.body.as_deref() else {
                return JobOutcome::InternalOk { links: Vec::new() };
            };

            let extracted = linkrot_parser::extract_links(body, &job.url);
            if extracted.malformed {
                return JobOutcome::Broken(BrokenLink {
                    url: job.url.clone(),
                    status: success.status,
                    message: "page contains malformed HTML".to_string(),
                    category: ErrorCategory::MalformedHtml,
                    source_page: job.source_page.clone(),
                    external: job.external,
                });
            }

            JobOutcome::InternalOk {
                links: extracted.links,
            }
        }
    }
}
