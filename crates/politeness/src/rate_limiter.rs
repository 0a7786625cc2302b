use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tracing::debug;

const MIN_RATE: f64 = 5.0;
const MAX_RATE: f64 = 100.0;
const EMA_SMOOTHING: f64 = 0.2;
const MAX_DECREASE_RATIO: f64 = 0.5;
const SPEEDUP_FACTOR: f64 = 1.1;
const MIN_CHANGE: f64 = 0.1;
/// RTT a well-behaved server is expected to answer within (§4.6). Below this
/// the limiter nudges the rate up; above it, down.
const TARGET_RTT: Duration = Duration::from_millis(200);

/// Adaptive token-bucket limiter (§4.6). Starts at the configured rate and
/// nudges itself up or down based on an exponential moving average of
/// observed round-trip time, unless the operator pins the rate with
/// `set_rate`.
pub struct RateLimiter {
    state: Mutex<LimiterState>,
    rate_bits: AtomicU64,
    adaptive: AtomicBool,
}

struct LimiterState {
    last_request: Option<Instant>,
    ema_rtt: Option<Duration>,
}

impl RateLimiter {
    pub fn new(initial_rate: f64) -> Self {
        Self {
            state: Mutex::new(LimiterState {
                last_request: None,
                ema_rtt: None,
            }),
            rate_bits: AtomicU64::new(initial_rate.to_bits()),
            adaptive: AtomicBool::new(true),
        }
    }

    pub fn current_rate(&self) -> f64 {
        f64::from_bits(self.rate_bits.load(Ordering::Relaxed))
    }

    /// Operator override (§4.6): pins the rate and disables adaptation until
    /// `enable_adaptation` is called again.
    pub fn set_rate(&self, rate: f64) {
        self.rate_bits.store(rate.clamp(MIN_RATE, MAX_RATE).to_bits(), Ordering::Relaxed);
        self.adaptive.store(false, Ordering::Relaxed);
    }

    pub fn enable_adaptation(&self) {
        self.adaptive.store(true, Ordering::Relaxed);
    }

    /// Waits until the configured rate permits the next request, then
    /// records the new "last request" timestamp.
    pub async fn acquire(&self) {
        let interval = Duration::from_secs_f64(1.0 / self.current_rate());
        let mut state = self.state.lock().await;
        if let Some(last) = state.last_request {
            let elapsed = last.elapsed();
            if elapsed < interval {
                tokio::time::sleep(interval - elapsed).await;
            }
        }
        state.last_request = Some(Instant::now());
    }

    /// Like `acquire`, but races the wait against a cancellation signal.
    /// Returns `false` if cancellation fired before a token became
    /// available (§4.6: `wait` fails with `cancelled`).
    pub async fn acquire_cancellable(&self, cancel: &mut tokio::sync::watch::Receiver<bool>) -> bool {
        if *cancel.borrow() {
            return false;
        }
        let interval = Duration::from_secs_f64(1.0 / self.current_rate());
        let mut state = self.state.lock().await;
        if let Some(last) = state.last_request {
            let elapsed = last.elapsed();
            if elapsed < interval {
                tokio::select! {
                    _ = tokio::time::sleep(interval - elapsed) => {}
                    _ = cancel.changed() => {
                        if *cancel.borrow() {
                            return false;
                        }
                    }
                }
            }
        }
        state.last_request = Some(Instant::now());
        true
    }

    /// Feeds an observed round-trip time into the EMA and adjusts the rate
    /// when adaptation is enabled (§4.6). `ratio = target_rtt / ema_rtt`:
    /// below 1.0 the server is answering slower than the target, so the rate
    /// shrinks proportionally (floored at a 50% single-step drop); at or
    /// above 1.0 it's keeping up, so the rate grows by a flat 10%.
    pub async fn record_rtt(&self, observed: Duration) {
        if !self.adaptive.load(Ordering::Relaxed) {
            return;
        }

        let mut state = self.state.lock().await;
        let new_ema = match state.ema_rtt {
            None => observed,
            Some(prev) => {
                let prev_s = prev.as_secs_f64();
                let obs_s = observed.as_secs_f64();
                Duration::from_secs_f64(prev_s * (1.0 - EMA_SMOOTHING) + obs_s * EMA_SMOOTHING)
            }
        };
        state.ema_rtt = Some(new_ema);
        drop(state);

        let ema_s = new_ema.as_secs_f64();
        if ema_s <= 0.0 {
            return;
        }

        let ratio = TARGET_RTT.as_secs_f64() / ema_s;
        let current = self.current_rate();
        let proposed = if ratio < 1.0 {
            current * ratio.max(1.0 - MAX_DECREASE_RATIO)
        } else {
            current * SPEEDUP_FACTOR
        };

        let clamped = proposed.clamp(MIN_RATE, MAX_RATE);
        if (clamped - current).abs() > MIN_CHANGE {
            debug!(from = current, to = clamped, "adaptive rate limiter adjusted");
            self.rate_bits.store(clamped.to_bits(), Ordering::Relaxed);
        }
    }
}
