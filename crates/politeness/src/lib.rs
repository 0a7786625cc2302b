pub mod rate_limiter;
pub mod robots;

pub use rate_limiter::RateLimiter;
pub use robots::{RobotsCache, RobotsVerdict};
