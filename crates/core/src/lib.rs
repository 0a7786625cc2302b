pub mod classify;
pub mod config;
pub mod error;
pub mod types;
pub mod url_utils;

pub use classify::classify_error;
pub use config::CrawlConfig;
pub use error::LinkRotError;
pub use types::*;
