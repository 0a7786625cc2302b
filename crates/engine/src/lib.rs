pub mod coordinator;
pub mod memory_watcher;

pub use coordinator::{run_crawl, CrawlHandle};
pub use memory_watcher::{MemoryPressure, MemoryWatcher};
