pub mod check;
pub mod retry;

pub use check::{check_url, CheckError, CheckSuccess};
pub use retry::check_with_retries;
