pub mod extract;

pub use extract::{extract_links, ExtractedPage};
