pub mod config;
pub mod error;
pub mod types;

pub use config::CrawlerConfig;
pub use error::{CrawlError, CrawlResult};
