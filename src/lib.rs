pub mod core;
pub mod extraction;
pub mod features;
pub mod scraping;
pub mod tools;

// --- Primary core exports ---
pub use core::{config, types};
pub use core::types::*;
pub use core::{CrawlError, CrawlResult, CrawlerConfig};

// --- Short module paths ---
pub use extraction::{CommentExtractor, ConvergenceReport, StopReason};
pub use features::{auth, pacing, session_store};
pub use scraping::page::{ControlLocator, PageDriver};
pub use tools::{export, profile};
