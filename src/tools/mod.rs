//! Collaborators around the extraction engine: where post URLs come from and
//! where the records go.

pub mod export;
pub mod profile;

pub use export::{CommentBuffer, Exporter};
pub use profile::ProfileCrawler;
