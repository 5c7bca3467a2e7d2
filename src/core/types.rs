use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Placeholder author for comments whose author link could not be located.
pub const UNKNOWN_AUTHOR: &str = "Unknown User";

/// Post-level metadata copied into every record extracted from that post.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostContext {
    pub post_url: String,
    pub post_author: String,
    /// At most 500 characters, followed by `...` when truncated.
    pub post_content: String,
    pub post_timestamp: String,
}

/// Fields recovered from one comment node, before post context is attached.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommentFields {
    pub author_name: String,
    pub author_url: String,
    pub text: String,
    pub timestamp: String,
    pub likes: u64,
    pub replies: u64,
}

/// One exported comment row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommentRecord {
    pub post_url: String,
    pub post_author: String,
    pub post_content: String,
    pub post_timestamp: String,
    pub comment_id: String,
    pub comment_author_name: String,
    pub comment_author_url: String,
    pub comment_text: String,
    /// Raw relative time as rendered ("2h", "3 hari"), empty when absent.
    pub comment_timestamp: String,
    pub likes_count: u64,
    pub replies_count: u64,
    /// Always empty: replies are not linked to their parent comment.
    pub parent_comment_id: String,
    pub crawled_at: DateTime<Utc>,
}

impl CommentRecord {
    pub fn new(
        context: &PostContext,
        comment_id: String,
        fields: CommentFields,
        crawled_at: DateTime<Utc>,
    ) -> Self {
        Self {
            post_url: context.post_url.clone(),
            post_author: context.post_author.clone(),
            post_content: context.post_content.clone(),
            post_timestamp: context.post_timestamp.clone(),
            comment_id,
            comment_author_name: fields.author_name,
            comment_author_url: fields.author_url,
            comment_text: fields.text,
            comment_timestamp: fields.timestamp,
            likes_count: fields.likes,
            replies_count: fields.replies,
            parent_comment_id: String::new(),
            crawled_at,
        }
    }
}

/// Operator-facing totals over a set of records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CrawlStats {
    pub total_comments: usize,
    pub unique_posts: usize,
    pub unique_authors: usize,
}

impl CrawlStats {
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a CommentRecord>) -> Self {
        let mut total = 0;
        let mut posts = HashSet::new();
        let mut authors = HashSet::new();
        for record in records {
            total += 1;
            posts.insert(record.post_url.as_str());
            authors.insert(record.comment_author_name.as_str());
        }
        Self {
            total_comments: total,
            unique_posts: posts.len(),
            unique_authors: authors.len(),
        }
    }
}

/// Outcome of crawling one post, as reported to the operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PostOutcome {
    Collected(usize),
    Empty,
    Failed(String),
}
