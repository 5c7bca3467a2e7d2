//! The comment extraction engine.
//!
//! Per post: navigate → settle → post context → convergence loop → one DOM
//! snapshot → discovery → field extraction. Snapshot parsing stays inside
//! synchronous helpers so no `scraper::Html` is held across an await.

pub mod discovery;
pub mod fields;
pub mod navigation;
pub mod patterns;
pub mod post_context;
pub mod text;

pub use navigation::{ConvergenceLimits, ConvergenceReport, StopReason};

use crate::core::types::{CommentRecord, PostContext, PostOutcome};
use crate::core::{CrawlError, CrawlResult, CrawlerConfig};
use crate::features::auth::{classify_page, LoginState};
use crate::features::pacing::{Pacer, BEFORE_EXTRACTION, SETTLE_AFTER_NAVIGATION};
use crate::scraping::page::PageDriver;
use crate::tools::export::CommentBuffer;
use chrono::{DateTime, Utc};
use scraper::Html;
use tracing::{info, warn};

/// Comments and diagnostics for one post.
#[derive(Debug, Clone)]
pub struct PostExtraction {
    pub context: PostContext,
    pub records: Vec<CommentRecord>,
    pub report: ConvergenceReport,
}

pub struct CommentExtractor<'a> {
    config: &'a CrawlerConfig,
    pacer: Pacer,
}

impl<'a> CommentExtractor<'a> {
    pub fn new(config: &'a CrawlerConfig, pacer: Pacer) -> Self {
        Self { config, pacer }
    }

    /// Extract every comment the page can be made to show for `post_url`.
    ///
    /// Errors are post-scoped: navigation failure, an unreadable page, or the
    /// platform re-challenging the session.
    pub async fn extract_post<D: PageDriver + ?Sized>(
        &self,
        driver: &mut D,
        post_url: &str,
    ) -> CrawlResult<PostExtraction> {
        info!("Crawling comments from: {}", post_url);
        driver
            .navigate(post_url, self.config.request_timeout)
            .await?;
        self.pacer.pause(SETTLE_AFTER_NAVIGATION).await;

        let landed = driver
            .current_url()
            .await
            .unwrap_or_else(|_| post_url.to_string());
        let html = driver.html().await?;
        let context = match inspect_landing(&html, &landed) {
            LoginState::Challenged => {
                return Err(CrawlError::Page(format!(
                    "verification challenge while opening {}",
                    post_url
                )))
            }
            LoginState::LoggedOut => {
                return Err(CrawlError::Page(format!(
                    "redirected to login while opening {}",
                    post_url
                )))
            }
            LoginState::LoggedIn => context_from_html(&html, &landed),
        };

        let limits = ConvergenceLimits::from_config(self.config);
        let report = navigation::converge(driver, limits, &self.pacer).await;
        info!(
            "Convergence: {} iterations, {} load-more clicks, {} reply threads, {} truncations ({:?})",
            report.iterations,
            report.load_more_clicks,
            report.replies_expanded,
            report.see_more_expanded,
            report.stop_reason
        );

        self.pacer.pause(BEFORE_EXTRACTION).await;
        let html = driver.html().await?;
        let records = build_records(&html, &context, Utc::now());
        info!("Extracted {} comments from post", records.len());

        Ok(PostExtraction {
            context,
            records,
            report,
        })
    }

    /// Crawl `post_urls` in order, handing each post's records to `buffer`
    /// as soon as the post completes. A failing post is logged and yields
    /// zero records; only non-post errors abort the run.
    pub async fn crawl_posts<D: PageDriver + ?Sized>(
        &self,
        driver: &mut D,
        post_urls: &[String],
        buffer: &mut CommentBuffer,
    ) -> CrawlResult<Vec<(String, PostOutcome)>> {
        let mut outcomes = Vec::with_capacity(post_urls.len());
        for (idx, url) in post_urls.iter().enumerate() {
            info!("Processing post {}/{}", idx + 1, post_urls.len());
            let outcome = match self.extract_post(driver, url).await {
                Ok(extraction) if extraction.records.is_empty() => {
                    buffer.push_post(url, Vec::new());
                    PostOutcome::Empty
                }
                Ok(extraction) => {
                    let n = extraction.records.len();
                    buffer.push_post(url, extraction.records);
                    PostOutcome::Collected(n)
                }
                Err(e) if e.is_post_scoped() => {
                    warn!("Error crawling post {}: {}", url, e);
                    buffer.push_post(url, Vec::new());
                    PostOutcome::Failed(e.to_string())
                }
                Err(e) => return Err(e),
            };
            outcomes.push((url.clone(), outcome));
            if idx + 1 < post_urls.len() {
                self.pacer.between_actions().await;
            }
        }
        Ok(outcomes)
    }
}

fn inspect_landing(html: &str, url: &str) -> LoginState {
    let document = Html::parse_document(html);
    classify_page(url, &document)
}

fn context_from_html(html: &str, post_url: &str) -> PostContext {
    let document = Html::parse_document(html);
    post_context::extract_post_context(&document, post_url)
}

/// Discovery plus field extraction over one snapshot. `comment_id` is the
/// candidate's position in the discovery sequence.
pub fn build_records(
    html: &str,
    context: &PostContext,
    crawled_at: DateTime<Utc>,
) -> Vec<CommentRecord> {
    let document = Html::parse_document(html);
    let nodes = discovery::discover_comment_nodes(&document);
    info!("Found {} potential comment elements", nodes.len());
    if nodes.is_empty() {
        warn!("No comment elements found. Page URL: {}", context.post_url);
    }

    nodes
        .iter()
        .enumerate()
        .filter_map(|(idx, node)| {
            fields::extract_fields(node).map(|f| {
                CommentRecord::new(context, format!("comment_{}", idx), f, crawled_at)
            })
        })
        .collect()
}
