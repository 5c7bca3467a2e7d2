//! Profile discovery: turn a profile (URL or username) into a list of post URLs
//! by scrolling its timeline and harvesting post permalinks.

use crate::core::{CrawlResult, CrawlerConfig};
use crate::extraction::navigation::human_scroll;
use crate::features::pacing::{Pacer, PROFILE_AFTER_SCROLL, SETTLE_AFTER_NAVIGATION};
use crate::scraping::page::PageDriver;
use scraper::{Html, Selector};
use std::collections::HashSet;
use tracing::{debug, info, warn};
use url::Url;

const PROFILE_SCROLL_AMOUNT: i64 = 500;

/// Consecutive passes without a new URL before the timeline counts as exhausted.
const STALE_PASSES_BEFORE_STOP: u32 = 3;

/// `a[href*=...]` fragments that identify post permalinks.
pub const POST_LINK_MARKERS: &[&str] = &[
    "/posts/",
    "/story.php",
    "/permalink.php",
    "/videos/",
    "/reel/",
    "/photo",
];

/// Markers that only count once a link has passed `NON_POST_PATTERNS`.
const VALID_POST_PATTERNS: &[&str] = &[
    "/posts/",
    "/story.php?",
    "/permalink.php?",
    "/videos/",
    "/reel/",
    "/photo.php?",
    "/photo/?",
];

const NON_POST_PATTERNS: &[&str] = &[
    "/about",
    "/friends",
    "/photos",
    "/videos/?",
    "/groups",
    "/events",
    "photo.php?fbid",
    "/reels?",
    "/watch",
];

/// Query parameters that identify a post on `*.php` and `/photo` endpoints.
const IDENTIFYING_PARAMS: &[&str] = &["story_fbid", "fbid", "id"];

/// `profile.php?id=<n>` yields `<n>`, anything else the last path segment.
pub fn extract_username(profile_url: &str) -> Option<String> {
    let url = Url::parse(profile_url).ok()?;
    if url.path().ends_with("profile.php") {
        return url
            .query_pairs()
            .find(|(k, _)| k == "id")
            .map(|(_, v)| v.into_owned())
            .filter(|v| !v.is_empty());
    }
    url.path_segments()?
        .filter(|s| !s.is_empty())
        .last()
        .map(str::to_string)
}

/// Profile URL for a username; full URLs are passed through.
pub fn profile_url_for(username_or_url: &str, base_url: &str) -> String {
    let trimmed = username_or_url.trim();
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        return trimmed.to_string();
    }
    format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        trimmed.trim_start_matches('@').trim_matches('/')
    )
}

pub fn is_valid_post_url(href: &str) -> bool {
    if NON_POST_PATTERNS.iter().any(|p| href.contains(p)) {
        return false;
    }
    if !href.contains("facebook.com") && !href.starts_with('/') {
        return false;
    }
    VALID_POST_PATTERNS.iter().any(|p| href.contains(p))
}

/// Absolute, fragment-free post URL. The query string is dropped except for
/// the parameters that name the post on `*.php` and `/photo` endpoints.
pub fn normalize_post_url(href: &str, base_url: &str) -> Option<String> {
    let base = Url::parse(base_url).ok()?;
    let mut url = base.join(href).ok()?;
    url.set_fragment(None);

    let path = url.path().trim_end_matches('/');
    let keeps_params = path.ends_with(".php") || path.ends_with("/photo");
    let kept: Vec<(String, String)> = if keeps_params {
        url.query_pairs()
            .filter(|(k, _)| IDENTIFYING_PARAMS.contains(&k.as_ref()))
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect()
    } else {
        Vec::new()
    };
    url.set_query(None);
    if !kept.is_empty() {
        url.query_pairs_mut().extend_pairs(kept);
    }
    Some(url.to_string())
}

/// Post permalinks present in one timeline snapshot, grouped by marker and
/// in document order within each marker.
pub fn extract_post_urls(document: &Html, base_url: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut urls = Vec::new();
    for marker in POST_LINK_MARKERS {
        let Ok(sel) = Selector::parse(&format!(r#"a[href*="{}"]"#, marker)) else {
            continue;
        };
        for link in document.select(&sel) {
            let Some(href) = link.value().attr("href") else {
                continue;
            };
            if !is_valid_post_url(href) {
                continue;
            }
            if let Some(url) = normalize_post_url(href, base_url) {
                if seen.insert(url.clone()) {
                    urls.push(url);
                }
            }
        }
    }
    urls
}

/// `true` once the browser has drifted from the profile to the feed.
fn left_profile(current_url: &str, base_url: &str) -> bool {
    let home = format!("{}/", base_url.trim_end_matches('/'));
    current_url == home || current_url.contains("/home")
}

fn harvest(html: &str, base_url: &str) -> Vec<String> {
    let document = Html::parse_document(html);
    extract_post_urls(&document, base_url)
}

pub struct ProfileCrawler<'a> {
    config: &'a CrawlerConfig,
    pacer: Pacer,
}

impl<'a> ProfileCrawler<'a> {
    pub fn new(config: &'a CrawlerConfig, pacer: Pacer) -> Self {
        Self { config, pacer }
    }

    /// Scroll the profile timeline and collect up to `max_posts` post URLs in
    /// first-seen order. Navigation failure is returned to the caller; a
    /// timeline that yields nothing is an empty list.
    pub async fn collect_post_urls<D: PageDriver + ?Sized>(
        &self,
        driver: &mut D,
        profile_url: &str,
        max_posts: usize,
    ) -> CrawlResult<Vec<String>> {
        info!("Fetching posts from profile: {}", profile_url);
        driver
            .navigate(profile_url, self.config.request_timeout)
            .await?;
        self.pacer.pause(SETTLE_AFTER_NAVIGATION).await;

        let base = self.config.base_url.as_str();
        let mut ordered: Vec<String> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        let mut scrolls = 0u32;
        let mut stale_passes = 0u32;

        while ordered.len() < max_posts && scrolls < self.config.profile_scroll_limit {
            let html = match driver.html().await {
                Ok(h) => h,
                Err(e) => {
                    warn!("Could not snapshot profile timeline: {}", e);
                    break;
                }
            };
            let before = ordered.len();
            for url in harvest(&html, base) {
                if seen.insert(url.clone()) {
                    ordered.push(url);
                }
            }
            debug!(
                "Profile pass {}: {} new, {} total",
                scrolls + 1,
                ordered.len() - before,
                ordered.len()
            );

            if ordered.len() >= max_posts {
                break;
            }
            if ordered.len() == before {
                stale_passes += 1;
                if stale_passes >= STALE_PASSES_BEFORE_STOP {
                    info!("No new posts after {} scrolls, stopping", stale_passes);
                    break;
                }
            } else {
                stale_passes = 0;
            }

            if let Ok(current) = driver.current_url().await {
                if left_profile(&current, base) {
                    warn!("Navigated away from profile to {}, stopping", current);
                    break;
                }
            }

            human_scroll(driver, PROFILE_SCROLL_AMOUNT, None, &self.pacer).await;
            self.pacer.pause(PROFILE_AFTER_SCROLL).await;
            scrolls += 1;
        }

        ordered.truncate(max_posts);
        info!("Found {} posts on profile", ordered.len());
        Ok(ordered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = "https://www.facebook.com";

    #[test]
    fn username_from_vanity_or_numeric_profile() {
        assert_eq!(
            extract_username("https://www.facebook.com/some.page/").as_deref(),
            Some("some.page")
        );
        assert_eq!(
            extract_username("https://www.facebook.com/profile.php?id=100012345").as_deref(),
            Some("100012345")
        );
        assert_eq!(extract_username("not a url"), None);
    }

    #[test]
    fn profile_url_from_username() {
        assert_eq!(
            profile_url_for("some.page", BASE),
            "https://www.facebook.com/some.page"
        );
        assert_eq!(
            profile_url_for("https://www.facebook.com/x", BASE),
            "https://www.facebook.com/x"
        );
    }

    #[test]
    fn non_post_links_are_rejected() {
        assert!(is_valid_post_url("/some.page/posts/pfbid02abc"));
        assert!(is_valid_post_url("https://www.facebook.com/reel/123"));
        assert!(!is_valid_post_url("/some.page/photos"));
        assert!(!is_valid_post_url("https://www.facebook.com/photo.php?fbid=1"));
        assert!(!is_valid_post_url("/watch/?v=1"));
        assert!(!is_valid_post_url("https://other.example/posts/1"));
    }

    #[test]
    fn normalization_strips_tracking_but_keeps_post_identity() {
        assert_eq!(
            normalize_post_url("/some.page/posts/123?__cft__[0]=abc#x", BASE).as_deref(),
            Some("https://www.facebook.com/some.page/posts/123")
        );
        assert_eq!(
            normalize_post_url("/story.php?story_fbid=9&id=4&__tn__=R", BASE).as_deref(),
            Some("https://www.facebook.com/story.php?story_fbid=9&id=4")
        );
    }

    #[test]
    fn snapshot_links_are_deduplicated_in_document_order() {
        let html = r#"<html><body>
            <a href="/p/posts/2?ref=a">two</a>
            <a href="/p/about">about</a>
            <a href="/p/posts/1">one</a>
            <a href="https://www.facebook.com/p/posts/2?ref=b">two again</a>
            <a href="/reel/77">reel</a>
        </body></html>"#;
        let urls = extract_post_urls(&Html::parse_document(html), BASE);
        assert_eq!(
            urls,
            vec![
                "https://www.facebook.com/p/posts/2",
                "https://www.facebook.com/p/posts/1",
                "https://www.facebook.com/reel/77",
            ]
        );
    }

    #[test]
    fn home_feed_counts_as_leaving_the_profile() {
        assert!(left_profile("https://www.facebook.com/", BASE));
        assert!(left_profile("https://www.facebook.com/home.php", BASE));
        assert!(!left_profile("https://www.facebook.com/some.page", BASE));
    }
}
