//! Scripted stand-in for a browser tab.
//!
//! A `FakePage` renders a static header, then one batch of comment markup per
//! load-more click; the load-more control only shows after a scroll. Controls
//! are matched with `ControlLocator::matches`, so the engine sees the same
//! locator semantics it gets from Chromium.
#![allow(dead_code)]

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use comment_scout::core::CrawlerConfig;
use comment_scout::scraping::{Control, ControlLocator, PageDriver};
use comment_scout::{CrawlError, CrawlResult};
use scraper::{Html, Selector};
use std::collections::HashSet;
use std::time::Duration;

pub const BASE: &str = "https://www.facebook.com";

pub fn init_logger() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

/// Config with no waiting anywhere: zero element wait, everything else default.
pub fn fast_config() -> CrawlerConfig {
    CrawlerConfig {
        element_wait: Duration::ZERO,
        request_timeout: Duration::from_secs(1),
        ..CrawlerConfig::default()
    }
}

/// `div[role=article]` comment with an author link, a body and a relative time.
pub fn comment_html(author: &str, body: &str) -> String {
    format!(
        r#"<div role="article" aria-label="Comment by {author}">
             <a role="link" href="/{slug}">{author}</a>
             <div dir="auto">{body}</div>
             <a href="/x/posts/1?comment_id=9">2h</a>
           </div>"#,
        author = author,
        slug = author.to_lowercase().replace(' ', "."),
        body = body
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlKind {
    OpenSection,
    LoadMore,
    /// Disappears once clicked.
    Reply,
    /// Disappears once clicked.
    SeeMore,
    Inert,
}

#[derive(Debug, Clone)]
pub struct FakeControl {
    pub handle: String,
    pub text: String,
    pub aria: Option<String>,
    pub role: Option<String>,
    pub kind: ControlKind,
}

impl FakeControl {
    pub fn new(handle: &str, text: &str, kind: ControlKind) -> Self {
        Self {
            handle: handle.to_string(),
            text: text.to_string(),
            aria: None,
            role: None,
            kind,
        }
    }

    pub fn with_aria(mut self, aria: &str) -> Self {
        self.aria = Some(aria.to_string());
        self
    }
}

#[derive(Default)]
pub struct FakePage {
    pub url: String,
    pub header_html: String,
    /// Comment markup, one entry revealed per load-more click.
    pub batches: Vec<String>,
    pub initial_revealed: usize,
    revealed: usize,
    has_opener: bool,
    section_open: bool,
    /// The load-more control sits below the fold until the page is scrolled.
    scrolled_since_load: bool,
    /// Reply / see-more / inert controls restored on every navigation.
    pub control_template: Vec<FakeControl>,
    controls: Vec<FakeControl>,
    /// When set, `html()` replays these instead of composing a post page.
    pub snapshots: Vec<String>,
    html_calls: usize,
    pub failing_urls: HashSet<String>,
    pub broken_handles: HashSet<String>,
    /// Page state after the login button is clicked: (url, header html).
    pub after_submit: Option<(String, String)>,

    pub navigated: Vec<String>,
    pub clicked: Vec<String>,
    pub filled: Vec<(String, String)>,
    pub scroll_steps: usize,
    pub cookies: Vec<serde_json::Value>,
}

impl FakePage {
    pub fn new() -> Self {
        Self {
            section_open: true,
            ..Default::default()
        }
    }

    /// Post page whose header carries the post context.
    pub fn post(author: &str, body: &str) -> Self {
        let mut page = Self::new();
        page.header_html = format!(
            r#"<div data-ad-preview="message"><h2><a href="/{a}">{a}</a></h2><div dir="auto">{b}</div></div>"#,
            a = author,
            b = body
        );
        page
    }

    /// Comments stay hidden behind a "View N comments" control until it is clicked.
    pub fn with_opener(mut self) -> Self {
        self.has_opener = true;
        self.section_open = false;
        self
    }

    pub fn with_batches(mut self, batches: Vec<String>) -> Self {
        self.batches = batches;
        self
    }

    pub fn with_controls(mut self, controls: Vec<FakeControl>) -> Self {
        self.controls = controls.clone();
        self.control_template = controls;
        self
    }

    pub fn revealed(&self) -> usize {
        self.revealed
    }

    fn compose(&self) -> String {
        if !self.snapshots.is_empty() {
            let idx = self.html_calls.min(self.snapshots.len() - 1);
            return self.snapshots[idx].clone();
        }
        let comments: String = self.batches[..self.revealed].concat();
        format!(
            "<html><body>{}<section>{}</section></body></html>",
            self.header_html, comments
        )
    }

    fn live_controls(&self) -> Vec<FakeControl> {
        let mut live = Vec::new();
        if self.has_opener && !self.section_open {
            live.push(FakeControl::new("open", "View 12 comments", ControlKind::OpenSection));
        }
        if self.section_open && self.scrolled_since_load && self.revealed < self.batches.len() {
            live.push(FakeControl::new("load-more", "View more comments", ControlKind::LoadMore));
        }
        live.extend(self.controls.iter().cloned());
        live
    }

    fn count_in(html: &str, css: &str) -> usize {
        let Ok(sel) = Selector::parse(css) else {
            return 0;
        };
        Html::parse_document(html).select(&sel).count()
    }
}

#[async_trait]
impl PageDriver for FakePage {
    async fn navigate(&mut self, url: &str, timeout: Duration) -> CrawlResult<()> {
        self.navigated.push(url.to_string());
        if self.failing_urls.contains(url) {
            return Err(CrawlError::NavigationTimeout {
                url: url.to_string(),
                timeout,
            });
        }
        self.url = url.to_string();
        self.revealed = self.initial_revealed.min(self.batches.len());
        self.section_open = !self.has_opener;
        self.scrolled_since_load = false;
        self.controls = self.control_template.clone();
        Ok(())
    }

    async fn current_url(&mut self) -> CrawlResult<String> {
        Ok(self.url.clone())
    }

    async fn html(&mut self) -> CrawlResult<String> {
        let html = self.compose();
        self.html_calls += 1;
        Ok(html)
    }

    async fn scroll_step(&mut self, _amount: i64, _preferred_selector: Option<&str>) -> Result<()> {
        self.scroll_steps += 1;
        self.scrolled_since_load = true;
        Ok(())
    }

    async fn visible_controls(
        &mut self,
        locator: &ControlLocator,
        limit: usize,
    ) -> Result<Vec<Control>> {
        Ok(self
            .live_controls()
            .into_iter()
            .filter(|c| locator.matches(&c.text, c.aria.as_deref(), c.role.as_deref()))
            .take(limit)
            .map(|c| Control {
                handle: c.handle,
                text: c.text,
                aria_label: c.aria,
            })
            .collect())
    }

    async fn click(&mut self, control: &Control, _reveal: bool) -> Result<()> {
        if self.broken_handles.contains(&control.handle) {
            return Err(anyhow!("element is not clickable"));
        }
        let kind = self
            .live_controls()
            .iter()
            .find(|c| c.handle == control.handle)
            .map(|c| c.kind)
            .ok_or_else(|| anyhow!("stale control {}", control.handle))?;
        self.clicked.push(control.handle.clone());
        match kind {
            ControlKind::OpenSection => self.section_open = true,
            ControlKind::LoadMore => {
                self.revealed += 1;
                self.scrolled_since_load = false;
            }
            ControlKind::Reply | ControlKind::SeeMore => {
                self.controls.retain(|c| c.handle != control.handle)
            }
            ControlKind::Inert => {}
        }
        Ok(())
    }

    async fn click_selector(&mut self, css: &str) -> Result<bool> {
        if Self::count_in(&self.compose(), css) == 0 {
            return Ok(false);
        }
        self.clicked.push(css.to_string());
        if let Some((url, header)) = self.after_submit.take() {
            self.url = url;
            self.header_html = header;
        }
        Ok(true)
    }

    async fn count(&mut self, css: &str) -> usize {
        Self::count_in(&self.compose(), css)
    }

    async fn fill(&mut self, css: &str, value: &str) -> Result<bool> {
        if Self::count_in(&self.compose(), css) == 0 {
            return Ok(false);
        }
        self.filled.push((css.to_string(), value.to_string()));
        Ok(true)
    }

    async fn export_cookies(&mut self) -> Result<Vec<serde_json::Value>> {
        Ok(self.cookies.clone())
    }

    async fn import_cookies(&mut self, cookies: &[serde_json::Value]) -> Result<usize> {
        self.cookies.extend(cookies.iter().cloned());
        Ok(cookies.len())
    }
}
