//! The page seam: everything the engine does to a live page goes through
//! [`PageDriver`]. `ChromiumPage` implements it over CDP; tests implement it
//! over scripted DOM snapshots.

use crate::core::{CrawlError, CrawlResult};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chromiumoxide::Page;
use regex::RegexBuilder;
use serde::Deserialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::debug;

const CONTROL_ATTR: &str = "data-cscout-ctl";
const WAIT_POLL: Duration = Duration::from_millis(250);

/// How to find a clickable control on the page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlLocator {
    /// Deepest element whose text content matches the regex, case-insensitively.
    Text(String),
    /// Element whose `aria-label` contains the fragment.
    AriaLabel(String),
    /// `role="button"` element whose text contains the fragment, case-insensitively.
    RoleButton(String),
}

impl ControlLocator {
    pub fn text(pattern: &str) -> Self {
        ControlLocator::Text(pattern.to_string())
    }

    pub fn aria(fragment: &str) -> Self {
        ControlLocator::AriaLabel(fragment.to_string())
    }

    pub fn role_button(fragment: &str) -> Self {
        ControlLocator::RoleButton(fragment.to_string())
    }

    /// Rust-side evaluation of the same predicate the page script applies.
    ///
    /// Depth (for `Text`) is the caller's concern: only leaf-most matches
    /// should be offered.
    pub fn matches(&self, text: &str, aria_label: Option<&str>, role: Option<&str>) -> bool {
        match self {
            ControlLocator::Text(pattern) => RegexBuilder::new(pattern)
                .case_insensitive(true)
                .build()
                .map(|re| re.is_match(text))
                .unwrap_or(false),
            ControlLocator::AriaLabel(fragment) => {
                aria_label.is_some_and(|aria| aria.contains(fragment.as_str()))
            }
            ControlLocator::RoleButton(fragment) => {
                role == Some("button")
                    && text.to_lowercase().contains(&fragment.to_lowercase())
            }
        }
    }

    fn script_spec(&self) -> serde_json::Value {
        let (kind, pattern) = match self {
            ControlLocator::Text(p) => ("text", p),
            ControlLocator::AriaLabel(p) => ("aria", p),
            ControlLocator::RoleButton(p) => ("role_button", p),
        };
        serde_json::json!({ "kind": kind, "pattern": pattern })
    }
}

/// A visible control found on the page. `handle` is only meaningful to the
/// driver that produced it, and only until the next DOM mutation.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Control {
    pub handle: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub aria_label: Option<String>,
}

#[async_trait]
pub trait PageDriver: Send {
    async fn navigate(&mut self, url: &str, timeout: Duration) -> CrawlResult<()>;

    async fn current_url(&mut self) -> CrawlResult<String>;

    /// Serialized DOM of the current document.
    async fn html(&mut self) -> CrawlResult<String>;

    /// Scroll by `amount` pixels. Target: `preferred_selector`, else the
    /// top-most visible dialog's scrollable region, else the window.
    async fn scroll_step(&mut self, amount: i64, preferred_selector: Option<&str>) -> Result<()>;

    /// Visible controls among the first `limit` elements matching `locator`.
    async fn visible_controls(
        &mut self,
        locator: &ControlLocator,
        limit: usize,
    ) -> Result<Vec<Control>>;

    async fn click(&mut self, control: &Control, reveal: bool) -> Result<()>;

    /// Click the first element matching `css`. `Ok(false)` when absent.
    async fn click_selector(&mut self, css: &str) -> Result<bool>;

    /// Number of elements matching `css`; 0 when the query fails.
    async fn count(&mut self, css: &str) -> usize;

    /// Replace the value of the first element matching `css`. `Ok(false)` when absent.
    async fn fill(&mut self, css: &str, value: &str) -> Result<bool>;

    async fn export_cookies(&mut self) -> Result<Vec<serde_json::Value>>;

    /// Returns the number of cookies accepted.
    async fn import_cookies(&mut self, cookies: &[serde_json::Value]) -> Result<usize>;

    /// Poll until a visible control matches or `timeout` elapses.
    async fn wait_for_control(
        &mut self,
        locator: &ControlLocator,
        timeout: Duration,
    ) -> Option<Control> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Ok(mut found) = self.visible_controls(locator, 1).await {
                if !found.is_empty() {
                    return Some(found.swap_remove(0));
                }
            }
            if Instant::now() >= deadline {
                return None;
            }
            tokio::time::sleep(WAIT_POLL).await;
        }
    }
}

// ── Chromium implementation ──────────────────────────────────────────────────

static TAG_SEQ: AtomicU64 = AtomicU64::new(0);

/// Marks up to `limit` matching elements with a fresh tag and returns the
/// visible ones. Text matches keep only the deepest element so a container
/// whose descendants carry the label is never clicked instead of the label.
const TAG_CONTROLS_JS: &str = r#"
(spec) => {
    const visible = (el) => {
        const r = el.getBoundingClientRect();
        const s = window.getComputedStyle(el);
        return r.width > 0 && r.height > 0 && s.visibility !== 'hidden' && s.display !== 'none';
    };
    let found = [];
    if (spec.kind === 'text') {
        const re = new RegExp(spec.pattern, 'i');
        const all = Array.from(document.querySelectorAll('body *'))
            .filter((el) => re.test(el.textContent || ''));
        found = all.filter((el) => !Array.from(el.children).some((c) => re.test(c.textContent || '')));
    } else if (spec.kind === 'aria') {
        found = Array.from(document.querySelectorAll('[aria-label]'))
            .filter((el) => (el.getAttribute('aria-label') || '').includes(spec.pattern));
    } else {
        const needle = spec.pattern.toLowerCase();
        found = Array.from(document.querySelectorAll('[role="button"]'))
            .filter((el) => (el.textContent || '').toLowerCase().includes(needle));
    }
    const out = [];
    found.slice(0, spec.limit).forEach((el, i) => {
        if (!visible(el)) return;
        const handle = spec.prefix + '-' + i;
        el.setAttribute(spec.attr, handle);
        out.push({ handle, text: (el.innerText || el.textContent || '').trim(), aria_label: el.getAttribute('aria-label') });
    });
    return out;
}
"#;

const SCROLL_JS: &str = r#"
(info) => {
    const scrollable = (el) => {
        if (!el) return false;
        const s = window.getComputedStyle(el);
        return (s.overflowY === 'auto' || s.overflowY === 'scroll') && el.scrollHeight > el.clientHeight;
    };
    const firstScrollable = (el) => {
        if (scrollable(el)) return el;
        for (const child of el.children) {
            const hit = firstScrollable(child);
            if (hit) return hit;
        }
        return null;
    };
    if (info.selector) {
        const el = document.querySelector(info.selector);
        if (el) {
            (firstScrollable(el) || el).scrollBy(0, info.amount);
            return 'selector';
        }
    }
    const dialogs = Array.from(document.querySelectorAll('div[role="dialog"], div[tabindex="-1"]'))
        .filter((el) => {
            const s = window.getComputedStyle(el);
            return s.display !== 'none' && s.visibility !== 'hidden' && el.offsetParent !== null;
        });
    if (dialogs.length > 0) {
        const target = firstScrollable(dialogs[dialogs.length - 1]);
        if (target) {
            target.scrollBy(0, info.amount);
            return 'dialog';
        }
    }
    window.scrollBy(0, info.amount);
    return 'window';
}
"#;

const FILL_JS: &str = r#"
(info) => {
    const el = document.querySelector(info.selector);
    if (!el) return false;
    el.focus();
    el.value = '';
    el.dispatchEvent(new Event('input', { bubbles: true }));
    return true;
}
"#;

/// `PageDriver` over a live chromiumoxide tab.
pub struct ChromiumPage {
    page: Page,
}

impl ChromiumPage {
    pub fn new(page: Page) -> Self {
        Self { page }
    }

    async fn call_fn<T: serde::de::DeserializeOwned>(
        &self,
        function: &str,
        arg: serde_json::Value,
    ) -> Result<T> {
        let expr = format!("({})({})", function.trim(), arg);
        self.page
            .evaluate(expr)
            .await
            .map_err(|e| anyhow!("evaluate failed: {}", e))?
            .into_value::<T>()
            .map_err(|e| anyhow!("unexpected script result: {}", e))
    }
}

#[async_trait]
impl PageDriver for ChromiumPage {
    async fn navigate(&mut self, url: &str, timeout: Duration) -> CrawlResult<()> {
        match tokio::time::timeout(timeout, self.page.goto(url)).await {
            Err(_) => Err(CrawlError::NavigationTimeout {
                url: url.to_string(),
                timeout,
            }),
            Ok(Err(e)) => Err(CrawlError::Navigation {
                url: url.to_string(),
                reason: e.to_string(),
            }),
            Ok(Ok(_)) => Ok(()),
        }
    }

    async fn current_url(&mut self) -> CrawlResult<String> {
        self.page
            .url()
            .await
            .map(|u| u.unwrap_or_default())
            .map_err(|e| CrawlError::Page(format!("url: {}", e)))
    }

    async fn html(&mut self) -> CrawlResult<String> {
        self.page
            .content()
            .await
            .map_err(|e| CrawlError::Page(format!("content: {}", e)))
    }

    async fn scroll_step(&mut self, amount: i64, preferred_selector: Option<&str>) -> Result<()> {
        let target: String = self
            .call_fn(
                SCROLL_JS,
                serde_json::json!({ "amount": amount, "selector": preferred_selector }),
            )
            .await?;
        debug!("scrolled {}px ({})", amount, target);
        Ok(())
    }

    async fn visible_controls(
        &mut self,
        locator: &ControlLocator,
        limit: usize,
    ) -> Result<Vec<Control>> {
        let mut spec = locator.script_spec();
        spec["limit"] = limit.into();
        spec["attr"] = CONTROL_ATTR.into();
        spec["prefix"] = format!("c{}", TAG_SEQ.fetch_add(1, Ordering::Relaxed)).into();
        self.call_fn(TAG_CONTROLS_JS, spec).await
    }

    async fn click(&mut self, control: &Control, reveal: bool) -> Result<()> {
        let selector = format!("[{}=\"{}\"]", CONTROL_ATTR, control.handle);
        let element = self
            .page
            .find_element(selector.as_str())
            .await
            .map_err(|e| anyhow!("control {} gone: {}", control.handle, e))?;
        if reveal {
            element
                .scroll_into_view()
                .await
                .map_err(|e| anyhow!("scroll_into_view: {}", e))?;
        }
        element
            .click()
            .await
            .map_err(|e| anyhow!("click {}: {}", control.handle, e))?;
        Ok(())
    }

    async fn click_selector(&mut self, css: &str) -> Result<bool> {
        let Ok(element) = self.page.find_element(css).await else {
            return Ok(false);
        };
        element
            .click()
            .await
            .map_err(|e| anyhow!("click {}: {}", css, e))?;
        Ok(true)
    }

    async fn count(&mut self, css: &str) -> usize {
        let expr = format!(
            "document.querySelectorAll({}).length",
            serde_json::Value::from(css)
        );
        match self.page.evaluate(expr).await {
            Ok(v) => v.into_value::<usize>().unwrap_or(0),
            Err(e) => {
                debug!("count({}) failed: {}", css, e);
                0
            }
        }
    }

    async fn fill(&mut self, css: &str, value: &str) -> Result<bool> {
        let present: bool = self
            .call_fn(FILL_JS, serde_json::json!({ "selector": css }))
            .await?;
        if !present {
            return Ok(false);
        }
        let element = self
            .page
            .find_element(css)
            .await
            .map_err(|e| anyhow!("{}: {}", css, e))?;
        element
            .click()
            .await
            .map_err(|e| anyhow!("focus {}: {}", css, e))?;
        element
            .type_str(value)
            .await
            .map_err(|e| anyhow!("type into {}: {}", css, e))?;
        Ok(true)
    }

    async fn export_cookies(&mut self) -> Result<Vec<serde_json::Value>> {
        let cookies = self
            .page
            .get_cookies()
            .await
            .map_err(|e| anyhow!("getCookies: {}", e))?;
        cookies
            .iter()
            .map(|c| serde_json::to_value(c).map_err(|e| anyhow!("cookie encode: {}", e)))
            .collect()
    }

    async fn import_cookies(&mut self, cookies: &[serde_json::Value]) -> Result<usize> {
        use chromiumoxide::cdp::browser_protocol::network::{CookieParam, SetCookiesParams};
        let params: Vec<CookieParam> = cookies
            .iter()
            .filter_map(|v| serde_json::from_value::<CookieParam>(v.clone()).ok())
            .collect();
        if params.is_empty() {
            return Ok(0);
        }
        let count = params.len();
        self.page
            .execute(SetCookiesParams::new(params))
            .await
            .map_err(|e| anyhow!("setCookies: {}", e))?;
        Ok(count)
    }
}
