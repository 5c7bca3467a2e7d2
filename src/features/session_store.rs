//! Session cookie persistence: load/inject and save helpers.
//!
//! Cookies live as a JSON array under `<data_dir>/cookies/cookies_<id>.json`.
//! They are read once when the session starts and written once after a
//! successful authentication.

use crate::core::CrawlResult;
use crate::scraping::page::PageDriver;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub const DEFAULT_IDENTIFIER: &str = "default";

pub struct SessionStore {
    dir: PathBuf,
}

impl SessionStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// `cookies_<identifier>.json` inside the store directory.
    pub fn path(&self, identifier: &str) -> PathBuf {
        self.dir.join(format!("cookies_{}.json", identifier))
    }

    /// Stored cookies as raw JSON values; `None` when the file is missing,
    /// unreadable or holds an empty array.
    pub fn load(&self, identifier: &str) -> Option<Vec<serde_json::Value>> {
        let path = self.path(identifier);
        let content = std::fs::read_to_string(&path).ok()?;
        let cookies: Vec<serde_json::Value> = match serde_json::from_str(&content) {
            Ok(c) => c,
            Err(e) => {
                warn!(
                    "session_store: ignoring malformed cookie file {}: {}",
                    path.display(),
                    e
                );
                return None;
            }
        };
        if cookies.is_empty() {
            return None;
        }
        info!(
            "session_store: 🍪 loaded {} cookies ({})",
            cookies.len(),
            path.display()
        );
        Some(cookies)
    }

    pub fn save(&self, identifier: &str, cookies: &[serde_json::Value]) -> CrawlResult<PathBuf> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.path(identifier);
        let json = serde_json::to_string_pretty(cookies)?;
        std::fs::write(&path, json)?;
        info!(
            "session_store: saved {} cookies to {}",
            cookies.len(),
            path.display()
        );
        Ok(path)
    }

    /// Remove a stale session file so the next run logs in afresh.
    pub fn invalidate(&self, identifier: &str) {
        remove_if_present(&self.path(identifier));
    }
}

fn remove_if_present(path: &Path) {
    if !path.exists() {
        return;
    }
    match std::fs::remove_file(path) {
        Ok(()) => info!("session_store: 🗑️  removed stale session ({})", path.display()),
        Err(e) => warn!(
            "session_store: failed to remove session file {}: {}",
            path.display(),
            e
        ),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Expiry
// ─────────────────────────────────────────────────────────────────────────────

/// Minimum finite cookie expiry (unix seconds). `expires <= 0` marks a
/// session cookie and is skipped; `None` when every cookie is session-scoped.
pub fn min_cookie_expiry(raw_cookies: &[serde_json::Value]) -> Option<f64> {
    raw_cookies
        .iter()
        .filter_map(|v| v.get("expires").and_then(|e| e.as_f64()))
        .filter(|&exp| exp > 0.0)
        .reduce(f64::min)
}

/// Cookies fit for injection at `now`: expired ones dropped, and the
/// `expires` marker removed from session cookies so they stay session-scoped.
pub fn prepare_for_injection(raw_cookies: &[serde_json::Value], now: f64) -> Vec<serde_json::Value> {
    raw_cookies
        .iter()
        .filter_map(|cookie| {
            let expires = cookie.get("expires").and_then(|e| e.as_f64());
            match expires {
                Some(exp) if exp > 0.0 && exp <= now => None,
                Some(exp) if exp <= 0.0 => {
                    let mut c = cookie.clone();
                    if let Some(obj) = c.as_object_mut() {
                        obj.remove("expires");
                    }
                    Some(c)
                }
                _ => Some(cookie.clone()),
            }
        })
        .collect()
}

// ─────────────────────────────────────────────────────────────────────────────
// Inject / capture
// ─────────────────────────────────────────────────────────────────────────────

/// Inject stored cookies into the page **before** the first navigation.
/// Malformed entries are skipped by the driver. Returns the number accepted.
pub async fn inject<D: PageDriver + ?Sized>(driver: &mut D, raw_cookies: &[serde_json::Value]) -> usize {
    let now = chrono::Utc::now().timestamp() as f64;
    let usable = prepare_for_injection(raw_cookies, now);
    if usable.is_empty() {
        warn!("session_store: stored session holds no unexpired cookies - skipping injection");
        return 0;
    }
    match driver.import_cookies(&usable).await {
        Ok(0) => {
            warn!("session_store: stored session JSON contained no valid cookies - skipping injection");
            0
        }
        Ok(n) => {
            info!("session_store: 💉 injected {} session cookies", n);
            n
        }
        Err(e) => {
            warn!("session_store: failed to inject session cookies: {}", e);
            0
        }
    }
}

/// Capture the live session's cookies and persist them.
pub async fn capture<D: PageDriver + ?Sized>(
    driver: &mut D,
    store: &SessionStore,
    identifier: &str,
) -> CrawlResult<PathBuf> {
    let cookies = driver
        .export_cookies()
        .await
        .map_err(|e| crate::core::CrawlError::Page(e.to_string()))?;
    if let Some(exp) = min_cookie_expiry(&cookies) {
        if let Some(at) = chrono::DateTime::from_timestamp(exp as i64, 0) {
            info!("session_store: earliest cookie expiry {}", at.to_rfc3339());
        }
    }
    store.save(identifier, &cookies)
}
