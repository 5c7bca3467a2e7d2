//! Authentication collaborator: hands the engine a page that will not hit a
//! login wall.
//!
//! Order: saved cookies → credential login → challenge handling per
//! [`ChallengePolicy`] → verification → cookie save. Page classification is
//! a pure function over URL + DOM snapshot.

use super::pacing::{DelayRange, Pacer, AFTER_CLICK, SETTLE_AFTER_NAVIGATION};
use super::session_store::{self, SessionStore, DEFAULT_IDENTIFIER};
use crate::core::config::{ChallengePolicy, Credentials};
use crate::core::{CrawlError, CrawlResult, CrawlerConfig};
use crate::scraping::page::PageDriver;
use scraper::{Html, Selector};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

const CHALLENGE_URL_MARKERS: &[&str] = &["/checkpoint/", "/two_step_verification/", "/authentication/"];

const CAPTCHA_SELECTORS: &[&str] = &[
    r#"iframe[title*="captcha"]"#,
    r#"iframe[title*="CAPTCHA"]"#,
    r#"div[id*="captcha"]"#,
    r#"div[class*="captcha"]"#,
];

const EMAIL_INPUT: &str = r#"input[name="email"]"#;
const PASSWORD_INPUT: &str = r#"input[name="pass"]"#;
const LOGIN_BUTTONS: &[&str] = &[r#"button[name="login"]"#, r#"button[type="submit"]"#];

const LOGIN_FORM_WAIT: Duration = Duration::from_secs(10);
const HUMAN_POLL: Duration = Duration::from_secs(1);
const VERIFY_ATTEMPTS: u32 = 3;
const VERIFY_RETRY: DelayRange = DelayRange::millis(2_000, 4_000);
const LOGIN_PAGE_SETTLE: DelayRange = DelayRange::millis(2_000, 3_000);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginState {
    LoggedIn,
    LoggedOut,
    /// Checkpoint, two-step verification or captcha.
    Challenged,
}

pub fn is_challenge_url(url: &str) -> bool {
    let lower = url.to_lowercase();
    CHALLENGE_URL_MARKERS.iter().any(|m| lower.contains(m))
}

pub fn has_captcha(document: &Html) -> bool {
    CAPTCHA_SELECTORS.iter().any(|css| {
        Selector::parse(css)
            .map(|sel| document.select(&sel).next().is_some())
            .unwrap_or(false)
    })
}

/// Challenge beats login form beats logged-in.
pub fn classify_page(url: &str, document: &Html) -> LoginState {
    if is_challenge_url(url) || has_captcha(document) {
        return LoginState::Challenged;
    }
    let login_form = Selector::parse(EMAIL_INPUT)
        .map(|sel| document.select(&sel).next().is_some())
        .unwrap_or(false);
    if login_form || url.to_lowercase().contains("login") {
        return LoginState::LoggedOut;
    }
    LoginState::LoggedIn
}

/// Same registrable host as `base_url`, ignoring a `www.`/`m.`/`web.` prefix.
pub fn on_platform(url: &str, base_url: &str) -> bool {
    fn bare_host(u: &str) -> Option<String> {
        let host = url::Url::parse(u).ok()?.host_str()?.to_lowercase();
        let bare = ["www.", "m.", "web."]
            .iter()
            .find_map(|p| host.strip_prefix(p))
            .map(str::to_string)
            .unwrap_or(host);
        Some(bare)
    }
    match (bare_host(url), bare_host(base_url)) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

pub struct Authenticator<'a> {
    config: &'a CrawlerConfig,
    store: SessionStore,
    pacer: Pacer,
}

impl<'a> Authenticator<'a> {
    pub fn new(config: &'a CrawlerConfig, pacer: Pacer) -> Self {
        Self {
            config,
            store: SessionStore::new(config.cookies_dir()),
            pacer,
        }
    }

    /// Leave `driver` on the platform home page with an authenticated session.
    pub async fn login<D: PageDriver + ?Sized>(&self, driver: &mut D) -> CrawlResult<()> {
        info!("Starting authentication...");

        if let Some(cookies) = self.store.load(DEFAULT_IDENTIFIER) {
            info!("Loading saved cookies...");
            session_store::inject(driver, &cookies).await;
            self.open_home(driver).await?;
            self.pacer.pause(SETTLE_AFTER_NAVIGATION).await;
            match self.state(driver).await? {
                LoginState::LoggedIn => {
                    info!("✓ Authenticated using saved cookies");
                    return Ok(());
                }
                LoginState::Challenged => {
                    warn!("Saved session hit a verification challenge");
                    return self.resolve_challenge(driver).await;
                }
                LoginState::LoggedOut => {
                    warn!("Saved cookies expired, proceeding with fresh login...");
                    self.store.invalidate(DEFAULT_IDENTIFIER);
                }
            }
        }

        match &self.config.credentials {
            Some(credentials) => self.credential_login(driver, credentials).await,
            None => match self.config.challenge_policy {
                ChallengePolicy::WaitForHuman { timeout } => {
                    self.open_home(driver).await?;
                    warn!("No credentials configured: log in manually in the browser window");
                    self.await_human(driver, timeout).await?;
                    self.save(driver).await
                }
                ChallengePolicy::FailFast => Err(CrawlError::Auth(
                    "no valid saved session and FB_EMAIL/FB_PASSWORD not set; run `comment-scout save-session`"
                        .into(),
                )),
            },
        }
    }

    async fn credential_login<D: PageDriver + ?Sized>(
        &self,
        driver: &mut D,
        credentials: &Credentials,
    ) -> CrawlResult<()> {
        info!("Performing login with credentials...");
        self.open_home(driver).await?;
        self.pacer.pause(LOGIN_PAGE_SETTLE).await;

        if !self.wait_for_selector(driver, EMAIL_INPUT, LOGIN_FORM_WAIT).await {
            return match self.state(driver).await? {
                LoginState::LoggedIn => self.save(driver).await,
                LoginState::Challenged => self.resolve_challenge(driver).await,
                LoginState::LoggedOut => Err(CrawlError::Auth("login form not found".into())),
            };
        }

        self.fill(driver, EMAIL_INPUT, &credentials.email).await?;
        self.pacer.pause(AFTER_CLICK).await;
        self.fill(driver, PASSWORD_INPUT, &credentials.password).await?;
        self.pacer.pause(AFTER_CLICK).await;

        let mut submitted = false;
        for css in LOGIN_BUTTONS {
            match driver.click_selector(css).await {
                Ok(true) => {
                    submitted = true;
                    break;
                }
                Ok(false) => continue,
                Err(e) => debug!("login button {} not clickable: {}", css, e),
            }
        }
        if !submitted {
            return self
                .manual_fallback(driver, "login button not found")
                .await;
        }
        info!("Login button clicked, waiting for response...");
        self.pacer.pause(SETTLE_AFTER_NAVIGATION).await;

        match self.state(driver).await? {
            LoginState::Challenged => self.resolve_challenge(driver).await,
            LoginState::LoggedIn => {
                info!("Login successful!");
                self.save(driver).await
            }
            LoginState::LoggedOut => {
                self.manual_fallback(driver, "automated login was rejected")
                    .await
            }
        }
    }

    /// Challenge on screen: wait for an operator or fail, then verify and save.
    async fn resolve_challenge<D: PageDriver + ?Sized>(&self, driver: &mut D) -> CrawlResult<()> {
        let ChallengePolicy::WaitForHuman { timeout } = self.config.challenge_policy else {
            return Err(CrawlError::Auth(
                "verification challenge detected; refresh the session with `comment-scout save-session`"
                    .into(),
            ));
        };
        warn!("⚠️  Verification challenge detected. Complete it in the browser window (up to {:?}).", timeout);
        self.await_human(driver, timeout).await?;
        self.verify(driver).await?;
        info!("✓ Login verified after challenge");
        self.save(driver).await
    }

    async fn manual_fallback<D: PageDriver + ?Sized>(
        &self,
        driver: &mut D,
        reason: &str,
    ) -> CrawlResult<()> {
        match self.config.challenge_policy {
            ChallengePolicy::WaitForHuman { timeout } => {
                warn!("⚠️  {}. Log in manually in the browser window.", reason);
                self.await_human(driver, timeout).await?;
                self.save(driver).await
            }
            ChallengePolicy::FailFast => Err(CrawlError::Auth(reason.to_string())),
        }
    }

    /// `save-session`: open the home page and persist cookies once the operator is logged in.
    pub async fn save_session<D: PageDriver + ?Sized>(&self, driver: &mut D) -> CrawlResult<()> {
        let ChallengePolicy::WaitForHuman { timeout } = self.config.challenge_policy else {
            return Err(CrawlError::Config(
                "save-session needs a visible browser (HEADLESS=false, CHALLENGE_POLICY=wait)".into(),
            ));
        };
        self.open_home(driver).await?;
        self.pacer.pause(SETTLE_AFTER_NAVIGATION).await;
        if self.state(driver).await? != LoginState::LoggedIn {
            info!("Log in to the platform in the browser window; waiting up to {:?}...", timeout);
            self.await_human(driver, timeout).await?;
        }
        self.save(driver).await
    }

    /// Poll every second until the page reads as logged in.
    async fn await_human<D: PageDriver + ?Sized>(
        &self,
        driver: &mut D,
        timeout: Duration,
    ) -> CrawlResult<()> {
        let deadline = Instant::now() + timeout;
        loop {
            match self.state(driver).await {
                Ok(LoginState::LoggedIn) => return Ok(()),
                Ok(state) => debug!("waiting for operator ({:?})", state),
                Err(e) => debug!("state check failed while waiting: {}", e),
            }
            if Instant::now() >= deadline {
                return Err(CrawlError::ChallengeUnresolved(timeout));
            }
            tokio::time::sleep(HUMAN_POLL).await;
        }
    }

    async fn verify<D: PageDriver + ?Sized>(&self, driver: &mut D) -> CrawlResult<()> {
        for attempt in 1..=VERIFY_ATTEMPTS {
            let state = self.state(driver).await?;
            debug!("verify attempt {}/{}: {:?}", attempt, VERIFY_ATTEMPTS, state);
            if state == LoginState::LoggedIn {
                return Ok(());
            }
            if attempt < VERIFY_ATTEMPTS {
                self.pacer.pause(VERIFY_RETRY).await;
            }
        }
        Err(CrawlError::Auth("login verification failed".into()))
    }

    async fn state<D: PageDriver + ?Sized>(&self, driver: &mut D) -> CrawlResult<LoginState> {
        let url = driver.current_url().await?;
        let html = driver.html().await?;
        let state = classify_snapshot(&url, &html);
        if state == LoginState::LoggedIn && !on_platform(&url, &self.config.base_url) {
            return Ok(LoginState::LoggedOut);
        }
        Ok(state)
    }

    async fn open_home<D: PageDriver + ?Sized>(&self, driver: &mut D) -> CrawlResult<()> {
        driver
            .navigate(&self.config.base_url, self.config.request_timeout)
            .await
            .map_err(|e| CrawlError::Auth(e.to_string()))
    }

    async fn wait_for_selector<D: PageDriver + ?Sized>(
        &self,
        driver: &mut D,
        css: &str,
        timeout: Duration,
    ) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if driver.count(css).await > 0 {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(250)).await;
        }
    }

    async fn fill<D: PageDriver + ?Sized>(
        &self,
        driver: &mut D,
        css: &str,
        value: &str,
    ) -> CrawlResult<()> {
        match driver.fill(css, value).await {
            Ok(true) => Ok(()),
            Ok(false) => Err(CrawlError::Auth(format!("{} not found", css))),
            Err(e) => Err(CrawlError::Auth(e.to_string())),
        }
    }

    async fn save<D: PageDriver + ?Sized>(&self, driver: &mut D) -> CrawlResult<()> {
        session_store::capture(driver, &self.store, DEFAULT_IDENTIFIER).await?;
        Ok(())
    }
}

fn classify_snapshot(url: &str, html: &str) -> LoginState {
    let document = Html::parse_document(html);
    classify_page(url, &document)
}
