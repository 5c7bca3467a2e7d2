use crate::core::error::{CrawlError, CrawlResult};
use serde::Deserialize;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

// ---------------------------------------------------------------------------
// FileConfig: optional `comment-scout.json`, every field falls back to env
// ---------------------------------------------------------------------------

pub const ENV_CONFIG_PATH: &str = "COMMENT_SCOUT_CONFIG";
pub const CONFIG_FILE_NAME: &str = "comment-scout.json";

/// Mirror of `comment-scout.json`. Absent fields fall through to the
/// environment and then to built-in defaults.
#[derive(Deserialize, Default, Clone, Debug)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub headless: Option<bool>,
    pub min_delay_secs: Option<f64>,
    pub max_delay_secs: Option<f64>,
    pub scroll_pause_secs: Option<f64>,
    pub max_scroll_attempts: Option<u32>,
    pub request_timeout_ms: Option<u64>,
    pub max_posts_per_profile: Option<usize>,
    pub profile_scroll_limit: Option<u32>,
    pub max_comments_per_post: Option<usize>,
    pub element_wait_ms: Option<u64>,
    pub data_dir: Option<PathBuf>,
    pub export_dir: Option<PathBuf>,
    pub export_mode: Option<ExportMode>,
    pub export_format: Option<ExportFormat>,
    pub challenge_policy: Option<String>,
    pub human_timeout_secs: Option<u64>,
    pub base_url: Option<String>,
}

/// Load `comment-scout.json`.
///
/// Search order (first found wins):
/// 1. `COMMENT_SCOUT_CONFIG` env var path
/// 2. `./comment-scout.json`
///
/// Missing file → `FileConfig::default()`. A file that exists but does not
/// parse is a configuration error.
pub fn load_file_config() -> CrawlResult<FileConfig> {
    let mut candidates = vec![PathBuf::from(CONFIG_FILE_NAME)];
    if let Ok(env_path) = std::env::var(ENV_CONFIG_PATH) {
        candidates.insert(0, PathBuf::from(env_path));
    }

    for path in &candidates {
        let Ok(contents) = std::fs::read_to_string(path) else {
            continue;
        };
        let cfg = parse_file_config(&contents)
            .map_err(|e| CrawlError::Config(format!("{}: {}", path.display(), e)))?;
        tracing::info!("{} loaded from {}", CONFIG_FILE_NAME, path.display());
        return Ok(cfg);
    }

    Ok(FileConfig::default())
}

pub fn parse_file_config(contents: &str) -> Result<FileConfig, serde_json::Error> {
    serde_json::from_str(contents)
}

// ---------------------------------------------------------------------------
// Enumerated settings
// ---------------------------------------------------------------------------

#[derive(Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum ExportMode {
    /// All comments of the run in one file.
    #[default]
    Single,
    /// One file per post URL.
    PerPost,
}

impl FromStr for ExportMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "single" => Ok(ExportMode::Single),
            "per-post" | "per_post" => Ok(ExportMode::PerPost),
            other => Err(format!("unknown export mode '{other}' (expected single|per-post)")),
        }
    }
}

#[derive(Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Csv,
    Json,
    Both,
    /// Spreadsheet workbook written next to the CSV files.
    #[serde(alias = "excel")]
    Xlsx,
}

impl ExportFormat {
    pub fn wants_csv(self) -> bool {
        matches!(self, ExportFormat::Csv | ExportFormat::Both)
    }

    pub fn wants_json(self) -> bool {
        matches!(self, ExportFormat::Json | ExportFormat::Both)
    }

    pub fn wants_xlsx(self) -> bool {
        self == ExportFormat::Xlsx
    }
}

impl FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "csv" => Ok(ExportFormat::Csv),
            "json" => Ok(ExportFormat::Json),
            "both" => Ok(ExportFormat::Both),
            "xlsx" | "excel" => Ok(ExportFormat::Xlsx),
            other => Err(format!("unknown export format '{other}' (expected csv|json|both|xlsx)")),
        }
    }
}

/// What to do when the platform shows a verification challenge.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChallengePolicy {
    /// Poll the visible window until an operator clears the challenge.
    WaitForHuman { timeout: Duration },
    /// Abort; the session must be refreshed out of band (`save-session`).
    FailFast,
}

/// Login credentials. `Debug` never prints the password.
#[derive(Clone)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

// ---------------------------------------------------------------------------
// CrawlerConfig: resolved once at startup, then only borrowed
// ---------------------------------------------------------------------------

/// Command-line values that win over file and environment.
#[derive(Clone, Debug, Default)]
pub struct Overrides {
    pub headless: Option<bool>,
    pub max_posts_per_profile: Option<usize>,
    pub max_comments_per_post: Option<usize>,
    pub export_mode: Option<ExportMode>,
    pub export_format: Option<ExportFormat>,
    pub export_dir: Option<PathBuf>,
}

#[derive(Clone, Debug)]
pub struct CrawlerConfig {
    pub headless: bool,
    pub min_delay: Duration,
    pub max_delay: Duration,
    pub scroll_pause: Duration,
    pub max_scroll_attempts: u32,
    pub request_timeout: Duration,
    pub max_posts_per_profile: usize,
    pub profile_scroll_limit: u32,
    /// Stop expanding a post once this many comments are visible.
    pub max_comments_per_post: Option<usize>,
    pub element_wait: Duration,
    pub data_dir: PathBuf,
    pub export_dir: PathBuf,
    pub export_mode: ExportMode,
    pub export_format: ExportFormat,
    pub credentials: Option<Credentials>,
    pub challenge_policy: ChallengePolicy,
    pub base_url: String,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        let data_dir = PathBuf::from("data");
        Self {
            headless: true,
            min_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(5),
            scroll_pause: Duration::from_secs(2),
            max_scroll_attempts: 10,
            request_timeout: Duration::from_millis(30_000),
            max_posts_per_profile: 50,
            profile_scroll_limit: 20,
            max_comments_per_post: None,
            element_wait: Duration::from_millis(3_000),
            export_dir: data_dir.join("exports"),
            data_dir,
            export_mode: ExportMode::Single,
            export_format: ExportFormat::Csv,
            credentials: None,
            challenge_policy: ChallengePolicy::FailFast,
            base_url: "https://www.facebook.com".to_string(),
        }
    }
}

impl CrawlerConfig {
    /// Resolve from file, process environment and CLI overrides.
    pub fn resolve(file: &FileConfig, overrides: &Overrides) -> CrawlResult<Self> {
        Self::resolve_with(file, overrides, |key| std::env::var(key).ok())
    }

    /// Resolution order per field: override → file → `env(key)` → default.
    pub fn resolve_with(
        file: &FileConfig,
        overrides: &Overrides,
        env: impl Fn(&str) -> Option<String>,
    ) -> CrawlResult<Self> {
        let defaults = Self::default();
        let env = &env;

        let headless = pick(overrides.headless, file.headless, env, "HEADLESS")?
            .unwrap_or(defaults.headless);

        let min_delay = secs(
            pick(None, file.min_delay_secs, env, "MIN_DELAY")?,
            defaults.min_delay,
            "MIN_DELAY",
        )?;
        let max_delay = secs(
            pick(None, file.max_delay_secs, env, "MAX_DELAY")?,
            defaults.max_delay,
            "MAX_DELAY",
        )?;
        let (min_delay, max_delay) = if min_delay > max_delay {
            (max_delay, min_delay)
        } else {
            (min_delay, max_delay)
        };
        let scroll_pause = secs(
            pick(None, file.scroll_pause_secs, env, "SCROLL_PAUSE_TIME")?,
            defaults.scroll_pause,
            "SCROLL_PAUSE_TIME",
        )?;

        let max_scroll_attempts =
            pick(None, file.max_scroll_attempts, env, "MAX_SCROLL_ATTEMPTS")?
                .unwrap_or(defaults.max_scroll_attempts);
        let request_timeout = pick(None, file.request_timeout_ms, env, "REQUEST_TIMEOUT")?
            .map(Duration::from_millis)
            .unwrap_or(defaults.request_timeout);
        let max_posts_per_profile = pick(
            overrides.max_posts_per_profile,
            file.max_posts_per_profile,
            env,
            "MAX_POSTS_PER_PROFILE",
        )?
        .unwrap_or(defaults.max_posts_per_profile);
        let profile_scroll_limit =
            pick(None, file.profile_scroll_limit, env, "PROFILE_SCROLL_LIMIT")?
                .unwrap_or(defaults.profile_scroll_limit);
        let max_comments_per_post = pick(
            overrides.max_comments_per_post,
            file.max_comments_per_post,
            env,
            "MAX_COMMENTS",
        )?
        .filter(|n| *n > 0);
        let element_wait = pick(None, file.element_wait_ms, env, "ELEMENT_WAIT_MS")?
            .map(Duration::from_millis)
            .unwrap_or(defaults.element_wait);

        let data_dir = pick(None, file.data_dir.clone(), env, "DATA_DIR")?
            .unwrap_or(defaults.data_dir);
        let export_dir = pick(
            overrides.export_dir.clone(),
            file.export_dir.clone(),
            env,
            "OUTPUT_DIR",
        )?
        .unwrap_or_else(|| data_dir.join("exports"));
        let export_mode = pick(overrides.export_mode, file.export_mode, env, "EXPORT_MODE")?
            .unwrap_or(defaults.export_mode);
        let export_format =
            pick(overrides.export_format, file.export_format, env, "EXPORT_FORMAT")?
                .unwrap_or(defaults.export_format);

        let credentials = match (env("FB_EMAIL"), env("FB_PASSWORD")) {
            (Some(email), Some(password))
                if !email.trim().is_empty() && !password.is_empty() =>
            {
                Some(Credentials {
                    email: email.trim().to_string(),
                    password,
                })
            }
            _ => None,
        };

        let human_timeout = Duration::from_secs(
            pick(None, file.human_timeout_secs, env, "HUMAN_TIMEOUT_SECS")?.unwrap_or(600),
        );
        let policy_name = pick(None, file.challenge_policy.clone(), env, "CHALLENGE_POLICY")?
            .unwrap_or_else(|| "wait".to_string());
        let challenge_policy = match policy_name.trim().to_ascii_lowercase().as_str() {
            // Nobody can solve a challenge in a window that is not shown.
            _ if headless => ChallengePolicy::FailFast,
            "wait" => ChallengePolicy::WaitForHuman {
                timeout: human_timeout,
            },
            "fail" => ChallengePolicy::FailFast,
            other => {
                return Err(CrawlError::Config(format!(
                    "CHALLENGE_POLICY: unknown value '{other}' (expected wait|fail)"
                )))
            }
        };

        let base_url = pick(None, file.base_url.clone(), env, "PLATFORM_BASE_URL")?
            .map(|u| u.trim_end_matches('/').to_string())
            .unwrap_or(defaults.base_url);
        url::Url::parse(&base_url)
            .map_err(|e| CrawlError::Config(format!("PLATFORM_BASE_URL '{base_url}': {e}")))?;

        Ok(Self {
            headless,
            min_delay,
            max_delay,
            scroll_pause,
            max_scroll_attempts,
            request_timeout,
            max_posts_per_profile,
            profile_scroll_limit,
            max_comments_per_post,
            element_wait,
            data_dir,
            export_dir,
            export_mode,
            export_format,
            credentials,
            challenge_policy,
            base_url,
        })
    }

    pub fn cookies_dir(&self) -> PathBuf {
        self.data_dir.join("cookies")
    }

    /// Daily log files (`crawler.<date>.log`).
    pub fn logs_dir(&self) -> PathBuf {
        self.data_dir.join("logs")
    }

    /// `<data_dir>/cookies/cookies_<identifier>.json`
    pub fn cookies_path(&self, identifier: &str) -> PathBuf {
        self.cookies_dir()
            .join(format!("cookies_{}.json", identifier))
    }

    /// Create the data, cookie, log and export directories.
    pub fn ensure_directories(&self) -> CrawlResult<()> {
        for dir in [self.cookies_dir(), self.logs_dir(), self.export_dir.clone()] {
            std::fs::create_dir_all(&dir)?;
        }
        Ok(())
    }
}

/// Override → file → env → `None`. An env value that does not parse is an error.
fn pick<T>(
    over: Option<T>,
    file: Option<T>,
    env: &dyn Fn(&str) -> Option<String>,
    key: &str,
) -> CrawlResult<Option<T>>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    if over.is_some() {
        return Ok(over);
    }
    if file.is_some() {
        return Ok(file);
    }
    match env(key) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| CrawlError::Config(format!("{key}: invalid value '{raw}': {e}"))),
        _ => Ok(None),
    }
}

fn secs(value: Option<f64>, default: Duration, key: &str) -> CrawlResult<Duration> {
    match value {
        None => Ok(default),
        Some(v) => Duration::try_from_secs_f64(v)
            .map_err(|e| CrawlError::Config(format!("{key}: invalid duration {v}: {e}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn defaults_apply_when_nothing_is_set() {
        let cfg =
            CrawlerConfig::resolve_with(&FileConfig::default(), &Overrides::default(), env_of(&[]))
                .unwrap();
        assert!(cfg.headless);
        assert_eq!(cfg.max_scroll_attempts, 10);
        assert_eq!(cfg.request_timeout, Duration::from_millis(30_000));
        assert_eq!(cfg.min_delay, Duration::from_secs(2));
        assert_eq!(cfg.max_delay, Duration::from_secs(5));
        assert_eq!(cfg.max_comments_per_post, None);
        assert_eq!(cfg.export_dir, PathBuf::from("data").join("exports"));
        assert!(cfg.credentials.is_none());
        // Headless forces fail-fast challenge handling.
        assert_eq!(cfg.challenge_policy, ChallengePolicy::FailFast);
    }

    #[test]
    fn override_beats_file_beats_env() {
        let file = FileConfig {
            headless: Some(true),
            max_scroll_attempts: Some(4),
            ..Default::default()
        };
        let overrides = Overrides {
            headless: Some(false),
            ..Default::default()
        };
        let env = env_of(&[
            ("HEADLESS", "true"),
            ("MAX_SCROLL_ATTEMPTS", "12"),
            ("MIN_DELAY", "1.5"),
        ]);
        let cfg = CrawlerConfig::resolve_with(&file, &overrides, env).unwrap();
        assert!(!cfg.headless);
        assert_eq!(cfg.max_scroll_attempts, 4);
        assert_eq!(cfg.min_delay, Duration::from_millis(1500));
        assert_eq!(
            cfg.challenge_policy,
            ChallengePolicy::WaitForHuman {
                timeout: Duration::from_secs(600)
            }
        );
    }

    #[test]
    fn inverted_delay_bounds_are_swapped() {
        let env = env_of(&[("MIN_DELAY", "6"), ("MAX_DELAY", "3")]);
        let cfg = CrawlerConfig::resolve_with(&FileConfig::default(), &Overrides::default(), env)
            .unwrap();
        assert_eq!(cfg.min_delay, Duration::from_secs(3));
        assert_eq!(cfg.max_delay, Duration::from_secs(6));
    }

    #[test]
    fn invalid_env_value_is_a_config_error() {
        let env = env_of(&[("MAX_SCROLL_ATTEMPTS", "lots")]);
        let err = CrawlerConfig::resolve_with(&FileConfig::default(), &Overrides::default(), env)
            .unwrap_err();
        assert!(matches!(err, CrawlError::Config(ref m) if m.contains("MAX_SCROLL_ATTEMPTS")));

        let env = env_of(&[("MIN_DELAY", "-1")]);
        assert!(
            CrawlerConfig::resolve_with(&FileConfig::default(), &Overrides::default(), env)
                .is_err()
        );
    }

    #[test]
    fn credentials_are_redacted_in_debug() {
        let env = env_of(&[("FB_EMAIL", "me@example.com"), ("FB_PASSWORD", "hunter2")]);
        let cfg = CrawlerConfig::resolve_with(&FileConfig::default(), &Overrides::default(), env)
            .unwrap();
        let printed = format!("{:?}", cfg);
        assert!(printed.contains("me@example.com"));
        assert!(!printed.contains("hunter2"));
    }

    #[test]
    fn file_config_rejects_unknown_keys() {
        assert!(parse_file_config(r#"{"headless": false, "max_scroll_attempts": 3}"#).is_ok());
        assert!(parse_file_config(r#"{"headles": false}"#).is_err());
        let cfg = parse_file_config(r#"{"export_mode": "per-post", "export_format": "both"}"#)
            .unwrap();
        assert_eq!(cfg.export_mode, Some(ExportMode::PerPost));
        assert_eq!(cfg.export_format, Some(ExportFormat::Both));
    }

    #[test]
    fn spreadsheet_format_accepts_both_spellings() {
        let env = env_of(&[("EXPORT_FORMAT", "excel")]);
        let cfg = CrawlerConfig::resolve_with(&FileConfig::default(), &Overrides::default(), env)
            .unwrap();
        assert_eq!(cfg.export_format, ExportFormat::Xlsx);
        assert!(!cfg.export_format.wants_csv());

        let file = parse_file_config(r#"{"export_format": "xlsx"}"#).unwrap();
        assert_eq!(file.export_format, Some(ExportFormat::Xlsx));
        assert_eq!("XLSX".parse::<ExportFormat>(), Ok(ExportFormat::Xlsx));
    }

    #[test]
    fn cookies_path_uses_identifier() {
        let cfg = CrawlerConfig::default();
        assert_eq!(cfg.logs_dir(), PathBuf::from("data/logs"));
        assert_eq!(
            cfg.cookies_path("default"),
            PathBuf::from("data/cookies/cookies_default.json")
        );
    }
}
