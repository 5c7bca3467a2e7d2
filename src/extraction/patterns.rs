//! Selector chains, bilingual (English / Indonesian) labels and text patterns.
//!
//! Everything the engine knows about the platform's markup lives here as data.
//! Chains are ordered most-specific first; new markup variants are added as
//! new entries, not new branches.

use crate::scraping::page::ControlLocator;
use regex::Regex;
use std::sync::OnceLock;

// ── Discovery ────────────────────────────────────────────────────────────────

/// How a discovery strategy selects candidate comment nodes.
#[derive(Debug, Clone, Copy)]
pub enum DiscoveryStrategy {
    /// Every element matching the selector.
    All(&'static str),
    /// Elements matching the selector with a non-empty direct child matching `inner`.
    WithText {
        container: &'static str,
        inner: &'static str,
    },
}

pub const DISCOVERY_CHAIN: &[DiscoveryStrategy] = &[
    DiscoveryStrategy::All(r#"div[aria-label*="Comment by"]"#),
    DiscoveryStrategy::All(r#"div[aria-label*="Komentar oleh"]"#),
    DiscoveryStrategy::WithText {
        container: r#"div[role="article"]"#,
        inner: r#"div[dir="auto"]"#,
    },
    DiscoveryStrategy::All(r#"[role="article"]"#),
];

// ── Field extraction ─────────────────────────────────────────────────────────

pub const AUTHOR_CHAIN: &[&str] = &[
    r#"a[role="link"]"#,
    r#"a[href*="/user/"]"#,
    r#"a[href*="/profile"]"#,
    "a[aria-label]",
    r#"span[dir="auto"] a"#,
    "h4 a",
    "strong a",
];

/// Button captions that are never an author name or a comment body.
pub const UI_ACTION_LABELS: &[&str] = &[
    "Like", "Reply", "Comment", "Share", "Suka", "Balas", "Komentar", "Bagikan",
];

pub const BODY_CANDIDATES: &str = r#"div[dir="auto"], span[dir="auto"]"#;

/// Minimum trimmed length (exclusive) of a strategy-1 body candidate.
pub const BODY_MIN_CHARS: usize = 5;

/// Substrings removed from the node's full text when no body candidate exists.
pub const BODY_NOISE: &[&str] = &[
    "Like", "Reply", "Suka", "Balas", "·", "Just now", "Baru saja", "yang lalu",
];

pub const TIMESTAMP_CANDIDATES: &str = "a, span";
pub const TIMESTAMP_MAX_CHARS: usize = 50;

pub const REACTION_CANDIDATES: &str = r#"[aria-label*="eaction"], [aria-label*="eaksi"]"#;

// ── Post context ─────────────────────────────────────────────────────────────

pub const POST_AUTHOR_CHAIN: &[&str] = &[
    "h2 a",
    "h3 a",
    r#"[data-ad-preview="message"] a"#,
    r#"a[role="link"]"#,
];

pub const POST_CONTENT_CHAIN: &[&str] = &[
    r#"[data-ad-preview="message"]"#,
    r#"div[data-ad-comet-preview="message"]"#,
    r#"[dir="auto"]"#,
];

pub const POST_CONTENT_MAX_CHARS: usize = 500;

// ── Navigation controls ──────────────────────────────────────────────────────

pub fn open_comments_locators() -> Vec<ControlLocator> {
    vec![
        ControlLocator::text("View.*comment"),
        ControlLocator::text("Lihat.*komentar"),
        ControlLocator::aria("comment"),
        ControlLocator::aria("Comment"),
        ControlLocator::aria("Komentar"),
        ControlLocator::role_button("Comment"),
        ControlLocator::role_button("Komentar"),
    ]
}

pub fn load_more_locators() -> Vec<ControlLocator> {
    vec![
        ControlLocator::text("View more comments"),
        ControlLocator::text("Lihat komentar lainnya"),
        ControlLocator::text("View previous comments"),
        ControlLocator::text("Lihat komentar sebelumnya"),
        ControlLocator::aria("more comment"),
        ControlLocator::aria("komentar lainnya"),
    ]
}

pub fn reply_locators() -> Vec<ControlLocator> {
    vec![
        ControlLocator::text("View.*repl"),
        ControlLocator::text("Lihat.*balas"),
        ControlLocator::text(r"\d+ repl"),
        ControlLocator::text(r"\d+ balas"),
        ControlLocator::aria("repl"),
        ControlLocator::aria("balas"),
    ]
}

pub fn see_more_locators() -> Vec<ControlLocator> {
    vec![
        ControlLocator::text("See more"),
        ControlLocator::text("Lihat selengkapnya"),
        ControlLocator::role_button("See more"),
        ControlLocator::role_button("Lihat selengkapnya"),
        ControlLocator::aria("See more"),
        ControlLocator::aria("Lihat selengkapnya"),
    ]
}

/// A see-more control is only clicked when its own text carries one of these.
pub const SEE_MORE_PHRASES: &[&str] = &["see more", "lihat selengkapnya"];

/// Visible-comment counter: the first selector with a non-zero count wins.
pub const COMMENT_COUNTERS: &[&str] = &[
    r#"[role="article"]"#,
    r#"div[aria-label*="Comment"]"#,
    r#"div[aria-label*="Komentar"]"#,
];

pub const REPLY_EXPANSION_LIMIT: usize = 50;
pub const CONTROL_SCAN_LIMIT: usize = 500;

// ── Regexes ──────────────────────────────────────────────────────────────────

static URL_RE: OnceLock<Regex> = OnceLock::new();
static WHITESPACE_RE: OnceLock<Regex> = OnceLock::new();
static RELATIVE_TIME_RE: OnceLock<Regex> = OnceLock::new();
static COUNT_RE: OnceLock<Regex> = OnceLock::new();
static REPLY_COUNT_RE: OnceLock<Regex> = OnceLock::new();

pub fn url_re() -> &'static Regex {
    URL_RE.get_or_init(|| Regex::new(r"(?i)https?://\S+|www\.\S+").expect("valid url pattern"))
}

pub fn whitespace_re() -> &'static Regex {
    WHITESPACE_RE.get_or_init(|| Regex::new(r"\s+").expect("valid whitespace pattern"))
}

/// A number followed by an English or Indonesian time unit, or an absolute marker.
pub fn relative_time_re() -> &'static Regex {
    RELATIVE_TIME_RE.get_or_init(|| {
        Regex::new(
            r"(?i)\b\d+\s*(?:s|m|h|d|w|y|j|secs?|mins?|minutes?|hrs?|hours?|days?|wks?|weeks?|months?|yrs?|years?|detik|mnt|menit|jam|hari|minggu|bulan|tahun)\b|\b(?:just now|ago|yang lalu|baru saja)\b",
        )
        .expect("valid relative-time pattern")
    })
}

/// First integer, with `,`/`.` thousands groups.
pub fn count_re() -> &'static Regex {
    COUNT_RE.get_or_init(|| Regex::new(r"\d{1,3}(?:[.,]\d{3})+|\d+").expect("valid count pattern"))
}

pub fn reply_count_re() -> &'static Regex {
    REPLY_COUNT_RE
        .get_or_init(|| Regex::new(r"(?i)\d+\s*(?:repl|balas)").expect("valid reply-count pattern"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_time_accepts_both_languages() {
        for s in ["5m", "2 h", "3 hari", "1 minggu", "12 weeks", "Just now", "2 days ago", "baru saja"] {
            assert!(relative_time_re().is_match(s), "{s}");
        }
    }

    #[test]
    fn relative_time_needs_word_boundary() {
        for s in ["Alice", "25 members", "Reply", "2nd place"] {
            assert!(!relative_time_re().is_match(s), "{s}");
        }
    }

    #[test]
    fn count_pattern_takes_thousands_groups() {
        assert_eq!(count_re().find("1,234 reactions").unwrap().as_str(), "1,234");
        assert_eq!(count_re().find("Like: 7").unwrap().as_str(), "7");
    }

    #[test]
    fn reply_controls_are_capped_separately_from_others() {
        assert!(REPLY_EXPANSION_LIMIT < CONTROL_SCAN_LIMIT);
        assert_eq!(reply_locators().len(), 6);
    }
}
