use super::patterns::{count_re, relative_time_re, url_re, whitespace_re, UI_ACTION_LABELS};
use aho_corasick::{AhoCorasick, MatchKind};
use scraper::ElementRef;

/// `textContent` of an element, trimmed.
pub fn element_text(element: &ElementRef) -> String {
    element.text().collect::<String>().trim().to_string()
}

pub fn collapse_whitespace(text: &str) -> String {
    whitespace_re().replace_all(text, " ").trim().to_string()
}

/// Remove `http(s)://…` and `www.…` runs, then collapse whitespace.
pub fn strip_urls(text: &str) -> String {
    collapse_whitespace(&url_re().replace_all(text, " "))
}

/// Truncate to `max` characters, appending `...` when anything was cut.
pub fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

pub fn is_ui_label(text: &str) -> bool {
    UI_ACTION_LABELS.contains(&text)
}

pub fn looks_like_relative_time(text: &str) -> bool {
    relative_time_re().is_match(text)
}

/// First integer in `text`, ignoring thousands separators.
pub fn parse_count(text: &str) -> Option<u64> {
    let found = count_re().find(text)?;
    found
        .as_str()
        .chars()
        .filter(char::is_ascii_digit)
        .collect::<String>()
        .parse()
        .ok()
}

/// Remove every occurrence of the non-empty `noise` substrings, longest match first.
pub fn remove_noise(text: &str, noise: &[&str]) -> String {
    let patterns: Vec<&str> = noise.iter().copied().filter(|n| !n.is_empty()).collect();
    if patterns.is_empty() {
        return text.to_string();
    }
    match AhoCorasick::builder()
        .match_kind(MatchKind::LeftmostLongest)
        .build(&patterns)
    {
        Ok(ac) => {
            let blanks = vec![" "; patterns.len()];
            ac.replace_all(text, &blanks)
        }
        Err(_) => text.to_string(),
    }
}
