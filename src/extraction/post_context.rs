use super::patterns::{POST_AUTHOR_CHAIN, POST_CONTENT_CHAIN, POST_CONTENT_MAX_CHARS};
use super::text::{element_text, truncate_chars};
use crate::core::types::PostContext;
use scraper::{Html, Selector};
use tracing::debug;

/// Best-effort post metadata. Missing pieces stay empty strings.
pub fn extract_post_context(document: &Html, post_url: &str) -> PostContext {
    let post_author = first_text(document, POST_AUTHOR_CHAIN).unwrap_or_default();
    let post_content = longest_text(document, POST_CONTENT_CHAIN)
        .map(|text| truncate_chars(&text, POST_CONTENT_MAX_CHARS))
        .unwrap_or_default();

    debug!(
        "Post info: author={:?}, content_length={}",
        post_author,
        post_content.chars().count()
    );

    PostContext {
        post_url: post_url.to_string(),
        post_author,
        post_content,
        post_timestamp: String::new(),
    }
}

/// Text of the first element of the first selector that has any non-empty match.
fn first_text(document: &Html, chain: &[&str]) -> Option<String> {
    chain.iter().find_map(|css| {
        let selector = Selector::parse(css).ok()?;
        document
            .select(&selector)
            .map(|el| element_text(&el))
            .find(|text| !text.is_empty())
    })
}

/// Longest non-empty text among the matches of the first selector that has any.
fn longest_text(document: &Html, chain: &[&str]) -> Option<String> {
    chain.iter().find_map(|css| {
        let selector = Selector::parse(css).ok()?;
        document
            .select(&selector)
            .map(|el| element_text(&el))
            .filter(|text| !text.is_empty())
            .max_by_key(|text| text.chars().count())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn author_and_longest_message() {
        let html = Html::parse_document(
            r#"<h3><a href="/page">Warung Kopi</a></h3>
               <div data-ad-preview="message">Promo hari ini</div>
               <div data-ad-preview="message">Promo hari ini: diskon besar untuk semua menu</div>
               <div dir="auto">this longer auto text is ignored because a message matched first</div>"#,
        );
        let ctx = extract_post_context(&html, "https://www.facebook.com/wk/posts/1");
        assert_eq!(ctx.post_author, "Warung Kopi");
        assert_eq!(ctx.post_content, "Promo hari ini: diskon besar untuk semua menu");
        assert_eq!(ctx.post_timestamp, "");
    }

    #[test]
    fn long_content_is_truncated() {
        let body = "z".repeat(600);
        let html = Html::parse_document(&format!(r#"<div dir="auto">{body}</div>"#));
        let ctx = extract_post_context(&html, "u");
        assert_eq!(ctx.post_content.chars().count(), 503);
        assert!(ctx.post_content.ends_with("..."));
    }

    #[test]
    fn empty_page_gives_empty_fields() {
        let html = Html::parse_document("<p></p>");
        let ctx = extract_post_context(&html, "u");
        assert_eq!(ctx.post_url, "u");
        assert!(ctx.post_author.is_empty() && ctx.post_content.is_empty());
    }
}
