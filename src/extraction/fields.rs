//! Per-node field recovery. Every step returns `Option`; a node that yields
//! neither author nor body, or a body shorter than two characters, is not a
//! comment.

use super::patterns::{
    reply_count_re, AUTHOR_CHAIN, BODY_CANDIDATES, BODY_MIN_CHARS, BODY_NOISE,
    REACTION_CANDIDATES, TIMESTAMP_CANDIDATES, TIMESTAMP_MAX_CHARS,
};
use super::text::{
    collapse_whitespace, element_text, is_ui_label, looks_like_relative_time, parse_count,
    remove_noise, strip_urls,
};
use crate::core::types::{CommentFields, UNKNOWN_AUTHOR};
use scraper::{ElementRef, Selector};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Author {
    pub name: String,
    pub url: String,
}

pub fn extract_fields(node: &ElementRef) -> Option<CommentFields> {
    let author = find_author(node);
    let author_name = author.as_ref().map(|a| a.name.as_str()).unwrap_or("");

    let text = body_from_text_nodes(node, author_name)
        .or_else(|| body_from_full_text(node, author_name))
        .map(|body| strip_urls(&body))
        .unwrap_or_default();

    if author.is_none() && text.is_empty() {
        debug!("Skipping node: no author or text found");
        return None;
    }
    if text.chars().count() < 2 {
        debug!("Skipping short comment: {:?}", text);
        return None;
    }

    let Author { name, url } = author.unwrap_or_else(|| Author {
        name: UNKNOWN_AUTHOR.to_string(),
        url: String::new(),
    });
    let timestamp = find_timestamp(node, &name, &text).unwrap_or_default();

    Some(CommentFields {
        timestamp,
        likes: find_likes(node).unwrap_or(0),
        replies: find_replies(node).unwrap_or(0),
        author_name: name,
        author_url: url,
        text,
    })
}

/// Ordered link chain, then any link with a non-trivial caption.
pub fn find_author(node: &ElementRef) -> Option<Author> {
    let usable = |text: &str| !text.is_empty() && !is_ui_label(text);

    for css in AUTHOR_CHAIN {
        let Ok(selector) = Selector::parse(css) else {
            continue;
        };
        if let Some(author) = node.select(&selector).find_map(|link| {
            let name = element_text(&link);
            usable(&name).then(|| Author {
                url: link.value().attr("href").unwrap_or_default().to_string(),
                name,
            })
        }) {
            return Some(author);
        }
    }

    let Ok(any_link) = Selector::parse("a") else {
        return None;
    };
    node.select(&any_link).find_map(|link| {
        let name = element_text(&link);
        (name.chars().count() > 2 && usable(&name)).then(|| Author {
            url: link.value().attr("href").unwrap_or_default().to_string(),
            name,
        })
    })
}

/// Strategy 1: longest auto-direction text node that is not the author or a label.
fn body_from_text_nodes(node: &ElementRef, author_name: &str) -> Option<String> {
    let selector = Selector::parse(BODY_CANDIDATES).ok()?;
    node.select(&selector)
        .map(|el| element_text(&el))
        .filter(|text| text.chars().count() > BODY_MIN_CHARS)
        .filter(|text| text != author_name && !is_ui_label(text))
        .fold(None, |best: Option<String>, text| match best {
            Some(b) if b.chars().count() >= text.chars().count() => Some(b),
            _ => Some(text),
        })
}

/// Strategy 2: the node's whole text minus known noise.
fn body_from_full_text(node: &ElementRef, author_name: &str) -> Option<String> {
    let mut noise = Vec::with_capacity(BODY_NOISE.len() + 1);
    noise.push(author_name);
    noise.extend_from_slice(BODY_NOISE);
    let cleaned = collapse_whitespace(&remove_noise(&element_text(node), &noise));
    (!cleaned.is_empty()).then_some(cleaned)
}

pub fn find_timestamp(node: &ElementRef, author_name: &str, body: &str) -> Option<String> {
    let selector = Selector::parse(TIMESTAMP_CANDIDATES).ok()?;
    node.select(&selector)
        .map(|el| element_text(&el))
        .filter(|text| !text.is_empty() && text.chars().count() <= TIMESTAMP_MAX_CHARS)
        .filter(|text| text != author_name && text != body)
        .find(|text| looks_like_relative_time(text))
}

fn find_likes(node: &ElementRef) -> Option<u64> {
    let selector = Selector::parse(REACTION_CANDIDATES).ok()?;
    node.select(&selector)
        .find_map(|el| el.value().attr("aria-label").and_then(parse_count))
}

/// Deepest descendants reading like "3 replies" / "3 balasan".
fn find_replies(node: &ElementRef) -> Option<u64> {
    let re = reply_count_re();
    node.descendants()
        .filter_map(ElementRef::wrap)
        .filter(|el| {
            re.is_match(&element_text(el))
                && !el
                    .children()
                    .filter_map(ElementRef::wrap)
                    .any(|child| re.is_match(&element_text(&child)))
        })
        .find_map(|el| parse_count(&element_text(&el)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use scraper::Html;

    fn first_node(html: &Html) -> ElementRef<'_> {
        let sel = Selector::parse("div.c").unwrap();
        html.select(&sel).next().unwrap()
    }

    #[test]
    fn author_chain_order_beats_dom_order() {
        let html = Html::parse_fragment(
            r#"<div class="c">
                 <strong><a href="/generic">Generic Link</a></strong>
                 <a aria-label="Profile of Budi" href="/budi">Budi Santoso</a>
                 <div dir="auto">Mantap sekali kawan</div>
               </div>"#,
        );
        let author = find_author(&first_node(&html)).unwrap();
        assert_eq!(author.name, "Budi Santoso");
        assert_eq!(author.url, "/budi");
    }

    #[test]
    fn ui_labels_are_never_authors() {
        let html = Html::parse_fragment(
            r##"<div class="c"><a role="link" href="#">Like</a><a href="/x">Reply</a><a href="/ok">Ok</a></div>"##,
        );
        assert_eq!(find_author(&first_node(&html)), None);
    }

    #[test]
    fn longest_body_candidate_wins() {
        let html = Html::parse_fragment(
            r#"<div class="c">
                 <a role="link" href="/a">Ana Maria</a>
                 <span dir="auto">Ana Maria</span>
                 <div dir="auto">short one</div>
                 <div dir="auto">this is the much longer comment body</div>
               </div>"#,
        );
        let fields = extract_fields(&first_node(&html)).unwrap();
        assert_eq!(fields.text, "this is the much longer comment body");
        assert_eq!(fields.author_name, "Ana Maria");
    }

    #[test]
    fn full_text_fallback_strips_noise() {
        let html = Html::parse_fragment(
            r#"<div class="c"><a role="link" href="/r">Rina</a> <span>ok</span> · <span>Like</span> <span>Balas</span></div>"#,
        );
        let fields = extract_fields(&first_node(&html)).unwrap();
        assert_eq!(fields.text, "ok");
    }

    #[test]
    fn timestamp_rejects_long_and_duplicate_candidates() {
        let long = format!("posted 2 hours ago {}", "x".repeat(40));
        let html = Html::parse_fragment(&format!(
            r#"<div class="c"><a role="link" href="/p">Pat</a><span>{long}</span><div dir="auto">a body here</div><a href="/t">3 jam</a></div>"#
        ));
        let fields = extract_fields(&first_node(&html)).unwrap();
        assert_eq!(fields.timestamp, "3 jam");
    }

    #[test]
    fn missing_timestamp_stays_empty() {
        let html = Html::parse_fragment(
            r#"<div class="c"><a role="link" href="/p">Pat</a><div dir="auto">no time marker</div></div>"#,
        );
        assert_eq!(extract_fields(&first_node(&html)).unwrap().timestamp, "");
    }

    #[test]
    fn likes_and_replies_are_parsed() {
        let html = Html::parse_fragment(
            r#"<div class="c">
                 <a role="link" href="/p">Pat</a>
                 <div dir="auto">counting things</div>
                 <div aria-label="1,204 reactions; see who reacted"></div>
                 <div role="button"><span>12 replies</span></div>
               </div>"#,
        );
        let fields = extract_fields(&first_node(&html)).unwrap();
        assert_eq!(fields.likes, 1204);
        assert_eq!(fields.replies, 12);
    }

    #[test]
    fn counts_default_to_zero() {
        let html = Html::parse_fragment(
            r#"<div class="c"><a role="link" href="/p">Pat</a><div dir="auto">nothing counted</div></div>"#,
        );
        let fields = extract_fields(&first_node(&html)).unwrap();
        assert_eq!((fields.likes, fields.replies), (0, 0));
    }

    #[test]
    fn single_char_body_is_dropped() {
        let html =
            Html::parse_fragment(r#"<div class="c"><a role="link" href="/p">Pat</a> k</div>"#);
        assert!(extract_fields(&first_node(&html)).is_none());
    }
}
