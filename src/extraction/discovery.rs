use super::patterns::{DiscoveryStrategy, DISCOVERY_CHAIN};
use super::text::element_text;
use scraper::{ElementRef, Html, Selector};
use tracing::debug;

/// Candidate comment nodes of `document`, in document order.
///
/// Strategies are tried most-specific first and the first one that matches
/// anything wins; results are never merged across strategies.
pub fn discover_comment_nodes(document: &Html) -> Vec<ElementRef<'_>> {
    discover_with(document, DISCOVERY_CHAIN)
}

pub fn discover_with<'a>(document: &'a Html, chain: &[DiscoveryStrategy]) -> Vec<ElementRef<'a>> {
    for strategy in chain {
        let found = apply(document, strategy);
        if !found.is_empty() {
            debug!("Found {} candidate nodes with {:?}", found.len(), strategy);
            return found;
        }
    }
    Vec::new()
}

fn apply<'a>(document: &'a Html, strategy: &DiscoveryStrategy) -> Vec<ElementRef<'a>> {
    match *strategy {
        DiscoveryStrategy::All(css) => match Selector::parse(css) {
            Ok(selector) => document.select(&selector).collect(),
            Err(_) => Vec::new(),
        },
        DiscoveryStrategy::WithText { container, inner } => {
            let (Ok(container), Ok(inner)) = (Selector::parse(container), Selector::parse(inner))
            else {
                return Vec::new();
            };
            document
                .select(&container)
                .filter(|node| {
                    node.children()
                        .filter_map(ElementRef::wrap)
                        .any(|child| inner.matches(&child) && !element_text(&child).is_empty())
                })
                .collect()
        }
    }
}
