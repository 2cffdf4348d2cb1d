//! Article text cleanup before it goes into the extraction prompt.

use chrono::{DateTime, Utc};
use scraper::node::Node;
use scraper::Html;

use crate::feed::FeedItem;

pub const ARTICLE_CONTENT_CHARS: usize = 600;

const BLOCK_TAGS: &[&str] = &[
    "p", "div", "br", "li", "ul", "ol", "h1", "h2", "h3", "h4", "h5", "h6", "blockquote",
    "figure", "figcaption", "tr", "td",
];

/// A feed item reduced to plain text.
#[derive(Debug, Clone, PartialEq)]
pub struct Article {
    pub title: String,
    pub url: Option<String>,
    pub published: Option<DateTime<Utc>>,
    pub text: String,
}

impl Article {
    pub fn from_item(item: &FeedItem) -> Self {
        let body = if item.content.trim().is_empty() {
            item.title.as_str()
        } else {
            item.content.as_str()
        };
        Self {
            title: item.title.clone(),
            url: item.link.clone(),
            published: item.published,
            text: truncate_chars(&clean_html(body), ARTICLE_CONTENT_CHARS),
        }
    }
}

/// Text content of an HTML fragment with whitespace collapsed.
pub fn clean_html(html: &str) -> String {
    let fragment = Html::parse_fragment(html);
    let mut out = String::with_capacity(html.len());
    for node in fragment.root_element().descendants() {
        match node.value() {
            Node::Text(text) => out.push_str(text),
            Node::Element(el) if BLOCK_TAGS.contains(&el.name()) => out.push(' '),
            _ => {}
        }
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}
