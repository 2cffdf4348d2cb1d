//! RSS 2.0 and Atom feed parsing.

use chrono::{DateTime, Duration, Utc};
use quick_xml::events::Event;
use quick_xml::Reader;

use crate::DiscoveryError;

/// Items older than this many days are ignored.
pub const RECENT_DAYS: i64 = 7;
pub const MAX_ITEMS_PER_SOURCE: usize = 25;

#[derive(Debug, Clone, PartialEq, Default)]
pub struct FeedItem {
    pub title: String,
    pub link: Option<String>,
    pub published: Option<DateTime<Utc>>,
    /// Raw body, usually HTML: `content:encoded` or Atom `content` before `description`/`summary`.
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Title,
    Link,
    Date,
    Summary,
    Content,
}

#[derive(Debug, Default)]
struct ItemBuilder {
    title: String,
    link: Option<String>,
    date: String,
    summary: String,
    content: String,
}

impl ItemBuilder {
    fn push(&mut self, field: Field, text: &str) {
        match field {
            Field::Title => self.title.push_str(text),
            Field::Link => self.link.get_or_insert_with(String::new).push_str(text),
            Field::Date => self.date.push_str(text),
            Field::Summary => self.summary.push_str(text),
            Field::Content => self.content.push_str(text),
        }
    }

    fn finish(self) -> FeedItem {
        let content = if self.content.trim().is_empty() {
            self.summary
        } else {
            self.content
        };
        FeedItem {
            title: self.title.trim().to_string(),
            link: self.link.map(|l| l.trim().to_string()).filter(|l| !l.is_empty()),
            published: parse_feed_date(self.date.trim()),
            content,
        }
    }
}

fn local_name(name: &[u8]) -> &[u8] {
    match name.iter().rposition(|&b| b == b':') {
        Some(pos) => &name[pos + 1..],
        None => name,
    }
}

fn field_for(local: &[u8]) -> Option<Field> {
    match local {
        b"title" => Some(Field::Title),
        b"link" => Some(Field::Link),
        b"pubDate" | b"published" | b"updated" | b"date" => Some(Field::Date),
        b"description" | b"summary" => Some(Field::Summary),
        b"encoded" | b"content" => Some(Field::Content),
        _ => None,
    }
}

/// RFC 2822 (RSS) or RFC 3339 (Atom) timestamps.
pub fn parse_feed_date(value: &str) -> Option<DateTime<Utc>> {
    if value.is_empty() {
        return None;
    }
    DateTime::parse_from_rfc2822(value)
        .or_else(|_| DateTime::parse_from_rfc3339(value))
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
}

/// Parse every `<item>` (RSS) or `<entry>` (Atom) in a feed document.
pub fn parse_feed(xml: &str) -> Result<Vec<FeedItem>, DiscoveryError> {
    let mut reader = Reader::from_reader(xml.as_bytes());
    reader.config_mut().trim_text(true);

    let mut items = Vec::new();
    let mut current: Option<ItemBuilder> = None;
    let mut field: Option<Field> = None;
    let mut depth_in_field = 0usize;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => {
                let name = e.name();
                let local = local_name(name.as_ref());
                if matches!(local, b"item" | b"entry") {
                    current = Some(ItemBuilder::default());
                    field = None;
                } else if let Some(item) = current.as_mut() {
                    if field.is_some() {
                        // markup nested inside a field (xhtml content)
                        depth_in_field += 1;
                    } else if let Some(f) = field_for(local) {
                        let taken = match f {
                            Field::Link => item.link.is_some(),
                            Field::Date => !item.date.is_empty(),
                            _ => false,
                        };
                        // first link and first date win
                        if !taken {
                            field = Some(f);
                            depth_in_field = 0;
                        }
                    }
                }
            }
            Ok(Event::Empty(ref e)) => {
                let name = e.name();
                if local_name(name.as_ref()) == b"link" && field.is_none() {
                    if let Some(item) = current.as_mut() {
                        let rel = e
                            .try_get_attribute("rel")
                            .map_err(|err| DiscoveryError::Feed(err.to_string()))?
                            .and_then(|a| a.unescape_value().ok().map(|v| v.into_owned()));
                        let href = e
                            .try_get_attribute("href")
                            .map_err(|err| DiscoveryError::Feed(err.to_string()))?
                            .and_then(|a| a.unescape_value().ok().map(|v| v.into_owned()));
                        let alternate = rel.as_deref().map_or(true, |r| r == "alternate");
                        if let (Some(href), true, None) = (href, alternate, &item.link) {
                            item.link = Some(href);
                        }
                    }
                }
            }
            Ok(Event::Text(ref e)) => {
                if let (Some(item), Some(f)) = (current.as_mut(), field) {
                    let text = e
                        .unescape()
                        .map_err(|err| DiscoveryError::Feed(err.to_string()))?;
                    if !item_field_is_empty(item, f) {
                        item.push(f, " ");
                    }
                    item.push(f, &text);
                }
            }
            Ok(Event::CData(ref e)) => {
                if let (Some(item), Some(f)) = (current.as_mut(), field) {
                    item.push(f, &String::from_utf8_lossy(e));
                }
            }
            Ok(Event::End(ref e)) => {
                let name = e.name();
                let local = local_name(name.as_ref());
                if matches!(local, b"item" | b"entry") {
                    if let Some(item) = current.take() {
                        items.push(item.finish());
                    }
                    field = None;
                } else if field.is_some() {
                    if depth_in_field > 0 {
                        depth_in_field -= 1;
                    } else {
                        field = None;
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(err) => return Err(DiscoveryError::Feed(err.to_string())),
            _ => {}
        }
        buf.clear();
    }

    Ok(items)
}

fn item_field_is_empty(item: &ItemBuilder, field: Field) -> bool {
    match field {
        Field::Title => item.title.is_empty(),
        Field::Link => item.link.as_deref().map_or(true, str::is_empty),
        Field::Date => item.date.is_empty(),
        Field::Summary => item.summary.is_empty(),
        Field::Content => item.content.is_empty(),
    }
}

/// Items published in the last [`RECENT_DAYS`] days, capped at `limit`.
/// Undated items are kept.
pub fn recent_items(items: Vec<FeedItem>, now: DateTime<Utc>, limit: usize) -> Vec<FeedItem> {
    let cutoff = now - Duration::days(RECENT_DAYS);
    items
        .into_iter()
        .filter(|item| item.published.map_or(true, |p| p >= cutoff))
        .take(limit)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const RSS: &str = r#"<?xml version="1.0"?>
<rss version="2.0" xmlns:content="http://purl.org/rss/1.0/modules/content/">
  <channel>
    <title>Funding News</title>
    <link>https://news.example</link>
    <item>
      <title>Acme raises $12M Series A</title>
      <link>https://news.example/acme</link>
      <pubDate>Mon, 12 Oct 2026 09:30:00 GMT</pubDate>
      <description>Short &amp; sweet</description>
      <content:encoded><![CDATA[<p>Acme, an <b>AI</b> startup, raised $12M.</p>]]></content:encoded>
    </item>
    <item>
      <title>Undated note</title>
      <description>&lt;p&gt;No date here&lt;/p&gt;</description>
    </item>
  </channel>
</rss>"#;

    #[test]
    fn parses_rss_items() {
        let items = parse_feed(RSS).expect("rss");
        assert_eq!(items.len(), 2);
        let acme = &items[0];
        assert_eq!(acme.title, "Acme raises $12M Series A");
        assert_eq!(acme.link.as_deref(), Some("https://news.example/acme"));
        assert_eq!(
            acme.published.map(|d| d.to_rfc3339()),
            Some("2026-10-12T09:30:00+00:00".to_string())
        );
        assert!(acme.content.contains("<b>AI</b>"));
        assert_eq!(items[1].content, "<p>No date here</p>");
        assert!(items[1].published.is_none());
    }

    #[test]
    fn channel_fields_are_not_items() {
        let items = parse_feed(RSS).expect("rss");
        assert!(items.iter().all(|i| i.title != "Funding News"));
    }

    #[test]
    fn malformed_xml_is_an_error() {
        let err = parse_feed("<rss><channel><item><title>x</titl></item>").expect_err("bad xml");
        assert!(matches!(err, DiscoveryError::Feed(_)));
    }

    #[test]
    fn recent_items_keeps_undated_and_caps() {
        let now = parse_feed_date("2026-10-19T00:00:00Z").expect("now");
        let item = |days: Option<i64>| FeedItem {
            published: days.map(|d| now - Duration::days(d)),
            ..FeedItem::default()
        };
        let items = vec![item(Some(1)), item(Some(8)), item(None), item(Some(7)), item(Some(2))];
        assert_eq!(recent_items(items.clone(), now, 25).len(), 4);
        assert_eq!(recent_items(items, now, 2).len(), 2);
    }
}
