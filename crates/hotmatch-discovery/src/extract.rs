//! Extraction prompt and mapping of the model's reply to discovered startups.

use chrono::{DateTime, Utc};
use hotmatch_core::DiscoveredStartup;
use hotmatch_fetch::{extract_json_object, CompletionRequest};
use serde::Deserialize;
use serde_json::Value;
use tracing::warn;
use uuid::Uuid;

use crate::article::Article;

pub const DISCOVERY_MAX_TOKENS: u32 = 3000;

const DISCOVERY_SYSTEM: &str =
    "You are a startup discovery expert. Extract startup information and return ONLY valid JSON.";

pub fn discovery_request(articles: &[Article]) -> CompletionRequest {
    let articles_text = articles
        .iter()
        .enumerate()
        .map(|(i, a)| {
            format!(
                "ARTICLE {}:\nTitle: {}\nDate: {}\nURL: {}\nContent: {}...\n",
                i + 1,
                a.title,
                a.published
                    .map(|d| d.to_rfc2822())
                    .unwrap_or_else(|| "Unknown".to_string()),
                a.url.as_deref().unwrap_or(""),
                a.text,
            )
        })
        .collect::<Vec<_>>()
        .join("\n---\n");

    let prompt = format!(
        r#"Extract ALL startup companies mentioned in these articles.

ARTICLES:
{articles_text}

Extract every technology startup or innovative company with funding, product or launch
news that is mentioned with enough detail to be relevant.

For each startup, extract the exact company name, website (if mentioned), a 1-2 sentence
description, funding amount, funding stage, investor names and sectors.

RESPONSE FORMAT (JSON only):
{{
  "startups": [
    {{
      "name": "Company Name",
      "website": "https://example.com or null",
      "description": "Brief description",
      "funding_amount": "$10M or null",
      "funding_stage": "Series A or null",
      "investors": ["Investor 1"],
      "sectors": ["AI"],
      "article_url": "article url",
      "article_title": "article title"
    }}
  ]
}}"#
    );

    CompletionRequest::new(prompt)
        .with_system(DISCOVERY_SYSTEM)
        .with_max_tokens(DISCOVERY_MAX_TOKENS)
}

#[derive(Debug, Deserialize)]
struct Reply {
    #[serde(default)]
    startups: Vec<Value>,
}

#[derive(Debug, Default, Deserialize)]
struct RawStartup {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    website: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    funding_amount: Option<Value>,
    #[serde(default)]
    funding_stage: Option<String>,
    #[serde(default)]
    investors: Option<Value>,
    #[serde(default)]
    sectors: Option<Value>,
    #[serde(default)]
    article_url: Option<String>,
    #[serde(default)]
    article_title: Option<String>,
}

/// Models write the string "null" as often as a JSON null.
fn present(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty() && !v.eq_ignore_ascii_case("null") && v != "N/A")
}

fn string_list(value: Option<Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .into_iter()
            .filter_map(|v| match v {
                Value::String(s) => present(Some(s)),
                _ => None,
            })
            .collect(),
        Some(Value::String(s)) => s
            .split(',')
            .filter_map(|part| present(Some(part.to_string())))
            .collect(),
        _ => Vec::new(),
    }
}

fn amount_text(value: Option<Value>) -> Option<String> {
    match value {
        Some(Value::String(s)) => present(Some(s)),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    }
}

/// Map a model reply to discovered startups.
///
/// Unparseable replies yield an empty list. Entries without a name are
/// dropped. Missing article fields fall back to the matching article, then the
/// first article of the batch.
pub fn parse_discovery_response(
    reply: &str,
    articles: &[Article],
    source_name: &str,
    now: DateTime<Utc>,
) -> Vec<DiscoveredStartup> {
    let Some(value) = extract_json_object(reply) else {
        warn!(source = source_name, "discovery reply had no JSON object");
        return Vec::new();
    };
    let reply: Reply = match serde_json::from_value(value) {
        Ok(reply) => reply,
        Err(err) => {
            warn!(source = source_name, error = %err, "discovery reply had no startups list");
            return Vec::new();
        }
    };

    reply
        .startups
        .into_iter()
        .filter_map(|entry| serde_json::from_value::<RawStartup>(entry).ok())
        .filter_map(|raw| {
            let name = present(raw.name)?;
            let article_url = present(raw.article_url);
            let article = article_url
                .as_deref()
                .and_then(|url| articles.iter().find(|a| a.url.as_deref() == Some(url)))
                .or_else(|| articles.first());

            Some(DiscoveredStartup {
                id: Uuid::new_v4(),
                name,
                website: present(raw.website),
                description: present(raw.description),
                funding_amount: amount_text(raw.funding_amount),
                funding_stage: present(raw.funding_stage),
                investors_mentioned: string_list(raw.investors),
                sectors: string_list(raw.sectors),
                article_url: article_url.or_else(|| article.and_then(|a| a.url.clone())),
                article_title: present(raw.article_title)
                    .or_else(|| article.map(|a| a.title.clone())),
                rss_source: Some(source_name.to_string()),
                imported_to_startups: false,
                discovered_at: now,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn articles() -> Vec<Article> {
        vec![
            Article {
                title: "Acme raises $12M".into(),
                url: Some("https://news.example/acme".into()),
                published: None,
                text: "Acme raised money".into(),
            },
            Article {
                title: "Globex launches".into(),
                url: Some("https://news.example/globex".into()),
                published: None,
                text: "Globex shipped".into(),
            },
        ]
    }

    #[test]
    fn prompt_lists_every_article() {
        let request = discovery_request(&articles());
        assert!(request.prompt.contains("ARTICLE 1:\nTitle: Acme raises $12M"));
        assert!(request.prompt.contains("ARTICLE 2:"));
        assert!(request.prompt.contains("Date: Unknown"));
        assert_eq!(request.max_tokens, DISCOVERY_MAX_TOKENS);
    }

    #[test]
    fn maps_reply_and_cleans_null_strings() {
        let reply = r#"```json
{"startups": [
  {"name": "Globex", "website": "null", "description": "Robots", "funding_amount": "$3.5M",
   "funding_stage": "Seed", "investors": ["Initech", "null"], "sectors": "Robotics, AI",
   "article_url": "https://news.example/globex"},
  {"name": "Acme", "funding_amount": 12000000, "investors": []},
  {"name": "null"},
  {"website": "https://nameless.example"}
]}
```"#;
        let now = Utc::now();
        let found = parse_discovery_response(reply, &articles(), "Funding News", now);
        assert_eq!(found.len(), 2);

        let globex = &found[0];
        assert_eq!(globex.website, None);
        assert_eq!(globex.investors_mentioned, vec!["Initech"]);
        assert_eq!(globex.sectors, vec!["Robotics", "AI"]);
        assert_eq!(globex.article_title.as_deref(), Some("Globex launches"));
        assert_eq!(globex.rss_source.as_deref(), Some("Funding News"));

        let acme = &found[1];
        assert_eq!(acme.funding_amount.as_deref(), Some("12000000"));
        assert_eq!(acme.article_url.as_deref(), Some("https://news.example/acme"));
        assert!(!acme.imported_to_startups);
    }

    #[test]
    fn garbage_reply_yields_nothing() {
        assert!(parse_discovery_response("sorry, no", &articles(), "x", Utc::now()).is_empty());
        assert!(parse_discovery_response(r#"{"startups": "none"}"#, &articles(), "x", Utc::now()).is_empty());
    }
}
