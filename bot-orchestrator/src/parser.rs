use crate::types::{Article, OrchestratorError, Result};
use chrono::Utc;
use feed_rs::parser;
use std::collections::HashSet;
use tracing::debug;

const MAX_SUMMARY_CHARS: usize = 300;

/// Parses fetched feed bodies into [`Article`]s, deduplicating by link
/// across calls for the lifetime of the parser.
pub struct ArticleParser {
    seen_links: HashSet<String>,
}

impl ArticleParser {
    pub fn new() -> Self {
        Self {
            seen_links: HashSet::new(),
        }
    }

    /// Parse one feed body. Returns articles in document order; entries
    /// without a title or link are dropped, as are links already seen by
    /// this parser.
    pub fn parse_feed(&mut self, content: &str) -> Result<Vec<Article>> {
        debug!("Parsing feed content ({} bytes)", content.len());

        let feed = parser::parse(content.as_bytes())
            .map_err(|e| OrchestratorError::Parse(format!("failed to parse feed: {}", e)))?;

        let feed_title = feed.title.map(|t| t.content);

        let mut articles = Vec::new();
        for entry in feed.entries {
            if let Some(article) = self.parse_entry(entry, feed_title.as_deref()) {
                articles.push(article);
            }
        }

        debug!("Parsed feed with {} new entries", articles.len());
        Ok(articles)
    }

    fn parse_entry(&mut self, entry: feed_rs::model::Entry, feed_title: Option<&str>) -> Option<Article> {
        let title = entry.title.map(|t| t.content)?;
        if title.trim().is_empty() {
            return None;
        }

        let link = entry.links.first()?.href.clone();
        if self.seen_links.contains(&link) {
            debug!("Skipping duplicate entry: {}", link);
            return None;
        }
        self.seen_links.insert(link.clone());

        let summary = entry
            .summary
            .map(|s| clean_summary(&s.content))
            .filter(|s| !s.is_empty());

        let published_at = entry
            .published
            .or(entry.updated)
            .map(|dt| dt.with_timezone(&Utc));

        Some(Article {
            title: title.trim().to_string(),
            link,
            summary,
            published_at,
            source: feed_title.map(|t| t.to_string()),
        })
    }

    pub fn seen_count(&self) -> usize {
        self.seen_links.len()
    }

    pub fn clear_seen(&mut self) {
        self.seen_links.clear();
    }
}

impl Default for ArticleParser {
    fn default() -> Self {
        Self::new()
    }
}

/// Strip markup and truncate summary text to a readable excerpt.
fn clean_summary(raw: &str) -> String {
    let mut cleaned = String::with_capacity(raw.len());
    let mut in_tag = false;
    for ch in raw.chars() {
        match ch {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => cleaned.push(ch),
            _ => {}
        }
    }

    let cleaned = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");
    if cleaned.chars().count() > MAX_SUMMARY_CHARS {
        let truncated: String = cleaned.chars().take(MAX_SUMMARY_CHARS).collect();
        format!("{}...", truncated.trim_end())
    } else {
        cleaned
    }
}
