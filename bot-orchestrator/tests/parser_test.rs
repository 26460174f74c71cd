mod common;

use bot_orchestrator::types::{OrchestratorError, Result};
use bot_orchestrator::ArticleParser;
use common::init_tracing;

const FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0">
  <channel>
    <title>Example Feed</title>
    <link>https://example.com</link>
    <description>Fixture feed</description>
    <item>
      <title>First story</title>
      <link>https://example.com/first</link>
      <description>&lt;p&gt;Lead paragraph&lt;/p&gt; with detail</description>
      <pubDate>Sat, 01 Aug 2026 09:00:00 GMT</pubDate>
    </item>
    <item>
      <title>Second story</title>
      <link>https://example.com/second</link>
      <pubDate>Sat, 01 Aug 2026 10:00:00 GMT</pubDate>
    </item>
    <item>
      <title>Same link as the first story</title>
      <link>https://example.com/first</link>
    </item>
  </channel>
</rss>"#;

#[tokio::test]
async fn parses_entries_and_dedups_by_link() -> Result<()> {
    init_tracing();
    let mut parser = ArticleParser::new();

    let articles = parser.parse_feed(FEED)?;

    assert_eq!(articles.len(), 2, "the repeated link must be dropped");
    assert_eq!(articles[0].title, "First story");
    assert_eq!(articles[0].link, "https://example.com/first");
    assert_eq!(articles[0].source.as_deref(), Some("Example Feed"));
    assert!(articles[0].published_at.is_some());
    assert_eq!(articles[1].title, "Second story");
    Ok(())
}

#[tokio::test]
async fn summary_markup_is_stripped() -> Result<()> {
    init_tracing();
    let mut parser = ArticleParser::new();

    let articles = parser.parse_feed(FEED)?;
    let summary = articles[0].summary.as_deref().expect("first story has a summary");

    assert!(!summary.contains('<'), "markup must be stripped: {}", summary);
    assert!(summary.contains("Lead paragraph"));
    Ok(())
}

#[tokio::test]
async fn dedup_carries_across_polls() -> Result<()> {
    init_tracing();
    let mut parser = ArticleParser::new();

    let first_pass = parser.parse_feed(FEED)?;
    assert_eq!(first_pass.len(), 2);

    // The same feed body on the next poll yields nothing new.
    let second_pass = parser.parse_feed(FEED)?;
    assert!(second_pass.is_empty());
    assert_eq!(parser.seen_count(), 2);
    Ok(())
}

#[tokio::test]
async fn garbage_input_is_a_parse_error() {
    init_tracing();
    let mut parser = ArticleParser::new();

    let err = parser
        .parse_feed("definitely not a feed")
        .expect_err("non-XML input must fail");
    assert!(matches!(err, OrchestratorError::Parse(_)));
}
