mod common;

use async_trait::async_trait;
use bot_orchestrator::sources::ArticleSource;
use bot_orchestrator::types::{ApprovalReply, Article, OrchestratorError, Result};
use bot_orchestrator::{BotRuntime, MockChannel, Publisher, SuggestionGenerator, WatermarkStore};
use chrono::{DateTime, TimeZone, Utc};
use common::{article, bot_config, init_tracing, temp_path};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::info;

/// Source that returns a fixed batch and deliberately ignores the
/// watermark, so the runtime's own filtering is what gets exercised.
struct StubSource {
    articles: Vec<Article>,
}

#[async_trait]
impl ArticleSource for StubSource {
    fn source_id(&self) -> String {
        "stub".to_string()
    }

    fn source_name(&self) -> String {
        "Stub Feed".to_string()
    }

    async fn poll(&mut self, _since: Option<DateTime<Utc>>) -> Result<Vec<Article>> {
        Ok(self.articles.clone())
    }
}

struct FailingSource;

#[async_trait]
impl ArticleSource for FailingSource {
    fn source_id(&self) -> String {
        "failing".to_string()
    }

    fn source_name(&self) -> String {
        "Failing Feed".to_string()
    }

    async fn poll(&mut self, _since: Option<DateTime<Utc>>) -> Result<Vec<Article>> {
        Err(OrchestratorError::Fetch("connection refused".to_string()))
    }
}

fn ts(hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 8, 1, hour, 0, 0).unwrap()
}

#[tokio::test]
async fn fetch_step_yields_only_articles_newer_than_watermark() -> Result<()> {
    init_tracing();
    let watermarks = Arc::new(WatermarkStore::open(temp_path("runtime-watermark"))?);
    let config = bot_config(false);

    // Watermark sits at noon; three articles are older or equal, two newer.
    watermarks.advance(config.id, ts(12)).await?;
    let articles = vec![
        article("old-1", "https://example.com/old-1", Some(ts(8))),
        article("newer-2", "https://example.com/newer-2", Some(ts(15))),
        article("old-2", "https://example.com/old-2", Some(ts(10))),
        article("newer-1", "https://example.com/newer-1", Some(ts(13))),
        article("old-3", "https://example.com/old-3", Some(ts(12))),
    ];

    let channel = Arc::new(MockChannel::new());
    let mut runtime = BotRuntime::initialize(
        config.clone(),
        vec![Box::new(StubSource { articles })],
        SuggestionGenerator::template_only(),
        Arc::new(Publisher::new(None)?),
        channel.clone(),
        watermarks.clone(),
    )
    .await?
    .with_approval_timeout(Duration::from_secs(5));

    let (_tx, rx) = watch::channel(false);
    runtime.run_tick(&rx).await;

    let requests = channel.approval_requests().await;
    assert_eq!(requests.len(), 2, "exactly the two newer articles must surface");
    assert_eq!(requests[0].article.title, "newer-1", "oldest new article comes first");
    assert_eq!(requests[1].article.title, "newer-2");

    // Watermark advanced to the newest fetched publish time.
    assert_eq!(watermarks.load(config.id).await?, Some(ts(15)));
    Ok(())
}

#[tokio::test]
async fn watermark_is_never_rewound() -> Result<()> {
    init_tracing();
    let watermarks = Arc::new(WatermarkStore::open(temp_path("runtime-rewind"))?);
    let config = bot_config(false);

    watermarks.advance(config.id, ts(18)).await?;
    // Offering an older candidate leaves the stored value alone.
    let effective = watermarks.advance(config.id, ts(6)).await?;
    assert_eq!(effective, ts(18));

    let articles = vec![article("stale", "https://example.com/stale", Some(ts(6)))];
    let channel = Arc::new(MockChannel::new());
    let mut runtime = BotRuntime::initialize(
        config.clone(),
        vec![Box::new(StubSource { articles })],
        SuggestionGenerator::template_only(),
        Arc::new(Publisher::new(None)?),
        channel.clone(),
        watermarks.clone(),
    )
    .await?;

    let (_tx, rx) = watch::channel(false);
    runtime.run_tick(&rx).await;

    assert!(channel.approval_requests().await.is_empty());
    assert_eq!(watermarks.load(config.id).await?, Some(ts(18)));
    Ok(())
}

#[tokio::test]
async fn auto_publish_reports_simulated_outcome() -> Result<()> {
    init_tracing();
    let watermarks = Arc::new(WatermarkStore::open(temp_path("runtime-auto"))?);
    let config = bot_config(true);

    let articles = vec![article("fresh", "https://example.com/fresh", Some(ts(9)))];
    let channel = Arc::new(MockChannel::new());
    let mut runtime = BotRuntime::initialize(
        config,
        vec![Box::new(StubSource { articles })],
        SuggestionGenerator::template_only(),
        Arc::new(Publisher::new(None)?),
        channel.clone(),
        watermarks,
    )
    .await?;

    let (_tx, rx) = watch::channel(false);
    runtime.run_tick(&rx).await;

    // Auto mode never asks for approval; the owner just gets the outcome,
    // flagged as simulated because no credential is configured.
    assert!(channel.approval_requests().await.is_empty());
    let notifications = channel.notifications().await;
    assert_eq!(notifications.len(), 1);
    assert!(notifications[0].starts_with("Simulated publish"), "got: {}", notifications[0]);
    Ok(())
}

#[tokio::test]
async fn selected_candidate_is_published() -> Result<()> {
    init_tracing();
    let watermarks = Arc::new(WatermarkStore::open(temp_path("runtime-select"))?);
    let config = bot_config(false);

    let articles = vec![article("pick me", "https://example.com/pick", Some(ts(9)))];
    let channel = Arc::new(MockChannel::new().with_reply(ApprovalReply::Select(0)));
    let mut runtime = BotRuntime::initialize(
        config,
        vec![Box::new(StubSource { articles })],
        SuggestionGenerator::template_only(),
        Arc::new(Publisher::new(None)?),
        channel.clone(),
        watermarks,
    )
    .await?
    .with_approval_timeout(Duration::from_secs(5));

    let (_tx, rx) = watch::channel(false);
    runtime.run_tick(&rx).await;

    let requests = channel.approval_requests().await;
    assert_eq!(requests.len(), 1);
    let notifications = channel.notifications().await;
    assert_eq!(notifications.len(), 1);
    assert!(notifications[0].contains("pick me"));
    assert!(notifications[0].contains("Simulated publish"));
    Ok(())
}

#[tokio::test]
async fn approval_timeout_skips_article_and_continues() -> Result<()> {
    init_tracing();
    let watermarks = Arc::new(WatermarkStore::open(temp_path("runtime-timeout"))?);
    let config = bot_config(false);

    let articles = vec![
        article("first", "https://example.com/first", Some(ts(9))),
        article("second", "https://example.com/second", Some(ts(10))),
    ];
    // Owner never answers in time.
    let channel = Arc::new(MockChannel::new().with_reply_delay(500));
    let mut runtime = BotRuntime::initialize(
        config,
        vec![Box::new(StubSource { articles })],
        SuggestionGenerator::template_only(),
        Arc::new(Publisher::new(None)?),
        channel.clone(),
        watermarks,
    )
    .await?
    .with_approval_timeout(Duration::from_millis(50));

    let (_tx, rx) = watch::channel(false);
    runtime.run_tick(&rx).await;

    // Both articles were offered; neither timeout halted the loop, and
    // nothing was published.
    assert_eq!(channel.approval_requests().await.len(), 2);
    assert!(channel.notifications().await.is_empty());
    Ok(())
}

#[tokio::test]
async fn failing_source_does_not_block_other_sources() -> Result<()> {
    init_tracing();
    let watermarks = Arc::new(WatermarkStore::open(temp_path("runtime-failing-source"))?);
    let config = bot_config(true);

    let articles = vec![article("survivor", "https://example.com/survivor", Some(ts(9)))];
    let channel = Arc::new(MockChannel::new());
    let mut runtime = BotRuntime::initialize(
        config,
        vec![Box::new(FailingSource), Box::new(StubSource { articles })],
        SuggestionGenerator::template_only(),
        Arc::new(Publisher::new(None)?),
        channel.clone(),
        watermarks,
    )
    .await?;

    let (_tx, rx) = watch::channel(false);
    runtime.run_tick(&rx).await;

    let notifications = channel.notifications().await;
    assert_eq!(notifications.len(), 1);
    assert!(notifications[0].contains("survivor"));
    Ok(())
}

#[tokio::test]
async fn publish_failure_is_contained_per_article() -> Result<()> {
    init_tracing();
    let watermarks = Arc::new(WatermarkStore::open(temp_path("runtime-publish-failure"))?);
    let config = bot_config(true);

    let articles = vec![
        article("first", "https://example.com/pf-first", Some(ts(9))),
        article("second", "https://example.com/pf-second", Some(ts(10))),
    ];
    let channel = Arc::new(MockChannel::new());
    // Real credential but an unreachable endpoint: every publish fails.
    let publisher =
        Publisher::new(Some("credential".to_string()))?.with_api_base("http://127.0.0.1:1".to_string());
    let mut runtime = BotRuntime::initialize(
        config,
        vec![Box::new(StubSource { articles })],
        SuggestionGenerator::template_only(),
        Arc::new(publisher),
        channel.clone(),
        watermarks,
    )
    .await?;

    let (_tx, rx) = watch::channel(false);
    runtime.run_tick(&rx).await;

    let notifications = channel.notifications().await;
    assert_eq!(notifications.len(), 2, "one failure report per article, loop not halted");
    for notification in &notifications {
        assert!(notification.starts_with("Publish failed"), "got: {}", notification);
    }
    info!("Both articles reported failure independently");
    Ok(())
}

#[tokio::test]
async fn duplicate_links_across_sources_are_merged() -> Result<()> {
    init_tracing();
    let watermarks = Arc::new(WatermarkStore::open(temp_path("runtime-dedup"))?);
    let config = bot_config(true);

    let shared = article("shared", "https://example.com/shared", Some(ts(9)));
    let channel = Arc::new(MockChannel::new());
    let mut runtime = BotRuntime::initialize(
        config,
        vec![
            Box::new(StubSource { articles: vec![shared.clone()] }),
            Box::new(StubSource { articles: vec![shared] }),
        ],
        SuggestionGenerator::template_only(),
        Arc::new(Publisher::new(None)?),
        channel.clone(),
        watermarks,
    )
    .await?;

    let (_tx, rx) = watch::channel(false);
    runtime.run_tick(&rx).await;

    assert_eq!(channel.notifications().await.len(), 1, "the same link must only be handled once");
    Ok(())
}
