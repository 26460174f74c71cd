use crate::channel::ChatChannel;
use crate::generator::SuggestionGenerator;
use crate::publisher::Publisher;
use crate::sources::ArticleSource;
use crate::types::{ApprovalReply, ApprovalRequest, Article, BotConfig, PublishReceipt, Result};
use crate::watermark::WatermarkStore;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

pub const DEFAULT_APPROVAL_TIMEOUT: Duration = Duration::from_secs(15 * 60);

/// The periodic loop behind one running bot: fetch new articles, generate
/// candidates, and publish them directly or via owner approval.
///
/// The runtime is a read-only consumer of its config; edits made through
/// the registry only take effect on the next start.
pub struct BotRuntime {
    config: BotConfig,
    sources: Vec<Box<dyn ArticleSource>>,
    generator: SuggestionGenerator,
    publisher: Arc<Publisher>,
    channel: Arc<dyn ChatChannel>,
    watermarks: Arc<WatermarkStore>,
    watermark: Option<DateTime<Utc>>,
    tick_interval: Duration,
    approval_timeout: Duration,
}

impl BotRuntime {
    /// Load the persisted watermark and assemble the runtime. This is
    /// the fallible half of starting a bot; the loop itself never fails.
    pub async fn initialize(
        config: BotConfig,
        sources: Vec<Box<dyn ArticleSource>>,
        generator: SuggestionGenerator,
        publisher: Arc<Publisher>,
        channel: Arc<dyn ChatChannel>,
        watermarks: Arc<WatermarkStore>,
    ) -> Result<Self> {
        let watermark = watermarks.load(config.id).await?;
        let tick_interval = Duration::from_secs(u64::from(config.frequency_hours) * 3600);

        Ok(Self {
            config,
            sources,
            generator,
            publisher,
            channel,
            watermarks,
            watermark,
            tick_interval,
            approval_timeout: DEFAULT_APPROVAL_TIMEOUT,
        })
    }

    /// Override the tick interval (tests and manual runs; production
    /// derives it from `frequency_hours`).
    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    pub fn with_approval_timeout(mut self, timeout: Duration) -> Self {
        self.approval_timeout = timeout;
        self
    }

    /// Run until the shutdown signal flips. The first tick fires one
    /// full interval after start.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!(
            "Bot '{}' ({}) running, tick every {:?}",
            self.config.name, self.config.id, self.tick_interval
        );

        let start = tokio::time::Instant::now() + self.tick_interval;
        let mut ticker = tokio::time::interval_at(start, self.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        enum Wake {
            Signal(bool),
            Tick,
        }

        loop {
            let wake = tokio::select! {
                changed = shutdown.changed() => Wake::Signal(changed.is_err()),
                _ = ticker.tick() => Wake::Tick,
            };

            match wake {
                Wake::Signal(sender_gone) => {
                    if sender_gone || *shutdown.borrow() {
                        break;
                    }
                }
                Wake::Tick => self.run_tick(&shutdown).await,
            }
        }

        info!("Bot '{}' ({}) stopped", self.config.name, self.config.id);
    }

    /// One fetch-generate-publish pass. Every failure inside is
    /// contained: a bad source skips that source, a bad article skips
    /// that article.
    pub async fn run_tick(&mut self, shutdown: &watch::Receiver<bool>) {
        let articles = self.collect_new_articles().await;
        if articles.is_empty() {
            debug!("Bot '{}': no new articles this tick", self.config.name);
            return;
        }

        info!(
            "Bot '{}': processing {} new article(s)",
            self.config.name,
            articles.len()
        );

        for article in articles {
            if *shutdown.borrow() {
                debug!("Bot '{}': shutdown requested mid-tick", self.config.name);
                break;
            }
            self.process_article(article).await;
        }
    }

    /// Poll every source against the watermark, merge, dedup by link,
    /// and order oldest-first. Advances the persisted watermark to the
    /// newest fetched publish time before any article is processed.
    async fn collect_new_articles(&mut self) -> Vec<Article> {
        let watermark = self.watermark;
        let mut collected: Vec<Article> = Vec::new();
        let mut seen_links: HashSet<String> = HashSet::new();

        for source in &mut self.sources {
            match source.poll(watermark).await {
                Ok(articles) => {
                    for article in articles {
                        if seen_links.insert(article.link.clone()) {
                            collected.push(article);
                        }
                    }
                }
                Err(e) => {
                    warn!(
                        "Bot '{}': fetch failed for {}: {}; skipping this source",
                        self.config.name,
                        source.source_name(),
                        e
                    );
                }
            }
        }

        // Belt over the sources' own filtering: nothing at or before the
        // watermark gets through.
        if let Some(watermark) = watermark {
            collected.retain(|article| match article.published_at {
                Some(ts) => ts > watermark,
                None => true,
            });
        }

        collected.sort_by_key(|article| article.published_at);

        if let Some(newest) = collected.iter().filter_map(|a| a.published_at).max() {
            match self.watermarks.advance(self.config.id, newest).await {
                Ok(effective) => self.watermark = Some(effective),
                Err(e) => warn!(
                    "Bot '{}': failed to persist watermark: {}",
                    self.config.name, e
                ),
            }
        }

        collected
    }

    /// Generate candidates for one article and route them through
    /// auto-publish or owner approval.
    async fn process_article(&self, article: Article) {
        let candidates = self.generator.candidates(&article).await;
        let Some(first) = candidates.first() else {
            warn!(
                "Bot '{}': no candidates for \"{}\"; skipping",
                self.config.name, article.title
            );
            return;
        };

        if self.config.auto_publish {
            self.publish_and_report(&article, first).await;
            return;
        }

        let request = ApprovalRequest {
            article: article.clone(),
            candidates: candidates.clone(),
        };

        let reply = match tokio::time::timeout(self.approval_timeout, self.channel.request_approval(request)).await
        {
            Ok(Ok(reply)) => reply,
            Ok(Err(e)) => {
                warn!(
                    "Bot '{}': approval request failed for \"{}\": {}; skipping",
                    self.config.name, article.title, e
                );
                ApprovalReply::Skip
            }
            Err(_) => {
                info!(
                    "Bot '{}': approval timed out for \"{}\"; skipping",
                    self.config.name, article.title
                );
                ApprovalReply::Skip
            }
        };

        match reply {
            ApprovalReply::Select(index) => match candidates.get(index) {
                Some(text) => self.publish_and_report(&article, text).await,
                None => {
                    warn!(
                        "Bot '{}': selection {} out of range for \"{}\"; skipping",
                        self.config.name, index, article.title
                    );
                }
            },
            ApprovalReply::Skip => {
                debug!("Bot '{}': skipped \"{}\"", self.config.name, article.title);
            }
        }
    }

    async fn publish_and_report(&self, article: &Article, text: &str) {
        match self.publisher.publish(text).await {
            Ok(receipt) => {
                let report = format_publish_report(article, &receipt);
                if let Err(e) = self.channel.notify(&report).await {
                    warn!("Bot '{}': failed to notify owner: {}", self.config.name, e);
                }
            }
            Err(e) => {
                warn!(
                    "Bot '{}': publish failed for \"{}\": {}",
                    self.config.name, article.title, e
                );
                let report = format!("Publish failed for \"{}\": {}", article.title, e);
                if let Err(e) = self.channel.notify(&report).await {
                    warn!("Bot '{}': failed to notify owner: {}", self.config.name, e);
                }
            }
        }
    }
}

fn format_publish_report(article: &Article, receipt: &PublishReceipt) -> String {
    if receipt.simulated {
        format!("Simulated publish for \"{}\": {}", article.title, receipt.text)
    } else {
        format!("Published for \"{}\": {}", article.title, receipt.text)
    }
}
