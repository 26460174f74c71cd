#![allow(dead_code)]

use bot_orchestrator::types::{Article, BotConfig, BotDraft, BotStatus, Niche};
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::sync::Once;
use uuid::Uuid;

static INIT: Once = Once::new();

pub fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::INFO)
            .try_init()
            .ok();
    });
}

/// Unique scratch path under the system temp dir.
pub fn temp_path(tag: &str) -> PathBuf {
    std::env::temp_dir().join(format!("bot-orchestrator-{}-{}", tag, Uuid::new_v4()))
}

pub fn draft(owner: &str, name: &str, credential: &str) -> BotDraft {
    BotDraft {
        owner_id: owner.to_string(),
        name: name.to_string(),
        channel_credential: credential.to_string(),
        niche: Niche::Tech,
        sources: vec!["https://example.com/feed.xml".to_string()],
        frequency_hours: 6,
        auto_publish: false,
    }
}

/// A config the runtime can be built from directly, without going
/// through the registry.
pub fn bot_config(auto_publish: bool) -> BotConfig {
    BotConfig {
        id: Uuid::new_v4(),
        owner_id: "alice".to_string(),
        name: "Test Bot".to_string(),
        channel_credential: format!("token-{}", Uuid::new_v4()),
        niche: Niche::Tech,
        sources: vec!["https://example.com/feed.xml".to_string()],
        frequency_hours: 1,
        auto_publish,
        status: BotStatus::Active,
        created_at: Utc::now(),
    }
}

pub fn article(title: &str, link: &str, published_at: Option<DateTime<Utc>>) -> Article {
    Article {
        title: title.to_string(),
        link: link.to_string(),
        summary: Some(format!("Summary of {}", title)),
        published_at,
        source: Some("Example Feed".to_string()),
    }
}
