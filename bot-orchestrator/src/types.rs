use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
// Use the interfaces crate for the collaborator-facing types
pub use interfaces::defs::{ApprovalReply, ApprovalRequest, Article, PublishReceipt};

/// Topical category a bot covers. Determines the default feed sources
/// offered during setup; `Custom` has no defaults and requires the owner
/// to supply feed URLs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Niche {
    Tech,
    Crypto,
    Ai,
    General,
    Custom,
}

impl Niche {
    pub fn default_sources(&self) -> &'static [&'static str] {
        match self {
            Niche::Tech => &[
                "https://feeds.feedburner.com/TechCrunch",
                "https://www.theverge.com/rss/index.xml",
                "https://feeds.arstechnica.com/arstechnica/index",
                "https://www.wired.com/feed/rss",
            ],
            Niche::Crypto => &[
                "https://coindesk.com/arc/outboundfeeds/rss/",
                "https://cointelegraph.com/rss",
                "https://decrypt.co/feed",
                "https://bitcoinmagazine.com/.rss/full/",
            ],
            Niche::Ai => &[
                "https://venturebeat.com/category/ai/feed/",
                "https://www.artificialintelligence-news.com/feed/",
                "https://syncedreview.com/feed/",
            ],
            Niche::General => &[
                "https://feeds.bbci.co.uk/news/rss.xml",
                "https://feeds.npr.org/1001/rss.xml",
            ],
            Niche::Custom => &[],
        }
    }

    pub fn parse(input: &str) -> Option<Niche> {
        match input.trim().to_lowercase().as_str() {
            "tech" | "technology" => Some(Niche::Tech),
            "crypto" | "cryptocurrency" => Some(Niche::Crypto),
            "ai" | "artificial intelligence" => Some(Niche::Ai),
            "general" | "news" => Some(Niche::General),
            "custom" => Some(Niche::Custom),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Niche::Tech => "Tech",
            Niche::Crypto => "Crypto",
            Niche::Ai => "AI",
            Niche::General => "General",
            Niche::Custom => "Custom",
        }
    }
}

/// Persisted lifecycle status of a bot. `Active` entries are resumed on
/// controller startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BotStatus {
    Inactive,
    Active,
}

/// Durable configuration of one bot, owned by the registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BotConfig {
    pub id: Uuid,
    pub owner_id: String,
    pub name: String,
    pub channel_credential: String,
    pub niche: Niche,
    pub sources: Vec<String>,
    pub frequency_hours: u32,
    pub auto_publish: bool,
    pub status: BotStatus,
    pub created_at: DateTime<Utc>,
}

/// Creation input for a bot, before the registry assigns an id and
/// timestamps it. Produced by the setup dialog or built directly.
#[derive(Debug, Clone)]
pub struct BotDraft {
    pub owner_id: String,
    pub name: String,
    pub channel_credential: String,
    pub niche: Niche,
    pub sources: Vec<String>,
    pub frequency_hours: u32,
    pub auto_publish: bool,
}

pub const MIN_FREQUENCY_HOURS: u32 = 1;
pub const MAX_FREQUENCY_HOURS: u32 = 24;

impl BotDraft {
    /// Field-level constraint check. Uniqueness of the channel credential
    /// is checked by the registry against the full store.
    pub fn validate(&self) -> Result<()> {
        if self.owner_id.trim().is_empty() {
            return Err(OrchestratorError::Validation("owner id must not be empty".to_string()));
        }
        if self.name.trim().is_empty() {
            return Err(OrchestratorError::Validation("bot name must not be empty".to_string()));
        }
        if self.channel_credential.trim().is_empty() {
            return Err(OrchestratorError::Validation("channel credential must not be empty".to_string()));
        }
        if !(MIN_FREQUENCY_HOURS..=MAX_FREQUENCY_HOURS).contains(&self.frequency_hours) {
            return Err(OrchestratorError::Validation(format!(
                "frequency must be between {} and {} hours, got {}",
                MIN_FREQUENCY_HOURS, MAX_FREQUENCY_HOURS, self.frequency_hours
            )));
        }
        if self.sources.is_empty() {
            return Err(OrchestratorError::Validation("at least one feed source is required".to_string()));
        }
        for source in &self.sources {
            let parsed = url::Url::parse(source)
                .map_err(|e| OrchestratorError::Validation(format!("invalid feed URL {}: {}", source, e)))?;
            if parsed.scheme() != "http" && parsed.scheme() != "https" {
                return Err(OrchestratorError::Validation(format!(
                    "feed URL {} must use http or https",
                    source
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub user_agent: String,
    pub timeout_seconds: u64,
    pub max_retries: u32,
    pub retry_delay_seconds: u64,
    pub max_feed_size_mb: usize,
    pub follow_redirects: bool,
    pub max_redirects: usize,
    pub per_host_delay_ms: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: "NewsBot-Orchestrator/1.0".to_string(),
            timeout_seconds: 30,
            max_retries: 3,
            retry_delay_seconds: 5,
            max_feed_size_mb: 10,
            follow_redirects: true,
            max_redirects: 5,
            per_host_delay_ms: 1000,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("bot not found: {id}")]
    NotFound { id: Uuid },

    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("feed fetch failed: {0}")]
    Fetch(String),

    #[error("feed parse error: {0}")]
    Parse(String),

    #[error("channel error: {0}")]
    Channel(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("another controller instance holds the lock at {path}")]
    AlreadyRunning { path: String },
}

pub type Result<T> = std::result::Result<T, OrchestratorError>;
