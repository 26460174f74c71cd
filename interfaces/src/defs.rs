use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single item pulled from a news source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    pub title: String,
    pub link: String,
    pub summary: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub source: Option<String>,
}

/// Outcome of handing one text candidate to the publishing side.
///
/// `simulated` marks receipts produced without any network effect (no
/// publishing credential configured); callers report these distinctly
/// from real publishes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishReceipt {
    pub text: String,
    pub post_id: Option<String>,
    pub simulated: bool,
    pub published_at: DateTime<Utc>,
}

/// One article plus its candidate texts, presented to a bot owner for
/// manual approval.
#[derive(Debug, Clone)]
pub struct ApprovalRequest {
    pub article: Article,
    pub candidates: Vec<String>,
}

/// The owner's answer to an [`ApprovalRequest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalReply {
    /// Publish the candidate at this zero-based index.
    Select(usize),
    /// Drop the article without publishing.
    Skip,
}

// Object style note:
// Everything in this module is a plain data contract crossing a process
// or collaborator seam. Behavior (fetching, generating, publishing,
// channel transport) lives behind traits in the consuming crate; these
// types stay free of any transport or backend detail.
