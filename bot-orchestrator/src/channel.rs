use crate::types::{ApprovalReply, ApprovalRequest, OrchestratorError, Result};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

/// Trait for the chat surface a bot talks to its owner through.
#[async_trait]
pub trait ChatChannel: Send + Sync {
    /// Send a one-way status message to the owner
    async fn notify(&self, text: &str) -> Result<()>;

    /// Present candidates for one article and wait for the owner's
    /// selection or skip. Callers bound this with their own timeout.
    async fn request_approval(&self, request: ApprovalRequest) -> Result<ApprovalReply>;
}

/// Opens a [`ChatChannel`] for a bot's channel credential. Failing here
/// fails runtime initialization, returning the bot to `Stopped`.
#[async_trait]
pub trait ChannelFactory: Send + Sync {
    async fn open(&self, credential: &str) -> Result<Arc<dyn ChatChannel>>;
}

/// Channel that logs notifications and skips every approval. Default
/// wiring for the binary when no real chat transport is attached.
pub struct LogChannel {
    label: String,
}

impl LogChannel {
    pub fn new(label: String) -> Self {
        Self { label }
    }
}

#[async_trait]
impl ChatChannel for LogChannel {
    async fn notify(&self, text: &str) -> Result<()> {
        info!("[{}] {}", self.label, text);
        Ok(())
    }

    async fn request_approval(&self, request: ApprovalRequest) -> Result<ApprovalReply> {
        info!(
            "[{}] approval requested for \"{}\" ({} candidates); skipping",
            self.label,
            request.article.title,
            request.candidates.len()
        );
        Ok(ApprovalReply::Skip)
    }
}

pub struct LogChannelFactory;

#[async_trait]
impl ChannelFactory for LogChannelFactory {
    async fn open(&self, credential: &str) -> Result<Arc<dyn ChatChannel>> {
        if credential.trim().is_empty() {
            return Err(OrchestratorError::Channel("empty channel credential".to_string()));
        }
        Ok(Arc::new(LogChannel::new(credential.to_string())))
    }
}

/// Scripted channel for development and testing. Records every
/// notification and approval request, and answers approvals from a
/// configured reply queue (defaulting to `Skip` once the queue drains).
pub struct MockChannel {
    notifications: Mutex<Vec<String>>,
    requests: Mutex<Vec<ApprovalRequest>>,
    replies: Mutex<VecDeque<ApprovalReply>>,
    reply_delay_ms: u64,
}

impl MockChannel {
    pub fn new() -> Self {
        Self {
            notifications: Mutex::new(Vec::new()),
            requests: Mutex::new(Vec::new()),
            replies: Mutex::new(VecDeque::new()),
            reply_delay_ms: 0,
        }
    }

    pub fn with_reply(self, reply: ApprovalReply) -> Self {
        self.replies.try_lock().expect("unshared at build time").push_back(reply);
        self
    }

    /// Delay each approval answer, for exercising caller timeouts.
    pub fn with_reply_delay(mut self, delay_ms: u64) -> Self {
        self.reply_delay_ms = delay_ms;
        self
    }

    pub async fn notifications(&self) -> Vec<String> {
        self.notifications.lock().await.clone()
    }

    pub async fn approval_requests(&self) -> Vec<ApprovalRequest> {
        self.requests.lock().await.clone()
    }
}

impl Default for MockChannel {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChatChannel for MockChannel {
    async fn notify(&self, text: &str) -> Result<()> {
        self.notifications.lock().await.push(text.to_string());
        Ok(())
    }

    async fn request_approval(&self, request: ApprovalRequest) -> Result<ApprovalReply> {
        self.requests.lock().await.push(request);
        if self.reply_delay_ms > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(self.reply_delay_ms)).await;
        }
        let reply = self.replies.lock().await.pop_front().unwrap_or(ApprovalReply::Skip);
        Ok(reply)
    }
}

/// Factory handing out one shared [`MockChannel`], optionally failing
/// every open to simulate runtime-init failure.
pub struct MockChannelFactory {
    channel: Arc<MockChannel>,
    fail_opens: bool,
}

impl MockChannelFactory {
    pub fn new(channel: Arc<MockChannel>) -> Self {
        Self {
            channel,
            fail_opens: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            channel: Arc::new(MockChannel::new()),
            fail_opens: true,
        }
    }

    pub fn channel(&self) -> Arc<MockChannel> {
        Arc::clone(&self.channel)
    }
}

#[async_trait]
impl ChannelFactory for MockChannelFactory {
    async fn open(&self, credential: &str) -> Result<Arc<dyn ChatChannel>> {
        if self.fail_opens {
            return Err(OrchestratorError::Channel(format!(
                "channel refused credential {}",
                credential
            )));
        }
        Ok(self.channel.clone())
    }
}
