use crate::generator::MAX_CANDIDATE_CHARS;
use crate::types::{OrchestratorError, PublishReceipt, Result};
use chrono::Utc;
use serde_json::json;
use std::time::Duration;
use tracing::{error, info};

const DEFAULT_API_BASE: &str = "https://api.twitter.com/2";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Posts approved candidates to the social platform. Without a
/// credential every publish is simulated: logged and receipted with the
/// `simulated` flag set, no network call made.
pub struct Publisher {
    client: reqwest::Client,
    credential: Option<String>,
    api_base: String,
}

impl Publisher {
    pub fn new(credential: Option<String>) -> Result<Self> {
        if credential.is_none() {
            info!("No publishing credential configured; posts will be simulated");
        }
        let client = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            credential,
            api_base: DEFAULT_API_BASE.to_string(),
        })
    }

    pub fn with_api_base(mut self, api_base: String) -> Self {
        self.api_base = api_base;
        self
    }

    pub fn is_simulated(&self) -> bool {
        self.credential.is_none()
    }

    pub async fn publish(&self, text: &str) -> Result<PublishReceipt> {
        if text.trim().is_empty() {
            return Err(OrchestratorError::Validation("post text must not be empty".to_string()));
        }
        let length = text.chars().count();
        if length > MAX_CANDIDATE_CHARS {
            return Err(OrchestratorError::Validation(format!(
                "post text is {} characters, limit is {}",
                length, MAX_CANDIDATE_CHARS
            )));
        }

        let Some(token) = &self.credential else {
            info!("SIMULATED POST: {}", text);
            return Ok(PublishReceipt {
                text: text.to_string(),
                post_id: None,
                simulated: true,
                published_at: Utc::now(),
            });
        };

        let response = self
            .client
            .post(format!("{}/tweets", self.api_base))
            .bearer_auth(token)
            .json(&json!({ "text": text }))
            .send()
            .await
            .map_err(|e| OrchestratorError::BackendUnavailable(format!("publish request failed: {}", e)))?;

        let status = response.status();
        if status != reqwest::StatusCode::CREATED {
            let detail = response.text().await.unwrap_or_default();
            error!("Publish failed with HTTP {}: {}", status, detail);
            return Err(OrchestratorError::BackendUnavailable(format!(
                "publish endpoint returned HTTP {}",
                status
            )));
        }

        let payload: serde_json::Value = response.json().await.unwrap_or_default();
        let post_id = payload["data"]["id"].as_str().map(|s| s.to_string());

        info!("Published post (id: {:?}): {}", post_id, text);
        Ok(PublishReceipt {
            text: text.to_string(),
            post_id,
            simulated: false,
            published_at: Utc::now(),
        })
    }
}
