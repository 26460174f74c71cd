use crate::types::{Article, OrchestratorError, Result};
use async_trait::async_trait;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Hard ceiling imposed by the publishing side.
pub const MAX_CANDIDATE_CHARS: usize = 280;

const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-3.5-turbo";
const BACKEND_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_CANDIDATES: usize = 3;

/// Trait for backends that turn one article into an ordered list of
/// short post candidates.
#[async_trait]
pub trait SuggestionBackend: Send + Sync {
    /// Get the name of this backend
    fn backend_name(&self) -> String;

    /// Produce candidates for one article, best first
    async fn suggest(&self, article: &Article) -> Result<Vec<String>>;
}

/// Chat-completions backend. Asks for three numbered post texts and
/// parses them out of the reply.
pub struct OpenAiBackend {
    client: reqwest::Client,
    api_key: String,
    api_base: String,
    model: String,
}

impl OpenAiBackend {
    pub fn new(api_key: String) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(BACKEND_TIMEOUT).build()?;
        Ok(Self {
            client,
            api_key,
            api_base: DEFAULT_API_BASE.to_string(),
            model: DEFAULT_MODEL.to_string(),
        })
    }

    pub fn with_api_base(mut self, api_base: String) -> Self {
        self.api_base = api_base;
        self
    }

    pub fn with_model(mut self, model: String) -> Self {
        self.model = model;
        self
    }

    fn build_prompt(article: &Article) -> String {
        format!(
            "Read this news article and create {} engaging social media posts about it.\n\n\
             ARTICLE HEADLINE: {}\n\n\
             ARTICLE SUMMARY:\n{}\n\n\
             ARTICLE LINK: {}\n\n\
             INSTRUCTIONS:\n\
             - Create {} unique, engaging posts (max 270 characters each)\n\
             - Include relevant hashtags\n\
             - Do not just copy sentences from the article\n\n\
             Format your response as:\n\
             1. [First post]\n\
             2. [Second post]\n\
             3. [Third post]",
            MAX_CANDIDATES,
            article.title,
            article.summary.as_deref().unwrap_or(""),
            article.link,
            MAX_CANDIDATES,
        )
    }

    /// Extract numbered lines ("1. ...") from the model reply.
    fn parse_candidates(content: &str) -> Vec<String> {
        let mut candidates = Vec::new();
        for line in content.lines() {
            let line = line.trim();
            let Some(rest) = line
                .strip_prefix("1.")
                .or_else(|| line.strip_prefix("2."))
                .or_else(|| line.strip_prefix("3."))
            else {
                continue;
            };
            let candidate = rest.trim();
            if !candidate.is_empty() {
                candidates.push(candidate.to_string());
            }
        }
        candidates
    }
}

#[async_trait]
impl SuggestionBackend for OpenAiBackend {
    fn backend_name(&self) -> String {
        format!("openai ({})", self.model)
    }

    async fn suggest(&self, article: &Article) -> Result<Vec<String>> {
        let body = json!({
            "model": self.model,
            "messages": [
                {
                    "role": "system",
                    "content": "You are a social media expert who creates engaging posts from news articles."
                },
                { "role": "user", "content": Self::build_prompt(article) }
            ],
            "max_tokens": 400,
            "temperature": 0.7,
        });

        let response = self
            .client
            .post(format!("{}/chat/completions", self.api_base))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| OrchestratorError::BackendUnavailable(format!("generation request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(OrchestratorError::BackendUnavailable(format!(
                "generation backend returned HTTP {}",
                status
            )));
        }

        let payload: serde_json::Value = response
            .json()
            .await
            .map_err(|e| OrchestratorError::BackendUnavailable(format!("malformed generation response: {}", e)))?;

        let content = payload["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| {
                OrchestratorError::BackendUnavailable("generation response missing content".to_string())
            })?;

        let candidates: Vec<String> = Self::parse_candidates(content)
            .into_iter()
            .filter(|c| c.chars().count() <= MAX_CANDIDATE_CHARS)
            .take(MAX_CANDIDATES)
            .collect();

        if candidates.is_empty() {
            return Err(OrchestratorError::BackendUnavailable(
                "generation backend produced no usable candidates".to_string(),
            ));
        }

        debug!("Generated {} candidates for \"{}\"", candidates.len(), article.title);
        Ok(candidates)
    }
}

/// Deterministic template backend. Always succeeds and never produces an
/// empty list for a titled article.
pub struct TemplateBackend;

impl TemplateBackend {
    pub fn render(&self, article: &Article) -> Vec<String> {
        let mut candidates = Vec::new();

        candidates.push(fit_with_link(&article.title, &article.link));

        if let Some(source) = &article.source {
            candidates.push(fit_with_link(
                &format!("New from {}: {}", source, article.title),
                &article.link,
            ));
        }

        if let Some(summary) = &article.summary {
            candidates.push(fit_with_link(
                &format!("{}: {}", article.title, summary),
                &article.link,
            ));
        }

        candidates.dedup();
        candidates.retain(|c| !c.trim().is_empty());
        candidates
    }
}

#[async_trait]
impl SuggestionBackend for TemplateBackend {
    fn backend_name(&self) -> String {
        "template".to_string()
    }

    async fn suggest(&self, article: &Article) -> Result<Vec<String>> {
        Ok(self.render(article))
    }
}

/// Front door for candidate generation. Tries the configured backend and
/// degrades to templates when the backend is absent, fails, or returns
/// nothing. Callers never see a generation error.
pub struct SuggestionGenerator {
    backend: Option<Box<dyn SuggestionBackend>>,
    template: TemplateBackend,
}

impl SuggestionGenerator {
    pub fn new(backend: Option<Box<dyn SuggestionBackend>>) -> Self {
        match &backend {
            Some(b) => info!("Suggestion generator using backend: {}", b.backend_name()),
            None => info!("No generation backend configured; using templates"),
        }
        Self {
            backend,
            template: TemplateBackend,
        }
    }

    pub fn template_only() -> Self {
        Self::new(None)
    }

    pub async fn candidates(&self, article: &Article) -> Vec<String> {
        if let Some(backend) = &self.backend {
            match backend.suggest(article).await {
                Ok(candidates) if !candidates.is_empty() => return candidates,
                Ok(_) => warn!(
                    "Backend {} returned no candidates for \"{}\"; falling back to templates",
                    backend.backend_name(),
                    article.title
                ),
                Err(e) => warn!(
                    "Backend {} unavailable ({}); falling back to templates",
                    backend.backend_name(),
                    e
                ),
            }
        }
        self.template.render(article)
    }
}

/// Truncate `text` so that it and the trailing link fit in the candidate
/// budget, breaking at a word boundary where possible.
fn fit_with_link(text: &str, link: &str) -> String {
    let link_len = link.chars().count() + 1;
    if link_len >= MAX_CANDIDATE_CHARS {
        // Link alone blows the budget; fall back to bare text.
        return truncate_chars(text, MAX_CANDIDATE_CHARS);
    }

    let budget = MAX_CANDIDATE_CHARS - link_len;
    if budget < 4 {
        // No room for meaningful text next to the link.
        return link.to_string();
    }
    let body = if text.chars().count() <= budget {
        text.to_string()
    } else {
        let hard: String = text.chars().take(budget.saturating_sub(3)).collect();
        match hard.rfind(' ') {
            Some(pos) if pos > budget / 2 => format!("{}...", &hard[..pos]),
            _ => format!("{}...", hard),
        }
    };

    format!("{} {}", body.trim_end(), link)
}

fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        text.chars().take(max).collect()
    }
}
