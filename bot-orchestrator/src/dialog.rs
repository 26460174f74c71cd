use crate::types::{BotDraft, Niche, MAX_FREQUENCY_HOURS, MIN_FREQUENCY_HOURS};
use std::collections::HashMap;
use tokio::sync::Mutex;
use tracing::debug;

/// Which field the wizard is collecting next. Dialog progress is its own
/// state machine, fully separate from bot lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Name,
    Credential,
    Niche,
    Frequency,
    Sources,
    PostingMode,
}

#[derive(Debug, Default)]
struct PartialDraft {
    name: Option<String>,
    credential: Option<String>,
    niche: Option<Niche>,
    frequency_hours: Option<u32>,
    sources: Option<Vec<String>>,
}

/// One owner's in-progress add-bot conversation.
struct Dialog {
    step: Step,
    draft: PartialDraft,
}

/// Result of feeding one owner message into the wizard.
#[derive(Debug, Clone)]
pub enum DialogStep {
    /// Reply to send back; the dialog stays open.
    Prompt(String),
    /// All fields collected; hand the draft to the registry.
    Complete(BotDraft),
}

impl Dialog {
    fn new() -> Self {
        Self {
            step: Step::Name,
            draft: PartialDraft::default(),
        }
    }

    fn opening_prompt() -> String {
        "Let's set up a new bot. What should it be called?".to_string()
    }

    /// Advance the wizard with one owner message. Invalid input
    /// re-prompts without losing collected fields.
    fn advance(&mut self, owner_id: &str, input: &str) -> DialogStep {
        let input = input.trim();

        match self.step {
            Step::Name => {
                if input.is_empty() {
                    return DialogStep::Prompt("The name can't be empty. What should the bot be called?".to_string());
                }
                self.draft.name = Some(input.to_string());
                self.step = Step::Credential;
                DialogStep::Prompt(format!(
                    "'{}' it is. Now paste the bot's own channel token:",
                    input
                ))
            }
            Step::Credential => {
                if input.is_empty() || input.contains(char::is_whitespace) {
                    return DialogStep::Prompt(
                        "That doesn't look like a token. Paste the bot's channel token:".to_string(),
                    );
                }
                self.draft.credential = Some(input.to_string());
                self.step = Step::Niche;
                DialogStep::Prompt(
                    "Token saved. Which niche should the bot cover? (tech, crypto, ai, general, custom)"
                        .to_string(),
                )
            }
            Step::Niche => match Niche::parse(input) {
                Some(niche) => {
                    self.draft.niche = Some(niche);
                    self.step = Step::Frequency;
                    DialogStep::Prompt(format!(
                        "{} selected. How often should it check for news, in hours ({}-{})?",
                        niche.label(),
                        MIN_FREQUENCY_HOURS,
                        MAX_FREQUENCY_HOURS
                    ))
                }
                None => DialogStep::Prompt(
                    "Please pick one of: tech, crypto, ai, general, custom.".to_string(),
                ),
            },
            Step::Frequency => match input.parse::<u32>() {
                Ok(hours) if (MIN_FREQUENCY_HOURS..=MAX_FREQUENCY_HOURS).contains(&hours) => {
                    self.draft.frequency_hours = Some(hours);
                    self.step = Step::Sources;
                    let niche = self.draft.niche.unwrap_or(Niche::Custom);
                    if niche == Niche::Custom {
                        DialogStep::Prompt(
                            "Custom niche needs its own feeds. Enter RSS feed URLs, one per line:".to_string(),
                        )
                    } else {
                        DialogStep::Prompt(format!(
                            "Every {} hour(s). Reply 'default' to use the standard {} feeds, \
                             or enter RSS feed URLs, one per line:",
                            hours,
                            niche.label()
                        ))
                    }
                }
                _ => DialogStep::Prompt(format!(
                    "Frequency must be a whole number between {} and {} hours. Try again:",
                    MIN_FREQUENCY_HOURS, MAX_FREQUENCY_HOURS
                )),
            },
            Step::Sources => {
                let niche = self.draft.niche.unwrap_or(Niche::Custom);
                let sources: Vec<String> = if input.eq_ignore_ascii_case("default") {
                    niche.default_sources().iter().map(|s| s.to_string()).collect()
                } else {
                    input
                        .lines()
                        .map(|line| line.trim().to_string())
                        .filter(|line| !line.is_empty())
                        .collect()
                };

                if sources.is_empty() {
                    return DialogStep::Prompt(if niche == Niche::Custom {
                        "A custom bot needs at least one feed URL. Enter them one per line:".to_string()
                    } else {
                        "No feeds given. Reply 'default' or enter feed URLs, one per line:".to_string()
                    });
                }

                for source in &sources {
                    match url::Url::parse(source) {
                        Ok(parsed) if parsed.scheme() == "http" || parsed.scheme() == "https" => {}
                        _ => {
                            return DialogStep::Prompt(format!(
                                "'{}' is not a valid http(s) URL. Enter feed URLs, one per line:",
                                source
                            ))
                        }
                    }
                }

                self.draft.sources = Some(sources);
                self.step = Step::PostingMode;
                DialogStep::Prompt(
                    "Last step: should posts go out automatically, or wait for your approval? \
                     (auto / manual)"
                        .to_string(),
                )
            }
            Step::PostingMode => {
                let auto_publish = match input.to_lowercase().as_str() {
                    "auto" | "automatic" | "yes" => true,
                    "manual" | "approval" | "no" => false,
                    _ => {
                        return DialogStep::Prompt("Please answer 'auto' or 'manual'.".to_string());
                    }
                };

                DialogStep::Complete(BotDraft {
                    owner_id: owner_id.to_string(),
                    name: self.draft.name.clone().unwrap_or_default(),
                    channel_credential: self.draft.credential.clone().unwrap_or_default(),
                    niche: self.draft.niche.unwrap_or(Niche::General),
                    sources: self.draft.sources.clone().unwrap_or_default(),
                    frequency_hours: self.draft.frequency_hours.unwrap_or(MIN_FREQUENCY_HOURS),
                    auto_publish,
                })
            }
        }
    }
}

/// Tracks one in-progress setup dialog per owner.
pub struct DialogManager {
    sessions: Mutex<HashMap<String, Dialog>>,
}

impl DialogManager {
    pub fn new() -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Start (or restart) the wizard for an owner and return the opening
    /// prompt.
    pub async fn begin(&self, owner_id: &str) -> String {
        let mut sessions = self.sessions.lock().await;
        sessions.insert(owner_id.to_string(), Dialog::new());
        debug!("Started setup dialog for {}", owner_id);
        Dialog::opening_prompt()
    }

    /// Feed one owner message into their open dialog. `None` when no
    /// dialog is in progress for this owner.
    pub async fn input(&self, owner_id: &str, text: &str) -> Option<DialogStep> {
        let mut sessions = self.sessions.lock().await;
        let dialog = sessions.get_mut(owner_id)?;
        let step = dialog.advance(owner_id, text);
        if matches!(step, DialogStep::Complete(_)) {
            sessions.remove(owner_id);
            debug!("Completed setup dialog for {}", owner_id);
        }
        Some(step)
    }

    pub async fn cancel(&self, owner_id: &str) -> bool {
        let mut sessions = self.sessions.lock().await;
        sessions.remove(owner_id).is_some()
    }

    pub async fn is_active(&self, owner_id: &str) -> bool {
        let sessions = self.sessions.lock().await;
        sessions.contains_key(owner_id)
    }
}

impl Default for DialogManager {
    fn default() -> Self {
        Self::new()
    }
}
