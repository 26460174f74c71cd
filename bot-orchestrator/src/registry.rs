use crate::types::{BotConfig, BotDraft, BotStatus, OrchestratorError, Result};
use crate::watermark::write_atomic;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreFile {
    bots: HashMap<Uuid, BotConfig>,
}

/// Durable registry of bot configurations.
///
/// The whole store is one JSON file keyed by bot id: loaded wholesale at
/// open, rewritten wholesale (temp file + rename) on every mutation. A
/// mutex serializes every read-modify-write, so no partial record can
/// ever reach disk. The in-memory map is only committed after the
/// rewritten store has landed.
pub struct BotRegistry {
    path: PathBuf,
    store: Mutex<HashMap<Uuid, BotConfig>>,
}

impl BotRegistry {
    /// Load the registry from `path`, creating an empty store file if
    /// none exists yet.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let bots = match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let file: StoreFile = serde_json::from_slice(&bytes)?;
                file.bots
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let empty = StoreFile::default();
                write_atomic(&path, &serde_json::to_vec_pretty(&empty)?).await?;
                empty.bots
            }
            Err(e) => return Err(e.into()),
        };

        info!("Loaded bot registry from {} ({} bots)", path.display(), bots.len());
        Ok(Self {
            path,
            store: Mutex::new(bots),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Validate the draft, assign an id, and persist. The store on disk
    /// either contains the complete new record or is untouched.
    pub async fn create(&self, draft: BotDraft) -> Result<Uuid> {
        draft.validate()?;

        let mut store = self.store.lock().await;

        if store
            .values()
            .any(|existing| existing.channel_credential == draft.channel_credential)
        {
            return Err(OrchestratorError::Validation(
                "channel credential is already used by another bot".to_string(),
            ));
        }

        let config = BotConfig {
            id: Uuid::new_v4(),
            owner_id: draft.owner_id,
            name: draft.name,
            channel_credential: draft.channel_credential,
            niche: draft.niche,
            sources: draft.sources,
            frequency_hours: draft.frequency_hours,
            auto_publish: draft.auto_publish,
            status: BotStatus::Inactive,
            created_at: Utc::now(),
        };
        let id = config.id;

        let mut next = store.clone();
        next.insert(id, config);
        self.persist(&next).await?;
        *store = next;

        info!("Created bot {} ({})", id, store[&id].name);
        Ok(id)
    }

    /// All bots owned by `owner_id`, in insertion order.
    pub async fn list(&self, owner_id: &str) -> Vec<BotConfig> {
        let store = self.store.lock().await;
        let mut bots: Vec<BotConfig> = store
            .values()
            .filter(|config| config.owner_id == owner_id)
            .cloned()
            .collect();
        bots.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        bots
    }

    pub async fn get(&self, id: Uuid) -> Result<BotConfig> {
        let store = self.store.lock().await;
        store
            .get(&id)
            .cloned()
            .ok_or(OrchestratorError::NotFound { id })
    }

    /// Flip a bot's persisted status. Setting the status it already has
    /// is a no-op, not an error.
    pub async fn update_status(&self, id: Uuid, status: BotStatus) -> Result<()> {
        let mut store = self.store.lock().await;
        let current = store.get(&id).ok_or(OrchestratorError::NotFound { id })?;

        if current.status == status {
            debug!("Bot {} already {:?}", id, status);
            return Ok(());
        }

        let mut next = store.clone();
        if let Some(config) = next.get_mut(&id) {
            config.status = status;
        }
        self.persist(&next).await?;
        *store = next;

        debug!("Bot {} status set to {:?}", id, status);
        Ok(())
    }

    /// Replace the editable fields of an existing bot. Does not touch a
    /// running runtime; edits take effect on the next start.
    pub async fn update(&self, id: Uuid, draft: BotDraft) -> Result<()> {
        draft.validate()?;

        let mut store = self.store.lock().await;
        if !store.contains_key(&id) {
            return Err(OrchestratorError::NotFound { id });
        }

        if store
            .values()
            .any(|other| other.id != id && other.channel_credential == draft.channel_credential)
        {
            return Err(OrchestratorError::Validation(
                "channel credential is already used by another bot".to_string(),
            ));
        }

        let mut next = store.clone();
        if let Some(config) = next.get_mut(&id) {
            config.name = draft.name;
            config.channel_credential = draft.channel_credential;
            config.niche = draft.niche;
            config.sources = draft.sources;
            config.frequency_hours = draft.frequency_hours;
            config.auto_publish = draft.auto_publish;
        }
        self.persist(&next).await?;
        *store = next;

        info!("Updated bot {}", id);
        Ok(())
    }

    pub async fn delete(&self, id: Uuid) -> Result<()> {
        let mut store = self.store.lock().await;
        if !store.contains_key(&id) {
            return Err(OrchestratorError::NotFound { id });
        }

        let mut next = store.clone();
        next.remove(&id);
        self.persist(&next).await?;
        *store = next;

        info!("Deleted bot {}", id);
        Ok(())
    }

    /// Bots persisted as `Active`, in insertion order: the controller's
    /// resume list at startup.
    pub async fn active_bots(&self) -> Vec<BotConfig> {
        let store = self.store.lock().await;
        let mut bots: Vec<BotConfig> = store
            .values()
            .filter(|config| config.status == BotStatus::Active)
            .cloned()
            .collect();
        bots.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        bots
    }

    async fn persist(&self, bots: &HashMap<Uuid, BotConfig>) -> Result<()> {
        let file = StoreFile { bots: bots.clone() };
        write_atomic(&self.path, &serde_json::to_vec_pretty(&file)?).await
    }
}
