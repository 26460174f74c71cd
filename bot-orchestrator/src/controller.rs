use crate::channel::ChannelFactory;
use crate::dialog::{DialogManager, DialogStep};
use crate::fetcher::Fetcher;
use crate::generator::{OpenAiBackend, SuggestionBackend, SuggestionGenerator};
use crate::publisher::Publisher;
use crate::registry::BotRegistry;
use crate::runtime::BotRuntime;
use crate::sources::{ArticleSource, RssFeedSource};
use crate::types::{BotConfig, BotStatus, FetchConfig, OrchestratorError, Result};
use crate::watermark::WatermarkStore;
use futures::StreamExt;
use std::collections::HashMap;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch, RwLock};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

const DEFAULT_STOP_GRACE: Duration = Duration::from_secs(10);

/// Supervision state of one bot, independent of its persisted status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Stopped,
    Starting,
    Running,
    Stopping,
}

struct Supervised {
    state: LifecycleState,
    shutdown: Option<watch::Sender<bool>>,
    handle: Option<JoinHandle<()>>,
}

/// A chat command against the controller, scoped to one owner.
#[derive(Debug, Clone)]
pub enum Command {
    AddBot,
    Dialog(String),
    CancelDialog,
    ListBots,
    StartBot(Uuid),
    StopBot(Uuid),
    DeleteBot(Uuid),
}

/// Envelope for commands arriving over the controller's command stream.
pub struct OwnerCommand {
    pub owner_id: String,
    pub command: Command,
    pub reply: Option<oneshot::Sender<String>>,
}

impl OwnerCommand {
    pub fn new(owner_id: impl Into<String>, command: Command) -> (Self, oneshot::Receiver<String>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                owner_id: owner_id.into(),
                command,
                reply: Some(tx),
            },
            rx,
        )
    }

    pub fn fire_and_forget(owner_id: impl Into<String>, command: Command) -> Self {
        Self {
            owner_id: owner_id.into(),
            command,
            reply: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ControllerConfig {
    pub state_dir: PathBuf,
    pub fetch: FetchConfig,
    pub generation_api_key: Option<String>,
    pub publish_credential: Option<String>,
    pub approval_timeout: Option<Duration>,
    pub tick_interval: Option<Duration>,
    pub stop_grace: Duration,
}

impl ControllerConfig {
    pub fn new(state_dir: impl Into<PathBuf>) -> Self {
        Self {
            state_dir: state_dir.into(),
            fetch: FetchConfig::default(),
            generation_api_key: None,
            publish_credential: None,
            approval_timeout: None,
            tick_interval: None,
            stop_grace: DEFAULT_STOP_GRACE,
        }
    }

    pub fn with_generation_api_key(mut self, key: Option<String>) -> Self {
        self.generation_api_key = key;
        self
    }

    pub fn with_publish_credential(mut self, credential: Option<String>) -> Self {
        self.publish_credential = credential;
        self
    }

    pub fn with_approval_timeout(mut self, timeout: Duration) -> Self {
        self.approval_timeout = Some(timeout);
        self
    }

    /// Force every runtime's tick interval, overriding `frequency_hours`.
    /// Meant for tests and manual drives.
    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = Some(interval);
        self
    }

    pub fn with_stop_grace(mut self, grace: Duration) -> Self {
        self.stop_grace = grace;
        self
    }

    pub fn with_fetch(mut self, fetch: FetchConfig) -> Self {
        self.fetch = fetch;
        self
    }
}

/// Exclusive lock on the registry store. Only one controller may drive a
/// store at a time; otherwise two instances would double-resume every
/// active bot.
struct InstanceLock {
    path: PathBuf,
}

impl InstanceLock {
    fn acquire(path: PathBuf) -> Result<Self> {
        match std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
        {
            Ok(mut file) => {
                let _ = write!(file, "{}", std::process::id());
                Ok(Self { path })
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                Err(OrchestratorError::AlreadyRunning {
                    path: path.display().to_string(),
                })
            }
            Err(e) => Err(e.into()),
        }
    }
}

impl Drop for InstanceLock {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            warn!("Failed to remove instance lock {}: {}", self.path.display(), e);
        }
    }
}

/// Chat-command front end and supervisor. Owns the supervision table
/// mapping bot id to its runtime handle, and preserves the invariant
/// that a registry entry is `Active` exactly when a runtime is running
/// for it, including across restarts of the whole process.
pub struct Controller {
    registry: Arc<BotRegistry>,
    channels: Arc<dyn ChannelFactory>,
    watermarks: Arc<WatermarkStore>,
    fetcher: Arc<Fetcher>,
    publisher: Arc<Publisher>,
    dialogs: DialogManager,
    supervised: Arc<RwLock<HashMap<Uuid, Supervised>>>,
    generation_api_key: Option<String>,
    approval_timeout: Option<Duration>,
    tick_interval: Option<Duration>,
    stop_grace: Duration,
    _lock: InstanceLock,
}

impl std::fmt::Debug for Controller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Controller").finish_non_exhaustive()
    }
}

impl Controller {
    pub fn new(
        registry: Arc<BotRegistry>,
        channels: Arc<dyn ChannelFactory>,
        config: ControllerConfig,
    ) -> Result<Self> {
        let lock_path = PathBuf::from(format!("{}.lock", registry.path().display()));
        let lock = InstanceLock::acquire(lock_path)?;

        let watermarks = Arc::new(WatermarkStore::open(&config.state_dir)?);
        let fetcher = Arc::new(Fetcher::new(config.fetch)?);
        let publisher = Arc::new(Publisher::new(config.publish_credential)?);

        Ok(Self {
            registry,
            channels,
            watermarks,
            fetcher,
            publisher,
            dialogs: DialogManager::new(),
            supervised: Arc::new(RwLock::new(HashMap::new())),
            generation_api_key: config.generation_api_key,
            approval_timeout: config.approval_timeout,
            tick_interval: config.tick_interval,
            stop_grace: config.stop_grace,
            _lock: lock,
        })
    }

    pub fn registry(&self) -> Arc<BotRegistry> {
        Arc::clone(&self.registry)
    }

    /// Current supervision state; absent from the table means `Stopped`.
    pub async fn lifecycle_state(&self, id: Uuid) -> LifecycleState {
        self.supervised
            .read()
            .await
            .get(&id)
            .map(|s| s.state)
            .unwrap_or(LifecycleState::Stopped)
    }

    /// Start a bot. Idempotent: starting a `Running` or `Starting` bot is
    /// a no-op. Init failure returns the bot to `Stopped`, corrects the
    /// persisted status to `Inactive`, and reports to the owner channel.
    pub async fn start_bot(&self, owner_id: &str, id: Uuid) -> Result<()> {
        let config = self.owned_config(owner_id, id).await?;

        {
            let mut table = self.supervised.write().await;
            match table.get(&id).map(|s| s.state) {
                Some(LifecycleState::Running) | Some(LifecycleState::Starting) => {
                    debug!("Bot {} already running or starting; start is a no-op", id);
                    return Ok(());
                }
                Some(LifecycleState::Stopping) => {
                    return Err(OrchestratorError::Validation(
                        "bot is still stopping, try again shortly".to_string(),
                    ));
                }
                _ => {
                    table.insert(
                        id,
                        Supervised {
                            state: LifecycleState::Starting,
                            shutdown: None,
                            handle: None,
                        },
                    );
                }
            }
        }

        match self.init_runtime(&config).await {
            Ok(runtime) => {
                let (shutdown_tx, shutdown_rx) = watch::channel(false);
                let handle = tokio::spawn(runtime.run(shutdown_rx));

                self.supervised.write().await.insert(
                    id,
                    Supervised {
                        state: LifecycleState::Running,
                        shutdown: Some(shutdown_tx),
                        handle: Some(handle),
                    },
                );
                self.registry.update_status(id, BotStatus::Active).await?;
                info!("Bot '{}' ({}) started", config.name, id);
                Ok(())
            }
            Err(e) => {
                self.supervised.write().await.remove(&id);
                if let Err(heal) = self.registry.update_status(id, BotStatus::Inactive).await {
                    warn!("Failed to mark bot {} inactive after init failure: {}", id, heal);
                }
                error!("Failed to start bot '{}' ({}): {}", config.name, id, e);
                if let Ok(channel) = self.channels.open(&config.channel_credential).await {
                    let _ = channel
                        .notify(&format!("Failed to start bot \"{}\": {}", config.name, e))
                        .await;
                }
                Err(e)
            }
        }
    }

    /// Stop a bot. Idempotent: stopping a `Stopped` or `Stopping` bot is
    /// a no-op; the persisted status ends `Inactive` either way.
    pub async fn stop_bot(&self, owner_id: &str, id: Uuid) -> Result<()> {
        let config = self.owned_config(owner_id, id).await?;

        if self.halt_runtime(id).await {
            info!("Bot '{}' ({}) stopped", config.name, id);
        } else {
            debug!("Bot {} not running; stop is a no-op", id);
        }
        self.registry.update_status(id, BotStatus::Inactive).await
    }

    /// Delete a bot. A running bot is stopped first, then the registry
    /// entry and its watermark are removed.
    pub async fn delete_bot(&self, owner_id: &str, id: Uuid) -> Result<()> {
        let config = self.owned_config(owner_id, id).await?;

        if self.halt_runtime(id).await {
            info!("Stopped bot '{}' ({}) before deletion", config.name, id);
        }
        self.registry.delete(id).await?;
        if let Err(e) = self.watermarks.clear(id).await {
            warn!("Failed to clear watermark for deleted bot {}: {}", id, e);
        }
        info!("Deleted bot '{}' ({})", config.name, id);
        Ok(())
    }

    /// Resume every registry entry persisted as `Active`. A resume
    /// failure is logged and the entry's status is corrected to
    /// `Inactive` rather than left pointing at a runtime that does not
    /// exist. Returns the number of bots resumed.
    pub async fn resume_active(&self) -> usize {
        let to_resume = self.registry.active_bots().await;
        if to_resume.is_empty() {
            info!("No active bots to resume");
            return 0;
        }

        info!("Resuming {} active bot(s)", to_resume.len());
        let mut resumed = 0;
        for config in to_resume {
            match self.start_bot(&config.owner_id, config.id).await {
                Ok(()) => resumed += 1,
                Err(e) => {
                    error!(
                        "Failed to resume bot '{}' ({}): {}; entry marked inactive",
                        config.name, config.id, e
                    );
                }
            }
        }
        resumed
    }

    /// Stop all running bots without touching their persisted status, so
    /// `Active` entries resume on the next process start.
    pub async fn shutdown(&self) {
        let ids: Vec<Uuid> = self.supervised.read().await.keys().copied().collect();
        if ids.is_empty() {
            return;
        }
        info!("Shutting down {} supervised bot(s)", ids.len());
        for id in ids {
            self.halt_runtime(id).await;
        }
    }

    /// Handle one chat command for one owner, returning the reply text.
    pub async fn handle_command(&self, owner_id: &str, command: Command) -> String {
        match command {
            Command::AddBot => self.dialogs.begin(owner_id).await,
            Command::Dialog(text) => match self.dialogs.input(owner_id, &text).await {
                Some(DialogStep::Prompt(prompt)) => prompt,
                Some(DialogStep::Complete(draft)) => {
                    let name = draft.name.clone();
                    match self.registry.create(draft).await {
                        Ok(id) => format!(
                            "Bot \"{}\" created with id {}. Start it with: start {}",
                            name, id, id
                        ),
                        Err(e) => format!("Could not create bot: {}", e),
                    }
                }
                None => "No setup in progress. Send 'add' to create a bot.".to_string(),
            },
            Command::CancelDialog => {
                if self.dialogs.cancel(owner_id).await {
                    "Setup cancelled.".to_string()
                } else {
                    "Nothing to cancel.".to_string()
                }
            }
            Command::ListBots => self.render_bot_list(owner_id).await,
            Command::StartBot(id) => match self.start_bot(owner_id, id).await {
                Ok(()) => format!("Bot {} is running.", id),
                Err(e) => format!("Could not start bot {}: {}", id, e),
            },
            Command::StopBot(id) => match self.stop_bot(owner_id, id).await {
                Ok(()) => format!("Bot {} is stopped.", id),
                Err(e) => format!("Could not stop bot {}: {}", id, e),
            },
            Command::DeleteBot(id) => match self.delete_bot(owner_id, id).await {
                Ok(()) => format!("Bot {} deleted.", id),
                Err(e) => format!("Could not delete bot {}: {}", id, e),
            },
        }
    }

    /// Drain the command stream until every sender is gone. Each command
    /// is handled to completion before the next is taken, so registry
    /// mutations stay serialized through one place.
    pub async fn serve(&self, commands: mpsc::UnboundedReceiver<OwnerCommand>) {
        let mut stream = UnboundedReceiverStream::new(commands);
        while let Some(command) = stream.next().await {
            let reply = self.handle_command(&command.owner_id, command.command).await;
            match command.reply {
                Some(tx) => {
                    let _ = tx.send(reply);
                }
                None => info!("[{}] {}", command.owner_id, reply),
            }
        }
        info!("Command stream closed; controller serve loop exiting");
    }

    async fn owned_config(&self, owner_id: &str, id: Uuid) -> Result<BotConfig> {
        let config = self.registry.get(id).await?;
        // Other owners' bots are indistinguishable from absent ones.
        if config.owner_id != owner_id {
            return Err(OrchestratorError::NotFound { id });
        }
        Ok(config)
    }

    async fn init_runtime(&self, config: &BotConfig) -> Result<BotRuntime> {
        let channel = self.channels.open(&config.channel_credential).await?;

        let sources: Vec<Box<dyn ArticleSource>> = config
            .sources
            .iter()
            .map(|url| {
                Box::new(RssFeedSource::new(url.clone(), Arc::clone(&self.fetcher)))
                    as Box<dyn ArticleSource>
            })
            .collect();

        let backend: Option<Box<dyn SuggestionBackend>> = match &self.generation_api_key {
            Some(key) => Some(Box::new(OpenAiBackend::new(key.clone())?)),
            None => None,
        };
        let generator = SuggestionGenerator::new(backend);

        let mut runtime = BotRuntime::initialize(
            config.clone(),
            sources,
            generator,
            Arc::clone(&self.publisher),
            channel,
            Arc::clone(&self.watermarks),
        )
        .await?;

        if let Some(interval) = self.tick_interval {
            runtime = runtime.with_tick_interval(interval);
        }
        if let Some(timeout) = self.approval_timeout {
            runtime = runtime.with_approval_timeout(timeout);
        }
        Ok(runtime)
    }

    /// Signal a running runtime and wait for it to drain. Returns false
    /// when there was nothing to halt.
    async fn halt_runtime(&self, id: Uuid) -> bool {
        let (shutdown, handle) = {
            let mut table = self.supervised.write().await;
            match table.get_mut(&id) {
                Some(sup) if sup.state == LifecycleState::Running => {
                    sup.state = LifecycleState::Stopping;
                    (sup.shutdown.take(), sup.handle.take())
                }
                _ => return false,
            }
        };

        if let Some(tx) = shutdown {
            let _ = tx.send(true);
        }
        if let Some(mut handle) = handle {
            if tokio::time::timeout(self.stop_grace, &mut handle).await.is_err() {
                warn!("Bot {} did not stop within {:?}; aborting task", id, self.stop_grace);
                handle.abort();
            }
        }

        self.supervised.write().await.remove(&id);
        true
    }

    async fn render_bot_list(&self, owner_id: &str) -> String {
        let bots = self.registry.list(owner_id).await;
        if bots.is_empty() {
            return "You don't have any bots yet. Send 'add' to create one.".to_string();
        }

        let mut out = String::from("Your bots:\n");
        for config in bots {
            let state = self.lifecycle_state(config.id).await;
            let state_label = match state {
                LifecycleState::Running => "running",
                LifecycleState::Starting => "starting",
                LifecycleState::Stopping => "stopping",
                LifecycleState::Stopped => "stopped",
            };
            let mode = if config.auto_publish {
                "auto-publish"
            } else {
                "manual approval"
            };
            out.push_str(&format!(
                "- {} ({})\n    niche: {} | every {}h | {} | {}\n",
                config.name,
                config.id,
                config.niche.label(),
                config.frequency_hours,
                mode,
                state_label
            ));
        }
        out
    }
}
