pub mod channel;
pub mod controller;
pub mod dialog;
pub mod fetcher;
pub mod generator;
pub mod parser;
pub mod publisher;
pub mod registry;
pub mod runtime;
pub mod sources;
pub mod types;
pub mod watermark;

pub use channel::{
    ChannelFactory, ChatChannel, LogChannel, LogChannelFactory, MockChannel, MockChannelFactory,
};
pub use controller::{Command, Controller, ControllerConfig, LifecycleState, OwnerCommand};
pub use dialog::{DialogManager, DialogStep};
pub use fetcher::{FetchOutcome, Fetcher};
pub use generator::{
    OpenAiBackend, SuggestionBackend, SuggestionGenerator, TemplateBackend, MAX_CANDIDATE_CHARS,
};
pub use parser::ArticleParser;
pub use publisher::Publisher;
pub use registry::BotRegistry;
pub use runtime::BotRuntime;
pub use sources::{ArticleSource, RssFeedSource};
pub use types::*;
pub use watermark::WatermarkStore;
