use anyhow::Context;
use bot_orchestrator::{
    BotRegistry, Command, Controller, ControllerConfig, LogChannelFactory, OwnerCommand,
};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{error, info};
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(
    name = "bot-orchestrator",
    about = "Supervises news bots that turn RSS articles into post suggestions"
)]
struct Cli {
    /// Path to the bot registry store
    #[arg(long, default_value = "bot_registry.json")]
    registry: PathBuf,

    /// Directory for per-bot runtime state (watermarks)
    #[arg(long, default_value = "bot_state")]
    state_dir: PathBuf,

    /// Owner id used for commands entered on stdin
    #[arg(long, default_value = "operator")]
    owner: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();

    // Credentials come from the environment; both are optional and the
    // system degrades (templates, simulated publishes) without them.
    let generation_api_key = std::env::var("OPENAI_API_KEY").ok();
    let publish_credential = std::env::var("X_BEARER_TOKEN").ok();

    info!("Starting bot orchestrator (registry: {})", cli.registry.display());

    let registry = Arc::new(
        BotRegistry::open(&cli.registry)
            .await
            .context("failed to open bot registry")?,
    );

    let config = ControllerConfig::new(&cli.state_dir)
        .with_generation_api_key(generation_api_key)
        .with_publish_credential(publish_credential);

    let controller = Arc::new(
        Controller::new(registry, Arc::new(LogChannelFactory), config)
            .context("failed to initialize controller")?,
    );

    let resumed = controller.resume_active().await;
    if resumed > 0 {
        info!("Resumed {} bot(s)", resumed);
    }

    let (command_tx, command_rx) = mpsc::unbounded_channel();
    let serve_controller = Arc::clone(&controller);
    let serve_task = tokio::spawn(async move { serve_controller.serve(command_rx).await });

    println!("Commands: add | list | start <id> | stop <id> | delete <id> | cancel | quit");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupt received; shutting down");
                break;
            }
            line = lines.next_line() => {
                match line {
                    Ok(Some(line)) => {
                        let line = line.trim().to_string();
                        if line.is_empty() {
                            continue;
                        }
                        if line.eq_ignore_ascii_case("quit") || line.eq_ignore_ascii_case("exit") {
                            break;
                        }
                        match parse_command(&line) {
                            Ok(command) => {
                                let (envelope, reply) = OwnerCommand::new(cli.owner.clone(), command);
                                if command_tx.send(envelope).is_err() {
                                    break;
                                }
                                if let Ok(reply) = reply.await {
                                    println!("{}", reply);
                                }
                            }
                            Err(message) => println!("{}", message),
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        error!("stdin error: {}", e);
                        break;
                    }
                }
            }
        }
    }

    drop(command_tx);
    controller.shutdown().await;
    serve_task.await.ok();
    info!("Bot orchestrator stopped");
    Ok(())
}

/// Map one stdin line to a controller command. Unrecognized lines are
/// fed to the setup dialog, which answers with a hint when no setup is
/// in progress.
fn parse_command(line: &str) -> std::result::Result<Command, String> {
    let mut parts = line.split_whitespace();
    let head = parts.next().unwrap_or_default().to_lowercase();
    match head.as_str() {
        "add" | "addbot" => Ok(Command::AddBot),
        "list" | "listbots" => Ok(Command::ListBots),
        "cancel" => Ok(Command::CancelDialog),
        "start" | "stop" | "delete" => {
            let id = parts
                .next()
                .ok_or_else(|| format!("Usage: {} <bot-id>", head))?;
            let id =
                Uuid::parse_str(id).map_err(|_| format!("'{}' is not a valid bot id", id))?;
            Ok(match head.as_str() {
                "start" => Command::StartBot(id),
                "stop" => Command::StopBot(id),
                _ => Command::DeleteBot(id),
            })
        }
        _ => Ok(Command::Dialog(line.to_string())),
    }
}
