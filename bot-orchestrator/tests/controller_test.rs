mod common;

use bot_orchestrator::types::{BotStatus, OrchestratorError, Result};
use bot_orchestrator::{
    BotRegistry, Command, Controller, ControllerConfig, LifecycleState, MockChannel,
    MockChannelFactory,
};
use common::{draft, init_tracing, temp_path};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

async fn build_controller(
    registry_path: &Path,
    state_dir: &Path,
    factory: Arc<MockChannelFactory>,
) -> Result<Controller> {
    let registry = Arc::new(BotRegistry::open(registry_path).await?);
    let config = ControllerConfig::new(state_dir)
        // Long tick so no runtime actually fetches during these tests.
        .with_tick_interval(Duration::from_secs(3600))
        .with_stop_grace(Duration::from_secs(2));
    Controller::new(registry, factory, config)
}

fn mock_factory() -> Arc<MockChannelFactory> {
    Arc::new(MockChannelFactory::new(Arc::new(MockChannel::new())))
}

#[tokio::test]
async fn start_is_idempotent_and_tracks_registry_status() -> Result<()> {
    init_tracing();
    let registry_path = temp_path("controller-start").with_extension("json");
    let state_dir = temp_path("controller-start-state");
    let controller = build_controller(&registry_path, &state_dir, mock_factory()).await?;

    let id = controller.registry().create(draft("alice", "Starter", "token-start")).await?;
    assert_eq!(controller.lifecycle_state(id).await, LifecycleState::Stopped);

    controller.start_bot("alice", id).await?;
    assert_eq!(controller.lifecycle_state(id).await, LifecycleState::Running);
    assert_eq!(controller.registry().get(id).await?.status, BotStatus::Active);

    // Starting a running bot is a no-op, not an error.
    controller.start_bot("alice", id).await?;
    assert_eq!(controller.lifecycle_state(id).await, LifecycleState::Running);

    controller.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn stop_is_idempotent() -> Result<()> {
    init_tracing();
    let registry_path = temp_path("controller-stop").with_extension("json");
    let state_dir = temp_path("controller-stop-state");
    let controller = build_controller(&registry_path, &state_dir, mock_factory()).await?;

    let id = controller.registry().create(draft("alice", "Stopper", "token-stop")).await?;
    controller.start_bot("alice", id).await?;

    controller.stop_bot("alice", id).await?;
    assert_eq!(controller.lifecycle_state(id).await, LifecycleState::Stopped);
    assert_eq!(controller.registry().get(id).await?.status, BotStatus::Inactive);

    // Stopping again changes nothing.
    controller.stop_bot("alice", id).await?;
    assert_eq!(controller.lifecycle_state(id).await, LifecycleState::Stopped);
    assert_eq!(controller.registry().get(id).await?.status, BotStatus::Inactive);
    Ok(())
}

#[tokio::test]
async fn delete_while_running_stops_first() -> Result<()> {
    init_tracing();
    let registry_path = temp_path("controller-delete").with_extension("json");
    let state_dir = temp_path("controller-delete-state");
    let controller = build_controller(&registry_path, &state_dir, mock_factory()).await?;

    let id = controller.registry().create(draft("alice", "Deleted", "token-del")).await?;
    controller.start_bot("alice", id).await?;
    assert_eq!(controller.lifecycle_state(id).await, LifecycleState::Running);

    controller.delete_bot("alice", id).await?;
    assert_eq!(controller.lifecycle_state(id).await, LifecycleState::Stopped);
    assert!(matches!(
        controller.registry().get(id).await,
        Err(OrchestratorError::NotFound { .. })
    ));
    Ok(())
}

#[tokio::test]
async fn restart_resumes_active_bots() -> Result<()> {
    init_tracing();
    let registry_path = temp_path("controller-restart").with_extension("json");
    let state_dir = temp_path("controller-restart-state");

    let id;
    {
        let controller = build_controller(&registry_path, &state_dir, mock_factory()).await?;
        id = controller.registry().create(draft("alice", "Survivor", "token-surv")).await?;
        controller.start_bot("alice", id).await?;
        assert_eq!(controller.registry().get(id).await?.status, BotStatus::Active);

        // Whole-process shutdown: runtimes stop, persisted status stays
        // Active so the bot comes back on the next start.
        controller.shutdown().await;
        assert_eq!(controller.registry().get(id).await?.status, BotStatus::Active);
    }

    let controller = build_controller(&registry_path, &state_dir, mock_factory()).await?;
    assert_eq!(controller.lifecycle_state(id).await, LifecycleState::Stopped);

    let resumed = controller.resume_active().await;
    assert_eq!(resumed, 1);
    assert_eq!(controller.lifecycle_state(id).await, LifecycleState::Running);
    info!("Bot {} resumed without manual intervention", id);

    controller.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn failed_resume_corrects_status_to_inactive() -> Result<()> {
    init_tracing();
    let registry_path = temp_path("controller-failed-resume").with_extension("json");
    let state_dir = temp_path("controller-failed-resume-state");

    let id;
    {
        let registry = BotRegistry::open(&registry_path).await?;
        id = registry.create(draft("alice", "Orphan", "token-orphan")).await?;
        registry.update_status(id, BotStatus::Active).await?;
    }

    // Every channel open fails, so runtime init fails.
    let controller =
        build_controller(&registry_path, &state_dir, Arc::new(MockChannelFactory::failing())).await?;

    let resumed = controller.resume_active().await;
    assert_eq!(resumed, 0);
    assert_eq!(controller.lifecycle_state(id).await, LifecycleState::Stopped);
    // Self-healed: the stale Active flag is gone.
    assert_eq!(controller.registry().get(id).await?.status, BotStatus::Inactive);
    Ok(())
}

#[tokio::test]
async fn start_failure_reports_and_returns_stopped() -> Result<()> {
    init_tracing();
    let registry_path = temp_path("controller-start-failure").with_extension("json");
    let state_dir = temp_path("controller-start-failure-state");
    let controller =
        build_controller(&registry_path, &state_dir, Arc::new(MockChannelFactory::failing())).await?;

    let id = controller.registry().create(draft("alice", "Unstartable", "token-bad")).await?;
    let err = controller.start_bot("alice", id).await.expect_err("init must fail");
    assert!(matches!(err, OrchestratorError::Channel(_)));

    assert_eq!(controller.lifecycle_state(id).await, LifecycleState::Stopped);
    assert_eq!(controller.registry().get(id).await?.status, BotStatus::Inactive);
    Ok(())
}

#[tokio::test]
async fn owners_cannot_touch_each_others_bots() -> Result<()> {
    init_tracing();
    let registry_path = temp_path("controller-isolation").with_extension("json");
    let state_dir = temp_path("controller-isolation-state");
    let controller = build_controller(&registry_path, &state_dir, mock_factory()).await?;

    let id = controller.registry().create(draft("alice", "Private", "token-priv")).await?;

    assert!(matches!(
        controller.start_bot("bob", id).await,
        Err(OrchestratorError::NotFound { .. })
    ));
    assert!(matches!(
        controller.stop_bot("bob", id).await,
        Err(OrchestratorError::NotFound { .. })
    ));
    assert!(matches!(
        controller.delete_bot("bob", id).await,
        Err(OrchestratorError::NotFound { .. })
    ));

    // Alice's bot is untouched.
    assert_eq!(controller.registry().get(id).await?.name, "Private");
    Ok(())
}

#[tokio::test]
async fn second_controller_instance_is_rejected() -> Result<()> {
    init_tracing();
    let registry_path = temp_path("controller-lock").with_extension("json");
    let state_dir = temp_path("controller-lock-state");

    let first = build_controller(&registry_path, &state_dir, mock_factory()).await?;

    let err = build_controller(&registry_path, &state_dir, mock_factory())
        .await
        .expect_err("second instance over the same store must be refused");
    assert!(matches!(err, OrchestratorError::AlreadyRunning { .. }));

    drop(first);
    // Once the first instance is gone its lock is released.
    let _third = build_controller(&registry_path, &state_dir, mock_factory()).await?;
    Ok(())
}

#[tokio::test]
async fn serve_answers_commands_over_the_stream() -> Result<()> {
    init_tracing();
    let registry_path = temp_path("controller-serve").with_extension("json");
    let state_dir = temp_path("controller-serve-state");
    let controller =
        Arc::new(build_controller(&registry_path, &state_dir, mock_factory()).await?);

    let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
    let serve_controller = Arc::clone(&controller);
    let serve_task = tokio::spawn(async move { serve_controller.serve(rx).await });

    let (command, reply) = bot_orchestrator::OwnerCommand::new("alice", Command::ListBots);
    tx.send(command).expect("serve loop is listening");
    let reply = reply.await.expect("serve loop answers every command");
    assert!(reply.contains("don't have any bots"), "got: {}", reply);

    // Dropping the sender ends the loop.
    drop(tx);
    serve_task.await.expect("serve loop exits cleanly");
    Ok(())
}

#[tokio::test]
async fn add_bot_dialog_creates_registry_entry() -> Result<()> {
    init_tracing();
    let registry_path = temp_path("controller-dialog").with_extension("json");
    let state_dir = temp_path("controller-dialog-state");
    let controller = build_controller(&registry_path, &state_dir, mock_factory()).await?;

    let owner = "alice";
    controller.handle_command(owner, Command::AddBot).await;
    controller.handle_command(owner, Command::Dialog("Daily AI".to_string())).await;
    controller.handle_command(owner, Command::Dialog("token-dialog".to_string())).await;
    controller.handle_command(owner, Command::Dialog("ai".to_string())).await;
    controller.handle_command(owner, Command::Dialog("12".to_string())).await;
    controller.handle_command(owner, Command::Dialog("default".to_string())).await;
    let reply = controller
        .handle_command(owner, Command::Dialog("manual".to_string()))
        .await;
    assert!(reply.contains("created"), "got: {}", reply);

    let bots = controller.registry().list(owner).await;
    assert_eq!(bots.len(), 1);
    assert_eq!(bots[0].name, "Daily AI");
    assert_eq!(bots[0].frequency_hours, 12);
    assert!(!bots[0].auto_publish);
    assert!(!bots[0].sources.is_empty(), "niche defaults must be filled in");
    Ok(())
}
