use callsim::config::Config;
use callsim::infrastructure::TokioScheduler;
use callsim::{CallSessionController, CallState, CallType};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const CONFIG_PATH: &str = "callsim.toml";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = Config::load(CONFIG_PATH)?;

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_new(&config.logging.level).unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Starting call simulator");
    info!("Configuration loaded: {:?}", config);

    let scheduler = Arc::new(TokioScheduler::current());
    let controller = CallSessionController::with_config(scheduler, &config.session);

    demo_call_lifecycle(&controller).await?;

    info!("Call simulator finished");
    Ok(())
}

/// Demonstrate the call lifecycle
async fn demo_call_lifecycle(controller: &CallSessionController) -> anyhow::Result<()> {
    info!("=== Call Lifecycle Demo ===");

    // Forward state changes to this task, the way a UI would observe them
    let (tx, mut rx) = mpsc::unbounded_channel::<CallState>();
    let subscription = controller.call_state().subscribe(move |state| {
        let _ = tx.send(*state);
    });

    controller.simulate_incoming_call(CallType::Video)?;
    controller.accept_call(CallType::Video)?;

    let muted = controller.toggle_microphone_muted();
    let front = controller.toggle_front_camera_selected();
    info!("Microphone muted: {}, front camera: {}", muted, front);

    if let Err(err) = controller.reject_call() {
        warn!("Expected failure: {}", err);
    }

    controller.end_call()?;
    info!("Waiting {:?} for auto-reset", controller.auto_reset_delay());

    while let Some(state) = rx.recv().await {
        info!("Call state: {}", serde_json::to_string(&state)?);
        if state.is_idle() {
            break;
        }
    }

    // A reset during Ended cancels the pending auto-reset
    controller.simulate_incoming_call(CallType::Audio)?;
    controller.accept_call(CallType::Audio)?;
    controller.end_call()?;
    controller.reset_call_state()?;
    info!(
        "Reset after end, auto-reset pending: {}",
        controller.has_pending_auto_reset()
    );

    subscription.unsubscribe();
    info!("=== Call Lifecycle Demo Complete ===");

    Ok(())
}
