//! Parley application binary - composition root.
//!
//! 1. Parse the command line and load configuration from TOML
//! 2. Initialize tracing (RUST_LOG, else --log-level, else the config value)
//! 3. Wire the recognition controller to console collaborators and a
//!    simulated engine
//! 4. Replay a scripted dictation session, printing UI effects and events

mod cli;
mod console;
mod script;

use std::path::Path;
use std::sync::Arc;

use clap::Parser;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use parley_core::config::ParleyConfig;
use parley_core::events::VoiceEvent;
use parley_voice::mock::{MockEngine, MockHost};
use parley_voice::{RecognitionSessionController, Surfaces};

use cli::{CapabilityChoice, CliArgs, Command};
use console::{ConsolePermissionGate, ConsoleSurface};
use script::Script;

fn init_tracing(level: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level)),
        )
        .with_writer(std::io::stderr)
        .init();
}

/// Print controller events until the channel closes.
fn print_events(mut events: broadcast::Receiver<VoiceEvent>, json: bool) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) if json => match serde_json::to_string(&event) {
                    Ok(line) => println!("{line}"),
                    Err(e) => tracing::warn!(error = %e, "Failed to serialize event"),
                },
                Ok(event) => println!("[   event] {}", event.event_name()),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Event printer fell behind");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

fn build_host(choice: CapabilityChoice, engine: &MockEngine, user_agent: String) -> MockHost {
    let host = match choice {
        CapabilityChoice::Standard => MockHost::new(Some(engine.clone()), None),
        CapabilityChoice::Prefixed => MockHost::new(None, Some(engine.clone())),
        CapabilityChoice::None => MockHost::unsupported(),
    };
    host.with_user_agent(user_agent)
}

async fn run_replay(
    args: &CliArgs,
    config: ParleyConfig,
    script_path: &Path,
    capability: CapabilityChoice,
    deny_microphone: bool,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let script = Script::load(script_path)?;
    let user_agent =
        args.resolve_user_agent(script.user_agent.as_deref(), &config.general.user_agent);

    let engine = MockEngine::with_lifecycle();
    let host = Arc::new(build_host(capability, &engine, user_agent));
    let surface = Arc::new(ConsoleSurface::new());

    let handle = RecognitionSessionController::spawn(
        config.voice,
        host,
        Arc::new(ConsolePermissionGate::new(!deny_microphone)),
        Surfaces::shared(surface.clone()),
    );
    let printer = print_events(handle.subscribe(), json);

    let snapshot = script::replay(&script, &handle, &engine, surface).await?;
    println!("[   final] {}", serde_json::to_string_pretty(&snapshot)?);

    handle.shutdown().await?;
    drop(handle);
    printer.await?;
    Ok(())
}

fn check_config(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let config = ParleyConfig::load(path)?;
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    let config_file = args.resolve_config_path();
    let loaded = ParleyConfig::load(&config_file);
    let config_level = loaded
        .as_ref()
        .map(|config| config.general.log_level.clone())
        .unwrap_or_else(|_| "info".to_string());
    init_tracing(&args.resolve_log_level(&config_level));

    tracing::info!("Starting Parley v{}", env!("CARGO_PKG_VERSION"));

    let config = match loaded {
        Ok(config) => config,
        Err(e) if config_file.exists() => {
            tracing::warn!(
                path = %config_file.display(),
                error = %e,
                "Invalid config, using defaults"
            );
            ParleyConfig::default()
        }
        Err(_) => {
            tracing::info!(path = %config_file.display(), "No config file, using defaults");
            ParleyConfig::default()
        }
    };

    match &args.command {
        Command::CheckConfig => check_config(&config_file),
        Command::Replay {
            script,
            capability,
            deny_microphone,
            json,
        } => run_replay(&args, config, script, *capability, *deny_microphone, *json).await,
    }
}
