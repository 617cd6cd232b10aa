//! herakles-push-exporter - version 0.1.0
//!
//! Host metrics push agent with tracing logging.
//! This is the main entry point that runs the push loop and handles subcommands.

use clap::Parser;
use std::time::Duration;
use tokio::{signal, time};
use tracing::{debug, error, info, warn, Level};

use herakles_push_exporter::cli::{Args, Commands, LogLevel};
use herakles_push_exporter::collectors::CollectorRegistry;
use herakles_push_exporter::commands::{command_config, command_test};
use herakles_push_exporter::config::{
    render_config, resolve_config, validate_effective_config, Config,
};
use herakles_push_exporter::startup_checks;
use herakles_push_exporter::state::{AppState, SharedState};

/// Initializes tracing logging subsystem with configured log level.
fn setup_logging(args: &Args) {
    let log_level = match args.log_level {
        LogLevel::Off => return,
        LogLevel::Error => Level::ERROR,
        LogLevel::Warn => Level::WARN,
        LogLevel::Info => Level::INFO,
        LogLevel::Debug => Level::DEBUG,
        LogLevel::Trace => Level::TRACE,
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return;
    }

    info!("Logging initialized with level: {:?}", args.log_level);
}

/// Helper function to load and validate configuration.
/// Exits the process with error code 1 if validation fails.
fn load_validated_config(
    args: &Args,
    registry: &CollectorRegistry,
) -> Result<Config, Box<dyn std::error::Error>> {
    let config = resolve_config(args)?;
    if let Err(e) = validate_effective_config(&config, registry) {
        eprintln!("❌ Configuration invalid: {}", e);
        std::process::exit(1);
    }
    Ok(config)
}

/// Resolves on SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT (Ctrl+C), shutting down gracefully...");
        }
        _ = terminate => {
            info!("Received SIGTERM, shutting down gracefully...");
        }
    }
}

/// Pushes every `push_interval` seconds until a shutdown signal arrives.
async fn push_loop(state: SharedState) {
    let period = Duration::from_secs(state.config.push_interval_secs());
    let mut ticker = time::interval(period);
    ticker.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

    let mut pushes: u64 = 0;
    let mut failures: u64 = 0;
    loop {
        ticker.tick().await;
        pushes += 1;
        match state.push_once().await {
            Ok(()) => debug!(pushes, "Metrics pushed to {}", state.pusher.url()),
            Err(e) => {
                failures += 1;
                warn!(pushes, failures, "Push failed: {}", e);
            }
        }
    }
}

/// Main application entry point.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let registry = CollectorRegistry::with_defaults();

    // Early config resolution for show/check modes
    if args.show_config || args.check_config {
        let config = resolve_config(&args)?;

        if args.check_config {
            if let Err(e) = validate_effective_config(&config, &registry) {
                eprintln!("❌ Configuration invalid: {}", e);
                std::process::exit(1);
            }
            println!("✅ Configuration is valid");
            return Ok(());
        }

        print!("{}", render_config(&config, args.config_format)?);
        return Ok(());
    }

    setup_logging(&args);

    // Handle subcommands
    if let Some(command) = &args.command {
        match command {
            Commands::Config {
                output,
                format,
                commented,
            } => return command_config(output.clone(), *format, *commented),
            Commands::CheckRequirements => {
                println!("🔍 Checking Runtime Requirements");
                println!("================================\n");

                let config = load_validated_config(&args, &registry)?;
                match startup_checks::validate_requirements(
                    &config.proc_paths(),
                    &config.enabled_collectors(),
                ) {
                    Ok(_) => {
                        println!("\n✅ All requirements met - ready for production!");
                        std::process::exit(0);
                    }
                    Err(e) => {
                        eprintln!("\n❌ Requirements check failed: {}", e);
                        std::process::exit(1);
                    }
                }
            }
            Commands::Test {
                iterations,
                verbose,
            } => {
                let config = load_validated_config(&args, &registry)?;
                let state = AppState::from_config(config, &registry)?;
                return command_test(*iterations, *verbose, &state).await;
            }
        }
    }

    let config = load_validated_config(&args, &registry)?;

    info!("Starting herakles-push-exporter");

    if let Err(e) = startup_checks::validate_requirements(
        &config.proc_paths(),
        &config.enabled_collectors(),
    ) {
        error!("❌ Startup validation failed: {}", e);
        error!("   The exporter will start but the affected collectors will report failures!");
    }

    let state: SharedState = std::sync::Arc::new(AppState::from_config(config, &registry)?);
    let enabled: Vec<&str> = state.node.names().collect();
    info!(
        collectors = %enabled.join(","),
        "Pushing to {} every {}s",
        state.pusher.url(),
        state.config.push_interval_secs()
    );

    if args.once {
        state.push_once().await?;
        info!("Single push completed");
        return Ok(());
    }

    tokio::select! {
        _ = push_loop(state.clone()) => {}
        _ = shutdown_signal() => {
            info!("Shutdown signal received, exiting...");
        }
    }

    info!(
        uptime_secs = state.start_time.elapsed().as_secs(),
        "herakles-push-exporter stopped gracefully"
    );
    Ok(())
}
