use std::future::Future;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use beacon_voice::api::ApiServer;
use beacon_voice::{Config, VoiceService};

/// Shortest interval between idle sweeps
const MIN_SWEEP_INTERVAL: Duration = Duration::from_secs(30);

/// Beacon Voice - Voice pipeline orchestrator for phone-style assistants
#[derive(Parser)]
#[command(name = "beacon-voice", version, about)]
struct Cli {
    /// Port to listen on (overrides config)
    #[arg(long, global = true)]
    port: Option<u16>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the HTTP API (default)
    Serve,
    /// Check the health of every configured provider
    Check,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,beacon_voice=info",
        1 => "info,beacon_voice=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let mut config = Config::load()?;
    if let Some(port) = cli.port {
        config.port = port;
    }
    tracing::debug!(?config, "loaded configuration");

    let service = Arc::new(VoiceService::new(
        config.sessions.clone(),
        config.pipeline.clone(),
        config.providers()?,
    ));

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => {
            serve(service, &config).await?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Check => Ok(check(&service).await),
    }
}

/// Serve until Ctrl-C, then drain active sessions into analytics
async fn serve(service: Arc<VoiceService>, config: &Config) -> anyhow::Result<()> {
    tracing::info!(
        port = config.port,
        max_sessions = config.sessions.max_active,
        "starting beacon voice"
    );

    let sweeper = tokio::spawn(sweep_loop(
        Arc::clone(&service),
        sweep_interval(config.sessions.idle_timeout),
    ));

    let server = ApiServer::new(Arc::clone(&service), config.port);
    let result = server.run(shutdown_signal()).await;

    sweeper.abort();
    let drained = service.shutdown();
    tracing::info!(drained, "beacon voice stopped");

    result.map_err(Into::into)
}

async fn sweep_loop(service: Arc<VoiceService>, every: Duration) {
    let mut ticker = tokio::time::interval(every);
    // First tick fires immediately
    ticker.tick().await;
    loop {
        ticker.tick().await;
        let swept = service.sweep_idle();
        if swept > 0 {
            tracing::info!(swept, "ended idle sessions");
        }
    }
}

fn sweep_interval(idle_timeout: Duration) -> Duration {
    (idle_timeout / 4).max(MIN_SWEEP_INTERVAL)
}

async fn shutdown_signal() {
    shutdown_on(tokio::signal::ctrl_c()).await;
}

/// Resolve once `signal` fires; never resolve if it cannot be listened for
async fn shutdown_on(signal: impl Future<Output = std::io::Result<()>>) {
    if let Err(e) = signal.await {
        tracing::error!(error = %e, "failed to listen for ctrl-c, serving until killed");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown requested");
}

/// Print provider health, failing if any provider is down
async fn check(service: &VoiceService) -> ExitCode {
    let health = service.health().await;

    for (stage, provider) in [
        ("transcription", &health.transcription),
        ("retrieval", &health.retrieval),
        ("generation", &health.generation),
        ("synthesis", &health.synthesis),
    ] {
        let mark = if provider.healthy { "ok" } else { "FAILED" };
        println!("{stage:<14} {:<12} {mark}", provider.provider);
    }

    if health.all_healthy() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
