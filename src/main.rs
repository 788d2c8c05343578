use anyhow::Result;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use proxym::assembly::{self, AssemblyOptions};
use proxym::config::Config;

#[derive(Parser)]
#[command(name = "proxym")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Reconciles a dynamic service inventory into reverse-proxy config, routing store entries, and load balancer membership")]
#[command(long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "proxym.toml")]
    config: String,

    /// Listening IP address
    #[arg(short = 'H', long, value_name = "IP")]
    host: Option<String>,

    /// Listening port
    #[arg(short, long, value_name = "PORT")]
    port: Option<u16>,

    /// Log level
    #[arg(short = 'v', long, default_value = "info")]
    log_level: String,

    /// Also write the reconciled inventory to stdout as JSON every pass
    #[arg(long)]
    stdout_sink: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_filter = format!("proxym={}", cli.log_level);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting proxym v{}", env!("CARGO_PKG_VERSION"));

    std::env::set_var("PROXYM_CONFIG_FILE", &cli.config);
    let mut config = Config::load()?;
    info!(config_file = %cli.config, "Configuration loaded");

    if let Some(host) = cli.host {
        config.web.host = host;
    }
    if let Some(port) = cli.port {
        config.web.port = port;
    }

    let options = AssemblyOptions {
        enable_stdout_sink: cli.stdout_sink,
        ..Default::default()
    };
    let manager = assembly::build(&config, options)?;

    let quit = CancellationToken::new();
    let shutdown_quit = quit.clone();
    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        info!("Shutdown signal received");
        shutdown_quit.cancel();
    });

    manager.run(quit).await?;
    info!("proxym stopped");
    Ok(())
}

async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
