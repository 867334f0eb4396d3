mod bootstrap;
mod health;
mod routes;

use std::{path::PathBuf, time::Duration};

use anyhow::{Context, Result};
use clap::Parser;
use signoff_core::config::{AppConfig, ConfigOverrides, LoadOptions};

#[derive(Debug, Parser)]
#[command(
    name = "signoff-server",
    about = "Slack approval bot",
    long_about = "Serve the Slack slash command, events, and interactivity endpoints for approval requests.",
    after_help = "Examples:\n  signoff-server\n  signoff-server --config config/signoff.toml --port 8080"
)]
struct Cli {
    #[arg(long, help = "Path to a TOML config file (defaults to signoff.toml or config/signoff.toml)")]
    config: Option<PathBuf>,
    #[arg(long, help = "Listen port; overrides SIGNOFF_SERVER_PORT and PORT")]
    port: Option<u16>,
}

impl Cli {
    fn load_options(self) -> LoadOptions {
        LoadOptions {
            require_file: self.config.is_some(),
            config_path: self.config,
            overrides: ConfigOverrides { server_port: self.port, ..ConfigOverrides::default() },
        }
    }
}

fn init_logging(config: &AppConfig) {
    use signoff_core::config::LogFormat::*;
    use tracing_subscriber::EnvFilter;

    // RUST_LOG wins over the configured level.
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.logging.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_env_filter(filter).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_env_filter(filter).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_env_filter(filter).json().init();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    run(Cli::parse()).await
}

async fn run(cli: Cli) -> Result<()> {
    let config = AppConfig::load(cli.load_options())?;
    init_logging(&config);

    let app = bootstrap::bootstrap(config)?;
    let address = app.config.listen_address();
    let drain = Duration::from_secs(app.config.server.graceful_shutdown_secs);

    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("could not bind {address}"))?;

    tracing::info!(
        event_name = "system.server.started",
        correlation_id = "bootstrap",
        bind_address = %address,
        "approval bot is running on port {}",
        app.config.server.port
    );

    let router = app.router;
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
    let mut server = tokio::spawn(async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await
    });

    tokio::select! {
        result = &mut server => {
            return result
                .context("http server task panicked")?
                .context("http server terminated unexpectedly");
        }
        signal = tokio::signal::ctrl_c() => signal.context("could not listen for ctrl-c")?,
    }

    tracing::info!(
        event_name = "system.server.stopping",
        correlation_id = "shutdown",
        drain_secs = drain.as_secs(),
        "shutdown requested; draining in-flight requests"
    );
    let _ = shutdown_tx.send(());

    match tokio::time::timeout(drain, server).await {
        Ok(result) => result
            .context("http server task panicked")?
            .context("http server terminated unexpectedly")?,
        Err(_) => tracing::warn!(
            event_name = "system.server.drain_timeout",
            correlation_id = "shutdown",
            drain_secs = drain.as_secs(),
            "in-flight requests did not finish before the drain deadline"
        ),
    }

    tracing::info!(
        event_name = "system.server.stopped",
        correlation_id = "shutdown",
        "signoff-server stopped"
    );
    Ok(())
}
