//! MetaClean Server
//!
//! A self-hosted service that inspects and strips embedded file metadata.
//! `serve` runs the HTTP API; `worker` is the child process the pool spawns.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use metaclean_server::dispatch::{worker, Dispatcher, InlineDispatcher, ProcessPool};
use metaclean_server::{routes, AppState, Config};

#[derive(Parser)]
#[command(name = "metaclean-server", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP server (default)
    Serve {
        /// Run the engine in-process instead of in worker processes
        #[arg(long)]
        inline: bool,
    },
    /// Serve engine jobs over stdin/stdout (spawned by the server)
    Worker,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command.unwrap_or(Command::Serve { inline: false }) {
        Command::Worker => run_worker(),
        Command::Serve { inline } => {
            let runtime = tokio::runtime::Runtime::new().context("Failed to start runtime")?;
            runtime.block_on(serve(inline))
        }
    }
}

fn init_tracing(to_stderr: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "metaclean_server=debug,tower_http=debug".into());

    if to_stderr {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

/// Worker loop; stdout belongs to the protocol
fn run_worker() -> anyhow::Result<()> {
    init_tracing(true);

    let stdin = std::io::stdin();
    let stdout = std::io::stdout();
    worker::serve(stdin.lock(), stdout.lock()).context("Worker protocol failed")
}

async fn serve(inline: bool) -> anyhow::Result<()> {
    init_tracing(false);

    // Load configuration
    dotenvy::dotenv().ok();

    let config = Config::from_env().unwrap_or_else(|e| {
        tracing::warn!("Failed to load config from env: {}, using defaults", e);
        Config::default()
    });

    tracing::info!("Starting MetaClean Server v{}", env!("CARGO_PKG_VERSION"));

    let dispatcher: Arc<dyn Dispatcher> = if inline {
        tracing::info!("Running engine in-process ({} concurrent jobs)", config.workers.count);
        Arc::new(InlineDispatcher::new(config.workers.count))
    } else {
        let program = match &config.workers.program {
            Some(program) => program.clone(),
            None => std::env::current_exe().context("Failed to locate own executable")?,
        };
        Arc::new(ProcessPool::start(
            program,
            config.workers.count,
            Duration::from_secs(config.workers.job_timeout_secs),
        ))
    };

    let app_state = AppState::new(config.clone(), dispatcher);
    app_state
        .store()
        .ensure_root()
        .await
        .with_context(|| {
            format!(
                "Failed to create work dir {}",
                config.storage.work_dir.display()
            )
        })?;
    tracing::info!("Work dir: {}", app_state.store().root().display());

    let app = routes::router(app_state.clone());

    // Start server with graceful shutdown
    let listener = tokio::net::TcpListener::bind((config.server.host.as_str(), config.server.port))
        .await
        .with_context(|| {
            format!(
                "Failed to bind {}:{}",
                config.server.host, config.server.port
            )
        })?;
    let addr: SocketAddr = listener.local_addr()?;
    tracing::info!("MetaClean Server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    app_state.shutdown().await;
    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, starting graceful shutdown...");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown...");
        },
    }
}
