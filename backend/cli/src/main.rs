mod config;
mod send_cmd;
mod shutdown;
mod status_cmd;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use tracing::{error, info};

use wright_browser::CdpBackend;
use wright_core::{AutomationBackend, Dispatcher, FatalInitError, MockBackend};
use wright_gateway::{start_server, GatewayConfig, GatewayState};
use wright_logging::init_logger;

use config::Config;
use send_cmd::ActionArgs;

const DEFAULT_RELAY_URL: &str = "ws://localhost:1337";

#[derive(Parser)]
#[command(name = "wright")]
#[command(about = "Wright: drive a remote browser over a WebSocket relay")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum BackendKind {
    /// A Chromium reachable over the DevTools protocol
    Chrome,
    /// In-memory backend that records calls
    Mock,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the relay server
    Serve {
        /// Port to bind the relay to
        #[arg(short, long)]
        port: Option<u16>,
        /// Address to bind the relay to
        #[arg(long)]
        bind: Option<String>,
        /// DevTools endpoint (http://host:port or ws://…/devtools/…)
        #[arg(long)]
        cdp_url: Option<String>,
        #[arg(long, value_enum, default_value_t = BackendKind::Chrome)]
        backend: BackendKind,
        /// Directory for rotated JSON logs
        #[arg(long)]
        log_dir: Option<PathBuf>,
    },
    /// Send one command to a running relay
    Send {
        #[arg(long, default_value = DEFAULT_RELAY_URL)]
        url: String,
        /// Command timeout in milliseconds
        #[arg(long)]
        timeout: Option<u64>,
        #[command(subcommand)]
        action: ActionArgs,
    },
    /// Open a page and save a screenshot of it
    Demo {
        #[arg(long, default_value = DEFAULT_RELAY_URL)]
        url: String,
        #[arg(long, default_value = "https://example.com")]
        target: String,
        #[arg(long, default_value = "example.jpg")]
        out: PathBuf,
    },
    /// Show a running relay's health
    Status {
        #[arg(long, default_value = "localhost")]
        host: String,
        #[arg(short, long)]
        port: Option<u16>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env();
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            port,
            bind,
            cdp_url,
            backend,
            log_dir,
        } => {
            let config = Config {
                port: port.unwrap_or(config.port),
                bind_address: bind.unwrap_or(config.bind_address),
                cdp_url: cdp_url.unwrap_or(config.cdp_url),
                log_dir: log_dir.or(config.log_dir),
                ..config
            };
            init_logger(&config.log_level, config.log_dir.as_deref());
            if let Err(e) = run_server(config, backend).await {
                error!(error = %e, "Wright relay failed");
                std::process::exit(1);
            }
        }
        Commands::Send {
            url,
            timeout,
            action,
        } => {
            init_logger(&config.log_level, None);
            send_cmd::run(&url, timeout, &action).await?;
        }
        Commands::Demo { url, target, out } => {
            init_logger(&config.log_level, None);
            send_cmd::demo(&url, &target, &out).await?;
        }
        Commands::Status { host, port } => {
            status_cmd::run(&host, port.unwrap_or(config.port)).await?;
        }
    }

    Ok(())
}

async fn run_server(config: Config, kind: BackendKind) -> Result<()> {
    let addr = config.socket_addr()?;
    info!(
        addr = %addr,
        backend = ?kind,
        cdp_url = %wright_logging::redact_sensitive_data(&config.cdp_url),
        "Starting Wright relay"
    );

    let backend: Arc<dyn AutomationBackend> = match kind {
        BackendKind::Chrome => Arc::new(CdpBackend::new(config.cdp_url.clone())),
        BackendKind::Mock => Arc::new(MockBackend::new()),
    };

    if let Err(source) = backend.initialize().await {
        let fatal = FatalInitError::Backend {
            backend: backend.name().to_string(),
            source,
        };
        error!(error = %fatal, "backend initialization failed");
        backend.shutdown().await;
        return Err(fatal.into());
    }

    let state = GatewayState::new(Dispatcher::new(Arc::clone(&backend)), GatewayConfig::default());
    let signal_state = state.clone();
    tokio::spawn(async move {
        shutdown::wait_for_signal().await;
        signal_state.shutdown();
    });

    let served = start_server(addr, state).await;
    backend.shutdown().await;
    info!("Wright relay stopped");
    served
}
