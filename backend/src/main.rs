//! kube-mcp server.

use clap::Parser;
use std::path::PathBuf;
use tracing::info;

use kube_mcp::{
    config::{Config, ConfigOverrides, TransportMode},
    create_app, logging,
    state::AppState,
};

/// kube-mcp - Kubernetes MCP server over Streamable HTTP
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Interface to listen on
    #[arg(long)]
    host: Option<String>,

    /// Port to listen on
    #[arg(short, long)]
    port: Option<u16>,

    /// Session handling on /mcp
    #[arg(long, value_enum)]
    mode: Option<TransportMode>,

    /// Reject requests whose Host header is not allow-listed
    #[arg(long)]
    dns_rebinding_protection: bool,

    /// Allowed Host header value (repeatable)
    #[arg(long = "allowed-host")]
    allowed_hosts: Vec<String>,

    /// Answer POSTs with JSON instead of an SSE frame
    #[arg(long)]
    json_response: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,

    /// Also write logs to this file
    #[arg(long)]
    log_file: Option<PathBuf>,
}

impl From<Args> for ConfigOverrides {
    fn from(args: Args) -> Self {
        Self {
            host: args.host,
            port: args.port,
            mode: args.mode,
            dns_rebinding_protection: args.dns_rebinding_protection,
            allowed_hosts: args.allowed_hosts,
            json_response: args.json_response,
            log_level: args.log_level,
            log_file: args.log_file,
        }
    }
}

fn main() -> anyhow::Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Load configuration
    let config = Config::from_figment(&args.into())?;

    // Initialize logging before the runtime spawns its worker threads
    let _log_guard = logging::init(config.log_level.as_deref(), config.log_file.as_deref())?;
    info!("Configuration loaded");

    run(config)
}

#[tokio::main]
async fn run(config: Config) -> anyhow::Result<()> {
    let transport = &config.transport;
    info!("MCP transport mode: {:?}", transport.mode);
    if transport.dns_rebinding_protection {
        info!(
            "DNS rebinding protection enabled (allowed hosts: {:?})",
            transport.allowed_hosts
        );
    }

    let state = AppState::with_tool_server(config.transport.clone());
    let app = create_app(state.clone());

    let listener = tokio::net::TcpListener::bind(config.bind_address()).await?;
    info!(
        "mcp-kubernetes-server is listening on port {}. Use the following url to connect to the server: http://{}:{}/mcp",
        config.port, config.host, config.port
    );

    // Set up graceful shutdown handler
    let sessions = state.sessions().clone();
    let shutdown_signal = async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
        info!("Received Ctrl+C, shutting down gracefully...");

        // Ends open push streams so graceful shutdown can complete
        sessions.close_all();
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await?;

    info!("Server shut down");
    Ok(())
}
