use anyhow::Context;
use clap::Parser;
use mcp_say_hello::configuration::{get_configuration, TransportKind};
use mcp_say_hello::mcp::{stdio, tools, Dispatcher, SessionManager};
use mcp_say_hello::startup::{run, shutdown_signal};
use mcp_say_hello::telemetry::{get_subscriber, init_subscriber};
use std::net::TcpListener;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(
    name = "server",
    version,
    about = "MCP server offering a say_hello tool over stdio or HTTP event streams"
)]
struct Cli {
    /// Transport to serve (overrides the configuration file)
    #[arg(long, value_enum)]
    transport: Option<TransportKind>,
    /// Address to bind the HTTP transport to
    #[arg(long)]
    host: Option<String>,
    /// Port to bind the HTTP transport to
    #[arg(long)]
    port: Option<u16>,
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut settings = get_configuration().context("Failed to read configuration.")?;
    if let Some(transport) = cli.transport {
        settings.transport = transport;
    }
    if let Some(host) = cli.host {
        settings.app_host = host;
    }
    if let Some(port) = cli.port {
        settings.app_port = port;
    }

    // stdout carries protocol frames on the stdio transport
    match settings.transport {
        TransportKind::Stdio => init_subscriber(get_subscriber(
            settings.server.name.clone(),
            settings.log_level.clone(),
            std::io::stderr,
        ))?,
        TransportKind::Sse => init_subscriber(get_subscriber(
            settings.server.name.clone(),
            settings.log_level.clone(),
            std::io::stdout,
        ))?,
    }

    if let Err(e) = serve(settings).await {
        tracing::error!("Server failed to start: {:#}", e);
        return Err(e);
    }
    Ok(())
}

async fn serve(settings: mcp_say_hello::configuration::Settings) -> anyhow::Result<()> {
    let registry = tools::default_registry().context("Failed to register tools")?;
    tracing::info!("Registered {} tools", registry.count());
    let dispatcher = Dispatcher::new(Arc::new(registry), settings.server.clone());

    match settings.transport {
        TransportKind::Stdio => {
            tracing::info!("MCP server started on stdio");
            stdio::serve_stdio(&dispatcher).await?;
        }
        TransportKind::Sse => {
            let address = settings.address();
            let listener = TcpListener::bind(&address)
                .with_context(|| format!("failed to bind to {}", address))?;
            tracing::info!("MCP server started (SSE) at http://{}/", address);

            let sessions = Arc::new(SessionManager::new());
            let server = run(listener, settings, dispatcher, sessions.clone())?;

            let handle = server.handle();
            actix_web::rt::spawn(async move {
                shutdown_signal().await;
                let closed = sessions.close_all();
                tracing::info!(closed_sessions = closed, "Shutting down");
                handle.stop(true).await;
            });

            server.await?;
        }
    }

    Ok(())
}
