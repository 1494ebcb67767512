use std::io::Write;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use futures_util::StreamExt;

use helpdesk::rest::{self, ApiDoc, ApiState};
use helpdesk::tickets::{StatusFilter, TicketStore};
use helpdesk::{logging, App, Config};

#[derive(Parser)]
#[command(name = "helpdesk")]
#[command(about = "Routes IT support requests and streams the replies")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long)]
    config: Option<String>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the REST API server
    Serve {
        /// Port to listen on (overrides server.port)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Handle one request and print each event as a JSON line
    Ask {
        /// The support request
        message: String,
    },

    /// List tickets, newest first
    Tickets {
        /// Status filter: all, open, in_progress, resolved, closed
        #[arg(short, long, default_value = "all")]
        status: StatusFilter,

        /// Maximum tickets shown (default: workflow.direct_list_limit)
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Run requests through the pipeline and print the resulting metrics summary
    Metrics {
        /// Lookback window in seconds (default: metrics.default_window_secs)
        #[arg(short, long)]
        window_secs: Option<u64>,

        /// Requests to run before summarizing
        messages: Vec<String>,
    },

    /// Print the OpenAPI document
    Openapi {
        /// Emit YAML instead of JSON
        #[arg(long)]
        yaml: bool,
    },

    /// Write the effective configuration to .helpdesk/config.toml
    Init,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration first (needed for logging setup)
    let config = Config::load(cli.config.as_deref())?;

    // Only the server logs to a file; other commands log to stderr
    let is_server = matches!(cli.command, Commands::Serve { .. });
    let logging_handle = logging::init_logging(&config, is_server, cli.debug)?;

    match cli.command {
        Commands::Serve { port } => {
            cmd_serve(config, port).await?;
        }
        Commands::Ask { message } => {
            cmd_ask(config, &message).await?;
        }
        Commands::Tickets { status, limit } => {
            cmd_tickets(config, status, limit).await?;
        }
        Commands::Metrics {
            window_secs,
            messages,
        } => {
            cmd_metrics(config, window_secs, &messages).await?;
        }
        Commands::Openapi { yaml } => {
            cmd_openapi(yaml)?;
        }
        Commands::Init => {
            cmd_init(&config)?;
        }
    }

    if let Some(log_path) = logging_handle.log_file_path {
        if log_path.metadata().map(|m| m.len() > 0).unwrap_or(false) {
            eprintln!("Server log: {}", log_path.display());
        }
    }

    Ok(())
}

async fn cmd_serve(config: Config, port: Option<u16>) -> Result<()> {
    let host = config.server.host.clone();
    let port = port.unwrap_or(config.server.port);

    let app = App::from_config(config).await?;
    if !app.llm_configured {
        eprintln!("Warning: no language model configured; using keyword fallbacks.");
    }

    println!("Helpdesk API listening on http://{}:{}", host, port);
    println!("Swagger UI: http://{}:{}/swagger-ui", host, port);
    rest::serve(ApiState::new(app), &host, port).await
}

async fn cmd_ask(config: Config, message: &str) -> Result<()> {
    let message = message.trim();
    if message.is_empty() {
        anyhow::bail!("Message must not be empty");
    }

    let app = App::from_config(config).await?;
    let mut events = app.orchestrator.handle(message);

    let mut stdout = std::io::stdout().lock();
    while let Some(event) = events.next().await {
        let line = serde_json::to_string(&event).context("Failed to serialize event")?;
        writeln!(stdout, "{}", line)?;
        stdout.flush()?;
    }

    Ok(())
}

async fn cmd_tickets(config: Config, status: StatusFilter, limit: Option<usize>) -> Result<()> {
    let limit = limit.unwrap_or(config.workflow.direct_list_limit);
    let app = App::from_config(config).await?;
    let tickets = app
        .store
        .list(status, limit)
        .await
        .context("Failed to list tickets")?;

    if tickets.is_empty() {
        println!("No tickets found ({})", status);
        return Ok(());
    }

    println!("Tickets ({}, {} shown)", status, tickets.len());
    println!("{}", "─".repeat(60));
    for ticket in &tickets {
        println!("{}", ticket.summary_line());
    }

    Ok(())
}

async fn cmd_metrics(config: Config, window_secs: Option<u64>, messages: &[String]) -> Result<()> {
    let window = Duration::from_secs(window_secs.unwrap_or(config.metrics.default_window_secs));
    let recent = config.metrics.recent_events;
    let app = App::from_config(config).await?;

    for message in messages.iter().filter(|m| !m.trim().is_empty()) {
        let events: Vec<_> = app.orchestrator.handle(message.trim()).collect().await;
        eprintln!("Handled {:?} ({} events)", message, events.len());
    }

    let report = serde_json::json!({
        "summary": app.metrics.summary(window),
        "recent": app.metrics.recent(recent),
    });
    println!(
        "{}",
        serde_json::to_string_pretty(&report).context("Failed to serialize metrics")?
    );
    Ok(())
}

fn cmd_openapi(yaml: bool) -> Result<()> {
    let spec = if yaml {
        ApiDoc::yaml().context("Failed to render OpenAPI YAML")?
    } else {
        ApiDoc::json().context("Failed to render OpenAPI JSON")?
    };
    println!("{}", spec);
    Ok(())
}

fn cmd_init(config: &Config) -> Result<()> {
    let path = config.save()?;
    println!("Wrote configuration to {}", path.display());
    Ok(())
}
