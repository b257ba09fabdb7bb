use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

use commands::SourceArgs;

#[derive(Parser)]
#[command(
    name = "castwave",
    version,
    about = "Turns submitted reading material into personal radio shows and nudges",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// TOML configuration file; CASTWAVE_* environment variables when absent
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log format (text, json)
    #[arg(long, global = true, default_value = "text")]
    log_format: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Run worker pools and the scheduler until Ctrl-C
    Serve {
        /// Print Prometheus metrics on shutdown
        #[arg(long, default_value = "false")]
        print_metrics: bool,
    },

    /// Submit content, process it, and optionally build a show and feed
    Ingest {
        #[command(flatten)]
        sources: SourceArgs,

        /// Request an auto-selected show of this type after processing
        #[arg(long)]
        show: Option<String>,

        /// Print the owner's feed after processing
        #[arg(long, default_value = "false")]
        feed: bool,

        /// Feed page size
        #[arg(long, default_value = "20")]
        limit: usize,
    },

    /// Ingest content, then run one curation pass
    Refresh {
        #[command(flatten)]
        sources: SourceArgs,

        /// Restrict the pass to one listener
        #[arg(long)]
        user: Option<String>,
    },

    /// Validate configuration and print a summary
    CheckConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing/logging
    setup_tracing(&cli.log_format, cli.verbose)?;

    if let Err(e) = castwave::metrics::init_metrics() {
        tracing::warn!(error = %e, "Metrics registration failed");
    }

    let config = castwave::config::Config::load(cli.config.as_deref())?;
    tracing::debug!(config_file = ?cli.config, "Configuration loaded");

    match cli.command {
        Commands::Serve { print_metrics } => {
            tracing::info!("Starting serve command");
            commands::serve(config, print_metrics).await?;
        }

        Commands::Ingest {
            sources,
            show,
            feed,
            limit,
        } => {
            tracing::info!(
                owner = %sources.owner,
                files = sources.files.len(),
                urls = sources.urls.len(),
                texts = sources.texts.len(),
                show = ?show,
                "Starting ingest command"
            );
            commands::ingest(config, sources, show, feed, limit).await?;
        }

        Commands::Refresh { sources, user } => {
            tracing::info!(user = ?user, "Starting refresh command");
            commands::refresh(config, sources, user).await?;
        }

        Commands::CheckConfig => {
            commands::check_config(&config);
        }
    }

    Ok(())
}

fn setup_tracing(format: &str, verbose: bool) -> Result<()> {
    let env_filter = if verbose {
        tracing_subscriber::EnvFilter::new("castwave=debug,info")
    } else {
        tracing_subscriber::EnvFilter::new("castwave=info,warn")
    };

    match format {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
    }

    Ok(())
}
