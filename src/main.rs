//! docpilot CLI entry point

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use docpilot::{
    commands::{
        cmd_ingest, cmd_init, cmd_query, cmd_status, cmd_watch_status, expand_paths,
        is_supported_file, print_ingest_stats, print_job_status, print_query_result,
    },
    BackendClient, Config, Error, EventBus, Result,
};
use std::path::PathBuf;
use tracing::{error, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "docpilot")]
#[command(version, about = "Client for a document QA pipeline: ingest files, watch jobs, stream queries", long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize docpilot configuration
    Init {
        /// Force overwrite existing config
        #[arg(long)]
        force: bool,
    },

    /// Upload files and process them through the ingestion pipeline
    Ingest {
        /// Files (or directories of files) to ingest
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Destination collection id
        #[arg(short = 'C', long)]
        collection: String,

        /// Vision model for chart/figure analysis
        #[arg(long)]
        vision_model: Option<String>,
    },

    /// Ask a question against a collection, streaming the answer
    Query {
        /// Collection id to query
        collection: String,

        /// The question
        question: String,

        /// Hide intermediate progress steps
        #[arg(long)]
        no_steps: bool,
    },

    /// Show the status of a pipeline job
    Status {
        /// Job id (the collection id in most deployments)
        job_id: String,

        /// Keep polling until the job reaches a terminal state
        #[arg(short, long)]
        watch: bool,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("{}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    // Handle init command specially (doesn't need existing config)
    if let Commands::Init { force } = cli.command {
        let path = cmd_init(cli.config, force)?;
        println!("✓ Initialized config at {}", path.display());
        return Ok(());
    }

    // Handle completions command (doesn't need config or a backend)
    if let Commands::Completions { shell } = cli.command {
        let mut cmd = Cli::command();
        generate(shell, &mut cmd, "docpilot", &mut std::io::stdout());
        return Ok(());
    }

    // Load configuration and build the backend client
    let config = Config::load_or_default(cli.config.as_deref())?;
    let client = BackendClient::new(
        &config.backend_url,
        config.request_timeout(),
        config.upload_timeout(),
    )?;
    let events = EventBus::new();

    match cli.command {
        Commands::Init { .. } | Commands::Completions { .. } => unreachable!(),

        Commands::Ingest {
            files,
            collection,
            vision_model,
        } => {
            let mut paths = expand_paths(&files)?;
            paths.retain(|path| {
                if is_supported_file(path) {
                    true
                } else {
                    warn!("Skipping unsupported file: {}", path.display());
                    false
                }
            });

            let stats = cmd_ingest(
                &config,
                &client,
                &events,
                &paths,
                &collection,
                vision_model.as_deref(),
            )
            .await?;

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                print_ingest_stats(&stats);
            }

            if stats.failed() > 0 {
                return Err(Error::Other(format!(
                    "{} of {} file(s) failed",
                    stats.failed(),
                    stats.outcomes.len()
                )));
            }
        }

        Commands::Query {
            collection,
            question,
            no_steps,
        } => {
            let show_steps = !no_steps && !cli.json;
            let result = cmd_query(&client, &collection, &question, |step| {
                if show_steps {
                    eprintln!("· {}", step);
                }
            })
            .await?;

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                print_query_result(&result);
            }
        }

        Commands::Status { job_id, watch } => {
            let status = if watch {
                cmd_watch_status(&config, &client, &events, &job_id).await?
            } else {
                cmd_status(&client, &job_id).await?
            };

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&status)?);
            } else if !watch {
                print_job_status(&job_id, &status);
            }

            if watch && status.status == docpilot::models::PipelineStatus::Error {
                return Err(Error::PipelineReported(status.step));
            }
        }
    }

    Ok(())
}
