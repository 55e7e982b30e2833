use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use screenwise::config::CONFIG_FILE;
use screenwise::logging::init_tracing;

mod cmd;

#[derive(Parser)]
#[command(name = "screenwise")]
#[command(version, about = "Dual-reviewer AI screening for systematic literature reviews")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Write logs to stderr as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Also append debug-level JSON logs to this file
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    /// Path to screenwise.toml
    #[arg(long, global = true, default_value = CONFIG_FILE)]
    pub config: PathBuf,

    /// SQLite database path. Overrides screenwise.toml and SCREENWISE_DB.
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Screen a batch of references with two AI reviewers
    Screen {
        /// JSON file with the references (array or {"references": [...]})
        #[arg(short, long)]
        references: PathBuf,

        /// JSON file with the PICOTT criteria
        #[arg(short, long)]
        criteria: Option<PathBuf>,

        /// Project the decisions are recorded under
        #[arg(short, long)]
        project: String,

        /// Session id (generated when omitted)
        #[arg(long)]
        session: Option<String>,

        /// Screening stage (defaults to the configured stage)
        #[arg(long)]
        stage: Option<String>,

        /// Pause between references in milliseconds
        #[arg(long)]
        pacing_ms: Option<u64>,

        /// Print decisions as JSON instead of a summary table
        #[arg(long)]
        json: bool,
    },
    /// Show the persisted progress of a screening session
    Status {
        session: String,

        /// Keep polling until the session finishes
        #[arg(short, long)]
        follow: bool,

        /// Poll interval for --follow, in milliseconds
        #[arg(long, default_value = "1000")]
        interval_ms: u64,
    },
    /// Print the decision log of a project
    Log {
        project: String,

        /// Include each reviewer's reasoning
        #[arg(long)]
        reasoning: bool,

        #[arg(long)]
        json: bool,
    },
    /// View or validate configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
    /// Serve the progress API and event stream
    Serve {
        /// Port to serve on
        #[arg(short, long, default_value = "3170")]
        port: u16,

        /// Enable dev mode (bind all interfaces, permissive CORS)
        #[arg(long)]
        dev: bool,
    },
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Validate configuration and show any warnings
    Validate,
    /// Initialize a default screenwise.toml file
    Init,
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    let _log_guard = init_tracing(cli.verbose, cli.log_json, cli.log_file.as_deref())?;

    match &cli.command {
        Commands::Screen {
            references,
            criteria,
            project,
            session,
            stage,
            pacing_ms,
            json,
        } => {
            let args = cmd::screen::ScreenArgs {
                references,
                criteria: criteria.as_deref(),
                project,
                session: session.as_deref(),
                stage: stage.as_deref(),
                pacing_ms: *pacing_ms,
                json: *json,
            };
            cmd::cmd_screen(&cli, args).await?;
        }
        Commands::Status {
            session,
            follow,
            interval_ms,
        } => cmd::cmd_status(&cli, session, *follow, *interval_ms).await?,
        Commands::Log {
            project,
            reasoning,
            json,
        } => cmd::cmd_log(&cli, project, *json, *reasoning).await?,
        Commands::Config { command } => cmd::cmd_config(&cli, command.clone())?,
        Commands::Serve { port, dev } => cmd::cmd_serve(&cli, *port, *dev).await?,
    }

    Ok(())
}
